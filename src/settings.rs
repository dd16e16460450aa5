//! Process configuration, read from an optional `settings.toml` and then from
//! the environment (`MONGODB_URI`, `DATABASE`, `BIND`, `PORT`, `LOG_LEVEL`).
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub mongodb_uri: String,
    pub database: String,
    pub bind: String,
    pub port: u16,
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_env(Environment::default())
    }

    fn from_env(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("database", "budget-buddy")?
            .set_default("bind", "0.0.0.0")?
            .set_default("port", 8080)?
            .set_default("log_level", "info")?
            .add_source(File::with_name("settings").required(false))
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::default().source(Some(map))
    }

    #[test]
    fn defaults_apply() {
        let settings = Settings::from_env(env(&[("MONGODB_URI", "mongodb://localhost:27017")])).unwrap();
        assert_eq!(settings.mongodb_uri, "mongodb://localhost:27017");
        assert_eq!(settings.database, "budget-buddy");
        assert_eq!(settings.bind, "0.0.0.0");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn environment_overrides() {
        let settings = Settings::from_env(env(&[
            ("MONGODB_URI", "mongodb://db:27017"),
            ("DATABASE", "wallet-way"),
            ("PORT", "9000"),
            ("LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(settings.database, "wallet-way");
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn mongodb_uri_is_required() {
        assert!(Settings::from_env(env(&[])).is_err());
    }
}
