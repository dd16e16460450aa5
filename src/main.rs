use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::EnvFilter;

mod balance;
mod error;
mod exchange;
mod format;
mod reports;
mod routes;
mod schemas;
mod settings;
mod store;

use settings::Settings;
use store::Store;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::new().map_err(|err| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid configuration: {err}"),
        )
    })?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "budget_buddy={level},actix_web={level}",
            level = settings.log_level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Using database \"{}\"", settings.database);
    let store = Store::connect(&settings.mongodb_uri, &settings.database)
        .await
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    tracing::info!("Connected");

    let store = web::Data::new(store);
    tracing::info!("Listening on {}:{}", settings.bind, settings.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(store.clone())
            .configure(routes::configure)
    })
    .bind((settings.bind.as_str(), settings.port))?
    .run()
    .await
}
