//! Errors raised by the balance engine and by the HTTP layer.
//!
//! - [`EngineError`] is returned by the pure computations in [`balance`].
//! - [`ApiError`] is what request handlers return; it maps every failure to a
//!   status code through actix's [`ResponseError`].
//!
//!  [`balance`]: crate::balance
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid group state: {0}")]
    InvalidGroupState(String),
    #[error("Invalid split: {0}")]
    InvalidSplit(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let Self::Database(err) = self {
            tracing::error!("database error: {err}");
        }
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
