//! Core error type and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the coordination and replication core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("lease contended")]
    LeaseContended,

    #[error("lease lost")]
    LeaseLost,

    #[error("lease expired")]
    LeaseExpired,

    #[error("operation timed out")]
    Timeout,

    #[error("no live node served the blob")]
    Unavailable,

    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Returns the HTTP status this error should surface as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::AlreadyExists => StatusCode::CONFLICT,
            CoreError::Unavailable
            | CoreError::LeaseContended
            | CoreError::LeaseLost
            | CoreError::LeaseExpired
            | CoreError::Timeout
            | CoreError::Metadata(_)
            | CoreError::Io(_)
            | CoreError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound,
            std::io::ErrorKind::AlreadyExists => CoreError::AlreadyExists,
            _ => CoreError::Io(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => CoreError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                CoreError::AlreadyExists
            }
            other => CoreError::Metadata(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

/// Small JSON envelope returned by the external endpoints on error.
#[derive(Serialize)]
struct ErrorBody {
    err: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            err: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
