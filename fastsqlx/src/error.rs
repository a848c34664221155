//! Error type with IntoResponse
//!
//! Errors are converted to JSON responses with appropriate status codes.
//! Database failures are logged and hidden behind a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing {key} in environment")]
    MissingConfig { key: String },

    #[error("invalid value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    #[error("unsupported database url scheme '{scheme}'")]
    UnsupportedBackend { scheme: String },

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("failed to reflect table '{table}': {source}")]
    Reflect {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid pagination parameters: {0}")]
    Pagination(String),

    #[error("session layer is not installed on this router")]
    SessionLayerMissing,

    #[error("session is already held by another extractor")]
    SessionBusy,
}

impl Error {
    /// True when the underlying database error is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Pagination(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Pagination(reason) => json!({
                "error": "validation_error",
                "message": reason,
            }),
            _ => {
                // Log the actual error, return generic message
                tracing::error!(error = %self, "request failed");
                json!({
                    "error": "internal_error",
                    "message": "an internal error occurred",
                })
            }
        };

        (status, Json(body)).into_response()
    }
}
