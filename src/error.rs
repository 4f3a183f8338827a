use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io;

/// Custom error type for simple_code_review operations
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Webhook authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid JSON")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("Invalid Payload")]
    InvalidPayload { details: serde_json::Value },

    #[error("AI analysis failed: {0}")]
    Analysis(String),

    #[error("Upstream request failed{}: {message}", status_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl ReviewError {
    /// Builds an `Upstream` error from a reqwest failure, keeping the HTTP status
    /// when reqwest reports one.
    pub fn transport(context: &str, err: reqwest::Error) -> Self {
        ReviewError::Upstream {
            status: err.status().map(|s| s.as_u16()),
            message: format!("{context}: {err}"),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ReviewError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ReviewError::MalformedPayload(_) | ReviewError::InvalidPayload { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ReviewError::Authentication(_) | ReviewError::MalformedPayload(_) => {
                json!({ "error": self.to_string() })
            }
            ReviewError::InvalidPayload { details } => {
                json!({ "error": self.to_string(), "details": details })
            }
            other => json!({ "error": "Internal Server Error", "details": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Helper type for Results that use ReviewError
pub type Result<T> = std::result::Result<T, ReviewError>;
