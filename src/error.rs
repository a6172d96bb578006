// src/error.rs

//! Unified error handling for the review site backend.

use std::fmt;

use thiserror::Error;

/// Result type alias for site operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A row that was asked for by key does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Missing or rejected credentials
    #[error("Authentication required")]
    Unauthorized,

    /// Authenticated but not allowed to touch the row
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unique constraint violation reported by the backend
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend asked us to slow down
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Backend returned a non-success status
    #[error("Backend API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error for an entity and lookup key.
    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an upstream API error.
    pub fn api(status: u16, message: impl fmt::Display) -> Self {
        Self::Api {
            status,
            message: message.to_string(),
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Transport failures, rate limiting and 5xx responses are transient.
    /// Everything else is a property of the request itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_decode() && !e.is_builder(),
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(feature = "server")]
mod response {
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };

    use super::AppError;

    impl AppError {
        /// HTTP status this error is reported with.
        pub fn status_code(&self) -> StatusCode {
            match self {
                AppError::Validation(_) => StatusCode::BAD_REQUEST,
                AppError::Unauthorized => StatusCode::UNAUTHORIZED,
                AppError::Forbidden(_) => StatusCode::FORBIDDEN,
                AppError::NotFound { .. } => StatusCode::NOT_FOUND,
                AppError::Conflict(_) => StatusCode::CONFLICT,
                AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                AppError::Api { .. } | AppError::Http(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status = self.status_code();
            if status.is_server_error() {
                tracing::error!(error = %self, "request failed");
            }

            let body = Json(serde_json::json!({ "error": self.to_string() }));
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::api(503, "unavailable").is_retryable());
        assert!(AppError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(!AppError::api(400, "bad filter").is_retryable());
        assert!(!AppError::validation("empty").is_retryable());
        assert!(!AppError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = AppError::not_found("review", "best-laptop");
        assert_eq!(err.to_string(), "review not found: best-laptop");
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_status_codes() {
        use axum::http::StatusCode;

        assert_eq!(
            AppError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::not_found("category", "tv").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::api(500, "x").status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::config("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
