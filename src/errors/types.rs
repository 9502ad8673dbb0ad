//! Error type definitions for media-hooks
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can reach the web layer.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Plugin-data store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Outbound client errors
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Web layer errors
    #[error("Web error: {0}")]
    Web(#[from] WebError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },
}

/// Plugin-data store specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query execution failures
    #[error("Query failed: {query} - {message}")]
    QueryFailed { query: String, message: String },

    /// Blob serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Migration failures
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed { version: String, message: String },
}

/// Outbound REST client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport level failure (connect, timeout, TLS)
    #[error("Request to {service} failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("HTTP error from {service}: {status} - {message}")]
    Http {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Unexpected response from {service}: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    /// Token or cookie rejected by the remote service
    #[error("Authentication expired for {service}: {message}")]
    AuthExpired {
        service: &'static str,
        message: String,
    },
}

/// Web layer specific errors
#[derive(Error, Debug)]
pub enum WebError {
    /// Invalid or missing webhook token
    #[error("Invalid authentication: {message}")]
    InvalidAuth { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Web(WebError::InvalidAuth { .. }) => StatusCode::UNAUTHORIZED,
            AppError::Client(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl StoreError {
    /// Create a query failed error
    pub fn query_failed<Q: Into<String>, M: Into<String>>(query: Q, message: M) -> Self {
        Self::QueryFailed {
            query: query.into(),
            message: message.into(),
        }
    }
}

impl ClientError {
    /// Wrap a transport error
    pub fn request(service: &'static str, source: reqwest::Error) -> Self {
        Self::Request { service, source }
    }

    /// Create an HTTP status error
    pub fn http<M: Into<String>>(service: &'static str, status: u16, message: M) -> Self {
        Self::Http {
            service,
            status,
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode<M: Into<String>>(service: &'static str, message: M) -> Self {
        Self::Decode {
            service,
            message: message.into(),
        }
    }

    /// Create an authentication expired error
    pub fn auth_expired<M: Into<String>>(service: &'static str, message: M) -> Self {
        Self::AuthExpired {
            service,
            message: message.into(),
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Transport failures, 408, 429 and 5xx are transient; everything else
    /// (auth, 4xx, malformed bodies) is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Request { source, .. } => !source.is_builder(),
            ClientError::Http { status, .. } => {
                *status == 408 || *status == 429 || (500..=599).contains(status)
            }
            _ => false,
        }
    }
}

impl WebError {
    /// Create an invalid authentication error
    pub fn invalid_auth<M: Into<String>>(message: M) -> Self {
        Self::InvalidAuth {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(ClientError::http("bangumi", 503, "unavailable").is_retryable());
        assert!(ClientError::http("bangumi", 429, "slow down").is_retryable());
        assert!(ClientError::http("tmdb", 408, "timeout").is_retryable());
        assert!(!ClientError::http("tmdb", 404, "missing").is_retryable());
        assert!(!ClientError::auth_expired("douban", "ck missing").is_retryable());
        assert!(!ClientError::decode("bangumi", "bad json").is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::not_found("plugin", "x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(WebError::invalid_auth("bad token")).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::validation("nope").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(StoreError::query_failed("select", "locked")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(ClientError::http("bangumi", 503, "down")).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
