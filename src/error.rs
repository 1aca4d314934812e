//!
//! Error handling for the Cloud Code proxy.
//!
//! Defines all error types used throughout the application using thiserror
//! for ergonomic error handling, and maps them onto the JSON error envelope
//! and HTTP status codes clients see at the wire.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/* --- types ----------------------------------------------------------------------------------- */

///
/// Application error types following Rust best practices.
///
/// One variant per error kind named in the error-handling design: malformed
/// requests, auth failures, upstream failures, the retriable empty-response
/// condition, idle-stream timeout, client cancellation, and a catch-all.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid bearer token")]
    Unauthorized,

    #[error("upstream returned an error: {0}")]
    UpstreamFailure(String),

    #[error("upstream stream produced no content")]
    EmptyResponse,

    #[error("upstream stream idle for {idle_secs}s (chunks={chunks}, bytes={bytes})")]
    StreamIdleTimeout {
        idle_secs: u64,
        chunks: u64,
        bytes: u64,
    },

    #[error("client cancelled the request")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/* --- start of code -------------------------------------------------------------------------- */

/// Result type alias for cleaner error handling throughout the application
pub type Result<T> = std::result::Result<T, ProxyError>;

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::BadRequest(format!("invalid JSON: {err}"))
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::UpstreamFailure(err.to_string())
    }
}

impl ProxyError {
    /// HTTP status code this error kind maps to (§7: 400/401/408/502/500).
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            ProxyError::EmptyResponse => StatusCode::BAD_GATEWAY,
            ProxyError::StreamIdleTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ProxyError::Cancelled => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire-level error type string used in the JSON error envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "invalid_request_error",
            ProxyError::Unauthorized => "authentication_error",
            ProxyError::UpstreamFailure(_) => "upstream_error",
            ProxyError::EmptyResponse => "empty_response_error",
            ProxyError::StreamIdleTimeout { .. } => "stream_idle_timeout",
            ProxyError::Cancelled => "cancelled",
            ProxyError::Internal(_) => "internal_error",
        }
    }

    /// Build the `{type, error: {type, message}}` body documented for non-streaming
    /// failures, and the inner `{type: "error", error: {...}}` shape used for the
    /// terminal SSE event emitted after `message_start`.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "error",
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        })
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
