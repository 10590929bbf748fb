//! Canonical error taxonomy (Component H).
//!
//! Every fallible path in the store, codec and policy layers ultimately
//! resolves to one of these kinds at the engine boundary. Nothing else
//! is allowed to reach an HTTP response — an error that doesn't already
//! fit one of these variants becomes [`ErrorKind::Internal`].

use std::time::Duration;

use http::StatusCode;

/// Canonical error kinds surfaced by the core, per the status-mapping
/// table in the protocol spec.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorKind {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("stream not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("offset before retention")]
    Gone,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("method not supported")]
    NotSupported,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Map to the HTTP status this kind carries, per the status table.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ErrorKind::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict(_) => StatusCode::CONFLICT,
            ErrorKind::Gone => StatusCode::GONE,
            ErrorKind::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::NotSupported => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The stable machine-readable `X-Error` token, when the status
    /// mapping calls for one.
    pub fn x_error(&self) -> Option<&'static str> {
        match self {
            ErrorKind::BadRequest(_) => Some("bad_request"),
            ErrorKind::RateLimited { .. } => Some("rate_limit_exceeded"),
            ErrorKind::Internal(_) => Some("internal_error"),
            _ => None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ErrorKind::Internal(msg.into())
    }
}
