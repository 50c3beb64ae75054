//! Error types for the request pipeline.
//!
//! DESIGN
//! ======
//! Every failure leaving the pipeline is an [`ApiError`] carrying a status
//! code, so callers match on one shape whether the socket failed or the
//! server answered with a non-2xx status. `status_code == 0` is reserved for
//! transport failures.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// Message used for every transport-level failure.
pub const NETWORK_ERROR_MESSAGE: &str = "Network Error";

/// Status reported when a success body has the wrong shape.
pub const UNEXPECTED_PAYLOAD_STATUS: u16 = 502;

/// Status reported when a request body cannot be encoded locally.
pub const INVALID_BODY_STATUS: u16 = 400;

/// Normalized pipeline error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (status {status_code})")]
pub struct ApiError {
    /// HTTP status, or `0` for a transport failure.
    pub status_code: u16,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self { status_code, message: message.into() }
    }

    /// Transport failure (DNS, refused connection, timeout, TLS).
    #[must_use]
    pub fn network() -> Self {
        Self::new(0, NETWORK_ERROR_MESSAGE)
    }

    /// Fallback message when a non-2xx body carries no usable `error` field.
    #[must_use]
    pub fn from_status(status_code: u16) -> Self {
        Self::new(status_code, format!("HTTP {status_code}"))
    }

    /// A 2xx payload that does not decode into the expected type.
    #[must_use]
    pub fn unexpected_payload(detail: &impl std::fmt::Display) -> Self {
        Self::new(UNEXPECTED_PAYLOAD_STATUS, format!("unexpected payload: {detail}"))
    }

    /// A request body that could not be encoded before sending.
    #[must_use]
    pub fn invalid_body(detail: &impl std::fmt::Display) -> Self {
        Self::new(INVALID_BODY_STATUS, format!("invalid request body: {detail}"))
    }

    #[must_use]
    pub fn is_network(&self) -> bool {
        self.status_code == 0
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status_code == 401
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status_code == 404
    }

    /// Stable machine-readable code for logs.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self.status_code {
            0 => "E_NETWORK",
            400 => "E_BAD_REQUEST",
            401 => "E_UNAUTHORIZED",
            403 => "E_FORBIDDEN",
            404 => "E_NOT_FOUND",
            409 => "E_CONFLICT",
            429 => "E_RATE_LIMITED",
            500..=599 => "E_SERVER",
            _ => "E_HTTP",
        }
    }

    /// Whether a query fetch may be retried after this error.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self.status_code, 0 | 408 | 429 | 500..=599)
    }
}

/// Failure raised by an [`HttpTransport`](super::transport::HttpTransport)
/// before a complete response was received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
}

impl From<TransportError> for ApiError {
    fn from(_: TransportError) -> Self {
        Self::network()
    }
}

/// The HTTP client backing the transport could not be constructed.
#[derive(Debug, thiserror::Error)]
#[error("HTTP client build failed: {0}")]
pub struct ClientBuildError(pub String);
