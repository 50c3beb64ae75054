//! HTTP transport seam.
//!
//! ARCHITECTURE
//! ============
//! The request pipeline talks to an [`HttpTransport`] instead of a concrete
//! client so session and cache logic can be exercised against a scripted
//! transport. [`ReqwestTransport`] is the production implementation; its
//! cookie store carries the session cookie on every call, including
//! cross-origin ones.

use std::time::Duration;

use crate::config::Timeouts;

use super::error::{ClientBuildError, TransportError};

pub use reqwest::Method;

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;

/// Fully prepared request handed to the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response: status plus undecoded body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Only transport-level failures are errors; any HTTP
    /// status, including 4xx/5xx, is a successful [`HttpResponse`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a cookie-carrying client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying TLS/HTTP client fails to build.
    pub fn new(timeouts: Timeouts) -> Result<Self, ClientBuildError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ClientBuildError(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.http.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        // A body cut off mid-read is a transport failure, not an empty 2xx.
        let body = response.text().await.map_err(transport_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}
