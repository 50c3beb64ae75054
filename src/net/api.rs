//! Request pipeline for the household API.
//!
//! Every call goes through [`ApiClient::request`]:
//! 1. merge caller options with the JSON content-type default,
//! 2. attach `X-CSRF-Token` to mutating requests outside the auth bootstrap
//!    endpoints, fetching the token first when none is cached,
//! 3. send through the transport, collapsing transport failures into
//!    [`ApiError::network`],
//! 4. turn non-2xx responses into [`ApiError`] using the `{error}` body when
//!    present,
//! 5. decode 2xx bodies into [`ApiResponse`], treating empty or unparseable
//!    bodies as an envelope without payload and a payload of the wrong shape
//!    as [`ApiError::unexpected_payload`].
//!
//! The token fetch in step 2 uses the same send path minus step 2 itself.
//!
//! ERROR HANDLING
//! ==============
//! The pipeline never returns a half-decoded success: callers either get an
//! envelope (possibly empty) or an `ApiError` with a populated status code.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;

use super::csrf::CsrfTokenCache;
use super::error::{ApiError, ClientBuildError};
use super::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
use super::types::{ApiResponse, CsrfTokenResponse, ErrorBody};

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

pub const CSRF_HEADER: &str = "X-CSRF-Token";
pub const CSRF_TOKEN_ENDPOINT: &str = "/auth/csrf-token";

/// Auth endpoints that never carry the anti-forgery token. Fetching the token
/// itself must not require one.
const CSRF_EXEMPT_ENDPOINTS: [&str; 5] =
    ["/auth/login", "/auth/register", "/auth/logout", "/auth/validate", CSRF_TOKEN_ENDPOINT];

// =============================================================================
// REQUEST OPTIONS
// =============================================================================

/// Caller-supplied request options. Headers given here override defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn delete() -> Self {
        Self { method: Method::DELETE, ..Self::default() }
    }

    /// Options for a method carrying a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be encoded as JSON.
    pub fn with_json<B: Serialize + ?Sized>(method: Method, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::invalid_body(&e))?;
        Ok(Self { method, body: Some(body), headers: Vec::new() })
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// `POST | PUT | PATCH | DELETE`.
#[must_use]
pub fn is_mutating(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH || *method == Method::DELETE
}

fn endpoint_path(endpoint: &str) -> &str {
    endpoint.split(['?', '#']).next().unwrap_or(endpoint)
}

/// Whether a request must carry the anti-forgery token.
#[must_use]
pub fn requires_csrf(method: &Method, endpoint: &str) -> bool {
    is_mutating(method) && !CSRF_EXEMPT_ENDPOINTS.contains(&endpoint_path(endpoint))
}

/// Merge caller headers over the defaults, replacing same-named entries.
fn merge_headers(caller: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut headers = vec![("Content-Type".to_owned(), "application/json".to_owned())];
    for (name, value) in caller {
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        headers.push((name, value));
    }
    headers
}

fn error_message(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => ApiError::new(status, parsed.error),
        Err(_) => ApiError::from_status(status),
    }
}

/// Decode a 2xx body. Empty, unparseable or empty-object payloads become
/// `data: None`; a non-empty payload of the wrong shape is an error.
fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<ApiResponse<T>, ApiError> {
    if body.trim().is_empty() {
        return Ok(ApiResponse::default());
    }
    let envelope = match serde_json::from_str::<ApiResponse<Value>>(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable success body, treating as empty");
            return Ok(ApiResponse::default());
        }
    };
    let data = match envelope.data.filter(has_payload) {
        Some(value) => Some(serde_json::from_value::<T>(value).map_err(|e| {
            tracing::warn!(error = %e, "response payload did not match expected shape");
            ApiError::unexpected_payload(&e)
        })?),
        None => None,
    };
    Ok(ApiResponse { data, message: envelope.message })
}

fn has_payload(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    csrf: CsrfTokenCache,
}

impl ApiClient {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { transport, base_url, csrf: CsrfTokenCache::new() }
    }

    /// Build a client backed by [`ReqwestTransport`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientBuildError> {
        let transport = ReqwestTransport::new(config.timeouts)?;
        Ok(Self::new(Arc::new(transport), config.base_url.clone()))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and decode the `{data, message}` envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] with status `0` on transport failure, or the HTTP
    /// status for non-2xx responses (including a failed token fetch).
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, ApiError> {
        let response = self.execute(endpoint, options).await?;
        decode_envelope(&response.body)
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiResponse<T>, ApiError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(endpoint, RequestOptions::with_json(Method::POST, body)?)
            .await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(endpoint, RequestOptions::with_json(Method::PUT, body)?)
            .await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiResponse<T>, ApiError> {
        self.request(endpoint, RequestOptions::delete()).await
    }

    /// Currently cached anti-forgery token, if any.
    #[must_use]
    pub fn csrf_token(&self) -> Option<String> {
        self.csrf.get()
    }

    /// Forget the cached token; the next mutating request fetches a new one.
    pub fn clear_csrf_token(&self) {
        if self.csrf.clear() {
            tracing::debug!("csrf token cleared");
        }
    }

    /// Return the cached token or fetch and cache a new one.
    ///
    /// Concurrent first-use callers may each fetch; the last one stored wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint fails or omits the token.
    pub async fn ensure_csrf_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self.csrf.get() {
            return Ok(token);
        }
        let token = self.fetch_csrf_token().await?;
        self.csrf.store(token.clone());
        Ok(token)
    }

    async fn fetch_csrf_token(&self) -> Result<String, ApiError> {
        tracing::debug!("fetching csrf token");
        let response = self
            .send(CSRF_TOKEN_ENDPOINT, Method::GET, merge_headers(Vec::new()), None)
            .await?;
        if let Ok(parsed) = serde_json::from_str::<CsrfTokenResponse>(&response.body) {
            return Ok(parsed.csrf_token);
        }
        // Some deployments wrap the token in the standard envelope.
        decode_envelope::<CsrfTokenResponse>(&response.body)
            .ok()
            .and_then(ApiResponse::into_data)
            .map(|parsed| parsed.csrf_token)
            .ok_or_else(|| ApiError::new(response.status, "CSRF token missing from response"))
    }

    /// Attach the anti-forgery token when required, then send.
    async fn execute(&self, endpoint: &str, options: RequestOptions) -> Result<HttpResponse, ApiError> {
        let RequestOptions { method, body, headers } = options;
        let mut headers = merge_headers(headers);

        if requires_csrf(&method, endpoint) {
            let token = self.ensure_csrf_token().await?;
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case(CSRF_HEADER));
            headers.push((CSRF_HEADER.to_owned(), token));
        }

        self.send(endpoint, method, headers, body).await
    }

    /// One transport round trip with status mapping. Never touches the token.
    async fn send(
        &self,
        endpoint: &str,
        method: Method,
        headers: Vec<(String, String)>,
        body: Option<Value>,
    ) -> Result<HttpResponse, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!(%method, endpoint, "api request");
        let request = HttpRequest { method, url, headers, body };

        let response = self.transport.send(request).await.map_err(|e| {
            tracing::debug!(endpoint, error = %e, "transport failure");
            ApiError::from(e)
        })?;

        if !response.is_success() {
            let err = error_message(response.status, &response.body);
            tracing::debug!(endpoint, status = response.status, code = err.error_code(), "api error");
            return Err(err);
        }
        Ok(response)
    }
}
