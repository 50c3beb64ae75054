//! Auth endpoint calls. State transitions live in `state::auth`; these
//! functions only speak HTTP.

use serde_json::Value;

use crate::net::api::ApiClient;
use crate::net::error::ApiError;
use crate::net::types::{Credentials, Registration, User};

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

pub const LOGIN_ENDPOINT: &str = "/auth/login";
pub const REGISTER_ENDPOINT: &str = "/auth/register";
pub const LOGOUT_ENDPOINT: &str = "/auth/logout";
pub const WHOAMI_ENDPOINT: &str = "/auth/whoami";
pub const VALIDATE_ENDPOINT: &str = "/auth/validate";

/// `POST /auth/login`. `None` when the server accepted the call without
/// returning a user.
///
/// # Errors
///
/// Returns the pipeline error, e.g. 401 for bad credentials.
pub async fn login(api: &ApiClient, credentials: &Credentials) -> Result<Option<User>, ApiError> {
    Ok(api.post::<User, _>(LOGIN_ENDPOINT, credentials).await?.into_data())
}

/// `POST /auth/register`.
///
/// # Errors
///
/// Returns the pipeline error, e.g. 409 when the email is taken.
pub async fn register(api: &ApiClient, registration: &Registration) -> Result<Option<User>, ApiError> {
    Ok(api.post::<User, _>(REGISTER_ENDPOINT, registration).await?.into_data())
}

/// `POST /auth/logout`.
///
/// # Errors
///
/// Returns the pipeline error when the server rejects the call.
pub async fn logout(api: &ApiClient) -> Result<(), ApiError> {
    api.post::<Value, _>(LOGOUT_ENDPOINT, &serde_json::json!({})).await?;
    Ok(())
}

/// `GET /auth/validate`: succeeds iff the session cookie is valid.
///
/// # Errors
///
/// Returns 401 for an expired or missing session.
pub async fn validate(api: &ApiClient) -> Result<(), ApiError> {
    api.get::<Value>(VALIDATE_ENDPOINT).await?;
    Ok(())
}

/// `GET /auth/whoami`. An empty payload means no authenticated user.
///
/// # Errors
///
/// Returns the pipeline error.
pub async fn whoami(api: &ApiClient) -> Result<Option<User>, ApiError> {
    Ok(api.get::<User>(WHOAMI_ENDPOINT).await?.into_data())
}
