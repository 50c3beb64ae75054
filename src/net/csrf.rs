//! Anti-forgery token cache.
//!
//! Lifecycle: absent -> fetched on first mutating request -> reused ->
//! cleared on logout or explicit request -> fetched again on next need.
//! A token rejected by the server is not cleared here; the 403 reaches the
//! caller like any other error.

use std::sync::Mutex;

#[cfg(test)]
#[path = "csrf_test.rs"]
mod tests;

#[derive(Debug, Default)]
pub struct CsrfTokenCache {
    token: Mutex<Option<String>>,
}

impl CsrfTokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self, token: String) {
        *self
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(token);
    }

    /// Drop the cached token. Returns whether one was present.
    pub fn clear(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .is_some()
    }
}
