//! Session state machine.
//!
//! DESIGN
//! ======
//! The session is a `(status, user)` pair held in a `watch` channel. Every
//! status change is a check-and-set inside `send_if_modified`, validated
//! against [`AuthStatus::can_transition_to`], so two overlapping operations
//! cannot both move the machine out of the same state.
//!
//! `check_auth` additionally owns a re-entrancy flag: a second caller that
//! arrives while a probe is in flight waits for that probe's terminal status
//! instead of issuing its own round trip.
//!
//! FAILURE POLICY
//! ==============
//! - `check_auth` never fails. Probe errors are logged and end in `LoggedOut`.
//! - `login` / `register` end in `LoggedOut` on error and return the error.
//! - `logout` restores the exact pre-call session on error and returns it;
//!   the server may still consider the session valid.
//!
//! Any identity change clears the anti-forgery token and the whole query
//! cache before the new status is published.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::{QueryCache, helpers};
use crate::net::api::ApiClient;
use crate::net::error::ApiError;
use crate::net::types::{Credentials, Registration, User};
use crate::services::auth;

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

// =============================================================================
// STATUS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    /// Process start; nothing has been probed yet.
    Unknown,
    Checking,
    LoggingIn,
    LoggingOut,
    LoggedIn,
    LoggedOut,
}

impl AuthStatus {
    /// The transition table. `Unknown` is never re-entered.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use AuthStatus::{Checking, LoggedIn, LoggedOut, LoggingIn, LoggingOut, Unknown};
        matches!(
            (self, next),
            (Unknown | LoggedIn | LoggedOut, Checking)
                | (Checking | LoggingIn | LoggingOut, LoggedOut)
                | (Checking | LoggingIn | LoggingOut, LoggedIn)
                | (Unknown | LoggedOut, LoggingIn)
                | (LoggedIn, LoggingOut)
        )
    }

    /// A network round trip owned by the state machine is in flight.
    #[must_use]
    pub fn is_transitioning(self) -> bool {
        matches!(self, Self::Checking | Self::LoggingIn | Self::LoggingOut)
    }
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub status: AuthStatus,
    pub user: Option<User>,
}

impl Default for Session {
    fn default() -> Self {
        Self { status: AuthStatus::Unknown, user: None }
    }
}

/// Clears the re-entrancy flag however `check_auth` exits.
struct CheckGuard<'a>(&'a AtomicBool);

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct SessionManager {
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
    state: watch::Sender<Session>,
    checking: AtomicBool,
}

impl SessionManager {
    #[must_use]
    pub fn new(api: Arc<ApiClient>, cache: Arc<QueryCache>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self { api, cache, state, checking: AtomicBool::new(false) }
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.state.borrow().status
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status() == AuthStatus::LoggedIn
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    /// Atomically move into `next` if the current status satisfies `allowed`
    /// and the table permits it. Returns the session as it was before, or the
    /// current status on refusal.
    fn begin(&self, next: AuthStatus, allowed: impl Fn(AuthStatus) -> bool) -> Result<Session, AuthStatus> {
        let mut outcome = Err(AuthStatus::Unknown);
        self.state.send_if_modified(|session| {
            if allowed(session.status) && session.status.can_transition_to(next) {
                outcome = Ok(session.clone());
                session.status = next;
                true
            } else {
                outcome = Err(session.status);
                false
            }
        });
        outcome
    }

    /// Leave a transitioning status for `next`, replacing the user.
    fn finish(&self, next: AuthStatus, user: Option<User>) {
        self.state.send_if_modified(|session| {
            let legal = session.status.can_transition_to(next);
            if !legal {
                error!(from = ?session.status, to = ?next, "illegal session transition rejected");
                debug_assert!(legal, "illegal session transition {:?} -> {next:?}", session.status);
                return false;
            }
            debug!(from = ?session.status, to = ?next, "session transition");
            session.status = next;
            session.user = user;
            true
        });
    }

    /// Drop per-identity client state: the token bound to the previous
    /// session and every cached entity.
    fn reset_identity(&self) {
        self.api.clear_csrf_token();
        helpers::clear_all_caches(&self.cache);
    }

    // -------------------------------------------------------------------------
    // check_auth
    // -------------------------------------------------------------------------

    /// Probe the server for the current session. Never fails; returns the
    /// resulting status.
    pub async fn check_auth(&self) -> AuthStatus {
        if self
            .checking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.wait_for_check().await;
        }
        let _guard = CheckGuard(&self.checking);

        if let Err(status) = self.begin(AuthStatus::Checking, |_| true) {
            debug!(?status, "auth check skipped");
            return status;
        }

        match self.probe().await {
            Ok(Some(user)) => {
                info!(user_id = %user.id, "session valid");
                self.finish(AuthStatus::LoggedIn, Some(user));
            }
            Ok(None) => {
                info!("session valid but no user, treating as logged out");
                self.finish(AuthStatus::LoggedOut, None);
            }
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "auth check failed");
                self.finish(AuthStatus::LoggedOut, None);
            }
        }
        self.status()
    }

    async fn probe(&self) -> Result<Option<User>, ApiError> {
        auth::validate(&self.api).await?;
        auth::whoami(&self.api).await
    }

    async fn wait_for_check(&self) -> AuthStatus {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|session| session.status != AuthStatus::Checking).await {
            Ok(session) => session.status,
            Err(_) => self.status(),
        }
    }

    // -------------------------------------------------------------------------
    // login / register / logout
    // -------------------------------------------------------------------------

    /// Log in. Returns `Ok(None)` without a network call when already
    /// authenticated or mid-transition.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error after moving to `LoggedOut`.
    pub async fn login(&self, credentials: &Credentials) -> Result<Option<User>, ApiError> {
        self.authenticate("login", auth::login(&self.api, credentials)).await
    }

    /// Create an account and log in. Same transitions as [`Self::login`].
    ///
    /// # Errors
    ///
    /// Returns the pipeline error after moving to `LoggedOut`.
    pub async fn register(&self, registration: &Registration) -> Result<Option<User>, ApiError> {
        self.authenticate("register", auth::register(&self.api, registration)).await
    }

    async fn authenticate<F>(&self, action: &'static str, call: F) -> Result<Option<User>, ApiError>
    where
        F: Future<Output = Result<Option<User>, ApiError>>,
    {
        if let Err(status) = self.begin(AuthStatus::LoggingIn, |status| {
            matches!(status, AuthStatus::Unknown | AuthStatus::LoggedOut)
        }) {
            debug!(action, ?status, "ignored, session busy or already authenticated");
            return Ok(None);
        }

        match call.await {
            Ok(Some(user)) => {
                self.reset_identity();
                self.finish(AuthStatus::LoggedIn, Some(user.clone()));
                info!(action, user_id = %user.id, "logged in");
                if let Err(err) = self.api.ensure_csrf_token().await {
                    warn!(error = %err, "csrf token prefetch failed");
                }
                Ok(Some(user))
            }
            Ok(None) => {
                warn!(action, "server returned no user");
                self.finish(AuthStatus::LoggedOut, None);
                Ok(None)
            }
            Err(err) => {
                info!(action, status_code = err.status_code, "authentication failed");
                self.finish(AuthStatus::LoggedOut, None);
                Err(err)
            }
        }
    }

    /// Log out. No-op unless currently logged in.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error after restoring the pre-call session.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let previous = match self.begin(AuthStatus::LoggingOut, |status| status == AuthStatus::LoggedIn) {
            Ok(previous) => previous,
            Err(status) => {
                debug!(?status, "logout ignored, not logged in");
                return Ok(());
            }
        };

        match auth::logout(&self.api).await {
            Ok(()) => {
                self.reset_identity();
                self.finish(AuthStatus::LoggedOut, None);
                info!("logged out");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "logout rejected, keeping session");
                self.finish(previous.status, previous.user);
                Err(err)
            }
        }
    }
}
