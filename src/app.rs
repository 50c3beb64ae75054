//! Wiring for the client core.
//!
//! DESIGN
//! ======
//! `App` owns one instance of each shared component: the request pipeline
//! (and with it the anti-forgery token), the query cache, the session state
//! machine, the domain services and the household context. Components share
//! the pipeline and cache through `Arc`, so cloning a handle never forks
//! state.

use std::sync::Arc;

use crate::cache::{QueryCache, QueryOptions};
use crate::config::ClientConfig;
use crate::net::api::ApiClient;
use crate::net::error::ClientBuildError;
use crate::net::transport::{HttpTransport, ReqwestTransport};
use crate::services::{HouseholdService, InvitationService, MemberService};
use crate::state::{HouseholdContext, SessionManager};

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;

pub struct App {
    pub config: ClientConfig,
    pub api: Arc<ApiClient>,
    pub cache: Arc<QueryCache>,
    pub session: Arc<SessionManager>,
    pub households: Arc<HouseholdService>,
    pub members: Arc<MemberService>,
    pub invitations: Arc<InvitationService>,
    pub context: Arc<HouseholdContext>,
}

impl App {
    /// Build the core over a real HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientBuildError> {
        let transport = ReqwestTransport::new(config.timeouts)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let api = Arc::new(ApiClient::new(transport, config.base_url.clone()));
        let cache = Arc::new(QueryCache::new(QueryOptions {
            retry: config.query_retry,
            ..QueryOptions::default()
        }));
        let stale_time = config.household_stale_time();

        let session = Arc::new(SessionManager::new(api.clone(), cache.clone()));
        let households = Arc::new(HouseholdService::new(api.clone(), cache.clone(), stale_time));
        let members = Arc::new(MemberService::new(api.clone(), cache.clone(), stale_time));
        let invitations = Arc::new(InvitationService::new(api.clone(), cache.clone(), stale_time));
        let context = Arc::new(HouseholdContext::new(session.clone(), households.clone()));

        tracing::debug!(base_url = %config.base_url, "client core initialized");
        Self { config, api, cache, session, households, members, invitations, context }
    }
}
