//! Household invitations: issue, list, revoke, redeem.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::helpers;
use crate::cache::keys;
use crate::cache::{QueryCache, QueryOptions};
use crate::net::api::ApiClient;
use crate::net::error::ApiError;
use crate::net::types::{Household, Invitation, InvitationInput, RedeemInput, Role};

#[cfg(test)]
#[path = "invitation_test.rs"]
mod tests;

fn invitations_path(household_id: &str) -> String {
    format!("/households/{household_id}/invitations")
}

pub struct InvitationService {
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
    options: QueryOptions,
}

impl InvitationService {
    #[must_use]
    pub fn new(api: Arc<ApiClient>, cache: Arc<QueryCache>, stale_time: Duration) -> Self {
        let options = cache.defaults().with_stale_time(stale_time);
        Self { api, cache, options }
    }

    /// # Errors
    ///
    /// Returns the fetch error after retries.
    pub async fn get_invitations(&self, household_id: &str) -> Result<Vec<Invitation>, ApiError> {
        let path = invitations_path(household_id);
        self.cache
            .fetch_query(&keys::household_invitations(household_id), &self.options, || async {
                Ok(self.api.get::<Vec<Invitation>>(&path).await?.into_data().unwrap_or_default())
            })
            .await
    }

    /// # Errors
    ///
    /// Returns the pipeline error; the cache is untouched on failure.
    pub async fn create_invitation(
        &self,
        household_id: &str,
        email: Option<&str>,
        role: Role,
    ) -> Result<Option<Invitation>, ApiError> {
        let created = self
            .api
            .post::<Invitation, _>(&invitations_path(household_id), &InvitationInput { email, role })
            .await?
            .into_data();
        match &created {
            Some(invitation) => helpers::insert_invitation(&self.cache, invitation),
            None => helpers::invalidate_invitations(&self.cache, household_id),
        }
        Ok(created)
    }

    /// # Errors
    ///
    /// Returns the pipeline error; the cache is untouched on failure.
    pub async fn revoke_invitation(&self, household_id: &str, invitation_id: &str) -> Result<(), ApiError> {
        let path = format!("{}/{invitation_id}", invitations_path(household_id));
        self.api.delete::<Value>(&path).await?;
        helpers::remove_invitation(&self.cache, household_id, invitation_id);
        Ok(())
    }

    /// Join a household with an invitation code. Membership, invitation lists
    /// and member counts all change, so every household entry is invalidated
    /// instead of patched.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error, e.g. 404/410 for unknown or expired codes.
    pub async fn redeem_invitation(&self, code: &str) -> Result<Option<Household>, ApiError> {
        let joined = self
            .api
            .post::<Household, _>("/invitations/redeem", &RedeemInput { code: code.trim() })
            .await?
            .into_data();
        tracing::info!(household_id = joined.as_ref().map(|h| h.id.as_str()), "invitation redeemed");
        helpers::invitation_redeemed(&self.cache);
        Ok(joined)
    }
}
