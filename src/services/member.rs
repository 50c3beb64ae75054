//! Household membership: listing, role changes, removal.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::helpers;
use crate::cache::keys;
use crate::cache::{QueryCache, QueryOptions};
use crate::net::api::ApiClient;
use crate::net::error::ApiError;
use crate::net::types::{Member, Role, RoleInput};

#[cfg(test)]
#[path = "member_test.rs"]
mod tests;

fn members_path(household_id: &str) -> String {
    format!("/households/{household_id}/members")
}

fn member_path(household_id: &str, user_id: &str) -> String {
    format!("/households/{household_id}/members/{user_id}")
}

pub struct MemberService {
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
    options: QueryOptions,
}

impl MemberService {
    #[must_use]
    pub fn new(api: Arc<ApiClient>, cache: Arc<QueryCache>, stale_time: Duration) -> Self {
        let options = cache.defaults().with_stale_time(stale_time);
        Self { api, cache, options }
    }

    /// # Errors
    ///
    /// Returns the fetch error after retries.
    pub async fn get_members(&self, household_id: &str) -> Result<Vec<Member>, ApiError> {
        let path = members_path(household_id);
        self.cache
            .fetch_query(&keys::household_members(household_id), &self.options, || async {
                Ok(self.api.get::<Vec<Member>>(&path).await?.into_data().unwrap_or_default())
            })
            .await
    }

    /// Change a member's role and patch the cached member list.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error; the cache is untouched on failure.
    pub async fn update_member_role(
        &self,
        household_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<Option<Member>, ApiError> {
        let updated = self
            .api
            .put::<Member, _>(&member_path(household_id, user_id), &RoleInput { role })
            .await?
            .into_data();
        match &updated {
            Some(member) => helpers::replace_member(&self.cache, household_id, member),
            None => helpers::set_member_role(&self.cache, household_id, user_id, role),
        }
        // The caller may have changed their own role, which lives on the list rows.
        helpers::invalidate_households_list(&self.cache);
        tracing::info!(household_id, user_id, role = role.as_str(), "member role updated");
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns the pipeline error; the cache is untouched on failure.
    pub async fn remove_member(&self, household_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.api
            .delete::<Value>(&member_path(household_id, user_id))
            .await?;
        tracing::info!(household_id, user_id, "member removed");
        helpers::remove_member(&self.cache, household_id, user_id);
        Ok(())
    }

    /// Force the next read of the member list to refetch.
    pub fn refresh_members(&self, household_id: &str) {
        helpers::invalidate_members(&self.cache, household_id);
    }
}
