//! Household reads and mutations.
//!
//! Reads go through the query cache with the household staleness window.
//! Creates insert directly, updates are optimistic with snapshot rollback,
//! deletes drop the household's whole key scope.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::helpers;
use crate::cache::keys;
use crate::cache::{QueryCache, QueryOptions};
use crate::net::api::ApiClient;
use crate::net::error::ApiError;
use crate::net::types::{Household, HouseholdInput};

#[cfg(test)]
#[path = "household_test.rs"]
mod tests;

fn household_path(id: &str) -> String {
    format!("/households/{id}")
}

pub struct HouseholdService {
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
    options: QueryOptions,
}

impl HouseholdService {
    #[must_use]
    pub fn new(api: Arc<ApiClient>, cache: Arc<QueryCache>, stale_time: Duration) -> Self {
        let options = cache.defaults().with_stale_time(stale_time);
        Self { api, cache, options }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// The caller's households. A missing payload is an empty list.
    ///
    /// # Errors
    ///
    /// Returns the fetch error after retries.
    pub async fn get_households(&self) -> Result<Vec<Household>, ApiError> {
        self.cache
            .fetch_query(&keys::households(), &self.options, || async {
                let resp = self.api.get::<Vec<Household>>("/households").await?;
                Ok(resp.into_data().unwrap_or_default())
            })
            .await
    }

    /// One household. A 2xx without payload is reported as not found.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; 404 when the household is unknown or not
    /// visible to the caller.
    pub async fn get_household(&self, id: &str) -> Result<Household, ApiError> {
        let path = household_path(id);
        self.cache
            .fetch_query(&keys::household(id), &self.options, || async {
                self.api
                    .get::<Household>(&path)
                    .await?
                    .into_data()
                    .ok_or_else(|| ApiError::new(404, "Household not found"))
            })
            .await
    }

    /// Create a household and make it visible in the cached list immediately.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error; the cache is untouched on failure.
    pub async fn create_household(&self, name: &str, description: Option<&str>) -> Result<Option<Household>, ApiError> {
        let input = HouseholdInput { name, description };
        let created = self
            .api
            .post::<Household, _>("/households", &input)
            .await?
            .into_data();
        match &created {
            Some(household) => {
                tracing::info!(household_id = %household.id, "household created");
                helpers::insert_household(&self.cache, household);
            }
            None => helpers::invalidate_households_list(&self.cache),
        }
        Ok(created)
    }

    /// Rename or re-describe a household. The new values are shown before the
    /// server answers and rolled back exactly if it fails.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error after restoring the pre-call cache values.
    pub async fn update_household(
        &self,
        id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<Household>, ApiError> {
        let (detail, list) = helpers::apply_optimistic_household(&self.cache, id, |household| {
            household.name = name.to_owned();
            household.description = description.map(ToOwned::to_owned);
        });

        let input = HouseholdInput { name, description };
        match self.api.put::<Household, _>(&household_path(id), &input).await {
            Ok(resp) => {
                let updated = resp.into_data();
                match &updated {
                    Some(household) => helpers::set_household(&self.cache, household),
                    None => {
                        helpers::invalidate_household(&self.cache, id);
                        helpers::invalidate_households_list(&self.cache);
                    }
                }
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(household_id = id, error = %err, "household update failed");
                helpers::rollback(&self.cache, detail);
                helpers::rollback(&self.cache, list);
                Err(err)
            }
        }
    }

    /// # Errors
    ///
    /// Returns the pipeline error; the cache is untouched on failure.
    pub async fn delete_household(&self, id: &str) -> Result<(), ApiError> {
        self.api.delete::<Value>(&household_path(id)).await?;
        tracing::info!(household_id = id, "household deleted");
        helpers::remove_household(&self.cache, id);
        Ok(())
    }
}
