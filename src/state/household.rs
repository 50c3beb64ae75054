//! Active-household selection.
//!
//! Tracks which household the user is working in and the values derived from
//! it. Network-backed fields go through the query cache and are only fetched
//! while the session is logged in. A background task started with
//! [`HouseholdContext::spawn`] keeps the published snapshot current as the
//! session, the selection or the cache change.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::auth::{AuthStatus, SessionManager};
use crate::cache::keys;
use crate::net::types::{Household, Role, User};
use crate::services::HouseholdService;

#[cfg(test)]
#[path = "household_test.rs"]
mod tests;

/// Everything a view needs about the active household.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HouseholdSnapshot {
    pub active_household_id: Option<String>,
    pub user_households: Vec<Household>,
    pub active_household: Option<Household>,
    pub current_role: Option<Role>,
    pub can_manage_household: bool,
}

impl HouseholdSnapshot {
    fn derive(
        active_household_id: Option<String>,
        user_households: Vec<Household>,
        active_household: Option<Household>,
    ) -> Self {
        let current_role = role_for(&user_households, active_household_id.as_deref());
        Self {
            active_household_id,
            user_households,
            active_household,
            current_role,
            can_manage_household: current_role.is_some_and(Role::can_manage),
        }
    }
}

/// Initial selection: the user's stored default if it is in the list, the
/// first household if there is no default, otherwise nothing.
#[must_use]
pub fn select_default_household(user: Option<&User>, households: &[Household]) -> Option<String> {
    match user.and_then(|u| u.default_household_id.as_deref()) {
        Some(default_id) => households
            .iter()
            .find(|h| h.id == default_id)
            .map(|h| h.id.clone()),
        None => households.first().map(|h| h.id.clone()),
    }
}

/// Role of the caller in the household with `id`, if it is in the list.
#[must_use]
pub fn role_for(households: &[Household], id: Option<&str>) -> Option<Role> {
    let id = id?;
    households.iter().find(|h| h.id == id).map(|h| h.user_role)
}

// =============================================================================
// CONTEXT
// =============================================================================

pub struct HouseholdContext {
    session: Arc<SessionManager>,
    households: Arc<HouseholdService>,
    active: watch::Sender<Option<String>>,
    snapshot: watch::Sender<HouseholdSnapshot>,
    /// User the current selection was made for.
    selected_for: Mutex<Option<String>>,
}

impl HouseholdContext {
    #[must_use]
    pub fn new(session: Arc<SessionManager>, households: Arc<HouseholdService>) -> Self {
        let (active, _) = watch::channel(None);
        let (snapshot, _) = watch::channel(HouseholdSnapshot::default());
        Self { session, households, active, snapshot, selected_for: Mutex::new(None) }
    }

    #[must_use]
    pub fn snapshot(&self) -> HouseholdSnapshot {
        self.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HouseholdSnapshot> {
        self.snapshot.subscribe()
    }

    #[must_use]
    pub fn active_household_id(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    #[must_use]
    pub fn current_role(&self) -> Option<Role> {
        self.snapshot.borrow().current_role
    }

    #[must_use]
    pub fn can_manage_household(&self) -> bool {
        self.snapshot.borrow().can_manage_household
    }

    /// Select a household. Membership is not checked here; an unknown id
    /// surfaces as a failed detail fetch on the next refresh.
    pub fn switch_household(&self, id: impl Into<String>) {
        let id = id.into();
        debug!(household_id = %id, "switching household");
        let cached = self.households.cache().get_query_data(&keys::household(&id));
        *self.owner() = self.session.user().map(|u| u.id);
        self.active.send_replace(Some(id.clone()));
        self.snapshot.send_modify(|snapshot| {
            let user_households = std::mem::take(&mut snapshot.user_households);
            *snapshot = HouseholdSnapshot::derive(Some(id), user_households, cached);
        });
    }

    fn set_active(&self, id: Option<String>) {
        self.active.send_if_modified(|current| {
            if *current == id {
                return false;
            }
            current.clone_from(&id);
            true
        });
    }

    fn owner(&self) -> MutexGuard<'_, Option<String>> {
        self.selected_for.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the selection and snapshot, and record who the next selection
    /// belongs to.
    fn reset(&self, owner: Option<String>) {
        *self.owner() = owner;
        self.set_active(None);
        self.snapshot.send_if_modified(|snapshot| {
            let changed = *snapshot != HouseholdSnapshot::default();
            *snapshot = HouseholdSnapshot::default();
            changed
        });
    }

    /// Recompute and publish the snapshot.
    ///
    /// Logged out: the selection is cleared. Transitional states: the last
    /// snapshot is kept and nothing is fetched. Logged in: the household list
    /// and the active household are read through the cache. A selection made
    /// for a different user is discarded first.
    pub async fn refresh(&self) -> HouseholdSnapshot {
        let session = self.session.session();
        match session.status {
            AuthStatus::LoggedIn => {}
            AuthStatus::LoggedOut => {
                self.reset(None);
                return self.snapshot();
            }
            _ => return self.snapshot(),
        }

        let user_id = session.user.as_ref().map(|u| u.id.clone());
        let user_changed = *self.owner() != user_id;
        if user_changed {
            debug!(user_id = ?user_id, "session user changed, dropping selection");
            self.reset(user_id);
        }

        let user_households = match self.households.get_households().await {
            Ok(list) => list,
            Err(err) => {
                warn!(error = %err, "household list fetch failed");
                self.snapshot.borrow().user_households.clone()
            }
        };

        let active_id = match self.active_household_id() {
            Some(id) => Some(id),
            None => {
                let selected = select_default_household(session.user.as_ref(), &user_households);
                if selected.is_none() && !user_households.is_empty() {
                    debug!("stored default household not in list, leaving selection empty");
                }
                self.set_active(selected.clone());
                selected
            }
        };

        let active_household = match active_id.as_deref() {
            Some(id) => match self.households.get_household(id).await {
                Ok(household) => Some(household),
                Err(err) => {
                    warn!(household_id = id, error = %err, "active household fetch failed");
                    None
                }
            },
            None => None,
        };

        let next = HouseholdSnapshot::derive(active_id, user_households, active_household);
        self.snapshot.send_if_modified(|snapshot| {
            if *snapshot == next {
                return false;
            }
            *snapshot = next.clone();
            true
        });
        next
    }

    /// Spawn the task that refreshes on every session, selection or cache
    /// change. Returns a handle for shutdown.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let context = Arc::clone(self);
        tokio::spawn(async move {
            let mut session = context.session.subscribe();
            let mut cache = context.households.cache().subscribe();
            let mut active = context.active.subscribe();
            context.refresh().await;
            loop {
                let changed = tokio::select! {
                    changed = session.changed() => changed,
                    changed = cache.changed() => changed,
                    changed = active.changed() => changed,
                };
                if changed.is_err() {
                    debug!("household context source closed");
                    break;
                }
                // Coalesce changes that arrived together into one refresh.
                session.borrow_and_update();
                cache.borrow_and_update();
                active.borrow_and_update();
                context.refresh().await;
            }
        })
    }
}
