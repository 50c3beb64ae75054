//! Household-domain cache consistency helpers.
//!
//! After a mutation succeeds the cache is brought back in line with the
//! server in one of two ways:
//! - direct replacement, when the response carries the complete entity: write
//!   the detail slot and patch the matching row of any cached list;
//! - invalidation, when the effect spans several entities (membership,
//!   invitations, member counts): mark the affected entries stale and let the
//!   next read refetch.
//!
//! Optimistic writes capture a [`Snapshot`] first and hand it back to
//! [`rollback`] on failure. Rollback is last-writer-wins for that one slot.

use super::keys::{self, KeyMatch};
use super::{QueryCache, Snapshot};
use crate::net::types::{Household, Invitation, Member, Role};

#[cfg(test)]
#[path = "helpers_test.rs"]
mod tests;

// =============================================================================
// HOUSEHOLDS
// =============================================================================

/// Replace one row of a cached household list by id. No-op when the list is
/// not cached or the row is absent.
fn patch_household_list(cache: &QueryCache, household: &Household) {
    cache.update_query_data(&keys::households(), |list| {
        for row in list.iter_mut().filter(|row| row.id == household.id) {
            *row = household.clone();
        }
    });
}

/// Direct replacement after a mutation returned the full household.
pub fn set_household(cache: &QueryCache, household: &Household) {
    cache.set_query_data(&keys::household(&household.id), household.clone());
    patch_household_list(cache, household);
}

/// Store a newly created household and append it to a cached list, so the
/// list shows it without a refetch.
pub fn insert_household(cache: &QueryCache, household: &Household) {
    cache.set_query_data(&keys::household(&household.id), household.clone());
    cache.update_query_data(&keys::households(), |list| {
        if !list.iter().any(|row| row.id == household.id) {
            list.push(household.clone());
        }
    });
}

/// Drop a household, all of its relations, and its list row.
pub fn remove_household(cache: &QueryCache, household_id: &str) {
    cache.remove(&keys::household_scope(household_id), KeyMatch::Prefix);
    cache.update_query_data(&keys::households(), |list| list.retain(|row| row.id != household_id));
}

/// Mark the household detail stale; relations are untouched.
pub fn invalidate_household(cache: &QueryCache, household_id: &str) {
    cache.invalidate(keys::household(household_id).key(), KeyMatch::Exact);
}

pub fn invalidate_households_list(cache: &QueryCache) {
    cache.invalidate(keys::households().key(), KeyMatch::Exact);
}

/// Write a predicted household into the detail slot and list row, returning
/// the pre-write snapshots needed to roll back.
pub fn apply_optimistic_household(
    cache: &QueryCache,
    household_id: &str,
    apply: impl Fn(&mut Household),
) -> (Snapshot<Household>, Snapshot<Vec<Household>>) {
    let detail = cache.snapshot(&keys::household(household_id));
    let list = cache.snapshot(&keys::households());

    cache.update_query_data(&keys::household(household_id), &apply);
    cache.update_query_data(&keys::households(), |rows| {
        for row in rows.iter_mut().filter(|row| row.id == household_id) {
            apply(row);
        }
    });
    (detail, list)
}

// =============================================================================
// MEMBERS
// =============================================================================

pub fn set_member_role(cache: &QueryCache, household_id: &str, user_id: &str, role: Role) {
    cache.update_query_data(&keys::household_members(household_id), |members| {
        for member in members.iter_mut().filter(|m| m.user_id == user_id) {
            member.role = role;
        }
    });
}

pub fn replace_member(cache: &QueryCache, household_id: &str, member: &Member) {
    cache.update_query_data(&keys::household_members(household_id), |members| {
        for row in members.iter_mut().filter(|m| m.user_id == member.user_id) {
            *row = member.clone();
        }
    });
}

/// Drop a member row. Member counts live on the household, so the detail and
/// list are invalidated rather than patched.
pub fn remove_member(cache: &QueryCache, household_id: &str, user_id: &str) {
    cache.update_query_data(&keys::household_members(household_id), |members| {
        members.retain(|m| m.user_id != user_id);
    });
    invalidate_household(cache, household_id);
    invalidate_households_list(cache);
}

pub fn invalidate_members(cache: &QueryCache, household_id: &str) {
    cache.invalidate(keys::household_members(household_id).key(), KeyMatch::Exact);
}

// =============================================================================
// INVITATIONS
// =============================================================================

pub fn insert_invitation(cache: &QueryCache, invitation: &Invitation) {
    cache.update_query_data(&keys::household_invitations(&invitation.household_id), |list| {
        list.push(invitation.clone());
    });
}

pub fn remove_invitation(cache: &QueryCache, household_id: &str, invitation_id: &str) {
    cache.update_query_data(&keys::household_invitations(household_id), |list| {
        list.retain(|inv| inv.id != invitation_id);
    });
}

pub fn invalidate_invitations(cache: &QueryCache, household_id: &str) {
    cache.invalidate(keys::household_invitations(household_id).key(), KeyMatch::Exact);
}

/// Redeeming changes membership, invitation lists and member counts at once,
/// and the redeemer may not know which household the code belonged to.
pub fn invitation_redeemed(cache: &QueryCache) {
    invalidate_households_list(cache);
    cache.invalidate(&keys::all_households_scope(), KeyMatch::Prefix);
}

// =============================================================================
// ROLLBACK / GLOBAL
// =============================================================================

/// Restore the value captured before an optimistic write.
pub fn rollback<T>(cache: &QueryCache, snapshot: Snapshot<T>)
where
    T: Send + Sync + 'static,
{
    tracing::warn!(key = %snapshot.query.key(), "rolling back optimistic write");
    cache.restore(snapshot);
}

/// Drop every cached entity. Required on any identity change: data cached
/// for one principal must never be served to another.
pub fn clear_all_caches(cache: &QueryCache) {
    cache.clear();
}
