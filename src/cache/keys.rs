//! Query keys.
//!
//! A key is the tuple `(kind, id?, relation?)`. A relation only exists under
//! an id, so keys compare as segment lists and prefix matching follows tuple
//! prefixes: `(household, h1)` is a prefix of `(household, h1, members)` but
//! not the other way round, and neither touches `(households)`.

use std::fmt;
use std::marker::PhantomData;

use crate::net::types::{Household, Invitation, Member};

#[cfg(test)]
#[path = "keys_test.rs"]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// The authenticated user's household list.
    Households,
    /// A single household and its relations.
    Household,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Members,
    Invitations,
}

/// How an invalidation or removal selects entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    Exact,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    kind: EntityKind,
    id: Option<String>,
    relation: Option<Relation>,
}

impl QueryKey {
    /// Every entry of `kind`, or the singleton list entry for list kinds.
    #[must_use]
    pub fn kind(kind: EntityKind) -> Self {
        Self { kind, id: None, relation: None }
    }

    #[must_use]
    pub fn entity(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: Some(id.into()), relation: None }
    }

    #[must_use]
    pub fn relation(kind: EntityKind, id: impl Into<String>, relation: Relation) -> Self {
        Self { kind, id: Some(id.into()), relation: Some(relation) }
    }

    #[must_use]
    pub fn entity_kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn relation_kind(&self) -> Option<Relation> {
        self.relation
    }

    /// Tuple-prefix test: every segment present in `prefix` must match.
    #[must_use]
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        if self.kind != prefix.kind {
            return false;
        }
        if prefix.id.is_some() && self.id != prefix.id {
            return false;
        }
        prefix.relation.is_none() || self.relation == prefix.relation
    }

    #[must_use]
    pub fn matches(&self, selector: &QueryKey, mode: KeyMatch) -> bool {
        match mode {
            KeyMatch::Exact => self == selector,
            KeyMatch::Prefix => self.starts_with(selector),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            EntityKind::Households => "households",
            EntityKind::Household => "household",
        };
        f.write_str(kind)?;
        if let Some(id) = &self.id {
            write!(f, "/{id}")?;
        }
        match self.relation {
            Some(Relation::Members) => f.write_str("/members"),
            Some(Relation::Invitations) => f.write_str("/invitations"),
            None => Ok(()),
        }
    }
}

// =============================================================================
// TYPED QUERIES
// =============================================================================

/// A key bound to the type stored under it.
pub struct Query<T> {
    key: QueryKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Query<T> {
    #[must_use]
    pub fn new(key: QueryKey) -> Self {
        Self { key, _marker: PhantomData }
    }

    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self::new(self.key.clone())
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.key).finish()
    }
}

#[must_use]
pub fn households() -> Query<Vec<Household>> {
    Query::new(QueryKey::kind(EntityKind::Households))
}

#[must_use]
pub fn household(id: &str) -> Query<Household> {
    Query::new(QueryKey::entity(EntityKind::Household, id))
}

#[must_use]
pub fn household_members(id: &str) -> Query<Vec<Member>> {
    Query::new(QueryKey::relation(EntityKind::Household, id, Relation::Members))
}

#[must_use]
pub fn household_invitations(id: &str) -> Query<Vec<Invitation>> {
    Query::new(QueryKey::relation(EntityKind::Household, id, Relation::Invitations))
}

/// Prefix covering a household and all of its relations.
#[must_use]
pub fn household_scope(id: &str) -> QueryKey {
    QueryKey::entity(EntityKind::Household, id)
}

/// Prefix covering every household-scoped entry.
#[must_use]
pub fn all_households_scope() -> QueryKey {
    QueryKey::kind(EntityKind::Household)
}
