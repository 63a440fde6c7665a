//! Account record and its relationship sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Version;

/// A social account as seen by the relationship engine.
///
/// Only the relationship sets live here. Profile data (name, bio,
/// avatar) is owned by the profile service and is never consulted for
/// relationship decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,

    /// Accounts that follow this account (accepted incoming edges).
    #[serde(default)]
    pub followers: BTreeSet<Uuid>,

    /// Accounts this account follows (accepted outgoing edges).
    #[serde(default)]
    pub following: BTreeSet<Uuid>,

    /// Accounts that have requested to follow this account and are
    /// waiting for an accept or reject.
    #[serde(default)]
    pub pending_incoming: BTreeSet<Uuid>,

    /// Accepted requesters this account has not yet followed back.
    /// Advisory bookkeeping only; it gates no edge.
    #[serde(default)]
    pub awaiting_reciprocation: BTreeSet<Uuid>,
}

impl Account {
    /// Create an account with empty relationship sets.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            followers: BTreeSet::new(),
            following: BTreeSet::new(),
            pending_incoming: BTreeSet::new(),
            awaiting_reciprocation: BTreeSet::new(),
        }
    }

    /// True if `other` appears in any of the four relationship sets.
    pub fn references(&self, other: Uuid) -> bool {
        self.followers.contains(&other)
            || self.following.contains(&other)
            || self.pending_incoming.contains(&other)
            || self.awaiting_reciprocation.contains(&other)
    }

    /// Remove `other` from every relationship set.
    ///
    /// Returns true if any set changed. Used by account-deletion
    /// cleanup to drop dangling references.
    pub fn strip(&mut self, other: Uuid) -> bool {
        let mut changed = self.followers.remove(&other);
        changed |= self.following.remove(&other);
        changed |= self.pending_incoming.remove(&other);
        changed |= self.awaiting_reciprocation.remove(&other);
        changed
    }
}

/// An account together with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account: Account,
    pub version: Version,
}
