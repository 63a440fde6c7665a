//! # Followgraph Types
//!
//! Shared type definitions for the followgraph relationship engine.
//!
//! This crate provides all core types used across the followgraph
//! crates, ensuring a single source of truth and preventing circular
//! dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod account;

pub use account::{Account, AccountRecord};

// ============================================================================
// Core Domain Types
// ============================================================================

/// An optimistic-concurrency token for a single account record.
///
/// Every successful conditional update bumps the version; a writer
/// holding a stale version gets `StoreError::VersionConflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Successful outcome of a relationship command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipStatus {
    /// A follow request was recorded on the target.
    Requested,
    /// The request was accepted; the requester now follows the target.
    Following,
    /// The request was rejected; the pair is back to no relationship.
    Rejected,
    /// The target followed back; both directed edges are live.
    Mutual,
    /// One directed edge was removed.
    Unfollowed,
}

/// The observable state of an ordered account pair (requester, target),
/// as projected from the target's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairState {
    /// No relationship and no pending request.
    None,
    /// A follow request is pending on the target.
    Requested,
    /// The requester follows the target; the reverse edge is not live.
    Following,
    /// Both directed edges are live.
    Mutual,
}

/// The four relationship lists of one account, as returned by the
/// read query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    pub followers: Vec<Uuid>,
    pub following: Vec<Uuid>,
    pub pending_incoming: Vec<Uuid>,
    pub awaiting_reciprocation: Vec<Uuid>,
}

impl From<&Account> for RelationshipSnapshot {
    fn from(account: &Account) -> Self {
        Self {
            followers: account.followers.iter().copied().collect(),
            following: account.following.iter().copied().collect(),
            pending_incoming: account.pending_incoming.iter().copied().collect(),
            awaiting_reciprocation: account.awaiting_reciprocation.iter().copied().collect(),
        }
    }
}

// ============================================================================
// Reconciliation Types
// ============================================================================

/// One of the four relationship sets on an account record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipSet {
    Followers,
    Following,
    PendingIncoming,
    AwaitingReciprocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOp {
    Add,
    Remove,
}

/// A single set mutation on one account record.
///
/// Applying a delta is idempotent, which is what makes at-least-once
/// reconciliation replay safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDelta {
    pub set: RelationshipSet,
    pub op: DeltaOp,
    pub member: Uuid,
}

impl SetDelta {
    pub fn add(set: RelationshipSet, member: Uuid) -> Self {
        Self { set, op: DeltaOp::Add, member }
    }

    pub fn remove(set: RelationshipSet, member: Uuid) -> Self {
        Self { set, op: DeltaOp::Remove, member }
    }

    /// Apply the delta to an account. Returns true if the set changed.
    pub fn apply(&self, account: &mut Account) -> bool {
        let set = match self.set {
            RelationshipSet::Followers => &mut account.followers,
            RelationshipSet::Following => &mut account.following,
            RelationshipSet::PendingIncoming => &mut account.pending_incoming,
            RelationshipSet::AwaitingReciprocation => &mut account.awaiting_reciprocation,
        };
        match self.op {
            DeltaOp::Add => set.insert(self.member),
            DeltaOp::Remove => set.remove(&self.member),
        }
    }
}

/// A durable marker recording that the second write of a two-record
/// operation did not confirm.
///
/// The marker carries exactly the deltas the counterpart record still
/// needs; the reconciler replays them until they commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationMarker {
    pub id: Uuid,
    /// The record the outstanding deltas apply to.
    pub account: Uuid,
    pub deltas: Vec<SetDelta>,
    /// The (requester, target) pair the failed operation was acting on.
    pub pair: (Uuid, Uuid),
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationMarker {
    pub fn new(account: Uuid, deltas: Vec<SetDelta>, pair: (Uuid, Uuid)) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            deltas,
            pair,
            attempts: 0,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account not found")]
    NotFound,

    #[error("Account already exists")]
    Conflict,

    #[error("Version conflict: expected {expected:?}, stored {actual:?}")]
    VersionConflict { expected: Version, actual: Version },

    /// The backend was unreachable or timed out. A timeout and an
    /// explicit failure are deliberately indistinguishable here.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the relationship engine.
///
/// Precondition variants are deterministic and caller-correctable; no
/// mutation happened. `Transient` means the store failed before the
/// first write committed and the whole operation is safe to retry.
/// `PartialFailure` means the first write committed and the second did
/// not: a reconciliation marker has been queued and the caller must
/// not treat the edge as live.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("An account cannot have a relationship with itself")]
    SelfRelationship,

    #[error("Already following this account")]
    AlreadyFollowing,

    #[error("Follow request already pending")]
    RequestAlreadyPending,

    #[error("No pending follow request from this account")]
    NoSuchRequest,

    #[error("This account is not awaiting reciprocation")]
    NotAwaitingReciprocation,

    #[error("Not following this account")]
    NotFollowing,

    #[error("Account {0} not found")]
    AccountNotFound(Uuid),

    #[error("Transient store failure, no changes were made: {0}")]
    Transient(String),

    #[error("Partial failure for pair ({requester}, {target}): first write committed, second queued for reconciliation")]
    PartialFailure { requester: Uuid, target: Uuid },
}

impl EngineError {
    /// True for deterministic precondition failures (no mutation).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EngineError::SelfRelationship
                | EngineError::AlreadyFollowing
                | EngineError::RequestAlreadyPending
                | EngineError::NoSuchRequest
                | EngineError::NotAwaitingReciprocation
                | EngineError::NotFollowing
                | EngineError::AccountNotFound(_)
        )
    }

    /// True if the whole operation can be retried blindly.
    ///
    /// `PartialFailure` is deliberately excluded: replaying the whole
    /// operation could double-apply the committed first write; only
    /// the reconciler may repair it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
