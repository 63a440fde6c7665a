//! Pure precondition and audit checks over account snapshots.
//!
//! These predicates never mutate anything and take already-read
//! snapshots, so they need no locking. The engine runs the `can_*`
//! checks before any write; the `check_*` audits are reused by tests
//! to verify set consistency after every operation.

use followgraph_types::{Account, EngineError, EngineResult};
use thiserror::Error;
use uuid::Uuid;

/// May `requester` send a follow request to `target`?
pub fn can_request(requester: &Account, target: &Account) -> EngineResult<()> {
    if requester.id == target.id {
        return Err(EngineError::SelfRelationship);
    }
    if target.followers.contains(&requester.id) {
        return Err(EngineError::AlreadyFollowing);
    }
    if target.pending_incoming.contains(&requester.id) {
        return Err(EngineError::RequestAlreadyPending);
    }
    Ok(())
}

/// May `target` accept a pending request from `requester`?
pub fn can_accept(target: &Account, requester: Uuid) -> EngineResult<()> {
    if !target.pending_incoming.contains(&requester) {
        return Err(EngineError::NoSuchRequest);
    }
    Ok(())
}

/// May `target` reject a pending request from `requester`?
///
/// Same precondition as accept: the request must exist.
pub fn can_reject(target: &Account, requester: Uuid) -> EngineResult<()> {
    can_accept(target, requester)
}

/// May `target` follow `requester` back?
pub fn can_follow_back(target: &Account, requester: Uuid) -> EngineResult<()> {
    if !target.awaiting_reciprocation.contains(&requester) {
        return Err(EngineError::NotAwaitingReciprocation);
    }
    Ok(())
}

/// May `follower` drop its directed edge to `target`?
pub fn can_unfollow(follower: &Account, target: Uuid) -> EngineResult<()> {
    if follower.id == target {
        return Err(EngineError::SelfRelationship);
    }
    if !follower.following.contains(&target) {
        return Err(EngineError::NotFollowing);
    }
    Ok(())
}

/// A detected inconsistency in stored relationship state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("Account {0} references itself")]
    SelfReference(Uuid),

    #[error("Account {account} has {member} both pending and following it")]
    PendingFollower { account: Uuid, member: Uuid },

    #[error("Account {account} awaits reciprocation from {member} which does not follow it")]
    AwaitingNonFollower { account: Uuid, member: Uuid },

    #[error("Account {account} awaits reciprocation from {member} but already follows it back")]
    AwaitingAlreadyReciprocated { account: Uuid, member: Uuid },

    #[error("Edge {from} -> {to} is recorded on one side only")]
    AsymmetricEdge { from: Uuid, to: Uuid },
}

/// Audit the single-record invariants of one account: no self
/// references, and pending requesters are not already followers.
pub fn check_account(account: &Account) -> Result<(), InvariantViolation> {
    if account.references(account.id) {
        return Err(InvariantViolation::SelfReference(account.id));
    }
    for member in &account.pending_incoming {
        if account.followers.contains(member) {
            return Err(InvariantViolation::PendingFollower {
                account: account.id,
                member: *member,
            });
        }
    }
    for member in &account.awaiting_reciprocation {
        if !account.followers.contains(member) {
            return Err(InvariantViolation::AwaitingNonFollower {
                account: account.id,
                member: *member,
            });
        }
    }
    Ok(())
}

/// Audit the cross-record invariants of a pair: each directed edge is
/// recorded on both sides, and awaiting-reciprocation entries have not
/// already been reciprocated.
pub fn check_pair(a: &Account, b: &Account) -> Result<(), InvariantViolation> {
    for (from, to) in [(a, b), (b, a)] {
        if from.following.contains(&to.id) != to.followers.contains(&from.id) {
            return Err(InvariantViolation::AsymmetricEdge { from: from.id, to: to.id });
        }
        if from.awaiting_reciprocation.contains(&to.id) && to.followers.contains(&from.id) {
            return Err(InvariantViolation::AwaitingAlreadyReciprocated {
                account: from.id,
                member: to.id,
            });
        }
    }
    Ok(())
}
