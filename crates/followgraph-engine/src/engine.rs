//! Relationship engine - owns the two-step write protocol.
//!
//! Every mutating operation follows the same shape: read both
//! records, run the precondition check, write the initiator-owned
//! record, write the counterpart record, then notify. A failure
//! before the first write commits is a safe no-op surfaced as
//! `Transient`. A failure after it is not rolled back (the store has
//! no cross-record transactions): the outstanding counterpart deltas
//! are retried with bounded backoff and, if they still do not commit,
//! queued as a reconciliation marker and surfaced as
//! `PartialFailure`.

use std::sync::Arc;
use std::time::Duration;

use followgraph_store::{AccountStore, ReconciliationStore};
use followgraph_types::{
    Account, AccountRecord, EngineError, EngineResult, PairState, ReconciliationMarker,
    RelationshipSet, RelationshipSnapshot, RelationshipStatus, SetDelta, StoreError, StoreResult,
};
use uuid::Uuid;

use crate::locks::PairLocks;
use crate::notify::RelationshipNotifier;
use crate::preconditions;

/// Upper bound on immediate re-reads after a CAS conflict. Conflicts
/// come from operations on overlapping pairs touching a shared
/// account; they resolve quickly or not at all.
const CAS_CONFLICT_CAP: u32 = 32;

/// Tuning knobs for the engine's store interactions.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum retries for a failed store write (exponential backoff).
    pub max_retries: u32,
    /// Base delay between retries.
    pub retry_delay: Duration,
    /// Timeout for a single store call. A timeout is handled exactly
    /// like an explicit store failure.
    pub op_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(25),
            op_timeout: Duration::from_secs(2),
        }
    }
}

/// Outcome of an account purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Accounts that referenced the purged id and were cleaned.
    pub accounts_cleaned: usize,
    /// Strips that could not be applied and were queued for the
    /// reconciler instead.
    pub markers_queued: usize,
}

/// The social-graph relationship engine.
pub struct RelationshipEngine {
    store: Arc<dyn AccountStore>,
    outbox: Arc<dyn ReconciliationStore>,
    notifier: Arc<dyn RelationshipNotifier>,
    locks: PairLocks,
    config: EngineConfig,
}

impl RelationshipEngine {
    pub fn new(
        store: Arc<dyn AccountStore>,
        outbox: Arc<dyn ReconciliationStore>,
        notifier: Arc<dyn RelationshipNotifier>,
    ) -> Self {
        Self::with_config(store, outbox, notifier, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn AccountStore>,
        outbox: Arc<dyn ReconciliationStore>,
        notifier: Arc<dyn RelationshipNotifier>,
        config: EngineConfig,
    ) -> Self {
        Self { store, outbox, notifier, locks: PairLocks::new(), config }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Record a follow request from `requester` on `target`.
    ///
    /// Single-record write: no edge exists yet, so there is no
    /// cross-record consistency at risk.
    #[tracing::instrument(skip(self), fields(requester = %requester, target = %target))]
    pub async fn send_request(
        &self,
        requester: Uuid,
        target: Uuid,
    ) -> EngineResult<RelationshipStatus> {
        let _guard = self.locks.acquire(requester, target).await;

        self.commit_single(
            requester,
            target,
            |r, t| preconditions::can_request(r, t),
            SetDelta::add(RelationshipSet::PendingIncoming, requester),
        )
        .await?;

        self.notifier.relationship_changed((requester, target), PairState::Requested).await;
        tracing::debug!("follow request recorded");
        Ok(RelationshipStatus::Requested)
    }

    /// Accept a pending follow request: `requester` now follows
    /// `target`, and `target` is marked as owing a follow-back.
    ///
    /// Two-record write. The target-owned record commits first; if
    /// the requester-side write then fails, the operation reports
    /// `PartialFailure` and queues the outstanding deltas.
    #[tracing::instrument(skip(self), fields(target = %target, requester = %requester))]
    pub async fn accept(&self, target: Uuid, requester: Uuid) -> EngineResult<RelationshipStatus> {
        let _guard = self.locks.acquire(requester, target).await;

        let (target_before, _) = self
            .commit_pair(
                target,
                requester,
                |t, _| preconditions::can_accept(t, requester),
                |t, _| {
                    let mut deltas = vec![
                        SetDelta::remove(RelationshipSet::PendingIncoming, requester),
                        SetDelta::add(RelationshipSet::Followers, requester),
                    ];
                    // No follow-back is owed if the target already
                    // follows the requester; the pair goes straight
                    // to mutual.
                    if !t.following.contains(&requester) {
                        deltas.push(SetDelta::add(RelationshipSet::AwaitingReciprocation, requester));
                    }
                    deltas
                },
                vec![
                    SetDelta::add(RelationshipSet::Following, target),
                    // The requester now follows the target, which
                    // settles any follow-back the requester owed.
                    SetDelta::remove(RelationshipSet::AwaitingReciprocation, target),
                ],
                (requester, target),
            )
            .await?;

        let state = if target_before.following.contains(&requester) {
            PairState::Mutual
        } else {
            PairState::Following
        };
        self.notifier.relationship_changed((requester, target), state).await;
        tracing::debug!("follow request accepted");
        Ok(RelationshipStatus::Following)
    }

    /// Reject a pending follow request. Single-record write; the pair
    /// returns to no relationship and a new request may be sent.
    #[tracing::instrument(skip(self), fields(target = %target, requester = %requester))]
    pub async fn reject(&self, target: Uuid, requester: Uuid) -> EngineResult<RelationshipStatus> {
        let _guard = self.locks.acquire(requester, target).await;

        self.commit_single(
            requester,
            target,
            |_, t| preconditions::can_reject(t, requester),
            SetDelta::remove(RelationshipSet::PendingIncoming, requester),
        )
        .await?;

        self.notifier.relationship_changed((requester, target), PairState::None).await;
        tracing::debug!("follow request rejected");
        Ok(RelationshipStatus::Rejected)
    }

    /// Reciprocate an accepted request: `target` follows `requester`
    /// back, making the pair mutual.
    ///
    /// Same two-record hazard as [`accept`](Self::accept), in the
    /// opposite direction.
    #[tracing::instrument(skip(self), fields(target = %target, requester = %requester))]
    pub async fn follow_back(
        &self,
        target: Uuid,
        requester: Uuid,
    ) -> EngineResult<RelationshipStatus> {
        let _guard = self.locks.acquire(requester, target).await;

        self.commit_pair(
            target,
            requester,
            |t, _| preconditions::can_follow_back(t, requester),
            |_, _| {
                vec![
                    SetDelta::remove(RelationshipSet::AwaitingReciprocation, requester),
                    SetDelta::add(RelationshipSet::Following, requester),
                ]
            },
            vec![SetDelta::add(RelationshipSet::Followers, target)],
            (requester, target),
        )
        .await?;

        self.notifier.relationship_changed((requester, target), PairState::Mutual).await;
        tracing::debug!("followed back, pair is mutual");
        Ok(RelationshipStatus::Mutual)
    }

    /// Drop the directed edge `follower` -> `target`.
    ///
    /// Strictly directional: if the pair is mutual, the reverse edge
    /// survives and each side must unfollow independently.
    #[tracing::instrument(skip(self), fields(follower = %follower, target = %target))]
    pub async fn unfollow(&self, follower: Uuid, target: Uuid) -> EngineResult<RelationshipStatus> {
        let _guard = self.locks.acquire(follower, target).await;

        let (follower_before, _) = self
            .commit_pair(
                follower,
                target,
                |f, _| preconditions::can_unfollow(f, target),
                |_, _| vec![SetDelta::remove(RelationshipSet::Following, target)],
                vec![
                    SetDelta::remove(RelationshipSet::Followers, follower),
                    // A follow-back owed to someone who no longer
                    // follows is no longer owed.
                    SetDelta::remove(RelationshipSet::AwaitingReciprocation, follower),
                ],
                (follower, target),
            )
            .await?;

        // The reverse edge (target -> follower) is untouched; report
        // what remains between the two accounts.
        let remaining = if follower_before.followers.contains(&target) {
            PairState::Following
        } else {
            PairState::None
        };
        self.notifier.relationship_changed((follower, target), remaining).await;
        tracing::debug!("unfollowed");
        Ok(RelationshipStatus::Unfollowed)
    }

    /// Delete an account and strip its id from every other account's
    /// relationship sets.
    ///
    /// Cleanup is eager and best-effort: a strip that keeps failing is
    /// queued for the reconciler rather than left dangling silently.
    #[tracing::instrument(skip(self), fields(account = %account))]
    pub async fn purge_account(&self, account: Uuid) -> EngineResult<PurgeReport> {
        match self.timed(self.store.delete_account(account)).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(EngineError::AccountNotFound(account)),
            Err(e) => return Err(EngineError::Transient(e.to_string())),
        }

        let ids = self
            .timed(self.store.list_account_ids())
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;

        const ALL_SETS: [RelationshipSet; 4] = [
            RelationshipSet::Followers,
            RelationshipSet::Following,
            RelationshipSet::PendingIncoming,
            RelationshipSet::AwaitingReciprocation,
        ];

        let mut report = PurgeReport::default();
        for other in ids {
            if other == account {
                continue;
            }
            let _guard = self.locks.acquire(account, other).await;

            let deltas: Vec<SetDelta> = match self.timed(self.store.get_account(other)).await {
                Ok(Some(record)) => {
                    if !record.account.references(account) {
                        continue;
                    }
                    ALL_SETS
                        .iter()
                        .map(|set| SetDelta::remove(*set, account))
                        .filter(|delta| {
                            let mut probe = record.account.clone();
                            delta.apply(&mut probe)
                        })
                        .collect()
                }
                Ok(None) => continue,
                Err(e) => {
                    // Can't tell which sets reference the purged id;
                    // queue removal of all four (removes are no-ops on
                    // sets that never held it).
                    tracing::warn!(other = %other, error = %e, "could not read account during purge");
                    ALL_SETS.iter().map(|set| SetDelta::remove(*set, account)).collect()
                }
            };

            if let Err(e) = self.apply_with_retry(other, &deltas).await {
                tracing::warn!(
                    other = %other,
                    error = %e,
                    "purge strip failed, queueing reconciliation marker"
                );
                let marker = ReconciliationMarker::new(other, deltas, (account, other));
                if let Err(enqueue_err) = self.outbox.enqueue(marker).await {
                    tracing::error!(error = %enqueue_err, "failed to queue purge marker");
                }
                report.markers_queued += 1;
            }
            report.accounts_cleaned += 1;
        }

        tracing::debug!(
            accounts_cleaned = report.accounts_cleaned,
            markers_queued = report.markers_queued,
            "account purged"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The four relationship lists of one account.
    pub async fn relationship_state(&self, account: Uuid) -> EngineResult<RelationshipSnapshot> {
        let record = self.fetch(account).await?;
        Ok(RelationshipSnapshot::from(&record.account))
    }

    /// Project the state of the ordered pair (requester, target).
    pub async fn pair_state(&self, requester: Uuid, target: Uuid) -> EngineResult<PairState> {
        if requester == target {
            return Err(EngineError::SelfRelationship);
        }
        let requester_record = self.fetch(requester).await?;
        let target_record = self.fetch(target).await?;
        Ok(Self::project_pair(&requester_record.account, &target_record.account))
    }

    fn project_pair(requester: &Account, target: &Account) -> PairState {
        let forward = target.followers.contains(&requester.id);
        let reverse = requester.followers.contains(&target.id);
        if forward && reverse {
            PairState::Mutual
        } else if forward {
            PairState::Following
        } else if target.pending_incoming.contains(&requester.id) {
            PairState::Requested
        } else {
            PairState::None
        }
    }

    // ------------------------------------------------------------------
    // Write protocol
    // ------------------------------------------------------------------

    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable("store call timed out".to_string())),
        }
    }

    async fn fetch(&self, id: Uuid) -> EngineResult<AccountRecord> {
        match self.timed(self.store.get_account(id)).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(EngineError::AccountNotFound(id)),
            Err(e) => Err(EngineError::Transient(e.to_string())),
        }
    }

    /// Precondition-checked write of the target record only. Retried
    /// as a whole on version conflicts; nothing commits on failure.
    async fn commit_single<C>(
        &self,
        requester: Uuid,
        target: Uuid,
        check: C,
        delta: SetDelta,
    ) -> EngineResult<()>
    where
        C: Fn(&Account, &Account) -> EngineResult<()>,
    {
        let mut conflicts = 0u32;
        loop {
            let requester_record = self.fetch(requester).await?;
            let target_record = self.fetch(target).await?;
            check(&requester_record.account, &target_record.account)?;

            let mut updated = target_record.account.clone();
            delta.apply(&mut updated);
            match self.timed(self.store.update_account(updated, target_record.version)).await {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict { .. }) if conflicts < CAS_CONFLICT_CAP => {
                    conflicts += 1;
                    tracing::debug!(account = %target, "version conflict, re-reading");
                }
                Err(e) => return Err(EngineError::Transient(e.to_string())),
            }
        }
    }

    /// The two-step write: precondition-checked first write on
    /// `first_id`, then the counterpart deltas on `second_id`.
    ///
    /// The first-write deltas are recomputed from the fresh snapshots
    /// on every attempt. Returns the pre-write snapshots of both
    /// accounts from the iteration that committed.
    async fn commit_pair<C, D>(
        &self,
        first_id: Uuid,
        second_id: Uuid,
        check: C,
        first_deltas: D,
        second_deltas: Vec<SetDelta>,
        pair: (Uuid, Uuid),
    ) -> EngineResult<(Account, Account)>
    where
        C: Fn(&Account, &Account) -> EngineResult<()>,
        D: Fn(&Account, &Account) -> Vec<SetDelta>,
    {
        let mut conflicts = 0u32;
        let (first_before, second_before) = loop {
            let first = self.fetch(first_id).await?;
            let second = self.fetch(second_id).await?;
            check(&first.account, &second.account)?;

            let mut updated = first.account.clone();
            for delta in first_deltas(&first.account, &second.account) {
                delta.apply(&mut updated);
            }
            match self.timed(self.store.update_account(updated, first.version)).await {
                Ok(_) => break (first.account, second.account),
                Err(StoreError::VersionConflict { .. }) if conflicts < CAS_CONFLICT_CAP => {
                    // Nothing committed yet; re-read and re-check.
                    conflicts += 1;
                    tracing::debug!(account = %first_id, "version conflict on first write, retrying");
                }
                Err(e) => return Err(EngineError::Transient(e.to_string())),
            }
        };

        // First write is committed. From here on, failures escalate
        // instead of rolling back.
        self.commit_counterpart(second_id, second_deltas, pair).await?;
        Ok((first_before, second_before))
    }

    async fn commit_counterpart(
        &self,
        id: Uuid,
        deltas: Vec<SetDelta>,
        pair: (Uuid, Uuid),
    ) -> EngineResult<()> {
        if let Err(e) = self.apply_with_retry(id, &deltas).await {
            tracing::error!(
                account = %id,
                error = %e,
                "counterpart write exhausted retries, queueing reconciliation marker"
            );
            let marker = ReconciliationMarker::new(id, deltas, pair);
            if let Err(enqueue_err) = self.outbox.enqueue(marker).await {
                tracing::error!(error = %enqueue_err, "failed to queue reconciliation marker");
            }
            return Err(EngineError::PartialFailure { requester: pair.0, target: pair.1 });
        }
        Ok(())
    }

    /// Read-modify-CAS of a delta batch with fresh reads on conflict
    /// and exponential backoff on store failure.
    async fn apply_with_retry(&self, id: Uuid, deltas: &[SetDelta]) -> StoreResult<()> {
        let mut attempt = 0u32;
        let mut conflicts = 0u32;
        loop {
            match self.apply_deltas(id, deltas).await {
                Ok(()) => return Ok(()),
                Err(StoreError::VersionConflict { .. }) if conflicts < CAS_CONFLICT_CAP => {
                    conflicts += 1;
                }
                Err(e) => {
                    if attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                    let delay = self.config.retry_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        account = %id,
                        attempt,
                        error = %e,
                        "write failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn apply_deltas(&self, id: Uuid, deltas: &[SetDelta]) -> StoreResult<()> {
        let record = match self.timed(self.store.get_account(id)).await? {
            Some(record) => record,
            None => return Err(StoreError::NotFound),
        };
        let mut account = record.account;
        let mut changed = false;
        for delta in deltas {
            changed |= delta.apply(&mut account);
        }
        if !changed {
            // Already applied (e.g. a replay); nothing to write.
            return Ok(());
        }
        self.timed(self.store.update_account(account, record.version)).await?;
        Ok(())
    }
}
