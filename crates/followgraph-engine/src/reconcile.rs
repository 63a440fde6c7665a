//! Reconciliation of interrupted two-record writes.
//!
//! The reconciler drains the marker outbox and replays each
//! outstanding counterpart delta until it commits. Delta application
//! is idempotent and markers are acked only after the write lands, so
//! at-least-once delivery is safe. A marker whose account no longer
//! exists is dropped: the purge cascade owns that cleanup.

use std::sync::Arc;
use std::time::Duration;

use followgraph_observe::logging::{record_repair_result, repair_span};
use followgraph_store::{AccountStore, ReconciliationStore};
use followgraph_types::{ReconciliationMarker, StoreError, StoreResult};
use tracing::Instrument;

/// Configuration for the reconciler loop.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Maximum markers drained per pass.
    pub batch_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { batch_size: 64 }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Markers whose delta was applied (or found already applied).
    pub repaired: usize,
    /// Markers dropped because the account no longer exists.
    pub dropped: usize,
    /// Markers left queued because the store failed again.
    pub deferred: usize,
}

/// Out-of-band repair worker for partial failures.
pub struct Reconciler {
    store: Arc<dyn AccountStore>,
    outbox: Arc<dyn ReconciliationStore>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn AccountStore>, outbox: Arc<dyn ReconciliationStore>) -> Self {
        Self::with_config(store, outbox, ReconcilerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn AccountStore>,
        outbox: Arc<dyn ReconciliationStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self { store, outbox, config }
    }

    /// Drain one batch of pending markers.
    pub async fn run_once(&self) -> RepairReport {
        let markers = match self.outbox.pending(self.config.batch_size).await {
            Ok(markers) => markers,
            Err(e) => {
                tracing::warn!(error = %e, "could not read reconciliation outbox");
                return RepairReport::default();
            }
        };

        let mut report = RepairReport::default();
        for marker in markers {
            let span = repair_span(marker.account);
            match self.repair(&marker).instrument(span.clone()).await {
                Ok(applied) => {
                    record_repair_result(&span, applied);
                    if let Err(e) = self.outbox.ack(marker.id).await {
                        tracing::warn!(marker = %marker.id, error = %e, "failed to ack marker");
                    }
                    if applied {
                        report.repaired += 1;
                    } else {
                        report.dropped += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        marker = %marker.id,
                        account = %marker.account,
                        attempts = marker.attempts,
                        error = %e,
                        "repair failed, leaving marker queued"
                    );
                    if let Err(attempt_err) = self.outbox.record_attempt(marker.id).await {
                        tracing::warn!(marker = %marker.id, error = %attempt_err, "failed to record attempt");
                    }
                    report.deferred += 1;
                }
            }
        }

        if report != RepairReport::default() {
            tracing::debug!(
                repaired = report.repaired,
                dropped = report.dropped,
                deferred = report.deferred,
                "reconciliation pass complete"
            );
        }
        report
    }

    /// Run reconciliation passes forever at the given interval.
    /// Intended to be spawned; runs until the task is aborted.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// Replay one marker. `Ok(true)` means the record now reflects the
    /// deltas; `Ok(false)` means the account is gone and the marker is
    /// moot.
    async fn repair(&self, marker: &ReconciliationMarker) -> StoreResult<bool> {
        loop {
            let record = match self.store.get_account(marker.account).await? {
                Some(record) => record,
                None => return Ok(false),
            };

            let mut account = record.account;
            let mut changed = false;
            for delta in &marker.deltas {
                changed |= delta.apply(&mut account);
            }
            if !changed {
                // Already consistent; a previous attempt must have
                // committed before its ack was recorded.
                return Ok(true);
            }

            match self.store.update_account(account, record.version).await {
                Ok(_) => return Ok(true),
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
