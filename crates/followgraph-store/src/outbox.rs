//! Reconciliation-marker outbox
//!
//! When the second write of a two-record operation does not confirm,
//! the engine queues a marker here describing the deltas the
//! counterpart record still needs. The reconciler drains the queue
//! and replays the deltas; markers are acked only after the repair
//! write commits, so delivery is at-least-once and application must
//! be (and is) idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use followgraph_types::{ReconciliationMarker, StoreError, StoreResult};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable queue of outstanding counterpart writes.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Queue a marker for later repair.
    async fn enqueue(&self, marker: ReconciliationMarker) -> StoreResult<()>;

    /// Read up to `limit` pending markers, oldest first.
    async fn pending(&self, limit: usize) -> StoreResult<Vec<ReconciliationMarker>>;

    /// Remove a marker after its delta has committed.
    async fn ack(&self, marker_id: Uuid) -> StoreResult<()>;

    /// Record a failed repair attempt so operators can spot markers
    /// that never drain.
    async fn record_attempt(&self, marker_id: Uuid) -> StoreResult<()>;

    /// Number of pending markers.
    async fn len(&self) -> StoreResult<usize>;
}

/// In-memory outbox implementation.
pub struct MemoryOutbox {
    markers: Arc<RwLock<Vec<ReconciliationMarker>>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self { markers: Arc::new(RwLock::new(Vec::new())) }
    }
}

impl Default for MemoryOutbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReconciliationStore for MemoryOutbox {
    async fn enqueue(&self, marker: ReconciliationMarker) -> StoreResult<()> {
        self.markers.write().await.push(marker);
        Ok(())
    }

    async fn pending(&self, limit: usize) -> StoreResult<Vec<ReconciliationMarker>> {
        let markers = self.markers.read().await;
        Ok(markers.iter().take(limit).cloned().collect())
    }

    async fn ack(&self, marker_id: Uuid) -> StoreResult<()> {
        let mut markers = self.markers.write().await;
        let before = markers.len();
        markers.retain(|m| m.id != marker_id);
        if markers.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_attempt(&self, marker_id: Uuid) -> StoreResult<()> {
        let mut markers = self.markers.write().await;
        match markers.iter_mut().find(|m| m.id == marker_id) {
            Some(marker) => {
                marker.attempts += 1;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn len(&self) -> StoreResult<usize> {
        Ok(self.markers.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use followgraph_types::{RelationshipSet, SetDelta};

    use super::*;

    fn marker() -> ReconciliationMarker {
        let account = Uuid::new_v4();
        let member = Uuid::new_v4();
        ReconciliationMarker::new(
            account,
            vec![SetDelta::add(RelationshipSet::Following, member)],
            (account, member),
        )
    }

    #[tokio::test]
    async fn enqueue_pending_ack() {
        let outbox = MemoryOutbox::new();
        let m1 = marker();
        let m2 = marker();

        outbox.enqueue(m1.clone()).await.unwrap();
        outbox.enqueue(m2.clone()).await.unwrap();
        assert_eq!(outbox.len().await.unwrap(), 2);

        // Oldest first.
        let pending = outbox.pending(1).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, m1.id);

        outbox.ack(m1.id).await.unwrap();
        assert_eq!(outbox.len().await.unwrap(), 1);

        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending[0].id, m2.id);
    }

    #[tokio::test]
    async fn ack_unknown_marker() {
        let outbox = MemoryOutbox::new();
        assert!(matches!(outbox.ack(Uuid::new_v4()).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn record_attempt_increments() {
        let outbox = MemoryOutbox::new();
        let m = marker();
        outbox.enqueue(m.clone()).await.unwrap();

        outbox.record_attempt(m.id).await.unwrap();
        outbox.record_attempt(m.id).await.unwrap();

        let pending = outbox.pending(1).await.unwrap();
        assert_eq!(pending[0].attempts, 2);
    }
}
