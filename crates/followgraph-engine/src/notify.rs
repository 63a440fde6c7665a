//! Notification seam for relationship changes.
//!
//! Adapters (push notifications, read models, feeds) are told about
//! state changes after all writes of an operation have committed; they
//! are never consulted for decisions. A partial failure produces no
//! notification, so dependent views are never updated optimistically.

use async_trait::async_trait;
use followgraph_types::PairState;
use uuid::Uuid;

#[async_trait]
pub trait RelationshipNotifier: Send + Sync {
    /// Called once per completed operation with the (requester,
    /// target) pair it acted on and the resulting pair state.
    async fn relationship_changed(&self, pair: (Uuid, Uuid), state: PairState);
}

/// Notifier that drops all events. Useful when no read model or push
/// channel is wired up.
pub struct NoopNotifier;

#[async_trait]
impl RelationshipNotifier for NoopNotifier {
    async fn relationship_changed(&self, _pair: (Uuid, Uuid), _state: PairState) {}
}
