//! # Followgraph Engine
//!
//! The social-graph relationship engine: tracks, for every ordered
//! pair of accounts, whether one follows the other, and drives the
//! asymmetric follow-request workflow (request, accept, optional
//! follow-back, reject, unfollow).
//!
//! Relationship state is denormalized across the two account records
//! of a pair and the store offers no cross-record transactions, so
//! every two-record mutation is an explicit two-step write. The first
//! write either commits or the operation is a no-op; a failure of the
//! second write is escalated to the reconciliation outbox and surfaced
//! as [`followgraph_types::EngineError::PartialFailure`], never as
//! success.

pub mod engine;
pub mod locks;
pub mod notify;
pub mod preconditions;
pub mod reconcile;

pub use engine::{EngineConfig, PurgeReport, RelationshipEngine};
pub use notify::{NoopNotifier, RelationshipNotifier};
pub use preconditions::InvariantViolation;
pub use reconcile::{Reconciler, ReconcilerConfig, RepairReport};
