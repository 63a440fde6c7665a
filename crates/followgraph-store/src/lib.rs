//! # Followgraph Store - Storage Abstraction Layer
//!
//! Provides the keyed account-record store the relationship engine
//! writes through, plus the reconciliation-marker outbox used to
//! repair interrupted two-record writes.

use async_trait::async_trait;
use followgraph_types::{Account, AccountRecord, StoreResult, Version};
use uuid::Uuid;

pub mod factory;
pub mod memory;
pub mod metrics;
pub mod outbox;

pub use factory::{BackendType, StorageConfig, StorageFactory};
pub use memory::MemoryBackend;
pub use metrics::{MetricsSnapshot, StoreMetrics};
pub use outbox::{MemoryOutbox, ReconciliationStore};

/// The abstract account store interface.
///
/// The store offers per-record reads and conditional (optimistic)
/// updates only; there are no cross-record transactions. Keeping two
/// records consistent is the engine's job, not the store's.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create a new account record at `Version::zero()`.
    ///
    /// Fails with `StoreError::Conflict` if the id already exists.
    async fn create_account(&self, account: Account) -> StoreResult<AccountRecord>;

    /// Get an account record by id.
    async fn get_account(&self, id: Uuid) -> StoreResult<Option<AccountRecord>>;

    /// Conditionally replace an account record.
    ///
    /// The write commits only if the stored version equals
    /// `expected`; otherwise `StoreError::VersionConflict` is returned
    /// and nothing changes. On success the stored version is bumped
    /// and the new record is returned.
    async fn update_account(
        &self,
        account: Account,
        expected: Version,
    ) -> StoreResult<AccountRecord>;

    /// Delete an account record.
    ///
    /// Fails with `StoreError::NotFound` if the id does not exist.
    /// Referencing entries in other records are not touched; cascade
    /// cleanup is driven by the engine.
    async fn delete_account(&self, id: Uuid) -> StoreResult<()>;

    /// List all account ids. Drives cascade cleanup fan-out.
    async fn list_account_ids(&self) -> StoreResult<Vec<Uuid>>;

    /// Get a metrics snapshot (optional, returns None if not supported).
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}
