//! In-memory storage backend for testing and development

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use followgraph_types::{Account, AccountRecord, StoreError, StoreResult, Version};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::AccountStore;

/// In-memory account store with optimistic versioning.
///
/// The conditional-update semantics match what a document database
/// with a version field gives you: last-writer-wins is impossible,
/// a stale writer always observes `VersionConflict`.
pub struct MemoryBackend {
    accounts: Arc<RwLock<HashMap<Uuid, AccountRecord>>>,
    metrics: Arc<StoreMetrics>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(StoreMetrics::new()),
        }
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryBackend {
    async fn create_account(&self, account: Account) -> StoreResult<AccountRecord> {
        let start = Instant::now();
        let mut accounts = self.accounts.write().await;

        if accounts.contains_key(&account.id) {
            self.metrics.record_write(start.elapsed(), true);
            return Err(StoreError::Conflict);
        }

        let record = AccountRecord { account, version: Version::zero() };
        accounts.insert(record.account.id, record.clone());
        self.metrics.record_write(start.elapsed(), false);
        Ok(record)
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<AccountRecord>> {
        let start = Instant::now();
        let accounts = self.accounts.read().await;
        let record = accounts.get(&id).cloned();
        self.metrics.record_read(start.elapsed(), false);
        Ok(record)
    }

    async fn update_account(
        &self,
        account: Account,
        expected: Version,
    ) -> StoreResult<AccountRecord> {
        let start = Instant::now();
        let mut accounts = self.accounts.write().await;

        let stored = match accounts.get_mut(&account.id) {
            Some(stored) => stored,
            None => {
                self.metrics.record_write(start.elapsed(), true);
                return Err(StoreError::NotFound);
            }
        };

        if stored.version != expected {
            self.metrics.record_version_conflict();
            self.metrics.record_write(start.elapsed(), true);
            return Err(StoreError::VersionConflict {
                expected,
                actual: stored.version,
            });
        }

        stored.account = account;
        stored.version = stored.version.next();
        let record = stored.clone();
        self.metrics.record_write(start.elapsed(), false);
        Ok(record)
    }

    async fn delete_account(&self, id: Uuid) -> StoreResult<()> {
        let mut accounts = self.accounts.write().await;
        match accounts.remove(&id) {
            Some(_) => {
                self.metrics.record_delete(false);
                Ok(())
            }
            None => {
                self.metrics.record_delete(true);
                Err(StoreError::NotFound)
            }
        }
    }

    async fn list_account_ids(&self) -> StoreResult<Vec<Uuid>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.keys().copied().collect())
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}
