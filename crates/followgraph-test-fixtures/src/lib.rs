//! Test fixtures for the followgraph crates
//!
//! Provides account seeding helpers, a fault-injecting store wrapper
//! for exercising partial-failure paths, and a notifier that records
//! the events it receives.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use followgraph_engine::RelationshipNotifier;
use followgraph_store::{AccountStore, MetricsSnapshot};
use followgraph_types::{Account, AccountRecord, PairState, StoreError, StoreResult, Version};
use uuid::Uuid;

/// Create an account with a fresh random id and empty sets.
pub fn test_account() -> Account {
    Account::new(Uuid::new_v4())
}

/// Create `n` fresh accounts in the store and return their ids.
pub async fn seed_accounts(store: &dyn AccountStore, n: usize) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(n);
    for _ in 0..n {
        let account = test_account();
        ids.push(account.id);
        store.create_account(account).await.expect("seed account");
    }
    ids
}

/// An `AccountStore` wrapper that injects `Unavailable` failures into
/// conditional updates of chosen accounts.
///
/// Reads and creates always pass through, which matches the failure
/// mode the engine has to survive: the record was readable moments
/// ago, but its write does not confirm.
pub struct FlakyStore<S> {
    inner: S,
    fail_updates: Mutex<HashMap<Uuid, u32>>,
}

impl<S: AccountStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, fail_updates: Mutex::new(HashMap::new()) }
    }

    /// Make the next `n` update attempts for `account` fail with
    /// `StoreError::Unavailable`.
    pub fn fail_next_updates(&self, account: Uuid, n: u32) {
        self.fail_updates.lock().unwrap().insert(account, n);
    }

    /// Clear all scheduled failures.
    pub fn heal(&self) {
        self.fail_updates.lock().unwrap().clear();
    }

    fn should_fail(&self, account: Uuid) -> bool {
        let mut failures = self.fail_updates.lock().unwrap();
        match failures.get_mut(&account) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl<S: AccountStore> AccountStore for FlakyStore<S> {
    async fn create_account(&self, account: Account) -> StoreResult<AccountRecord> {
        self.inner.create_account(account).await
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<AccountRecord>> {
        self.inner.get_account(id).await
    }

    async fn update_account(
        &self,
        account: Account,
        expected: Version,
    ) -> StoreResult<AccountRecord> {
        if self.should_fail(account.id) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        self.inner.update_account(account, expected).await
    }

    async fn delete_account(&self, id: Uuid) -> StoreResult<()> {
        self.inner.delete_account(id).await
    }

    async fn list_account_ids(&self) -> StoreResult<Vec<Uuid>> {
        self.inner.list_account_ids().await
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        self.inner.metrics()
    }
}

/// A notifier that records every event it receives, in order.
pub struct RecordingNotifier {
    events: Mutex<Vec<((Uuid, Uuid), PairState)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self { events: Mutex::new(Vec::new()) }
    }

    pub fn events(&self) -> Vec<((Uuid, Uuid), PairState)> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationshipNotifier for RecordingNotifier {
    async fn relationship_changed(&self, pair: (Uuid, Uuid), state: PairState) {
        self.events.lock().unwrap().push((pair, state));
    }
}
