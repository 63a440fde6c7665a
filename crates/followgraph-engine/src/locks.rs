//! Per-pair mutual exclusion.
//!
//! Operations on the same account pair must serialize; operations on
//! disjoint pairs run in parallel. The lock key is the
//! lexicographically sorted id pair, so `(a, b)` and `(b, a)` map to
//! the same lock, and since every operation takes exactly one pair
//! lock there is no acquisition order to get wrong.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Lazily populated map of pair locks.
pub struct PairLocks {
    locks: Mutex<HashMap<(Uuid, Uuid), Arc<Mutex<()>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    fn key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Acquire the lock for the (unordered) pair `a`, `b`.
    ///
    /// The guard is owned so it can be held across awaits on the
    /// store without borrowing the lock map.
    pub async fn acquire(&self, a: Uuid, b: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(Self::key(a, b)).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        lock.lock_owned().await
    }
}

impl Default for PairLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_pair_serializes_regardless_of_order() {
        let locks = PairLocks::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let guard = locks.acquire(a, b).await;

        // The reversed pair maps to the same lock and must block.
        let blocked = tokio::time::timeout(Duration::from_millis(20), locks.acquire(b, a)).await;
        assert!(blocked.is_err());

        drop(guard);
        tokio::time::timeout(Duration::from_millis(20), locks.acquire(b, a))
            .await
            .expect("lock should be free after the guard drops");
    }

    #[tokio::test]
    async fn disjoint_pairs_do_not_block() {
        let locks = PairLocks::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();

        let _guard = locks.acquire(a, b).await;
        tokio::time::timeout(Duration::from_millis(20), locks.acquire(c, d))
            .await
            .expect("disjoint pair must not block");
    }
}
