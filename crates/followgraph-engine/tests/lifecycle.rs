//! End-to-end lifecycle tests for the relationship engine over the
//! in-memory backend.

use std::sync::Arc;

use followgraph_engine::RelationshipEngine;
use followgraph_store::{AccountStore, MemoryBackend, MemoryOutbox, ReconciliationStore};
use followgraph_test_fixtures::{seed_accounts, RecordingNotifier};
use followgraph_types::{Account, EngineError, PairState, RelationshipStatus, Version};
use uuid::Uuid;

struct Harness {
    engine: Arc<RelationshipEngine>,
    store: Arc<MemoryBackend>,
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryBackend::new());
    let outbox = Arc::new(MemoryOutbox::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Arc::new(RelationshipEngine::new(
        Arc::clone(&store) as Arc<dyn AccountStore>,
        Arc::clone(&outbox) as Arc<dyn ReconciliationStore>,
        Arc::clone(&notifier) as _,
    ));
    Harness { engine, store, notifier }
}

async fn account(store: &MemoryBackend, id: Uuid) -> Account {
    store.get_account(id).await.unwrap().unwrap().account
}

#[tokio::test]
async fn full_lifecycle_request_accept_follow_back() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    assert_eq!(h.engine.send_request(a, b).await, Ok(RelationshipStatus::Requested));
    assert_eq!(h.engine.pair_state(a, b).await, Ok(PairState::Requested));

    assert_eq!(h.engine.accept(b, a).await, Ok(RelationshipStatus::Following));

    let b_account = account(&h.store, b).await;
    let a_account = account(&h.store, a).await;
    assert!(b_account.followers.contains(&a));
    assert!(b_account.awaiting_reciprocation.contains(&a));
    assert!(!b_account.pending_incoming.contains(&a));
    assert!(a_account.following.contains(&b));
    assert_eq!(h.engine.pair_state(a, b).await, Ok(PairState::Following));

    assert_eq!(h.engine.follow_back(b, a).await, Ok(RelationshipStatus::Mutual));

    let b_account = account(&h.store, b).await;
    let a_account = account(&h.store, a).await;
    assert!(a_account.followers.contains(&b));
    assert!(b_account.following.contains(&a));
    assert!(!b_account.awaiting_reciprocation.contains(&a));
    assert_eq!(h.engine.pair_state(a, b).await, Ok(PairState::Mutual));
    assert_eq!(h.engine.pair_state(b, a).await, Ok(PairState::Mutual));

    assert_eq!(
        h.notifier.events(),
        vec![
            ((a, b), PairState::Requested),
            ((a, b), PairState::Following),
            ((a, b), PairState::Mutual),
        ]
    );
}

#[tokio::test]
async fn self_relationship_never_mutates() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 1).await;
    let x = ids[0];

    assert_eq!(h.engine.send_request(x, x).await, Err(EngineError::SelfRelationship));
    assert_eq!(h.engine.unfollow(x, x).await, Err(EngineError::SelfRelationship));

    let record = h.store.get_account(x).await.unwrap().unwrap();
    assert_eq!(record.version, Version::zero());
    assert!(record.account.pending_incoming.is_empty());
    assert!(record.account.following.is_empty());
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn duplicate_request_is_rejected_once_pending() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    assert!(h.engine.send_request(a, b).await.is_ok());
    assert_eq!(h.engine.send_request(a, b).await, Err(EngineError::RequestAlreadyPending));

    let snapshot = h.engine.relationship_state(b).await.unwrap();
    assert_eq!(snapshot.pending_incoming, vec![a]);
}

#[tokio::test]
async fn request_to_already_followed_account_is_rejected() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    h.engine.send_request(a, b).await.unwrap();
    h.engine.accept(b, a).await.unwrap();

    assert_eq!(h.engine.send_request(a, b).await, Err(EngineError::AlreadyFollowing));
}

#[tokio::test]
async fn reject_returns_pair_to_none_and_allows_retry() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    h.engine.send_request(a, b).await.unwrap();
    assert_eq!(h.engine.reject(b, a).await, Ok(RelationshipStatus::Rejected));

    let b_account = account(&h.store, b).await;
    assert!(!b_account.pending_incoming.contains(&a));
    assert!(!b_account.followers.contains(&a));
    assert_eq!(h.engine.pair_state(a, b).await, Ok(PairState::None));

    // Back to NONE: a fresh request goes through.
    assert_eq!(h.engine.send_request(a, b).await, Ok(RelationshipStatus::Requested));
}

#[tokio::test]
async fn operations_without_pending_request_fail() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    assert_eq!(h.engine.accept(b, a).await, Err(EngineError::NoSuchRequest));
    assert_eq!(h.engine.reject(b, a).await, Err(EngineError::NoSuchRequest));
    assert_eq!(h.engine.follow_back(b, a).await, Err(EngineError::NotAwaitingReciprocation));
    assert_eq!(h.engine.unfollow(a, b).await, Err(EngineError::NotFollowing));
}

#[tokio::test]
async fn unfollow_is_directional() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    h.engine.send_request(a, b).await.unwrap();
    h.engine.accept(b, a).await.unwrap();
    h.engine.follow_back(b, a).await.unwrap();

    // Drop only a -> b; the b -> a edge must survive.
    assert_eq!(h.engine.unfollow(a, b).await, Ok(RelationshipStatus::Unfollowed));

    let a_account = account(&h.store, a).await;
    let b_account = account(&h.store, b).await;
    assert!(!b_account.followers.contains(&a));
    assert!(!a_account.following.contains(&b));
    assert!(a_account.followers.contains(&b));
    assert!(b_account.following.contains(&a));

    assert_eq!(h.engine.pair_state(a, b).await, Ok(PairState::None));
    assert_eq!(h.engine.pair_state(b, a).await, Ok(PairState::Following));

    // The unfollow notification reports the surviving reverse edge.
    let last = *h.notifier.events().last().unwrap();
    assert_eq!(last, ((a, b), PairState::Following));

    // Dropping the reverse edge takes the pair to NONE.
    assert_eq!(h.engine.unfollow(b, a).await, Ok(RelationshipStatus::Unfollowed));
    assert_eq!(h.engine.pair_state(b, a).await, Ok(PairState::None));
    let last = *h.notifier.events().last().unwrap();
    assert_eq!(last, ((b, a), PairState::None));
}

#[tokio::test]
async fn unfollow_clears_owed_follow_back() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    h.engine.send_request(a, b).await.unwrap();
    h.engine.accept(b, a).await.unwrap();

    let b_account = account(&h.store, b).await;
    assert!(b_account.awaiting_reciprocation.contains(&a));

    // a leaves before b reciprocates: the owed follow-back goes away
    // with the edge.
    h.engine.unfollow(a, b).await.unwrap();

    let b_account = account(&h.store, b).await;
    assert!(!b_account.awaiting_reciprocation.contains(&a));
    assert_eq!(h.engine.follow_back(b, a).await, Err(EngineError::NotAwaitingReciprocation));
}

#[tokio::test]
async fn cross_requests_converge_to_mutual() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    h.engine.send_request(a, b).await.unwrap();
    h.engine.accept(b, a).await.unwrap();

    // Instead of following back, b sends its own request.
    assert_eq!(h.engine.send_request(b, a).await, Ok(RelationshipStatus::Requested));
    assert_eq!(h.engine.accept(a, b).await, Ok(RelationshipStatus::Following));

    assert_eq!(h.engine.pair_state(a, b).await, Ok(PairState::Mutual));
    assert_eq!(h.engine.pair_state(b, a).await, Ok(PairState::Mutual));

    // Both follow-back debts are settled; nobody owes anything.
    let a_account = account(&h.store, a).await;
    let b_account = account(&h.store, b).await;
    assert!(a_account.awaiting_reciprocation.is_empty());
    assert!(b_account.awaiting_reciprocation.is_empty());

    // The second accept is announced as the mutual state it created.
    let last = *h.notifier.events().last().unwrap();
    assert_eq!(last, ((b, a), PairState::Mutual));
}

#[tokio::test]
async fn purge_account_strips_references_everywhere() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 3).await;
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    // a and b are mutual; c has a request pending on a.
    h.engine.send_request(a, b).await.unwrap();
    h.engine.accept(b, a).await.unwrap();
    h.engine.follow_back(b, a).await.unwrap();
    h.engine.send_request(c, a).await.unwrap();

    let report = h.engine.purge_account(a).await.unwrap();
    assert_eq!(report.markers_queued, 0);
    assert_eq!(report.accounts_cleaned, 1);

    assert!(h.store.get_account(a).await.unwrap().is_none());
    let b_account = account(&h.store, b).await;
    assert!(!b_account.references(a));

    // Purging again reports the account as unknown.
    assert_eq!(h.engine.purge_account(a).await, Err(EngineError::AccountNotFound(a)));
}

#[tokio::test]
async fn concurrent_accepts_only_one_succeeds() {
    let h = harness();
    let ids = seed_accounts(h.store.as_ref(), 2).await;
    let (a, b) = (ids[0], ids[1]);

    h.engine.send_request(a, b).await.unwrap();

    let e1 = Arc::clone(&h.engine);
    let e2 = Arc::clone(&h.engine);
    let t1 = tokio::spawn(async move { e1.accept(b, a).await });
    let t2 = tokio::spawn(async move { e2.accept(b, a).await });

    let r1 = t1.await.unwrap();
    let r2 = t2.await.unwrap();

    let oks = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
    assert_eq!(oks, 1, "exactly one accept must win: {r1:?} / {r2:?}");
    let loser = if r1.is_ok() { r2 } else { r1 };
    assert_eq!(loser, Err(EngineError::NoSuchRequest));

    // No double-append anywhere.
    let b_account = account(&h.store, b).await;
    assert_eq!(b_account.followers.iter().filter(|id| **id == a).count(), 1);
    assert_eq!(b_account.awaiting_reciprocation.iter().filter(|id| **id == a).count(), 1);
}
