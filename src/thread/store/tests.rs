use async_trait::async_trait;

use crate::error::StoreError;
use crate::thread::domain::record::test_support::reply;
use crate::thread::domain::record::{NodeId, ReplyRecord, ThreadScope, UserId};
use crate::thread::mutator;
use crate::thread::store::{
    InMemoryRecordStore, LikeDelta, RecordStore, StoreUpdate, Subscription,
};

fn scope() -> ThreadScope {
    ThreadScope::post("p1")
}

/// Store without transactions: keeps the trait's two-step `apply_like`.
struct TwoStepStore {
    inner: InMemoryRecordStore,
}

#[async_trait]
impl RecordStore for TwoStepStore {
    async fn subscribe(&self, scope: &ThreadScope) -> Result<Subscription, StoreError> {
        self.inner.subscribe(scope).await
    }

    fn unsubscribe(&self, subscription_id: u64) {
        self.inner.unsubscribe(subscription_id)
    }

    async fn records(&self, scope: &ThreadScope) -> Result<Vec<ReplyRecord>, StoreError> {
        self.inner.records(scope).await
    }

    async fn append(&self, scope: &ThreadScope, record: ReplyRecord) -> Result<ReplyRecord, StoreError> {
        self.inner.append(scope, record).await
    }

    async fn like_marker_exists(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        user_id: &UserId,
    ) -> Result<bool, StoreError> {
        self.inner.like_marker_exists(scope, reply_id, user_id).await
    }

    async fn set_like_marker(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        user_id: &UserId,
        present: bool,
    ) -> Result<(), StoreError> {
        self.inner.set_like_marker(scope, reply_id, user_id, present).await
    }

    async fn adjust_like_count(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        delta: LikeDelta,
    ) -> Result<(), StoreError> {
        self.inner.adjust_like_count(scope, reply_id, delta).await
    }
}

fn two_step_store() -> TwoStepStore {
    let inner = InMemoryRecordStore::new();
    inner.seed(&scope(), vec![reply("r", None, 0, 0)], vec![]);
    TwoStepStore { inner }
}

#[tokio::test]
async fn append_broadcasts_to_subscribers() {
    let store = InMemoryRecordStore::new();
    let mut sub = store.subscribe(&scope()).await.unwrap();

    store.append(&scope(), reply("r", None, 0, 0)).await.unwrap();

    match sub.try_next() {
        Some(StoreUpdate::Upsert(r)) => assert_eq!(r.id.as_str(), "r"),
        other => panic!("unexpected update: {:?}", other),
    }
    assert!(sub.try_next().is_none());
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let store = InMemoryRecordStore::new();
    store.append(&scope(), reply("r", None, 0, 0)).await.unwrap();

    let err = store.append(&scope(), reply("r", None, 1, 0)).await.unwrap_err();

    assert!(matches!(err, StoreError::Rejected(_)));
}

#[tokio::test]
async fn scopes_are_isolated() {
    let store = InMemoryRecordStore::new();
    let other = ThreadScope::conversation("dm-1");
    let mut sub = store.subscribe(&other).await.unwrap();

    store.append(&scope(), reply("r", None, 0, 0)).await.unwrap();

    assert!(sub.try_next().is_none());
    assert!(store.records(&other).await.unwrap().is_empty());
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let store = InMemoryRecordStore::new();
    let mut sub = store.subscribe(&scope()).await.unwrap();
    assert_eq!(store.subscriber_count(&scope()), 1);

    store.unsubscribe(sub.id());
    store.append(&scope(), reply("r", None, 0, 0)).await.unwrap();

    assert_eq!(store.subscriber_count(&scope()), 0);
    assert!(sub.try_next().is_none());
}

#[tokio::test]
async fn apply_like_moves_marker_and_counter_together() {
    let store = InMemoryRecordStore::new();
    store.seed(&scope(), vec![reply("r", None, 0, 0)], vec![]);
    let (id, user) = (NodeId::new("r"), UserId::new("u1"));

    store.apply_like(&scope(), &id, &user, true).await.unwrap();
    assert!(store.has_like(&scope(), &id, &user));
    assert_eq!(store.like_count(&scope(), &id), Some(1));

    // repeating the same write does not double count
    store.apply_like(&scope(), &id, &user, true).await.unwrap();
    assert_eq!(store.like_count(&scope(), &id), Some(1));

    store.apply_like(&scope(), &id, &user, false).await.unwrap();
    assert!(!store.has_like(&scope(), &id, &user));
    assert_eq!(store.like_count(&scope(), &id), Some(0));
}

#[tokio::test]
async fn like_count_never_goes_negative() {
    let store = InMemoryRecordStore::new();
    store.seed(&scope(), vec![reply("r", None, 0, 0)], vec![]);

    store
        .adjust_like_count(&scope(), &NodeId::new("r"), LikeDelta::Decrement)
        .await
        .unwrap();

    assert_eq!(store.like_count(&scope(), &NodeId::new("r")), Some(0));
}

#[tokio::test]
async fn likes_on_missing_reply_fail() {
    let store = InMemoryRecordStore::new();

    let err = store
        .apply_like(&scope(), &NodeId::new("ghost"), &UserId::new("u1"), true)
        .await
        .unwrap_err();

    assert_eq!(err, StoreError::NotFound(NodeId::new("ghost")));
}

#[tokio::test]
async fn failing_store_refuses_writes() {
    let store = InMemoryRecordStore::new();
    store.fail_writes(true);

    let err = store.append(&scope(), reply("r", None, 0, 0)).await.unwrap_err();

    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(store.records(&scope()).await.unwrap().is_empty());
}

// --- Default two-step apply_like ---

#[tokio::test]
async fn default_apply_like_writes_marker_then_count() {
    let store = two_step_store();
    let mut sub = store.subscribe(&scope()).await.unwrap();
    let (id, user) = (NodeId::new("r"), UserId::new("u1"));

    store.apply_like(&scope(), &id, &user, true).await.unwrap();
    assert!(store.inner.has_like(&scope(), &id, &user));
    assert_eq!(store.inner.like_count(&scope(), &id), Some(1));
    match sub.try_next() {
        Some(StoreUpdate::Upsert(r)) => assert_eq!(r.like_count, 1),
        other => panic!("unexpected update: {:?}", other),
    }

    store.apply_like(&scope(), &id, &user, false).await.unwrap();
    assert!(!store.inner.has_like(&scope(), &id, &user));
    assert_eq!(store.inner.like_count(&scope(), &id), Some(0));
}

#[tokio::test]
async fn default_apply_like_counts_every_call() {
    let store = two_step_store();
    let (id, user) = (NodeId::new("r"), UserId::new("u1"));

    // no transaction: a replayed write moves the counter again
    store.apply_like(&scope(), &id, &user, true).await.unwrap();
    store.apply_like(&scope(), &id, &user, true).await.unwrap();

    assert!(store.inner.has_like(&scope(), &id, &user));
    assert_eq!(store.inner.like_count(&scope(), &id), Some(2));
}

#[tokio::test]
async fn default_apply_like_stops_at_marker_failure() {
    let store = two_step_store();

    let err = store
        .apply_like(&scope(), &NodeId::new("ghost"), &UserId::new("u1"), true)
        .await
        .unwrap_err();

    assert_eq!(err, StoreError::NotFound(NodeId::new("ghost")));
    assert_eq!(store.inner.like_count(&scope(), &NodeId::new("r")), Some(0));
}

#[tokio::test]
async fn toggle_like_through_two_step_store() {
    let store = two_step_store();
    let (id, user) = (NodeId::new("r"), UserId::new("u1"));

    let first = mutator::toggle_like(&store, &scope(), &id, &user).await.unwrap();
    assert!(first.liked);
    assert_eq!(store.inner.like_count(&scope(), &id), Some(1));

    let second = mutator::toggle_like(&store, &scope(), &id, &user).await.unwrap();
    assert!(!second.liked);
    assert_eq!(store.inner.like_count(&scope(), &id), Some(0));
    assert!(!store.inner.has_like(&scope(), &id, &user));
}
