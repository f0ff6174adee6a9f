use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::thread::domain::record::{LikeMarker, NodeId, ReplyRecord, ThreadScope, UserId};
use crate::thread::store::api::{LikeDelta, RecordStore, StoreUpdate, Subscription};

#[derive(Default)]
struct ScopeData {
    records: HashMap<NodeId, ReplyRecord>,
    likes: HashSet<(NodeId, UserId)>,
    subscribers: Vec<(u64, mpsc::UnboundedSender<StoreUpdate>)>,
}

impl ScopeData {
    /// Push to every live subscriber, dropping the ones that went away.
    fn broadcast(&mut self, update: StoreUpdate) {
        self.subscribers
            .retain(|(_, tx)| tx.send(update.clone()).is_ok());
    }
}

#[derive(Default)]
struct Inner {
    scopes: HashMap<ThreadScope, ScopeData>,
    next_subscription: u64,
    fail_writes: bool,
    write_delay: Option<Duration>,
}

/// In-process record store.
///
/// Backs the CLI and the tests. Likes are applied under a single lock, so
/// `apply_like` is transactional here. Writes can be made to fail or to lag
/// to exercise error and in-flight paths.
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<Inner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records and like markers without notifying subscribers.
    pub fn seed(&self, scope: &ThreadScope, records: Vec<ReplyRecord>, likes: Vec<LikeMarker>) {
        let mut inner = self.lock();
        let data = inner.scopes.entry(scope.clone()).or_default();
        for record in records {
            data.records.insert(record.id.clone(), record);
        }
        for like in likes {
            data.likes.insert((like.reply_id, like.user_id));
        }
        log::info!(
            "[STORE] seeded {} with {} records, {} likes",
            scope,
            data.records.len(),
            data.likes.len()
        );
    }

    /// Make every subsequent write fail with `Unavailable` (or stop failing).
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Delay every write by `delay` before it takes effect.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.lock().write_delay = delay;
    }

    /// Simulate a change made by someone else: apply it and broadcast it.
    pub fn push_external(&self, scope: &ThreadScope, update: StoreUpdate) {
        let mut inner = self.lock();
        let data = inner.scopes.entry(scope.clone()).or_default();
        match &update {
            StoreUpdate::Upsert(record) => {
                data.records.insert(record.id.clone(), record.clone());
            }
            StoreUpdate::Remove(id) => {
                data.records.remove(id);
            }
        }
        data.broadcast(update);
    }

    pub fn like_count(&self, scope: &ThreadScope, reply_id: &NodeId) -> Option<u64> {
        self.lock()
            .scopes
            .get(scope)
            .and_then(|d| d.records.get(reply_id))
            .map(|r| r.like_count)
    }

    pub fn has_like(&self, scope: &ThreadScope, reply_id: &NodeId, user_id: &UserId) -> bool {
        self.lock()
            .scopes
            .get(scope)
            .map(|d| d.likes.contains(&(reply_id.clone(), user_id.clone())))
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self, scope: &ThreadScope) -> usize {
        self.lock()
            .scopes
            .get(scope)
            .map(|d| d.subscribers.iter().filter(|(_, tx)| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the configured delay, then checks the failure switch.
    async fn before_write(&self, op: &str) -> Result<(), StoreError> {
        let delay = self.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.lock().fail_writes {
            log::warn!("[STORE] {} failed (writes disabled)", op);
            return Err(StoreError::Unavailable(format!("{} refused by store", op)));
        }
        Ok(())
    }

    fn adjust_locked(
        data: &mut ScopeData,
        reply_id: &NodeId,
        delta: LikeDelta,
    ) -> Result<(), StoreError> {
        let record = data
            .records
            .get_mut(reply_id)
            .ok_or_else(|| StoreError::NotFound(reply_id.clone()))?;
        record.like_count = delta.apply(record.like_count);
        let updated = record.clone();
        data.broadcast(StoreUpdate::Upsert(updated));
        Ok(())
    }

    fn set_marker_locked(
        data: &mut ScopeData,
        reply_id: &NodeId,
        user_id: &UserId,
        present: bool,
    ) -> Result<bool, StoreError> {
        if !data.records.contains_key(reply_id) {
            return Err(StoreError::NotFound(reply_id.clone()));
        }
        let key = (reply_id.clone(), user_id.clone());
        let changed = if present {
            data.likes.insert(key)
        } else {
            data.likes.remove(&key)
        };
        Ok(changed)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn subscribe(&self, scope: &ThreadScope) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.next_subscription += 1;
        let id = inner.next_subscription;
        inner
            .scopes
            .entry(scope.clone())
            .or_default()
            .subscribers
            .push((id, tx));
        log::debug!("[STORE] subscription #{} on {}", id, scope);
        Ok(Subscription::new(id, scope.clone(), rx))
    }

    fn unsubscribe(&self, subscription_id: u64) {
        let mut inner = self.lock();
        for data in inner.scopes.values_mut() {
            data.subscribers.retain(|(id, _)| *id != subscription_id);
        }
        log::debug!("[STORE] subscription #{} dropped", subscription_id);
    }

    async fn records(&self, scope: &ThreadScope) -> Result<Vec<ReplyRecord>, StoreError> {
        Ok(self
            .lock()
            .scopes
            .get(scope)
            .map(|d| d.records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(&self, scope: &ThreadScope, record: ReplyRecord) -> Result<ReplyRecord, StoreError> {
        self.before_write("append").await?;

        let mut inner = self.lock();
        let data = inner.scopes.entry(scope.clone()).or_default();
        if data.records.contains_key(&record.id) {
            return Err(StoreError::Rejected(format!("duplicate reply id {}", record.id)));
        }
        log::trace!("[STORE] append {} to {}", record.id, scope);
        data.records.insert(record.id.clone(), record.clone());
        data.broadcast(StoreUpdate::Upsert(record.clone()));
        Ok(record)
    }

    async fn like_marker_exists(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        user_id: &UserId,
    ) -> Result<bool, StoreError> {
        Ok(self.has_like(scope, reply_id, user_id))
    }

    async fn set_like_marker(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        user_id: &UserId,
        present: bool,
    ) -> Result<(), StoreError> {
        self.before_write("set_like_marker").await?;
        let mut inner = self.lock();
        let data = inner.scopes.entry(scope.clone()).or_default();
        Self::set_marker_locked(data, reply_id, user_id, present).map(|_| ())
    }

    async fn adjust_like_count(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        delta: LikeDelta,
    ) -> Result<(), StoreError> {
        self.before_write("adjust_like_count").await?;
        let mut inner = self.lock();
        let data = inner.scopes.entry(scope.clone()).or_default();
        Self::adjust_locked(data, reply_id, delta)
    }

    async fn apply_like(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        user_id: &UserId,
        present: bool,
    ) -> Result<(), StoreError> {
        self.before_write("apply_like").await?;
        let mut inner = self.lock();
        let data = inner.scopes.entry(scope.clone()).or_default();
        // a marker that already matches leaves the counter alone
        if !Self::set_marker_locked(data, reply_id, user_id, present)? {
            log::debug!("[STORE] like on {} by {} already {}", reply_id, user_id, present);
            return Ok(());
        }
        Self::adjust_locked(data, reply_id, LikeDelta::for_presence(present))
    }
}
