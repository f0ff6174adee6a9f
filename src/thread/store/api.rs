use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::thread::domain::record::{NodeId, ReplyRecord, ThreadScope, UserId};

/// One change pushed by the store for a subscribed scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUpdate {
    Upsert(ReplyRecord),
    Remove(NodeId),
}

/// Like-count adjustment. The store only ever moves the counter by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeDelta {
    Increment,
    Decrement,
}

impl LikeDelta {
    pub fn for_presence(present: bool) -> Self {
        if present {
            Self::Increment
        } else {
            Self::Decrement
        }
    }

    pub fn apply(self, count: u64) -> u64 {
        match self {
            Self::Increment => count.saturating_add(1),
            Self::Decrement => count.saturating_sub(1),
        }
    }
}

/// Live update stream for one scope.
///
/// Dropping it stops delivery; the store prunes the dead sender on its next
/// broadcast.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    scope: ThreadScope,
    rx: mpsc::UnboundedReceiver<StoreUpdate>,
}

impl Subscription {
    pub fn new(id: u64, scope: ThreadScope, rx: mpsc::UnboundedReceiver<StoreUpdate>) -> Self {
        Self { id, scope, rx }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> &ThreadScope {
        &self.scope
    }

    /// Next queued update without waiting. `None` when the queue is empty or
    /// the store closed the stream.
    pub fn try_next(&mut self) -> Option<StoreUpdate> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next update. `None` once the store closed the stream.
    pub async fn next(&mut self) -> Option<StoreUpdate> {
        self.rx.recv().await
    }
}

/// Record store adapter: persistence and transport for reply records and like
/// markers. The engine never talks to storage except through this trait.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Starts a live stream of upserts/removals for `scope`.
    async fn subscribe(&self, scope: &ThreadScope) -> Result<Subscription, StoreError>;

    /// Stops delivery for a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, subscription_id: u64);

    /// Current snapshot of every record in `scope`, any order.
    async fn records(&self, scope: &ThreadScope) -> Result<Vec<ReplyRecord>, StoreError>;

    async fn append(&self, scope: &ThreadScope, record: ReplyRecord) -> Result<ReplyRecord, StoreError>;

    async fn like_marker_exists(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        user_id: &UserId,
    ) -> Result<bool, StoreError>;

    async fn set_like_marker(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        user_id: &UserId,
        present: bool,
    ) -> Result<(), StoreError>;

    async fn adjust_like_count(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        delta: LikeDelta,
    ) -> Result<(), StoreError>;

    /// Marker write plus counter adjustment.
    ///
    /// Stores with transactions should override this to apply both at once.
    /// The default runs them back to back, so the counter may lag under
    /// concurrent likes.
    async fn apply_like(
        &self,
        scope: &ThreadScope,
        reply_id: &NodeId,
        user_id: &UserId,
        present: bool,
    ) -> Result<(), StoreError> {
        self.set_like_marker(scope, reply_id, user_id, present).await?;
        self.adjust_like_count(scope, reply_id, LikeDelta::for_presence(present))
            .await
    }
}
