use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::ThreadError;
use crate::thread::domain::record::{Author, NodeId, ReplyRecord, ThreadScope};
use crate::thread::domain::visibility::RenderModel;
use crate::thread::engine::{EngineCommand, EngineEvent, ThreadEngine};
use crate::thread::mutator::{self, LikeOutcome};
use crate::thread::store::{RecordStore, StoreUpdate, Subscription};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// **ThreadSession**
///
/// The imperative shell around a [`ThreadEngine`] for one viewer and one scope.
/// It has three main responsibilities:
/// 1. **Pump the store subscription** into the engine's update queue.
/// 2. **Drive the engine** with view actions and acknowledged writes.
/// 3. **Execute side effects** the engine emits (unsubscribe, diagnostics).
///
/// Store writes go through the mutator; the engine only learns about a reply
/// or like once the store acknowledged it.
pub struct ThreadSession<S: RecordStore> {
    /// The functional core that owns index and view state.
    engine: ThreadEngine,

    store: Arc<S>,

    /// Who is reading (and writing) in this view.
    viewer: Author,

    /// Live update stream; `None` once unsubscribed or ended by the store.
    subscription: Option<Subscription>,

    /// Timestamp source for new replies.
    clock: Clock,

    /// Start time for logging relative timestamps.
    t0: Instant,
}

impl<S: RecordStore> ThreadSession<S> {
    /// Opens a view on `scope`.
    ///
    /// Subscribes before reading the snapshot, so nothing written in between
    /// is missed. Records seen twice are plain upserts.
    pub async fn open(
        store: Arc<S>,
        scope: ThreadScope,
        viewer: Author,
        config: EngineConfig,
    ) -> Result<Self, ThreadError> {
        let subscription = store.subscribe(&scope).await.map_err(ThreadError::Subscribe)?;
        let snapshot = match store.records(&scope).await {
            Ok(records) => records,
            Err(e) => {
                store.unsubscribe(subscription.id());
                return Err(ThreadError::Subscribe(e));
            }
        };

        let mut session = Self {
            engine: ThreadEngine::new(scope, config),
            store,
            viewer,
            subscription: Some(subscription),
            clock: Box::new(Utc::now),
            t0: Instant::now(),
        };
        session.info(&format!(
            "opened {} for {} ({} records)",
            session.engine.scope(),
            session.viewer.id,
            snapshot.len()
        ));

        session.load_viewer_likes(&snapshot).await?;
        for record in snapshot {
            session.engine.handle_event(EngineEvent::Store(StoreUpdate::Upsert(record)));
        }
        Ok(session)
    }

    /// Replace the timestamp source used for new replies.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    async fn load_viewer_likes(&mut self, records: &[ReplyRecord]) -> Result<(), ThreadError> {
        let scope = self.engine.scope().clone();
        let mut liked = 0usize;
        for record in records {
            let exists = self
                .store
                .like_marker_exists(&scope, &record.id, &self.viewer.id)
                .await
                .map_err(ThreadError::Subscribe)?;
            if exists {
                liked += 1;
                self.engine.handle_event(EngineEvent::LikeToggled {
                    reply_id: record.id.clone(),
                    liked: true,
                });
            }
        }
        self.debug(&format!("viewer likes {} of {} replies", liked, records.len()));
        Ok(())
    }

    fn t(&self) -> u128 {
        self.t0.elapsed().as_micros()
    }

    /// Moves every update already delivered by the store into the engine queue.
    pub fn pump(&mut self) -> usize {
        let Some(sub) = self.subscription.as_mut() else {
            return 0;
        };
        let mut updates = Vec::new();
        while let Some(update) = sub.try_next() {
            updates.push(update);
        }
        let count = updates.len();
        for update in updates {
            self.enqueue(update);
        }
        if count > 0 {
            self.trace(&format!("pumped {} store updates", count));
        }
        count
    }

    /// Queues one store update without applying it.
    pub fn enqueue(&mut self, update: StoreUpdate) {
        self.process_engine(EngineEvent::Store(update));
    }

    /// Pump, then apply everything queued.
    pub fn refresh(&mut self) -> Result<(), ThreadError> {
        self.ensure_open()?;
        self.pump();
        let cmds = self.engine.flush();
        for cmd in cmds {
            self.execute_command(cmd);
        }
        Ok(())
    }

    /// Waits for the next pushed update. Never resolves once unsubscribed.
    pub async fn next_update(&mut self) -> Option<StoreUpdate> {
        let Some(sub) = self.subscription.as_mut() else {
            return std::future::pending().await;
        };
        let update = sub.next().await;
        if update.is_none() {
            log::warn!("[SESSION] {}: update stream ended by store", self.engine.scope());
            self.subscription = None;
        }
        update
    }

    pub fn render_model(&mut self, root: &NodeId) -> Result<RenderModel, ThreadError> {
        self.refresh()?;
        self.engine
            .render_model(root)
            .ok_or_else(|| ThreadError::UnknownNode(root.clone()))
    }

    /// Top-level replies (and orphans) in display order.
    pub fn roots(&mut self) -> Result<Vec<NodeId>, ThreadError> {
        self.refresh()?;
        Ok(self.engine.roots())
    }

    pub fn trending(&mut self, root: &NodeId) -> Result<Option<ReplyRecord>, ThreadError> {
        self.refresh()?;
        self.ensure_known(root)?;
        Ok(self.engine.trending(root).cloned())
    }

    /// Validates a reply and builds the record to append. Nothing is written.
    pub fn prepare_reply(
        &mut self,
        parent: Option<NodeId>,
        content: &str,
    ) -> Result<ReplyRecord, ThreadError> {
        self.refresh()?;
        if let Some(parent) = &parent {
            self.ensure_known(parent)?;
        }
        mutator::build_reply(&self.viewer, content, parent, (self.clock)())
    }

    /// Feeds a store-acknowledged reply into the engine.
    pub fn apply_reply_ack(&mut self, record: ReplyRecord) -> Result<(), ThreadError> {
        self.ensure_open()?;
        self.debug(&format!("reply {} acknowledged", record.id));
        self.process_engine(EngineEvent::ReplyStored(record));
        Ok(())
    }

    /// Posts a reply as the viewer and reveals it once stored.
    pub async fn reply(
        &mut self,
        parent: Option<NodeId>,
        content: &str,
    ) -> Result<ReplyRecord, ThreadError> {
        let record = self.prepare_reply(parent, content)?;
        let scope = self.engine.scope().clone();
        let stored = mutator::append_reply(self.store.as_ref(), &scope, record).await?;
        self.apply_reply_ack(stored.clone())?;
        Ok(stored)
    }

    /// Checks a like can be toggled on `reply_id`.
    pub fn prepare_like(&mut self, reply_id: &NodeId) -> Result<(), ThreadError> {
        self.refresh()?;
        self.ensure_known(reply_id)
    }

    pub fn apply_like_ack(&mut self, outcome: &LikeOutcome) -> Result<(), ThreadError> {
        self.ensure_open()?;
        self.process_engine(EngineEvent::LikeToggled {
            reply_id: outcome.reply_id.clone(),
            liked: outcome.liked,
        });
        Ok(())
    }

    /// Flips the viewer's like. The new count arrives through the subscription.
    pub async fn like(&mut self, reply_id: &NodeId) -> Result<LikeOutcome, ThreadError> {
        self.prepare_like(reply_id)?;
        let scope = self.engine.scope().clone();
        let outcome =
            mutator::toggle_like(self.store.as_ref(), &scope, reply_id, &self.viewer.id).await?;
        self.apply_like_ack(&outcome)?;
        Ok(outcome)
    }

    pub fn toggle_expand(&mut self, id: &NodeId) -> Result<(), ThreadError> {
        self.view_action(id, EngineEvent::ToggleExpand(id.clone()))
    }

    pub fn toggle_collapse(&mut self, id: &NodeId) -> Result<(), ThreadError> {
        self.view_action(id, EngineEvent::ToggleCollapse(id.clone()))
    }

    pub fn focus(&mut self, id: &NodeId) -> Result<(), ThreadError> {
        self.view_action(id, EngineEvent::Focus(id.clone()))
    }

    pub fn unfocus(&mut self) -> Result<(), ThreadError> {
        self.ensure_open()?;
        self.process_engine(EngineEvent::Unfocus);
        Ok(())
    }

    pub fn set_draft_target(&mut self, target: Option<NodeId>) -> Result<(), ThreadError> {
        self.refresh()?;
        if let Some(id) = &target {
            self.ensure_known(id)?;
        }
        self.process_engine(EngineEvent::SetDraftTarget(target));
        Ok(())
    }

    fn view_action(&mut self, id: &NodeId, event: EngineEvent) -> Result<(), ThreadError> {
        self.refresh()?;
        self.ensure_known(id)?;
        self.process_engine(event);
        Ok(())
    }

    /// Tears the view down. Idempotent.
    pub fn close(&mut self) {
        if self.engine.is_closed() {
            return;
        }
        self.info(&format!("closing {}", self.engine.scope()));
        self.process_engine(EngineEvent::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    /// Feeds an event into the engine and executes the resulting commands.
    fn process_engine(&mut self, event: EngineEvent) {
        self.trace(&format!("engine.handle_event({:?})", event));
        let cmds = self.engine.handle_event(event);
        for cmd in cmds {
            self.execute_command(cmd);
        }
    }

    fn execute_command(&mut self, cmd: EngineCommand) {
        self.trace(&format!("cmd: {:?}", cmd));
        match cmd {
            EngineCommand::ReportOrphan { id, parent_id } => {
                log::warn!(
                    "[SESSION] {}: reply {} references missing parent {}; shown at top level",
                    self.engine.scope(),
                    id,
                    parent_id
                );
            }
            EngineCommand::ReportCycle { id, parent_id } => {
                log::warn!(
                    "[SESSION] {}: reply {} closes a parent cycle through {}; shown at top level",
                    self.engine.scope(),
                    id,
                    parent_id
                );
            }
            EngineCommand::Unsubscribe => {
                if let Some(sub) = self.subscription.take() {
                    self.debug(&format!("unsubscribe #{}", sub.id()));
                    self.store.unsubscribe(sub.id());
                }
            }
        }
    }

    fn ensure_open(&self) -> Result<(), ThreadError> {
        if self.engine.is_closed() {
            return Err(ThreadError::Closed);
        }
        Ok(())
    }

    fn ensure_known(&self, id: &NodeId) -> Result<(), ThreadError> {
        if !self.engine.contains(id) {
            return Err(ThreadError::UnknownNode(id.clone()));
        }
        Ok(())
    }

    pub fn engine(&self) -> &ThreadEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn scope(&self) -> &ThreadScope {
        self.engine.scope()
    }

    pub fn viewer(&self) -> &Author {
        &self.viewer
    }

    fn info(&self, msg: &str) {
        log::info!("[SESSION] {:>8}us: {}", self.t(), msg);
    }

    fn debug(&self, msg: &str) {
        log::debug!("[SESSION] {:>8}us: {}", self.t(), msg);
    }

    fn trace(&self, msg: &str) {
        log::trace!("[SESSION] {:>8}us: {}", self.t(), msg);
    }
}

impl<S: RecordStore> Drop for ThreadSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}
