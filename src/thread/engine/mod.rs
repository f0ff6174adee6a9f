//! Thread view engine.
//!
//! The functional core of a thread-scope view. It acts as a pure state machine:
//! - **Input**: `EngineEvent` (store updates, acknowledged writes, view actions).
//! - **Output**: `Vec<EngineCommand>` (side effects for the session to execute).
//!
//! Store updates are queued and only applied on the next flush. Every view
//! action flushes first, and callers flush before reading a render model, so a
//! render always reflects every update received so far.
//!
//! # Architecture guarantees
//! * **No I/O**: never touches the record store.
//! * **No Async**: all functions are blocking and CPU-bound.
//! * **Deterministic**: the same events in the same order give the same output.

pub mod state;
mod logic;
pub mod types;


pub use crate::thread::engine::types::{EngineCommand, EngineEvent};

use std::collections::{HashSet, VecDeque};

use crate::config::EngineConfig;
use crate::thread::domain::index::ThreadIndex;
use crate::thread::domain::record::{NodeId, ReplyRecord, ThreadScope};
use crate::thread::domain::trending::trending_descendant;
use crate::thread::domain::view_state::ViewState;
use crate::thread::domain::visibility::{self, RenderContext, RenderModel, VisibleReplies};

use state::EngineState;

#[derive(Debug)]
pub struct ThreadEngine {
    state: EngineState,
}

impl ThreadEngine {
    pub fn new(scope: ThreadScope, config: EngineConfig) -> Self {
        let focus_enabled = config.focus_enabled_for(scope.kind);
        Self {
            state: EngineState {
                scope,
                config,
                focus_enabled,
                index: ThreadIndex::new(),
                view: ViewState::new(),
                liked: HashSet::new(),
                pending: VecDeque::new(),
                reported_orphans: HashSet::new(),
                reported_cycles: HashSet::new(),
                closed: false,
            },
        }
    }

    /// The main event handler.
    ///
    /// Consumes an event and returns the commands the session must execute.
    /// Events after `Close` are ignored.
    pub fn handle_event(&mut self, event: EngineEvent) -> Vec<EngineCommand> {
        if self.state.closed {
            log::trace!("[ENGINE] {} closed, dropping {:?}", self.state.scope, event);
            return vec![];
        }

        match event {
            EngineEvent::Store(update) => logic::on_store_update(&mut self.state, update),
            EngineEvent::Close => logic::on_close(&mut self.state),
            action => {
                let mut cmds = logic::flush(&mut self.state);
                cmds.extend(self.handle_action(action));
                cmds
            }
        }
    }

    fn handle_action(&mut self, event: EngineEvent) -> Vec<EngineCommand> {
        let state = &mut self.state;
        match event {
            EngineEvent::ReplyStored(record) => logic::on_reply_stored(state, record),
            EngineEvent::LikeToggled { reply_id, liked } => {
                logic::on_like_toggled(state, reply_id, liked)
            }
            EngineEvent::ToggleExpand(id) => logic::on_toggle_expand(state, id),
            EngineEvent::ToggleCollapse(id) => logic::on_toggle_collapse(state, id),
            EngineEvent::Focus(id) => logic::on_focus(state, id),
            EngineEvent::Unfocus => logic::on_unfocus(state),
            EngineEvent::SetDraftTarget(target) => logic::on_set_draft_target(state, target),
            EngineEvent::Store(_) | EngineEvent::Close => vec![],
        }
    }

    /// Applies queued store updates.
    pub fn flush(&mut self) -> Vec<EngineCommand> {
        if self.state.closed {
            return vec![];
        }
        logic::flush(&mut self.state)
    }

    pub fn has_pending(&self) -> bool {
        !self.state.pending.is_empty()
    }

    /// Render model for `root` from the applied state. Flush first.
    pub fn render_model(&self, root: &NodeId) -> Option<RenderModel> {
        if self.has_pending() {
            log::debug!("[ENGINE] render of {} with {} updates still queued", root, self.state.pending.len());
        }
        visibility::render_model(&self.render_context(), root)
    }

    pub fn visible_replies(&self, node: &NodeId) -> VisibleReplies<'_> {
        visibility::visible_replies(&self.render_context(), node)
    }

    pub fn trending(&self, root: &NodeId) -> Option<&ReplyRecord> {
        trending_descendant(&self.state.index, root)
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.state.index.roots()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.state.index.contains(id)
    }

    pub fn index(&self) -> &ThreadIndex {
        &self.state.index
    }

    pub fn view(&self) -> &ViewState {
        &self.state.view
    }

    pub fn scope(&self) -> &ThreadScope {
        &self.state.scope
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    pub fn focus_enabled(&self) -> bool {
        self.state.focus_enabled
    }

    pub fn is_liked(&self, id: &NodeId) -> bool {
        self.state.liked.contains(id)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed
    }

    fn render_context(&self) -> RenderContext<'_> {
        RenderContext::new(
            &self.state.index,
            &self.state.view,
            &self.state.config,
            &self.state.liked,
        )
        .with_focus_enabled(self.state.focus_enabled)
    }
}
