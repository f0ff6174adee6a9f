use std::collections::{HashSet, VecDeque};

use crate::config::EngineConfig;
use crate::thread::domain::index::ThreadIndex;
use crate::thread::domain::record::{NodeId, ThreadScope};
use crate::thread::domain::view_state::ViewState;
use crate::thread::store::StoreUpdate;

#[derive(Debug)]
pub struct EngineState {
    pub scope: ThreadScope,
    pub config: EngineConfig,

    /// Drill-down support for this scope (config + scope kind).
    pub focus_enabled: bool,

    pub index: ThreadIndex,
    pub view: ViewState,

    /// Replies the viewer likes, as acknowledged by the store.
    pub liked: HashSet<NodeId>,

    /// Store updates received but not yet applied, in arrival order.
    pub pending: VecDeque<StoreUpdate>,

    /// Orphans already reported, so each is logged once.
    pub reported_orphans: HashSet<NodeId>,

    /// Cycle heads already reported.
    pub reported_cycles: HashSet<NodeId>,

    pub closed: bool,
}
