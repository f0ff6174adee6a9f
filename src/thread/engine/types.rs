use crate::thread::domain::record::{NodeId, ReplyRecord};
use crate::thread::store::StoreUpdate;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Pushed by the store. Queued; applied at the next flush.
    Store(StoreUpdate),

    /// The store acknowledged a reply written by this view.
    ReplyStored(ReplyRecord),

    /// The store acknowledged a like toggle by the viewer.
    LikeToggled { reply_id: NodeId, liked: bool },

    ToggleExpand(NodeId),
    ToggleCollapse(NodeId),
    Focus(NodeId),
    Unfocus,
    SetDraftTarget(Option<NodeId>),

    /// The view is going away.
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// A record references a parent the index does not hold.
    ReportOrphan { id: NodeId, parent_id: NodeId },

    /// Parent links form a loop; `id` is shown at top level until it is broken.
    ReportCycle { id: NodeId, parent_id: NodeId },

    /// Stop consuming updates for this scope.
    Unsubscribe,
}
