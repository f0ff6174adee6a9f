//! Per-view expand/collapse/focus flags.
//!
//! Expand and collapse are orthogonal flags. A node can carry both; collapse
//! always wins when visibility is computed, and clearing it restores whatever
//! expand flags were set underneath.

use std::collections::HashSet;

use serde::Serialize;

use crate::thread::domain::index::ThreadIndex;
use crate::thread::domain::record::NodeId;

/// Effective display state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Default,
    Expanded,
    Collapsed,
}

/// Process-local view state for one thread-scope view. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    expanded: HashSet<NodeId>,
    collapsed: HashSet<NodeId>,
    focused: Option<NodeId>,
    draft_reply_target: Option<NodeId>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, id: &NodeId) -> NodeState {
        if self.collapsed.contains(id) {
            NodeState::Collapsed
        } else if self.expanded.contains(id) {
            NodeState::Expanded
        } else {
            NodeState::Default
        }
    }

    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.expanded.contains(id)
    }

    pub fn is_collapsed(&self, id: &NodeId) -> bool {
        self.collapsed.contains(id)
    }

    /// Flips `default <-> expanded`. Returns the new expand flag.
    pub fn toggle_expand(&mut self, id: &NodeId) -> bool {
        if self.expanded.remove(id) {
            false
        } else {
            self.expanded.insert(id.clone());
            true
        }
    }

    /// Flips membership in the collapsed set. Returns the new collapse flag.
    pub fn toggle_collapse(&mut self, id: &NodeId) -> bool {
        if self.collapsed.remove(id) {
            false
        } else {
            self.collapsed.insert(id.clone());
            true
        }
    }

    pub fn expand(&mut self, id: &NodeId) {
        self.expanded.insert(id.clone());
    }

    pub fn uncollapse(&mut self, id: &NodeId) {
        self.collapsed.remove(id);
    }

    pub fn focused(&self) -> Option<&NodeId> {
        self.focused.as_ref()
    }

    pub fn focus(&mut self, id: NodeId) {
        self.focused = Some(id);
    }

    pub fn unfocus(&mut self) {
        self.focused = None;
    }

    pub fn draft_reply_target(&self) -> Option<&NodeId> {
        self.draft_reply_target.as_ref()
    }

    pub fn set_draft_reply_target(&mut self, target: Option<NodeId>) {
        self.draft_reply_target = target;
    }

    /// Make `id` and its children visible after the viewer replied to it.
    ///
    /// Clears collapse on `id` and every ancestor, expands `id`, and expands
    /// each ancestor whose last-`n` slice would otherwise cut the path.
    pub fn reveal(&mut self, index: &ThreadIndex, id: &NodeId, visible_children: usize) {
        let mut path = index.ancestors(id);
        path.push(id.clone());

        for pair in path.windows(2) {
            let (ancestor, next) = (&pair[0], &pair[1]);
            self.collapsed.remove(ancestor);
            if !in_default_slice(index, ancestor, next, visible_children) {
                self.expanded.insert(ancestor.clone());
            }
        }

        self.collapsed.remove(id);
        self.expanded.insert(id.clone());
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Whether `child` is among the last `n` children of `parent`.
pub(crate) fn in_default_slice(
    index: &ThreadIndex,
    parent: &NodeId,
    child: &NodeId,
    n: usize,
) -> bool {
    let children = index.children(parent);
    let start = children.len().saturating_sub(n);
    children[start..].contains(child)
}
