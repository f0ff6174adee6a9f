//! Trending selector: the single highest-ranked reply beneath a root.

use crate::thread::domain::index::ThreadIndex;
use crate::thread::domain::record::{NodeId, ReplyRecord};

/// Highest `(like_count, created_at)` descendant of a depth-0 node.
///
/// Returns `None` for intermediate nodes, unknown ids and roots without
/// descendants. Independent of any view state.
pub fn trending_descendant<'a>(index: &'a ThreadIndex, root: &NodeId) -> Option<&'a ReplyRecord> {
    if !index.is_root(root) {
        return None;
    }

    index
        .descendants(root)
        .into_iter()
        .max_by(|a, b| a.trending_key().cmp(&b.trending_key()))
}
