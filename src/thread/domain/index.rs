//! Thread index.
//!
//! Maintains `id -> record` and `parent id -> ordered children` maps from an
//! unordered stream of upserts and removals. Arrival order does not matter:
//! children lists are kept sorted by `(created_at, id)` on every insert.
//!
//! A record whose `parent_id` does not resolve is an *orphan*. Orphans are
//! rendered as top-level nodes; once their parent arrives they are re-attached
//! automatically because `children_of` is keyed by the referenced parent id,
//! present or not.
//!
//! Parent references can also form a cycle (`a -> b -> a`). The member with
//! the smallest id is detached from its parent's children list and rendered at
//! depth 0, so every tree walk stays finite. It is re-attached once the cycle
//! is broken.

use std::collections::{HashMap, HashSet};

use crate::thread::domain::record::{NodeId, ReplyRecord};

/// What an upsert did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Existing record replaced (normally a like-count change).
    Updated,
}

#[derive(Debug, Default, Clone)]
pub struct ThreadIndex {
    by_id: HashMap<NodeId, ReplyRecord>,

    /// parent id -> children ids, sorted by `(created_at, id)`.
    /// Keyed by the referenced parent even when that parent is not indexed yet.
    children_of: HashMap<NodeId, Vec<NodeId>>,

    /// Records with `parent_id = None`, sorted like siblings.
    top_level: Vec<NodeId>,

    /// One member per parent cycle, listed under no parent.
    cycle_heads: HashSet<NodeId>,
}

impl ThreadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full build from a batch of records in any order.
    pub fn from_records<I: IntoIterator<Item = ReplyRecord>>(records: I) -> Self {
        let mut index = Self::new();
        for record in records {
            index.upsert(record);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&ReplyRecord> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ReplyRecord> {
        self.by_id.values()
    }

    /// Insert a new record or replace an existing one with the same id.
    pub fn upsert(&mut self, record: ReplyRecord) -> UpsertOutcome {
        let id = record.id.clone();

        if let Some(prev) = self.by_id.get_mut(&id) {
            let moved =
                prev.parent_id != record.parent_id || prev.created_at != record.created_at;

            if !moved {
                *prev = record;
                return UpsertOutcome::Updated;
            }

            // Records are immutable apart from likes; a changed position is
            // tolerated by re-linking.
            log::debug!("[INDEX] record {} changed position, re-linking", id);
            self.unlink(&id);
            self.by_id.insert(id.clone(), record);
            self.link(&id);
            self.reattach_broken_cycles();
            return UpsertOutcome::Updated;
        }

        log::trace!("[INDEX] insert {} (parent={:?})", id, record.parent_id);
        self.by_id.insert(id.clone(), record);
        self.link(&id);
        UpsertOutcome::Inserted
    }

    /// Drop a record. Its children stay indexed and become orphans until the
    /// parent reappears.
    pub fn remove(&mut self, id: &NodeId) -> Option<ReplyRecord> {
        if !self.by_id.contains_key(id) {
            return None;
        }
        self.unlink(id);
        let removed = self.by_id.remove(id);
        self.reattach_broken_cycles();
        removed
    }

    /// Direct children of `id`, oldest first.
    pub fn children(&self, id: &NodeId) -> &[NodeId] {
        self.children_of.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes rendered at depth 0: true top-level records, orphans and cycle
    /// heads, ordered like siblings.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<&ReplyRecord> = self
            .top_level
            .iter()
            .chain(self.orphans().iter())
            .chain(self.cycle_heads.iter())
            .filter_map(|id| self.by_id.get(id))
            .collect();
        roots.sort_by(|a, b| a.sibling_key().cmp(&b.sibling_key()));
        roots.into_iter().map(|r| r.id.clone()).collect()
    }

    pub fn is_orphan(&self, id: &NodeId) -> bool {
        match self.by_id.get(id).and_then(|r| r.parent_id.as_ref()) {
            Some(parent) => !self.by_id.contains_key(parent),
            None => false,
        }
    }

    /// Records whose parent reference does not resolve.
    pub fn orphans(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .by_id
            .keys()
            .filter(|id| self.is_orphan(id))
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Records detached to break a parent cycle, one per cycle.
    pub fn cycles(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self.cycle_heads.iter().cloned().collect();
        out.sort();
        out
    }

    pub fn is_cycle_head(&self, id: &NodeId) -> bool {
        self.cycle_heads.contains(id)
    }

    /// Whether `id` renders at depth 0 (top-level, orphan or cycle head).
    pub fn is_root(&self, id: &NodeId) -> bool {
        match self.by_id.get(id) {
            Some(r) => r.parent_id.is_none() || self.is_orphan(id) || self.is_cycle_head(id),
            None => false,
        }
    }

    /// All transitive children of `id`, order unspecified.
    pub fn descendants(&self, id: &NodeId) -> Vec<&ReplyRecord> {
        let mut out = Vec::new();
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut stack: Vec<&NodeId> = self.children(id).iter().collect();

        while let Some(next) = stack.pop() {
            if next == id || !seen.insert(next) {
                continue;
            }
            if let Some(record) = self.by_id.get(next) {
                out.push(record);
            }
            stack.extend(self.children(next).iter());
        }
        out
    }

    /// Ancestor chain of `id`, top-most first, excluding `id` itself.
    ///
    /// Stops at the first unresolvable parent (so an orphan's chain is empty),
    /// at a cycle head and at any repeated id.
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        if self.is_cycle_head(id) {
            return chain;
        }
        let mut seen: HashSet<&NodeId> = HashSet::new();
        seen.insert(id);

        let mut cursor = self.by_id.get(id).and_then(|r| r.parent_id.as_ref());
        while let Some(parent) = cursor {
            if !seen.insert(parent) {
                break;
            }
            let Some(record) = self.by_id.get(parent) else {
                break;
            };
            chain.push(parent.clone());
            if self.is_cycle_head(parent) {
                break;
            }
            cursor = record.parent_id.as_ref();
        }

        chain.reverse();
        chain
    }

    /// The depth-0 node `id` renders under.
    pub fn root_of(&self, id: &NodeId) -> Option<NodeId> {
        if !self.by_id.contains_key(id) {
            return None;
        }
        Some(
            self.ancestors(id)
                .into_iter()
                .next()
                .unwrap_or_else(|| id.clone()),
        )
    }

    // ================================
    // Linking
    // ================================

    fn link(&mut self, id: &NodeId) {
        let Some(parent) = self.by_id.get(id).map(|r| r.parent_id.clone()) else {
            return;
        };

        if parent.is_some() && self.detach_new_cycle(id) {
            return;
        }

        let mut list = match &parent {
            Some(p) => self.children_of.remove(p).unwrap_or_default(),
            None => std::mem::take(&mut self.top_level),
        };
        self.insert_sorted(&mut list, id);
        match parent {
            Some(p) => {
                self.children_of.insert(p, list);
            }
            None => self.top_level = list,
        }
    }

    fn unlink(&mut self, id: &NodeId) {
        // heads sit in no children list
        if self.cycle_heads.remove(id) {
            return;
        }
        let Some(parent) = self.by_id.get(id).map(|r| r.parent_id.clone()) else {
            return;
        };

        match parent {
            Some(p) => {
                if let Some(list) = self.children_of.get_mut(&p) {
                    list.retain(|c| c != id);
                    if list.is_empty() {
                        self.children_of.remove(&p);
                    }
                }
            }
            None => self.top_level.retain(|c| c != id),
        }
    }

    /// Members of the parent cycle running through `id`, starting at `id`.
    fn cycle_through(&self, id: &NodeId) -> Option<Vec<NodeId>> {
        let mut members = vec![id.clone()];
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut cursor = self.by_id.get(id)?.parent_id.as_ref();

        while let Some(parent) = cursor {
            if parent == id {
                return Some(members);
            }
            if !seen.insert(parent) {
                return None;
            }
            let record = self.by_id.get(parent)?;
            members.push(parent.clone());
            cursor = record.parent_id.as_ref();
        }
        None
    }

    /// Called while linking `id`. If that closes a new cycle, detaches its
    /// smallest member and returns whether `id` itself was the one detached.
    fn detach_new_cycle(&mut self, id: &NodeId) -> bool {
        let Some(members) = self.cycle_through(id) else {
            return false;
        };
        if members.iter().any(|m| self.cycle_heads.contains(m)) {
            return false;
        }
        let Some(head) = members.iter().min().cloned() else {
            return false;
        };

        log::warn!(
            "[INDEX] parent cycle of {} replies through {}; {} shown at top level",
            members.len(),
            id,
            head
        );
        if &head != id {
            self.unlink(&head);
        }
        self.cycle_heads.insert(head.clone());
        &head == id
    }

    /// Re-attaches heads whose cycle no longer exists.
    fn reattach_broken_cycles(&mut self) {
        let broken: Vec<NodeId> = self
            .cycle_heads
            .iter()
            .filter(|head| self.cycle_through(head).is_none())
            .cloned()
            .collect();
        for head in broken {
            log::debug!("[INDEX] cycle through {} broken, re-attaching", head);
            self.cycle_heads.remove(&head);
            self.link(&head);
        }
    }

    fn insert_sorted(&self, list: &mut Vec<NodeId>, id: &NodeId) {
        let Some(record) = self.by_id.get(id) else {
            return;
        };
        let key = record.sibling_key();
        let pos = list.partition_point(|sibling| {
            self.by_id
                .get(sibling)
                .map(|s| s.sibling_key() < key)
                .unwrap_or(true)
        });
        list.insert(pos, id.clone());
    }
}
