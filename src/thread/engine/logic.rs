use crate::thread::domain::record::{NodeId, ReplyRecord};
use crate::thread::engine::state::EngineState;
use crate::thread::engine::types::EngineCommand;
use crate::thread::store::StoreUpdate;

pub fn on_store_update(state: &mut EngineState, update: StoreUpdate) -> Vec<EngineCommand> {
    log::trace!("[ENGINE] queued {:?}", update_id(&update));
    state.pending.push_back(update);
    vec![]
}

/// Applies every queued store update, in arrival order.
pub fn flush(state: &mut EngineState) -> Vec<EngineCommand> {
    if state.pending.is_empty() {
        return vec![];
    }

    let count = state.pending.len();
    while let Some(update) = state.pending.pop_front() {
        match update {
            StoreUpdate::Upsert(record) => {
                state.index.upsert(record);
            }
            StoreUpdate::Remove(id) => {
                if state.index.remove(&id).is_none() {
                    log::trace!("[ENGINE] remove of unknown {}", id);
                }
                state.liked.remove(&id);
            }
        }
    }
    log::debug!(
        "[ENGINE] flushed {} updates for {} ({} records)",
        count,
        state.scope,
        state.index.len()
    );

    report_new_orphans(state)
}

/// One `ReportOrphan` per record that became an orphan since the last report,
/// and one `ReportCycle` per newly detached cycle head.
fn report_new_orphans(state: &mut EngineState) -> Vec<EngineCommand> {
    let orphans = state.index.orphans();
    state.reported_orphans.retain(|id| orphans.contains(id));

    let mut cmds = Vec::new();
    for id in orphans {
        if !state.reported_orphans.insert(id.clone()) {
            continue;
        }
        if let Some(parent_id) = state.index.get(&id).and_then(|r| r.parent_id.clone()) {
            cmds.push(EngineCommand::ReportOrphan { id, parent_id });
        }
    }

    let heads = state.index.cycles();
    state.reported_cycles.retain(|id| heads.contains(id));
    for id in heads {
        if !state.reported_cycles.insert(id.clone()) {
            continue;
        }
        if let Some(parent_id) = state.index.get(&id).and_then(|r| r.parent_id.clone()) {
            cmds.push(EngineCommand::ReportCycle { id, parent_id });
        }
    }
    cmds
}

/// The viewer's own reply landed: index it and make it visible.
///
/// If the store already pushed the record, the indexed copy wins; it may
/// carry likes the acknowledgement predates.
pub fn on_reply_stored(state: &mut EngineState, record: ReplyRecord) -> Vec<EngineCommand> {
    let parent = record.parent_id.clone();
    log::debug!("[ENGINE] reply {} stored (parent={:?})", record.id, parent);
    if state.index.contains(&record.id) {
        log::trace!("[ENGINE] {} already indexed; keeping store copy", record.id);
    } else {
        state.index.upsert(record);
    }

    if let Some(parent) = parent {
        if state.index.contains(&parent) {
            let n = state.config.default_visible_children;
            state.view.reveal(&state.index, &parent, n);
        }
    }
    state.view.set_draft_reply_target(None);

    report_new_orphans(state)
}

pub fn on_like_toggled(state: &mut EngineState, reply_id: NodeId, liked: bool) -> Vec<EngineCommand> {
    if liked {
        state.liked.insert(reply_id);
    } else {
        state.liked.remove(&reply_id);
    }
    vec![]
}

pub fn on_toggle_expand(state: &mut EngineState, id: NodeId) -> Vec<EngineCommand> {
    let expanded = state.view.toggle_expand(&id);
    log::debug!("[ENGINE] {} expanded={}", id, expanded);
    vec![]
}

pub fn on_toggle_collapse(state: &mut EngineState, id: NodeId) -> Vec<EngineCommand> {
    let collapsed = state.view.toggle_collapse(&id);
    log::debug!("[ENGINE] {} collapsed={}", id, collapsed);
    vec![]
}

pub fn on_focus(state: &mut EngineState, id: NodeId) -> Vec<EngineCommand> {
    if !state.focus_enabled {
        log::debug!("[ENGINE] focus on {} ignored: drill-down disabled for {}", id, state.scope);
        return vec![];
    }
    state.view.focus(id);
    vec![]
}

pub fn on_unfocus(state: &mut EngineState) -> Vec<EngineCommand> {
    state.view.unfocus();
    vec![]
}

pub fn on_set_draft_target(state: &mut EngineState, target: Option<NodeId>) -> Vec<EngineCommand> {
    state.view.set_draft_reply_target(target);
    vec![]
}

/// Drops queued updates and view state; no further events are accepted.
pub fn on_close(state: &mut EngineState) -> Vec<EngineCommand> {
    log::info!(
        "[ENGINE] closing {} ({} queued updates discarded)",
        state.scope,
        state.pending.len()
    );
    state.closed = true;
    state.pending.clear();
    state.view.clear();
    state.liked.clear();
    vec![EngineCommand::Unsubscribe]
}

fn update_id(update: &StoreUpdate) -> &NodeId {
    match update {
        StoreUpdate::Upsert(record) => &record.id,
        StoreUpdate::Remove(id) => id,
    }
}
