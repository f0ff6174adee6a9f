//! Visibility calculator.
//!
//! Turns the thread index plus view flags into the render model handed to the
//! presentation layer. Rules, per node with direct children:
//!
//! 1. collapsed: no descendants at all, whatever their own flags say;
//! 2. expanded: every direct child;
//! 3. default: the last `N` children by `created_at`, the rest counted as hidden.
//!
//! Roots additionally get a detached *trending preview* when their trending
//! descendant is not reachable through the rules above.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::config::EngineConfig;
use crate::thread::domain::index::ThreadIndex;
use crate::thread::domain::record::{NodeId, ReplyRecord};
use crate::thread::domain::trending::trending_descendant;
use crate::thread::domain::view_state::{in_default_slice, NodeState, ViewState};

/// Visible direct children of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleReplies<'a> {
    pub shown: Vec<&'a ReplyRecord>,
    pub hidden_count: usize,
    /// Only ever `true` for depth-0 nodes.
    pub show_trending_preview: bool,
}

/// Everything the calculator reads.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub index: &'a ThreadIndex,
    pub view: &'a ViewState,
    pub config: &'a EngineConfig,
    /// Replies the viewer currently likes.
    pub liked: &'a HashSet<NodeId>,
    pub focus_enabled: bool,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        index: &'a ThreadIndex,
        view: &'a ViewState,
        config: &'a EngineConfig,
        liked: &'a HashSet<NodeId>,
    ) -> Self {
        Self {
            index,
            view,
            config,
            liked,
            focus_enabled: true,
        }
    }

    pub fn with_focus_enabled(mut self, enabled: bool) -> Self {
        self.focus_enabled = enabled;
        self
    }

    fn n(&self) -> usize {
        self.config.default_visible_children
    }
}

/// One rendered reply with its computed view state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderNode {
    pub record: ReplyRecord,
    pub depth: usize,
    pub state: NodeState,
    /// Total direct children, visible or not.
    pub reply_count: usize,
    /// Direct children not shown ("show N previous replies").
    pub hidden_count: usize,
    pub is_trending: bool,
    /// Detached trending block rendered under the root.
    pub is_preview: bool,
    pub liked_by_viewer: bool,
    pub is_draft_target: bool,
    pub children: Vec<RenderNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderModel {
    pub root: ReplyRecord,
    pub root_state: NodeState,
    pub visible: Vec<RenderNode>,
    pub trending_preview: Option<RenderNode>,
    pub hidden_counts: BTreeMap<NodeId, usize>,
    /// Set when the model is a drill-down view.
    pub focused: Option<NodeId>,
}

impl RenderModel {
    /// Nodes in display order: preview block first, then the tree depth-first.
    pub fn flatten(&self) -> Vec<&RenderNode> {
        fn walk<'n>(node: &'n RenderNode, out: &mut Vec<&'n RenderNode>) {
            out.push(node);
            for child in &node.children {
                walk(child, out);
            }
        }

        let mut out = Vec::new();
        if let Some(preview) = &self.trending_preview {
            out.push(preview);
        }
        for node in &self.visible {
            walk(node, &mut out);
        }
        out
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.flatten().iter().any(|n| &n.record.id == id && !n.is_preview)
    }
}

/// Visible direct children of `node` under the current flags.
pub fn visible_replies<'a>(ctx: &RenderContext<'a>, node: &NodeId) -> VisibleReplies<'a> {
    let index = ctx.index;
    let children = index.children(node);

    let shown_ids: &[NodeId] = match ctx.view.state_of(node) {
        NodeState::Collapsed => &[],
        NodeState::Expanded => children,
        NodeState::Default => &children[children.len().saturating_sub(ctx.n())..],
    };

    let shown: Vec<&'a ReplyRecord> = shown_ids.iter().filter_map(|id| index.get(id)).collect();
    let hidden_count = children.len() - shown.len();

    let show_trending_preview = ctx.config.trending_preview
        && index.is_root(node)
        && !ctx.view.is_collapsed(node)
        && trending_descendant(index, node)
            .map(|t| !is_effectively_visible(ctx, node, &t.id))
            .unwrap_or(false);

    VisibleReplies {
        shown,
        hidden_count,
        show_trending_preview,
    }
}

/// Whether `target` is reachable from `root` by normal traversal.
///
/// Walks the ancestor path from the root downwards; every step must pass
/// through a non-collapsed ancestor that is either expanded or has the next
/// node in its default slice.
pub fn is_effectively_visible(ctx: &RenderContext<'_>, root: &NodeId, target: &NodeId) -> bool {
    let mut path = ctx.index.ancestors(target);
    if path.first() != Some(root) {
        return false;
    }
    path.push(target.clone());

    path.windows(2).all(|pair| {
        let (ancestor, next) = (&pair[0], &pair[1]);
        if ctx.view.is_collapsed(ancestor) {
            return false;
        }
        ctx.view.is_expanded(ancestor) || in_default_slice(ctx.index, ancestor, next, ctx.n())
    })
}

/// Render model for `root`, or `None` if the id is not indexed.
pub fn render_model(ctx: &RenderContext<'_>, root: &NodeId) -> Option<RenderModel> {
    let record = ctx.index.get(root)?;
    let trending = trending_descendant(ctx.index, root).map(|t| t.id.clone());
    let mut hidden_counts = BTreeMap::new();
    let mut seen = HashSet::from([root.clone()]);

    if let Some(focused) = focus_target(ctx, root) {
        let visible = build_focus_chain(
            ctx,
            root,
            &focused,
            trending.as_ref(),
            &mut hidden_counts,
            &mut seen,
        );
        return Some(RenderModel {
            root: record.clone(),
            root_state: ctx.view.state_of(root),
            visible,
            trending_preview: None,
            hidden_counts,
            focused: Some(focused),
        });
    }

    let replies = visible_replies(ctx, root);
    if replies.hidden_count > 0 {
        hidden_counts.insert(root.clone(), replies.hidden_count);
    }

    let visible = replies
        .shown
        .iter()
        .filter_map(|child| {
            build_node(ctx, &child.id, 1, trending.as_ref(), &mut hidden_counts, &mut seen)
        })
        .collect();

    let trending_preview = if replies.show_trending_preview {
        trending
            .as_ref()
            .and_then(|id| ctx.index.get(id))
            .map(|t| RenderNode {
                is_preview: true,
                ..leaf(ctx, t, 1, true)
            })
    } else {
        None
    };

    Some(RenderModel {
        root: record.clone(),
        root_state: ctx.view.state_of(root),
        visible,
        trending_preview,
        hidden_counts,
        focused: None,
    })
}

fn build_node(
    ctx: &RenderContext<'_>,
    id: &NodeId,
    depth: usize,
    trending: Option<&NodeId>,
    hidden_counts: &mut BTreeMap<NodeId, usize>,
    seen: &mut HashSet<NodeId>,
) -> Option<RenderNode> {
    // each record renders at most once per model
    if !seen.insert(id.clone()) {
        return None;
    }
    let record = ctx.index.get(id)?;
    let replies = visible_replies(ctx, id);
    if replies.hidden_count > 0 {
        hidden_counts.insert(id.clone(), replies.hidden_count);
    }

    let children = replies
        .shown
        .iter()
        .filter_map(|child| build_node(ctx, &child.id, depth + 1, trending, hidden_counts, seen))
        .collect();

    Some(RenderNode {
        hidden_count: replies.hidden_count,
        children,
        ..leaf(ctx, record, depth, trending == Some(id))
    })
}

/// Drill-down: only the chain from the root to the focused node, then the
/// focused subtree under the normal rules.
fn build_focus_chain(
    ctx: &RenderContext<'_>,
    root: &NodeId,
    focused: &NodeId,
    trending: Option<&NodeId>,
    hidden_counts: &mut BTreeMap<NodeId, usize>,
    seen: &mut HashSet<NodeId>,
) -> Vec<RenderNode> {
    let ancestors = ctx.index.ancestors(focused);
    let start = ancestors.iter().position(|a| a == root).map(|p| p + 1).unwrap_or(0);
    let mut chain: Vec<NodeId> = ancestors[start..].to_vec();
    chain.push(focused.clone());

    let root_hidden = ctx.index.children(root).len().saturating_sub(1);
    if root_hidden > 0 {
        hidden_counts.insert(root.clone(), root_hidden);
    }

    // build bottom-up so each chain node owns the next
    seen.extend(chain[..chain.len() - 1].iter().cloned());
    let Some(mut below) = build_node(ctx, focused, chain.len(), trending, hidden_counts, seen) else {
        return Vec::new();
    };
    for (pos, id) in chain.iter().enumerate().rev().skip(1) {
        let Some(record) = ctx.index.get(id) else {
            continue;
        };
        let hidden = ctx.index.children(id).len().saturating_sub(1);
        if hidden > 0 {
            hidden_counts.insert(id.clone(), hidden);
        }
        below = RenderNode {
            hidden_count: hidden,
            children: vec![below],
            ..leaf(ctx, record, pos + 1, trending == Some(id))
        };
    }
    vec![below]
}

fn focus_target(ctx: &RenderContext<'_>, root: &NodeId) -> Option<NodeId> {
    if !ctx.focus_enabled {
        return None;
    }
    let focused = ctx.view.focused()?;
    if focused == root || !ctx.index.contains(focused) {
        return None;
    }
    ctx.index
        .ancestors(focused)
        .contains(root)
        .then(|| focused.clone())
}

fn leaf(ctx: &RenderContext<'_>, record: &ReplyRecord, depth: usize, is_trending: bool) -> RenderNode {
    RenderNode {
        record: record.clone(),
        depth,
        state: ctx.view.state_of(&record.id),
        reply_count: ctx.index.children(&record.id).len(),
        hidden_count: 0,
        is_trending,
        is_preview: false,
        liked_by_viewer: ctx.liked.contains(&record.id),
        is_draft_target: ctx.view.draft_reply_target() == Some(&record.id),
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::domain::record::test_support::reply;

    struct Fixture {
        index: ThreadIndex,
        view: ViewState,
        config: EngineConfig,
        liked: HashSet<NodeId>,
    }

    impl Fixture {
        fn new(records: Vec<ReplyRecord>) -> Self {
            Self {
                index: ThreadIndex::from_records(records),
                view: ViewState::new(),
                config: EngineConfig::default(),
                liked: HashSet::new(),
            }
        }

        fn ctx(&self) -> RenderContext<'_> {
            RenderContext::new(&self.index, &self.view, &self.config, &self.liked)
        }

        fn model(&self, root: &str) -> RenderModel {
            render_model(&self.ctx(), &root.into()).unwrap()
        }
    }

    fn shown_ids(v: &VisibleReplies<'_>) -> Vec<String> {
        v.shown.iter().map(|r| r.id.to_string()).collect()
    }

    fn five_children() -> Vec<ReplyRecord> {
        let mut records = vec![reply("r", None, 0, 0)];
        for i in 1..=5 {
            records.push(reply(&format!("c{}", i), Some("r"), i, 0));
        }
        records
    }

    #[test]
    fn default_shows_last_two() {
        let fx = Fixture::new(five_children());

        let v = visible_replies(&fx.ctx(), &"r".into());

        assert_eq!(shown_ids(&v), vec!["c4", "c5"]);
        assert_eq!(v.hidden_count, 3);
    }

    #[test]
    fn expanded_shows_all() {
        let mut fx = Fixture::new(five_children());
        fx.view.toggle_expand(&"r".into());

        let v = visible_replies(&fx.ctx(), &"r".into());

        assert_eq!(v.shown.len(), 5);
        assert_eq!(v.hidden_count, 0);
    }

    #[test]
    fn configured_slice_size_is_used() {
        let mut fx = Fixture::new(five_children());
        fx.config.default_visible_children = 3;

        let v = visible_replies(&fx.ctx(), &"r".into());

        assert_eq!(shown_ids(&v), vec!["c3", "c4", "c5"]);
        assert_eq!(v.hidden_count, 2);
    }

    #[test]
    fn collapse_absorbs_expanded_descendants() {
        let mut fx = Fixture::new(vec![
            reply("r", None, 0, 0),
            reply("a", Some("r"), 1, 0),
            reply("b", Some("a"), 2, 0),
            reply("c", Some("b"), 3, 0),
        ]);
        fx.view.toggle_expand(&"a".into());
        fx.view.toggle_expand(&"b".into());
        let before = fx.model("r");

        fx.view.toggle_collapse(&"a".into());
        let collapsed = fx.model("r");

        assert_eq!(collapsed.visible.len(), 1);
        assert!(collapsed.visible[0].children.is_empty());
        assert_eq!(collapsed.visible[0].state, NodeState::Collapsed);
        assert_eq!(collapsed.hidden_counts.get(&"a".into()), Some(&1));

        fx.view.toggle_collapse(&"a".into());
        let restored = fx.model("r");

        assert_eq!(restored.visible, before.visible);
        assert!(fx.view.is_expanded(&"b".into()));
    }

    #[test]
    fn trending_already_visible_suppresses_preview() {
        // R(t=0); C1(t=1), C2(t=2, likes=5), C3(t=3)
        let fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("C1", Some("R"), 1, 0),
            reply("C2", Some("R"), 2, 5),
            reply("C3", Some("R"), 3, 0),
        ]);

        let v = visible_replies(&fx.ctx(), &"R".into());
        assert_eq!(shown_ids(&v), vec!["C2", "C3"]);
        assert_eq!(v.hidden_count, 1);
        assert!(!v.show_trending_preview);

        let model = fx.model("R");
        assert!(model.trending_preview.is_none());
        assert!(model.visible[0].is_trending);
        assert_eq!(model.hidden_counts.get(&"R".into()), Some(&1));
    }

    #[test]
    fn hidden_trending_is_promoted() {
        let fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("C1", Some("R"), 1, 0),
            reply("C2", Some("R"), 2, 5),
            reply("C3", Some("R"), 3, 0),
            reply("C4", Some("R"), 4, 0),
        ]);

        let v = visible_replies(&fx.ctx(), &"R".into());
        assert_eq!(shown_ids(&v), vec!["C3", "C4"]);
        assert!(v.show_trending_preview);

        let model = fx.model("R");
        let preview = model.trending_preview.as_ref().unwrap();
        assert_eq!(preview.record.id.as_str(), "C2");
        assert_eq!(preview.depth, 1);
        assert!(preview.is_preview);
        assert_eq!(model.flatten()[0].record.id.as_str(), "C2");
        assert!(!model.contains(&"C2".into()));
    }

    #[test]
    fn expanding_root_removes_preview() {
        let mut fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("C1", Some("R"), 1, 9),
            reply("C2", Some("R"), 2, 0),
            reply("C3", Some("R"), 3, 0),
        ]);
        assert!(fx.model("R").trending_preview.is_some());

        fx.view.toggle_expand(&"R".into());

        assert!(fx.model("R").trending_preview.is_none());
        assert!(fx.model("R").contains(&"C1".into()));
    }

    #[test]
    fn deep_trending_on_visible_path_is_not_promoted() {
        let fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("A", Some("R"), 1, 0),
            reply("A1", Some("A"), 2, 8),
        ]);

        assert!(is_effectively_visible(&fx.ctx(), &"R".into(), &"A1".into()));
        assert!(fx.model("R").trending_preview.is_none());
    }

    #[test]
    fn deep_trending_cut_by_intermediate_slice_is_promoted() {
        let fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("A", Some("R"), 1, 0),
            reply("A1", Some("A"), 2, 8),
            reply("A2", Some("A"), 3, 0),
            reply("A3", Some("A"), 4, 0),
        ]);

        assert!(!is_effectively_visible(&fx.ctx(), &"R".into(), &"A1".into()));
        assert_eq!(
            fx.model("R").trending_preview.unwrap().record.id.as_str(),
            "A1"
        );
    }

    #[test]
    fn collapsed_intermediate_promotes_trending() {
        let mut fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("A", Some("R"), 1, 0),
            reply("A1", Some("A"), 2, 8),
        ]);
        fx.view.toggle_collapse(&"A".into());

        assert!(fx.model("R").trending_preview.is_some());
    }

    #[test]
    fn collapsed_root_hides_everything() {
        let mut fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("C1", Some("R"), 1, 4),
            reply("C2", Some("R"), 2, 0),
            reply("C3", Some("R"), 3, 0),
        ]);
        fx.view.toggle_collapse(&"R".into());

        let model = fx.model("R");

        assert!(model.visible.is_empty());
        assert!(model.trending_preview.is_none());
        assert_eq!(model.root_state, NodeState::Collapsed);
        assert_eq!(model.hidden_counts.get(&"R".into()), Some(&3));
    }

    #[test]
    fn preview_disabled_by_config() {
        let mut fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("C1", Some("R"), 1, 9),
            reply("C2", Some("R"), 2, 0),
            reply("C3", Some("R"), 3, 0),
        ]);
        fx.config.trending_preview = false;

        assert!(fx.model("R").trending_preview.is_none());
    }

    #[test]
    fn nested_default_slices_apply_per_node() {
        let fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("A", Some("R"), 1, 0),
            reply("A1", Some("A"), 2, 0),
            reply("A2", Some("A"), 3, 0),
            reply("A3", Some("A"), 4, 0),
        ]);

        let model = fx.model("R");
        let a = &model.visible[0];

        assert_eq!(a.depth, 1);
        assert_eq!(a.reply_count, 3);
        assert_eq!(a.hidden_count, 1);
        let ids: Vec<&str> = a.children.iter().map(|c| c.record.id.as_str()).collect();
        assert_eq!(ids, vec!["A2", "A3"]);
        assert_eq!(a.children[0].depth, 2);
    }

    #[test]
    fn focus_narrows_to_chain_and_subtree() {
        let mut fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("A", Some("R"), 1, 0),
            reply("B", Some("R"), 2, 0),
            reply("A1", Some("A"), 3, 0),
            reply("A2", Some("A"), 4, 0),
            reply("A1x", Some("A1"), 5, 0),
        ]);
        fx.view.focus("A1".into());

        let model = fx.model("R");
        let order: Vec<&str> = model.flatten().iter().map(|n| n.record.id.as_str()).collect();

        assert_eq!(model.focused, Some("A1".into()));
        assert_eq!(order, vec!["A", "A1", "A1x"]);
        assert_eq!(model.hidden_counts.get(&"R".into()), Some(&1));
        assert_eq!(model.hidden_counts.get(&"A".into()), Some(&1));
        assert!(model.trending_preview.is_none());
    }

    #[test]
    fn focus_elsewhere_or_disabled_is_ignored() {
        let mut fx = Fixture::new(vec![
            reply("R", None, 0, 0),
            reply("A", Some("R"), 1, 0),
            reply("S", None, 2, 0),
            reply("S1", Some("S"), 3, 0),
        ]);
        fx.view.focus("S1".into());
        assert!(fx.model("R").focused.is_none());

        fx.view.focus("A".into());
        let disabled = render_model(&fx.ctx().with_focus_enabled(false), &"R".into()).unwrap();
        assert!(disabled.focused.is_none());
    }

    #[test]
    fn liked_and_draft_flags_are_rendered() {
        let mut fx = Fixture::new(vec![reply("R", None, 0, 0), reply("A", Some("R"), 1, 0)]);
        fx.liked.insert("A".into());
        fx.view.set_draft_reply_target(Some("A".into()));

        let model = fx.model("R");

        assert!(model.visible[0].liked_by_viewer);
        assert!(model.visible[0].is_draft_target);
    }

    #[test]
    fn parent_cycle_renders_once_under_its_head() {
        let fx = Fixture::new(vec![
            reply("r", None, 0, 0),
            reply("b", Some("a"), 2, 0),
            reply("a", Some("b"), 1, 0),
            reply("c", Some("b"), 3, 0),
        ]);

        let model = fx.model("a");
        let ids: Vec<&str> = model.flatten().iter().map(|n| n.record.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        // rendering from inside the cycle terminates as well
        let from_b = fx.model("b");
        assert_eq!(from_b.visible.len(), 1);
        assert!(from_b.visible[0].children.is_empty());
        assert!(!fx.model("r").contains(&"a".into()));
    }

    #[test]
    fn unknown_root_has_no_model() {
        let fx = Fixture::new(vec![]);
        assert!(render_model(&fx.ctx(), &"nope".into()).is_none());
    }
}
