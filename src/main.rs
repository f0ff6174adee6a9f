use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;

use reply_thread_engine::fixture::ThreadFixture;
use reply_thread_engine::{
    Author, EngineConfig, InMemoryRecordStore, NodeId, RenderModel, RenderNode, SessionDriver,
    ThreadSession,
};

/// `PARENT=TEXT`; an empty parent posts a top-level reply.
#[derive(Clone, Debug)]
struct ReplyArg {
    parent: Option<NodeId>,
    text: String,
}

fn parse_reply(raw: &str) -> Result<ReplyArg, String> {
    let (parent, text) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PARENT=TEXT, got {:?}", raw))?;
    let parent = match parent.trim() {
        "" => None,
        id => Some(NodeId::new(id)),
    };
    Ok(ReplyArg {
        parent,
        text: text.to_string(),
    })
}

#[derive(Parser)]
#[command(author, version, about = "Render a reply thread from a JSON fixture")]
struct Args {
    /// Thread fixture (scope, records, like markers).
    #[arg(long)]
    fixture: PathBuf,

    /// Engine config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Roots to render; every root when omitted.
    #[arg(long = "root")]
    roots: Vec<String>,

    #[arg(long, default_value = "viewer")]
    viewer: String,

    #[arg(long = "reply", value_parser = parse_reply)]
    replies: Vec<ReplyArg>,

    #[arg(long = "like")]
    likes: Vec<String>,

    #[arg(long = "expand")]
    expands: Vec<String>,

    #[arg(long = "collapse")]
    collapses: Vec<String>,

    #[arg(long)]
    focus: Option<String>,

    /// Print render models as JSON instead of a tree.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let fixture = ThreadFixture::load(&args.fixture)?;
    let store = Arc::new(InMemoryRecordStore::new());
    fixture.seed(&store);

    let viewer = Author::new(args.viewer.as_str(), args.viewer.as_str());
    let session = ThreadSession::open(store, fixture.scope.clone(), viewer, config).await?;
    let (handle, task) = SessionDriver::spawn(session);

    for reply in &args.replies {
        let stored = handle.reply(reply.parent.clone(), reply.text.as_str()).await?;
        log::info!("[MAIN] posted {} under {:?}", stored.id, reply.parent);
    }
    for id in &args.likes {
        let outcome = handle.like(&NodeId::new(id.as_str())).await?;
        log::info!("[MAIN] {} liked={}", outcome.reply_id, outcome.liked);
    }
    for id in &args.expands {
        handle.toggle_expand(&NodeId::new(id.as_str())).await?;
    }
    for id in &args.collapses {
        handle.toggle_collapse(&NodeId::new(id.as_str())).await?;
    }
    if let Some(id) = &args.focus {
        handle.focus(&NodeId::new(id.as_str())).await?;
    }

    let roots = if args.roots.is_empty() {
        handle.roots().await?
    } else {
        args.roots.iter().map(|r| NodeId::new(r.as_str())).collect()
    };

    let mut models = Vec::with_capacity(roots.len());
    for root in &roots {
        models.push(handle.render_model(root).await?);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        for model in &models {
            print_model(model);
        }
    }

    handle.close().await;
    task.await.map_err(|e| anyhow!("session driver failed: {}", e))?;
    Ok(())
}

fn print_model(model: &RenderModel) {
    let root = &model.root;
    println!(
        "{}: {} [{}] ({:?})",
        root.author_display_name, root.content, root.id, model.root_state
    );
    if let Some(hidden) = model.hidden_counts.get(&root.id) {
        println!("  + {} more replies", hidden);
    }
    if let Some(preview) = &model.trending_preview {
        print!("  * trending ");
        print_line(preview);
    }
    for node in &model.visible {
        print_node(node);
    }
    println!();
}

fn print_node(node: &RenderNode) {
    print!("{}", "  ".repeat(node.depth));
    print_line(node);
    if node.hidden_count > 0 {
        println!("{}+ {} more replies", "  ".repeat(node.depth + 1), node.hidden_count);
    }
    for child in &node.children {
        print_node(child);
    }
}

fn print_line(node: &RenderNode) {
    let r = &node.record;
    let mut tags = Vec::new();
    if node.is_trending {
        tags.push("trending");
    }
    if node.liked_by_viewer {
        tags.push("liked");
    }
    if r.is_system_authored {
        tags.push("system");
    }
    println!(
        "{}: {} [{}] {} likes{}{}",
        r.author_display_name,
        r.content,
        r.id,
        r.like_count,
        if tags.is_empty() { "" } else { " " },
        tags.join(",")
    );
}
