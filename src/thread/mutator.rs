//! Reply and reaction mutator.
//!
//! Validates and applies new replies and like toggles against a
//! [`RecordStore`]. Validation failures never reach the store; store failures
//! are surfaced as [`ThreadError::Write`] and not retried.

use chrono::{DateTime, Utc};

use crate::error::ThreadError;
use crate::thread::domain::record::{Author, NodeId, ReplyRecord, ThreadScope, UserId};
use crate::thread::store::RecordStore;

/// Result of a like toggle as seen by the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeOutcome {
    pub reply_id: NodeId,
    pub liked: bool,
}

/// Trimmed reply text, or a validation error for empty/whitespace input.
pub fn validate_content(content: &str) -> Result<String, ThreadError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ThreadError::Validation(
            "reply content must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Builds a fresh record stamped `now` with zero likes.
pub fn build_reply(
    author: &Author,
    content: &str,
    parent_id: Option<NodeId>,
    now: DateTime<Utc>,
) -> Result<ReplyRecord, ThreadError> {
    let content = validate_content(content)?;
    Ok(ReplyRecord {
        id: NodeId::generate(),
        author_id: author.id.clone(),
        author_display_name: author.display_name.clone(),
        author_avatar_url: author.avatar_url.clone(),
        content,
        parent_id,
        created_at: now,
        like_count: 0,
        is_system_authored: author.is_system,
    })
}

/// Appends an already built record.
pub async fn append_reply<S: RecordStore + ?Sized>(
    store: &S,
    scope: &ThreadScope,
    record: ReplyRecord,
) -> Result<ReplyRecord, ThreadError> {
    let id = record.id.clone();
    store.append(scope, record).await.map_err(|e| {
        log::warn!("[MUTATOR] append {} to {} failed: {}", id, scope, e);
        ThreadError::Write(e)
    })
}

pub async fn submit_reply<S: RecordStore + ?Sized>(
    store: &S,
    scope: &ThreadScope,
    author: &Author,
    content: &str,
    parent_id: Option<NodeId>,
    now: DateTime<Utc>,
) -> Result<ReplyRecord, ThreadError> {
    let record = build_reply(author, content, parent_id, now)?;
    append_reply(store, scope, record).await
}

/// Flips the viewer's like on `reply_id`.
///
/// Reads the current marker before writing, so a retried call lands on a
/// single well-defined flip instead of counting twice.
pub async fn toggle_like<S: RecordStore + ?Sized>(
    store: &S,
    scope: &ThreadScope,
    reply_id: &NodeId,
    user_id: &UserId,
) -> Result<LikeOutcome, ThreadError> {
    let exists = store
        .like_marker_exists(scope, reply_id, user_id)
        .await
        .map_err(ThreadError::Write)?;

    let liked = !exists;
    store
        .apply_like(scope, reply_id, user_id, liked)
        .await
        .map_err(|e| {
            log::warn!("[MUTATOR] like {} by {} failed: {}", reply_id, user_id, e);
            ThreadError::Write(e)
        })?;

    log::debug!("[MUTATOR] {} {} {}", user_id, if liked { "liked" } else { "unliked" }, reply_id);
    Ok(LikeOutcome {
        reply_id: reply_id.clone(),
        liked,
    })
}
