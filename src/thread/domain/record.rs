//! Reply records and the identifiers that key them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque reply id, unique within a thread scope and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for a reply created by this process.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Which kind of context a reply tree hangs under.
///
/// Comment threads under posts and message threads under conversations run the
/// same engine; the kind only picks configuration defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Post,
    Conversation,
}

/// The root context (a post or a conversation) a reply tree lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadScope {
    pub kind: ScopeKind,
    pub id: String,
}

impl ThreadScope {
    pub fn post(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Post,
            id: id.into(),
        }
    }

    pub fn conversation(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Conversation,
            id: id.into(),
        }
    }
}

impl fmt::Display for ThreadScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ScopeKind::Post => "post",
            ScopeKind::Conversation => "conversation",
        };
        write!(f, "{}:{}", kind, self.id)
    }
}

/// A single reply in a thread.
///
/// Immutable once created, except for `like_count`, which is a denormalized
/// cache of the number of like markers for this reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRecord {
    pub id: NodeId,
    pub author_id: UserId,
    pub author_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
    pub content: String,
    /// `None` means top-level.
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub is_system_authored: bool,
}

impl ReplyRecord {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Sibling ordering key: `created_at` ascending, id as tie-break.
    pub(crate) fn sibling_key(&self) -> (DateTime<Utc>, &NodeId) {
        (self.created_at, &self.id)
    }

    /// Trending ranking key: likes first, then recency, then id.
    pub(crate) fn trending_key(&self) -> (u64, DateTime<Utc>, &NodeId) {
        (self.like_count, self.created_at, &self.id)
    }
}

/// Existence of a marker means "this user likes this reply".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeMarker {
    pub reply_id: NodeId,
    pub user_id: UserId,
}

/// Who is acting in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_system: bool,
}

impl Author {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            display_name: display_name.into(),
            avatar_url: None,
            is_system: false,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Timestamp `secs` seconds after the epoch.
    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    pub fn reply(id: &str, parent: Option<&str>, t: i64, likes: u64) -> ReplyRecord {
        ReplyRecord {
            id: NodeId::new(id),
            author_id: UserId::new("u-author"),
            author_display_name: "Author".to_string(),
            author_avatar_url: None,
            content: format!("reply {}", id),
            parent_id: parent.map(NodeId::new),
            created_at: at(t),
            like_count: likes,
            is_system_authored: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn record_uses_camel_case_on_the_wire() {
        let r = reply("c1", Some("r"), 1, 3);
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["parentId"], "r");
        assert_eq!(json["likeCount"], 3);
        assert!(json.get("authorAvatarUrl").is_none());
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{
            "id": "a",
            "authorId": "u1",
            "authorDisplayName": "Ana",
            "content": "hi",
            "createdAt": "2024-01-01T00:00:00Z"
        }"#;
        let r: ReplyRecord = serde_json::from_str(json).unwrap();

        assert!(r.is_top_level());
        assert_eq!(r.like_count, 0);
        assert!(!r.is_system_authored);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(NodeId::generate(), NodeId::generate());
    }
}
