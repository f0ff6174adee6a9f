//! JSON thread fixtures for seeding an [`InMemoryRecordStore`].
//!
//! ```json
//! {
//!   "scope": { "kind": "post", "id": "p1" },
//!   "records": [ { "id": "r", "authorId": "u1", "authorDisplayName": "Ann",
//!                  "content": "hi", "createdAt": "2024-01-01T00:00:00Z" } ],
//!   "likes": [ { "replyId": "r", "userId": "u2" } ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::thread::domain::record::{LikeMarker, ReplyRecord, ThreadScope};
use crate::thread::store::InMemoryRecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadFixture {
    pub scope: ThreadScope,
    #[serde(default)]
    pub records: Vec<ReplyRecord>,
    #[serde(default)]
    pub likes: Vec<LikeMarker>,
}

impl ThreadFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture = Self::from_json(&raw)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        log::info!(
            "[FIXTURE] loaded {} ({} records, {} likes)",
            fixture.scope,
            fixture.records.len(),
            fixture.likes.len()
        );
        Ok(fixture)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let fixture: Self = serde_json::from_str(raw)?;
        fixture.check()?;
        Ok(fixture)
    }

    /// Rejects duplicate ids. Dangling parents and likes are allowed; the
    /// engine shows such replies as orphans.
    fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for record in &self.records {
            if !seen.insert(&record.id) {
                bail!("duplicate reply id {}", record.id);
            }
        }
        for like in &self.likes {
            if !seen.contains(&like.reply_id) {
                log::warn!("[FIXTURE] like on unknown reply {}", like.reply_id);
            }
        }
        Ok(())
    }

    pub fn seed(&self, store: &InMemoryRecordStore) {
        store.seed(&self.scope, self.records.clone(), self.likes.clone());
    }
}
