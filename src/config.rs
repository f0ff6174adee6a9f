use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::thread::domain::record::ScopeKind;

/// Number of most recent children shown under a node in its default state.
pub const DEFAULT_VISIBLE_CHILDREN: usize = 2;

/// Engine tunables. Every field has a default so partial JSON files work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the "last N children" slice for nodes in default state.
    pub default_visible_children: usize,

    /// Promote a hidden trending reply to a preview block under its root.
    pub trending_preview: bool,

    /// Overrides the per-scope drill-down default when set.
    pub focus_enabled: Option<bool>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_visible_children: DEFAULT_VISIBLE_CHILDREN,
            trending_preview: true,
            focus_enabled: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::info!("[CONFIG] loaded {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Post comment threads support drill-down; conversation threads do not
    /// unless configured otherwise.
    pub fn focus_enabled_for(&self, kind: ScopeKind) -> bool {
        self.focus_enabled.unwrap_or(match kind {
            ScopeKind::Post => true,
            ScopeKind::Conversation => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "default_visible_children": 3 }}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();

        assert_eq!(config.default_visible_children, 3);
        assert!(config.trending_preview);
        assert_eq!(config.focus_enabled, None);
    }

    #[test]
    fn focus_default_depends_on_scope_kind() {
        let config = EngineConfig::default();
        assert!(config.focus_enabled_for(ScopeKind::Post));
        assert!(!config.focus_enabled_for(ScopeKind::Conversation));

        let forced = EngineConfig {
            focus_enabled: Some(true),
            ..EngineConfig::default()
        };
        assert!(forced.focus_enabled_for(ScopeKind::Conversation));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(EngineConfig::load(Path::new("/nonexistent/engine.json")).is_err());
    }
}
