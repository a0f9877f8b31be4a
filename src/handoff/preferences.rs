//! Values remembered between snips.
//!
//! Stored as a small JSON file, by default
//! `~/.config/snip-chat/preferences.json`. A missing or unreadable file
//! just means nothing is remembered yet.

use crate::handoff::messaging::ConversationId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub last_conversation_id: Option<ConversationId>,
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load preferences. Returns defaults if the file is missing or invalid.
    pub fn load(&self) -> Preferences {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("[CONFIG] Ignoring invalid {}: {}", self.path.display(), e);
                Preferences::default()
            }),
            Err(_) => Preferences::default(),
        }
    }

    /// Persist preferences, creating the parent directory if needed.
    pub fn save(&self, prefs: &Preferences) -> Result<(), String> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create preferences dir: {}", e))?;
        }
        let json = serde_json::to_string_pretty(prefs)
            .map_err(|e| format!("Failed to serialize preferences: {}", e))?;
        std::fs::write(&self.path, json)
            .map_err(|e| format!("Failed to write preferences: {}", e))?;
        Ok(())
    }

    pub fn last_conversation(&self) -> Option<ConversationId> {
        self.load().last_conversation_id
    }

    /// Remember `id` as the conversation the next snip goes to.
    pub fn remember_conversation(&self, id: ConversationId) -> Result<(), String> {
        let mut prefs = self.load();
        if prefs.last_conversation_id == Some(id) {
            return Ok(());
        }
        prefs.last_conversation_id = Some(id);
        self.save(&prefs)?;
        log::info!("[CONFIG] Remembered conversation {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn missing_file_remembers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("prefs.json"));
        assert_eq!(store.last_conversation(), None);
    }

    #[test]
    fn remembered_conversation_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        let id = Uuid::new_v4();

        PreferenceStore::new(&path).remember_conversation(id).unwrap();
        assert_eq!(PreferenceStore::new(&path).last_conversation(), Some(id));
    }

    #[test]
    fn invalid_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(PreferenceStore::new(&path).load(), Preferences::default());
    }
}
