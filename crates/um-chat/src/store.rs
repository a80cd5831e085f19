//! JSON snapshot of the document and chat sessions
//!
//! Saved atomically (temp file + rename). A missing file loads as the
//! default state. A session section that no longer parses is dropped in
//! favour of draft state so the methods survive.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use um_core::Result;
use um_document::DocumentModel;

use crate::session::SessionStore;
use crate::state::AppState;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub document: DocumentModel,
    pub sessions: SessionStore,
}

#[derive(Deserialize)]
struct RawState {
    document: DocumentModel,
    #[serde(default)]
    sessions: Value,
}

impl PersistedState {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No saved state, starting fresh");
            return Ok(Self::default());
        }

        let raw: RawState = serde_json::from_str(&fs::read_to_string(path)?)?;
        let mut sessions = if raw.sessions.is_null() {
            SessionStore::default()
        } else {
            serde_json::from_value::<SessionStore>(raw.sessions).unwrap_or_else(|e| {
                warn!(path = %path.display(), "Discarding unreadable chat sessions: {}", e);
                SessionStore::default()
            })
        };
        sessions.repair();

        info!(
            path = %path.display(),
            methods = raw.document.methods().len(),
            sessions = sessions.list_sessions().len(),
            "Loaded saved state"
        );
        Ok(Self {
            document: raw.document,
            sessions,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(path);
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Saved state");
        Ok(())
    }

    pub async fn capture(state: &AppState) -> Self {
        Self {
            document: state.document.read().await.clone(),
            sessions: state.sessions.read().await.clone(),
        }
    }

    /// Install into `state`, replacing its document and sessions
    pub async fn restore(self, state: &AppState) {
        *state.document.write().await = self.document;
        *state.sessions.write().await = self.sessions;
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let state = PersistedState::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state, PersistedState::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = PersistedState::default();
        state.document.add_method();
        state.document.set_object_name("wifi");
        state.sessions.append_user_message("list wifi clients");
        state.save(&path).unwrap();

        assert!(!temp_path(&path).exists());
        let loaded = PersistedState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.sessions.active().is_some());
    }

    #[test]
    fn test_corrupt_sessions_keep_methods() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut document = DocumentModel::default();
        document.set_object_name("kept");
        let raw = serde_json::json!({
            "document": document,
            "sessions": { "sessions": "not a list" }
        });
        fs::write(&path, raw.to_string()).unwrap();

        let loaded = PersistedState::load(&path).unwrap();
        assert_eq!(loaded.document.meta().object_name, "kept");
        assert!(loaded.sessions.list_sessions().is_empty());
        assert!(loaded.sessions.active_id().is_none());
    }

    #[test]
    fn test_dangling_active_session_becomes_draft() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let raw = serde_json::json!({
            "document": DocumentModel::default(),
            "sessions": { "sessions": [], "active_session_id": "gone" }
        });
        fs::write(&path, raw.to_string()).unwrap();

        let loaded = PersistedState::load(&path).unwrap();
        assert!(loaded.sessions.active_id().is_none());
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(PersistedState::load(&path).is_err());
    }

    #[tokio::test]
    async fn test_capture_and_restore() {
        let state = AppState::default();
        state.document.write().await.add_method();
        let snapshot = PersistedState::capture(&state).await;

        state.reset().await;
        snapshot.clone().restore(&state).await;
        assert_eq!(*state.document.read().await, snapshot.document);
    }
}
