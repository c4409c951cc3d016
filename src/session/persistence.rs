//! Confirmation record storage backends.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{SessionError, SessionResult, validate_session_id};

const GUARD_DIR: &str = ".agent-guard";
const SESSIONS_DIR: &str = "sessions";
const RECORD_FILE: &str = "path_guard.json";

/// Everything persisted for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    pub confirmed_dirs: Vec<PathBuf>,
    pub confirmation_count: usize,
    pub last_updated: DateTime<Utc>,
}

impl ConfirmationRecord {
    /// Builds a record stamped now. Directories are de-duplicated and sorted.
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        let confirmed_dirs: Vec<PathBuf> = dirs
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self {
            confirmation_count: confirmed_dirs.len(),
            confirmed_dirs,
            last_updated: Utc::now(),
        }
    }
}

/// Storage for one confirmation record per session id.
#[async_trait::async_trait]
pub trait ConfirmationStore: Send + Sync {
    fn name(&self) -> &str;

    /// Filesystem location the store writes under, if it has one.
    fn location(&self) -> Option<&Path> {
        None
    }

    async fn save(&self, session_id: &str, record: &ConfirmationRecord) -> SessionResult<()>;

    async fn load(&self, session_id: &str) -> SessionResult<Option<ConfirmationRecord>>;

    async fn delete(&self, session_id: &str) -> SessionResult<bool>;

    async fn list_sessions(&self) -> SessionResult<Vec<String>>;

    async fn save_confirmed_dirs(&self, session_id: &str, dirs: &[PathBuf]) -> SessionResult<()> {
        self.save(session_id, &ConfirmationRecord::new(dirs.iter().cloned()))
            .await
    }

    /// A session with no record yields an empty list.
    async fn load_confirmed_dirs(&self, session_id: &str) -> SessionResult<Vec<PathBuf>> {
        Ok(self
            .load(session_id)
            .await?
            .map(|record| record.confirmed_dirs)
            .unwrap_or_default())
    }
}

/// One JSON file per session under `<root>/sessions/<url-encoded id>/`.
///
/// Writes go to a sibling temp file and are renamed into place, so a
/// reader never sees a half-written record. Concurrent writers to the same
/// session id are not coordinated; the last rename wins.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.agent-guard`, when a home directory can be determined.
    pub fn default_root() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(GUARD_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join(SESSIONS_DIR)
    }

    pub fn record_path(&self, session_id: &str) -> SessionResult<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self
            .sessions_dir()
            .join(urlencoding::encode(session_id).as_ref())
            .join(RECORD_FILE))
    }
}

#[async_trait::async_trait]
impl ConfirmationStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.root)
    }

    async fn save(&self, session_id: &str, record: &ConfirmationRecord) -> SessionResult<()> {
        let path = self.record_path(session_id)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                SessionError::storage(format!("Failed to create {}", dir.display()), e)
            })?;
        }

        let json = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| SessionError::storage(format!("Failed to write {}", tmp.display()), e))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            SessionError::storage(format!("Failed to replace {}", path.display()), e)
        })?;

        tracing::info!(
            session_id,
            dirs = record.confirmed_dirs.len(),
            path = %path.display(),
            "Saved confirmed directories"
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> SessionResult<Option<ConfirmationRecord>> {
        let path = self.record_path(session_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::storage(
                    format!("Failed to read {}", path.display()),
                    e,
                ));
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(
                    session_id,
                    path = %path.display(),
                    error = %e,
                    "Ignoring malformed confirmation record"
                );
                Ok(None)
            }
        }
    }

    async fn delete(&self, session_id: &str) -> SessionResult<bool> {
        let path = self.record_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                if let Some(dir) = path.parent() {
                    let _ = tokio::fs::remove_dir(dir).await;
                }
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::storage(
                format!("Failed to delete {}", path.display()),
                e,
            )),
        }
    }

    async fn list_sessions(&self) -> SessionResult<Vec<String>> {
        let dir = self.sessions_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SessionError::storage(
                    format!("Failed to list {}", dir.display()),
                    e,
                ));
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionError::storage(format!("Failed to list {}", dir.display()), e))?
        {
            if !entry.path().join(RECORD_FILE).is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(name) = name.to_str()
                && let Ok(id) = urlencoding::decode(name)
            {
                ids.push(id.into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, ConfirmationRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait::async_trait]
impl ConfirmationStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, session_id: &str, record: &ConfirmationRecord) -> SessionResult<()> {
        validate_session_id(session_id)?;
        self.records
            .write()
            .await
            .insert(session_id.to_string(), record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> SessionResult<Option<ConfirmationRecord>> {
        validate_session_id(session_id)?;
        Ok(self.records.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> SessionResult<bool> {
        validate_session_id(session_id)?;
        Ok(self.records.write().await.remove(session_id).is_some())
    }

    async fn list_sessions(&self) -> SessionResult<Vec<String>> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
