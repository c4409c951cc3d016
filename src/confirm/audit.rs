//! Append-only JSONL audit trail of denied confirmation requests.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::permissions::Operation;

/// Why a confirmation request was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// No terminal attached; denied without prompting.
    NonInteractiveAutoDeny,
    /// The user answered "no".
    UserDenied,
    /// The per-session confirmation budget was exhausted.
    MaxConfirmationsExceeded,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::NonInteractiveAutoDeny => "non_interactive_auto_deny",
            DenialReason::UserDenied => "user_denied",
            DenialReason::MaxConfirmationsExceeded => "max_confirmations_exceeded",
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub path: String,
    pub operation: Operation,
    pub reason: DenialReason,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(path: &Path, operation: Operation, reason: DenialReason) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
            operation,
            reason,
            timestamp: Utc::now(),
        }
    }
}

/// Audit log sink. Each record is one JSON object on its own line.
#[derive(Clone, Debug)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record. A failing audit write never changes the decision it
    /// describes, so errors are logged rather than returned.
    pub async fn record(&self, record: &AuditRecord) {
        if let Err(e) = self.append(record).await {
            tracing::warn!(
                audit_log = %self.path.display(),
                path = %record.path,
                error = %e,
                "Failed to write audit record"
            );
        }
    }

    async fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }

    pub async fn read_all(&self) -> std::io::Result<Vec<AuditRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed audit line");
                    None
                }
            })
            .collect())
    }
}
