//! Path checker: whitelist lookup plus live, session-scoped confirmations.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use super::path::{is_within, resolve_path};
use super::{PathCheckError, PathWhitelist, WhitelistTier};
use crate::permissions::Operation;

/// Outcome of a single path check.
///
/// `allowed` and `requires_confirmation` are never both true; both false is
/// a hard denial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub allowed: bool,
    pub requires_confirmation: bool,
    pub reason: String,
    pub operation: Operation,
    /// Resolved target, when resolution succeeded.
    pub path: Option<PathBuf>,
    /// Whitelist tier that matched, for explainability.
    pub tier: Option<WhitelistTier>,
    /// The allow came from a single-use grant that must be consumed.
    pub one_shot: bool,
}

impl CheckResult {
    pub fn allowed_for(operation: Operation, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            requires_confirmation: false,
            reason: reason.into(),
            operation,
            path: None,
            tier: None,
            one_shot: false,
        }
    }

    pub fn needs_confirmation(
        operation: Operation,
        path: PathBuf,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            allowed: false,
            requires_confirmation: true,
            reason: reason.into(),
            operation,
            path: Some(path),
            tier: None,
            one_shot: false,
        }
    }

    pub fn denied(operation: Operation, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            requires_confirmation: false,
            reason: reason.into(),
            operation,
            path: None,
            tier: None,
            one_shot: false,
        }
    }

    fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    fn with_tier(mut self, tier: WhitelistTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn is_denied(&self) -> bool {
        !self.allowed && !self.requires_confirmation
    }
}

/// Decides whether an operation on a path may proceed.
///
/// Owns an immutable [`PathWhitelist`] plus the directories confirmed live
/// during this session and any pending single-use grants. Interior
/// mutability lets one checker be shared by the middleware and the
/// confirmation strategy; locks are never held across an await.
///
/// Protected paths (the guard's own settings and state) ignore the
/// whitelist tiers, so only a confirmation given in this session lets a
/// write to them through.
#[derive(Debug)]
pub struct PathChecker {
    whitelist: PathWhitelist,
    confirmed: RwLock<BTreeSet<PathBuf>>,
    one_shot: Mutex<HashSet<PathBuf>>,
}

impl PathChecker {
    pub fn new(whitelist: PathWhitelist) -> Self {
        Self {
            whitelist,
            confirmed: RwLock::new(BTreeSet::new()),
            one_shot: Mutex::new(HashSet::new()),
        }
    }

    pub fn whitelist(&self) -> &PathWhitelist {
        &self.whitelist
    }

    pub fn resolve(&self, path: &Path) -> Result<PathBuf, PathCheckError> {
        resolve_path(path, self.whitelist.base_dir())
    }

    /// `path` as a tool should open it: relative paths are anchored at the
    /// session's working directory, not the process's.
    pub fn anchor(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.whitelist.base_dir().join(path)
        }
    }

    /// Directory a blanket grant for `resolved` covers: itself when it is a
    /// directory, its parent otherwise.
    pub fn directory_of(resolved: &Path) -> PathBuf {
        if resolved.is_dir() {
            resolved.to_path_buf()
        } else {
            resolved
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| resolved.to_path_buf())
        }
    }

    pub fn check(&self, path: &Path, operation: Operation) -> CheckResult {
        if operation.is_read() {
            return CheckResult::allowed_for(operation, "read access is always allowed");
        }

        let resolved = match self.resolve(path) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(path = %path.display(), %operation, error = %e, "Path resolution failed");
                return CheckResult::denied(operation, e.to_string());
            }
        };

        let protected = self.whitelist.is_protected(&resolved);
        if !protected && let Some(tier) = self.whitelist.tier_for(&resolved) {
            tracing::debug!(path = %resolved.display(), %operation, %tier, "Path whitelisted");
            return CheckResult::allowed_for(operation, format!("within {}", tier))
                .with_path(resolved)
                .with_tier(tier);
        }

        let confirmed = self
            .confirmed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|dir| is_within(&resolved, dir));
        if confirmed {
            tracing::debug!(path = %resolved.display(), %operation, "Path within confirmed directory");
            return CheckResult::allowed_for(operation, "within confirmed directory")
                .with_path(resolved)
                .with_tier(WhitelistTier::Confirmed);
        }

        let granted_once = self
            .one_shot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&resolved);
        if granted_once {
            let mut result = CheckResult::allowed_for(operation, "approved once").with_path(resolved);
            result.one_shot = true;
            return result;
        }

        tracing::debug!(path = %resolved.display(), %operation, protected, "Path needs confirmation");
        let reason = if protected {
            format!("{} holds guard configuration or state", resolved.display())
        } else {
            format!("{} is outside the allowed directories", resolved.display())
        };
        CheckResult::needs_confirmation(operation, resolved, reason)
    }

    /// Grant blanket access to the directory containing `path`.
    ///
    /// A file, or a path that does not exist yet, grants its parent
    /// directory. Returns the directory now confirmed. Idempotent.
    pub fn confirm_directory(&self, path: &Path) -> Result<PathBuf, PathCheckError> {
        let dir = Self::directory_of(&self.resolve(path)?);

        let inserted = self
            .confirmed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dir.clone());
        if inserted {
            tracing::info!(dir = %dir.display(), "Directory confirmed");
        }
        Ok(dir)
    }

    /// Grant a single-use allowance for exactly this path.
    pub fn grant_once(&self, path: &Path) -> Result<PathBuf, PathCheckError> {
        let resolved = self.resolve(path)?;
        self.one_shot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resolved.clone());
        tracing::debug!(path = %resolved.display(), "Single-use grant registered");
        Ok(resolved)
    }

    /// Consume a single-use grant. Returns false when none was pending.
    pub fn consume_grant(&self, resolved: &Path) -> bool {
        self.one_shot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(resolved)
    }

    /// Every confirmed directory: those restored into the whitelist plus
    /// those confirmed live. This is what gets persisted.
    pub fn get_confirmed_dirs(&self) -> Vec<PathBuf> {
        let mut all: BTreeSet<PathBuf> = self
            .whitelist
            .roots(WhitelistTier::Confirmed)
            .iter()
            .cloned()
            .collect();
        all.extend(
            self.confirmed
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned(),
        );
        all.into_iter().collect()
    }
}
