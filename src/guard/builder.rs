//! Assembles a session's guard from settings and persisted confirmations.

use std::path::PathBuf;
use std::sync::Arc;

use super::{GuardError, PathGuardMiddleware};
use crate::config::GuardSettings;
use crate::confirm::{
    AuditLog, ConfirmationStrategy, InteractiveStrategy, Prompter, TerminalPrompter,
};
use crate::permissions::ConfirmationMode;
use crate::security::{PathChecker, PathWhitelist};
use crate::session::{ConfirmationStore, FileStore};

#[derive(Default)]
pub struct PathGuardBuilder {
    settings: GuardSettings,
    working_dir: Option<PathBuf>,
    safe_root: Option<Option<PathBuf>>,
    cli_paths: Vec<PathBuf>,
    session_id: Option<String>,
    store: Option<Arc<dyn ConfirmationStore>>,
    prompter: Option<Arc<dyn Prompter>>,
    strategy: Option<ConfirmationStrategy>,
}

impl PathGuardBuilder {
    pub fn settings(mut self, settings: GuardSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn safe_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.safe_root = Some(Some(root.into()));
        self
    }

    pub fn no_safe_root(mut self) -> Self {
        self.safe_root = Some(None);
        self
    }

    pub fn cli_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.cli_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn ConfirmationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a [`FileStore`] rooted at the configured storage directory.
    pub fn file_store(mut self) -> Self {
        if let Some(root) = self.settings.storage_root() {
            self.store = Some(Arc::new(FileStore::new(root)));
        }
        self
    }

    /// Answer interactive prompts through `prompter` instead of the terminal.
    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Bypass the settings-derived strategy.
    pub fn strategy(mut self, strategy: ConfirmationStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub async fn build(self) -> Result<PathGuardMiddleware, GuardError> {
        let binding = match (self.store, self.session_id) {
            (Some(store), Some(id)) => Some((store, id)),
            _ => None,
        };

        let restored = match binding {
            Some((ref store, ref id)) => store.load_confirmed_dirs(id).await?,
            None => Vec::new(),
        };
        if !restored.is_empty() {
            tracing::info!(dirs = restored.len(), "Restored confirmed directories");
        }

        let mut protected = Vec::new();
        if let Some(dir) = self.working_dir.clone().or_else(|| std::env::current_dir().ok()) {
            protected = self.settings.control_paths(&dir);
        }
        if let Some((ref store, _)) = binding {
            protected.extend(store.location().map(PathBuf::from));
        }

        let mut whitelist = PathWhitelist::builder()
            .cli_paths(self.cli_paths)
            .config_paths(self.settings.allowed_write_paths.iter().cloned())
            .confirmed_dirs(restored)
            .protected_paths(protected);
        if let Some(dir) = self.working_dir {
            whitelist = whitelist.working_dir(dir);
        }
        whitelist = match self.safe_root {
            Some(Some(root)) => whitelist.safe_root(root),
            Some(None) => whitelist.no_safe_root(),
            None => whitelist,
        };

        let settings = self.settings;
        let prompter = self.prompter;
        let strategy = self.strategy.unwrap_or_else(|| match settings.effective_mode() {
            ConfirmationMode::AutoAllow => ConfirmationStrategy::AutoAllow,
            ConfirmationMode::AutoDeny => ConfirmationStrategy::AutoDeny,
            ConfirmationMode::Interactive => {
                let prompter =
                    prompter.unwrap_or_else(|| Arc::new(TerminalPrompter::new()) as Arc<dyn Prompter>);
                InteractiveStrategy::new(prompter)
                    .max_confirmations(settings.max_confirmations_per_session)
                    .audit_log(settings.audit_log_path().map(AuditLog::new))
                    .into()
            }
        });
        tracing::debug!(mode = %strategy.mode(), "Path guard assembled");

        let guard = PathGuardMiddleware::new(Arc::new(PathChecker::new(whitelist.build())), strategy);
        Ok(match binding {
            Some((store, id)) => guard.with_store(store, id),
            None => guard,
        })
    }
}
