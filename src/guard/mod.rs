//! Path guard middleware wrapping filesystem-mutating tool calls.
//!
//! Every call goes through check → (confirm → re-check) → execute. Denials
//! come back as structured [`ToolResult`]s so the caller can react; only a
//! user cancelling the session surfaces as an error.

mod builder;

pub use builder::PathGuardBuilder;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::confirm::{ConfirmationStrategy, SessionCancelled};
use crate::permissions::Operation;
use crate::security::{CheckResult, PathChecker};
use crate::session::{ConfirmationStore, SessionError};

pub const PATH_DENIED_BY_USER: &str = "path_denied_by_user";
pub const PATH_NOT_ALLOWED: &str = "path_not_allowed";

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Session cancelled by user")]
    SessionCancelled,

    #[error("Persistence error: {0}")]
    Persistence(#[from] SessionError),
}

impl From<SessionCancelled> for GuardError {
    fn from(_: SessionCancelled) -> Self {
        Self::SessionCancelled
    }
}

/// What a tool returns: free-form output plus a metadata mapping.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            metadata: Map::new(),
        }
    }

    pub fn error(output: impl Into<String>, code: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("error".to_string(), Value::String(code.to_string()));
        Self {
            output: output.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn error_code(&self) -> Option<&str> {
        self.metadata.get("error").and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.metadata.contains_key("error")
    }
}

struct SessionBinding {
    store: Arc<dyn ConfirmationStore>,
    session_id: String,
}

/// Gatekeeper between tools and the filesystem for one session.
pub struct PathGuardMiddleware {
    checker: Arc<PathChecker>,
    strategy: ConfirmationStrategy,
    session: Option<SessionBinding>,
}

impl PathGuardMiddleware {
    pub fn new(checker: Arc<PathChecker>, strategy: ConfirmationStrategy) -> Self {
        Self {
            checker,
            strategy,
            session: None,
        }
    }

    pub fn builder() -> PathGuardBuilder {
        PathGuardBuilder::default()
    }

    /// Persist newly confirmed directories to `store` under `session_id`.
    pub fn with_store(
        mut self,
        store: Arc<dyn ConfirmationStore>,
        session_id: impl Into<String>,
    ) -> Self {
        self.session = Some(SessionBinding {
            store,
            session_id: session_id.into(),
        });
        self
    }

    pub fn checker(&self) -> &Arc<PathChecker> {
        &self.checker
    }

    pub fn strategy(&self) -> &ConfirmationStrategy {
        &self.strategy
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn check(&self, path: impl AsRef<Path>, operation: Operation) -> CheckResult {
        self.checker.check(path.as_ref(), operation)
    }

    pub fn confirmed_dirs(&self) -> Vec<PathBuf> {
        self.checker.get_confirmed_dirs()
    }

    /// Run `tool` on `file_path` if the guard lets `operation` through.
    ///
    /// `tool` receives `file_path` plus `extra_args`, and its result is
    /// returned unchanged. A relative `file_path` is handed over anchored at
    /// the session's working directory, the same target the check saw. The
    /// tool is never invoked on denial or cancellation.
    pub async fn execute_with_path_check<F, Fut>(
        &self,
        tool: F,
        file_path: impl AsRef<Path>,
        operation: Operation,
        extra_args: Map<String, Value>,
    ) -> Result<ToolResult, GuardError>
    where
        F: FnOnce(PathBuf, Map<String, Value>) -> Fut,
        Fut: Future<Output = ToolResult>,
    {
        let path = file_path.as_ref();
        let mut result = self.checker.check(path, operation);

        if result.requires_confirmation {
            let before = self.checker.get_confirmed_dirs();
            let target = result.path.as_deref().unwrap_or(path);
            let approved = self.strategy.confirm(&self.checker, target, operation).await?;
            if !approved {
                tracing::warn!(path = %path.display(), %operation, "Denied at confirmation");
                return Ok(ToolResult::error(
                    format!("Permission denied by user: {}", path.display()),
                    PATH_DENIED_BY_USER,
                ));
            }

            let after = self.checker.get_confirmed_dirs();
            if after != before {
                self.persist(&after).await;
            }
            result = self.checker.check(path, operation);
        }

        if !result.allowed {
            tracing::warn!(path = %path.display(), %operation, reason = %result.reason, "Path not allowed");
            return Ok(ToolResult::error(
                format!("Permission denied: {}", result.reason),
                PATH_NOT_ALLOWED,
            ));
        }

        if result.one_shot
            && let Some(resolved) = result.path.as_deref()
        {
            self.checker.consume_grant(resolved);
        }

        Ok(tool(self.checker.anchor(path), extra_args).await)
    }

    /// Write the current confirmed set for this session, if bound to a store.
    pub async fn save(&self) -> Result<(), GuardError> {
        if let Some(ref session) = self.session {
            session
                .store
                .save_confirmed_dirs(&session.session_id, &self.checker.get_confirmed_dirs())
                .await?;
        }
        Ok(())
    }

    // A failed write leaves the live grant in place; it only loses durability.
    async fn persist(&self, dirs: &[PathBuf]) {
        let Some(ref session) = self.session else {
            return;
        };
        if let Err(e) = session
            .store
            .save_confirmed_dirs(&session.session_id, dirs)
            .await
        {
            tracing::warn!(
                session_id = %session.session_id,
                store = session.store.name(),
                error = %e,
                "Failed to persist confirmed directories"
            );
        }
    }
}

impl std::fmt::Debug for PathGuardMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathGuardMiddleware")
            .field("checker", &self.checker)
            .field("strategy", &self.strategy)
            .field("session_id", &self.session_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::InteractiveStrategy;
    use crate::confirm::testing::ScriptedPrompter;
    use crate::security::PathWhitelist;
    use crate::session::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let root = std::fs::canonicalize(dir.path()).unwrap();
            std::fs::create_dir(root.join("work")).unwrap();
            std::fs::create_dir(root.join("outside")).unwrap();
            Self { _dir: dir, root }
        }

        fn guard(&self, strategy: ConfirmationStrategy) -> PathGuardMiddleware {
            let checker = PathChecker::new(
                PathWhitelist::builder()
                    .working_dir(self.root.join("work"))
                    .no_safe_root()
                    .build(),
            );
            PathGuardMiddleware::new(Arc::new(checker), strategy)
        }
    }

    fn scripted(answers: &[&str]) -> ConfirmationStrategy {
        InteractiveStrategy::new(Arc::new(ScriptedPrompter::new(answers.iter().copied()))).into()
    }

    async fn echo(path: PathBuf, args: Map<String, Value>) -> ToolResult {
        ToolResult::new(format!("wrote {}", path.display())).with_metadata("args", Value::Object(args))
    }

    #[tokio::test]
    async fn test_whitelisted_executes_unchanged() {
        let fx = Fixture::new();
        let guard = fx.guard(ConfirmationStrategy::AutoDeny);
        let target = fx.root.join("work/a.txt");

        let mut args = Map::new();
        args.insert("content".into(), "hi".into());
        let result = guard
            .execute_with_path_check(echo, &target, Operation::Write, args)
            .await
            .unwrap();

        assert_eq!(result.output, format!("wrote {}", target.display()));
        assert_eq!(result.metadata["args"]["content"], "hi");
    }

    #[tokio::test]
    async fn test_user_denial_skips_tool() {
        let fx = Fixture::new();
        let guard = fx.guard(ConfirmationStrategy::AutoDeny);
        let calls = AtomicUsize::new(0);
        let target = fx.root.join("outside/a.txt");

        let result = guard
            .execute_with_path_check(
                |p, a| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    echo(p, a)
                },
                &target,
                Operation::Write,
                Map::new(),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.error_code(), Some(PATH_DENIED_BY_USER));
        assert_eq!(
            result.output,
            format!("Permission denied by user: {}", target.display())
        );
    }

    #[tokio::test]
    async fn test_hard_denial() {
        let fx = Fixture::new();
        let guard = fx.guard(ConfirmationStrategy::AutoAllow);
        let result = guard
            .execute_with_path_check(echo, "", Operation::Write, Map::new())
            .await
            .unwrap();
        assert_eq!(result.error_code(), Some(PATH_NOT_ALLOWED));
        assert!(result.output.starts_with("Permission denied: "));
    }

    #[tokio::test]
    async fn test_accept_once_prompts_again() {
        let fx = Fixture::new();
        let guard = fx.guard(scripted(&["y", "n"]));
        let target = fx.root.join("outside/a.txt");

        let first = guard
            .execute_with_path_check(echo, &target, Operation::Write, Map::new())
            .await
            .unwrap();
        assert!(!first.is_error());

        let second = guard
            .execute_with_path_check(echo, &target, Operation::Write, Map::new())
            .await
            .unwrap();
        assert_eq!(second.error_code(), Some(PATH_DENIED_BY_USER));
    }

    #[tokio::test]
    async fn test_accept_directory_persists() {
        let fx = Fixture::new();
        let store = Arc::new(MemoryStore::new());
        let guard = fx.guard(scripted(&["d"])).with_store(store.clone(), "s1");

        let result = guard
            .execute_with_path_check(echo, fx.root.join("outside/a.txt"), Operation::Write, Map::new())
            .await
            .unwrap();
        assert!(!result.is_error());
        assert_eq!(
            store.load_confirmed_dirs("s1").await.unwrap(),
            vec![fx.root.join("outside")]
        );

        let result = guard
            .execute_with_path_check(echo, fx.root.join("outside/b.txt"), Operation::Write, Map::new())
            .await
            .unwrap();
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn test_cancel_propagates() {
        let fx = Fixture::new();
        let guard = fx.guard(scripted(&["c"]));
        let calls = AtomicUsize::new(0);

        let err = guard
            .execute_with_path_check(
                |p, a| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    echo(p, a)
                },
                fx.root.join("outside/a.txt"),
                Operation::Write,
                Map::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GuardError::SessionCancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_relative_path_anchored_at_working_dir() {
        let fx = Fixture::new();
        let guard = fx.guard(ConfirmationStrategy::AutoDeny);

        let result = guard
            .execute_with_path_check(echo, "rel.txt", Operation::Write, Map::new())
            .await
            .unwrap();
        assert_eq!(
            result.output,
            format!("wrote {}", fx.root.join("work/rel.txt").display())
        );

        let escaped = guard
            .execute_with_path_check(echo, "../outside/rel.txt", Operation::Write, Map::new())
            .await
            .unwrap();
        assert_eq!(escaped.error_code(), Some(PATH_DENIED_BY_USER));
    }

    #[tokio::test]
    async fn test_prompt_names_resolved_target() {
        let fx = Fixture::new();
        let prompter = Arc::new(ScriptedPrompter::new(["y"]));
        let guard = fx.guard(InteractiveStrategy::new(prompter.clone()).into());

        let result = guard
            .execute_with_path_check(echo, "../outside/a.txt", Operation::Write, Map::new())
            .await
            .unwrap();

        let target = fx.root.join("outside/a.txt");
        assert_eq!(result.output, format!("wrote {}", fx.root.join("work/../outside/a.txt").display()));
        let shown = prompter.output();
        assert!(shown.contains(&format!("Permission required: write {}", target.display())));
        assert!(shown.contains(&format!("allow everything under {}", fx.root.join("outside").display())));
    }

    #[tokio::test]
    async fn test_read_bypasses_confirmation() {
        let fx = Fixture::new();
        let guard = fx.guard(ConfirmationStrategy::AutoDeny);
        let result = guard
            .execute_with_path_check(echo, "/etc/hostname", Operation::Read, Map::new())
            .await
            .unwrap();
        assert!(!result.is_error());
    }

    #[test]
    fn test_tool_result_serde() {
        let result = ToolResult::error("nope", PATH_NOT_ALLOWED);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["metadata"]["error"], "path_not_allowed");
    }
}
