//! Terminal confirmation prompt.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::SessionCancelled;
use super::audit::{AuditLog, AuditRecord, DenialReason};
use crate::permissions::Operation;
use crate::security::PathChecker;

const MAX_PROMPT_ATTEMPTS: usize = 3;

/// I/O channel to the human deciding confirmations.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Whether a human can answer at all. Non-interactive prompters are
    /// never asked anything.
    fn is_interactive(&self) -> bool;

    async fn show(&self, message: &str);

    /// Next line of input without its terminator; `None` once input is closed.
    async fn read_line(&self) -> Option<String>;
}

/// Prompts on stderr and reads answers from stdin without blocking the runtime.
pub struct TerminalPrompter {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
    interactive: bool,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
            interactive: std::io::stdin().is_terminal(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TerminalPrompter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalPrompter")
            .field("interactive", &self.interactive)
            .finish()
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    async fn show(&self, message: &str) {
        let mut stderr = tokio::io::stderr();
        if stderr.write_all(message.as_bytes()).await.is_ok() {
            let _ = stderr.flush().await;
        }
    }

    async fn read_line(&self) -> Option<String> {
        let mut stdin = self.stdin.lock().await;
        let mut line = String::new();
        match stdin.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

/// One answer to a confirmation prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptChoice {
    AcceptOnce,
    Deny,
    AcceptDirectory,
    CancelSession,
}

impl PromptChoice {
    /// Empty input accepts once. Unknown input yields `None`.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "" | "y" | "yes" | "once" => Some(Self::AcceptOnce),
            "n" | "no" | "deny" => Some(Self::Deny),
            "d" | "dir" | "directory" | "always" => Some(Self::AcceptDirectory),
            "c" | "cancel" | "q" | "quit" => Some(Self::CancelSession),
            _ => None,
        }
    }
}

/// Asks a human about every path outside the whitelist.
///
/// Fails closed: without an interactive prompter, once input is closed, or
/// once the per-session confirmation budget is spent, requests are denied
/// without asking.
pub struct InteractiveStrategy {
    prompter: Arc<dyn Prompter>,
    max_confirmations: Option<usize>,
    prompts_shown: AtomicUsize,
    audit: Option<AuditLog>,
}

impl InteractiveStrategy {
    pub fn new(prompter: Arc<dyn Prompter>) -> Self {
        Self {
            prompter,
            max_confirmations: None,
            prompts_shown: AtomicUsize::new(0),
            audit: None,
        }
    }

    pub fn terminal() -> Self {
        Self::new(Arc::new(TerminalPrompter::new()))
    }

    pub fn max_confirmations(mut self, max: Option<usize>) -> Self {
        self.max_confirmations = max;
        self
    }

    pub fn audit_log(mut self, audit: Option<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn prompts_shown(&self) -> usize {
        self.prompts_shown.load(Ordering::SeqCst)
    }

    pub async fn confirm(
        &self,
        checker: &PathChecker,
        path: &Path,
        operation: Operation,
    ) -> Result<bool, SessionCancelled> {
        let target = checker
            .resolve(path)
            .unwrap_or_else(|_| checker.anchor(path));
        let path = target.as_path();

        if !self.prompter.is_interactive() {
            tracing::warn!(path = %path.display(), %operation, "No interactive input, denying");
            self.deny(path, operation, DenialReason::NonInteractiveAutoDeny)
                .await;
            return Ok(false);
        }

        let shown = self.prompts_shown.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = self.max_confirmations
            && shown >= max
        {
            self.prompts_shown.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(path = %path.display(), %operation, max, "Confirmation budget exhausted, denying");
            self.deny(path, operation, DenialReason::MaxConfirmationsExceeded)
                .await;
            return Ok(false);
        }

        let directory = PathChecker::directory_of(path);
        self.prompter
            .show(&format!(
                "\nPermission required: {} {}\n  [y] allow once (default)  [n] deny  \
                 [d] allow everything under {}  [c] cancel session\n> ",
                operation,
                path.display(),
                directory.display()
            ))
            .await;

        for _ in 0..MAX_PROMPT_ATTEMPTS {
            let Some(line) = self.prompter.read_line().await else {
                tracing::warn!(path = %path.display(), "Input closed while prompting, denying");
                self.deny(path, operation, DenialReason::NonInteractiveAutoDeny)
                    .await;
                return Ok(false);
            };

            match PromptChoice::parse(&line) {
                Some(PromptChoice::AcceptOnce) => {
                    return Ok(register(checker.grant_once(path), path));
                }
                Some(PromptChoice::AcceptDirectory) => {
                    return Ok(register(checker.confirm_directory(path), path));
                }
                Some(PromptChoice::Deny) => {
                    self.deny(path, operation, DenialReason::UserDenied).await;
                    return Ok(false);
                }
                Some(PromptChoice::CancelSession) => {
                    tracing::info!(path = %path.display(), "Session cancelled at confirmation prompt");
                    return Err(SessionCancelled);
                }
                None => {
                    self.prompter
                        .show("Please answer y, n, d or c.\n> ")
                        .await;
                }
            }
        }

        self.deny(path, operation, DenialReason::UserDenied).await;
        Ok(false)
    }

    async fn deny(&self, path: &Path, operation: Operation, reason: DenialReason) {
        if let Some(ref audit) = self.audit {
            audit
                .record(&AuditRecord::new(path, operation, reason))
                .await;
        }
    }
}

impl std::fmt::Debug for InteractiveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveStrategy")
            .field("max_confirmations", &self.max_confirmations)
            .field("prompts_shown", &self.prompts_shown())
            .field("audit", &self.audit)
            .finish()
    }
}

fn register<T>(grant: Result<T, crate::security::PathCheckError>, path: &Path) -> bool {
    match grant {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Could not register confirmation");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::testing::ScriptedPrompter;
    use crate::security::PathWhitelist;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        checker: PathChecker,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("work")).unwrap();
        std::fs::create_dir_all(root.join("outside")).unwrap();
        let checker = PathChecker::new(
            PathWhitelist::builder()
                .working_dir(root.join("work"))
                .no_safe_root()
                .build(),
        );
        Fixture {
            _dir: dir,
            root,
            checker,
        }
    }

    #[test]
    fn test_parse_choices() {
        assert_eq!(PromptChoice::parse(""), Some(PromptChoice::AcceptOnce));
        assert_eq!(PromptChoice::parse(" Y "), Some(PromptChoice::AcceptOnce));
        assert_eq!(PromptChoice::parse("no"), Some(PromptChoice::Deny));
        assert_eq!(PromptChoice::parse("d"), Some(PromptChoice::AcceptDirectory));
        assert_eq!(PromptChoice::parse("cancel"), Some(PromptChoice::CancelSession));
        assert_eq!(PromptChoice::parse("maybe"), None);
    }

    #[tokio::test]
    async fn test_accept_once_grants_exact_path() {
        let fx = fixture();
        let prompter = Arc::new(ScriptedPrompter::new([""]));
        let strategy = InteractiveStrategy::new(prompter.clone());
        let target = fx.root.join("outside/a.txt");

        assert!(strategy.confirm(&fx.checker, &target, Operation::Write).await.unwrap());
        assert!(fx.checker.check(&target, Operation::Write).one_shot);
        assert!(prompter.output().contains("Permission required: write"));
        assert!(prompter.output().contains(&target.display().to_string()));
    }

    #[tokio::test]
    async fn test_prompt_shows_resolved_relative_path() {
        let fx = fixture();
        let prompter = Arc::new(ScriptedPrompter::new(["d"]));
        let strategy = InteractiveStrategy::new(prompter.clone());

        assert!(
            strategy
                .confirm(&fx.checker, Path::new("../outside/a.txt"), Operation::Write)
                .await
                .unwrap()
        );
        let shown = prompter.output();
        let target = fx.root.join("outside/a.txt");
        assert!(shown.contains(&format!("write {}", target.display())));
        assert!(shown.contains(&format!("allow everything under {}", fx.root.join("outside").display())));
        assert_eq!(fx.checker.get_confirmed_dirs(), vec![fx.root.join("outside")]);
    }

    #[tokio::test]
    async fn test_accept_directory_confirms_parent() {
        let fx = fixture();
        let strategy = InteractiveStrategy::new(Arc::new(ScriptedPrompter::new(["d"])));

        let target = fx.root.join("outside/a.txt");
        assert!(strategy.confirm(&fx.checker, &target, Operation::Write).await.unwrap());
        assert!(
            fx.checker
                .check(&fx.root.join("outside/b.txt"), Operation::Write)
                .allowed
        );
    }

    #[tokio::test]
    async fn test_deny_is_audited() {
        let fx = fixture();
        let audit = AuditLog::new(fx.root.join("audit.jsonl"));
        let strategy = InteractiveStrategy::new(Arc::new(ScriptedPrompter::new(["n"])))
            .audit_log(Some(audit.clone()));

        let target = fx.root.join("outside/a.txt");
        assert!(!strategy.confirm(&fx.checker, &target, Operation::Write).await.unwrap());

        let records = audit.read_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, DenialReason::UserDenied);
    }

    #[tokio::test]
    async fn test_cancel_raises() {
        let fx = fixture();
        let strategy = InteractiveStrategy::new(Arc::new(ScriptedPrompter::new(["c"])));
        let result = strategy
            .confirm(&fx.checker, &fx.root.join("outside/a.txt"), Operation::Write)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_non_interactive_denies_without_prompt() {
        let fx = fixture();
        let prompter = Arc::new(ScriptedPrompter::non_interactive());
        let audit = AuditLog::new(fx.root.join("audit.jsonl"));
        let strategy = InteractiveStrategy::new(prompter.clone()).audit_log(Some(audit.clone()));

        let target = fx.root.join("outside/a.txt");
        assert!(!strategy.confirm(&fx.checker, &target, Operation::Write).await.unwrap());
        assert!(prompter.output().is_empty());

        let records = audit.read_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, DenialReason::NonInteractiveAutoDeny);
    }

    #[tokio::test]
    async fn test_max_confirmations_enforced() {
        let fx = fixture();
        let prompter = Arc::new(ScriptedPrompter::new(["y", "y", "y"]));
        let strategy = InteractiveStrategy::new(prompter.clone()).max_confirmations(Some(2));

        for name in ["a.txt", "b.txt"] {
            let target = fx.root.join("outside").join(name);
            assert!(strategy.confirm(&fx.checker, &target, Operation::Write).await.unwrap());
        }

        let before = prompter.output();
        let target = fx.root.join("outside/c.txt");
        assert!(!strategy.confirm(&fx.checker, &target, Operation::Write).await.unwrap());
        assert_eq!(prompter.output(), before);
        assert_eq!(strategy.prompts_shown(), 2);
    }

    #[tokio::test]
    async fn test_invalid_answers_then_accept() {
        let fx = fixture();
        let strategy =
            InteractiveStrategy::new(Arc::new(ScriptedPrompter::new(["what", "yes"])));
        let target = fx.root.join("outside/a.txt");
        assert!(strategy.confirm(&fx.checker, &target, Operation::Write).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_input_denies() {
        let fx = fixture();
        let strategy = InteractiveStrategy::new(Arc::new(ScriptedPrompter::new(
            Vec::<String>::new(),
        )));
        let target = fx.root.join("outside/a.txt");
        assert!(!strategy.confirm(&fx.checker, &target, Operation::Write).await.unwrap());
    }
}
