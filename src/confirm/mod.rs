//! Confirmation strategies for paths outside the whitelist.

mod audit;
mod interactive;

use std::path::Path;

pub use audit::{AuditLog, AuditRecord, DenialReason};
pub use interactive::{InteractiveStrategy, PromptChoice, Prompter, TerminalPrompter};

use crate::permissions::{ConfirmationMode, Operation};
use crate::security::PathChecker;

/// The user chose to abort the whole session at a confirmation prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("session cancelled by user")]
pub struct SessionCancelled;

/// How to settle a check that requires confirmation.
///
/// Every variant either registers a grant on the checker and returns
/// `Ok(true)`, or registers nothing and returns `Ok(false)`.
#[derive(Debug)]
pub enum ConfirmationStrategy {
    Interactive(InteractiveStrategy),
    /// Approve every request once, without asking.
    AutoAllow,
    /// Deny every request without asking.
    AutoDeny,
}

impl ConfirmationStrategy {
    pub fn mode(&self) -> ConfirmationMode {
        match self {
            Self::Interactive(_) => ConfirmationMode::Interactive,
            Self::AutoAllow => ConfirmationMode::AutoAllow,
            Self::AutoDeny => ConfirmationMode::AutoDeny,
        }
    }

    pub async fn confirm(
        &self,
        checker: &PathChecker,
        path: &Path,
        operation: Operation,
    ) -> Result<bool, SessionCancelled> {
        match self {
            Self::Interactive(strategy) => strategy.confirm(checker, path, operation).await,
            Self::AutoAllow => match checker.grant_once(path) {
                Ok(resolved) => {
                    tracing::info!(path = %resolved.display(), %operation, "Auto-approved");
                    Ok(true)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Auto-approve failed");
                    Ok(false)
                }
            },
            Self::AutoDeny => {
                tracing::warn!(path = %path.display(), %operation, "Auto-denied");
                Ok(false)
            }
        }
    }
}

impl From<InteractiveStrategy> for ConfirmationStrategy {
    fn from(strategy: InteractiveStrategy) -> Self {
        Self::Interactive(strategy)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::Prompter;

    /// Replays canned answers and records everything shown.
    pub struct ScriptedPrompter {
        answers: Mutex<VecDeque<String>>,
        output: Mutex<String>,
        interactive: bool,
    }

    impl ScriptedPrompter {
        pub fn new<I, S>(answers: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
                output: Mutex::new(String::new()),
                interactive: true,
            }
        }

        pub fn non_interactive() -> Self {
            Self {
                interactive: false,
                ..Self::new(Vec::<String>::new())
            }
        }

        pub fn output(&self) -> String {
            self.output.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Prompter for ScriptedPrompter {
        fn is_interactive(&self) -> bool {
            self.interactive
        }

        async fn show(&self, message: &str) {
            self.output.lock().unwrap().push_str(message);
        }

        async fn read_line(&self) -> Option<String> {
            self.answers.lock().unwrap().pop_front()
        }
    }
}
