//! # agent-guard
//!
//! Safety gate between an autonomous coding agent and the host filesystem.
//!
//! - **Path guard**: every filesystem-mutating tool call is checked against a
//!   five-tier whitelist (working directory, safe root, CLI paths, configured
//!   paths, confirmed directories). Anything else is confirmed by a human,
//!   auto-approved, or auto-denied, and approvals survive restarts.
//! - **Doom-loop detection**: flags an agent issuing the same mutating call
//!   over and over.
//! - **Execution context**: per-task state (token usage, call history, todos)
//!   that child tasks inherit and siblings never see.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agent_guard::config::SettingsLoader;
//! use agent_guard::{Operation, PathGuardMiddleware, ToolResult};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), agent_guard::Error> {
//!     let workdir = std::env::current_dir()?;
//!     let settings = SettingsLoader::new().load(&workdir).await?.clone();
//!
//!     let guard = PathGuardMiddleware::builder()
//!         .settings(settings)
//!         .working_dir(&workdir)
//!         .session_id("demo")
//!         .file_store()
//!         .build()
//!         .await?;
//!
//!     let result = guard
//!         .execute_with_path_check(
//!             |path, _args| async move { ToolResult::new(format!("wrote {}", path.display())) },
//!             "/etc/hosts",
//!             Operation::Write,
//!             Default::default(),
//!         )
//!         .await?;
//!     println!("{}", result.output);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod confirm;
pub mod context;
pub mod doom_loop;
pub mod guard;
pub mod observability;
pub mod permissions;
pub mod security;
pub mod session;

pub use config::{GuardSettings, SettingsLoader};
pub use confirm::{ConfirmationStrategy, InteractiveStrategy, Prompter, SessionCancelled};
pub use context::{ExecutionContext, StateSlot, TodoItem, TodoStatus, TokenUsage};
pub use doom_loop::{DoomLoopDetector, HistoryEntry};
pub use guard::{GuardError, PathGuardBuilder, PathGuardMiddleware, ToolResult};
pub use permissions::{ConfirmationMode, Operation};
pub use security::{CheckResult, PathCheckError, PathChecker, PathWhitelist, WhitelistTier};
pub use session::{ConfirmationStore, FileStore, MemoryStore};

/// Crate-level error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A path could not be resolved for a check.
    #[error("Path check failed: {0}")]
    PathCheck(#[from] security::PathCheckError),

    /// The user cancelled the session at a confirmation prompt.
    #[error("Session cancelled by user")]
    Cancelled,

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Persisted session state could not be read or written.
    #[error("Session error: {0}")]
    Session(#[from] session::SessionError),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Access to a path was refused
    Authorization,
    /// Configuration, parsing, or setup errors
    Configuration,
    /// Session persistence errors
    Stateful,
    /// Internal errors (IO, JSON, unexpected states)
    Internal,
    /// The user aborted the session
    Cancelled,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::PathCheck(_) => ErrorCategory::Authorization,
            Error::Config(_) => ErrorCategory::Configuration,
            Error::Session(session::SessionError::InvalidSessionId { .. }) => {
                ErrorCategory::Configuration
            }
            Error::Session(_) => ErrorCategory::Stateful,
            Error::Cancelled => ErrorCategory::Cancelled,
            Error::Json(_) | Error::Io(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }

    pub fn is_authorization_error(&self) -> bool {
        self.category() == ErrorCategory::Authorization
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

impl From<GuardError> for Error {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::SessionCancelled => Error::Cancelled,
            GuardError::Persistence(e) => Error::Session(e),
        }
    }
}

impl From<SessionCancelled> for Error {
    fn from(_: SessionCancelled) -> Self {
        Error::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, Error>;
