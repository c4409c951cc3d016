//! Path access control for filesystem-mutating tool calls.
//!
//! - Symlink-free path resolution that tolerates not-yet-existing targets
//! - A priority-ordered, five-tier whitelist of writable roots
//! - A checker that layers live, session-scoped confirmations on top
//! - AST-based shell classification used to exempt read-only commands

pub mod bash;
pub mod checker;
pub mod path;
pub mod whitelist;

mod error;

pub use bash::{ShellAnalysis, ShellAnalyzer};
pub use checker::{CheckResult, PathChecker};
pub use error::PathCheckError;
pub use path::resolve_path;
pub use whitelist::{PathWhitelist, PathWhitelistBuilder, WhitelistTier};
