//! Operations and tool classification used by the path guard and the doom-loop detector.

mod modes;

pub use modes::ConfirmationMode;

use serde::{Deserialize, Serialize};

/// Filesystem operation a tool intends to perform on a path.
///
/// `Read` is never gated: reading cannot destroy data. Every other
/// operation goes through the whitelist.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    #[default]
    Write,
    Delete,
    Execute,
}

impl Operation {
    pub fn is_read(&self) -> bool {
        matches!(self, Operation::Read)
    }

    pub fn is_mutating(&self) -> bool {
        !self.is_read()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::Execute => "execute",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Operation::Read),
            "write" => Ok(Operation::Write),
            "delete" => Ok(Operation::Delete),
            "execute" | "exec" => Ok(Operation::Execute),
            _ => Err(format!("Unknown operation: {}", s)),
        }
    }
}

/// Tools that only observe the filesystem or environment.
pub const READ_ONLY_TOOLS: &[&str] = &[
    "read",
    "read_file",
    "glob",
    "grep",
    "ls",
    "list_dir",
    "exists",
    "file_exists",
    "env",
    "get_env",
    "web_search",
    "web_fetch",
    "todo_read",
];

/// Tools that run a shell command taken from their `command` input field.
pub const SHELL_TOOLS: &[&str] = &["bash", "shell", "run_shell"];

fn canonical(tool_name: &str) -> String {
    tool_name.trim().to_lowercase().replace('-', "_")
}

pub fn is_read_only_tool(tool_name: &str) -> bool {
    READ_ONLY_TOOLS.contains(&canonical(tool_name).as_str())
}

pub fn is_shell_tool(tool_name: &str) -> bool {
    SHELL_TOOLS.contains(&canonical(tool_name).as_str())
}
