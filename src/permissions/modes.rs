//! Confirmation modes selecting how out-of-whitelist writes are resolved.

use serde::{Deserialize, Serialize};

/// How a confirmation request is answered.
///
/// # Modes
///
/// - **Interactive**: ask the user on the terminal. Falls back to denial when
///   no terminal is attached, so CI runs fail closed.
///
/// - **AutoAllow**: approve every request for this exact path.
///   ⚠️ Only for fully trusted runs. This is what `wild_mode` selects.
///
/// - **AutoDeny**: deny every request. Only whitelisted paths are writable.
///
/// # Example
///
/// ```rust
/// use agent_guard::permissions::ConfirmationMode;
///
/// let mode: ConfirmationMode = "auto-deny".parse().unwrap();
/// assert!(!mode.prompts_user());
/// assert!(ConfirmationMode::Interactive.prompts_user());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationMode {
    #[default]
    Interactive,
    AutoAllow,
    AutoDeny,
}

impl ConfirmationMode {
    pub fn prompts_user(&self) -> bool {
        matches!(self, ConfirmationMode::Interactive)
    }

    pub fn allows_all(&self) -> bool {
        matches!(self, ConfirmationMode::AutoAllow)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConfirmationMode::Interactive => "Ask the user for each path outside the whitelist",
            ConfirmationMode::AutoAllow => "Approve every path (dangerous)",
            ConfirmationMode::AutoDeny => "Deny every path outside the whitelist",
        }
    }
}

impl std::fmt::Display for ConfirmationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationMode::Interactive => write!(f, "interactive"),
            ConfirmationMode::AutoAllow => write!(f, "auto_allow"),
            ConfirmationMode::AutoDeny => write!(f, "auto_deny"),
        }
    }
}

impl std::str::FromStr for ConfirmationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "interactive" | "ask" => Ok(ConfirmationMode::Interactive),
            "autoallow" | "auto-allow" | "auto_allow" | "allow" | "wild" => {
                Ok(ConfirmationMode::AutoAllow)
            }
            "autodeny" | "auto-deny" | "auto_deny" | "deny" | "locked" => {
                Ok(ConfirmationMode::AutoDeny)
            }
            _ => Err(format!("Unknown confirmation mode: {}", s)),
        }
    }
}
