//! Detection of an agent stuck repeating the same mutating tool call.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::permissions::{is_read_only_tool, is_shell_tool};
use crate::security::ShellAnalyzer;

pub const DEFAULT_DOOM_LOOP_THRESHOLD: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub tool_name: String,
    pub input_fingerprint: u64,
    pub output_fingerprint: Option<u64>,
}

impl HistoryEntry {
    pub fn new(tool_name: impl Into<String>, input_fingerprint: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            input_fingerprint,
            output_fingerprint: None,
        }
    }

    fn same_call(&self, other: &HistoryEntry) -> bool {
        self.tool_name == other.tool_name && self.input_fingerprint == other.input_fingerprint
    }
}

/// Hash of the canonical JSON text of a tool input.
///
/// `serde_json` maps keep keys sorted, so equal inputs hash equally no
/// matter how their keys were ordered when built.
pub fn fingerprint(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(value)
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

fn fingerprint_text(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Flags `threshold` consecutive identical mutating calls.
///
/// History lives in the caller's [`ExecutionContext`], so one detector can
/// serve any number of concurrent sessions.
#[derive(Clone, Debug)]
pub struct DoomLoopDetector {
    threshold: usize,
    shell: ShellAnalyzer,
}

impl Default for DoomLoopDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DOOM_LOOP_THRESHOLD)
    }
}

impl DoomLoopDetector {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            shell: ShellAnalyzer::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Read-only tools and read-only shell commands are never recorded.
    pub fn is_exempt(&self, tool_name: &str, input: &Value) -> bool {
        if is_read_only_tool(tool_name) {
            return true;
        }
        if is_shell_tool(tool_name)
            && let Some(command) = input.get("command").and_then(Value::as_str)
        {
            return self.shell.is_read_only(command);
        }
        false
    }

    /// Record a call and report whether it completes a loop.
    pub fn record_and_check(&self, ctx: &ExecutionContext, tool_name: &str, input: &Value) -> bool {
        if self.is_exempt(tool_name, input) {
            tracing::trace!(tool = tool_name, "Exempt from doom-loop tracking");
            return false;
        }

        let entry = HistoryEntry::new(tool_name, fingerprint(input));
        let threshold = self.threshold;
        let detected = ctx.doom_history().update(|history| {
            history.push_back(entry.clone());
            while history.len() > threshold {
                history.pop_front();
            }
            history.len() == threshold && history.iter().all(|e| e.same_call(&entry))
        });

        if detected {
            tracing::warn!(
                session_id = ctx.session_id(),
                tool = tool_name,
                repeats = threshold,
                "Doom loop detected"
            );
        }
        detected
    }

    /// Attach an output fingerprint to the most recent recorded call.
    pub fn record_output(&self, ctx: &ExecutionContext, output: &str) {
        let fp = fingerprint_text(output);
        ctx.doom_history().update(|history| {
            if let Some(last) = history.back_mut() {
                last.output_fingerprint = Some(fp);
            }
        });
    }

    pub fn reset(&self, ctx: &ExecutionContext) {
        ctx.doom_history().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flags_on_fifth_identical_call() {
        let ctx = ExecutionContext::new("s");
        let detector = DoomLoopDetector::default();
        let input = json!({"file_path": "/w/a.py", "content": "x"});

        for _ in 0..4 {
            assert!(!detector.record_and_check(&ctx, "write", &input));
        }
        assert!(detector.record_and_check(&ctx, "write", &input));
        assert!(detector.record_and_check(&ctx, "write", &input));
    }

    #[test]
    fn test_distinct_inputs_never_flag() {
        let ctx = ExecutionContext::new("s");
        let detector = DoomLoopDetector::default();
        for i in 0..10 {
            assert!(!detector.record_and_check(&ctx, "write", &json!({"n": i})));
        }
    }

    #[test]
    fn test_interruption_resets_run() {
        let ctx = ExecutionContext::new("s");
        let detector = DoomLoopDetector::default();
        let input = json!({"a": 1});

        for _ in 0..4 {
            detector.record_and_check(&ctx, "edit", &input);
        }
        assert!(!detector.record_and_check(&ctx, "write", &input));
        for _ in 0..4 {
            assert!(!detector.record_and_check(&ctx, "edit", &input));
        }
        assert!(detector.record_and_check(&ctx, "edit", &input));
    }

    #[test]
    fn test_read_only_tools_exempt() {
        let ctx = ExecutionContext::new("s");
        let detector = DoomLoopDetector::default();
        for _ in 0..100 {
            assert!(!detector.record_and_check(&ctx, "read_file", &json!({"path": "a"})));
            assert!(!detector.record_and_check(&ctx, "Glob", &json!({"pattern": "*"})));
        }
        assert!(ctx.doom_history().get().is_empty());
    }

    #[test]
    fn test_read_only_shell_exempt() {
        let ctx = ExecutionContext::new("s");
        let detector = DoomLoopDetector::default();
        let status = json!({"command": "git status"});
        for _ in 0..20 {
            assert!(!detector.record_and_check(&ctx, "bash", &status));
        }

        let rm = json!({"command": "rm -rf build"});
        let flagged = (0..5).map(|_| detector.record_and_check(&ctx, "bash", &rm)).last();
        assert_eq!(flagged, Some(true));
    }

    #[test]
    fn test_key_order_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_history_capped_and_output_recorded() {
        let ctx = ExecutionContext::new("s");
        let detector = DoomLoopDetector::default();
        for i in 0..8 {
            detector.record_and_check(&ctx, "write", &json!(i));
        }
        detector.record_output(&ctx, "ok");

        let history = ctx.doom_history().get();
        assert_eq!(history.len(), DEFAULT_DOOM_LOOP_THRESHOLD);
        assert!(history.back().unwrap().output_fingerprint.is_some());
        assert!(history.front().unwrap().output_fingerprint.is_none());

        detector.reset(&ctx);
        assert!(ctx.doom_history().get().is_empty());
    }

    #[test]
    fn test_custom_threshold() {
        let ctx = ExecutionContext::new("s");
        let detector = DoomLoopDetector::new(2);
        assert!(!detector.record_and_check(&ctx, "write", &json!(1)));
        assert!(detector.record_and_check(&ctx, "write", &json!(1)));
    }
}
