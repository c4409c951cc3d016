//! AST-based shell command classification using tree-sitter.

use std::sync::LazyLock;

use regex::Regex;
use tree_sitter::{Language, Parser, Query, QueryCursor, StreamingIterator};

/// Commands (matched word-by-word against the start of each simple command)
/// that only observe state: listing, printing, status-only version control,
/// byte-compilation and syntax checks.
pub const READ_ONLY_COMMAND_PREFIXES: &[&str] = &[
    "ls",
    "ll",
    "pwd",
    "cat",
    "head",
    "tail",
    "less",
    "wc",
    "echo",
    "which",
    "whoami",
    "type",
    "file",
    "stat",
    "du",
    "df",
    "tree",
    "uname",
    "printenv",
    "id",
    "grep",
    "rg",
    "diff",
    "cmp",
    "true",
    "test",
    "git status",
    "git diff",
    "git log",
    "git show",
    "git blame",
    "git rev-parse",
    "git ls-files",
    "git remote -v",
    "git branch --list",
    "git branch --show-current",
    "python -m py_compile",
    "python3 -m py_compile",
    "python -m compileall",
    "python3 -m compileall",
    "node --check",
    "ruby -c",
    "bash -n",
    "cargo check",
    "go vet",
];

static HARMLESS_REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d*<.*|\d*>&\d+-?|(\d*|&)>>?\s*/dev/null)$").expect("valid regex")
});

static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").expect("valid regex"));

fn bash_language() -> Language {
    tree_sitter_bash::LANGUAGE.into()
}

#[derive(Debug, Clone, Default)]
pub struct ShellAnalysis {
    /// Every simple command, including those nested in substitutions,
    /// with whitespace collapsed.
    pub commands: Vec<String>,
    /// Redirections that write somewhere other than `/dev/null` or another fd.
    pub output_redirects: Vec<String>,
    /// The parser produced a tree without error nodes.
    pub parsed: bool,
}

impl ShellAnalysis {
    pub fn is_read_only(&self) -> bool {
        self.parsed
            && !self.commands.is_empty()
            && self.output_redirects.is_empty()
            && self.commands.iter().all(|cmd| is_read_only_command(cmd))
    }
}

/// Splits a shell line into its simple commands and redirections.
#[derive(Debug, Clone, Default)]
pub struct ShellAnalyzer;

impl ShellAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, command: &str) -> ShellAnalysis {
        let mut analysis = ShellAnalysis::default();

        let mut parser = Parser::new();
        if parser.set_language(&bash_language()).is_err() {
            return analysis;
        }

        let Some(tree) = parser.parse(command, None) else {
            return analysis;
        };
        analysis.parsed = !tree.root_node().has_error();

        let query_str = r#"
            (command) @cmd
            (file_redirect) @redirect
        "#;

        if let Ok(query) = Query::new(&bash_language(), query_str) {
            let mut cursor = QueryCursor::new();
            let mut matches = cursor.matches(&query, tree.root_node(), command.as_bytes());
            while let Some(m) = matches.next() {
                for capture in m.captures {
                    let text = normalize_whitespace(&command[capture.node.byte_range()]);
                    match capture.index {
                        0 => analysis.commands.push(text),
                        _ if !HARMLESS_REDIRECT.is_match(&text) => {
                            analysis.output_redirects.push(text)
                        }
                        _ => {}
                    }
                }
            }
        } else {
            analysis.parsed = false;
        }

        analysis
    }

    /// A shell line is read-only when it parses cleanly, writes no files via
    /// redirection, and every command it runs is on the read-only list.
    pub fn is_read_only(&self, command: &str) -> bool {
        self.analyze(command).is_read_only()
    }
}

fn normalize_whitespace(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_read_only_command(command: &str) -> bool {
    let words: Vec<&str> = command
        .split_whitespace()
        .skip_while(|w| ASSIGNMENT.is_match(w))
        .collect();

    match words.as_slice() {
        [] => return false,
        // Bare, these only print; with arguments they set state or run a
        // command of their own.
        ["env" | "hostname"] => return true,
        ["env" | "hostname", ..] => return false,
        ["date", args @ ..] => {
            return args
                .iter()
                .all(|arg| arg.trim_start_matches(['\'', '"']).starts_with('+'));
        }
        _ => {}
    }

    READ_ONLY_COMMAND_PREFIXES.iter().any(|prefix| {
        let prefix_words: Vec<&str> = prefix.split_whitespace().collect();
        words.len() >= prefix_words.len()
            && words.iter().zip(&prefix_words).all(|(w, p)| w == p)
    })
}
