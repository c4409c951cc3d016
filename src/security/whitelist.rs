//! Priority-ordered whitelist of writable directory roots.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::path::{is_within, resolve_path};

/// Source of a whitelisted root, in the order tiers are consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitelistTier {
    WorkingDir,
    SafeRoot,
    Cli,
    Config,
    Confirmed,
}

impl WhitelistTier {
    pub const ALL: [WhitelistTier; 5] = [
        WhitelistTier::WorkingDir,
        WhitelistTier::SafeRoot,
        WhitelistTier::Cli,
        WhitelistTier::Config,
        WhitelistTier::Confirmed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            WhitelistTier::WorkingDir => "working directory",
            WhitelistTier::SafeRoot => "default safe root",
            WhitelistTier::Cli => "command-line path",
            WhitelistTier::Config => "configured path",
            WhitelistTier::Confirmed => "previously confirmed directory",
        }
    }
}

impl std::fmt::Display for WhitelistTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable snapshot of the five whitelist tiers.
///
/// All roots are resolved (absolute, symlink-free) at build time, so
/// membership is a plain prefix test on resolved paths. Roots that cannot be
/// resolved are dropped with a warning rather than whitelisting something
/// unintended.
#[derive(Clone, Debug, Default)]
pub struct PathWhitelist {
    working_dir: Option<PathBuf>,
    safe_root: Option<PathBuf>,
    cli_paths: Vec<PathBuf>,
    config_paths: Vec<PathBuf>,
    confirmed_dirs: Vec<PathBuf>,
    protected: Vec<PathBuf>,
}

impl PathWhitelist {
    pub fn builder() -> PathWhitelistBuilder {
        PathWhitelistBuilder::default()
    }

    /// Base used for relative paths; `/` when no working directory is known.
    pub fn base_dir(&self) -> &Path {
        self.working_dir.as_deref().unwrap_or(Path::new("/"))
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn safe_root(&self) -> Option<&Path> {
        self.safe_root.as_deref()
    }

    pub fn roots(&self, tier: WhitelistTier) -> &[PathBuf] {
        match tier {
            WhitelistTier::WorkingDir => self.working_dir.as_slice(),
            WhitelistTier::SafeRoot => self.safe_root.as_slice(),
            WhitelistTier::Cli => &self.cli_paths,
            WhitelistTier::Config => &self.config_paths,
            WhitelistTier::Confirmed => &self.confirmed_dirs,
        }
    }

    /// First tier containing an already-resolved path.
    pub fn tier_for(&self, resolved: &Path) -> Option<WhitelistTier> {
        WhitelistTier::ALL.into_iter().find(|tier| {
            self.roots(*tier)
                .iter()
                .any(|root| is_within(resolved, root))
        })
    }

    /// Guard settings and state locations that no tier may open up.
    pub fn protected_paths(&self) -> &[PathBuf] {
        &self.protected
    }

    pub fn is_protected(&self, resolved: &Path) -> bool {
        self.protected.iter().any(|root| is_within(resolved, root))
    }

    /// Resolve `path` and test it against every tier. Resolution failures are
    /// reported as "not whitelisted".
    pub fn is_whitelisted(&self, path: &Path) -> bool {
        match resolve_path(path, self.base_dir()) {
            Ok(resolved) => self.tier_for(&resolved).is_some(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Whitelist lookup on unresolvable path");
                false
            }
        }
    }
}

#[derive(Default)]
pub struct PathWhitelistBuilder {
    working_dir: Option<PathBuf>,
    safe_root: Option<Option<PathBuf>>,
    cli_paths: Vec<PathBuf>,
    config_paths: Vec<PathBuf>,
    confirmed_dirs: Vec<PathBuf>,
    protected: Vec<PathBuf>,
}

impl PathWhitelistBuilder {
    pub fn working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    /// Override the default safe root (the system temp directory).
    pub fn safe_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.safe_root = Some(Some(path.into()));
        self
    }

    /// Build without a safe-root tier.
    pub fn no_safe_root(mut self) -> Self {
        self.safe_root = Some(None);
        self
    }

    pub fn cli_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.cli_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn config_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.config_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn confirmed_dirs(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.confirmed_dirs.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Paths that always need a live confirmation, even inside a tier.
    pub fn protected_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.protected.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> PathWhitelist {
        let working_dir = self
            .working_dir
            .or_else(|| std::env::current_dir().ok())
            .and_then(|dir| resolve_root(WhitelistTier::WorkingDir, &dir, Path::new("/")));

        let base = working_dir.clone().unwrap_or_else(|| PathBuf::from("/"));

        let safe_root = self
            .safe_root
            .unwrap_or_else(|| Some(std::env::temp_dir()))
            .and_then(|root| resolve_root(WhitelistTier::SafeRoot, &root, &base));

        let resolve_all = |tier: WhitelistTier, paths: Vec<PathBuf>| -> Vec<PathBuf> {
            let mut resolved: Vec<PathBuf> = Vec::with_capacity(paths.len());
            for path in paths {
                if let Some(root) = resolve_root(tier, &path, &base)
                    && !resolved.contains(&root)
                {
                    resolved.push(root);
                }
            }
            resolved
        };

        PathWhitelist {
            cli_paths: resolve_all(WhitelistTier::Cli, self.cli_paths),
            config_paths: resolve_all(WhitelistTier::Config, self.config_paths),
            confirmed_dirs: resolve_all(WhitelistTier::Confirmed, self.confirmed_dirs),
            protected: self
                .protected
                .into_iter()
                .filter_map(|path| match resolve_path(&path, &base) {
                    Ok(resolved) => Some(resolved),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Cannot protect unresolvable path");
                        None
                    }
                })
                .collect(),
            working_dir,
            safe_root,
        }
    }
}

fn resolve_root(tier: WhitelistTier, path: &Path, base: &Path) -> Option<PathBuf> {
    match resolve_path(path, base) {
        Ok(root) => Some(root),
        Err(e) => {
            tracing::warn!(
                tier = %tier,
                path = %path.display(),
                error = %e,
                "Dropping unresolvable whitelist root"
            );
            None
        }
    }
}
