//! Guard settings with hierarchical loading.
//!
//! Loads settings from (lowest to highest priority):
//! 1. User settings: `<config dir>/agent-guard/settings.json`
//! 2. Project settings: `<workdir>/.agent-guard/settings.json`
//! 3. `AGENT_GUARD_*` environment variables
//!
//! Lists are concatenated across layers; scalars from a higher layer replace
//! those below it.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigResult};
use crate::permissions::ConfirmationMode;
use crate::security::path::normalize_path;
use crate::session::FileStore;

pub const ENV_PREFIX: &str = "AGENT_GUARD_";

const APP_NAME: &str = "agent-guard";
const PROJECT_DIR: &str = ".agent-guard";
const SETTINGS_FILE: &str = "settings.json";
const AUDIT_FILE: &str = "audit_denied.jsonl";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsSource {
    #[default]
    Builtin,
    User,
    Project,
    Env,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardSettings {
    /// Extra writable roots (config tier of the whitelist).
    #[serde(default)]
    pub allowed_write_paths: Vec<PathBuf>,

    /// Prompts allowed per session before everything auto-denies.
    #[serde(default)]
    pub max_confirmations_per_session: Option<usize>,

    #[serde(default)]
    pub audit_denied: bool,

    #[serde(default)]
    pub audit_log_file: Option<PathBuf>,

    /// Approve everything without asking.
    #[serde(default)]
    pub wild_mode: bool,

    #[serde(default)]
    pub confirmation_mode: ConfirmationMode,

    /// Root for persisted session records.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

impl GuardSettings {
    /// `wild_mode` wins over any configured confirmation mode.
    pub fn effective_mode(&self) -> ConfirmationMode {
        if self.wild_mode {
            ConfirmationMode::AutoAllow
        } else {
            self.confirmation_mode
        }
    }

    pub fn storage_root(&self) -> Option<PathBuf> {
        self.storage_dir.clone().or_else(FileStore::default_root)
    }

    /// Where denials are audited, if auditing is on.
    pub fn audit_log_path(&self) -> Option<PathBuf> {
        if !self.audit_denied {
            return None;
        }
        self.audit_log_file
            .clone()
            .or_else(|| self.storage_root().map(|root| root.join(AUDIT_FILE)))
    }

    /// Where the guard keeps its own settings and state for a session in
    /// `workdir`. Writes there must never ride on a whitelist tier, or the
    /// agent could rewrite its own limits.
    pub fn control_paths(&self, workdir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![project_dir(workdir)];
        paths.extend(user_config_dir());
        paths.extend(self.storage_root());
        paths.extend(self.audit_log_path());
        paths
    }

    fn resolve_relative(&mut self, base: &Path) {
        let absolutize = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = normalize_path(&base.join(&*p));
            }
        };
        self.allowed_write_paths.iter_mut().for_each(absolutize);
        self.audit_log_file.iter_mut().for_each(absolutize);
        self.storage_dir.iter_mut().for_each(absolutize);
    }
}

/// One settings file. Absent scalars leave lower layers untouched.
#[derive(Debug, Default, Deserialize)]
struct SettingsLayer {
    #[serde(default)]
    allowed_write_paths: Vec<PathBuf>,
    max_confirmations_per_session: Option<usize>,
    audit_denied: Option<bool>,
    audit_log_file: Option<PathBuf>,
    wild_mode: Option<bool>,
    confirmation_mode: Option<ConfirmationMode>,
    storage_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct SettingsLoader {
    settings: GuardSettings,
    user_dir: Option<PathBuf>,
    sources: Vec<SettingsSource>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            user_dir: user_config_dir(),
            ..Default::default()
        }
    }

    /// Override the directory holding the user-level `settings.json`.
    pub fn user_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.user_dir = dir;
        self
    }

    /// Layers that contributed, in merge order.
    pub fn sources(&self) -> &[SettingsSource] {
        &self.sources
    }

    /// Load user file, project file, then process environment.
    pub async fn load(&mut self, workdir: &Path) -> ConfigResult<&GuardSettings> {
        self.load_files(workdir).await?;
        self.apply_env(|key| std::env::var(key).ok())?;
        self.settings.resolve_relative(workdir);
        Ok(&self.settings)
    }

    /// Load only the settings files, leaving environment overrides out.
    pub async fn load_files(&mut self, workdir: &Path) -> ConfigResult<&GuardSettings> {
        if let Some(dir) = self.user_dir.clone() {
            self.merge_file(&dir.join(SETTINGS_FILE), SettingsSource::User)
                .await?;
        }
        let project = project_dir(workdir).join(SETTINGS_FILE);
        self.merge_file(&project, SettingsSource::Project).await?;
        Ok(&self.settings)
    }

    async fn merge_file(&mut self, path: &Path, source: SettingsSource) -> ConfigResult<()> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let layer: SettingsLayer =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), ?source, "Merging settings file");
        self.merge_layer(layer);
        self.sources.push(source);
        Ok(())
    }

    fn merge_layer(&mut self, layer: SettingsLayer) {
        let settings = &mut self.settings;
        for path in layer.allowed_write_paths {
            if !settings.allowed_write_paths.contains(&path) {
                settings.allowed_write_paths.push(path);
            }
        }
        if layer.max_confirmations_per_session.is_some() {
            settings.max_confirmations_per_session = layer.max_confirmations_per_session;
        }
        if let Some(audit) = layer.audit_denied {
            settings.audit_denied = audit;
        }
        if layer.audit_log_file.is_some() {
            settings.audit_log_file = layer.audit_log_file;
        }
        if let Some(wild) = layer.wild_mode {
            settings.wild_mode = wild;
        }
        if let Some(mode) = layer.confirmation_mode {
            settings.confirmation_mode = mode;
        }
        if layer.storage_dir.is_some() {
            settings.storage_dir = layer.storage_dir;
        }
    }

    /// Apply `AGENT_GUARD_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<&GuardSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };
        let mut layer = SettingsLayer::default();
        let mut touched = false;

        if let Some((key, value)) = var("WILD_MODE") {
            layer.wild_mode = Some(parse_bool(&key, &value)?);
            touched = true;
        }
        if let Some((key, value)) = var("MAX_CONFIRMATIONS") {
            let max = value
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    key,
                    message: e.to_string(),
                })?;
            layer.max_confirmations_per_session = Some(max);
            touched = true;
        }
        if let Some((_, value)) = var("AUDIT_LOG")
            && !value.trim().is_empty()
        {
            layer.audit_denied = Some(true);
            layer.audit_log_file = Some(PathBuf::from(value.trim()));
            touched = true;
        }
        if let Some((_, value)) = var("ALLOWED_WRITE_PATHS") {
            layer.allowed_write_paths = std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            touched = true;
        }
        if let Some((key, value)) = var("CONFIRMATION_MODE") {
            let mode = value
                .parse::<ConfirmationMode>()
                .map_err(|message| ConfigError::InvalidValue { key, message })?;
            layer.confirmation_mode = Some(mode);
            touched = true;
        }

        if touched {
            self.merge_layer(layer);
            self.sources.push(SettingsSource::Env);
        }
        Ok(&self.settings)
    }

    pub fn settings(&self) -> &GuardSettings {
        &self.settings
    }

    pub fn into_settings(self) -> GuardSettings {
        self.settings
    }
}

/// `<workdir>/.agent-guard`, home of the project settings file.
pub fn project_dir(workdir: &Path) -> PathBuf {
    workdir.join(PROJECT_DIR)
}

fn user_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|d| d.config_dir().to_path_buf())
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn write_settings(dir: &Path, json: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(SETTINGS_FILE), json).unwrap();
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[tokio::test]
    async fn test_missing_files_yield_defaults() {
        let dir = tempdir().unwrap();
        let mut loader = SettingsLoader::new().user_dir(Some(dir.path().join("user")));
        let settings = loader.load_files(dir.path()).await.unwrap().clone();

        assert_eq!(settings, GuardSettings::default());
        assert!(loader.sources().is_empty());
    }

    #[tokio::test]
    async fn test_project_overrides_user() {
        let dir = tempdir().unwrap();
        let user = dir.path().join("user");
        let work = dir.path().join("work");
        write_settings(
            &user,
            r#"{"allowed_write_paths": ["/data"], "max_confirmations_per_session": 3, "audit_denied": true}"#,
        );
        write_settings(
            &work.join(PROJECT_DIR),
            r#"{"allowed_write_paths": ["/data", "out"], "max_confirmations_per_session": 10}"#,
        );

        let mut loader = SettingsLoader::new().user_dir(Some(user));
        loader.load_files(&work).await.unwrap();
        let mut settings = loader.into_settings();
        settings.resolve_relative(&work);

        assert_eq!(
            settings.allowed_write_paths,
            vec![PathBuf::from("/data"), work.join("out")]
        );
        assert_eq!(settings.max_confirmations_per_session, Some(10));
        assert!(settings.audit_denied);
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        write_settings(&dir.path().join(PROJECT_DIR), "{ nope");
        let mut loader = SettingsLoader::new().user_dir(None);
        let err = loader.load_files(dir.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = SettingsLoader::new().user_dir(None);
        let paths = std::env::join_paths(["/a", "/b"]).unwrap();
        let paths = paths.to_str().unwrap().to_string();

        let settings = loader
            .apply_env(env(&[
                ("AGENT_GUARD_WILD_MODE", "true"),
                ("AGENT_GUARD_MAX_CONFIRMATIONS", "4"),
                ("AGENT_GUARD_AUDIT_LOG", "/var/log/guard.jsonl"),
                ("AGENT_GUARD_ALLOWED_WRITE_PATHS", &paths),
                ("AGENT_GUARD_CONFIRMATION_MODE", "auto_deny"),
            ]))
            .unwrap();

        assert!(settings.wild_mode);
        assert_eq!(settings.max_confirmations_per_session, Some(4));
        assert!(settings.audit_denied);
        assert_eq!(
            settings.audit_log_path(),
            Some(PathBuf::from("/var/log/guard.jsonl"))
        );
        assert_eq!(
            settings.allowed_write_paths,
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert_eq!(settings.confirmation_mode, ConfirmationMode::AutoDeny);
        assert_eq!(settings.effective_mode(), ConfirmationMode::AutoAllow);
        assert_eq!(loader.sources(), &[SettingsSource::Env]);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut loader = SettingsLoader::new().user_dir(None);
        let err = loader
            .apply_env(env(&[("AGENT_GUARD_MAX_CONFIRMATIONS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "AGENT_GUARD_MAX_CONFIRMATIONS"));

        let err = loader
            .apply_env(env(&[("AGENT_GUARD_WILD_MODE", "sometimes")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_audit_log_path_defaults_under_storage() {
        let settings = GuardSettings {
            audit_denied: true,
            storage_dir: Some(PathBuf::from("/srv/guard")),
            ..Default::default()
        };
        assert_eq!(
            settings.audit_log_path(),
            Some(PathBuf::from("/srv/guard").join(AUDIT_FILE))
        );
        assert_eq!(GuardSettings::default().audit_log_path(), None);
    }

    #[test]
    fn test_settings_deserialize() {
        let settings: GuardSettings = serde_json::from_str(
            r#"{"wild_mode": false, "confirmation_mode": "auto_allow", "audit_log_file": "/x.jsonl"}"#,
        )
        .unwrap();
        assert_eq!(settings.effective_mode(), ConfirmationMode::AutoAllow);
        assert!(!settings.audit_denied);
    }
}
