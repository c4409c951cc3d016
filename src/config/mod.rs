//! Guard configuration: layered settings files plus environment overrides.
//!
//! ```rust,no_run
//! use agent_guard::config::SettingsLoader;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let workdir = std::env::current_dir()?;
//! let settings = SettingsLoader::new().load(&workdir).await?.clone();
//! println!("wild mode: {}", settings.wild_mode);
//! # Ok(())
//! # }
//! ```

pub mod settings;

pub use settings::{ENV_PREFIX, GuardSettings, SettingsLoader, SettingsSource, project_dir};

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Settings file exists but could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid JSON for this schema
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
