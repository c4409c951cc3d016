//! Tracing setup for the guard.
//!
//! The library only emits `tracing` events. Binaries that want them printed
//! can enable the `subscriber` feature:
//!
//! ```toml
//! agent-guard = { version = "0.1", features = ["subscriber"] }
//! ```
//!
//! ```rust,ignore
//! use agent_guard::observability::{TracingConfig, TracingLevel, init_tracing};
//!
//! init_tracing(&TracingConfig::new().level(TracingLevel::Debug))?;
//! ```

use tracing::Span;

/// Target used by the `default_directive` so only this crate gets verbose.
pub const CRATE_TARGET: &str = "agent_guard";

#[derive(Clone, Debug, Default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub level: TracingLevel,
    pub ansi: bool,
    /// Full `RUST_LOG`-style filter; wins over `level` when set.
    pub filter: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingLevel {
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl TracingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TracingLevel::Warn => "warn",
            TracingLevel::Info => "info",
            TracingLevel::Debug => "debug",
            TracingLevel::Trace => "trace",
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ansi: true,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// The filter directive the subscriber is built from.
    pub fn directive(&self) -> String {
        match self.filter {
            Some(ref filter) => filter.clone(),
            None => format!("warn,{}={}", CRATE_TARGET, self.level.as_str()),
        }
    }
}

/// Span wrapping everything a session's tasks log.
pub fn session_span(session_id: &str) -> Span {
    tracing::info_span!("guard_session", session_id = %session_id)
}

#[cfg(feature = "subscriber")]
#[derive(Debug, thiserror::Error)]
#[error("Failed to initialise tracing: {0}")]
pub struct TracingInitError(String);

/// Install a global fmt subscriber. `RUST_LOG` overrides the configured
/// directive when present.
#[cfg(feature = "subscriber")]
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingInitError> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    if !config.enabled {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directive()))
        .map_err(|e| TracingInitError(e.to_string()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TracingInitError(e.to_string()))
}
