//! Logging setup for esops.
//!
//! The client crates only emit `tracing` events. This crate installs a
//! subscriber for them, configured from environment variables.
//!
//! # Usage
//!
//! ```rust
//! // Install the global subscriber once at startup.
//! esops_log::init();
//!
//! tracing::info!(hosts = 3, "Client ready");
//! ```
//!
//! # Environment Variables
//!
//! - `ESOPS_DEBUG=1` - Enable debug logging
//! - `ESOPS_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `ESOPS_LOG_FORMAT=pretty|json|compact` - Set output format (default json)
//! - `ESOPS_LOG_COLOR=1|0` - Enable/disable colors
//! - `ESOPS_LOG_TIMESTAMPS=1|0` - Include timestamps
//! - `ESOPS_LOG_TARGET=1|0` - Include the event target
//! - `RUST_LOG` - Full filter directive, overrides the level when set

#![warn(missing_docs)]

use once_cell::sync::Lazy;
use std::env;
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::{EnvFilter, Registry, fmt};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse level from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human readable format
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Get format from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include the event target
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false, // JSON output doesn't use colors
            timestamps: true,
            target: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let debug = flag("ESOPS_DEBUG").unwrap_or(false);

        let level = lookup("ESOPS_LOG_LEVEL")
            .and_then(|s| Level::from_str(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("ESOPS_LOG_FORMAT")
            .and_then(|s| Format::from_str(&s))
            .unwrap_or(Format::Json);

        let color = flag("ESOPS_LOG_COLOR").unwrap_or_else(|| {
            format != Format::Json && lookup("NO_COLOR").is_none() && lookup("TERM").is_some()
        });

        Self {
            debug,
            level,
            format,
            color,
            timestamps: flag("ESOPS_LOG_TIMESTAMPS").unwrap_or(true),
            target: flag("ESOPS_LOG_TARGET").unwrap_or(true),
        }
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

/// Get the configuration read from the environment.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

// ============================================================================
// Subscriber
// ============================================================================

type Filtered = Layered<EnvFilter, Registry>;

fn format_layer(config: &LogConfig) -> Box<dyn Layer<Filtered> + Send + Sync> {
    let base = fmt::layer()
        .with_ansi(config.color)
        .with_target(config.target);

    match (config.format, config.timestamps) {
        (Format::Json, true) => base.json().boxed(),
        (Format::Json, false) => base.json().without_time().boxed(),
        (Format::Compact, true) => base.compact().boxed(),
        (Format::Compact, false) => base.compact().without_time().boxed(),
        (Format::Pretty, true) => base.pretty().boxed(),
        (Format::Pretty, false) => base.pretty().without_time().boxed(),
    }
}

/// Build a subscriber for `config`.
///
/// `RUST_LOG`, when set and valid, replaces the configured level.
pub fn subscriber(config: &LogConfig) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(config))
}

/// Install the global subscriber from the environment configuration.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init() -> bool {
    tracing::subscriber::set_global_default(subscriber(config())).is_ok()
}

/// Check if debug logging is enabled.
pub fn is_debug_enabled() -> bool {
    config().debug || config().level <= Level::Debug
}

// ============================================================================
// Tests
// ============================================================================
