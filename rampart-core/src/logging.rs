//! Logging setup for Rampart services
//!
//! Everything in Rampart logs through `tracing`. This module installs the
//! global subscriber: JSON to STDOUT by default, with pretty and compact
//! formats for development.
//!
//! ```no_run
//! use rampart_core::logging::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let _guard = LogConfig::new()
//!         .level(LogLevel::Debug)
//!         .format(LogFormat::Pretty)
//!         .init();
//!
//!     info!("CSRF protection online");
//! }
//! ```
//!
//! Filtering follows `RUST_LOG` when it is set, e.g.
//! `RUST_LOG=rampart_csrf=trace,rampart_core=info`.

use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing::{debug, error, info, trace, warn};

/// Default verbosity when neither `RUST_LOG` nor a custom filter is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Output format for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured, machine-readable (default)
    Json,
    /// Multi-line, colored, for development
    Pretty,
    /// Single line, minimal
    Compact,
}

/// Output destination for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Include target (module path)
    pub targets: bool,
    /// Enable ANSI colors (ignored for JSON)
    pub colors: bool,
    /// Custom filter directive, overrides `level` and `RUST_LOG`
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    /// Set a custom filter such as `"rampart_csrf=debug,hyper=info"`
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Build the filter this configuration installs
    pub fn build_filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(directive) => {
                EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(self.level.directive()))
            }
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.directive())),
        }
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes buffered lines when dropped and must be held
    /// for the life of the process. Returns `None` if a global subscriber was
    /// already installed.
    pub fn init(self) -> Option<WorkerGuard> {
        let (writer, guard) = match self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
        };
        let filter = self.build_filter();
        let registry = tracing_subscriber::registry().with(filter);

        let installed = match self.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_target(self.targets),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_writer(writer)
                        .with_target(self.targets)
                        .with_ansi(self.colors),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_writer(writer)
                        .with_target(self.targets)
                        .with_ansi(self.colors),
                )
                .try_init(),
        };

        installed.ok().map(|_| guard)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            targets: true,
            colors: false,
            env_filter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directives_parse() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert!(EnvFilter::try_new(level.directive()).is_ok());
        }
        assert_eq!(LogLevel::Warn.directive(), "warn");
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
        assert!(config.targets);
        assert!(!config.colors);
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .level(LogLevel::Debug)
            .format(LogFormat::Compact)
            .output(LogOutput::Stderr)
            .with_colors(true)
            .with_env_filter("rampart_csrf=trace");

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(config.colors);
        assert_eq!(config.env_filter.as_deref(), Some("rampart_csrf=trace"));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let _first = LogConfig::new().output(LogOutput::Stderr).init();
        let second = LogConfig::new().output(LogOutput::Stderr).init();
        assert!(second.is_none());
    }
}
