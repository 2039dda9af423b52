//! Structured logging setup.
//!
//! Logs go to stderr so the CLI can keep stdout for its own output. JSON is
//! the default format; set `DISPATCH_LOG_FORMAT=pretty` during development.
//!
//! | Variable                      | Default | Meaning                          |
//! |-------------------------------|---------|----------------------------------|
//! | `RUST_LOG`                    | unset   | Full filter, wins over the level |
//! | `DISPATCH_LOG_LEVEL`          | `info`  | trace, debug, info, warn, error  |
//! | `DISPATCH_LOG_FORMAT`         | `json`  | json or pretty                   |
//! | `DISPATCH_LOG_TARGET_FILTER`  | unset   | Extra comma-separated directives |
//! | `DISPATCH_LOG_INCLUDE_LOCATION` | `false` | Emit file and line numbers     |

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    /// Extra `EnvFilter` directives, comma separated (e.g. `hyper=warn`)
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Load logging configuration from `DISPATCH_LOG_*` variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            log_level: get("DISPATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format: LogFormat::parse(
                &get("DISPATCH_LOG_FORMAT").unwrap_or_else(|| "json".to_string()),
            ),
            target_filter: get("DISPATCH_LOG_TARGET_FILTER").filter(|s| !s.trim().is_empty()),
            include_location: get("DISPATCH_LOG_INCLUDE_LOCATION")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
        }
    }

    /// Human-readable output at debug level.
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: true,
        }
    }

    pub(crate) fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        // Per-connection chatter from hyper is rarely useful above debug.
        if let Ok(directive) = "hyper=warn".parse() {
            filter = filter.add_directive(directive);
        }
        if let Some(target_filter) = &self.target_filter {
            for directive in target_filter.split(',').map(str::trim) {
                if directive.is_empty() {
                    continue;
                }
                match directive.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
                }
            }
        }
        filter
    }
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed (e.g. by a
/// test harness or an embedding application); that is not an error.
pub fn init_logging(config: &LogConfig) -> Result<bool> {
    if tracing::dispatcher::has_been_set() {
        return Ok(false);
    }

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[test]
    fn test_from_vars_defaults() {
        let c = LogConfig::from_vars(|_| None);
        assert_eq!(c, LogConfig::default());
        assert_eq!(c.level(), Level::INFO);
    }

    #[test]
    fn test_from_vars_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DISPATCH_LOG_LEVEL", "DEBUG"),
            ("DISPATCH_LOG_FORMAT", "pretty"),
            ("DISPATCH_LOG_TARGET_FILTER", "openapi_dispatcher=trace"),
            ("DISPATCH_LOG_INCLUDE_LOCATION", "1"),
        ]
        .into_iter()
        .collect();
        let c = LogConfig::from_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(c.level(), Level::DEBUG);
        assert_eq!(c.format, LogFormat::Pretty);
        assert_eq!(c.target_filter.as_deref(), Some("openapi_dispatcher=trace"));
        assert!(c.include_location);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let c = LogConfig {
            log_level: "verbose".into(),
            ..LogConfig::default()
        };
        assert_eq!(c.level(), Level::INFO);
    }
}
