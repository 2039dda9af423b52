//! # Dispatcher Configuration
//!
//! Process-wide settings consumed at startup.
//!
//! ## Sources
//!
//! Values are layered, later sources winning:
//!
//! 1. Built-in defaults
//! 2. An optional YAML (`.yaml`/`.yml`) or JSON file
//! 3. Environment variables
//!
//! ## Environment Variables
//!
//! | Variable                         | Field                   |
//! |----------------------------------|-------------------------|
//! | `DISPATCH_DEFAULT_TIMEOUT_MS`    | `default_timeout_ms`    |
//! | `DISPATCH_PRE_INVOKE_TIMEOUT_MS` | `pre_invoke_timeout_ms` |
//! | `DISPATCH_TOKEN_EXPIRATION_MS`   | `token_expiration_ms`   |
//! | `DISPATCH_BODY_LIMIT_BYTES`      | `body_limit_bytes`      |
//! | `DISPATCH_JWT_SECRET`            | `jwt.secret`            |
//! | `DISPATCH_SPEC_DIR`              | `spec_dir`              |
//! | `DISPATCH_MOUNT_PREFIX`          | `mount_prefix`          |
//!
//! A variable that does not parse is ignored with a warning; the previous
//! layer's value stays in effect.
//!
//! ```bash
//! export DISPATCH_DEFAULT_TIMEOUT_MS=5000
//! export DISPATCH_JWT_SECRET=change-me
//! dispatch-cli routes --spec-dir ./api
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default handler invocation deadline (30 s).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default token lifetime (30 min).
pub const DEFAULT_TOKEN_EXPIRATION_MS: u64 = 1_800_000;
/// Default request body limit.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 5_120_000;

/// Identity token settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub cookie_name: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_name: crate::auth::DEFAULT_COOKIE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Invocation deadline for methods without their own override
    pub default_timeout_ms: u64,
    /// Deadline for auth, validation and binding together; unbounded if unset
    pub pre_invoke_timeout_ms: Option<u64>,
    pub token_expiration_ms: u64,
    pub body_limit_bytes: usize,
    /// Directory of specification documents to merge
    pub spec_dir: Option<PathBuf>,
    pub jwt: Option<JwtConfig>,
    /// Prefix placed in front of every path template; empty routes templates as declared
    pub mount_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            pre_invoke_timeout_ms: None,
            token_expiration_ms: DEFAULT_TOKEN_EXPIRATION_MS,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            spec_dir: None,
            jwt: None,
            mount_prefix: String::new(),
        }
    }
}

impl DispatcherConfig {
    /// Read a config file, YAML or JSON by extension.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            serde_yaml::from_str(&content)
                .with_context(|| format!("invalid YAML config '{}'", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON config '{}'", path.display()))?
        };
        Ok(config)
    }

    /// Defaults overridden by the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Optional file, then environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `DISPATCH_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_vars<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<u64>(&get, "DISPATCH_DEFAULT_TIMEOUT_MS") {
            self.default_timeout_ms = v;
        }
        if let Some(v) = parse_var::<u64>(&get, "DISPATCH_PRE_INVOKE_TIMEOUT_MS") {
            self.pre_invoke_timeout_ms = Some(v);
        }
        if let Some(v) = parse_var::<u64>(&get, "DISPATCH_TOKEN_EXPIRATION_MS") {
            self.token_expiration_ms = v;
        }
        if let Some(v) = parse_var::<usize>(&get, "DISPATCH_BODY_LIMIT_BYTES") {
            self.body_limit_bytes = v;
        }
        if let Some(secret) = get("DISPATCH_JWT_SECRET").filter(|s| !s.is_empty()) {
            self.jwt.get_or_insert_with(JwtConfig::default).secret = secret;
        }
        if let Some(dir) = get("DISPATCH_SPEC_DIR").filter(|s| !s.is_empty()) {
            self.spec_dir = Some(PathBuf::from(dir));
        }
        if let Some(prefix) = get("DISPATCH_MOUNT_PREFIX") {
            self.mount_prefix = prefix;
        }
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    #[must_use]
    pub fn pre_invoke_timeout(&self) -> Option<Duration> {
        self.pre_invoke_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn token_expiration(&self) -> Duration {
        Duration::from_millis(self.token_expiration_ms)
    }
}

fn parse_var<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = get(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}
