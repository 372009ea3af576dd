//! Configuration for the mint watermark cache.
//!
//! Every field has a default, so an empty TOML document or an empty
//! environment yields a working configuration. Sources layer in order:
//! defaults, then an optional TOML file, then `MINTWATCH_*` environment
//! variables.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_QUERY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_UPDATE_CAPACITY: usize = 64;
const DEFAULT_LOG_FILTER: &str = "mintwatch=info";

pub const ENV_QUERY_TIMEOUT_MS: &str = "MINTWATCH_QUERY_TIMEOUT_MS";
pub const ENV_PUBLISH_POLICY: &str = "MINTWATCH_PUBLISH_POLICY";
pub const ENV_UPDATE_CAPACITY: &str = "MINTWATCH_UPDATE_CAPACITY";
pub const ENV_LOG_FILTER: &str = "MINTWATCH_LOG_FILTER";
pub const ENV_LOG_FORMAT: &str = "MINTWATCH_LOG_FORMAT";

// ============================================================================
// PUBLISH POLICY
// ============================================================================

/// How the watermark store treats a publish lower than its current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Keep the highest value seen; lower publishes are dropped.
    #[default]
    KeepMax,
    /// Record every publish as-is, even when it goes backwards.
    LastValueWins,
}

impl fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishPolicy::KeepMax => write!(f, "keep_max"),
            PublishPolicy::LastValueWins => write!(f, "last_value_wins"),
        }
    }
}

impl FromStr for PublishPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keep_max" | "max" => Ok(PublishPolicy::KeepMax),
            "last_value_wins" | "last" => Ok(PublishPolicy::LastValueWins),
            other => Err(ConfigError::InvalidValue {
                field: "publish_policy".to_string(),
                value: other.to_string(),
                reason: "expected keep_max or last_value_wins".to_string(),
            }),
        }
    }
}

// ============================================================================
// LOGGING
// ============================================================================

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(ConfigError::InvalidValue {
                field: "log.format".to_string(),
                value: other.to_string(),
                reason: "expected json or pretty".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::default(),
        }
    }
}

// ============================================================================
// WATCH CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Upper bound on a single counter query, in milliseconds. Zero disables it.
    pub query_timeout_ms: u64,
    pub publish_policy: PublishPolicy,
    /// Per-subscriber buffer of the watermark update channel.
    pub update_capacity: usize,
    pub log: LogConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            publish_policy: PublishPolicy::default(),
            update_capacity: DEFAULT_UPDATE_CAPACITY,
            log: LogConfig::default(),
        }
    }
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document. Missing fields keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: WatchConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Defaults overlaid with `MINTWATCH_*` environment variables.
    ///
    /// Environment variables:
    /// - `MINTWATCH_QUERY_TIMEOUT_MS`: counter query timeout (default: 10000, 0 = none)
    /// - `MINTWATCH_PUBLISH_POLICY`: `keep_max` or `last_value_wins` (default: keep_max)
    /// - `MINTWATCH_UPDATE_CAPACITY`: update channel buffer (default: 64)
    /// - `MINTWATCH_LOG_FILTER`: tracing filter (default: mintwatch=info)
    /// - `MINTWATCH_LOG_FORMAT`: `json` or `pretty` (default: json)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_QUERY_TIMEOUT_MS) {
            self.query_timeout_ms = parse_number(ENV_QUERY_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PUBLISH_POLICY) {
            self.publish_policy = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_UPDATE_CAPACITY) {
            self.update_capacity = parse_number(ENV_UPDATE_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LOG_FILTER) {
            self.log.filter = raw;
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            self.log.format = raw.parse()?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "update_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// The counter query timeout, or `None` when disabled.
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }

    /// Set the counter query timeout. `None` or a zero duration disables it;
    /// any other duration is rounded up to whole milliseconds.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout_ms = match timeout {
            Some(d) if !d.is_zero() => {
                let millis = d.as_nanos().div_ceil(1_000_000);
                u64::try_from(millis).unwrap_or(u64::MAX)
            }
            _ => 0,
        };
        self
    }

    pub fn with_publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish_policy = policy;
        self
    }

    pub fn with_update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity;
        self
    }
}

fn parse_number<T: FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}
