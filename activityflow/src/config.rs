//! Runtime configuration.
//!
//! [`Config`] deserializes from JSON with every field defaulted, then takes
//! `APP_*` environment overrides:
//!
//! - `APP_LOG_LEVEL` - persisted and diagnostic log level (default: `info`)
//! - `APP_LOG_FORMAT` - `json` or `text` (default: `json`)
//! - `APP_BACKEND_SQLITE_FILE` - log database (default: `data/orchestration.db`)
//! - `APP_EVENTS_SQLITE_FILE` - task event database (default: `data/events.db`)
//! - `APP_RECEIVER_ADDR` - OTLP listen address; setting it enables the receiver
//! - `APP_METRICS_ENABLED` - `true`/`1` or `false`/`0` (default: `true`)

use crate::errors::ConfigError;
use crate::interceptors::{BreakerConfig, JitterStrategy, RetryPolicy};
use crate::observability::{LogFormat, LogLevel, LoggerConfig};
use crate::storage::RepositoryConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default Prometheus scrape address.
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";
/// Default OTLP gRPC listen address.
pub const DEFAULT_RECEIVER_ADDR: &str = "127.0.0.1:4317";

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_failure_threshold() -> f64 {
    0.5
}

const fn default_breaker_window_ms() -> u64 {
    10_000
}

const fn default_min_requests() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

fn default_events_repository() -> RepositoryConfig {
    RepositoryConfig::new("data/events.db")
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_receiver_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4317))
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Activity execution settings.
    #[serde(default)]
    pub activities: ActivityConfig,
    /// Repository settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging, metrics and receiver settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Retry, timeout and breaker settings shared by every activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Attempts per invocation, first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound on any retry delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter applied to each delay.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Bound on one invocation, retries included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_multiplier(),
            jitter: JitterStrategy::default(),
            timeout_ms: default_timeout_ms(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl ActivityConfig {
    /// Returns the retry policy described by these settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
            .with_multiplier(self.backoff_multiplier)
            .with_jitter(self.jitter)
    }

    /// Returns the invocation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Whether activities are guarded by breakers.
    #[serde(default)]
    pub enabled: bool,
    /// Failure ratio that opens a breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Counting interval and open-state cool-down.
    #[serde(default = "default_breaker_window_ms")]
    pub window_ms: u64,
    /// Requests needed before the ratio is considered.
    #[serde(default = "default_min_requests")]
    pub min_requests: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: default_failure_threshold(),
            window_ms: default_breaker_window_ms(),
            min_requests: default_min_requests(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Returns the breaker tuning described by these settings.
    #[must_use]
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            min_requests: self.min_requests,
            ..BreakerConfig::new(self.failure_threshold, Duration::from_millis(self.window_ms))
        }
    }
}

/// Repository settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// The `logs` table database.
    #[serde(default)]
    pub logs: RepositoryConfig,
    /// The `task_events` table database.
    #[serde(default = "default_events_repository")]
    pub events: RepositoryConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            logs: RepositoryConfig::default(),
            events: default_events_repository(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logger settings.
    #[serde(default)]
    pub log: LoggerConfig,
    /// Metrics exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// OTLP receiver settings.
    #[serde(default)]
    pub receiver: ReceiverConfig,
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether the exporter is installed.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Scrape listener address.
    #[serde(default = "default_metrics_addr")]
    pub addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: default_metrics_addr(),
        }
    }
}

/// OTLP receiver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Whether the receiver is started.
    #[serde(default)]
    pub enabled: bool,
    /// gRPC listen address.
    #[serde(default = "default_receiver_addr")]
    pub addr: SocketAddr,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_receiver_addr(),
        }
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
        }),
    }
}

fn parse_format(value: &str) -> Option<LogFormat> {
    match value.to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "text" => Some(LogFormat::Text),
        _ => None,
    }
}

impl Config {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Sets the log database path.
    #[must_use]
    pub fn with_logs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.logs.path = path.into();
        self
    }

    /// Sets the task event database path.
    #[must_use]
    pub fn with_events_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.events.path = path.into();
        self
    }

    /// Sets the log level.
    #[must_use]
    pub const fn with_log_level(mut self, level: LogLevel) -> Self {
        self.observability.log.level = level;
        self
    }

    /// Enables the receiver on `addr`.
    #[must_use]
    pub const fn with_receiver(mut self, addr: SocketAddr) -> Self {
        self.observability.receiver = ReceiverConfig {
            enabled: true,
            addr,
        };
        self
    }

    /// Enables or disables the metrics exporter.
    #[must_use]
    pub const fn with_metrics(mut self, enabled: bool) -> Self {
        self.observability.metrics.enabled = enabled;
        self
    }

    /// Enables circuit breakers.
    #[must_use]
    pub const fn with_circuit_breaker(mut self, enabled: bool) -> Self {
        self.activities.circuit_breaker.enabled = enabled;
        self
    }

    /// Applies `APP_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Applies `APP_*` overrides read through `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let get = |var| lookup(var).filter(|v| !v.is_empty());

        if let Some(value) = get("APP_LOG_LEVEL") {
            self.observability.log.level = value.parse().map_err(|_| ConfigError::Env {
                var: "APP_LOG_LEVEL",
                value: value.clone(),
            })?;
        }
        if let Some(value) = get("APP_LOG_FORMAT") {
            self.observability.log.format =
                parse_format(&value).ok_or(ConfigError::Env {
                    var: "APP_LOG_FORMAT",
                    value,
                })?;
        }
        if let Some(value) = get("APP_BACKEND_SQLITE_FILE") {
            self.storage.logs.path = PathBuf::from(value);
        }
        if let Some(value) = get("APP_EVENTS_SQLITE_FILE") {
            self.storage.events.path = PathBuf::from(value);
        }
        if let Some(value) = get("APP_RECEIVER_ADDR") {
            let addr = value.parse().map_err(|_| ConfigError::Env {
                var: "APP_RECEIVER_ADDR",
                value: value.clone(),
            })?;
            self.observability.receiver = ReceiverConfig {
                enabled: true,
                addr,
            };
        }
        if let Some(value) = get("APP_METRICS_ENABLED") {
            self.observability.metrics.enabled = parse_bool("APP_METRICS_ENABLED", &value)?;
        }
        Ok(())
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.activities.retry_policy().validate()?;
        if self.activities.timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "activities.timeout_ms",
                "must be greater than zero",
            ));
        }
        let threshold = self.activities.circuit_breaker.failure_threshold;
        if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
            return Err(ConfigError::invalid(
                "activities.circuit_breaker.failure_threshold",
                format!("must be in (0, 1], got {threshold}"),
            ));
        }
        if self.storage.logs.batch_size == 0 {
            return Err(ConfigError::invalid("storage.logs.batch_size", "must be at least 1"));
        }
        if self.storage.events.batch_size == 0 {
            return Err(ConfigError::invalid("storage.events.batch_size", "must be at least 1"));
        }
        Ok(())
    }

    /// Returns the logger configuration.
    #[must_use]
    pub const fn logger_config(&self) -> LoggerConfig {
        self.observability.log
    }

    /// Returns the breaker tuning when breakers are enabled.
    #[must_use]
    pub fn breaker_config(&self) -> Option<BreakerConfig> {
        let settings = &self.activities.circuit_breaker;
        settings.enabled.then(|| settings.breaker_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, (*v).to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.activities.max_attempts, 3);
        assert_eq!(config.activities.initial_backoff_ms, 100);
        assert_eq!(config.activities.max_backoff_ms, 30_000);
        assert_eq!(config.activities.timeout(), Duration::from_secs(30));
        assert_eq!(config.storage.logs.batch_size, 100);
        assert_eq!(config.storage.logs.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.storage.logs.path, PathBuf::from("data/orchestration.db"));
        assert_eq!(config.storage.events.path, PathBuf::from("data/events.db"));
        assert_eq!(config.observability.log.level, LogLevel::Info);
        assert_eq!(config.observability.log.format, LogFormat::Json);
        assert_eq!(config.observability.metrics.addr.to_string(), DEFAULT_METRICS_ADDR);
        assert_eq!(config.observability.receiver.addr.to_string(), DEFAULT_RECEIVER_ADDR);
        assert!(!config.observability.receiver.enabled);
        assert!(config.breaker_config().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json_str(
            r#"{
                "activities": {"max_attempts": 5, "jitter": "full"},
                "storage": {"events": {"path": "/tmp/events.db", "batch_size": 10}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.activities.max_attempts, 5);
        assert_eq!(config.activities.jitter, JitterStrategy::Full);
        assert_eq!(config.activities.initial_backoff_ms, 100);
        assert_eq!(config.storage.events.batch_size, 10);
        assert_eq!(config.storage.events.flush_interval_ms, 5_000);
        assert_eq!(config.storage.logs, RepositoryConfig::default());
        assert_eq!(config.activities.retry_policy().max_attempts(), 5);
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(Config::from_json_str("{\"activities\": 3}").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("APP_LOG_LEVEL", "debug"),
                ("APP_LOG_FORMAT", "text"),
                ("APP_BACKEND_SQLITE_FILE", "/var/lib/app/logs.db"),
                ("APP_EVENTS_SQLITE_FILE", "/var/lib/app/events.db"),
                ("APP_RECEIVER_ADDR", "0.0.0.0:14317"),
                ("APP_METRICS_ENABLED", "false"),
            ]))
            .unwrap();

        assert_eq!(config.observability.log.level, LogLevel::Debug);
        assert_eq!(config.observability.log.format, LogFormat::Text);
        assert_eq!(config.storage.logs.path, PathBuf::from("/var/lib/app/logs.db"));
        assert_eq!(config.storage.events.path, PathBuf::from("/var/lib/app/events.db"));
        assert!(config.observability.receiver.enabled);
        assert_eq!(config.observability.receiver.addr.port(), 14317);
        assert!(!config.observability.metrics.enabled);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[("APP_LOG_LEVEL", ""), ("APP_BACKEND_SQLITE_FILE", "")]))
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup(&[("APP_METRICS_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "APP_METRICS_ENABLED", .. }));

        let err = config
            .apply_overrides(lookup(&[("APP_RECEIVER_ADDR", "not-an-addr")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "APP_RECEIVER_ADDR", .. }));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.activities.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.activities.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.activities.circuit_breaker.failure_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.events.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_breaker_conversion() {
        let config = Config::default().with_circuit_breaker(true);
        let breaker = config.breaker_config().unwrap();
        assert!((breaker.failure_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(breaker.interval, Duration::from_secs(10));
        assert_eq!(breaker.cool_down, Duration::from_secs(10));
        assert_eq!(breaker.min_requests, 3);
    }
}
