// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use crate::rotation::validate_pattern;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:5140";
pub const DEFAULT_STATS_ADDRESS: &str = "127.0.0.1:5141";
pub const DEFAULT_NUM_WORKERS: usize = 4;
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_GRAPHITE_PORT: u16 = 2003;
pub const DEFAULT_GRAPHITE_PREFIX: &str = "logger.metrics";
pub const DEFAULT_LOG_FILE_PATTERN: &str = "%Y-%m-%d.log";
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(10);

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration consumed by the ingestion pipeline.
///
/// Populated once at startup and read-only afterwards. The active log file and
/// its handle are owned by the file writer, not stored here.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the event listener binds to
    pub listen_address: String,
    /// Address an external stats reporter serves the statistics snapshot on
    pub stats_address: String,
    /// Diagnostic verbosity: 0 quiet, 1 per-flush, 2 and above per-event
    pub debug: u8,
    /// Directory log files are created in
    pub log_dir: PathBuf,
    /// Number of log workers competing on the ingest queue
    pub num_workers: usize,
    /// Capacity in bytes of each worker buffer, also the largest accepted event
    pub buffer_capacity: usize,
    /// Pending events the ingest queue holds before producers wait
    pub ingest_queue_capacity: usize,
    /// Pending entries the hand-off queue holds before workers wait
    pub handoff_queue_capacity: usize,
    /// How long a producer waits on a full ingest queue before the event is dropped
    pub submit_timeout: Duration,
    /// Consumed by the upstream HTTP producer
    pub enable_tls: bool,
    pub enable_stats: bool,
    pub cookie_domain: Option<String>,
    pub generate_udid: bool,
    /// Sync every appended entry to stable storage
    pub force_fsync: bool,
    pub enable_graphite: bool,
    pub graphite_host: String,
    pub graphite_port: u16,
    /// Prefix prepended to every exported metric name
    pub graphite_prefix: String,
    /// chrono format string producing the current log file name
    pub log_file_pattern: String,
    /// Period of the process CPU/memory collector
    pub stats_interval: Duration,
    /// Explicit log level, overrides the one derived from `debug`
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            stats_address: DEFAULT_STATS_ADDRESS.to_string(),
            debug: 0,
            log_dir: PathBuf::from("/var/log/logworker"),
            num_workers: DEFAULT_NUM_WORKERS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            ingest_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            handoff_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            enable_tls: false,
            enable_stats: false,
            cookie_domain: None,
            generate_udid: false,
            force_fsync: false,
            enable_graphite: false,
            graphite_host: "127.0.0.1".to_string(),
            graphite_port: DEFAULT_GRAPHITE_PORT,
            graphite_prefix: DEFAULT_GRAPHITE_PREFIX.to_string(),
            log_file_pattern: DEFAULT_LOG_FILE_PATTERN.to_string(),
            stats_interval: DEFAULT_STATS_INTERVAL,
            log_level: None,
        }
    }
}

impl Config {
    /// Create configuration from `LOGWORKER_*` environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            listen_address: env::var("LOGWORKER_LISTEN_ADDRESS")
                .unwrap_or(defaults.listen_address),
            stats_address: env::var("LOGWORKER_STATS_ADDRESS").unwrap_or(defaults.stats_address),
            debug: parse_env("LOGWORKER_DEBUG")?.unwrap_or(defaults.debug),
            log_dir: env::var("LOGWORKER_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            num_workers: parse_env("LOGWORKER_NUM_WORKERS")?.unwrap_or(defaults.num_workers),
            buffer_capacity: parse_env("LOGWORKER_BUFFER_CAPACITY")?
                .unwrap_or(defaults.buffer_capacity),
            ingest_queue_capacity: parse_env("LOGWORKER_INGEST_QUEUE_CAPACITY")?
                .unwrap_or(defaults.ingest_queue_capacity),
            handoff_queue_capacity: parse_env("LOGWORKER_HANDOFF_QUEUE_CAPACITY")?
                .unwrap_or(defaults.handoff_queue_capacity),
            submit_timeout: parse_env("LOGWORKER_SUBMIT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.submit_timeout),
            enable_tls: flag_env("LOGWORKER_ENABLE_TLS").unwrap_or(defaults.enable_tls),
            enable_stats: flag_env("LOGWORKER_ENABLE_STATS").unwrap_or(defaults.enable_stats),
            cookie_domain: env::var("LOGWORKER_COOKIE_DOMAIN").ok(),
            generate_udid: flag_env("LOGWORKER_GENERATE_UDID").unwrap_or(defaults.generate_udid),
            force_fsync: flag_env("LOGWORKER_FORCE_FSYNC").unwrap_or(defaults.force_fsync),
            enable_graphite: flag_env("LOGWORKER_ENABLE_GRAPHITE")
                .unwrap_or(defaults.enable_graphite),
            graphite_host: env::var("LOGWORKER_GRAPHITE_HOST").unwrap_or(defaults.graphite_host),
            graphite_port: parse_env("LOGWORKER_GRAPHITE_PORT")?
                .unwrap_or(defaults.graphite_port),
            graphite_prefix: env::var("LOGWORKER_GRAPHITE_PREFIX")
                .unwrap_or(defaults.graphite_prefix),
            log_file_pattern: env::var("LOGWORKER_LOG_FILE_PATTERN")
                .unwrap_or(defaults.log_file_pattern),
            stats_interval: parse_env("LOGWORKER_STATS_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.stats_interval),
            log_level: env::var("LOGWORKER_LOG_LEVEL")
                .ok()
                .map(|val| val.to_lowercase()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::Invalid(
                "num_workers must be greater than 0".to_string(),
            ));
        }

        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be greater than 0".to_string(),
            ));
        }

        if self.ingest_queue_capacity == 0 || self.handoff_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue capacities must be greater than 0".to_string(),
            ));
        }

        if self.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("log_dir cannot be empty".to_string()));
        }

        if self.log_file_pattern.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "log_file_pattern cannot be empty".to_string(),
            ));
        }
        validate_pattern(&self.log_file_pattern)?;

        if self.enable_graphite && self.graphite_port == 0 {
            return Err(ConfigError::Invalid(
                "graphite_port must be greater than 0".to_string(),
            ));
        }

        if let Some(level) = &self.log_level {
            if !VALID_LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                    level
                )));
            }
        }

        Ok(())
    }

    /// Log level to install: the explicit one if set, otherwise derived from `debug`
    pub fn effective_log_level(&self) -> &str {
        match (&self.log_level, self.debug) {
            (Some(level), _) => level.as_str(),
            (None, 0) => "info",
            (None, 1) => "debug",
            (None, _) => "trace",
        }
    }
}

fn parse_env<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Env {
                name,
                reason: e.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

// Accepts the 0/1 switches of older deployments as well as true/false.
fn flag_env(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|val| matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}
