//! Environment-driven configuration for the worker process.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Retry discipline for transient failures: capped exponential backoff with
/// jitter, bounded attempt count.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(60),
            cap: Duration::from_secs(600),
        }
    }
}

/// Location of the external KoSIT validator and its scenario configuration.
#[derive(Debug, Clone)]
pub struct KositConfig {
    pub jar_path: PathBuf,
    pub scenarios_path: PathBuf,
    pub repository_path: Option<PathBuf>,
}

/// Worker configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parallel workers per process.
    pub worker_concurrency: usize,
    /// Hard per-transaction deadline.
    pub task_timeout: Duration,
    pub retry: RetryPolicy,
    /// Bounded wait for one KoSIT subprocess run.
    pub kosit_timeout: Duration,
    /// Absolute tolerance for monetary comparisons.
    pub monetary_tolerance: Decimal,
    /// Metadata store DSN (read-write).
    pub metadata_dsn: String,
    /// ERP store DSN (read-only credentials).
    pub erp_dsn: String,
    /// Root directory of the filesystem blob store.
    pub blob_root: PathBuf,
    /// KoSIT assets; the semantic stage is skipped when absent.
    pub kosit: Option<KositConfig>,
    /// Dispatcher poll interval when no work is due.
    pub poll_interval: Duration,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let kosit = match optional("KOSIT_VALIDATOR_JAR_PATH") {
            Some(jar) => Some(KositConfig {
                jar_path: PathBuf::from(jar),
                scenarios_path: PathBuf::from(required("KOSIT_SCENARIO_CONFIG_PATH")?),
                repository_path: optional("KOSIT_REPOSITORY_PATH").map(PathBuf::from),
            }),
            None => None,
        };

        Ok(Self {
            worker_concurrency: parsed("WORKER_CONCURRENCY", 4)?,
            task_timeout: Duration::from_secs(parsed("TASK_TIMEOUT_SECONDS", 600)?),
            retry: RetryPolicy {
                max_attempts: parsed("RETRY_MAX_ATTEMPTS", 5)?,
                base: Duration::from_secs(parsed("RETRY_BASE_SECONDS", 60)?),
                cap: Duration::from_secs(parsed("RETRY_CAP_SECONDS", 600)?),
            },
            kosit_timeout: Duration::from_secs(parsed("KOSIT_TIMEOUT_SECONDS", 120)?),
            monetary_tolerance: parsed_decimal("MONETARY_TOLERANCE", "0.02")?,
            metadata_dsn: required("DATABASE_URL")?,
            erp_dsn: required("ERP_DATABASE_URL")?,
            blob_root: PathBuf::from(
                optional("BLOB_ROOT").unwrap_or_else(|| "/var/lib/belegwerk/blobs".into()),
            ),
            kosit,
            poll_interval: Duration::from_secs(parsed("WORKER_POLL_INTERVAL_SECONDS", 5)?),
        })
    }
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(var) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        None => Ok(default),
    }
}

fn parsed_decimal(var: &'static str, default: &str) -> Result<Decimal, ConfigError> {
    let raw = optional(var).unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}
