//! Configuration module for the status page job.
//!
//! Everything the job needs is collected into [`JobConfig`]. Values come from
//! command-line flags, each of which falls back to a `STATUSPAGE_*`
//! environment variable and then to the reference defaults.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use regex::Regex;
use thiserror::Error;

use crate::job::{Backoff, RetryPolicy, RetryScope};

pub const DEFAULT_URL: &str = "https://eu-central-1-1.aws.cloud2.influxdata.com";
pub const DEFAULT_BUCKET: &str = "Systemstats";
pub const DEFAULT_EDGE_TARGET: &str = "https://www.example.com";
pub const DEFAULT_ORIGIN_TARGET: &str = "https://origin.example.com";
pub const DEFAULT_OUTPUT: &str = "output.json";

/// Longest accepted lookback window.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);
/// Longest accepted retry delay or request timeout.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration error types.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid duration '{0}': expected <number><s|m|h|d>, e.g. 30m")]
    InvalidDuration(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{0} must not exceed {1}")]
    TooLarge(&'static str, &'static str),
}

/// Backoff strategy selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    /// Same delay before every attempt
    Fixed,
    /// Delay doubles per attempt, capped at ten times the base, with jitter
    Exponential,
}

impl BackoffKind {
    fn with_delay(self, delay: Duration) -> Backoff {
        match self {
            BackoffKind::Fixed => Backoff::Fixed(delay),
            BackoffKind::Exponential => Backoff::Exponential {
                base: delay,
                factor: 2.0,
                max: delay.saturating_mul(10),
                jitter: true,
            },
        }
    }
}

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "statuspage", version, about = "Builds the status page report from InfluxDB HTTP checks")]
pub struct Cli {
    /// InfluxDB API token
    #[arg(env = "STATUSPAGE_TOKEN", hide_env_values = true)]
    pub token: String,

    /// InfluxDB base URL
    #[arg(long, env = "STATUSPAGE_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// InfluxDB organization
    #[arg(long, env = "STATUSPAGE_ORG", default_value = "")]
    pub org: String,

    /// Bucket holding the http_response measurement
    #[arg(long, env = "STATUSPAGE_BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Server URL of the edge deployment
    #[arg(long, env = "STATUSPAGE_EDGE_TARGET", default_value = DEFAULT_EDGE_TARGET)]
    pub edge_target: String,

    /// Server URL of the origin deployment
    #[arg(long, env = "STATUSPAGE_ORIGIN_TARGET", default_value = DEFAULT_ORIGIN_TARGET)]
    pub origin_target: String,

    /// Lookback for the status check
    #[arg(long, env = "STATUSPAGE_STATUS_WINDOW", default_value = "30m")]
    pub status_window: String,

    /// Lookback for response time series and summaries
    #[arg(long, env = "STATUSPAGE_RESPONSE_WINDOW", default_value = "6h")]
    pub response_window: String,

    /// Width of one response time bucket
    #[arg(long, env = "STATUSPAGE_BUCKET_WIDTH", default_value = "15m")]
    pub bucket_width: String,

    /// Report destination (overwritten on every run)
    #[arg(long, short, env = "STATUSPAGE_OUTPUT", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// HTTP timeout for a single query
    #[arg(long, env = "STATUSPAGE_REQUEST_TIMEOUT", default_value = "30s")]
    pub request_timeout: String,

    /// Attempts per query before the run fails
    #[arg(long, env = "STATUSPAGE_QUERY_ATTEMPTS", default_value_t = 4)]
    pub query_attempts: u32,

    /// Delay between query attempts
    #[arg(long, env = "STATUSPAGE_QUERY_DELAY", default_value = "5s")]
    pub query_delay: String,

    /// Attempts of the whole run
    #[arg(long, env = "STATUSPAGE_RUN_ATTEMPTS", default_value_t = 4)]
    pub run_attempts: u32,

    /// Delay between run attempts
    #[arg(long, env = "STATUSPAGE_RUN_DELAY", default_value = "10s")]
    pub run_delay: String,

    /// How retry delays grow between attempts
    #[arg(long, env = "STATUSPAGE_BACKOFF", value_enum, default_value_t = BackoffKind::Fixed)]
    pub backoff: BackoffKind,
}

/// Job configuration.
#[derive(Clone)]
pub struct JobConfig {
    /// InfluxDB base URL
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub edge_target: String,
    pub origin_target: String,
    /// Lookback for the status check (default: 30m)
    pub status_window: Duration,
    /// Lookback for response times (default: 6h)
    pub response_window: Duration,
    /// Series bucket width (default: 15m)
    pub bucket_width: Duration,
    pub output: PathBuf,
    pub request_timeout: Duration,
    pub query_retry: RetryPolicy,
    pub run_retry: RetryPolicy,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: String::new(),
            org: String::new(),
            bucket: DEFAULT_BUCKET.to_string(),
            edge_target: DEFAULT_EDGE_TARGET.to_string(),
            origin_target: DEFAULT_ORIGIN_TARGET.to_string(),
            status_window: Duration::from_secs(30 * 60),
            response_window: Duration::from_secs(6 * 60 * 60),
            bucket_width: Duration::from_secs(15 * 60),
            output: PathBuf::from(DEFAULT_OUTPUT),
            request_timeout: Duration::from_secs(30),
            query_retry: RetryPolicy::per_query(),
            run_retry: RetryPolicy::whole_run(),
        }
    }
}

// The token never ends up in logs.
impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("edge_target", &self.edge_target)
            .field("origin_target", &self.origin_target)
            .field("status_window", &self.status_window)
            .field("response_window", &self.response_window)
            .field("bucket_width", &self.bucket_width)
            .field("output", &self.output)
            .field("request_timeout", &self.request_timeout)
            .field("query_retry", &self.query_retry)
            .field("run_retry", &self.run_retry)
            .finish()
    }
}

impl JobConfig {
    /// Build and validate a configuration from parsed command-line arguments.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let cfg = Self {
            url: cli.url,
            token: cli.token,
            org: cli.org,
            bucket: cli.bucket,
            edge_target: cli.edge_target,
            origin_target: cli.origin_target,
            status_window: parse_duration(&cli.status_window)?,
            response_window: parse_duration(&cli.response_window)?,
            bucket_width: parse_duration(&cli.bucket_width)?,
            output: cli.output,
            request_timeout: parse_duration(&cli.request_timeout)?,
            query_retry: RetryPolicy {
                max_attempts: cli.query_attempts,
                backoff: cli.backoff.with_delay(parse_duration(&cli.query_delay)?),
                scope: RetryScope::PerQuery,
            },
            run_retry: RetryPolicy {
                max_attempts: cli.run_attempts,
                backoff: cli.backoff.with_delay(parse_duration(&cli.run_delay)?),
                scope: RetryScope::WholeRun,
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the invariants the job relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status_window.is_zero() {
            return Err(ConfigError::Zero("status window"));
        }
        if self.response_window.is_zero() {
            return Err(ConfigError::Zero("response window"));
        }
        if self.bucket_width.as_secs() == 0 {
            return Err(ConfigError::Zero("bucket width"));
        }
        if self.query_retry.max_attempts == 0 {
            return Err(ConfigError::Zero("query attempts"));
        }
        if self.run_retry.max_attempts == 0 {
            return Err(ConfigError::Zero("run attempts"));
        }

        if self.status_window > MAX_WINDOW {
            return Err(ConfigError::TooLarge("status window", "365d"));
        }
        if self.response_window > MAX_WINDOW {
            return Err(ConfigError::TooLarge("response window", "365d"));
        }
        if self.bucket_width > self.response_window {
            return Err(ConfigError::TooLarge("bucket width", "the response window"));
        }
        if self.request_timeout > MAX_WAIT {
            return Err(ConfigError::TooLarge("request timeout", "1d"));
        }
        if self.query_retry.base_delay() > MAX_WAIT {
            return Err(ConfigError::TooLarge("query delay", "1d"));
        }
        if self.run_retry.base_delay() > MAX_WAIT {
            return Err(ConfigError::TooLarge("run delay", "1d"));
        }
        Ok(())
    }
}

/// Parse a duration written as `<number><unit>` with unit one of `s`, `m`, `h`, `d`.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\s*(?P<n>[0-9]+)\s*(?P<unit>[smhd])\s*$").unwrap());

    let caps = re
        .captures(s)
        .ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))?;
    let n: u64 = caps["n"]
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(s.to_string()))?;
    let multiplier = match &caps["unit"] {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => 24 * 60 * 60,
    };

    n.checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))
}
