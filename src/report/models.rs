//! Report types written to the status page JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checks::StatusCheck;
use crate::job::Target;

/// Classified health of a monitored service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceState {
    Up,
    #[serde(rename = "Mostly Up")]
    MostlyUp,
    Degraded,
    Down,
    /// No status samples in the window
    #[default]
    Unknown,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Up => "Up",
            ServiceState::MostlyUp => "Mostly Up",
            ServiceState::Degraded => "Degraded",
            ServiceState::Down => "Down",
            ServiceState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Mean response time of one region within one time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeSeriesPoint {
    /// End of the bucket
    #[serde(with = "timestamp")]
    pub time: DateTime<Utc>,
    pub region: String,
    /// Milliseconds
    pub response_time: f64,
}

/// Response time statistics of one region over the whole window, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub region: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p95: f64,
}

/// Everything computed for one target during a run.
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: Target,
    pub status: StatusCheck,
    pub response_times: Vec<ResponseTimeSeriesPoint>,
    pub by_region: Vec<RegionSummary>,
}

/// The document consumed by the status page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(with = "timestamp")]
    pub generated_at: DateTime<Utc>,
    /// `[server, status]` pairs for the services table
    pub services: Vec<(String, ServiceState)>,
    pub edge_status: ServiceState,
    pub origin_status: ServiceState,
    pub edge_response_times: Vec<ResponseTimeSeriesPoint>,
    pub origin_response_times: Vec<ResponseTimeSeriesPoint>,
    pub edge_responses_by_region: Vec<RegionSummary>,
    pub origin_responses_by_region: Vec<RegionSummary>,
}

impl StatusReport {
    pub fn new(edge: TargetReport, origin: TargetReport, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            services: vec![
                (edge.target.server, edge.status.state),
                (origin.target.server, origin.status.state),
            ],
            edge_status: edge.status.state,
            origin_status: origin.status.state,
            edge_response_times: edge.response_times,
            origin_response_times: origin.response_times,
            edge_responses_by_region: edge.by_region,
            origin_responses_by_region: origin.by_region,
        }
    }
}

/// Serde helpers for `YYYY-MM-DD HH:MM:SS` UTC timestamps.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&dt.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT)
            .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
            .map_err(de::Error::custom)
    }
}
