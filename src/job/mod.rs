//! Job orchestration: one run queries every target and writes the report.

mod retry;

pub use retry::*;

use std::path::PathBuf;

use chrono::{SubsecRound, Utc};
use thiserror::Error;

use crate::checks::{bucket_series, check_status, fetch_response_times, summarize_regions};
use crate::config::JobConfig;
use crate::influx::{FluxQueries, InfluxClient, QueryApi, QueryError};
use crate::report::{log_report, write_report, StatusReport, TargetReport};

/// Job error types.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("query failed: {0}")]
    Query(#[from] QueryError),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Retryable for JobError {
    fn is_retryable(&self) -> bool {
        match self {
            JobError::Query(e) => e.is_retryable(),
            JobError::Serialize(_) => false,
            JobError::Io { .. } => true,
        }
    }
}

/// A monitored deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    /// Value of the `server` tag
    pub server: String,
}

/// The edge and origin targets, in report order.
pub fn targets(cfg: &JobConfig) -> (Target, Target) {
    (
        Target {
            name: "edge".to_string(),
            server: cfg.edge_target.clone(),
        },
        Target {
            name: "origin".to_string(),
            server: cfg.origin_target.clone(),
        },
    )
}

/// Run the status check and both response time summaries for one target.
pub async fn check_target(
    api: &dyn QueryApi,
    queries: &FluxQueries,
    cfg: &JobConfig,
    target: &Target,
) -> Result<TargetReport, QueryError> {
    tracing::info!("Checking {} ({})", target.name, target.server);

    let status = check_status(api, queries, &target.server).await?;
    tracing::info!(
        "{} is {} (ratio {:?} over {} samples)",
        status.server,
        status.state,
        status.ratio,
        status.samples
    );

    let queried_at = Utc::now();
    let samples = fetch_response_times(api, queries, &target.server).await?;
    let response_times = bucket_series(&samples, cfg.bucket_width, queried_at);
    let by_region = summarize_regions(&samples);

    Ok(TargetReport {
        target: target.clone(),
        status,
        response_times,
        by_region,
    })
}

/// Build the report for all targets, strictly one query at a time.
pub async fn build_report(api: &dyn QueryApi, cfg: &JobConfig) -> Result<StatusReport, QueryError> {
    let queries = FluxQueries::new(&cfg.bucket, cfg.status_window, cfg.response_window);
    let (edge, origin) = targets(cfg);

    let edge = check_target(api, &queries, cfg, &edge).await?;
    let origin = check_target(api, &queries, cfg, &origin).await?;

    Ok(StatusReport::new(edge, origin, Utc::now().trunc_subsecs(0)))
}

/// One complete attempt: open a client, build the report, log it and write it.
pub async fn run_once(cfg: &JobConfig) -> Result<StatusReport, JobError> {
    let client = InfluxClient::new(&cfg.url, &cfg.org, &cfg.token, cfg.request_timeout)?;
    let api = RetryingQuery::new(client, cfg.query_retry.clone());

    let report = build_report(&api, cfg).await?;
    log_report(&report);
    write_report(&report, &cfg.output).await?;

    Ok(report)
}

/// Run the job under the whole-run retry policy.
pub async fn run(cfg: &JobConfig) -> Result<StatusReport, JobError> {
    retry(&cfg.run_retry, || run_once(cfg)).await
}
