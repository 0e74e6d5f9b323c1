//! Status report assembly, logging and persistence.

mod models;

pub use models::*;

use std::collections::BTreeSet;
use std::path::Path;

use crate::job::JobError;

/// Serialize the report and overwrite `path` with it.
pub async fn write_report(report: &StatusReport, path: &Path) -> Result<(), JobError> {
    let json = serde_json::to_string_pretty(report)?;

    tokio::fs::write(path, json)
        .await
        .map_err(|source| JobError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Regions that have series points but were dropped from the summary because
/// at least one statistic was missing for them.
pub fn dropped_regions(series: &[ResponseTimeSeriesPoint], summary: &[RegionSummary]) -> Vec<String> {
    let summarized: BTreeSet<&str> = summary.iter().map(|s| s.region.as_str()).collect();
    series
        .iter()
        .map(|p| p.region.as_str())
        .filter(|r| !summarized.contains(r))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Emit what a run produced.
pub fn log_report(report: &StatusReport) {
    for (server, state) in &report.services {
        tracing::info!("{}: {}", server, state);
    }

    log_target("edge", &report.edge_response_times, &report.edge_responses_by_region);
    log_target("origin", &report.origin_response_times, &report.origin_responses_by_region);
}

fn log_target(name: &str, series: &[ResponseTimeSeriesPoint], summary: &[RegionSummary]) {
    tracing::info!(
        "{}: {} response time points, {} regions summarized",
        name,
        series.len(),
        summary.len()
    );

    for s in summary {
        tracing::debug!(
            "{} {}: min={:.2}ms max={:.2}ms mean={:.2}ms p95={:.2}ms",
            name,
            s.region,
            s.min,
            s.max,
            s.mean,
            s.p95
        );
    }

    let dropped = dropped_regions(series, summary);
    if !dropped.is_empty() {
        tracing::warn!(
            "{}: regions without complete statistics left out of the summary: {}",
            name,
            dropped.join(", ")
        );
    }
}
