//! Response time summaries: a bucketed mean series and per-region statistics.
//!
//! Samples arrive in seconds and leave in milliseconds on both paths.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::influx::{FluxQueries, MetricSample, QueryApi, QueryError};
use crate::report::{RegionSummary, ResponseTimeSeriesPoint};

const MS_PER_SECOND: f64 = 1000.0;

/// Quantile reported as `p95`.
pub const P95: f64 = 0.95;

/// Per-region values of one statistic.
pub type StatStream = BTreeMap<String, f64>;

/// Query raw response times for `server` over the response window.
///
/// Both the bucketed series and the region summary are reduced from this one
/// result.
pub async fn fetch_response_times(
    api: &dyn QueryApi,
    queries: &FluxQueries,
    server: &str,
) -> Result<Vec<MetricSample>, QueryError> {
    api.query(&queries.response_times(server)).await
}

/// Truncate a datetime to the start of its containing window.
pub fn truncate_to_window(dt: DateTime<Utc>, window_seconds: i64) -> DateTime<Utc> {
    let ts = dt.timestamp();
    let truncated = ts - ts.rem_euclid(window_seconds);
    DateTime::from_timestamp(truncated, 0).unwrap_or(dt)
}

/// Mean response time per (region, bucket), one point per non-empty bucket.
///
/// Buckets are aligned to the Unix epoch and a point is stamped with the end
/// of its bucket, but never later than `until` (the query time). Points are
/// ordered by region, then time. Empty buckets produce nothing.
pub fn bucket_series(
    samples: &[MetricSample],
    bucket_width: Duration,
    until: DateTime<Utc>,
) -> Vec<ResponseTimeSeriesPoint> {
    let width = i64::try_from(bucket_width.as_secs()).unwrap_or(i64::MAX).max(1);
    let mut buckets: BTreeMap<(String, DateTime<Utc>), (f64, usize)> = BTreeMap::new();

    for s in samples.iter().filter(|s| s.value.is_finite()) {
        let start = truncate_to_window(s.time, width);
        let entry = buckets.entry((s.region().to_string(), start)).or_insert((0.0, 0));
        entry.0 += s.value;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|((region, start), (sum, count))| ResponseTimeSeriesPoint {
            time: bucket_end(start, width).map_or(until, |end| end.min(until)),
            region,
            response_time: sum / count as f64 * MS_PER_SECOND,
        })
        .collect()
}

fn bucket_end(start: DateTime<Utc>, width: i64) -> Option<DateTime<Utc>> {
    start.checked_add_signed(ChronoDuration::try_seconds(width)?)
}

/// Group finite sample values by region, converted to milliseconds.
pub fn group_by_region(samples: &[MetricSample]) -> BTreeMap<String, Vec<f64>> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for s in samples.iter().filter(|s| s.value.is_finite()) {
        groups
            .entry(s.region().to_string())
            .or_default()
            .push(s.value * MS_PER_SECOND);
    }
    groups
}

/// Apply `stat` to every region; regions where it yields nothing are absent.
pub fn stat_stream(groups: &BTreeMap<String, Vec<f64>>, stat: impl Fn(&[f64]) -> Option<f64>) -> StatStream {
    groups
        .iter()
        .filter_map(|(region, values)| stat(values).map(|v| (region.clone(), v)))
        .collect()
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Quantile by linear interpolation between the two closest ranks.
///
/// The rank of quantile `q` over `n` sorted values is `q * (n - 1)`, so
/// `[10, 20, 30]` has a p95 of 29.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// Inner-join the four statistic streams on region.
///
/// A region missing from any stream is left out entirely.
pub fn join_region_stats(min: &StatStream, max: &StatStream, mean: &StatStream, p95: &StatStream) -> Vec<RegionSummary> {
    min.iter()
        .filter_map(|(region, &min)| {
            Some(RegionSummary {
                region: region.clone(),
                min,
                max: *max.get(region)?,
                mean: *mean.get(region)?,
                p95: *p95.get(region)?,
            })
        })
        .collect()
}

/// Per-region min, max, mean and p95 over raw samples, sorted by region.
pub fn summarize_regions(samples: &[MetricSample]) -> Vec<RegionSummary> {
    let groups = group_by_region(samples);

    join_region_stats(
        &stat_stream(&groups, min),
        &stat_stream(&groups, max),
        &stat_stream(&groups, mean),
        &stat_stream(&groups, |v| percentile(v, P95)),
    )
}
