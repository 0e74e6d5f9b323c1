//! Flux query templates for the `http_response` measurement.

use std::time::Duration;

pub const MEASUREMENT: &str = "http_response";
pub const STATUS_FIELD: &str = "response_status_code_match";
pub const RESPONSE_TIME_FIELD: &str = "response_time";

/// Builds the fixed set of queries the job runs.
#[derive(Debug, Clone)]
pub struct FluxQueries {
    pub bucket: String,
    pub status_window: Duration,
    pub response_window: Duration,
}

impl FluxQueries {
    pub fn new(bucket: &str, status_window: Duration, response_window: Duration) -> Self {
        Self {
            bucket: bucket.to_string(),
            status_window,
            response_window,
        }
    }

    /// Latest status-code-match value per region for `server` within the
    /// status window.
    ///
    /// Rows are regrouped by region first, so extra tags such as
    /// `status_code` or `method` do not split a region into several series.
    pub fn status(&self, server: &str) -> String {
        format!(
            "{}\n  |> group(columns: [\"region\"])\n  |> sort(columns: [\"_time\"])\n  |> last()",
            self.select(STATUS_FIELD, server, self.status_window)
        )
    }

    /// Raw response time samples for `server` within the response window,
    /// reduced to time, value and region.
    pub fn response_times(&self, server: &str) -> String {
        format!(
            "{}\n  |> keep(columns: [\"_time\", \"_value\", \"region\"])",
            self.select(RESPONSE_TIME_FIELD, server, self.response_window)
        )
    }

    fn select(&self, field: &str, server: &str, window: Duration) -> String {
        format!(
            "from(bucket: {bucket})\n  \
             |> range(start: -{window})\n  \
             |> filter(fn: (r) => r._measurement == {measurement})\n  \
             |> filter(fn: (r) => r._field == {field})\n  \
             |> filter(fn: (r) => r.server == {server})",
            bucket = flux_string(&self.bucket),
            window = flux_duration(window),
            measurement = flux_string(MEASUREMENT),
            field = flux_string(field),
            server = flux_string(server),
        )
    }
}

/// Render a duration as a Flux duration literal in whole seconds.
pub fn flux_duration(d: Duration) -> String {
    format!("{}s", d.as_secs())
}

/// Quote a value as a Flux string literal.
pub fn flux_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
