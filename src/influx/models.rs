//! Query result types.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A single decoded row of a Flux query result.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub time: DateTime<Utc>,
    /// Field value; booleans decode to 1.0 / 0.0
    pub value: f64,
    /// Every non-reserved column of the row (region, server, _field, ...)
    pub tags: BTreeMap<String, String>,
}

impl MetricSample {
    /// Get a tag value by name.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// The region tag, or the empty string for untagged rows.
    pub fn region(&self) -> &str {
        self.tag("region").unwrap_or_default()
    }
}
