//! Decoder for the Flux CSV result format.
//!
//! A response holds one or more tables. Each table starts with a header row
//! (`,result,table,_start,_stop,_time,_value,...`) followed by data rows.
//! Annotation rows (`#datatype`, `#group`, `#default`) are skipped. A table
//! whose header carries an `error` column reports a failure inside the query
//! engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};

use super::{MetricSample, QueryError};

/// Columns that describe the row rather than tag it.
const RESERVED_COLUMNS: &[&str] = &["", "result", "table", "_start", "_stop", "_time", "_value"];

enum Header {
    Data(Vec<String>),
    Error(Vec<String>),
}

/// Decode a Flux CSV response body into samples.
///
/// Rows with an empty `_value` (null) are skipped.
pub fn decode_flux_csv(body: &str) -> Result<Vec<MetricSample>, QueryError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(body.as_bytes());

    let mut header: Option<Header> = None;
    let mut samples = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| QueryError::Decode(e.to_string()))?;

        if let Some(h) = parse_header(&record) {
            header = Some(h);
            continue;
        }

        match &header {
            None => {
                return Err(QueryError::Decode("data row before table header".to_string()));
            }
            Some(Header::Error(columns)) => {
                let message = column(columns, &record, "error")
                    .filter(|m| !m.is_empty())
                    .unwrap_or("unknown error");
                return Err(QueryError::Engine(message.to_string()));
            }
            Some(Header::Data(columns)) => {
                if let Some(sample) = decode_row(columns, &record)? {
                    samples.push(sample);
                }
            }
        }
    }

    Ok(samples)
}

fn parse_header(record: &StringRecord) -> Option<Header> {
    let has = |name: &str| record.iter().any(|f| f == name);
    let columns = || -> Vec<String> { record.iter().map(str::to_string).collect() };

    if has("result") && has("table") {
        Some(Header::Data(columns()))
    } else if has("error") && has("reference") {
        Some(Header::Error(columns()))
    } else {
        None
    }
}

fn column<'a>(columns: &[String], record: &'a StringRecord, name: &str) -> Option<&'a str> {
    columns
        .iter()
        .position(|c| c == name)
        .and_then(|i| record.get(i))
}

fn decode_row(columns: &[String], record: &StringRecord) -> Result<Option<MetricSample>, QueryError> {
    let raw_value = column(columns, record, "_value")
        .ok_or_else(|| QueryError::Decode("table has no _value column".to_string()))?;
    if raw_value.is_empty() {
        return Ok(None);
    }
    let value = parse_value(raw_value)?;

    let raw_time = column(columns, record, "_time")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| QueryError::Decode("row has no _time".to_string()))?;
    let time = parse_time(raw_time)?;

    let tags: BTreeMap<String, String> = columns
        .iter()
        .zip(record.iter())
        .filter(|(name, _)| !RESERVED_COLUMNS.contains(&name.as_str()))
        .map(|(name, v)| (name.clone(), v.to_string()))
        .collect();

    Ok(Some(MetricSample { time, value, tags }))
}

fn parse_value(s: &str) -> Result<f64, QueryError> {
    match s {
        "true" => Ok(1.0),
        "false" => Ok(0.0),
        _ => s
            .parse()
            .map_err(|_| QueryError::Decode(format!("invalid value '{}'", s))),
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, QueryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueryError::Decode(format!("invalid time '{}': {}", s, e)))
}
