//! InfluxDB query layer.
//!
//! Issues Flux queries over the v2 HTTP API and decodes the CSV results into
//! [`MetricSample`] rows.

mod client;
mod flux_csv;
mod models;
mod query;

pub use client::*;
pub use flux_csv::*;
pub use models::*;
pub use query::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::Retryable;

/// Query error types.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("query API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("query engine error: {0}")]
    Engine(String),
    #[error("malformed query result: {0}")]
    Decode(String),
}

impl Retryable for QueryError {
    fn is_retryable(&self) -> bool {
        // Bad tokens and unreachable endpoints are retried like any other
        // failure; only a result we cannot read is final.
        !matches!(self, QueryError::Decode(_))
    }
}

/// Something that can execute a Flux query.
#[async_trait]
pub trait QueryApi: Send + Sync {
    async fn query(&self, flux: &str) -> Result<Vec<MetricSample>, QueryError>;
}
