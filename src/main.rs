//! Status page report job.
//!
//! Queries InfluxDB for HTTP check results of the edge and origin
//! deployments, classifies their status, summarizes response times and
//! writes the result as JSON for the status page.

mod checks;
mod config;
mod influx;
mod job;
mod report;

use clap::Parser;
use config::{Cli, JobConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statuspage=info".parse()?))
        .init();

    // Load configuration
    let cfg = JobConfig::from_cli(Cli::parse())?;
    tracing::info!("Querying {} (bucket {})", cfg.url, cfg.bucket);
    tracing::debug!("Configuration: {:?}", cfg);

    let report = job::run(&cfg).await?;
    tracing::info!(
        "Wrote report to {} (edge: {}, origin: {})",
        cfg.output.display(),
        report.edge_status,
        report.origin_status
    );

    Ok(())
}
