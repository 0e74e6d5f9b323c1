//! Retry policies for individual queries and for the whole run.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::influx::{MetricSample, QueryApi, QueryError};

/// Which granularity a policy wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryScope {
    PerQuery,
    WholeRun,
}

impl fmt::Display for RetryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryScope::PerQuery => write!(f, "query"),
            RetryScope::WholeRun => write!(f, "run"),
        }
    }
}

/// Delay between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub scope: RetryScope,
}

impl RetryPolicy {
    /// Default policy around a single query: 4 attempts, 5s apart.
    pub fn per_query() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::Fixed(Duration::from_secs(5)),
            scope: RetryScope::PerQuery,
        }
    }

    /// Default policy around the whole run: 4 attempts, 10s apart.
    pub fn whole_run() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::Fixed(Duration::from_secs(10)),
            scope: RetryScope::WholeRun,
        }
    }

    /// Delay before the first retry, before any growth or jitter.
    pub fn base_delay(&self) -> Duration {
        match &self.backoff {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential { base, .. } => *base,
        }
    }

    /// Delay after the given failed attempt (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(d) => *d,
            Backoff::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponential = base.as_secs_f64() * factor.powi(attempt as i32);
                let capped = exponential.min(max.as_secs_f64());
                let delay = if *jitter {
                    capped * (0.5 + rand::random::<f64>())
                } else {
                    capped
                };
                Duration::from_secs_f64(delay)
            }
        }
    }
}

/// Errors that know whether another attempt could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts. The last error is returned.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempt += 1;

                if !err.is_retryable() {
                    tracing::warn!("{} failed with non-retryable error: {}", policy.scope, err);
                    return Err(err);
                }

                if attempt >= policy.max_attempts {
                    tracing::warn!(
                        "{} failed after {} attempts: {}",
                        policy.scope,
                        attempt,
                        err
                    );
                    return Err(err);
                }

                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    "{} attempt {}/{} failed, retrying in {:?}: {}",
                    policy.scope,
                    attempt,
                    policy.max_attempts,
                    delay,
                    err
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Applies a per-query retry policy to every query of the wrapped backend.
pub struct RetryingQuery<Q> {
    inner: Q,
    policy: RetryPolicy,
}

impl<Q: QueryApi> RetryingQuery<Q> {
    pub fn new(inner: Q, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &Q {
        &self.inner
    }
}

#[async_trait]
impl<Q: QueryApi> QueryApi for RetryingQuery<Q> {
    async fn query(&self, flux: &str) -> Result<Vec<MetricSample>, QueryError> {
        retry(&self.policy, || self.inner.query(flux)).await
    }
}
