//! Status classifier.

use std::collections::BTreeMap;

use crate::influx::{FluxQueries, MetricSample, QueryApi, QueryError};
use crate::report::ServiceState;

/// Outcome of a status check for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCheck {
    pub server: String,
    /// Mean status-code-match ratio, `None` when no samples were returned
    pub ratio: Option<f64>,
    pub samples: usize,
    pub state: ServiceState,
}

/// Map a status-code-match ratio to a service state.
///
/// Thresholds are checked in order: exactly 1 is `Up`, above 0.75 is
/// `MostlyUp`, above 0.5 is `Degraded`, anything else is `Down`. A missing
/// ratio means no data and is `Unknown`, never `Down`.
pub fn classify_status(ratio: Option<f64>) -> ServiceState {
    let Some(r) = ratio else {
        return ServiceState::Unknown;
    };

    if r == 1.0 {
        ServiceState::Up
    } else if r > 0.75 && r < 1.0 {
        ServiceState::MostlyUp
    } else if r > 0.5 && r <= 0.75 {
        ServiceState::Degraded
    } else {
        ServiceState::Down
    }
}

/// Arithmetic mean of the sample values, `None` for no samples.
pub fn mean_ratio(samples: &[MetricSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|s| s.value).sum();
    Some(sum / samples.len() as f64)
}

/// Keep only the newest sample of each region, ordered by region.
///
/// A region counts once per check run even when the result still arrives
/// split across several tables.
pub fn latest_per_region(samples: Vec<MetricSample>) -> Vec<MetricSample> {
    let mut latest: BTreeMap<String, MetricSample> = BTreeMap::new();
    for s in samples {
        let newer = latest.get(s.region()).map_or(true, |current| s.time > current.time);
        if newer {
            latest.insert(s.region().to_string(), s);
        }
    }
    latest.into_values().collect()
}

/// Query the latest status samples for `server` and classify them.
pub async fn check_status(
    api: &dyn QueryApi,
    queries: &FluxQueries,
    server: &str,
) -> Result<StatusCheck, QueryError> {
    let samples = latest_per_region(api.query(&queries.status(server)).await?);
    let ratio = mean_ratio(&samples);

    Ok(StatusCheck {
        server: server.to_string(),
        ratio,
        samples: samples.len(),
        state: classify_status(ratio),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::influx::testing::{sample, FakeQuery};
    use crate::influx::decode_flux_csv;
    use std::time::Duration;

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify_status(Some(1.0)), ServiceState::Up);

        assert_eq!(classify_status(Some(0.999)), ServiceState::MostlyUp);
        assert_eq!(classify_status(Some(0.76)), ServiceState::MostlyUp);

        // 0.75 itself is the top of Degraded
        assert_eq!(classify_status(Some(0.75)), ServiceState::Degraded);
        assert_eq!(classify_status(Some(0.51)), ServiceState::Degraded);

        assert_eq!(classify_status(Some(0.5)), ServiceState::Down);
        assert_eq!(classify_status(Some(0.0)), ServiceState::Down);
        assert_eq!(classify_status(Some(f64::NAN)), ServiceState::Down);
        assert_eq!(classify_status(Some(1.5)), ServiceState::Down);

        assert_eq!(classify_status(None), ServiceState::Unknown);
    }

    #[test]
    fn test_classify_sweep() {
        for i in 0..=1000 {
            let r = i as f64 / 1000.0;
            let expected = if r == 1.0 {
                ServiceState::Up
            } else if r > 0.75 {
                ServiceState::MostlyUp
            } else if r > 0.5 {
                ServiceState::Degraded
            } else {
                ServiceState::Down
            };
            assert_eq!(classify_status(Some(r)), expected, "ratio {}", r);
        }
    }

    #[test]
    fn test_mean_ratio() {
        assert_eq!(mean_ratio(&[]), None);
        assert_eq!(mean_ratio(&[sample(0, 1.0, "eu")]), Some(1.0));
        assert_eq!(
            mean_ratio(&[
                sample(0, 1.0, "eu"),
                sample(0, 1.0, "us"),
                sample(0, 1.0, "ap"),
                sample(0, 0.0, "sa"),
            ]),
            Some(0.75)
        );
    }

    fn queries() -> FluxQueries {
        FluxQueries::new("Systemstats", Duration::from_secs(1800), Duration::from_secs(21600))
    }

    #[tokio::test]
    async fn test_check_status_no_rows_is_unknown() {
        let api = FakeQuery::new(vec![], vec![]);
        let check = check_status(&api, &queries(), "https://www.example.com").await.unwrap();

        assert_eq!(check.state, ServiceState::Unknown);
        assert_eq!(check.ratio, None);
        assert_eq!(check.samples, 0);
    }

    #[tokio::test]
    async fn test_check_status_single_failure_is_down() {
        let api = FakeQuery::new(vec![sample(0, 0.0, "eu")], vec![]);
        let check = check_status(&api, &queries(), "https://www.example.com").await.unwrap();

        assert_eq!(check.state, ServiceState::Down);
        assert_eq!(check.ratio, Some(0.0));
    }

    #[tokio::test]
    async fn test_check_status_partial() {
        let status = vec![
            sample(0, 1.0, "eu"),
            sample(0, 1.0, "us"),
            sample(0, 0.0, "ap"),
        ];
        let api = FakeQuery::new(status, vec![]);
        let check = check_status(&api, &queries(), "https://www.example.com").await.unwrap();

        assert_eq!(check.state, ServiceState::Degraded);
        assert_eq!(check.samples, 3);
        assert_eq!(check.server, "https://www.example.com");
    }

    #[test]
    fn test_latest_per_region() {
        let latest = latest_per_region(vec![
            sample(300, 0.0, "eu"),
            sample(1740, 1.0, "eu"),
            sample(600, 1.0, "us"),
            sample(60, 0.0, "eu"),
        ]);

        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].region(), "eu");
        assert_eq!(latest[0].value, 1.0);
        assert_eq!(latest[0].time.timestamp(), 1740);
        assert_eq!(latest[1].region(), "us");
        assert!(latest_per_region(vec![]).is_empty());
    }

    #[test]
    fn test_recovered_region_split_by_status_code_is_up() {
        // One table per status_code: a 503 at 00:05, then a 200 at 00:29
        let body = "\
,result,table,_start,_stop,_time,_value,_field,_measurement,region,server,status_code\r
,_result,0,2024-01-01T00:00:00Z,2024-01-01T00:30:00Z,2024-01-01T00:05:00Z,false,response_status_code_match,http_response,eu,https://www.example.com,503\r
,_result,1,2024-01-01T00:00:00Z,2024-01-01T00:30:00Z,2024-01-01T00:29:00Z,true,response_status_code_match,http_response,eu,https://www.example.com,200\r
\r
";
        let samples = latest_per_region(decode_flux_csv(body).unwrap());
        let ratio = mean_ratio(&samples);

        assert_eq!(samples.len(), 1);
        assert_eq!(ratio, Some(1.0));
        assert_eq!(classify_status(ratio), ServiceState::Up);
    }

    #[tokio::test]
    async fn test_check_status_counts_each_region_once() {
        let status = vec![
            sample(300, 0.0, "eu"),
            sample(1740, 1.0, "eu"),
            sample(1700, 1.0, "us"),
        ];
        let api = FakeQuery::new(status, vec![]);
        let check = check_status(&api, &queries(), "https://www.example.com").await.unwrap();

        assert_eq!(check.state, ServiceState::Up);
        assert_eq!(check.samples, 2);
    }
}
