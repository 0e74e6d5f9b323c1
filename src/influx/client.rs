//! InfluxDB v2 query API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Serialize;

use super::{decode_flux_csv, MetricSample, QueryApi, QueryError};

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    dialect: Dialect,
}

#[derive(Debug, Serialize)]
struct Dialect {
    header: bool,
    annotations: Vec<String>,
}

/// Client for `POST /api/v2/query`.
#[derive(Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    url: String,
    org: String,
    token: String,
}

impl InfluxClient {
    /// Create a client for the given endpoint, organization and API token.
    pub fn new(url: &str, org: &str, token: &str, timeout: Duration) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            org: org.to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/v2/query", self.url)
    }
}

#[async_trait]
impl QueryApi for InfluxClient {
    async fn query(&self, flux: &str) -> Result<Vec<MetricSample>, QueryError> {
        let body = QueryRequest {
            query: flux,
            kind: "flux",
            dialect: Dialect {
                header: true,
                annotations: Vec::new(),
            },
        };

        let mut request = self
            .http
            .post(self.endpoint())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(ACCEPT, "application/csv")
            .json(&body);
        if !self.org.is_empty() {
            request = request.query(&[("org", self.org.as_str())]);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(QueryError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        decode_flux_csv(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESULT: &str = "\
,result,table,_time,_value,region\r
,_result,0,2024-01-01T00:00:00Z,0.25,eu\r
,_result,1,2024-01-01T00:00:10Z,0.5,us\r
";

    #[tokio::test]
    async fn test_query_sends_token_and_flux() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/query"))
            .and(query_param("org", "acme"))
            .and(header("authorization", "Token secret"))
            .and(header("accept", "application/csv"))
            .and(body_partial_json(serde_json::json!({
                "query": "from(bucket: \"b\")",
                "type": "flux",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(RESULT))
            .expect(1)
            .mount(&server)
            .await;

        let client = InfluxClient::new(
            &format!("{}/", server.uri()),
            "acme",
            "secret",
            Duration::from_secs(5),
        )
        .unwrap();
        let samples = client.query("from(bucket: \"b\")").await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].region(), "eu");
        assert_eq!(samples[1].value, 0.5);
    }

    #[tokio::test]
    async fn test_query_reports_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/query"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized access"))
            .mount(&server)
            .await;

        let client = InfluxClient::new(&server.uri(), "", "bad", Duration::from_secs(5)).unwrap();
        match client.query("from(bucket: \"b\")").await {
            Err(QueryError::Status { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "unauthorized access");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_unreachable_endpoint() {
        let client = InfluxClient::new("http://127.0.0.1:1", "", "t", Duration::from_millis(200)).unwrap();
        let result = client.query("from(bucket: \"b\")").await;
        assert!(matches!(result, Err(QueryError::Http(_))));
    }
}
