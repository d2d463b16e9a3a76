//! pmproxy Series Client
//!
//! Implements MetricsApi over the pmproxy `/series` REST API.
//!
//! Every call is a single `GET` with query parameters; multi-valued
//! parameters are joined with commas.

use crate::domain::entities::{
    BasicAuth, MetricName, PingResponse, SeriesDescriptor, SeriesInstance, SeriesLabels,
    SeriesValue, ValuesRange,
};
use crate::domain::ports::MetricsApi;
use crate::error::DatasourceError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

/// HTTP client for one pmproxy endpoint.
pub struct PmseriesClient {
    base_url: String,
    client: reqwest::Client,
    basic_auth: Option<BasicAuth>,
}

impl PmseriesClient {
    /// Validate the endpoint URL and build the underlying HTTP client.
    pub fn new(
        url: &str,
        basic_auth: Option<BasicAuth>,
        timeout: Duration,
    ) -> Result<Self, DatasourceError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| DatasourceError::Construction(format!("invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DatasourceError::Construction(format!(
                "unsupported URL scheme '{}' in '{}'",
                parsed.scheme(),
                url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DatasourceError::Construction(e.to_string()))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
            basic_auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, DatasourceError> {
        let url = format!("{}/series/{}", self.base_url, endpoint);
        let mut request = self.client.get(&url).query(params);
        if let Some(auth) = &self.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DatasourceError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("pmproxy {} failed: {} - {}", endpoint, status, body);
            return Err(DatasourceError::Upstream(format!(
                "{} returned {} - {}",
                endpoint, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DatasourceError::Upstream(format!("invalid {} response: {}", endpoint, e)))
    }
}

/// Epoch milliseconds as pmproxy seconds.
fn seconds(ms: i64) -> String {
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        format!("{:.3}", ms as f64 / 1000.0)
    }
}

#[async_trait]
impl MetricsApi for PmseriesClient {
    async fn ping(&self) -> Result<PingResponse, DatasourceError> {
        self.get_json("ping", &[]).await
    }

    async fn query(&self, expr: &str) -> Result<Vec<String>, DatasourceError> {
        self.get_json("query", &[("expr", expr.to_string())]).await
    }

    async fn descs(&self, series: &[String]) -> Result<Vec<SeriesDescriptor>, DatasourceError> {
        if series.is_empty() {
            return Ok(Vec::new());
        }
        self.get_json("descs", &[("series", series.join(","))]).await
    }

    async fn labels(&self, series: &[String]) -> Result<Vec<SeriesLabels>, DatasourceError> {
        if series.is_empty() {
            return Ok(Vec::new());
        }
        self.get_json("labels", &[("series", series.join(","))]).await
    }

    async fn label_names(&self) -> Result<Vec<String>, DatasourceError> {
        self.get_json("labels", &[]).await
    }

    async fn label_values(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, Vec<serde_json::Value>>, DatasourceError> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        self.get_json("labels", &[("names", names.join(","))]).await
    }

    async fn metric_names(&self, pattern: Option<&str>) -> Result<Vec<String>, DatasourceError> {
        match pattern {
            Some(pattern) => self.get_json("metrics", &[("match", pattern.to_string())]).await,
            None => self.get_json("metrics", &[]).await,
        }
    }

    async fn metrics(&self, series: &[String]) -> Result<Vec<MetricName>, DatasourceError> {
        if series.is_empty() {
            return Ok(Vec::new());
        }
        self.get_json("metrics", &[("series", series.join(","))]).await
    }

    async fn instances(&self, series: &[String]) -> Result<Vec<SeriesInstance>, DatasourceError> {
        if series.is_empty() {
            return Ok(Vec::new());
        }
        self.get_json("instances", &[("series", series.join(","))]).await
    }

    async fn values(
        &self,
        series: &[String],
        range: &ValuesRange,
    ) -> Result<Vec<SeriesValue>, DatasourceError> {
        if series.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = vec![
            ("series", series.join(",")),
            ("start", seconds(range.start_ms)),
            ("finish", seconds(range.finish_ms)),
        ];
        if let Some(interval) = range.interval_ms {
            params.push(("interval", format!("{}s", seconds(interval as i64))));
        }
        self.get_json("values", &params).await
    }
}
