//! Metrics API Port
//!
//! Defines the interface to the upstream pmproxy `/series` REST API.

use crate::domain::entities::{
    MetricName, PingResponse, SeriesDescriptor, SeriesInstance, SeriesLabels, SeriesValue,
    ValuesRange,
};
use crate::error::DatasourceError;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Client for the upstream metrics archive.
///
/// This is an outbound port: connection instances call it without knowing
/// how requests reach pmproxy. Every failure comes back as
/// [`DatasourceError::Upstream`]. Implementations are shared by all
/// requests for one connection and must be safe for concurrent use.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<PingResponse, DatasourceError>;

    /// Series identifiers matching a metric expression.
    async fn query(&self, expr: &str) -> Result<Vec<String>, DatasourceError>;

    /// Descriptors of the given series.
    async fn descs(&self, series: &[String]) -> Result<Vec<SeriesDescriptor>, DatasourceError>;

    /// Labels of the given series.
    async fn labels(&self, series: &[String]) -> Result<Vec<SeriesLabels>, DatasourceError>;

    /// All known label names.
    async fn label_names(&self) -> Result<Vec<String>, DatasourceError>;

    /// Known values for each of the given label names.
    async fn label_values(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, Vec<serde_json::Value>>, DatasourceError>;

    /// Metric names, optionally restricted to a glob pattern.
    async fn metric_names(&self, pattern: Option<&str>) -> Result<Vec<String>, DatasourceError>;

    /// Metric names of the given series.
    async fn metrics(&self, series: &[String]) -> Result<Vec<MetricName>, DatasourceError>;

    /// Instances of the given series.
    async fn instances(&self, series: &[String]) -> Result<Vec<SeriesInstance>, DatasourceError>;

    /// Values of the given series within a time window.
    async fn values(
        &self,
        series: &[String],
        range: &ValuesRange,
    ) -> Result<Vec<SeriesValue>, DatasourceError>;
}
