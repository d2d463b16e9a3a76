//! Stub metrics API shared by application-level tests.

use crate::domain::entities::{
    MetricName, PingResponse, SeriesDescriptor, SeriesInstance, SeriesLabels, SeriesValue,
    ValuesRange,
};
use crate::domain::ports::MetricsApi;
use crate::error::DatasourceError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Knows one metric, `disk.io` (series `s-disk`, no instance domain), with a
/// single sample per values call.
pub(crate) struct StubApi {
    query_calls: AtomicUsize,
    values_calls: AtomicUsize,
}

impl StubApi {
    pub(crate) fn new() -> Self {
        Self {
            query_calls: AtomicUsize::new(0),
            values_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn values_calls(&self) -> usize {
        self.values_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsApi for StubApi {
    async fn ping(&self) -> Result<PingResponse, DatasourceError> {
        Ok(PingResponse { success: true })
    }

    async fn query(&self, expr: &str) -> Result<Vec<String>, DatasourceError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if expr == "disk.io" {
            Ok(vec!["s-disk".to_string()])
        } else {
            Ok(vec![])
        }
    }

    async fn descs(&self, series: &[String]) -> Result<Vec<SeriesDescriptor>, DatasourceError> {
        Ok(series
            .iter()
            .map(|id| SeriesDescriptor {
                series: id.clone(),
                indom: "none".to_string(),
                ..Default::default()
            })
            .collect())
    }

    async fn labels(&self, _series: &[String]) -> Result<Vec<SeriesLabels>, DatasourceError> {
        Ok(vec![])
    }

    async fn label_names(&self) -> Result<Vec<String>, DatasourceError> {
        Ok(vec!["hostname".to_string()])
    }

    async fn label_values(
        &self,
        _names: &[String],
    ) -> Result<BTreeMap<String, Vec<serde_json::Value>>, DatasourceError> {
        Ok(BTreeMap::new())
    }

    async fn metric_names(&self, _pattern: Option<&str>) -> Result<Vec<String>, DatasourceError> {
        Ok(vec!["disk.io".to_string()])
    }

    async fn metrics(&self, series: &[String]) -> Result<Vec<MetricName>, DatasourceError> {
        Ok(series
            .iter()
            .map(|id| MetricName {
                series: id.clone(),
                name: "disk.io".to_string(),
            })
            .collect())
    }

    async fn instances(&self, _series: &[String]) -> Result<Vec<SeriesInstance>, DatasourceError> {
        Ok(vec![])
    }

    async fn values(
        &self,
        series: &[String],
        range: &ValuesRange,
    ) -> Result<Vec<SeriesValue>, DatasourceError> {
        self.values_calls.fetch_add(1, Ordering::SeqCst);
        Ok(series
            .iter()
            .map(|id| SeriesValue {
                series: id.clone(),
                instance: None,
                timestamp: range.start_ms as f64,
                value: "42".to_string(),
            })
            .collect())
    }
}
