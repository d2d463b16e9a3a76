//! Health Reporter
//!
//! Single-probe connectivity check against the metrics API.

use crate::application::context::RequestContext;
use crate::domain::entities::HealthResult;
use crate::domain::ports::MetricsApi;
use std::sync::Arc;

pub const HEALTH_OK_MESSAGE: &str = "Data source is working";

pub const HEALTH_NOT_WORKING_MESSAGE: &str =
    "Datasource is not working. Please check if the metrics archive is running and consult the pmproxy logs.";

pub struct HealthReporter {
    api: Arc<dyn MetricsApi>,
}

impl HealthReporter {
    pub fn new(api: Arc<dyn MetricsApi>) -> Self {
        Self { api }
    }

    /// Ping the metrics API once and classify the outcome. No retries.
    pub async fn check(&self, ctx: &RequestContext) -> HealthResult {
        match ctx.run(self.api.ping()).await {
            Err(e) => {
                tracing::warn!("health check failed: {}", e);
                HealthResult::error(e.to_string())
            }
            Ok(ping) if !ping.success => {
                tracing::warn!("health check: pmproxy reported failure");
                HealthResult::error(HEALTH_NOT_WORKING_MESSAGE)
            }
            Ok(_) => HealthResult::ok(HEALTH_OK_MESSAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        MetricName, PingResponse, SeriesDescriptor, SeriesInstance, SeriesLabels, SeriesValue,
        ValuesRange,
    };
    use crate::domain::value_objects::HealthStatus;
    use crate::error::DatasourceError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum PingBehaviour {
        Success,
        Unsuccessful,
        Fails,
        Hangs,
    }

    struct PingApi {
        behaviour: PingBehaviour,
        pings: AtomicUsize,
    }

    #[async_trait]
    impl MetricsApi for PingApi {
        async fn ping(&self) -> Result<PingResponse, DatasourceError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                PingBehaviour::Success => Ok(PingResponse { success: true }),
                PingBehaviour::Unsuccessful => Ok(PingResponse { success: false }),
                PingBehaviour::Fails => Err(DatasourceError::Upstream(
                    "connection refused".to_string(),
                )),
                PingBehaviour::Hangs => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(PingResponse { success: true })
                }
            }
        }

        async fn query(&self, _expr: &str) -> Result<Vec<String>, DatasourceError> {
            unimplemented!()
        }

        async fn descs(&self, _series: &[String]) -> Result<Vec<SeriesDescriptor>, DatasourceError> {
            unimplemented!()
        }

        async fn labels(&self, _series: &[String]) -> Result<Vec<SeriesLabels>, DatasourceError> {
            unimplemented!()
        }

        async fn label_names(&self) -> Result<Vec<String>, DatasourceError> {
            unimplemented!()
        }

        async fn label_values(
            &self,
            _names: &[String],
        ) -> Result<BTreeMap<String, Vec<serde_json::Value>>, DatasourceError> {
            unimplemented!()
        }

        async fn metric_names(&self, _pattern: Option<&str>) -> Result<Vec<String>, DatasourceError> {
            unimplemented!()
        }

        async fn metrics(&self, _series: &[String]) -> Result<Vec<MetricName>, DatasourceError> {
            unimplemented!()
        }

        async fn instances(&self, _series: &[String]) -> Result<Vec<SeriesInstance>, DatasourceError> {
            unimplemented!()
        }

        async fn values(
            &self,
            _series: &[String],
            _range: &ValuesRange,
        ) -> Result<Vec<SeriesValue>, DatasourceError> {
            unimplemented!()
        }
    }

    async fn check(behaviour: PingBehaviour, timeout: Duration) -> (HealthResult, usize) {
        let api = Arc::new(PingApi {
            behaviour,
            pings: AtomicUsize::new(0),
        });
        let reporter = HealthReporter::new(api.clone());
        let result = reporter.check(&RequestContext::with_timeout(timeout)).await;
        (result, api.pings.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_ok() {
        let (result, pings) = check(PingBehaviour::Success, Duration::from_secs(1)).await;
        assert_eq!(result, HealthResult::ok(HEALTH_OK_MESSAGE));
        assert_eq!(result.message, "Data source is working");
        assert_eq!(pings, 1);
    }

    #[tokio::test]
    async fn test_unsuccessful_ping() {
        let (result, pings) = check(PingBehaviour::Unsuccessful, Duration::from_secs(1)).await;
        assert_eq!(result.status, HealthStatus::Error);
        assert_eq!(result.message, HEALTH_NOT_WORKING_MESSAGE);
        assert_eq!(pings, 1);
    }

    #[tokio::test]
    async fn test_transport_error_message() {
        let (result, pings) = check(PingBehaviour::Fails, Duration::from_secs(1)).await;
        assert_eq!(result.status, HealthStatus::Error);
        assert_eq!(result.message, "metrics API error: connection refused");
        assert_eq!(pings, 1);
    }

    #[tokio::test]
    async fn test_deadline_reports_error() {
        let (result, _) = check(PingBehaviour::Hangs, Duration::from_millis(20)).await;
        assert_eq!(result.status, HealthStatus::Error);
        assert!(result.message.contains("cancelled"));
    }
}
