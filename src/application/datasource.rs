//! Datasource - Main application use case
//!
//! Serves the three request kinds of the dashboard host (queries, resource
//! calls, health checks), each against the connection instance owning the
//! request's settings.

use crate::application::context::RequestContext;
use crate::application::health_reporter::HealthReporter;
use crate::application::instance_manager::{Instance, InstanceFactory, InstanceManager};
use crate::application::query_mux::QueryTypeMux;
use crate::application::resource_service::{parse_resource_url, ResourceService};
use crate::application::series_service::SeriesService;
use crate::domain::entities::{
    CallResourceRequest, CheckHealthRequest, ConnectionSettings, HealthResult, QueryDataRequest,
    QueryDataResponse,
};
use crate::domain::ports::MetricsApi;
use crate::error::DatasourceError;
use crate::infrastructure::SERIES_CACHE_CAPACITY;
use std::sync::Arc;

/// Everything one configured connection needs: its metrics API client,
/// resource router, series service (with its cache) and health reporter.
pub struct DatasourceInstance {
    resources: ResourceService,
    series: SeriesService,
    health: HealthReporter,
}

impl DatasourceInstance {
    pub fn new(api: Arc<dyn MetricsApi>) -> Result<Self, DatasourceError> {
        Ok(Self {
            resources: ResourceService::new(Arc::clone(&api)),
            series: SeriesService::new(Arc::clone(&api), SERIES_CACHE_CAPACITY)?,
            health: HealthReporter::new(api),
        })
    }

    pub fn resources(&self) -> &ResourceService {
        &self.resources
    }

    pub fn series(&self) -> &SeriesService {
        &self.series
    }

    pub fn health(&self) -> &HealthReporter {
        &self.health
    }
}

impl Instance for DatasourceInstance {
    fn dispose(&self) {
        self.series.dispose();
    }
}

/// Builds the metrics API client for a connection.
pub type ClientFactory =
    Arc<dyn Fn(&ConnectionSettings) -> Result<Arc<dyn MetricsApi>, DatasourceError> + Send + Sync>;

/// Instance factory that wraps each client in a fresh [`DatasourceInstance`].
pub fn instance_factory(clients: ClientFactory) -> InstanceFactory<DatasourceInstance> {
    Arc::new(move |settings: &ConnectionSettings| {
        let api = clients(settings)?;
        DatasourceInstance::new(api)
    })
}

/// Application service used by the inbound adapter.
pub struct Datasource {
    instances: Arc<InstanceManager<DatasourceInstance>>,
    queries: QueryTypeMux,
}

impl Datasource {
    pub fn new(instances: Arc<InstanceManager<DatasourceInstance>>) -> Self {
        Self {
            queries: QueryTypeMux::new(Arc::clone(&instances)),
            instances,
        }
    }

    pub fn instances(&self) -> &Arc<InstanceManager<DatasourceInstance>> {
        &self.instances
    }

    pub async fn query_data(
        &self,
        ctx: &RequestContext,
        req: &QueryDataRequest,
    ) -> Result<QueryDataResponse, DatasourceError> {
        self.queries.dispatch(ctx, req).await
    }

    /// Route a resource call. Any error is the caller's to turn into an
    /// error envelope.
    pub async fn call_resource(
        &self,
        ctx: &RequestContext,
        req: &CallResourceRequest,
    ) -> Result<serde_json::Value, DatasourceError> {
        let (method, params) = parse_resource_url(&req.url)?;
        let instance = self.instances.get_or_create(&req.plugin_context.settings)?;
        ctx.run(instance.resources().route(&method, &params)).await
    }

    pub async fn check_health(&self, ctx: &RequestContext, req: &CheckHealthRequest) -> HealthResult {
        match self.instances.get_or_create(&req.plugin_context.settings) {
            Ok(instance) => instance.health().check(ctx).await,
            Err(e) => HealthResult::error(e.to_string()),
        }
    }
}
