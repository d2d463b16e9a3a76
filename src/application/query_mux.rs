//! Query Type Mux
//!
//! Routes query batches to the handler registered for their query type.

use crate::application::context::RequestContext;
use crate::application::datasource::DatasourceInstance;
use crate::application::instance_manager::InstanceManager;
use crate::domain::entities::{QueryDataRequest, QueryDataResponse};
use crate::domain::value_objects::QueryType;
use crate::error::DatasourceError;
use std::sync::Arc;

/// Dispatcher over [`QueryType`]. Every batch is served by the instance
/// owning its connection settings.
pub struct QueryTypeMux {
    instances: Arc<InstanceManager<DatasourceInstance>>,
}

impl QueryTypeMux {
    pub fn new(instances: Arc<InstanceManager<DatasourceInstance>>) -> Self {
        Self { instances }
    }

    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        req: &QueryDataRequest,
    ) -> Result<QueryDataResponse, DatasourceError> {
        let query_type = QueryType::from_tag(&req.query_type)?;
        let instance = self.instances.get_or_create(&req.plugin_context.settings)?;
        tracing::debug!(
            "dispatching {} queries of type {} for connection {}",
            req.queries.len(),
            query_type,
            req.plugin_context.settings.id
        );

        match query_type {
            QueryType::TimeSeries => {
                instance
                    .series()
                    .handle_time_series_queries(ctx, &req.queries)
                    .await
            }
        }
    }
}
