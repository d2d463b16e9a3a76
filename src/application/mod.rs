//! Application Layer
//!
//! Use cases served to the dashboard host: query dispatch, resource calls
//! and health checks, each against a per-connection instance.

pub mod context;
pub mod datasource;
pub mod health_reporter;
pub mod instance_manager;
pub mod query_mux;
pub mod resource_service;
pub mod series_service;

#[cfg(test)]
pub(crate) mod testing;

pub use context::RequestContext;
pub use datasource::{instance_factory, ClientFactory, Datasource, DatasourceInstance};
pub use health_reporter::HealthReporter;
pub use instance_manager::{Instance, InstanceFactory, InstanceManager};
pub use query_mux::QueryTypeMux;
pub use resource_service::{parse_resource_url, ResourceService};
pub use series_service::SeriesService;
