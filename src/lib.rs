//! pmseries datasource
//!
//! Backend for a dashboard datasource that reads performance metrics from
//! pmproxy's `/series` REST API. Exposes the components for use by the
//! binary and by integration tests.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{Datasource, DatasourceInstance, InstanceManager, RequestContext};
pub use config::load_config;
pub use domain::entities::{ConnectionSettings, HealthResult, QueryDataRequest, QueryDataResponse};
pub use domain::ports::MetricsApi;
pub use domain::value_objects::{HealthStatus, QueryType, ResourceMethod};
pub use error::DatasourceError;
pub use infrastructure::{SeriesCache, ShutdownController};
