//! Domain Layer
//!
//! Entities, value objects and the outbound port to the metrics API.

pub mod entities;
pub mod ports;
pub mod value_objects;

pub use entities::*;
pub use ports::MetricsApi;
pub use value_objects::{HealthStatus, QueryType, ResourceMethod};
