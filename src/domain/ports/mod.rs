mod metrics_api;

pub use metrics_api::MetricsApi;
