//! Domain Entities - Core business objects
//!
//! Connection settings, the request/response envelopes exchanged with the
//! dashboard host, and the records returned by the pmproxy `/series` API.

use crate::domain::value_objects::HealthStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Basic authentication credentials for the metrics API.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One configured connection to a metrics API endpoint.
///
/// Two settings values with the same `id` but any other difference
/// (a new URL, credentials, or a bumped `updated` stamp) describe a
/// reconfigured connection and get separate instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Connection identifier assigned by the host
    pub id: String,
    /// Base URL of pmproxy, e.g. `http://localhost:44322`
    pub url: String,
    /// Version stamp, bumped by the host on every settings save
    #[serde(default)]
    pub updated: i64,
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,
}

impl ConnectionSettings {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            updated: 0,
            basic_auth: None,
        }
    }
}

/// Context attached by the host to every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    pub settings: ConnectionSettings,
}

/// Absolute time range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

/// A single query of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub ref_id: String,
    /// Metric expression understood by pmseries, e.g. `disk.dev.read`
    pub expr: String,
    /// Frame naming pattern using `$metric`, `$instance` and `$<label>`
    #[serde(default)]
    pub legend_format: Option<String>,
    pub time_range: TimeRange,
    /// Requested sampling interval
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

/// A batch of queries sharing one connection and one query type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDataRequest {
    pub plugin_context: PluginContext,
    /// Empty for the default time-series query
    #[serde(default)]
    pub query_type: String,
    pub queries: Vec<DataQuery>,
}

/// One time series: timestamps in epoch milliseconds with their values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub times: Vec<i64>,
    pub values: Vec<f64>,
}

/// Result of one query: frames, or the error that query ran into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub frames: Vec<DataFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataResponse {
    pub fn from_frames(frames: Vec<DataFrame>) -> Self {
        Self {
            frames,
            error: None,
        }
    }

    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Responses of a batch keyed by query `ref_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDataResponse {
    pub responses: BTreeMap<String, DataResponse>,
}

/// Resource call: `url` is `<method>?<query string>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResourceRequest {
    pub plugin_context: PluginContext,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckHealthRequest {
    pub plugin_context: PluginContext,
}

/// Health check result reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    pub status: HealthStatus,
    pub message: String,
}

impl HealthResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Ok,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: message.into(),
        }
    }
}

// ===== pmproxy /series records =====

/// `GET /series/ping`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub success: bool,
}

/// `GET /series/descs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    pub series: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub pmid: String,
    #[serde(default)]
    pub indom: String,
    #[serde(default)]
    pub semantics: String,
    #[serde(default, rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub units: String,
}

impl SeriesDescriptor {
    /// Whether values of this series are reported per instance.
    pub fn has_instances(&self) -> bool {
        !self.indom.is_empty() && self.indom != "none"
    }

    /// Monotonic counters are graphed as per-second rates.
    pub fn is_counter(&self) -> bool {
        self.semantics == "counter"
    }
}

/// `GET /series/labels?series=...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesLabels {
    pub series: String,
    #[serde(default)]
    pub labels: BTreeMap<String, serde_json::Value>,
}

/// `GET /series/metrics?series=...`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricName {
    pub series: String,
    pub name: String,
}

/// `GET /series/instances?series=...`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesInstance {
    pub series: String,
    #[serde(default)]
    pub source: String,
    /// Instance identifier referenced by values
    pub instance: String,
    #[serde(default)]
    pub id: u32,
    pub name: String,
}

/// `GET /series/values?series=...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesValue {
    pub series: String,
    #[serde(default)]
    pub instance: Option<String>,
    /// Epoch milliseconds
    pub timestamp: f64,
    pub value: String,
}

/// Window for a `/series/values` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValuesRange {
    pub start_ms: i64,
    pub finish_ms: i64,
    pub interval_ms: Option<u64>,
}

impl ValuesRange {
    pub fn for_query(query: &DataQuery) -> Self {
        Self {
            start_ms: query.time_range.from,
            finish_ms: query.time_range.to,
            interval_ms: query.interval_ms,
        }
    }

    /// Same window starting one interval earlier, so a rate can be computed
    /// for the first point in range. Unchanged without an interval.
    pub fn with_leading_interval(self) -> Self {
        let step = self.interval_ms.unwrap_or(0) as i64;
        Self {
            start_ms: self.start_ms.saturating_sub(step),
            ..self
        }
    }
}

/// A series resolved from a metric expression, with everything needed to
/// name and label its frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub id: String,
    pub name: String,
    pub descriptor: SeriesDescriptor,
    pub labels: BTreeMap<String, String>,
    pub instances: Vec<SeriesInstance>,
}

impl Series {
    /// Name of an instance of this series, if known.
    pub fn instance_name(&self, instance: &str) -> Option<&str> {
        self.instances
            .iter()
            .find(|i| i.instance == instance)
            .map(|i| i.name.as_str())
    }
}
