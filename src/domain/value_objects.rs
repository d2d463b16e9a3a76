//! Value Objects - Immutable domain primitives
//!
//! Closed sets of names the datasource understands: query types, resource
//! methods and health states. Each one parses from the string the host
//! sends and refuses anything it does not know.

use crate::error::DatasourceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Query type declared on a query batch.
///
/// The host tags each batch with a string; the empty tag is the default
/// time-series query. Every other tag is unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    /// Time series values for a metric expression
    TimeSeries,
}

impl QueryType {
    /// All query types the dispatcher has a handler for.
    pub const ALL: [QueryType; 1] = [QueryType::TimeSeries];

    /// Parse the tag carried by a query batch.
    ///
    /// # Examples
    /// ```
    /// use pmseries_datasource::domain::QueryType;
    ///
    /// assert_eq!(QueryType::from_tag("").unwrap(), QueryType::TimeSeries);
    /// assert!(QueryType::from_tag("logs").is_err());
    /// ```
    pub fn from_tag(tag: &str) -> Result<Self, DatasourceError> {
        Self::ALL
            .into_iter()
            .find(|query_type| query_type.tag() == tag)
            .ok_or_else(|| DatasourceError::UnsupportedQueryType(tag.to_string()))
    }

    /// The tag the host uses for this query type.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::TimeSeries => "",
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeSeries => write!(f, "timeseries"),
        }
    }
}

/// Operation reachable through the resource call endpoint.
///
/// The request path names the method; [`ResourceMethod::ALL`] is the whole
/// routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceMethod {
    /// Metric names, optionally filtered by a glob pattern
    Metrics,
    /// Label names, or the values of the requested labels
    Labels,
    /// Descriptors (pmid, indom, semantics, type, units) of series
    Metadata,
    /// Instances of instance-domain series
    Instances,
    /// Series identifiers matching an expression
    Series,
    /// Template variable query (`metrics()`, `label_names()`, `label_values(x)`)
    MetricFindQuery,
}

impl ResourceMethod {
    pub const ALL: [ResourceMethod; 6] = [
        ResourceMethod::Metrics,
        ResourceMethod::Labels,
        ResourceMethod::Metadata,
        ResourceMethod::Instances,
        ResourceMethod::Series,
        ResourceMethod::MetricFindQuery,
    ];

    /// Method name as it appears in the request path.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Labels => "labels",
            Self::Metadata => "metadata",
            Self::Instances => "instances",
            Self::Series => "series",
            Self::MetricFindQuery => "metricFindQuery",
        }
    }

    /// Look up a method by name. Names are case sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }

    /// Check that the routing table is usable: every name non-empty,
    /// path-safe and unique. Run once at startup.
    pub fn validate_table() -> Result<(), DatasourceError> {
        let mut seen = HashSet::new();
        for method in Self::ALL {
            let name = method.name();
            if name.is_empty() || name.contains(['/', '?']) {
                return Err(DatasourceError::Internal(format!(
                    "resource method {:?} has an invalid name '{}'",
                    method, name
                )));
            }
            if !seen.insert(name) {
                return Err(DatasourceError::Internal(format!(
                    "resource method name '{}' is registered twice",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ResourceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Error,
}
