//! Datasource Errors
//!
//! A single error type flows through every request path so the boundary can
//! tell a local validation failure from an upstream failure or a cancellation.

/// Broad classification of a [`DatasourceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection instance could not be built.
    Construction,
    /// The request itself was rejected before any upstream call.
    Validation,
    /// The metrics API failed or answered with something unusable.
    Upstream,
    /// The caller's deadline passed or the server is shutting down.
    Cancellation,
    /// A response could not be encoded.
    Internal,
}

/// Errors produced while serving queries, resource calls and health checks.
///
/// `Clone` so that every caller coalesced onto one upstream lookup receives
/// the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasourceError {
    #[error("failed to build metrics API client: {0}")]
    Construction(String),
    #[error("unknown resource method: {0}")]
    UnknownResourceMethod(String),
    #[error("unsupported query type: {0}")]
    UnsupportedQueryType(String),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("metrics API error: {0}")]
    Upstream(String),
    #[error("request cancelled: {0}")]
    Cancelled(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DatasourceError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Construction(_) => ErrorKind::Construction,
            Self::UnknownResourceMethod(_)
            | Self::UnsupportedQueryType(_)
            | Self::InvalidParameter { .. }
            | Self::InvalidRequest(_) => ErrorKind::Validation,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Cancelled(_) => ErrorKind::Cancellation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }
}
