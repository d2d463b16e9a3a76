//! Datasource API Server
//!
//! HTTP boundary between the dashboard host and the datasource: query data,
//! resource calls and health checks, plus a liveness probe.

use crate::application::{Datasource, RequestContext};
use crate::domain::entities::{CallResourceRequest, CheckHealthRequest, QueryDataRequest};
use crate::error::{DatasourceError, ErrorKind};
use crate::infrastructure::ShutdownController;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Per-request deadline override, in milliseconds.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub version: String,
    pub instances: usize,
}

/// Error envelope returned for failed requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A failed request: status plus the error's text.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: DatasourceError,
}

impl ApiError {
    /// Status for the query and health endpoints.
    pub fn from_error(error: DatasourceError) -> Self {
        let status = match error.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Cancellation => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Construction | ErrorKind::Upstream | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self { status, error }
    }

    /// Resource calls report every failure as a 500.
    pub fn resource(error: DatasourceError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!("request failed: {}", self.error);
        } else {
            tracing::debug!("request rejected: {}", self.error);
        }
        let body = ErrorResponse {
            error: self.error.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    pub datasource: Arc<Datasource>,
    pub shutdown: ShutdownController,
    /// Deadline applied when the request carries no override
    pub default_timeout: Duration,
}

impl ApiState {
    pub fn new(
        datasource: Arc<Datasource>,
        shutdown: ShutdownController,
        default_timeout: Duration,
    ) -> Self {
        Self {
            datasource,
            shutdown,
            default_timeout,
        }
    }

    /// Build the cancellation context for one request.
    fn context(&self, headers: &HeaderMap) -> RequestContext {
        let timeout = headers
            .get(REQUEST_TIMEOUT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        RequestContext::with_timeout(timeout).with_shutdown(self.shutdown.clone())
    }
}

/// Build the HTTP router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/resource", post(resource_handler))
        .route("/health", post(health_handler))
        .route("/livez", get(liveness_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API Server.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, state: ApiState) -> Self {
        Self { listen_addr, state }
    }

    /// Run until the shutdown controller fires. In-flight requests are
    /// cancelled by their contexts; the server returns once they have
    /// answered.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("datasource API listening on {}", self.listen_addr);

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;
        Ok(())
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, DatasourceError> {
    serde_json::from_slice(body).map_err(|e| DatasourceError::InvalidRequest(e.to_string()))
}

// Handler functions

async fn query_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let _guard = state.shutdown.request_guard();
    let req: QueryDataRequest = parse_body(&body).map_err(ApiError::from_error)?;
    let ctx = state.context(&headers);

    let response = state
        .datasource
        .query_data(&ctx, &req)
        .await
        .map_err(ApiError::from_error)?;
    Ok(Json(response).into_response())
}

async fn resource_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let _guard = state.shutdown.request_guard();
    let req: CallResourceRequest = parse_body(&body).map_err(ApiError::resource)?;
    let ctx = state.context(&headers);

    let value = state
        .datasource
        .call_resource(&ctx, &req)
        .await
        .map_err(ApiError::resource)?;
    Ok(Json(value).into_response())
}

async fn health_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let _guard = state.shutdown.request_guard();
    let req: CheckHealthRequest = parse_body(&body).map_err(ApiError::from_error)?;
    let ctx = state.context(&headers);

    let result = state.datasource.check_health(&ctx, &req).await;
    Ok(Json(result).into_response())
}

async fn liveness_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(LivenessResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instances: state.datasource.instances().len(),
    })
}
