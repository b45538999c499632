//! HTTP API for health checks, Prometheus metrics and balancer status

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use balancer_lib::{BalancerError, ComponentStatus, HealthRegistry, LoadBalancer};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Horizon used when `/api/v1/predictions` is called without one
pub const DEFAULT_HORIZON_MINUTES: u32 = 60;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub balancer: Arc<LoadBalancer>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(balancer: Arc<LoadBalancer>) -> Self {
        let health_registry = balancer.health().clone();
        Self {
            balancer,
            health_registry,
        }
    }
}

/// Error body for API failures
#[derive(Debug)]
pub struct ApiError(StatusCode, serde_json::Value);

impl ApiError {
    fn not_found(what: &str, id: &str) -> Self {
        ApiError(
            StatusCode::NOT_FOUND,
            json!({ "error": format!("{what} not found: {id}") }),
        )
    }
}

impl From<BalancerError> for ApiError {
    fn from(err: BalancerError) -> Self {
        match &err {
            BalancerError::InsufficientHistory {
                available,
                required,
            } => ApiError(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": err.to_string(),
                    "available": available,
                    "required": required,
                }),
            ),
            BalancerError::NotRunning(_) => ApiError(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": err.to_string() }),
            ),
            _ => ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": err.to_string() }),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still dispatching
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.balancer.get_load_balancing_status().await)
}

#[derive(Debug, Deserialize)]
pub struct PredictionQuery {
    pub horizon_minutes: Option<u32>,
}

async fn predictions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PredictionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let horizon = query.horizon_minutes.unwrap_or(DEFAULT_HORIZON_MINUTES);
    let prediction = state.balancer.predict_resource_needs(horizon).await?;
    Ok(Json(prediction))
}

async fn system_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.balancer.get_metrics().await)
}

async fn worker(
    State(state): State<Arc<AppState>>,
    Path(worker_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .balancer
        .get_worker_state(&worker_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("worker", &worker_id))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/predictions", get(predictions))
        .route("/api/v1/metrics/system", get(system_metrics))
        .route("/api/v1/workers/:id", get(worker))
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
