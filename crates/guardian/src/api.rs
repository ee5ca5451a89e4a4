//! HTTP API for health checks, Prometheus metrics and alert queries

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use guardian_lib::{
    alerting::{AlertType, Severity},
    engine::Engine,
    health::HealthRegistry,
    models::{FailureContext, JobRef},
    policy::PatternSpec,
    store::{AlertFilter, Pagination},
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            health_registry: engine.health().clone(),
            engine,
        }
    }
}

/// Query parameters for alert listings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    pub namespace: Option<String>,
    /// Job name; only applied together with `namespace`
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: Option<AlertType>,
    pub severity: Option<Severity>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl AlertQuery {
    fn filter(&self) -> AlertFilter {
        let job = match (&self.namespace, &self.name) {
            (Some(namespace), Some(name)) => Some(JobRef::new(namespace, name)),
            _ => None,
        };
        AlertFilter {
            job,
            namespace: self.namespace.clone(),
            alert_type: self.alert_type,
            severity: self.severity,
            since: None,
        }
    }

    fn page(&self) -> Pagination {
        let default = Pagination::default();
        Pagination {
            offset: self.offset.unwrap_or(default.offset),
            limit: self.limit.unwrap_or(default.limit).clamp(1, 500),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PatternTestRequest {
    pub pattern: PatternSpec,
    pub sample: FailureContext,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
    Json(state.engine.list_active_alerts(&query.filter()).await)
}

async fn alert_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> Response {
    match state
        .engine
        .get_alert_history(&query.filter(), query.page())
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn sla_snapshot(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    let job = JobRef::new(namespace, name);
    match state.engine.get_sla_snapshot(&job) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("no SLA snapshot for {}", job)),
    }
}

async fn list_channels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.dispatcher().channel_statuses(Utc::now()).await)
}

async fn test_channel(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    if !state.engine.dispatcher().channel_names().await.contains(&name) {
        return error_response(StatusCode::NOT_FOUND, format!("channel '{}' not found", name));
    }
    Json(state.engine.test_channel(&name).await).into_response()
}

async fn test_pattern(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PatternTestRequest>,
) -> impl IntoResponse {
    Json(state.engine.test_pattern(&request.pattern, &request.sample))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/alerts/history", get(alert_history))
        .route("/api/v1/sla/:namespace/:name", get(sla_snapshot))
        .route("/api/v1/channels", get(list_channels))
        .route("/api/v1/channels/:name/test", post(test_channel))
        .route("/api/v1/patterns/test", post(test_pattern))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
