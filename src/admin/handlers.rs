use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AppState;
use crate::error::BalancerError;
use crate::load_balancer::{Algorithm, LoadBalancerStats, SelectionContext};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub algorithm: Algorithm,
    pub total_backends: usize,
    pub healthy_backends: usize,
    pub eligible_backends: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub backend_id: String,
}

#[derive(Deserialize)]
pub struct RegisterBackend {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub health_url: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

/// Balancer errors as HTTP responses.
pub struct ApiError(BalancerError);

impl From<BalancerError> for ApiError {
    fn from(e: BalancerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BalancerError::DuplicateBackend(_) => StatusCode::CONFLICT,
            BalancerError::InvalidWeight { .. } => StatusCode::BAD_REQUEST,
            BalancerError::UnknownBackend(_) => StatusCode::NOT_FOUND,
            BalancerError::NoHealthyBackend { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let stats = state.balancer.get_stats();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if stats.eligible_backend_count > 0 { "operational" } else { "degraded" },
        algorithm: stats.algorithm,
        total_backends: stats.total_backend_count,
        healthy_backends: stats.healthy_backend_count,
        eligible_backends: stats.eligible_backend_count,
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Json<LoadBalancerStats> {
    Json(state.balancer.get_stats())
}

pub async fn select_backend(
    State(state): State<AppState>,
    Query(context): Query<SelectionContext>,
) -> Result<Json<Selection>, ApiError> {
    let backend_id = state.balancer.select_backend(&context)?;
    Ok(Json(Selection { backend_id }))
}

pub async fn register_backend(
    State(state): State<AppState>,
    Json(body): Json<RegisterBackend>,
) -> Result<StatusCode, ApiError> {
    state.balancer.register_backend(&body.id, body.weight)?;
    if let (Some(probe), Some(url)) = (&state.probe, body.health_url) {
        probe.add_target(&body.id, url);
    }
    tracing::info!(backend = %body.id, weight = body.weight, "Backend registered via admin API");
    Ok(StatusCode::CREATED)
}

pub async fn unregister_backend(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.balancer.unregister_backend(&id) {
        tracing::info!(backend = %id, "Backend unregistered via admin API");
    }
    if let Some(probe) = &state.probe {
        probe.remove_target(&id);
    }
    StatusCode::NO_CONTENT
}
