use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use nclc_domain::{NodeClaim, NodeClass};
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// §4.2 `LivenessProbe()`: the outer process's readiness signal is "has the
/// instance-type catalog ever been successfully populated".
pub async fn readyz(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.catalog.liveness_probe().map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(StatusCode::OK)
}

// ── CloudProvider facade ──────────────────────────────────────────────────────

pub async fn create_node_claim(State(state): State<AppState>, Json(node_claim): Json<NodeClaim>) -> Result<Json<NodeClaim>, ApiError> {
    let created = state.provider.create(&node_claim).await?;
    info!(node_claim = %created.name, "instance created");
    Ok(Json(created))
}

pub async fn list_instances(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let instances = state.provider.list().await?;
    Ok(Json(json!(instances)))
}

pub async fn get_instance(State(state): State<AppState>, Path(provider_id): Path<String>) -> Result<Json<Value>, ApiError> {
    let instance = state.provider.get(&provider_id).await?;
    Ok(Json(json!(instance)))
}

pub async fn delete_node_claim(State(state): State<AppState>, Json(node_claim): Json<NodeClaim>) -> Result<StatusCode, ApiError> {
    state.provider.delete(&node_claim).await?;
    info!(node_claim = %node_claim.name, "instance deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn is_drifted(State(state): State<AppState>, Json(node_claim): Json<NodeClaim>) -> Result<Json<Value>, ApiError> {
    let reason = state.provider.is_drifted(&node_claim).await?;
    Ok(Json(json!({ "drifted": reason })))
}

pub async fn get_instance_types(State(state): State<AppState>, Json(node_class): Json<NodeClass>) -> Result<Json<Value>, ApiError> {
    let types = state.provider.get_instance_types(&node_class)?;
    Ok(Json(json!(types)))
}

pub async fn repair_policies(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.provider.repair_policies()))
}

pub async fn provider_name(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "name": state.provider.name() }))
}

// ── Admin ──────────────────────────────────────────────────────────────────────

/// §4.1 `Flush()`: "used by tests and explicit admin action" — the admin
/// escape hatch for a stuck unavailable-offerings cache entry.
pub async fn flush_offering_cache(State(state): State<AppState>) -> Json<Value> {
    state.offering_cache.flush();
    info!("offering cache flushed via admin request");
    Json(json!({ "flushed": true }))
}

pub async fn cache_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "unavailable_entries": state.offering_cache.len() }))
}
