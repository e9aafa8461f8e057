use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/node-claims", post(handlers::create_node_claim).get(handlers::list_instances))
        .route("/node-claims/:provider_id", get(handlers::get_instance).delete(handlers::delete_node_claim))
        .route("/node-claims/drift-check", post(handlers::is_drifted))
        .route("/instance-types", post(handlers::get_instance_types))
        .route("/repair-policies", get(handlers::repair_policies))
        .route("/name", get(handlers::provider_name))
        .route("/admin/cache/flush", post(handlers::flush_offering_cache))
        .route("/admin/cache/status", get(handlers::cache_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
