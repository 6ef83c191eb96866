//! Instance discovery handlers.

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use crate::AppState;

pub const DISCOVERY_PATH: &str = "/prometheus/instance/discovery";
pub const TARGET_DESCRIPTION_PATH: &str = "/prometheus/instance/discovery/target-description";
pub const ATTRIBUTE_DESCRIPTIONS_PATH: &str = "/prometheus/instance/discovery/attribute-descriptions";

/// GET /prometheus/instance/discovery
pub async fn describe(State(state): State<AppState>) -> impl IntoResponse {
    let interval = state.discovery.interval().as_secs();
    Json(state.discovery.discovery().describe(interval))
}

/// GET /prometheus/instance/discovery/target-description
pub async fn describe_target(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.discovery.discovery().describe_target())
}

/// GET /prometheus/instance/discovery/attribute-descriptions
pub async fn describe_attributes(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "attributes": state.discovery.discovery().describe_attributes() }))
}

/// GET /prometheus/instance/discovery/discovered-targets
pub async fn discovered_targets(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "targets": state.discovery.targets().await }))
}
