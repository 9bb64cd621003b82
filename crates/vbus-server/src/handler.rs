use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};
use vbus_registry::Registry;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Info handler: who this host is and what its registry is doing.
pub async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    let registry = &state.registry;
    let config = registry.config();
    let entities = registry
        .snapshot()
        .map(|tree| tree.entity_count())
        .unwrap_or_default();
    Json(json!({
        "name": "vbus-server",
        "version": env!("CARGO_PKG_VERSION"),
        "service": config.id(),
        "hostname": config.hostname,
        "state": registry.state().to_string(),
        "entities": entities,
    }))
}
