use axum::{routing::get, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler::{self, AppState};

/// Build the axum router: API endpoints under `/v1`, static files everywhere else.
pub fn build_router(config: &ServerConfig, state: AppState) -> Router {
    let api = Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .with_state(state);

    let app = match &config.static_root {
        Some(root) => api.fallback_service(ServeDir::new(root)),
        None => api,
    };
    app.layer(TraceLayer::new_for_http())
}
