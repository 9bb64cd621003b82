//! HTTP side of a vBus host.
//!
//! Serves a static directory next to the bus service, plus two small JSON
//! endpoints: `/v1/health` and `/v1/info` (service id, lifecycle state, tree
//! size).

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::HostServer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;
    use vbus_registry::{LoopbackTransport, Registry, RegistryConfig};
    use vbus_tree::{Attribute, RawNode};

    fn state() -> AppState {
        let registry = Registry::shared(
            RegistryConfig::new("system", "info"),
            Arc::new(LoopbackTransport::default()),
        );
        AppState { registry }
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = router::build_router(&ServerConfig::default(), state());
        let (status, body) = get(app, "/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn info_endpoint_reports_registry() {
        let state = state();
        state
            .registry
            .add_node("status", RawNode::new().attribute(Attribute::new("up", true.into())))
            .unwrap();
        let app = router::build_router(&ServerConfig::default(), state);
        let (status, body) = get(app, "/v1/info").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["service"], "system.info");
        assert_eq!(json["state"], "uninitialized");
        assert_eq!(json["entities"], 2);
    }

    #[tokio::test]
    async fn serves_static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>vbus</h1>").unwrap();
        let config = ServerConfig {
            static_root: Some(dir.path().to_path_buf()),
            ..ServerConfig::default()
        };

        let app = router::build_router(&config, state());
        let (status, body) = get(app.clone(), "/index.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>vbus</h1>");

        let (status, _) = get(app.clone(), "/missing.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // API routes still win over the static fallback.
        let (status, _) = get(app, "/v1/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn no_static_root_means_404() {
        let app = router::build_router(&ServerConfig::default(), state());
        let (status, _) = get(app, "/index.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
