use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use vbus_registry::Registry;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// HTTP server living next to a registry.
pub struct HostServer {
    config: ServerConfig,
    registry: Arc<Registry>,
}

impl HostServer {
    pub fn new(config: ServerConfig, registry: Arc<Registry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(
            &self.config,
            AppState {
                registry: Arc::clone(&self.registry),
            },
        )
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;
        let app = self.router();
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            static_root = ?self.config.static_root,
            "HTTP server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbus_registry::{LoopbackTransport, RegistryConfig};

    fn registry() -> Arc<Registry> {
        Registry::shared(RegistryConfig::default(), Arc::new(LoopbackTransport::default()))
    }

    #[test]
    fn server_construction() {
        let server = HostServer::new(ServerConfig::default(), registry());
        assert_eq!(server.config().bind_addr, "127.0.0.1:8080".parse().unwrap());
        let _router = server.router();
    }

    #[tokio::test]
    async fn serve_rejects_missing_static_root() {
        let config = ServerConfig {
            static_root: Some("/definitely/not/here".into()),
            ..ServerConfig::default()
        };
        let result = HostServer::new(config, registry()).serve(async {}).await;
        assert!(matches!(result, Err(ServerError::StaticRoot(_))));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        };
        HostServer::new(config, registry()).serve(async {}).await.unwrap();
    }
}
