use axum::{routing::get, Router};
use std::sync::Arc;
use storage::DistributedStorage;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers::{delete_file, get_file, health_check, AppState};
use crate::{ApiError, ApiResult};

/// Serves the peer file endpoints of one node.
pub struct Server {
    config: crate::Config,
    app_state: Arc<AppState>,
}

impl Server {
    pub fn new(config: crate::Config, storage: Arc<DistributedStorage>) -> Self {
        Self {
            config,
            app_state: Arc::new(AppState { storage }),
        }
    }

    pub async fn start(&self) -> ApiResult<()> {
        let addr = &self.config.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::InternalError(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until the task is dropped.
    pub async fn serve(&self, listener: TcpListener) -> ApiResult<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                "Starting peer server for node {} on {}",
                self.app_state.storage.node_address(),
                addr
            );
        }

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ApiError::InternalError(format!("Server error: {}", e)))
    }

    pub fn router(&self) -> Router {
        let file_routes = Router::new().route(
            "/:bucket/:file_id",
            get(get_file).delete(delete_file),
        );

        let prefix = network::normalize_prefix(&self.config.api_prefix);
        let routes = if prefix.is_empty() {
            file_routes
        } else {
            Router::new().nest(&prefix, file_routes)
        };

        routes
            .route("/health", get(health_check))
            .with_state(self.app_state.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }
}
