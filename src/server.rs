//! HTTP server for the cluster node's external and internal endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::error::CoreResult;
use crate::lease::LeaseManager;
use crate::peer::PeerClient;
use crate::request_id::tag_request_id;
use crate::router::{create_router, AppState};
use crate::storage::{BlobStore, MetadataGateway};

/// Binds and serves the HTTP router until the listener is dropped or the
/// server future is cancelled by the caller.
pub struct HttpServer {
    config: Arc<Config>,
    gateway: Arc<dyn MetadataGateway>,
    blob_store: Arc<BlobStore>,
    lease: Arc<LeaseManager>,
    peer_client: Arc<PeerClient>,
    node_id: i64,
}

impl HttpServer {
    pub fn new(
        config: Arc<Config>,
        gateway: Arc<dyn MetadataGateway>,
        blob_store: Arc<BlobStore>,
        lease: Arc<LeaseManager>,
        peer_client: Arc<PeerClient>,
        node_id: i64,
    ) -> Self {
        Self {
            config,
            gateway,
            blob_store,
            lease,
            peer_client,
            node_id,
        }
    }

    /// Runs the server until `cancel` fires (graceful shutdown) or the
    /// listener errors out.
    pub async fn run(self, cancel: tokio_util::sync::CancellationToken) -> CoreResult<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|e| crate::error::CoreError::Fatal(format!("invalid listen address: {e}")))?;

        let state = AppState {
            config: self.config.clone(),
            gateway: self.gateway.clone(),
            blob_store: self.blob_store.clone(),
            lease: self.lease.clone(),
            peer_client: self.peer_client.clone(),
            node_id: self.node_id,
        };

        let app = create_router(state)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(tag_request_id));

        info!("node http server starting on {}", addr);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(crate::error::CoreError::from)?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| crate::error::CoreError::Fatal(e.to_string()))?;

        info!("node http server stopped");
        Ok(())
    }
}
