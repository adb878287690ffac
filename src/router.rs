//! Request routing for the cluster's HTTP surface.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::config::Config;
use crate::handlers;
use crate::lease::LeaseManager;
use crate::peer::PeerClient;
use crate::storage::{BlobStore, MetadataGateway};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<dyn MetadataGateway>,
    pub blob_store: Arc<BlobStore>,
    pub lease: Arc<LeaseManager>,
    pub peer_client: Arc<PeerClient>,
    pub node_id: i64,
}

/// Builds the router for the three endpoints this cluster exposes: the
/// external upload/download pair, and the internal node-to-node download.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/external/files/:uuid",
            post(handlers::upload_file).get(handlers::download_file_external),
        )
        .route(
            "/api/v1/internal/files/:uuid",
            get(handlers::download_file_internal),
        )
        .with_state(state)
}
