//! Shared test harness: boots a node's HTTP surface against an in-memory
//! metadata gateway and a tempdir-backed blob store.

use std::sync::Arc;

use blobmesh::config::Config;
use blobmesh::request_id::tag_request_id;
use blobmesh::router::{create_router, AppState};
use blobmesh::storage::MemoryMetadataGateway;
use blobmesh::{LeaseManager, MetadataGateway, PeerClient};
use tokio::net::TcpListener;

/// One running node in a test cluster. Nodes sharing the same
/// `MemoryMetadataGateway` behave like peers in the same cluster talking to
/// the same Postgres instance.
pub struct TestNode {
    pub base_url: String,
    pub node_id: i64,
    pub gateway: Arc<dyn MetadataGateway>,
    pub blob_store: Arc<blobmesh::BlobStore>,
    pub lease: Arc<LeaseManager>,
    _workdir: tempfile::TempDir,
}

impl TestNode {
    /// Starts a node named `name`, sharing `gateway` with any other nodes
    /// passed the same instance.
    pub async fn start(name: &str, gateway: Arc<dyn MetadataGateway>) -> Self {
        let node = match gateway.get_node_by_name(name).await.unwrap() {
            Some(n) => n,
            None => gateway.create_node(name).await.unwrap(),
        };

        let lease = Arc::new(LeaseManager::new(node.id, gateway.clone()));
        lease.take().await.unwrap();

        let workdir = tempfile::tempdir().unwrap();
        let blob_store = Arc::new(blobmesh::BlobStore::open(workdir.path()).await.unwrap());
        let peer_client = Arc::new(PeerClient::new());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        gateway
            .update_node_advertise_addr(node.id, &base_url)
            .await
            .unwrap();

        let config = Arc::new(Config {
            name: name.to_string(),
            workdir: workdir.path().to_path_buf(),
            listen_addr: addr.to_string(),
            advertise_addr: base_url.clone(),
            database_url: String::new(),
            ping_interval_secs: 10,
            debug: false,
            silent: true,
        });

        let state = AppState {
            config,
            gateway: gateway.clone(),
            blob_store: blob_store.clone(),
            lease: lease.clone(),
            peer_client,
            node_id: node.id,
        };
        let app = create_router(state).layer(axum::middleware::from_fn(tag_request_id));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        Self {
            base_url,
            node_id: node.id,
            gateway,
            blob_store,
            lease,
            _workdir: workdir,
        }
    }

    pub fn external_url(&self, uuid: &str) -> String {
        format!("{}/api/v1/external/files/{}", self.base_url, uuid)
    }
}

/// A fresh, all-lowercase-hex UUID string for use as a blob identifier in
/// tests.
pub fn test_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
