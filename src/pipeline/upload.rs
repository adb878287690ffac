//! Upload pipeline: publish a new blob and record its existence on this
//! node.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::error::{CoreError, CoreResult};
use crate::lease::LeaseManager;
use crate::models::{File, FileState};
use crate::storage::{BlobStore, MetadataGateway};

/// Outcome of a successful upload, returned to the external caller.
pub struct UploadOutcome {
    pub id: i64,
    pub size: i64,
    pub created_at: i64,
}

/// Publishes `data` under `uuid` and records it as owned by `node_id`.
///
/// Steps run in a fixed order, matching the reference implementation
/// exactly, because later steps assume earlier ones committed:
/// 1. Reserve the UUID in the metadata store at state `0` (pending). A
///    duplicate UUID fails here with [`CoreError::AlreadyExists`] before any
///    disk I/O happens.
/// 2. Write the blob to disk. A collision with an already-published file on
///    this node's disk (but not yet reflected in postgres — a narrow race)
///    also surfaces as `AlreadyExists`.
/// 3. Record this node as a holder of the file.
/// 4. Transition the file row to state `1` (published).
#[instrument(skip(gateway, blob_store, lease, data), fields(uuid = %uuid))]
pub async fn upload(
    gateway: &Arc<dyn MetadataGateway>,
    blob_store: &BlobStore,
    lease: &LeaseManager,
    node_id: i64,
    uuid: &str,
    data: &[u8],
) -> CoreResult<UploadOutcome> {
    if !lease.is_fresh() {
        return Err(CoreError::LeaseExpired);
    }

    let file = gateway.create_file(uuid, 0).await?;

    if let Err(e) = blob_store.write(uuid, data, lease).await {
        error!(error = %e, "failed to write blob to disk");
        return Err(e);
    }

    gateway.add_file_to_node(node_id, file.id).await?;

    let size = data.len() as i64;
    let published: File = gateway
        .update_file(file.id, FileState::Published.as_i16(), size)
        .await?;

    info!(file_id = published.id, size, "published blob");

    Ok(UploadOutcome {
        id: published.id,
        size: published.size,
        created_at: published.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryMetadataGateway;

    async fn harness() -> (Arc<dyn MetadataGateway>, BlobStore, LeaseManager, i64, tempfile::TempDir) {
        let gateway: Arc<dyn MetadataGateway> = Arc::new(MemoryMetadataGateway::new());
        let dir = tempfile::tempdir().unwrap();
        let blob_store = BlobStore::open(dir.path()).await.unwrap();
        let node = gateway.create_node("n1").await.unwrap();
        let lease = LeaseManager::new(node.id, gateway.clone());
        lease.take().await.unwrap();
        (gateway, blob_store, lease, node.id, dir)
    }

    #[tokio::test]
    async fn upload_publishes_and_records_ownership() {
        let (gateway, blob_store, lease, node_id, _dir) = harness().await;
        let uuid = "11111111-1111-1111-1111-111111111111";

        let outcome = upload(&gateway, &blob_store, &lease, node_id, uuid, b"payload")
            .await
            .unwrap();
        assert_eq!(outcome.size, 7);

        let file = gateway
            .get_file_by_uuid_and_state(uuid, 1)
            .await
            .unwrap()
            .expect("file should be published");
        assert_eq!(file.id, outcome.id);
        assert!(blob_store.exists(uuid).await);
    }

    #[tokio::test]
    async fn duplicate_upload_is_rejected() {
        let (gateway, blob_store, lease, node_id, _dir) = harness().await;
        let uuid = "22222222-2222-2222-2222-222222222222";

        upload(&gateway, &blob_store, &lease, node_id, uuid, b"first")
            .await
            .unwrap();
        let err = upload(&gateway, &blob_store, &lease, node_id, uuid, b"second")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn upload_with_stale_lease_is_rejected() {
        let (gateway, blob_store, lease, node_id, _dir) = harness().await;
        lease.release().await.unwrap();
        let uuid = "33333333-3333-3333-3333-333333333333";

        let err = upload(&gateway, &blob_store, &lease, node_id, uuid, b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::LeaseExpired));
    }
}
