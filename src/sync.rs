//! Sync manager: periodically pulls blobs this node is missing from any
//! peer that already has them.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::lease::LeaseManager;
use crate::models::{File, FileState};
use crate::peer::PeerClient;
use crate::storage::{BlobStore, MetadataGateway};

/// Interval between sweeps of the not-synced worklist.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

pub struct SyncManager {
    node_id: i64,
    gateway: Arc<dyn MetadataGateway>,
    blob_store: Arc<BlobStore>,
    lease: Arc<LeaseManager>,
    peer_client: Arc<PeerClient>,
}

impl SyncManager {
    pub fn new(
        node_id: i64,
        gateway: Arc<dyn MetadataGateway>,
        blob_store: Arc<BlobStore>,
        lease: Arc<LeaseManager>,
        peer_client: Arc<PeerClient>,
    ) -> Self {
        Self {
            node_id,
            gateway,
            blob_store,
            lease,
            peer_client,
        }
    }

    /// Runs sweeps on [`SYNC_INTERVAL`] until cancelled. A failure to list
    /// the worklist is fatal and propagates to the supervisor; a failure to
    /// sync one particular file is logged and does not stop the sweep.
    pub async fn run(&self, cancel: CancellationToken) -> crate::error::CoreResult<()> {
        loop {
            if let Err(e) = self.sweep().await {
                error!(error = %e, "sync sweep failed");
                return Err(e);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(SYNC_INTERVAL) => {}
            }
        }
    }

    /// Runs a single worklist sweep. `run` calls this on a timer; exposed
    /// directly so callers (and tests) can trigger one sweep on demand.
    ///
    /// A file that can't be fetched or written (no live holder, every peer
    /// failed, the write itself errored) is logged and skipped — the next
    /// sweep retries it. Recording this node's ownership after a successful
    /// write is the one step whose failure is fatal: it propagates out of
    /// the sweep (and `run`) rather than being swallowed, since a broken
    /// `AddFileToNode` path would otherwise re-fetch and silently drop the
    /// same file on every tick forever.
    pub async fn sweep(&self) -> crate::error::CoreResult<()> {
        let files = self.gateway.get_not_synced_files(self.node_id).await?;
        if files.is_empty() {
            info!("no files to sync");
            return Ok(());
        }

        for file in files {
            match self.sync_file(&file).await {
                Ok(true) => info!(uuid = %file.uuid, "synced"),
                Ok(false) => {}
                Err(e) => {
                    error!(uuid = %file.uuid, error = %e, "failed to record ownership after sync, aborting sweep");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Returns `Ok(true)` if the file was fetched and recorded, `Ok(false)`
    /// if it was skipped (logged internally), or `Err` if recording this
    /// node's ownership failed after a successful fetch and write.
    async fn sync_file(&self, file: &File) -> crate::error::CoreResult<bool> {
        let candidates = match self
            .gateway
            .get_live_nodes_with_file(&file.uuid, FileState::Published.as_i16(), self.lease.live_threshold())
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(uuid = %file.uuid, error = %e, "failed to list live holders, skipping");
                return Ok(false);
            }
        };

        if candidates.is_empty() {
            warn!(uuid = %file.uuid, "no live holder, skipping");
            return Ok(false);
        }

        let mut fetched = None;
        for node in candidates {
            match self.peer_client.fetch_internal(&node.advertise_addr, &file.uuid).await {
                Ok(response) => {
                    fetched = Some(response);
                    break;
                }
                Err(_) => continue,
            }
        }

        let Some(response) = fetched else {
            warn!(uuid = %file.uuid, "no peer served the blob, skipping");
            return Ok(false);
        };

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(uuid = %file.uuid, error = %e, "failed reading peer response body, skipping");
                return Ok(false);
            }
        };

        if let Err(e) = self.blob_store.write(&file.uuid, &bytes, &self.lease).await {
            warn!(uuid = %file.uuid, error = %e, "failed to write synced blob, skipping");
            return Ok(false);
        }

        self.gateway.add_file_to_node(self.node_id, file.id).await?;
        Ok(true)
    }
}
