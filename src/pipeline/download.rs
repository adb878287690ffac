//! Download pipeline: local-first read, falling back to proxying from a
//! live peer that holds a published copy.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::{CoreError, CoreResult};
use crate::lease::LeaseManager;
use crate::models::FileState;
use crate::peer::PeerClient;
use crate::storage::{BlobStore, MetadataGateway};

/// Either the blob came straight from this node's disk, or a peer's response
/// that hasn't been read yet — the caller streams `Proxied` onward instead of
/// buffering it, so a proxied download never holds the whole blob in memory.
pub enum DownloadedBlob {
    Local(Vec<u8>),
    Proxied(reqwest::Response),
}

impl DownloadedBlob {
    /// Reads the whole blob into memory. Fine for tests and for the sync
    /// path, which needs the full bytes to write to disk anyway; the HTTP
    /// handler should stream `Proxied` directly instead of calling this.
    pub async fn into_bytes(self) -> CoreResult<Vec<u8>> {
        match self {
            DownloadedBlob::Local(v) => Ok(v),
            DownloadedBlob::Proxied(resp) => {
                Ok(resp.bytes().await.map_err(|_| CoreError::Unavailable)?.to_vec())
            }
        }
    }
}

/// Serves a blob for the external caller.
///
/// 1. If this node's own disk has the blob, return it directly — no
///    metadata round-trip needed.
/// 2. Otherwise, ask the metadata gateway for every node that holds a
///    published copy and whose lease is still live (`now - LIFETIME`).
/// 3. Try each candidate node's internal endpoint in order. The first
///    response whose status is a genuine `2xx` wins; anything else —
///    including a transport failure — moves on to the next peer.
/// 4. If no candidate yields a response, or none are live, this is
///    [`CoreError::Unavailable`] (peer selection) or
///    [`CoreError::NotFound`] (no peer ever held it).
#[instrument(skip(gateway, blob_store, lease, peer_client), fields(uuid = %uuid))]
pub async fn download(
    gateway: &Arc<dyn MetadataGateway>,
    blob_store: &BlobStore,
    lease: &LeaseManager,
    peer_client: &PeerClient,
    uuid: &str,
) -> CoreResult<DownloadedBlob> {
    if blob_store.exists(uuid).await {
        let bytes = blob_store.read(uuid).await?;
        return Ok(DownloadedBlob::Local(bytes));
    }

    let candidates = gateway
        .get_live_nodes_with_file(uuid, FileState::Published.as_i16(), lease.live_threshold())
        .await?;

    if candidates.is_empty() {
        return Err(CoreError::NotFound);
    }

    for node in candidates {
        match peer_client.fetch_internal(&node.advertise_addr, uuid).await {
            Ok(response) => return Ok(DownloadedBlob::Proxied(response)),
            Err(e) => {
                warn!(node = %node.name, error = %e, "peer fetch failed, trying next candidate");
            }
        }
    }

    Err(CoreError::Unavailable)
}

/// Serves a blob for the internal, node-to-node endpoint: local disk only,
/// no peer fallback (a node never proxies on behalf of another node).
#[instrument(skip(blob_store), fields(uuid = %uuid))]
pub async fn download_local(blob_store: &BlobStore, uuid: &str) -> CoreResult<Vec<u8>> {
    blob_store.read(uuid).await
}
