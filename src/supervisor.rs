//! Supervisor: starts the lease keeper, metadata ping loop, HTTP server,
//! and sync manager as concurrent cancellable tasks, propagates the first
//! error as fatal, and drives shutdown (lease release, pool close).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::lease::LeaseManager;
use crate::peer::PeerClient;
use crate::server::HttpServer;
use crate::storage::{BlobStore, MetadataGateway};
use crate::sync::SyncManager;

/// Interval between `Ping()` calls against the metadata gateway.
const PING_INTERVAL: Duration = Duration::from_secs(10);

pub struct Supervisor {
    config: Arc<Config>,
    gateway: Arc<dyn MetadataGateway>,
    blob_store: Arc<BlobStore>,
    lease: Arc<LeaseManager>,
    peer_client: Arc<PeerClient>,
    node_id: i64,
}

impl Supervisor {
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

    /// Runs every task until one fails or an external shutdown signal
    /// (ctrl-c / SIGTERM) arrives. On return, the lease has been released
    /// and the metadata pool closed regardless of which path triggered
    /// shutdown.
    pub async fn run(self) -> CoreResult<()> {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        {
            let lease = self.lease.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                info!(task = "lease-keeper", "starting");
                let result = lease.keep(cancel).await;
                info!(task = "lease-keeper", ?result, "stopped");
                result
            });
        }

        {
            let gateway = self.gateway.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                info!(task = "metadata-ping", "starting");
                let result = ping_loop(gateway, cancel).await;
                info!(task = "metadata-ping", ?result, "stopped");
                result
            });
        }

        {
            let server = HttpServer::new(
                self.config.clone(),
                self.gateway.clone(),
                self.blob_store.clone(),
                self.lease.clone(),
                self.peer_client.clone(),
                self.node_id,
            );
            let cancel = cancel.clone();
            tasks.spawn(async move {
                info!(task = "http-server", "starting");
                let result = server.run(cancel).await;
                info!(task = "http-server", ?result, "stopped");
                result
            });
        }

        {
            let sync = SyncManager::new(
                self.node_id,
                self.gateway.clone(),
                self.blob_store.clone(),
                self.lease.clone(),
                self.peer_client.clone(),
            );
            let cancel = cancel.clone();
            tasks.spawn(async move {
                info!(task = "sync-manager", "starting");
                let result = sync.run(cancel).await;
                info!(task = "sync-manager", ?result, "stopped");
                result
            });
        }

        let shutdown_signal = cancel.clone();
        tasks.spawn(async move {
            wait_for_shutdown_signal().await;
            info!("shutdown signal received");
            shutdown_signal.cancel();
            Ok(())
        });

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "task failed, shutting down the rest");
                    cancel.cancel();
                    first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    error!(error = %join_err, "task panicked");
                    cancel.cancel();
                    first_error.get_or_insert(CoreError::Fatal(join_err.to_string()));
                }
            }
        }

        self.shutdown().await;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn shutdown(&self) {
        info!("releasing lease");
        if let Err(e) = self.lease.release().await {
            error!(error = %e, "failed to release lease during shutdown");
        }
        info!("closing metadata gateway");
        self.gateway.close().await;
    }
}

async fn ping_loop(gateway: Arc<dyn MetadataGateway>, cancel: CancellationToken) -> CoreResult<()> {
    loop {
        gateway.ping().await?;
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(PING_INTERVAL) => {}
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
