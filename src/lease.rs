//! Lease manager: acquires, renews, and releases a node's time-based lease
//! against the metadata store, and exposes the freshness predicate every
//! write path consults before touching disk or the `node_file` relation.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::storage::MetadataGateway;

/// Seconds a lease remains authoritative at the metadata store after it was
/// last renewed.
pub const LIFETIME: i64 = 60;
/// Interval between renewal attempts while a lease is held.
pub const RENEW_INTERVAL: i64 = 30;
/// Local freshness horizon: how long past the last successful renewal a
/// caller may still trust `is_fresh()` without re-checking against Postgres.
pub const FRESH_HORIZON: i64 = 45;
/// Per-call timeout applied to every lease I/O operation.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Owns the in-process view of a single node's lease.
///
/// `take`/`renew`/`release` are serialized by an async mutex since they hold
/// across an `.await`. `is_fresh` is a pure, lock-free read of the last
/// successfully observed lease value and never performs I/O.
pub struct LeaseManager {
    node_id: i64,
    gateway: Arc<dyn MetadataGateway>,
    current: Mutex<i64>,
    // Mirrors `current` for the lock-free `is_fresh` fast path.
    observed: AtomicI64,
}

impl LeaseManager {
    pub fn new(node_id: i64, gateway: Arc<dyn MetadataGateway>) -> Self {
        Self {
            node_id,
            gateway,
            current: Mutex::new(0),
            observed: AtomicI64::new(0),
        }
    }

    /// Acquires the lease for the first time. Fails with
    /// [`CoreError::LeaseContended`] if another node currently holds a live
    /// lease on this row.
    pub async fn take(&self) -> CoreResult<()> {
        let mut guard = self.current.lock().await;
        let candidate = now();
        let rows = timeout(
            OPERATION_TIMEOUT,
            self.gateway
                .take_node_lock(self.node_id, candidate, candidate - LIFETIME),
        )
        .await
        .map_err(|_| CoreError::Timeout)??;

        if rows != 1 {
            return Err(CoreError::LeaseContended);
        }
        *guard = candidate;
        self.observed.store(candidate, Ordering::Release);
        Ok(())
    }

    /// Renews the lease via compare-and-set against the last value we hold.
    /// Fails with [`CoreError::LeaseLost`] if the row no longer matches —
    /// another node has since taken over.
    pub async fn renew(&self) -> CoreResult<()> {
        let mut guard = self.current.lock().await;
        let old = *guard;
        let candidate = now();
        let rows = timeout(
            OPERATION_TIMEOUT,
            self.gateway.update_node_lock(self.node_id, candidate, old),
        )
        .await
        .map_err(|_| CoreError::Timeout)??;

        if rows != 1 {
            return Err(CoreError::LeaseLost);
        }
        *guard = candidate;
        self.observed.store(candidate, Ordering::Release);
        Ok(())
    }

    /// Releases the lease, resetting the stored value to `0`.
    pub async fn release(&self) -> CoreResult<()> {
        let mut guard = self.current.lock().await;
        let old = *guard;
        if old == 0 {
            return Ok(());
        }
        timeout(
            OPERATION_TIMEOUT,
            self.gateway.release_node_lock(self.node_id, old),
        )
        .await
        .map_err(|_| CoreError::Timeout)??;
        *guard = 0;
        self.observed.store(0, Ordering::Release);
        Ok(())
    }

    /// Renews on a fixed cadence until cancelled or renewal fails. Intended
    /// to run as one of the supervisor's tasks; a returned error propagates
    /// to the supervisor as a fatal condition.
    pub async fn keep(&self, cancel: CancellationToken) -> CoreResult<()> {
        loop {
            self.renew().await?;

            let lease = self.observed.load(Ordering::Acquire);
            let sleep_secs = (lease + RENEW_INTERVAL) - now();
            if sleep_secs < 1 {
                return Err(CoreError::Fatal(format!(
                    "lease renewal cadence too tight: {sleep_secs}s remaining"
                )));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(sleep_secs as u64)) => {}
            }
        }
    }

    /// Pure, lock-free freshness check: no I/O, safe to call on every
    /// write-path hot loop.
    pub fn is_fresh(&self) -> bool {
        now() < self.observed.load(Ordering::Acquire) + FRESH_HORIZON
    }

    /// The lease threshold (`now - LIFETIME`) to pass to
    /// `get_live_nodes_with_file` when selecting live peers.
    pub fn live_threshold(&self) -> i64 {
        now() - LIFETIME
    }
}
