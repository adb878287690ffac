//! The metadata gateway: typed operations against the `node`, `file`, and
//! `node_file` relations shared by the whole cluster.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::models::{File, Node};

/// Typed operations against the relational metadata store.
///
/// Every operation is single-statement; the compare-and-set operations
/// (`take_node_lock`, `update_node_lock`, `release_node_lock`) are the only
/// coordination primitive the core relies on — there is no multi-statement
/// transaction here.
#[async_trait]
pub trait MetadataGateway: Send + Sync {
    /// Inserts a new node row. A duplicate `name` surfaces as
    /// [`CoreError::AlreadyExists`](crate::error::CoreError::AlreadyExists).
    async fn create_node(&self, name: &str) -> CoreResult<Node>;

    /// Looks up a node by name. Returns `Ok(None)` (not an error) when no
    /// row matches.
    async fn get_node_by_name(&self, name: &str) -> CoreResult<Option<Node>>;

    /// Sets the advertised address for a node. Must affect exactly one row.
    async fn update_node_advertise_addr(&self, node_id: i64, addr: &str) -> CoreResult<()>;

    /// Conditional update: `lock = new_lease WHERE id = node_id AND lock < min_lease_exclusive`.
    /// Returns the number of rows affected (0 or 1) so the caller can tell
    /// "acquired" from "contested".
    async fn take_node_lock(
        &self,
        node_id: i64,
        new_lease: i64,
        min_lease_exclusive: i64,
    ) -> CoreResult<u64>;

    /// Compare-and-set renewal: `lock = new_lease WHERE id = node_id AND lock = expected_old_lease`.
    async fn update_node_lock(
        &self,
        node_id: i64,
        new_lease: i64,
        expected_old_lease: i64,
    ) -> CoreResult<u64>;

    /// Compare-and-set release: `lock = 0 WHERE id = node_id AND lock = expected_old_lease`.
    async fn release_node_lock(&self, node_id: i64, expected_old_lease: i64) -> CoreResult<u64>;

    /// Reserves a UUID at state `0` (pending).
    async fn create_file(&self, uuid: &str, size: i64) -> CoreResult<File>;

    /// Updates a file's state and size, typically the `0 -> 1` publish
    /// transition.
    async fn update_file(&self, id: i64, state: i16, size: i64) -> CoreResult<File>;

    /// Looks up a file by UUID and state. Returns `Ok(None)` when no row
    /// matches.
    async fn get_file_by_uuid_and_state(&self, uuid: &str, state: i16) -> CoreResult<Option<File>>;

    /// Returns every published file for which this node has no `node_file`
    /// row yet — the sync worklist.
    async fn get_not_synced_files(&self, node_id: i64) -> CoreResult<Vec<File>>;

    /// Returns every node whose lease exceeds `lease_strictly_greater_than`
    /// and which holds a `node_file` row for the file identified by
    /// `(uuid, state)`.
    async fn get_live_nodes_with_file(
        &self,
        uuid: &str,
        state: i16,
        lease_strictly_greater_than: i64,
    ) -> CoreResult<Vec<Node>>;

    /// Inserts a `node_file` row. A duplicate `(node_id, file_id)` surfaces
    /// as [`CoreError::AlreadyExists`](crate::error::CoreError::AlreadyExists).
    async fn add_file_to_node(&self, node_id: i64, file_id: i64) -> CoreResult<()>;

    /// Connectivity probe used by the supervisor's ping loop.
    async fn ping(&self) -> CoreResult<()>;

    /// Releases any held resources (connection pool) on shutdown. The
    /// in-memory implementation has nothing to release.
    async fn close(&self) {}
}
