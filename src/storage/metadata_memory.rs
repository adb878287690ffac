//! In-memory [`MetadataGateway`], used by tests that would otherwise need a
//! live Postgres instance.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{CoreError, CoreResult};
use crate::models::{File, FileState, Node};

use super::metadata::MetadataGateway;

/// Non-persistent `MetadataGateway` backed by a handful of `DashMap`s.
/// Mirrors the shape of the relations in §3 exactly enough for the upload,
/// download, and sync pipelines to exercise their real logic in tests.
#[derive(Default)]
pub struct MemoryMetadataGateway {
    nodes: DashMap<i64, Node>,
    nodes_by_name: DashMap<String, i64>,
    files: DashMap<i64, File>,
    files_by_uuid: DashMap<String, i64>,
    node_files: DashMap<(i64, i64), ()>,
    next_node_id: AtomicI64,
    next_file_id: AtomicI64,
}

impl MemoryMetadataGateway {
    pub fn new() -> Self {
        Self {
            next_node_id: AtomicI64::new(1),
            next_file_id: AtomicI64::new(1),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetadataGateway for MemoryMetadataGateway {
    async fn create_node(&self, name: &str) -> CoreResult<Node> {
        if self.nodes_by_name.contains_key(name) {
            return Err(CoreError::AlreadyExists);
        }
        let id = self.next_node_id.fetch_add(1, Ordering::SeqCst);
        let node = Node {
            id,
            name: name.to_string(),
            advertise_addr: String::new(),
            lock: 0,
        };
        self.nodes.insert(id, node.clone());
        self.nodes_by_name.insert(name.to_string(), id);
        Ok(node)
    }

    async fn get_node_by_name(&self, name: &str) -> CoreResult<Option<Node>> {
        Ok(self
            .nodes_by_name
            .get(name)
            .and_then(|id| self.nodes.get(&*id).map(|n| n.clone())))
    }

    async fn update_node_advertise_addr(&self, node_id: i64, addr: &str) -> CoreResult<()> {
        match self.nodes.get_mut(&node_id) {
            Some(mut node) => {
                node.advertise_addr = addr.to_string();
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    async fn take_node_lock(
        &self,
        node_id: i64,
        new_lease: i64,
        min_lease_exclusive: i64,
    ) -> CoreResult<u64> {
        match self.nodes.get_mut(&node_id) {
            Some(mut node) if node.lock < min_lease_exclusive => {
                node.lock = new_lease;
                Ok(1)
            }
            Some(_) => Ok(0),
            None => Ok(0),
        }
    }

    async fn update_node_lock(
        &self,
        node_id: i64,
        new_lease: i64,
        expected_old_lease: i64,
    ) -> CoreResult<u64> {
        match self.nodes.get_mut(&node_id) {
            Some(mut node) if node.lock == expected_old_lease => {
                node.lock = new_lease;
                Ok(1)
            }
            Some(_) => Ok(0),
            None => Ok(0),
        }
    }

    async fn release_node_lock(&self, node_id: i64, expected_old_lease: i64) -> CoreResult<u64> {
        match self.nodes.get_mut(&node_id) {
            Some(mut node) if node.lock == expected_old_lease => {
                node.lock = 0;
                Ok(1)
            }
            Some(_) => Ok(0),
            None => Ok(0),
        }
    }

    async fn create_file(&self, uuid: &str, size: i64) -> CoreResult<File> {
        if self.files_by_uuid.contains_key(uuid) {
            return Err(CoreError::AlreadyExists);
        }
        let id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        let file = File {
            id,
            uuid: uuid.to_string(),
            state: FileState::Pending.as_i16(),
            size,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.files.insert(id, file.clone());
        self.files_by_uuid.insert(uuid.to_string(), id);
        Ok(file)
    }

    async fn update_file(&self, id: i64, state: i16, size: i64) -> CoreResult<File> {
        match self.files.get_mut(&id) {
            Some(mut file) => {
                file.state = state;
                file.size = size;
                Ok(file.clone())
            }
            None => Err(CoreError::NotFound),
        }
    }

    async fn get_file_by_uuid_and_state(&self, uuid: &str, state: i16) -> CoreResult<Option<File>> {
        Ok(self.files_by_uuid.get(uuid).and_then(|id| {
            self.files
                .get(&*id)
                .filter(|f| f.state == state)
                .map(|f| f.clone())
        }))
    }

    async fn get_not_synced_files(&self, node_id: i64) -> CoreResult<Vec<File>> {
        let owned: HashSet<i64> = self
            .node_files
            .iter()
            .filter(|entry| entry.key().0 == node_id)
            .map(|entry| entry.key().1)
            .collect();
        Ok(self
            .files
            .iter()
            .filter(|entry| entry.is_published() && !owned.contains(&entry.id))
            .map(|entry| entry.clone())
            .collect())
    }

    async fn get_live_nodes_with_file(
        &self,
        uuid: &str,
        state: i16,
        lease_strictly_greater_than: i64,
    ) -> CoreResult<Vec<Node>> {
        let Some(file_id) = self.files_by_uuid.get(uuid).map(|id| *id) else {
            return Ok(Vec::new());
        };
        let Some(file) = self.files.get(&file_id) else {
            return Ok(Vec::new());
        };
        if file.state != state {
            return Ok(Vec::new());
        }
        drop(file);

        let mut result = Vec::new();
        for entry in self.node_files.iter() {
            let (node_id, fid) = *entry.key();
            if fid != file_id {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                if node.lock > lease_strictly_greater_than {
                    result.push(node.clone());
                }
            }
        }
        Ok(result)
    }

    async fn add_file_to_node(&self, node_id: i64, file_id: i64) -> CoreResult<()> {
        if self.node_files.contains_key(&(node_id, file_id)) {
            return Err(CoreError::AlreadyExists);
        }
        self.node_files.insert((node_id, file_id), ());
        Ok(())
    }

    async fn ping(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_node_rejects_duplicate_name() {
        let gw = MemoryMetadataGateway::new();
        gw.create_node("n1").await.unwrap();
        let err = gw.create_node("n1").await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn take_lock_then_contended() {
        let gw = MemoryMetadataGateway::new();
        let node = gw.create_node("n1").await.unwrap();
        let rows = gw.take_node_lock(node.id, 100, 40).await.unwrap();
        assert_eq!(rows, 1);
        // Immediately contesting with a lower exclusive bound fails.
        let rows = gw.take_node_lock(node.id, 200, 40).await.unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn not_synced_excludes_owned_files() {
        let gw = MemoryMetadataGateway::new();
        let node = gw.create_node("n1").await.unwrap();
        let file = gw.create_file("11111111-1111-1111-1111-111111111111", 5).await.unwrap();
        gw.update_file(file.id, 1, 5).await.unwrap();

        let worklist = gw.get_not_synced_files(node.id).await.unwrap();
        assert_eq!(worklist.len(), 1);

        gw.add_file_to_node(node.id, file.id).await.unwrap();
        let worklist = gw.get_not_synced_files(node.id).await.unwrap();
        assert!(worklist.is_empty());
    }

    #[tokio::test]
    async fn live_nodes_with_file_excludes_stale_lease() {
        let gw = MemoryMetadataGateway::new();
        let node = gw.create_node("n1").await.unwrap();
        gw.take_node_lock(node.id, 1000, 0).await.unwrap();
        let file = gw.create_file("22222222-2222-2222-2222-222222222222", 5).await.unwrap();
        gw.update_file(file.id, 1, 5).await.unwrap();
        gw.add_file_to_node(node.id, file.id).await.unwrap();

        let live = gw
            .get_live_nodes_with_file(&file.uuid, 1, 999)
            .await
            .unwrap();
        assert_eq!(live.len(), 1);

        let live = gw
            .get_live_nodes_with_file(&file.uuid, 1, 1000)
            .await
            .unwrap();
        assert!(live.is_empty());
    }
}
