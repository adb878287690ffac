//! Local blob store: a content-addressed directory tree on disk.
//!
//! Blobs live under `<workdir>/files/<uuid[0]>/<uuid[1]>/<uuid>`. Uploads are
//! staged in `<workdir>/tmpfiles/<uuid>` and atomically renamed into place;
//! removals are renamed into `<workdir>/removedfiles/<uuid>` rather than
//! unlinked outright, mirroring the trash-directory design of the reference
//! storage layer.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::lease::LeaseManager;

const FAN_OUT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Local, durable store for published blob content.
///
/// The `mutex` only guards the rename step of publish/remove: the bulk of
/// the write (streaming the body to the temp file) happens without holding
/// it, so concurrent uploads of different blobs never block each other. It
/// is an async mutex since the rename itself is an `.await`.
pub struct BlobStore {
    datadir: PathBuf,
    tmpdir: PathBuf,
    trashdir: PathBuf,
    rename_lock: Mutex<()>,
}

impl BlobStore {
    /// Creates the `files/`, `tmpfiles/`, and `removedfiles/` directories
    /// (including the two-level fan-out under `files/`) rooted at `workdir`.
    pub async fn open(workdir: &Path) -> CoreResult<Self> {
        fs::create_dir_all(workdir)
            .await
            .map_err(|e| CoreError::Io(e.to_string()))?;

        let datadir = workdir.join("files");
        let tmpdir = workdir.join("tmpfiles");
        let trashdir = workdir.join("removedfiles");

        mkdir_idempotent(&tmpdir).await?;
        mkdir_idempotent(&trashdir).await?;
        mkdir_idempotent(&datadir).await?;

        for c in FAN_OUT_ALPHABET.chars() {
            let first = datadir.join(c.to_string());
            mkdir_idempotent(&first).await?;
            for cc in FAN_OUT_ALPHABET.chars() {
                mkdir_idempotent(&first.join(cc.to_string())).await?;
            }
        }

        Ok(Self {
            datadir,
            tmpdir,
            trashdir,
            rename_lock: Mutex::new(()),
        })
    }

    /// Writes `data` for `uuid`, publishing it atomically.
    ///
    /// Fails with [`CoreError::AlreadyExists`] if a blob already occupies
    /// `uuid` — the temp file is written first and only renamed into place
    /// once, under the rename lock, the destination is confirmed absent.
    /// Fails with [`CoreError::LeaseExpired`] if this node's lease is no
    /// longer fresh at the moment of publish, even if the write itself
    /// succeeded against the temp file — a stale node must not let readers
    /// observe a blob it is no longer authorized to serve.
    pub async fn write(&self, uuid: &str, data: &[u8], lease: &LeaseManager) -> CoreResult<()> {
        let path = self.path(uuid);
        if fs::metadata(&path).await.is_ok() {
            return Err(CoreError::AlreadyExists);
        }

        let tmp_path = self.tmp_path(uuid);
        let mut tmp = open_create_new(&tmp_path).await?;
        let mut writer = BufWriter::new(&mut tmp);
        writer.write_all(data).await.map_err(|e| CoreError::Io(e.to_string()))?;
        writer.flush().await.map_err(|e| CoreError::Io(e.to_string()))?;
        drop(writer);
        tmp.sync_all().await.map_err(|e| CoreError::Io(e.to_string()))?;
        drop(tmp);

        let _guard = self.rename_lock.lock().await;
        if !lease.is_fresh() {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CoreError::LeaseExpired);
        }
        if fs::metadata(&path).await.is_ok() {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CoreError::AlreadyExists);
        }
        fs::rename(&tmp_path, &path).await.map_err(CoreError::from)
    }

    /// Reads the full content of a published blob.
    pub async fn read(&self, uuid: &str) -> CoreResult<Vec<u8>> {
        fs::read(self.path(uuid)).await.map_err(CoreError::from)
    }

    /// Returns the on-disk size of a published blob.
    pub async fn size(&self, uuid: &str) -> CoreResult<u64> {
        let meta = fs::metadata(self.path(uuid)).await.map_err(CoreError::from)?;
        Ok(meta.len())
    }

    /// True if a blob file exists for `uuid`.
    pub async fn exists(&self, uuid: &str) -> bool {
        fs::metadata(self.path(uuid)).await.is_ok()
    }

    /// Moves a published blob into the trash directory. Idempotent: a
    /// missing blob is treated as already-removed, not an error.
    pub async fn remove(&self, uuid: &str) -> CoreResult<()> {
        let path = self.path(uuid);
        if fs::metadata(&path).await.is_err() {
            return Ok(());
        }
        let trash_path = self.trash_path(uuid);

        let _guard = self.rename_lock.lock().await;
        if fs::metadata(&trash_path).await.is_ok() {
            return Err(CoreError::AlreadyExists);
        }
        fs::rename(&path, &trash_path).await.map_err(CoreError::from)
    }

    fn path(&self, uuid: &str) -> PathBuf {
        fan_out(&self.datadir, uuid)
    }

    fn tmp_path(&self, uuid: &str) -> PathBuf {
        self.tmpdir.join(uuid)
    }

    fn trash_path(&self, uuid: &str) -> PathBuf {
        self.trashdir.join(uuid)
    }
}

/// `<root>/<uuid[0]>/<uuid[1]>/<uuid>`, matching the two-level fan-out the
/// directory tree was pre-created with.
fn fan_out(root: &Path, uuid: &str) -> PathBuf {
    let mut chars = uuid.chars();
    let first = chars.next().unwrap_or('_');
    let second = chars.next().unwrap_or('_');
    root.join(first.to_string()).join(second.to_string()).join(uuid)
}

async fn mkdir_idempotent(path: &Path) -> CoreResult<()> {
    match fs::create_dir(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(CoreError::Io(e.to_string())),
    }
}

async fn open_create_new(path: &Path) -> CoreResult<File> {
    tokio::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .await
        .map_err(CoreError::from)
}

/// Generates a fresh random blob identifier for an upload.
pub fn new_blob_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Validates that `s` parses as a UUID, without allocating a new one.
pub fn parse_blob_uuid(s: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(s).map_err(|_| CoreError::InvalidArgument(format!("invalid uuid: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (BlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        (store, dir)
    }

    async fn fresh_lease() -> LeaseManager {
        let gateway: std::sync::Arc<dyn crate::storage::MetadataGateway> =
            std::sync::Arc::new(crate::storage::MemoryMetadataGateway::new());
        let node = gateway.create_node("n1").await.unwrap();
        let lease = LeaseManager::new(node.id, gateway);
        lease.take().await.unwrap();
        lease
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (store, _dir) = store().await;
        let lease = fresh_lease().await;
        let uuid = new_blob_uuid();
        store.write(&uuid, b"hello", &lease).await.unwrap();
        assert!(store.exists(&uuid).await);
        assert_eq!(store.read(&uuid).await.unwrap(), b"hello");
        assert_eq!(store.size(&uuid).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn write_twice_rejects_second() {
        let (store, _dir) = store().await;
        let lease = fresh_lease().await;
        let uuid = new_blob_uuid();
        store.write(&uuid, b"first", &lease).await.unwrap();
        let err = store.write(&uuid, b"second", &lease).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn write_with_expired_lease_fails() {
        let (store, _dir) = store().await;
        let lease = fresh_lease().await;
        lease.release().await.unwrap();
        let uuid = new_blob_uuid();
        let err = store.write(&uuid, b"data", &lease).await.unwrap_err();
        assert!(matches!(err, CoreError::LeaseExpired));
        assert!(!store.exists(&uuid).await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (store, _dir) = store().await;
        let lease = fresh_lease().await;
        let uuid = new_blob_uuid();
        store.write(&uuid, b"data", &lease).await.unwrap();
        store.remove(&uuid).await.unwrap();
        assert!(!store.exists(&uuid).await);
        store.remove(&uuid).await.unwrap();
    }

    #[tokio::test]
    async fn read_missing_blob_errors() {
        let (store, _dir) = store().await;
        let err = store.read("does-not-exist").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }
}
