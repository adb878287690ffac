//! Domain types for the `node`, `file`, and `node_file` relations.

use serde::{Deserialize, Serialize};

/// A cluster member, as stored in the `node` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub advertise_addr: String,
    /// Lease timestamp, epoch seconds. `0` means the node holds no lease.
    pub lock: i64,
}

/// A blob's metadata, as stored in the `file` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum FileState {
    Pending = 0,
    Published = 1,
}

impl FileState {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            0 => Some(FileState::Pending),
            1 => Some(FileState::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub uuid: String,
    pub state: i16,
    pub size: i64,
    pub created_at: i64,
}

impl File {
    pub fn is_published(&self) -> bool {
        FileState::from_i16(self.state) == Some(FileState::Published)
    }
}

/// Raw row shape fetched from Postgres (sqlx needs a concrete struct to
/// derive `FromRow` on; `File` above is kept free of the derive so it can
/// also be constructed by the in-memory gateway without a `sqlx` dependency
/// leaking into test code).
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FileRow {
    pub id: i64,
    pub uuid: String,
    pub state: i16,
    pub size: i64,
    pub created_at: i64,
}

impl From<FileRow> for File {
    fn from(row: FileRow) -> Self {
        File {
            id: row.id,
            uuid: row.uuid,
            state: row.state,
            size: row.size,
            created_at: row.created_at,
        }
    }
}
