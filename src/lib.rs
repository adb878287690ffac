//! blobmesh: a horizontally-scaled, content-addressed file replication
//! cluster node.
//!
//! Each node advertises itself to the rest of the cluster through a shared
//! Postgres metadata store, holds a renewable lease asserting it is live,
//! stores blobs on its own local disk, and serves them to clients directly
//! or by proxying from whichever peer currently holds a copy.
//!
//! # Example
//!
//! ```no_run
//! use blobmesh::config::{Args, Config};
//! use blobmesh::supervisor::Supervisor;
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::try_from(Args::parse()).unwrap();
//!     // ... construct gateway/blob_store/lease/peer_client, then:
//!     // Supervisor::new(...).run().await.unwrap();
//!     let _ = config;
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod lease;
pub mod models;
pub mod peer;
pub mod pipeline;
pub mod request_id;
pub mod router;
pub mod server;
pub mod storage;
pub mod supervisor;
pub mod sync;

pub use config::{Args, Config};
pub use error::{CoreError, CoreResult};
pub use lease::LeaseManager;
pub use peer::PeerClient;
pub use server::HttpServer;
#[cfg(any(test, feature = "test-support"))]
pub use storage::MemoryMetadataGateway;
pub use storage::{BlobStore, MetadataGateway, PgMetadataGateway};
pub use supervisor::Supervisor;
