//! Storage layer: the local blob store and the metadata gateway.

mod blob_store;
mod metadata;
#[cfg(any(test, feature = "test-support"))]
mod metadata_memory;
mod metadata_pg;

pub use blob_store::*;
pub use metadata::*;
#[cfg(any(test, feature = "test-support"))]
pub use metadata_memory::*;
pub use metadata_pg::*;
