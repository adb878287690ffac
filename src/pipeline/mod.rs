//! Upload and download pipelines: the orchestration glue between the
//! metadata gateway, local blob store, and peer client.

mod download;
mod upload;

pub use download::*;
pub use upload::*;
