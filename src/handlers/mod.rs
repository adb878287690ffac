//! HTTP handlers for the external and internal file endpoints.

mod external;
mod internal;

pub use external::*;
pub use internal::*;
