//! Read-only query surface
//!
//! Exposes point lookups, the index primitives and the projections as a
//! closed set of serde-tagged requests, for agents and tools that must never
//! mutate the store.

mod request;
mod surface;
mod types;

pub use request::{is_write_op, QueryRequest, WRITE_OPS};
pub use surface::QuerySurface;
pub use types::QueryResponse;
