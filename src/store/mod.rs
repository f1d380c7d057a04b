//! The entity store: write engine, read views and membership enforcement

mod cascade;
mod changeset;
mod consistency;
mod engine;
mod error;
mod snapshot;
mod state;
mod validate;

#[cfg(test)]
mod tests;

pub use changeset::{ChangeSet, Op};
pub use engine::Palimpsest;
pub use error::{StoreError, StoreResult};
pub use snapshot::{IntegrityIssue, Snapshot, StoreStats};
pub use validate::YEAR_RANGE;

pub(crate) use state::State;
