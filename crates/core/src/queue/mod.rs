//! Work items and the ordered queue they live in.

mod store;
mod types;

pub use store::QueueStore;
pub use types::{ItemId, ItemPatch, ItemStatus, ProgressSnapshot, QueueCounts, WorkItem};
