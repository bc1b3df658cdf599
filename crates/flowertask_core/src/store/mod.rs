//! Task collection store.
//!
//! # Responsibility
//! - Hold the authoritative in-memory task collection for one owner.
//! - Apply remote snapshots and rebuild the parent/subtask hierarchy.
//! - Forward mutations to the remote collection.
//!
//! # Invariants
//! - Each task lives once in a flat arena keyed by id.
//! - Top-level order is an id list; subtasks are derived by `parent_id`.

pub mod error;
pub mod task_store;

pub use error::TaskStoreError;
pub use task_store::{StoreChange, StoreSnapshot, TaskNode, TaskStore};
