//! Task domain model.
//!
//! # Responsibility
//! - Define the task record and its persisted document shape.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - The remote collection stores tasks flat; hierarchy is rebuilt from
//!   `parent_id` on every snapshot.

pub mod task;
