//! Read-side projections over the task collection.

pub mod projection;

pub use projection::{filtered_and_sorted, partition_upcoming, SectionedTasks, TaskFilter, TaskSort};
