//! Task synchronization and organization engine for FlowerTask.
//! This crate owns the task list invariants; hosts only render and forward
//! user intents.

pub mod config;
pub mod logging;
pub mod model;
pub mod remote;
pub mod service;
pub mod store;
pub mod view;

pub use config::{ConfigError, EngineConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::task::{DocumentError, DocumentFields, EpochMs, Task, TaskFields, TaskId};
pub use remote::{
    InMemoryRemoteStore, RemoteDocument, RemoteError, RemoteEvent, RemoteEventKind, RemoteResult,
    RemoteTaskStore, SnapshotSink, SqliteRemoteStore, SubscriptionHandle,
};
pub use service::todo_service::TodoListService;
pub use service::undo_buffer::{UndoBuffer, UndoTicket, DEFAULT_UNDO_TIMEOUT};
pub use store::{StoreChange, StoreSnapshot, TaskNode, TaskStore, TaskStoreError};
pub use view::{filtered_and_sorted, partition_upcoming, SectionedTasks, TaskFilter, TaskSort};

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
