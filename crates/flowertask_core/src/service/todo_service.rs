//! Task list use-case service.
//!
//! # Responsibility
//! - Pair the collection store with the undo buffer for delete/undo flows.
//! - Keep the selected filter and sort for the list screen.
//!
//! # Invariants
//! - Undo always restores through `TaskStore::restore_task`.
//! - Only the most recent delete is undoable.

use crate::config::EngineConfig;
use crate::model::task::{EpochMs, Task};
use crate::service::undo_buffer::{UndoBuffer, UndoTicket};
use crate::store::task_store::TaskStore;
use crate::view::projection::{partition_upcoming, SectionedTasks, TaskFilter, TaskSort};
use log::info;
use std::time::Instant;

pub struct TodoListService {
    store: TaskStore,
    undo: UndoBuffer,
    filter: TaskFilter,
    sort: TaskSort,
}

impl TodoListService {
    pub fn new(store: TaskStore, config: &EngineConfig) -> Self {
        Self {
            store,
            undo: UndoBuffer::new(config.undo_timeout()),
            filter: config.default_filter,
            sort: config.default_sort,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TaskStore {
        &mut self.store
    }

    pub fn filter(&self) -> TaskFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
    }

    pub fn sort(&self) -> TaskSort {
        self.sort
    }

    pub fn set_sort(&mut self, sort: TaskSort) {
        self.sort = sort;
    }

    /// Top-level tasks under the selected filter and sort.
    pub fn visible_tasks(&self, now: EpochMs) -> Vec<Task> {
        self.store.filtered_and_sorted(self.filter, self.sort, now)
    }

    /// Visible tasks split into upcoming and main sections.
    pub fn sectioned_tasks(&self, now: EpochMs) -> SectionedTasks {
        partition_upcoming(self.visible_tasks(now), now)
    }

    /// Deletes a task and keeps it undoable until the configured timeout.
    ///
    /// Returns the expiry ticket for hosts that schedule their own timer.
    pub fn delete_with_undo(&mut self, task_id: &str, now: Instant) -> Option<UndoTicket> {
        let removed = self.store.delete_task(task_id)?;
        if let Some(previous) = self.undo.pending() {
            info!(
                "event=undo_capture module=service status=ok discarded_task_id={}",
                previous.id
            );
        }
        Some(self.undo.capture(removed, now))
    }

    /// Restores the buffered task. Returns `false` when nothing was pending.
    pub fn undo_delete(&mut self) -> bool {
        match self.undo.take() {
            Some(task) => {
                self.store.restore_task(&task);
                info!(
                    "event=undo_restore module=service status=ok task_id={}",
                    task.id
                );
                true
            }
            None => false,
        }
    }

    pub fn dismiss_undo(&mut self) {
        self.undo.dismiss();
    }

    /// Expires the undo slot when its deadline passed.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.undo.expire_due(now)
    }

    /// Fires a host-scheduled expiry for `ticket`.
    pub fn expire_undo(&mut self, ticket: UndoTicket) -> bool {
        self.undo.expire(ticket)
    }

    pub fn undo_visible(&self) -> bool {
        self.undo.is_visible()
    }

    pub fn pending_undo(&self) -> Option<&Task> {
        self.undo.pending()
    }
}
