//! Live task collection synchronized with a remote owner collection.
//!
//! # Responsibility
//! - Own the flat task arena, the top-level order list and the subtask list.
//! - Replace the collection on every remote snapshot and rebuild hierarchy.
//! - Issue fire-and-forget remote writes for every mutation.
//!
//! # Invariants
//! - A task id is either in `top_level` or in `subtasks`, never both.
//! - Every id in `subtasks` has a parent present in `top_level`.
//! - After `move_task`, top-level `order` values equal their indices.
//! - Only delete, restore, move and hierarchy changes touch memory before
//!   the snapshot round-trip; edits and toggles wait for the next snapshot.
//! - Events from a replaced subscription are ignored.

use crate::model::task::{
    now_ms, single_field, EpochMs, Task, TaskFields, TaskId, FIELD_IS_COMPLETED,
    FIELD_IS_STARRED,
};
use crate::remote::{
    RemoteDocument, RemoteEvent, RemoteEventKind, RemoteTaskStore, SnapshotSink,
    SubscriptionHandle,
};
use crate::store::error::TaskStoreError;
use crate::view::projection::{filtered_and_sorted, TaskFilter, TaskSort};
use chrono::{Local, NaiveDate, TimeZone};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Change notification published to `watch()` receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    LoadingChanged(bool),
    TasksReplaced { top_level: usize, subtasks: usize },
    TaskRemoved(TaskId),
    TaskRestored(TaskId),
    Reordered,
    HierarchyChanged,
    SessionChanged,
    Error(TaskStoreError),
}

/// Top-level task with its derived subtasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNode {
    pub task: Task,
    pub subtasks: Vec<Task>,
}

/// Point-in-time copy of observable store state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub tasks: Vec<TaskNode>,
    pub is_loading: bool,
    pub last_error: Option<TaskStoreError>,
}

struct ActiveSubscription {
    id: u64,
    handle: SubscriptionHandle,
}

/// Authoritative in-memory task collection for one owner.
pub struct TaskStore {
    remote: Arc<dyn RemoteTaskStore>,
    owner_id: Option<String>,
    tasks: HashMap<TaskId, Task>,
    top_level: Vec<TaskId>,
    subtasks: Vec<TaskId>,
    is_loading: bool,
    last_error: Option<TaskStoreError>,
    events_tx: Sender<RemoteEvent>,
    events_rx: Receiver<RemoteEvent>,
    subscription: Option<ActiveSubscription>,
    next_subscription_id: u64,
    observers: Vec<Sender<StoreChange>>,
}

impl TaskStore {
    /// Creates an empty store without a session.
    pub fn new(remote: Arc<dyn RemoteTaskStore>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            remote,
            owner_id: None,
            tasks: HashMap::new(),
            top_level: Vec::new(),
            subtasks: Vec::new(),
            is_loading: false,
            last_error: None,
            events_tx,
            events_rx,
            subscription: None,
            next_subscription_id: 0,
            observers: Vec::new(),
        }
    }

    /// Creates an empty store bound to `owner_id`.
    pub fn with_owner(remote: Arc<dyn RemoteTaskStore>, owner_id: impl Into<String>) -> Self {
        let mut store = Self::new(remote);
        store.owner_id = Some(owner_id.into());
        store
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    /// Switches the session owner.
    ///
    /// A different owner tears down the subscription and clears memory; the
    /// caller subscribes again when ready.
    pub fn set_owner(&mut self, owner_id: Option<String>) {
        if self.owner_id == owner_id {
            return;
        }
        self.teardown_subscription();
        self.tasks.clear();
        self.top_level.clear();
        self.subtasks.clear();
        self.last_error = None;
        self.owner_id = owner_id;
        self.set_loading(false);
        info!(
            "event=session_change module=store status=ok has_owner={}",
            self.owner_id.is_some()
        );
        self.notify(StoreChange::SessionChanged);
    }

    /// Sign-out path: drops the owner, the subscription and every task.
    pub fn clear_session(&mut self) {
        self.set_owner(None);
    }

    /// Registers a change observer. Dropped receivers are pruned lazily.
    pub fn watch(&mut self) -> Receiver<StoreChange> {
        let (tx, rx) = mpsc::channel();
        self.observers.push(tx);
        rx
    }

    /// Opens the live owner subscription, replacing any previous one.
    pub fn subscribe(&mut self) {
        self.teardown_subscription();
        let Some(owner_id) = self.owner_id.clone() else {
            self.set_loading(false);
            debug!("event=store_subscribe module=store status=skip reason=no_active_session");
            return;
        };

        self.next_subscription_id += 1;
        let subscription_id = self.next_subscription_id;
        self.set_loading(true);

        let sink = SnapshotSink::new(subscription_id, self.events_tx.clone());
        match self.remote.subscribe_tasks(&owner_id, sink) {
            Ok(handle) => {
                info!(
                    "event=store_subscribe module=store status=ok subscription_id={subscription_id}"
                );
                self.subscription = Some(ActiveSubscription {
                    id: subscription_id,
                    handle,
                });
            }
            Err(err) => {
                self.set_loading(false);
                self.report(TaskStoreError::SubscriptionFailure(err));
            }
        }
    }

    /// Applies queued remote events in delivery order.
    ///
    /// Returns the number of events applied; stale events are not counted.
    pub fn process_remote_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            let active_id = self.subscription.as_ref().map(|active| active.id);
            if active_id != Some(event.subscription_id) {
                debug!(
                    "event=store_event module=store status=skip reason=stale_subscription subscription_id={}",
                    event.subscription_id
                );
                continue;
            }

            match event.kind {
                RemoteEventKind::Snapshot(documents) => self.apply_snapshot(documents),
                RemoteEventKind::Failed(err) => {
                    self.set_loading(false);
                    self.report(TaskStoreError::SubscriptionFailure(err));
                }
            }
            applied += 1;
        }
        applied
    }

    /// Partitions the arena into top-level tasks and attached subtasks.
    ///
    /// Top-level tasks are stably sorted by `order`. Subtasks whose parent is
    /// not top-level are dropped from memory.
    pub fn reorganize_hierarchy(&mut self) {
        let ordered = std::mem::take(&mut self.top_level)
            .into_iter()
            .chain(std::mem::take(&mut self.subtasks));

        let mut seen = HashSet::new();
        let mut roots = Vec::new();
        let mut children = Vec::new();
        for id in ordered {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.tasks.get(&id) {
                Some(task) if task.is_top_level() => roots.push(id),
                Some(_) => children.push(id),
                None => {}
            }
        }
        roots.sort_by_key(|id| self.tasks.get(id).map_or(i64::MAX, |task| task.order));

        let root_set = roots.iter().cloned().collect::<HashSet<_>>();
        let mut orphans = 0usize;
        for id in children {
            let attached = self
                .tasks
                .get(&id)
                .and_then(|task| task.parent_id.as_ref())
                .is_some_and(|parent_id| root_set.contains(parent_id));
            if attached {
                self.subtasks.push(id);
            } else {
                self.tasks.remove(&id);
                orphans += 1;
            }
        }
        self.top_level = roots;

        if orphans > 0 {
            debug!("event=store_reorganize module=store status=ok dropped_orphans={orphans}");
        }
    }

    /// Creates a task remotely; it appears locally with the next snapshot.
    ///
    /// Returns the created document id when the write succeeded.
    pub fn add_task(
        &mut self,
        title: impl Into<String>,
        description: Option<String>,
        due_date: Option<EpochMs>,
        is_starred: bool,
    ) -> Option<TaskId> {
        let owner_id = self.require_owner("add_task")?;
        let fields = TaskFields {
            title: title.into(),
            description,
            due_date,
            is_completed: false,
            created: now_ms(),
            is_starred,
            parent_id: None,
            order: self.top_level.len() as i64,
        };

        match self.remote.create_task(&owner_id, fields.into_document()) {
            Ok(task_id) => {
                info!("event=task_add module=store status=ok task_id={task_id}");
                Some(task_id)
            }
            Err(err) => {
                self.report_write("add_task", err);
                None
            }
        }
    }

    /// Writes edited fields; `order` and `parent_id` are left untouched.
    pub fn update_task(&mut self, task: &Task) {
        if let Some(owner_id) = self.require_owner("update_task") {
            let result = self
                .remote
                .update_task_fields(&owner_id, &task.id, task.edit_document());
            if let Err(err) = result {
                self.report_write("update_task", err);
            }
        }
    }

    /// Flips completion remotely without touching memory.
    pub fn toggle_complete(&mut self, task: &Task) {
        self.write_flag("toggle_complete", task, FIELD_IS_COMPLETED, !task.is_completed);
    }

    /// Flips the star remotely without touching memory.
    pub fn toggle_star(&mut self, task: &Task) {
        self.write_flag("toggle_star", task, FIELD_IS_STARRED, !task.is_starred);
    }

    /// Deletes remotely and removes from memory immediately.
    ///
    /// Subtasks of a removed top-level task leave memory with it; their
    /// documents stay remote and reattach if the parent is restored.
    pub fn delete_task(&mut self, task_id: &str) -> Option<Task> {
        let owner_id = self.require_owner("delete_task")?;
        if let Err(err) = self.remote.delete_task(&owner_id, task_id) {
            self.report_write("delete_task", err);
        }

        let removed = self.remove_local(task_id)?;
        info!("event=task_delete module=store status=ok task_id={task_id}");
        self.notify(StoreChange::TaskRemoved(removed.id.clone()));
        Some(removed)
    }

    /// Recreates the full document and re-inserts the task when missing.
    pub fn restore_task(&mut self, task: &Task) {
        let Some(owner_id) = self.require_owner("restore_task") else {
            return;
        };
        if let Err(err) = self
            .remote
            .set_task(&owner_id, &task.id, task.to_document())
        {
            self.report_write("restore_task", err);
        }
        if self.tasks.contains_key(&task.id) {
            return;
        }

        match &task.parent_id {
            None => {
                let position = self
                    .top_level
                    .iter()
                    .position(|id| {
                        self.tasks
                            .get(id)
                            .is_some_and(|existing| existing.order > task.order)
                    })
                    .unwrap_or(self.top_level.len());
                self.top_level.insert(position, task.id.clone());
            }
            Some(parent_id) => {
                if !self.top_level.contains(parent_id) {
                    debug!(
                        "event=task_restore module=store status=skip reason=parent_missing task_id={}",
                        task.id
                    );
                    return;
                }
                self.subtasks.push(task.id.clone());
            }
        }
        self.tasks.insert(task.id.clone(), task.clone());
        info!("event=task_restore module=store status=ok task_id={}", task.id);
        self.notify(StoreChange::TaskRestored(task.id.clone()));
    }

    /// Moves one top-level task and renumbers every top-level `order`.
    ///
    /// Out-of-bounds sources and equal indices are no-ops; the destination
    /// clamps to the last index.
    pub fn move_task(&mut self, source: usize, destination: usize) {
        let len = self.top_level.len();
        if source >= len || source == destination {
            return;
        }
        let destination = destination.min(len - 1);
        if source == destination {
            return;
        }
        let Some(owner_id) = self.require_owner("move_task") else {
            return;
        };

        let id = self.top_level.remove(source);
        self.top_level.insert(destination, id);
        self.renumber_top_level();
        self.notify(StoreChange::Reordered);

        let writes = self
            .top_level
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .map(|task| (task.id.clone(), task.to_document()))
            .collect::<Vec<_>>();
        let write_count = writes.len();
        match self.remote.batch_set_tasks(&owner_id, writes) {
            Ok(()) => debug!(
                "event=task_move module=store status=ok source={source} destination={destination} writes={write_count}"
            ),
            Err(err) => self.report_write("move_task", err),
        }
    }

    /// Nests `child_id` under the top-level task `parent_id`.
    pub fn make_subtask(&mut self, parent_id: &str, child_id: &str) {
        let Some(owner_id) = self.require_owner("make_subtask") else {
            return;
        };
        if let Err(err) = self.check_make_subtask(parent_id, child_id) {
            self.report(err);
            return;
        }
        let already_nested = self
            .tasks
            .get(child_id)
            .is_some_and(|child| child.parent_id.as_deref() == Some(parent_id));
        if already_nested {
            return;
        }

        self.top_level.retain(|id| id != child_id);
        self.subtasks.retain(|id| id != child_id);
        self.subtasks.push(child_id.to_string());
        if let Some(child) = self.tasks.get_mut(child_id) {
            child.parent_id = Some(parent_id.to_string());
        }

        info!("event=task_nest module=store status=ok task_id={child_id} parent_id={parent_id}");
        self.notify(StoreChange::HierarchyChanged);
        self.persist_all(&owner_id, "make_subtask");
    }

    /// Promotes a subtask to the end of the top-level list.
    pub fn remove_subtask(&mut self, task_id: &str) {
        let Some(owner_id) = self.require_owner("remove_subtask") else {
            return;
        };
        if !self.subtasks.iter().any(|id| id == task_id) {
            self.report(TaskStoreError::InvalidHierarchy {
                task_id: task_id.to_string(),
                reason: "task is not a subtask",
            });
            return;
        }

        let next_order = self
            .top_level
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .map(|task| task.order.saturating_add(1))
            .max()
            .unwrap_or(0);
        self.subtasks.retain(|id| id != task_id);
        self.top_level.push(task_id.to_string());
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.parent_id = None;
            task.order = next_order;
        }

        info!("event=task_unnest module=store status=ok task_id={task_id}");
        self.notify(StoreChange::HierarchyChanged);
        self.persist_all(&owner_id, "remove_subtask");
    }

    /// Top-level tasks due on `date` in time zone `tz`.
    pub fn tasks_for_date<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Vec<&Task> {
        self.top_level_tasks()
            .into_iter()
            .filter(|task| {
                task.due_date
                    .and_then(|due| tz.timestamp_millis_opt(due).single())
                    .is_some_and(|due| due.date_naive() == date)
            })
            .collect()
    }

    /// Top-level tasks due on `date` in the system local time zone.
    pub fn tasks_for_local_date(&self, date: NaiveDate) -> Vec<&Task> {
        self.tasks_for_date(date, &Local)
    }

    /// Top-level tasks in presentation order.
    pub fn top_level_tasks(&self) -> Vec<&Task> {
        self.top_level
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Subtasks attached to `parent_id`, in arrival order.
    pub fn subtasks_of(&self, parent_id: &str) -> Vec<&Task> {
        self.subtasks
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|task| task.parent_id.as_deref() == Some(parent_id))
            .collect()
    }

    /// Owned hierarchy read model.
    pub fn hierarchy(&self) -> Vec<TaskNode> {
        self.top_level_tasks()
            .into_iter()
            .map(|task| TaskNode {
                task: task.clone(),
                subtasks: self.subtasks_of(&task.id).into_iter().cloned().collect(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            tasks: self.hierarchy(),
            is_loading: self.is_loading,
            last_error: self.last_error.clone(),
        }
    }

    /// Filter + sort projection over the top-level tasks.
    pub fn filtered_and_sorted(&self, filter: TaskFilter, sort: TaskSort, now: EpochMs) -> Vec<Task> {
        filtered_and_sorted(self.top_level_tasks(), filter, sort, now)
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn last_error(&self) -> Option<&TaskStoreError> {
        self.last_error.as_ref()
    }

    /// Number of top-level tasks.
    pub fn len(&self) -> usize {
        self.top_level.len()
    }

    pub fn is_empty(&self) -> bool {
        self.top_level.is_empty()
    }

    fn apply_snapshot(&mut self, documents: Vec<RemoteDocument>) {
        let received = documents.len();
        let mut skipped = 0usize;

        self.tasks.clear();
        self.subtasks.clear();
        self.top_level.clear();
        for document in documents {
            match Task::from_document(&document.id, &document.fields) {
                Ok(task) => {
                    if self.tasks.insert(task.id.clone(), task).is_none() {
                        self.top_level.push(document.id);
                    }
                }
                Err(err) => {
                    skipped += 1;
                    let malformed = TaskStoreError::MalformedDocument {
                        document_id: document.id,
                        reason: err.to_string(),
                    };
                    warn!("event=store_snapshot module=store status=skip error={malformed}");
                }
            }
        }
        self.reorganize_hierarchy();
        self.set_loading(false);

        info!(
            "event=store_snapshot module=store status=ok received={received} skipped={skipped} top_level={} subtasks={}",
            self.top_level.len(),
            self.subtasks.len()
        );
        self.notify(StoreChange::TasksReplaced {
            top_level: self.top_level.len(),
            subtasks: self.subtasks.len(),
        });
    }

    fn check_make_subtask(&self, parent_id: &str, child_id: &str) -> Result<(), TaskStoreError> {
        let invalid = |reason| TaskStoreError::InvalidHierarchy {
            task_id: child_id.to_string(),
            reason,
        };
        if parent_id == child_id {
            return Err(invalid("task cannot be its own parent"));
        }
        if !self.tasks.contains_key(child_id) {
            return Err(invalid("task not found"));
        }
        if !self.top_level.iter().any(|id| id == parent_id) {
            return Err(invalid("parent is not a top-level task"));
        }
        if !self.subtasks_of(child_id).is_empty() {
            return Err(invalid("task has subtasks of its own"));
        }
        Ok(())
    }

    fn remove_local(&mut self, task_id: &str) -> Option<Task> {
        let removed = self.tasks.remove(task_id)?;
        if removed.is_top_level() {
            self.top_level.retain(|id| id != task_id);
            let tasks = &mut self.tasks;
            self.subtasks.retain(|id| {
                let attached = tasks
                    .get(id)
                    .is_some_and(|task| task.parent_id.as_deref() == Some(task_id));
                if attached {
                    tasks.remove(id);
                }
                !attached
            });
        } else {
            self.subtasks.retain(|id| id != task_id);
        }
        Some(removed)
    }

    fn renumber_top_level(&mut self) {
        for (index, id) in self.top_level.iter().enumerate() {
            if let Some(task) = self.tasks.get_mut(id) {
                task.order = index as i64;
            }
        }
    }

    fn persist_all(&mut self, owner_id: &str, operation: &'static str) {
        let writes = self
            .top_level
            .iter()
            .chain(self.subtasks.iter())
            .filter_map(|id| self.tasks.get(id))
            .map(|task| (task.id.clone(), task.to_document()))
            .collect::<Vec<_>>();
        if let Err(err) = self.remote.batch_set_tasks(owner_id, writes) {
            self.report_write(operation, err);
        }
    }

    fn write_flag(&mut self, operation: &'static str, task: &Task, field: &str, value: bool) {
        let Some(owner_id) = self.require_owner(operation) else {
            return;
        };
        let result = self
            .remote
            .update_task_fields(&owner_id, &task.id, single_field(field, value));
        match result {
            Ok(()) => debug!(
                "event={operation} module=store status=ok task_id={} value={value}",
                task.id
            ),
            Err(err) => self.report_write(operation, err),
        }
    }

    fn require_owner(&self, operation: &'static str) -> Option<String> {
        if self.owner_id.is_none() {
            debug!(
                "event={operation} module=store status=skip error={}",
                TaskStoreError::NoActiveSession
            );
        }
        self.owner_id.clone()
    }

    fn report_write(&mut self, operation: &'static str, source: crate::remote::RemoteError) {
        self.report(TaskStoreError::WriteFailure { operation, source });
    }

    fn report(&mut self, err: TaskStoreError) {
        match &err {
            TaskStoreError::SubscriptionFailure(_) => {
                error!("event=store_error module=store status=error error={err}")
            }
            _ => warn!("event=store_error module=store status=error error={err}"),
        }
        self.last_error = Some(err.clone());
        self.notify(StoreChange::Error(err));
    }

    fn set_loading(&mut self, is_loading: bool) {
        if self.is_loading != is_loading {
            self.is_loading = is_loading;
            self.notify(StoreChange::LoadingChanged(is_loading));
        }
    }

    fn notify(&mut self, change: StoreChange) {
        self.observers
            .retain(|observer| observer.send(change.clone()).is_ok());
    }

    fn teardown_subscription(&mut self) {
        if let Some(active) = self.subscription.take() {
            self.remote.unsubscribe(active.handle);
            debug!(
                "event=store_unsubscribe module=store status=ok subscription_id={}",
                active.id
            );
        }
    }
}

impl Drop for TaskStore {
    fn drop(&mut self) {
        self.teardown_subscription();
    }
}
