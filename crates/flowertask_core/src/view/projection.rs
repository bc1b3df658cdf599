//! Filter, sort and section projection over top-level tasks.
//!
//! # Invariants
//! - Projections never mutate their input and are recomputed on every read.
//! - Sorting is stable: equal keys keep input order.
//! - Tasks without a due date always sort after dated tasks.

use crate::model::task::{EpochMs, Task};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Completion/due-date filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskFilter {
    #[default]
    All,
    /// Not completed and not yet due.
    Pending,
    Completed,
    /// Not completed and past due.
    Overdue,
}

impl TaskFilter {
    pub fn matches(self, task: &Task, now: EpochMs) -> bool {
        match self {
            Self::All => true,
            Self::Pending => !task.is_completed && task.due_date.map_or(true, |due| due >= now),
            Self::Completed => task.is_completed,
            Self::Overdue => !task.is_completed && task.due_date.map_or(false, |due| due < now),
        }
    }
}

/// Presentation order. `None` means the manual order key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskSort {
    #[default]
    None,
    CreatedAsc,
    CreatedDesc,
    DueDateAsc,
    DueDateDesc,
}

/// Upcoming tasks first, everything else in `main`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionedTasks {
    pub upcoming: Vec<Task>,
    pub main: Vec<Task>,
}

/// Filters then stably sorts `items`.
pub fn filtered_and_sorted<'a>(
    items: impl IntoIterator<Item = &'a Task>,
    filter: TaskFilter,
    sort: TaskSort,
    now: EpochMs,
) -> Vec<Task> {
    let mut selected = items
        .into_iter()
        .filter(|task| filter.matches(task, now))
        .cloned()
        .collect::<Vec<_>>();

    match sort {
        TaskSort::None => selected.sort_by_key(|task| task.order),
        TaskSort::CreatedAsc => selected.sort_by_key(|task| task.created),
        TaskSort::CreatedDesc => selected.sort_by_key(|task| Reverse(task.created)),
        TaskSort::DueDateAsc => {
            selected.sort_by_key(|task| task.due_date.unwrap_or(EpochMs::MAX))
        }
        TaskSort::DueDateDesc => {
            selected.sort_by_key(|task| Reverse(task.due_date.unwrap_or(EpochMs::MIN)))
        }
    }
    selected
}

/// Splits a sorted projection into tasks due strictly after `now` and the rest.
pub fn partition_upcoming(sorted: Vec<Task>, now: EpochMs) -> SectionedTasks {
    let (upcoming, main) = sorted
        .into_iter()
        .partition(|task| task.due_date.map_or(false, |due| due > now));
    SectionedTasks { upcoming, main }
}
