//! Single-slot undo memory for the last deleted task.
//!
//! # Invariants
//! - At most one task is held; a new capture overwrites the previous one.
//! - The slot is visible exactly while it holds a task.
//! - Expiry through an `UndoTicket` only clears the entry that issued it.

use crate::model::task::Task;
use std::time::{Duration, Instant};

/// Default visibility window for the undo affordance.
pub const DEFAULT_UNDO_TIMEOUT: Duration = Duration::from_secs(3);

/// Handle for the scheduled expiry of one captured task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoTicket {
    generation: u64,
    deadline: Instant,
}

impl UndoTicket {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[derive(Debug, Clone)]
struct PendingUndo {
    task: Task,
    ticket: UndoTicket,
}

#[derive(Debug, Clone)]
pub struct UndoBuffer {
    timeout: Duration,
    slot: Option<PendingUndo>,
    generation: u64,
}

impl Default for UndoBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_TIMEOUT)
    }
}

impl UndoBuffer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            slot: None,
            generation: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Holds `task` until `now + timeout`, discarding any earlier capture.
    pub fn capture(&mut self, task: Task, now: Instant) -> UndoTicket {
        self.generation += 1;
        let ticket = UndoTicket {
            generation: self.generation,
            deadline: now + self.timeout,
        };
        self.slot = Some(PendingUndo { task, ticket });
        ticket
    }

    pub fn is_visible(&self) -> bool {
        self.slot.is_some()
    }

    pub fn pending(&self) -> Option<&Task> {
        self.slot.as_ref().map(|pending| &pending.task)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.slot.as_ref().map(|pending| pending.ticket.deadline)
    }

    /// Clears the slot when its deadline has passed. Returns whether it did.
    pub fn expire_due(&mut self, now: Instant) -> bool {
        let due = self
            .slot
            .as_ref()
            .is_some_and(|pending| now >= pending.ticket.deadline);
        if due {
            self.slot = None;
        }
        due
    }

    /// Fires a scheduled expiry; ignored when `ticket` is no longer current.
    pub fn expire(&mut self, ticket: UndoTicket) -> bool {
        let current = self
            .slot
            .as_ref()
            .is_some_and(|pending| pending.ticket == ticket);
        if current {
            self.slot = None;
        }
        current
    }

    pub fn dismiss(&mut self) {
        self.slot = None;
    }

    /// Hands out the held task and clears the slot.
    pub fn take(&mut self) -> Option<Task> {
        self.slot.take().map(|pending| pending.task)
    }
}

#[cfg(test)]
mod tests {
    use super::UndoBuffer;
    use crate::model::task::Task;
    use std::time::{Duration, Instant};

    #[test]
    fn capture_makes_slot_visible_until_deadline() {
        let mut buffer = UndoBuffer::new(Duration::from_secs(3));
        let start = Instant::now();
        buffer.capture(Task::new("x", "X", 0), start);
        assert!(buffer.is_visible());

        assert!(!buffer.expire_due(start + Duration::from_secs(2)));
        assert!(buffer.is_visible());
        assert!(buffer.expire_due(start + Duration::from_secs(3)));
        assert!(!buffer.is_visible());
        assert!(buffer.take().is_none());
    }

    #[test]
    fn second_capture_overwrites_first() {
        let mut buffer = UndoBuffer::default();
        let now = Instant::now();
        buffer.capture(Task::new("x", "X", 0), now);
        buffer.capture(Task::new("y", "Y", 0), now);
        assert_eq!(buffer.take().map(|task| task.id), Some("y".to_string()));
        assert!(buffer.take().is_none());
    }

    #[test]
    fn stale_ticket_does_not_clear_newer_capture() {
        let mut buffer = UndoBuffer::default();
        let now = Instant::now();
        let first = buffer.capture(Task::new("x", "X", 0), now);
        let second = buffer.capture(Task::new("y", "Y", 0), now);

        assert!(!buffer.expire(first));
        assert_eq!(buffer.pending().map(|task| task.id.as_str()), Some("y"));
        assert!(buffer.expire(second));
        assert!(!buffer.is_visible());
    }

    #[test]
    fn dismiss_clears_slot() {
        let mut buffer = UndoBuffer::default();
        let ticket = buffer.capture(Task::new("x", "X", 0), Instant::now());
        buffer.dismiss();
        assert!(!buffer.is_visible());
        assert!(!buffer.expire(ticket));
    }
}
