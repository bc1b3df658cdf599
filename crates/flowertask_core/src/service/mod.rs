//! Task list use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into screen-level flows (delete/undo, filters).
//! - Keep hosts decoupled from store internals.

pub mod todo_service;
pub mod undo_buffer;
