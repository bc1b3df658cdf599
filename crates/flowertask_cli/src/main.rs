//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `flowertask_core` linkage without a mobile host.
//! - Run one scripted add/move/delete/undo session against the in-process
//!   remote store and print the resulting list.

use flowertask_core::{
    EngineConfig, InMemoryRemoteStore, TaskFilter, TaskSort, TaskStore, TodoListService,
};
use std::sync::Arc;
use std::time::Instant;

const DEMO_OWNER: &str = "smoke-owner";

fn main() {
    println!("flowertask_core ping={}", flowertask_core::ping());
    println!("flowertask_core version={}", flowertask_core::core_version());

    let remote = Arc::new(InMemoryRemoteStore::new());
    let store = TaskStore::with_owner(remote, DEMO_OWNER);
    let mut service = TodoListService::new(store, &EngineConfig::default());

    service.store_mut().subscribe();
    for title in ["Repot basil", "Order seeds", "Prune roses"] {
        service.store_mut().add_task(title, None, None, false);
    }
    service.store_mut().process_remote_events();

    service.store_mut().move_task(0, 2);
    service.store_mut().process_remote_events();

    let first_id = service
        .store()
        .top_level_tasks()
        .first()
        .map(|task| task.id.clone());
    if let Some(first_id) = first_id {
        service.delete_with_undo(&first_id, Instant::now());
        println!("flowertask_core undo_visible={}", service.undo_visible());
        service.undo_delete();
    }
    service.store_mut().process_remote_events();

    service.set_filter(TaskFilter::All);
    service.set_sort(TaskSort::None);
    let now = flowertask_core::model::task::now_ms();
    for task in service.visible_tasks(now) {
        println!("task order={} title={}", task.order, task.title);
    }
}
