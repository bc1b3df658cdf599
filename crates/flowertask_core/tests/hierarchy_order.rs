use flowertask_core::remote::memory::RecordedWrite;
use flowertask_core::{
    InMemoryRemoteStore, RemoteDocument, RemoteError, Task, TaskFilter, TaskSort, TaskStore,
    TaskStoreError,
};
use std::sync::Arc;

const OWNER: &str = "owner-1";

fn task(id: &str, order: i64) -> Task {
    let mut task = Task::new(id, format!("Task {id}"), 1_000 + order);
    task.order = order;
    task
}

fn subtask(id: &str, parent_id: &str) -> Task {
    let mut task = Task::new(id, format!("Subtask {id}"), 2_000);
    task.parent_id = Some(parent_id.to_string());
    task
}

fn synced_store(tasks: &[Task]) -> (Arc<InMemoryRemoteStore>, TaskStore) {
    let remote = Arc::new(InMemoryRemoteStore::new());
    for task in tasks {
        remote.insert_document(OWNER, RemoteDocument::new(&task.id, task.to_document()));
    }
    let mut store = TaskStore::with_owner(remote.clone(), OWNER);
    store.subscribe();
    store.process_remote_events();
    (remote, store)
}

fn top_ids(store: &TaskStore) -> Vec<String> {
    store
        .top_level_tasks()
        .into_iter()
        .map(|task| task.id.clone())
        .collect()
}

fn orders(store: &TaskStore) -> Vec<(String, i64)> {
    store
        .top_level_tasks()
        .into_iter()
        .map(|task| (task.id.clone(), task.order))
        .collect()
}

fn subtask_ids(store: &TaskStore, parent_id: &str) -> Vec<String> {
    store
        .subtasks_of(parent_id)
        .into_iter()
        .map(|task| task.id.clone())
        .collect()
}

#[test]
fn reorganize_nests_child_under_parent() {
    let (_remote, store) = synced_store(&[task("p", 0), subtask("c", "p")]);

    assert_eq!(top_ids(&store), vec!["p"]);
    let hierarchy = store.hierarchy();
    assert_eq!(hierarchy.len(), 1);
    assert_eq!(hierarchy[0].task.id, "p");
    assert_eq!(hierarchy[0].subtasks.len(), 1);
    assert_eq!(hierarchy[0].subtasks[0].id, "c");
}

#[test]
fn subtask_arriving_before_parent_still_attaches() {
    let (_remote, store) = synced_store(&[subtask("c", "p"), task("p", 0)]);
    assert_eq!(top_ids(&store), vec!["p"]);
    assert_eq!(subtask_ids(&store, "p"), vec!["c"]);
}

#[test]
fn orphans_and_nested_subtasks_are_dropped() {
    let (_remote, store) = synced_store(&[
        task("p", 0),
        subtask("c", "p"),
        subtask("orphan", "missing"),
        subtask("grandchild", "c"),
    ]);

    assert_eq!(top_ids(&store), vec!["p"]);
    assert_eq!(subtask_ids(&store, "p"), vec!["c"]);
    assert!(store.task("orphan").is_none());
    assert!(store.task("grandchild").is_none());
}

#[test]
fn subtasks_never_appear_in_projection() {
    let (_remote, store) = synced_store(&[task("p", 0), task("q", 1), subtask("c", "p")]);
    let projected = store.filtered_and_sorted(TaskFilter::All, TaskSort::CreatedAsc, 0);
    assert!(projected.iter().all(|task| task.parent_id.is_none()));
    assert_eq!(projected.len(), 2);
}

#[test]
fn move_task_renumbers_orders_to_indices() {
    let (remote, mut store) = synced_store(&[task("1", 0), task("2", 1), task("3", 2)]);

    store.move_task(0, 2);
    assert_eq!(
        orders(&store),
        vec![
            ("2".to_string(), 0),
            ("3".to_string(), 1),
            ("1".to_string(), 2)
        ]
    );
    assert_eq!(
        remote.recorded_writes(),
        vec![RecordedWrite::Batch {
            ids: vec!["2".to_string(), "3".to_string(), "1".to_string()]
        }]
    );

    store.process_remote_events();
    assert_eq!(top_ids(&store), vec!["2", "3", "1"]);
}

#[test]
fn move_task_with_equal_or_invalid_source_is_no_op() {
    let (remote, mut store) = synced_store(&[task("1", 0), task("2", 5), task("3", 9)]);

    store.move_task(1, 1);
    store.move_task(3, 0);
    store.move_task(2, 10);

    assert_eq!(
        orders(&store),
        vec![
            ("1".to_string(), 0),
            ("2".to_string(), 5),
            ("3".to_string(), 9)
        ]
    );
    assert!(remote.recorded_writes().is_empty());
}

#[test]
fn move_task_clamps_destination() {
    let (_remote, mut store) = synced_store(&[task("1", 0), task("2", 1), task("3", 2)]);
    store.move_task(0, 42);
    assert_eq!(top_ids(&store), vec!["2", "3", "1"]);
    let expected = (0..3).collect::<Vec<i64>>();
    let actual = orders(&store)
        .into_iter()
        .map(|(_, order)| order)
        .collect::<Vec<_>>();
    assert_eq!(actual, expected);
}

#[test]
fn move_task_stays_local_when_batch_write_fails() {
    let (remote, mut store) = synced_store(&[task("1", 0), task("2", 1)]);
    remote.set_write_failure(Some(RemoteError::Unavailable("offline".to_string())));

    store.move_task(1, 0);
    assert_eq!(top_ids(&store), vec!["2", "1"]);
    assert!(matches!(
        store.last_error(),
        Some(TaskStoreError::WriteFailure {
            operation: "move_task",
            ..
        })
    ));
}

#[test]
fn make_subtask_moves_task_and_persists_everything() {
    let (remote, mut store) = synced_store(&[task("p", 0), task("c", 1), task("q", 2)]);

    store.make_subtask("p", "c");
    assert_eq!(top_ids(&store), vec!["p", "q"]);
    assert_eq!(subtask_ids(&store, "p"), vec!["c"]);
    assert_eq!(store.task("c").unwrap().parent_id.as_deref(), Some("p"));

    let doc = remote.document(OWNER, "c").unwrap();
    assert_eq!(doc.fields.get("parentId"), Some(&serde_json::json!("p")));
    assert_eq!(
        remote.recorded_writes(),
        vec![RecordedWrite::Batch {
            ids: vec!["p".to_string(), "q".to_string(), "c".to_string()]
        }]
    );

    store.process_remote_events();
    assert_eq!(top_ids(&store), vec!["p", "q"]);
    assert_eq!(subtask_ids(&store, "p"), vec!["c"]);
}

#[test]
fn make_subtask_rejects_invalid_hierarchies() {
    let (remote, mut store) = synced_store(&[task("p", 0), task("q", 1), subtask("c", "p")]);

    store.make_subtask("p", "p");
    store.make_subtask("c", "q");
    store.make_subtask("q", "p");
    store.make_subtask("p", "missing");

    assert!(matches!(
        store.last_error(),
        Some(TaskStoreError::InvalidHierarchy { .. })
    ));
    assert_eq!(top_ids(&store), vec!["p", "q"]);
    assert_eq!(subtask_ids(&store, "p"), vec!["c"]);
    assert!(remote.recorded_writes().is_empty());
}

#[test]
fn remove_subtask_appends_to_top_level() {
    let (remote, mut store) = synced_store(&[task("p", 0), task("q", 4), subtask("c", "p")]);

    store.remove_subtask("c");
    assert_eq!(top_ids(&store), vec!["p", "q", "c"]);
    let promoted = store.task("c").unwrap();
    assert_eq!(promoted.parent_id, None);
    assert_eq!(promoted.order, 5);
    assert!(subtask_ids(&store, "p").is_empty());

    let doc = remote.document(OWNER, "c").unwrap();
    assert_eq!(doc.fields.get("parentId"), Some(&serde_json::Value::Null));
}

#[test]
fn remove_subtask_rejects_top_level_task() {
    let (_remote, mut store) = synced_store(&[task("p", 0)]);
    store.remove_subtask("p");
    assert!(matches!(
        store.last_error(),
        Some(TaskStoreError::InvalidHierarchy { .. })
    ));
}

#[test]
fn deleting_parent_hides_subtasks_until_restored() {
    let (_remote, mut store) = synced_store(&[task("p", 0), task("q", 1), subtask("c", "p")]);

    let removed = store.delete_task("p").unwrap();
    assert_eq!(top_ids(&store), vec!["q"]);
    assert!(store.task("c").is_none());

    store.process_remote_events();
    assert!(store.task("c").is_none());

    store.restore_task(&removed);
    assert_eq!(top_ids(&store), vec!["p", "q"]);
    store.process_remote_events();
    assert_eq!(subtask_ids(&store, "p"), vec!["c"]);
}

#[test]
fn deleting_subtask_only_detaches_it() {
    let (_remote, mut store) =
        synced_store(&[task("p", 0), subtask("c", "p"), subtask("d", "p")]);
    store.delete_task("c").unwrap();
    assert_eq!(top_ids(&store), vec!["p"]);
    assert_eq!(subtask_ids(&store, "p"), vec!["d"]);
}

#[test]
fn remove_subtask_saturates_order_at_maximum() {
    let mut parent = Task::new("p", "Task p", 1_000);
    parent.order = i64::MAX;
    let (_remote, mut store) = synced_store(&[parent, subtask("c", "p")]);

    store.remove_subtask("c");
    assert_eq!(top_ids(&store), vec!["p", "c"]);
    assert_eq!(store.task("c").map(|task| task.order), Some(i64::MAX));
    assert!(store.last_error().is_none());
}
