use donow_core::{
    create_todo_store, initial_snapshot, CellValue, MemorySnapshotStorage, Persister, Snapshot,
    StoreContext, StoreError, TodoKind, TodoService, SELECTED_KIND, TODOS_TABLE,
};

fn service_over_fresh_store() -> TodoService {
    TodoService::new(create_todo_store().unwrap())
}

#[test]
fn created_todos_appear_in_the_active_slice() {
    let service = service_over_fresh_store();

    let id = service.create_todo("write the report", TodoKind::Now).unwrap();
    let visible = service.visible_todos();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, id);
    assert_eq!(visible[0].text, "write the report");
    assert!(!visible[0].completed);
}

#[test]
fn selecting_a_kind_changes_the_visible_slice() {
    let service = service_over_fresh_store();
    service.create_todo("today", TodoKind::Now).unwrap();
    let later_id = service.create_todo("someday", TodoKind::Later).unwrap();

    assert_eq!(service.selected_kind(), TodoKind::Now);
    assert_eq!(service.visible_todos().len(), 1);

    service.select_kind(TodoKind::Later).unwrap();
    let visible = service.visible_todos();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, later_id);
}

#[test]
fn toggle_flips_completion_both_ways() {
    let service = service_over_fresh_store();
    let id = service.create_todo("flip me", TodoKind::Now).unwrap();

    assert!(service.toggle_todo(&id).unwrap());
    assert!(service.todo(&id).unwrap().completed);

    assert!(!service.toggle_todo(&id).unwrap());
    assert!(!service.todo(&id).unwrap().completed);
}

#[test]
fn toggle_on_missing_todo_reports_row_not_found() {
    let service = service_over_fresh_store();
    let err = service.toggle_todo("ghost").unwrap_err();
    assert!(matches!(err, StoreError::RowNotFound { .. }));
}

#[test]
fn rename_replaces_the_text() {
    let service = service_over_fresh_store();
    let id = service.create_todo("draft", TodoKind::Now).unwrap();

    service.rename_todo(&id, "final").unwrap();
    assert_eq!(service.todo(&id).unwrap().text, "final");
}

#[test]
fn delete_is_idempotent_through_the_service() {
    let service = service_over_fresh_store();
    let id = service.create_todo("remove me", TodoKind::Now).unwrap();

    service.delete_todo(&id).unwrap();
    service.delete_todo(&id).unwrap();
    assert!(service.todo(&id).is_none());
    assert!(service.visible_todos().is_empty());
}

#[test]
fn selected_kind_defaults_to_now() {
    let service = service_over_fresh_store();
    assert_eq!(service.selected_kind(), TodoKind::Now);
}

#[test]
fn context_rejects_queries_before_open_and_after_teardown() {
    let mut context = StoreContext::new();
    assert!(matches!(
        context.store(),
        Err(StoreError::NotInitialized)
    ));

    let store = create_todo_store().unwrap();
    let persister = Persister::new(&store, Box::new(MemorySnapshotStorage::new()));
    context.open(store, persister);
    assert!(context.store().is_ok());
    assert!(context.is_open());

    context.teardown();
    assert!(matches!(
        context.store(),
        Err(StoreError::NotInitialized)
    ));
}

#[test]
fn context_teardown_flushes_the_final_snapshot() {
    let storage = MemorySnapshotStorage::new();
    let store = create_todo_store().unwrap();
    let mut persister = Persister::new(&store, Box::new(storage.clone()));
    persister.start_auto_load(&initial_snapshot()).unwrap();

    let mut context = StoreContext::new();
    context.open(store.clone(), persister);

    let service = TodoService::new(context.store().unwrap());
    let id = service.create_todo("persist me", TodoKind::Future).unwrap();

    context.teardown();
    assert_eq!(store.listener_count(), 0);

    let saved: Snapshot = serde_json::from_slice(&storage.payload().unwrap()).unwrap();
    assert!(saved.tables.get(TODOS_TABLE).unwrap().contains_key(&id));
    assert_eq!(saved.values.get(SELECTED_KIND), Some(&CellValue::from("Now")));
}
