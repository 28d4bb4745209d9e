use donow_core::{create_todo_store, CellValue, Row, StoreError, TODOS_TABLE};
use std::cell::Cell;
use std::rc::Rc;

fn row(id: &str, text: &str, kind: &str) -> Row {
    Row::from([
        ("id".to_string(), CellValue::from(id)),
        ("text".to_string(), CellValue::from(text)),
        ("createdAt".to_string(), CellValue::from(1_i64)),
        ("type".to_string(), CellValue::from(kind)),
    ])
}

#[test]
fn del_row_is_idempotent() {
    let store = create_todo_store().unwrap();
    store.set_row(TODOS_TABLE, "1", row("1", "a", "Now")).unwrap();

    store.del_row(TODOS_TABLE, "missing").unwrap();
    store.del_row(TODOS_TABLE, "missing").unwrap();
    assert_eq!(store.row_count(TODOS_TABLE), 1);

    store.del_row(TODOS_TABLE, "1").unwrap();
    store.del_row(TODOS_TABLE, "1").unwrap();
    assert_eq!(store.row_count(TODOS_TABLE), 0);
}

#[test]
fn reads_return_none_for_absent_targets() {
    let store = create_todo_store().unwrap();

    assert!(store.get_row(TODOS_TABLE, "nope").is_none());
    assert!(store.get_cell(TODOS_TABLE, "nope", "text").is_none());
    assert!(store.get_row("unknown", "nope").is_none());
}

#[test]
fn set_cell_on_missing_row_returns_row_not_found() {
    let store = create_todo_store().unwrap();

    let err = store.set_cell(TODOS_TABLE, "ghost", "text", "boo").unwrap_err();
    assert!(matches!(err, StoreError::RowNotFound { .. }));
}

#[test]
fn set_row_replaces_in_place_and_keeps_insertion_order() {
    let store = create_todo_store().unwrap();
    store.set_row(TODOS_TABLE, "a", row("a", "one", "Now")).unwrap();
    store.set_row(TODOS_TABLE, "b", row("b", "two", "Now")).unwrap();

    store.set_row(TODOS_TABLE, "a", row("a", "edited", "Now")).unwrap();

    assert_eq!(store.row_ids(TODOS_TABLE), vec!["a", "b"]);
    assert_eq!(
        store.get_cell(TODOS_TABLE, "a", "text"),
        Some(CellValue::from("edited"))
    );
}

#[test]
fn identical_writes_do_not_notify() {
    let store = create_todo_store().unwrap();
    store.set_row(TODOS_TABLE, "1", row("1", "a", "Now")).unwrap();

    let calls = Rc::new(Cell::new(0_u32));
    let seen = Rc::clone(&calls);
    store.add_table_listener(TODOS_TABLE, move |_store, _event| {
        seen.set(seen.get() + 1);
    });

    store.set_row(TODOS_TABLE, "1", row("1", "a", "Now")).unwrap();
    store.set_cell(TODOS_TABLE, "1", "text", "a").unwrap();
    assert_eq!(calls.get(), 0);

    store.set_cell(TODOS_TABLE, "1", "text", "b").unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn failed_mutations_do_not_notify() {
    let store = create_todo_store().unwrap();
    store.set_row(TODOS_TABLE, "1", row("1", "a", "Now")).unwrap();

    let calls = Rc::new(Cell::new(0_u32));
    let seen = Rc::clone(&calls);
    store.add_table_listener(TODOS_TABLE, move |_store, _event| {
        seen.set(seen.get() + 1);
    });

    assert!(store.set_cell(TODOS_TABLE, "1", "completed", "yes").is_err());
    assert!(store.set_cell(TODOS_TABLE, "ghost", "text", "x").is_err());
    assert_eq!(calls.get(), 0);
}

#[test]
fn snapshot_carries_tables_and_values() {
    let store = create_todo_store().unwrap();
    store.set_row(TODOS_TABLE, "1", row("1", "a", "Later")).unwrap();

    let snapshot = store.snapshot();
    let rows = snapshot.tables.get(TODOS_TABLE).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows.get("1").unwrap().get("type"),
        Some(&CellValue::from("Later"))
    );
    assert_eq!(
        snapshot.values.get("selectedType"),
        Some(&CellValue::from("Now"))
    );
}
