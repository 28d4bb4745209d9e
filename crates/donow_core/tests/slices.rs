use donow_core::{
    create_todo_store, CellValue, Row, SchemaViolation, Snapshot, StoreError, KIND_SLICE,
    TODOS_TABLE,
};

fn row(id: &str, kind: &str) -> Row {
    Row::from([
        ("id".to_string(), CellValue::from(id)),
        ("text".to_string(), CellValue::from(id)),
        ("createdAt".to_string(), CellValue::from(1_i64)),
        ("type".to_string(), CellValue::from(kind)),
    ])
}

#[test]
fn indexed_cell_change_moves_the_row_between_slices() {
    let store = create_todo_store().unwrap();
    store.set_row(TODOS_TABLE, "1", row("1", "Later")).unwrap();
    assert_eq!(store.slice_row_ids(KIND_SLICE, "Later"), vec!["1"]);

    store.set_cell(TODOS_TABLE, "1", "type", "Now").unwrap();
    assert!(store.slice_row_ids(KIND_SLICE, "Later").is_empty());
    assert_eq!(store.slice_row_ids(KIND_SLICE, "Now"), vec!["1"]);
}

#[test]
fn slice_order_is_insertion_order_and_stable_across_updates() {
    let store = create_todo_store().unwrap();
    store.set_row(TODOS_TABLE, "a", row("a", "Now")).unwrap();
    store.set_row(TODOS_TABLE, "b", row("b", "Now")).unwrap();
    store.set_row(TODOS_TABLE, "c", row("c", "Now")).unwrap();

    store.set_cell(TODOS_TABLE, "a", "completed", true).unwrap();
    assert_eq!(store.slice_row_ids(KIND_SLICE, "Now"), vec!["a", "b", "c"]);

    store.set_cell(TODOS_TABLE, "b", "type", "Later").unwrap();
    store.set_cell(TODOS_TABLE, "b", "type", "Now").unwrap();
    assert_eq!(store.slice_row_ids(KIND_SLICE, "Now"), vec!["a", "c", "b"]);
}

#[test]
fn empty_or_unknown_keys_yield_an_empty_sequence() {
    let store = create_todo_store().unwrap();

    assert!(store.slice_row_ids(KIND_SLICE, "Future").is_empty());
    assert!(store.slice_row_ids(KIND_SLICE, "nonsense").is_empty());
    assert!(store.slice_row_ids("unknown-index", "Now").is_empty());
}

#[test]
fn deleting_rows_empties_and_drops_the_bucket() {
    let store = create_todo_store().unwrap();
    store.set_row(TODOS_TABLE, "1", row("1", "Future")).unwrap();
    assert_eq!(store.slice_keys(KIND_SLICE), vec!["Future"]);

    store.del_row(TODOS_TABLE, "1").unwrap();
    assert!(store.slice_row_ids(KIND_SLICE, "Future").is_empty());
    assert!(store.slice_keys(KIND_SLICE).is_empty());
}

#[test]
fn define_slice_rejects_undeclared_cells() {
    let store = create_todo_store().unwrap();

    let err = store.define_slice("bogus", TODOS_TABLE, "priority").unwrap_err();
    assert!(matches!(
        err,
        StoreError::Schema(SchemaViolation::UnknownCell { .. })
    ));
    let err = store.define_slice("bogus", "projects", "type").unwrap_err();
    assert!(matches!(
        err,
        StoreError::Schema(SchemaViolation::UnknownTable(_))
    ));
}

#[test]
fn bulk_content_rebuilds_slices_in_row_order() {
    let store = create_todo_store().unwrap();
    let snapshot = Snapshot::new()
        .with_row(TODOS_TABLE, "z", row("z", "Now"))
        .with_row(TODOS_TABLE, "a", row("a", "Now"))
        .with_row(TODOS_TABLE, "m", row("m", "Later"));

    store.set_content(snapshot);

    assert_eq!(store.slice_row_ids(KIND_SLICE, "Now"), vec!["z", "a"]);
    assert_eq!(store.slice_row_ids(KIND_SLICE, "Later"), vec!["m"]);
}
