use donow_core::db::migrations::latest_version;
use donow_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

fn user_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn fresh_connections_are_fully_migrated() {
    let conn = open_db_in_memory().unwrap();
    assert_eq!(user_version(&conn), latest_version());

    // The migrated schema must actually hold snapshot payloads.
    conn.execute(
        "INSERT INTO snapshots (key, payload) VALUES ('todos/store', x'7b7d');",
        [],
    )
    .unwrap();
    let payload: Vec<u8> = conn
        .query_row(
            "SELECT payload FROM snapshots WHERE key = 'todos/store';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(payload, b"{}");
}

#[test]
fn reopening_a_migrated_file_applies_nothing_further() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("donow.db");

    drop(open_db(&path).unwrap());

    let conn = open_db(&path).unwrap();
    assert_eq!(user_version(&conn), latest_version());
}

#[test]
fn a_database_from_a_newer_build_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    }

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}
