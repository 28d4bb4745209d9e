//! Snapshot storage backends.
//!
//! # Responsibility
//! - Define the byte-level contract the persister writes through.
//! - Provide the SQLite-backed durable backend and an in-memory backend
//!   for tests and ephemeral sessions.
//!
//! # Invariants
//! - A SQLite backend is only constructed over a migrated connection.
//! - `read` returns `None` for a key that has never been written.

use crate::db::migrations::latest_version;
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    Unavailable(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection is not migrated for snapshot storage: expected version {expected_version}, got {actual_version}"
            ),
            Self::Unavailable(reason) => write!(f, "storage backend unavailable: {reason}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::Unavailable(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Opaque keyed byte store the persister serializes snapshots into.
pub trait SnapshotStorage {
    fn read(&mut self) -> StorageResult<Option<Vec<u8>>>;
    fn write(&mut self, payload: &[u8]) -> StorageResult<()>;
}

/// Durable backend over one row of the `snapshots` table.
pub struct SqliteSnapshotStorage {
    conn: Connection,
    key: String,
}

impl SqliteSnapshotStorage {
    /// Wraps a migrated connection. Rejects connections whose schema
    /// version does not match this binary.
    pub fn try_new(conn: Connection, key: impl Into<String>) -> StorageResult<Self> {
        let actual_version: u32 =
            conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(StorageError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self {
            conn,
            key: key.into(),
        })
    }
}

impl SnapshotStorage for SqliteSnapshotStorage {
    fn read(&mut self) -> StorageResult<Option<Vec<u8>>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots WHERE key = ?1;",
                [self.key.as_str()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn write(&mut self, payload: &[u8]) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO snapshots (key, payload, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now') * 1000)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at;",
            params![self.key.as_str(), payload],
        )?;
        Ok(())
    }
}

/// Ephemeral backend for tests and session-only stores. Clones share the
/// same payload slot, so a test can keep a handle for inspection after
/// moving one into the persister.
#[derive(Clone, Default)]
pub struct MemorySnapshotStorage {
    payload: Rc<RefCell<Option<Vec<u8>>>>,
}

impl MemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(&self) -> Option<Vec<u8>> {
        self.payload.borrow().clone()
    }

    pub fn set_payload(&self, payload: Vec<u8>) {
        *self.payload.borrow_mut() = Some(payload);
    }
}

impl SnapshotStorage for MemorySnapshotStorage {
    fn read(&mut self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.payload.borrow().clone())
    }

    fn write(&mut self, payload: &[u8]) -> StorageResult<()> {
        *self.payload.borrow_mut() = Some(payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemorySnapshotStorage, SnapshotStorage, SqliteSnapshotStorage, StorageError};
    use crate::db::open_db_in_memory;
    use rusqlite::Connection;

    #[test]
    fn sqlite_storage_round_trips_payloads() {
        let conn = open_db_in_memory().expect("in-memory db should open");
        let mut storage =
            SqliteSnapshotStorage::try_new(conn, "todos/store").expect("storage should wrap");

        assert!(storage
            .read()
            .expect("read of missing key should succeed")
            .is_none());

        storage.write(b"one").expect("first write should succeed");
        storage.write(b"two").expect("overwrite should succeed");
        assert_eq!(
            storage.read().expect("read should succeed"),
            Some(b"two".to_vec())
        );
    }

    #[test]
    fn sqlite_storage_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().expect("raw connection should open");
        let result = SqliteSnapshotStorage::try_new(conn, "todos/store");
        assert!(matches!(
            result,
            Err(StorageError::UninitializedConnection {
                actual_version: 0,
                ..
            })
        ));
    }

    #[test]
    fn memory_storage_shares_payload_across_clones() {
        let storage = MemorySnapshotStorage::new();
        let mut writer = storage.clone();
        writer.write(b"shared").expect("memory write cannot fail");
        assert_eq!(storage.payload(), Some(b"shared".to_vec()));
    }
}
