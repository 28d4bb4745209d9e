//! SQLite bootstrap for the snapshot backend.
//!
//! # Responsibility
//! - Open and configure the connections the snapshot storage writes
//!   through.
//! - Bring the `snapshots` schema up to date before handing a connection
//!   out.
//!
//! # Invariants
//! - The applied schema version is mirrored to `PRAGMA user_version`.
//! - A connection opened by this module is fully migrated.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The database was written by a newer build of this crate.
    SchemaTooNew { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "snapshot database schema version {found} is ahead of this build (supports up to {supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
