//! Versioned migrations for the snapshot schema.
//!
//! # Responsibility
//! - Hold the ordered migration list for the `snapshots` schema.
//! - Apply whatever is pending in one transaction.
//!
//! # Invariants
//! - Versions are strictly increasing; the highest applied one is mirrored
//!   to `PRAGMA user_version`.
//! - A database ahead of this build is refused, never downgraded.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

const MIGRATIONS: &[(u32, &str)] = &[(1, include_str!("0001_snapshots.sql"))];

/// Highest schema version this build knows how to produce.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

/// Brings the connection's schema up to [`latest_version`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found = current_user_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    let pending: Vec<&(u32, &str)> = MIGRATIONS
        .iter()
        .filter(|(version, _)| *version > found)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in pending {
        tx.execute_batch(sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {version};"))?;
        info!("event=db_migrate module=db status=applied version={version}");
    }
    tx.commit()?;
    Ok(())
}

pub(crate) fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
