//! Reactive table store: tables, values, change events, subscriptions.
//!
//! # Responsibility
//! - Hold the single in-memory source of truth for tables and values.
//! - Gate every mutation through schema validation before commit.
//! - Notify only the listeners a committed mutation can affect.
//!
//! # Invariants
//! - A failed mutation leaves no state change and emits no notification.
//! - Notifications for a mutation run strictly after its commit and before
//!   any mutation queued from within the notification pass.

use crate::schema::SchemaViolation;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod engine;
mod event;
mod listeners;
mod snapshot;

pub use engine::Store;
pub use event::ChangeEvent;
pub use listeners::{ListenerId, ListenerScope};
pub use snapshot::{Snapshot, TableRows};

pub type StoreResult<T> = Result<T, StoreError>;

/// Synchronous store error taxonomy. Persistence failures live in
/// [`crate::persist`] and are never raised from store operations.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Schema(SchemaViolation),
    RowNotFound { table: String, row_id: String },
    NotInitialized,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "{err}"),
            Self::RowNotFound { table, row_id } => {
                write!(f, "row not found: {table}/{row_id}")
            }
            Self::NotInitialized => write!(f, "store is not initialized"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::RowNotFound { .. } => None,
            Self::NotInitialized => None,
        }
    }
}

impl From<SchemaViolation> for StoreError {
    fn from(value: SchemaViolation) -> Self {
        Self::Schema(value)
    }
}
