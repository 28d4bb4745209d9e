//! Core store engine for DoNow.
//! This crate is the single source of truth for business invariants:
//! a schema-validated reactive table store with derived slices, scoped
//! subscriptions, and an auto-load/auto-save persistence lifecycle.

pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod persist;
pub mod schema;
pub mod service;
pub mod store;

mod index;

pub use context::StoreContext;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::todo::{
    app_values_schema, create_todo_store, initial_snapshot, todos_schema, Todo, TodoKind,
    KIND_SLICE, SELECTED_KIND, TODOS_TABLE,
};
pub use persist::{
    MemorySnapshotStorage, PersistError, PersistResult, Persister, PersisterState,
    SnapshotStorage, SqliteSnapshotStorage, StorageError, StorageResult,
};
pub use schema::{
    CellSchema, CellType, CellValue, Row, SchemaResult, SchemaViolation, TableSchema,
    TablesSchema, ValueSchema, ValuesSchema,
};
pub use service::todo_service::TodoService;
pub use store::{
    ChangeEvent, ListenerId, ListenerScope, Snapshot, Store, StoreError, StoreResult, TableRows,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
