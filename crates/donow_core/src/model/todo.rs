//! Todo domain model and store schemas.
//!
//! # Responsibility
//! - Define the canonical todo record and its cell mapping.
//! - Build the schemas and the seeded first-launch snapshot.
//!
//! # Invariants
//! - `id` is stable and mirrors the row id the record is stored under.
//! - `kind` is one of the declared kinds; the schema enforces the same
//!   set for the active filter value.

use crate::schema::{
    CellSchema, CellType, CellValue, Row, TableSchema, TablesSchema, ValueSchema, ValuesSchema,
};
use crate::store::{Snapshot, Store, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const TODOS_TABLE: &str = "todos";
/// Slice index grouping todos by kind.
pub const KIND_SLICE: &str = "types";
/// Top-level value holding the active kind filter.
pub const SELECTED_KIND: &str = "selectedType";

pub const CELL_ID: &str = "id";
pub const CELL_TEXT: &str = "text";
pub const CELL_COMPLETED: &str = "completed";
pub const CELL_CREATED_AT: &str = "createdAt";
pub const CELL_KIND: &str = "type";

/// Time horizon a todo is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TodoKind {
    Now,
    Later,
    Future,
}

impl TodoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Now => "Now",
            Self::Later => "Later",
            Self::Future => "Future",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Now" => Some(Self::Now),
            "Later" => Some(Self::Later),
            "Future" => Some(Self::Future),
            _ => None,
        }
    }

    pub fn all() -> [TodoKind; 3] {
        [Self::Now, Self::Later, Self::Future]
    }
}

impl Display for TodoKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view over one `todos` row.
#[derive(Debug, Clone, PartialEq)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub kind: TodoKind,
}

impl Todo {
    /// Creates a new todo with a generated stable id.
    pub fn new(text: impl Into<String>, kind: TodoKind) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), text, kind)
    }

    /// Creates a todo with a caller-provided id, used where identity
    /// already exists (seeds, imports).
    pub fn with_id(id: impl Into<String>, text: impl Into<String>, kind: TodoKind) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            completed: false,
            created_at: now_epoch_ms(),
            kind,
        }
    }

    pub fn to_row(&self) -> Row {
        Row::from([
            (CELL_ID.to_string(), CellValue::from(self.id.as_str())),
            (CELL_TEXT.to_string(), CellValue::from(self.text.as_str())),
            (CELL_COMPLETED.to_string(), CellValue::from(self.completed)),
            (
                CELL_CREATED_AT.to_string(),
                CellValue::from(self.created_at),
            ),
            (CELL_KIND.to_string(), CellValue::from(self.kind.as_str())),
        ])
    }

    /// Reads a typed record back from a stored row. Returns `None` for
    /// rows that do not carry the todo shape.
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: row.get(CELL_ID)?.as_text()?.to_string(),
            text: row.get(CELL_TEXT)?.as_text()?.to_string(),
            completed: row.get(CELL_COMPLETED)?.as_bool()?,
            created_at: row.get(CELL_CREATED_AT)?.as_number()? as i64,
            kind: TodoKind::parse(row.get(CELL_KIND)?.as_text()?)?,
        })
    }
}

/// Schema of the single `todos` table.
pub fn todos_schema() -> TablesSchema {
    TablesSchema::new().table(
        TODOS_TABLE,
        TableSchema::new()
            .cell(CELL_ID, CellSchema::of(CellType::String))
            .cell(CELL_TEXT, CellSchema::of(CellType::String))
            .cell(CELL_COMPLETED, CellSchema::with_default(false))
            .cell(CELL_CREATED_AT, CellSchema::of(CellType::Number))
            .cell(CELL_KIND, CellSchema::with_default(TodoKind::Now.as_str())),
    )
}

/// Schema of the flat values map.
pub fn app_values_schema() -> ValuesSchema {
    ValuesSchema::new().value(
        SELECTED_KIND,
        ValueSchema::with_default(TodoKind::Now.as_str()).allow(
            TodoKind::all()
                .iter()
                .map(|kind| CellValue::from(kind.as_str()))
                .collect(),
        ),
    )
}

/// Constructs the application store with its schemas and the kind slice.
pub fn create_todo_store() -> StoreResult<Store> {
    let store = Store::new(todos_schema(), app_values_schema());
    store.define_slice(KIND_SLICE, TODOS_TABLE, CELL_KIND)?;
    Ok(store)
}

/// Onboarding rows seeded when storage holds no snapshot yet.
pub fn initial_snapshot() -> Snapshot {
    let seeds = [
        ("1", "Start typing to create a new todo"),
        ("2", "Click a todo to mark it complete"),
        ("3", "Hover over a todo to delete it"),
    ];
    let mut snapshot = Snapshot::new();
    for (id, text) in seeds {
        snapshot = snapshot.with_row(
            TODOS_TABLE,
            id,
            Todo::with_id(id, text, TodoKind::Now).to_row(),
        );
    }
    snapshot.with_value(SELECTED_KIND, TodoKind::Now.as_str())
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
