//! Serializable full-store state.

use crate::schema::{CellValue, Row};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rows of one table, in insertion order. The order is observable through
/// slices and must survive a snapshot round-trip.
pub type TableRows = IndexMap<String, Row>;

/// The full serializable state of tables and values at a point in time.
///
/// Serializes as `{ "tables": { table -> row-id -> cell map },
/// "values": { name -> scalar } }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tables: IndexMap<String, TableRows>,
    #[serde(default)]
    pub values: BTreeMap<String, CellValue>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, table: &str, row_id: &str, row: Row) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(row_id.to_string(), row);
        self
    }

    pub fn with_value(mut self, name: &str, value: impl Into<CellValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// True when the snapshot carries no rows and no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.tables.values().all(|rows| rows.is_empty())
    }
}
