//! Slice index engine.
//!
//! # Responsibility
//! - Maintain named groupings of row-ids keyed by an indexed cell's
//!   rendered value.
//! - Update buckets incrementally on row mutations (bucket move, not full
//!   rescan); rebuild only on bulk content replacement.
//!
//! # Invariants
//! - Bucket membership is always consistent with current table state.
//! - Bucket order is row insertion order into the bucket, stable across
//!   updates that do not touch the indexed cell.
//! - Empty buckets are dropped; querying an unknown key yields an empty
//!   sequence.

use crate::schema::{CellValue, Row};
use crate::store::TableRows;
use indexmap::IndexMap;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SliceDefinition {
    pub table: String,
    pub cell: String,
}

/// All slice definitions and their current buckets.
#[derive(Debug, Default)]
pub(crate) struct SliceIndexes {
    defs: BTreeMap<String, SliceDefinition>,
    buckets: BTreeMap<String, IndexMap<String, Vec<String>>>,
}

impl SliceIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a slice definition. The caller rebuilds it.
    pub fn define(&mut self, index_id: &str, table: &str, cell: &str) {
        self.defs.insert(
            index_id.to_string(),
            SliceDefinition {
                table: table.to_string(),
                cell: cell.to_string(),
            },
        );
        self.buckets.insert(index_id.to_string(), IndexMap::new());
    }

    /// Rebuilds one index from full table state, in row order.
    pub fn rebuild_one(&mut self, index_id: &str, rows: &TableRows) {
        let Some(def) = self.defs.get(index_id).cloned() else {
            return;
        };
        let mut buckets: IndexMap<String, Vec<String>> = IndexMap::new();
        for (row_id, row) in rows {
            if let Some(key) = row.get(&def.cell).map(CellValue::to_key) {
                buckets.entry(key).or_default().push(row_id.clone());
            }
        }
        self.buckets.insert(index_id.to_string(), buckets);
    }

    /// Rebuilds every index, used after bulk content replacement.
    pub fn rebuild_all(&mut self, tables: &IndexMap<String, TableRows>) {
        let index_ids: Vec<String> = self.defs.keys().cloned().collect();
        for index_id in index_ids {
            let table = self.defs[&index_id].table.clone();
            match tables.get(&table) {
                Some(rows) => self.rebuild_one(&index_id, rows),
                None => {
                    self.buckets.insert(index_id, IndexMap::new());
                }
            }
        }
    }

    /// Applies an insert or update. Returns the (index, key) pairs whose
    /// membership changed.
    pub fn row_upserted(
        &mut self,
        table: &str,
        row_id: &str,
        old: Option<&Row>,
        new: &Row,
    ) -> Vec<(String, String)> {
        let mut touched = Vec::new();
        for (index_id, def) in self.defs_for(table) {
            let old_key = old.and_then(|row| row.get(&def.cell)).map(CellValue::to_key);
            let new_key = new.get(&def.cell).map(CellValue::to_key);
            if old.is_some() && old_key == new_key {
                continue;
            }
            if let Some(key) = old_key {
                self.remove_member(&index_id, &key, row_id);
                touched.push((index_id.clone(), key));
            }
            if let Some(key) = new_key {
                self.add_member(&index_id, &key, row_id);
                touched.push((index_id, key));
            }
        }
        touched
    }

    /// Applies a row deletion. Returns the (index, key) pairs whose
    /// membership changed.
    pub fn row_removed(&mut self, table: &str, row_id: &str, old: &Row) -> Vec<(String, String)> {
        let mut touched = Vec::new();
        for (index_id, def) in self.defs_for(table) {
            if let Some(key) = old.get(&def.cell).map(CellValue::to_key) {
                self.remove_member(&index_id, &key, row_id);
                touched.push((index_id, key));
            }
        }
        touched
    }

    pub fn slice_row_ids(&self, index_id: &str, key: &str) -> Vec<String> {
        self.buckets
            .get(index_id)
            .and_then(|buckets| buckets.get(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Non-empty bucket keys for one index.
    pub fn slice_keys(&self, index_id: &str) -> Vec<String> {
        self.buckets
            .get(index_id)
            .map(|buckets| buckets.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every (index, key) pair currently holding rows.
    pub fn all_keys(&self) -> Vec<(String, String)> {
        self.buckets
            .iter()
            .flat_map(|(index_id, buckets)| {
                buckets
                    .keys()
                    .map(move |key| (index_id.clone(), key.clone()))
            })
            .collect()
    }

    fn defs_for(&self, table: &str) -> Vec<(String, SliceDefinition)> {
        self.defs
            .iter()
            .filter(|(_, def)| def.table == table)
            .map(|(index_id, def)| (index_id.clone(), def.clone()))
            .collect()
    }

    fn add_member(&mut self, index_id: &str, key: &str, row_id: &str) {
        let Some(buckets) = self.buckets.get_mut(index_id) else {
            return;
        };
        let bucket = buckets.entry(key.to_string()).or_default();
        if !bucket.iter().any(|member| member == row_id) {
            bucket.push(row_id.to_string());
        }
    }

    fn remove_member(&mut self, index_id: &str, key: &str, row_id: &str) {
        let Some(buckets) = self.buckets.get_mut(index_id) else {
            return;
        };
        if let Some(bucket) = buckets.get_mut(key) {
            bucket.retain(|member| member != row_id);
            if bucket.is_empty() {
                buckets.shift_remove(key);
            }
        }
    }
}
