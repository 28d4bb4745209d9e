//! Store engine: state, mutation paths, and notification dispatch.
//!
//! # Responsibility
//! - Apply validated mutations atomically to tables, values and slices.
//! - Dispatch change notifications synchronously after each commit.
//! - Defer mutations issued from inside a notification pass.
//!
//! # Invariants
//! - Validation completes before any commit; no partial row state is
//!   observable.
//! - Slice buckets are updated in the same commit as the row write.
//! - The store handle is single-threaded (`Rc`-based, not `Send`).

use super::event::{ChangeEvent, ChangeSet};
use super::listeners::{ListenerRegistry, ListenerScope, SharedListener};
use super::snapshot::{Snapshot, TableRows};
use super::{ListenerId, StoreError, StoreResult};
use crate::index::SliceIndexes;
use crate::schema::{CellValue, Row, SchemaViolation, TablesSchema, ValuesSchema};
use indexmap::IndexMap;
use log::warn;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Cloneable handle to one store instance.
///
/// Clones share the same underlying state; the store lives until the last
/// handle is dropped. Explicitly constructed, never ambient.
#[derive(Clone)]
pub struct Store {
    state: Rc<RefCell<StoreState>>,
    listeners: Rc<RefCell<ListenerRegistry>>,
    dispatch: Rc<DispatchState>,
}

struct DispatchState {
    in_pass: Cell<bool>,
    queued: RefCell<VecDeque<QueuedOp>>,
}

/// A mutation issued from within a notification pass, committed after the
/// pass completes.
enum QueuedOp {
    SetRow {
        table: String,
        row_id: String,
        cells: Row,
    },
    SetCell {
        table: String,
        row_id: String,
        cell: String,
        value: CellValue,
    },
    DelRow {
        table: String,
        row_id: String,
    },
    SetValue {
        name: String,
        value: CellValue,
    },
    SetContent {
        snapshot: Snapshot,
    },
}

struct StoreState {
    tables_schema: TablesSchema,
    values_schema: ValuesSchema,
    tables: IndexMap<String, TableRows>,
    values: BTreeMap<String, CellValue>,
    indexes: SliceIndexes,
}

impl Store {
    /// Creates an empty store for the given schemas. Declared tables start
    /// empty; declared values are seeded with their defaults.
    pub fn new(tables_schema: TablesSchema, values_schema: ValuesSchema) -> Self {
        let tables = tables_schema
            .table_names()
            .into_iter()
            .map(|name| (name, TableRows::new()))
            .collect();
        let values = values_schema.defaults();
        Self {
            state: Rc::new(RefCell::new(StoreState {
                tables_schema,
                values_schema,
                tables,
                values,
                indexes: SliceIndexes::new(),
            })),
            listeners: Rc::new(RefCell::new(ListenerRegistry::new())),
            dispatch: Rc::new(DispatchState {
                in_pass: Cell::new(false),
                queued: RefCell::new(VecDeque::new()),
            }),
        }
    }

    // --- mutations ---------------------------------------------------------

    /// Inserts or fully replaces a row after validation.
    pub fn set_row(&self, table: &str, row_id: &str, cells: Row) -> StoreResult<()> {
        if self.dispatch.in_pass.get() {
            self.state.borrow().validate_set_row(table, row_id, &cells)?;
            self.enqueue(QueuedOp::SetRow {
                table: table.to_string(),
                row_id: row_id.to_string(),
                cells,
            });
            return Ok(());
        }
        let change = self.state.borrow_mut().apply_set_row(table, row_id, cells)?;
        self.finish(change);
        Ok(())
    }

    /// Partial update of one cell.
    pub fn set_cell(
        &self,
        table: &str,
        row_id: &str,
        cell: &str,
        value: impl Into<CellValue>,
    ) -> StoreResult<()> {
        let value = value.into();
        if self.dispatch.in_pass.get() {
            self.state
                .borrow()
                .validate_set_cell(table, row_id, cell, &value)?;
            self.enqueue(QueuedOp::SetCell {
                table: table.to_string(),
                row_id: row_id.to_string(),
                cell: cell.to_string(),
                value,
            });
            return Ok(());
        }
        let change = self
            .state
            .borrow_mut()
            .apply_set_cell(table, row_id, cell, value)?;
        self.finish(change);
        Ok(())
    }

    /// Removes a row. Deleting an absent row is a successful no-op.
    pub fn del_row(&self, table: &str, row_id: &str) -> StoreResult<()> {
        if self.dispatch.in_pass.get() {
            self.state.borrow().validate_del_row(table)?;
            self.enqueue(QueuedOp::DelRow {
                table: table.to_string(),
                row_id: row_id.to_string(),
            });
            return Ok(());
        }
        let change = self.state.borrow_mut().apply_del_row(table, row_id)?;
        self.finish(change);
        Ok(())
    }

    /// Writes a top-level value.
    pub fn set_value(&self, name: &str, value: impl Into<CellValue>) -> StoreResult<()> {
        let value = value.into();
        if self.dispatch.in_pass.get() {
            self.state.borrow().validate_set_value(name, &value)?;
            self.enqueue(QueuedOp::SetValue {
                name: name.to_string(),
                value,
            });
            return Ok(());
        }
        let change = self.state.borrow_mut().apply_set_value(name, value)?;
        self.finish(change);
        Ok(())
    }

    /// Bulk content replacement used by the persistence lifecycle.
    ///
    /// Candidate rows and values are normalized leniently (bad cells
    /// re-defaulted, unrecoverable rows dropped, undeclared entries
    /// ignored), indexes are rebuilt, and one consolidated notification
    /// pass runs for table-, value- and slice-scoped listeners.
    pub fn set_content(&self, snapshot: Snapshot) {
        if self.dispatch.in_pass.get() {
            self.enqueue(QueuedOp::SetContent { snapshot });
            return;
        }
        let change = self.state.borrow_mut().apply_set_content(snapshot);
        self.finish(Some(change));
    }

    /// Registers or replaces a slice definition and builds its buckets.
    pub fn define_slice(&self, index_id: &str, table: &str, cell: &str) -> StoreResult<()> {
        self.state.borrow_mut().define_slice(index_id, table, cell)
    }

    // --- reads -------------------------------------------------------------

    pub fn get_row(&self, table: &str, row_id: &str) -> Option<Row> {
        self.state.borrow().tables.get(table)?.get(row_id).cloned()
    }

    pub fn get_cell(&self, table: &str, row_id: &str, cell: &str) -> Option<CellValue> {
        self.state
            .borrow()
            .tables
            .get(table)?
            .get(row_id)?
            .get(cell)
            .cloned()
    }

    pub fn get_value(&self, name: &str) -> Option<CellValue> {
        self.state.borrow().values.get(name).cloned()
    }

    /// Row ids of a table in insertion order.
    pub fn row_ids(&self, table: &str) -> Vec<String> {
        self.state
            .borrow()
            .tables
            .get(table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .borrow()
            .tables
            .get(table)
            .map_or(0, TableRows::len)
    }

    /// Names of the declared tables.
    pub fn table_names(&self) -> Vec<String> {
        self.state.borrow().tables_schema.table_names()
    }

    /// Names of the declared top-level values.
    pub fn value_names(&self) -> Vec<String> {
        self.state.borrow().values_schema.value_names()
    }

    /// Ordered row-ids currently in one slice bucket. Unknown or empty
    /// keys yield an empty sequence.
    pub fn slice_row_ids(&self, index_id: &str, key: &str) -> Vec<String> {
        self.state.borrow().indexes.slice_row_ids(index_id, key)
    }

    /// Non-empty bucket keys of one slice index.
    pub fn slice_keys(&self, index_id: &str) -> Vec<String> {
        self.state.borrow().indexes.slice_keys(index_id)
    }

    /// Full serializable copy of tables and values.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.borrow();
        Snapshot {
            tables: state.tables.clone(),
            values: state.values.clone(),
        }
    }

    // --- subscriptions -----------------------------------------------------

    pub fn add_listener(
        &self,
        scope: ListenerScope,
        listener: impl FnMut(&Store, &ChangeEvent) + 'static,
    ) -> ListenerId {
        let shared: SharedListener = Rc::new(RefCell::new(listener));
        self.listeners.borrow_mut().add(scope, shared)
    }

    pub fn add_table_listener(
        &self,
        table: &str,
        listener: impl FnMut(&Store, &ChangeEvent) + 'static,
    ) -> ListenerId {
        self.add_listener(
            ListenerScope::Table {
                table: table.to_string(),
            },
            listener,
        )
    }

    pub fn add_row_listener(
        &self,
        table: &str,
        row_id: &str,
        listener: impl FnMut(&Store, &ChangeEvent) + 'static,
    ) -> ListenerId {
        self.add_listener(
            ListenerScope::Row {
                table: table.to_string(),
                row_id: row_id.to_string(),
            },
            listener,
        )
    }

    pub fn add_cell_listener(
        &self,
        table: &str,
        row_id: &str,
        cell: &str,
        listener: impl FnMut(&Store, &ChangeEvent) + 'static,
    ) -> ListenerId {
        self.add_listener(
            ListenerScope::Cell {
                table: table.to_string(),
                row_id: row_id.to_string(),
                cell: cell.to_string(),
            },
            listener,
        )
    }

    pub fn add_value_listener(
        &self,
        name: &str,
        listener: impl FnMut(&Store, &ChangeEvent) + 'static,
    ) -> ListenerId {
        self.add_listener(
            ListenerScope::Value {
                name: name.to_string(),
            },
            listener,
        )
    }

    pub fn add_slice_listener(
        &self,
        index_id: &str,
        key: &str,
        listener: impl FnMut(&Store, &ChangeEvent) + 'static,
    ) -> ListenerId {
        self.add_listener(
            ListenerScope::Slice {
                index_id: index_id.to_string(),
                key: key.to_string(),
            },
            listener,
        )
    }

    /// Releases one listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(id)
    }

    /// Detaches every listener. Used by session teardown.
    pub fn clear_listeners(&self) {
        self.listeners.borrow_mut().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    // --- dispatch ----------------------------------------------------------

    fn enqueue(&self, op: QueuedOp) {
        self.dispatch.queued.borrow_mut().push_back(op);
    }

    fn finish(&self, change: Option<ChangeSet>) {
        if let Some(change) = change {
            self.notify(&change);
        }
        self.drain_queue();
    }

    fn notify(&self, change: &ChangeSet) {
        let matched = self.listeners.borrow().matches(change);
        if matched.is_empty() {
            return;
        }
        let previous = self.dispatch.in_pass.replace(true);
        for (listener, event) in matched {
            (&mut *listener.borrow_mut())(self, &event);
        }
        self.dispatch.in_pass.set(previous);
    }

    /// Commits mutations deferred during a notification pass, each with
    /// its own notification pass. A deferred commit that no longer applies
    /// is dropped with a warning.
    fn drain_queue(&self) {
        loop {
            let next = self.dispatch.queued.borrow_mut().pop_front();
            let Some(op) = next else {
                break;
            };
            if let Err(err) = self.run_queued(op) {
                warn!("event=deferred_mutation module=store status=dropped error={err}");
            }
        }
    }

    fn run_queued(&self, op: QueuedOp) -> StoreResult<()> {
        let change = match op {
            QueuedOp::SetRow {
                table,
                row_id,
                cells,
            } => self.state.borrow_mut().apply_set_row(&table, &row_id, cells)?,
            QueuedOp::SetCell {
                table,
                row_id,
                cell,
                value,
            } => self
                .state
                .borrow_mut()
                .apply_set_cell(&table, &row_id, &cell, value)?,
            QueuedOp::DelRow { table, row_id } => {
                self.state.borrow_mut().apply_del_row(&table, &row_id)?
            }
            QueuedOp::SetValue { name, value } => {
                self.state.borrow_mut().apply_set_value(&name, value)?
            }
            QueuedOp::SetContent { snapshot } => {
                Some(self.state.borrow_mut().apply_set_content(snapshot))
            }
        };
        if let Some(change) = change {
            self.notify(&change);
        }
        Ok(())
    }
}

impl StoreState {
    fn validate_set_row(&self, table: &str, row_id: &str, cells: &Row) -> StoreResult<()> {
        if row_id.is_empty() {
            return Err(SchemaViolation::EmptyRowId {
                table: table.to_string(),
            }
            .into());
        }
        self.tables_schema
            .require(table)?
            .normalize_row(table, cells)?;
        Ok(())
    }

    fn validate_set_cell(
        &self,
        table: &str,
        row_id: &str,
        cell: &str,
        value: &CellValue,
    ) -> StoreResult<()> {
        self.tables_schema
            .require(table)?
            .check_cell(table, cell, value)?;
        let exists = self
            .tables
            .get(table)
            .is_some_and(|rows| rows.contains_key(row_id));
        if !exists {
            return Err(StoreError::RowNotFound {
                table: table.to_string(),
                row_id: row_id.to_string(),
            });
        }
        Ok(())
    }

    fn validate_del_row(&self, table: &str) -> StoreResult<()> {
        self.tables_schema.require(table)?;
        Ok(())
    }

    fn validate_set_value(&self, name: &str, value: &CellValue) -> StoreResult<()> {
        self.values_schema.require(name)?.check(name, value)?;
        Ok(())
    }

    fn apply_set_row(
        &mut self,
        table: &str,
        row_id: &str,
        cells: Row,
    ) -> StoreResult<Option<ChangeSet>> {
        if row_id.is_empty() {
            return Err(SchemaViolation::EmptyRowId {
                table: table.to_string(),
            }
            .into());
        }
        let normalized = self
            .tables_schema
            .require(table)?
            .normalize_row(table, &cells)?;
        let Some(rows) = self.tables.get_mut(table) else {
            return Err(SchemaViolation::UnknownTable(table.to_string()).into());
        };
        let old = rows.get(row_id).cloned();
        if old.as_ref() == Some(&normalized) {
            return Ok(None);
        }
        let changed: Vec<String> = match &old {
            Some(previous) => normalized
                .iter()
                .filter(|&(name, value)| previous.get(name.as_str()) != Some(value))
                .map(|(name, _)| name.clone())
                .collect(),
            None => normalized.keys().cloned().collect(),
        };
        rows.insert(row_id.to_string(), normalized.clone());
        let slices = self
            .indexes
            .row_upserted(table, row_id, old.as_ref(), &normalized);
        Ok(Some(ChangeSet::RowUpsert {
            table: table.to_string(),
            row_id: row_id.to_string(),
            cells: changed,
            slices,
        }))
    }

    fn apply_set_cell(
        &mut self,
        table: &str,
        row_id: &str,
        cell: &str,
        value: CellValue,
    ) -> StoreResult<Option<ChangeSet>> {
        self.tables_schema
            .require(table)?
            .check_cell(table, cell, &value)?;
        let Some(rows) = self.tables.get_mut(table) else {
            return Err(SchemaViolation::UnknownTable(table.to_string()).into());
        };
        let Some(existing) = rows.get(row_id) else {
            return Err(StoreError::RowNotFound {
                table: table.to_string(),
                row_id: row_id.to_string(),
            });
        };
        if existing.get(cell) == Some(&value) {
            return Ok(None);
        }
        let old = existing.clone();
        let mut updated = old.clone();
        updated.insert(cell.to_string(), value);
        rows.insert(row_id.to_string(), updated.clone());
        let slices = self.indexes.row_upserted(table, row_id, Some(&old), &updated);
        Ok(Some(ChangeSet::RowUpsert {
            table: table.to_string(),
            row_id: row_id.to_string(),
            cells: vec![cell.to_string()],
            slices,
        }))
    }

    fn apply_del_row(&mut self, table: &str, row_id: &str) -> StoreResult<Option<ChangeSet>> {
        self.tables_schema.require(table)?;
        let Some(rows) = self.tables.get_mut(table) else {
            return Ok(None);
        };
        let Some(old) = rows.shift_remove(row_id) else {
            return Ok(None);
        };
        let slices = self.indexes.row_removed(table, row_id, &old);
        Ok(Some(ChangeSet::RowRemove {
            table: table.to_string(),
            row_id: row_id.to_string(),
            cells: old.keys().cloned().collect(),
            slices,
        }))
    }

    fn apply_set_value(&mut self, name: &str, value: CellValue) -> StoreResult<Option<ChangeSet>> {
        self.values_schema.require(name)?.check(name, &value)?;
        if self.values.get(name) == Some(&value) {
            return Ok(None);
        }
        self.values.insert(name.to_string(), value);
        Ok(Some(ChangeSet::Value {
            name: name.to_string(),
        }))
    }

    fn apply_set_content(&mut self, snapshot: Snapshot) -> ChangeSet {
        let mut slices = self.indexes.all_keys();

        let mut values = BTreeMap::new();
        for (name, schema) in self.values_schema.iter() {
            if let Some(value) = schema.normalize_lenient(name, snapshot.values.get(name)) {
                values.insert(name.clone(), value);
            }
        }

        let mut tables: IndexMap<String, TableRows> = IndexMap::new();
        for (table, schema) in self.tables_schema.iter() {
            let mut rows = TableRows::new();
            if let Some(candidates) = snapshot.tables.get(table) {
                for (row_id, candidate) in candidates {
                    if row_id.is_empty() {
                        continue;
                    }
                    match schema.normalize_row_lenient(candidate) {
                        Some(normalized) => {
                            rows.insert(row_id.clone(), normalized);
                        }
                        None => warn!(
                            "event=snapshot_row_dropped module=store table={table} row_id={row_id}"
                        ),
                    }
                }
            }
            tables.insert(table.clone(), rows);
        }

        self.tables = tables;
        self.values = values;
        self.indexes.rebuild_all(&self.tables);

        slices.extend(self.indexes.all_keys());
        slices.sort();
        slices.dedup();

        ChangeSet::Content {
            tables: self.tables_schema.table_names(),
            values: self.values.keys().cloned().collect(),
            slices,
        }
    }

    fn define_slice(&mut self, index_id: &str, table: &str, cell: &str) -> StoreResult<()> {
        let schema = self.tables_schema.require(table)?;
        if schema.cell_schema(cell).is_none() {
            return Err(SchemaViolation::UnknownCell {
                table: table.to_string(),
                cell: cell.to_string(),
            }
            .into());
        }
        self.indexes.define(index_id, table, cell);
        if let Some(rows) = self.tables.get(table) {
            self.indexes.rebuild_one(index_id, rows);
        }
        Ok(())
    }
}
