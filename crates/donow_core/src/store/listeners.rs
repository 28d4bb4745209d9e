//! Scoped listener registry and dispatch matching.
//!
//! # Responsibility
//! - Track (scope, callback) registrations behind stable ids.
//! - Compute, per committed mutation, which listeners it can affect.
//!
//! # Invariants
//! - Listeners are invoked in registration order, at most once per
//!   mutation.
//! - Registration and removal are safe from within a notification pass;
//!   the in-flight pass keeps its snapshot of matched listeners.

use super::engine::Store;
use super::event::{ChangeEvent, ChangeSet};
use std::cell::RefCell;
use std::rc::Rc;

/// Disposable handle for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What a listener wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerScope {
    Table {
        table: String,
    },
    Row {
        table: String,
        row_id: String,
    },
    Cell {
        table: String,
        row_id: String,
        cell: String,
    },
    Value {
        name: String,
    },
    Slice {
        index_id: String,
        key: String,
    },
}

pub(crate) type SharedListener = Rc<RefCell<dyn FnMut(&Store, &ChangeEvent)>>;

struct ListenerEntry {
    id: ListenerId,
    scope: ListenerScope,
    listener: SharedListener,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    entries: Vec<ListenerEntry>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scope: ListenerScope, listener: SharedListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push(ListenerEntry {
            id,
            scope,
            listener,
        });
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Listeners affected by a committed mutation, in registration order,
    /// each paired with the event phrased for its scope.
    pub fn matches(&self, change: &ChangeSet) -> Vec<(SharedListener, ChangeEvent)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                scope_event(&entry.scope, change)
                    .map(|event| (Rc::clone(&entry.listener), event))
            })
            .collect()
    }
}

fn scope_event(scope: &ListenerScope, change: &ChangeSet) -> Option<ChangeEvent> {
    match (scope, change) {
        (
            ListenerScope::Table { table },
            ChangeSet::RowUpsert { table: changed, .. }
            | ChangeSet::RowRemove { table: changed, .. },
        ) if table == changed => Some(ChangeEvent::Table {
            table: table.clone(),
        }),
        (ListenerScope::Table { table }, ChangeSet::Content { tables, .. })
            if tables.contains(table) =>
        {
            Some(ChangeEvent::Table {
                table: table.clone(),
            })
        }
        (
            ListenerScope::Row { table, row_id },
            ChangeSet::RowUpsert {
                table: changed_table,
                row_id: changed_row,
                ..
            }
            | ChangeSet::RowRemove {
                table: changed_table,
                row_id: changed_row,
                ..
            },
        ) if table == changed_table && row_id == changed_row => Some(ChangeEvent::Row {
            table: table.clone(),
            row_id: row_id.clone(),
        }),
        (
            ListenerScope::Cell {
                table,
                row_id,
                cell,
            },
            ChangeSet::RowUpsert {
                table: changed_table,
                row_id: changed_row,
                cells,
                ..
            }
            | ChangeSet::RowRemove {
                table: changed_table,
                row_id: changed_row,
                cells,
                ..
            },
        ) if table == changed_table && row_id == changed_row && cells.contains(cell) => {
            Some(ChangeEvent::Cell {
                table: table.clone(),
                row_id: row_id.clone(),
                cell: cell.clone(),
            })
        }
        (ListenerScope::Value { name }, ChangeSet::Value { name: changed }) if name == changed => {
            Some(ChangeEvent::Value { name: name.clone() })
        }
        (ListenerScope::Value { name }, ChangeSet::Content { values, .. })
            if values.contains(name) =>
        {
            Some(ChangeEvent::Value { name: name.clone() })
        }
        (
            ListenerScope::Slice { index_id, key },
            ChangeSet::RowUpsert { slices, .. }
            | ChangeSet::RowRemove { slices, .. }
            | ChangeSet::Content { slices, .. },
        ) if slices
            .iter()
            .any(|(changed_index, changed_key)| changed_index == index_id && changed_key == key) =>
        {
            Some(ChangeEvent::Slice {
                index_id: index_id.clone(),
                key: key.clone(),
            })
        }
        _ => None,
    }
}
