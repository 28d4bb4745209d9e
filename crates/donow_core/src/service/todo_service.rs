//! Todo use-case service.
//!
//! # Responsibility
//! - Provide the mutation verbs that back completed UI affordances:
//!   create, toggle-complete, rename, delete, change active filter.
//! - Delegate all state handling to the store.
//!
//! # Invariants
//! - Service APIs never bypass store validation.
//! - The service holds a handle, not the state; multiple services over
//!   one store see the same data.

use crate::model::todo::{
    Todo, TodoKind, CELL_COMPLETED, CELL_TEXT, KIND_SLICE, SELECTED_KIND, TODOS_TABLE,
};
use crate::store::{Store, StoreError, StoreResult};

/// Use-case wrapper over one store handle.
pub struct TodoService {
    store: Store,
}

impl TodoService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Creates a todo with a generated id and returns the id.
    pub fn create_todo(&self, text: impl Into<String>, kind: TodoKind) -> StoreResult<String> {
        let todo = Todo::new(text, kind);
        self.store.set_row(TODOS_TABLE, &todo.id, todo.to_row())?;
        Ok(todo.id)
    }

    /// Flips completion state and returns the new state.
    pub fn toggle_todo(&self, id: &str) -> StoreResult<bool> {
        let row = self
            .store
            .get_row(TODOS_TABLE, id)
            .ok_or_else(|| StoreError::RowNotFound {
                table: TODOS_TABLE.to_string(),
                row_id: id.to_string(),
            })?;
        let completed = row
            .get(CELL_COMPLETED)
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        let next = !completed;
        self.store.set_cell(TODOS_TABLE, id, CELL_COMPLETED, next)?;
        Ok(next)
    }

    /// Replaces the todo's text, the confirmed edit flow.
    pub fn rename_todo(&self, id: &str, text: &str) -> StoreResult<()> {
        self.store.set_cell(TODOS_TABLE, id, CELL_TEXT, text)
    }

    /// Deletes a todo. Idempotent, matching the store contract.
    pub fn delete_todo(&self, id: &str) -> StoreResult<()> {
        self.store.del_row(TODOS_TABLE, id)
    }

    /// Switches the active kind filter.
    pub fn select_kind(&self, kind: TodoKind) -> StoreResult<()> {
        self.store.set_value(SELECTED_KIND, kind.as_str())
    }

    /// Active kind filter, defaulting to `Now` when unset or invalid.
    pub fn selected_kind(&self) -> TodoKind {
        self.store
            .get_value(SELECTED_KIND)
            .and_then(|value| value.as_text().and_then(TodoKind::parse))
            .unwrap_or(TodoKind::Now)
    }

    pub fn todo(&self, id: &str) -> Option<Todo> {
        let row = self.store.get_row(TODOS_TABLE, id)?;
        Todo::from_row(&row)
    }

    /// Todos of the active filter, in slice order.
    pub fn visible_todos(&self) -> Vec<Todo> {
        let kind = self.selected_kind();
        self.store
            .slice_row_ids(KIND_SLICE, kind.as_str())
            .iter()
            .filter_map(|id| self.todo(id))
            .collect()
    }
}
