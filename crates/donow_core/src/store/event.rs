//! Change events delivered to listeners.

/// What a listener is told about a committed mutation, phrased in the
/// listener's own scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
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

/// Internal description of one committed mutation, used to compute the
/// minimal set of affected listener scopes.
#[derive(Debug, Clone)]
pub(crate) enum ChangeSet {
    RowUpsert {
        table: String,
        row_id: String,
        /// Cell names whose stored value actually changed.
        cells: Vec<String>,
        /// (index, key) pairs whose membership changed.
        slices: Vec<(String, String)>,
    },
    RowRemove {
        table: String,
        row_id: String,
        cells: Vec<String>,
        slices: Vec<(String, String)>,
    },
    Value {
        name: String,
    },
    /// Bulk content replacement: one consolidated notification for table-,
    /// value- and slice-scoped listeners.
    Content {
        tables: Vec<String>,
        values: Vec<String>,
        slices: Vec<(String, String)>,
    },
}
