//! Cell/value type system and schema validation.
//!
//! # Responsibility
//! - Define the declared shape of table rows and top-level values.
//! - Normalize candidate writes: strip unknown fields, fill defaults.
//! - Reject type-mismatched writes without coercion.
//!
//! # Invariants
//! - Every mutation path runs through the strict gate before commit.
//! - The lenient path (persisted-state loads) drops bad cells instead of
//!   failing startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SchemaResult<T> = Result<T, SchemaViolation>;

/// A row as stored: cell name to cell value.
pub type Row = BTreeMap<String, CellValue>;

/// Declared type of a cell or top-level value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    String,
    Boolean,
    Number,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Number => "number",
        }
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar stored in a cell or value slot.
///
/// Serialized untagged so snapshots read as plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn cell_type(&self) -> CellType {
        match self {
            Self::Text(_) => CellType::String,
            Self::Bool(_) => CellType::Boolean,
            Self::Number(_) => CellType::Number,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Rendered form used as a slice bucket key.
    pub fn to_key(&self) -> String {
        self.to_string()
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

/// A rejected write, naming the offending field and the expected type.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    UnknownTable(String),
    UnknownValue(String),
    UnknownCell {
        table: String,
        cell: String,
    },
    MissingCell {
        table: String,
        cell: String,
        expected: CellType,
    },
    CellTypeMismatch {
        table: String,
        cell: String,
        expected: CellType,
    },
    ValueTypeMismatch {
        name: String,
        expected: CellType,
    },
    ValueNotAllowed {
        name: String,
        got: String,
    },
    EmptyRowId {
        table: String,
    },
}

impl Display for SchemaViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTable(table) => write!(f, "unknown table `{table}`"),
            Self::UnknownValue(name) => write!(f, "unknown value `{name}`"),
            Self::UnknownCell { table, cell } => {
                write!(f, "unknown cell `{table}.{cell}`")
            }
            Self::MissingCell {
                table,
                cell,
                expected,
            } => write!(
                f,
                "missing required cell `{table}.{cell}` of type {expected}"
            ),
            Self::CellTypeMismatch {
                table,
                cell,
                expected,
            } => write!(f, "cell `{table}.{cell}` expects {expected}"),
            Self::ValueTypeMismatch { name, expected } => {
                write!(f, "value `{name}` expects {expected}")
            }
            Self::ValueNotAllowed { name, got } => {
                write!(f, "value `{name}` does not allow `{got}`")
            }
            Self::EmptyRowId { table } => {
                write!(f, "row id for table `{table}` must be a non-empty string")
            }
        }
    }
}

impl Error for SchemaViolation {}

/// Declared shape of one cell: type plus optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSchema {
    pub cell_type: CellType,
    pub default: Option<CellValue>,
}

impl CellSchema {
    /// A required cell of the given type.
    pub fn of(cell_type: CellType) -> Self {
        Self {
            cell_type,
            default: None,
        }
    }

    /// An optional cell whose type is inferred from its default.
    pub fn with_default(default: impl Into<CellValue>) -> Self {
        let default = default.into();
        Self {
            cell_type: default.cell_type(),
            default: Some(default),
        }
    }
}

/// Declared shape of one table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSchema {
    cells: BTreeMap<String, CellSchema>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(mut self, name: &str, schema: CellSchema) -> Self {
        self.cells.insert(name.to_string(), schema);
        self
    }

    pub fn cell_schema(&self, name: &str) -> Option<&CellSchema> {
        self.cells.get(name)
    }

    /// Validates a single-cell write.
    pub fn check_cell(&self, table: &str, cell: &str, value: &CellValue) -> SchemaResult<()> {
        let schema = self
            .cells
            .get(cell)
            .ok_or_else(|| SchemaViolation::UnknownCell {
                table: table.to_string(),
                cell: cell.to_string(),
            })?;
        if value.cell_type() != schema.cell_type {
            return Err(SchemaViolation::CellTypeMismatch {
                table: table.to_string(),
                cell: cell.to_string(),
                expected: schema.cell_type,
            });
        }
        Ok(())
    }

    /// Strict normalization for mutations.
    ///
    /// Unknown candidate cells are stripped; declared cells must either be
    /// present with the declared type or carry a default. No coercion.
    pub fn normalize_row(&self, table: &str, candidate: &Row) -> SchemaResult<Row> {
        let mut normalized = Row::new();
        for (name, schema) in &self.cells {
            match candidate.get(name) {
                Some(value) => {
                    if value.cell_type() != schema.cell_type {
                        return Err(SchemaViolation::CellTypeMismatch {
                            table: table.to_string(),
                            cell: name.clone(),
                            expected: schema.cell_type,
                        });
                    }
                    normalized.insert(name.clone(), value.clone());
                }
                None => match &schema.default {
                    Some(default) => {
                        normalized.insert(name.clone(), default.clone());
                    }
                    None => {
                        return Err(SchemaViolation::MissingCell {
                            table: table.to_string(),
                            cell: name.clone(),
                            expected: schema.cell_type,
                        });
                    }
                },
            }
        }
        Ok(normalized)
    }

    /// Lenient normalization for persisted-state loads.
    ///
    /// Type-mismatched cells are treated as absent and re-defaulted. Returns
    /// `None` when a required cell cannot be recovered, in which case the
    /// caller drops the row.
    pub fn normalize_row_lenient(&self, candidate: &Row) -> Option<Row> {
        let mut normalized = Row::new();
        for (name, schema) in &self.cells {
            let supplied = candidate
                .get(name)
                .filter(|value| value.cell_type() == schema.cell_type);
            match (supplied, &schema.default) {
                (Some(value), _) => {
                    normalized.insert(name.clone(), value.clone());
                }
                (None, Some(default)) => {
                    normalized.insert(name.clone(), default.clone());
                }
                (None, None) => return None,
            }
        }
        Some(normalized)
    }
}

/// Declared shape of every table in the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TablesSchema {
    tables: BTreeMap<String, TableSchema>,
}

impl TablesSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: &str, schema: TableSchema) -> Self {
        self.tables.insert(name.to_string(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn require(&self, name: &str) -> SchemaResult<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaViolation::UnknownTable(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TableSchema)> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}

/// Declared shape of one top-level value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSchema {
    pub value_type: CellType,
    pub default: Option<CellValue>,
    pub allowed: Option<Vec<CellValue>>,
}

impl ValueSchema {
    pub fn of(value_type: CellType) -> Self {
        Self {
            value_type,
            default: None,
            allowed: None,
        }
    }

    pub fn with_default(default: impl Into<CellValue>) -> Self {
        let default = default.into();
        Self {
            value_type: default.cell_type(),
            default: Some(default),
            allowed: None,
        }
    }

    /// Restricts the value to an enumerated set.
    pub fn allow(mut self, allowed: Vec<CellValue>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn check(&self, name: &str, value: &CellValue) -> SchemaResult<()> {
        if value.cell_type() != self.value_type {
            return Err(SchemaViolation::ValueTypeMismatch {
                name: name.to_string(),
                expected: self.value_type,
            });
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                return Err(SchemaViolation::ValueNotAllowed {
                    name: name.to_string(),
                    got: value.to_key(),
                });
            }
        }
        Ok(())
    }

    /// Lenient normalization for persisted values: an invalid or absent
    /// candidate falls back to the declared default.
    pub fn normalize_lenient(&self, name: &str, candidate: Option<&CellValue>) -> Option<CellValue> {
        match candidate {
            Some(value) if self.check(name, value).is_ok() => Some(value.clone()),
            _ => self.default.clone(),
        }
    }
}

/// Declared shape of the flat values map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValuesSchema {
    values: BTreeMap<String, ValueSchema>,
}

impl ValuesSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: &str, schema: ValueSchema) -> Self {
        self.values.insert(name.to_string(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ValueSchema> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> SchemaResult<&ValueSchema> {
        self.values
            .get(name)
            .ok_or_else(|| SchemaViolation::UnknownValue(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ValueSchema)> {
        self.values.iter()
    }

    pub fn value_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Declared defaults, used to seed a fresh store.
    pub fn defaults(&self) -> BTreeMap<String, CellValue> {
        self.values
            .iter()
            .filter_map(|(name, schema)| {
                schema
                    .default
                    .clone()
                    .map(|default| (name.clone(), default))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{CellSchema, CellType, CellValue, Row, SchemaViolation, TableSchema, ValueSchema};

    fn sample_schema() -> TableSchema {
        TableSchema::new()
            .cell("id", CellSchema::of(CellType::String))
            .cell("text", CellSchema::of(CellType::String))
            .cell("completed", CellSchema::with_default(false))
            .cell("createdAt", CellSchema::of(CellType::Number))
            .cell("type", CellSchema::with_default("Now"))
    }

    fn sample_row() -> Row {
        Row::from([
            ("id".to_string(), CellValue::from("1")),
            ("text".to_string(), CellValue::from("a")),
            ("createdAt".to_string(), CellValue::from(1_i64)),
        ])
    }

    #[test]
    fn normalize_row_fills_defaults() {
        let normalized = sample_schema()
            .normalize_row("todos", &sample_row())
            .expect("row with defaults omitted should normalize");
        assert_eq!(normalized.get("completed"), Some(&CellValue::Bool(false)));
        assert_eq!(
            normalized.get("type"),
            Some(&CellValue::Text("Now".to_string()))
        );
    }

    #[test]
    fn normalize_row_strips_unknown_cells() {
        let mut row = sample_row();
        row.insert("bogus".to_string(), CellValue::from("x"));
        let normalized = sample_schema()
            .normalize_row("todos", &row)
            .expect("unknown cells should be stripped, not rejected");
        assert!(!normalized.contains_key("bogus"));
    }

    #[test]
    fn normalize_row_rejects_type_mismatch_without_coercion() {
        let mut row = sample_row();
        row.insert("completed".to_string(), CellValue::from("yes"));
        let err = sample_schema()
            .normalize_row("todos", &row)
            .expect_err("string into boolean cell must be rejected");
        assert_eq!(
            err,
            SchemaViolation::CellTypeMismatch {
                table: "todos".to_string(),
                cell: "completed".to_string(),
                expected: CellType::Boolean,
            }
        );
    }

    #[test]
    fn normalize_row_rejects_missing_required_cell() {
        let mut row = sample_row();
        row.remove("text");
        let err = sample_schema()
            .normalize_row("todos", &row)
            .expect_err("missing required cell must be rejected");
        assert!(matches!(err, SchemaViolation::MissingCell { cell, .. } if cell == "text"));
    }

    #[test]
    fn lenient_normalization_redefaults_bad_cells_and_drops_bad_rows() {
        let schema = sample_schema();

        let mut fixable = sample_row();
        fixable.insert("type".to_string(), CellValue::from(7_i64));
        let normalized = schema
            .normalize_row_lenient(&fixable)
            .expect("invalid defaulted cell should be re-defaulted");
        assert_eq!(
            normalized.get("type"),
            Some(&CellValue::Text("Now".to_string()))
        );

        let mut broken = sample_row();
        broken.insert("text".to_string(), CellValue::from(true));
        assert!(schema.normalize_row_lenient(&broken).is_none());
    }

    #[test]
    fn value_enumeration_is_enforced() {
        let schema = ValueSchema::with_default("Now").allow(vec![
            CellValue::from("Now"),
            CellValue::from("Later"),
            CellValue::from("Future"),
        ]);

        schema
            .check("selectedType", &CellValue::from("Later"))
            .expect("allowed value should pass");
        let err = schema
            .check("selectedType", &CellValue::from("Whenever"))
            .expect_err("value outside the enumeration must be rejected");
        assert!(matches!(err, SchemaViolation::ValueNotAllowed { .. }));
    }

    #[test]
    fn lenient_value_normalization_falls_back_to_default() {
        let schema = ValueSchema::with_default("Now").allow(vec![
            CellValue::from("Now"),
            CellValue::from("Later"),
        ]);

        assert_eq!(
            schema.normalize_lenient("selectedType", Some(&CellValue::from("Bogus"))),
            Some(CellValue::from("Now"))
        );
        assert_eq!(
            schema.normalize_lenient("selectedType", None),
            Some(CellValue::from("Now"))
        );
        assert_eq!(
            schema.normalize_lenient("selectedType", Some(&CellValue::from("Later"))),
            Some(CellValue::from("Later"))
        );
    }

    #[test]
    fn cell_value_keys_render_scalars() {
        assert_eq!(CellValue::from("Now").to_key(), "Now");
        assert_eq!(CellValue::from(true).to_key(), "true");
        assert_eq!(CellValue::from(3_i64).to_key(), "3");
    }
}
