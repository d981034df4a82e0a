//! Query Backend Seam
//!
//! The relational backend sits outside the core: drivers implement
//! [`QueryBackend`], returning raw cell text plus per-column type names.
//! The engine decodes cells into typed values by mapping the backend's
//! type metadata onto the three supported column types.
//!
//! [`MemoryBackend`] is the built-in deterministic implementation used by
//! the demo binary and the test suite; it stands in for a real driver
//! without shipping one.

use crate::budget::ExecutionBudget;

/// Backend failure surfaced to the isolation layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The query could not be executed
    #[error("query failed: {0}")]
    Query(String),

    /// The execution budget ran out while the backend was working
    #[error("query aborted: {0}")]
    Aborted(String),

    /// The connection handle is closed
    #[error("backend is closed")]
    Closed,
}

/// A typed cell value decoded from backend output
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
}

/// The three column types the decoder distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl ColumnType {
    /// Map a backend type name onto a decoder type; unknown names decode
    /// as text
    pub fn from_type_name(name: &str) -> ColumnType {
        match name.to_ascii_uppercase().as_str() {
            "INT" | "BIGINT" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INTEGER" => {
                ColumnType::Integer
            }
            "DECIMAL" | "FLOAT" | "DOUBLE" | "REAL" => ColumnType::Float,
            _ => ColumnType::Text,
        }
    }
}

/// Column metadata as reported by the backend
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Raw backend type name (e.g. "BIGINT", "DECIMAL", "VARCHAR")
    pub type_name: String,
}

impl Column {
    pub fn new(name: &str, type_name: &str) -> Self {
        Column {
            name: name.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

/// Raw query output: column metadata plus untyped cell text
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<String>>,
}

/// One decoded row: column name paired with its typed value, in column order
pub type DecodedRow = Vec<(String, SqlValue)>;

/// Decode raw rows into typed values, truncated to `max_rows`
///
/// Cell parsing follows the column's backend type; rows whose cells fail
/// to parse are skipped rather than failing the whole set.
pub fn decode_rows(row_set: &RowSet, max_rows: usize) -> Vec<DecodedRow> {
    let column_types: Vec<ColumnType> = row_set
        .columns
        .iter()
        .map(|c| ColumnType::from_type_name(&c.type_name))
        .collect();

    let mut decoded = Vec::new();
    for raw_row in &row_set.rows {
        if decoded.len() >= max_rows {
            break;
        }
        if let Some(row) = decode_row(&row_set.columns, &column_types, raw_row) {
            decoded.push(row);
        }
    }
    decoded
}

fn decode_row(
    columns: &[Column],
    types: &[ColumnType],
    raw: &[String],
) -> Option<DecodedRow> {
    if raw.len() != columns.len() {
        return None;
    }
    let mut row = Vec::with_capacity(raw.len());
    for ((column, ty), cell) in columns.iter().zip(types).zip(raw) {
        let value = match ty {
            ColumnType::Integer => SqlValue::Int(cell.parse().ok()?),
            ColumnType::Float => SqlValue::Float(cell.parse().ok()?),
            ColumnType::Text => SqlValue::Text(cell.clone()),
        };
        row.push((column.name.clone(), value));
    }
    Some(row)
}

/// The backend contract the engine executes templates against
pub trait QueryBackend: Send + Sync {
    /// Run one query template; implementations should poll the budget and
    /// abort early when it runs out
    fn run_query(&self, template: &str, budget: &ExecutionBudget) -> Result<RowSet, BackendError>;

    /// Release the underlying connection handle
    fn close(&self) -> Result<(), BackendError>;
}

/// Deterministic in-memory backend
///
/// Ignores the template's semantics and serves a fixed sales dataset,
/// playing the role of a real driver in demos and tests.
pub struct MemoryBackend {
    row_set: RowSet,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            row_set: RowSet {
                columns: vec![
                    Column::new("name", "VARCHAR"),
                    Column::new("region", "VARCHAR"),
                    Column::new("amount", "DECIMAL"),
                    Column::new("year", "INT"),
                ],
                rows: vec![
                    row(&["Acme Industrial", "north", "1250000.50", "2025"]),
                    row(&["Blue Harbor Ltd", "east", "980000.00", "2025"]),
                    row(&["Cascade Trading", "north", "1745300.25", "2024"]),
                    row(&["Delta Logistics", "south", "432000.75", "2025"]),
                ],
            },
        }
    }

    /// Backend serving an arbitrary fixed row set
    pub fn with_rows(columns: Vec<Column>, rows: Vec<Vec<String>>) -> Self {
        MemoryBackend {
            row_set: RowSet { columns, rows },
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new()
    }
}

impl QueryBackend for MemoryBackend {
    fn run_query(&self, _template: &str, budget: &ExecutionBudget) -> Result<RowSet, BackendError> {
        budget
            .check()
            .map_err(|e| BackendError::Aborted(e.to_string()))?;
        Ok(self.row_set.clone())
    }

    fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_map_onto_decoder_types() {
        assert_eq!(ColumnType::from_type_name("BIGINT"), ColumnType::Integer);
        assert_eq!(ColumnType::from_type_name("decimal"), ColumnType::Float);
        assert_eq!(ColumnType::from_type_name("VARCHAR"), ColumnType::Text);
        assert_eq!(ColumnType::from_type_name("GEOMETRY"), ColumnType::Text);
    }

    #[test]
    fn decode_infers_types_per_column() {
        let backend = MemoryBackend::new();
        let rows = backend
            .run_query("SELECT ...", &ExecutionBudget::unbounded())
            .unwrap();
        let decoded = decode_rows(&rows, 100);
        assert_eq!(decoded.len(), 4);
        let first = &decoded[0];
        assert_eq!(first[0].1, SqlValue::Text("Acme Industrial".to_string()));
        assert_eq!(first[2].1, SqlValue::Float(1_250_000.50));
        assert_eq!(first[3].1, SqlValue::Int(2025));
    }

    #[test]
    fn decode_truncates_to_max_rows() {
        let backend = MemoryBackend::new();
        let rows = backend
            .run_query("SELECT ...", &ExecutionBudget::unbounded())
            .unwrap();
        assert_eq!(decode_rows(&rows, 2).len(), 2);
    }

    #[test]
    fn unparsable_cells_skip_the_row() {
        let row_set = RowSet {
            columns: vec![Column::new("n", "INT")],
            rows: vec![vec!["12".to_string()], vec!["not-a-number".to_string()]],
        };
        let decoded = decode_rows(&row_set, 10);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0][0].1, SqlValue::Int(12));
    }

    #[test]
    fn expired_budget_aborts_the_query() {
        let backend = MemoryBackend::new();
        let budget = ExecutionBudget::with_timeout(std::time::Duration::ZERO);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let err = backend.run_query("SELECT ...", &budget).unwrap_err();
        assert!(matches!(err, BackendError::Aborted(_)));
    }
}
