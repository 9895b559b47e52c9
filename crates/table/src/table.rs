use crate::cell::CellValue;
use crate::error::{Result, TableError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A row is an ordered mapping from column name to cell value.
///
/// A row may be missing keys; a missing key reads as [`CellValue::Null`].
pub type Row = IndexMap<String, CellValue>;

static NULL_CELL: CellValue = CellValue::Null;

/// The engine's core value: an ordered sequence of unique column names plus
/// an ordered sequence of rows.
///
/// Tables are self-contained — operations and merges never mutate their
/// input, they return a new `Table` built from new row objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Create an empty table with the given column names.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::DuplicateColumnName`] if a name repeats.
    pub fn new<S: Into<String>>(columns: Vec<S>) -> Result<Self> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        check_unique(&columns)?;
        Ok(Table {
            columns,
            rows: Vec::new(),
        })
    }

    /// Create a table from column names and pre-built rows.
    ///
    /// Row keys that are not declared columns are dropped, so the invariant
    /// that every row's keys are a subset of the columns holds by
    /// construction.
    pub fn from_rows<S: Into<String>>(columns: Vec<S>, rows: Vec<Row>) -> Result<Self> {
        let mut table = Table::new(columns)?;
        for row in rows {
            table.push_row(row);
        }
        Ok(table)
    }

    /// Get the column names, in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get the rows, in order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Get the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check whether a column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Position of a column in the declared order.
    #[must_use]
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Get a row by index.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Get a cell by row index and column name.
    ///
    /// Out-of-range indices and missing keys read as [`CellValue::Null`].
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&NULL_CELL)
    }

    /// Get a cell by 0-based row and column indices, following the declared
    /// column order. Used by the formula evaluator to resolve A1 references.
    #[must_use]
    pub fn cell_at(&self, row: usize, col: usize) -> &CellValue {
        match self.columns.get(col) {
            Some(name) => self.cell(row, name),
            None => &NULL_CELL,
        }
    }

    /// Append a row, dropping any keys that are not declared columns.
    pub fn push_row(&mut self, row: Row) {
        let filtered: Row = row
            .into_iter()
            .filter(|(key, _)| self.has_column(key))
            .collect();
        self.rows.push(filtered);
    }

    /// Set a single cell. No-op if the column is not declared or the row
    /// index is out of range.
    pub fn set_cell(&mut self, row: usize, column: &str, value: CellValue) {
        if !self.has_column(column) {
            return;
        }
        if let Some(r) = self.rows.get_mut(row) {
            r.insert(column.to_string(), value);
        }
    }

    /// Build a fresh row containing the named columns' values from an
    /// existing row. Columns the source row is missing stay missing.
    #[must_use]
    pub fn project_row(row: &Row, columns: &[String]) -> Row {
        let mut out = Row::new();
        for name in columns {
            if let Some(value) = row.get(name) {
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }
}

fn check_unique(columns: &[String]) -> Result<()> {
    for (i, name) in columns.iter().enumerate() {
        if columns[..i].contains(name) {
            return Err(TableError::DuplicateColumnName { name: name.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_new_rejects_duplicate_columns() {
        let err = Table::new(vec!["a", "b", "a"]).unwrap_err();
        assert!(matches!(err, TableError::DuplicateColumnName { name } if name == "a"));
    }

    #[test]
    fn test_missing_key_reads_as_null() {
        let table = Table::from_rows(
            vec!["name", "score"],
            vec![row(&[("name", CellValue::from("Zhang"))])],
        )
        .unwrap();
        assert_eq!(table.cell(0, "score"), &CellValue::Null);
        assert_eq!(table.cell(0, "name"), &CellValue::from("Zhang"));
    }

    #[test]
    fn test_push_row_drops_undeclared_keys() {
        let mut table = Table::new(vec!["a"]).unwrap();
        table.push_row(row(&[
            ("a", CellValue::Int(1)),
            ("stray", CellValue::Int(2)),
        ]));
        assert_eq!(table.row(0).unwrap().len(), 1);
        assert_eq!(table.cell(0, "stray"), &CellValue::Null);
    }

    #[test]
    fn test_cell_at_follows_column_order() {
        let table = Table::from_rows(
            vec!["a", "b"],
            vec![row(&[
                ("a", CellValue::Int(1)),
                ("b", CellValue::Int(2)),
            ])],
        )
        .unwrap();
        assert_eq!(table.cell_at(0, 1), &CellValue::Int(2));
        assert_eq!(table.cell_at(0, 9), &CellValue::Null);
        assert_eq!(table.cell_at(9, 0), &CellValue::Null);
    }
}
