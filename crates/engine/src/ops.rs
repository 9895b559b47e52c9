//! The closed set of table transformation operations.
//!
//! Each operation is a pure function `(Table, params) -> Table`: the input
//! table is never mutated and every output row is a fresh object built
//! against the output column set. Parameters referencing columns or indices
//! that do not exist degrade to no-ops or null fills; the only hard failure
//! is an unknown operation kind, which serde rejects at the deserialization
//! boundary before it can reach [`apply`].

use crate::error::{EngineError, Result};
use crate::merge::{self, MergeSpec};
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tabfuse_formulas::A1Evaluator;
use tabfuse_table::{CellValue, Row, Table};

/// Row predicate for [`Operation::FilterRows`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterPredicate {
    Equals { value: String },
    NotEquals { value: String },
    Contains { value: String },
    /// Regex match; a malformed pattern excludes every row instead of
    /// raising an error.
    Matches { pattern: String },
    Empty,
    NotEmpty,
    GreaterThan { value: String },
    GreaterOrEqual { value: String },
    LessThan { value: String },
    LessOrEqual { value: String },
}

/// Case target for [`Operation::NormalizeCase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    Upper,
    Lower,
}

/// Coercion target for [`Operation::ConvertType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTarget {
    String,
    Number,
    Boolean,
}

/// One key of a multi-key sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

/// Which end of the table [`Operation::SliceRows`] keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceEnd {
    First,
    Last,
}

/// The closed set of operation kinds.
///
/// The enum is matched exhaustively in [`apply_with_evaluator`], so adding a
/// kind is a localized, compiler-enforced change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Remove the row at `index`; out of range is a no-op.
    DeleteRow { index: usize },
    /// Set `column` to `value` wherever its comparable value is empty or
    /// absent. Never overwrites a non-empty value.
    FillNull { column: String, value: CellValue },
    /// Keep the first row per signature over `columns` (all columns when the
    /// list is empty), drop subsequent rows.
    RemoveDuplicates { columns: Vec<String> },
    /// Rename a column, preserving position and cell values. No-op if the
    /// old name is absent or the new name is already taken.
    RenameColumn { from: String, to: String },
    /// Strip leading/trailing whitespace on string cells of `columns`.
    TrimWhitespace { columns: Vec<String> },
    /// Remove a column and its values from every row; no-op if absent.
    DropColumn { column: String },
    /// Keep rows whose `column` cell matches the predicate.
    FilterRows {
        column: String,
        predicate: FilterPredicate,
    },
    /// Upper- or lower-case string cells of `column`.
    NormalizeCase { column: String, case: CaseMode },
    /// Literal global substring replace across `column`'s string cells.
    ReplaceValue {
        column: String,
        from: String,
        to: String,
    },
    /// Combine with a second table; delegates to the merge engine.
    MergeTables { right: Table, spec: MergeSpec },
    /// Coerce `column` to the target type. Number parse failure yields
    /// null; boolean accepts "true" / "1" / "是" / "yes" case-insensitively.
    ConvertType { column: String, target: TypeTarget },
    /// Split `column` by `separator` into the `into` columns, inserted at
    /// the original column's position; missing parts become empty strings.
    SplitColumn {
        column: String,
        separator: String,
        into: Vec<String>,
    },
    /// Join the string forms of `columns` with `separator` into `into`,
    /// inserted at the first source column's position; sources are removed.
    ConcatColumns {
        columns: Vec<String>,
        separator: String,
        into: String,
    },
    /// Take the first non-empty value among `columns` (left to right) into
    /// `into`; all empty yields null. Sources are removed.
    CoalesceColumns { columns: Vec<String>, into: String },
    /// Stable multi-key sort. Per key, numeric comparison when both
    /// operands parse as numbers, else lexicographic.
    SortRows { keys: Vec<SortKey> },
    /// Append a constant-valued column if not already present.
    AddColumn { column: String, value: CellValue },
    /// Replace `column` values via an exact-match lookup table; unmapped
    /// values pass through unchanged.
    MapValues {
        column: String,
        mapping: IndexMap<String, CellValue>,
    },
    /// Keep the first or last `count` rows.
    SliceRows { end: SliceEnd, count: usize },
    /// Keep a pseudo-random subset of `count` rows, deterministic when a
    /// seed is supplied.
    SampleRows { count: usize, seed: Option<u64> },
    /// Collapse whitespace runs to a single space and trim, per column.
    CollapseWhitespace { columns: Vec<String> },
    /// Remove rows whose checked columns (default: all) are all empty.
    DropEmptyRows { columns: Option<Vec<String>> },
    /// Move the named columns to the front in the given order; unknown
    /// names are ignored and the remainder keeps its original order.
    ReorderColumns { order: Vec<String> },
    /// Replace formula cells in the given (or all) columns with their
    /// evaluated scalar. No-op without an injected evaluator.
    EvaluateFormulas { columns: Option<Vec<String>> },
    /// Replace formula cells with a placeholder value (default null).
    RemoveFormulas { placeholder: Option<CellValue> },
    /// Add a boolean column flagging whether the original row contained
    /// any formula cell.
    FormulaAudit { column: String },
}

/// Fieldless mirror of [`Operation`] used to validate kind names coming
/// from external callers before a full parameter record is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    DeleteRow,
    FillNull,
    RemoveDuplicates,
    RenameColumn,
    TrimWhitespace,
    DropColumn,
    FilterRows,
    NormalizeCase,
    ReplaceValue,
    MergeTables,
    ConvertType,
    SplitColumn,
    ConcatColumns,
    CoalesceColumns,
    SortRows,
    AddColumn,
    MapValues,
    SliceRows,
    SampleRows,
    CollapseWhitespace,
    DropEmptyRows,
    ReorderColumns,
    EvaluateFormulas,
    RemoveFormulas,
    FormulaAudit,
}

impl OperationKind {
    /// Every kind, in registry order.
    pub const ALL: [OperationKind; 25] = [
        OperationKind::DeleteRow,
        OperationKind::FillNull,
        OperationKind::RemoveDuplicates,
        OperationKind::RenameColumn,
        OperationKind::TrimWhitespace,
        OperationKind::DropColumn,
        OperationKind::FilterRows,
        OperationKind::NormalizeCase,
        OperationKind::ReplaceValue,
        OperationKind::MergeTables,
        OperationKind::ConvertType,
        OperationKind::SplitColumn,
        OperationKind::ConcatColumns,
        OperationKind::CoalesceColumns,
        OperationKind::SortRows,
        OperationKind::AddColumn,
        OperationKind::MapValues,
        OperationKind::SliceRows,
        OperationKind::SampleRows,
        OperationKind::CollapseWhitespace,
        OperationKind::DropEmptyRows,
        OperationKind::ReorderColumns,
        OperationKind::EvaluateFormulas,
        OperationKind::RemoveFormulas,
        OperationKind::FormulaAudit,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::DeleteRow => "delete_row",
            OperationKind::FillNull => "fill_null",
            OperationKind::RemoveDuplicates => "remove_duplicates",
            OperationKind::RenameColumn => "rename_column",
            OperationKind::TrimWhitespace => "trim_whitespace",
            OperationKind::DropColumn => "drop_column",
            OperationKind::FilterRows => "filter_rows",
            OperationKind::NormalizeCase => "normalize_case",
            OperationKind::ReplaceValue => "replace_value",
            OperationKind::MergeTables => "merge_tables",
            OperationKind::ConvertType => "convert_type",
            OperationKind::SplitColumn => "split_column",
            OperationKind::ConcatColumns => "concat_columns",
            OperationKind::CoalesceColumns => "coalesce_columns",
            OperationKind::SortRows => "sort_rows",
            OperationKind::AddColumn => "add_column",
            OperationKind::MapValues => "map_values",
            OperationKind::SliceRows => "slice_rows",
            OperationKind::SampleRows => "sample_rows",
            OperationKind::CollapseWhitespace => "collapse_whitespace",
            OperationKind::DropEmptyRows => "drop_empty_rows",
            OperationKind::ReorderColumns => "reorder_columns",
            OperationKind::EvaluateFormulas => "evaluate_formulas",
            OperationKind::RemoveFormulas => "remove_formulas",
            OperationKind::FormulaAudit => "formula_audit",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EngineError::UnknownOperation(s.to_string()))
    }
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::DeleteRow { .. } => OperationKind::DeleteRow,
            Operation::FillNull { .. } => OperationKind::FillNull,
            Operation::RemoveDuplicates { .. } => OperationKind::RemoveDuplicates,
            Operation::RenameColumn { .. } => OperationKind::RenameColumn,
            Operation::TrimWhitespace { .. } => OperationKind::TrimWhitespace,
            Operation::DropColumn { .. } => OperationKind::DropColumn,
            Operation::FilterRows { .. } => OperationKind::FilterRows,
            Operation::NormalizeCase { .. } => OperationKind::NormalizeCase,
            Operation::ReplaceValue { .. } => OperationKind::ReplaceValue,
            Operation::MergeTables { .. } => OperationKind::MergeTables,
            Operation::ConvertType { .. } => OperationKind::ConvertType,
            Operation::SplitColumn { .. } => OperationKind::SplitColumn,
            Operation::ConcatColumns { .. } => OperationKind::ConcatColumns,
            Operation::CoalesceColumns { .. } => OperationKind::CoalesceColumns,
            Operation::SortRows { .. } => OperationKind::SortRows,
            Operation::AddColumn { .. } => OperationKind::AddColumn,
            Operation::MapValues { .. } => OperationKind::MapValues,
            Operation::SliceRows { .. } => OperationKind::SliceRows,
            Operation::SampleRows { .. } => OperationKind::SampleRows,
            Operation::CollapseWhitespace { .. } => OperationKind::CollapseWhitespace,
            Operation::DropEmptyRows { .. } => OperationKind::DropEmptyRows,
            Operation::ReorderColumns { .. } => OperationKind::ReorderColumns,
            Operation::EvaluateFormulas { .. } => OperationKind::EvaluateFormulas,
            Operation::RemoveFormulas { .. } => OperationKind::RemoveFormulas,
            Operation::FormulaAudit { .. } => OperationKind::FormulaAudit,
        }
    }

    /// Whether replaying this operation reproduces the same output.
    /// Only unseeded sampling is non-deterministic.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Operation::SampleRows { seed: None, .. })
    }
}

/// Apply an operation without a formula evaluator; `evaluate_formulas`
/// becomes a no-op.
pub fn apply(table: &Table, operation: &Operation) -> Result<Table> {
    apply_with_evaluator(table, operation, None)
}

/// Apply an operation, resolving `evaluate_formulas` through the injected
/// evaluator when one is supplied.
pub fn apply_with_evaluator(
    table: &Table,
    operation: &Operation,
    evaluator: Option<&A1Evaluator>,
) -> Result<Table> {
    tracing::debug!(
        kind = operation.kind().as_str(),
        rows = table.row_count(),
        "applying operation"
    );
    match operation {
        Operation::DeleteRow { index } => delete_row(table, *index),
        Operation::FillNull { column, value } => fill_null(table, column, value),
        Operation::RemoveDuplicates { columns } => remove_duplicates(table, columns),
        Operation::RenameColumn { from, to } => rename_column(table, from, to),
        Operation::TrimWhitespace { columns } => {
            map_string_cells(table, columns, |s| s.trim().to_string())
        }
        Operation::DropColumn { column } => drop_column(table, column),
        Operation::FilterRows { column, predicate } => filter_rows(table, column, predicate),
        Operation::NormalizeCase { column, case } => {
            let columns = vec![column.clone()];
            match case {
                CaseMode::Upper => map_string_cells(table, &columns, |s| s.to_uppercase()),
                CaseMode::Lower => map_string_cells(table, &columns, |s| s.to_lowercase()),
            }
        }
        Operation::ReplaceValue { column, from, to } => replace_value(table, column, from, to),
        Operation::MergeTables { right, spec } => merge::merge(table, right, spec),
        Operation::ConvertType { column, target } => convert_type(table, column, *target),
        Operation::SplitColumn {
            column,
            separator,
            into,
        } => split_column(table, column, separator, into),
        Operation::ConcatColumns {
            columns,
            separator,
            into,
        } => combine_columns(table, columns, into, |cells| {
            let parts: Vec<String> = cells.iter().map(|c| c.comparable_str()).collect();
            CellValue::String(parts.join(separator))
        }),
        Operation::CoalesceColumns { columns, into } => {
            combine_columns(table, columns, into, |cells| {
                cells
                    .iter()
                    .find(|c| !c.is_empty_value())
                    .map(|c| (*c).clone())
                    .unwrap_or(CellValue::Null)
            })
        }
        Operation::SortRows { keys } => sort_rows(table, keys),
        Operation::AddColumn { column, value } => add_column(table, column, value),
        Operation::MapValues { column, mapping } => map_values(table, column, mapping),
        Operation::SliceRows { end, count } => slice_rows(table, *end, *count),
        Operation::SampleRows { count, seed } => sample_rows(table, *count, *seed),
        Operation::CollapseWhitespace { columns } => {
            map_string_cells(table, columns, collapse_whitespace)
        }
        Operation::DropEmptyRows { columns } => drop_empty_rows(table, columns.as_deref()),
        Operation::ReorderColumns { order } => reorder_columns(table, order),
        Operation::EvaluateFormulas { columns } => {
            evaluate_formulas(table, columns.as_deref(), evaluator)
        }
        Operation::RemoveFormulas { placeholder } => remove_formulas(table, placeholder.as_ref()),
        Operation::FormulaAudit { column } => formula_audit(table, column),
    }
}

static NULL_CELL: CellValue = CellValue::Null;

/// Numeric comparison when both sides parse as numbers, else lexicographic.
fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Tab-joined comparable values over the given columns.
fn row_signature(row: &Row, columns: &[String]) -> String {
    columns
        .iter()
        .map(|name| row.get(name).map(CellValue::comparable_str).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\t")
}

fn rebuilt(columns: Vec<String>, rows: Vec<Row>) -> Result<Table> {
    Ok(Table::from_rows(columns, rows)?)
}

fn delete_row(table: &Table, index: usize) -> Result<Table> {
    let rows = table
        .rows()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, row)| row.clone())
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

fn fill_null(table: &Table, column: &str, value: &CellValue) -> Result<Table> {
    if !table.has_column(column) {
        return Ok(table.clone());
    }
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut out = row.clone();
            let current = out.get(column).unwrap_or(&NULL_CELL);
            if current.is_empty_value() {
                out.insert(column.to_string(), value.clone());
            }
            out
        })
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

fn remove_duplicates(table: &Table, columns: &[String]) -> Result<Table> {
    let key_columns: Vec<String> = if columns.is_empty() {
        table.columns().to_vec()
    } else {
        columns.to_vec()
    };
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(table.row_count());
    for row in table.rows() {
        if seen.insert(row_signature(row, &key_columns)) {
            rows.push(row.clone());
        }
    }
    rebuilt(table.columns().to_vec(), rows)
}

fn rename_column(table: &Table, from: &str, to: &str) -> Result<Table> {
    if from == to || !table.has_column(from) || table.has_column(to) {
        return Ok(table.clone());
    }
    let columns: Vec<String> = table
        .columns()
        .iter()
        .map(|c| if c == from { to.to_string() } else { c.clone() })
        .collect();
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|(key, value)| {
                    let key = if key == from { to.to_string() } else { key.clone() };
                    (key, value.clone())
                })
                .collect()
        })
        .collect();
    rebuilt(columns, rows)
}

/// Apply a string transform to the string cells of the named columns;
/// non-string cells (including formulas) are untouched.
fn map_string_cells<F>(table: &Table, columns: &[String], f: F) -> Result<Table>
where
    F: Fn(&str) -> String,
{
    let targets: Vec<&String> = columns.iter().filter(|c| table.has_column(c)).collect();
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut out = row.clone();
            for column in &targets {
                if let Some(CellValue::String(s)) = out.get(*column) {
                    let updated = f(s);
                    out.insert((*column).clone(), CellValue::String(updated));
                }
            }
            out
        })
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

fn drop_column(table: &Table, column: &str) -> Result<Table> {
    if !table.has_column(column) {
        return Ok(table.clone());
    }
    let columns: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| *c != column)
        .cloned()
        .collect();
    let rows = table
        .rows()
        .iter()
        .map(|row| Table::project_row(row, &columns))
        .collect();
    rebuilt(columns, rows)
}

fn filter_rows(table: &Table, column: &str, predicate: &FilterPredicate) -> Result<Table> {
    // A malformed pattern stays None and excludes every row.
    let regex = match predicate {
        FilterPredicate::Matches { pattern } => Regex::new(pattern).ok(),
        _ => None,
    };
    let rows = table
        .rows()
        .iter()
        .filter(|row| {
            let cell = row.get(column).unwrap_or(&NULL_CELL);
            predicate_matches(cell, predicate, regex.as_ref())
        })
        .cloned()
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

fn predicate_matches(cell: &CellValue, predicate: &FilterPredicate, regex: Option<&Regex>) -> bool {
    match predicate {
        FilterPredicate::Equals { value } => {
            compare_values(&cell.comparable_str(), value) == Ordering::Equal
        }
        FilterPredicate::NotEquals { value } => {
            compare_values(&cell.comparable_str(), value) != Ordering::Equal
        }
        FilterPredicate::Contains { value } => cell.comparable_str().contains(value.as_str()),
        FilterPredicate::Matches { .. } => {
            regex.is_some_and(|re| re.is_match(&cell.comparable_str()))
        }
        FilterPredicate::Empty => cell.is_empty_value(),
        FilterPredicate::NotEmpty => !cell.is_empty_value(),
        FilterPredicate::GreaterThan { value } => {
            compare_values(&cell.comparable_str(), value) == Ordering::Greater
        }
        FilterPredicate::GreaterOrEqual { value } => {
            compare_values(&cell.comparable_str(), value) != Ordering::Less
        }
        FilterPredicate::LessThan { value } => {
            compare_values(&cell.comparable_str(), value) == Ordering::Less
        }
        FilterPredicate::LessOrEqual { value } => {
            compare_values(&cell.comparable_str(), value) != Ordering::Greater
        }
    }
}

fn replace_value(table: &Table, column: &str, from: &str, to: &str) -> Result<Table> {
    if from.is_empty() {
        return Ok(table.clone());
    }
    let columns = vec![column.to_string()];
    map_string_cells(table, &columns, |s| s.replace(from, to))
}

fn convert_type(table: &Table, column: &str, target: TypeTarget) -> Result<Table> {
    if !table.has_column(column) {
        return Ok(table.clone());
    }
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut out = row.clone();
            let cell = out.get(column).unwrap_or(&NULL_CELL);
            let converted = convert_cell(cell, target);
            out.insert(column.to_string(), converted);
            out
        })
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

fn convert_cell(cell: &CellValue, target: TypeTarget) -> CellValue {
    match target {
        TypeTarget::String => match cell.comparable() {
            None => CellValue::String(String::new()),
            Some(value) => CellValue::String(value.to_string()),
        },
        TypeTarget::Number => match cell.comparable() {
            None => CellValue::Null,
            Some(CellValue::Int(i)) => CellValue::Int(*i),
            Some(CellValue::Float(f)) => CellValue::Float(*f),
            Some(value) => {
                let text = value.to_string();
                let text = text.trim();
                if let Ok(i) = text.parse::<i64>() {
                    CellValue::Int(i)
                } else if let Ok(f) = text.parse::<f64>() {
                    CellValue::Float(f)
                } else {
                    CellValue::Null
                }
            }
        },
        TypeTarget::Boolean => {
            let text = cell.comparable_str().trim().to_lowercase();
            CellValue::Bool(matches!(text.as_str(), "true" | "1" | "是" | "yes"))
        }
    }
}

fn split_column(table: &Table, column: &str, separator: &str, into: &[String]) -> Result<Table> {
    let Some(position) = table.column_position(column) else {
        return Ok(table.clone());
    };
    if into.is_empty() || separator.is_empty() {
        return Ok(table.clone());
    }
    // New names must not collide with surviving columns or each other.
    for (i, name) in into.iter().enumerate() {
        if into[..i].contains(name) || (name != column && table.has_column(name)) {
            return Ok(table.clone());
        }
    }

    let mut columns: Vec<String> = Vec::with_capacity(table.column_count() + into.len() - 1);
    for (i, name) in table.columns().iter().enumerate() {
        if i == position {
            columns.extend(into.iter().cloned());
        } else {
            columns.push(name.clone());
        }
    }

    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut out = Table::project_row(row, &columns);
            let text = row
                .get(column)
                .map(CellValue::comparable_str)
                .unwrap_or_default();
            let parts: Vec<&str> = text.split(separator).collect();
            for (i, name) in into.iter().enumerate() {
                let part = parts.get(i).copied().unwrap_or("");
                out.insert(name.clone(), CellValue::String(part.to_string()));
            }
            Table::project_row(&out, &columns)
        })
        .collect();
    rebuilt(columns, rows)
}

/// Shared shape of concat and coalesce: fold the source columns' cells into
/// one value placed at the first source's position, sources removed.
fn combine_columns<F>(table: &Table, sources: &[String], into: &str, f: F) -> Result<Table>
where
    F: Fn(&[&CellValue]) -> CellValue,
{
    let present: Vec<String> = sources
        .iter()
        .filter(|c| table.has_column(c))
        .cloned()
        .collect();
    if present.is_empty() {
        return Ok(table.clone());
    }

    let mut columns: Vec<String> = Vec::with_capacity(table.column_count());
    let mut inserted = false;
    for name in table.columns() {
        if present.contains(name) {
            if !inserted {
                columns.push(into.to_string());
                inserted = true;
            }
        } else {
            columns.push(name.clone());
        }
    }
    // The target name colliding with a surviving column would break the
    // unique-columns invariant; degrade to a no-op.
    if columns.iter().filter(|c| *c == into).count() != 1 {
        return Ok(table.clone());
    }

    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let cells: Vec<&CellValue> = present
                .iter()
                .map(|name| row.get(name).unwrap_or(&NULL_CELL))
                .collect();
            let value = f(&cells);
            let mut out = Table::project_row(row, &columns);
            out.insert(into.to_string(), value);
            Table::project_row(&out, &columns)
        })
        .collect();
    rebuilt(columns, rows)
}

fn sort_rows(table: &Table, keys: &[SortKey]) -> Result<Table> {
    let mut rows: Vec<Row> = table.rows().to_vec();
    rows.sort_by(|a, b| {
        for key in keys {
            let left = a.get(&key.column).map(CellValue::comparable_str).unwrap_or_default();
            let right = b.get(&key.column).map(CellValue::comparable_str).unwrap_or_default();
            let mut ordering = compare_values(&left, &right);
            if key.descending {
                ordering = ordering.reverse();
            }
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        // Final tie: sort_by is stable, relative order is preserved.
        Ordering::Equal
    });
    rebuilt(table.columns().to_vec(), rows)
}

fn add_column(table: &Table, column: &str, value: &CellValue) -> Result<Table> {
    if table.has_column(column) {
        return Ok(table.clone());
    }
    let mut columns = table.columns().to_vec();
    columns.push(column.to_string());
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut out = row.clone();
            out.insert(column.to_string(), value.clone());
            out
        })
        .collect();
    rebuilt(columns, rows)
}

fn map_values(
    table: &Table,
    column: &str,
    mapping: &IndexMap<String, CellValue>,
) -> Result<Table> {
    if !table.has_column(column) {
        return Ok(table.clone());
    }
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut out = row.clone();
            if let Some(cell) = out.get(column) {
                if let Some(mapped) = mapping.get(&cell.comparable_str()) {
                    out.insert(column.to_string(), mapped.clone());
                }
            }
            out
        })
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

fn slice_rows(table: &Table, end: SliceEnd, count: usize) -> Result<Table> {
    let len = table.row_count();
    let count = count.min(len);
    let rows: Vec<Row> = match end {
        SliceEnd::First => table.rows()[..count].to_vec(),
        SliceEnd::Last => table.rows()[len - count..].to_vec(),
    };
    rebuilt(table.columns().to_vec(), rows)
}

fn sample_rows(table: &Table, count: usize, seed: Option<u64>) -> Result<Table> {
    let len = table.row_count();
    let count = count.min(len);
    if count == len {
        return Ok(table.clone());
    }

    let mut indices: Vec<usize> = (0..len).collect();
    match seed {
        Some(seed) => lcg_shuffle(&mut indices, seed),
        None => indices.shuffle(&mut rand::thread_rng()),
    }
    let mut keep: Vec<usize> = indices.into_iter().take(count).collect();
    // Sampling selects rows, it never reorders them.
    keep.sort_unstable();

    let rows = keep
        .into_iter()
        .map(|i| table.rows()[i].clone())
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

/// Fisher-Yates driven by a fixed linear-congruential generator so seeded
/// sampling replays identically across platforms and dependency versions.
fn lcg_shuffle(indices: &mut [usize], seed: u64) {
    let mut state = seed;
    let mut next = || {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        state >> 33
    };
    for i in (1..indices.len()).rev() {
        let j = (next() as usize) % (i + 1);
        indices.swap(i, j);
    }
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

fn drop_empty_rows(table: &Table, columns: Option<&[String]>) -> Result<Table> {
    let checked: Vec<String> = match columns {
        Some(list) if !list.is_empty() => list.to_vec(),
        _ => table.columns().to_vec(),
    };
    let rows = table
        .rows()
        .iter()
        .filter(|row| {
            checked.iter().any(|name| {
                !row.get(name).unwrap_or(&NULL_CELL).is_empty_value()
            })
        })
        .cloned()
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

fn reorder_columns(table: &Table, order: &[String]) -> Result<Table> {
    let mut columns: Vec<String> = Vec::with_capacity(table.column_count());
    for name in order {
        if table.has_column(name) && !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    for name in table.columns() {
        if !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    let rows = table
        .rows()
        .iter()
        .map(|row| Table::project_row(row, &columns))
        .collect();
    rebuilt(columns, rows)
}

fn evaluate_formulas(
    table: &Table,
    columns: Option<&[String]>,
    evaluator: Option<&A1Evaluator>,
) -> Result<Table> {
    let Some(evaluator) = evaluator else {
        return Ok(table.clone());
    };
    let targets: HashSet<&String> = match columns {
        Some(list) => list.iter().collect(),
        None => table.columns().iter().collect(),
    };
    let layout: Vec<(usize, String)> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| targets.contains(name))
        .map(|(i, name)| (i, name.clone()))
        .collect();

    // Rows top to bottom, columns in declared order; each evaluation sees
    // the already-evaluated results of earlier cells in this pass, so
    // forward dependency chains resolve without a dependency graph.
    // Backward or circular references read the still-unevaluated cell,
    // which counts as numeric 0.
    let mut working = table.clone();
    for row in 0..working.row_count() {
        for (col, name) in &layout {
            if !working.cell(row, name).is_formula() {
                continue;
            }
            let value = evaluator
                .evaluate_cell(&working, row, *col)
                .unwrap_or(CellValue::Null);
            working.set_cell(row, name, value);
        }
    }
    Ok(working)
}

fn remove_formulas(table: &Table, placeholder: Option<&CellValue>) -> Result<Table> {
    let placeholder = placeholder.cloned().unwrap_or(CellValue::Null);
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|(key, value)| {
                    let value = if value.is_formula() {
                        placeholder.clone()
                    } else {
                        value.clone()
                    };
                    (key.clone(), value)
                })
                .collect()
        })
        .collect();
    rebuilt(table.columns().to_vec(), rows)
}

fn formula_audit(table: &Table, column: &str) -> Result<Table> {
    if table.has_column(column) {
        return Ok(table.clone());
    }
    let mut columns = table.columns().to_vec();
    columns.push(column.to_string());
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            // Flag computed against the original row before the new column
            // is attached.
            let has_formula = row.values().any(CellValue::is_formula);
            let mut out = row.clone();
            out.insert(column.to_string(), CellValue::Bool(has_formula));
            out
        })
        .collect();
    rebuilt(columns, rows)
}
