//! Vertical union and key-indexed joins between two tables.
//!
//! Rows are matched on a composite key: the tab-joined comparable values of
//! the key columns. Missing or unresolved key fields normalize to the empty
//! string, so two rows that both lack a key field join to each other. This
//! mirrors the behavior the engine replaces and is part of the contract.

use crate::error::{EngineError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tabfuse_table::{CellValue, Row, Table};

/// Fraction of driving-side rows that should find a join partner before the
/// merge logs a warning about unmatched keys.
const MATCH_RATE_WARN_THRESHOLD: f64 = 0.8;

/// How two tables are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    Union,
    InnerJoin,
    LeftJoin,
    RightJoin,
    FullJoin,
}

impl MergeMode {
    #[must_use]
    pub fn is_join(&self) -> bool {
        !matches!(self, MergeMode::Union)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::Union => "union",
            MergeMode::InnerJoin => "inner_join",
            MergeMode::LeftJoin => "left_join",
            MergeMode::RightJoin => "right_join",
            MergeMode::FullJoin => "full_join",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a merge.
///
/// `rename_right` is applied to the right table's column names before
/// anything else, so `right_keys` and the union/collision rules all see the
/// renamed names. Join modes require non-empty key lists of equal length;
/// union ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSpec {
    pub mode: MergeMode,
    #[serde(default)]
    pub left_keys: Vec<String>,
    #[serde(default)]
    pub right_keys: Vec<String>,
    #[serde(default)]
    pub rename_right: IndexMap<String, String>,
    /// When true (the default) a union appends right-only columns after the
    /// left columns; when false the output keeps exactly the left table's
    /// columns and right-only columns are dropped.
    #[serde(default = "default_extend_columns")]
    pub extend_columns: bool,
}

fn default_extend_columns() -> bool {
    true
}

impl MergeSpec {
    /// A plain vertical union.
    #[must_use]
    pub fn union() -> Self {
        MergeSpec {
            mode: MergeMode::Union,
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            rename_right: IndexMap::new(),
            extend_columns: true,
        }
    }

    /// A join with the same key column names on both sides.
    #[must_use]
    pub fn join<S: Into<String> + Clone>(mode: MergeMode, keys: &[S]) -> Self {
        let keys: Vec<String> = keys.iter().cloned().map(Into::into).collect();
        MergeSpec {
            mode,
            left_keys: keys.clone(),
            right_keys: keys,
            rename_right: IndexMap::new(),
            extend_columns: true,
        }
    }

    /// A join with distinct key columns per side.
    #[must_use]
    pub fn join_on<S: Into<String>>(
        mode: MergeMode,
        left_keys: Vec<S>,
        right_keys: Vec<S>,
    ) -> Self {
        MergeSpec {
            mode,
            left_keys: left_keys.into_iter().map(Into::into).collect(),
            right_keys: right_keys.into_iter().map(Into::into).collect(),
            rename_right: IndexMap::new(),
            extend_columns: true,
        }
    }

    /// Add a right-table column rename, applied before combination.
    #[must_use]
    pub fn with_rename<S: Into<String>>(mut self, from: S, to: S) -> Self {
        self.rename_right.insert(from.into(), to.into());
        self
    }
}

/// Combine two tables according to the spec. Pure: both inputs are left
/// untouched and the result is built from fresh rows.
pub fn merge(left: &Table, right: &Table, spec: &MergeSpec) -> Result<Table> {
    if spec.mode.is_join() {
        if spec.left_keys.is_empty() || spec.right_keys.is_empty() {
            return Err(EngineError::MissingJoinKeys { mode: spec.mode });
        }
        if spec.left_keys.len() != spec.right_keys.len() {
            return Err(EngineError::JoinKeyCountMismatch {
                left: spec.left_keys.len(),
                right: spec.right_keys.len(),
            });
        }
    }

    let result = match spec.mode {
        MergeMode::Union => union(left, right, spec),
        _ => join(left, right, spec),
    }?;

    tracing::debug!(
        mode = spec.mode.as_str(),
        left_rows = left.row_count(),
        right_rows = right.row_count(),
        out_rows = result.row_count(),
        out_columns = result.column_count(),
        "merged tables"
    );
    Ok(result)
}

/// The right table's columns with the rename mapping applied:
/// `(original_name, renamed_name)` in right-table order.
fn renamed_right_columns(right: &Table, spec: &MergeSpec) -> Vec<(String, String)> {
    right
        .columns()
        .iter()
        .map(|name| {
            let renamed = spec.rename_right.get(name).cloned().unwrap_or_else(|| name.clone());
            (name.clone(), renamed)
        })
        .collect()
}

/// Tab-joined comparable key over the named row fields; missing fields read
/// as the empty string.
fn composite_key(row: &Row, keys: &[String]) -> String {
    keys.iter()
        .map(|name| row.get(name).map(CellValue::comparable_str).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\t")
}

/// First free name: the base itself, else `base_2`, `base_3`, ...
fn collision_name(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|c| c == base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken.iter().any(|c| c == &candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn union(left: &Table, right: &Table, spec: &MergeSpec) -> Result<Table> {
    let renamed = renamed_right_columns(right, spec);

    let mut columns = left.columns().to_vec();
    if spec.extend_columns {
        for (_, renamed_name) in &renamed {
            if !columns.contains(renamed_name) {
                columns.push(renamed_name.clone());
            }
        }
    }

    // All left rows first, then all right rows, both in original order.
    let mut rows: Vec<Row> = Vec::with_capacity(left.row_count() + right.row_count());
    for row in left.rows() {
        rows.push(Table::project_row(row, &columns));
    }
    for row in right.rows() {
        let mut out = Row::new();
        for (original, renamed_name) in &renamed {
            if !columns.contains(renamed_name) {
                continue;
            }
            if let Some(value) = row.get(original) {
                out.insert(renamed_name.clone(), value.clone());
            }
        }
        rows.push(Table::project_row(&out, &columns));
    }

    Ok(Table::from_rows(columns, rows)?)
}

fn join(left: &Table, right: &Table, spec: &MergeSpec) -> Result<Table> {
    let renamed = renamed_right_columns(right, spec);
    let renamed_to_original: HashMap<&str, &str> = renamed
        .iter()
        .map(|(original, renamed_name)| (renamed_name.as_str(), original.as_str()))
        .collect();

    // Right key columns resolve through the rename to the names actually
    // present on right rows; a key with no counterpart always reads "".
    let right_key_fields: Vec<String> = spec
        .right_keys
        .iter()
        .map(|key| {
            renamed_to_original
                .get(key.as_str())
                .map_or_else(|| key.clone(), |original| (*original).to_string())
        })
        .collect();

    // Output columns: the left table is authoritative for the keys, then
    // right-only columns with collisions suffixed.
    let mut columns = left.columns().to_vec();
    let mut right_only: Vec<(String, String)> = Vec::new();
    for (original, renamed_name) in &renamed {
        if spec.right_keys.contains(renamed_name) {
            continue;
        }
        let out_name = collision_name(renamed_name, &columns);
        columns.push(out_name.clone());
        right_only.push((original.clone(), out_name));
    }

    let mut rows: Vec<Row> = Vec::new();
    let mut matched = 0usize;

    match spec.mode {
        MergeMode::RightJoin => {
            // Symmetric: index the left table, iterate right rows.
            let mut left_index: HashMap<String, Vec<usize>> = HashMap::new();
            for (i, row) in left.rows().iter().enumerate() {
                left_index
                    .entry(composite_key(row, &spec.left_keys))
                    .or_default()
                    .push(i);
            }

            for right_row in right.rows() {
                let key = composite_key(right_row, &right_key_fields);
                match left_index.get(&key) {
                    Some(indices) => {
                        matched += 1;
                        for &li in indices {
                            rows.push(joined_row(
                                Some(&left.rows()[li]),
                                right_row,
                                &columns,
                                &right_only,
                                spec,
                                &right_key_fields,
                            ));
                        }
                    }
                    None => rows.push(joined_row(
                        None,
                        right_row,
                        &columns,
                        &right_only,
                        spec,
                        &right_key_fields,
                    )),
                }
            }
            report_match_rate(spec, matched, right.row_count());
        }
        _ => {
            let mut right_index: HashMap<String, Vec<usize>> = HashMap::new();
            for (i, row) in right.rows().iter().enumerate() {
                right_index
                    .entry(composite_key(row, &right_key_fields))
                    .or_default()
                    .push(i);
            }

            let mut matched_right: HashSet<usize> = HashSet::new();
            for left_row in left.rows() {
                let key = composite_key(left_row, &spec.left_keys);
                match right_index.get(&key) {
                    Some(indices) => {
                        matched += 1;
                        for &ri in indices {
                            matched_right.insert(ri);
                            rows.push(joined_row(
                                Some(left_row),
                                &right.rows()[ri],
                                &columns,
                                &right_only,
                                spec,
                                &right_key_fields,
                            ));
                        }
                    }
                    None => {
                        if matches!(spec.mode, MergeMode::LeftJoin | MergeMode::FullJoin) {
                            rows.push(Table::project_row(left_row, &columns));
                        }
                    }
                }
            }

            // Full join: append right rows whose key never matched.
            if spec.mode == MergeMode::FullJoin {
                for (i, right_row) in right.rows().iter().enumerate() {
                    if !matched_right.contains(&i) {
                        rows.push(joined_row(
                            None,
                            right_row,
                            &columns,
                            &right_only,
                            spec,
                            &right_key_fields,
                        ));
                    }
                }
            }
            report_match_rate(spec, matched, left.row_count());
        }
    }

    Ok(Table::from_rows(columns, rows)?)
}

/// Build one output row from an optional left row and a right row. Without
/// a left partner, the left key columns are backfilled from the right row's
/// key fields so the key survives into the output.
fn joined_row(
    left_row: Option<&Row>,
    right_row: &Row,
    columns: &[String],
    right_only: &[(String, String)],
    spec: &MergeSpec,
    right_key_fields: &[String],
) -> Row {
    let mut out = match left_row {
        Some(row) => row.clone(),
        None => {
            let mut keys_only = Row::new();
            for (left_key, right_field) in spec.left_keys.iter().zip(right_key_fields) {
                if let Some(value) = right_row.get(right_field) {
                    keys_only.insert(left_key.clone(), value.clone());
                }
            }
            keys_only
        }
    };
    for (original, out_name) in right_only {
        if let Some(value) = right_row.get(original) {
            out.insert(out_name.clone(), value.clone());
        }
    }
    Table::project_row(&out, columns)
}

fn report_match_rate(spec: &MergeSpec, matched: usize, total: usize) {
    if total == 0 {
        return;
    }
    let rate = matched as f64 / total as f64;
    if rate < MATCH_RATE_WARN_THRESHOLD {
        tracing::warn!(
            mode = spec.mode.as_str(),
            matched,
            total,
            rate,
            "large share of join keys found no partner; check for renamed or misformatted key columns"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), CellValue::from(*v)))
            .collect()
    }

    fn left_table() -> Table {
        Table::from_rows(
            vec!["name", "class"],
            vec![
                row(&[("name", "Zhang"), ("class", "1")]),
                row(&[("name", "Li"), ("class", "2")]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_union_row_count_law() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["name", "class"],
            vec![row(&[("name", "Wang"), ("class", "3")])],
        )
        .unwrap();
        let result = merge(&left, &right, &MergeSpec::union()).unwrap();
        assert_eq!(result.row_count(), left.row_count() + right.row_count());
        assert_eq!(result.cell(2, "name"), &CellValue::from("Wang"));
    }

    #[test]
    fn test_union_appends_right_only_columns() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["name", "note"],
            vec![row(&[("name", "Wang"), ("note", "late")])],
        )
        .unwrap();
        let result = merge(&left, &right, &MergeSpec::union()).unwrap();
        assert_eq!(result.columns(), &["name", "class", "note"]);
        assert_eq!(result.cell(0, "note"), &CellValue::Null);
        assert_eq!(result.cell(2, "note"), &CellValue::from("late"));
    }

    #[test]
    fn test_union_without_extension_drops_extras() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["name", "note"],
            vec![row(&[("name", "Wang"), ("note", "late")])],
        )
        .unwrap();
        let mut spec = MergeSpec::union();
        spec.extend_columns = false;
        let result = merge(&left, &right, &spec).unwrap();
        assert_eq!(result.columns(), &["name", "class"]);
        assert_eq!(result.cell(2, "name"), &CellValue::from("Wang"));
        assert_eq!(result.cell(2, "class"), &CellValue::Null);
    }

    #[test]
    fn test_union_resolves_rename_before_column_check() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["名字", "class"],
            vec![row(&[("名字", "Wang"), ("class", "3")])],
        )
        .unwrap();
        let spec = MergeSpec::union().with_rename("名字", "name");
        let result = merge(&left, &right, &spec).unwrap();
        assert_eq!(result.columns(), &["name", "class"]);
        assert_eq!(result.cell(2, "name"), &CellValue::from("Wang"));
    }

    #[test]
    fn test_join_requires_keys() {
        let left = left_table();
        let right = left_table();
        let spec = MergeSpec {
            mode: MergeMode::InnerJoin,
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            rename_right: IndexMap::new(),
            extend_columns: true,
        };
        let err = merge(&left, &right, &spec).unwrap_err();
        assert!(matches!(err, EngineError::MissingJoinKeys { .. }));
    }

    #[test]
    fn test_left_join_unmatched_row_gets_nulls() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["name", "score"],
            vec![row(&[("name", "Zhang"), ("score", "90")])],
        )
        .unwrap();
        let spec = MergeSpec::join(MergeMode::LeftJoin, &["name"]);
        let result = merge(&left, &right, &spec).unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.cell(0, "score"), &CellValue::from("90"));
        assert_eq!(result.cell(1, "score"), &CellValue::Null);
    }

    #[test]
    fn test_inner_join_drops_unmatched() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["name", "score"],
            vec![row(&[("name", "Li"), ("score", "75")])],
        )
        .unwrap();
        let spec = MergeSpec::join(MergeMode::InnerJoin, &["name"]);
        let result = merge(&left, &right, &spec).unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.cell(0, "name"), &CellValue::from("Li"));
    }

    #[test]
    fn test_collision_gets_suffix() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["name", "class"],
            vec![row(&[("name", "Zhang"), ("class", "9")])],
        )
        .unwrap();
        let spec = MergeSpec::join(MergeMode::LeftJoin, &["name"]);
        let result = merge(&left, &right, &spec).unwrap();
        assert_eq!(result.columns(), &["name", "class", "class_2"]);
        assert_eq!(result.cell(0, "class"), &CellValue::from("1"));
        assert_eq!(result.cell(0, "class_2"), &CellValue::from("9"));
    }

    #[test]
    fn test_right_join_backfills_key_from_right() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["name", "score"],
            vec![
                row(&[("name", "Zhang"), ("score", "90")]),
                row(&[("name", "Zhao"), ("score", "60")]),
            ],
        )
        .unwrap();
        let spec = MergeSpec::join(MergeMode::RightJoin, &["name"]);
        let result = merge(&left, &right, &spec).unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.cell(1, "name"), &CellValue::from("Zhao"));
        assert_eq!(result.cell(1, "class"), &CellValue::Null);
        assert_eq!(result.cell(1, "score"), &CellValue::from("60"));
    }

    #[test]
    fn test_full_join_appends_unmatched_right() {
        let left = left_table();
        let right = Table::from_rows(
            vec!["name", "score"],
            vec![
                row(&[("name", "Li"), ("score", "75")]),
                row(&[("name", "Zhao"), ("score", "60")]),
            ],
        )
        .unwrap();
        let spec = MergeSpec::join(MergeMode::FullJoin, &["name"]);
        let result = merge(&left, &right, &spec).unwrap();
        // Zhang (no match), Li (match), then unmatched Zhao.
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.cell(0, "score"), &CellValue::Null);
        assert_eq!(result.cell(1, "score"), &CellValue::from("75"));
        assert_eq!(result.cell(2, "name"), &CellValue::from("Zhao"));
    }

    #[test]
    fn test_missing_keys_join_to_each_other() {
        let left = Table::from_rows(
            vec!["name", "class"],
            vec![row(&[("class", "1")])],
        )
        .unwrap();
        let right = Table::from_rows(
            vec!["name", "score"],
            vec![row(&[("score", "50")])],
        )
        .unwrap();
        let spec = MergeSpec::join(MergeMode::InnerJoin, &["name"]);
        let result = merge(&left, &right, &spec).unwrap();
        // Both sides have an absent key, which normalizes to "".
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.cell(0, "score"), &CellValue::from("50"));
    }
}
