//! Table health scan and cleaning suggestions.
//!
//! Inspects a table and reports nulls, duplicates, whitespace, fully empty
//! rows, mixed numeric/text columns, likely-redundant column groups and
//! numeric outliers, each paired with a concrete operation the caller can
//! apply.

use crate::ops::Operation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tabfuse_table::{CellValue, Table};

/// IQR multiplier for outlier bounds.
const IQR_FACTOR: f64 = 1.5;
/// Outlier detection needs at least this many numeric values.
const MIN_OUTLIER_SAMPLES: usize = 4;

/// A column holding both numeric and non-numeric non-empty values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFinding {
    pub column: String,
    pub numeric: usize,
    pub text: usize,
}

/// Rows whose numeric value falls outside the column's IQR bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierFinding {
    pub column: String,
    pub rows: Vec<usize>,
    pub lower: f64,
    pub upper: f64,
}

/// A proposed operation invocation with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub operation: Operation,
    pub reason: String,
}

/// The analyzer's report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Per-column count of empty or absent comparable values.
    pub null_counts: IndexMap<String, usize>,
    /// Rows whose full-row signature repeats an earlier row.
    pub duplicate_rows: usize,
    /// Columns with at least one string cell needing a trim.
    pub whitespace_columns: Vec<String>,
    /// Rows empty in every column.
    pub empty_rows: usize,
    pub mixed_type_columns: Vec<TypeFinding>,
    /// Groups of columns whose base names (trailing parenthetical
    /// qualifier stripped) coincide.
    pub redundant_groups: Vec<Vec<String>>,
    pub outliers: Vec<OutlierFinding>,
    pub suggestions: Vec<Suggestion>,
}

/// Scan a table and build the quality report.
#[must_use]
pub fn analyze(table: &Table) -> QualityReport {
    let null_counts = count_nulls(table);
    let duplicate_rows = count_duplicate_rows(table);
    let whitespace_columns = find_whitespace_columns(table);
    let empty_rows = count_empty_rows(table);
    let mixed_type_columns = find_mixed_type_columns(table);
    let redundant_groups = find_redundant_groups(table);
    let outliers = find_outliers(table);

    let mut suggestions = Vec::new();
    if !whitespace_columns.is_empty() {
        suggestions.push(Suggestion {
            operation: Operation::TrimWhitespace {
                columns: whitespace_columns.clone(),
            },
            reason: format!(
                "{} column(s) contain leading or trailing whitespace",
                whitespace_columns.len()
            ),
        });
    }
    if duplicate_rows > 0 {
        suggestions.push(Suggestion {
            operation: Operation::RemoveDuplicates {
                columns: Vec::new(),
            },
            reason: format!("{duplicate_rows} row(s) duplicate an earlier row"),
        });
    }
    if empty_rows > 0 {
        suggestions.push(Suggestion {
            operation: Operation::DropEmptyRows { columns: None },
            reason: format!("{empty_rows} row(s) are empty in every column"),
        });
    }
    for finding in &mixed_type_columns {
        suggestions.push(Suggestion {
            operation: Operation::ConvertType {
                column: finding.column.clone(),
                target: crate::ops::TypeTarget::Number,
            },
            reason: format!(
                "column \"{}\" mixes {} numeric and {} text value(s)",
                finding.column, finding.numeric, finding.text
            ),
        });
    }
    for group in &redundant_groups {
        suggestions.push(Suggestion {
            operation: Operation::CoalesceColumns {
                columns: group.clone(),
                into: base_name(&group[0]),
            },
            reason: format!("columns {group:?} share the same base name"),
        });
    }

    QualityReport {
        null_counts,
        duplicate_rows,
        whitespace_columns,
        empty_rows,
        mixed_type_columns,
        redundant_groups,
        outliers,
        suggestions,
    }
}

fn count_nulls(table: &Table) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = table
        .columns()
        .iter()
        .map(|name| (name.clone(), 0))
        .collect();
    for row in 0..table.row_count() {
        for name in table.columns() {
            if table.cell(row, name).is_empty_value() {
                *counts.entry(name.clone()).or_default() += 1;
            }
        }
    }
    counts
}

fn count_duplicate_rows(table: &Table) -> usize {
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    for row in table.rows() {
        let signature: String = table
            .columns()
            .iter()
            .map(|name| row.get(name).map(CellValue::comparable_str).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\t");
        if !seen.insert(signature) {
            duplicates += 1;
        }
    }
    duplicates
}

fn find_whitespace_columns(table: &Table) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|name| {
            (0..table.row_count()).any(|row| match table.cell(row, name) {
                CellValue::String(s) => s != s.trim(),
                _ => false,
            })
        })
        .cloned()
        .collect()
}

fn count_empty_rows(table: &Table) -> usize {
    (0..table.row_count())
        .filter(|&row| {
            table
                .columns()
                .iter()
                .all(|name| table.cell(row, name).is_empty_value())
        })
        .count()
}

/// Whether text reads as a number; plain floats and percentages count.
fn is_numeric_text(text: &str) -> bool {
    numeric_value(text).is_some()
}

/// Parse text into a number; supports a trailing percent sign.
fn numeric_value(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = text.parse::<f64>() {
        return Some(value);
    }
    text.strip_suffix('%')
        .and_then(|prefix| prefix.trim().parse::<f64>().ok())
}

fn cell_number(cell: &CellValue) -> Option<f64> {
    match cell.comparable()? {
        CellValue::Int(i) => Some(*i as f64),
        CellValue::Float(f) => Some(*f),
        CellValue::String(s) => numeric_value(s),
        _ => None,
    }
}

fn find_mixed_type_columns(table: &Table) -> Vec<TypeFinding> {
    let mut findings = Vec::new();
    for name in table.columns() {
        let mut numeric = 0;
        let mut text = 0;
        for row in 0..table.row_count() {
            let cell = table.cell(row, name);
            if cell.is_empty_value() {
                continue;
            }
            match cell {
                CellValue::Int(_) | CellValue::Float(_) => numeric += 1,
                CellValue::String(s) => {
                    if is_numeric_text(s) {
                        numeric += 1;
                    } else {
                        text += 1;
                    }
                }
                _ => text += 1,
            }
        }
        if numeric > 0 && text > 0 {
            findings.push(TypeFinding {
                column: name.clone(),
                numeric,
                text,
            });
        }
    }
    findings
}

/// Strip one trailing parenthetical qualifier: `score (old)` and
/// `分数（旧）` both reduce to their base name.
fn base_name(column: &str) -> String {
    let trimmed = column.trim();
    for (open, close) in [('(', ')'), ('（', '）')] {
        if trimmed.ends_with(close) {
            if let Some(pos) = trimmed.rfind(open) {
                return trimmed[..pos].trim().to_string();
            }
        }
    }
    trimmed.to_string()
}

fn find_redundant_groups(table: &Table) -> Vec<Vec<String>> {
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
    for name in table.columns() {
        let base = base_name(name);
        if base.is_empty() {
            continue;
        }
        groups.entry(base).or_default().push(name.clone());
    }
    groups
        .into_values()
        .filter(|group| group.len() >= 2)
        .collect()
}

/// Linear-interpolated quantile over a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = position - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

fn find_outliers(table: &Table) -> Vec<OutlierFinding> {
    let mut findings = Vec::new();
    for name in table.columns() {
        let samples: Vec<(usize, f64)> = (0..table.row_count())
            .filter_map(|row| cell_number(table.cell(row, name)).map(|value| (row, value)))
            .collect();
        if samples.len() < MIN_OUTLIER_SAMPLES {
            continue;
        }

        let mut values: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let q1 = quantile(&values, 0.25);
        let q3 = quantile(&values, 0.75);
        let iqr = q3 - q1;
        // Degenerate spread keeps the bounds at the quartiles themselves.
        let (lower, upper) = if iqr == 0.0 {
            (q1, q3)
        } else {
            (q1 - IQR_FACTOR * iqr, q3 + IQR_FACTOR * iqr)
        };

        let rows: Vec<usize> = samples
            .iter()
            .filter(|(_, value)| *value < lower || *value > upper)
            .map(|(row, _)| *row)
            .collect();
        if !rows.is_empty() {
            findings.push(OutlierFinding {
                column: name.clone(),
                rows,
                lower,
                upper,
            });
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabfuse_table::Row;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_null_counts_and_empty_rows() {
        let table = Table::from_rows(
            vec!["name", "score"],
            vec![
                row(&[("name", CellValue::from("Zhang")), ("score", CellValue::Int(90))]),
                row(&[("name", CellValue::from("Li"))]),
                row(&[]),
            ],
        )
        .unwrap();
        let report = analyze(&table);
        assert_eq!(report.null_counts["name"], 1);
        assert_eq!(report.null_counts["score"], 2);
        assert_eq!(report.empty_rows, 1);
    }

    #[test]
    fn test_duplicates_and_suggestion() {
        let table = Table::from_rows(
            vec!["name"],
            vec![
                row(&[("name", CellValue::from("Zhang"))]),
                row(&[("name", CellValue::from("Zhang"))]),
            ],
        )
        .unwrap();
        let report = analyze(&table);
        assert_eq!(report.duplicate_rows, 1);
        assert!(report.suggestions.iter().any(|s| matches!(
            s.operation,
            Operation::RemoveDuplicates { .. }
        )));
    }

    #[test]
    fn test_mixed_types_detected() {
        let table = Table::from_rows(
            vec!["floor"],
            vec![
                row(&[("floor", CellValue::from("1"))]),
                row(&[("floor", CellValue::from("2"))]),
                row(&[("floor", CellValue::from("一楼"))]),
            ],
        )
        .unwrap();
        let report = analyze(&table);
        assert_eq!(report.mixed_type_columns.len(), 1);
        assert_eq!(report.mixed_type_columns[0].numeric, 2);
        assert_eq!(report.mixed_type_columns[0].text, 1);
    }

    #[test]
    fn test_percent_counts_as_numeric() {
        assert!(is_numeric_text("50%"));
        assert!(is_numeric_text(" 12.5 % "));
        assert!(!is_numeric_text("fifty"));
    }

    #[test]
    fn test_redundant_base_names_grouped() {
        let table = Table::new(vec!["分数", "分数（旧）", "name (old)", "name"]).unwrap();
        let report = analyze(&table);
        assert_eq!(report.redundant_groups.len(), 2);
        assert!(report
            .redundant_groups
            .iter()
            .any(|g| g == &vec!["分数".to_string(), "分数（旧）".to_string()]));
    }

    #[test]
    fn test_outlier_detection() {
        let values = [10.0, 11.0, 12.0, 10.5, 11.5, 500.0];
        let rows = values
            .iter()
            .map(|v| row(&[("amount", CellValue::Float(*v))]))
            .collect();
        let table = Table::from_rows(vec!["amount"], rows).unwrap();
        let report = analyze(&table);
        assert_eq!(report.outliers.len(), 1);
        assert_eq!(report.outliers[0].rows, vec![5]);
    }

    #[test]
    fn test_whitespace_columns_suggest_trim() {
        let table = Table::from_rows(
            vec!["name"],
            vec![row(&[("name", CellValue::from(" Zhang "))])],
        )
        .unwrap();
        let report = analyze(&table);
        assert_eq!(report.whitespace_columns, vec!["name".to_string()]);
        assert!(matches!(
            &report.suggestions[0].operation,
            Operation::TrimWhitespace { columns } if columns == &vec!["name".to_string()]
        ));
    }
}
