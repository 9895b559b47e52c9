//! Evaluator behavior against tables with real-world column names.

use tabfuse_formulas::{parse_a1, A1Evaluator};
use tabfuse_table::{CellValue, Row, Table};

fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), CellValue::parse(v)))
        .collect()
}

fn scores() -> Table {
    Table::from_rows(
        vec!["姓名", "分数"],
        vec![
            row(&[("姓名", "张三"), ("分数", "90")]),
            row(&[("姓名", "李四"), ("分数", "85")]),
            row(&[("姓名", "王五"), ("分数", "")]),
            row(&[("姓名", "赵六"), ("分数", "65")]),
        ],
    )
    .unwrap()
}

#[test]
fn test_references_follow_column_positions_not_names() {
    let table = scores();
    let evaluator = A1Evaluator::new();
    // Column B is 分数 regardless of its name.
    assert_eq!(
        evaluator.evaluate_source(&table, "=B1+B2"),
        Some(CellValue::Float(175.0))
    );
}

#[test]
fn test_sum_skips_empty_cells() {
    let table = scores();
    let evaluator = A1Evaluator::new();
    assert_eq!(
        evaluator.evaluate_source(&table, "SUM(B1:B4)"),
        Some(CellValue::Float(240.0))
    );
    assert_eq!(
        evaluator.evaluate_source(&table, "AVERAGE(B1:B4)"),
        Some(CellValue::Float(80.0))
    );
}

#[test]
fn test_if_against_reference_right_hand_side() {
    let table = scores();
    let evaluator = A1Evaluator::new();
    // 90 > 85: then-branch resolves the referenced cell's value.
    assert_eq!(
        evaluator.evaluate_source(&table, "IF(B1>B2, B1, B2)"),
        Some(CellValue::Int(90))
    );
}

#[test]
fn test_text_cells_count_as_zero_in_arithmetic() {
    let table = scores();
    let evaluator = A1Evaluator::new();
    // A1 holds text, which substitutes as 0.
    assert_eq!(
        evaluator.evaluate_source(&table, "A1+B1"),
        Some(CellValue::Float(90.0))
    );
}

#[test]
fn test_evaluation_failures_are_local_nones() {
    let table = scores();
    let evaluator = A1Evaluator::new();
    assert_eq!(evaluator.evaluate_source(&table, "UNKNOWN(B1)"), None);
    assert_eq!(evaluator.evaluate_source(&table, "IF(B1>0)"), None);
    assert_eq!(evaluator.evaluate_source(&table, ""), None);
}

#[test]
fn test_evaluate_cell_only_touches_formulas() {
    let table = Table::from_rows(
        vec!["a", "b"],
        vec![row(&[("a", "5"), ("b", "=A1*3")])],
    )
    .unwrap();
    let evaluator = A1Evaluator::new();
    // Plain cells are not formulas and yield no result.
    assert_eq!(evaluator.evaluate_cell(&table, 0, 0), None);
    assert_eq!(
        evaluator.evaluate_cell(&table, 0, 1),
        Some(CellValue::Float(15.0))
    );
}

#[test]
fn test_parse_a1_surface_convention() {
    assert_eq!(parse_a1("B3").unwrap(), (2, 1));
    assert_eq!(parse_a1("AA10").unwrap(), (9, 26));
}
