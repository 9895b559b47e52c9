use crate::a1::{parse_a1, parse_a1_range};
use crate::parser::eval_arithmetic;
use tabfuse_table::{CellValue, Table};

/// Evaluates A1-style formulas against a [`Table`].
///
/// Three forms are recognized, in priority order: `SUM`/`AVERAGE` over a
/// rectangular range, a single `IF(condition, then, else)` comparison, and
/// a general arithmetic expression over `+ - * / ( )` and cell references.
/// Anything else yields no result for that cell; evaluation failures are
/// always local and never abort a table pass.
#[derive(Debug, Clone, Default)]
pub struct A1Evaluator;

impl A1Evaluator {
    #[must_use]
    pub fn new() -> Self {
        A1Evaluator
    }

    /// Evaluate the formula held by the cell at a 0-based (row, column)
    /// coordinate. Returns `None` if the cell is not a formula or the
    /// formula cannot be resolved.
    #[must_use]
    pub fn evaluate_cell(&self, table: &Table, row: usize, col: usize) -> Option<CellValue> {
        let source = table.cell_at(row, col).formula_source()?.to_string();
        self.evaluate_source(table, &source)
    }

    /// Evaluate formula source text against a table. A leading `=` is
    /// accepted and ignored.
    #[must_use]
    pub fn evaluate_source(&self, table: &Table, source: &str) -> Option<CellValue> {
        let body = source.trim();
        let body = body.strip_prefix('=').unwrap_or(body).trim();
        if body.is_empty() {
            return None;
        }

        if let Some(value) = self.try_range_function(table, body) {
            return Some(value);
        }
        if let Some(value) = self.try_conditional(table, body) {
            return Some(value);
        }
        self.try_arithmetic(table, body)
    }

    /// `SUM(range)` / `AVERAGE(range)`: non-numeric and out-of-bounds cells
    /// are skipped; an empty or invalid range yields 0.
    fn try_range_function(&self, table: &Table, body: &str) -> Option<CellValue> {
        let upper = body.to_uppercase();
        let (average, inner) = if upper.starts_with("SUM(") && upper.ends_with(')') {
            (false, &body["SUM(".len()..body.len() - 1])
        } else if upper.starts_with("AVERAGE(") && upper.ends_with(')') {
            (true, &body["AVERAGE(".len()..body.len() - 1])
        } else {
            return None;
        };

        // Nested parentheses mean this is not a plain range call.
        if inner.contains('(') || inner.contains(')') {
            return None;
        }

        let Ok(((start_row, start_col), (end_row, end_col))) = parse_a1_range(inner.trim()) else {
            return Some(CellValue::Float(0.0));
        };

        let mut sum = 0.0;
        let mut count = 0usize;
        let last_row = end_row.min(table.row_count().saturating_sub(1));
        let last_col = end_col.min(table.column_count().saturating_sub(1));
        for row in start_row..=last_row {
            for col in start_col..=last_col {
                if let Some(value) = table.cell_at(row, col).as_f64() {
                    sum += value;
                    count += 1;
                }
            }
        }

        if average {
            if count == 0 {
                return Some(CellValue::Float(0.0));
            }
            return Some(CellValue::Float(sum / count as f64));
        }
        Some(CellValue::Float(sum))
    }

    /// `IF(condition, then, else)`: the condition compares a cell reference
    /// against a literal number or another reference; branches resolve as a
    /// direct reference or a literal, never as nested expressions.
    fn try_conditional(&self, table: &Table, body: &str) -> Option<CellValue> {
        if !body.to_uppercase().starts_with("IF(") || !body.ends_with(')') {
            return None;
        }
        let inner = &body["IF(".len()..body.len() - 1];
        let args = split_top_level(inner);
        if args.len() != 3 {
            return None;
        }

        let truthy = self.eval_condition(table, args[0].trim())?;
        let branch = if truthy { args[1].trim() } else { args[2].trim() };
        self.resolve_branch(table, branch)
    }

    fn eval_condition(&self, table: &Table, condition: &str) -> Option<bool> {
        // Longest operators first so ">=" is not read as ">" + "=".
        const OPERATORS: [&str; 6] = [">=", "<=", "<>", ">", "<", "="];
        let (op, pos) = OPERATORS
            .iter()
            .find_map(|op| condition.find(op).map(|pos| (*op, pos)))?;

        let lhs = condition[..pos].trim();
        let rhs = condition[pos + op.len()..].trim();

        let (row, col) = parse_a1(lhs).ok()?;
        let left = table.cell_at(row, col).as_f64().unwrap_or(0.0);
        let right = self.resolve_number(table, rhs)?;

        Some(match op {
            ">" => left > right,
            "<" => left < right,
            ">=" => left >= right,
            "<=" => left <= right,
            "=" => left == right,
            "<>" => left != right,
            _ => unreachable!(),
        })
    }

    fn resolve_number(&self, table: &Table, text: &str) -> Option<f64> {
        if let Ok(value) = text.parse::<f64>() {
            return Some(value);
        }
        let (row, col) = parse_a1(text).ok()?;
        Some(table.cell_at(row, col).as_f64().unwrap_or(0.0))
    }

    fn resolve_branch(&self, table: &Table, branch: &str) -> Option<CellValue> {
        if branch.len() >= 2
            && ((branch.starts_with('"') && branch.ends_with('"'))
                || (branch.starts_with('\'') && branch.ends_with('\'')))
        {
            return Some(CellValue::String(branch[1..branch.len() - 1].to_string()));
        }
        if let Ok((row, col)) = parse_a1(branch) {
            return Some(match table.cell_at(row, col).comparable() {
                Some(value) => value.clone(),
                None => CellValue::Null,
            });
        }
        if let Ok(i) = branch.parse::<i64>() {
            return Some(CellValue::Int(i));
        }
        if let Ok(f) = branch.parse::<f64>() {
            return Some(CellValue::Float(f));
        }
        Some(CellValue::String(branch.to_string()))
    }

    /// General arithmetic: every reference token is substituted with its
    /// numeric value (0 if absent or non-numeric), the residue is validated
    /// to hold only digits, dots, parentheses and operators, then parsed.
    fn try_arithmetic(&self, table: &Table, body: &str) -> Option<CellValue> {
        let substituted = self.substitute_references(table, body);
        if !substituted
            .chars()
            .all(|ch| ch.is_ascii_digit() || ch.is_whitespace() || ".+-*/()".contains(ch))
        {
            return None;
        }
        match eval_arithmetic(&substituted) {
            Ok(value) => Some(CellValue::Float(value)),
            Err(_) => None,
        }
    }

    fn substitute_references(&self, table: &Table, body: &str) -> String {
        let chars: Vec<char> = body.chars().collect();
        let mut out = String::with_capacity(body.len());
        let mut i = 0;
        while i < chars.len() {
            if chars[i].is_ascii_alphabetic() {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let digits_start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                if digits_start < i {
                    if let Ok((row, col)) = parse_a1(&token) {
                        let value = table.cell_at(row, col).as_f64().unwrap_or(0.0);
                        out.push_str(&format!("({value})"));
                        continue;
                    }
                }
                // Leave the token; validation rejects it below.
                out.push_str(&token);
            } else {
                out.push(chars[i]);
                i += 1;
            }
        }
        out
    }
}

/// Split on commas that sit outside quotes and parentheses.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in input.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(&input[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&input[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabfuse_table::Row;

    fn table_with_numbers(values: &[&[f64]]) -> Table {
        let columns: Vec<String> = (0..values[0].len())
            .map(|i| crate::a1::column_index_to_letters(i).to_lowercase())
            .collect();
        let rows = values
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, v)| (name.clone(), CellValue::Float(*v)))
                    .collect::<Row>()
            })
            .collect();
        Table::from_rows(columns, rows).unwrap()
    }

    #[test]
    fn test_sum_over_column() {
        let table = table_with_numbers(&[
            &[1.0, 4999.0],
            &[2.0, 89.0],
            &[3.0, 299.0],
            &[4.0, 1299.0],
        ]);
        let result = A1Evaluator::new().evaluate_source(&table, "SUM(B1:B4)");
        assert_eq!(result, Some(CellValue::Float(6686.0)));
    }

    #[test]
    fn test_average_skips_non_numeric() {
        let mut row1 = Row::new();
        row1.insert("a".to_string(), CellValue::Int(10));
        let mut row2 = Row::new();
        row2.insert("a".to_string(), CellValue::from("text"));
        let mut row3 = Row::new();
        row3.insert("a".to_string(), CellValue::Int(20));
        let table = Table::from_rows(vec!["a"], vec![row1, row2, row3]).unwrap();

        let result = A1Evaluator::new().evaluate_source(&table, "AVERAGE(A1:A3)");
        assert_eq!(result, Some(CellValue::Float(15.0)));
    }

    #[test]
    fn test_invalid_range_yields_zero() {
        let table = table_with_numbers(&[&[1.0]]);
        let evaluator = A1Evaluator::new();
        assert_eq!(
            evaluator.evaluate_source(&table, "SUM(bogus)"),
            Some(CellValue::Float(0.0))
        );
        assert_eq!(
            evaluator.evaluate_source(&table, "AVERAGE(Z10:Z20)"),
            Some(CellValue::Float(0.0))
        );
    }

    #[test]
    fn test_if_picks_else_branch() {
        let table = table_with_numbers(&[&[-5.0]]);
        let result =
            A1Evaluator::new().evaluate_source(&table, r#"IF(A1>0, "yes", "no")"#);
        assert_eq!(result, Some(CellValue::String("no".to_string())));
    }

    #[test]
    fn test_if_reference_branch_and_operators() {
        let table = table_with_numbers(&[&[3.0, 7.0]]);
        let evaluator = A1Evaluator::new();
        assert_eq!(
            evaluator.evaluate_source(&table, "IF(A1<=3, B1, 0)"),
            Some(CellValue::Float(7.0))
        );
        assert_eq!(
            evaluator.evaluate_source(&table, "IF(A1<>3, 1, 2)"),
            Some(CellValue::Int(2))
        );
    }

    #[test]
    fn test_arithmetic_with_references() {
        let table = table_with_numbers(&[&[4.0, 5.0]]);
        let result = A1Evaluator::new().evaluate_source(&table, "=A1*B1+1");
        assert_eq!(result, Some(CellValue::Float(21.0)));
    }

    #[test]
    fn test_absent_reference_reads_as_zero() {
        let table = table_with_numbers(&[&[4.0]]);
        let result = A1Evaluator::new().evaluate_source(&table, "A1+Z99");
        assert_eq!(result, Some(CellValue::Float(4.0)));
    }

    #[test]
    fn test_unresolvable_yields_none() {
        let table = table_with_numbers(&[&[4.0]]);
        let evaluator = A1Evaluator::new();
        assert_eq!(evaluator.evaluate_source(&table, "DROP TABLE users"), None);
        assert_eq!(evaluator.evaluate_source(&table, "foo(A1)"), None);
    }
}
