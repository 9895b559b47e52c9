//! # tabfuse-formulas
//!
//! A1-style formula evaluation over tabfuse tables.
//!
//! The evaluator resolves spreadsheet-convention references (column letters
//! A=0, B=1 … Z=25, AA=26 …; 1-based surface row numbers) against a
//! [`tabfuse_table::Table`]'s current row and column layout. Supported
//! forms, in recognition priority order:
//!
//! 1. `SUM(range)` / `AVERAGE(range)` over a closed rectangular range
//! 2. `IF(condition, then, else)` with a single reference comparison
//! 3. General arithmetic over `+ - * / ( )` and cell references
//!
//! ```
//! use tabfuse_formulas::A1Evaluator;
//! use tabfuse_table::{CellValue, Row, Table};
//!
//! let mut row = Row::new();
//! row.insert("qty".to_string(), CellValue::Int(3));
//! row.insert("price".to_string(), CellValue::Float(9.5));
//! let table = Table::from_rows(vec!["qty", "price"], vec![row]).unwrap();
//!
//! let evaluator = A1Evaluator::new();
//! let total = evaluator.evaluate_source(&table, "=A1*B1");
//! assert_eq!(total, Some(CellValue::Float(28.5)));
//! ```

mod a1;
mod error;
mod eval;
mod parser;

/// Re-export A1 notation helpers.
pub use a1::{column_index_to_letters, parse_a1, parse_a1_range, to_a1_notation};
/// Re-export formula error types.
pub use error::{FormulaError, Result};
/// Re-export the evaluator.
pub use eval::A1Evaluator;
