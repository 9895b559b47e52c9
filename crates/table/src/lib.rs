//! Cell and table value model for tabfuse.
//!
//! A [`Table`] is an ordered list of unique column names plus an ordered
//! list of rows, where each row maps column names to [`CellValue`]s and may
//! be missing keys (a missing key reads as null). Cells are scalars or
//! tagged, unevaluated formulas; [`CellValue::comparable`] is the projection
//! every generic algorithm uses so formula cells are never misread as text.
//!
//! # Examples
//!
//! ```
//! use tabfuse_table::{CellValue, Row, Table};
//!
//! let mut row = Row::new();
//! row.insert("name".to_string(), CellValue::from("Alice"));
//! row.insert("score".to_string(), CellValue::Int(90));
//!
//! let table = Table::from_rows(vec!["name", "score"], vec![row]).unwrap();
//! assert_eq!(table.row_count(), 1);
//! assert_eq!(table.cell(0, "score").as_f64(), Some(90.0));
//! ```

mod cell;
mod error;
mod table;

/// Re-export cell value types.
pub use cell::{CellValue, FormulaCell};
/// Re-export table error types.
pub use error::{Result, TableError};
/// Re-export table types.
pub use table::{Row, Table};
