//! # tabfuse-engine
//!
//! The tabular transformation engine: a closed registry of pure table
//! operations, a multi-mode merge engine, operation history replay and a
//! table quality analyzer.
//!
//! Every call takes a [`tabfuse_table::Table`] value and returns a new one;
//! the engine is synchronous, performs no I/O and holds no shared state.
//! Operations degrade to no-ops on data-shape mismatches — histories built
//! against a live column list stay replayable even when that list shifts.
//!
//! # Examples
//!
//! ```
//! use tabfuse_engine::{Engine, Operation, FilterPredicate};
//! use tabfuse_table::{CellValue, Row, Table};
//!
//! let mut row = Row::new();
//! row.insert("name".to_string(), CellValue::from("  Zhang  "));
//! let table = Table::from_rows(vec!["name"], vec![row]).unwrap();
//!
//! let engine = Engine::new();
//! let (cleaned, record) = engine
//!     .apply_recorded(
//!         &table,
//!         Operation::TrimWhitespace { columns: vec!["name".to_string()] },
//!         "trim name column",
//!     )
//!     .unwrap();
//!
//! assert_eq!(cleaned.cell(0, "name"), &CellValue::from("Zhang"));
//! assert_eq!(record.rows_before, record.rows_after);
//!
//! // Histories replay from the origin.
//! let replayed = engine.replay(&table, &[record]).unwrap();
//! assert_eq!(replayed, cleaned);
//! ```

mod error;
mod history;
mod merge;
mod ops;
mod quality;

/// Re-export engine error types.
pub use error::{EngineError, Result};
/// Re-export the engine and history types.
pub use history::{Engine, OperationRecord};
/// Re-export merge types and entry point.
pub use merge::{merge, MergeMode, MergeSpec};
/// Re-export the operation registry.
pub use ops::{
    apply, apply_with_evaluator, CaseMode, FilterPredicate, Operation, OperationKind, SliceEnd,
    SortKey, TypeTarget,
};
/// Re-export the quality analyzer.
pub use quality::{analyze, OutlierFinding, QualityReport, Suggestion, TypeFinding};
