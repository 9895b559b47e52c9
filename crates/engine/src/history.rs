//! Operation records and history replay.
//!
//! A cleaning session is an origin table plus an ordered list of
//! [`OperationRecord`]s; replaying folds the records over the origin.
//! Replay is deterministic for every kind except unseeded sampling.

use crate::error::Result;
use crate::ops::{self, Operation};
use serde::{Deserialize, Serialize};
use tabfuse_formulas::A1Evaluator;
use tabfuse_table::Table;

/// One applied operation, immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation: Operation,
    pub description: String,
    pub rows_before: usize,
    pub rows_after: usize,
}

/// Applies operations to tables, holding the optional formula evaluator
/// that `evaluate_formulas` resolves through.
#[derive(Debug, Clone)]
pub struct Engine {
    evaluator: Option<A1Evaluator>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    /// An engine with a formula evaluator attached.
    #[must_use]
    pub fn new() -> Self {
        Engine {
            evaluator: Some(A1Evaluator::new()),
        }
    }

    /// An engine without an evaluator; `evaluate_formulas` becomes a no-op.
    #[must_use]
    pub fn without_evaluator() -> Self {
        Engine { evaluator: None }
    }

    /// Apply a single operation, returning a new table.
    pub fn apply(&self, table: &Table, operation: &Operation) -> Result<Table> {
        ops::apply_with_evaluator(table, operation, self.evaluator.as_ref())
    }

    /// Apply an operation and produce its history record.
    pub fn apply_recorded(
        &self,
        table: &Table,
        operation: Operation,
        description: impl Into<String>,
    ) -> Result<(Table, OperationRecord)> {
        let rows_before = table.row_count();
        let result = self.apply(table, &operation)?;
        let record = OperationRecord {
            operation,
            description: description.into(),
            rows_before,
            rows_after: result.row_count(),
        };
        Ok((result, record))
    }

    /// Fold a history over an origin table.
    ///
    /// Replaying against an unchanged origin reproduces the recorded row
    /// counts for every deterministic operation; a divergence means the
    /// origin shifted underneath the history and is logged, not raised.
    pub fn replay(&self, origin: &Table, records: &[OperationRecord]) -> Result<Table> {
        let mut current = origin.clone();
        for (step, record) in records.iter().enumerate() {
            current = self.apply(&current, &record.operation)?;
            if record.operation.is_deterministic() && current.row_count() != record.rows_after {
                tracing::warn!(
                    step,
                    kind = record.operation.kind().as_str(),
                    recorded = record.rows_after,
                    actual = current.row_count(),
                    "replayed row count diverges from record"
                );
            }
        }
        Ok(current)
    }
}
