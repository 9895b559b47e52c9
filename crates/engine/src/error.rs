use crate::merge::MergeMode;
use tabfuse_table::TableError;
use thiserror::Error;

/// Errors that can occur at the engine's call boundary.
///
/// Everything here is a caller-side usage error; data-shape mismatches
/// inside operations degrade to no-ops or null-filling instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown operation kind: {0}")]
    UnknownOperation(String),

    #[error("Merge mode {mode} requires join key columns on both sides")]
    MissingJoinKeys { mode: MergeMode },

    #[error("Join key count mismatch: {left} left key(s) vs {right} right key(s)")]
    JoinKeyCountMismatch { left: usize, right: usize },

    #[error(transparent)]
    Table(#[from] TableError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
