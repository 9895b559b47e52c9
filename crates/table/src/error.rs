use thiserror::Error;

/// Errors that can occur while constructing tables
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Duplicate column name: {name}")]
    DuplicateColumnName { name: String },
}

pub type Result<T> = std::result::Result<T, TableError>;
