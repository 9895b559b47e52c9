use thiserror::Error;

/// Errors raised while parsing formula text.
///
/// These stay internal to evaluation: a cell whose formula fails to parse
/// simply yields no result, it never aborts the surrounding table pass.
#[derive(Error, Debug)]
pub enum FormulaError {
    #[error("Invalid cell notation: {0}")]
    InvalidCellNotation(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, FormulaError>;
