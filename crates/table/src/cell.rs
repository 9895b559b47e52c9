use serde::{Deserialize, Serialize};
use std::fmt;

/// An unevaluated formula stored in a cell.
///
/// The wrapper is what tags a formula: a plain string that merely looks like
/// `"B1*C1"` is never treated as one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaCell {
    pub source: String,
}

/// Represents a cell value in a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Formula(FormulaCell),
}

impl CellValue {
    /// Create a formula cell value.
    #[must_use]
    pub fn formula<S: Into<String>>(source: S) -> Self {
        CellValue::Formula(FormulaCell {
            source: source.into(),
        })
    }

    /// Check if the cell holds an unevaluated formula.
    #[must_use]
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula(_))
    }

    /// Get the formula source text, if this cell is a formula.
    #[must_use]
    pub fn formula_source(&self) -> Option<&str> {
        match self {
            CellValue::Formula(formula) => Some(&formula.source),
            _ => None,
        }
    }

    /// The null-safe, formula-safe scalar projection of this cell.
    ///
    /// Returns `None` for null cells and for unevaluated formulas; every
    /// generic algorithm (grouping keys, de-duplication signatures,
    /// emptiness tests, sort comparisons) routes through this accessor
    /// instead of inspecting cells directly.
    #[must_use]
    pub fn comparable(&self) -> Option<&CellValue> {
        match self {
            CellValue::Null | CellValue::Formula(_) => None,
            other => Some(other),
        }
    }

    /// String form of the comparable projection; absent values map to `""`.
    ///
    /// This is the representation used for join keys and de-duplication
    /// signatures, so two rows with the same missing key compare equal.
    #[must_use]
    pub fn comparable_str(&self) -> String {
        match self.comparable() {
            None => String::new(),
            Some(CellValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Numeric projection through [`CellValue::comparable`].
    ///
    /// Numeric strings parse; absent values and non-numeric text yield
    /// `None`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self.comparable()? {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Check whether the cell reads as empty: absent comparable value or a
    /// whitespace-only string.
    #[must_use]
    pub fn is_empty_value(&self) -> bool {
        match self.comparable() {
            None => true,
            Some(CellValue::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        }
    }

    /// Parse a string into a `CellValue` with type inference.
    /// Tries: null -> formula -> bool -> int -> float -> string
    #[must_use]
    pub fn parse(s: &str) -> CellValue {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return CellValue::Null;
        }

        if trimmed.starts_with('=') {
            return CellValue::formula(trimmed.to_string());
        }

        match trimmed.to_lowercase().as_str() {
            "true" | "yes" => return CellValue::Bool(true),
            "false" | "no" => return CellValue::Bool(false),
            _ => {}
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            return CellValue::Int(i);
        }

        if let Ok(f) = trimmed.parse::<f64>() {
            return CellValue::Float(f);
        }

        CellValue::String(s.to_string())
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Null
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, ""),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(fl) => write!(f, "{fl}"),
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Formula(formula) => write!(f, "{}", formula.source),
        }
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<i32> for CellValue {
    fn from(i: i32) -> Self {
        CellValue::Int(i64::from(i))
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => CellValue::Null,
        }
    }
}
