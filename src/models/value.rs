//! Bound values, rows, and query-log records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A value bound to a statement placeholder.
///
/// Date-time values are kept structured until binding preparation, where they
/// are formatted with the active dialect's canonical pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Date-time value, formatted at bind time
    DateTime(NaiveDateTime),
    /// String value
    String(String),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::DateTime(_) => "datetime",
            Self::String(_) => "string",
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

/// A result row.
///
/// Under [`FetchMode::Assoc`] this is a JSON object keyed by column name;
/// under [`FetchMode::Num`] it is a JSON array in column order.
pub type Row = serde_json::Value;

/// How result rows are shaped by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Object keyed by column name
    #[default]
    Assoc,
    /// Array in column order
    Num,
}

/// One recorded statement execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    /// Statement text as issued by the caller
    pub query: String,
    /// Caller-supplied bindings, before normalization
    pub bindings: Vec<Value>,
    /// Elapsed milliseconds, rounded to two decimal places
    pub time: f64,
}
