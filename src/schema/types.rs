//! Schema column types

use serde::{Deserialize, Serialize};

/// Output column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Long,
    Double,
    Boolean,
    Timestamp,
    Json,
}

impl ColumnType {
    /// Merge two observed types, returning the narrowest type that can
    /// represent both. Incompatible pairs fall back to string.
    pub fn merge_with(self, other: ColumnType) -> ColumnType {
        match (self, other) {
            (a, b) if a == b => a,
            (ColumnType::Long, ColumnType::Double) | (ColumnType::Double, ColumnType::Long) => {
                ColumnType::Double
            }
            _ => ColumnType::String,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::String => write!(f, "string"),
            ColumnType::Long => write!(f, "long"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Timestamp => write!(f, "timestamp"),
            ColumnType::Json => write!(f, "json"),
        }
    }
}

/// A single output column: name, type, optional timestamp format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, matched against record property names
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Parse format for timestamp columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Column {
    /// Create a column without a format
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            format: None,
        }
    }

    /// Set the timestamp format
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}
