//! Column model for the SDK

use super::data_type::DataType;
use serde::{Deserialize, Serialize};

/// Column definition within a [`TableSchema`](super::TableSchema)
///
/// A column defines a single positional field with a declared type and a
/// nullability constraint. Decoded delimited rows are mapped onto columns
/// by position, JSON rows optionally by name.
///
/// # Example
///
/// ```rust
/// use data_loading_sdk::models::{ColumnDef, DataType};
///
/// let column = ColumnDef::new("trip_id", DataType::Integer).not_null();
/// assert!(!column.nullable);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared type (e.g., "NUMBER(38,0)", "VARCHAR(100)", "TIMESTAMP")
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Whether the column allows NULL values (default: true)
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Column description/documentation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

fn default_true() -> bool {
    true
}

impl ColumnDef {
    /// Create a new nullable column with the given name and data type
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            description: String::new(),
        }
    }

    /// Mark the column NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Case-insensitive name comparison, matching warehouse identifier rules
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let col: ColumnDef = serde_yaml::from_str("name: bikeid\ntype: NUMBER(38,0)\n").unwrap();
        assert_eq!(col.data_type, DataType::Integer);
        assert!(col.nullable);
    }

    #[test]
    fn name_matching_ignores_case() {
        let col = ColumnDef::new("StartTime", DataType::Timestamp);
        assert!(col.matches_name("starttime"));
        assert!(!col.matches_name("stoptime"));
    }
}
