//! Table model for the SDK

use super::column::ColumnDef;
use serde::{Deserialize, Serialize};

/// Table schema: a named, ordered list of columns
///
/// Column order defines the positional mapping applied to decoded delimited
/// rows. Schemas are immutable once registered; replacing one is a full
/// redefinition.
///
/// # Example
///
/// ```rust
/// use data_loading_sdk::models::{ColumnDef, DataType, TableSchema};
///
/// let table = TableSchema::new(
///     "trips",
///     vec![
///         ColumnDef::new("tripduration", DataType::Integer),
///         ColumnDef::new("starttime", DataType::Timestamp),
///     ],
/// );
/// assert_eq!(table.column_index("STARTTIME"), Some(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    /// Table name (unique within a catalog)
    pub name: String,
    /// Ordered columns
    pub columns: Vec<ColumnDef>,
    /// Table description/documentation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            description: String::new(),
        }
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.matches_name(name))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.matches_name(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// A copy of this schema under another name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Whether the table is a single VARIANT column (raw semi-structured landing table)
    pub fn is_single_variant(&self) -> bool {
        self.columns.len() == 1 && self.columns[0].data_type == super::DataType::Variant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataType;

    #[test]
    fn detects_variant_landing_tables() {
        let raw = TableSchema::new("weather_raw", vec![ColumnDef::new("v", DataType::Variant)]);
        assert!(raw.is_single_variant());

        let typed = TableSchema::new(
            "weather",
            vec![
                ColumnDef::new("v", DataType::Variant),
                ColumnDef::new("t", DataType::Timestamp),
            ],
        );
        assert!(!typed.is_single_variant());
    }

    #[test]
    fn renamed_keeps_columns() {
        let table = TableSchema::new("a", vec![ColumnDef::new("x", DataType::Integer)]);
        let copy = table.renamed("b");
        assert_eq!(copy.name, "b");
        assert_eq!(copy.columns, table.columns);
    }
}
