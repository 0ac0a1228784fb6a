//! Table schemas from SQL `CREATE TABLE` statements
//!
//! Only the table name, column names, column types and `NOT NULL` are read.
//! Other statements in the input are ignored, so a full setup script with
//! `CREATE STAGE` or `COPY INTO` lines can be imported as long as it parses.

use sqlparser::ast::{ColumnOption, Statement};
use sqlparser::dialect::{Dialect, GenericDialect, SnowflakeDialect};
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use super::CatalogError;
use super::names::{validate_column_name, validate_table_name};
use crate::models::{ColumnDef, DataType, TableSchema};

fn dialect_for(name: &str) -> Box<dyn Dialect> {
    match name.to_ascii_lowercase().as_str() {
        "snowflake" => Box::new(SnowflakeDialect {}),
        _ => Box::new(GenericDialect {}),
    }
}

fn unquote_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    for (open, close) in [('"', '"'), ('`', '`'), ('[', ']')] {
        if trimmed.len() >= 2 && trimmed.starts_with(open) && trimmed.ends_with(close) {
            let inner = &trimmed[1..trimmed.len() - 1];
            return inner.replace(&format!("{close}{close}"), &close.to_string());
        }
    }
    trimmed.to_string()
}

/// Parse every `CREATE TABLE` in `sql` with the named dialect (`snowflake` or generic)
///
/// # Example
///
/// ```rust
/// use data_loading_sdk::catalog::ddl::parse_create_tables;
/// use data_loading_sdk::models::DataType;
///
/// let tables = parse_create_tables(
///     "CREATE TABLE users (userid INTEGER NOT NULL, username CHAR(8));",
///     "snowflake",
/// ).unwrap();
/// assert_eq!(tables[0].name, "users");
/// assert_eq!(tables[0].columns[1].data_type, DataType::Varchar { max_length: Some(8) });
/// assert!(!tables[0].columns[0].nullable);
/// ```
pub fn parse_create_tables(sql: &str, dialect: &str) -> Result<Vec<TableSchema>, CatalogError> {
    let dialect = dialect_for(dialect);
    let statements =
        Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| CatalogError::Sql(e.to_string()))?;

    let mut tables = Vec::new();
    for statement in statements {
        let Statement::CreateTable(create) = statement else {
            continue;
        };
        let full_name = create.name.to_string();
        // Schema and database qualifiers are not modelled
        let name = unquote_identifier(full_name.rsplit('.').next().unwrap_or(&full_name));
        validate_table_name(&name).map_err(|e| CatalogError::InvalidName {
            kind: "table",
            name: name.clone(),
            reason: e.to_string(),
        })?;

        let mut columns = Vec::with_capacity(create.columns.len());
        for column in &create.columns {
            let column_name = unquote_identifier(&column.name.value);
            if let Err(e) = validate_column_name(&column_name) {
                warn!("Column name validation warning for '{}': {}", column_name, e);
            }
            let type_text = column.data_type.to_string();
            let data_type: DataType =
                type_text
                    .parse()
                    .map_err(|reason: String| CatalogError::InvalidDefinition {
                        name: format!("{}.{}", name, column_name),
                        reason,
                    })?;
            let mut def = ColumnDef::new(column_name, data_type);
            for option in &column.options {
                match option.option {
                    ColumnOption::NotNull => def.nullable = false,
                    ColumnOption::Null => def.nullable = true,
                    _ => {}
                }
            }
            columns.push(def);
        }
        debug!(table = %name, columns = columns.len(), "Parsed CREATE TABLE");
        tables.push(TableSchema::new(name, columns));
    }
    Ok(tables)
}
