//! Identifier validation for catalog names
//!
//! Table, column, format, stage and transform names must be safe to use as
//! unquoted identifiers:
//! - Not empty, at most 255 characters
//! - Start with a letter or underscore
//! - Letters, digits, underscores and `$` afterwards (columns may also use dots)
//! - Not a statement keyword (`select`, `from`, `table`, ...)

use thiserror::Error;

/// Maximum length for any identifier
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Prefix reserved for temporary transform outputs
pub const TEMP_TABLE_PREFIX: &str = "__tmp_";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NameError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("{field} must start with a letter or underscore")]
    InvalidStart { field: &'static str },

    #[error("{field} contains invalid character '{found}'")]
    InvalidCharacter { field: &'static str, found: char },

    #[error("{field} cannot be a reserved word: {word}")]
    ReservedWord { field: &'static str, word: String },

    #[error("{field} cannot start with the reserved prefix '__tmp_'")]
    ReservedPrefix { field: &'static str },
}

fn validate(field: &'static str, name: &str, allow_dots: bool) -> Result<(), NameError> {
    let Some(first) = name.chars().next() else {
        return Err(NameError::Empty(field));
    };
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(NameError::TooLong {
            field,
            max: MAX_IDENTIFIER_LENGTH,
            actual: name.len(),
        });
    }
    if !first.is_alphabetic() && first != '_' {
        return Err(NameError::InvalidStart { field });
    }
    if let Some(found) = name
        .chars()
        .find(|c| !(c.is_alphanumeric() || *c == '_' || *c == '$' || (allow_dots && *c == '.')))
    {
        return Err(NameError::InvalidCharacter { field, found });
    }
    if is_reserved_word(name) {
        return Err(NameError::ReservedWord {
            field,
            word: name.to_string(),
        });
    }
    if name.to_ascii_lowercase().starts_with(TEMP_TABLE_PREFIX) {
        return Err(NameError::ReservedPrefix { field });
    }
    Ok(())
}

/// Validate a table, view or transform name.
///
/// ```
/// use data_loading_sdk::catalog::names::validate_table_name;
///
/// assert!(validate_table_name("trips").is_ok());
/// assert!(validate_table_name("date").is_ok());
/// assert!(validate_table_name("1trips").is_err());
/// assert!(validate_table_name("select").is_err());
/// ```
pub fn validate_table_name(name: &str) -> Result<(), NameError> {
    validate("table name", name, false)
}

/// Validate a column name; dots are allowed for nested JSON-derived names
pub fn validate_column_name(name: &str) -> Result<(), NameError> {
    validate("column name", name, true)
}

/// Validate a file format or stage name
pub fn validate_object_name(field: &'static str, name: &str) -> Result<(), NameError> {
    validate(field, name, false)
}

fn is_reserved_word(word: &str) -> bool {
    const RESERVED_WORDS: &[&str] = &[
        "select", "from", "where", "insert", "update", "delete", "create", "drop", "alter",
        "table", "view", "grant", "revoke", "and", "or", "not", "null", "join", "on", "group",
        "order", "by", "having", "union", "distinct", "as", "case", "when", "then", "else",
        "end", "into", "values", "limit",
    ];
    RESERVED_WORDS.contains(&word.to_ascii_lowercase().as_str())
}
