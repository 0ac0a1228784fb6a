//! Error types for loading and transformation
//!
//! Two levels exist. [`RowError`] is recoverable: it rejects one record and is
//! accumulated into a [`LoadResult`](crate::load::LoadResult) under the
//! `CONTINUE` and `SKIP_FILE` policies. [`IngestError`] ends the current
//! operation.

use crate::catalog::CatalogError;
use crate::load::Rejection;
use crate::query::QueryError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-record failure
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowError {
    /// The record is malformed under its declared format
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The record has a different number of fields than the target table
    #[error("Column count mismatch: expected {expected} fields, found {found}")]
    ColumnCountMismatch { expected: usize, found: usize },

    /// A field cannot be cast to its column's declared type
    #[error("Cannot convert '{value}' to {target} for column '{column}': {reason}")]
    TypeCoercion {
        column: String,
        value: String,
        target: String,
        reason: String,
    },

    /// NULL into a NOT NULL column
    #[error("NULL result in non-nullable column '{column}'")]
    ConstraintViolation { column: String },
}

impl RowError {
    pub fn decode(message: impl Into<String>) -> Self {
        RowError::Decode {
            message: message.into(),
        }
    }

    /// Stable error code, as reported in load results
    pub fn code(&self) -> &'static str {
        match self {
            RowError::Decode { .. } => "DECODE_ERROR",
            RowError::ColumnCountMismatch { .. } => "COLUMN_COUNT_MISMATCH",
            RowError::TypeCoercion { .. } => "TYPE_COERCION_ERROR",
            RowError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
        }
    }

    /// Column the error is attributed to, if any
    pub fn column(&self) -> Option<&str> {
        match self {
            RowError::TypeCoercion { column, .. } | RowError::ConstraintViolation { column } => {
                Some(column)
            }
            _ => None,
        }
    }
}

/// Operation-level failure
#[derive(Debug, Error)]
pub enum IngestError {
    /// A stage, file, table, format or transform does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A transform references a table that has not been loaded
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// ABORT policy surfaced a rejected record; nothing was committed
    #[error("Load into '{table}' aborted at {}:{}: {}", .rejection.file, .rejection.record_number, .rejection.error)]
    LoadAborted {
        table: String,
        rejection: Box<Rejection>,
    },

    /// A definition or request is inconsistent
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// The authorizer refused the operation
    #[error("Permission denied: {principal} may not {action} {resource}")]
    PermissionDenied {
        principal: String,
        action: String,
        resource: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result alias for pipeline operations
pub type IngestResult<T> = Result<T, IngestError>;
