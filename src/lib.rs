//! Data Loading SDK - Batch file-to-table loading and transformation
//!
//! Provides unified interfaces for:
//! - Stage resolution over pluggable source stores
//! - Delimited and JSON decoding under named file formats
//! - Loads with `ABORT`, `CONTINUE` and `SKIP_FILE` error policies
//! - Declarative transforms materialized as tables or views
//! - Read-only analytic queries (joins, aggregates, window functions)
//! - Catalog definitions in YAML, with table schemas from SQL DDL
//! - Unloading tables back to delimited files

pub mod auth;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod load;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod stage;
pub mod store;
pub mod transform;
pub mod unload;

// Re-export commonly used types
pub use auth::{Action, AllowAll, Authorizer, ReadOnly};
pub use catalog::{Catalog, CatalogError, Job, JobStep};
pub use config::{ConfigError, LoaderConfig};
pub use error::{IngestError, IngestResult, RowError};
pub use load::{
    FileLoadReport, FileStatus, LoadExecutor, LoadHistory, LoadOptions, LoadRequest, LoadResult,
    LoadStatus, Rejection,
};
pub use pipeline::{Pipeline, StepOutcome};
pub use query::{Query, QueryError, Relation};
pub use stage::{LocalSourceStore, MemorySourceStore, SourceStore, StageResolver};
pub use store::{MemoryTableStore, StoreError, TableLocks, TableStore};
pub use transform::{ColumnRule, DerivedColumn, TransformDef, TransformResult, Transformer};

// Re-export models
pub use models::enums::*;
pub use models::{ColumnDef, DataType, FileFormat, Row, StageLocation, TableSchema, Value};
