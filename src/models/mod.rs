//! Models for loading and transformation
//!
//! This module contains the data structures shared by every stage of the
//! pipeline: table schemas, declared types, typed values, file formats and
//! stage locations.

pub mod column;
pub mod data_type;
pub mod enums;
pub mod format;
pub mod stage;
pub mod table;
pub mod value;

pub use column::ColumnDef;
pub use data_type::DataType;
pub use enums::{ErrorPolicy, FormatType, Materialization, TemporalFormat};
pub use format::FileFormat;
pub use stage::StageLocation;
pub use table::TableSchema;
pub use value::{Row, Value};
