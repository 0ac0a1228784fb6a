//! Load execution
//!
//! The [`LoadExecutor`] drives one `COPY`-style invocation: it resolves the
//! stage to files, decodes each file, coerces every record to the target
//! table's column types and applies the [`ErrorPolicy`] to rejected records.
//!
//! ## Policies
//!
//! - **ABORT**: the first rejection fails the invocation with
//!   [`IngestError::LoadAborted`]. Nothing from the invocation is committed.
//! - **CONTINUE**: rejected records are recorded; every other record is
//!   inserted, so `rows_inserted + rows_rejected == rows_attempted`.
//! - **SKIP_FILE** / **SKIP_FILE_n**: once a file reaches its rejection
//!   limit, the rows already read from it are discarded and the next file
//!   is loaded.
//!
//! Rows are committed with a single append at the end of the invocation, so
//! readers never see a partially loaded invocation.
//!
//! ## Example
//!
//! ```rust
//! use data_loading_sdk::load::{LoadExecutor, LoadOptions};
//! use data_loading_sdk::models::*;
//! use data_loading_sdk::stage::MemorySourceStore;
//! use data_loading_sdk::store::{MemoryTableStore, TableStore};
//!
//! let sources = MemorySourceStore::new();
//! sources.put("memory://s/users.txt", "1|alice\nx|bob\n3|carol\n");
//! let tables = MemoryTableStore::new();
//! tables
//!     .create_table(
//!         TableSchema::new(
//!             "users",
//!             vec![
//!                 ColumnDef::new("id", DataType::Integer),
//!                 ColumnDef::new("name", DataType::Varchar { max_length: None }),
//!             ],
//!         ),
//!         false,
//!     )
//!     .unwrap();
//!
//! let stage = StageLocation::new("s", "memory://s/");
//! let format = FileFormat::csv("pipe").with_delimiter('|');
//! let result = LoadExecutor::new(&sources, &tables)
//!     .execute(&stage, &format, "users", ErrorPolicy::Continue, &LoadOptions::default())
//!     .unwrap();
//!
//! assert_eq!(result.rows_inserted, 2);
//! assert_eq!(result.rows_rejected, 1);
//! assert_eq!(result.rejections[0].record_number, 2);
//! ```

pub mod coerce;
mod history;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decode::{DecodeFailure, Decoder, RawRow};
use crate::error::{IngestError, IngestResult, RowError};
use crate::models::{ErrorPolicy, FileFormat, FormatType, Row, StageLocation, TableSchema};
use crate::stage::{SourceStore, StageResolver};
use crate::store::{StoreError, TableLocks, TableStore};
use coerce::{JsonMapping, coerce_row};

pub use history::{LoadHistory, LoadHistoryEntry};

/// A record that was not loaded, with its original content
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub file: String,
    /// 1-based physical record number within the file
    pub record_number: u64,
    /// Column the error is attributed to, if any
    pub column: Option<String>,
    pub error: RowError,
    /// The record as decoded, before coercion
    pub raw: RawRow,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

impl From<DecodeFailure> for Rejection {
    fn from(failure: DecodeFailure) -> Self {
        Self {
            file: failure.file,
            record_number: failure.record_number,
            column: failure.error.column().map(str::to_string),
            error: failure.error,
            raw: failure.raw,
        }
    }
}

/// Outcome of one file within a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Every record loaded
    Loaded,
    /// Some records loaded, some rejected
    PartiallyLoaded,
    /// Nothing from the file loaded
    LoadFailed,
    /// Already loaded with identical content
    Skipped,
}

/// Per-file summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileLoadReport {
    pub file: String,
    pub status: FileStatus,
    pub rows_parsed: u64,
    pub rows_loaded: u64,
    pub rows_rejected: u64,
    pub first_error: Option<String>,
    pub first_error_record: Option<u64>,
}

/// Overall outcome of a load invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    Success,
    PartialSuccess,
    Failure,
}

impl LoadStatus {
    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadStatus::Success => 0,
            LoadStatus::PartialSuccess => 2,
            LoadStatus::Failure => 1,
        }
    }
}

/// Result of a load invocation
///
/// `rows_inserted + rows_rejected + rows_discarded == rows_attempted` always
/// holds. In validation mode `rows_inserted` counts the rows that would have
/// been inserted and `committed` is false.
#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub load_id: Uuid,
    pub table: String,
    pub committed: bool,
    pub files: Vec<FileLoadReport>,
    pub rows_attempted: u64,
    pub rows_inserted: u64,
    pub rows_rejected: u64,
    /// Valid rows dropped because their file was abandoned
    pub rows_discarded: u64,
    pub rejections: Vec<Rejection>,
    /// Rejections counted in `rows_rejected` but beyond the recording cap
    pub rejections_unrecorded: u64,
    pub files_skipped: usize,
    pub status: LoadStatus,
}

impl LoadResult {
    fn new(table: &str) -> Self {
        Self {
            load_id: Uuid::new_v4(),
            table: table.to_string(),
            committed: false,
            files: Vec::new(),
            rows_attempted: 0,
            rows_inserted: 0,
            rows_rejected: 0,
            rows_discarded: 0,
            rejections: Vec::new(),
            rejections_unrecorded: 0,
            files_skipped: 0,
            status: LoadStatus::Success,
        }
    }

    /// Whether the row counts add up
    pub fn is_balanced(&self) -> bool {
        self.rows_inserted + self.rows_rejected + self.rows_discarded == self.rows_attempted
    }
}

/// Knobs for one load invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Reload files even when the load history says they are unchanged
    pub force: bool,
    /// Decode and coerce without committing or recording history
    pub validate_only: bool,
    /// Map JSON object keys onto same-named columns
    pub match_by_column_name: bool,
    /// Files decoded concurrently (1 = sequential)
    pub parallelism: usize,
    /// Cap on recorded rejections (`None` = record all)
    pub max_recorded_rejections: Option<usize>,
    /// Restrict the load to these files of the stage
    pub files: Option<Vec<String>>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            force: false,
            validate_only: false,
            match_by_column_name: false,
            parallelism: 1,
            max_recorded_rejections: None,
            files: None,
        }
    }
}

/// A load addressed by catalog names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub stage: String,
    pub table: String,
    /// Format name; defaults to the stage's format
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
    #[serde(default)]
    pub options: LoadOptions,
}

impl LoadRequest {
    pub fn new(stage: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            table: table.into(),
            format: None,
            on_error: ErrorPolicy::default(),
            options: LoadOptions::default(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.options.files = Some(files);
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.options.force = force;
        self
    }

    pub fn validate_only(mut self, validate_only: bool) -> Self {
        self.options.validate_only = validate_only;
        self
    }
}

/// What one file produced
#[derive(Debug, Default)]
struct FileOutcome {
    rows: Vec<Row>,
    rejections: Vec<Rejection>,
    attempted: u64,
    abandoned: bool,
}

fn load_file(
    sources: &dyn SourceStore,
    uri: &str,
    schema: &TableSchema,
    format: &FileFormat,
    policy: ErrorPolicy,
    mapping: JsonMapping,
) -> IngestResult<FileOutcome> {
    let mut decoder = Decoder::open(sources, uri, format)?;
    if format.format_type == FormatType::Csv {
        decoder = decoder.expect_width(schema.width());
    }
    let limit = policy.file_rejection_limit();
    let mut outcome = FileOutcome::default();

    for item in decoder {
        outcome.attempted += 1;
        let rejection = match item {
            Ok(record) => match coerce_row(&record.row, schema, format, mapping) {
                Ok(row) => {
                    outcome.rows.push(row);
                    continue;
                }
                Err(error) => Rejection {
                    file: record.file,
                    record_number: record.record_number,
                    column: error.column().map(str::to_string),
                    error,
                    raw: record.row,
                },
            },
            Err(failure) => Rejection::from(failure),
        };
        tracing::debug!(
            "Rejected {}:{}: {}",
            rejection.file,
            rejection.record_number,
            rejection.error
        );
        outcome.rejections.push(rejection);
        if policy == ErrorPolicy::Abort {
            break;
        }
        if let Some(limit) = limit
            && outcome.rejections.len() as u64 >= u64::from(limit)
        {
            outcome.abandoned = true;
            break;
        }
    }
    Ok(outcome)
}

/// Executes loads against a source store and a table store
pub struct LoadExecutor<'a> {
    sources: &'a dyn SourceStore,
    tables: &'a dyn TableStore,
    history: Option<&'a LoadHistory>,
    locks: Option<&'a TableLocks>,
}

impl<'a> LoadExecutor<'a> {
    pub fn new(sources: &'a dyn SourceStore, tables: &'a dyn TableStore) -> Self {
        Self {
            sources,
            tables,
            history: None,
            locks: None,
        }
    }

    /// Skip unchanged files and record committed ones
    pub fn with_history(mut self, history: &'a LoadHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Hold the target table's lock for the whole invocation
    pub fn with_locks(mut self, locks: &'a TableLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    fn json_mapping(
        &self,
        schema: &TableSchema,
        format: &FileFormat,
        options: &LoadOptions,
    ) -> IngestResult<JsonMapping> {
        if format.format_type != FormatType::Json || schema.is_single_variant() {
            return Ok(JsonMapping::WholeDocument);
        }
        if options.match_by_column_name {
            return Ok(JsonMapping::ByColumnName);
        }
        Err(IngestError::InvalidDefinition(format!(
            "JSON format '{}' can only load into '{}' with a single VARIANT column or with match_by_column_name",
            format.name, schema.name
        )))
    }

    /// Load every file of `stage` into `table`
    pub fn execute(
        &self,
        stage: &StageLocation,
        format: &FileFormat,
        table: &str,
        on_error: ErrorPolicy,
        options: &LoadOptions,
    ) -> IngestResult<LoadResult> {
        let schema = self.tables.schema(table).map_err(|e| match e {
            StoreError::TableNotFound(name) => IngestError::NotFound(format!("table '{}'", name)),
            other => IngestError::Store(other),
        })?;
        let mapping = self.json_mapping(&schema, format, options)?;
        let _guard = self.locks.map(|locks| locks.lock(&schema.name));

        let resolver = StageResolver::new(self.sources);
        let files = match &options.files {
            Some(names) => resolver.resolve_named(stage, names)?,
            None => resolver.resolve(stage)?,
        };

        let mut result = LoadResult::new(&schema.name);
        tracing::info!(
            "Loading {} file(s) from stage '{}' into '{}' (on_error={})",
            files.len(),
            stage.name,
            schema.name,
            on_error
        );

        // Partition into files to load and files already loaded
        let mut pending: Vec<(String, Option<String>)> = Vec::new();
        for file in files {
            let hash = match self.history {
                Some(_) => Some(self.sources.content_hash(&file)?),
                None => None,
            };
            let seen = match (self.history, &hash) {
                (Some(history), Some(hash)) => history.is_loaded(&schema.name, &file, hash),
                _ => false,
            };
            if seen && !options.force {
                tracing::warn!("Skipping '{}': already loaded into '{}'", file, schema.name);
                result.files_skipped += 1;
                result.files.push(FileLoadReport {
                    file,
                    status: FileStatus::Skipped,
                    rows_parsed: 0,
                    rows_loaded: 0,
                    rows_rejected: 0,
                    first_error: None,
                    first_error_record: None,
                });
            } else {
                pending.push((file, hash));
            }
        }

        let run = |(uri, _): &(String, Option<String>)| {
            load_file(self.sources, uri, &schema, format, on_error, mapping)
        };
        let outcomes: Vec<IngestResult<FileOutcome>> =
            if options.parallelism > 1 && pending.len() > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(options.parallelism)
                    .build()
                    .map_err(|e| {
                        IngestError::InvalidDefinition(format!("cannot build worker pool: {}", e))
                    })?;
                pool.install(|| pending.par_iter().map(run).collect())
            } else {
                pending.iter().map(run).collect()
            };

        let mut committed_rows: Vec<Row> = Vec::new();
        let mut loaded_files: Vec<(String, String, u64)> = Vec::new();
        for ((file, hash), outcome) in pending.into_iter().zip(outcomes) {
            let mut outcome = outcome?;
            if on_error == ErrorPolicy::Abort
                && let Some(first) = outcome.rejections.drain(..).next()
            {
                tracing::warn!(
                    "Load into '{}' aborted at {}:{}",
                    schema.name,
                    first.file,
                    first.record_number
                );
                return Err(IngestError::LoadAborted {
                    table: schema.name.clone(),
                    rejection: Box::new(first),
                });
            }

            let rejected = outcome.rejections.len() as u64;
            let valid = outcome.rows.len() as u64;
            let (loaded, status) = if outcome.abandoned {
                result.rows_discarded += valid;
                (0, FileStatus::LoadFailed)
            } else if rejected == 0 {
                (valid, FileStatus::Loaded)
            } else if valid == 0 {
                (0, FileStatus::LoadFailed)
            } else {
                (valid, FileStatus::PartiallyLoaded)
            };
            tracing::debug!(
                "{}: {} parsed, {} loaded, {} rejected",
                file,
                outcome.attempted,
                loaded,
                rejected
            );

            let first = outcome.rejections.first();
            result.files.push(FileLoadReport {
                file: file.clone(),
                status,
                rows_parsed: outcome.attempted,
                rows_loaded: loaded,
                rows_rejected: rejected,
                first_error: first.map(|r| r.error.to_string()),
                first_error_record: first.map(|r| r.record_number),
            });
            result.rows_attempted += outcome.attempted;
            result.rows_inserted += loaded;
            result.rows_rejected += rejected;

            for rejection in outcome.rejections {
                match options.max_recorded_rejections {
                    Some(cap) if result.rejections.len() >= cap => {
                        result.rejections_unrecorded += 1;
                    }
                    _ => result.rejections.push(rejection),
                }
            }
            if !outcome.abandoned {
                committed_rows.extend(outcome.rows);
                if let Some(hash) = hash
                    && status != FileStatus::LoadFailed
                {
                    loaded_files.push((file, hash, loaded));
                }
            }
        }

        let any_failed = result
            .files
            .iter()
            .any(|f| f.status == FileStatus::LoadFailed);
        result.status = if result.rows_rejected == 0 && !any_failed {
            LoadStatus::Success
        } else if result.rows_inserted > 0 {
            LoadStatus::PartialSuccess
        } else {
            LoadStatus::Failure
        };

        if options.validate_only {
            tracing::info!(
                "Validated {} row(s) for '{}' ({} rejected); nothing committed",
                result.rows_attempted,
                schema.name,
                result.rows_rejected
            );
            return Ok(result);
        }

        if !committed_rows.is_empty() {
            self.tables.append_rows(&schema.name, committed_rows)?;
        }
        result.committed = true;
        if let Some(history) = self.history {
            let now = Utc::now();
            for (file, content_hash, rows_loaded) in loaded_files {
                history.record(
                    &schema.name,
                    LoadHistoryEntry {
                        file,
                        content_hash,
                        rows_loaded,
                        load_id: result.load_id,
                        loaded_at: now,
                    },
                );
            }
        }

        tracing::info!(
            "Loaded {} row(s) into '{}' ({} rejected, {} discarded, {} file(s) skipped)",
            result.rows_inserted,
            schema.name,
            result.rows_rejected,
            result.rows_discarded,
            result.files_skipped
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDef, DataType, Value};
    use crate::stage::MemorySourceStore;
    use crate::store::MemoryTableStore;

    fn users_schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                ColumnDef::new("id", DataType::Integer).not_null(),
                ColumnDef::new("name", DataType::Varchar { max_length: None }),
            ],
        )
    }

    fn setup(files: &[(&str, &str)]) -> (MemorySourceStore, MemoryTableStore) {
        let sources = MemorySourceStore::new();
        for (name, content) in files {
            sources.put(format!("memory://s/{}", name), *content);
        }
        let tables = MemoryTableStore::new();
        tables.create_table(users_schema(), false).unwrap();
        (sources, tables)
    }

    fn stage() -> StageLocation {
        StageLocation::new("s", "memory://s/")
    }

    #[test]
    fn abort_commits_nothing() {
        let (sources, tables) = setup(&[("a.csv", "1,a\n2,b\n"), ("b.csv", "3,c\nbad,d\n")]);
        tables
            .append_rows("users", vec![vec![Value::Integer(0), Value::from("seed")]])
            .unwrap();
        let err = LoadExecutor::new(&sources, &tables)
            .execute(
                &stage(),
                &FileFormat::csv("f"),
                "users",
                ErrorPolicy::Abort,
                &LoadOptions::default(),
            )
            .unwrap_err();
        match err {
            IngestError::LoadAborted { rejection, .. } => {
                assert_eq!(rejection.file, "memory://s/b.csv");
                assert_eq!(rejection.record_number, 2);
                assert_eq!(rejection.column.as_deref(), Some("id"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tables.snapshot("users").unwrap().len(), 1);
    }

    #[test]
    fn continue_balances_and_keeps_raw_rows() {
        let (sources, tables) = setup(&[("a.csv", "1,a\nx,b\n3,c,extra\n,d\n5,e\n")]);
        let result = LoadExecutor::new(&sources, &tables)
            .execute(
                &stage(),
                &FileFormat::csv("f"),
                "users",
                ErrorPolicy::Continue,
                &LoadOptions::default(),
            )
            .unwrap();
        assert_eq!(result.rows_attempted, 5);
        assert_eq!(result.rows_inserted, 2);
        assert_eq!(result.rows_rejected, 3);
        assert!(result.is_balanced());
        assert_eq!(result.status, LoadStatus::PartialSuccess);
        let codes: Vec<&str> = result.rejections.iter().map(|r| r.code()).collect();
        assert_eq!(
            codes,
            vec!["TYPE_COERCION_ERROR", "COLUMN_COUNT_MISMATCH", "CONSTRAINT_VIOLATION"]
        );
        assert_eq!(
            result.rejections[1].raw,
            RawRow::Delimited(vec![
                Some("3".to_string()),
                Some("c".to_string()),
                Some("extra".to_string())
            ])
        );
        assert_eq!(tables.snapshot("users").unwrap().len(), 2);
    }

    #[test]
    fn skip_file_discards_whole_file() {
        let (sources, tables) = setup(&[("a.csv", "1,a\n2,b\nx,c\n4,d\n"), ("b.csv", "5,e\n")]);
        let result = LoadExecutor::new(&sources, &tables)
            .execute(
                &stage(),
                &FileFormat::csv("f"),
                "users",
                ErrorPolicy::SkipFile,
                &LoadOptions::default(),
            )
            .unwrap();
        assert_eq!(result.files[0].status, FileStatus::LoadFailed);
        assert_eq!(result.files[0].first_error_record, Some(3));
        assert_eq!(result.files[1].status, FileStatus::Loaded);
        assert_eq!(result.rows_discarded, 2);
        assert_eq!(result.rows_inserted, 1);
        assert!(result.is_balanced());
        assert_eq!(tables.snapshot("users").unwrap().len(), 1);
    }

    #[test]
    fn skip_file_after_n_tolerates_fewer_errors() {
        let (sources, tables) = setup(&[("a.csv", "1,a\nx,b\n3,c\n")]);
        let result = LoadExecutor::new(&sources, &tables)
            .execute(
                &stage(),
                &FileFormat::csv("f"),
                "users",
                ErrorPolicy::SkipFileAfter(2),
                &LoadOptions::default(),
            )
            .unwrap();
        assert_eq!(result.files[0].status, FileStatus::PartiallyLoaded);
        assert_eq!(result.rows_inserted, 2);
    }

    #[test]
    fn history_skips_unchanged_files_unless_forced() {
        let (sources, tables) = setup(&[("a.csv", "1,a\n")]);
        let history = LoadHistory::new();
        let executor = LoadExecutor::new(&sources, &tables).with_history(&history);
        let format = FileFormat::csv("f");
        let options = LoadOptions::default();
        executor
            .execute(&stage(), &format, "users", ErrorPolicy::Abort, &options)
            .unwrap();
        let again = executor
            .execute(&stage(), &format, "users", ErrorPolicy::Abort, &options)
            .unwrap();
        assert_eq!(again.files_skipped, 1);
        assert_eq!(again.files[0].status, FileStatus::Skipped);
        assert_eq!(tables.snapshot("users").unwrap().len(), 1);

        let forced = LoadOptions {
            force: true,
            ..LoadOptions::default()
        };
        executor
            .execute(&stage(), &format, "users", ErrorPolicy::Abort, &forced)
            .unwrap();
        assert_eq!(tables.snapshot("users").unwrap().len(), 2);
    }

    #[test]
    fn validate_only_commits_nothing() {
        let (sources, tables) = setup(&[("a.csv", "1,a\nx,b\n")]);
        let history = LoadHistory::new();
        let options = LoadOptions {
            validate_only: true,
            ..LoadOptions::default()
        };
        let result = LoadExecutor::new(&sources, &tables)
            .with_history(&history)
            .execute(&stage(), &FileFormat::csv("f"), "users", ErrorPolicy::Continue, &options)
            .unwrap();
        assert!(!result.committed);
        assert_eq!(result.rows_inserted, 1);
        assert!(tables.snapshot("users").unwrap().is_empty());
        assert!(history.entries("users").is_empty());
    }

    #[test]
    fn parallel_load_matches_sequential() {
        let files: Vec<(String, String)> = (0..6)
            .map(|i| (format!("{}.csv", i), format!("{},n{}\nbad,x\n", i, i)))
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let (sources, sequential) = setup(&refs);
        let parallel = MemoryTableStore::new();
        parallel.create_table(users_schema(), false).unwrap();

        let format = FileFormat::csv("f");
        let seq = LoadExecutor::new(&sources, &sequential)
            .execute(&stage(), &format, "users", ErrorPolicy::Continue, &LoadOptions::default())
            .unwrap();
        let par = LoadExecutor::new(&sources, &parallel)
            .execute(
                &stage(),
                &format,
                "users",
                ErrorPolicy::Continue,
                &LoadOptions {
                    parallelism: 4,
                    ..LoadOptions::default()
                },
            )
            .unwrap();
        assert_eq!(seq.rejections, par.rejections);
        assert_eq!(
            sequential.snapshot("users").unwrap().rows,
            parallel.snapshot("users").unwrap().rows
        );
    }

    #[test]
    fn rejection_cap_counts_the_rest() {
        let (sources, tables) = setup(&[("a.csv", "a,1\nb,2\nc,3\n")]);
        let options = LoadOptions {
            max_recorded_rejections: Some(1),
            ..LoadOptions::default()
        };
        let result = LoadExecutor::new(&sources, &tables)
            .execute(&stage(), &FileFormat::csv("f"), "users", ErrorPolicy::Continue, &options)
            .unwrap();
        assert_eq!(result.rows_rejected, 3);
        assert_eq!(result.rejections.len(), 1);
        assert_eq!(result.rejections_unrecorded, 2);
        assert_eq!(result.status, LoadStatus::Failure);
    }

    #[test]
    fn json_into_typed_table_needs_column_matching() {
        let (sources, tables) = setup(&[("a.json", "{\"ID\": 1, \"name\": \"a\"}\n")]);
        let format = FileFormat::json("j");
        let executor = LoadExecutor::new(&sources, &tables);
        let err = executor
            .execute(&stage(), &format, "users", ErrorPolicy::Abort, &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidDefinition(_)));

        let options = LoadOptions {
            match_by_column_name: true,
            ..LoadOptions::default()
        };
        let result = executor
            .execute(&stage(), &format, "users", ErrorPolicy::Abort, &options)
            .unwrap();
        assert_eq!(result.rows_inserted, 1);
    }

    #[test]
    fn missing_table_is_not_found() {
        let (sources, tables) = setup(&[("a.csv", "1,a\n")]);
        let err = LoadExecutor::new(&sources, &tables)
            .execute(
                &stage(),
                &FileFormat::csv("f"),
                "nope",
                ErrorPolicy::Abort,
                &LoadOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }
}
