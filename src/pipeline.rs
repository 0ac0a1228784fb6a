//! Pipeline facade
//!
//! A [`Pipeline`] binds a [`Catalog`] to a source store and owns the table
//! store, load history, view registry and table locks of one run. Every
//! writing operation is checked against the configured [`Authorizer`] first.
//!
//! State persists between runs as three JSON files in a state directory:
//! `tables.json`, `history.json` and `views.json`.
//!
//! ## Example
//!
//! ```rust
//! use data_loading_sdk::catalog::Catalog;
//! use data_loading_sdk::load::LoadRequest;
//! use data_loading_sdk::models::ErrorPolicy;
//! use data_loading_sdk::pipeline::Pipeline;
//! use data_loading_sdk::stage::MemorySourceStore;
//!
//! let catalog = Catalog::from_yaml(r#"
//! tables:
//!   - name: users
//!     columns:
//!       - { name: id, type: INTEGER }
//!       - { name: name, type: VARCHAR }
//! formats:
//!   - { name: pipe, type: CSV, field_delimiter: "|" }
//! stages:
//!   - { name: users_stage, url: "memory://users/", file_format: pipe }
//! "#).unwrap();
//!
//! let sources = MemorySourceStore::new();
//! sources.put("memory://users/part-1.txt", "1|alice\n2|bob\n");
//!
//! let pipeline = Pipeline::new(catalog, sources);
//! let result = pipeline
//!     .load(&LoadRequest::new("users_stage", "users").on_error(ErrorPolicy::Continue))
//!     .unwrap();
//! assert_eq!(result.rows_inserted, 2);
//! ```

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::auth::{Action, AllowAll, Authorizer};
use crate::catalog::{Catalog, JobStep};
use crate::error::{IngestError, IngestResult};
use crate::load::{LoadExecutor, LoadHistory, LoadHistoryEntry, LoadRequest, LoadResult};
use crate::models::{FileFormat, FormatType};
use crate::query::{Query, QueryError, Relation, RelationProvider};
use crate::stage::SourceStore;
use crate::store::{MemoryTableStore, StoreError, TableLocks, TableStore};
use crate::transform::{CatalogRelations, TransformResult, Transformer, ViewRegistry};
use crate::unload::unload_table;

/// Table contents file within a state directory
pub const TABLES_FILE: &str = "tables.json";
/// Load history file within a state directory
pub const HISTORY_FILE: &str = "history.json";
/// Registered views file within a state directory
pub const VIEWS_FILE: &str = "views.json";

/// Principal used when none is configured
pub const DEFAULT_PRINCIPAL: &str = "default";

/// What one job step did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutcome {
    Load(LoadResult),
    Transform(TransformResult),
    Truncate { table: String, rows_removed: usize },
}

/// Catalog-driven loading and transformation
pub struct Pipeline<S: SourceStore> {
    catalog: Catalog,
    sources: S,
    tables: MemoryTableStore,
    history: LoadHistory,
    views: ViewRegistry,
    locks: TableLocks,
    authorizer: Box<dyn Authorizer>,
    principal: String,
}

impl<S: SourceStore> Pipeline<S> {
    /// Create a pipeline with empty state that permits everything
    pub fn new(catalog: Catalog, sources: S) -> Self {
        Self {
            catalog,
            sources,
            tables: MemoryTableStore::new(),
            history: LoadHistory::new(),
            views: ViewRegistry::new(),
            locks: TableLocks::new(),
            authorizer: Box::new(AllowAll),
            principal: DEFAULT_PRINCIPAL.to_string(),
        }
    }

    pub fn with_authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Box::new(authorizer);
        self
    }

    /// Principal passed to the authorizer
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = principal.into();
        self
    }

    /// Restore tables, load history and views from a state directory
    ///
    /// Missing files leave the corresponding state empty.
    pub fn with_state(mut self, dir: &Path) -> IngestResult<Self> {
        let tables = dir.join(TABLES_FILE);
        if tables.exists() {
            self.tables = MemoryTableStore::load_from(&tables)?;
        }
        let history = dir.join(HISTORY_FILE);
        if history.exists() {
            self.history = LoadHistory::load_from(&history)?;
        }
        let views = dir.join(VIEWS_FILE);
        if views.exists() {
            self.views = ViewRegistry::load_from(&views)?;
        }
        info!(
            state = %dir.display(),
            tables = self.tables.table_names().len(),
            views = self.views.names().len(),
            "Restored pipeline state"
        );
        Ok(self)
    }

    /// Persist tables, load history and views to a state directory
    pub fn save_state(&self, dir: &Path) -> IngestResult<()> {
        std::fs::create_dir_all(dir)?;
        self.tables.save_to(&dir.join(TABLES_FILE))?;
        self.history.save_to(&dir.join(HISTORY_FILE))?;
        self.views.save_to(&dir.join(VIEWS_FILE))?;
        Ok(())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tables(&self) -> &MemoryTableStore {
        &self.tables
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    fn authorize(&self, action: Action, resource: &str) -> IngestResult<()> {
        if self
            .authorizer
            .check_permission(&self.principal, action, resource)
        {
            return Ok(());
        }
        warn!(principal = %self.principal, %action, resource, "Permission denied");
        Err(IngestError::PermissionDenied {
            principal: self.principal.clone(),
            action: action.to_string(),
            resource: resource.to_string(),
        })
    }

    /// Create every catalog table that does not exist yet; returns the names created
    pub fn create_tables(&self) -> IngestResult<Vec<String>> {
        let mut created = Vec::new();
        for schema in &self.catalog.tables {
            if self.tables.has_table(&schema.name) {
                continue;
            }
            self.tables.create_table(schema.clone(), false)?;
            created.push(schema.name.clone());
        }
        if !created.is_empty() {
            info!(tables = ?created, "Created tables");
        }
        Ok(created)
    }

    fn ensure_table(&self, name: &str) -> IngestResult<()> {
        if self.tables.has_table(name) {
            return Ok(());
        }
        let schema = self
            .catalog
            .table(name)
            .ok_or_else(|| IngestError::NotFound(format!("table '{}'", name)))?;
        match self.tables.create_table(schema.clone(), false) {
            Ok(()) | Err(StoreError::TableExists(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_format(&self, name: &str) -> IngestResult<&FileFormat> {
        self.catalog
            .format(name)
            .ok_or_else(|| IngestError::NotFound(format!("file format '{}'", name)))
    }

    /// Load a stage into a table by catalog names
    pub fn load(&self, request: &LoadRequest) -> IngestResult<LoadResult> {
        self.authorize(Action::Load, &request.table)?;
        let stage = self
            .catalog
            .stage(&request.stage)
            .ok_or_else(|| IngestError::NotFound(format!("stage '{}'", request.stage)))?;
        let format_name = request
            .format
            .as_deref()
            .or(stage.file_format.as_deref())
            .ok_or_else(|| {
                IngestError::InvalidDefinition(format!(
                    "load from stage '{}' names no file format and the stage has none",
                    stage.name
                ))
            })?;
        let format = self.resolve_format(format_name)?;
        self.ensure_table(&request.table)?;

        LoadExecutor::new(&self.sources, &self.tables)
            .with_history(&self.history)
            .with_locks(&self.locks)
            .execute(
                stage,
                format,
                &request.table,
                request.on_error,
                &request.options,
            )
    }

    /// Run one catalog transform
    pub fn run_transform(&self, name: &str) -> IngestResult<TransformResult> {
        let def = self
            .catalog
            .transform(name)
            .ok_or_else(|| IngestError::NotFound(format!("transform '{}'", name)))?;
        self.authorize(Action::Transform, &def.name)?;
        Transformer::new(&self.tables, &self.views)
            .with_locks(&self.locks)
            .run(def)
    }

    /// Run every catalog transform, dependencies first
    pub fn run_transforms(&self) -> IngestResult<Vec<TransformResult>> {
        let order = self.catalog.transform_order()?;
        let mut results = Vec::with_capacity(order.len());
        for def in order {
            results.push(self.run_transform(&def.name)?);
        }
        Ok(results)
    }

    /// Remove every row of a table and forget its load history
    pub fn truncate(&self, table: &str) -> IngestResult<usize> {
        self.authorize(Action::Truncate, table)?;
        let _guard = self.locks.lock(table);
        let removed = self.tables.truncate(table)?;
        let forgotten = self.history.clear_table(table);
        info!(table, rows_removed = removed, history_entries = forgotten, "Truncated table");
        Ok(removed)
    }

    /// Current contents of a table or view
    pub fn relation(&self, name: &str) -> IngestResult<Relation> {
        self.authorize(Action::Read, name)?;
        CatalogRelations::new(&self.tables, &self.views)
            .relation(name)
            .map_err(|e| match e {
                QueryError::UnknownRelation(name) => {
                    IngestError::NotFound(format!("table or view '{}'", name))
                }
                other => other.into(),
            })
    }

    /// Run a read-only query over tables and views
    ///
    /// Every table or view the query scans must be readable by the principal.
    pub fn query(&self, query: &Query) -> IngestResult<Relation> {
        for name in query.relation_names() {
            self.authorize(Action::Read, name)?;
        }
        Ok(query.execute(&CatalogRelations::new(&self.tables, &self.views))?)
    }

    /// Write a table to a delimited file
    ///
    /// Uses the named catalog format, or comma-separated text with `"`
    /// enclosure when none is given.
    pub fn unload(
        &self,
        table: &str,
        path: &Path,
        format: Option<&str>,
        header: bool,
    ) -> IngestResult<usize> {
        self.authorize(Action::Read, table)?;
        let default_format;
        let format = match format {
            Some(name) => self.resolve_format(name)?,
            None => {
                default_format = FileFormat::csv("csv").with_enclosure('"');
                &default_format
            }
        };
        if format.format_type != FormatType::Csv {
            return Err(IngestError::InvalidDefinition(format!(
                "cannot unload with format '{}': only delimited text is supported",
                format.name
            )));
        }
        unload_table(&self.tables, table, path, format, header)
    }

    /// Committed files of a table, oldest first
    pub fn history(&self, table: &str) -> Vec<LoadHistoryEntry> {
        self.history.entries(table)
    }

    /// Run the steps of a catalog job in order, stopping at the first error
    pub fn run_job(&self, name: &str) -> IngestResult<Vec<StepOutcome>> {
        let job = self
            .catalog
            .job(name)
            .ok_or_else(|| IngestError::NotFound(format!("job '{}'", name)))?;
        info!(job = %job.name, steps = job.steps.len(), "Running job");
        let mut outcomes = Vec::with_capacity(job.steps.len());
        for step in &job.steps {
            let outcome = match step {
                JobStep::Load(request) => StepOutcome::Load(self.load(request)?),
                JobStep::Transform(transform) => {
                    StepOutcome::Transform(self.run_transform(transform)?)
                }
                JobStep::Truncate(table) => StepOutcome::Truncate {
                    table: table.clone(),
                    rows_removed: self.truncate(table)?,
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Run every catalog job in declaration order
    pub fn run_jobs(&self) -> IngestResult<Vec<(String, Vec<StepOutcome>)>> {
        let names: Vec<String> = self.catalog.jobs.iter().map(|j| j.name.clone()).collect();
        names
            .into_iter()
            .map(|name| {
                let outcomes = self.run_job(&name)?;
                Ok((name, outcomes))
            })
            .collect()
    }
}
