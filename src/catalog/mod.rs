//! Catalog of named definitions
//!
//! A catalog holds the table schemas, file formats, stages, transforms and
//! jobs of one pipeline. It is read once from a YAML file at startup and is
//! immutable for the duration of a run; redefining an object replaces it.
//!
//! ```yaml
//! tables:
//!   - name: trips
//!     columns:
//!       - { name: tripduration, type: INTEGER }
//!       - { name: starttime, type: TIMESTAMP }
//! ddl: |
//!   CREATE TABLE weather_raw (v VARIANT);
//! formats:
//!   - { name: csv, type: CSV, field_optionally_enclosed_by: '"' }
//! stages:
//!   - { name: citibike_trips, url: "file://data/trips", pattern: "*.csv", file_format: csv }
//! jobs:
//!   - name: nightly
//!     steps:
//!       - load: { stage: citibike_trips, table: trips, on_error: CONTINUE }
//! ```

pub mod ddl;
pub mod names;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::load::LoadRequest;
use crate::models::{FileFormat, Materialization, StageLocation, TableSchema};
use crate::transform::TransformDef;
use names::{validate_column_name, validate_object_name, validate_table_name};

/// Errors raised while reading or validating a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("SQL parse error: {0}")]
    Sql(String),

    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("{owner} references unknown {kind} '{name}'")]
    UnknownReference {
        owner: String,
        kind: &'static str,
        name: String,
    },

    #[error("Invalid definition of '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("Circular dependency between transforms: {0}")]
    CircularDependency(String),
}

/// One step of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    Load(LoadRequest),
    /// Run the named transform
    Transform(String),
    /// Remove every row of the named table and forget its load history
    Truncate(String),
}

/// A named, ordered list of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub steps: Vec<JobStep>,
}

/// The named definitions of one pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tables: Vec<TableSchema>,
    /// `CREATE TABLE` statements, merged into `tables` on load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl: Option<String>,
    /// Dialect for `ddl` (`snowflake` or `generic`)
    #[serde(default = "default_dialect")]
    pub ddl_dialect: String,
    #[serde(default)]
    pub formats: Vec<FileFormat>,
    #[serde(default)]
    pub stages: Vec<StageLocation>,
    #[serde(default)]
    pub transforms: Vec<TransformDef>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

fn default_dialect() -> String {
    "snowflake".to_string()
}

fn find<'a, T>(items: &'a [T], name: &str, key: impl Fn(&T) -> &str) -> Option<&'a T> {
    items.iter().find(|item| key(item).eq_ignore_ascii_case(name))
}

/// Replace an item with the same case-insensitive name, or append it
fn upsert<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> &str) {
    let name = key(&item).to_ascii_lowercase();
    match items
        .iter()
        .position(|existing| key(existing).eq_ignore_ascii_case(&name))
    {
        Some(i) => items[i] = item,
        None => items.push(item),
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            ddl_dialect: default_dialect(),
            ..Self::default()
        }
    }

    /// Parse YAML, merge DDL tables and validate
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let mut catalog: Catalog = serde_yaml::from_str(yaml)?;
        if let Some(sql) = catalog.ddl.take() {
            for table in ddl::parse_create_tables(&sql, &catalog.ddl_dialect)? {
                if find(&catalog.tables, &table.name, |t| t.name.as_str()).is_some() {
                    return Err(CatalogError::Duplicate {
                        kind: "table",
                        name: table.name,
                    });
                }
                catalog.tables.push(table);
            }
        }
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_yaml(&yaml)?;
        info!(
            path = %path.display(),
            tables = catalog.tables.len(),
            formats = catalog.formats.len(),
            stages = catalog.stages.len(),
            transforms = catalog.transforms.len(),
            jobs = catalog.jobs.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    pub fn to_yaml(&self) -> Result<String, CatalogError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        find(&self.tables, name, |t| t.name.as_str())
    }

    pub fn format(&self, name: &str) -> Option<&FileFormat> {
        find(&self.formats, name, |f| f.name.as_str())
    }

    pub fn stage(&self, name: &str) -> Option<&StageLocation> {
        find(&self.stages, name, |s| s.name.as_str())
    }

    pub fn transform(&self, name: &str) -> Option<&TransformDef> {
        find(&self.transforms, name, |t| t.name.as_str())
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        find(&self.jobs, name, |j| j.name.as_str())
    }

    pub fn define_table(&mut self, table: TableSchema) {
        upsert(&mut self.tables, table, |t| t.name.as_str());
    }

    pub fn define_format(&mut self, format: FileFormat) {
        upsert(&mut self.formats, format, |f| f.name.as_str());
    }

    pub fn define_stage(&mut self, stage: StageLocation) {
        upsert(&mut self.stages, stage, |s| s.name.as_str());
    }

    pub fn define_transform(&mut self, transform: TransformDef) {
        upsert(&mut self.transforms, transform, |t| t.name.as_str());
    }

    pub fn define_job(&mut self, job: Job) {
        upsert(&mut self.jobs, job, |j| j.name.as_str());
    }

    /// Check names, uniqueness, references and transform ordering
    pub fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |kind: &'static str, name: &str, e: names::NameError| CatalogError::InvalidName {
            kind,
            name: name.to_string(),
            reason: e.to_string(),
        };

        unique("table", self.tables.iter().map(|t| t.name.as_str()))?;
        unique("format", self.formats.iter().map(|f| f.name.as_str()))?;
        unique("stage", self.stages.iter().map(|s| s.name.as_str()))?;
        unique("job", self.jobs.iter().map(|j| j.name.as_str()))?;
        unique(
            "table or transform",
            self.tables
                .iter()
                .map(|t| t.name.as_str())
                .chain(self.transforms.iter().map(|t| t.name.as_str())),
        )?;

        for table in &self.tables {
            validate_table_name(&table.name).map_err(|e| invalid("table", &table.name, e))?;
            if table.columns.is_empty() {
                return Err(CatalogError::InvalidDefinition {
                    name: table.name.clone(),
                    reason: "a table needs at least one column".to_string(),
                });
            }
            for column in &table.columns {
                validate_column_name(&column.name).map_err(|e| invalid("column", &column.name, e))?;
            }
            unique(
                "column",
                table.columns.iter().map(|c| c.name.as_str()),
            )?;
        }

        for format in &self.formats {
            validate_object_name("format name", &format.name)
                .map_err(|e| invalid("format", &format.name, e))?;
            format
                .validate()
                .map_err(|reason| CatalogError::InvalidDefinition {
                    name: format.name.clone(),
                    reason,
                })?;
        }

        for stage in &self.stages {
            validate_object_name("stage name", &stage.name)
                .map_err(|e| invalid("stage", &stage.name, e))?;
            if let Some(format) = &stage.file_format
                && self.format(format).is_none()
            {
                return Err(CatalogError::UnknownReference {
                    owner: format!("stage '{}'", stage.name),
                    kind: "format",
                    name: format.clone(),
                });
            }
        }

        for transform in &self.transforms {
            validate_table_name(&transform.name)
                .map_err(|e| invalid("transform", &transform.name, e))?;
            transform
                .validate()
                .map_err(|reason| CatalogError::InvalidDefinition {
                    name: transform.name.clone(),
                    reason,
                })?;
            for dependency in transform.dependencies() {
                if self.table(&dependency).is_none() && self.transform(&dependency).is_none() {
                    return Err(CatalogError::UnknownReference {
                        owner: format!("transform '{}'", transform.name),
                        kind: "table",
                        name: dependency,
                    });
                }
            }
        }
        self.transform_order()?;

        for job in &self.jobs {
            let owner = format!("job '{}'", job.name);
            for step in &job.steps {
                let (kind, name, found) = match step {
                    JobStep::Load(request) => {
                        if self.stage(&request.stage).is_none() {
                            return Err(CatalogError::UnknownReference {
                                owner,
                                kind: "stage",
                                name: request.stage.clone(),
                            });
                        }
                        if let Some(format) = &request.format
                            && self.format(format).is_none()
                        {
                            return Err(CatalogError::UnknownReference {
                                owner,
                                kind: "format",
                                name: format.clone(),
                            });
                        }
                        ("table", &request.table, self.table(&request.table).is_some())
                    }
                    JobStep::Transform(name) => ("transform", name, self.transform(name).is_some()),
                    JobStep::Truncate(name) => ("table", name, self.table(name).is_some()),
                };
                if !found {
                    return Err(CatalogError::UnknownReference {
                        owner,
                        kind,
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Transforms ordered so that every transform follows the ones it reads
    pub fn transform_order(&self) -> Result<Vec<&TransformDef>, CatalogError> {
        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..self.transforms.len()).map(|i| graph.add_node(i)).collect();
        let by_name: HashMap<String, usize> = self
            .transforms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.to_ascii_lowercase(), i))
            .collect();

        for (i, transform) in self.transforms.iter().enumerate() {
            for dependency in transform.dependencies() {
                if let Some(&j) = by_name.get(&dependency.to_ascii_lowercase()) {
                    graph.add_edge(nodes[j], nodes[i], ());
                }
            }
        }

        toposort(&graph, None)
            .map(|order| order.into_iter().map(|n| &self.transforms[graph[n]]).collect())
            .map_err(|cycle| {
                CatalogError::CircularDependency(self.transforms[graph[cycle.node_id()]].name.clone())
            })
    }

    /// Names of transforms materialized as views
    pub fn view_names(&self) -> Vec<&str> {
        self.transforms
            .iter()
            .filter(|t| t.materialization == Materialization::View)
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Objects by kind, for listings
    pub fn summary(&self) -> BTreeMap<&'static str, Vec<String>> {
        let names = |it: Vec<&str>| it.into_iter().map(str::to_string).collect::<Vec<_>>();
        BTreeMap::from([
            ("tables", names(self.tables.iter().map(|t| t.name.as_str()).collect())),
            ("formats", names(self.formats.iter().map(|f| f.name.as_str()).collect())),
            ("stages", names(self.stages.iter().map(|s| s.name.as_str()).collect())),
            (
                "transforms",
                names(self.transforms.iter().map(|t| t.name.as_str()).collect()),
            ),
            ("jobs", names(self.jobs.iter().map(|j| j.name.as_str()).collect())),
        ])
    }
}

fn unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(CatalogError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
