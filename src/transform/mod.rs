//! Transform layer
//!
//! A [`TransformDef`] declares a derived relation over loaded tables: a
//! source, optional joins and filter, and a list of derived columns built
//! from [`ColumnRule`]s. Every run recomputes the output from the current
//! contents of its inputs.
//!
//! - `Materialization::Table` builds the output under a temporary name and
//!   swaps it into place while holding the target's table lock, so readers
//!   see either the old or the new contents.
//! - `Materialization::View` registers the definition; it is evaluated each
//!   time it is read.
//!
//! Referencing a table or view that does not exist fails with
//! [`IngestError::Dependency`].

mod views;

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};
use crate::models::{ColumnDef, DataType, Materialization, Row, TableSchema, Value};
use crate::query::{
    Expr, JoinKind, JoinOn, Query, QueryError, Relation, RelationProvider, SortKey, col, lit,
};
use crate::store::{TableLocks, TableStore};

pub use views::{CatalogRelations, ViewRegistry};

/// How one output column is derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnRule {
    /// Copy a column (cast when the output declares a type)
    Column { column: String },
    /// Map values through a controlled vocabulary
    Lookup {
        column: String,
        mapping: BTreeMap<String, String>,
        /// Used for values missing from the mapping; NULL keeps NULL
        #[serde(default)]
        fallback: Option<String>,
    },
    /// Replace NULL with a fixed value
    Default {
        column: String,
        value: serde_json::Value,
    },
    /// `reference_date.year - column`
    AgeFromYear {
        column: String,
        reference_date: NaiveDate,
    },
    /// Extract from a VARIANT column, e.g. `$.main.temp`
    JsonPath {
        column: String,
        path: String,
        #[serde(default)]
        cast: Option<DataType>,
    },
    Expression { expr: Expr },
}

impl ColumnRule {
    pub fn copy(column: impl Into<String>) -> Self {
        ColumnRule::Column {
            column: column.into(),
        }
    }

    /// The query expression computing this rule
    pub fn to_expr(&self) -> Expr {
        match self {
            ColumnRule::Column { column } => col(column.as_str()),
            ColumnRule::Lookup {
                column,
                mapping,
                fallback,
            } => Expr::Lookup {
                expr: Box::new(col(column.as_str())),
                mapping: mapping.clone(),
                fallback: fallback.as_ref().map(|f| Box::new(lit(f.as_str()))),
            },
            ColumnRule::Default { column, value } => Expr::Coalesce(vec![
                col(column.as_str()),
                Expr::Literal(json_literal(value)),
            ]),
            ColumnRule::AgeFromYear {
                column,
                reference_date,
            } => lit(i64::from(reference_date.year())).sub(col(column.as_str()).cast(DataType::Integer)),
            ColumnRule::JsonPath { column, path, cast } => {
                let extracted = col(column.as_str()).json_path(path.as_str());
                match cast {
                    Some(to) => extracted.cast(*to),
                    None => extracted,
                }
            }
            ColumnRule::Expression { expr } => expr.clone(),
        }
    }
}

fn json_literal(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::Variant(other.clone()),
    }
}

/// One output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    #[serde(flatten)]
    pub rule: ColumnRule,
    /// Declared output type; values are cast to it
    #[serde(rename = "type", default)]
    pub data_type: Option<DataType>,
}

impl DerivedColumn {
    pub fn new(name: impl Into<String>, rule: ColumnRule) -> Self {
        Self {
            name: name.into(),
            rule,
            data_type: None,
        }
    }

    pub fn typed(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    fn to_expr(&self) -> Expr {
        let expr = self.rule.to_expr();
        match self.data_type {
            Some(to) => expr.cast(to),
            None => expr,
        }
    }
}

/// A join against another table or view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformJoin {
    pub source: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "inner")]
    pub kind: JoinKind,
    pub on: JoinOn,
}

fn inner() -> JoinKind {
    JoinKind::Inner
}

/// Declarative derived view or table
///
/// # Example
///
/// ```rust
/// use data_loading_sdk::models::Materialization;
/// use data_loading_sdk::transform::{ColumnRule, DerivedColumn, TransformDef};
///
/// let def = TransformDef::new("trips_clean", "trips", vec![
///     DerivedColumn::new("bikeid", ColumnRule::copy("bikeid")),
/// ])
/// .materialized(Materialization::View);
/// assert_eq!(def.dependencies(), vec!["trips".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDef {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub joins: Vec<TransformJoin>,
    #[serde(default)]
    pub filter: Option<Expr>,
    pub columns: Vec<DerivedColumn>,
    #[serde(default)]
    pub distinct: bool,
    /// Sort keys over the output columns
    #[serde(default)]
    pub order_by: Vec<SortKey>,
    #[serde(default)]
    pub materialization: Materialization,
}

impl TransformDef {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        columns: Vec<DerivedColumn>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            alias: None,
            joins: Vec::new(),
            filter: None,
            columns,
            distinct: false,
            order_by: Vec::new(),
            materialization: Materialization::Table,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_join(mut self, join: TransformJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_filter(mut self, filter: Expr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order_by(mut self, keys: Vec<SortKey>) -> Self {
        self.order_by = keys;
        self
    }

    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn materialized(mut self, materialization: Materialization) -> Self {
        self.materialization = materialization;
        self
    }

    /// Tables and views this transform reads, source first
    pub fn dependencies(&self) -> Vec<String> {
        std::iter::once(self.source.clone())
            .chain(self.joins.iter().map(|j| j.source.clone()))
            .collect()
    }

    /// The query computing this transform's output
    pub fn to_query(&self) -> Query {
        let mut query = Query::from(self.source.as_str());
        if let Some(alias) = &self.alias {
            query = query.alias(alias.as_str());
        }
        for join in &self.joins {
            query = query.join(
                join.source.as_str(),
                join.alias.as_deref(),
                join.kind,
                join.on.clone(),
            );
        }
        if let Some(filter) = &self.filter {
            query = query.filter(filter.clone());
        }
        query = query.select(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), c.to_expr()))
                .collect(),
        );
        if self.distinct {
            query = query.distinct();
        }
        if !self.order_by.is_empty() {
            query = query.order_by(self.order_by.clone());
        }
        query
    }

    /// Evaluate against current inputs
    pub fn compute(&self, provider: &dyn RelationProvider) -> IngestResult<Relation> {
        self.to_query().execute(provider).map_err(|e| match e {
            QueryError::UnknownRelation(missing) => IngestError::Dependency(format!(
                "transform '{}' references '{}', which does not exist",
                self.name, missing
            )),
            other => IngestError::Query(other),
        })
    }

    /// Output schema: declared types, otherwise the type of the first non-NULL value
    pub fn output_schema(&self, relation: &Relation) -> TableSchema {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let data_type = c.data_type.unwrap_or_else(|| {
                    relation
                        .rows
                        .iter()
                        .find_map(|r| r[i].data_type())
                        .unwrap_or(DataType::Varchar { max_length: None })
                });
                ColumnDef::new(c.name.as_str(), data_type)
            })
            .collect();
        TableSchema::new(self.name.as_str(), columns)
    }

    /// Check the definition without running it
    pub fn validate(&self) -> Result<(), String> {
        if self.columns.is_empty() {
            return Err(format!("transform '{}' has no columns", self.name));
        }
        let mut seen = std::collections::HashSet::new();
        for c in &self.columns {
            if !seen.insert(c.name.to_ascii_lowercase()) {
                return Err(format!(
                    "transform '{}' defines column '{}' twice",
                    self.name, c.name
                ));
            }
        }
        if self
            .dependencies()
            .iter()
            .any(|d| d.eq_ignore_ascii_case(&self.name))
        {
            return Err(format!("transform '{}' reads from itself", self.name));
        }
        Ok(())
    }
}

/// Outcome of one transform run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    pub name: String,
    pub materialization: Materialization,
    pub columns: Vec<String>,
    /// Rows in the output at the end of the run
    pub rows: usize,
}

/// Runs transforms against a table store
pub struct Transformer<'a> {
    tables: &'a dyn TableStore,
    views: &'a ViewRegistry,
    locks: Option<&'a TableLocks>,
}

impl<'a> Transformer<'a> {
    pub fn new(tables: &'a dyn TableStore, views: &'a ViewRegistry) -> Self {
        Self {
            tables,
            views,
            locks: None,
        }
    }

    pub fn with_locks(mut self, locks: &'a TableLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Recompute `def` from the current inputs
    pub fn run(&self, def: &TransformDef) -> IngestResult<TransformResult> {
        def.validate().map_err(IngestError::InvalidDefinition)?;
        let started = Instant::now();
        let provider = CatalogRelations::new(self.tables, self.views);

        let result = match def.materialization {
            Materialization::View => {
                if self.tables.has_table(&def.name) {
                    return Err(IngestError::InvalidDefinition(format!(
                        "cannot register view '{}': a table with that name exists",
                        def.name
                    )));
                }
                // Evaluate once so missing inputs fail now rather than on first read
                let relation = def.compute(&provider)?;
                self.views.register(def.clone());
                TransformResult {
                    name: def.name.clone(),
                    materialization: Materialization::View,
                    columns: relation.columns,
                    rows: relation.rows.len(),
                }
            }
            Materialization::Table => {
                let relation = def.compute(&provider)?;
                let schema = def.output_schema(&relation);
                let rows = relation.rows.len();
                self.replace_table(schema, relation.rows)?;
                self.views.remove(&def.name);
                TransformResult {
                    name: def.name.clone(),
                    materialization: Materialization::Table,
                    columns: relation.columns,
                    rows,
                }
            }
        };

        info!(
            transform = %def.name,
            materialization = ?result.materialization,
            rows = result.rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transform complete"
        );
        Ok(result)
    }

    fn replace_table(&self, schema: TableSchema, rows: Vec<Row>) -> IngestResult<()> {
        let target = schema.name.clone();
        let temp = format!("__tmp_{}_{}", target, Uuid::new_v4().simple());
        debug!(transform = %target, temp = %temp, "Building output under temporary name");

        self.tables.create_table(schema.renamed(temp.as_str()), false)?;
        let built = self.tables.append_rows(&temp, rows).map_err(IngestError::from).and_then(|_| {
            let _guard = self.locks.map(|locks| locks.lock(&target));
            if !self.tables.has_table(&target) {
                self.tables.create_table(schema.clone(), false)?;
            }
            self.tables.atomic_swap(&target, &temp)?;
            Ok(())
        });
        if let Err(e) = self.tables.drop_table(&temp) {
            warn!(temp = %temp, error = %e, "Failed to drop temporary table");
        }
        built
    }
}
