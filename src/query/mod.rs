//! Read-only query layer
//!
//! Queries are built programmatically with [`Query`] and evaluated over
//! [`Relation`]s supplied by a [`RelationProvider`] (tables and views).
//! Every operator is deterministic: joins emit rows in probe order, groups
//! come out in key order and sorts are stable.
//!
//! ## Example
//!
//! ```rust
//! use data_loading_sdk::models::Value;
//! use data_loading_sdk::query::{Aggregate, Query, Relation, SortKey, col, lit};
//!
//! let trips = Relation::new(
//!     vec!["bikeid".to_string(), "duration".to_string()],
//!     vec![
//!         vec![Value::Integer(1), Value::Integer(300)],
//!         vec![Value::Integer(2), Value::Integer(120)],
//!         vec![Value::Integer(1), Value::Integer(600)],
//!     ],
//! );
//!
//! let result = Query::from_relation(trips)
//!     .filter(col("duration").gt(lit(100i64)))
//!     .aggregate(
//!         vec![("bikeid", col("bikeid"))],
//!         vec![Aggregate::count_star("trips"), Aggregate::sum(col("duration"), "total")],
//!     )
//!     .order_by(vec![SortKey::desc(col("total"))])
//!     .execute_standalone()
//!     .unwrap();
//!
//! assert_eq!(result.columns, vec!["bikeid", "trips", "total"]);
//! assert_eq!(result.rows[0], vec![Value::Integer(1), Value::Integer(2), Value::Integer(900)]);
//! ```

mod aggregate;
mod expr;
mod join;
mod window;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Row, Value};
use crate::store::{StoreError, TableStore};

pub use aggregate::{Aggregate, AggregateFunction};
pub use expr::{CaseBranch, DatePart, Expr, cast_value, col, compare_values, lit};
pub use join::{JoinKind, JoinOn};
pub use window::{Frame, WindowFunction, WindowSpec};

/// Errors from query evaluation
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Ambiguous column reference: {0}")]
    AmbiguousColumn(String),

    #[error("Unknown table or view: {0}")]
    UnknownRelation(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Cannot cast '{value}' to {target}: {reason}")]
    InvalidCast {
        value: String,
        target: String,
        reason: String,
    },

    #[error("Invalid JSON path: {0}")]
    InvalidPath(String),

    #[error("Ambiguous ordering: {0}")]
    AmbiguousOrdering(String),

    #[error("Invalid query: {0}")]
    Invalid(String),
}

/// Find a column by name
///
/// Matching is case-insensitive. A qualified name (`t.col`) must match a
/// qualified column exactly, or an unqualified column by its short name. An
/// unqualified name matches any column with that short name, and must be
/// unique.
pub(crate) fn resolve_column(columns: &[String], name: &str) -> Result<usize, QueryError> {
    let unique = |hits: Vec<usize>| match hits.len() {
        0 => None,
        1 => Some(Ok(hits[0])),
        _ => Some(Err(QueryError::AmbiguousColumn(name.to_string()))),
    };

    let exact: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.eq_ignore_ascii_case(name))
        .map(|(i, _)| i)
        .collect();
    if let Some(found) = unique(exact) {
        return found;
    }

    let short_of = |c: &str| c.rsplit_once('.').map(|(_, s)| s.to_string());
    let by_short: Vec<usize> = match name.rsplit_once('.') {
        Some((_, short)) => columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.contains('.') && c.eq_ignore_ascii_case(short))
            .map(|(i, _)| i)
            .collect(),
        None => columns
            .iter()
            .enumerate()
            .filter(|(_, c)| short_of(c).is_some_and(|s| s.eq_ignore_ascii_case(name)))
            .map(|(i, _)| i)
            .collect(),
    };
    unique(by_short).unwrap_or_else(|| Err(QueryError::UnknownColumn(name.to_string())))
}

/// A materialized query result: column names and rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Relation {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, QueryError> {
        resolve_column(&self.columns, name)
    }

    /// All values of one column, in row order
    pub fn column_values(&self, name: &str) -> Result<Vec<Value>, QueryError> {
        let i = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r[i].clone()).collect())
    }

    /// Re-qualify every column as `qualifier.short_name`
    pub fn qualified(mut self, qualifier: &str) -> Self {
        self.columns = self
            .short_names()
            .into_iter()
            .map(|c| format!("{}.{}", qualifier, c))
            .collect();
        self
    }

    /// Column names without qualifiers
    pub fn short_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| {
                c.rsplit_once('.')
                    .map(|(_, s)| s.to_string())
                    .unwrap_or_else(|| c.clone())
            })
            .collect()
    }

    /// Rows as JSON objects keyed by short column name
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        let names = self.short_names();
        self.rows
            .iter()
            .map(|row| {
                let object = names
                    .iter()
                    .zip(row)
                    .map(|(n, v)| (n.clone(), v.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

/// Source of named relations (tables, views, inputs)
pub trait RelationProvider {
    fn relation(&self, name: &str) -> Result<Relation, QueryError>;
}

/// Exposes every table of a [`TableStore`] as a relation
pub struct StoreRelations<'a>(pub &'a dyn TableStore);

impl RelationProvider for StoreRelations<'_> {
    fn relation(&self, name: &str) -> Result<Relation, QueryError> {
        let snapshot = self.0.snapshot(name).map_err(|e| match e {
            StoreError::TableNotFound(n) => QueryError::UnknownRelation(n),
            other => QueryError::Invalid(other.to_string()),
        })?;
        Ok(Relation::new(
            snapshot.schema.column_names(),
            snapshot.rows.as_ref().clone(),
        ))
    }
}

struct NoRelations;

impl RelationProvider for NoRelations {
    fn relation(&self, name: &str) -> Result<Relation, QueryError> {
        Err(QueryError::UnknownRelation(name.to_string()))
    }
}

/// Sort direction and NULL placement for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    #[serde(default)]
    pub descending: bool,
    /// Defaults to NULLS LAST ascending and NULLS FIRST descending
    #[serde(default)]
    pub nulls_first: Option<bool>,
}

impl SortKey {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls_first: None,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
            nulls_first: None,
        }
    }

    fn nulls_first(&self) -> bool {
        self.nulls_first.unwrap_or(self.descending)
    }

    /// Order two key values under this key's direction
    pub(crate) fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first() => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first() => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if self.descending => b.cmp(a),
            (false, false) => a.cmp(b),
        }
    }
}

/// Evaluate sort keys for every row, then stable-sort row indices
pub(crate) fn sorted_indices(
    rows: &[Row],
    indices: Vec<usize>,
    keys: &[(SortKey, Expr)],
) -> Result<(Vec<usize>, Vec<Vec<Value>>), QueryError> {
    let mut keyed: Vec<(usize, Vec<Value>)> = indices
        .into_iter()
        .map(|i| {
            let values = keys
                .iter()
                .map(|(_, bound)| bound.eval(&rows[i]))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((i, values))
        })
        .collect::<Result<_, QueryError>>()?;
    keyed.sort_by(|(_, a), (_, b)| compare_keys(keys, a, b));
    Ok(keyed.into_iter().unzip())
}

pub(crate) fn compare_keys(keys: &[(SortKey, Expr)], a: &[Value], b: &[Value]) -> Ordering {
    keys.iter()
        .zip(a.iter().zip(b))
        .map(|((key, _), (x, y))| key.compare(x, y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn bind_keys(keys: &[SortKey], columns: &[String]) -> Result<Vec<(SortKey, Expr)>, QueryError> {
    keys.iter()
        .map(|k| Ok((k.clone(), k.expr.bind(columns)?)))
        .collect()
}

#[derive(Debug, Clone)]
enum QuerySource {
    Named(String),
    Relation(Relation),
}

#[derive(Debug, Clone)]
enum Step {
    Join {
        source: QuerySource,
        alias: Option<String>,
        kind: JoinKind,
        on: JoinOn,
    },
    Filter(Expr),
    Select(Vec<(String, Expr)>),
    Aggregate {
        group_by: Vec<(String, Expr)>,
        aggregates: Vec<Aggregate>,
    },
    Window(WindowSpec),
    OrderBy(Vec<SortKey>),
    Distinct,
    Limit(usize),
}

/// Programmatic read-only query
#[derive(Debug, Clone)]
pub struct Query {
    source: QuerySource,
    alias: Option<String>,
    inputs: BTreeMap<String, Relation>,
    steps: Vec<Step>,
    require_total_order: bool,
}

impl Query {
    /// Scan a table, view or named input
    pub fn from(name: impl Into<String>) -> Self {
        Self::with_source(QuerySource::Named(name.into()))
    }

    /// Scan an already computed relation
    pub fn from_relation(relation: Relation) -> Self {
        Self::with_source(QuerySource::Relation(relation))
    }

    fn with_source(source: QuerySource) -> Self {
        Self {
            source,
            alias: None,
            inputs: BTreeMap::new(),
            steps: Vec::new(),
            require_total_order: false,
        }
    }

    /// Qualify the scanned columns as `alias.column`
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Make a computed relation available by name to `from` and joins
    pub fn with_input(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.inputs
            .insert(name.into().to_ascii_lowercase(), relation);
        self
    }

    pub fn join(
        mut self,
        name: impl Into<String>,
        alias: Option<&str>,
        kind: JoinKind,
        on: JoinOn,
    ) -> Self {
        self.steps.push(Step::Join {
            source: QuerySource::Named(name.into()),
            alias: alias.map(str::to_string),
            kind,
            on,
        });
        self
    }

    pub fn join_relation(
        mut self,
        relation: Relation,
        alias: Option<&str>,
        kind: JoinKind,
        on: JoinOn,
    ) -> Self {
        self.steps.push(Step::Join {
            source: QuerySource::Relation(relation),
            alias: alias.map(str::to_string),
            kind,
            on,
        });
        self
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.steps.push(Step::Filter(predicate));
        self
    }

    /// Project to named expressions
    pub fn select<S: Into<String>>(mut self, items: Vec<(S, Expr)>) -> Self {
        self.steps.push(Step::Select(
            items.into_iter().map(|(n, e)| (n.into(), e)).collect(),
        ));
        self
    }

    /// Project to columns, keeping their short names
    pub fn select_columns(self, names: &[&str]) -> Self {
        let items = names
            .iter()
            .map(|n| {
                let e = col(*n);
                (e.default_name().unwrap_or_else(|| n.to_string()), e)
            })
            .collect();
        self.select(items)
    }

    /// Group by named keys and compute aggregates; groups come out in key order
    pub fn aggregate<S: Into<String>>(
        mut self,
        group_by: Vec<(S, Expr)>,
        aggregates: Vec<Aggregate>,
    ) -> Self {
        self.steps.push(Step::Aggregate {
            group_by: group_by.into_iter().map(|(n, e)| (n.into(), e)).collect(),
            aggregates,
        });
        self
    }

    /// Append a window function column; row order is unchanged
    pub fn window(mut self, spec: WindowSpec) -> Self {
        self.steps.push(Step::Window(spec));
        self
    }

    pub fn order_by(mut self, keys: Vec<SortKey>) -> Self {
        self.steps.push(Step::OrderBy(keys));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.steps.push(Step::Distinct);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.steps.push(Step::Limit(n));
        self
    }

    /// Fail window evaluation on ordering ties instead of warning
    pub fn require_total_order(mut self) -> Self {
        self.require_total_order = true;
        self
    }

    /// Tables and views the query reads from its provider, in scan order
    pub fn relation_names(&self) -> Vec<&str> {
        let joined = self.steps.iter().filter_map(|step| match step {
            Step::Join { source, .. } => Some(source),
            _ => None,
        });
        std::iter::once(&self.source)
            .chain(joined)
            .filter_map(|source| match source {
                QuerySource::Named(name)
                    if !self.inputs.contains_key(&name.to_ascii_lowercase()) =>
                {
                    Some(name.as_str())
                }
                _ => None,
            })
            .collect()
    }

    fn scan(
        &self,
        source: &QuerySource,
        alias: Option<&str>,
        provider: &dyn RelationProvider,
    ) -> Result<Relation, QueryError> {
        match source {
            QuerySource::Named(name) => {
                let relation = match self.inputs.get(&name.to_ascii_lowercase()) {
                    Some(input) => input.clone(),
                    None => provider.relation(name)?,
                };
                Ok(relation.qualified(alias.unwrap_or(name)))
            }
            QuerySource::Relation(relation) => Ok(match alias {
                Some(alias) => relation.clone().qualified(alias),
                None => relation.clone(),
            }),
        }
    }

    /// Evaluate against tables and views from `provider`
    pub fn execute(&self, provider: &dyn RelationProvider) -> Result<Relation, QueryError> {
        let mut current = self.scan(&self.source, self.alias.as_deref(), provider)?;
        for step in &self.steps {
            current = match step {
                Step::Join {
                    source,
                    alias,
                    kind,
                    on,
                } => {
                    let right = self.scan(source, alias.as_deref(), provider)?;
                    join::join(current, right, *kind, on)?
                }
                Step::Filter(predicate) => {
                    let bound = predicate.bind(&current.columns)?;
                    let mut rows = Vec::with_capacity(current.rows.len());
                    for row in current.rows {
                        if bound.matches(&row)? {
                            rows.push(row);
                        }
                    }
                    Relation::new(current.columns, rows)
                }
                Step::Select(items) => {
                    let bound = items
                        .iter()
                        .map(|(_, e)| e.bind(&current.columns))
                        .collect::<Result<Vec<_>, _>>()?;
                    let rows = current
                        .rows
                        .iter()
                        .map(|row| bound.iter().map(|e| e.eval(row)).collect())
                        .collect::<Result<Vec<Row>, _>>()?;
                    Relation::new(items.iter().map(|(n, _)| n.clone()).collect(), rows)
                }
                Step::Aggregate {
                    group_by,
                    aggregates,
                } => aggregate::aggregate(&current, group_by, aggregates)?,
                Step::Window(spec) => window::apply(current, spec, self.require_total_order)?,
                Step::OrderBy(keys) => {
                    let bound = bind_keys(keys, &current.columns)?;
                    let all = (0..current.rows.len()).collect();
                    let (order, _) = sorted_indices(&current.rows, all, &bound)?;
                    let mut slots: Vec<Option<Row>> =
                        current.rows.into_iter().map(Some).collect();
                    let rows = order.into_iter().filter_map(|i| slots[i].take()).collect();
                    Relation::new(current.columns, rows)
                }
                Step::Distinct => {
                    let mut seen = HashSet::new();
                    let rows = current
                        .rows
                        .into_iter()
                        .filter(|row| seen.insert(row.clone()))
                        .collect();
                    Relation::new(current.columns, rows)
                }
                Step::Limit(n) => {
                    let mut rows = current.rows;
                    rows.truncate(*n);
                    Relation::new(current.columns, rows)
                }
            };
        }
        Ok(current)
    }

    /// Evaluate a query whose sources are all relations or inputs
    pub fn execute_standalone(&self) -> Result<Relation, QueryError> {
        self.execute(&NoRelations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venues() -> Relation {
        Relation::new(
            vec!["venueid".into(), "venuename".into(), "venuestate".into()],
            vec![
                vec![Value::Integer(1), Value::from("Toyota Park"), Value::from("IL")],
                vec![Value::Integer(2), Value::from("Columbus Crew Stadium"), Value::from("OH")],
                vec![Value::Integer(3), Value::from("RFK Stadium"), Value::Null],
            ],
        )
    }

    fn events() -> Relation {
        Relation::new(
            vec!["eventid".into(), "venueid".into(), "eventname".into()],
            vec![
                vec![Value::Integer(10), Value::Integer(2), Value::from("Gala")],
                vec![Value::Integer(11), Value::Integer(1), Value::from("Opera")],
                vec![Value::Integer(12), Value::Integer(2), Value::from("Derby")],
            ],
        )
    }

    #[test]
    fn resolves_qualified_and_short_names() {
        let cols = vec!["v.venueid".to_string(), "e.eventid".to_string(), "total".to_string()];
        assert_eq!(resolve_column(&cols, "VENUEID").unwrap(), 0);
        assert_eq!(resolve_column(&cols, "e.eventid").unwrap(), 1);
        assert_eq!(resolve_column(&cols, "x.total").unwrap(), 2);
        assert!(resolve_column(&cols, "x.venueid").is_err());
    }

    #[test]
    fn join_filter_select_order() {
        let result = Query::from("events")
            .alias("e")
            .with_input("events", events())
            .with_input("venues", venues())
            .join(
                "venues",
                Some("v"),
                JoinKind::Inner,
                JoinOn::Keys(vec![("e.venueid".into(), "v.venueid".into())]),
            )
            .filter(col("venuestate").eq(lit("OH")))
            .select(vec![("event", col("eventname")), ("venue", col("v.venuename"))])
            .order_by(vec![SortKey::asc(col("event"))])
            .execute_standalone()
            .unwrap();
        assert_eq!(result.columns, vec!["event", "venue"]);
        assert_eq!(
            result.column_values("event").unwrap(),
            vec![Value::from("Derby"), Value::from("Gala")]
        );
    }

    #[test]
    fn order_by_puts_nulls_last_ascending() {
        let result = Query::from_relation(venues())
            .order_by(vec![SortKey::asc(col("venuestate"))])
            .execute_standalone()
            .unwrap();
        assert_eq!(result.rows[2][0], Value::Integer(3));
        let result = Query::from_relation(venues())
            .order_by(vec![SortKey::desc(col("venuestate"))])
            .execute_standalone()
            .unwrap();
        assert_eq!(result.rows[0][0], Value::Integer(3));
    }

    #[test]
    fn distinct_and_limit_keep_first_occurrences() {
        let result = Query::from_relation(events())
            .select_columns(&["venueid"])
            .distinct()
            .limit(5)
            .execute_standalone()
            .unwrap();
        assert_eq!(
            result.column_values("venueid").unwrap(),
            vec![Value::Integer(2), Value::Integer(1)]
        );
    }

    #[test]
    fn relation_names_skip_supplied_inputs() {
        let query = Query::from("events")
            .join(
                "venues",
                Some("v"),
                JoinKind::Inner,
                JoinOn::Keys(vec![("venueid".into(), "v.venueid".into())]),
            )
            .join_relation(
                venues(),
                Some("w"),
                JoinKind::Left,
                JoinOn::Keys(vec![("venueid".into(), "w.venueid".into())]),
            );
        assert_eq!(query.relation_names(), vec!["events", "venues"]);

        let query = query.with_input("Venues", venues());
        assert_eq!(query.relation_names(), vec!["events"]);
    }

    #[test]
    fn missing_relation_is_reported() {
        let err = Query::from("nowhere").execute_standalone().unwrap_err();
        assert!(matches!(err, QueryError::UnknownRelation(_)));
    }

    #[test]
    fn relations_read_from_the_store() {
        use crate::models::{ColumnDef, DataType, TableSchema};
        use crate::store::MemoryTableStore;

        let store = MemoryTableStore::new();
        store
            .create_table(
                TableSchema::new("t", vec![ColumnDef::new("x", DataType::Integer)]),
                false,
            )
            .unwrap();
        store
            .append_rows("t", vec![vec![Value::Integer(1)], vec![Value::Integer(2)]])
            .unwrap();
        let result = Query::from("T")
            .filter(col("x").gt(lit(1i64)))
            .execute(&StoreRelations(&store))
            .unwrap();
        assert_eq!(result.columns, vec!["T.x"]);
        assert_eq!(result.len(), 1);
    }
}
