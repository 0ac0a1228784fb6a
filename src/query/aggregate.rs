//! Grouped aggregation

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Expr, QueryError, Relation};
use crate::models::{Row, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Non-NULL values
    Count(Expr),
    CountStar,
    CountDistinct(Expr),
    /// Integer when every input is an integer, otherwise float
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
}

/// An aggregate with its output column name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub alias: String,
}

impl Aggregate {
    pub fn new(function: AggregateFunction, alias: impl Into<String>) -> Self {
        Self {
            function,
            alias: alias.into(),
        }
    }

    pub fn count(expr: Expr, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Count(expr), alias)
    }

    pub fn count_star(alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::CountStar, alias)
    }

    pub fn count_distinct(expr: Expr, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::CountDistinct(expr), alias)
    }

    pub fn sum(expr: Expr, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Sum(expr), alias)
    }

    pub fn avg(expr: Expr, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Avg(expr), alias)
    }

    pub fn min(expr: Expr, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Min(expr), alias)
    }

    pub fn max(expr: Expr, alias: impl Into<String>) -> Self {
        Self::new(AggregateFunction::Max(expr), alias)
    }
}

#[derive(Debug, Clone)]
enum Bound {
    Count(Expr),
    CountStar,
    CountDistinct(Expr),
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
}

impl Bound {
    fn new(function: &AggregateFunction, columns: &[String]) -> Result<Self, QueryError> {
        Ok(match function {
            AggregateFunction::Count(e) => Bound::Count(e.bind(columns)?),
            AggregateFunction::CountStar => Bound::CountStar,
            AggregateFunction::CountDistinct(e) => Bound::CountDistinct(e.bind(columns)?),
            AggregateFunction::Sum(e) => Bound::Sum(e.bind(columns)?),
            AggregateFunction::Avg(e) => Bound::Avg(e.bind(columns)?),
            AggregateFunction::Min(e) => Bound::Min(e.bind(columns)?),
            AggregateFunction::Max(e) => Bound::Max(e.bind(columns)?),
        })
    }

    fn compute(&self, rows: &[&Row]) -> Result<Value, QueryError> {
        let values = |e: &Expr| -> Result<Vec<Value>, QueryError> {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                let v = e.eval(row)?;
                if !v.is_null() {
                    out.push(v);
                }
            }
            Ok(out)
        };
        Ok(match self {
            Bound::CountStar => Value::Integer(rows.len() as i64),
            Bound::Count(e) => Value::Integer(values(e)?.len() as i64),
            Bound::CountDistinct(e) => {
                Value::Integer(values(e)?.into_iter().collect::<BTreeSet<_>>().len() as i64)
            }
            Bound::Sum(e) => sum(&values(e)?)?,
            Bound::Avg(e) => {
                let vs = values(e)?;
                if vs.is_empty() {
                    Value::Null
                } else {
                    let total = numbers(&vs)?.iter().sum::<f64>();
                    Value::Float(total / vs.len() as f64)
                }
            }
            Bound::Min(e) => values(e)?.into_iter().min().unwrap_or(Value::Null),
            Bound::Max(e) => values(e)?.into_iter().max().unwrap_or(Value::Null),
        })
    }
}

pub(super) fn numbers(values: &[Value]) -> Result<Vec<f64>, QueryError> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| QueryError::TypeMismatch(format!("cannot sum {}", v)))
        })
        .collect()
}

pub(super) fn sum(values: &[Value]) -> Result<Value, QueryError> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    if values.iter().all(|v| matches!(v, Value::Integer(_))) {
        let mut total: i64 = 0;
        for v in values {
            if let Value::Integer(i) = v {
                total = total
                    .checked_add(*i)
                    .ok_or_else(|| QueryError::TypeMismatch("integer overflow in SUM".into()))?;
            }
        }
        return Ok(Value::Integer(total));
    }
    Ok(Value::Float(numbers(values)?.iter().sum()))
}

/// Group `input` and compute aggregates; output is key columns then aggregates
pub(super) fn aggregate(
    input: &Relation,
    group_by: &[(String, Expr)],
    aggregates: &[Aggregate],
) -> Result<Relation, QueryError> {
    let keys = group_by
        .iter()
        .map(|(_, e)| e.bind(&input.columns))
        .collect::<Result<Vec<_>, _>>()?;
    let functions = aggregates
        .iter()
        .map(|a| Bound::new(&a.function, &input.columns))
        .collect::<Result<Vec<_>, _>>()?;

    let mut groups: BTreeMap<Vec<Value>, Vec<&Row>> = BTreeMap::new();
    for row in &input.rows {
        let key = keys
            .iter()
            .map(|k| k.eval(row))
            .collect::<Result<Vec<_>, _>>()?;
        groups.entry(key).or_default().push(row);
    }
    // A global aggregate over no rows still yields one row
    if groups.is_empty() && keys.is_empty() {
        groups.insert(Vec::new(), Vec::new());
    }

    let mut rows = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut row = key;
        for f in &functions {
            row.push(f.compute(&members)?);
        }
        rows.push(row);
    }

    let columns = group_by
        .iter()
        .map(|(n, _)| n.clone())
        .chain(aggregates.iter().map(|a| a.alias.clone()))
        .collect();
    Ok(Relation::new(columns, rows))
}
