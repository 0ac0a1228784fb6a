//! Window functions
//!
//! Rows are grouped by the partition keys, each partition is stable-sorted by
//! the order keys, and the function is evaluated over a ROWS frame. The
//! result is appended as a new column while the input row order is kept.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::aggregate::{numbers, sum};
use super::{Expr, QueryError, Relation, SortKey, compare_keys, sorted_indices};
use crate::models::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    RowNumber,
    Rank,
    DenseRank,
    Lag {
        expr: Expr,
        #[serde(default = "one")]
        offset: usize,
        #[serde(default)]
        default: Option<Expr>,
    },
    Lead {
        expr: Expr,
        #[serde(default = "one")]
        offset: usize,
        #[serde(default)]
        default: Option<Expr>,
    },
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    Count(Expr),
}

fn one() -> usize {
    1
}

/// ROWS frame ending at the current row, or spanning the partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    /// UNBOUNDED PRECEDING to CURRENT ROW
    Running,
    /// n PRECEDING to CURRENT ROW
    Preceding(usize),
    /// Whole partition
    Partition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub function: WindowFunction,
    #[serde(default)]
    pub partition_by: Vec<Expr>,
    #[serde(default)]
    pub order_by: Vec<SortKey>,
    /// Defaults to `Running` with an ORDER BY and `Partition` without
    #[serde(default)]
    pub frame: Option<Frame>,
    pub alias: String,
}

impl WindowSpec {
    pub fn new(function: WindowFunction, alias: impl Into<String>) -> Self {
        Self {
            function,
            partition_by: Vec::new(),
            order_by: Vec::new(),
            frame: None,
            alias: alias.into(),
        }
    }

    pub fn partition_by(mut self, keys: Vec<Expr>) -> Self {
        self.partition_by = keys;
        self
    }

    pub fn order_by(mut self, keys: Vec<SortKey>) -> Self {
        self.order_by = keys;
        self
    }

    pub fn frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    fn effective_frame(&self) -> Frame {
        self.frame.unwrap_or(if self.order_by.is_empty() {
            Frame::Partition
        } else {
            Frame::Running
        })
    }

    /// Whether the result depends on how tied rows are ordered
    fn order_sensitive(&self) -> bool {
        match &self.function {
            WindowFunction::Rank | WindowFunction::DenseRank => false,
            WindowFunction::RowNumber
            | WindowFunction::Lag { .. }
            | WindowFunction::Lead { .. } => true,
            _ => self.effective_frame() != Frame::Partition,
        }
    }
}

enum Bound {
    RowNumber,
    Rank,
    DenseRank,
    Shift {
        expr: Expr,
        offset: usize,
        default: Option<Expr>,
        forward: bool,
    },
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    Count(Expr),
}

impl Bound {
    fn new(function: &WindowFunction, columns: &[String]) -> Result<Self, QueryError> {
        let shift = |expr: &Expr, offset: usize, default: &Option<Expr>, forward: bool| {
            Ok::<_, QueryError>(Bound::Shift {
                expr: expr.bind(columns)?,
                offset,
                default: default.as_ref().map(|d| d.bind(columns)).transpose()?,
                forward,
            })
        };
        Ok(match function {
            WindowFunction::RowNumber => Bound::RowNumber,
            WindowFunction::Rank => Bound::Rank,
            WindowFunction::DenseRank => Bound::DenseRank,
            WindowFunction::Lag {
                expr,
                offset,
                default,
            } => shift(expr, *offset, default, false)?,
            WindowFunction::Lead {
                expr,
                offset,
                default,
            } => shift(expr, *offset, default, true)?,
            WindowFunction::Sum(e) => Bound::Sum(e.bind(columns)?),
            WindowFunction::Avg(e) => Bound::Avg(e.bind(columns)?),
            WindowFunction::Min(e) => Bound::Min(e.bind(columns)?),
            WindowFunction::Max(e) => Bound::Max(e.bind(columns)?),
            WindowFunction::Count(e) => Bound::Count(e.bind(columns)?),
        })
    }

    fn argument(&self) -> Option<&Expr> {
        match self {
            Bound::Sum(e) | Bound::Avg(e) | Bound::Min(e) | Bound::Max(e) | Bound::Count(e) => {
                Some(e)
            }
            Bound::Shift { expr, .. } => Some(expr),
            _ => None,
        }
    }

    fn frame_value(&self, frame: &[Value]) -> Result<Value, QueryError> {
        let present: Vec<Value> = frame.iter().filter(|v| !v.is_null()).cloned().collect();
        Ok(match self {
            Bound::Sum(_) => sum(&present)?,
            Bound::Avg(_) if present.is_empty() => Value::Null,
            Bound::Avg(_) => {
                Value::Float(numbers(&present)?.iter().sum::<f64>() / present.len() as f64)
            }
            Bound::Min(_) => present.into_iter().min().unwrap_or(Value::Null),
            Bound::Max(_) => present.into_iter().max().unwrap_or(Value::Null),
            Bound::Count(_) => Value::Integer(present.len() as i64),
            _ => Value::Null,
        })
    }
}

/// Evaluate `spec` over `input` and append its column
pub(super) fn apply(
    mut input: Relation,
    spec: &WindowSpec,
    require_total_order: bool,
) -> Result<Relation, QueryError> {
    let partition_keys = spec
        .partition_by
        .iter()
        .map(|e| e.bind(&input.columns))
        .collect::<Result<Vec<_>, _>>()?;
    let order_keys = spec
        .order_by
        .iter()
        .map(|k| Ok((k.clone(), k.expr.bind(&input.columns)?)))
        .collect::<Result<Vec<_>, QueryError>>()?;
    let function = Bound::new(&spec.function, &input.columns)?;
    let frame = spec.effective_frame();

    let mut partitions: BTreeMap<Vec<Value>, Vec<usize>> = BTreeMap::new();
    for (i, row) in input.rows.iter().enumerate() {
        let key = partition_keys
            .iter()
            .map(|k| k.eval(row))
            .collect::<Result<Vec<_>, _>>()?;
        partitions.entry(key).or_default().push(i);
    }

    let mut output = vec![Value::Null; input.rows.len()];
    let mut tie_warned = false;
    for members in partitions.into_values() {
        let (order, sort_values) = sorted_indices(&input.rows, members, &order_keys)?;

        let has_ties = sort_values
            .windows(2)
            .any(|w| compare_keys(&order_keys, &w[0], &w[1]).is_eq());
        if has_ties && spec.order_sensitive() {
            if require_total_order {
                return Err(QueryError::AmbiguousOrdering(format!(
                    "window '{}' has rows that tie on its ORDER BY keys",
                    spec.alias
                )));
            }
            if !tie_warned {
                warn!(
                    window = %spec.alias,
                    "Window ordering has ties; tied rows keep their input order"
                );
                tie_warned = true;
            }
        }

        let arguments = match function.argument() {
            Some(e) => order
                .iter()
                .map(|i| e.eval(&input.rows[*i]))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let mut rank = 0usize;
        let mut dense = 0usize;
        for (pos, row_index) in order.iter().enumerate() {
            let peer_of_previous =
                pos > 0 && compare_keys(&order_keys, &sort_values[pos - 1], &sort_values[pos]).is_eq();
            if !peer_of_previous {
                rank = pos + 1;
                dense += 1;
            }
            let value = match &function {
                Bound::RowNumber => Value::Integer(pos as i64 + 1),
                Bound::Rank => Value::Integer(rank as i64),
                Bound::DenseRank => Value::Integer(dense as i64),
                Bound::Shift {
                    offset,
                    default,
                    forward,
                    ..
                } => {
                    let target = if *forward {
                        pos.checked_add(*offset).filter(|t| *t < order.len())
                    } else {
                        pos.checked_sub(*offset)
                    };
                    match (target, default) {
                        (Some(t), _) => arguments[t].clone(),
                        (None, Some(d)) => d.eval(&input.rows[*row_index])?,
                        (None, None) => Value::Null,
                    }
                }
                framed => {
                    let window = match frame {
                        Frame::Running => &arguments[..=pos],
                        Frame::Preceding(n) => &arguments[pos.saturating_sub(n)..=pos],
                        Frame::Partition => &arguments[..],
                    };
                    framed.frame_value(window)?
                }
            };
            output[*row_index] = value;
        }
    }

    for (row, value) in input.rows.iter_mut().zip(output) {
        row.push(value);
    }
    input.columns.push(spec.alias.clone());
    Ok(input)
}
