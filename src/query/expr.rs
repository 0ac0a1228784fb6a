//! Scalar expressions
//!
//! Expressions are written against column names and bound to column
//! positions once per operator, so per-row evaluation never looks names up.
//! NULL handling follows SQL: comparisons and arithmetic with NULL yield
//! NULL, and `AND`/`OR` use three-valued logic.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::QueryError;
use super::resolve_column;
use crate::load::coerce::{coerce_json, parse_text};
use crate::models::{DataType, FileFormat, Row, Value};

/// Layouts used when casting text (all AUTO)
static CAST_FORMAT: Lazy<FileFormat> = Lazy::new(|| FileFormat::csv("cast"));

/// Calendar field extracted by [`Expr::DatePart`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    Year,
    Quarter,
    Month,
    Day,
    DayOfWeek,
    Hour,
    Minute,
}

/// One `WHEN ... THEN ...` arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBranch {
    pub when: Expr,
    pub then: Expr,
}

/// A scalar expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Column reference (`name` or `alias.name`)
    Column(String),
    Literal(#[serde(with = "literal")] Value),
    Eq(Box<Expr>, Box<Expr>),
    NotEq(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    LtEq(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    GtEq(Box<Expr>, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    /// Division always yields a float; division by zero yields NULL
    Div(Box<Expr>, Box<Expr>),
    Cast {
        expr: Box<Expr>,
        to: DataType,
    },
    /// First non-NULL argument
    Coalesce(Vec<Expr>),
    /// Map a value's text through a fixed vocabulary
    Lookup {
        expr: Box<Expr>,
        mapping: BTreeMap<String, String>,
        #[serde(default)]
        fallback: Option<Box<Expr>>,
    },
    /// Extract from a VARIANT by `a.b[0].c` path; missing paths yield NULL
    JsonPath {
        expr: Box<Expr>,
        path: String,
    },
    DatePart {
        part: DatePart,
        expr: Box<Expr>,
    },
    Round {
        expr: Box<Expr>,
        #[serde(default)]
        scale: i32,
    },
    /// String concatenation; NULL if any argument is NULL
    Concat(Vec<Expr>),
    Case {
        branches: Vec<CaseBranch>,
        #[serde(default)]
        otherwise: Option<Box<Expr>>,
    },
    /// Bound column position
    #[serde(skip)]
    Index(usize),
}

/// Column reference
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Literal value
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

impl Expr {
    pub fn eq(self, other: Expr) -> Expr {
        Expr::Eq(Box::new(self), Box::new(other))
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        Expr::NotEq(Box::new(self), Box::new(other))
    }

    pub fn lt(self, other: Expr) -> Expr {
        Expr::Lt(Box::new(self), Box::new(other))
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        Expr::LtEq(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: Expr) -> Expr {
        Expr::Gt(Box::new(self), Box::new(other))
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        Expr::GtEq(Box::new(self), Box::new(other))
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::And(vec![self, other])
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(vec![self, other])
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    pub fn between(self, low: Expr, high: Expr) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low),
            high: Box::new(high),
        }
    }

    pub fn add(self, other: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(other))
    }

    pub fn mul(self, other: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(other))
    }

    pub fn div(self, other: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(other))
    }

    pub fn cast(self, to: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            to,
        }
    }

    pub fn json_path(self, path: impl Into<String>) -> Expr {
        Expr::JsonPath {
            expr: Box::new(self),
            path: path.into(),
        }
    }

    pub fn date_part(self, part: DatePart) -> Expr {
        Expr::DatePart {
            part,
            expr: Box::new(self),
        }
    }

    /// Output column name when none is given: the referenced column's short name
    pub fn default_name(&self) -> Option<String> {
        match self {
            Expr::Column(name) => Some(
                name.rsplit_once('.')
                    .map(|(_, short)| short.to_string())
                    .unwrap_or_else(|| name.clone()),
            ),
            Expr::Cast { expr, .. } | Expr::JsonPath { expr, .. } => expr.default_name(),
            _ => None,
        }
    }

    /// Column names referenced by this expression
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Column(name) = e {
                out.push(name.clone());
            }
        });
        out
    }

    fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Index(_) => {}
            Expr::Eq(a, b)
            | Expr::NotEq(a, b)
            | Expr::Lt(a, b)
            | Expr::LtEq(a, b)
            | Expr::Gt(a, b)
            | Expr::GtEq(a, b)
            | Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::And(items) | Expr::Or(items) | Expr::Coalesce(items) | Expr::Concat(items) => {
                items.iter().for_each(|e| e.visit(f));
            }
            Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) => e.visit(f),
            Expr::Between { expr, low, high } => {
                expr.visit(f);
                low.visit(f);
                high.visit(f);
            }
            Expr::Cast { expr, .. }
            | Expr::JsonPath { expr, .. }
            | Expr::DatePart { expr, .. }
            | Expr::Round { expr, .. } => expr.visit(f),
            Expr::Lookup { expr, fallback, .. } => {
                expr.visit(f);
                if let Some(fallback) = fallback {
                    fallback.visit(f);
                }
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    branch.when.visit(f);
                    branch.then.visit(f);
                }
                if let Some(otherwise) = otherwise {
                    otherwise.visit(f);
                }
            }
        }
    }

    /// Replace column names with positions in `columns`
    pub fn bind(&self, columns: &[String]) -> Result<Expr, QueryError> {
        let b = |e: &Expr| e.bind(columns).map(Box::new);
        let all = |items: &[Expr]| {
            items
                .iter()
                .map(|e| e.bind(columns))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(match self {
            Expr::Column(name) => Expr::Index(resolve_column(columns, name)?),
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Index(i) => Expr::Index(*i),
            Expr::Eq(l, r) => Expr::Eq(b(l)?, b(r)?),
            Expr::NotEq(l, r) => Expr::NotEq(b(l)?, b(r)?),
            Expr::Lt(l, r) => Expr::Lt(b(l)?, b(r)?),
            Expr::LtEq(l, r) => Expr::LtEq(b(l)?, b(r)?),
            Expr::Gt(l, r) => Expr::Gt(b(l)?, b(r)?),
            Expr::GtEq(l, r) => Expr::GtEq(b(l)?, b(r)?),
            Expr::Add(l, r) => Expr::Add(b(l)?, b(r)?),
            Expr::Sub(l, r) => Expr::Sub(b(l)?, b(r)?),
            Expr::Mul(l, r) => Expr::Mul(b(l)?, b(r)?),
            Expr::Div(l, r) => Expr::Div(b(l)?, b(r)?),
            Expr::And(items) => Expr::And(all(items.as_slice())?),
            Expr::Or(items) => Expr::Or(all(items.as_slice())?),
            Expr::Coalesce(items) => Expr::Coalesce(all(items.as_slice())?),
            Expr::Concat(items) => Expr::Concat(all(items.as_slice())?),
            Expr::Not(e) => Expr::Not(b(e)?),
            Expr::IsNull(e) => Expr::IsNull(b(e)?),
            Expr::IsNotNull(e) => Expr::IsNotNull(b(e)?),
            Expr::Between { expr, low, high } => Expr::Between {
                expr: b(expr)?,
                low: b(low)?,
                high: b(high)?,
            },
            Expr::Cast { expr, to } => Expr::Cast {
                expr: b(expr)?,
                to: *to,
            },
            Expr::Lookup {
                expr,
                mapping,
                fallback,
            } => Expr::Lookup {
                expr: b(expr)?,
                mapping: mapping.clone(),
                fallback: fallback.as_deref().map(b).transpose()?,
            },
            Expr::JsonPath { expr, path } => Expr::JsonPath {
                expr: b(expr)?,
                path: path.clone(),
            },
            Expr::DatePart { part, expr } => Expr::DatePart {
                part: *part,
                expr: b(expr)?,
            },
            Expr::Round { expr, scale } => Expr::Round {
                expr: b(expr)?,
                scale: *scale,
            },
            Expr::Case {
                branches,
                otherwise,
            } => Expr::Case {
                branches: branches
                    .iter()
                    .map(|br| {
                        Ok(CaseBranch {
                            when: br.when.bind(columns)?,
                            then: br.then.bind(columns)?,
                        })
                    })
                    .collect::<Result<Vec<_>, QueryError>>()?,
                otherwise: otherwise.as_deref().map(b).transpose()?,
            },
        })
    }

    /// Evaluate a bound expression against one row
    pub fn eval(&self, row: &Row) -> Result<Value, QueryError> {
        match self {
            Expr::Index(i) => Ok(row.get(*i).cloned().unwrap_or(Value::Null)),
            Expr::Column(name) => Err(QueryError::UnknownColumn(format!("{} (unbound)", name))),
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Eq(l, r) => compare_with(l, r, row, |o| o == Ordering::Equal),
            Expr::NotEq(l, r) => compare_with(l, r, row, |o| o != Ordering::Equal),
            Expr::Lt(l, r) => compare_with(l, r, row, |o| o == Ordering::Less),
            Expr::LtEq(l, r) => compare_with(l, r, row, |o| o != Ordering::Greater),
            Expr::Gt(l, r) => compare_with(l, r, row, |o| o == Ordering::Greater),
            Expr::GtEq(l, r) => compare_with(l, r, row, |o| o != Ordering::Less),
            Expr::And(items) => {
                let mut saw_null = false;
                for item in items {
                    match truth(&item.eval(row)?)? {
                        Some(false) => return Ok(Value::Boolean(false)),
                        None => saw_null = true,
                        Some(true) => {}
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Boolean(true)
                })
            }
            Expr::Or(items) => {
                let mut saw_null = false;
                for item in items {
                    match truth(&item.eval(row)?)? {
                        Some(true) => return Ok(Value::Boolean(true)),
                        None => saw_null = true,
                        Some(false) => {}
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Boolean(false)
                })
            }
            Expr::Not(e) => Ok(match truth(&e.eval(row)?)? {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            }),
            Expr::IsNull(e) => Ok(Value::Boolean(e.eval(row)?.is_null())),
            Expr::IsNotNull(e) => Ok(Value::Boolean(!e.eval(row)?.is_null())),
            Expr::Between { expr, low, high } => {
                let v = expr.eval(row)?;
                let lo = compare_values(&v, &low.eval(row)?)?;
                let hi = compare_values(&v, &high.eval(row)?)?;
                Ok(match (lo, hi) {
                    (Some(lo), Some(hi)) => {
                        Value::Boolean(lo != Ordering::Less && hi != Ordering::Greater)
                    }
                    _ => Value::Null,
                })
            }
            Expr::Add(l, r) => arithmetic(l.eval(row)?, r.eval(row)?, ArithOp::Add),
            Expr::Sub(l, r) => arithmetic(l.eval(row)?, r.eval(row)?, ArithOp::Sub),
            Expr::Mul(l, r) => arithmetic(l.eval(row)?, r.eval(row)?, ArithOp::Mul),
            Expr::Div(l, r) => arithmetic(l.eval(row)?, r.eval(row)?, ArithOp::Div),
            Expr::Cast { expr, to } => {
                let v = expr.eval(row)?;
                cast_value(&v, to).map_err(|reason| QueryError::InvalidCast {
                    value: v.to_string(),
                    target: to.to_string(),
                    reason,
                })
            }
            Expr::Coalesce(items) => {
                for item in items {
                    let v = item.eval(row)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
            Expr::Lookup {
                expr,
                mapping,
                fallback,
            } => {
                let v = expr.eval(row)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                if let Some(mapped) = mapping.get(&lookup_key(&v)) {
                    return Ok(Value::String(mapped.clone()));
                }
                match fallback {
                    Some(fallback) => fallback.eval(row),
                    None => Ok(Value::Null),
                }
            }
            Expr::JsonPath { expr, path } => json_path(&expr.eval(row)?, path),
            Expr::DatePart { part, expr } => date_part(&expr.eval(row)?, *part),
            Expr::Round { expr, scale } => match expr.eval(row)? {
                Value::Null => Ok(Value::Null),
                Value::Integer(i) => Ok(Value::Integer(i)),
                Value::Float(f) => {
                    let factor = 10f64.powi(*scale);
                    Ok(Value::Float((f * factor).round() / factor))
                }
                other => Err(QueryError::TypeMismatch(format!("cannot round {}", other))),
            },
            Expr::Concat(items) => {
                let mut out = String::new();
                for item in items {
                    match item.eval(row)? {
                        Value::Null => return Ok(Value::Null),
                        Value::Variant(serde_json::Value::String(s)) => out.push_str(&s),
                        v => out.push_str(&v.to_string()),
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    if truth(&branch.when.eval(row)?)? == Some(true) {
                        return branch.then.eval(row);
                    }
                }
                match otherwise {
                    Some(e) => e.eval(row),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    /// Evaluate as a filter predicate: only TRUE passes
    pub fn matches(&self, row: &Row) -> Result<bool, QueryError> {
        Ok(truth(&self.eval(row)?)? == Some(true))
    }
}

fn lookup_key(v: &Value) -> String {
    match v {
        Value::Variant(serde_json::Value::String(s)) => s.clone(),
        other => other.to_string(),
    }
}

fn truth(v: &Value) -> Result<Option<bool>, QueryError> {
    match v {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Variant(serde_json::Value::Bool(b)) => Ok(Some(*b)),
        other => Err(QueryError::TypeMismatch(format!(
            "expected a boolean, found {}",
            other
        ))),
    }
}

fn compare_with(
    l: &Expr,
    r: &Expr,
    row: &Row,
    test: impl Fn(Ordering) -> bool,
) -> Result<Value, QueryError> {
    let ordering = compare_values(&l.eval(row)?, &r.eval(row)?)?;
    Ok(ordering.map(|o| Value::Boolean(test(o))).unwrap_or(Value::Null))
}

/// SQL comparison: `None` when either side is NULL
pub fn compare_values(a: &Value, b: &Value) -> Result<Option<Ordering>, QueryError> {
    let ordering = match (a, b) {
        (Value::Null, _) | (_, Value::Null) => return Ok(None),
        (Value::Date(d), Value::Timestamp(ts)) => d.and_time(NaiveTime::MIN).cmp(ts),
        (Value::Timestamp(ts), Value::Date(d)) => ts.cmp(&d.and_time(NaiveTime::MIN)),
        (Value::Variant(j), other) | (other, Value::Variant(j)) if !matches!(other, Value::Variant(_)) => {
            // Compare a VARIANT scalar through the other side's type
            let Some(dt) = other.data_type() else {
                return Ok(None);
            };
            let unwrapped = coerce_json(j, &dt, &CAST_FORMAT).map_err(|reason| {
                QueryError::TypeMismatch(format!("cannot compare {} with {}: {}", j, other, reason))
            })?;
            let ordering = unwrapped.cmp(other);
            return Ok(Some(if matches!(a, Value::Variant(_)) {
                ordering
            } else {
                ordering.reverse()
            }));
        }
        (a, b) if same_family(a, b) => a.cmp(b),
        (a, b) => {
            return Err(QueryError::TypeMismatch(format!(
                "cannot compare {} with {}",
                a, b
            )));
        }
    };
    Ok(Some(ordering))
}

fn same_family(a: &Value, b: &Value) -> bool {
    let family = |v: &Value| match v {
        Value::Integer(_) | Value::Float(_) => 1,
        Value::Boolean(_) => 2,
        Value::String(_) => 3,
        Value::Date(_) | Value::Timestamp(_) => 4,
        Value::Time(_) => 5,
        Value::Variant(_) => 6,
        Value::Null => 0,
    };
    family(a) == family(b)
}

#[derive(Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

fn arithmetic(a: Value, b: Value, op: ArithOp) -> Result<Value, QueryError> {
    let unwrap_variant = |v: Value| match v {
        Value::Variant(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        other => other,
    };
    let (a, b) = (unwrap_variant(a), unwrap_variant(b));
    match (&a, &b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(x), Value::Integer(y)) if !matches!(op, ArithOp::Div) => {
            let result = match op {
                ArithOp::Add => x.checked_add(*y),
                ArithOp::Sub => x.checked_sub(*y),
                ArithOp::Mul => x.checked_mul(*y),
                ArithOp::Div => None,
            };
            result
                .map(Value::Integer)
                .ok_or_else(|| QueryError::TypeMismatch("integer overflow".to_string()))
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(match op {
                ArithOp::Add => Value::Float(x + y),
                ArithOp::Sub => Value::Float(x - y),
                ArithOp::Mul => Value::Float(x * y),
                ArithOp::Div if y == 0.0 => Value::Null,
                ArithOp::Div => Value::Float(x / y),
            }),
            _ => Err(QueryError::TypeMismatch(format!(
                "arithmetic on {} and {}",
                a, b
            ))),
        },
    }
}

/// Convert a value to `to`
pub fn cast_value(v: &Value, to: &DataType) -> Result<Value, String> {
    match (v, to) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Variant(j), DataType::Variant) => Ok(Value::Variant(j.clone())),
        (Value::Variant(j), dt) => coerce_json(j, dt, &CAST_FORMAT),
        (Value::String(s), dt) => parse_text(s, dt, &CAST_FORMAT),
        (other, DataType::Variant) => Ok(Value::Variant(other.to_json())),
        (other, DataType::Varchar { .. }) => parse_text(&other.to_string(), to, &CAST_FORMAT),
        (Value::Integer(i), DataType::Integer) => Ok(Value::Integer(*i)),
        (Value::Integer(i), DataType::Boolean) => Ok(Value::Boolean(*i != 0)),
        (Value::Boolean(b), DataType::Integer) => Ok(Value::Integer(i64::from(*b))),
        (Value::Boolean(b), DataType::Boolean) => Ok(Value::Boolean(*b)),
        (Value::Float(f), DataType::Integer) => {
            let rounded = f.round();
            if rounded.is_finite() && rounded.abs() < 9.2e18 {
                Ok(Value::Integer(rounded as i64))
            } else {
                Err("out of range for INTEGER".to_string())
            }
        }
        (Value::Integer(_) | Value::Float(_), DataType::Float | DataType::Number { .. }) => {
            parse_text(&v.to_string(), to, &CAST_FORMAT)
        }
        (Value::Integer(secs), DataType::Timestamp) => chrono::DateTime::from_timestamp(*secs, 0)
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .ok_or_else(|| "epoch seconds out of range".to_string()),
        (Value::Timestamp(ts), DataType::Timestamp) => Ok(Value::Timestamp(*ts)),
        (Value::Timestamp(ts), DataType::Date) => Ok(Value::Date(ts.date())),
        (Value::Timestamp(ts), DataType::Time) => Ok(Value::Time(ts.time())),
        (Value::Date(d), DataType::Date) => Ok(Value::Date(*d)),
        (Value::Date(d), DataType::Timestamp) => Ok(Value::Timestamp(d.and_time(NaiveTime::MIN))),
        (Value::Time(t), DataType::Time) => Ok(Value::Time(*t)),
        (other, dt) => Err(format!("no conversion from {} to {}", other, dt)),
    }
}

enum PathStep {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<PathStep>, QueryError> {
    let invalid = || QueryError::InvalidPath(path.to_string());
    let trimmed = path.strip_prefix('$').unwrap_or(path);
    let mut steps = Vec::new();
    for segment in trimmed.split('.').filter(|s| !s.is_empty()) {
        let (key, mut rest) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };
        if !key.is_empty() {
            steps.push(PathStep::Key(key.to_string()));
        }
        while let Some(inner) = rest.strip_prefix('[') {
            let end = inner.find(']').ok_or_else(invalid)?;
            let index = inner[..end].trim().parse::<usize>().map_err(|_| invalid())?;
            steps.push(PathStep::Index(index));
            rest = &inner[end + 1..];
        }
        if !rest.is_empty() {
            return Err(invalid());
        }
    }
    Ok(steps)
}

fn json_path(v: &Value, path: &str) -> Result<Value, QueryError> {
    let doc = match v {
        Value::Null => return Ok(Value::Null),
        Value::Variant(j) => j.clone(),
        Value::String(s) => serde_json::from_str(s).map_err(|_| {
            QueryError::TypeMismatch(format!("'{}' is not a JSON document", s))
        })?,
        other => {
            return Err(QueryError::TypeMismatch(format!(
                "cannot extract '{}' from {}",
                path, other
            )));
        }
    };
    let mut current = &doc;
    for step in parse_path(path)? {
        let next = match step {
            PathStep::Key(key) => current.get(key.as_str()),
            PathStep::Index(i) => current.get(i),
        };
        match next {
            Some(n) => current = n,
            None => return Ok(Value::Null),
        }
    }
    Ok(match current {
        serde_json::Value::Null => Value::Null,
        other => Value::Variant(other.clone()),
    })
}

fn date_part(v: &Value, part: DatePart) -> Result<Value, QueryError> {
    let (date, time) = match v {
        Value::Null => return Ok(Value::Null),
        Value::Date(d) => (*d, NaiveTime::MIN),
        Value::Timestamp(ts) => (ts.date(), ts.time()),
        other => {
            return Err(QueryError::TypeMismatch(format!(
                "cannot extract date part from {}",
                other
            )));
        }
    };
    let n = match part {
        DatePart::Year => date.year() as i64,
        DatePart::Quarter => ((date.month() - 1) / 3 + 1) as i64,
        DatePart::Month => date.month() as i64,
        DatePart::Day => date.day() as i64,
        DatePart::DayOfWeek => date.weekday().num_days_from_sunday() as i64,
        DatePart::Hour => time.hour() as i64,
        DatePart::Minute => time.minute() as i64,
    };
    Ok(Value::Integer(n))
}

/// Literals (de)serialize as plain JSON/YAML scalars
mod literal {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_json().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s),
            other => Value::Variant(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<String> {
        vec!["t.a".to_string(), "t.b".to_string(), "w.v".to_string()]
    }

    fn eval(expr: Expr, row: &Row) -> Value {
        expr.bind(&columns()).unwrap().eval(row).unwrap()
    }

    #[test]
    fn three_valued_logic() {
        let row = vec![Value::Integer(1), Value::Null, Value::Null];
        assert_eq!(eval(col("a").eq(lit(1i64)), &row), Value::Boolean(true));
        assert_eq!(eval(col("b").eq(lit(1i64)), &row), Value::Null);
        assert_eq!(
            eval(col("b").eq(lit(1i64)).or(col("a").gt(lit(0i64))), &row),
            Value::Boolean(true)
        );
        assert_eq!(
            eval(col("b").eq(lit(1i64)).and(col("a").gt(lit(0i64))), &row),
            Value::Null
        );
        let bound = col("b").eq(lit(1i64)).bind(&columns()).unwrap();
        assert!(!bound.matches(&row).unwrap());
    }

    #[test]
    fn arithmetic_and_division() {
        let row = vec![Value::Integer(7), Value::Float(2.0), Value::Null];
        assert_eq!(eval(col("a").add(lit(3i64)), &row), Value::Integer(10));
        assert_eq!(eval(col("a").div(col("b")), &row), Value::Float(3.5));
        assert_eq!(eval(col("a").div(lit(0i64)), &row), Value::Null);
        assert_eq!(eval(col("a").mul(col("v")), &row), Value::Null);
    }

    #[test]
    fn json_path_and_cast() {
        let doc = json!({"city": {"name": "New York"}, "weather": [{"main": "Clouds"}], "main": {"temp": 270.5}});
        let row = vec![Value::Null, Value::Null, Value::Variant(doc)];
        assert_eq!(
            eval(col("v").json_path("city.name").cast(DataType::Varchar { max_length: None }), &row),
            Value::from("New York")
        );
        assert_eq!(
            eval(col("v").json_path("weather[0].main"), &row),
            Value::Variant(json!("Clouds"))
        );
        assert_eq!(
            eval(col("v").json_path("main.temp").cast(DataType::Float), &row),
            Value::Float(270.5)
        );
        assert_eq!(eval(col("v").json_path("missing.key"), &row), Value::Null);
    }

    #[test]
    fn unknown_and_ambiguous_columns() {
        let cols = vec!["t.id".to_string(), "u.id".to_string()];
        assert!(matches!(
            col("id").bind(&cols),
            Err(QueryError::AmbiguousColumn(_))
        ));
        assert!(col("t.id").bind(&cols).is_ok());
        assert!(matches!(
            col("nope").bind(&cols),
            Err(QueryError::UnknownColumn(_))
        ));
    }

    #[test]
    fn lookup_with_fallback() {
        let mapping: BTreeMap<String, String> = [("0", "unknown"), ("1", "male"), ("2", "female")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let expr = Expr::Lookup {
            expr: Box::new(col("a")),
            mapping,
            fallback: Some(Box::new(lit("other"))),
        };
        let row = vec![Value::Integer(2), Value::Null, Value::Null];
        assert_eq!(eval(expr.clone(), &row), Value::from("female"));
        let row = vec![Value::Integer(9), Value::Null, Value::Null];
        assert_eq!(eval(expr, &row), Value::from("other"));
    }

    #[test]
    fn comparing_text_with_numbers_is_an_error() {
        let row = vec![Value::from("x"), Value::Null, Value::Null];
        let bound = col("a").gt(lit(1i64)).bind(&columns()).unwrap();
        assert!(matches!(bound.eval(&row), Err(QueryError::TypeMismatch(_))));
    }

    #[test]
    fn expressions_read_from_yaml() {
        let yaml = "gt_eq:\n  - column: age\n  - literal: 18\n";
        let expr: Expr = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(expr, col("age").gt_eq(lit(18i64)));
    }
}
