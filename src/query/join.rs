//! Equi-joins and predicate joins

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Expr, QueryError, Relation, resolve_column};
use crate::models::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    /// Keep every left row, padding unmatched rows with NULLs
    Left,
}

/// Join condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOn {
    /// Pairs of (left column, right column) compared for equality
    Keys(Vec<(String, String)>),
    /// Arbitrary predicate over the combined columns
    Predicate(Expr),
}

pub(super) fn join(
    left: Relation,
    right: Relation,
    kind: JoinKind,
    on: &JoinOn,
) -> Result<Relation, QueryError> {
    let mut columns = left.columns.clone();
    columns.extend(right.columns.iter().cloned());
    let rows = match on {
        JoinOn::Keys(pairs) => hash_join(&left, &right, kind, pairs)?,
        JoinOn::Predicate(predicate) => {
            let bound = predicate.bind(&columns)?;
            nested_loop_join(&left, &right, kind, &bound)?
        }
    };
    Ok(Relation::new(columns, rows))
}

fn key_of(row: &Row, indices: &[usize]) -> Option<Vec<Value>> {
    let key: Vec<Value> = indices.iter().map(|i| row[*i].clone()).collect();
    // NULL never equals anything
    if key.iter().any(Value::is_null) {
        None
    } else {
        Some(key)
    }
}

fn combine(left: &Row, right: Option<&Row>, right_width: usize) -> Row {
    let mut row = left.clone();
    match right {
        Some(r) => row.extend(r.iter().cloned()),
        None => row.extend(std::iter::repeat_n(Value::Null, right_width)),
    }
    row
}

fn hash_join(
    left: &Relation,
    right: &Relation,
    kind: JoinKind,
    pairs: &[(String, String)],
) -> Result<Vec<Row>, QueryError> {
    if pairs.is_empty() {
        return Err(QueryError::Invalid("join requires at least one key".into()));
    }
    let mut left_keys = Vec::with_capacity(pairs.len());
    let mut right_keys = Vec::with_capacity(pairs.len());
    for (l, r) in pairs {
        left_keys.push(resolve_column(&left.columns, l)?);
        right_keys.push(resolve_column(&right.columns, r)?);
    }

    let mut build: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows.iter().enumerate() {
        if let Some(key) = key_of(row, &right_keys) {
            build.entry(key).or_default().push(i);
        }
    }

    let width = right.columns.len();
    let mut out = Vec::new();
    for row in &left.rows {
        let matches = key_of(row, &left_keys).and_then(|k| build.get(&k));
        match matches {
            Some(indices) => {
                for i in indices {
                    out.push(combine(row, Some(&right.rows[*i]), width));
                }
            }
            None if kind == JoinKind::Left => out.push(combine(row, None, width)),
            None => {}
        }
    }
    Ok(out)
}

fn nested_loop_join(
    left: &Relation,
    right: &Relation,
    kind: JoinKind,
    predicate: &Expr,
) -> Result<Vec<Row>, QueryError> {
    let width = right.columns.len();
    let mut out = Vec::new();
    for l in &left.rows {
        let mut matched = false;
        for r in &right.rows {
            let candidate = combine(l, Some(r), width);
            if predicate.matches(&candidate)? {
                matched = true;
                out.push(candidate);
            }
        }
        if !matched && kind == JoinKind::Left {
            out.push(combine(l, None, width));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{col, lit};

    fn left() -> Relation {
        Relation::new(
            vec!["t.id".into(), "t.station".into()],
            vec![
                vec![Value::Integer(1), Value::Integer(72)],
                vec![Value::Integer(2), Value::Null],
                vec![Value::Integer(3), Value::Integer(99)],
            ],
        )
    }

    fn right() -> Relation {
        Relation::new(
            vec!["s.station".into(), "s.name".into()],
            vec![
                vec![Value::Integer(72), Value::from("W 52 St")],
                vec![Value::Null, Value::from("unknown")],
            ],
        )
    }

    #[test]
    fn inner_join_drops_unmatched_and_null_keys() {
        let on = JoinOn::Keys(vec![("t.station".into(), "s.station".into())]);
        let joined = join(left(), right(), JoinKind::Inner, &on).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.rows[0][3], Value::from("W 52 St"));
    }

    #[test]
    fn left_join_pads_with_nulls_in_left_order() {
        let on = JoinOn::Keys(vec![("t.station".into(), "s.station".into())]);
        let joined = join(left(), right(), JoinKind::Left, &on).unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(
            joined.column_values("t.id").unwrap(),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
        assert!(joined.rows[1][2].is_null());
        assert!(joined.rows[2][3].is_null());
    }

    #[test]
    fn predicate_join_evaluates_over_both_sides() {
        let on = JoinOn::Predicate(col("t.station").gt(col("s.station")).and(lit(true)));
        let joined = join(left(), right(), JoinKind::Inner, &on).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.rows[0][0], Value::Integer(3));
    }
}
