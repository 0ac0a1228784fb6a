//! Field coercion to declared column types

use serde_json::Value as JsonValue;

use crate::decode::RawRow;
use crate::decode::temporal::{parse_date, parse_time, parse_timestamp};
use crate::error::RowError;
use crate::models::{ColumnDef, DataType, FileFormat, Row, TableSchema, Value};

/// Parse text as a value of `data_type`
///
/// Date and time layouts come from `format`.
pub fn parse_text(text: &str, data_type: &DataType, format: &FileFormat) -> Result<Value, String> {
    match data_type {
        DataType::Boolean => parse_bool(text).map(Value::Boolean),
        DataType::Integer => parse_integer(text).map(Value::Integer),
        DataType::Number { precision, scale } => {
            let v = parse_float(text)?;
            fit_number(v, *precision, *scale).map(Value::Float)
        }
        DataType::Float => parse_float(text).map(Value::Float),
        DataType::Varchar { max_length } => {
            if let Some(max) = max_length {
                let len = text.chars().count();
                if len > *max as usize {
                    return Err(format!("length {} exceeds VARCHAR({})", len, max));
                }
            }
            Ok(Value::String(text.to_string()))
        }
        DataType::Date => parse_date(text, &format.date_format).map(Value::Date),
        DataType::Time => parse_time(text, &format.time_format).map(Value::Time),
        DataType::Timestamp => {
            parse_timestamp(text, &format.timestamp_format).map(Value::Timestamp)
        }
        DataType::Variant => Ok(Value::Variant(
            serde_json::from_str(text).unwrap_or_else(|_| JsonValue::String(text.to_string())),
        )),
    }
}

fn parse_bool(text: &str) -> Result<bool, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err("not a boolean".to_string()),
    }
}

fn parse_integer(text: &str) -> Result<i64, String> {
    let trimmed = text.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(i);
    }
    let f = trimmed
        .parse::<f64>()
        .map_err(|_| "not a number".to_string())?;
    float_to_integer(f)
}

fn float_to_integer(f: f64) -> Result<i64, String> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.2e18 {
        Ok(f as i64)
    } else {
        Err("not an integral value in range".to_string())
    }
}

fn parse_float(text: &str) -> Result<f64, String> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| "not a number".to_string())
}

/// Round to `scale` fractional digits and check the integer digits fit
fn fit_number(v: f64, precision: u32, scale: u32) -> Result<f64, String> {
    if !v.is_finite() {
        return Err("not a finite number".to_string());
    }
    let factor = 10f64.powi(scale as i32);
    let rounded = (v * factor).round() / factor;
    let integer_digits = precision.saturating_sub(scale) as i32;
    if rounded.abs() >= 10f64.powi(integer_digits) {
        return Err(format!(
            "out of range for NUMBER({},{})",
            precision, scale
        ));
    }
    Ok(rounded)
}

/// Convert a JSON value to `data_type`
pub fn coerce_json(
    value: &JsonValue,
    data_type: &DataType,
    format: &FileFormat,
) -> Result<Value, String> {
    match (value, data_type) {
        (JsonValue::Null, _) => Ok(Value::Null),
        (v, DataType::Variant) => Ok(Value::Variant(v.clone())),
        (JsonValue::String(s), dt) => parse_text(s, dt, format),
        (JsonValue::Bool(b), DataType::Boolean) => Ok(Value::Boolean(*b)),
        (JsonValue::Number(n), DataType::Integer) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => float_to_integer(n.as_f64().unwrap_or(f64::NAN)).map(Value::Integer),
        },
        (JsonValue::Number(n), DataType::Float) => n
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| "not a number".to_string()),
        (JsonValue::Number(n), DataType::Number { precision, scale }) => {
            let v = n.as_f64().ok_or_else(|| "not a number".to_string())?;
            fit_number(v, *precision, *scale).map(Value::Float)
        }
        (JsonValue::Number(n), DataType::Boolean) => parse_bool(&n.to_string()).map(Value::Boolean),
        (JsonValue::Number(n), DataType::Timestamp) => parse_timestamp(
            &n.to_string(),
            &format.timestamp_format,
        )
        .map(Value::Timestamp),
        (v, DataType::Varchar { .. }) => parse_text(&v.to_string(), data_type, format),
        (v, dt) => Err(format!("cannot convert JSON {} to {}", json_kind(v), dt)),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Coerce one delimited field into `column`
pub fn coerce_field(
    raw: Option<&str>,
    column: &ColumnDef,
    format: &FileFormat,
) -> Result<Value, RowError> {
    let Some(text) = raw else {
        return null_into(column);
    };
    parse_text(text, &column.data_type, format).map_err(|reason| RowError::TypeCoercion {
        column: column.name.clone(),
        value: text.to_string(),
        target: column.data_type.to_string(),
        reason,
    })
}

fn null_into(column: &ColumnDef) -> Result<Value, RowError> {
    if column.nullable {
        Ok(Value::Null)
    } else {
        Err(RowError::ConstraintViolation {
            column: column.name.clone(),
        })
    }
}

fn coerce_json_field(
    value: &JsonValue,
    column: &ColumnDef,
    format: &FileFormat,
) -> Result<Value, RowError> {
    match coerce_json(value, &column.data_type, format) {
        Ok(Value::Null) => null_into(column),
        Ok(v) => Ok(v),
        Err(reason) => Err(RowError::TypeCoercion {
            column: column.name.clone(),
            value: value.to_string(),
            target: column.data_type.to_string(),
            reason,
        }),
    }
}

/// How JSON documents map onto table columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonMapping {
    /// The whole document into the table's single VARIANT column
    WholeDocument,
    /// Top-level keys onto columns of the same name (case-insensitive)
    ByColumnName,
}

/// Coerce a decoded record into a typed row for `schema`
pub fn coerce_row(
    raw: &RawRow,
    schema: &TableSchema,
    format: &FileFormat,
    mapping: JsonMapping,
) -> Result<Row, RowError> {
    match raw {
        RawRow::Delimited(fields) => {
            if fields.len() != schema.width() {
                return Err(RowError::ColumnCountMismatch {
                    expected: schema.width(),
                    found: fields.len(),
                });
            }
            fields
                .iter()
                .zip(&schema.columns)
                .map(|(field, column)| coerce_field(field.as_deref(), column, format))
                .collect()
        }
        RawRow::Json(doc) => match mapping {
            JsonMapping::WholeDocument => {
                let column = &schema.columns[0];
                coerce_json_field(doc, column, format).map(|v| vec![v])
            }
            JsonMapping::ByColumnName => {
                let JsonValue::Object(map) = doc else {
                    return Err(RowError::decode(format!(
                        "expected a JSON object, found {}",
                        json_kind(doc)
                    )));
                };
                schema
                    .columns
                    .iter()
                    .map(|column| {
                        let value = map
                            .iter()
                            .find(|(k, _)| column.matches_name(k))
                            .map(|(_, v)| v)
                            .unwrap_or(&JsonValue::Null);
                        coerce_json_field(value, column, format)
                    })
                    .collect()
            }
        },
        RawRow::Unparsed(text) => Err(RowError::decode(format!("unparsed record: {}", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn csv() -> FileFormat {
        FileFormat::csv("f")
    }

    #[test]
    fn numbers_round_to_scale_and_check_range() {
        let dt = DataType::Number {
            precision: 8,
            scale: 2,
        };
        assert_eq!(parse_text("123.456", &dt, &csv()), Ok(Value::Float(123.46)));
        assert!(parse_text("1234567.0", &dt, &csv()).is_err());
        assert!(parse_text("12a", &dt, &csv()).is_err());
    }

    #[test]
    fn integers_accept_integral_floats_only() {
        assert_eq!(parse_text(" 42 ", &DataType::Integer, &csv()), Ok(Value::Integer(42)));
        assert_eq!(parse_text("42.0", &DataType::Integer, &csv()), Ok(Value::Integer(42)));
        assert!(parse_text("42.5", &DataType::Integer, &csv()).is_err());
        assert!(parse_text("", &DataType::Integer, &csv()).is_err());
    }

    #[test]
    fn booleans_and_bounded_text() {
        assert_eq!(parse_text("Yes", &DataType::Boolean, &csv()), Ok(Value::Boolean(true)));
        assert_eq!(parse_text("0", &DataType::Boolean, &csv()), Ok(Value::Boolean(false)));
        let short = DataType::Varchar {
            max_length: Some(3),
        };
        assert!(parse_text("abcd", &short, &csv()).is_err());
        assert_eq!(parse_text("", &short, &csv()), Ok(Value::from("")));
    }

    #[test]
    fn null_into_not_null_is_constraint_violation() {
        let column = ColumnDef::new("id", DataType::Integer).not_null();
        assert_eq!(
            coerce_field(None, &column, &csv()),
            Err(RowError::ConstraintViolation {
                column: "id".to_string()
            })
        );
        let nullable = ColumnDef::new("id", DataType::Integer);
        assert_eq!(coerce_field(None, &nullable, &csv()), Ok(Value::Null));
    }

    #[test]
    fn coercion_error_names_column_and_value() {
        let column = ColumnDef::new("caldate", DataType::Date);
        let err = coerce_field(Some("not-a-date"), &column, &csv()).unwrap_err();
        match err {
            RowError::TypeCoercion { column, value, target, .. } => {
                assert_eq!(column, "caldate");
                assert_eq!(value, "not-a-date");
                assert_eq!(target, "DATE");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn json_whole_document_and_by_name() {
        let raw_schema = TableSchema::new("raw", vec![ColumnDef::new("v", DataType::Variant)]);
        let doc = json!({"time": 1452556800, "city": {"name": "New York"}, "Temp": "21.5"});
        let row = coerce_row(
            &RawRow::Json(doc.clone()),
            &raw_schema,
            &csv(),
            JsonMapping::WholeDocument,
        )
        .unwrap();
        assert_eq!(row, vec![Value::Variant(doc.clone())]);

        let typed = TableSchema::new(
            "typed",
            vec![
                ColumnDef::new("temp", DataType::Float),
                ColumnDef::new("city", DataType::Variant),
                ColumnDef::new("missing", DataType::Date),
                ColumnDef::new("time", DataType::Timestamp),
            ],
        );
        let row = coerce_row(&RawRow::Json(doc), &typed, &csv(), JsonMapping::ByColumnName).unwrap();
        assert_eq!(row[0], Value::Float(21.5));
        assert_eq!(row[1], Value::Variant(json!({"name": "New York"})));
        assert_eq!(row[2], Value::Null);
        assert_eq!(
            row[3],
            Value::Timestamp(
                NaiveDate::from_ymd_opt(2016, 1, 12)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn delimited_rows_coerce_positionally() {
        let schema = TableSchema::new(
            "venue",
            vec![
                ColumnDef::new("venueid", DataType::Integer).not_null(),
                ColumnDef::new("venuename", DataType::Varchar { max_length: Some(100) }),
                ColumnDef::new("venueseats", DataType::Integer),
            ],
        );
        let raw = RawRow::Delimited(vec![Some("1".into()), Some("Toyota Park".into()), None]);
        let row = coerce_row(&raw, &schema, &csv(), JsonMapping::WholeDocument).unwrap();
        assert_eq!(row, vec![Value::Integer(1), Value::from("Toyota Park"), Value::Null]);
    }
}
