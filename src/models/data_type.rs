//! Declared column types
//!
//! Warehouse type strings (`NUMBER(38,0)`, `VARCHAR(256)`, `TIMESTAMP_NTZ`, ...)
//! are normalized into [`DataType`] so the loader has one closed set of
//! coercion targets.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

static PARAMETERIZED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_ ]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$")
        .expect("static regex")
});

/// Maximum precision accepted for `NUMBER(p, s)`
pub const MAX_NUMBER_PRECISION: u32 = 38;

/// A declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    /// 64-bit signed integer (`INT`, `BIGINT`, `NUMBER(p, 0)`)
    Integer,
    /// Fixed-point number with `scale` fractional digits, stored as a float
    Number { precision: u32, scale: u32 },
    Float,
    /// Text, optionally bounded in characters
    Varchar { max_length: Option<u32> },
    Date,
    Time,
    Timestamp,
    /// Semi-structured JSON value
    Variant,
}

impl DataType {
    /// Whether values of this type are numeric
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Integer | DataType::Number { .. } | DataType::Float
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Number { precision, scale } => write!(f, "NUMBER({},{})", precision, scale),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Varchar { max_length: None } => write!(f, "VARCHAR"),
            DataType::Varchar {
                max_length: Some(n),
            } => write!(f, "VARCHAR({})", n),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Variant => write!(f, "VARIANT"),
        }
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = PARAMETERIZED
            .captures(s)
            .ok_or_else(|| format!("Unrecognised data type: '{}'", s))?;
        let base = caps[1].trim().to_uppercase().replace(' ', "_");
        let p1 = caps.get(2).map(|m| m.as_str().parse::<u32>());
        let p2 = caps.get(3).map(|m| m.as_str().parse::<u32>());
        let p1 = p1
            .transpose()
            .map_err(|e| format!("Invalid type parameter in '{}': {}", s, e))?;
        let p2 = p2
            .transpose()
            .map_err(|e| format!("Invalid type parameter in '{}': {}", s, e))?;

        let data_type = match base.as_str() {
            "BOOLEAN" | "BOOL" => DataType::Boolean,
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "BYTEINT" => DataType::Integer,
            "NUMBER" | "NUMERIC" | "DECIMAL" => {
                let precision = p1.unwrap_or(MAX_NUMBER_PRECISION);
                let scale = p2.unwrap_or(0);
                if precision == 0 || precision > MAX_NUMBER_PRECISION {
                    return Err(format!(
                        "NUMBER precision must be between 1 and {} (got {})",
                        MAX_NUMBER_PRECISION, precision
                    ));
                }
                if scale > precision {
                    return Err(format!(
                        "NUMBER scale ({}) cannot exceed precision ({})",
                        scale, precision
                    ));
                }
                if scale == 0 {
                    DataType::Integer
                } else {
                    DataType::Number { precision, scale }
                }
            }
            "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE_PRECISION" | "REAL" => {
                DataType::Float
            }
            "VARCHAR" | "STRING" | "TEXT" | "CHAR" | "CHARACTER" | "NVARCHAR" | "CHAR_VARYING"
            | "CHARACTER_VARYING" => DataType::Varchar { max_length: p1 },
            "DATE" => DataType::Date,
            "TIME" => DataType::Time,
            "TIMESTAMP" | "TIMESTAMP_NTZ" | "TIMESTAMP_LTZ" | "TIMESTAMP_TZ" | "DATETIME" => {
                DataType::Timestamp
            }
            "VARIANT" | "OBJECT" | "ARRAY" | "JSON" => DataType::Variant,
            _ => return Err(format!("Unrecognised data type: '{}'", s)),
        };
        Ok(data_type)
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_warehouse_type_strings() {
        assert_eq!("NUMBER(38,0)".parse::<DataType>().unwrap(), DataType::Integer);
        assert_eq!(
            "number(8, 2)".parse::<DataType>().unwrap(),
            DataType::Number {
                precision: 8,
                scale: 2
            }
        );
        assert_eq!(
            "VARCHAR(256)".parse::<DataType>().unwrap(),
            DataType::Varchar {
                max_length: Some(256)
            }
        );
        assert_eq!(
            "string".parse::<DataType>().unwrap(),
            DataType::Varchar { max_length: None }
        );
        assert_eq!(
            "TIMESTAMP_NTZ".parse::<DataType>().unwrap(),
            DataType::Timestamp
        );
        assert_eq!(
            "double precision".parse::<DataType>().unwrap(),
            DataType::Float
        );
        assert_eq!("variant".parse::<DataType>().unwrap(), DataType::Variant);
    }

    #[test]
    fn rejects_bad_types() {
        assert!("GEOGRAPHY".parse::<DataType>().is_err());
        assert!("NUMBER(4,6)".parse::<DataType>().is_err());
        assert!("NUMBER(0,0)".parse::<DataType>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for ty in [
            DataType::Boolean,
            DataType::Integer,
            DataType::Number {
                precision: 10,
                scale: 3,
            },
            DataType::Varchar {
                max_length: Some(12),
            },
            DataType::Timestamp,
            DataType::Variant,
        ] {
            assert_eq!(ty.to_string().parse::<DataType>().unwrap(), ty);
        }
    }
}
