//! Typed cell values produced by the generator and exchanged with backends.

use crate::schema::ColumnType;
use chrono::{NaiveDate, NaiveDateTime};
use smallvec::SmallVec;
use std::fmt;

/// A single generated or fetched cell.
///
/// Decimals are kept as scaled integers so values stay hashable and exact.
/// Values of one column compare in their natural order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Null,
    Int(i64),
    Decimal { units: i64, scale: u8 },
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Json(String),
    Bytes(Vec<u8>),
    Uuid(String),
}

/// One row, columns in table order.
pub type Row = Vec<Value>;

/// Values of the columns participating in one key, in constraint order.
pub type KeyTuple = SmallVec<[Value; 2]>;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used for range checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Decimal { units, scale } => Some(*units as f64 / 10f64.powi(*scale as i32)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Build a decimal from a float, rounding to `scale` fractional digits.
    pub fn decimal(value: f64, scale: u8) -> Value {
        let units = (value * 10f64.powi(scale as i32)).round() as i64;
        Value::Decimal { units, scale }
    }

    /// Parse a textual cell (as read back from a database or a config file)
    /// into the value shape of `col_type`.
    pub fn parse_typed(raw: &str, col_type: &ColumnType, scale: Option<u8>) -> Option<Value> {
        let trimmed = raw.trim();
        match col_type {
            ColumnType::Integer(_) => trimmed.parse::<i64>().ok().map(Value::Int).or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| Value::Int(f as i64))
            }),
            ColumnType::Decimal => {
                let scale = scale.unwrap_or_else(|| decimal_digits(trimmed));
                trimmed.parse::<f64>().ok().map(|f| Value::decimal(f, scale))
            }
            ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" | "y" => Some(Value::Bool(true)),
                "false" | "f" | "0" | "no" | "n" => Some(Value::Bool(false)),
                _ => None,
            },
            ColumnType::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .map(Value::Date),
            ColumnType::DateTime => {
                let head = trimmed.get(..19).unwrap_or(trimmed).replace('T', " ");
                NaiveDateTime::parse_from_str(&head, DATETIME_FORMAT)
                    .ok()
                    .map(Value::DateTime)
                    .or_else(|| {
                        NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                            .map(Value::DateTime)
                    })
            }
            ColumnType::Json => Some(Value::Json(raw.to_string())),
            ColumnType::Binary => Some(Value::Bytes(raw.as_bytes().to_vec())),
            ColumnType::Uuid => Some(Value::Uuid(trimmed.to_lowercase())),
            ColumnType::Text | ColumnType::Enum => Some(Value::Text(raw.to_string())),
        }
    }

    /// Convert a configuration literal into a value for `col_type`.
    pub fn from_config(
        literal: &serde_json::Value,
        col_type: &ColumnType,
        scale: Option<u8>,
    ) -> Option<Value> {
        match literal {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => match col_type {
                ColumnType::Boolean => Some(Value::Bool(*b)),
                ColumnType::Integer(_) => Some(Value::Int(*b as i64)),
                _ => Some(Value::Text(b.to_string())),
            },
            serde_json::Value::String(s) => Value::parse_typed(s, col_type, scale),
            serde_json::Value::Number(n) => Value::parse_typed(&n.to_string(), col_type, scale),
            other => match col_type {
                ColumnType::Json => Some(Value::Json(other.to_string())),
                _ => None,
            },
        }
    }
}

fn decimal_digits(raw: &str) -> u8 {
    raw.split_once('.')
        .map(|(_, frac)| frac.len().min(18) as u8)
        .unwrap_or(0)
}

/// Render a scaled decimal without going through floating point.
pub fn format_decimal(units: i64, scale: u8) -> String {
    if scale == 0 {
        return units.to_string();
    }
    let divisor = 10i128.pow(scale as u32);
    let abs = (units as i128).abs();
    let sign = if units < 0 { "-" } else { "" };
    format!(
        "{sign}{}.{:0width$}",
        abs / divisor,
        abs % divisor,
        width = scale as usize
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Decimal { units, scale } => write!(f, "{}", format_decimal(*units, *scale)),
            Value::Text(s) | Value::Json(s) | Value::Uuid(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}
