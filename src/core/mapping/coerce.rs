//! Leaf value coercion to declared column types

use crate::domain::DataType;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// Coerce one leaf value to `data_type`
///
/// Complex elements (objects and lists) are only accepted by [`DataType::Json`].
/// FHIR partial dates (`YYYY`, `YYYY-MM`) are kept as-is for `date` columns.
pub fn coerce(value: &Value, data_type: DataType) -> Result<Value, String> {
    if value.is_null() || data_type == DataType::Json {
        return Ok(value.clone());
    }
    if value.is_object() || value.is_array() {
        return Err(format!(
            "complex element cannot be stored in a {data_type} column (declare type = \"json\")"
        ));
    }

    match data_type {
        DataType::String => Ok(match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        }),
        DataType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Value::from(f as i64)),
                _ => Err(format!("{value} is not an integer")),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{s}' is not an integer")),
            other => Err(format!("{other} is not an integer")),
        },
        DataType::Decimal => {
            let f = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            f.and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("{value} is not a decimal"))
        }
        DataType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            other => Err(format!("{other} is not a boolean")),
        },
        DataType::Date => match value {
            Value::String(s) => coerce_date(s).map(Value::String),
            other => Err(format!("{other} is not a date")),
        },
        DataType::DateTime => match value {
            Value::String(s) => coerce_datetime(s).map(Value::String),
            other => Err(format!("{other} is not a dateTime")),
        },
        DataType::Json => Ok(value.clone()),
    }
}

fn coerce_date(s: &str) -> Result<String, String> {
    let s = s.trim();
    let is_partial = |len: usize| {
        s.len() == len
            && s.chars()
                .enumerate()
                .all(|(i, c)| if i == 4 { c == '-' } else { c.is_ascii_digit() })
    };
    if is_partial(4) || is_partial(7) {
        return Ok(s.to_string());
    }
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| format!("'{s}' is not a date"))
}

fn coerce_datetime(s: &str) -> Result<String, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| {
            naive
                .and_utc()
                .to_rfc3339_opts(SecondsFormat::AutoSi, true)
        })
        .ok_or_else(|| format!("'{s}' is not a dateTime"))
}
