//! Typed cell values and the text-to-type converter.
//!
//! [`convert`] is total over [`ColumnType`]: blank text always yields `None`
//! (an omitted column, never an explicit null), well-formed text yields the
//! matching [`Value`] variant, and everything else is a [`ConversionError`]
//! carrying the offending text and target type.

use std::{fmt, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use num_bigint::BigInt;
use uuid::Uuid;

use crate::{error::ConversionError, types::ColumnType};

const COLLECTION_SEPARATOR: char = ',';
const MAP_ENTRY_SEPARATOR: char = '=';

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Varint(BigInt),
    Decimal(BigDecimal),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
    Uuid(Uuid),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::BigInt(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Double(f) => f.to_string(),
            Value::Varint(i) => i.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            Value::Blob(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
                format!("0x{hex}")
            }
            Value::Uuid(u) => u.to_string(),
            Value::List(items) => format!("[{}]", join_values(items)),
            Value::Set(items) => format!("{{{}}}", join_values(items)),
            Value::Map(entries) => {
                let rendered = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.as_display(), v.as_display()))
                    .join(", ");
                format!("{{{rendered}}}")
            }
        }
    }

    /// Whether this value can be bound to a column declared as `ty`.
    pub fn fits(&self, ty: &ColumnType) -> bool {
        match (self, ty) {
            (Value::Text(_), t) => t.is_text(),
            (Value::Int(_), ColumnType::Int)
            | (Value::BigInt(_), ColumnType::BigInt)
            | (Value::Float(_), ColumnType::Float)
            | (Value::Double(_), ColumnType::Double)
            | (Value::Varint(_), ColumnType::Varint | ColumnType::Decimal)
            | (Value::Decimal(_), ColumnType::Varint | ColumnType::Decimal)
            | (Value::Boolean(_), ColumnType::Boolean)
            | (Value::Timestamp(_), ColumnType::Timestamp)
            | (Value::Blob(_), ColumnType::Blob)
            | (Value::Uuid(_), ColumnType::Uuid | ColumnType::TimeUuid) => true,
            (Value::List(items), ColumnType::List(element))
            | (Value::Set(items), ColumnType::Set(element)) => {
                items.iter().all(|item| item.fits(element))
            }
            (Value::Map(entries), ColumnType::Map(key, value)) => entries
                .iter()
                .all(|(k, v)| k.fits(key) && v.fits(value)),
            _ => false,
        }
    }
}

fn join_values(items: &[Value]) -> String {
    items.iter().map(Value::as_display).join(", ")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Converts raw cell text into a value of the declared column type.
pub fn convert(text: &str, ty: &ColumnType) -> Result<Option<Value>, ConversionError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let parsed = match ty {
        ColumnType::Ascii | ColumnType::Text | ColumnType::Varchar => {
            Value::Text(text.to_string())
        }
        ColumnType::Int => Value::Int(
            text.trim()
                .parse()
                .map_err(|err| ConversionError::invalid(text, ty, err))?,
        ),
        ColumnType::BigInt => Value::BigInt(
            text.trim()
                .parse()
                .map_err(|err| ConversionError::invalid(text, ty, err))?,
        ),
        ColumnType::Float => Value::Float(
            text.trim()
                .parse()
                .map_err(|err| ConversionError::invalid(text, ty, err))?,
        ),
        ColumnType::Double => Value::Double(
            text.trim()
                .parse()
                .map_err(|err| ConversionError::invalid(text, ty, err))?,
        ),
        ColumnType::Varint | ColumnType::Decimal => parse_arbitrary_precision(text, ty)?,
        ColumnType::Boolean => Value::Boolean(parse_boolean(text, ty)?),
        ColumnType::Timestamp => Value::Timestamp(parse_timestamp(text.trim()).ok_or_else(
            || ConversionError::invalid(text, ty, "no known timestamp format matched"),
        )?),
        ColumnType::Blob => Value::Blob(text.as_bytes().to_vec()),
        ColumnType::Uuid | ColumnType::TimeUuid => {
            let trimmed = text.trim().trim_matches(|c| matches!(c, '{' | '}'));
            Value::Uuid(
                Uuid::parse_str(trimmed).map_err(|err| ConversionError::invalid(text, ty, err))?,
            )
        }
        ColumnType::List(element) => Value::List(convert_elements(text, ty, element)?),
        ColumnType::Set(element) => Value::Set(convert_elements(text, ty, element)?),
        ColumnType::Map(key, value) => Value::Map(convert_entries(text, ty, key, value)?),
        ColumnType::Unsupported(_) => {
            return Err(ConversionError::Unsupported {
                text: text.to_string(),
                target: ty.clone(),
            });
        }
    };
    Ok(Some(parsed))
}

/// Unbounded integer or decimal; a `.` or exponent selects the decimal form.
fn parse_arbitrary_precision(text: &str, ty: &ColumnType) -> Result<Value, ConversionError> {
    let trimmed = text.trim();
    if trimmed.contains(['.', 'e', 'E']) {
        BigDecimal::from_str(trimmed)
            .map(Value::Decimal)
            .map_err(|err| ConversionError::invalid(text, ty, err))
    } else {
        BigInt::from_str(trimmed)
            .map(Value::Varint)
            .map_err(|err| ConversionError::invalid(text, ty, err))
    }
}

fn parse_boolean(text: &str, ty: &ColumnType) -> Result<bool, ConversionError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "y" | "yes" | "true" => Ok(true),
        "f" | "n" | "no" | "false" => Ok(false),
        _ => Err(ConversionError::invalid(
            text,
            ty,
            "expected true/false, t/f, y/n, or yes/no",
        )),
    }
}

/// Tries RFC 3339, then naive date-time formats, then bare dates; all naive
/// forms are read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(parsed.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return parsed.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc());
        }
    }
    None
}

fn convert_elements(
    text: &str,
    ty: &ColumnType,
    element: &ColumnType,
) -> Result<Vec<Value>, ConversionError> {
    text.split(COLLECTION_SEPARATOR)
        .enumerate()
        .map(|(position, raw)| {
            convert(raw.trim(), element)?.ok_or_else(|| {
                ConversionError::invalid(text, ty, format!("element {} is empty", position + 1))
            })
        })
        .collect()
}

fn convert_entries(
    text: &str,
    ty: &ColumnType,
    key: &ColumnType,
    value: &ColumnType,
) -> Result<Vec<(Value, Value)>, ConversionError> {
    let mut entries = Vec::new();
    for raw in text.split(COLLECTION_SEPARATOR) {
        let (raw_key, raw_value) = raw.split_once(MAP_ENTRY_SEPARATOR).ok_or_else(|| {
            ConversionError::invalid(text, ty, format!("map entry '{raw}' is missing '='"))
        })?;
        let Some(converted_key) = convert(raw_key.trim(), key)? else {
            return Err(ConversionError::invalid(
                text,
                ty,
                format!("map entry '{raw}' has an empty key"),
            ));
        };
        let Some(converted_value) = convert(raw_value.trim(), value)? else {
            return Err(ConversionError::invalid(
                text,
                ty,
                format!("map entry '{raw}' has an empty value"),
            ));
        };
        entries.push((converted_key, converted_value));
    }
    Ok(entries)
}
