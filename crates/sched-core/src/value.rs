//! Raw field values and typed decoding

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Date-time layouts accepted when decoding text, tried in order
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// A raw value held by a record backing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// Text value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Date and time without zone
    DateTime(NaiveDateTime),
    /// Empty/null field
    Null,
}

impl FieldValue {
    /// Parse a string into a FieldValue, detecting the type
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return FieldValue::Null;
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            return FieldValue::Integer(i);
        }

        if let Ok(f) = trimmed.parse::<f64>() {
            return FieldValue::Float(f);
        }

        FieldValue::Text(trimmed.to_string())
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert to a display string
    pub fn to_string_value(&self) -> String {
        match self {
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::DateTime(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_value())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        FieldValue::DateTime(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// Tagged documents carry scalars as JSON; nested values are kept as their JSON text.
impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map_or(FieldValue::Null, FieldValue::Float),
            },
            serde_json::Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

/// The type a mapped column is decoded as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Text,
    Integer,
    Number,
    Currency,
    Flag,
    Date,
}

impl DataType {
    /// Map an exported logical data type name, e.g. `FT_MONEY`
    pub fn from_logical_name(name: &str) -> Self {
        match name {
            "FT_START_DATE" | "FT_END_DATE" => DataType::Date,
            "FT_MONEY" => DataType::Currency,
            "FT_FLOAT_2_DECIMALS" => DataType::Number,
            "FT_INT" => DataType::Integer,
            _ => DataType::Text,
        }
    }
}

/// Types a record field can be decoded into.
///
/// `from_field` is never called with [`FieldValue::Null`]; returning `None`
/// means the value is present but malformed for this type.
pub trait FromField: Sized {
    /// Name used in decode error messages
    const TYPE_NAME: &'static str;

    fn from_field(value: &FieldValue) -> Option<Self>;
}

impl FromField for FieldValue {
    const TYPE_NAME: &'static str = "value";

    fn from_field(value: &FieldValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromField for String {
    const TYPE_NAME: &'static str = "string";

    fn from_field(value: &FieldValue) -> Option<Self> {
        Some(value.to_string_value())
    }
}

impl FromField for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(*f as i64)
            }
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromField for i32 {
    const TYPE_NAME: &'static str = "integer";

    fn from_field(value: &FieldValue) -> Option<Self> {
        i64::from_field(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromField for f64 {
    const TYPE_NAME: &'static str = "number";

    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromField for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Integer(0) => Some(false),
            FieldValue::Integer(1) => Some(true),
            FieldValue::Text(s) => match s.trim() {
                "Y" | "y" | "true" | "TRUE" | "1" => Some(true),
                "N" | "n" | "false" | "FALSE" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromField for NaiveDateTime {
    const TYPE_NAME: &'static str = "date-time";

    fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::DateTime(d) => Some(*d),
            FieldValue::Text(s) => parse_datetime(s.trim()),
            _ => None,
        }
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
