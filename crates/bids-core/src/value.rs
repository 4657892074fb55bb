use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::fmt;

pub const MISSING_TOKEN: &str = "n/a";

/// A single participant field. `Absent` is the only missing-value marker;
/// a NaN number or the literal `n/a` text never survives construction.
/// An empty string is a present value and is written as an empty cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Absent,
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn number(value: f64) -> Self {
        if value.is_nan() {
            Self::Absent
        } else {
            Self::Number(value)
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value == MISSING_TOKEN {
            Self::Absent
        } else {
            Self::Text(value)
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Converts a JSON scalar. Arrays and objects have no field representation.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Absent),
            Value::Number(number) => number.as_f64().map(Self::number),
            Value::String(text) => Some(Self::text(text.as_str())),
            Value::Bool(flag) => Some(Self::Text(flag.to_string())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Number(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(value) => Value::String(value.clone()),
        }
    }

    /// Parses one cell of a persisted table. Only `n/a` reads as missing;
    /// an empty cell is empty text.
    pub fn parse_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed == MISSING_TOKEN {
            return Self::Absent;
        }
        if trimmed.is_empty() {
            return Self::Text(cell.to_string());
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Self::Number(number),
            _ => Self::Text(cell.to_string()),
        }
    }

    /// Renders the value as a single tab-separated cell.
    pub fn render_cell(&self) -> String {
        match self {
            Self::Absent => MISSING_TOKEN.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.replace(['\t', '\n', '\r'], " "),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_cell())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Absent)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("expected string, number or null"))
    }
}

/// Controls which values count as missing when snapshots are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergePolicy {
    pub empty_text_is_absent: bool,
}

impl MergePolicy {
    pub fn is_missing(&self, value: &FieldValue) -> bool {
        match value {
            FieldValue::Absent => true,
            FieldValue::Text(text) => self.empty_text_is_absent && text.is_empty(),
            FieldValue::Number(_) => false,
        }
    }
}
