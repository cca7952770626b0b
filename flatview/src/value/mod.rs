use crate::error::{FlatViewError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A document's fields, keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A single scalar field value.
///
/// Serializes as the plain JSON scalar (timestamps as RFC 3339 strings), which
/// is what tabular consumers expect. Stores persist their own tagged encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Number(f64),
    Timestamp(DateTime<Utc>),
    Bool(bool),
}

impl FieldValue {
    /// Coerce a JSON value into a field value.
    /// `null`, arrays and objects have no field kind and are rejected.
    pub fn from_json(field: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => Ok(FieldValue::String(s.clone())),
            serde_json::Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number).ok_or_else(|| {
                FlatViewError::Validation(format!("Field '{field}' has an unrepresentable number"))
            }),
            other => Err(FlatViewError::Validation(format!(
                "Field '{field}' has unsupported kind {}",
                json_type_name(other)
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
        }
    }

    /// Name of this value's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Number(_) => "number",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Bool(_) => "boolean",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// True for strings that are empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        matches!(self, FieldValue::String(s) if s.trim().is_empty())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Timestamp(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

/// Coerce every entry of a JSON object into [`Fields`].
pub fn fields_from_json(value: &serde_json::Value) -> Result<Fields> {
    let object = value.as_object().ok_or_else(|| {
        FlatViewError::Validation(format!(
            "Document data must be an object, got {}",
            json_type_name(value)
        ))
    })?;

    object
        .iter()
        .map(|(k, v)| Ok((k.clone(), FieldValue::from_json(k, v)?)))
        .collect()
}

/// Render [`Fields`] as a plain JSON object.
pub fn fields_to_json(fields: &Fields) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    serde_json::Value::Object(map)
}

/// Build [`Fields`] from `(name, value)` pairs.
pub fn fields<K, V, I>(pairs: I) -> Fields
where
    K: Into<String>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}
