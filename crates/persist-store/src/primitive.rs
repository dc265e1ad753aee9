//! Primitive storage values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A value as it is held by an attribute of a persisted object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Primitive {
    Integer(i64),
    Double(f64),
    /// Decimal numbers are kept in their textual form.
    Decimal(String),
    String(String),
    Boolean(bool),
    Date(DateTime<Utc>),
    Binary(Vec<u8>),
    Url(Url),
}

impl Primitive {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::Integer(_) => "integer",
            Primitive::Double(_) => "double",
            Primitive::Decimal(_) => "decimal",
            Primitive::String(_) => "string",
            Primitive::Boolean(_) => "boolean",
            Primitive::Date(_) => "date",
            Primitive::Binary(_) => "binary",
            Primitive::Url(_) => "url",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) | Primitive::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Primitive::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Integer(i) => write!(f, "{i}"),
            Primitive::Double(d) => write!(f, "{d}"),
            Primitive::Decimal(d) => write!(f, "{d}"),
            Primitive::String(s) => write!(f, "{s:?}"),
            Primitive::Boolean(b) => write!(f, "{b}"),
            Primitive::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Primitive::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Primitive::Url(u) => write!(f, "{u}"),
        }
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Primitive::Integer(value)
    }
}

impl From<i32> for Primitive {
    fn from(value: i32) -> Self {
        Primitive::Integer(i64::from(value))
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Primitive::Double(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Primitive::Boolean(value)
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::String(value.to_string())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Primitive::String(value)
    }
}

impl From<DateTime<Utc>> for Primitive {
    fn from(value: DateTime<Utc>) -> Self {
        Primitive::Date(value)
    }
}

impl From<Url> for Primitive {
    fn from(value: Url) -> Self {
        Primitive::Url(value)
    }
}
