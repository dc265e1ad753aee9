//! Type transformation pipeline
//!
//! Converts a JSON value into the primitive an attribute stores. A property
//! may carry its own [`Transformer`]; otherwise a default is chosen by pairing
//! the attribute type with the shape of the incoming value:
//!
//! | target            | accepts                                               |
//! |-------------------|-------------------------------------------------------|
//! | string            | strings; numbers and booleans, formatted invariantly  |
//! | integer / float   | numbers, booleans, numeric strings                    |
//! | boolean           | booleans, the numbers 0 and 1                         |
//! | date              | ISO-8601 strings (`yyyy-MM-dd'T'HH:mm:ssZZZZZ`)       |
//! | transformable     | absolute URL strings, `""` being no value             |
//! | decimal / binary  | nothing without a custom transformer                  |
//!
//! `null` is the absence of a value for every target.

use crate::error::TransformError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use persist_store::{AttributeType, Primitive};
use serde_json::{Number, Value};
use url::Url;

/// Format of the default date transformation.
pub const ISO8601_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

// ============================================================================
// Transformer Trait
// ============================================================================

/// Converts an incoming JSON value into a stored primitive.
///
/// `Ok(None)` means "no value". Closures with the matching signature are
/// transformers too.
pub trait Transformer: Send + Sync {
    fn transform(&self, value: &Value) -> Result<Option<Primitive>, TransformError>;
}

impl<F> Transformer for F
where
    F: Fn(&Value) -> Result<Option<Primitive>, TransformError> + Send + Sync,
{
    fn transform(&self, value: &Value) -> Result<Option<Primitive>, TransformError> {
        self(value)
    }
}

/// Transform `value` for an attribute of type `target`.
///
/// A custom transformer is applied unconditionally and its result trusted.
pub fn transform(
    value: &Value,
    target: AttributeType,
    transformer: Option<&dyn Transformer>,
) -> Result<Option<Primitive>, TransformError> {
    if let Some(transformer) = transformer {
        return transformer.transform(value);
    }
    if value.is_null() {
        return Ok(None);
    }

    let result = match target {
        AttributeType::String => to_string(value, target).map(Primitive::String),
        ty if ty.is_integer() => to_integer(value, ty).map(Primitive::Integer),
        ty if ty.is_float() => to_double(value, ty).map(Primitive::Double),
        AttributeType::Boolean => to_boolean(value).map(Primitive::Boolean),
        AttributeType::Date => match value {
            Value::String(s) => parse_iso8601(s).map(Primitive::Date),
            other => Err(no_transformer(other, target)),
        },
        AttributeType::Transformable => match value {
            Value::String(s) => return parse_url(s).map(|url| url.map(Primitive::Url)),
            other => Err(no_transformer(other, target)),
        },
        _ => Err(no_transformer(value, target)),
    };

    if let Err(err) = &result {
        tracing::trace!(target: "persist::fill", ?target, error = %err, "default transformation failed");
    }
    result.map(Some)
}

fn no_transformer(value: &Value, target: AttributeType) -> TransformError {
    TransformError::NoTransformerFound {
        value: value.clone(),
        target,
    }
}

// ============================================================================
// Default Conversions
// ============================================================================

fn format_number(number: &Number) -> String {
    number.to_string()
}

fn to_string(value: &Value, target: AttributeType) -> Result<String, TransformError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(format_number(n)),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        other => Err(no_transformer(other, target)),
    }
}

fn checked_integer(value: i64, source: &Value, target: AttributeType) -> Result<i64, TransformError> {
    match target.integer_range() {
        Some((min, max)) if (min..=max).contains(&value) => Ok(value),
        _ => Err(TransformError::OutOfRange {
            value: source.clone(),
            target,
        }),
    }
}

fn integral(float: f64) -> Option<i64> {
    if float.is_finite() && float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

fn to_integer(value: &Value, target: AttributeType) -> Result<i64, TransformError> {
    let invalid = |text: String| TransformError::InvalidFormat {
        value: text,
        target,
    };
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return checked_integer(i, value, target);
            }
            if n.is_u64() {
                return Err(TransformError::OutOfRange {
                    value: value.clone(),
                    target,
                });
            }
            let float = n.as_f64().unwrap_or(f64::NAN);
            integral(float)
                .ok_or_else(|| invalid(format_number(n)))
                .and_then(|i| checked_integer(i, value, target))
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => {
            let text = s.trim();
            let parsed = text
                .parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| invalid(s.clone()))?;
            checked_integer(parsed, value, target)
        }
        other => Err(no_transformer(other, target)),
    }
}

fn to_double(value: &Value, target: AttributeType) -> Result<f64, TransformError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| TransformError::InvalidFormat {
            value: format_number(n),
            target,
        }),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .ok_or_else(|| TransformError::InvalidFormat {
                value: s.clone(),
                target,
            }),
        other => Err(no_transformer(other, target)),
    }
}

fn to_boolean(value: &Value) -> Result<bool, TransformError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => Ok(false),
            Some(f) if f == 1.0 => Ok(true),
            _ => Err(TransformError::InvalidBoolean(value.clone())),
        },
        other => Err(no_transformer(other, AttributeType::Boolean)),
    }
}

/// Parse the fixed ISO-8601 profile. The offset may be `Z`, `+01:00` or
/// `+0100`.
pub fn parse_iso8601(text: &str) -> Result<DateTime<Utc>, TransformError> {
    let normalized = normalize_offset(text);
    DateTime::parse_from_str(&normalized, ISO8601_FORMAT)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| TransformError::InvalidDate(text.to_string()))
}

/// Rewrite the offset into the `%:z` form.
fn normalize_offset(text: &str) -> String {
    if let Some(prefix) = text.strip_suffix('Z') {
        return format!("{prefix}+00:00");
    }
    let bytes = text.as_bytes();
    let len = bytes.len();
    let compact = len > 5
        && matches!(bytes[len - 5], b'+' | b'-')
        && bytes[len - 4..].iter().all(u8::is_ascii_digit);
    if compact {
        format!("{}:{}", &text[..len - 2], &text[len - 2..])
    } else {
        text.to_string()
    }
}

fn parse_url(text: &str) -> Result<Option<Url>, TransformError> {
    if text.is_empty() {
        return Ok(None);
    }
    Url::parse(text)
        .map(Some)
        .map_err(|_| TransformError::InvalidUrl(text.to_string()))
}

// ============================================================================
// Built-in Transformers
// ============================================================================

/// Keeps the value as it is: strings stay strings, numbers stay numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn transform(&self, value: &Value) -> Result<Option<Primitive>, TransformError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(Primitive::String(s.clone()))),
            Value::Bool(b) => Ok(Some(Primitive::Boolean(*b))),
            Value::Number(n) => Ok(Some(match n.as_i64() {
                Some(i) => Primitive::Integer(i),
                None => Primitive::Double(n.as_f64().unwrap_or(f64::NAN)),
            })),
            other => Err(no_transformer(other, AttributeType::Undefined)),
        }
    }
}

/// Strings to URLs; the empty string is no value.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlTransformer;

impl Transformer for UrlTransformer {
    fn transform(&self, value: &Value) -> Result<Option<Primitive>, TransformError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(parse_url(s)?.map(Primitive::Url)),
            other => Err(no_transformer(other, AttributeType::Transformable)),
        }
    }
}

/// Strings to dates with a caller-supplied `chrono` format.
///
/// Formats without an offset are read as UTC; date-only formats as midnight
/// UTC.
#[derive(Debug, Clone)]
pub struct FormattedDateTransformer {
    format: String,
}

impl FormattedDateTransformer {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        if let Ok(date) = DateTime::parse_from_str(text, &self.format) {
            return Some(date.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, &self.format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
        NaiveDate::parse_from_str(text, &self.format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

impl Transformer for FormattedDateTransformer {
    fn transform(&self, value: &Value) -> Result<Option<Primitive>, TransformError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => self
                .parse(s)
                .map(|date| Some(Primitive::Date(date)))
                .ok_or_else(|| TransformError::InvalidDate(s.clone())),
            other => Err(no_transformer(other, AttributeType::Date)),
        }
    }
}

/// The default date transformation as a reusable transformer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iso8601DateTransformer;

impl Transformer for Iso8601DateTransformer {
    fn transform(&self, value: &Value) -> Result<Option<Primitive>, TransformError> {
        transform(value, AttributeType::Date, None)
    }
}

/// Numbers to their invariant string form; strings are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberFormatTransformer;

impl Transformer for NumberFormatTransformer {
    fn transform(&self, value: &Value) -> Result<Option<Primitive>, TransformError> {
        match value {
            Value::Null => Ok(None),
            Value::Number(_) | Value::Bool(_) => {
                to_string(value, AttributeType::String).map(|s| Some(Primitive::String(s)))
            }
            other => Err(no_transformer(other, AttributeType::String)),
        }
    }
}

/// Numeric strings to numbers; everything else is rejected.
#[derive(Debug, Clone, Copy)]
pub struct FormattedNumberTransformer {
    allow_floats: bool,
}

impl FormattedNumberTransformer {
    /// Accept integral strings only.
    pub fn integers() -> Self {
        Self {
            allow_floats: false,
        }
    }

    /// Accept any finite number.
    pub fn floats() -> Self {
        Self { allow_floats: true }
    }
}

impl Default for FormattedNumberTransformer {
    fn default() -> Self {
        Self::integers()
    }
}

impl Transformer for FormattedNumberTransformer {
    fn transform(&self, value: &Value) -> Result<Option<Primitive>, TransformError> {
        let text = match value {
            Value::Null => return Ok(None),
            Value::String(s) => s.trim(),
            other => return Err(no_transformer(other, AttributeType::Integer64)),
        };
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Some(Primitive::Integer(i)));
        }
        match text.parse::<f64>() {
            Ok(f) if self.allow_floats && f.is_finite() => Ok(Some(Primitive::Double(f))),
            _ => Err(TransformError::InvalidFormat {
                value: text.to_string(),
                target: if self.allow_floats {
                    AttributeType::Double
                } else {
                    AttributeType::Integer64
                },
            }),
        }
    }
}
