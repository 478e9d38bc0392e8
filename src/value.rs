//! Value Classification Module
//!
//! Cached values are opaque JSON values. The numeric operations
//! (`increment`, `set_if_higher`, `set_if_lower`) need to know whether a
//! stored value can be treated as a number or a timestamp; this module is
//! the single place where that parse-and-classify step happens.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// The opaque value type stored by every cache in this crate.
pub type CacheValue = Value;

// == Number ==
/// Numeric amount used by `increment` and returned as its result.
///
/// Integer arithmetic stays integral; as soon as a float is involved the
/// result becomes a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Signed integer amount
    Int(i64),
    /// Floating point amount
    Float(f64),
}

impl Number {
    /// Adds another number, widening to float when either side is a float.
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a.wrapping_add(b)),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    /// Returns the value as a float, losing integer precision if needed.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Converts into a JSON value.
    pub fn to_value(self) -> CacheValue {
        match self {
            Number::Int(i) => Value::from(i),
            Number::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

// == Comparable ==
/// A value that participates in `set_if_higher` / `set_if_lower`
/// comparisons: either numeric or a timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Comparable {
    Num(Number),
    Time(DateTime<Utc>),
}

impl Comparable {
    /// Orders two comparables of the same kind. Returns `None` when the
    /// kinds differ (number versus timestamp).
    pub(crate) fn partial_cmp(self, other: Comparable) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Comparable::Num(Number::Int(a)), Comparable::Num(Number::Int(b))) => Some(a.cmp(&b)),
            (Comparable::Num(a), Comparable::Num(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            (Comparable::Time(a), Comparable::Time(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

// == Classification ==
/// Interprets a value as a number if possible.
///
/// JSON numbers classify directly. Strings classify when they parse
/// cleanly as an integer or a float; anything else is not numeric.
pub(crate) fn as_number(value: &CacheValue) -> Option<Number> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Number::Int(i))
            } else {
                n.as_f64().map(Number::Float)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Some(Number::Int(i))
            } else if let Ok(f) = s.parse::<f64>() {
                Some(Number::Float(f))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Interprets a value for ordering comparisons: numeric, or an RFC 3339
/// timestamp carried as a string.
pub(crate) fn as_comparable(value: &CacheValue) -> Option<Comparable> {
    if let Some(n) = as_number(value) {
        return Some(Comparable::Num(n));
    }
    if let Value::String(s) = value {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
            return Some(Comparable::Time(dt.with_timezone(&Utc)));
        }
    }
    None
}

/// True for values that can live inside a list entry: scalars only.
pub(crate) fn is_scalar(value: &CacheValue) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}
