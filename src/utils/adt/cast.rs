//! Type-directed casts.
//!
//! Casts never raise: a value that cannot be converted becomes `Null`.
//! This is the one place in the kernel where failure is swallowed by
//! design; arithmetic and predicates build on it.

use crate::storage::value::{Ternary, Value};
use crate::utils::adt::datetime;

/// A number that remembers whether it started as an integer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Integer(v) => Value::Integer(v),
            Number::Float(v) => Value::Float(v),
        }
    }
}

/// Parse a numeric operand out of any value, or `None`.
pub fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Integer(v) => Some(Number::Integer(*v)),
        Value::Float(v) => Some(Number::Float(*v)),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(Number::Integer(v));
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite()).map(Number::Float)
}

pub fn to_integer(value: &Value) -> Value {
    match value {
        Value::Integer(v) => Value::Integer(*v),
        Value::Float(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
            Value::Integer(*v as i64)
        }
        Value::String(_) => match to_number(value) {
            Some(Number::Integer(v)) => Value::Integer(v),
            Some(Number::Float(v)) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                Value::Integer(v as i64)
            }
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

pub fn to_float(value: &Value) -> Value {
    match to_number(value) {
        Some(n) => Value::Float(n.as_f64()),
        None => Value::Null,
    }
}

pub fn to_boolean(value: &Value) -> Value {
    match value {
        Value::Boolean(v) => Value::Boolean(*v),
        Value::Ternary(t) => match t.as_bool() {
            Some(b) => Value::Boolean(b),
            None => Value::Null,
        },
        Value::Integer(0) => Value::Boolean(false),
        Value::Integer(1) => Value::Boolean(true),
        Value::String(s) => match Ternary::parse(s).and_then(Ternary::as_bool) {
            Some(b) => Value::Boolean(b),
            None => Value::Null,
        },
        _ => Value::Null,
    }
}

pub fn to_ternary(value: &Value) -> Value {
    match value {
        Value::Ternary(t) => Value::Ternary(*t),
        Value::Boolean(b) => Value::Ternary(Ternary::from_bool(*b)),
        Value::Integer(0) => Value::Ternary(Ternary::False),
        Value::Integer(1) => Value::Ternary(Ternary::True),
        Value::String(s) => match Ternary::parse(s) {
            Some(t) => Value::Ternary(t),
            None => Value::Null,
        },
        Value::Null => Value::Ternary(Ternary::Unknown),
        _ => Value::Null,
    }
}

pub fn to_string(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.clone()),
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => {
            Value::String(value.render())
        }
        _ => Value::Null,
    }
}

pub fn to_datetime(value: &Value) -> Value {
    match value {
        Value::Datetime(dt) => Value::Datetime(*dt),
        Value::String(s) => match datetime::parse_datetime(s) {
            Some(dt) => Value::Datetime(dt),
            None => Value::Null,
        },
        _ => Value::Null,
    }
}

/// Predicate truthiness: cast to ternary, Null and unparsable → Unknown.
pub fn ternary_of(value: &Value) -> Ternary {
    match to_ternary(value) {
        Value::Ternary(t) => t,
        _ => Ternary::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_to_number_accepts_sign_and_exponent() {
        assert_eq!(to_integer(&Value::String(" -42 ".into())), Value::Integer(-42));
        assert_eq!(to_float(&Value::String("1e2".into())), Value::Float(100.0));
        assert_eq!(to_float(&Value::String("abc".into())), Value::Null);
    }

    #[test]
    fn failed_casts_yield_null_not_errors() {
        assert_eq!(to_integer(&Value::String("str".into())), Value::Null);
        assert_eq!(to_datetime(&Value::Integer(3)), Value::Null);
        assert_eq!(to_boolean(&Value::String("maybe".into())), Value::Null);
    }

    #[test]
    fn exact_floats_cast_to_integer() {
        assert_eq!(to_integer(&Value::Float(3.0)), Value::Integer(3));
        assert_eq!(to_integer(&Value::Float(3.5)), Value::Null);
    }

    #[test]
    fn null_casts_to_unknown_ternary() {
        assert_eq!(ternary_of(&Value::Null), Ternary::Unknown);
        assert_eq!(ternary_of(&Value::String("true".into())), Ternary::True);
    }
}
