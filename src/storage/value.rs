//! The scalar value domain and the three-valued logic it induces.

use std::fmt;

use chrono::{DateTime, FixedOffset, SecondsFormat};

/// Three-valued logic domain for SQL predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ternary {
    True,
    False,
    Unknown,
}

impl Ternary {
    pub fn from_bool(b: bool) -> Ternary {
        if b {
            Ternary::True
        } else {
            Ternary::False
        }
    }

    /// `Some(bool)` for the decided values, `None` for Unknown.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Ternary::True => Some(true),
            Ternary::False => Some(false),
            Ternary::Unknown => None,
        }
    }

    /// Truthiness in contexts that require a decision (WHERE, HAVING, CASE).
    pub fn is_true(self) -> bool {
        self == Ternary::True
    }

    pub fn not(self) -> Ternary {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Unknown => Ternary::Unknown,
        }
    }

    /// Kleene AND. Callers that hold an error-producing right side must
    /// check the left for `False` before evaluating it; see the evaluator.
    pub fn and(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::False, _) | (_, Ternary::False) => Ternary::False,
            (Ternary::True, Ternary::True) => Ternary::True,
            _ => Ternary::Unknown,
        }
    }

    pub fn or(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::True, _) | (_, Ternary::True) => Ternary::True,
            (Ternary::False, Ternary::False) => Ternary::False,
            _ => Ternary::Unknown,
        }
    }

    pub fn parse(s: &str) -> Option<Ternary> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("true") || s == "1" {
            Some(Ternary::True)
        } else if s.eq_ignore_ascii_case("false") || s == "0" {
            Some(Ternary::False)
        } else if s.eq_ignore_ascii_case("unknown") {
            Some(Ternary::Unknown)
        } else {
            None
        }
    }
}

impl fmt::Display for Ternary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ternary::True => "TRUE",
            Ternary::False => "FALSE",
            Ternary::Unknown => "UNKNOWN",
        })
    }
}

/// A typed scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Ternary(Ternary),
    Datetime(DateTime<FixedOffset>),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render for tabular output. Strings are unquoted; the CLI layer is
    /// responsible for CSV quoting.
    pub fn render(&self) -> String {
        match self {
            Value::Integer(v) => v.to_string(),
            Value::Float(v) => render_float(*v),
            Value::String(v) => v.clone(),
            Value::Boolean(v) => v.to_string(),
            Value::Ternary(v) => v.to_string(),
            Value::Datetime(v) => v.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Value::Null => String::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

pub fn render_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    v.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_is_false_dominant() {
        for x in [Ternary::True, Ternary::False, Ternary::Unknown] {
            assert_eq!(x.and(Ternary::False), Ternary::False);
            assert_eq!(Ternary::False.and(x), Ternary::False);
        }
        assert_eq!(Ternary::True.and(Ternary::Unknown), Ternary::Unknown);
        assert_eq!(Ternary::True.and(Ternary::True), Ternary::True);
    }

    #[test]
    fn or_is_true_dominant() {
        for x in [Ternary::True, Ternary::False, Ternary::Unknown] {
            assert_eq!(x.or(Ternary::True), Ternary::True);
            assert_eq!(Ternary::True.or(x), Ternary::True);
        }
        assert_eq!(Ternary::False.or(Ternary::Unknown), Ternary::Unknown);
        assert_eq!(Ternary::False.or(Ternary::False), Ternary::False);
    }

    #[test]
    fn render_keeps_integer_and_float_forms_apart() {
        assert_eq!(Value::Integer(3).render(), "3");
        assert_eq!(Value::Float(3.5).render(), "3.5");
        assert_eq!(Value::Null.render(), "");
    }
}
