//! SQL comparison semantics over [`Value`].
//!
//! Ordered comparison returns [`Ternary`] (Unknown whenever a side is Null
//! or the operands are not comparable). Grouping and set operations use a
//! separate equivalence where Null equals Null, via serialized identity
//! keys.

use std::cmp::Ordering;
use std::fmt::Write as _;

use crate::parser::ast::ComparisonOperator;
use crate::storage::value::{Ternary, Value};
use crate::utils::adt::cast::{to_datetime, to_number};
use crate::utils::adt::datetime::epoch_nanos;

/// Attempt an ordered comparison under SQL coercion rules.
///
/// The coercion ladder: both numeric → numeric; both datetime-castable →
/// instant order; both plain strings → byte order after trimming; boolean
/// and ternary values only decide equality.
pub fn compare_ordered(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    if lhs.is_null() || rhs.is_null() {
        return None;
    }

    if let (Some(a), Some(b)) = (to_number(lhs), to_number(rhs)) {
        return a.as_f64().partial_cmp(&b.as_f64());
    }

    if let (Value::Datetime(a), Value::Datetime(b)) = (&to_datetime(lhs), &to_datetime(rhs)) {
        return Some(a.cmp(b));
    }

    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        return Some(a.trim().cmp(b.trim()));
    }

    None
}

/// Equality that also covers booleans and ternaries; Unknown when the
/// operands are not comparable at all.
fn equality(lhs: &Value, rhs: &Value) -> Ternary {
    if lhs.is_null() || rhs.is_null() {
        return Ternary::Unknown;
    }
    if let Some(ord) = compare_ordered(lhs, rhs) {
        return Ternary::from_bool(ord == Ordering::Equal);
    }
    match (lhs, rhs) {
        (Value::Boolean(a), Value::Boolean(b)) => Ternary::from_bool(a == b),
        (Value::Ternary(a), Value::Ternary(b)) => Ternary::from_bool(a == b),
        (Value::Boolean(a), Value::Ternary(b)) | (Value::Ternary(b), Value::Boolean(a)) => {
            match b.as_bool() {
                Some(b) => Ternary::from_bool(*a == b),
                None => Ternary::Unknown,
            }
        }
        _ => Ternary::Unknown,
    }
}

/// Evaluate `lhs <op> rhs` as a ternary predicate.
pub fn compare(lhs: &Value, rhs: &Value, operator: ComparisonOperator) -> Ternary {
    match operator {
        ComparisonOperator::Equal => equality(lhs, rhs),
        ComparisonOperator::NotEqual => equality(lhs, rhs).not(),
        _ => {
            let Some(ord) = compare_ordered(lhs, rhs) else {
                return Ternary::Unknown;
            };
            let decided = match operator {
                ComparisonOperator::Less => ord == Ordering::Less,
                ComparisonOperator::LessOrEqual => ord != Ordering::Greater,
                ComparisonOperator::Greater => ord == Ordering::Greater,
                ComparisonOperator::GreaterOrEqual => ord != Ordering::Less,
                ComparisonOperator::Equal | ComparisonOperator::NotEqual => unreachable!(),
            };
            Ternary::from_bool(decided)
        }
    }
}

/// Compare two row values element-wise. The caller has already checked the
/// arity. Works like tuple comparison: the first decided inequality wins.
pub fn compare_row_values(
    lhs: &[Value],
    rhs: &[Value],
    operator: ComparisonOperator,
) -> Ternary {
    match operator {
        ComparisonOperator::Equal => {
            let mut result = Ternary::True;
            for (a, b) in lhs.iter().zip(rhs.iter()) {
                result = result.and(equality(a, b));
                if result == Ternary::False {
                    return Ternary::False;
                }
            }
            result
        }
        ComparisonOperator::NotEqual => compare_row_values(lhs, rhs, ComparisonOperator::Equal).not(),
        _ => {
            // Lexicographic: skip equal prefixes, decide on the first
            // non-equal pair, Unknown poisons the decision.
            for (a, b) in lhs.iter().zip(rhs.iter()) {
                match equality(a, b) {
                    Ternary::True => continue,
                    Ternary::Unknown => return Ternary::Unknown,
                    Ternary::False => return compare(a, b, operator),
                }
            }
            // All elements equal.
            match operator {
                ComparisonOperator::LessOrEqual | ComparisonOperator::GreaterOrEqual => {
                    Ternary::True
                }
                _ => Ternary::False,
            }
        }
    }
}

/// Grouping equivalence: Null equals Null, numerics compare across types,
/// everything else falls back to its identity key.
pub fn equivalent(lhs: &Value, rhs: &Value) -> bool {
    identity_key_one(lhs) == identity_key_one(rhs)
}

/// Serialize one value into its identity-key form.
fn identity_key_one(value: &Value) -> String {
    let mut out = String::new();
    write_identity_key(&mut out, value);
    out
}

fn write_identity_key(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push('N'),
        _ => {
            if let Some(n) = to_number(value) {
                let f = n.as_f64();
                if f == 0.0 {
                    // -0.0 and 0.0 group together.
                    out.push_str("F:0");
                } else {
                    let _ = write!(out, "F:{}", f);
                }
                return;
            }
            match value {
                Value::Datetime(dt) => {
                    let _ = write!(out, "D:{}", epoch_nanos(dt));
                }
                Value::Boolean(b) => {
                    let _ = write!(out, "B:{}", b);
                }
                Value::Ternary(t) => match t.as_bool() {
                    Some(b) => {
                        let _ = write!(out, "B:{}", b);
                    }
                    None => out.push('N'),
                },
                Value::String(s) => {
                    if let Some(dt) = crate::utils::adt::datetime::parse_datetime(s) {
                        let _ = write!(out, "D:{}", epoch_nanos(&dt));
                    } else {
                        let _ = write!(out, "S:{}", s.trim());
                    }
                }
                Value::Integer(_) | Value::Float(_) | Value::Null => unreachable!(),
            }
        }
    }
}

/// Serialize a tuple of values into a single fingerprint usable as a hash
/// key for GROUP BY, DISTINCT and the set operations.
pub fn identity_key(values: &[Value]) -> String {
    let mut out = String::with_capacity(values.len() * 8);
    for value in values {
        write_identity_key(&mut out, value);
        out.push('\u{1f}');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_comparison_is_unknown() {
        assert_eq!(
            compare(&Value::Null, &Value::Integer(2), ComparisonOperator::Equal),
            Ternary::Unknown
        );
        assert_eq!(
            compare(&Value::Integer(2), &Value::Null, ComparisonOperator::Less),
            Ternary::Unknown
        );
    }

    #[test]
    fn numeric_strings_compare_numerically() {
        assert_eq!(
            compare(
                &Value::String("10".into()),
                &Value::Integer(9),
                ComparisonOperator::Greater
            ),
            Ternary::True
        );
    }

    #[test]
    fn plain_strings_compare_bytewise_after_trim() {
        assert_eq!(
            compare(
                &Value::String(" abc".into()),
                &Value::String("abc ".into()),
                ComparisonOperator::Equal
            ),
            Ternary::True
        );
        assert_eq!(
            compare(
                &Value::String("abc".into()),
                &Value::String("abd".into()),
                ComparisonOperator::Less
            ),
            Ternary::True
        );
    }

    #[test]
    fn row_value_comparison_is_lexicographic() {
        let lhs = [Value::Integer(1), Value::Integer(2)];
        let low = [Value::Integer(1), Value::Integer(1)];
        let high = [Value::Integer(1), Value::Integer(3)];
        assert_eq!(
            compare_row_values(&lhs, &low, ComparisonOperator::GreaterOrEqual),
            Ternary::True
        );
        assert_eq!(
            compare_row_values(&lhs, &high, ComparisonOperator::LessOrEqual),
            Ternary::True
        );
    }

    #[test]
    fn identity_treats_null_as_equal_and_numbers_across_types() {
        assert!(equivalent(&Value::Null, &Value::Null));
        assert!(equivalent(&Value::Integer(1), &Value::Float(1.0)));
        assert!(equivalent(&Value::Integer(1), &Value::String("1".into())));
        assert!(!equivalent(&Value::String("a".into()), &Value::String("A".into())));
    }
}
