//! Binary and unary arithmetic with SQL Null propagation.

use crate::parser::ast::{ArithmeticOperator, Sign};
use crate::storage::value::Value;
use crate::utils::adt::cast::{to_number, to_string, Number};

/// `lhs <op> rhs`. Null operands and failed numeric casts produce Null;
/// division (or modulo) by zero produces Null rather than an error.
pub fn calculate(lhs: &Value, rhs: &Value, operator: ArithmeticOperator) -> Value {
    let (Some(a), Some(b)) = (to_number(lhs), to_number(rhs)) else {
        return Value::Null;
    };

    match (a, b) {
        (Number::Integer(a), Number::Integer(b)) => integer_calculate(a, b, operator),
        (a, b) => float_calculate(a.as_f64(), b.as_f64(), operator),
    }
}

fn integer_calculate(a: i64, b: i64, operator: ArithmeticOperator) -> Value {
    match operator {
        ArithmeticOperator::Add => Value::Integer(a.wrapping_add(b)),
        ArithmeticOperator::Subtract => Value::Integer(a.wrapping_sub(b)),
        ArithmeticOperator::Multiply => Value::Integer(a.wrapping_mul(b)),
        // Integer division still yields an exact quotient where possible;
        // a fractional result promotes to float.
        ArithmeticOperator::Divide => {
            if b == 0 {
                Value::Null
            } else if a % b == 0 {
                Value::Integer(a / b)
            } else {
                Value::Float(a as f64 / b as f64)
            }
        }
        ArithmeticOperator::Modulo => {
            if b == 0 {
                Value::Null
            } else {
                Value::Integer(a.wrapping_rem(b))
            }
        }
    }
}

fn float_calculate(a: f64, b: f64, operator: ArithmeticOperator) -> Value {
    let result = match operator {
        ArithmeticOperator::Add => a + b,
        ArithmeticOperator::Subtract => a - b,
        ArithmeticOperator::Multiply => a * b,
        ArithmeticOperator::Divide => {
            if b == 0.0 {
                return Value::Null;
            }
            a / b
        }
        ArithmeticOperator::Modulo => {
            if b == 0.0 {
                return Value::Null;
            }
            a % b
        }
    };
    if result.is_finite() {
        Value::Float(result)
    } else {
        Value::Null
    }
}

/// Unary `+`/`-`. A failed numeric cast produces Null.
pub fn calculate_unary(operand: &Value, sign: Sign) -> Value {
    match to_number(operand) {
        Some(Number::Integer(v)) => match sign {
            Sign::Plus => Value::Integer(v),
            Sign::Minus => Value::Integer(v.wrapping_neg()),
        },
        Some(Number::Float(v)) => match sign {
            Sign::Plus => Value::Float(v),
            Sign::Minus => Value::Float(-v),
        },
        None => Value::Null,
    }
}

/// Variadic string concatenation; any Null argument makes the whole
/// result Null.
pub fn concat(values: &[Value]) -> Value {
    let mut out = String::new();
    for value in values {
        match to_string(value) {
            Value::String(s) => out.push_str(&s),
            _ => return Value::Null,
        }
    }
    Value::String(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_propagates() {
        assert_eq!(
            calculate(&Value::Null, &Value::Integer(2), ArithmeticOperator::Add),
            Value::Null
        );
    }

    #[test]
    fn division_by_zero_is_null() {
        assert_eq!(
            calculate(&Value::Integer(1), &Value::Integer(0), ArithmeticOperator::Divide),
            Value::Null
        );
        assert_eq!(
            calculate(&Value::Float(1.0), &Value::Float(0.0), ArithmeticOperator::Modulo),
            Value::Null
        );
    }

    #[test]
    fn integer_pairs_stay_integral_until_division_fractures() {
        assert_eq!(
            calculate(&Value::Integer(6), &Value::Integer(3), ArithmeticOperator::Divide),
            Value::Integer(2)
        );
        assert_eq!(
            calculate(&Value::Integer(5), &Value::Integer(2), ArithmeticOperator::Divide),
            Value::Float(2.5)
        );
    }

    #[test]
    fn numeric_strings_participate() {
        assert_eq!(
            calculate(
                &Value::String("4".into()),
                &Value::String("2".into()),
                ArithmeticOperator::Multiply
            ),
            Value::Integer(8)
        );
    }

    #[test]
    fn unary_minus_on_unparsable_is_null() {
        assert_eq!(calculate_unary(&Value::String("x".into()), Sign::Minus), Value::Null);
        assert_eq!(calculate_unary(&Value::Integer(4), Sign::Minus), Value::Integer(-4));
    }

    #[test]
    fn concat_absorbs_null() {
        assert_eq!(
            concat(&[Value::String("a".into()), Value::Null]),
            Value::Null
        );
        assert_eq!(
            concat(&[Value::String("a".into()), Value::Integer(1)]),
            Value::String("a1".into())
        );
    }
}
