//! Built-in scalar function registry.
//!
//! Lookup is case-insensitive; the caller keeps the user's spelling for
//! error messages. Argument values arrive already evaluated. Like the
//! value primitives, functions swallow cast failures into Null; only
//! arity violations are errors.

use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use crate::error::{Error, ErrorKind, Position, Result};
use crate::storage::value::Value;
use crate::utils::adt::cast::{
    to_boolean, to_datetime, to_float, to_integer, to_number, to_string, to_ternary, Number,
};
use crate::utils::adt::datetime::format_datetime;

const SCALAR_FUNCTIONS: &[&str] = &[
    "coalesce", "if", "ifnull", "nullif",
    "integer", "float", "string", "boolean", "ternary", "datetime",
    "abs", "ceil", "floor", "round", "sqrt", "exp", "log", "pow",
    "trim", "ltrim", "rtrim", "upper", "lower", "len", "lpad", "rpad",
    "substr", "replace", "instr",
    "now", "year", "month", "day", "hour", "minute", "second", "datetime_format",
];

/// Whether `name` (any casing) is a built-in scalar function.
pub fn is_builtin_scalar(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SCALAR_FUNCTIONS.contains(&lower.as_str())
}

/// Evaluate a built-in scalar function. `now` is the query-start instant
/// captured in the environment so repeated calls are stable within one
/// statement.
pub fn eval_scalar_function(
    name: &str,
    args: &[Value],
    now: &DateTime<FixedOffset>,
    pos: Position,
) -> Result<Value> {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "coalesce" => {
            require_at_least(name, args, 1, pos)?;
            for arg in args {
                if !arg.is_null() {
                    return Ok(arg.clone());
                }
            }
            Ok(Value::Null)
        }
        "if" => {
            require_exact(name, args, 3, pos)?;
            let condition = crate::utils::adt::cast::ternary_of(&args[0]);
            Ok(if condition.is_true() {
                args[1].clone()
            } else {
                args[2].clone()
            })
        }
        "ifnull" => {
            require_exact(name, args, 2, pos)?;
            Ok(if args[0].is_null() {
                args[1].clone()
            } else {
                args[0].clone()
            })
        }
        "nullif" => {
            require_exact(name, args, 2, pos)?;
            let equal = crate::utils::adt::comparison::compare(
                &args[0],
                &args[1],
                crate::parser::ast::ComparisonOperator::Equal,
            );
            Ok(if equal.is_true() {
                Value::Null
            } else {
                args[0].clone()
            })
        }
        "integer" => {
            require_exact(name, args, 1, pos)?;
            Ok(to_integer(&args[0]))
        }
        "float" => {
            require_exact(name, args, 1, pos)?;
            Ok(to_float(&args[0]))
        }
        "string" => {
            require_exact(name, args, 1, pos)?;
            Ok(to_string(&args[0]))
        }
        "boolean" => {
            require_exact(name, args, 1, pos)?;
            Ok(to_boolean(&args[0]))
        }
        "ternary" => {
            require_exact(name, args, 1, pos)?;
            Ok(to_ternary(&args[0]))
        }
        "datetime" => {
            require_exact(name, args, 1, pos)?;
            Ok(to_datetime(&args[0]))
        }
        "abs" => numeric_unary(name, args, pos, |n| match n {
            Number::Integer(v) => Value::Integer(v.wrapping_abs()),
            Number::Float(v) => Value::Float(v.abs()),
        }),
        "ceil" => float_unary(name, args, pos, f64::ceil),
        "floor" => float_unary(name, args, pos, f64::floor),
        "round" => {
            require_between(name, args, 1, 2, pos)?;
            let Some(n) = to_number(&args[0]) else {
                return Ok(Value::Null);
            };
            let place = match args.get(1) {
                Some(arg) => match to_integer(arg) {
                    Value::Integer(p) => p,
                    _ => return Ok(Value::Null),
                },
                None => 0,
            };
            let factor = 10f64.powi(place as i32);
            let rounded = (n.as_f64() * factor).round() / factor;
            Ok(if place <= 0 && rounded.fract() == 0.0 && rounded.abs() < i64::MAX as f64 {
                Value::Integer(rounded as i64)
            } else {
                Value::Float(rounded)
            })
        }
        "sqrt" => float_unary(name, args, pos, f64::sqrt),
        "exp" => float_unary(name, args, pos, f64::exp),
        "log" => float_unary(name, args, pos, f64::ln),
        "pow" => {
            require_exact(name, args, 2, pos)?;
            match (to_number(&args[0]), to_number(&args[1])) {
                (Some(base), Some(exponent)) => {
                    let result = base.as_f64().powf(exponent.as_f64());
                    Ok(if result.is_finite() {
                        Value::Float(result)
                    } else {
                        Value::Null
                    })
                }
                _ => Ok(Value::Null),
            }
        }
        "trim" => trim_fn(name, args, pos, |s, set| match set {
            Some(set) => s.trim_matches(|c| set.contains(c)).to_string(),
            None => s.trim().to_string(),
        }),
        "ltrim" => trim_fn(name, args, pos, |s, set| match set {
            Some(set) => s.trim_start_matches(|c| set.contains(c)).to_string(),
            None => s.trim_start().to_string(),
        }),
        "rtrim" => trim_fn(name, args, pos, |s, set| match set {
            Some(set) => s.trim_end_matches(|c| set.contains(c)).to_string(),
            None => s.trim_end().to_string(),
        }),
        "upper" => string_unary(name, args, pos, |s| s.to_uppercase()),
        "lower" => string_unary(name, args, pos, |s| s.to_lowercase()),
        "len" => {
            require_exact(name, args, 1, pos)?;
            match to_string(&args[0]) {
                Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
                _ => Ok(Value::Null),
            }
        }
        "lpad" => pad_fn(name, args, pos, true),
        "rpad" => pad_fn(name, args, pos, false),
        "substr" => {
            require_between(name, args, 2, 3, pos)?;
            let Value::String(s) = to_string(&args[0]) else {
                return Ok(Value::Null);
            };
            let Value::Integer(start) = to_integer(&args[1]) else {
                return Ok(Value::Null);
            };
            let chars: Vec<char> = s.chars().collect();
            let from = if start < 0 {
                chars.len().saturating_sub(start.unsigned_abs() as usize)
            } else {
                (start as usize).min(chars.len())
            };
            let take = match args.get(2) {
                Some(arg) => match to_integer(arg) {
                    Value::Integer(l) if l >= 0 => l as usize,
                    _ => return Ok(Value::Null),
                },
                None => chars.len() - from,
            };
            Ok(Value::String(chars[from..].iter().take(take).collect()))
        }
        "replace" => {
            require_exact(name, args, 3, pos)?;
            match (to_string(&args[0]), to_string(&args[1]), to_string(&args[2])) {
                (Value::String(s), Value::String(old), Value::String(new)) => {
                    Ok(Value::String(s.replace(&old, &new)))
                }
                _ => Ok(Value::Null),
            }
        }
        "instr" => {
            require_exact(name, args, 2, pos)?;
            match (to_string(&args[0]), to_string(&args[1])) {
                (Value::String(s), Value::String(sub)) => Ok(match s.find(&sub) {
                    Some(byte_idx) => Value::Integer(s[..byte_idx].chars().count() as i64),
                    None => Value::Null,
                }),
                _ => Ok(Value::Null),
            }
        }
        "now" => {
            require_exact(name, args, 0, pos)?;
            Ok(Value::Datetime(*now))
        }
        "year" => datetime_part(name, args, pos, |dt| dt.year() as i64),
        "month" => datetime_part(name, args, pos, |dt| dt.month() as i64),
        "day" => datetime_part(name, args, pos, |dt| dt.day() as i64),
        "hour" => datetime_part(name, args, pos, |dt| dt.hour() as i64),
        "minute" => datetime_part(name, args, pos, |dt| dt.minute() as i64),
        "second" => datetime_part(name, args, pos, |dt| dt.second() as i64),
        "datetime_format" => {
            require_exact(name, args, 2, pos)?;
            match (to_datetime(&args[0]), to_string(&args[1])) {
                (Value::Datetime(dt), Value::String(format)) => {
                    Ok(Value::String(format_datetime(&dt, &format)))
                }
                _ => Ok(Value::Null),
            }
        }
        _ => Err(Error::new(pos, ErrorKind::FunctionNotExist(name.to_string()))),
    }
}

fn require_exact(name: &str, args: &[Value], n: usize, pos: Position) -> Result<()> {
    if args.len() != n {
        return Err(arg_error(name, &format!("exactly {} argument(s)", n), pos));
    }
    Ok(())
}

fn require_at_least(name: &str, args: &[Value], n: usize, pos: Position) -> Result<()> {
    if args.len() < n {
        return Err(arg_error(name, &format!("at least {} argument(s)", n), pos));
    }
    Ok(())
}

fn require_between(name: &str, args: &[Value], low: usize, high: usize, pos: Position) -> Result<()> {
    if args.len() < low || high < args.len() {
        return Err(arg_error(name, &format!("{} to {} arguments", low, high), pos));
    }
    Ok(())
}

fn arg_error(name: &str, expect: &str, pos: Position) -> Error {
    Error::new(
        pos,
        ErrorKind::FunctionArgumentLength {
            name: name.to_string(),
            expect: expect.to_string(),
        },
    )
}

fn numeric_unary(
    name: &str,
    args: &[Value],
    pos: Position,
    f: impl Fn(Number) -> Value,
) -> Result<Value> {
    require_exact(name, args, 1, pos)?;
    Ok(match to_number(&args[0]) {
        Some(n) => f(n),
        None => Value::Null,
    })
}

fn float_unary(name: &str, args: &[Value], pos: Position, f: impl Fn(f64) -> f64) -> Result<Value> {
    require_exact(name, args, 1, pos)?;
    Ok(match to_number(&args[0]) {
        Some(n) => {
            let result = f(n.as_f64());
            if result.is_finite() {
                if result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
                    Value::Integer(result as i64)
                } else {
                    Value::Float(result)
                }
            } else {
                Value::Null
            }
        }
        None => Value::Null,
    })
}

fn string_unary(
    name: &str,
    args: &[Value],
    pos: Position,
    f: impl Fn(&str) -> String,
) -> Result<Value> {
    require_exact(name, args, 1, pos)?;
    Ok(match to_string(&args[0]) {
        Value::String(s) => Value::String(f(&s)),
        _ => Value::Null,
    })
}

fn trim_fn(
    name: &str,
    args: &[Value],
    pos: Position,
    f: impl Fn(&str, Option<&str>) -> String,
) -> Result<Value> {
    require_between(name, args, 1, 2, pos)?;
    let Value::String(s) = to_string(&args[0]) else {
        return Ok(Value::Null);
    };
    match args.get(1) {
        Some(arg) => match to_string(arg) {
            Value::String(set) => Ok(Value::String(f(&s, Some(&set)))),
            _ => Ok(Value::Null),
        },
        None => Ok(Value::String(f(&s, None))),
    }
}

fn pad_fn(name: &str, args: &[Value], pos: Position, left: bool) -> Result<Value> {
    require_exact(name, args, 3, pos)?;
    let (Value::String(s), Value::Integer(len), Value::String(pad)) =
        (to_string(&args[0]), to_integer(&args[1]), to_string(&args[2]))
    else {
        return Ok(Value::Null);
    };
    if pad.is_empty() || len < 0 {
        return Ok(Value::Null);
    }
    let len = len as usize;
    let current = s.chars().count();
    if len <= current {
        return Ok(Value::String(s));
    }
    let padding: String = pad.chars().cycle().take(len - current).collect();
    Ok(Value::String(if left {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    }))
}

fn datetime_part(
    name: &str,
    args: &[Value],
    pos: Position,
    f: impl Fn(&DateTime<FixedOffset>) -> i64,
) -> Result<Value> {
    require_exact(name, args, 1, pos)?;
    Ok(match to_datetime(&args[0]) {
        Value::Datetime(dt) => Value::Integer(f(&dt)),
        _ => Value::Null,
    })
}
