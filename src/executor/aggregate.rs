//! The aggregate engine.
//!
//! An aggregate call sees one grouped record: its argument expression is
//! evaluated against the expansion of that record (one row per group
//! member) and the resulting values are folded. Built-ins skip Nulls;
//! `COUNT(*)` counts members. User-defined aggregates iterate the value
//! list through a pseudo cursor inside a fresh environment scope.

use crate::error::{Error, ErrorKind, Position, Result};
use crate::executor::exec_expr::{evaluate, has_aggregate_call};
use crate::executor::scope::{Environment, FilterRecord, UserDefinedFunction};
use crate::parser::ast::{Expr, Identifier, OrderItem};
use crate::storage::value::Value;
use crate::utils::adt::cast::{to_number, Number};
use crate::utils::adt::comparison::{compare_ordered, identity_key};

const BUILTIN_AGGREGATES: &[&str] = &["count", "sum", "avg", "min", "max", "median"];

pub fn is_builtin_aggregate(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "listagg" || BUILTIN_AGGREGATES.contains(&lower.as_str())
}

/// Entry point for `Expr::AggregateFunction` and `Expr::ListAgg`.
pub fn eval_aggregate_expr(
    expr: &Expr,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    match expr {
        Expr::AggregateFunction {
            name,
            distinct,
            args,
            pos,
        } => {
            let lower = name.literal.to_ascii_lowercase();
            if BUILTIN_AGGREGATES.contains(&lower.as_str()) {
                eval_builtin_aggregate(expr, name, &lower, *distinct, args, *pos, env, records)
            } else if let Some(function) = env.get_function(&name.literal) {
                if function.is_aggregate {
                    eval_user_aggregate_call(&function, name, args, *distinct, *pos, env, records)
                } else {
                    Err(Error::new(*pos, ErrorKind::FunctionNotExist(name.literal.clone())))
                }
            } else {
                Err(Error::new(*pos, ErrorKind::FunctionNotExist(name.literal.clone())))
            }
        }
        Expr::ListAgg {
            distinct,
            args,
            within_group,
            pos,
        } => eval_listagg(expr, *distinct, args, within_group, *pos, env, records),
        _ => unreachable!("eval_aggregate_expr expects an aggregate node"),
    }
}

fn grouped_context<'a, 'v>(
    name: &str,
    pos: Position,
    records: &'a [FilterRecord<'v>],
) -> Result<FilterRecord<'v>> {
    match records.first() {
        Some(fr) if fr.view.is_grouped => Ok(*fr),
        _ => Err(Error::new(pos, ErrorKind::NotGroupingRecords(name.to_string()))),
    }
}

fn check_nested(outer: &str, args: &[Expr], env: &Environment, pos: Position) -> Result<()> {
    if args.iter().any(|arg| has_aggregate_call(arg, env)) {
        return Err(Error::new(
            pos,
            ErrorKind::NestedAggregateFunctions(outer.to_string()),
        ));
    }
    Ok(())
}

/// Evaluate `arg` once per member of the current group.
fn group_argument_values(
    arg: &Expr,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
    current: FilterRecord<'_>,
) -> Result<Vec<Value>> {
    let member_view = current.view.from_grouped_record(current.record_index);
    let mut values = Vec::with_capacity(member_view.record_len());
    for member in 0..member_view.record_len() {
        let mut stack = vec![FilterRecord {
            view: &member_view,
            record_index: member,
        }];
        stack.extend_from_slice(&records[1..]);
        values.push(evaluate(arg, env, &stack)?);
    }
    Ok(values)
}

fn distinct_values(values: Vec<Value>) -> Vec<Value> {
    let mut seen = rustc_hash::FxHashSet::default();
    values
        .into_iter()
        .filter(|value| seen.insert(identity_key(std::slice::from_ref(value))))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn eval_builtin_aggregate(
    outer: &Expr,
    name: &Identifier,
    lower: &str,
    distinct: bool,
    args: &[Expr],
    pos: Position,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    let current = grouped_context(&name.literal, pos, records)?;

    if args.len() != 1 {
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.literal.clone(),
                expect: "exactly 1 argument(s)".to_string(),
            },
        ));
    }

    if lower == "count" && matches!(args[0], Expr::AllColumns { view: None, .. }) {
        let multiplicity = current.view.record_set[current.record_index]
            .iter()
            .map(crate::executor::view::Cell::len)
            .max()
            .unwrap_or(0);
        return Ok(Value::Integer(multiplicity as i64));
    }

    check_nested(&outer.to_string(), args, env, pos)?;
    let mut values = group_argument_values(&args[0], env, records, current)?;
    if distinct {
        values = distinct_values(values);
    }
    Ok(fold_builtin(lower, &values))
}

/// Fold non-null values with the named built-in. All-null input folds to
/// Null (COUNT folds to 0).
pub fn fold_builtin(lower: &str, values: &[Value]) -> Value {
    let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    match lower {
        "count" => Value::Integer(non_null.len() as i64),
        "sum" | "avg" => {
            let mut int_sum: i64 = 0;
            let mut float_sum = 0.0f64;
            let mut saw_float = false;
            let mut count = 0usize;
            for value in &non_null {
                match to_number(value) {
                    Some(Number::Integer(v)) => {
                        int_sum = int_sum.wrapping_add(v);
                        float_sum += v as f64;
                    }
                    Some(Number::Float(v)) => {
                        float_sum += v;
                        saw_float = true;
                    }
                    None => continue,
                }
                count += 1;
            }
            if count == 0 {
                return Value::Null;
            }
            if lower == "sum" {
                if saw_float {
                    Value::Float(float_sum)
                } else {
                    Value::Integer(int_sum)
                }
            } else {
                let avg = float_sum / count as f64;
                if avg.fract() == 0.0 && avg.abs() < i64::MAX as f64 {
                    Value::Integer(avg as i64)
                } else {
                    Value::Float(avg)
                }
            }
        }
        "min" | "max" => {
            let mut extremum: Option<&Value> = None;
            for value in &non_null {
                match extremum {
                    None => extremum = Some(value),
                    Some(current) => {
                        if let Some(ord) = compare_ordered(value, current) {
                            let replace = if lower == "min" {
                                ord == std::cmp::Ordering::Less
                            } else {
                                ord == std::cmp::Ordering::Greater
                            };
                            if replace {
                                extremum = Some(value);
                            }
                        }
                    }
                }
            }
            extremum.cloned().unwrap_or(Value::Null)
        }
        "median" => {
            let mut numbers: Vec<f64> = non_null
                .iter()
                .filter_map(|v| to_number(v))
                .map(Number::as_f64)
                .collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            numbers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = numbers.len() / 2;
            let median = if numbers.len() % 2 == 1 {
                numbers[mid]
            } else {
                (numbers[mid - 1] + numbers[mid]) / 2.0
            };
            if median.fract() == 0.0 && median.abs() < i64::MAX as f64 {
                Value::Integer(median as i64)
            } else {
                Value::Float(median)
            }
        }
        _ => unreachable!("unknown builtin aggregate {lower}"),
    }
}

fn eval_listagg(
    outer: &Expr,
    distinct: bool,
    args: &[Expr],
    within_group: &[OrderItem],
    pos: Position,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    let current = grouped_context("listagg", pos, records)?;

    if args.is_empty() || args.len() > 2 {
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: "listagg".to_string(),
                expect: "1 or 2 arguments".to_string(),
            },
        ));
    }
    check_nested(&outer.to_string(), &args[..1], env, pos)?;

    let separator = match args.get(1) {
        Some(arg) => match evaluate(arg, env, records)? {
            Value::String(s) => s,
            _ => {
                return Err(Error::new(
                    pos,
                    ErrorKind::FunctionInvalidDelimiter("listagg".to_string()),
                ))
            }
        },
        None => String::new(),
    };

    // Pair each member value with its ordering keys, sort, then fold.
    let member_view = current.view.from_grouped_record(current.record_index);
    let mut entries: Vec<(Value, Vec<crate::executor::view::SortValue>)> =
        Vec::with_capacity(member_view.record_len());
    for member in 0..member_view.record_len() {
        let mut stack = vec![FilterRecord {
            view: &member_view,
            record_index: member,
        }];
        stack.extend_from_slice(&records[1..]);
        let value = evaluate(&args[0], env, &stack)?;
        let mut keys = Vec::with_capacity(within_group.len());
        for item in within_group {
            let key = evaluate(&item.value, env, &stack)?;
            keys.push(crate::executor::view::SortValue::from_value(&key));
        }
        entries.push((value, keys));
    }

    if !within_group.is_empty() {
        let directions: Vec<_> = within_group
            .iter()
            .map(|item| (item.direction, item.nulls))
            .collect();
        entries.sort_by(|a, b| {
            crate::executor::exec_main::compare_sort_keys(&a.1, &b.1, &directions)
        });
    }

    let mut values: Vec<Value> = entries.into_iter().map(|(value, _)| value).collect();
    if distinct {
        values = distinct_values(values);
    }

    let strings: Vec<String> = values
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| v.render())
        .collect();
    if strings.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::String(strings.join(&separator)))
}

/// A user-defined aggregate reached either through an aggregate call site
/// or a scalar call site naming an `IsAggregate` function.
pub fn eval_user_aggregate_call(
    function: &UserDefinedFunction,
    name: &Identifier,
    args: &[Expr],
    distinct: bool,
    pos: Position,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    let current = grouped_context(&name.literal, pos, records)?;

    let extra = args.len().saturating_sub(1);
    if args.is_empty()
        || extra < function.required_args
        || function.parameters.len() < extra
    {
        let expect = if function.parameters.is_empty() {
            "exactly 1 argument(s)".to_string()
        } else {
            format!(
                "at least {} and at most {} arguments",
                function.required_args + 1,
                function.parameters.len() + 1
            )
        };
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.literal.clone(),
                expect,
            },
        ));
    }
    let rendered = format!("{}({})", name.literal, args[0]);
    check_nested(&rendered, &args[..1], env, pos)?;

    let mut values = group_argument_values(&args[0], env, records, current)?;
    if distinct {
        values = distinct_values(values);
    }

    let mut extra_values = Vec::with_capacity(args.len() - 1);
    for arg in &args[1..] {
        extra_values.push(evaluate(arg, env, records)?);
    }

    crate::tcop::engine::invoke_aggregate_function(env, function, values, extra_values, records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_sum_skips_nulls_and_keeps_integers() {
        let values = [Value::Integer(1), Value::Null, Value::Integer(4)];
        assert_eq!(fold_builtin("sum", &values), Value::Integer(5));
        assert_eq!(fold_builtin("count", &values), Value::Integer(2));
    }

    #[test]
    fn fold_of_all_null_input_is_null() {
        let values = [Value::Null, Value::Null];
        assert_eq!(fold_builtin("sum", &values), Value::Null);
        assert_eq!(fold_builtin("max", &values), Value::Null);
        assert_eq!(fold_builtin("count", &values), Value::Integer(0));
    }

    #[test]
    fn fold_median_splits_even_groups() {
        let values = [
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(6),
        ];
        assert_eq!(fold_builtin("median", &values), Value::Float(2.5));
    }

    #[test]
    fn fold_min_max_use_sql_coercion() {
        let values = [
            Value::String("10".into()),
            Value::Integer(9),
            Value::String("2".into()),
        ];
        assert_eq!(fold_builtin("min", &values), Value::String("2".into()));
        assert_eq!(fold_builtin("max", &values), Value::String("10".into()));
    }
}
