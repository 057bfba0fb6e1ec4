//! The analytic (window) function engine.
//!
//! For each call the engine buckets records by their partition keys
//! (preserving original order), orders each bucket by the ORDER BY keys,
//! computes one value per row, and hands the column back to SELECT /
//! ORDER BY to append. Original record order is never disturbed: results
//! are written back through the rows' source indexes.

use rustc_hash::FxHashMap;

use crate::error::{Error, ErrorKind, Position, Result};
use crate::executor::aggregate::{self, fold_builtin};
use crate::executor::exec_expr::evaluate;
use crate::executor::exec_main::compare_sort_keys;
use crate::executor::scope::{Environment, FilterRecord};
use crate::executor::view::{SortValue, View};
use crate::parser::ast::{
    AnalyticClause, Expr, FrameBound, FrameUnit, Identifier, NullPosition, SortDirection,
    WindowFrame,
};
use crate::storage::value::Value;
use crate::utils::adt::cast::to_integer;
use crate::utils::adt::comparison::identity_key;

const RANKING_FUNCTIONS: &[&str] = &[
    "row_number",
    "rank",
    "dense_rank",
    "cume_dist",
    "percent_rank",
    "ntile",
];

const OFFSET_FUNCTIONS: &[&str] = &["lag", "lead", "first_value", "last_value", "nth_value"];

pub fn is_builtin_analytic(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RANKING_FUNCTIONS.contains(&lower.as_str())
        || OFFSET_FUNCTIONS.contains(&lower.as_str())
        || aggregate::is_builtin_aggregate(&lower)
}

struct Partition {
    /// Record indexes into the view, sorted by the window's ORDER BY.
    rows: Vec<usize>,
    /// Order keys aligned with `rows`; empty when the window has no
    /// ORDER BY.
    order_keys: Vec<Vec<SortValue>>,
}

/// Compute the analytic call's value for every record of `view`, in the
/// view's record order.
pub fn evaluate_analytic(
    name: &Identifier,
    args: &[Expr],
    distinct: bool,
    clause: &AnalyticClause,
    pos: Position,
    view: &View,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<Vec<Value>> {
    let lower = name.literal.to_ascii_lowercase();
    let user_aggregate = env.get_function(&name.literal).filter(|f| f.is_aggregate);
    if !is_builtin_analytic(&lower) && user_aggregate.is_none() {
        return Err(Error::new(pos, ErrorKind::FunctionNotExist(name.literal.clone())));
    }

    let partitions = build_partitions(clause, view, env, outer)?;
    let directions: Vec<_> = clause
        .order_by
        .iter()
        .map(|item| (item.direction, item.nulls))
        .collect();

    let mut results = vec![Value::Null; view.record_len()];
    for partition in &partitions {
        for (position, &row) in partition.rows.iter().enumerate() {
            let value = match lower.as_str() {
                "row_number" => {
                    require_no_args(&name.literal, args, pos)?;
                    Value::Integer(position as i64 + 1)
                }
                "rank" => {
                    require_no_args(&name.literal, args, pos)?;
                    Value::Integer(rank_at(partition, position, &directions) as i64)
                }
                "dense_rank" => {
                    require_no_args(&name.literal, args, pos)?;
                    Value::Integer(dense_rank_at(partition, position, &directions) as i64)
                }
                "percent_rank" => {
                    require_no_args(&name.literal, args, pos)?;
                    let n = partition.rows.len();
                    if n <= 1 {
                        Value::Float(0.0)
                    } else {
                        let rank = rank_at(partition, position, &directions);
                        Value::Float((rank - 1) as f64 / (n - 1) as f64)
                    }
                }
                "cume_dist" => {
                    require_no_args(&name.literal, args, pos)?;
                    Value::Float(cume_dist_at(partition, position, &directions))
                }
                "ntile" => eval_ntile(&name.literal, args, pos, partition, position, view, env, outer)?,
                "lag" | "lead" => eval_lag_lead(
                    &name.literal,
                    args,
                    pos,
                    partition,
                    position,
                    lower == "lag",
                    view,
                    env,
                    outer,
                )?,
                "first_value" | "last_value" | "nth_value" => eval_nth(
                    &name.literal,
                    args,
                    pos,
                    partition,
                    position,
                    &lower,
                    clause.frame.as_ref(),
                    view,
                    env,
                    outer,
                )?,
                _ => eval_window_aggregate(
                    name,
                    args,
                    distinct,
                    pos,
                    partition,
                    position,
                    clause.frame.as_ref(),
                    user_aggregate.as_ref(),
                    view,
                    env,
                    outer,
                )?,
            };
            results[row] = value;
        }
    }
    Ok(results)
}

fn record_stack<'v>(
    view: &'v View,
    row: usize,
    outer: &[FilterRecord<'v>],
) -> Vec<FilterRecord<'v>> {
    let mut stack = vec![FilterRecord {
        view,
        record_index: row,
    }];
    stack.extend_from_slice(outer);
    stack
}

fn build_partitions(
    clause: &AnalyticClause,
    view: &View,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<Vec<Partition>> {
    // Bucket rows by partition key, preserving first-appearance order.
    let mut order: Vec<String> = Vec::new();
    let mut buckets: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for row in 0..view.record_len() {
        let stack = record_stack(view, row, outer);
        let mut key_values = Vec::with_capacity(clause.partition.len());
        for expr in &clause.partition {
            key_values.push(evaluate(expr, env, &stack)?);
        }
        let key = identity_key(&key_values);
        let bucket = buckets.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        bucket.push(row);
    }

    let directions: Vec<_> = clause
        .order_by
        .iter()
        .map(|item| (item.direction, item.nulls))
        .collect();

    let mut partitions = Vec::with_capacity(order.len());
    for key in &order {
        let rows = buckets.remove(key).unwrap_or_default();
        let mut decorated: Vec<(usize, Vec<SortValue>)> = Vec::with_capacity(rows.len());
        for row in rows {
            let stack = record_stack(view, row, outer);
            let mut keys = Vec::with_capacity(clause.order_by.len());
            for item in &clause.order_by {
                let value = evaluate(&item.value, env, &stack)?;
                keys.push(SortValue::from_value(&value));
            }
            decorated.push((row, keys));
        }
        if !clause.order_by.is_empty() {
            decorated.sort_by(|a, b| compare_sort_keys(&a.1, &b.1, &directions));
        }
        let (rows, order_keys): (Vec<usize>, Vec<Vec<SortValue>>) =
            decorated.into_iter().unzip();
        partitions.push(Partition {
            rows,
            order_keys: if clause.order_by.is_empty() {
                Vec::new()
            } else {
                order_keys
            },
        });
    }
    Ok(partitions)
}

fn require_no_args(name: &str, args: &[Expr], pos: Position) -> Result<()> {
    if !args.is_empty() {
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.to_string(),
                expect: "exactly 0 argument(s)".to_string(),
            },
        ));
    }
    Ok(())
}

fn keys_equal(
    partition: &Partition,
    a: usize,
    b: usize,
    directions: &[(Option<SortDirection>, Option<NullPosition>)],
) -> bool {
    if partition.order_keys.is_empty() {
        return true;
    }
    compare_sort_keys(&partition.order_keys[a], &partition.order_keys[b], directions)
        == std::cmp::Ordering::Equal
}

fn rank_at(
    partition: &Partition,
    position: usize,
    directions: &[(Option<SortDirection>, Option<NullPosition>)],
) -> usize {
    if partition.order_keys.is_empty() {
        return 1;
    }
    let mut rank = 1;
    for idx in 1..=position {
        if !keys_equal(partition, idx - 1, idx, directions) {
            rank = idx + 1;
        }
    }
    rank
}

fn dense_rank_at(
    partition: &Partition,
    position: usize,
    directions: &[(Option<SortDirection>, Option<NullPosition>)],
) -> usize {
    if partition.order_keys.is_empty() {
        return 1;
    }
    let mut rank = 1;
    for idx in 1..=position {
        if !keys_equal(partition, idx - 1, idx, directions) {
            rank += 1;
        }
    }
    rank
}

fn cume_dist_at(
    partition: &Partition,
    position: usize,
    directions: &[(Option<SortDirection>, Option<NullPosition>)],
) -> f64 {
    let n = partition.rows.len();
    if partition.order_keys.is_empty() {
        return 1.0;
    }
    let peers_end = (position..n)
        .take_while(|&idx| keys_equal(partition, position, idx, directions))
        .last()
        .unwrap_or(position);
    (peers_end + 1) as f64 / n as f64
}

#[allow(clippy::too_many_arguments)]
fn eval_ntile(
    name: &str,
    args: &[Expr],
    pos: Position,
    partition: &Partition,
    position: usize,
    view: &View,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<Value> {
    if args.len() != 1 {
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.to_string(),
                expect: "exactly 1 argument(s)".to_string(),
            },
        ));
    }
    let stack = record_stack(view, partition.rows[position], outer);
    let tiles = match to_integer(&evaluate(&args[0], env, &stack)?) {
        Value::Integer(n) if n > 0 => n as usize,
        _ => {
            return Err(Error::new(
                pos,
                ErrorKind::FunctionInvalidArgument {
                    name: name.to_string(),
                    message: "the first argument must be a positive integer".to_string(),
                },
            ))
        }
    };
    let total = partition.rows.len();
    Ok(Value::Integer((position * tiles / total) as i64 + 1))
}

#[allow(clippy::too_many_arguments)]
fn eval_lag_lead(
    name: &str,
    args: &[Expr],
    pos: Position,
    partition: &Partition,
    position: usize,
    backwards: bool,
    view: &View,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<Value> {
    if args.is_empty() || args.len() > 3 {
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.to_string(),
                expect: "1 to 3 arguments".to_string(),
            },
        ));
    }

    let current_stack = record_stack(view, partition.rows[position], outer);
    let offset = match args.get(1) {
        Some(expr) => match to_integer(&evaluate(expr, env, &current_stack)?) {
            Value::Integer(n) if n >= 0 => n as usize,
            Value::Null => return Ok(Value::Null),
            _ => {
                return Err(Error::new(
                    pos,
                    ErrorKind::FunctionInvalidArgument {
                        name: name.to_string(),
                        message: "the second argument must be a non-negative integer".to_string(),
                    },
                ))
            }
        },
        None => 1,
    };

    let target = if backwards {
        position.checked_sub(offset)
    } else {
        position.checked_add(offset).filter(|t| *t < partition.rows.len())
    };

    match target {
        Some(target) => {
            let stack = record_stack(view, partition.rows[target], outer);
            evaluate(&args[0], env, &stack)
        }
        None => match args.get(2) {
            Some(default) => evaluate(default, env, &current_stack),
            None => Ok(Value::Null),
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn eval_nth(
    name: &str,
    args: &[Expr],
    pos: Position,
    partition: &Partition,
    position: usize,
    lower: &str,
    frame: Option<&WindowFrame>,
    view: &View,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<Value> {
    let expected = if lower == "nth_value" { 2 } else { 1 };
    if args.len() != expected {
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.to_string(),
                expect: format!("exactly {} argument(s)", expected),
            },
        ));
    }

    let frame_rows = frame_positions(partition, position, frame);
    let target = match lower {
        "first_value" => frame_rows.first().copied(),
        "last_value" => frame_rows.last().copied(),
        _ => {
            let stack = record_stack(view, partition.rows[position], outer);
            match to_integer(&evaluate(&args[1], env, &stack)?) {
                Value::Integer(n) if n > 0 => frame_rows.get(n as usize - 1).copied(),
                Value::Null => None,
                _ => {
                    return Err(Error::new(
                        pos,
                        ErrorKind::FunctionInvalidArgument {
                            name: name.to_string(),
                            message: "the second argument must be a positive integer".to_string(),
                        },
                    ))
                }
            }
        }
    };

    match target {
        Some(frame_position) => {
            let stack = record_stack(view, partition.rows[frame_position], outer);
            evaluate(&args[0], env, &stack)
        }
        None => Ok(Value::Null),
    }
}

#[allow(clippy::too_many_arguments)]
fn eval_window_aggregate(
    name: &Identifier,
    args: &[Expr],
    distinct: bool,
    pos: Position,
    partition: &Partition,
    position: usize,
    frame: Option<&WindowFrame>,
    user_aggregate: Option<&crate::executor::scope::UserDefinedFunction>,
    view: &View,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<Value> {
    let lower = name.literal.to_ascii_lowercase();
    let is_listagg = lower == "listagg";

    let max_args = if is_listagg { 2 } else { 1 };
    let min_args = 1;
    if user_aggregate.is_none() && (args.len() < min_args || max_args < args.len()) {
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.literal.clone(),
                expect: if is_listagg {
                    "1 or 2 arguments".to_string()
                } else {
                    "exactly 1 argument(s)".to_string()
                },
            },
        ));
    }
    if args.is_empty() {
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.literal.clone(),
                expect: "at least 1 argument(s)".to_string(),
            },
        ));
    }

    let frame_rows = frame_positions(partition, position, frame);
    if lower == "count" && matches!(args[0], Expr::AllColumns { view: None, .. }) {
        return Ok(Value::Integer(frame_rows.len() as i64));
    }
    let mut values = Vec::with_capacity(frame_rows.len());
    for frame_position in &frame_rows {
        let stack = record_stack(view, partition.rows[*frame_position], outer);
        values.push(evaluate(&args[0], env, &stack)?);
    }
    if distinct {
        let mut seen = rustc_hash::FxHashSet::default();
        values.retain(|value| seen.insert(identity_key(std::slice::from_ref(value))));
    }

    if let Some(function) = user_aggregate {
        let current_stack = record_stack(view, partition.rows[position], outer);
        let mut extra = Vec::with_capacity(args.len().saturating_sub(1));
        for arg in &args[1..] {
            extra.push(evaluate(arg, env, &current_stack)?);
        }
        return crate::tcop::engine::invoke_aggregate_function(env, function, values, extra, outer);
    }

    if is_listagg {
        let separator = match args.get(1) {
            Some(expr) => {
                let stack = record_stack(view, partition.rows[position], outer);
                match evaluate(expr, env, &stack)? {
                    Value::String(s) => s,
                    _ => {
                        return Err(Error::new(
                            pos,
                            ErrorKind::FunctionInvalidDelimiter("listagg".to_string()),
                        ))
                    }
                }
            }
            None => String::new(),
        };
        let strings: Vec<String> = values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| v.render())
            .collect();
        if strings.is_empty() {
            return Ok(Value::Null);
        }
        return Ok(Value::String(strings.join(&separator)));
    }

    Ok(fold_builtin(&lower, &values))
}

/// Positions (into the sorted partition) covered by the frame. Without a
/// frame clause the whole partition is in scope.
fn frame_positions(
    partition: &Partition,
    position: usize,
    frame: Option<&WindowFrame>,
) -> Vec<usize> {
    let len = partition.rows.len();
    let Some(frame) = frame else {
        return (0..len).collect();
    };

    match frame.unit {
        FrameUnit::Rows => {
            let start = rows_bound(&frame.start, position, len);
            let end = match &frame.end {
                Some(bound) => rows_bound(bound, position, len),
                None => position,
            };
            if start > end {
                return Vec::new();
            }
            (start..=end.min(len.saturating_sub(1))).collect()
        }
        FrameUnit::Range => {
            // Value-based framing over the first numeric order key; rows
            // without a usable key fall back to the whole partition.
            let Some(current) = range_key(partition, position) else {
                return (0..len).collect();
            };
            let low = match &frame.start {
                FrameBound::UnboundedPreceding => f64::NEG_INFINITY,
                FrameBound::Preceding(n) => current - *n as f64,
                FrameBound::CurrentRow => current,
                FrameBound::Following(n) => current + *n as f64,
                FrameBound::UnboundedFollowing => f64::INFINITY,
            };
            let high = match frame.end.as_ref().unwrap_or(&FrameBound::CurrentRow) {
                FrameBound::UnboundedPreceding => f64::NEG_INFINITY,
                FrameBound::Preceding(n) => current - *n as f64,
                FrameBound::CurrentRow => current,
                FrameBound::Following(n) => current + *n as f64,
                FrameBound::UnboundedFollowing => f64::INFINITY,
            };
            (0..len)
                .filter(|&idx| {
                    range_key(partition, idx)
                        .map(|key| low <= key && key <= high)
                        .unwrap_or(false)
                })
                .collect()
        }
    }
}

fn rows_bound(bound: &FrameBound, position: usize, len: usize) -> usize {
    let max = len.saturating_sub(1);
    match bound {
        FrameBound::UnboundedPreceding => 0,
        FrameBound::Preceding(n) => position.saturating_sub(*n as usize),
        FrameBound::CurrentRow => position,
        FrameBound::Following(n) => (position + *n as usize).min(max),
        FrameBound::UnboundedFollowing => max,
    }
}

fn range_key(partition: &Partition, position: usize) -> Option<f64> {
    let keys = partition.order_keys.get(position)?;
    match keys.first()? {
        SortValue::Number(v) => Some(*v),
        SortValue::Datetime(v) => Some(*v as f64),
        _ => None,
    }
}
