//! The expression evaluator.
//!
//! One entry point, [`evaluate`], dispatches on the closed [`Expr`] enum
//! against an environment and a stack of record contexts. The stack is
//! innermost-first: element 0 is the operator's current row, the rest are
//! outer rows visible to correlated subqueries.

use regex::Regex;

use crate::error::{Error, ErrorKind, Position, Result};
use crate::executor::aggregate;
use crate::executor::exec_main;
use crate::executor::scope::{Environment, FilterRecord};
use crate::executor::view::FieldLookup;
use crate::parser::ast::{
    AnalyticClause, CaseWhen, ComparisonOperator, CursorAttributeKind, CursorStatusKind, Expr,
    InlineTableDeclaration, Join, JoinCondition, LimitClause, OffsetClause, OrderItem,
    QuantifiedValues, RowValue, SelectEntity, SelectQuery, Subquery, TableExpr, TableSource,
};
use crate::storage::value::{Ternary, Value};
use crate::utils::adt::arithmetic::{calculate, calculate_unary, concat};
use crate::utils::adt::cast::{ternary_of, to_string};
use crate::utils::adt::comparison::{compare, compare_row_values};
use crate::utils::fmgr;

/// Evaluate `expr` to a scalar value.
pub fn evaluate(
    expr: &Expr,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    match expr {
        Expr::Literal { value, .. } => Ok(value.clone()),
        Expr::Parenthesis(inner) => evaluate(inner, env, records),
        Expr::FieldReference { view, column, pos } => {
            let label = expr.to_string();
            field_value(
                view.as_ref().map(|v| v.literal.as_str()),
                &column.literal,
                &label,
                *pos,
                records,
            )
        }
        Expr::ColumnNumber { view, number, pos } => {
            let label = expr.to_string();
            column_number_value(&view.literal, *number, &label, *pos, records)
        }
        Expr::Arithmetic {
            lhs, rhs, operator, ..
        } => {
            let left = evaluate(lhs, env, records)?;
            if left.is_null() {
                // Null short-circuits; the right side is not evaluated.
                return Ok(Value::Null);
            }
            let right = evaluate(rhs, env, records)?;
            Ok(calculate(&left, &right, *operator))
        }
        Expr::UnaryArithmetic { operand, sign, .. } => {
            let value = evaluate(operand, env, records)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            Ok(calculate_unary(&value, *sign))
        }
        Expr::Concat { items, .. } => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(evaluate(item, env, records)?);
            }
            Ok(concat(&values))
        }
        Expr::Comparison {
            lhs, rhs, operator, ..
        } => eval_comparison(lhs, rhs, *operator, env, records),
        Expr::Is {
            lhs, rhs, negated, ..
        } => {
            let left = evaluate(lhs, env, records)?;
            let right = evaluate(rhs, env, records)?;
            let result = if right.is_null() {
                Ternary::from_bool(left.is_null())
            } else {
                Ternary::from_bool(ternary_of(&left) == ternary_of(&right))
            };
            Ok(Value::Ternary(if *negated { result.not() } else { result }))
        }
        Expr::Between {
            lhs,
            low,
            high,
            negated,
            ..
        } => eval_between(lhs, low, high, *negated, env, records),
        Expr::In {
            lhs,
            values,
            negated,
            pos,
        } => {
            let result = eval_membership(lhs, values, env, records, *pos)?;
            Ok(Value::Ternary(if *negated { result.not() } else { result }))
        }
        Expr::Any {
            lhs,
            operator,
            values,
            pos,
        } => {
            let result = eval_quantified(lhs, *operator, values, false, env, records, *pos)?;
            Ok(Value::Ternary(result))
        }
        Expr::All {
            lhs,
            operator,
            values,
            pos,
        } => {
            let result = eval_quantified(lhs, *operator, values, true, env, records, *pos)?;
            Ok(Value::Ternary(result))
        }
        Expr::Like {
            lhs,
            pattern,
            negated,
            ..
        } => {
            let value = evaluate(lhs, env, records)?;
            let pattern = evaluate(pattern, env, records)?;
            let (Value::String(value), Value::String(pattern)) =
                (to_string(&value), to_string(&pattern))
            else {
                return Ok(Value::Ternary(Ternary::Unknown));
            };
            let matched = like_match(&value, &pattern);
            let result = Ternary::from_bool(matched);
            Ok(Value::Ternary(if *negated { result.not() } else { result }))
        }
        Expr::Exists { query, .. } => {
            let view = exec_main::execute_select(&query.query, env, records)?;
            Ok(Value::Ternary(Ternary::from_bool(view.record_len() > 0)))
        }
        Expr::CaseExpr {
            value,
            when_clauses,
            else_result,
            ..
        } => eval_case(value.as_deref(), when_clauses, else_result.as_deref(), env, records),
        Expr::Logic {
            lhs, rhs, operator, ..
        } => {
            let left = ternary_of(&evaluate(lhs, env, records)?);
            // A decisive left side must suppress evaluation of the right:
            // tests rely on errors in the dead branch being unreachable.
            match operator {
                crate::parser::ast::LogicOperator::And => {
                    if left == Ternary::False {
                        return Ok(Value::Ternary(Ternary::False));
                    }
                    let right = ternary_of(&evaluate(rhs, env, records)?);
                    Ok(Value::Ternary(left.and(right)))
                }
                crate::parser::ast::LogicOperator::Or => {
                    if left == Ternary::True {
                        return Ok(Value::Ternary(Ternary::True));
                    }
                    let right = ternary_of(&evaluate(rhs, env, records)?);
                    Ok(Value::Ternary(left.or(right)))
                }
            }
        }
        Expr::UnaryLogic { operand, .. } => {
            let value = ternary_of(&evaluate(operand, env, records)?);
            Ok(Value::Ternary(value.not()))
        }
        Expr::Function { name, args, pos } => eval_function(name, args, *pos, env, records),
        Expr::AggregateFunction { .. } | Expr::ListAgg { .. } => {
            aggregate::eval_aggregate_expr(expr, env, records)
        }
        Expr::AnalyticFunction { name, pos, .. } => {
            // Analytic results are appended columns; outside a SELECT or
            // ORDER BY extension pass there is nothing to resolve against.
            let label = expr.to_string();
            match records.first() {
                Some(fr) => {
                    let found = fr
                        .view
                        .header
                        .iter()
                        .position(|f| f.column == label);
                    match found {
                        Some(idx) => Ok(fr.view.record_set[fr.record_index][idx].value().clone()),
                        None => Err(Error::new(
                            *pos,
                            ErrorKind::Syntax(format!(
                                "function {} is only available in select clause or order by clause",
                                name
                            )),
                        )),
                    }
                }
                None => Err(Error::new(
                    *pos,
                    ErrorKind::Syntax(format!(
                        "function {} is only available in select clause or order by clause",
                        name
                    )),
                )),
            }
        }
        Expr::Subquery(subquery) => eval_scalar_subquery(subquery, env, records),
        Expr::RowValue(row) => {
            // A bare row value has no scalar meaning.
            Err(Error::new(
                row.position(),
                ErrorKind::Syntax("row value is not allowed here".to_string()),
            ))
        }
        Expr::Variable { name, pos } => env.get_variable(name, *pos),
        Expr::VariableSubstitution {
            variable,
            value,
            pos,
        } => {
            let value = evaluate(value, env, records)?;
            env.set_variable(variable, value.clone(), *pos)?;
            Ok(value)
        }
        Expr::CursorStatus {
            cursor,
            negated,
            status,
            pos,
        } => {
            let name = cursor.literal.clone();
            let result = match status {
                CursorStatusKind::Open => env.with_cursor(&name, *pos, |cursor| {
                    Ok(Ternary::from_bool(cursor.is_open()))
                })?,
                CursorStatusKind::InRange => env.with_cursor(&name, *pos, |cursor| {
                    if !cursor.is_open() {
                        return Err(Error::new(*pos, ErrorKind::CursorClosed(name.clone())));
                    }
                    Ok(cursor.in_range())
                })?,
            };
            Ok(Value::Ternary(if *negated { result.not() } else { result }))
        }
        Expr::CursorAttribute {
            cursor,
            attribute,
            pos,
        } => {
            let name = cursor.literal.clone();
            match attribute {
                CursorAttributeKind::Count => env.with_cursor(&name, *pos, |cursor| {
                    if !cursor.is_open() {
                        return Err(Error::new(*pos, ErrorKind::CursorClosed(name.clone())));
                    }
                    Ok(Value::Integer(cursor.count() as i64))
                }),
            }
        }
        Expr::AllColumns { pos, .. } => Err(Error::new(
            *pos,
            ErrorKind::Syntax("unexpected *".to_string()),
        )),
    }
}

/// Evaluate a predicate down to its ternary truth value.
pub fn evaluate_ternary(
    expr: &Expr,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Ternary> {
    Ok(ternary_of(&evaluate(expr, env, records)?))
}

// ---------------------------------------------------------------------------
// Field resolution
// ---------------------------------------------------------------------------

fn resolve_field(
    view: Option<&str>,
    column: &str,
    label: &str,
    pos: Position,
    records: &[FilterRecord<'_>],
) -> Result<(usize, usize)> {
    for (depth, fr) in records.iter().enumerate() {
        match fr.view.header.search_index(view, column) {
            Ok(idx) => return Ok((depth, idx)),
            Err(FieldLookup::Ambiguous) => {
                return Err(FieldLookup::Ambiguous.into_error(label, pos))
            }
            Err(FieldLookup::NotExist) => {}
        }
    }
    Err(FieldLookup::NotExist.into_error(label, pos))
}

fn cell_value(
    fr: FilterRecord<'_>,
    field_idx: usize,
    label: &str,
    pos: Position,
) -> Result<Value> {
    let field = &fr.view.header[field_idx];
    let cell = &fr.view.record_set[fr.record_index][field_idx];
    if fr.view.is_grouped && matches!(cell, crate::executor::view::Cell::Group(_)) && !field.is_group_key
    {
        return Err(Error::new(pos, ErrorKind::FieldNotGroupKey(label.to_string())));
    }
    Ok(cell.value().clone())
}

fn field_value(
    view: Option<&str>,
    column: &str,
    label: &str,
    pos: Position,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    let (depth, idx) = resolve_field(view, column, label, pos, records)?;
    cell_value(records[depth], idx, label, pos)
}

fn column_number_value(
    view: &str,
    number: i64,
    label: &str,
    pos: Position,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    for fr in records {
        if let Ok(idx) = fr.view.header.search_number(view, number) {
            return cell_value(*fr, idx, label, pos);
        }
    }
    Err(FieldLookup::NotExist.into_error(label, pos))
}

// ---------------------------------------------------------------------------
// Comparison / membership
// ---------------------------------------------------------------------------

fn is_row_value(expr: &Expr) -> bool {
    matches!(expr, Expr::RowValue(_))
}

/// Evaluate a row-value expression into its tuple, or `None` when a
/// subquery source produced no row.
fn eval_row_value(
    row: &RowValue,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
    expect_len: Option<usize>,
) -> Result<Option<Vec<Value>>> {
    let values = match row {
        RowValue::ValueList { values, pos } => {
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                out.push(evaluate(value, env, records)?);
            }
            if let Some(expected) = expect_len {
                if out.len() != expected {
                    return Err(Error::new(*pos, ErrorKind::RowValueLength(expected)));
                }
            }
            Some(out)
        }
        RowValue::Subquery(subquery) => {
            let view = exec_main::execute_select(&subquery.query, env, records)?;
            if view.record_len() > 1 {
                return Err(Error::new(subquery.pos, ErrorKind::SubqueryTooManyRecords));
            }
            if let Some(expected) = expect_len {
                if view.field_len() != expected {
                    return Err(Error::new(subquery.pos, ErrorKind::SelectFieldLength(expected)));
                }
            }
            view.record_set.first().map(|record| {
                record.iter().map(|cell| cell.value().clone()).collect()
            })
        }
    };
    Ok(values)
}

fn eval_comparison(
    lhs: &Expr,
    rhs: &Expr,
    operator: ComparisonOperator,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    if is_row_value(lhs) || is_row_value(rhs) {
        let Expr::RowValue(left_row) = lhs else {
            return Err(Error::new(
                lhs.position(),
                ErrorKind::Syntax("row value is not allowed here".to_string()),
            ));
        };
        let Some(left) = eval_row_value(left_row, env, records, None)? else {
            return Ok(Value::Ternary(Ternary::Unknown));
        };
        let Expr::RowValue(right_row) = rhs else {
            return Err(Error::new(rhs.position(), ErrorKind::RowValueLength(left.len())));
        };
        let Some(right) = eval_row_value(right_row, env, records, Some(left.len()))? else {
            return Ok(Value::Ternary(Ternary::Unknown));
        };
        return Ok(Value::Ternary(compare_row_values(&left, &right, operator)));
    }

    let left = evaluate(lhs, env, records)?;
    let right = evaluate(rhs, env, records)?;
    Ok(Value::Ternary(compare(&left, &right, operator)))
}

fn eval_between(
    lhs: &Expr,
    low: &Expr,
    high: &Expr,
    negated: bool,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    let result = if is_row_value(lhs) {
        let Expr::RowValue(lhs_row) = lhs else {
            unreachable!()
        };
        let Some(value) = eval_row_value(lhs_row, env, records, None)? else {
            return Ok(Value::Ternary(Ternary::Unknown));
        };
        let low_row = expect_row_value(low, value.len())?;
        let high_row = expect_row_value(high, value.len())?;
        let (Some(low), Some(high)) = (
            eval_row_value(low_row, env, records, Some(value.len()))?,
            eval_row_value(high_row, env, records, Some(value.len()))?,
        ) else {
            return Ok(Value::Ternary(Ternary::Unknown));
        };
        compare_row_values(&value, &low, ComparisonOperator::GreaterOrEqual)
            .and(compare_row_values(&value, &high, ComparisonOperator::LessOrEqual))
    } else {
        let value = evaluate(lhs, env, records)?;
        let low = evaluate(low, env, records)?;
        let high = evaluate(high, env, records)?;
        compare(&value, &low, ComparisonOperator::GreaterOrEqual)
            .and(compare(&value, &high, ComparisonOperator::LessOrEqual))
    };
    Ok(Value::Ternary(if negated { result.not() } else { result }))
}

fn expect_row_value(expr: &Expr, arity: usize) -> Result<&RowValue> {
    match expr {
        Expr::RowValue(row) => Ok(row),
        _ => Err(Error::new(expr.position(), ErrorKind::RowValueLength(arity))),
    }
}

/// Materialise the candidate tuples of IN / ANY / ALL.
fn quantified_rows(
    values: &QuantifiedValues,
    arity: usize,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
    pos: Position,
) -> Result<Vec<Vec<Value>>> {
    match values {
        QuantifiedValues::List(items) => {
            if arity != 1 {
                return Err(Error::new(pos, ErrorKind::RowValueLength(arity)));
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(vec![evaluate(item, env, records)?]);
            }
            Ok(out)
        }
        QuantifiedValues::RowValueList(rows) => {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                if let Some(values) = eval_row_value(row, env, records, Some(arity))? {
                    out.push(values);
                }
            }
            Ok(out)
        }
        QuantifiedValues::Subquery(subquery) => {
            let view = exec_main::execute_select(&subquery.query, env, records)?;
            if view.field_len() != arity {
                return Err(if arity == 1 {
                    Error::new(subquery.pos, ErrorKind::SubqueryTooManyFields)
                } else {
                    Error::new(subquery.pos, ErrorKind::SelectFieldLength(arity))
                });
            }
            Ok(view
                .record_set
                .iter()
                .map(|record| record.iter().map(|cell| cell.value().clone()).collect())
                .collect())
        }
    }
}

fn lhs_tuple(
    lhs: &Expr,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Option<Vec<Value>>> {
    if let Expr::RowValue(row) = lhs {
        eval_row_value(row, env, records, None)
    } else {
        Ok(Some(vec![evaluate(lhs, env, records)?]))
    }
}

fn eval_membership(
    lhs: &Expr,
    values: &QuantifiedValues,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
    pos: Position,
) -> Result<Ternary> {
    let Some(left) = lhs_tuple(lhs, env, records)? else {
        return Ok(Ternary::Unknown);
    };
    let rows = quantified_rows(values, left.len(), env, records, pos)?;

    let mut result = Ternary::False;
    for row in &rows {
        match compare_row_values(&left, row, ComparisonOperator::Equal) {
            Ternary::True => return Ok(Ternary::True),
            Ternary::Unknown => result = Ternary::Unknown,
            Ternary::False => {}
        }
    }
    Ok(result)
}

fn eval_quantified(
    lhs: &Expr,
    operator: ComparisonOperator,
    values: &QuantifiedValues,
    all: bool,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
    pos: Position,
) -> Result<Ternary> {
    let Some(left) = lhs_tuple(lhs, env, records)? else {
        return Ok(Ternary::Unknown);
    };
    let rows = quantified_rows(values, left.len(), env, records, pos)?;

    let mut result = if all { Ternary::True } else { Ternary::False };
    for row in &rows {
        let decided = compare_row_values(&left, row, operator);
        if all {
            match decided {
                Ternary::False => return Ok(Ternary::False),
                Ternary::Unknown => result = Ternary::Unknown,
                Ternary::True => {}
            }
        } else {
            match decided {
                Ternary::True => return Ok(Ternary::True),
                Ternary::Unknown => result = Ternary::Unknown,
                Ternary::False => {}
            }
        }
    }
    Ok(result)
}

fn eval_case(
    value: Option<&Expr>,
    when_clauses: &[CaseWhen],
    else_result: Option<&Expr>,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    match value {
        Some(pivot) => {
            let pivot = evaluate(pivot, env, records)?;
            for when in when_clauses {
                let candidate = evaluate(&when.condition, env, records)?;
                if compare(&pivot, &candidate, ComparisonOperator::Equal).is_true() {
                    return evaluate(&when.result, env, records);
                }
            }
        }
        None => {
            for when in when_clauses {
                if evaluate_ternary(&when.condition, env, records)?.is_true() {
                    return evaluate(&when.result, env, records);
                }
            }
        }
    }
    match else_result {
        Some(expr) => evaluate(expr, env, records),
        None => Ok(Value::Null),
    }
}

fn eval_scalar_subquery(
    subquery: &Subquery,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    let view = exec_main::execute_select(&subquery.query, env, records)?;
    if view.field_len() > 1 {
        return Err(Error::new(subquery.pos, ErrorKind::SubqueryTooManyFields));
    }
    if view.record_len() > 1 {
        return Err(Error::new(subquery.pos, ErrorKind::SubqueryTooManyRecords));
    }
    Ok(view
        .record_set
        .first()
        .and_then(|record| record.first())
        .map(|cell| cell.value().clone())
        .unwrap_or(Value::Null))
}

fn eval_function(
    name: &crate::parser::ast::Identifier,
    args: &[Expr],
    pos: Position,
    env: &mut Environment,
    records: &[FilterRecord<'_>],
) -> Result<Value> {
    if fmgr::is_builtin_scalar(&name.literal) {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(evaluate(arg, env, records)?);
        }
        let now = env.now;
        return fmgr::eval_scalar_function(&name.literal, &values, &now, pos);
    }

    let Some(function) = env.get_function(&name.literal) else {
        return Err(Error::new(pos, ErrorKind::FunctionNotExist(name.literal.clone())));
    };

    if function.is_aggregate {
        // An aggregate user function reached through a scalar call site:
        // legal only against grouped records.
        return aggregate::eval_user_aggregate_call(&function, name, args, false, pos, env, records);
    }

    crate::tcop::engine::check_function_arity(&function, args.len(), &name.literal, pos)?;
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(evaluate(arg, env, records)?);
    }
    crate::tcop::engine::invoke_scalar_function(env, &function, values, records)
}

// ---------------------------------------------------------------------------
// LIKE
// ---------------------------------------------------------------------------

/// SQL LIKE via regex translation: `_` matches one character, `%` any run.
pub fn like_match(value: &str, pattern: &str) -> bool {
    let mut regex_pattern = String::with_capacity(pattern.len() * 2 + 2);
    regex_pattern.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => regex_pattern.push_str("(?s:.*)"),
            '_' => regex_pattern.push_str("(?s:.)"),
            other => regex_pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex_pattern.push('$');
    match Regex::new(&regex_pattern) {
        Ok(re) => re.is_match(value),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Parallel safety
// ---------------------------------------------------------------------------

/// Whether a predicate may be sharded across workers on environment
/// snapshots. Environment writes (variable substitution) and user-defined
/// function bodies force the serial path.
pub fn is_parallel_safe(expr: &Expr) -> bool {
    !expr_has_side_effects(expr)
}

fn exprs_have_side_effects<'a>(items: impl IntoIterator<Item = &'a Expr>) -> bool {
    items.into_iter().any(expr_has_side_effects)
}

fn expr_has_side_effects(expr: &Expr) -> bool {
    match expr {
        Expr::VariableSubstitution { .. } => true,
        Expr::Function { name, args, .. } => {
            !fmgr::is_builtin_scalar(&name.literal) || exprs_have_side_effects(args)
        }
        Expr::Literal { .. }
        | Expr::FieldReference { .. }
        | Expr::ColumnNumber { .. }
        | Expr::Variable { .. }
        | Expr::CursorStatus { .. }
        | Expr::CursorAttribute { .. }
        | Expr::AllColumns { .. } => false,
        Expr::Parenthesis(inner) | Expr::UnaryLogic { operand: inner, .. } => {
            expr_has_side_effects(inner)
        }
        Expr::UnaryArithmetic { operand, .. } => expr_has_side_effects(operand),
        Expr::Arithmetic { lhs, rhs, .. }
        | Expr::Comparison { lhs, rhs, .. }
        | Expr::Is { lhs, rhs, .. }
        | Expr::Logic { lhs, rhs, .. } => {
            expr_has_side_effects(lhs) || expr_has_side_effects(rhs)
        }
        Expr::Concat { items, .. } => exprs_have_side_effects(items),
        Expr::Between { lhs, low, high, .. } => {
            expr_has_side_effects(lhs)
                || expr_has_side_effects(low)
                || expr_has_side_effects(high)
        }
        Expr::In { lhs, values, .. } => {
            expr_has_side_effects(lhs) || quantified_has_side_effects(values)
        }
        Expr::Any { lhs, values, .. } | Expr::All { lhs, values, .. } => {
            expr_has_side_effects(lhs) || quantified_has_side_effects(values)
        }
        Expr::Like { lhs, pattern, .. } => {
            expr_has_side_effects(lhs) || expr_has_side_effects(pattern)
        }
        Expr::Exists { query, .. } => query_has_side_effects(&query.query),
        Expr::CaseExpr {
            value,
            when_clauses,
            else_result,
            ..
        } => {
            value.as_deref().is_some_and(expr_has_side_effects)
                || when_clauses.iter().any(|w| {
                    expr_has_side_effects(&w.condition) || expr_has_side_effects(&w.result)
                })
                || else_result.as_deref().is_some_and(expr_has_side_effects)
        }
        // Aggregate and analytic calls may route through user-defined
        // bodies; resolution happens at evaluation time, so stay serial.
        Expr::AggregateFunction { args, .. } => exprs_have_side_effects(args),
        Expr::ListAgg { args, .. } => exprs_have_side_effects(args),
        Expr::AnalyticFunction { .. } => false,
        Expr::Subquery(subquery) => query_has_side_effects(&subquery.query),
        Expr::RowValue(row) => row_value_has_side_effects(row),
    }
}

fn row_value_has_side_effects(row: &RowValue) -> bool {
    match row {
        RowValue::ValueList { values, .. } => exprs_have_side_effects(values),
        RowValue::Subquery(subquery) => query_has_side_effects(&subquery.query),
    }
}

fn quantified_has_side_effects(values: &QuantifiedValues) -> bool {
    match values {
        QuantifiedValues::List(items) => exprs_have_side_effects(items),
        QuantifiedValues::RowValueList(rows) => rows.iter().any(row_value_has_side_effects),
        QuantifiedValues::Subquery(subquery) => query_has_side_effects(&subquery.query),
    }
}

fn order_items_have_side_effects(items: &[OrderItem]) -> bool {
    items.iter().any(|item| expr_has_side_effects(&item.value))
}

fn with_has_side_effects(with: &[InlineTableDeclaration]) -> bool {
    with.iter().any(|decl| query_has_side_effects(&decl.query))
}

fn query_has_side_effects(query: &SelectQuery) -> bool {
    if with_has_side_effects(&query.with) {
        return true;
    }
    if entity_has_side_effects(&query.entity) {
        return true;
    }
    if let Some(order_by) = &query.order_by {
        if order_items_have_side_effects(&order_by.items) {
            return true;
        }
    }
    if let Some(LimitClause { value, .. }) = &query.limit {
        if expr_has_side_effects(value) {
            return true;
        }
    }
    if let Some(OffsetClause { value, .. }) = &query.offset {
        if expr_has_side_effects(value) {
            return true;
        }
    }
    false
}

fn entity_has_side_effects(entity: &SelectEntity) -> bool {
    match entity {
        SelectEntity::Select(set) => {
            set.select
                .fields
                .iter()
                .any(|field| expr_has_side_effects(&field.object))
                || set
                    .from
                    .as_ref()
                    .is_some_and(|from| from.tables.iter().any(table_has_side_effects))
                || set.where_clause.as_ref().is_some_and(expr_has_side_effects)
                || exprs_have_side_effects(&set.group_by)
                || set.having.as_ref().is_some_and(expr_has_side_effects)
        }
        SelectEntity::SetOperation { lhs, rhs, .. } => {
            entity_has_side_effects(lhs) || entity_has_side_effects(rhs)
        }
    }
}

fn table_has_side_effects(table: &TableExpr) -> bool {
    match &table.source {
        TableSource::Identifier(_) | TableSource::Stdin { .. } | TableSource::Dual { .. } => false,
        TableSource::Subquery(subquery) => query_has_side_effects(&subquery.query),
        TableSource::Parenthesized(inner) => table_has_side_effects(inner),
        TableSource::Join(join) => join_has_side_effects(join),
    }
}

fn join_has_side_effects(join: &Join) -> bool {
    table_has_side_effects(&join.table)
        || table_has_side_effects(&join.join_table)
        || match &join.condition {
            Some(JoinCondition::On(expr)) => expr_has_side_effects(expr),
            _ => false,
        }
}

/// Used by SELECT to decide whether a grouped evaluation is needed:
/// does the expression contain an aggregate call outside any analytic
/// clause?
pub fn has_aggregate_call(expr: &Expr, env: &Environment) -> bool {
    match expr {
        Expr::AggregateFunction { .. } | Expr::ListAgg { .. } => true,
        Expr::Function { name, args, .. } => {
            env.get_function(&name.literal)
                .map(|f| f.is_aggregate)
                .unwrap_or(false)
                || args.iter().any(|a| has_aggregate_call(a, env))
        }
        Expr::AnalyticFunction { .. } => false,
        Expr::Parenthesis(inner) | Expr::UnaryLogic { operand: inner, .. } => {
            has_aggregate_call(inner, env)
        }
        Expr::UnaryArithmetic { operand, .. } => has_aggregate_call(operand, env),
        Expr::Arithmetic { lhs, rhs, .. }
        | Expr::Comparison { lhs, rhs, .. }
        | Expr::Is { lhs, rhs, .. }
        | Expr::Logic { lhs, rhs, .. }
        | Expr::Like {
            lhs, pattern: rhs, ..
        } => has_aggregate_call(lhs, env) || has_aggregate_call(rhs, env),
        Expr::Concat { items, .. } => items.iter().any(|i| has_aggregate_call(i, env)),
        Expr::Between { lhs, low, high, .. } => {
            has_aggregate_call(lhs, env)
                || has_aggregate_call(low, env)
                || has_aggregate_call(high, env)
        }
        Expr::CaseExpr {
            value,
            when_clauses,
            else_result,
            ..
        } => {
            value.as_deref().is_some_and(|v| has_aggregate_call(v, env))
                || when_clauses.iter().any(|w| {
                    has_aggregate_call(&w.condition, env) || has_aggregate_call(&w.result, env)
                })
                || else_result
                    .as_deref()
                    .is_some_and(|e| has_aggregate_call(e, env))
        }
        Expr::In { lhs, .. } | Expr::Any { lhs, .. } | Expr::All { lhs, .. } => {
            has_aggregate_call(lhs, env)
        }
        _ => false,
    }
}

/// Collect every analytic call in `expr`, in evaluation order.
pub fn collect_analytic_calls<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::AnalyticFunction { args, clause, .. } => {
            for arg in args {
                collect_analytic_calls(arg, out);
            }
            collect_clause_analytics(clause, out);
            out.push(expr);
        }
        Expr::Parenthesis(inner) | Expr::UnaryLogic { operand: inner, .. } => {
            collect_analytic_calls(inner, out)
        }
        Expr::UnaryArithmetic { operand, .. } => collect_analytic_calls(operand, out),
        Expr::Arithmetic { lhs, rhs, .. }
        | Expr::Comparison { lhs, rhs, .. }
        | Expr::Is { lhs, rhs, .. }
        | Expr::Logic { lhs, rhs, .. }
        | Expr::Like {
            lhs, pattern: rhs, ..
        } => {
            collect_analytic_calls(lhs, out);
            collect_analytic_calls(rhs, out);
        }
        Expr::Concat { items, .. } => {
            for item in items {
                collect_analytic_calls(item, out);
            }
        }
        Expr::Between { lhs, low, high, .. } => {
            collect_analytic_calls(lhs, out);
            collect_analytic_calls(low, out);
            collect_analytic_calls(high, out);
        }
        Expr::CaseExpr {
            value,
            when_clauses,
            else_result,
            ..
        } => {
            if let Some(value) = value {
                collect_analytic_calls(value, out);
            }
            for when in when_clauses {
                collect_analytic_calls(&when.condition, out);
                collect_analytic_calls(&when.result, out);
            }
            if let Some(else_result) = else_result {
                collect_analytic_calls(else_result, out);
            }
        }
        Expr::Function { args, .. } | Expr::AggregateFunction { args, .. } => {
            for arg in args {
                collect_analytic_calls(arg, out);
            }
        }
        _ => {}
    }
}

fn collect_clause_analytics<'a>(clause: &'a AnalyticClause, out: &mut Vec<&'a Expr>) {
    for expr in &clause.partition {
        collect_analytic_calls(expr, out);
    }
    for item in &clause.order_by {
        collect_analytic_calls(&item.value, out);
    }
}
