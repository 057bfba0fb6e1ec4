//! The relational operator pipeline.
//!
//! A SELECT flows load → join → where → group-by → having → select →
//! order-by → offset/limit → fix, every stage mutating one [`View`].
//! Record-independent stages (WHERE filtering, computed projections, the
//! inner-join probe) shard across the range scheduler when the expression
//! is free of environment writes; everything else runs serially.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use crate::error::{Error, ErrorKind, Position, Result};
use crate::executor::exec_expr::{
    collect_analytic_calls, evaluate, evaluate_ternary, is_parallel_safe,
};
use crate::executor::join::{self, ParsedJoinCondition};
use crate::executor::parallel::RangeScheduler;
use crate::executor::scope::{Environment, FilterRecord};
use crate::executor::view::{
    Cell, FieldLookup, Header, HeaderField, SortValue, View,
};
use crate::executor::window;
use crate::parser::ast::{
    Expr, Field, FromClause, Join, JoinType, LimitClause, NullPosition, OffsetClause,
    OrderByClause, SelectClause, SelectEntity, SelectQuery, SelectSet, SetOperator,
    SortDirection, TableExpr, TableSource,
};
use crate::storage::value::{Ternary, Value};
use crate::storage::{source, view_cache};
use crate::utils::adt::cast::{to_float, to_integer};
use crate::utils::adt::comparison::identity_key;

/// Execute a SELECT query to a fixed result view.
pub fn execute_select(
    query: &SelectQuery,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<View> {
    env.push_scope();
    let result = execute_select_scoped(query, env, outer);
    env.pop_scope();
    result
}

fn execute_select_scoped(
    query: &SelectQuery,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<View> {
    for decl in &query.with {
        let mut inline = execute_select(&decl.query, env, outer)?;
        if !decl.columns.is_empty() {
            if decl.columns.len() != inline.field_len() {
                return Err(Error::new(
                    decl.pos,
                    ErrorKind::SelectFieldLength(decl.columns.len()),
                ));
            }
            for (field, column) in inline.header.iter_mut().zip(&decl.columns) {
                field.column = column.literal.clone();
                field.aliases.clear();
            }
        }
        inline.header.update_view_name(&decl.name.literal);
        env.set_inline_table(&decl.name.literal, inline, decl.name.pos)?;
    }

    let mut view = execute_entity(&query.entity, env, outer)?;

    if let Some(order_by) = &query.order_by {
        self::order_by(&mut view, order_by, env, outer)?;
    }
    if let Some(offset) = &query.offset {
        self::offset(&mut view, offset, env, outer)?;
    }
    if let Some(limit) = &query.limit {
        self::limit(&mut view, limit, env, outer)?;
    }
    view.fix();
    Ok(view)
}

fn execute_entity(
    entity: &SelectEntity,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<View> {
    match entity {
        SelectEntity::Select(set) => execute_select_set(set, env, outer),
        SelectEntity::SetOperation {
            lhs,
            rhs,
            operator,
            all,
            ..
        } => {
            let mut left = execute_entity(lhs, env, outer)?;
            left.fix();
            let mut right = execute_entity(rhs, env, outer)?;
            right.fix();
            match operator {
                SetOperator::Union => left.union(right, *all)?,
                SetOperator::Except => left.except(right, *all)?,
                SetOperator::Intersect => left.intersect(right, *all)?,
            }
            Ok(left)
        }
    }
}

fn execute_select_set(
    set: &SelectSet,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<View> {
    let mut view = load_from(set.from.as_ref(), env, outer)?;
    if let Some(condition) = &set.where_clause {
        where_(&mut view, condition, env, outer)?;
    }
    if !set.group_by.is_empty() {
        group_by(&mut view, &set.group_by, env, outer)?;
    }
    if let Some(condition) = &set.having {
        having(&mut view, condition, env, outer)?;
    }
    select(&mut view, &set.select, env, outer)?;
    Ok(view)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Compose the FROM clause into a single view. An absent clause loads the
/// one-record DUAL relation; multiple tables fold into a cross join.
pub fn load_from(
    from: Option<&FromClause>,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<View> {
    let Some(from) = from else {
        return Ok(View::dual());
    };
    let mut tables = from.tables.iter();
    let first = tables
        .next()
        .ok_or_else(|| Error::new(from.pos, ErrorKind::Syntax("empty from clause".to_string())))?;
    let mut view = load_table_expr(first, env, outer, false)?;
    for table in tables {
        let right = load_table_expr(table, env, outer, false)?;
        view = join::cross_join(view, right);
    }
    Ok(view)
}

/// Load one table expression and register its alias. `with_ids`
/// materialises internal-id columns on identifier leaves, which DML
/// needs to track rows through joins and filters.
pub fn load_table_expr(
    table: &TableExpr,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
    with_ids: bool,
) -> Result<View> {
    match &table.source {
        TableSource::Identifier(ident) => {
            let alias = table
                .alias
                .as_ref()
                .map(|a| a.literal.clone());
            load_identifier(ident, alias, env, with_ids)
        }
        TableSource::Stdin { pos } => {
            let view = match env.cached_stdin_view() {
                Some(view) => view,
                None => {
                    let table = source::load_stdin(env.stdin_bytes.as_deref(), &env.flags)
                        .map_err(|e| Error::new(*pos, e.kind))?;
                    let columns: Vec<&str> =
                        table.columns.iter().map(String::as_str).collect();
                    let mut view = View::new(
                        Header::new("STDIN", &columns),
                        table
                            .records
                            .into_iter()
                            .map(crate::executor::view::new_record)
                            .collect(),
                    );
                    view.file_info = Some(table.file_info);
                    env.cache_stdin_view(view.clone());
                    view
                }
            };
            let name = table
                .alias
                .as_ref()
                .map(|a| a.literal.clone())
                .unwrap_or_else(|| "STDIN".to_string());
            let mut view = view;
            view.header.update_view_name(&name);
            let alias_pos = table.alias.as_ref().map(|a| a.pos).unwrap_or(*pos);
            env.add_alias(&name, "STDIN", alias_pos)?;
            Ok(view)
        }
        TableSource::Dual { .. } => Ok(View::dual()),
        TableSource::Subquery(subquery) => {
            let mut view = execute_select(&subquery.query, env, outer)?;
            if let Some(alias) = &table.alias {
                view.header.update_view_name(&alias.literal);
                env.add_alias(&alias.literal, "", alias.pos)?;
            }
            Ok(view)
        }
        TableSource::Parenthesized(inner) => {
            let inner = TableExpr {
                source: inner.source.clone(),
                alias: table.alias.clone().or_else(|| inner.alias.clone()),
            };
            load_table_expr(&inner, env, outer, with_ids)
        }
        TableSource::Join(join) => load_join(join, env, outer, with_ids),
    }
}

fn load_identifier(
    ident: &crate::parser::ast::Identifier,
    alias: Option<String>,
    env: &mut Environment,
    with_ids: bool,
) -> Result<View> {
    let name = &ident.literal;

    if let Some(mut view) = env.get_inline_table(name) {
        let display = alias.clone().unwrap_or_else(|| name.clone());
        view.header.update_view_name(&display);
        env.add_alias(&display, "", ident.pos)?;
        return Ok(view);
    }

    if let Some(mut view) = env.get_temp_view(name) {
        let display = alias.clone().unwrap_or_else(|| name.clone());
        view.header.update_view_name(&display);
        if with_ids {
            view.materialize_internal_ids();
        }
        env.add_alias(&display, &name.to_uppercase(), ident.pos)?;
        return Ok(view);
    }

    let Some(path) = source::resolve_path(name, &env.flags) else {
        return Err(Error::new(ident.pos, ErrorKind::FileNotExist(name.clone())));
    };
    let key = view_cache::cache_key(&path.to_string_lossy());
    let mut view = cached_file_view(&key, &path, &env.flags)
        .map_err(|e| Error::new(ident.pos, e.kind))?;

    let display = alias.unwrap_or_else(|| source::table_name_of(&path));
    view.header.update_view_name(&display);
    if with_ids {
        view.materialize_internal_ids();
    }
    env.add_alias(&display, &key, ident.pos)?;
    Ok(view)
}

/// Fetch a file-backed view through the process-wide cache, loading it
/// on a miss. Concurrent misses on one path coalesce into a single load.
pub fn cached_file_view(
    key: &str,
    path: &std::path::Path,
    flags: &crate::config::Flags,
) -> Result<View> {
    view_cache::get_or_load(key, || {
        let table = source::load_file(path, flags)?;
        let columns: Vec<&str> = table.columns.iter().map(String::as_str).collect();
        let mut view = View::new(
            Header::new(&source::table_name_of(path), &columns),
            table
                .records
                .into_iter()
                .map(crate::executor::view::new_record)
                .collect(),
        );
        view.file_info = Some(table.file_info);
        Ok(view)
    })
}

fn load_join(
    join_expr: &Join,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
    with_ids: bool,
) -> Result<View> {
    let left = load_table_expr(&join_expr.table, env, outer, with_ids)?;
    let right = load_table_expr(&join_expr.join_table, env, outer, with_ids)?;

    let ParsedJoinCondition {
        condition,
        include_fields,
        exclude_fields,
    } = join::parse_join_condition(join_expr, &left, &right)?;

    let mut view = match join_expr.join_type {
        JoinType::Cross => join::cross_join(left, right),
        JoinType::Inner => join::inner_join(left, right, condition.as_ref(), env, outer)?,
        JoinType::Outer => {
            let direction = join_expr
                .direction
                .unwrap_or(crate::parser::ast::JoinDirection::Left);
            join::outer_join(left, right, condition.as_ref(), direction, env, outer)?
        }
    };

    if !include_fields.is_empty() {
        join::merge_join_columns(&mut view, &include_fields, &exclude_fields)?;
    }
    Ok(view)
}

// ---------------------------------------------------------------------------
// Record-sharded evaluation
// ---------------------------------------------------------------------------

/// Evaluate a per-record closure over every record, sharding across the
/// scheduler when the workload is parallel-safe. Workers run against
/// read-only environment snapshots; the serial path keeps the live
/// environment so variable writes accumulate.
pub fn eval_over_records<T, F>(
    total: usize,
    env: &mut Environment,
    parallel_ok: bool,
    f: F,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&mut Environment, usize) -> Result<T> + Sync,
{
    let scheduler = RangeScheduler::new(total, env.flags.effective_cpu());
    if parallel_ok && scheduler.partitions() > 1 {
        let snapshot = env.clone();
        scheduler.scatter(|_, range| {
            let mut worker_env = snapshot.clone();
            let mut out = Vec::with_capacity(range.len());
            for idx in range {
                out.push(f(&mut worker_env, idx)?);
            }
            Ok(out)
        })
    } else {
        let mut out = Vec::with_capacity(total);
        for idx in 0..total {
            out.push(f(env, idx)?);
        }
        Ok(out)
    }
}

fn stack_for<'v>(
    view: &'v View,
    record_index: usize,
    outer: &[FilterRecord<'v>],
) -> Vec<FilterRecord<'v>> {
    let mut stack = Vec::with_capacity(outer.len() + 1);
    stack.push(FilterRecord { view, record_index });
    stack.extend_from_slice(outer);
    stack
}

// ---------------------------------------------------------------------------
// Where / Having
// ---------------------------------------------------------------------------

/// Keep the records for which the predicate evaluates to TRUE.
pub fn where_(
    view: &mut View,
    condition: &Expr,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<()> {
    let keep = {
        let frozen: &View = view;
        eval_over_records(
            frozen.record_len(),
            env,
            is_parallel_safe(condition),
            |worker_env, idx| {
                let stack = stack_for(frozen, idx, outer);
                Ok(evaluate_ternary(condition, worker_env, &stack)? == Ternary::True)
            },
        )?
    };
    let mut kept = Vec::with_capacity(view.record_len());
    for (record, keep) in std::mem::take(&mut view.record_set).into_iter().zip(keep) {
        if keep {
            kept.push(record);
        }
    }
    view.record_set = kept;
    Ok(())
}

/// HAVING filters grouped records; an ungrouped view is first promoted to
/// a single all-rows group so aggregates are meaningful.
pub fn having(
    view: &mut View,
    condition: &Expr,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<()> {
    if !view.is_grouped {
        group_by(view, &[], env, outer)?;
    }
    where_(view, condition, env, outer)
}

// ---------------------------------------------------------------------------
// Group by
// ---------------------------------------------------------------------------

/// Collapse records with equal key tuples into group records. Null keys
/// group together. An empty key list forms a single all-rows group.
pub fn group_by(
    view: &mut View,
    keys: &[Expr],
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<()> {
    let key_values = {
        let frozen: &View = view;
        let parallel_ok = keys.iter().all(is_parallel_safe);
        eval_over_records(frozen.record_len(), env, parallel_ok, |worker_env, idx| {
            let stack = stack_for(frozen, idx, outer);
            let mut values = Vec::with_capacity(keys.len());
            for key in keys {
                values.push(evaluate(key, worker_env, &stack)?);
            }
            Ok(identity_key(&values))
        })?
    };

    // Bucket record indexes by key, preserving first-appearance order.
    let mut order: Vec<String> = Vec::new();
    let mut buckets: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for (idx, key) in key_values.into_iter().enumerate() {
        buckets
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(idx);
    }

    let field_len = view.field_len();
    let mut grouped = Vec::with_capacity(order.len());
    for key in &order {
        let members = &buckets[key];
        let mut record = Vec::with_capacity(field_len);
        for column in 0..field_len {
            let values = members
                .iter()
                .map(|&member| view.record_set[member][column].value().clone())
                .collect();
            record.push(Cell::Group(values));
        }
        grouped.push(record);
    }

    view.record_set = grouped;
    view.is_grouped = true;

    for key in keys {
        let resolved = match key {
            Expr::FieldReference { view: qualifier, column, .. } => view
                .header
                .search_index(qualifier.as_ref().map(|q| q.literal.as_str()), &column.literal)
                .ok(),
            Expr::ColumnNumber { view: qualifier, number, .. } => {
                view.header.search_number(&qualifier.literal, *number).ok()
            }
            _ => None,
        };
        if let Some(idx) = resolved {
            view.header[idx].is_group_key = true;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Select
// ---------------------------------------------------------------------------

fn expand_fields(view: &View, clause: &SelectClause) -> Result<Vec<Field>> {
    let mut fields = Vec::with_capacity(clause.fields.len());
    for field in &clause.fields {
        match &field.object {
            Expr::AllColumns { view: None, .. } => {
                for header_field in view.header.iter() {
                    if !header_field.is_from_table || header_field.is_internal_id() {
                        continue;
                    }
                    fields.push(Field::new(make_reference(header_field)));
                }
            }
            Expr::AllColumns {
                view: Some(qualifier),
                pos,
            } => {
                let mut matched = false;
                for header_field in view.header.iter() {
                    if !header_field.is_from_table
                        || header_field.is_internal_id()
                        || !header_field.view.eq_ignore_ascii_case(&qualifier.literal)
                    {
                        continue;
                    }
                    matched = true;
                    fields.push(Field::new(make_reference(header_field)));
                }
                if !matched {
                    return Err(Error::new(
                        *pos,
                        ErrorKind::FieldNotExist(format!("{}.*", qualifier.literal)),
                    ));
                }
            }
            _ => fields.push(field.clone()),
        }
    }
    Ok(fields)
}

fn make_reference(field: &HeaderField) -> Expr {
    if field.view.is_empty() {
        Expr::field(&field.column)
    } else {
        Expr::qualified_field(&field.view, &field.column)
    }
}

/// Append one analytic result column per distinct call label.
fn extend_analytic_columns(
    view: &mut View,
    exprs: &[&Expr],
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<()> {
    for expr in exprs {
        let Expr::AnalyticFunction {
            name,
            args,
            distinct,
            clause,
            pos,
        } = expr
        else {
            continue;
        };
        let label = expr.to_string();
        if view.header.iter().any(|f| f.column == label) {
            continue;
        }
        let values = {
            let frozen: &View = view;
            window::evaluate_analytic(name, args, *distinct, clause, *pos, frozen, env, outer)?
        };
        view.header.push(HeaderField {
            column: label,
            ..HeaderField::default()
        });
        for (record, value) in view.record_set.iter_mut().zip(values) {
            record.push(Cell::Single(value));
        }
    }
    Ok(())
}

/// Project the select list: expand wildcards, extend analytic columns,
/// promote to a single group when a bare aggregate appears over an
/// ungrouped view, compute output columns, and apply DISTINCT.
pub fn select(
    view: &mut View,
    clause: &SelectClause,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<()> {
    let fields = expand_fields(view, clause)?;

    let mut analytic_calls = Vec::new();
    for field in &fields {
        collect_analytic_calls(&field.object, &mut analytic_calls);
    }
    extend_analytic_columns(view, &analytic_calls, env, outer)?;

    if !view.is_grouped
        && fields
            .iter()
            .any(|field| crate::executor::exec_expr::has_aggregate_call(&field.object, env))
    {
        group_by(view, &[], env, outer)?;
    }

    let mut select_fields = Vec::with_capacity(fields.len());
    for field in &fields {
        let direct = match &field.object {
            Expr::FieldReference {
                view: qualifier,
                column,
                pos,
            } => {
                let label = field.object.to_string();
                match view
                    .header
                    .search_index(qualifier.as_ref().map(|q| q.literal.as_str()), &column.literal)
                {
                    Ok(idx) => Some((idx, label)),
                    Err(FieldLookup::Ambiguous) => {
                        return Err(FieldLookup::Ambiguous.into_error(&label, *pos))
                    }
                    Err(FieldLookup::NotExist) => None,
                }
            }
            Expr::ColumnNumber { view: qualifier, number, pos } => {
                let label = field.object.to_string();
                match view.header.search_number(&qualifier.literal, *number) {
                    Ok(idx) => Some((idx, label)),
                    Err(_) => {
                        return Err(FieldLookup::NotExist.into_error(&label, *pos));
                    }
                }
            }
            Expr::AnalyticFunction { .. } => {
                let label = field.object.to_string();
                view.header
                    .iter()
                    .position(|f| f.column == label)
                    .map(|idx| (idx, label))
            }
            _ => None,
        };

        match direct {
            Some((idx, label)) => {
                // Resolving a non-key under a grouped view is the same
                // error the evaluator would raise.
                if view.is_grouped
                    && !view.header[idx].is_group_key
                    && view
                        .record_set
                        .first()
                        .map(|record| matches!(record[idx], Cell::Group(_)))
                        .unwrap_or(false)
                {
                    return Err(Error::new(
                        field.object.position(),
                        ErrorKind::FieldNotGroupKey(label),
                    ));
                }
                if let Some(alias) = &field.alias {
                    let aliases = &mut view.header[idx].aliases;
                    if !aliases.iter().any(|a| a.eq_ignore_ascii_case(&alias.literal)) {
                        aliases.push(alias.literal.clone());
                    }
                }
                select_fields.push(idx);
            }
            None => {
                let values = {
                    let frozen: &View = view;
                    eval_over_records(
                        frozen.record_len(),
                        env,
                        is_parallel_safe(&field.object),
                        |worker_env, idx| {
                            let stack = stack_for(frozen, idx, outer);
                            evaluate(&field.object, worker_env, &stack)
                        },
                    )?
                };
                let mut header_field = HeaderField {
                    column: field.object.to_string(),
                    ..HeaderField::default()
                };
                if let Some(alias) = &field.alias {
                    header_field.aliases.push(alias.literal.clone());
                }
                view.header.push(header_field);
                for (record, value) in view.record_set.iter_mut().zip(values) {
                    record.push(Cell::Single(value));
                }
                select_fields.push(view.field_len() - 1);
            }
        }
    }

    view.select_fields = select_fields;

    if clause.distinct {
        let select = view.select_fields.clone();
        let mut seen = rustc_hash::FxHashSet::default();
        view.record_set.retain(|record| {
            let values: Vec<Value> = select
                .iter()
                .map(|idx| record[*idx].value().clone())
                .collect();
            seen.insert(identity_key(&values))
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Order by
// ---------------------------------------------------------------------------

pub fn compare_sort_keys(
    lhs: &[SortValue],
    rhs: &[SortValue],
    directions: &[(Option<SortDirection>, Option<NullPosition>)],
) -> Ordering {
    for (i, (a, b)) in lhs.iter().zip(rhs.iter()).enumerate() {
        let (direction, nulls) = directions
            .get(i)
            .copied()
            .unwrap_or((None, None));
        let descending = direction == Some(SortDirection::Descending);
        let nulls_first = match nulls {
            Some(NullPosition::First) => true,
            Some(NullPosition::Last) => false,
            // NULLS FIRST for ascending order, NULLS LAST for descending.
            None => !descending,
        };

        let ord = match (a, b) {
            (SortValue::Null, SortValue::Null) => Ordering::Equal,
            (SortValue::Null, _) => {
                if nulls_first {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (_, SortValue::Null) => {
                if nulls_first {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (a, b) => {
                let base = a.base_cmp(b);
                if descending {
                    base.reverse()
                } else {
                    base
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable sort by the order items. Sort keys are computed once per record
/// and cached on the view for LIMIT WITH TIES.
pub fn order_by(
    view: &mut View,
    clause: &OrderByClause,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<()> {
    let mut analytic_calls = Vec::new();
    for item in &clause.items {
        collect_analytic_calls(&item.value, &mut analytic_calls);
    }
    extend_analytic_columns(view, &analytic_calls, env, outer)?;

    // Positional items resolve against the select list.
    let effective: Vec<usize> = if view.select_fields.is_empty() {
        view.header
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_internal_id())
            .map(|(i, _)| i)
            .collect()
    } else {
        view.select_fields.clone()
    };

    enum SortSource<'a> {
        Column(usize),
        Expression(&'a Expr),
    }

    let mut sources = Vec::with_capacity(clause.items.len());
    for item in &clause.items {
        match &item.value {
            Expr::Literal {
                value: Value::Integer(n),
                pos,
            } => {
                if *n < 1 || effective.len() < *n as usize {
                    return Err(Error::new(*pos, ErrorKind::FieldNotExist(n.to_string())));
                }
                sources.push(SortSource::Column(effective[*n as usize - 1]));
            }
            expr => sources.push(SortSource::Expression(expr)),
        }
    }

    let keys = {
        let frozen: &View = view;
        let parallel_ok = clause.items.iter().all(|item| is_parallel_safe(&item.value));
        eval_over_records(frozen.record_len(), env, parallel_ok, |worker_env, idx| {
            let mut keys = Vec::with_capacity(sources.len());
            for source in &sources {
                let value = match source {
                    SortSource::Column(column) => {
                        frozen.record_set[idx][*column].value().clone()
                    }
                    SortSource::Expression(expr) => {
                        let stack = stack_for(frozen, idx, outer);
                        evaluate(expr, worker_env, &stack)?
                    }
                };
                keys.push(SortValue::from_value(&value));
            }
            Ok(keys)
        })?
    };

    let directions: Vec<_> = clause
        .items
        .iter()
        .map(|item| (item.direction, item.nulls))
        .collect();

    let mut order: Vec<usize> = (0..view.record_len()).collect();
    order.sort_by(|&a, &b| compare_sort_keys(&keys[a], &keys[b], &directions));

    let mut records = std::mem::take(&mut view.record_set);
    let mut sorted_records = Vec::with_capacity(records.len());
    let mut sorted_keys = Vec::with_capacity(records.len());
    for idx in &order {
        sorted_records.push(std::mem::take(&mut records[*idx]));
        sorted_keys.push(keys[*idx].clone());
    }
    view.record_set = sorted_records;
    view.sort_values = Some(sorted_keys);
    Ok(())
}

// ---------------------------------------------------------------------------
// Limit / Offset
// ---------------------------------------------------------------------------

pub fn limit(
    view: &mut View,
    clause: &LimitClause,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<()> {
    let value = evaluate(&clause.value, env, outer)?;
    let total = view.record_len();

    let mut keep = if clause.percent {
        let Value::Float(pct) = to_float(&value) else {
            return Err(Error::new(clause.pos, ErrorKind::LimitValueNotFloat));
        };
        if pct <= 0.0 {
            0
        } else if 100.0 <= pct {
            total
        } else {
            ((total as f64) * pct / 100.0).ceil() as usize
        }
    } else {
        let Value::Integer(n) = to_integer(&value) else {
            return Err(Error::new(clause.pos, ErrorKind::LimitValueNotInteger));
        };
        if n < 0 {
            0
        } else {
            (n as usize).min(total)
        }
    };

    if clause.with_ties && keep > 0 && keep < total {
        let Some(sort_values) = view.sort_values.as_ref() else {
            return Err(Error::new(
                clause.pos,
                ErrorKind::Syntax("limit with ties requires order by clause".to_string()),
            ));
        };
        let boundary = &sort_values[keep - 1];
        while keep < total && &sort_values[keep] == boundary {
            keep += 1;
        }
    }

    view.record_set.truncate(keep);
    if let Some(sort_values) = view.sort_values.as_mut() {
        sort_values.truncate(keep);
    }
    Ok(())
}

pub fn offset(
    view: &mut View,
    clause: &OffsetClause,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<()> {
    let value = evaluate(&clause.value, env, outer)?;
    let Value::Integer(n) = to_integer(&value) else {
        return Err(Error::new(clause.pos, ErrorKind::OffsetValueNotInteger));
    };
    let skip = if n < 0 { 0 } else { (n as usize).min(view.record_len()) };
    view.record_set.drain(..skip);
    if let Some(sort_values) = view.sort_values.as_mut() {
        sort_values.drain(..skip);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared helpers for DML (driven from the statement engine)
// ---------------------------------------------------------------------------

/// Evaluate the row expressions of an INSERT VALUES list.
pub fn evaluate_row_values(
    row: &crate::parser::ast::RowValue,
    expected: usize,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<Vec<Value>> {
    match row {
        crate::parser::ast::RowValue::ValueList { values, pos } => {
            if values.len() != expected {
                return Err(Error::new(*pos, ErrorKind::RowValueLength(expected)));
            }
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                out.push(evaluate(value, env, outer)?);
            }
            Ok(out)
        }
        crate::parser::ast::RowValue::Subquery(subquery) => {
            let result = execute_select(&subquery.query, env, outer)?;
            if result.field_len() != expected {
                return Err(Error::new(subquery.pos, ErrorKind::SelectFieldLength(expected)));
            }
            if result.record_len() != 1 {
                return Err(Error::new(subquery.pos, ErrorKind::SubqueryTooManyRecords));
            }
            Ok(result.record_set[0]
                .iter()
                .map(|cell| cell.value().clone())
                .collect())
        }
    }
}

/// Resolve a target field list against a view's header; an empty list
/// means every user column in order.
pub fn resolve_target_fields(
    view: &View,
    fields: &[Expr],
    pos: Position,
) -> Result<Vec<usize>> {
    if fields.is_empty() {
        return Ok(view
            .header
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_internal_id())
            .map(|(i, _)| i)
            .collect());
    }
    let mut indexes = Vec::with_capacity(fields.len());
    for field in fields {
        let Expr::FieldReference {
            view: qualifier,
            column,
            pos: field_pos,
        } = field
        else {
            return Err(Error::new(pos, ErrorKind::Syntax("invalid field reference".to_string())));
        };
        let label = field.to_string();
        let idx = view
            .header
            .search_index(qualifier.as_ref().map(|q| q.literal.as_str()), &column.literal)
            .map_err(|lookup| lookup.into_error(&label, *field_pos))?;
        indexes.push(idx);
    }
    Ok(indexes)
}
