//! The statement driver.
//!
//! A [`Session`] executes parsed statements against one environment:
//! SELECT queries and DML, variable and cursor statements, temporary
//! views, user-defined functions with procedural bodies, and transaction
//! control. DML tracks rows by internal id through joins and filters and
//! writes the mutated view back to the cache (files) or scope (temporary
//! views); on-disk persistence belongs to the out-of-scope CLI layer.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use crate::config::Flags;
use crate::error::{Error, ErrorKind, Position, Result};
use crate::executor::exec_main::{
    evaluate_row_values, execute_select, load_table_expr, resolve_target_fields, where_,
};
use crate::executor::exec_expr::evaluate;
use crate::executor::scope::{Cursor, Environment, FilterRecord, UserDefinedFunction};
use crate::executor::view::{new_record, Cell, FileInfo, Header, View};
use crate::parser::ast::{
    DeleteQuery, Expr, FlowControlKind, InsertQuery, InsertSource, Statement, TableExpr,
    TableSource, TransactionKind, UpdateQuery,
};
use crate::storage::value::{Ternary, Value};
use crate::storage::{source, view_cache};
use crate::utils::adt::cast::ternary_of;

/// The outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Materialised rows for queries; `None` for statements.
    pub view: Option<View>,
    pub command_tag: String,
    pub operated_records: usize,
}

impl QueryResult {
    fn tagged(tag: &str) -> QueryResult {
        QueryResult {
            view: None,
            command_tag: tag.to_string(),
            operated_records: 0,
        }
    }
}

/// Procedural control flow raised by statements inside function bodies
/// and loops.
#[derive(Debug, Clone, PartialEq)]
enum Flow {
    Normal,
    Continue,
    Break,
    Return(Value),
}

pub struct Session {
    env: Environment,
}

impl Session {
    pub fn new(flags: Flags) -> Session {
        Session {
            env: Environment::new(flags),
        }
    }

    /// Hand the session the bytes standing in for its stdin stream.
    pub fn set_stdin(&mut self, bytes: Vec<u8>) {
        self.env.stdin_bytes = Some(bytes);
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Execute a statement list, collecting one result per query or DML
    /// statement. A top-level RETURN ends execution; loose CONTINUE or
    /// BREAK is a syntax error.
    pub fn execute(&mut self, statements: &[Statement]) -> Result<Vec<QueryResult>> {
        let mut results = Vec::new();
        for statement in statements {
            match execute_statement(statement, &mut self.env, &mut results)? {
                Flow::Normal => {}
                Flow::Return(_) => break,
                Flow::Continue | Flow::Break => {
                    return Err(Error::unplaced(ErrorKind::Syntax(
                        "continue or break is used outside of loop".to_string(),
                    )))
                }
            }
        }
        Ok(results)
    }
}

fn execute_statements(
    statements: &[Statement],
    env: &mut Environment,
    results: &mut Vec<QueryResult>,
) -> Result<Flow> {
    for statement in statements {
        match execute_statement(statement, env, results)? {
            Flow::Normal => {}
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

fn execute_statement(
    statement: &Statement,
    env: &mut Environment,
    results: &mut Vec<QueryResult>,
) -> Result<Flow> {
    match statement {
        Statement::SelectQuery(query) => {
            let view = execute_select(query, env, &[])?;
            results.push(QueryResult {
                view: Some(view),
                command_tag: "SELECT".to_string(),
                operated_records: 0,
            });
            Ok(Flow::Normal)
        }
        Statement::Insert(query) => {
            let affected = execute_insert(query, env)?;
            results.push(QueryResult {
                view: None,
                command_tag: "INSERT".to_string(),
                operated_records: affected,
            });
            Ok(Flow::Normal)
        }
        Statement::Update(query) => {
            let affected = execute_update(query, env)?;
            results.push(QueryResult {
                view: None,
                command_tag: "UPDATE".to_string(),
                operated_records: affected,
            });
            Ok(Flow::Normal)
        }
        Statement::Delete(query) => {
            let affected = execute_delete(query, env)?;
            results.push(QueryResult {
                view: None,
                command_tag: "DELETE".to_string(),
                operated_records: affected,
            });
            Ok(Flow::Normal)
        }
        Statement::VariableDeclaration { assignments, pos } => {
            for assignment in assignments {
                let value = match &assignment.value {
                    Some(expr) => evaluate(expr, env, &[])?,
                    None => Value::Null,
                };
                env.declare_variable(&assignment.variable, value, *pos)?;
            }
            Ok(Flow::Normal)
        }
        Statement::SetVariable {
            variable,
            value,
            pos,
        } => {
            let value = evaluate(value, env, &[])?;
            env.set_variable(variable, value, *pos)?;
            Ok(Flow::Normal)
        }
        Statement::CursorDeclaration { cursor, query, pos } => {
            env.declare_cursor(&cursor.literal, Cursor::declared(query.clone()), *pos)?;
            Ok(Flow::Normal)
        }
        Statement::OpenCursor { cursor, pos } => {
            let name = cursor.literal.clone();
            let already_open =
                env.with_cursor(&name, *pos, |cursor| Ok(cursor.is_open()))?;
            if already_open {
                return Err(Error::new(*pos, ErrorKind::CursorOpen(name)));
            }
            let query = env
                .cursor_query(&name, *pos)?
                .ok_or_else(|| Error::new(*pos, ErrorKind::CursorOpen(name.clone())))?;
            let view = execute_select(&query, env, &[])?;
            env.with_cursor(&name, *pos, |cursor| {
                cursor.open_with(view);
                Ok(())
            })?;
            Ok(Flow::Normal)
        }
        Statement::CloseCursor { cursor, pos } => {
            env.with_cursor(&cursor.literal, *pos, |cursor| {
                cursor.close();
                Ok(())
            })?;
            Ok(Flow::Normal)
        }
        Statement::FetchCursor {
            cursor,
            position,
            variables,
            pos,
        } => {
            let name = cursor.literal.clone();
            let fetched = env.with_cursor(&name, *pos, |cursor| {
                if !cursor.is_open() {
                    return Err(Error::new(*pos, ErrorKind::CursorClosed(name.clone())));
                }
                Ok(cursor.fetch(*position))
            })?;
            for (i, variable) in variables.iter().enumerate() {
                let value = fetched
                    .as_ref()
                    .and_then(|values| values.get(i).cloned())
                    .unwrap_or(Value::Null);
                env.set_variable(variable, value, *pos)?;
            }
            Ok(Flow::Normal)
        }
        Statement::DisposeCursor { cursor, pos } => {
            env.dispose_cursor(&cursor.literal, *pos)?;
            Ok(Flow::Normal)
        }
        Statement::ViewDeclaration {
            view,
            columns,
            query,
            pos,
        } => {
            let mut declared = match query {
                Some(query) => {
                    let mut result = execute_select(query, env, &[])?;
                    if !columns.is_empty() {
                        if columns.len() != result.field_len() {
                            return Err(Error::new(
                                *pos,
                                ErrorKind::SelectFieldLength(columns.len()),
                            ));
                        }
                        for (field, column) in result.header.iter_mut().zip(columns) {
                            field.column = column.literal.clone();
                            field.aliases.clear();
                        }
                    }
                    result
                }
                None => {
                    let names: Vec<&str> =
                        columns.iter().map(|c| c.literal.as_str()).collect();
                    View::new(Header::new(&view.literal, &names), Vec::new())
                }
            };
            declared.header.update_view_name(&view.literal);
            declared.file_info = Some(FileInfo::temporary(&view.literal));
            env.declare_temp_view(&view.literal, declared, *pos)?;
            Ok(Flow::Normal)
        }
        Statement::DisposeView { view, pos } => {
            env.dispose_temp_view(&view.literal, *pos)?;
            Ok(Flow::Normal)
        }
        Statement::FunctionDeclaration {
            name,
            parameters,
            statements,
            pos,
        } => {
            let function = UserDefinedFunction {
                name: name.clone(),
                is_aggregate: false,
                cursor: None,
                parameters: parameters.clone(),
                required_args: parameters
                    .iter()
                    .take_while(|p| p.default.is_none())
                    .count(),
                statements: statements.clone(),
            };
            env.declare_function(function, *pos)?;
            Ok(Flow::Normal)
        }
        Statement::AggregateDeclaration {
            name,
            cursor,
            parameters,
            statements,
            pos,
        } => {
            let function = UserDefinedFunction {
                name: name.clone(),
                is_aggregate: true,
                cursor: Some(cursor.clone()),
                parameters: parameters.clone(),
                required_args: parameters
                    .iter()
                    .take_while(|p| p.default.is_none())
                    .count(),
                statements: statements.clone(),
            };
            env.declare_function(function, *pos)?;
            Ok(Flow::Normal)
        }
        Statement::DisposeFunction { name, pos } => {
            env.dispose_function(&name.literal, *pos)?;
            Ok(Flow::Normal)
        }
        Statement::If {
            condition,
            statements,
            else_if,
            else_statements,
            ..
        } => {
            if ternary_of(&evaluate(condition, env, &[])?) == Ternary::True {
                return execute_statements(statements, env, results);
            }
            for branch in else_if {
                if ternary_of(&evaluate(&branch.condition, env, &[])?) == Ternary::True {
                    return execute_statements(&branch.statements, env, results);
                }
            }
            execute_statements(else_statements, env, results)
        }
        Statement::While {
            condition,
            statements,
            ..
        } => {
            loop {
                if ternary_of(&evaluate(condition, env, &[])?) != Ternary::True {
                    break;
                }
                match execute_statements(statements, env, results)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                }
            }
            Ok(Flow::Normal)
        }
        Statement::WhileInCursor {
            variables,
            cursor,
            statements,
            pos,
        } => {
            loop {
                let name = cursor.literal.clone();
                let fetched = env.with_cursor(&name, *pos, |cursor| {
                    if !cursor.is_open() {
                        return Err(Error::new(*pos, ErrorKind::CursorClosed(name.clone())));
                    }
                    Ok(cursor.fetch(crate::parser::ast::FetchPosition::Next))
                })?;
                let Some(values) = fetched else {
                    break;
                };
                for (i, variable) in variables.iter().enumerate() {
                    let value = values.get(i).cloned().unwrap_or(Value::Null);
                    env.set_variable(variable, value, *pos)?;
                }
                match execute_statements(statements, env, results)? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                }
            }
            Ok(Flow::Normal)
        }
        Statement::FlowControl { kind, .. } => Ok(match kind {
            FlowControlKind::Continue => Flow::Continue,
            FlowControlKind::Break => Flow::Break,
        }),
        Statement::Return { value, .. } => {
            let value = match value {
                Some(expr) => evaluate(expr, env, &[])?,
                None => Value::Null,
            };
            Ok(Flow::Return(value))
        }
        Statement::TransactionControl { kind, .. } => {
            match kind {
                TransactionKind::Commit => {
                    env.store_temp_views();
                    if !env.flags.quiet {
                        info!("commit");
                    }
                    results.push(QueryResult::tagged("COMMIT"));
                }
                TransactionKind::Rollback => {
                    env.restore_temp_views();
                    view_cache::clean();
                    if !env.flags.quiet {
                        info!("rollback");
                    }
                    results.push(QueryResult::tagged("ROLLBACK"));
                }
            }
            Ok(Flow::Normal)
        }
    }
}

// ---------------------------------------------------------------------------
// DML
// ---------------------------------------------------------------------------

/// Where a DML target's authoritative copy lives.
#[derive(Debug, Clone, PartialEq)]
enum DmlStorage {
    TempView(String),
    File {
        key: String,
        path: std::path::PathBuf,
    },
}

fn resolve_dml_storage(name: &str, env: &Environment, pos: Position) -> Result<DmlStorage> {
    if env.get_inline_table(name).is_some() {
        return Err(Error::new(
            pos,
            ErrorKind::Syntax(format!("inline table {} cannot be updated", name)),
        ));
    }
    if env.temp_view_exists(name) {
        return Ok(DmlStorage::TempView(name.to_string()));
    }
    match source::resolve_path(name, &env.flags) {
        Some(path) => Ok(DmlStorage::File {
            key: view_cache::cache_key(&path.to_string_lossy()),
            path,
        }),
        None => Err(Error::new(pos, ErrorKind::FileNotExist(name.to_string()))),
    }
}

fn base_copy(storage: &DmlStorage, env: &Environment) -> Result<View> {
    match storage {
        DmlStorage::TempView(name) => env
            .get_temp_view(name)
            .ok_or_else(|| Error::unplaced(ErrorKind::TableNotLoaded(name.clone()))),
        DmlStorage::File { key, path } => {
            crate::executor::exec_main::cached_file_view(key, path, &env.flags)
        }
    }
}

fn write_back(storage: &DmlStorage, view: View, env: &mut Environment) -> Result<()> {
    match storage {
        DmlStorage::TempView(name) => env.replace_temp_view(name, view),
        DmlStorage::File { key, .. } => {
            view_cache::replace(key, view);
            Ok(())
        }
    }
}

fn execute_insert(query: &InsertQuery, env: &mut Environment) -> Result<usize> {
    env.push_scope();
    let result = insert_scoped(query, env);
    env.pop_scope();
    result
}

fn insert_scoped(query: &InsertQuery, env: &mut Environment) -> Result<usize> {
    for decl in &query.with {
        let mut inline = execute_select(&decl.query, env, &[])?;
        inline.header.update_view_name(&decl.name.literal);
        env.set_inline_table(&decl.name.literal, inline, decl.name.pos)?;
    }

    let storage = resolve_dml_storage(&query.table.literal, env, query.table.pos)?;
    let mut base = base_copy(&storage, env)?;
    let targets = resolve_target_fields(&base, &query.fields, query.pos)?;

    let rows: Vec<Vec<Value>> = match &query.source {
        InsertSource::Values(rows) => {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                out.push(evaluate_row_values(row, targets.len(), env, &[])?);
            }
            out
        }
        InsertSource::Query(select) => {
            let result = execute_select(select, env, &[])?;
            if result.field_len() != targets.len() {
                return Err(Error::new(
                    query.pos,
                    ErrorKind::SelectFieldLength(targets.len()),
                ));
            }
            result
                .record_set
                .iter()
                .map(|record| record.iter().map(|cell| cell.value().clone()).collect())
                .collect()
        }
    };

    let width = base.field_len();
    let affected = rows.len();
    for row in rows {
        let mut record = new_record(vec![Value::Null; width]);
        for (value, &target) in row.into_iter().zip(&targets) {
            record[target] = Cell::Single(value);
        }
        base.record_set.push(record);
    }
    base.operated_records = affected;

    write_back(&storage, base, env)?;
    Ok(affected)
}

/// Load the DML working view: the target tables (ids materialised on
/// every identifier leaf) folded by cross join.
fn load_dml_view(
    tables: &[TableExpr],
    env: &mut Environment,
    pos: Position,
) -> Result<View> {
    let mut iter = tables.iter();
    let first = iter
        .next()
        .ok_or_else(|| Error::new(pos, ErrorKind::Syntax("missing update table".to_string())))?;
    let mut view = load_table_expr(first, env, &[], true)?;
    for table in iter {
        let right = load_table_expr(table, env, &[], true)?;
        view = crate::executor::join::cross_join(view, right);
    }
    Ok(view)
}

/// The table names an UPDATE / DELETE may write to: every identifier
/// (or aliased identifier) reachable in the target expressions.
fn collect_target_names(tables: &[TableExpr], out: &mut Vec<String>) {
    for table in tables {
        collect_target_names_one(table, out);
    }
}

fn collect_target_names_one(table: &TableExpr, out: &mut Vec<String>) {
    match &table.source {
        TableSource::Identifier(ident) => {
            let name = table
                .alias
                .as_ref()
                .map(|a| a.literal.clone())
                .unwrap_or_else(|| {
                    source::resolve_display_name(&ident.literal)
                });
            out.push(name);
        }
        TableSource::Join(join) => {
            collect_target_names_one(&join.table, out);
            collect_target_names_one(&join.join_table, out);
        }
        TableSource::Parenthesized(inner) => collect_target_names_one(inner, out),
        _ => {}
    }
}

/// Map each updatable view name to its storage, resolved through the
/// original identifier (aliases registered during the load).
fn storage_by_view_name(
    tables: &[TableExpr],
    env: &Environment,
) -> Result<FxHashMap<String, DmlStorage>> {
    let mut map = FxHashMap::default();
    collect_storage(tables, env, &mut map)?;
    Ok(map)
}

fn collect_storage(
    tables: &[TableExpr],
    env: &Environment,
    map: &mut FxHashMap<String, DmlStorage>,
) -> Result<()> {
    for table in tables {
        collect_storage_one(table, env, map)?;
    }
    Ok(())
}

fn collect_storage_one(
    table: &TableExpr,
    env: &Environment,
    map: &mut FxHashMap<String, DmlStorage>,
) -> Result<()> {
    match &table.source {
        TableSource::Identifier(ident) => {
            let storage = resolve_dml_storage(&ident.literal, env, ident.pos)?;
            let display = table
                .alias
                .as_ref()
                .map(|a| a.literal.clone())
                .unwrap_or_else(|| source::resolve_display_name(&ident.literal));
            map.insert(display.to_uppercase(), storage);
        }
        TableSource::Join(join) => {
            collect_storage_one(&join.table, env, map)?;
            collect_storage_one(&join.join_table, env, map)?;
        }
        TableSource::Parenthesized(inner) => collect_storage_one(inner, env, map)?,
        _ => {}
    }
    Ok(())
}

fn execute_update(query: &UpdateQuery, env: &mut Environment) -> Result<usize> {
    env.push_scope();
    let result = update_scoped(query, env);
    env.pop_scope();
    result
}

fn update_scoped(query: &UpdateQuery, env: &mut Environment) -> Result<usize> {
    for decl in &query.with {
        let mut inline = execute_select(&decl.query, env, &[])?;
        inline.header.update_view_name(&decl.name.literal);
        env.set_inline_table(&decl.name.literal, inline, decl.name.pos)?;
    }

    let storages = storage_by_view_name(&query.tables, env)?;
    let mut view = load_dml_view(&query.tables, env, query.pos)?;
    if let Some(condition) = &query.where_clause {
        where_(&mut view, condition, env, &[])?;
    }

    // Resolve each SET target to (view name, base column index).
    struct SetTarget {
        view_name: String,
        joined_index: usize,
        base_column: usize,
    }
    let mut set_targets = Vec::with_capacity(query.set_list.len());
    for set in &query.set_list {
        let Expr::FieldReference {
            view: qualifier,
            column,
            pos,
        } = &set.field
        else {
            return Err(Error::new(
                query.pos,
                ErrorKind::Syntax("invalid update field".to_string()),
            ));
        };
        let label = set.field.to_string();
        let joined_index = view
            .header
            .search_index(qualifier.as_ref().map(|q| q.literal.as_str()), &column.literal)
            .map_err(|lookup| lookup.into_error(&label, *pos))?;
        let field = &view.header[joined_index];
        if !storages.contains_key(&field.view.to_uppercase()) || field.number == 0 {
            return Err(Error::new(*pos, ErrorKind::FieldNotExist(label)));
        }
        set_targets.push(SetTarget {
            view_name: field.view.to_uppercase(),
            joined_index,
            base_column: field.number - 1,
        });
    }

    // Apply assignments to base copies keyed by internal id.
    let mut bases: FxHashMap<String, View> = FxHashMap::default();
    let mut touched: FxHashMap<String, FxHashSet<i64>> = FxHashMap::default();
    for (name, storage) in &storages {
        bases.insert(name.clone(), base_copy(storage, env)?);
    }

    for record_index in 0..view.record_len() {
        let mut updates = Vec::with_capacity(set_targets.len());
        {
            let frozen: &View = &view;
            for (target_index, set) in query.set_list.iter().enumerate() {
                let stack = [FilterRecord {
                    view: frozen,
                    record_index,
                }];
                let value = evaluate(&set.value, env, &stack)?;
                updates.push((target_index, value));
            }
        }
        for (target_index, value) in updates {
            let target = &set_targets[target_index];
            let id = view.internal_record_id(
                &view.header[target.joined_index].view,
                record_index,
            )?;
            let base = bases.get_mut(&target.view_name).expect("loaded base");
            if let Some(record) = base.record_set.get_mut(id as usize) {
                record[target.base_column] = Cell::Single(value);
                touched.entry(target.view_name.clone()).or_default().insert(id);
            }
        }
    }

    let mut affected = 0;
    for (name, storage) in &storages {
        let mut base = bases.remove(name).expect("loaded base");
        let count = touched.get(name).map(FxHashSet::len).unwrap_or(0);
        base.operated_records = count;
        affected += count;
        write_back(storage, base, env)?;
    }
    Ok(affected)
}

fn execute_delete(query: &DeleteQuery, env: &mut Environment) -> Result<usize> {
    env.push_scope();
    let result = delete_scoped(query, env);
    env.pop_scope();
    result
}

fn delete_scoped(query: &DeleteQuery, env: &mut Environment) -> Result<usize> {
    for decl in &query.with {
        let mut inline = execute_select(&decl.query, env, &[])?;
        inline.header.update_view_name(&decl.name.literal);
        env.set_inline_table(&decl.name.literal, inline, decl.name.pos)?;
    }

    let storages = storage_by_view_name(&query.from.tables, env)?;

    // Explicit target list, or the single FROM table.
    let target_names: Vec<String> = if query.tables.is_empty() {
        let mut names = Vec::new();
        collect_target_names(&query.from.tables, &mut names);
        if names.len() != 1 {
            return Err(Error::new(
                query.pos,
                ErrorKind::Syntax("update file is not specified".to_string()),
            ));
        }
        names
    } else {
        query.tables.iter().map(|t| t.literal.clone()).collect()
    };

    let mut view = load_dml_view(&query.from.tables, env, query.pos)?;
    if let Some(condition) = &query.where_clause {
        where_(&mut view, condition, env, &[])?;
    }

    let mut affected = 0;
    for name in &target_names {
        let key = name.to_uppercase();
        let Some(storage) = storages.get(&key) else {
            return Err(Error::new(query.pos, ErrorKind::TableNotLoaded(name.clone())));
        };
        let mut doomed: FxHashSet<i64> = FxHashSet::default();
        for record_index in 0..view.record_len() {
            doomed.insert(view.internal_record_id(name, record_index)?);
        }
        let mut base = base_copy(storage, env)?;
        let before = base.record_len();
        let mut id = -1i64;
        base.record_set.retain(|_| {
            id += 1;
            !doomed.contains(&id)
        });
        let removed = before - base.record_len();
        base.operated_records = removed;
        affected += removed;
        write_back(storage, base, env)?;
    }
    Ok(affected)
}

// ---------------------------------------------------------------------------
// User-defined function invocation
// ---------------------------------------------------------------------------

pub fn check_function_arity(
    function: &UserDefinedFunction,
    provided: usize,
    name: &str,
    pos: Position,
) -> Result<()> {
    let max = function.parameters.len();
    let min = function.required_args;
    if provided < min || max < provided {
        let expect = if min == max {
            format!("exactly {} argument(s)", max)
        } else {
            format!("at least {} and at most {} arguments", min, max)
        };
        return Err(Error::new(
            pos,
            ErrorKind::FunctionArgumentLength {
                name: name.to_string(),
                expect,
            },
        ));
    }
    Ok(())
}

/// Run a function body in an isolated frame: a fresh variable stack and
/// a child scope, both unwound on every exit path.
fn with_function_frame<T>(
    env: &mut Environment,
    f: impl FnOnce(&mut Environment) -> Result<T>,
) -> Result<T> {
    let saved = env.isolate_variables();
    env.push_scope();
    let result = f(env);
    env.pop_scope();
    env.restore_variables(saved);
    result
}

pub fn invoke_scalar_function(
    env: &mut Environment,
    function: &UserDefinedFunction,
    args: Vec<Value>,
    _records: &[FilterRecord<'_>],
) -> Result<Value> {
    let function = function.clone();
    with_function_frame(env, move |env| {
        bind_parameters(env, &function, args)?;
        let mut results = Vec::new();
        match execute_statements(&function.statements, env, &mut results)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    })
}

/// Run a user-defined aggregate over a group's values: the value list is
/// exposed as an open pseudo cursor under the declared cursor name.
pub fn invoke_aggregate_function(
    env: &mut Environment,
    function: &UserDefinedFunction,
    values: Vec<Value>,
    extra_args: Vec<Value>,
    _records: &[FilterRecord<'_>],
) -> Result<Value> {
    let function = function.clone();
    with_function_frame(env, move |env| {
        let cursor_name = function
            .cursor
            .as_ref()
            .map(|c| c.literal.clone())
            .unwrap_or_else(|| "list".to_string());
        env.declare_cursor(&cursor_name, Cursor::over_values(values), Position::UNKNOWN)?;
        bind_parameters(env, &function, extra_args)?;
        let mut results = Vec::new();
        match execute_statements(&function.statements, env, &mut results)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    })
}

fn bind_parameters(
    env: &mut Environment,
    function: &UserDefinedFunction,
    args: Vec<Value>,
) -> Result<()> {
    for (i, parameter) in function.parameters.iter().enumerate() {
        let value = match args.get(i) {
            Some(value) => value.clone(),
            None => match &parameter.default {
                Some(expr) => evaluate(expr, env, &[])?,
                None => Value::Null,
            },
        };
        env.declare_variable(&parameter.variable, value, Position::UNKNOWN)?;
    }
    Ok(())
}
