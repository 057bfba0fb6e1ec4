//! Nested evaluation scopes.
//!
//! An [`Environment`] carries five parallel scope stacks — variables,
//! temporary views, cursors, inline tables, user-defined functions — plus
//! per-scope table aliases. Lookup walks innermost-first; writes land in
//! the scope that owns the binding. A child scope is pushed for every
//! subquery and function frame and popped on return, including on error
//! unwind.
//!
//! The environment deliberately does not own the record contexts the
//! evaluator walks: those borrow the views of their operators (see
//! [`FilterRecord`]), which keeps the view/environment reference graph
//! acyclic.

use chrono::{DateTime, FixedOffset, Utc};
use rustc_hash::FxHashMap;
use tracing::info;

use crate::config::Flags;
use crate::error::{Error, ErrorKind, Position, Result};
use crate::parser::ast::{
    FetchPosition, FunctionParameter, Identifier, SelectQuery, Statement,
};
use crate::storage::value::{Ternary, Value};
use crate::executor::view::View;

/// The evaluator's current-row context. A stack of these lets a correlated
/// subquery resolve fields of outer rows.
#[derive(Debug, Clone, Copy)]
pub struct FilterRecord<'v> {
    pub view: &'v View,
    pub record_index: usize,
}

pub type RecordStack<'v> = [FilterRecord<'v>];

/// A declared cursor and, once opened, its materialised rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub query: Option<SelectQuery>,
    pub view: Option<View>,
    pointer: Option<usize>,
    in_range: Option<bool>,
}

impl Cursor {
    pub fn declared(query: SelectQuery) -> Cursor {
        Cursor {
            query: Some(query),
            view: None,
            pointer: None,
            in_range: None,
        }
    }

    /// A pseudo cursor over a fixed value list, already open. Used to feed
    /// group values into user-defined aggregate bodies.
    pub fn over_values(values: Vec<Value>) -> Cursor {
        let view = View::new(
            crate::executor::view::Header::new("", &["c1"]),
            values
                .into_iter()
                .map(|v| crate::executor::view::new_record(vec![v]))
                .collect(),
        );
        Cursor {
            query: None,
            view: Some(view),
            pointer: None,
            in_range: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.view.is_some()
    }

    pub fn open_with(&mut self, view: View) {
        self.view = Some(view);
        self.pointer = None;
        self.in_range = None;
    }

    pub fn close(&mut self) {
        self.view = None;
        self.pointer = None;
        self.in_range = None;
    }

    /// Advance and read one record. `None` means the cursor moved out of
    /// range; the caller assigns Null to its fetch targets.
    pub fn fetch(&mut self, position: FetchPosition) -> Option<Vec<Value>> {
        let view = self.view.as_ref()?;
        let len = view.record_len();
        let target = match position {
            FetchPosition::Next => match self.pointer {
                None => Some(0),
                Some(p) => p.checked_add(1),
            },
            FetchPosition::Prior => match self.pointer {
                None | Some(0) => None,
                Some(p) => Some(p - 1),
            },
            FetchPosition::First => Some(0),
            FetchPosition::Last => len.checked_sub(1),
        };

        match target {
            Some(idx) if idx < len => {
                self.pointer = Some(idx);
                self.in_range = Some(true);
                Some(
                    view.record_set[idx]
                        .iter()
                        .map(|cell| cell.value().clone())
                        .collect(),
                )
            }
            _ => {
                if let Some(idx) = target {
                    self.pointer = Some(idx.min(len));
                }
                self.in_range = Some(false);
                None
            }
        }
    }

    /// TRUE after an in-range fetch, FALSE after running off either end,
    /// UNKNOWN before the first fetch.
    pub fn in_range(&self) -> Ternary {
        match self.in_range {
            Some(b) => Ternary::from_bool(b),
            None => Ternary::Unknown,
        }
    }

    pub fn count(&self) -> usize {
        self.view.as_ref().map(View::record_len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserDefinedFunction {
    pub name: Identifier,
    pub is_aggregate: bool,
    /// Pseudo-cursor name the aggregate body iterates.
    pub cursor: Option<Identifier>,
    pub parameters: Vec<FunctionParameter>,
    pub required_args: usize,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    variables: FxHashMap<String, Value>,
    temp_views: FxHashMap<String, View>,
    cursors: FxHashMap<String, Cursor>,
    inline_tables: FxHashMap<String, View>,
    functions: FxHashMap<String, UserDefinedFunction>,
    aliases: FxHashMap<String, String>,
}

/// The scoped environment a statement executes in.
#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
    pub flags: Flags,
    /// Query-start instant; NOW() and datetime defaults read this so one
    /// statement sees one clock.
    pub now: DateTime<FixedOffset>,
    /// Raw bytes standing in for the process stdin, consumed at most once.
    pub stdin_bytes: Option<Vec<u8>>,
    stdin_view: Option<View>,
}

fn key_of(name: &str) -> String {
    name.to_ascii_uppercase()
}

impl Environment {
    pub fn new(flags: Flags) -> Environment {
        Environment {
            scopes: vec![Scope::default()],
            flags,
            now: Utc::now().fixed_offset(),
            stdin_bytes: None,
            stdin_view: None,
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1);
        self.scopes.pop();
    }

    fn innermost(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("environment always has a root scope")
    }

    // -- variables ---------------------------------------------------------

    pub fn declare_variable(&mut self, name: &str, value: Value, pos: Position) -> Result<()> {
        let key = key_of(name);
        let scope = self.innermost();
        if scope.variables.contains_key(&key) {
            return Err(Error::new(pos, ErrorKind::VariableRedeclared(name.to_string())));
        }
        scope.variables.insert(key, value);
        Ok(())
    }

    pub fn set_variable(&mut self, name: &str, value: Value, pos: Position) -> Result<()> {
        let key = key_of(name);
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.variables.get_mut(&key) {
                *slot = value;
                return Ok(());
            }
        }
        Err(Error::new(pos, ErrorKind::UndeclaredVariable(name.to_string())))
    }

    pub fn get_variable(&self, name: &str, pos: Position) -> Result<Value> {
        let key = key_of(name);
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.variables.get(&key) {
                return Ok(value.clone());
            }
        }
        Err(Error::new(pos, ErrorKind::UndeclaredVariable(name.to_string())))
    }

    /// Swap in a pristine variable stack for a function frame; the body of
    /// a user-defined function sees only its own declarations.
    pub fn isolate_variables(&mut self) -> Vec<FxHashMap<String, Value>> {
        let saved: Vec<_> = self
            .scopes
            .iter_mut()
            .map(|scope| std::mem::take(&mut scope.variables))
            .collect();
        saved
    }

    pub fn restore_variables(&mut self, saved: Vec<FxHashMap<String, Value>>) {
        for (scope, variables) in self.scopes.iter_mut().zip(saved) {
            scope.variables = variables;
        }
    }

    // -- temporary views ---------------------------------------------------

    pub fn declare_temp_view(&mut self, name: &str, view: View, pos: Position) -> Result<()> {
        let key = key_of(name);
        if self
            .scopes
            .iter()
            .any(|scope| scope.temp_views.contains_key(&key))
        {
            return Err(Error::new(
                pos,
                ErrorKind::TemporaryTableRedeclared(name.to_string()),
            ));
        }
        self.innermost().temp_views.insert(key, view);
        Ok(())
    }

    pub fn temp_view_exists(&self, name: &str) -> bool {
        let key = key_of(name);
        self.scopes
            .iter()
            .any(|scope| scope.temp_views.contains_key(&key))
    }

    /// Copy-on-load: callers own their working copy.
    pub fn get_temp_view(&self, name: &str) -> Option<View> {
        let key = key_of(name);
        for scope in self.scopes.iter().rev() {
            if let Some(view) = scope.temp_views.get(&key) {
                return Some(view.clone());
            }
        }
        None
    }

    pub fn replace_temp_view(&mut self, name: &str, view: View) -> Result<()> {
        let key = key_of(name);
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.temp_views.get_mut(&key) {
                *slot = view;
                return Ok(());
            }
        }
        Err(Error::unplaced(ErrorKind::TableNotLoaded(name.to_string())))
    }

    pub fn dispose_temp_view(&mut self, name: &str, pos: Position) -> Result<()> {
        let key = key_of(name);
        for scope in self.scopes.iter_mut().rev() {
            if scope.temp_views.remove(&key).is_some() {
                return Ok(());
            }
        }
        Err(Error::new(
            pos,
            ErrorKind::UndeclaredTemporaryTable(name.to_string()),
        ))
    }

    /// COMMIT: snapshot every temporary view into its restore point.
    pub fn store_temp_views(&mut self) {
        let quiet = self.flags.quiet;
        for scope in &mut self.scopes {
            for view in scope.temp_views.values_mut() {
                if let Some(info) = view.file_info.as_mut() {
                    info.restore_header = Some(view.header.clone());
                    info.restore_records = Some(view.record_set.clone());
                    if !quiet {
                        info!(path = %info.path.display(), "commit: restore point created");
                    }
                }
            }
        }
    }

    /// ROLLBACK: revert every temporary view to its restore point.
    pub fn restore_temp_views(&mut self) {
        let quiet = self.flags.quiet;
        for scope in &mut self.scopes {
            for view in scope.temp_views.values_mut() {
                let Some(info) = view.file_info.as_mut() else {
                    continue;
                };
                let (Some(header), Some(records)) =
                    (info.restore_header.clone(), info.restore_records.clone())
                else {
                    continue;
                };
                if !quiet {
                    info!(path = %info.path.display(), "rollback: view restored");
                }
                view.header = header;
                view.record_set = records;
            }
        }
    }

    // -- cursors -----------------------------------------------------------

    pub fn declare_cursor(&mut self, name: &str, cursor: Cursor, pos: Position) -> Result<()> {
        let key = key_of(name);
        let scope = self.innermost();
        if scope.cursors.contains_key(&key) {
            return Err(Error::new(pos, ErrorKind::CursorRedeclared(name.to_string())));
        }
        scope.cursors.insert(key, cursor);
        Ok(())
    }

    pub fn with_cursor<T>(
        &mut self,
        name: &str,
        pos: Position,
        f: impl FnOnce(&mut Cursor) -> Result<T>,
    ) -> Result<T> {
        let key = key_of(name);
        for scope in self.scopes.iter_mut().rev() {
            if let Some(cursor) = scope.cursors.get_mut(&key) {
                return f(cursor);
            }
        }
        Err(Error::new(pos, ErrorKind::UndeclaredCursor(name.to_string())))
    }

    pub fn cursor_query(&self, name: &str, pos: Position) -> Result<Option<SelectQuery>> {
        let key = key_of(name);
        for scope in self.scopes.iter().rev() {
            if let Some(cursor) = scope.cursors.get(&key) {
                return Ok(cursor.query.clone());
            }
        }
        Err(Error::new(pos, ErrorKind::UndeclaredCursor(name.to_string())))
    }

    pub fn dispose_cursor(&mut self, name: &str, pos: Position) -> Result<()> {
        let key = key_of(name);
        for scope in self.scopes.iter_mut().rev() {
            if scope.cursors.remove(&key).is_some() {
                return Ok(());
            }
        }
        Err(Error::new(pos, ErrorKind::UndeclaredCursor(name.to_string())))
    }

    // -- inline tables -----------------------------------------------------

    pub fn set_inline_table(&mut self, name: &str, view: View, pos: Position) -> Result<()> {
        let key = key_of(name);
        let scope = self.innermost();
        if scope.inline_tables.contains_key(&key) {
            return Err(Error::new(
                pos,
                ErrorKind::InlineTableRedefined(name.to_string()),
            ));
        }
        scope.inline_tables.insert(key, view);
        Ok(())
    }

    pub fn get_inline_table(&self, name: &str) -> Option<View> {
        let key = key_of(name);
        for scope in self.scopes.iter().rev() {
            if let Some(view) = scope.inline_tables.get(&key) {
                return Some(view.clone());
            }
        }
        None
    }

    // -- user-defined functions -------------------------------------------

    pub fn declare_function(&mut self, function: UserDefinedFunction, pos: Position) -> Result<()> {
        let name = function.name.literal.clone();
        if crate::utils::fmgr::is_builtin_scalar(&name)
            || crate::executor::aggregate::is_builtin_aggregate(&name)
            || crate::executor::window::is_builtin_analytic(&name)
        {
            return Err(Error::new(pos, ErrorKind::FunctionRedeclared(name)));
        }
        let key = key_of(&name);
        let scope = self.innermost();
        if scope.functions.contains_key(&key) {
            return Err(Error::new(pos, ErrorKind::FunctionRedeclared(name)));
        }
        scope.functions.insert(key, function);
        Ok(())
    }

    pub fn get_function(&self, name: &str) -> Option<UserDefinedFunction> {
        let key = key_of(name);
        for scope in self.scopes.iter().rev() {
            if let Some(function) = scope.functions.get(&key) {
                return Some(function.clone());
            }
        }
        None
    }

    pub fn dispose_function(&mut self, name: &str, pos: Position) -> Result<()> {
        let key = key_of(name);
        for scope in self.scopes.iter_mut().rev() {
            if scope.functions.remove(&key).is_some() {
                return Ok(());
            }
        }
        Err(Error::new(pos, ErrorKind::FunctionNotExist(name.to_string())))
    }

    // -- table aliases -----------------------------------------------------

    /// Register a FROM-list alias. Duplicates within one scope are an
    /// error; the same alias in an inner scope shadows the outer one.
    pub fn add_alias(&mut self, alias: &str, path: &str, pos: Position) -> Result<()> {
        let key = key_of(alias);
        let scope = self.innermost();
        if scope.aliases.contains_key(&key) {
            return Err(Error::new(
                pos,
                ErrorKind::DuplicateTableName(alias.to_string()),
            ));
        }
        scope.aliases.insert(key, path.to_string());
        Ok(())
    }

    pub fn get_alias(&self, alias: &str) -> Option<String> {
        let key = key_of(alias);
        for scope in self.scopes.iter().rev() {
            if let Some(path) = scope.aliases.get(&key) {
                return Some(path.clone());
            }
        }
        None
    }

    // -- stdin -------------------------------------------------------------

    pub fn cached_stdin_view(&self) -> Option<View> {
        self.stdin_view.clone()
    }

    pub fn cache_stdin_view(&mut self, view: View) {
        self.stdin_view = Some(view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::view::{new_record, Header};

    fn env() -> Environment {
        Environment::new(Flags::default())
    }

    #[test]
    fn variable_lookup_walks_scopes_innermost_first() {
        let mut env = env();
        env.declare_variable("@x", Value::Integer(1), Position::UNKNOWN).unwrap();
        env.push_scope();
        env.declare_variable("@x", Value::Integer(2), Position::UNKNOWN).unwrap();
        assert_eq!(
            env.get_variable("@X", Position::UNKNOWN).unwrap(),
            Value::Integer(2)
        );
        env.pop_scope();
        assert_eq!(
            env.get_variable("@x", Position::UNKNOWN).unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn assignment_writes_to_the_owning_scope() {
        let mut env = env();
        env.declare_variable("@x", Value::Integer(1), Position::UNKNOWN).unwrap();
        env.push_scope();
        env.set_variable("@x", Value::Integer(9), Position::UNKNOWN).unwrap();
        env.pop_scope();
        assert_eq!(
            env.get_variable("@x", Position::UNKNOWN).unwrap(),
            Value::Integer(9)
        );
    }

    #[test]
    fn undeclared_variable_is_an_error() {
        let env = env();
        let err = env.get_variable("@missing", Position::UNKNOWN).unwrap_err();
        assert_eq!(err.to_string(), "[L:- C:-] variable @missing is undeclared");
    }

    #[test]
    fn duplicate_alias_in_one_scope_is_rejected() {
        let mut env = env();
        env.add_alias("t", "/data/t.csv", Position::UNKNOWN).unwrap();
        let err = env.add_alias("T", "/data/u.csv", Position::UNKNOWN).unwrap_err();
        assert_eq!(err.to_string(), "[L:- C:-] table name T is a duplicate");
    }

    #[test]
    fn cursor_fetch_walks_and_reports_range() {
        let mut cursor = Cursor::over_values(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(cursor.in_range(), Ternary::Unknown);
        assert_eq!(cursor.fetch(FetchPosition::Next), Some(vec![Value::Integer(1)]));
        assert_eq!(cursor.fetch(FetchPosition::Next), Some(vec![Value::Integer(2)]));
        assert_eq!(cursor.fetch(FetchPosition::Next), None);
        assert_eq!(cursor.in_range(), Ternary::False);
        assert_eq!(cursor.count(), 2);
    }

    #[test]
    fn temp_view_restore_points_round_trip() {
        let mut env = env();
        let mut view = View::new(
            Header::new("tmp", &["c1"]),
            vec![new_record(vec![Value::Integer(1)])],
        );
        view.file_info = Some(crate::executor::view::FileInfo::temporary("tmp"));
        env.declare_temp_view("tmp", view, Position::UNKNOWN).unwrap();
        env.store_temp_views();

        let mut changed = env.get_temp_view("tmp").unwrap();
        changed.record_set.push(new_record(vec![Value::Integer(2)]));
        env.replace_temp_view("tmp", changed).unwrap();
        assert_eq!(env.get_temp_view("tmp").unwrap().record_len(), 2);

        env.restore_temp_views();
        assert_eq!(env.get_temp_view("tmp").unwrap().record_len(), 1);
    }
}
