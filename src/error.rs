//! Position-tagged errors shared by every operator and evaluator entrypoint.
//!
//! An [`Error`] pairs an [`ErrorKind`] with the source [`Position`] of the
//! expression that raised it. The formatted form is
//! `[L:<line> C:<column>] <message>`, with `-` standing in for an unknown
//! line or column. Errors are never converted to Null; the one deliberate
//! swallow in the crate is cast failure inside value-level primitives.

use std::fmt;

use thiserror::Error;

/// A source location carried over from the parser. Zero means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const UNKNOWN: Position = Position { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (0, _) | (_, 0) => write!(f, "[L:- C:-]"),
            (line, column) => write!(f, "[L:{} C:{}]", line, column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("field {0} does not exist")]
    FieldNotExist(String),
    #[error("field {0} is ambiguous")]
    FieldAmbiguous(String),
    #[error("field {0} is not a group key")]
    FieldNotGroupKey(String),
    #[error("field {0} is a duplicate")]
    FieldDuplicate(String),
    #[error("function {0} does not exist")]
    FunctionNotExist(String),
    #[error("function {0} is redeclared")]
    FunctionRedeclared(String),
    #[error("function {name} takes {expect}")]
    FunctionArgumentLength { name: String, expect: String },
    #[error("the second argument must be a string for function {0}")]
    FunctionInvalidDelimiter(String),
    #[error("{message} for function {name}")]
    FunctionInvalidArgument { name: String, message: String },
    #[error("function {0} cannot aggregate not grouping records")]
    NotGroupingRecords(String),
    #[error("aggregate functions are nested at {0}")]
    NestedAggregateFunctions(String),
    #[error("variable {0} is undeclared")]
    UndeclaredVariable(String),
    #[error("variable {0} is redeclared")]
    VariableRedeclared(String),
    #[error("cursor {0} is undeclared")]
    UndeclaredCursor(String),
    #[error("cursor {0} is redeclared")]
    CursorRedeclared(String),
    #[error("cursor {0} is already open")]
    CursorOpen(String),
    #[error("cursor {0} is closed")]
    CursorClosed(String),
    #[error("fetch position {0} is not an integer value")]
    InvalidFetchPosition(String),
    #[error("temporary table {0} is redeclared")]
    TemporaryTableRedeclared(String),
    #[error("temporary table {0} is undeclared")]
    UndeclaredTemporaryTable(String),
    #[error("inline table {0} is redefined")]
    InlineTableRedefined(String),
    #[error("inline table {0} is undefined")]
    UndefinedInlineTable(String),
    #[error("table {0} is not loaded")]
    TableNotLoaded(String),
    #[error("table name {0} is a duplicate")]
    DuplicateTableName(String),
    #[error("file {0} does not exist")]
    FileNotExist(String),
    #[error("failed to read from file: {0}")]
    ReadFile(String),
    #[error("stdin is empty")]
    StdinEmpty,
    #[error("subquery returns too many records")]
    SubqueryTooManyRecords,
    #[error("subquery returns too many fields")]
    SubqueryTooManyFields,
    #[error("row value should contain exactly {0} values")]
    RowValueLength(usize),
    #[error("select query should return exactly {0} fields")]
    SelectFieldLength(usize),
    #[error("result set to be combined should contain exactly {0} fields")]
    CombinedFieldLength(usize),
    #[error("field list should contain exactly {0} fields")]
    InsertFieldLength(usize),
    #[error("limit number of records should be an integer value")]
    LimitValueNotInteger,
    #[error("limit percentage should be a float value")]
    LimitValueNotFloat,
    #[error("offset number should be an integer value")]
    OffsetValueNotInteger,
    /// Loader diagnostics are surfaced verbatim, e.g.
    /// `csv parse error in file X: line L, column C: <reason>`.
    #[error("{0}")]
    Load(String),
}

/// The error type returned by every fallible kernel API.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub position: Position,
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(position: Position, kind: ErrorKind) -> Self {
        Error { position, kind }
    }

    /// An error with no source location, rendered as `[L:- C:-]`.
    pub fn unplaced(kind: ErrorKind) -> Self {
        Error {
            position: Position::UNKNOWN,
            kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.position, self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_renders_position_and_message() {
        let err = Error::new(
            Position::new(3, 12),
            ErrorKind::FieldNotExist("column9".to_string()),
        );
        assert_eq!(err.to_string(), "[L:3 C:12] field column9 does not exist");
    }

    #[test]
    fn unknown_position_renders_dashes() {
        let err = Error::unplaced(ErrorKind::FieldAmbiguous("column1".to_string()));
        assert_eq!(err.to_string(), "[L:- C:-] field column1 is ambiguous");
    }

    #[test]
    fn loader_messages_are_verbatim() {
        let err = Error::unplaced(ErrorKind::Load(
            "csv parse error in file /tmp/t.csv: line 3, column 7: wrong number of fields in line"
                .to_string(),
        ));
        assert_eq!(
            err.to_string(),
            "[L:- C:-] csv parse error in file /tmp/t.csv: line 3, column 7: wrong number of fields in line"
        );
    }
}
