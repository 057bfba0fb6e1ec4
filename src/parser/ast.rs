//! Tagged-variant statement and expression tree.
//!
//! The grammar layer that produces these nodes is an external collaborator;
//! the kernel only walks them. Every expression node carries the source
//! [`Position`] of its originating token so errors can be tagged.
//!
//! `Display` renders a node back to a canonical SQL-ish string. The executor
//! relies on this for synthesized column labels (`sum(column1)`,
//! `row_number() over ()`) and for error messages, so renderings are stable.

use std::fmt;

use crate::error::Position;
use crate::storage::value::{Ternary, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub literal: String,
    pub pos: Position,
}

impl Identifier {
    pub fn new(literal: impl Into<String>) -> Self {
        Identifier {
            literal: literal.into(),
            pos: Position::UNKNOWN,
        }
    }

    pub fn at(literal: impl Into<String>, pos: Position) -> Self {
        Identifier {
            literal: literal.into(),
            pos,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl fmt::Display for ArithmeticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatusKind {
    Open,
    InRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorAttributeKind {
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub query: Box<SelectQuery>,
    pub pos: Position,
}

/// A parenthesised value list or a subquery standing in for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    ValueList { values: Vec<Expr>, pos: Position },
    Subquery(Subquery),
}

impl RowValue {
    pub fn position(&self) -> Position {
        match self {
            RowValue::ValueList { pos, .. } => *pos,
            RowValue::Subquery(sq) => sq.pos,
        }
    }
}

/// The right-hand side of IN / ANY / ALL.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantifiedValues {
    /// `IN (1, 2, 3)`
    List(Vec<Expr>),
    /// `IN ((1, 'a'), (2, 'b'))` for a row-value left side
    RowValueList(Vec<RowValue>),
    /// `IN (SELECT ...)`
    Subquery(Subquery),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseWhen {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnit {
    Rows,
    Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(i64),
    CurrentRow,
    Following(i64),
    UnboundedFollowing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrame {
    pub unit: FrameUnit,
    pub start: FrameBound,
    pub end: Option<FrameBound>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyticClause {
    pub partition: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub frame: Option<WindowFrame>,
}

impl AnalyticClause {
    fn render(&self) -> String {
        let mut parts = Vec::new();
        if !self.partition.is_empty() {
            parts.push(format!("partition by {}", join_exprs(&self.partition)));
        }
        if !self.order_by.is_empty() {
            let items: Vec<String> = self.order_by.iter().map(|i| i.to_string()).collect();
            parts.push(format!("order by {}", items.join(", ")));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPosition {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub value: Expr,
    pub direction: Option<SortDirection>,
    pub nulls: Option<NullPosition>,
}

impl fmt::Display for OrderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        match self.direction {
            Some(SortDirection::Ascending) => write!(f, " asc")?,
            Some(SortDirection::Descending) => write!(f, " desc")?,
            None => {}
        }
        match self.nulls {
            Some(NullPosition::First) => write!(f, " nulls first"),
            Some(NullPosition::Last) => write!(f, " nulls last"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A primitive literal carried through from the lexer.
    Literal { value: Value, pos: Position },
    FieldReference {
        view: Option<Identifier>,
        column: Identifier,
        pos: Position,
    },
    /// `table.3` positional reference.
    ColumnNumber {
        view: Identifier,
        number: i64,
        pos: Position,
    },
    Parenthesis(Box<Expr>),
    RowValue(RowValue),
    Arithmetic {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        operator: ArithmeticOperator,
        pos: Position,
    },
    UnaryArithmetic {
        operand: Box<Expr>,
        sign: Sign,
        pos: Position,
    },
    Concat {
        items: Vec<Expr>,
        pos: Position,
    },
    Comparison {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        operator: ComparisonOperator,
        pos: Position,
    },
    Is {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        negated: bool,
        pos: Position,
    },
    Between {
        lhs: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
        pos: Position,
    },
    In {
        lhs: Box<Expr>,
        values: QuantifiedValues,
        negated: bool,
        pos: Position,
    },
    Any {
        lhs: Box<Expr>,
        operator: ComparisonOperator,
        values: QuantifiedValues,
        pos: Position,
    },
    All {
        lhs: Box<Expr>,
        operator: ComparisonOperator,
        values: QuantifiedValues,
        pos: Position,
    },
    Like {
        lhs: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        pos: Position,
    },
    Exists {
        query: Subquery,
        pos: Position,
    },
    CaseExpr {
        value: Option<Box<Expr>>,
        when_clauses: Vec<CaseWhen>,
        else_result: Option<Box<Expr>>,
        pos: Position,
    },
    Logic {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        operator: LogicOperator,
        pos: Position,
    },
    UnaryLogic {
        operand: Box<Expr>,
        pos: Position,
    },
    Function {
        name: Identifier,
        args: Vec<Expr>,
        pos: Position,
    },
    AggregateFunction {
        name: Identifier,
        distinct: bool,
        args: Vec<Expr>,
        pos: Position,
    },
    ListAgg {
        distinct: bool,
        args: Vec<Expr>,
        within_group: Vec<OrderItem>,
        pos: Position,
    },
    AnalyticFunction {
        name: Identifier,
        args: Vec<Expr>,
        distinct: bool,
        clause: AnalyticClause,
        pos: Position,
    },
    Subquery(Subquery),
    Variable {
        name: String,
        pos: Position,
    },
    VariableSubstitution {
        variable: String,
        value: Box<Expr>,
        pos: Position,
    },
    CursorStatus {
        cursor: Identifier,
        negated: bool,
        status: CursorStatusKind,
        pos: Position,
    },
    CursorAttribute {
        cursor: Identifier,
        attribute: CursorAttributeKind,
        pos: Position,
    },
    /// `*` or `table.*`; only valid inside a select field list.
    AllColumns {
        view: Option<Identifier>,
        pos: Position,
    },
}

impl Expr {
    pub fn position(&self) -> Position {
        match self {
            Expr::Literal { pos, .. }
            | Expr::FieldReference { pos, .. }
            | Expr::ColumnNumber { pos, .. }
            | Expr::Arithmetic { pos, .. }
            | Expr::UnaryArithmetic { pos, .. }
            | Expr::Concat { pos, .. }
            | Expr::Comparison { pos, .. }
            | Expr::Is { pos, .. }
            | Expr::Between { pos, .. }
            | Expr::In { pos, .. }
            | Expr::Any { pos, .. }
            | Expr::All { pos, .. }
            | Expr::Like { pos, .. }
            | Expr::Exists { pos, .. }
            | Expr::CaseExpr { pos, .. }
            | Expr::Logic { pos, .. }
            | Expr::UnaryLogic { pos, .. }
            | Expr::Function { pos, .. }
            | Expr::AggregateFunction { pos, .. }
            | Expr::ListAgg { pos, .. }
            | Expr::AnalyticFunction { pos, .. }
            | Expr::Variable { pos, .. }
            | Expr::VariableSubstitution { pos, .. }
            | Expr::CursorStatus { pos, .. }
            | Expr::CursorAttribute { pos, .. }
            | Expr::AllColumns { pos, .. } => *pos,
            Expr::Parenthesis(inner) => inner.position(),
            Expr::RowValue(rv) => rv.position(),
            Expr::Subquery(sq) => sq.pos,
        }
    }

    /// Convenience constructor for tests and inline tables.
    pub fn literal(value: Value) -> Expr {
        Expr::Literal {
            value,
            pos: Position::UNKNOWN,
        }
    }

    pub fn field(column: &str) -> Expr {
        Expr::FieldReference {
            view: None,
            column: Identifier::new(column),
            pos: Position::UNKNOWN,
        }
    }

    pub fn qualified_field(view: &str, column: &str) -> Expr {
        Expr::FieldReference {
            view: Some(Identifier::new(view)),
            column: Identifier::new(column),
            pos: Position::UNKNOWN,
        }
    }
}

fn join_exprs(items: &[Expr]) -> String {
    let rendered: Vec<String> = items.iter().map(|e| e.to_string()).collect();
    rendered.join(", ")
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Datetime(dt) => format!("'{}'", dt.to_rfc3339()),
        Value::Ternary(Ternary::Unknown) => "UNKNOWN".to_string(),
        other => other.render(),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value, .. } => f.write_str(&render_literal(value)),
            Expr::FieldReference { view, column, .. } => match view {
                Some(view) => write!(f, "{}.{}", view, column),
                None => write!(f, "{}", column),
            },
            Expr::ColumnNumber { view, number, .. } => write!(f, "{}.{}", view, number),
            Expr::Parenthesis(inner) => write!(f, "({})", inner),
            Expr::RowValue(RowValue::ValueList { values, .. }) => {
                write!(f, "({})", join_exprs(values))
            }
            Expr::RowValue(RowValue::Subquery(sq)) => write!(f, "{}", sq),
            Expr::Arithmetic {
                lhs, rhs, operator, ..
            } => write!(f, "{} {} {}", lhs, operator, rhs),
            Expr::UnaryArithmetic { operand, sign, .. } => match sign {
                Sign::Plus => write!(f, "+{}", operand),
                Sign::Minus => write!(f, "-{}", operand),
            },
            Expr::Concat { items, .. } => {
                let rendered: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                f.write_str(&rendered.join(" || "))
            }
            Expr::Comparison {
                lhs, rhs, operator, ..
            } => write!(f, "{} {} {}", lhs, operator, rhs),
            Expr::Is {
                lhs, rhs, negated, ..
            } => {
                if *negated {
                    write!(f, "{} is not {}", lhs, rhs)
                } else {
                    write!(f, "{} is {}", lhs, rhs)
                }
            }
            Expr::Between {
                lhs,
                low,
                high,
                negated,
                ..
            } => {
                if *negated {
                    write!(f, "{} not between {} and {}", lhs, low, high)
                } else {
                    write!(f, "{} between {} and {}", lhs, low, high)
                }
            }
            Expr::In {
                lhs,
                values,
                negated,
                ..
            } => {
                let keyword = if *negated { "not in" } else { "in" };
                write!(f, "{} {} {}", lhs, keyword, render_quantified(values))
            }
            Expr::Any {
                lhs,
                operator,
                values,
                ..
            } => write!(f, "{} {} any {}", lhs, operator, render_quantified(values)),
            Expr::All {
                lhs,
                operator,
                values,
                ..
            } => write!(f, "{} {} all {}", lhs, operator, render_quantified(values)),
            Expr::Like {
                lhs,
                pattern,
                negated,
                ..
            } => {
                if *negated {
                    write!(f, "{} not like {}", lhs, pattern)
                } else {
                    write!(f, "{} like {}", lhs, pattern)
                }
            }
            Expr::Exists { query, .. } => write!(f, "exists {}", query),
            Expr::CaseExpr {
                value,
                when_clauses,
                else_result,
                ..
            } => {
                write!(f, "case")?;
                if let Some(value) = value {
                    write!(f, " {}", value)?;
                }
                for when in when_clauses {
                    write!(f, " when {} then {}", when.condition, when.result)?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " else {}", else_result)?;
                }
                write!(f, " end")
            }
            Expr::Logic {
                lhs, rhs, operator, ..
            } => match operator {
                LogicOperator::And => write!(f, "{} and {}", lhs, rhs),
                LogicOperator::Or => write!(f, "{} or {}", lhs, rhs),
            },
            Expr::UnaryLogic { operand, .. } => write!(f, "not {}", operand),
            Expr::Function { name, args, .. } => write!(f, "{}({})", name, join_exprs(args)),
            Expr::AggregateFunction {
                name,
                distinct,
                args,
                ..
            } => {
                if *distinct {
                    write!(f, "{}(distinct {})", name, join_exprs(args))
                } else {
                    write!(f, "{}({})", name, join_exprs(args))
                }
            }
            Expr::ListAgg {
                distinct,
                args,
                within_group,
                ..
            } => {
                let prefix = if *distinct { "distinct " } else { "" };
                write!(f, "listagg({}{})", prefix, join_exprs(args))?;
                if !within_group.is_empty() {
                    let items: Vec<String> = within_group.iter().map(|i| i.to_string()).collect();
                    write!(f, " within group (order by {})", items.join(", "))?;
                }
                Ok(())
            }
            Expr::AnalyticFunction {
                name,
                args,
                distinct,
                clause,
                ..
            } => {
                if *distinct {
                    write!(f, "{}(distinct {})", name, join_exprs(args))?;
                } else {
                    write!(f, "{}({})", name, join_exprs(args))?;
                }
                write!(f, " over ({})", clause.render())
            }
            Expr::Subquery(sq) => write!(f, "{}", sq),
            Expr::Variable { name, .. } => f.write_str(name),
            Expr::VariableSubstitution {
                variable, value, ..
            } => write!(f, "{} := {}", variable, value),
            Expr::CursorStatus {
                cursor,
                negated,
                status,
                ..
            } => {
                let status = match status {
                    CursorStatusKind::Open => "open",
                    CursorStatusKind::InRange => "in range",
                };
                if *negated {
                    write!(f, "cursor {} is not {}", cursor, status)
                } else {
                    write!(f, "cursor {} is {}", cursor, status)
                }
            }
            Expr::CursorAttribute {
                cursor, attribute, ..
            } => match attribute {
                CursorAttributeKind::Count => write!(f, "cursor {} count", cursor),
            },
            Expr::AllColumns { view, .. } => match view {
                Some(view) => write!(f, "{}.*", view),
                None => f.write_str("*"),
            },
        }
    }
}

fn render_quantified(values: &QuantifiedValues) -> String {
    match values {
        QuantifiedValues::List(items) => format!("({})", join_exprs(items)),
        QuantifiedValues::RowValueList(rows) => {
            let rendered: Vec<String> = rows
                .iter()
                .map(|row| {
                    Expr::RowValue(row.clone()).to_string()
                })
                .collect();
            format!("({})", rendered.join(", "))
        }
        QuantifiedValues::Subquery(sq) => sq.to_string(),
    }
}

impl fmt::Display for Subquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(select query)")
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub with: Vec<InlineTableDeclaration>,
    pub entity: SelectEntity,
    pub order_by: Option<OrderByClause>,
    pub limit: Option<LimitClause>,
    pub offset: Option<OffsetClause>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectEntity {
    Select(Box<SelectSet>),
    SetOperation {
        lhs: Box<SelectEntity>,
        rhs: Box<SelectEntity>,
        operator: SetOperator,
        all: bool,
        pos: Position,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Except,
    Intersect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectSet {
    pub select: SelectClause,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    pub distinct: bool,
    pub fields: Vec<Field>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub object: Expr,
    pub alias: Option<Identifier>,
}

impl Field {
    pub fn new(object: Expr) -> Self {
        Field {
            object,
            alias: None,
        }
    }

    pub fn aliased(object: Expr, alias: &str) -> Self {
        Field {
            object,
            alias: Some(Identifier::new(alias)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub tables: Vec<TableExpr>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableExpr {
    pub source: TableSource,
    pub alias: Option<Identifier>,
}

impl TableExpr {
    pub fn named(name: &str) -> Self {
        TableExpr {
            source: TableSource::Identifier(Identifier::new(name)),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    Identifier(Identifier),
    Stdin { pos: Position },
    Dual { pos: Position },
    Subquery(Subquery),
    Join(Box<Join>),
    Parenthesized(Box<TableExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Cross,
    Inner,
    Outer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDirection {
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<Identifier>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: TableExpr,
    pub join_table: TableExpr,
    pub join_type: JoinType,
    pub direction: Option<JoinDirection>,
    pub natural: bool,
    pub condition: Option<JoinCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    pub items: Vec<OrderItem>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitClause {
    pub value: Expr,
    pub percent: bool,
    pub with_ties: bool,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OffsetClause {
    pub value: Expr,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineTableDeclaration {
    pub name: Identifier,
    pub columns: Vec<Identifier>,
    pub query: Box<SelectQuery>,
    pub pos: Position,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<RowValue>),
    Query(Box<SelectQuery>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub with: Vec<InlineTableDeclaration>,
    pub table: Identifier,
    pub fields: Vec<Expr>,
    pub source: InsertSource,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSet {
    pub field: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub with: Vec<InlineTableDeclaration>,
    pub tables: Vec<TableExpr>,
    pub set_list: Vec<UpdateSet>,
    pub where_clause: Option<Expr>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub with: Vec<InlineTableDeclaration>,
    /// Explicit target tables when deleting out of a join; empty means the
    /// single FROM table is the target.
    pub tables: Vec<Identifier>,
    pub from: FromClause,
    pub where_clause: Option<Expr>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableAssignment {
    pub variable: String,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPosition {
    Next,
    Prior,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParameter {
    pub variable: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Expr,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControlKind {
    Continue,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Commit,
    Rollback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    SelectQuery(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    VariableDeclaration {
        assignments: Vec<VariableAssignment>,
        pos: Position,
    },
    SetVariable {
        variable: String,
        value: Expr,
        pos: Position,
    },
    CursorDeclaration {
        cursor: Identifier,
        query: SelectQuery,
        pos: Position,
    },
    OpenCursor {
        cursor: Identifier,
        pos: Position,
    },
    CloseCursor {
        cursor: Identifier,
        pos: Position,
    },
    FetchCursor {
        cursor: Identifier,
        position: FetchPosition,
        variables: Vec<String>,
        pos: Position,
    },
    DisposeCursor {
        cursor: Identifier,
        pos: Position,
    },
    ViewDeclaration {
        view: Identifier,
        columns: Vec<Identifier>,
        query: Option<SelectQuery>,
        pos: Position,
    },
    DisposeView {
        view: Identifier,
        pos: Position,
    },
    FunctionDeclaration {
        name: Identifier,
        parameters: Vec<FunctionParameter>,
        statements: Vec<Statement>,
        pos: Position,
    },
    AggregateDeclaration {
        name: Identifier,
        cursor: Identifier,
        parameters: Vec<FunctionParameter>,
        statements: Vec<Statement>,
        pos: Position,
    },
    DisposeFunction {
        name: Identifier,
        pos: Position,
    },
    If {
        condition: Expr,
        statements: Vec<Statement>,
        else_if: Vec<ElseIf>,
        else_statements: Vec<Statement>,
        pos: Position,
    },
    While {
        condition: Expr,
        statements: Vec<Statement>,
        pos: Position,
    },
    WhileInCursor {
        variables: Vec<String>,
        cursor: Identifier,
        statements: Vec<Statement>,
        pos: Position,
    },
    FlowControl {
        kind: FlowControlKind,
        pos: Position,
    },
    Return {
        value: Option<Expr>,
        pos: Position,
    },
    TransactionControl {
        kind: TransactionKind,
        pos: Position,
    },
}

impl SelectQuery {
    /// A bare `SELECT ... FROM ...` query with no WITH/ORDER/LIMIT parts.
    pub fn simple(set: SelectSet) -> Self {
        SelectQuery {
            with: Vec::new(),
            entity: SelectEntity::Select(Box::new(set)),
            order_by: None,
            limit: None,
            offset: None,
            pos: Position::UNKNOWN,
        }
    }
}
