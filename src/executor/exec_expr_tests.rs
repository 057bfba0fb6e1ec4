use crate::config::Flags;
use crate::error::{Position, Result};
use crate::executor::exec_expr::{evaluate, like_match};
use crate::executor::exec_main;
use crate::executor::scope::{Environment, FilterRecord};
use crate::executor::view::{new_record, Cell, FieldLookup, Header, HeaderField, View};
use crate::parser::ast::*;
use crate::storage::value::{Ternary, Value};

fn test_env() -> Environment {
    Environment::new(Flags {
        cpu: 1,
        quiet: true,
        ..Flags::default()
    })
}

fn sample_view() -> View {
    View::new(
        Header::new("table1", &["column1", "column2"]),
        vec![
            new_record(vec![Value::Integer(1), Value::String("str".into())]),
            new_record(vec![Value::Integer(2), Value::String("strstr".into())]),
        ],
    )
}

fn eval_at(view: &View, record_index: usize, expr: &Expr) -> Result<Value> {
    let mut env = test_env();
    let records = [FilterRecord { view, record_index }];
    evaluate(expr, &mut env, &records)
}

fn int(value: i64) -> Expr {
    Expr::literal(Value::Integer(value))
}

fn text(value: &str) -> Expr {
    Expr::literal(Value::String(value.to_string()))
}

fn null() -> Expr {
    Expr::literal(Value::Null)
}

fn row(values: Vec<Expr>) -> Expr {
    Expr::RowValue(RowValue::ValueList {
        values,
        pos: Position::UNKNOWN,
    })
}

fn comparison(lhs: Expr, operator: ComparisonOperator, rhs: Expr) -> Expr {
    Expr::Comparison {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        operator,
        pos: Position::UNKNOWN,
    }
}

fn ternary_result(value: &Value) -> Ternary {
    match value {
        Value::Ternary(t) => *t,
        other => panic!("expected a ternary, got {:?}", other),
    }
}

#[test]
fn field_reference_reads_the_current_record() {
    let view = sample_view();
    let result = eval_at(&view, 1, &Expr::field("column2")).unwrap();
    assert_eq!(result, Value::String("strstr".into()));

    let qualified = eval_at(&view, 0, &Expr::qualified_field("TABLE1", "COLUMN1")).unwrap();
    assert_eq!(qualified, Value::Integer(1));
}

#[test]
fn unknown_and_ambiguous_fields_are_errors() {
    let view = sample_view();
    let err = eval_at(&view, 0, &Expr::field("notexist")).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] field notexist does not exist");

    let ambiguous = View::new(
        Header::from_fields(vec![
            HeaderField {
                view: "table1".into(),
                column: "column1".into(),
                is_from_table: true,
                ..HeaderField::default()
            },
            HeaderField {
                view: "table1".into(),
                column: "column1".into(),
                is_from_table: true,
                ..HeaderField::default()
            },
        ]),
        vec![new_record(vec![Value::Integer(1), Value::Integer(2)])],
    );
    let err = eval_at(&ambiguous, 0, &Expr::field("column1")).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] field column1 is ambiguous");
}

#[test]
fn column_number_resolves_positionally() {
    let view = sample_view();
    let expr = Expr::ColumnNumber {
        view: Identifier::new("table1"),
        number: 2,
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 0, &expr).unwrap(), Value::String("str".into()));

    let expr = Expr::ColumnNumber {
        view: Identifier::new("table1"),
        number: 9,
        pos: Position::UNKNOWN,
    };
    let err = eval_at(&view, 0, &expr).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] field table1.9 does not exist");
}

#[test]
fn correlated_lookup_walks_outer_records() {
    let inner = View::new(
        Header::new("inner", &["a"]),
        vec![new_record(vec![Value::Integer(10)])],
    );
    let outer = sample_view();
    let mut env = test_env();
    let records = [
        FilterRecord {
            view: &inner,
            record_index: 0,
        },
        FilterRecord {
            view: &outer,
            record_index: 1,
        },
    ];
    let result = evaluate(&Expr::field("column1"), &mut env, &records).unwrap();
    assert_eq!(result, Value::Integer(2));
}

#[test]
fn null_arithmetic_short_circuits() {
    let view = sample_view();
    let expr = Expr::Arithmetic {
        lhs: Box::new(null()),
        rhs: Box::new(int(2)),
        operator: ArithmeticOperator::Add,
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 0, &expr).unwrap(), Value::Null);

    // The right side is never evaluated once the left is Null.
    let expr = Expr::Arithmetic {
        lhs: Box::new(null()),
        rhs: Box::new(Expr::field("notexist")),
        operator: ArithmeticOperator::Add,
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 0, &expr).unwrap(), Value::Null);
}

#[test]
fn comparison_with_null_is_unknown() {
    let view = sample_view();
    let expr = comparison(null(), ComparisonOperator::Equal, int(2));
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::Unknown
    );
}

#[test]
fn logic_short_circuit_skips_the_dead_branch() {
    let view = sample_view();
    let broken = Expr::field("notexist");

    // AND with a FALSE left side never touches the failing right side.
    let expr = Expr::Logic {
        lhs: Box::new(comparison(int(1), ComparisonOperator::Equal, int(2))),
        rhs: Box::new(broken.clone()),
        operator: LogicOperator::And,
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::False
    );

    let expr = Expr::Logic {
        lhs: Box::new(comparison(int(1), ComparisonOperator::Equal, int(1))),
        rhs: Box::new(broken.clone()),
        operator: LogicOperator::Or,
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::True
    );

    // An undecided left side must evaluate the right side and fail.
    let expr = Expr::Logic {
        lhs: Box::new(comparison(null(), ComparisonOperator::Equal, int(1))),
        rhs: Box::new(broken),
        operator: LogicOperator::And,
        pos: Position::UNKNOWN,
    };
    assert!(eval_at(&view, 0, &expr).is_err());
}

#[test]
fn between_handles_scalars_and_row_values() {
    let view = sample_view();

    let expr = Expr::Between {
        lhs: Box::new(int(2)),
        low: Box::new(int(1)),
        high: Box::new(int(3)),
        negated: true,
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::False
    );

    let expr = Expr::Between {
        lhs: Box::new(row(vec![int(1), int(2)])),
        low: Box::new(row(vec![int(1), int(1)])),
        high: Box::new(row(vec![int(1), int(3)])),
        negated: false,
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::True
    );

    // Arity mismatches name the expected length.
    let expr = Expr::Between {
        lhs: Box::new(row(vec![int(1), int(2)])),
        low: Box::new(row(vec![int(1)])),
        high: Box::new(row(vec![int(1), int(3)])),
        negated: false,
        pos: Position::UNKNOWN,
    };
    let err = eval_at(&view, 0, &expr).unwrap_err();
    assert_eq!(
        err.to_string(),
        "[L:- C:-] row value should contain exactly 2 values"
    );
}

#[test]
fn in_membership_follows_three_valued_logic() {
    let view = sample_view();

    let expr = Expr::In {
        lhs: Box::new(int(2)),
        values: QuantifiedValues::List(vec![int(1), int(2)]),
        negated: false,
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::True
    );

    // No match plus a Null candidate leaves the membership unknown.
    let expr = Expr::In {
        lhs: Box::new(int(9)),
        values: QuantifiedValues::List(vec![int(1), null()]),
        negated: true,
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::Unknown
    );
}

#[test]
fn any_and_all_quantify_comparisons() {
    let view = sample_view();

    let expr = Expr::Any {
        lhs: Box::new(int(5)),
        operator: ComparisonOperator::Greater,
        values: QuantifiedValues::List(vec![int(9), int(3)]),
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::True
    );

    let expr = Expr::All {
        lhs: Box::new(int(5)),
        operator: ComparisonOperator::Greater,
        values: QuantifiedValues::List(vec![int(9), int(3)]),
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 0, &expr).unwrap()),
        Ternary::False
    );
}

#[test]
fn like_matches_sql_wildcards() {
    assert!(like_match("abcde", "abc%"));
    assert!(like_match("abcde", "a_cde"));
    assert!(like_match("abcde", "%cd%"));
    assert!(!like_match("abcde", "abc"));
    assert!(like_match("a.c", "a.c"));
    assert!(!like_match("axc", "a.c"));

    let view = sample_view();
    let expr = Expr::Like {
        lhs: Box::new(Expr::field("column2")),
        pattern: Box::new(text("str%")),
        negated: false,
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&eval_at(&view, 1, &expr).unwrap()),
        Ternary::True
    );
}

#[test]
fn case_expressions_pick_the_first_true_branch() {
    let view = sample_view();
    let expr = Expr::CaseExpr {
        value: Some(Box::new(Expr::field("column1"))),
        when_clauses: vec![
            CaseWhen {
                condition: int(1),
                result: text("one"),
            },
            CaseWhen {
                condition: int(2),
                result: text("two"),
            },
        ],
        else_result: Some(Box::new(text("other"))),
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 1, &expr).unwrap(), Value::String("two".into()));

    let searched = Expr::CaseExpr {
        value: None,
        when_clauses: vec![CaseWhen {
            condition: comparison(Expr::field("column1"), ComparisonOperator::Greater, int(1)),
            result: text("big"),
        }],
        else_result: None,
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 0, &searched).unwrap(), Value::Null);
}

#[test]
fn variables_are_scoped_and_substitutable() {
    let view = sample_view();
    let mut env = test_env();
    env.declare_variable("@x", Value::Integer(5), Position::UNKNOWN)
        .unwrap();
    let records = [FilterRecord {
        view: &view,
        record_index: 0,
    }];

    let substitution = Expr::VariableSubstitution {
        variable: "@x".to_string(),
        value: Box::new(int(7)),
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        evaluate(&substitution, &mut env, &records).unwrap(),
        Value::Integer(7)
    );
    assert_eq!(
        env.get_variable("@x", Position::UNKNOWN).unwrap(),
        Value::Integer(7)
    );

    let undeclared = Expr::Variable {
        name: "@missing".to_string(),
        pos: Position::UNKNOWN,
    };
    let err = evaluate(&undeclared, &mut env, &records).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] variable @missing is undeclared");
}

#[test]
fn builtin_functions_resolve_case_insensitively() {
    let view = sample_view();
    let expr = Expr::Function {
        name: Identifier::new("COALESCE"),
        args: vec![null(), Expr::field("column1")],
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 1, &expr).unwrap(), Value::Integer(2));

    let expr = Expr::Function {
        name: Identifier::new("no_such_fn"),
        args: vec![],
        pos: Position::UNKNOWN,
    };
    let err = eval_at(&view, 0, &expr).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] function no_such_fn does not exist");
}

#[test]
fn top_level_wildcard_is_a_syntax_error() {
    let view = sample_view();
    let expr = Expr::AllColumns {
        view: None,
        pos: Position::UNKNOWN,
    };
    let err = eval_at(&view, 0, &expr).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] syntax error: unexpected *");
}

// -- grouped records -------------------------------------------------------

fn grouped_view() -> View {
    let mut view = View::new(
        Header::new("table1", &["column1", "column3"]),
        vec![
            new_record(vec![Value::String("1".into()), Value::String("group1".into())]),
            new_record(vec![Value::String("3".into()), Value::String("group1".into())]),
            new_record(vec![Value::String("2".into()), Value::String("group2".into())]),
            new_record(vec![Value::String("4".into()), Value::String("group2".into())]),
        ],
    );
    let mut env = test_env();
    exec_main::group_by(&mut view, &[Expr::field("column3")], &mut env, &[]).unwrap();
    view
}

#[test]
fn aggregates_fold_group_cells() {
    let view = grouped_view();
    let sum = Expr::AggregateFunction {
        name: Identifier::new("sum"),
        distinct: false,
        args: vec![Expr::field("column1")],
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 0, &sum).unwrap(), Value::Integer(4));
    assert_eq!(eval_at(&view, 1, &sum).unwrap(), Value::Integer(6));

    let count = Expr::AggregateFunction {
        name: Identifier::new("count"),
        distinct: false,
        args: vec![Expr::AllColumns {
            view: None,
            pos: Position::UNKNOWN,
        }],
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 0, &count).unwrap(), Value::Integer(2));
}

#[test]
fn group_keys_read_as_scalars_and_non_keys_error() {
    let view = grouped_view();
    assert_eq!(
        eval_at(&view, 1, &Expr::field("column3")).unwrap(),
        Value::String("group2".into())
    );
    let err = eval_at(&view, 0, &Expr::field("column1")).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] field column1 is not a group key");
}

#[test]
fn aggregate_outside_grouping_is_an_error() {
    let view = sample_view();
    let sum = Expr::AggregateFunction {
        name: Identifier::new("sum"),
        distinct: false,
        args: vec![Expr::field("column1")],
        pos: Position::UNKNOWN,
    };
    let err = eval_at(&view, 0, &sum).unwrap_err();
    assert_eq!(
        err.to_string(),
        "[L:- C:-] function sum cannot aggregate not grouping records"
    );
}

#[test]
fn nested_aggregates_are_rejected() {
    let view = grouped_view();
    let nested = Expr::AggregateFunction {
        name: Identifier::new("sum"),
        distinct: false,
        args: vec![Expr::AggregateFunction {
            name: Identifier::new("avg"),
            distinct: false,
            args: vec![Expr::field("column1")],
            pos: Position::UNKNOWN,
        }],
        pos: Position::UNKNOWN,
    };
    let err = eval_at(&view, 0, &nested).unwrap_err();
    assert_eq!(
        err.to_string(),
        "[L:- C:-] aggregate functions are nested at sum(avg(column1))"
    );
}

#[test]
fn listagg_concatenates_in_group_order() {
    let view = grouped_view();
    let expr = Expr::ListAgg {
        distinct: false,
        args: vec![Expr::field("column1"), text(",")],
        within_group: vec![],
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 0, &expr).unwrap(), Value::String("1,3".into()));

    let sorted = Expr::ListAgg {
        distinct: false,
        args: vec![Expr::field("column1"), text(",")],
        within_group: vec![OrderItem {
            value: Expr::field("column1"),
            direction: Some(SortDirection::Descending),
            nulls: None,
        }],
        pos: Position::UNKNOWN,
    };
    assert_eq!(eval_at(&view, 0, &sorted).unwrap(), Value::String("3,1".into()));

    let bad_delimiter = Expr::ListAgg {
        distinct: false,
        args: vec![Expr::field("column1"), int(3)],
        within_group: vec![],
        pos: Position::UNKNOWN,
    };
    let err = eval_at(&view, 0, &bad_delimiter).unwrap_err();
    assert_eq!(
        err.to_string(),
        "[L:- C:-] the second argument must be a string for function listagg"
    );
}

// -- subqueries ------------------------------------------------------------

fn subquery_over(name: &str, fields: Vec<Field>, where_clause: Option<Expr>) -> Subquery {
    Subquery {
        query: Box::new(SelectQuery::simple(SelectSet {
            select: SelectClause {
                distinct: false,
                fields,
                pos: Position::UNKNOWN,
            },
            from: Some(FromClause {
                tables: vec![TableExpr::named(name)],
                pos: Position::UNKNOWN,
            }),
            where_clause,
            group_by: vec![],
            having: None,
        })),
        pos: Position::UNKNOWN,
    }
}

fn env_with_temp_view(name: &str, view: View) -> Environment {
    let mut env = test_env();
    let mut view = view;
    view.file_info = Some(crate::executor::view::FileInfo::temporary(name));
    env.declare_temp_view(name, view, Position::UNKNOWN).unwrap();
    env
}

#[test]
fn scalar_subquery_cardinality() {
    let mut env = env_with_temp_view("sub", sample_view());
    let outer = sample_view();
    let records = [FilterRecord {
        view: &outer,
        record_index: 0,
    }];

    // Two rows: too many records.
    let expr = Expr::Subquery(subquery_over(
        "sub",
        vec![Field::new(Expr::field("column1"))],
        None,
    ));
    let err = evaluate(&expr, &mut env, &records).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] subquery returns too many records");

    // One row, one column.
    let expr = Expr::Subquery(subquery_over(
        "sub",
        vec![Field::new(Expr::field("column1"))],
        Some(comparison(
            Expr::field("column1"),
            ComparisonOperator::Equal,
            int(2),
        )),
    ));
    assert_eq!(evaluate(&expr, &mut env, &records).unwrap(), Value::Integer(2));

    // Zero rows fold to Null.
    let expr = Expr::Subquery(subquery_over(
        "sub",
        vec![Field::new(Expr::field("column1"))],
        Some(comparison(
            Expr::field("column1"),
            ComparisonOperator::Equal,
            int(99),
        )),
    ));
    assert_eq!(evaluate(&expr, &mut env, &records).unwrap(), Value::Null);

    // Two columns: too many fields.
    let expr = Expr::Subquery(subquery_over(
        "sub",
        vec![
            Field::new(Expr::field("column1")),
            Field::new(Expr::field("column2")),
        ],
        None,
    ));
    let err = evaluate(&expr, &mut env, &records).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] subquery returns too many fields");
}

#[test]
fn exists_and_correlated_subqueries_see_outer_rows() {
    let mut env = env_with_temp_view("sub", sample_view());
    let outer = View::new(
        Header::new("outer_table", &["key"]),
        vec![
            new_record(vec![Value::Integer(2)]),
            new_record(vec![Value::Integer(9)]),
        ],
    );

    let exists = Expr::Exists {
        query: subquery_over(
            "sub",
            vec![Field::new(Expr::field("column1"))],
            Some(comparison(
                Expr::field("column1"),
                ComparisonOperator::Equal,
                Expr::field("key"),
            )),
        ),
        pos: Position::UNKNOWN,
    };

    let records = [FilterRecord {
        view: &outer,
        record_index: 0,
    }];
    assert_eq!(
        ternary_result(&evaluate(&exists, &mut env, &records).unwrap()),
        Ternary::True
    );

    let records = [FilterRecord {
        view: &outer,
        record_index: 1,
    }];
    assert_eq!(
        ternary_result(&evaluate(&exists, &mut env, &records).unwrap()),
        Ternary::False
    );
}

#[test]
fn in_subquery_checks_field_count() {
    let mut env = env_with_temp_view("sub", sample_view());
    let outer = sample_view();
    let records = [FilterRecord {
        view: &outer,
        record_index: 0,
    }];

    let expr = Expr::In {
        lhs: Box::new(int(1)),
        values: QuantifiedValues::Subquery(subquery_over(
            "sub",
            vec![
                Field::new(Expr::field("column1")),
                Field::new(Expr::field("column2")),
            ],
            None,
        )),
        negated: false,
        pos: Position::UNKNOWN,
    };
    let err = evaluate(&expr, &mut env, &records).unwrap_err();
    assert_eq!(err.to_string(), "[L:- C:-] subquery returns too many fields");

    let expr = Expr::In {
        lhs: Box::new(int(1)),
        values: QuantifiedValues::Subquery(subquery_over(
            "sub",
            vec![Field::new(Expr::field("column1"))],
            None,
        )),
        negated: false,
        pos: Position::UNKNOWN,
    };
    assert_eq!(
        ternary_result(&evaluate(&expr, &mut env, &records).unwrap()),
        Ternary::True
    );
}

#[test]
fn field_lookup_helper_reports_kinds() {
    let header = Header::new("t", &["c1"]);
    assert_eq!(header.search_index(None, "c9"), Err(FieldLookup::NotExist));
    assert_eq!(header.search_index(None, "C1"), Ok(0));
}

#[test]
fn grouped_view_cells_are_uniform() {
    let view = grouped_view();
    assert!(view.is_grouped);
    assert_eq!(view.record_len(), 2);
    for record in &view.record_set {
        for cell in record {
            assert!(matches!(cell, Cell::Group(_)));
            assert_eq!(cell.len(), 2);
        }
    }
}
