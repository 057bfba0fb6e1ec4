use pretty_assertions::assert_eq;

use crate::config::Flags;
use crate::error::Position;
use crate::executor::exec_main::{
    group_by, having, limit, offset, order_by, select, where_,
};
use crate::executor::scope::Environment;
use crate::executor::view::{new_record, Cell, Header, View};
use crate::parser::ast::*;
use crate::storage::value::Value;

fn test_env(cpu: usize) -> Environment {
    Environment::new(Flags {
        cpu,
        quiet: true,
        ..Flags::default()
    })
}

fn int(value: i64) -> Expr {
    Expr::literal(Value::Integer(value))
}

fn text(value: &str) -> Expr {
    Expr::literal(Value::String(value.to_string()))
}

fn numbers_view(count: i64) -> View {
    View::new(
        Header::new("t", &["n"]),
        (0..count)
            .map(|i| new_record(vec![Value::Integer(i)]))
            .collect(),
    )
}

fn comparison(lhs: Expr, operator: ComparisonOperator, rhs: Expr) -> Expr {
    Expr::Comparison {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        operator,
        pos: Position::UNKNOWN,
    }
}

fn cell_values(view: &View, column: usize) -> Vec<Value> {
    view.record_set
        .iter()
        .map(|record| record[column].value().clone())
        .collect()
}

#[test]
fn where_keeps_only_true_records() {
    let mut view = numbers_view(10);
    let mut env = test_env(1);
    let condition = comparison(Expr::field("n"), ComparisonOperator::GreaterOrEqual, int(7));
    where_(&mut view, &condition, &mut env, &[]).unwrap();
    assert_eq!(
        cell_values(&view, 0),
        vec![Value::Integer(7), Value::Integer(8), Value::Integer(9)]
    );
}

#[test]
fn parallel_where_matches_serial_for_every_cpu_count() {
    let condition = comparison(
        Expr::Arithmetic {
            lhs: Box::new(Expr::field("n")),
            rhs: Box::new(int(3)),
            operator: ArithmeticOperator::Modulo,
            pos: Position::UNKNOWN,
        },
        ComparisonOperator::Equal,
        int(1),
    );

    let mut expected = numbers_view(1000);
    where_(&mut expected, &condition, &mut test_env(1), &[]).unwrap();

    for cpu in [2, 4, 8] {
        let mut view = numbers_view(1000);
        where_(&mut view, &condition, &mut test_env(cpu), &[]).unwrap();
        assert_eq!(view, expected, "cpu={}", cpu);
    }
}

#[test]
fn record_length_matches_header_through_the_pipeline() {
    let mut view = View::new(
        Header::new("t", &["a", "b"]),
        vec![
            new_record(vec![Value::Integer(1), Value::String("x".into())]),
            new_record(vec![Value::Integer(2), Value::String("y".into())]),
        ],
    );
    let mut env = test_env(1);
    select(
        &mut view,
        &SelectClause {
            distinct: false,
            fields: vec![
                Field::new(Expr::field("a")),
                Field::new(Expr::Arithmetic {
                    lhs: Box::new(Expr::field("a")),
                    rhs: Box::new(int(10)),
                    operator: ArithmeticOperator::Multiply,
                    pos: Position::UNKNOWN,
                }),
            ],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    for record in &view.record_set {
        assert_eq!(record.len(), view.header.len());
    }
    view.fix();
    for record in &view.record_set {
        assert_eq!(record.len(), view.header.len());
    }
    assert_eq!(cell_values(&view, 1), vec![Value::Integer(10), Value::Integer(20)]);
}

// -- group by --------------------------------------------------------------

fn groupable_view() -> View {
    View::new(
        Header::new("table1", &["column1", "column2", "column3"]),
        vec![
            new_record(vec![
                Value::String("1".into()),
                Value::String("str1".into()),
                Value::String("group1".into()),
            ]),
            new_record(vec![
                Value::String("2".into()),
                Value::String("str2".into()),
                Value::String("group2".into()),
            ]),
            new_record(vec![
                Value::String("3".into()),
                Value::String("str3".into()),
                Value::String("group1".into()),
            ]),
            new_record(vec![
                Value::String("4".into()),
                Value::String("str4".into()),
                Value::String("group2".into()),
            ]),
        ],
    )
}

#[test]
fn group_by_collapses_equal_keys_into_group_cells() {
    let mut view = groupable_view();
    let mut env = test_env(1);
    group_by(&mut view, &[Expr::field("column3")], &mut env, &[]).unwrap();

    assert!(view.is_grouped);
    assert_eq!(view.record_len(), 2);
    assert!(view.header[2].is_group_key);

    // Group members keep the original row order.
    assert_eq!(
        view.record_set[0][0],
        Cell::Group(vec![Value::String("1".into()), Value::String("3".into())])
    );
    assert_eq!(
        view.record_set[1][0],
        Cell::Group(vec![Value::String("2".into()), Value::String("4".into())])
    );

    // Every cell of a record shares the group's multiplicity.
    for record in &view.record_set {
        for cell in record {
            assert_eq!(cell.len(), 2);
        }
    }
}

#[test]
fn group_by_boundary_cases() {
    // Empty input with keys: empty output, still marked grouped.
    let mut view = View::new(Header::new("t", &["a"]), Vec::new());
    let mut env = test_env(1);
    group_by(&mut view, &[Expr::field("a")], &mut env, &[]).unwrap();
    assert!(view.is_grouped);
    assert_eq!(view.record_len(), 0);

    // Empty key list over records: one all-rows group.
    let mut view = numbers_view(3);
    group_by(&mut view, &[], &mut env, &[]).unwrap();
    assert!(view.is_grouped);
    assert_eq!(view.record_len(), 1);
    assert_eq!(view.record_set[0][0].len(), 3);

    // Nulls group together.
    let mut view = View::new(
        Header::new("t", &["a"]),
        vec![
            new_record(vec![Value::Null]),
            new_record(vec![Value::Integer(1)]),
            new_record(vec![Value::Null]),
        ],
    );
    group_by(&mut view, &[Expr::field("a")], &mut env, &[]).unwrap();
    assert_eq!(view.record_len(), 2);
}

#[test]
fn having_promotes_ungrouped_views_and_filters_groups() {
    let mut view = groupable_view();
    let mut env = test_env(1);
    group_by(&mut view, &[Expr::field("column3")], &mut env, &[]).unwrap();

    let condition = comparison(
        Expr::AggregateFunction {
            name: Identifier::new("sum"),
            distinct: false,
            args: vec![Expr::field("column1")],
            pos: Position::UNKNOWN,
        },
        ComparisonOperator::Greater,
        int(5),
    );
    having(&mut view, &condition, &mut env, &[]).unwrap();

    // Only group2 (2 + 4 = 6) survives.
    assert_eq!(view.record_len(), 1);
    assert_eq!(
        view.record_set[0][2],
        Cell::Group(vec![
            Value::String("group2".into()),
            Value::String("group2".into())
        ])
    );

    // Ungrouped input is promoted to a single all-rows group first.
    let mut flat = numbers_view(4);
    let condition = comparison(
        Expr::AggregateFunction {
            name: Identifier::new("count"),
            distinct: false,
            args: vec![Expr::AllColumns {
                view: None,
                pos: Position::UNKNOWN,
            }],
            pos: Position::UNKNOWN,
        },
        ComparisonOperator::Equal,
        int(4),
    );
    having(&mut flat, &condition, &mut env, &[]).unwrap();
    assert!(flat.is_grouped);
    assert_eq!(flat.record_len(), 1);
}

// -- select ----------------------------------------------------------------

#[test]
fn select_expands_wildcards_and_records_the_projection() {
    let mut view = groupable_view();
    let mut env = test_env(1);
    select(
        &mut view,
        &SelectClause {
            distinct: false,
            fields: vec![Field::new(Expr::AllColumns {
                view: None,
                pos: Position::UNKNOWN,
            })],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    assert_eq!(view.select_fields, vec![0, 1, 2]);
}

#[test]
fn select_aliases_become_output_names() {
    let mut view = groupable_view();
    let mut env = test_env(1);
    select(
        &mut view,
        &SelectClause {
            distinct: false,
            fields: vec![Field::aliased(Expr::field("column1"), "c1a")],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    view.fix();
    assert_eq!(view.header[0].column, "c1a");
}

#[test]
fn select_distinct_deduplicates_in_first_occurrence_order() {
    let mut view = View::new(
        Header::new("t", &["a"]),
        vec![
            new_record(vec![Value::Integer(2)]),
            new_record(vec![Value::Integer(1)]),
            new_record(vec![Value::Integer(2)]),
            new_record(vec![Value::Integer(3)]),
        ],
    );
    let mut env = test_env(1);
    select(
        &mut view,
        &SelectClause {
            distinct: true,
            fields: vec![Field::new(Expr::field("a"))],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    assert_eq!(
        cell_values(&view, 0),
        vec![Value::Integer(2), Value::Integer(1), Value::Integer(3)]
    );
}

#[test]
fn select_scalar_aggregate_forms_a_single_group() {
    let mut view = numbers_view(4);
    let mut env = test_env(1);
    select(
        &mut view,
        &SelectClause {
            distinct: false,
            fields: vec![Field::new(Expr::AggregateFunction {
                name: Identifier::new("sum"),
                distinct: false,
                args: vec![Expr::field("n")],
                pos: Position::UNKNOWN,
            })],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    view.fix();
    assert_eq!(view.record_len(), 1);
    assert_eq!(view.record_set[0][0], Cell::Single(Value::Integer(6)));
    assert_eq!(view.header[0].column, "sum(n)");
}

#[test]
fn select_row_number_over_partitions() {
    let mut view = View::new(
        Header::new("table1", &["c1", "c2"]),
        vec![
            new_record(vec![Value::String("a".into()), Value::Integer(2)]),
            new_record(vec![Value::String("b".into()), Value::Integer(3)]),
            new_record(vec![Value::String("b".into()), Value::Integer(5)]),
            new_record(vec![Value::String("a".into()), Value::Integer(1)]),
            new_record(vec![Value::String("b".into()), Value::Integer(4)]),
        ],
    );
    let mut env = test_env(1);
    let call = Expr::AnalyticFunction {
        name: Identifier::new("row_number"),
        args: vec![],
        distinct: false,
        clause: AnalyticClause {
            partition: vec![Expr::field("c1")],
            order_by: vec![OrderItem {
                value: Expr::field("c2"),
                direction: None,
                nulls: None,
            }],
            frame: None,
        },
        pos: Position::UNKNOWN,
    };
    select(
        &mut view,
        &SelectClause {
            distinct: false,
            fields: vec![
                Field::new(Expr::field("c1")),
                Field::new(Expr::field("c2")),
                Field::new(call),
            ],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();

    let order_clause = OrderByClause {
        items: vec![
            OrderItem {
                value: Expr::field("c1"),
                direction: None,
                nulls: None,
            },
            OrderItem {
                value: Expr::field("c2"),
                direction: None,
                nulls: None,
            },
        ],
        pos: Position::UNKNOWN,
    };
    order_by(&mut view, &order_clause, &mut env, &[]).unwrap();
    view.fix();

    let rows: Vec<(String, i64, i64)> = view
        .record_set
        .iter()
        .map(|record| {
            let c1 = match record[0].value() {
                Value::String(s) => s.clone(),
                other => panic!("unexpected {:?}", other),
            };
            let c2 = match record[1].value() {
                Value::Integer(v) => *v,
                other => panic!("unexpected {:?}", other),
            };
            let rn = match record[2].value() {
                Value::Integer(v) => *v,
                other => panic!("unexpected {:?}", other),
            };
            (c1, c2, rn)
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            ("a".to_string(), 1, 1),
            ("a".to_string(), 2, 2),
            ("b".to_string(), 3, 1),
            ("b".to_string(), 4, 2),
            ("b".to_string(), 5, 3),
        ]
    );
}

// -- order by / limit / offset ---------------------------------------------

#[test]
fn order_by_is_stable_and_places_nulls() {
    let mut view = View::new(
        Header::new("t", &["a", "tag"]),
        vec![
            new_record(vec![Value::Integer(2), Value::String("first".into())]),
            new_record(vec![Value::Null, Value::String("null".into())]),
            new_record(vec![Value::Integer(1), Value::String("one".into())]),
            new_record(vec![Value::Integer(2), Value::String("second".into())]),
        ],
    );
    let mut env = test_env(1);
    order_by(
        &mut view,
        &OrderByClause {
            items: vec![OrderItem {
                value: Expr::field("a"),
                direction: None,
                nulls: None,
            }],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();

    // Default ascending: nulls first; the two equal keys keep input order.
    assert_eq!(
        cell_values(&view, 1),
        vec![
            Value::String("null".into()),
            Value::String("one".into()),
            Value::String("first".into()),
            Value::String("second".into()),
        ]
    );

    order_by(
        &mut view,
        &OrderByClause {
            items: vec![OrderItem {
                value: Expr::field("a"),
                direction: Some(SortDirection::Descending),
                nulls: None,
            }],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    // Default descending: nulls last.
    assert_eq!(
        view.record_set.last().unwrap()[1],
        Cell::Single(Value::String("null".into()))
    );
}

#[test]
fn order_by_accepts_positional_items() {
    let mut view = View::new(
        Header::new("t", &["a", "b"]),
        vec![
            new_record(vec![Value::Integer(1), Value::Integer(9)]),
            new_record(vec![Value::Integer(2), Value::Integer(3)]),
        ],
    );
    let mut env = test_env(1);
    select(
        &mut view,
        &SelectClause {
            distinct: false,
            fields: vec![Field::new(Expr::field("a")), Field::new(Expr::field("b"))],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    order_by(
        &mut view,
        &OrderByClause {
            items: vec![OrderItem {
                value: int(2),
                direction: None,
                nulls: None,
            }],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    assert_eq!(cell_values(&view, 1), vec![Value::Integer(3), Value::Integer(9)]);
}

#[test]
fn limit_boundaries() {
    let mut env = test_env(1);
    let clause = |value: Expr, percent: bool, with_ties: bool| LimitClause {
        value,
        percent,
        with_ties,
        pos: Position::UNKNOWN,
    };

    let mut view = numbers_view(10);
    limit(&mut view, &clause(int(0), false, false), &mut env, &[]).unwrap();
    assert_eq!(view.record_len(), 0);

    let mut view = numbers_view(10);
    limit(&mut view, &clause(int(-3), false, false), &mut env, &[]).unwrap();
    assert_eq!(view.record_len(), 0);

    let mut view = numbers_view(10);
    limit(
        &mut view,
        &clause(Expr::literal(Value::Float(0.0)), true, false),
        &mut env,
        &[],
    )
    .unwrap();
    assert_eq!(view.record_len(), 0);

    let mut view = numbers_view(10);
    limit(
        &mut view,
        &clause(Expr::literal(Value::Float(150.0)), true, false),
        &mut env,
        &[],
    )
    .unwrap();
    assert_eq!(view.record_len(), 10);

    let mut view = numbers_view(10);
    limit(
        &mut view,
        &clause(Expr::literal(Value::Float(25.0)), true, false),
        &mut env,
        &[],
    )
    .unwrap();
    assert_eq!(view.record_len(), 3);

    let mut view = numbers_view(10);
    let err = limit(&mut view, &clause(text("x"), false, false), &mut env, &[]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "[L:- C:-] limit number of records should be an integer value"
    );
}

#[test]
fn limit_with_ties_extends_to_the_boundary_peers() {
    let mut view = View::new(
        Header::new("t", &["a"]),
        vec![
            new_record(vec![Value::Integer(1)]),
            new_record(vec![Value::Integer(2)]),
            new_record(vec![Value::Integer(2)]),
            new_record(vec![Value::Integer(3)]),
        ],
    );
    let mut env = test_env(1);
    order_by(
        &mut view,
        &OrderByClause {
            items: vec![OrderItem {
                value: Expr::field("a"),
                direction: None,
                nulls: None,
            }],
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    limit(
        &mut view,
        &LimitClause {
            value: int(2),
            percent: false,
            with_ties: true,
            pos: Position::UNKNOWN,
        },
        &mut env,
        &[],
    )
    .unwrap();
    assert_eq!(
        cell_values(&view, 0),
        vec![Value::Integer(1), Value::Integer(2), Value::Integer(2)]
    );
}

#[test]
fn offset_clamps_to_record_count() {
    let mut env = test_env(1);
    let clause = |value: Expr| OffsetClause {
        value,
        pos: Position::UNKNOWN,
    };

    let mut view = numbers_view(5);
    offset(&mut view, &clause(int(2)), &mut env, &[]).unwrap();
    assert_eq!(
        cell_values(&view, 0),
        vec![Value::Integer(2), Value::Integer(3), Value::Integer(4)]
    );

    let mut view = numbers_view(5);
    offset(&mut view, &clause(int(99)), &mut env, &[]).unwrap();
    assert_eq!(view.record_len(), 0);

    let mut view = numbers_view(5);
    offset(&mut view, &clause(int(-1)), &mut env, &[]).unwrap();
    assert_eq!(view.record_len(), 5);
}

// -- set operations --------------------------------------------------------

#[test]
fn union_all_concatenates_rows() {
    let mut left = numbers_view(3);
    let right = numbers_view(2);
    left.union(right, true).unwrap();
    assert_eq!(
        cell_values(&left, 0),
        vec![
            Value::Integer(0),
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(0),
            Value::Integer(1),
        ]
    );
}

#[test]
fn except_of_a_view_with_itself_is_empty() {
    let mut left = numbers_view(4);
    let right = numbers_view(4);
    left.except(right, false).unwrap();
    assert_eq!(view_len(&left), 0);
}

#[test]
fn intersect_all_of_a_view_with_itself_is_identity() {
    let mut left = numbers_view(4);
    let right = numbers_view(4);
    let expected = cell_values(&left, 0);
    left.intersect(right, true).unwrap();
    assert_eq!(cell_values(&left, 0), expected);
}

#[test]
fn except_all_subtracts_multiplicity() {
    let mut left = View::new(
        Header::new("t", &["a"]),
        vec![
            new_record(vec![Value::Integer(1)]),
            new_record(vec![Value::Integer(1)]),
            new_record(vec![Value::Integer(2)]),
        ],
    );
    let right = View::new(
        Header::new("u", &["a"]),
        vec![new_record(vec![Value::Integer(1)])],
    );
    left.except(right, true).unwrap();
    assert_eq!(cell_values(&left, 0), vec![Value::Integer(1), Value::Integer(2)]);
}

#[test]
fn set_operations_check_field_counts() {
    let mut left = numbers_view(2);
    let right = View::new(
        Header::new("u", &["a", "b"]),
        vec![new_record(vec![Value::Integer(1), Value::Integer(2)])],
    );
    let err = left.union(right, false).unwrap_err();
    assert_eq!(
        err.to_string(),
        "[L:- C:-] result set to be combined should contain exactly 1 fields"
    );
}

fn view_len(view: &View) -> usize {
    view.record_len()
}
