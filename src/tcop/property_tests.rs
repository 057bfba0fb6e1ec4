use proptest::prelude::*;

use crate::config::Flags;
use crate::error::Position;
use crate::executor::exec_main::{group_by, order_by, where_};
use crate::executor::scope::Environment;
use crate::executor::view::{new_record, Cell, Header, View};
use crate::parser::ast::{
    ArithmeticOperator, ComparisonOperator, Expr, OrderByClause, OrderItem,
};
use crate::storage::value::{Ternary, Value};
use crate::utils::adt::arithmetic::calculate;
use crate::utils::adt::comparison::compare;

fn test_env(cpu: usize) -> Environment {
    Environment::new(Flags {
        cpu,
        quiet: true,
        ..Flags::default()
    })
}

fn ternary_strategy() -> impl Strategy<Value = Ternary> {
    prop_oneof![
        Just(Ternary::True),
        Just(Ternary::False),
        Just(Ternary::Unknown),
    ]
}

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<i32>().prop_map(|v| Value::Integer(v as i64)),
        (-1000i32..1000).prop_map(|v| Value::Float(v as f64 / 8.0)),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

fn int_view(values: &[i64]) -> View {
    View::new(
        Header::new("t", &["n"]),
        values
            .iter()
            .map(|v| new_record(vec![Value::Integer(*v)]))
            .collect(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ternary_and_is_false_dominant(x in ternary_strategy()) {
        prop_assert_eq!(x.and(Ternary::False), Ternary::False);
        prop_assert_eq!(Ternary::False.and(x), Ternary::False);
    }

    #[test]
    fn ternary_or_is_true_dominant(x in ternary_strategy()) {
        prop_assert_eq!(x.or(Ternary::True), Ternary::True);
        prop_assert_eq!(Ternary::True.or(x), Ternary::True);
    }

    #[test]
    fn ternary_not_is_an_involution(x in ternary_strategy()) {
        prop_assert_eq!(x.not().not(), x);
    }

    #[test]
    fn null_poisons_arithmetic(v in scalar_strategy()) {
        for op in [
            ArithmeticOperator::Add,
            ArithmeticOperator::Subtract,
            ArithmeticOperator::Multiply,
            ArithmeticOperator::Divide,
            ArithmeticOperator::Modulo,
        ] {
            prop_assert_eq!(calculate(&Value::Null, &v, op), Value::Null);
            prop_assert_eq!(calculate(&v, &Value::Null, op), Value::Null);
        }
    }

    #[test]
    fn null_comparison_is_always_unknown(v in scalar_strategy()) {
        for op in [
            ComparisonOperator::Equal,
            ComparisonOperator::NotEqual,
            ComparisonOperator::Less,
            ComparisonOperator::Greater,
        ] {
            prop_assert_eq!(compare(&Value::Null, &v, op), Ternary::Unknown);
        }
    }

    #[test]
    fn integer_addition_matches_wrapping_semantics(a in any::<i64>(), b in any::<i64>()) {
        prop_assert_eq!(
            calculate(&Value::Integer(a), &Value::Integer(b), ArithmeticOperator::Add),
            Value::Integer(a.wrapping_add(b))
        );
    }

    #[test]
    fn parallel_where_is_deterministic(
        values in proptest::collection::vec(-100i64..100, 0..700),
        threshold in -100i64..100,
    ) {
        let condition = Expr::Comparison {
            lhs: Box::new(Expr::field("n")),
            rhs: Box::new(Expr::literal(Value::Integer(threshold))),
            operator: ComparisonOperator::GreaterOrEqual,
            pos: Position::UNKNOWN,
        };

        let mut expected = int_view(&values);
        where_(&mut expected, &condition, &mut test_env(1), &[]).unwrap();

        for cpu in [2usize, 4, 8] {
            let mut view = int_view(&values);
            where_(&mut view, &condition, &mut test_env(cpu), &[]).unwrap();
            prop_assert_eq!(&view, &expected);
        }
    }

    #[test]
    fn union_all_concatenates(
        left in proptest::collection::vec(-20i64..20, 0..40),
        right in proptest::collection::vec(-20i64..20, 0..40),
    ) {
        let mut combined = int_view(&left);
        combined.union(int_view(&right), true).unwrap();
        let mut expected = left.clone();
        expected.extend(&right);
        let got: Vec<i64> = combined
            .record_set
            .iter()
            .map(|record| match record[0].value() {
                Value::Integer(v) => *v,
                _ => unreachable!(),
            })
            .collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn except_of_self_is_empty(values in proptest::collection::vec(-20i64..20, 0..40)) {
        let mut view = int_view(&values);
        view.except(int_view(&values), false).unwrap();
        prop_assert_eq!(view.record_len(), 0);
    }

    #[test]
    fn intersect_all_of_self_is_identity(values in proptest::collection::vec(-20i64..20, 0..40)) {
        let mut view = int_view(&values);
        view.intersect(int_view(&values), true).unwrap();
        prop_assert_eq!(view.record_len(), values.len());
    }

    #[test]
    fn group_cells_share_the_group_multiplicity(
        values in proptest::collection::vec(0i64..5, 1..60),
    ) {
        let mut view = View::new(
            Header::new("t", &["k", "n"]),
            values
                .iter()
                .enumerate()
                .map(|(i, v)| new_record(vec![Value::Integer(*v), Value::Integer(i as i64)]))
                .collect(),
        );
        group_by(&mut view, &[Expr::field("k")], &mut test_env(1), &[]).unwrap();

        let mut distinct = values.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(view.record_len(), distinct.len());

        for record in &view.record_set {
            let multiplicity = record[0].len();
            for cell in record {
                prop_assert!(matches!(cell, Cell::Group(_)));
                prop_assert_eq!(cell.len(), multiplicity);
            }
        }
    }

    #[test]
    fn order_by_is_stable_on_equal_keys(
        keys in proptest::collection::vec(0i64..4, 0..80),
    ) {
        // Tag each record with its input position, sort by the key, and
        // check positions stay increasing within one key.
        let mut view = View::new(
            Header::new("t", &["k", "tag"]),
            keys.iter()
                .enumerate()
                .map(|(i, k)| new_record(vec![Value::Integer(*k), Value::Integer(i as i64)]))
                .collect(),
        );
        order_by(
            &mut view,
            &OrderByClause {
                items: vec![OrderItem {
                    value: Expr::field("k"),
                    direction: None,
                    nulls: None,
                }],
                pos: Position::UNKNOWN,
            },
            &mut test_env(1),
            &[],
        )
        .unwrap();

        let mut last: Option<(i64, i64)> = None;
        for record in &view.record_set {
            let (Value::Integer(k), Value::Integer(tag)) =
                (record[0].value(), record[1].value())
            else {
                unreachable!()
            };
            if let Some((prev_k, prev_tag)) = last {
                prop_assert!(prev_k <= *k);
                if prev_k == *k {
                    prop_assert!(prev_tag < *tag);
                }
            }
            last = Some((*k, *tag));
        }
    }

    #[test]
    fn fix_is_idempotent(values in proptest::collection::vec(-50i64..50, 0..30)) {
        let mut view = int_view(&values);
        view.fix();
        let once = view.clone();
        view.fix();
        prop_assert_eq!(view, once);
    }
}
