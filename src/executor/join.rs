//! Join condition synthesis and the join operators.
//!
//! NATURAL and USING joins are rewritten into equality conjunctions over
//! qualified field references before execution; the surviving join column
//! of each pair is merged to the front of the output header and marked
//! `is_join_column`. The inner-join probe shards the outer scan across
//! the range scheduler; output order is the outer side's order, then the
//! inner side's order per outer row.

use crate::error::{Position, Result};
use crate::executor::exec_expr::{evaluate_ternary, is_parallel_safe};
use crate::executor::parallel::RangeScheduler;
use crate::executor::scope::{Environment, FilterRecord};
use crate::executor::view::{Cell, FieldLookup, Header, HeaderField, Record, View};
use crate::parser::ast::{
    ComparisonOperator, Expr, Identifier, Join, JoinCondition, JoinDirection, LogicOperator,
};
use crate::storage::value::{Ternary, Value};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedJoinCondition {
    pub condition: Option<Expr>,
    /// Surviving join columns, qualified by their side's view name.
    pub include_fields: Vec<(String, String)>,
    /// Suppressed join columns from the other side, pairwise with
    /// `include_fields`.
    pub exclude_fields: Vec<(String, String)>,
}

/// Derive the effective ON condition of a join. NATURAL synthesises one
/// equality per shared column name; USING does the same for the listed
/// columns with ambiguity checks on both sides.
pub fn parse_join_condition(join: &Join, left: &View, right: &View) -> Result<ParsedJoinCondition> {
    if join.natural {
        let mut pairs = Vec::new();
        for field in left.header.iter() {
            if !field.is_from_table || field.is_internal_id() {
                continue;
            }
            if left.header.search_index(None, &field.column).is_err() {
                // Duplicated on the left side; natural pairing skips it.
                continue;
            }
            if let Ok(right_idx) = right.header.search_index(None, &field.column) {
                let right_field = &right.header[right_idx];
                pairs.push((
                    (field.view.clone(), field.column.clone()),
                    (right_field.view.clone(), right_field.column.clone()),
                ));
            }
        }
        return Ok(build_equality_condition(pairs, right_preserving(join)));
    }

    match &join.condition {
        None => Ok(ParsedJoinCondition::default()),
        Some(JoinCondition::On(expr)) => Ok(ParsedJoinCondition {
            condition: Some(expr.clone()),
            ..ParsedJoinCondition::default()
        }),
        Some(JoinCondition::Using(columns)) => {
            let mut pairs = Vec::new();
            for column in columns {
                let left_idx = left
                    .header
                    .search_index(None, &column.literal)
                    .map_err(|lookup| lookup.into_error(&column.literal, column.pos))?;
                let right_idx = right
                    .header
                    .search_index(None, &column.literal)
                    .map_err(|lookup| lookup.into_error(&column.literal, column.pos))?;
                let left_field = &left.header[left_idx];
                let right_field = &right.header[right_idx];
                pairs.push((
                    (left_field.view.clone(), left_field.column.clone()),
                    (right_field.view.clone(), right_field.column.clone()),
                ));
            }
            Ok(build_equality_condition(pairs, right_preserving(join)))
        }
    }
}

fn right_preserving(join: &Join) -> bool {
    join.direction == Some(JoinDirection::Right)
}

type FieldPair = ((String, String), (String, String));

fn build_equality_condition(pairs: Vec<FieldPair>, right_preserving: bool) -> ParsedJoinCondition {
    let mut condition: Option<Expr> = None;
    let mut include_fields = Vec::with_capacity(pairs.len());
    let mut exclude_fields = Vec::with_capacity(pairs.len());

    for ((left_view, left_column), (right_view, right_column)) in pairs {
        let comparison = Expr::Comparison {
            lhs: Box::new(reference(&left_view, &left_column)),
            rhs: Box::new(reference(&right_view, &right_column)),
            operator: ComparisonOperator::Equal,
            pos: Position::UNKNOWN,
        };
        condition = Some(match condition {
            None => comparison,
            Some(existing) => Expr::Logic {
                lhs: Box::new(existing),
                rhs: Box::new(comparison),
                operator: LogicOperator::And,
                pos: Position::UNKNOWN,
            },
        });
        if right_preserving {
            include_fields.push((right_view.clone(), right_column.clone()));
            exclude_fields.push((left_view, left_column));
        } else {
            include_fields.push((left_view, left_column));
            exclude_fields.push((right_view, right_column));
        }
    }

    ParsedJoinCondition {
        condition,
        include_fields,
        exclude_fields,
    }
}

fn reference(view: &str, column: &str) -> Expr {
    Expr::FieldReference {
        view: if view.is_empty() {
            None
        } else {
            Some(Identifier::new(view))
        },
        column: Identifier::new(column),
        pos: Position::UNKNOWN,
    }
}

// ---------------------------------------------------------------------------
// Join operators
// ---------------------------------------------------------------------------

/// Cartesian product. The merged header keeps both sides' internal-id
/// columns when present.
pub fn cross_join(left: View, right: View) -> View {
    let header = Header::merge(left.header.clone(), right.header.clone());
    let mut record_set = Vec::with_capacity(left.record_len() * right.record_len().max(1));
    for left_record in &left.record_set {
        for right_record in &right.record_set {
            let mut merged = Vec::with_capacity(left_record.len() + right_record.len());
            merged.extend(left_record.iter().cloned());
            merged.extend(right_record.iter().cloned());
            record_set.push(merged);
        }
    }
    let mut view = View::new(header, record_set);
    view.use_internal_id = left.use_internal_id || right.use_internal_id;
    view
}

fn null_padding(len: usize) -> Vec<Cell> {
    (0..len).map(|_| Cell::Single(Value::Null)).collect()
}

struct JoinProbe<'a> {
    header: Header,
    condition: Option<&'a Expr>,
    outer: &'a [FilterRecord<'a>],
}

impl JoinProbe<'_> {
    /// Evaluate the join predicate against the concatenation of one record
    /// from each side.
    fn matches(
        &self,
        env: &mut Environment,
        left_record: &Record,
        right_record: &Record,
    ) -> Result<Option<Record>> {
        let mut merged = Vec::with_capacity(left_record.len() + right_record.len());
        merged.extend(left_record.iter().cloned());
        merged.extend(right_record.iter().cloned());

        let Some(condition) = self.condition else {
            return Ok(Some(merged));
        };

        let mut scratch = View::new(self.header.clone(), Vec::new());
        scratch.record_set.push(merged);
        let matched = {
            let mut stack = Vec::with_capacity(self.outer.len() + 1);
            stack.push(FilterRecord {
                view: &scratch,
                record_index: 0,
            });
            stack.extend_from_slice(self.outer);
            evaluate_ternary(condition, env, &stack)? == Ternary::True
        };
        Ok(if matched {
            Some(scratch.record_set.pop().expect("scratch record"))
        } else {
            None
        })
    }
}

/// Inner join: cross product filtered by the condition, sharded over the
/// outer relation's records.
pub fn inner_join(
    left: View,
    right: View,
    condition: Option<&Expr>,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<View> {
    if condition.is_none() {
        return Ok(cross_join(left, right));
    }

    let header = Header::merge(left.header.clone(), right.header.clone());
    let probe = JoinProbe {
        header: header.clone(),
        condition,
        outer,
    };

    let scheduler = RangeScheduler::new(left.record_len(), env.flags.effective_cpu());
    let parallel_ok = condition.map(is_parallel_safe).unwrap_or(true);

    let record_set = if parallel_ok && scheduler.partitions() > 1 {
        let snapshot = env.clone();
        scheduler.scatter(|_, range| {
            let mut worker_env = snapshot.clone();
            let mut out = Vec::new();
            for left_idx in range {
                for right_record in &right.record_set {
                    if let Some(record) =
                        probe.matches(&mut worker_env, &left.record_set[left_idx], right_record)?
                    {
                        out.push(record);
                    }
                }
            }
            Ok(out)
        })?
    } else {
        let mut out = Vec::new();
        for left_record in &left.record_set {
            for right_record in &right.record_set {
                if let Some(record) = probe.matches(env, left_record, right_record)? {
                    out.push(record);
                }
            }
        }
        out
    };

    let mut view = View::new(header, record_set);
    view.use_internal_id = left.use_internal_id || right.use_internal_id;
    Ok(view)
}

/// Outer join. The preserving side(s) iterate in order; rows without a
/// match get Null padding for the other side.
pub fn outer_join(
    left: View,
    right: View,
    condition: Option<&Expr>,
    direction: JoinDirection,
    env: &mut Environment,
    outer: &[FilterRecord<'_>],
) -> Result<View> {
    let header = Header::merge(left.header.clone(), right.header.clone());
    let probe = JoinProbe {
        header: header.clone(),
        condition,
        outer,
    };

    let left_width = left.header.len();
    let right_width = right.header.len();
    let mut record_set = Vec::new();

    match direction {
        JoinDirection::Right => {
            for right_record in &right.record_set {
                let mut matched = false;
                for left_record in &left.record_set {
                    if let Some(record) = probe.matches(env, left_record, right_record)? {
                        matched = true;
                        record_set.push(record);
                    }
                }
                if !matched {
                    let mut record = null_padding(left_width);
                    record.extend(right_record.iter().cloned());
                    record_set.push(record);
                }
            }
        }
        JoinDirection::Left | JoinDirection::Full => {
            let mut right_matched = vec![false; right.record_len()];
            for left_record in &left.record_set {
                let mut matched = false;
                for (right_idx, right_record) in right.record_set.iter().enumerate() {
                    if let Some(record) = probe.matches(env, left_record, right_record)? {
                        matched = true;
                        right_matched[right_idx] = true;
                        record_set.push(record);
                    }
                }
                if !matched {
                    let mut record = left_record.clone();
                    record.extend(null_padding(right_width));
                    record_set.push(record);
                }
            }
            if direction == JoinDirection::Full {
                for (right_idx, right_record) in right.record_set.iter().enumerate() {
                    if !right_matched[right_idx] {
                        let mut record = null_padding(left_width);
                        record.extend(right_record.iter().cloned());
                        record_set.push(record);
                    }
                }
            }
        }
    }

    let mut view = View::new(header, record_set);
    view.use_internal_id = left.use_internal_id || right.use_internal_id;
    Ok(view)
}

/// Restructure a joined view after NATURAL / USING: the surviving join
/// columns move to the front without a view qualifier, the suppressed
/// columns disappear, and unmatched-side padding is healed by coalescing
/// each surviving cell with its suppressed twin.
pub fn merge_join_columns(
    view: &mut View,
    include_fields: &[(String, String)],
    exclude_fields: &[(String, String)],
) -> Result<()> {
    let mut include_idx = Vec::with_capacity(include_fields.len());
    for (qualifier, column) in include_fields {
        let idx = view
            .header
            .search_index(Some(qualifier), column)
            .map_err(|lookup: FieldLookup| {
                lookup.into_error(&format!("{}.{}", qualifier, column), Position::UNKNOWN)
            })?;
        include_idx.push(idx);
    }
    let mut exclude_idx = Vec::with_capacity(exclude_fields.len());
    for (qualifier, column) in exclude_fields {
        let idx = view
            .header
            .search_index(Some(qualifier), column)
            .map_err(|lookup: FieldLookup| {
                lookup.into_error(&format!("{}.{}", qualifier, column), Position::UNKNOWN)
            })?;
        exclude_idx.push(idx);
    }

    let mut order = Vec::with_capacity(view.header.len());
    order.extend(include_idx.iter().copied());
    for idx in 0..view.header.len() {
        if !include_idx.contains(&idx) && !exclude_idx.contains(&idx) {
            order.push(idx);
        }
    }

    let mut fields = Vec::with_capacity(order.len());
    for (slot, &idx) in order.iter().enumerate() {
        if slot < include_idx.len() {
            fields.push(HeaderField {
                column: view.header[idx].column.clone(),
                is_from_table: true,
                is_join_column: true,
                ..HeaderField::default()
            });
        } else {
            fields.push(view.header[idx].clone());
        }
    }

    let record_set = view
        .record_set
        .iter()
        .map(|record| {
            order
                .iter()
                .enumerate()
                .map(|(slot, &idx)| {
                    if slot < include_idx.len() {
                        let surviving = record[idx].value();
                        if surviving.is_null() {
                            record[exclude_idx[slot]].clone()
                        } else {
                            record[idx].clone()
                        }
                    } else {
                        record[idx].clone()
                    }
                })
                .collect()
        })
        .collect();

    view.header = Header::from_fields(fields);
    view.record_set = record_set;
    Ok(())
}
