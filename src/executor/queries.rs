//! Query (SELECT) operations
//!
//! Scan, nested-loop JOIN, filter, GROUP BY, ORDER BY, DISTINCT, LIMIT

use crate::core::{EngineError, Value};
use crate::parser::{JoinType, SortOrder};
use crate::planner::{BoundExpr, SelectPlan, Source};
use crate::storage::Storage;
use super::aggregate::{AggregateExecutor, GroupKey};
use super::evaluate::Evaluator;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

pub struct SelectExecutor;

impl SelectExecutor {
    /// Runs a SELECT plan and returns its rows in output order
    pub fn execute(
        storage: &dyn Storage,
        plan: &SelectPlan,
    ) -> Result<Vec<Vec<Value>>, EngineError> {
        let mut rows = Self::join_sources(storage, &plan.sources)?;

        if let Some(filter) = &plan.filter {
            rows = Self::filter(rows, filter)?;
        }

        if let Some(aggregate) = &plan.aggregate {
            rows = AggregateExecutor::aggregate(rows, aggregate)?;
            if let Some(having) = &plan.having {
                rows = Self::filter(rows, having)?;
            }
        }

        let mut output = rows
            .iter()
            .map(|row| {
                let keys = plan
                    .order_by
                    .iter()
                    .map(|(e, _)| Evaluator::evaluate(e, row))
                    .collect::<Result<Vec<_>, _>>()?;
                let values = plan
                    .projection
                    .iter()
                    .map(|e| Evaluator::evaluate(e, row))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((keys, values))
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        if !plan.order_by.is_empty() {
            output.sort_by(|(a, _), (b, _)| Self::compare_keys(a, b, &plan.order_by));
        }

        let mut rows: Vec<Vec<Value>> = output.into_iter().map(|(_, values)| values).collect();

        if plan.distinct {
            let mut seen = BTreeSet::new();
            rows.retain(|row| seen.insert(GroupKey(row.clone())));
        }

        let offset = plan.offset.unwrap_or(0);
        let limit = plan.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    /// NULLs sort last ascending and first descending
    fn compare_keys(a: &[Value], b: &[Value], order_by: &[(BoundExpr, SortOrder)]) -> Ordering {
        a.iter()
            .zip(b)
            .zip(order_by)
            .map(|((a, b), (_, order))| match order {
                SortOrder::Asc => a.total_cmp(b),
                SortOrder::Desc => b.total_cmp(a),
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn filter(rows: Vec<Vec<Value>>, predicate: &BoundExpr) -> Result<Vec<Vec<Value>>, EngineError> {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if Evaluator::is_true(predicate, &row)? {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    /// Rows of one table with its pushed-down filter applied
    fn scan(storage: &dyn Storage, source: &Source) -> Result<Vec<Vec<Value>>, EngineError> {
        let entries = match &source.index {
            Some(index) => {
                debug!(table = %source.table, index = %index.name, "select: index lookup");
                storage.scan_index(&source.table, &index.name, &index.value)?
            }
            None => storage.scan_rows(&source.table)?,
        };
        let mut rows = Vec::new();
        for entry in entries {
            let (_, row) = entry?;
            let keep = match &source.filter {
                Some(filter) => Evaluator::is_true(filter, &row.values)?,
                None => true,
            };
            if keep {
                rows.push(row.values);
            }
        }
        Ok(rows)
    }

    /// Combined rows of the FROM table and its joins, nested-loop style
    fn join_sources(
        storage: &dyn Storage,
        sources: &[Source],
    ) -> Result<Vec<Vec<Value>>, EngineError> {
        let Some((first, joined)) = sources.split_first() else {
            // SELECT without FROM yields one empty row
            return Ok(vec![Vec::new()]);
        };

        let mut rows = Self::scan(storage, first)?;
        for source in joined {
            let Some(join) = &source.join else {
                continue;
            };
            let right = Self::scan(storage, source)?;
            let mut combined = Vec::new();

            for left in rows {
                let mut matched = false;
                for candidate in &right {
                    let mut row = left.clone();
                    row.extend(candidate.iter().cloned());
                    if Evaluator::is_true(&join.on, &row)? {
                        matched = true;
                        combined.push(row);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    let mut row = left;
                    row.extend(std::iter::repeat_n(Value::Null, source.width));
                    combined.push(row);
                }
            }
            rows = combined;
        }
        Ok(rows)
    }
}
