//! GROUP BY and aggregate functions (COUNT, SUM, AVG, MIN, MAX)

use crate::core::{SemanticError, Value};
use crate::parser::{AggregateFunction, BinaryOp};
use crate::planner::{AggregateCall, AggregatePlan};
use super::evaluate::{divide_by_count, Evaluator};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Row of values with the total order used for grouping, DISTINCT and
/// UNIQUE checks; NULLs compare equal to each other here
#[derive(Debug, Clone)]
pub struct GroupKey(pub Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| a.total_cmp(b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

/// Running state of one aggregate call within one group
#[derive(Debug)]
struct Accumulator {
    func: AggregateFunction,
    /// Values already seen, for DISTINCT calls
    seen: Option<BTreeSet<GroupKey>>,
    count: i64,
    value: Option<Value>,
}

impl Accumulator {
    fn new(call: &AggregateCall) -> Self {
        Self {
            func: call.func,
            seen: call.distinct.then(BTreeSet::new),
            count: 0,
            value: None,
        }
    }

    /// `value` is `None` for `COUNT(*)`
    fn update(&mut self, value: Option<Value>) -> Result<(), SemanticError> {
        let Some(value) = value else {
            self.count += 1;
            return Ok(());
        };
        if value.is_null() {
            return Ok(());
        }
        if let Some(seen) = &mut self.seen {
            if !seen.insert(GroupKey(vec![value.clone()])) {
                return Ok(());
            }
        }

        self.count += 1;
        self.value = Some(match (self.func, self.value.take()) {
            (AggregateFunction::Count, _) => Value::Null,
            (_, None) => {
                if matches!(self.func, AggregateFunction::Sum | AggregateFunction::Avg)
                    && !value.data_type().is_some_and(crate::core::DataType::is_numeric)
                {
                    return Err(SemanticError::Evaluation(format!(
                        "{} is not defined for {}",
                        self.func,
                        value.data_type().map_or_else(String::new, |t| t.to_string())
                    )));
                }
                value
            }
            (AggregateFunction::Sum | AggregateFunction::Avg, Some(acc)) => {
                Evaluator::arithmetic(BinaryOp::Plus, &acc, &value)?
            }
            (AggregateFunction::Min, Some(acc)) => min_max(acc, value, Ordering::Less)?,
            (AggregateFunction::Max, Some(acc)) => min_max(acc, value, Ordering::Greater)?,
        });
        Ok(())
    }

    fn finish(self) -> Result<Value, SemanticError> {
        match self.func {
            AggregateFunction::Count => Ok(Value::Integer(self.count)),
            AggregateFunction::Avg => match self.value {
                Some(sum) => divide_by_count(&sum, self.count),
                None => Ok(Value::Null),
            },
            AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => {
                Ok(self.value.unwrap_or(Value::Null))
            }
        }
    }
}

/// Keeps `current` unless `candidate` orders `wanted` relative to it
fn min_max(current: Value, candidate: Value, wanted: Ordering) -> Result<Value, SemanticError> {
    match candidate.sql_cmp(&current) {
        Some(o) if o == wanted => Ok(candidate),
        Some(_) => Ok(current),
        None => Err(SemanticError::Evaluation(format!(
            "cannot compare {candidate} with {current}"
        ))),
    }
}

pub struct AggregateExecutor;

impl AggregateExecutor {
    /// Groups `rows` and evaluates the aggregate calls per group.
    ///
    /// Each output row holds the group key values followed by one value per
    /// call. Groups come out in order of first appearance. Without GROUP BY
    /// there is exactly one group, even for empty input.
    pub fn aggregate(
        rows: Vec<Vec<Value>>,
        plan: &AggregatePlan,
    ) -> Result<Vec<Vec<Value>>, SemanticError> {
        let new_group = || plan.calls.iter().map(Accumulator::new).collect::<Vec<_>>();

        let mut index: BTreeMap<GroupKey, usize> = BTreeMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<Accumulator>)> = Vec::new();
        if plan.group_by.is_empty() {
            index.insert(GroupKey(Vec::new()), 0);
            groups.push((Vec::new(), new_group()));
        }

        for row in rows {
            let key = plan
                .group_by
                .iter()
                .map(|e| Evaluator::evaluate(e, &row))
                .collect::<Result<Vec<_>, _>>()?;
            let slot = match index.get(&GroupKey(key.clone())) {
                Some(&slot) => slot,
                None => {
                    index.insert(GroupKey(key.clone()), groups.len());
                    groups.push((key, new_group()));
                    groups.len() - 1
                }
            };

            for (call, acc) in plan.calls.iter().zip(groups[slot].1.iter_mut()) {
                let value = call
                    .arg
                    .as_ref()
                    .map(|arg| Evaluator::evaluate(arg, &row))
                    .transpose()?;
                acc.update(value)?;
            }
        }

        groups
            .into_iter()
            .map(|(mut key, accumulators)| {
                for acc in accumulators {
                    key.push(acc.finish()?);
                }
                Ok(key)
            })
            .collect()
    }
}
