//! DML (Data Manipulation Language) operations
//!
//! INSERT, UPDATE, DELETE. Every statement computes and validates all of
//! its rows first and then applies them with a single storage call.

use crate::core::{ConstraintError, EngineError, Key, Payload, Row, Schema, Value};
use crate::planner::{BoundExpr, InsertPlan};
use crate::storage::Storage;
use super::aggregate::GroupKey;
use super::evaluate::Evaluator;
use super::queries::SelectExecutor;
use std::collections::BTreeSet;

pub struct DmlExecutor;

impl DmlExecutor {
    /// Execute INSERT ... VALUES or INSERT ... SELECT
    pub fn insert(
        storage: &mut dyn Storage,
        schema: &Schema,
        source: &InsertPlan,
    ) -> Result<Payload, EngineError> {
        let candidates: Vec<Vec<Value>> = match source {
            InsertPlan::Values(rows) => rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|expr| Evaluator::evaluate(expr, &[]))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<_, _>>()?,
            InsertPlan::Query { query, targets } => SelectExecutor::execute(&*storage, query)?
                .into_iter()
                .map(|values| {
                    let mut row: Vec<Value> =
                        schema.columns.iter().map(|c| c.default_value()).collect();
                    for (&idx, value) in targets.iter().zip(values) {
                        row[idx] = value;
                    }
                    row
                })
                .collect(),
        };

        let rows = candidates
            .into_iter()
            .map(|values| conform_row(schema, values))
            .collect::<Result<Vec<_>, _>>()?;

        let existing = Self::scan(&*storage, &schema.table_name)?;
        check_unique(
            schema,
            existing.iter().map(|(_, row)| row).chain(rows.iter()),
        )?;

        let count = rows.len();
        if count > 0 {
            storage.insert_rows(&schema.table_name, rows)?;
        }
        Ok(Payload::Insert { rows: count })
    }

    /// Execute UPDATE; assignments see the row as it was before the update
    pub fn update(
        storage: &mut dyn Storage,
        schema: &Schema,
        assignments: &[(usize, BoundExpr)],
        filter: Option<&BoundExpr>,
    ) -> Result<Payload, EngineError> {
        let mut table = Self::scan(&*storage, &schema.table_name)?;
        let mut changed = Vec::new();

        for (pos, (_, row)) in table.iter().enumerate() {
            if !matches(filter, &row.values)? {
                continue;
            }
            let mut values = row.values.clone();
            for (idx, expr) in assignments {
                values[*idx] = Evaluator::evaluate(expr, &row.values)?;
            }
            changed.push((pos, conform_row(schema, values)?));
        }

        let mut updates = Vec::with_capacity(changed.len());
        for (pos, row) in changed {
            table[pos].1 = row.clone();
            updates.push((table[pos].0.clone(), row));
        }
        check_unique(schema, table.iter().map(|(_, row)| row))?;

        let count = updates.len();
        if count > 0 {
            storage.update_rows(&schema.table_name, updates)?;
        }
        Ok(Payload::Update { rows: count })
    }

    /// Execute DELETE
    pub fn delete(
        storage: &mut dyn Storage,
        table: &str,
        filter: Option<&BoundExpr>,
    ) -> Result<Payload, EngineError> {
        let mut keys = Vec::new();
        for (key, row) in Self::scan(&*storage, table)? {
            if matches(filter, &row.values)? {
                keys.push(key);
            }
        }

        let count = keys.len();
        if count > 0 {
            storage.delete_rows(table, keys)?;
        }
        Ok(Payload::Delete { rows: count })
    }

    fn scan(storage: &dyn Storage, table: &str) -> Result<Vec<(Key, Row)>, EngineError> {
        Ok(storage.scan_rows(table)?.collect::<Result<Vec<_>, _>>()?)
    }
}

fn matches(filter: Option<&BoundExpr>, row: &[Value]) -> Result<bool, EngineError> {
    match filter {
        Some(filter) => Ok(Evaluator::is_true(filter, row)?),
        None => Ok(true),
    }
}

/// Checks a candidate row against the table's columns and converts each
/// value to its column type
pub(crate) fn conform_row(schema: &Schema, values: Vec<Value>) -> Result<Row, ConstraintError> {
    if values.len() != schema.columns.len() {
        return Err(ConstraintError::ColumnCountMismatch {
            table: schema.table_name.clone(),
            expected: schema.columns.len(),
            found: values.len(),
        });
    }

    values
        .into_iter()
        .zip(&schema.columns)
        .map(|(value, column)| {
            if value.is_null() && !column.nullable {
                return Err(ConstraintError::NotNull(column.name.clone()));
            }
            value
                .coerce(column.data_type)
                .ok_or_else(|| ConstraintError::IncompatibleValue {
                    column: column.name.clone(),
                    data_type: column.data_type.to_string(),
                    value: value.to_sql_literal(),
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Row::new)
}

/// UNIQUE and PRIMARY KEY columns hold distinct non-NULL values across `rows`
pub(crate) fn check_unique<'a>(
    schema: &Schema,
    rows: impl Iterator<Item = &'a Row> + Clone,
) -> Result<(), ConstraintError> {
    for (idx, column) in schema.columns.iter().enumerate() {
        if !column.unique {
            continue;
        }
        let mut seen = BTreeSet::new();
        for value in rows.clone().filter_map(|row| row.get(idx)) {
            if value.is_null() {
                continue;
            }
            if !seen.insert(GroupKey(vec![value.clone()])) {
                return Err(ConstraintError::Unique {
                    column: column.name.clone(),
                    value: value.to_sql_literal(),
                });
            }
        }
    }
    Ok(())
}
