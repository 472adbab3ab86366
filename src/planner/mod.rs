// Planner module - binds statements to the live schema

mod expr;
mod plan;
mod scope;
mod select;

pub use expr::{coerce_literal, Binder, Grouping};
pub use plan::{
    AggregateCall, AggregatePlan, BoundExpr, IndexScan, InsertPlan, Join, Plan, RowRewrite,
    ScalarFunction, SelectPlan, SkipReason, Source,
};
pub use scope::{Scope, ScopeColumn};
pub use select::plan_select;

use crate::core::{Column, EngineError, Schema, SchemaIndex, SemanticError, Value};
use crate::executor::Evaluator;
use crate::parser::{AlterTableOperation, ColumnDef, Expr, InsertSource, Statement};
use crate::storage::Storage;

/// Schema of `table`, or a semantic error naming it
pub(crate) fn table_schema(storage: &dyn Storage, table: &str) -> Result<Schema, EngineError> {
    storage
        .fetch_schema(table)?
        .ok_or_else(|| SemanticError::TableNotFound(table.to_string()).into())
}

fn table_exists(storage: &dyn Storage, table: &str) -> Result<bool, EngineError> {
    Ok(storage.fetch_schema(table)?.is_some())
}

pub struct Planner;

impl Planner {
    /// Validates `statement` against the schemas currently held by
    /// `storage`; nothing is written
    pub fn plan(storage: &dyn Storage, statement: Statement) -> Result<Plan, EngineError> {
        match statement {
            Statement::CreateTable {
                name,
                if_not_exists,
                columns,
                as_select,
            } => {
                if table_exists(storage, &name)? {
                    return if if_not_exists {
                        Ok(Plan::Skip(SkipReason::TableExists))
                    } else {
                        Err(SemanticError::TableAlreadyExists(name).into())
                    };
                }
                match as_select {
                    Some(query) => {
                        let query = plan_select(storage, &query)?;
                        check_unique_names(query.labels.iter())?;
                        Ok(Plan::CreateTableAs {
                            name,
                            if_not_exists,
                            query: Box::new(query),
                        })
                    }
                    None => {
                        let columns = columns
                            .into_iter()
                            .map(column_from_def)
                            .collect::<Result<Vec<_>, _>>()?;
                        check_unique_names(columns.iter().map(|c| &c.name))?;
                        Ok(Plan::CreateTable {
                            schema: Schema::new(name, columns),
                            if_not_exists,
                        })
                    }
                }
            }
            Statement::DropTable { names, if_exists } => {
                let mut existing: Vec<String> = Vec::with_capacity(names.len());
                for name in names {
                    if existing.contains(&name) {
                        continue;
                    }
                    if table_exists(storage, &name)? {
                        existing.push(name);
                    } else if !if_exists {
                        return Err(SemanticError::TableNotFound(name).into());
                    }
                }
                Ok(Plan::DropTable {
                    names: existing,
                    if_exists,
                })
            }
            Statement::AlterTable { name, operation } => Self::plan_alter(storage, name, operation),
            Statement::CreateIndex {
                name,
                table,
                column,
            } => {
                let schema = table_schema(storage, &table)?;
                if schema.index(&name).is_some() {
                    return Err(SemanticError::IndexAlreadyExists(name).into());
                }
                let idx = schema
                    .get_column_index(&column)
                    .ok_or(SemanticError::ColumnNotFound(column))?;
                Ok(Plan::CreateIndex {
                    table,
                    index: SchemaIndex::new(name, schema.columns[idx].name.clone()),
                })
            }
            Statement::DropIndex { table, name } => {
                let schema = table_schema(storage, &table)?;
                if schema.index(&name).is_none() {
                    return Err(SemanticError::IndexNotFound(name).into());
                }
                Ok(Plan::DropIndex { table, name })
            }
            Statement::Insert {
                table,
                columns,
                source,
            } => Self::plan_insert(storage, &table, columns, source),
            Statement::Update {
                table,
                assignments,
                filter,
            } => {
                let schema = table_schema(storage, &table)?;
                let scope = Scope::for_table(&schema);

                let mut seen = Vec::with_capacity(assignments.len());
                let mut bound = Vec::with_capacity(assignments.len());
                for (column, expr) in assignments {
                    let idx = scope.resolve(None, &column)?;
                    if seen.contains(&idx) {
                        return Err(SemanticError::DuplicateColumn(column).into());
                    }
                    seen.push(idx);
                    let value = Binder::new(&scope, "UPDATE").bind(&expr)?;
                    bound.push((idx, assign(value, &schema.columns[idx])?));
                }

                let filter = filter
                    .map(|f| Binder::new(&scope, "WHERE").bind(&f))
                    .transpose()?;
                Ok(Plan::Update {
                    schema,
                    assignments: bound,
                    filter,
                })
            }
            Statement::Delete { from, filter } => {
                let schema = table_schema(storage, &from)?;
                let scope = Scope::for_table(&schema);
                let filter = filter
                    .map(|f| Binder::new(&scope, "WHERE").bind(&f))
                    .transpose()?;
                Ok(Plan::Delete {
                    table: from,
                    filter,
                })
            }
            Statement::Select(query) => Ok(Plan::Select(Box::new(plan_select(storage, &query)?))),
            Statement::Begin => Ok(Plan::Begin),
            Statement::Commit => Ok(Plan::Commit),
            Statement::Rollback => Ok(Plan::Rollback),
            Statement::ShowTables => Ok(Plan::ShowTables),
            Statement::ShowColumns { table } => Ok(Plan::ShowColumns {
                schema: table_schema(storage, &table)?,
            }),
            Statement::ShowVersion => Ok(Plan::ShowVersion),
        }
    }

    fn plan_alter(
        storage: &dyn Storage,
        table: String,
        operation: AlterTableOperation,
    ) -> Result<Plan, EngineError> {
        let mut schema = table_schema(storage, &table)?;

        let rewrite = match operation {
            AlterTableOperation::RenameTable(new_name) => {
                if new_name != table && table_exists(storage, &new_name)? {
                    return Err(SemanticError::TableAlreadyExists(new_name).into());
                }
                schema.table_name = new_name;
                RowRewrite::Keep
            }
            AlterTableOperation::RenameColumn { old_name, new_name } => {
                let idx = schema
                    .get_column_index(&old_name)
                    .ok_or_else(|| SemanticError::ColumnNotFound(old_name.clone()))?;
                if schema.get_column_index(&new_name).is_some_and(|other| other != idx) {
                    return Err(SemanticError::DuplicateColumn(new_name).into());
                }
                for index in &mut schema.indexes {
                    if index.column.eq_ignore_ascii_case(&old_name) {
                        index.column.clone_from(&new_name);
                    }
                }
                schema.columns[idx].name = new_name;
                RowRewrite::Keep
            }
            AlterTableOperation::AddColumn(def) => {
                if schema.get_column_index(&def.name).is_some() {
                    return Err(SemanticError::DuplicateColumn(def.name).into());
                }
                let column = column_from_def(def)?;
                let fill = column.default_value();
                schema.columns.push(column);
                RowRewrite::Append(fill)
            }
            AlterTableOperation::DropColumn { name, if_exists } => {
                let Some(idx) = schema.get_column_index(&name) else {
                    return if if_exists {
                        Ok(Plan::Skip(SkipReason::ColumnMissing))
                    } else {
                        Err(SemanticError::ColumnNotFound(name).into())
                    };
                };
                if schema.columns.len() == 1 {
                    return Err(SemanticError::DropLastColumn(table).into());
                }
                let dropped = schema.columns.remove(idx);
                schema
                    .indexes
                    .retain(|index| !index.column.eq_ignore_ascii_case(&dropped.name));
                RowRewrite::Remove(idx)
            }
        };

        Ok(Plan::AlterTable {
            table,
            schema,
            rewrite,
        })
    }

    fn plan_insert(
        storage: &dyn Storage,
        table: &str,
        columns: Option<Vec<String>>,
        source: InsertSource,
    ) -> Result<Plan, EngineError> {
        let schema = table_schema(storage, table)?;

        let targets: Vec<usize> = match columns {
            None => (0..schema.columns.len()).collect(),
            Some(names) => {
                let mut targets = Vec::with_capacity(names.len());
                for name in names {
                    let idx = schema
                        .get_column_index(&name)
                        .ok_or_else(|| SemanticError::ColumnNotFound(name.clone()))?;
                    if targets.contains(&idx) {
                        return Err(SemanticError::DuplicateColumn(name).into());
                    }
                    targets.push(idx);
                }
                targets
            }
        };

        let source = match source {
            InsertSource::Values(rows) => {
                let scope = Scope::new();
                let rows = rows
                    .into_iter()
                    .map(|values| {
                        if values.len() != targets.len() {
                            return Err(EngineError::from(SemanticError::ValueCountMismatch {
                                expected: targets.len(),
                                found: values.len(),
                            }));
                        }

                        let mut row: Vec<BoundExpr> = schema
                            .columns
                            .iter()
                            .map(|c| BoundExpr::Literal(c.default_value()))
                            .collect();
                        for (&idx, expr) in targets.iter().zip(values) {
                            let bound = Binder::new(&scope, "VALUES").bind(&expr)?;
                            row[idx] = assign(bound, &schema.columns[idx])?;
                        }
                        Ok(row)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                InsertPlan::Values(rows)
            }
            InsertSource::Select(query) => {
                let query = plan_select(storage, &query)?;
                if query.projection.len() != targets.len() {
                    return Err(SemanticError::ValueCountMismatch {
                        expected: targets.len(),
                        found: query.projection.len(),
                    }
                    .into());
                }
                InsertPlan::Query {
                    query: Box::new(query),
                    targets,
                }
            }
        };

        Ok(Plan::Insert { schema, source })
    }
}

/// Literal assigned to a column is converted to the column's type now;
/// other expressions are checked when their value is known
fn assign(expr: BoundExpr, column: &Column) -> Result<BoundExpr, SemanticError> {
    match expr {
        BoundExpr::Literal(value) => Ok(BoundExpr::Literal(coerce_literal(
            &value,
            &column.name,
            column.data_type,
        )?)),
        other => Ok(other),
    }
}

fn column_from_def(def: ColumnDef) -> Result<Column, EngineError> {
    let default = def
        .default
        .map(|expr| constant(&expr))
        .transpose()?
        .map(|value| coerce_literal(&value, &def.name, def.data_type))
        .transpose()?
        .filter(|value| !value.is_null());

    Ok(Column {
        name: def.name,
        data_type: def.data_type,
        nullable: def.nullable,
        unique: def.unique || def.primary_key,
        primary_key: def.primary_key,
        default,
    })
}

/// Folds a column-free expression such as a DEFAULT to its value
fn constant(expr: &Expr) -> Result<Value, SemanticError> {
    let bound = Binder::new(&Scope::new(), "DEFAULT").bind(expr)?;
    Evaluator::evaluate(&bound, &[])
}

fn check_unique_names<'a>(names: impl Iterator<Item = &'a String>) -> Result<(), SemanticError> {
    let mut seen: Vec<&str> = Vec::new();
    for name in names {
        if seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            return Err(SemanticError::DuplicateColumn(name.clone()));
        }
        seen.push(name);
    }
    Ok(())
}
