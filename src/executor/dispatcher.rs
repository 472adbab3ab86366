use crate::core::{EngineError, Payload};
use crate::parser::Statement;
use crate::planner::{Plan, Planner, SkipReason};
use crate::storage::Storage;
use crate::transaction::TransactionMode;
use tracing::{debug, warn};

use super::ddl::DdlExecutor;
use super::dml::DmlExecutor;
use super::queries::SelectExecutor;

pub struct QueryExecutor;

impl QueryExecutor {
    /// Plans and runs one statement against `storage`.
    ///
    /// A mutating statement outside an explicit transaction runs inside an
    /// implicit statement transaction: committed when it succeeds, rolled
    /// back when it fails, so it is applied fully or not at all.
    pub fn execute(storage: &mut dyn Storage, stmt: Statement) -> Result<Payload, EngineError> {
        let implicit = stmt.is_mutation() && !storage.in_transaction();
        if !implicit {
            return Self::run(storage, stmt);
        }

        storage.begin(TransactionMode::Statement)?;
        match Self::run(storage, stmt) {
            Ok(payload) => {
                storage.commit()?;
                Ok(payload)
            }
            Err(e) => {
                if let Err(rollback) = storage.rollback() {
                    warn!(error = %rollback, "statement rollback failed");
                }
                Err(e)
            }
        }
    }

    fn run(storage: &mut dyn Storage, stmt: Statement) -> Result<Payload, EngineError> {
        let plan = Planner::plan(&*storage, stmt)?;
        debug!(plan = plan_name(&plan), "executing");

        match plan {
            // DDL operations - delegate to DdlExecutor
            Plan::CreateTable { schema, .. } => DdlExecutor::create_table(storage, schema),
            Plan::CreateTableAs { name, query, .. } => {
                DdlExecutor::create_table_as(storage, name, &query)
            }
            Plan::DropTable { names, .. } => DdlExecutor::drop_table(storage, &names),
            Plan::AlterTable {
                table,
                schema,
                rewrite,
            } => DdlExecutor::alter_table(storage, &table, schema, &rewrite),
            Plan::CreateIndex { table, index } => DdlExecutor::create_index(storage, &table, index),
            Plan::DropIndex { table, name } => DdlExecutor::drop_index(storage, &table, &name),
            Plan::ShowTables => DdlExecutor::show_tables(&*storage),
            Plan::ShowColumns { schema } => Ok(DdlExecutor::show_columns(schema)),
            Plan::ShowVersion => Ok(DdlExecutor::show_version()),

            // DML operations - delegate to DmlExecutor
            Plan::Insert { schema, source } => DmlExecutor::insert(storage, &schema, &source),
            Plan::Update {
                schema,
                assignments,
                filter,
            } => DmlExecutor::update(storage, &schema, &assignments, filter.as_ref()),
            Plan::Delete { table, filter } => DmlExecutor::delete(storage, &table, filter.as_ref()),

            Plan::Select(query) => {
                let rows = SelectExecutor::execute(&*storage, &query)?;
                Ok(Payload::Select {
                    labels: query.labels,
                    rows,
                })
            }

            // Transaction control
            Plan::Begin => {
                storage.begin(TransactionMode::Explicit)?;
                Ok(Payload::StartTransaction)
            }
            Plan::Commit => {
                storage.commit()?;
                Ok(Payload::Commit)
            }
            Plan::Rollback => {
                storage.rollback()?;
                Ok(Payload::Rollback)
            }

            Plan::Skip(SkipReason::TableExists) => Ok(Payload::Create { rows: 0 }),
            Plan::Skip(SkipReason::ColumnMissing) => Ok(Payload::AlterTable),
        }
    }
}

const fn plan_name(plan: &Plan) -> &'static str {
    match plan {
        Plan::CreateTable { .. } => "create table",
        Plan::CreateTableAs { .. } => "create table as",
        Plan::DropTable { .. } => "drop table",
        Plan::AlterTable { .. } => "alter table",
        Plan::CreateIndex { .. } => "create index",
        Plan::DropIndex { .. } => "drop index",
        Plan::Insert { .. } => "insert",
        Plan::Update { .. } => "update",
        Plan::Delete { .. } => "delete",
        Plan::Select(_) => "select",
        Plan::Begin => "begin",
        Plan::Commit => "commit",
        Plan::Rollback => "rollback",
        Plan::ShowTables | Plan::ShowColumns { .. } | Plan::ShowVersion => "show",
        Plan::Skip(_) => "skip",
    }
}
