//! DDL (Data Definition Language) operations
//!
//! CREATE TABLE, DROP TABLE, ALTER TABLE, CREATE / DROP INDEX,
//! SHOW TABLES / COLUMNS / VERSION

use crate::core::{
    Column, ConstraintError, DataType, EngineError, Payload, Schema, SchemaIndex, Value,
};
use crate::planner::{RowRewrite, SelectPlan};
use crate::storage::Storage;
use super::dml::{check_unique, conform_row};
use super::queries::SelectExecutor;

pub struct DdlExecutor;

impl DdlExecutor {
    /// Execute CREATE TABLE
    pub fn create_table(storage: &mut dyn Storage, schema: Schema) -> Result<Payload, EngineError> {
        storage.insert_schema(schema)?;
        Ok(Payload::Create { rows: 0 })
    }

    /// Execute CREATE TABLE ... AS SELECT
    ///
    /// Column types come from the query where they are known statically,
    /// otherwise from the first non-NULL value of the column, falling back
    /// to TEXT.
    pub fn create_table_as(
        storage: &mut dyn Storage,
        name: String,
        query: &SelectPlan,
    ) -> Result<Payload, EngineError> {
        let rows = SelectExecutor::execute(&*storage, query)?;

        let columns = query
            .labels
            .iter()
            .zip(&query.types)
            .enumerate()
            .map(|(idx, (label, data_type))| {
                let data_type = data_type
                    .or_else(|| {
                        rows.iter()
                            .filter_map(|row| row.get(idx))
                            .find_map(Value::data_type)
                    })
                    .unwrap_or(DataType::Text);
                Column::new(label.clone(), data_type)
            })
            .collect();
        let schema = Schema::new(name, columns);

        let rows = rows
            .into_iter()
            .map(|values| conform_row(&schema, values))
            .collect::<Result<Vec<_>, _>>()?;
        let count = rows.len();

        let table = schema.table_name.clone();
        storage.insert_schema(schema)?;
        if count > 0 {
            storage.insert_rows(&table, rows)?;
        }
        Ok(Payload::Create { rows: count })
    }

    /// Execute DROP TABLE; `names` holds only tables that exist
    pub fn drop_table(storage: &mut dyn Storage, names: &[String]) -> Result<Payload, EngineError> {
        for name in names {
            storage.delete_schema(name)?;
        }
        Ok(Payload::DropTable { count: names.len() })
    }

    /// Execute ALTER TABLE by swapping in the new schema with every row
    /// rewritten to match it
    pub fn alter_table(
        storage: &mut dyn Storage,
        table: &str,
        schema: Schema,
        rewrite: &RowRewrite,
    ) -> Result<Payload, EngineError> {
        let mut rows = Vec::new();
        for entry in storage.scan_rows(table)? {
            let (_, mut row) = entry?;
            match rewrite {
                RowRewrite::Keep => {}
                RowRewrite::Append(fill) => {
                    if let Some(column) = schema.columns.last() {
                        if fill.is_null() && !column.nullable {
                            return Err(ConstraintError::NotNull(column.name.clone()).into());
                        }
                    }
                    row.values.push(fill.clone());
                }
                RowRewrite::Remove(idx) => {
                    row.values.remove(*idx);
                }
            }
            rows.push(row);
        }

        if matches!(rewrite, RowRewrite::Append(_)) {
            check_unique(&schema, rows.iter())?;
        }
        storage.replace_schema(table, schema, rows)?;
        Ok(Payload::AlterTable)
    }

    /// Execute CREATE INDEX; the backend indexes the existing rows
    pub fn create_index(
        storage: &mut dyn Storage,
        table: &str,
        index: SchemaIndex,
    ) -> Result<Payload, EngineError> {
        storage.create_index(table, index)?;
        Ok(Payload::CreateIndex)
    }

    pub fn drop_index(storage: &mut dyn Storage, table: &str, name: &str) -> Result<Payload, EngineError> {
        storage.drop_index(table, name)?;
        Ok(Payload::DropIndex)
    }

    /// Execute SHOW TABLES
    pub fn show_tables(storage: &dyn Storage) -> Result<Payload, EngineError> {
        let names: Vec<String> = storage
            .fetch_all_schemas()?
            .into_iter()
            .map(|schema| schema.table_name)
            .collect();
        Ok(Payload::ShowVariable {
            name: "TABLES".to_string(),
            value: names.join(", "),
        })
    }

    pub fn show_columns(schema: Schema) -> Payload {
        Payload::ShowColumns {
            columns: schema
                .columns
                .into_iter()
                .map(|c| (c.name, c.data_type))
                .collect(),
        }
    }

    pub fn show_version() -> Payload {
        Payload::ShowVariable {
            name: "VERSION".to_string(),
            value: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
