//! SQL script export of a whole database

use crate::core::{EngineError, Schema};
use crate::storage::Storage;
use std::io::Write;

/// Rows per generated INSERT statement
const INSERT_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct DumpOptions {
    /// Only CREATE TABLE and CREATE INDEX statements
    pub schema_only: bool,
    /// Only INSERT statements
    pub data_only: bool,
}

/// Writes a script of `CREATE TABLE`, `INSERT` and `CREATE INDEX`
/// statements that recreates every table of `storage`, in table name order
pub fn dump(
    storage: &dyn Storage,
    output: &mut dyn Write,
    options: DumpOptions,
) -> Result<(), EngineError> {
    let schemas = storage.fetch_all_schemas()?;

    writeln!(output, "--").map_err(io)?;
    writeln!(output, "-- pondsql database dump").map_err(io)?;
    writeln!(output, "--").map_err(io)?;
    writeln!(output).map_err(io)?;

    if !options.data_only {
        for schema in &schemas {
            writeln!(output, "{}", schema.to_ddl()).map_err(io)?;
        }
        writeln!(output).map_err(io)?;
    }

    if !options.schema_only {
        for schema in &schemas {
            dump_rows(storage, schema, output)?;
        }
    }

    // Indexes last, so loading the script does not maintain them row by row
    let indexes: Vec<String> = schemas.iter().flat_map(Schema::index_ddl).collect();
    if !options.data_only && !indexes.is_empty() {
        writeln!(output).map_err(io)?;
        for ddl in indexes {
            writeln!(output, "{ddl}").map_err(io)?;
        }
    }
    Ok(())
}

/// Whole dump as a string
pub fn dump_to_string(storage: &dyn Storage, options: DumpOptions) -> Result<String, EngineError> {
    let mut buf = Vec::new();
    dump(storage, &mut buf, options)?;
    String::from_utf8(buf).map_err(|e| io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn dump_rows(storage: &dyn Storage, schema: &Schema, output: &mut dyn Write) -> Result<(), EngineError> {
    let columns = schema.column_names().join(", ");
    let mut batch = Vec::with_capacity(INSERT_BATCH);

    for entry in storage.scan_rows(&schema.table_name)? {
        let (_, row) = entry?;
        let values: Vec<String> = row.values.iter().map(|v| v.to_sql_literal()).collect();
        batch.push(format!("({})", values.join(", ")));
        if batch.len() == INSERT_BATCH {
            write_insert(output, &schema.table_name, &columns, &mut batch)?;
        }
    }
    write_insert(output, &schema.table_name, &columns, &mut batch)
}

fn write_insert(
    output: &mut dyn Write,
    table: &str,
    columns: &str,
    batch: &mut Vec<String>,
) -> Result<(), EngineError> {
    if batch.is_empty() {
        return Ok(());
    }
    writeln!(output, "INSERT INTO {table} ({columns}) VALUES {};", batch.join(", ")).map_err(io)?;
    batch.clear();
    Ok(())
}

fn io(e: std::io::Error) -> EngineError {
    EngineError::Storage(e.into())
}
