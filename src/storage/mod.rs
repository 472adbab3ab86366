// Storage module - backend trait and the built-in backends

mod database;
mod json;
mod kv;
mod memory;
mod shared;

pub use database::{DatabaseFile, MemoryDatabase, StoredRow, TableFile};
pub use json::JsonStorage;
pub use kv::{KvConfig, KvMode, KvStorage};
pub use memory::MemoryStorage;
pub use shared::SharedStorage;

use crate::core::{Key, Row, Schema, SchemaIndex, StorageError, Value};
use crate::transaction::{OpenTransactionPolicy, TransactionMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lazy sequence of `(Key, Row)` pairs produced by [`Storage::scan_rows`]
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<(Key, Row), StorageError>> + 'a>;

/// Contract every backend implements.
///
/// Reads observe the open transaction of this handle, if any. Writes made
/// outside a transaction take effect immediately and atomically per call.
pub trait Storage: Send {
    fn fetch_schema(&self, table: &str) -> Result<Option<Schema>, StorageError>;

    /// Every schema, sorted by table name
    fn fetch_all_schemas(&self) -> Result<Vec<Schema>, StorageError>;

    /// Rows of `table` in the backend's natural order
    fn scan_rows(&self, table: &str) -> Result<RowIter<'_>, StorageError>;

    /// Appends rows, allocating a fresh key for each
    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<(), StorageError>;

    fn update_rows(&mut self, table: &str, rows: Vec<(Key, Row)>) -> Result<(), StorageError>;

    fn delete_rows(&mut self, table: &str, keys: Vec<Key>) -> Result<(), StorageError>;

    fn insert_schema(&mut self, schema: Schema) -> Result<(), StorageError>;

    /// Swaps the definition of `table` and its whole row set in one step.
    /// `schema.table_name` may differ from `table` to rename it.
    fn replace_schema(
        &mut self,
        table: &str,
        schema: Schema,
        rows: Vec<Row>,
    ) -> Result<(), StorageError>;

    fn delete_schema(&mut self, table: &str) -> Result<(), StorageError>;

    /// Adds `index` to the schema of `table` and builds it over the
    /// existing rows
    fn create_index(&mut self, table: &str, index: SchemaIndex) -> Result<(), StorageError>;

    fn drop_index(&mut self, table: &str, name: &str) -> Result<(), StorageError>;

    /// Rows whose column covered by index `name` equals `value`, in the
    /// backend's natural order. `value` must already have the column's
    /// type; NULL matches nothing.
    fn scan_index(&self, table: &str, name: &str, value: &Value)
        -> Result<RowIter<'_>, StorageError>;

    fn begin(&mut self, mode: TransactionMode) -> Result<(), StorageError>;

    fn commit(&mut self) -> Result<(), StorageError>;

    fn rollback(&mut self) -> Result<(), StorageError>;

    /// True while an explicit transaction is open
    fn in_transaction(&self) -> bool;

    fn open_transaction_policy(&self) -> OpenTransactionPolicy {
        OpenTransactionPolicy::KeepOpen
    }
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn fetch_schema(&self, table: &str) -> Result<Option<Schema>, StorageError> {
        (**self).fetch_schema(table)
    }

    fn fetch_all_schemas(&self) -> Result<Vec<Schema>, StorageError> {
        (**self).fetch_all_schemas()
    }

    fn scan_rows(&self, table: &str) -> Result<RowIter<'_>, StorageError> {
        (**self).scan_rows(table)
    }

    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<(), StorageError> {
        (**self).insert_rows(table, rows)
    }

    fn update_rows(&mut self, table: &str, rows: Vec<(Key, Row)>) -> Result<(), StorageError> {
        (**self).update_rows(table, rows)
    }

    fn delete_rows(&mut self, table: &str, keys: Vec<Key>) -> Result<(), StorageError> {
        (**self).delete_rows(table, keys)
    }

    fn insert_schema(&mut self, schema: Schema) -> Result<(), StorageError> {
        (**self).insert_schema(schema)
    }

    fn replace_schema(
        &mut self,
        table: &str,
        schema: Schema,
        rows: Vec<Row>,
    ) -> Result<(), StorageError> {
        (**self).replace_schema(table, schema, rows)
    }

    fn delete_schema(&mut self, table: &str) -> Result<(), StorageError> {
        (**self).delete_schema(table)
    }

    fn create_index(&mut self, table: &str, index: SchemaIndex) -> Result<(), StorageError> {
        (**self).create_index(table, index)
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<(), StorageError> {
        (**self).drop_index(table, name)
    }

    fn scan_index(
        &self,
        table: &str,
        name: &str,
        value: &Value,
    ) -> Result<RowIter<'_>, StorageError> {
        (**self).scan_index(table, name, value)
    }

    fn begin(&mut self, mode: TransactionMode) -> Result<(), StorageError> {
        (**self).begin(mode)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        (**self).rollback()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }

    fn open_transaction_policy(&self) -> OpenTransactionPolicy {
        (**self).open_transaction_policy()
    }
}

/// Which backend [`open_storage`] builds.
///
/// Deserializes from an internally tagged record, e.g.
/// `{"type": "json", "path": "data.json"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    #[default]
    Memory,
    Json { path: PathBuf },
    KeyValue(KvConfig),
    SharedNamespace { name: String },
}

pub fn open_storage(config: &StorageConfig) -> Result<Box<dyn Storage>, StorageError> {
    Ok(match config {
        StorageConfig::Memory => Box::new(MemoryStorage::new()),
        StorageConfig::Json { path } => Box::new(JsonStorage::open(path)?),
        StorageConfig::KeyValue(kv) => Box::new(KvStorage::open(kv)?),
        StorageConfig::SharedNamespace { name } => Box::new(SharedStorage::open(name)),
    })
}
