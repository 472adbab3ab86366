use crate::core::{Key, Row, Schema, SchemaIndex, StorageError, Value};
use crate::transaction::{Transaction, TransactionMode};
use super::database::MemoryDatabase;
use super::{RowIter, Storage};
use tracing::debug;

/// Process-local, volatile storage.
///
/// A transaction works on a copy-on-write clone of the committed database,
/// swapped in on commit and dropped on rollback.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    committed: MemoryDatabase,
    tx: Transaction<MemoryDatabase>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_database(db: MemoryDatabase) -> Self {
        Self {
            committed: db,
            tx: Transaction::new(),
        }
    }

    /// Committed state, ignoring any open transaction
    #[must_use]
    pub const fn committed(&self) -> &MemoryDatabase {
        &self.committed
    }

    /// True while any transaction, explicit or per-statement, is open
    #[must_use]
    pub const fn transaction_active(&self) -> bool {
        self.tx.is_active()
    }

    /// Working copy of the open transaction
    #[must_use]
    pub const fn pending(&self) -> Option<&MemoryDatabase> {
        self.tx.working()
    }

    fn current(&self) -> &MemoryDatabase {
        self.tx.working().unwrap_or(&self.committed)
    }

    fn current_mut(&mut self) -> &mut MemoryDatabase {
        match self.tx.working_mut() {
            Some(working) => working,
            None => &mut self.committed,
        }
    }
}

impl Storage for MemoryStorage {
    fn fetch_schema(&self, table: &str) -> Result<Option<Schema>, StorageError> {
        Ok(self.current().fetch_schema(table))
    }

    fn fetch_all_schemas(&self) -> Result<Vec<Schema>, StorageError> {
        Ok(self.current().fetch_all_schemas())
    }

    fn scan_rows(&self, table: &str) -> Result<RowIter<'_>, StorageError> {
        self.current().scan_rows(table)
    }

    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<(), StorageError> {
        self.current_mut().insert_rows(table, rows)
    }

    fn update_rows(&mut self, table: &str, rows: Vec<(Key, Row)>) -> Result<(), StorageError> {
        self.current_mut().update_rows(table, rows)
    }

    fn delete_rows(&mut self, table: &str, keys: Vec<Key>) -> Result<(), StorageError> {
        self.current_mut().delete_rows(table, &keys)
    }

    fn insert_schema(&mut self, schema: Schema) -> Result<(), StorageError> {
        self.current_mut().insert_schema(schema)
    }

    fn replace_schema(
        &mut self,
        table: &str,
        schema: Schema,
        rows: Vec<Row>,
    ) -> Result<(), StorageError> {
        self.current_mut().replace_schema(table, schema, rows)
    }

    fn delete_schema(&mut self, table: &str) -> Result<(), StorageError> {
        self.current_mut().delete_schema(table)
    }

    fn create_index(&mut self, table: &str, index: SchemaIndex) -> Result<(), StorageError> {
        self.current_mut().create_index(table, index)
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<(), StorageError> {
        self.current_mut().drop_index(table, name)
    }

    fn scan_index(
        &self,
        table: &str,
        name: &str,
        value: &Value,
    ) -> Result<RowIter<'_>, StorageError> {
        self.current().scan_index(table, name, value)
    }

    fn begin(&mut self, mode: TransactionMode) -> Result<(), StorageError> {
        if self.tx.is_active() {
            return Err(StorageError::NestedTransaction);
        }
        debug!(?mode, "memory: begin");
        self.tx.begin(mode, &self.committed);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let working = self.tx.commit().ok_or(StorageError::NoTransaction)?;
        debug!("memory: commit");
        self.committed = working;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        if !self.tx.is_active() {
            return Err(StorageError::NoTransaction);
        }
        debug!("memory: rollback");
        self.tx.rollback();
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.mode() == Some(TransactionMode::Explicit)
    }
}
