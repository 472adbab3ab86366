use crate::core::{Key, Row, Schema, SchemaIndex, StorageError, Value};
use crate::transaction::TransactionMode;
use super::database::MemoryDatabase;
use super::{RowIter, Storage};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Namespace name -> shared state, for the whole process
static NAMESPACES: LazyLock<Mutex<HashMap<String, Arc<Namespace>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Default)]
struct Committed {
    /// Bumped by every commit
    version: u64,
    db: MemoryDatabase,
}

#[derive(Debug, Default)]
struct Namespace {
    committed: RwLock<Committed>,
    /// Set while one handle is writing; writers queue on `writer_released`
    writer: Mutex<bool>,
    writer_released: Condvar,
}

impl Namespace {
    fn acquire_writer(&self) {
        let mut busy = self.writer.lock();
        while *busy {
            self.writer_released.wait(&mut busy);
        }
        *busy = true;
    }

    fn release_writer(&self) {
        *self.writer.lock() = false;
        self.writer_released.notify_one();
    }

    fn snapshot(&self) -> (u64, MemoryDatabase) {
        let committed = self.committed.read();
        (committed.version, committed.db.clone())
    }

    fn publish(&self, db: MemoryDatabase) {
        let mut committed = self.committed.write();
        committed.db = db;
        committed.version += 1;
    }
}

#[derive(Debug)]
enum State {
    Idle,
    /// Holds the namespace writer slot until commit or rollback
    Statement { working: MemoryDatabase },
    Explicit {
        base_version: u64,
        working: MemoryDatabase,
        dirty: bool,
    },
}

/// Volatile storage shared by every handle opened on the same namespace
/// name within the process.
///
/// Readers always see a committed snapshot. Statement transactions are
/// serialized through the namespace's writer slot; explicit transactions
/// work on a private copy-on-write snapshot and publish it on commit only if
/// no other handle committed in between.
#[derive(Debug)]
pub struct SharedStorage {
    name: String,
    namespace: Arc<Namespace>,
    state: State,
}

impl SharedStorage {
    /// Attaches to `name`, creating an empty namespace on first use
    #[must_use]
    pub fn open(name: &str) -> Self {
        let namespace = {
            let mut registry = NAMESPACES.lock();
            Arc::clone(registry.entry(name.to_string()).or_default())
        };
        debug!(namespace = name, "shared: attached");
        Self {
            name: name.to_string(),
            namespace,
            state: State::Idle,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryDatabase) -> T) -> T {
        match &self.state {
            State::Idle => f(&self.namespace.committed.read().db),
            State::Statement { working } | State::Explicit { working, .. } => f(working),
        }
    }

    fn write(
        &mut self,
        f: impl FnOnce(&mut MemoryDatabase) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        match &mut self.state {
            State::Statement { working } => f(working),
            State::Explicit { working, dirty, .. } => {
                f(working)?;
                *dirty = true;
                Ok(())
            }
            State::Idle => {
                self.namespace.acquire_writer();
                let (_, mut db) = self.namespace.snapshot();
                let result = f(&mut db);
                if result.is_ok() {
                    self.namespace.publish(db);
                }
                self.namespace.release_writer();
                result
            }
        }
    }
}

impl Drop for SharedStorage {
    fn drop(&mut self) {
        if matches!(self.state, State::Statement { .. }) {
            self.namespace.release_writer();
        }
    }
}

impl Storage for SharedStorage {
    fn fetch_schema(&self, table: &str) -> Result<Option<Schema>, StorageError> {
        Ok(self.read(|db| db.fetch_schema(table)))
    }

    fn fetch_all_schemas(&self) -> Result<Vec<Schema>, StorageError> {
        Ok(self.read(MemoryDatabase::fetch_all_schemas))
    }

    fn scan_rows(&self, table: &str) -> Result<RowIter<'_>, StorageError> {
        self.read(|db| db.scan_rows(table))
    }

    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<(), StorageError> {
        self.write(|db| db.insert_rows(table, rows))
    }

    fn update_rows(&mut self, table: &str, rows: Vec<(Key, Row)>) -> Result<(), StorageError> {
        self.write(|db| db.update_rows(table, rows))
    }

    fn delete_rows(&mut self, table: &str, keys: Vec<Key>) -> Result<(), StorageError> {
        self.write(|db| db.delete_rows(table, &keys))
    }

    fn insert_schema(&mut self, schema: Schema) -> Result<(), StorageError> {
        self.write(|db| db.insert_schema(schema))
    }

    fn replace_schema(
        &mut self,
        table: &str,
        schema: Schema,
        rows: Vec<Row>,
    ) -> Result<(), StorageError> {
        self.write(|db| db.replace_schema(table, schema, rows))
    }

    fn delete_schema(&mut self, table: &str) -> Result<(), StorageError> {
        self.write(|db| db.delete_schema(table))
    }

    fn create_index(&mut self, table: &str, index: SchemaIndex) -> Result<(), StorageError> {
        self.write(|db| db.create_index(table, index))
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<(), StorageError> {
        self.write(|db| db.drop_index(table, name))
    }

    fn scan_index(
        &self,
        table: &str,
        name: &str,
        value: &Value,
    ) -> Result<RowIter<'_>, StorageError> {
        self.read(|db| db.scan_index(table, name, value))
    }

    fn begin(&mut self, mode: TransactionMode) -> Result<(), StorageError> {
        if !matches!(self.state, State::Idle) {
            return Err(StorageError::NestedTransaction);
        }

        self.state = match mode {
            TransactionMode::Statement => {
                self.namespace.acquire_writer();
                let (_, working) = self.namespace.snapshot();
                State::Statement { working }
            }
            TransactionMode::Explicit => {
                let (base_version, working) = self.namespace.snapshot();
                State::Explicit {
                    base_version,
                    working,
                    dirty: false,
                }
            }
        };
        debug!(namespace = %self.name, ?mode, "shared: begin");
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Err(StorageError::NoTransaction),
            State::Statement { working } => {
                self.namespace.publish(working);
                self.namespace.release_writer();
                debug!(namespace = %self.name, "shared: commit");
                Ok(())
            }
            State::Explicit { dirty: false, .. } => {
                debug!(namespace = %self.name, "shared: commit (read-only)");
                Ok(())
            }
            State::Explicit {
                base_version,
                working,
                dirty: true,
            } => {
                self.namespace.acquire_writer();
                let current = self.namespace.committed.read().version;
                let result = if current == base_version {
                    self.namespace.publish(working);
                    debug!(namespace = %self.name, "shared: commit");
                    Ok(())
                } else {
                    warn!(namespace = %self.name, base_version, current, "shared: commit aborted");
                    Err(StorageError::Conflict(format!(
                        "namespace '{}' changed since the transaction began",
                        self.name
                    )))
                };
                self.namespace.release_writer();
                result
            }
        }
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Err(StorageError::NoTransaction),
            State::Statement { .. } => {
                self.namespace.release_writer();
                debug!(namespace = %self.name, "shared: rollback");
                Ok(())
            }
            State::Explicit { .. } => {
                debug!(namespace = %self.name, "shared: rollback");
                Ok(())
            }
        }
    }

    fn in_transaction(&self) -> bool {
        matches!(self.state, State::Explicit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};
    use std::thread;

    fn schema() -> Schema {
        Schema::new("t", vec![Column::new("id", DataType::Integer)])
    }

    fn row(id: i64) -> Row {
        Row::new(vec![Value::Integer(id)])
    }

    fn count(storage: &SharedStorage) -> usize {
        storage.scan_rows("t").unwrap().count()
    }

    #[test]
    fn test_handles_share_committed_state() {
        let mut first = SharedStorage::open("shared-test-visibility");
        let second = SharedStorage::open("shared-test-visibility");

        first.insert_schema(schema()).unwrap();
        first.begin(TransactionMode::Statement).unwrap();
        first.insert_rows("t", vec![row(1)]).unwrap();
        assert_eq!(count(&second), 0);

        first.commit().unwrap();
        assert_eq!(count(&second), 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let mut first = SharedStorage::open("shared-test-isolated-a");
        let second = SharedStorage::open("shared-test-isolated-b");

        first.insert_schema(schema()).unwrap();
        assert!(second.fetch_schema("t").unwrap().is_none());
    }

    #[test]
    fn test_explicit_commit_conflict() {
        let mut first = SharedStorage::open("shared-test-conflict");
        let mut second = SharedStorage::open("shared-test-conflict");
        first.insert_schema(schema()).unwrap();

        first.begin(TransactionMode::Explicit).unwrap();
        second.begin(TransactionMode::Explicit).unwrap();
        first.insert_rows("t", vec![row(1)]).unwrap();
        second.insert_rows("t", vec![row(2)]).unwrap();

        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(StorageError::Conflict(_))));
        assert!(!second.in_transaction());
        assert_eq!(count(&second), 1);
    }

    #[test]
    fn test_explicit_rollback_is_private() {
        let mut first = SharedStorage::open("shared-test-rollback");
        let second = SharedStorage::open("shared-test-rollback");
        first.insert_schema(schema()).unwrap();

        first.begin(TransactionMode::Explicit).unwrap();
        first.insert_rows("t", vec![row(1)]).unwrap();
        assert_eq!(count(&first), 1);
        assert_eq!(count(&second), 0);

        first.rollback().unwrap();
        assert_eq!(count(&first), 0);
    }

    #[test]
    fn test_statement_writers_are_serialized() {
        let mut setup = SharedStorage::open("shared-test-threads");
        setup.insert_schema(schema()).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|i| {
                thread::spawn(move || {
                    let mut storage = SharedStorage::open("shared-test-threads");
                    for j in 0..25 {
                        storage.begin(TransactionMode::Statement).unwrap();
                        storage.insert_rows("t", vec![row(i * 100 + j)]).unwrap();
                        storage.commit().unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(count(&setup), 100);
    }
}
