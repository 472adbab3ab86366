use crate::core::{Key, Row, Schema, SchemaIndex, StorageError, Value};
use crate::transaction::{OpenTransactionPolicy, TransactionMode};
use super::database::{DatabaseFile, MemoryDatabase};
use super::memory::MemoryStorage;
use super::{RowIter, Storage};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Whole-database snapshot in one JSON file.
///
/// The file is read once on open; every committing mutation rewrites it
/// through a temporary file renamed over the old one. The new state becomes
/// visible only after the rename succeeds. Concurrent writers from other
/// processes are not detected.
#[derive(Debug)]
pub struct JsonStorage {
    path: PathBuf,
    inner: MemoryStorage,
}

impl JsonStorage {
    /// Opens `path`, starting from an empty database if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let db = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                MemoryDatabase::new()
            } else {
                let file: DatabaseFile = serde_json::from_str(&content)?;
                MemoryDatabase::from_file(file)?
            }
        } else {
            MemoryDatabase::new()
        };

        info!(path = %path.display(), tables = db.fetch_all_schemas().len(), "json: opened");
        Ok(Self {
            path,
            inner: MemoryStorage::from_database(db),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, db: &MemoryDatabase) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&db.to_file())?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let written = fs::File::create(&tmp_path)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp_path, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), bytes = json.len(), "json: persisted");
        Ok(())
    }

    /// Runs a write; outside any transaction it gets its own statement
    /// transaction so that nothing is published unless the file is written
    fn write<F>(&mut self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut MemoryStorage) -> Result<(), StorageError>,
    {
        if self.inner.transaction_active() {
            return apply(&mut self.inner);
        }

        self.inner.begin(TransactionMode::Statement)?;
        if let Err(e) = apply(&mut self.inner) {
            self.inner.rollback()?;
            return Err(e);
        }
        self.commit()
    }
}

impl Storage for JsonStorage {
    fn fetch_schema(&self, table: &str) -> Result<Option<Schema>, StorageError> {
        self.inner.fetch_schema(table)
    }

    fn fetch_all_schemas(&self) -> Result<Vec<Schema>, StorageError> {
        self.inner.fetch_all_schemas()
    }

    fn scan_rows(&self, table: &str) -> Result<RowIter<'_>, StorageError> {
        self.inner.scan_rows(table)
    }

    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<(), StorageError> {
        self.write(|inner| inner.insert_rows(table, rows))
    }

    fn update_rows(&mut self, table: &str, rows: Vec<(Key, Row)>) -> Result<(), StorageError> {
        self.write(|inner| inner.update_rows(table, rows))
    }

    fn delete_rows(&mut self, table: &str, keys: Vec<Key>) -> Result<(), StorageError> {
        self.write(|inner| inner.delete_rows(table, keys))
    }

    fn insert_schema(&mut self, schema: Schema) -> Result<(), StorageError> {
        self.write(|inner| inner.insert_schema(schema))
    }

    fn replace_schema(
        &mut self,
        table: &str,
        schema: Schema,
        rows: Vec<Row>,
    ) -> Result<(), StorageError> {
        self.write(|inner| inner.replace_schema(table, schema, rows))
    }

    fn delete_schema(&mut self, table: &str) -> Result<(), StorageError> {
        self.write(|inner| inner.delete_schema(table))
    }

    fn create_index(&mut self, table: &str, index: SchemaIndex) -> Result<(), StorageError> {
        self.write(|inner| inner.create_index(table, index))
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<(), StorageError> {
        self.write(|inner| inner.drop_index(table, name))
    }

    fn scan_index(
        &self,
        table: &str,
        name: &str,
        value: &Value,
    ) -> Result<RowIter<'_>, StorageError> {
        self.inner.scan_index(table, name, value)
    }

    fn begin(&mut self, mode: TransactionMode) -> Result<(), StorageError> {
        self.inner.begin(mode)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let working = self.inner.pending().ok_or(StorageError::NoTransaction)?;
        if let Err(e) = self.persist(working) {
            warn!(path = %self.path.display(), error = %e, "json: commit failed, rolling back");
            self.inner.rollback()?;
            return Err(e);
        }
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn open_transaction_policy(&self) -> OpenTransactionPolicy {
        OpenTransactionPolicy::Commit
    }
}
