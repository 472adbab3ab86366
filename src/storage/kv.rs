use crate::core::{Key, Row, Schema, SchemaIndex, StorageError, Value};
use crate::transaction::TransactionMode;
use super::{RowIter, Storage};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::iter::Peekable;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const SCHEMA_PREFIX: &[u8] = b"schema/";
const DATA_PREFIX: &[u8] = b"data/";
const INDEX_PREFIX: &[u8] = b"index/";
const VERSION_KEY: &[u8] = b"meta/version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvMode {
    LowSpace,
    HighThroughput,
}

/// Options of the embedded key-value backend; defaults follow sled's
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    pub path: PathBuf,
    /// Page cache size in bytes
    pub cache_capacity: u64,
    pub mode: KvMode,
    /// Fail to open if the database already exists
    pub create_new: bool,
    /// Remove the database when it is closed
    pub temporary: bool,
    pub use_compression: bool,
    /// zstd level, 1 to 22 (0 only when compression is off)
    pub compression_factor: i32,
    pub print_profile_on_drop: bool,
    pub flush_every_ms: Option<u64>,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pondsql.db"),
            cache_capacity: 1024 * 1024 * 1024,
            mode: KvMode::LowSpace,
            create_new: false,
            temporary: false,
            use_compression: false,
            compression_factor: 5,
            print_profile_on_drop: false,
            flush_every_ms: Some(500),
        }
    }
}

impl KvConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if !(0..=22).contains(&self.compression_factor) {
            return Err(StorageError::InvalidConfig(format!(
                "compression_factor must be between 0 and 22, got {}",
                self.compression_factor
            )));
        }
        if self.use_compression && self.compression_factor == 0 {
            return Err(StorageError::InvalidConfig(
                "compression_factor must be at least 1 when compression is enabled".to_string(),
            ));
        }
        Ok(())
    }

    fn to_sled(&self) -> sled::Config {
        let mode = match self.mode {
            KvMode::LowSpace => sled::Mode::LowSpace,
            KvMode::HighThroughput => sled::Mode::HighThroughput,
        };
        let config = sled::Config::new()
            .path(&self.path)
            .cache_capacity(self.cache_capacity)
            .mode(mode)
            .create_new(self.create_new)
            .temporary(self.temporary)
            .use_compression(self.use_compression)
            .print_profile_on_drop(self.print_profile_on_drop)
            .flush_every_ms(self.flush_every_ms);
        if self.use_compression {
            config.compression_factor(self.compression_factor)
        } else {
            config
        }
    }
}

type WriteSet = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// One staged write; `None` deletes the key
type Entry = (Vec<u8>, Option<Vec<u8>>);

enum State {
    Idle,
    Transaction {
        mode: TransactionMode,
        /// Commit version observed at begin
        base_version: u64,
        writes: WriteSet,
    },
}

/// Persistent backend on a sled tree.
///
/// Key layout, with `<x>` standing for `x` prefixed by its u32 length:
///
/// - `schema/<table>`: bincode schema
/// - `data/<table><row key>`: bincode row. The row key is the sortable
///   encoding of the PRIMARY KEY value when the table has one, otherwise a
///   big-endian id from `generate_id`, so a prefix scan yields rows in key
///   order or insertion order.
/// - `index/<table><index><value><row key>`: empty, one per indexed value
///
/// A transaction buffers its writes per handle and applies them in one sled
/// transaction that checks and bumps `meta/version`; a commit fails with a
/// conflict when another handle committed first.
pub struct KvStorage {
    db: sled::Db,
    state: State,
}

impl std::fmt::Debug for KvStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStorage")
            .field("in_transaction", &matches!(self.state, State::Transaction { .. }))
            .finish_non_exhaustive()
    }
}

/// Length-prefixed, so no component is a prefix of a longer one
fn component(bytes: &[u8]) -> Vec<u8> {
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    [&len.to_be_bytes()[..], bytes].concat()
}

fn schema_key(table: &str) -> Vec<u8> {
    [SCHEMA_PREFIX, table.as_bytes()].concat()
}

fn data_prefix(table: &str) -> Vec<u8> {
    [DATA_PREFIX, &component(table.as_bytes())].concat()
}

fn data_key(table: &str, key: &Key) -> Vec<u8> {
    [data_prefix(table).as_slice(), key.as_bytes()].concat()
}

fn index_table_prefix(table: &str) -> Vec<u8> {
    [INDEX_PREFIX, &component(table.as_bytes())].concat()
}

fn index_prefix(table: &str, index: &str) -> Vec<u8> {
    [index_table_prefix(table), component(index.as_bytes())].concat()
}

fn index_value_prefix(table: &str, index: &str, value: &Value) -> Vec<u8> {
    [index_prefix(table, index), component(&value.sort_key())].concat()
}

/// Index entry keys for `row` stored under `key`
fn index_keys(schema: &Schema, key: &Key, row: &Row) -> Vec<Vec<u8>> {
    schema
        .indexes
        .iter()
        .filter_map(|index| {
            let value = row.get(schema.index_column(index)?)?;
            if value.is_null() {
                return None;
            }
            let mut entry = index_value_prefix(&schema.table_name, &index.name, value);
            entry.extend_from_slice(key.as_bytes());
            Some(entry)
        })
        .collect()
}

fn put_all(keys: Vec<Vec<u8>>) -> impl Iterator<Item = Entry> {
    keys.into_iter().map(|k| (k, Some(Vec::new())))
}

fn delete_all(keys: Vec<Vec<u8>>) -> impl Iterator<Item = Entry> {
    keys.into_iter().map(|k| (k, None))
}

fn decode_version(bytes: Option<&[u8]>) -> Result<u64, StorageError> {
    match bytes {
        None => Ok(0),
        Some(bytes) => <[u8; 8]>::try_from(bytes)
            .map(u64::from_be_bytes)
            .map_err(|_| StorageError::Corrupted("commit version is not 8 bytes".to_string())),
    }
}

impl KvStorage {
    pub fn open(config: &KvConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let db = config.to_sled().open()?;
        info!(path = %config.path.display(), temporary = config.temporary, "kv: opened");
        Ok(Self::from_db(db))
    }

    /// Handle on an already open database; several handles may share one
    #[must_use]
    pub fn from_db(db: sled::Db) -> Self {
        Self {
            db,
            state: State::Idle,
        }
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let State::Transaction { writes, .. } = &self.state {
            if let Some(staged) = writes.get(key) {
                return Ok(staged.clone());
            }
        }
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn read_row(&self, table: &str, key: &Key) -> Result<Option<Row>, StorageError> {
        self.read(&data_key(table, key))?
            .map(|bytes| bincode::deserialize(&bytes).map_err(StorageError::from))
            .transpose()
    }

    fn scan_prefix(&self, prefix: &[u8]) -> MergeScan {
        let overlay = match &self.state {
            State::Transaction { writes, .. } => writes
                .range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            State::Idle => Vec::new(),
        };
        MergeScan {
            tree: self.db.scan_prefix(prefix).peekable(),
            overlay: overlay.into_iter().peekable(),
        }
    }

    fn require_schema(&self, table: &str) -> Result<Schema, StorageError> {
        self.fetch_schema(table)?
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    fn keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        self.scan_prefix(prefix)
            .map(|entry| entry.map(|(k, _)| k))
            .collect()
    }

    fn row_key(&self, schema: &Schema, row: &Row) -> Result<Key, StorageError> {
        match schema.primary_key().and_then(|idx| row.get(idx)) {
            Some(value) if !value.is_null() => Ok(Key::from_value(value)),
            _ => Ok(Key::from_id(self.db.generate_id()?)),
        }
    }

    /// Data and index entries for new rows of `schema`'s table. With
    /// `check_stored` a row key already in the table is a duplicate.
    fn encode_rows(
        &self,
        schema: &Schema,
        rows: Vec<Row>,
        check_stored: bool,
    ) -> Result<Vec<Entry>, StorageError> {
        let table = &schema.table_name;
        let mut seen = BTreeSet::new();
        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            let key = self.row_key(schema, &row)?;
            let data = data_key(table, &key);
            if !seen.insert(data.clone()) || (check_stored && self.read(&data)?.is_some()) {
                return Err(StorageError::DuplicateKey(table.clone()));
            }
            batch.extend(put_all(index_keys(schema, &key, &row)));
            batch.push((data, Some(bincode::serialize(&row)?)));
        }
        Ok(batch)
    }

    /// Buffers writes in the open transaction, or applies them at once.
    /// Later entries for the same key win.
    fn stage(&mut self, batch: Vec<Entry>) -> Result<(), StorageError> {
        match &mut self.state {
            State::Transaction { writes, .. } => {
                writes.extend(batch);
                Ok(())
            }
            State::Idle => {
                let writes: WriteSet = batch.into_iter().collect();
                self.apply(&writes, None)
            }
        }
    }

    /// Applies `writes` atomically, bumping the commit version. With an
    /// expected version the commit aborts if the stored one differs.
    fn apply(&self, writes: &WriteSet, expected: Option<u64>) -> Result<(), StorageError> {
        use sled::transaction::{ConflictableTransactionError, TransactionError};

        let result = self.db.transaction(|tree| {
            let current = decode_version(tree.get(VERSION_KEY)?.as_deref())
                .map_err(ConflictableTransactionError::Abort)?;
            if let Some(expected) = expected {
                if current != expected {
                    return Err(ConflictableTransactionError::Abort(StorageError::Conflict(
                        format!("database changed since the transaction began (version {expected} -> {current})"),
                    )));
                }
            }

            for (key, value) in writes {
                match value {
                    Some(value) => tree.insert(key.as_slice(), value.as_slice())?,
                    None => tree.remove(key.as_slice())?,
                };
            }
            tree.insert(VERSION_KEY, (current + 1).to_be_bytes().to_vec())?;
            Ok(())
        });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        }
        self.db.flush()?;
        Ok(())
    }
}

impl Drop for KvStorage {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            warn!(error = %e, "kv: flush on close failed");
        }
        info!("kv: closed");
    }
}

impl Storage for KvStorage {
    fn fetch_schema(&self, table: &str) -> Result<Option<Schema>, StorageError> {
        self.read(&schema_key(table))?
            .map(|bytes| bincode::deserialize(&bytes).map_err(StorageError::from))
            .transpose()
    }

    fn fetch_all_schemas(&self) -> Result<Vec<Schema>, StorageError> {
        self.scan_prefix(SCHEMA_PREFIX)
            .map(|entry| -> Result<Schema, StorageError> {
                let (_, bytes) = entry?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }

    fn scan_rows(&self, table: &str) -> Result<RowIter<'_>, StorageError> {
        self.require_schema(table)?;
        let prefix_len = data_prefix(table).len();
        let iter = self.scan_prefix(&data_prefix(table)).map(
            move |entry| -> Result<(Key, Row), StorageError> {
                let (key, bytes) = entry?;
                let row: Row = bincode::deserialize(&bytes)?;
                Ok((Key::from_bytes(&key[prefix_len..]), row))
            },
        );
        Ok(Box::new(iter))
    }

    fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<(), StorageError> {
        let schema = self.require_schema(table)?;
        for row in &rows {
            schema.check_row(row)?;
        }
        let batch = self.encode_rows(&schema, rows, true)?;
        self.stage(batch)
    }

    /// A row whose PRIMARY KEY value changes moves to its new key
    fn update_rows(&mut self, table: &str, rows: Vec<(Key, Row)>) -> Result<(), StorageError> {
        let schema = self.require_schema(table)?;
        let sources: BTreeSet<Key> = rows.iter().map(|(key, _)| key.clone()).collect();
        let mut targets = BTreeSet::new();
        let mut removed = Vec::new();
        let mut written = Vec::new();

        for (key, row) in rows {
            schema.check_row(&row)?;
            let old = self.read_row(table, &key)?.ok_or_else(|| {
                StorageError::Corrupted(format!("no row with key {key:?} in table '{table}'"))
            })?;
            removed.extend(index_keys(&schema, &key, &old));

            let new_key = if schema.primary_key().is_some() {
                self.row_key(&schema, &row)?
            } else {
                key.clone()
            };
            let taken = !sources.contains(&new_key) && self.read_row(table, &new_key)?.is_some();
            if taken || !targets.insert(new_key.clone()) {
                return Err(StorageError::DuplicateKey(table.to_string()));
            }
            if new_key != key {
                removed.push(data_key(table, &key));
            }

            written.extend(put_all(index_keys(&schema, &new_key, &row)));
            written.push((data_key(table, &new_key), Some(bincode::serialize(&row)?)));
        }

        let mut batch: Vec<Entry> = delete_all(removed).collect();
        batch.extend(written);
        self.stage(batch)
    }

    fn delete_rows(&mut self, table: &str, keys: Vec<Key>) -> Result<(), StorageError> {
        let schema = self.require_schema(table)?;
        let mut batch = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(old) = self.read_row(table, &key)? {
                batch.extend(delete_all(index_keys(&schema, &key, &old)));
            }
            batch.push((data_key(table, &key), None));
        }
        self.stage(batch)
    }

    fn insert_schema(&mut self, schema: Schema) -> Result<(), StorageError> {
        if self.fetch_schema(&schema.table_name)?.is_some() {
            return Err(StorageError::TableAlreadyExists(schema.table_name));
        }
        let entry = (schema_key(&schema.table_name), Some(bincode::serialize(&schema)?));
        self.stage(vec![entry])
    }

    fn replace_schema(
        &mut self,
        table: &str,
        schema: Schema,
        rows: Vec<Row>,
    ) -> Result<(), StorageError> {
        self.require_schema(table)?;
        if schema.table_name != table && self.fetch_schema(&schema.table_name)?.is_some() {
            return Err(StorageError::TableAlreadyExists(schema.table_name));
        }
        for row in &rows {
            schema.check_row(row)?;
        }

        let mut batch: Vec<Entry> = delete_all(self.keys_with_prefix(&data_prefix(table))?).collect();
        batch.extend(delete_all(self.keys_with_prefix(&index_table_prefix(table))?));
        batch.push((schema_key(table), None));
        batch.push((schema_key(&schema.table_name), Some(bincode::serialize(&schema)?)));
        batch.extend(self.encode_rows(&schema, rows, false)?);
        self.stage(batch)
    }

    fn delete_schema(&mut self, table: &str) -> Result<(), StorageError> {
        self.require_schema(table)?;
        let mut batch: Vec<Entry> = delete_all(self.keys_with_prefix(&data_prefix(table))?).collect();
        batch.extend(delete_all(self.keys_with_prefix(&index_table_prefix(table))?));
        batch.push((schema_key(table), None));
        self.stage(batch)
    }

    fn create_index(&mut self, table: &str, index: SchemaIndex) -> Result<(), StorageError> {
        let mut schema = self.require_schema(table)?;
        if schema.index(&index.name).is_some() {
            return Err(StorageError::IndexAlreadyExists {
                table: table.to_string(),
                index: index.name,
            });
        }
        if schema.index_column(&index).is_none() {
            return Err(StorageError::ColumnNotFound {
                table: table.to_string(),
                column: index.column,
            });
        }

        // Entries for the new index only
        let mut building = schema.clone();
        building.indexes = vec![index.clone()];
        let mut batch = Vec::new();
        for entry in self.scan_rows(table)? {
            let (key, row) = entry?;
            batch.extend(put_all(index_keys(&building, &key, &row)));
        }

        schema.indexes.push(index);
        batch.push((schema_key(table), Some(bincode::serialize(&schema)?)));
        self.stage(batch)
    }

    fn drop_index(&mut self, table: &str, name: &str) -> Result<(), StorageError> {
        let mut schema = self.require_schema(table)?;
        let Some(pos) = schema.indexes.iter().position(|index| index.name == name) else {
            return Err(StorageError::IndexNotFound {
                table: table.to_string(),
                index: name.to_string(),
            });
        };
        schema.indexes.remove(pos);

        let mut batch: Vec<Entry> =
            delete_all(self.keys_with_prefix(&index_prefix(table, name))?).collect();
        batch.push((schema_key(table), Some(bincode::serialize(&schema)?)));
        self.stage(batch)
    }

    fn scan_index(
        &self,
        table: &str,
        name: &str,
        value: &Value,
    ) -> Result<RowIter<'_>, StorageError> {
        let schema = self.require_schema(table)?;
        if schema.index(name).is_none() {
            return Err(StorageError::IndexNotFound {
                table: table.to_string(),
                index: name.to_string(),
            });
        }
        if value.is_null() {
            return Ok(Box::new(std::iter::empty()));
        }

        let prefix = index_value_prefix(table, name, value);
        let prefix_len = prefix.len();
        let table = table.to_string();
        let iter = self.scan_prefix(&prefix).map(
            move |entry| -> Result<(Key, Row), StorageError> {
                let (entry_key, _) = entry?;
                let key = Key::from_bytes(&entry_key[prefix_len..]);
                let row = self.read_row(&table, &key)?.ok_or_else(|| {
                    StorageError::Corrupted(format!("index entry of '{table}' has no row"))
                })?;
                Ok((key, row))
            },
        );
        Ok(Box::new(iter))
    }

    fn begin(&mut self, mode: TransactionMode) -> Result<(), StorageError> {
        if matches!(self.state, State::Transaction { .. }) {
            return Err(StorageError::NestedTransaction);
        }
        let base_version = decode_version(self.db.get(VERSION_KEY)?.as_deref())?;
        debug!(?mode, base_version, "kv: begin");
        self.state = State::Transaction {
            mode,
            base_version,
            writes: WriteSet::new(),
        };
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let State::Transaction { base_version, writes, .. } =
            std::mem::replace(&mut self.state, State::Idle)
        else {
            return Err(StorageError::NoTransaction);
        };

        if writes.is_empty() {
            debug!("kv: commit (read-only)");
            return Ok(());
        }

        debug!(writes = writes.len(), "kv: commit");
        self.apply(&writes, Some(base_version)).inspect_err(|e| {
            if matches!(e, StorageError::Conflict(_)) {
                warn!(error = %e, "kv: commit aborted");
            }
        })
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Transaction { writes, .. } => {
                debug!(discarded = writes.len(), "kv: rollback");
                Ok(())
            }
            State::Idle => Err(StorageError::NoTransaction),
        }
    }

    fn in_transaction(&self) -> bool {
        matches!(
            self.state,
            State::Transaction {
                mode: TransactionMode::Explicit,
                ..
            }
        )
    }
}

/// Staged writes merged over a sled prefix scan, in key order
struct MergeScan {
    tree: Peekable<sled::Iter>,
    overlay: Peekable<std::vec::IntoIter<(Vec<u8>, Option<Vec<u8>>)>>,
}

enum Step {
    Tree,
    Overlay,
    /// Staged write shadows the stored entry
    Both,
    TreeError,
}

impl Iterator for MergeScan {
    type Item = Result<(Vec<u8>, Vec<u8>), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let step = match (self.tree.peek(), self.overlay.peek()) {
                (None, None) => return None,
                (Some(Err(_)), _) => Step::TreeError,
                (Some(Ok(_)), None) => Step::Tree,
                (None, Some(_)) => Step::Overlay,
                (Some(Ok((stored, _))), Some((staged, _))) => {
                    match stored.as_ref().cmp(staged.as_slice()) {
                        Ordering::Less => Step::Tree,
                        Ordering::Equal => Step::Both,
                        Ordering::Greater => Step::Overlay,
                    }
                }
            };

            match step {
                Step::TreeError => {
                    let err = self.tree.next()?.err()?;
                    return Some(Err(err.into()));
                }
                Step::Tree => {
                    let (key, value) = self.tree.next()?.ok()?;
                    return Some(Ok((key.to_vec(), value.to_vec())));
                }
                Step::Both | Step::Overlay => {
                    if matches!(step, Step::Both) {
                        self.tree.next();
                    }
                    // A staged delete hides the stored entry
                    if let Some((key, Some(value))) = self.overlay.next() {
                        return Some(Ok((key, value)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, DataType};
    use tempfile::TempDir;

    fn schema(name: &str) -> Schema {
        Schema::new(name, vec![Column::new("id", DataType::Integer)])
    }

    /// `id` is the primary key, `tag` carries index `by_tag`
    fn keyed(name: &str) -> Schema {
        let mut id = Column::new("id", DataType::Integer);
        id.primary_key = true;
        let mut schema = Schema::new(name, vec![id, Column::new("tag", DataType::Text)]);
        schema.indexes.push(SchemaIndex::new("by_tag", "tag"));
        schema
    }

    fn tagged(id: i64, tag: &str) -> Row {
        Row::new(vec![Value::Integer(id), Value::Text(tag.to_string())])
    }

    fn tag_ids(storage: &KvStorage, tag: &str) -> Vec<i64> {
        storage
            .scan_index("t", "by_tag", &Value::Text(tag.to_string()))
            .unwrap()
            .map(|r| r.unwrap().1.values[0].as_int().unwrap())
            .collect()
    }

    fn row(id: i64) -> Row {
        Row::new(vec![Value::Integer(id)])
    }

    fn ids(storage: &KvStorage, table: &str) -> Vec<i64> {
        storage
            .scan_rows(table)
            .unwrap()
            .map(|r| r.unwrap().1.values[0].as_int().unwrap())
            .collect()
    }

    fn temporary() -> KvStorage {
        KvStorage::from_db(sled::Config::new().temporary(true).open().unwrap())
    }

    #[test]
    fn test_config_validation() {
        let mut config = KvConfig::new("x");
        assert!(config.validate().is_ok());

        config.compression_factor = 23;
        assert!(matches!(config.validate(), Err(StorageError::InvalidConfig(_))));

        config.compression_factor = 0;
        config.use_compression = true;
        assert!(matches!(config.validate(), Err(StorageError::InvalidConfig(_))));
    }

    #[test]
    fn test_reads_merge_staged_writes() {
        let mut storage = temporary();
        storage.insert_schema(schema("t")).unwrap();
        storage.insert_rows("t", vec![row(1), row(2)]).unwrap();

        storage.begin(TransactionMode::Explicit).unwrap();
        storage.insert_rows("t", vec![row(3)]).unwrap();
        let first = storage.scan_rows("t").unwrap().next().unwrap().unwrap().0;
        storage.delete_rows("t", vec![first]).unwrap();

        assert_eq!(ids(&storage, "t"), vec![2, 3]);
        storage.rollback().unwrap();
        assert_eq!(ids(&storage, "t"), vec![1, 2]);
    }

    #[test]
    fn test_tables_do_not_share_prefixes() {
        let mut storage = temporary();
        storage.insert_schema(schema("a")).unwrap();
        storage.insert_schema(schema("ab")).unwrap();
        storage.insert_rows("ab", vec![row(1)]).unwrap();

        assert!(ids(&storage, "a").is_empty());
        let names: Vec<_> = storage
            .fetch_all_schemas()
            .unwrap()
            .into_iter()
            .map(|s| s.table_name)
            .collect();
        assert_eq!(names, vec!["a", "ab"]);
    }

    #[test]
    fn test_replace_schema_rewrites_rows() {
        let mut storage = temporary();
        storage.insert_schema(schema("t")).unwrap();
        storage.insert_rows("t", vec![row(1)]).unwrap();

        storage
            .replace_schema("t", schema("u"), vec![row(10), row(11)])
            .unwrap();

        assert!(storage.fetch_schema("t").unwrap().is_none());
        assert_eq!(ids(&storage, "u"), vec![10, 11]);
    }

    #[test]
    fn test_reopen_sees_only_committed_writes() {
        let dir = TempDir::new().unwrap();
        let config = KvConfig::new(dir.path().join("db"));

        {
            let mut storage = KvStorage::open(&config).unwrap();
            storage.begin(TransactionMode::Statement).unwrap();
            storage.insert_schema(schema("t")).unwrap();
            storage.insert_rows("t", vec![row(1)]).unwrap();
            storage.commit().unwrap();

            storage.begin(TransactionMode::Explicit).unwrap();
            storage.insert_rows("t", vec![row(2)]).unwrap();
            storage.rollback().unwrap();
        }

        let storage = KvStorage::open(&config).unwrap();
        assert_eq!(ids(&storage, "t"), vec![1]);
    }

    #[test]
    fn test_concurrent_commit_conflicts() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let mut first = KvStorage::from_db(db.clone());
        let mut second = KvStorage::from_db(db);
        first.insert_schema(schema("t")).unwrap();

        first.begin(TransactionMode::Explicit).unwrap();
        second.begin(TransactionMode::Explicit).unwrap();
        first.insert_rows("t", vec![row(1)]).unwrap();
        second.insert_rows("t", vec![row(2)]).unwrap();

        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(StorageError::Conflict(_))));
        assert!(!second.in_transaction());
        assert_eq!(ids(&second, "t"), vec![1]);
    }

    #[test]
    fn test_read_only_commit_never_conflicts() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let mut reader = KvStorage::from_db(db.clone());
        let mut writer = KvStorage::from_db(db);
        writer.insert_schema(schema("t")).unwrap();

        reader.begin(TransactionMode::Explicit).unwrap();
        writer.insert_rows("t", vec![row(1)]).unwrap();
        assert!(reader.commit().is_ok());
    }

    #[test]
    fn test_rows_are_kept_in_primary_key_order() {
        let mut storage = temporary();
        storage.insert_schema(keyed("t")).unwrap();
        storage
            .insert_rows("t", vec![tagged(30, "a"), tagged(-5, "b"), tagged(7, "a")])
            .unwrap();
        assert_eq!(ids(&storage, "t"), vec![-5, 7, 30]);

        let (key, _) = storage.scan_rows("t").unwrap().next().unwrap().unwrap();
        assert_eq!(key, Key::from_value(&Value::Integer(-5)));

        let duplicate = storage.insert_rows("t", vec![tagged(7, "c")]);
        assert!(matches!(duplicate, Err(StorageError::DuplicateKey(_))));
        let in_batch = storage.insert_rows("t", vec![tagged(8, "c"), tagged(8, "d")]);
        assert!(matches!(in_batch, Err(StorageError::DuplicateKey(_))));
        assert_eq!(ids(&storage, "t"), vec![-5, 7, 30]);
    }

    #[test]
    fn test_primary_key_update_moves_row() {
        let mut storage = temporary();
        storage.insert_schema(keyed("t")).unwrap();
        storage.insert_rows("t", vec![tagged(1, "a"), tagged(2, "b")]).unwrap();

        let key = Key::from_value(&Value::Integer(1));
        storage.update_rows("t", vec![(key.clone(), tagged(5, "z"))]).unwrap();
        assert_eq!(ids(&storage, "t"), vec![2, 5]);
        assert_eq!(tag_ids(&storage, "z"), vec![5]);
        assert!(tag_ids(&storage, "a").is_empty());

        let clash = storage.update_rows("t", vec![(Key::from_value(&Value::Integer(2)), tagged(5, "b"))]);
        assert!(matches!(clash, Err(StorageError::DuplicateKey(_))));

        // Swapping two keys in one batch is not a clash
        let swap = vec![
            (Key::from_value(&Value::Integer(2)), tagged(5, "b")),
            (Key::from_value(&Value::Integer(5)), tagged(2, "z")),
        ];
        storage.update_rows("t", swap).unwrap();
        assert_eq!(ids(&storage, "t"), vec![2, 5]);
        assert_eq!(tag_ids(&storage, "b"), vec![5]);
        assert_eq!(tag_ids(&storage, "z"), vec![2]);
    }

    #[test]
    fn test_index_entries_follow_writes() {
        let mut storage = temporary();
        storage.insert_schema(keyed("t")).unwrap();
        storage
            .insert_rows("t", vec![tagged(1, "a"), tagged(2, "b"), tagged(3, "a")])
            .unwrap();
        assert_eq!(tag_ids(&storage, "a"), vec![1, 3]);

        storage.begin(TransactionMode::Explicit).unwrap();
        storage.delete_rows("t", vec![Key::from_value(&Value::Integer(1))]).unwrap();
        storage.insert_rows("t", vec![tagged(4, "a")]).unwrap();
        assert_eq!(tag_ids(&storage, "a"), vec![3, 4]);
        storage.rollback().unwrap();
        assert_eq!(tag_ids(&storage, "a"), vec![1, 3]);

        let null_tag = storage.scan_index("t", "by_tag", &Value::Null).unwrap().count();
        assert_eq!(null_tag, 0);
    }

    #[test]
    fn test_create_and_drop_index() {
        let mut storage = temporary();
        let mut schema = keyed("t");
        schema.indexes.clear();
        storage.insert_schema(schema).unwrap();
        storage.insert_rows("t", vec![tagged(1, "a"), tagged(2, "a")]).unwrap();

        storage.create_index("t", SchemaIndex::new("by_tag", "tag")).unwrap();
        assert_eq!(tag_ids(&storage, "a"), vec![1, 2]);
        assert!(matches!(
            storage.create_index("t", SchemaIndex::new("by_tag", "id")),
            Err(StorageError::IndexAlreadyExists { .. })
        ));
        assert!(matches!(
            storage.create_index("t", SchemaIndex::new("other", "nope")),
            Err(StorageError::ColumnNotFound { .. })
        ));

        storage.drop_index("t", "by_tag").unwrap();
        assert!(storage.fetch_schema("t").unwrap().unwrap().indexes.is_empty());
        assert!(storage.keys_with_prefix(&index_table_prefix("t")).unwrap().is_empty());
        assert!(matches!(
            storage.scan_index("t", "by_tag", &Value::Text("a".to_string())),
            Err(StorageError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn test_drop_table_removes_index_entries() {
        let mut storage = temporary();
        storage.insert_schema(keyed("t")).unwrap();
        storage.insert_rows("t", vec![tagged(1, "a")]).unwrap();

        storage.delete_schema("t").unwrap();
        assert!(storage.keys_with_prefix(&index_table_prefix("t")).unwrap().is_empty());
        assert!(storage.keys_with_prefix(&data_prefix("t")).unwrap().is_empty());
    }
}
