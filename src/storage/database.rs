use crate::core::{Key, Row, Schema, SchemaIndex, StorageError, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use super::RowIter;

/// Index name -> sortable value key -> row ids holding that value
type IndexMap = BTreeMap<String, BTreeMap<Key, BTreeSet<u64>>>;

/// One table: its schema, its rows in id order and its index entries
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    pub schema: Schema,
    pub rows: BTreeMap<u64, Row>,
    indexes: IndexMap,
}

impl TableData {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            indexes: IndexMap::new(),
        }
    }

    /// Stores `row` under `id`, replacing and unindexing any previous row
    fn put(&mut self, id: u64, row: Row) {
        if let Some(old) = self.rows.remove(&id) {
            unindex(&mut self.indexes, &self.schema, id, &old);
        }
        index(&mut self.indexes, &self.schema, id, &row);
        self.rows.insert(id, row);
    }

    fn remove(&mut self, id: u64) {
        if let Some(old) = self.rows.remove(&id) {
            unindex(&mut self.indexes, &self.schema, id, &old);
        }
    }

    fn reindex(&mut self) {
        self.indexes.clear();
        for (id, row) in &self.rows {
            index(&mut self.indexes, &self.schema, *id, row);
        }
    }
}

/// `(index name, value key)` of every non-NULL indexed value of `row`
fn index_entries<'a>(schema: &'a Schema, row: &'a Row) -> impl Iterator<Item = (&'a str, Key)> + 'a {
    schema.indexes.iter().filter_map(move |index| {
        let value = row.get(schema.index_column(index)?)?;
        (!value.is_null()).then(|| (index.name.as_str(), Key::from_value(value)))
    })
}

fn index(indexes: &mut IndexMap, schema: &Schema, id: u64, row: &Row) {
    for (name, value) in index_entries(schema, row) {
        indexes
            .entry(name.to_string())
            .or_default()
            .entry(value)
            .or_default()
            .insert(id);
    }
}

fn unindex(indexes: &mut IndexMap, schema: &Schema, id: u64, row: &Row) {
    for (name, value) in index_entries(schema, row) {
        let Some(entries) = indexes.get_mut(name) else {
            continue;
        };
        if let Some(ids) = entries.get_mut(&value) {
            ids.remove(&id);
            if ids.is_empty() {
                entries.remove(&value);
            }
        }
    }
}

/// In-memory database shared by the memory, JSON-file and shared-namespace
/// backends.
///
/// Tables sit behind `Arc`, so cloning the database is cheap and a table is
/// deep-copied only when it is first written after a clone. Rows are keyed
/// by ids from one counter, so id order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: BTreeMap<String, Arc<TableData>>,
    next_key: u64,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fetch_schema(&self, table: &str) -> Option<Schema> {
        self.tables.get(table).map(|t| t.schema.clone())
    }

    /// Schemas sorted by table name
    #[must_use]
    pub fn fetch_all_schemas(&self) -> Vec<Schema> {
        self.tables.values().map(|t| t.schema.clone()).collect()
    }

    fn table(&self, table: &str) -> Result<&Arc<TableData>, StorageError> {
        self.tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableData, StorageError> {
        self.tables
            .get_mut(table)
            .map(Arc::make_mut)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    /// Lazy scan over a snapshot of the table; later writes to the database
    /// are not observed by an iterator already handed out
    pub fn scan_rows(&self, table: &str) -> Result<RowIter<'static>, StorageError> {
        let table = Arc::clone(self.table(table)?);
        Ok(Box::new(SnapshotIter { table, last: None }))
    }

    /// Rows whose indexed column equals `value`, in id order
    pub fn scan_index(
        &self,
        table: &str,
        index: &str,
        value: &Value,
    ) -> Result<RowIter<'static>, StorageError> {
        let data = Arc::clone(self.table(table)?);
        if data.schema.index(index).is_none() {
            return Err(StorageError::IndexNotFound {
                table: table.to_string(),
                index: index.to_string(),
            });
        }

        let ids: Vec<u64> = if value.is_null() {
            Vec::new()
        } else {
            data.indexes
                .get(index)
                .and_then(|entries| entries.get(&Key::from_value(value)))
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default()
        };
        Ok(Box::new(ids.into_iter().filter_map(move |id| {
            data.rows
                .get(&id)
                .map(|row| Ok::<_, StorageError>((Key::from_id(id), row.clone())))
        })))
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }

    pub fn insert_rows(&mut self, table: &str, rows: Vec<Row>) -> Result<(), StorageError> {
        let schema = &self.table(table)?.schema;
        for row in &rows {
            schema.check_row(row)?;
        }

        let keyed: Vec<(u64, Row)> = rows.into_iter().map(|row| (self.allocate_id(), row)).collect();
        let data = self.table_mut(table)?;
        for (id, row) in keyed {
            data.put(id, row);
        }
        Ok(())
    }

    pub fn update_rows(&mut self, table: &str, rows: Vec<(Key, Row)>) -> Result<(), StorageError> {
        let data = self.table(table)?;
        let mut updates = Vec::with_capacity(rows.len());
        for (key, row) in rows {
            data.schema.check_row(&row)?;
            let id = key
                .id()
                .filter(|id| data.rows.contains_key(id))
                .ok_or_else(|| StorageError::Corrupted(format!("no row with key {key:?} in table '{table}'")))?;
            updates.push((id, row));
        }

        let data = self.table_mut(table)?;
        for (id, row) in updates {
            data.put(id, row);
        }
        Ok(())
    }

    /// Keys without a row are ignored
    pub fn delete_rows(&mut self, table: &str, keys: &[Key]) -> Result<(), StorageError> {
        let data = self.table_mut(table)?;
        for id in keys.iter().filter_map(Key::id) {
            data.remove(id);
        }
        Ok(())
    }

    pub fn insert_schema(&mut self, schema: Schema) -> Result<(), StorageError> {
        if self.tables.contains_key(&schema.table_name) {
            return Err(StorageError::TableAlreadyExists(schema.table_name));
        }

        self.tables
            .insert(schema.table_name.clone(), Arc::new(TableData::new(schema)));
        Ok(())
    }

    /// Swaps the definition and rows of `table`; `schema.table_name` may
    /// differ from `table` to rename it
    pub fn replace_schema(
        &mut self,
        table: &str,
        schema: Schema,
        rows: Vec<Row>,
    ) -> Result<(), StorageError> {
        self.table(table)?;
        if schema.table_name != table && self.tables.contains_key(&schema.table_name) {
            return Err(StorageError::TableAlreadyExists(schema.table_name));
        }
        for row in &rows {
            schema.check_row(row)?;
        }

        self.tables.remove(table);
        let mut data = TableData::new(schema);
        for row in rows {
            let id = self.allocate_id();
            data.put(id, row);
        }
        self.tables
            .insert(data.schema.table_name.clone(), Arc::new(data));
        Ok(())
    }

    pub fn delete_schema(&mut self, table: &str) -> Result<(), StorageError> {
        self.tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))
    }

    /// Adds `index` to the schema of `table` and builds it over every row
    pub fn create_index(&mut self, table: &str, index: SchemaIndex) -> Result<(), StorageError> {
        let data = self.table_mut(table)?;
        if data.schema.index(&index.name).is_some() {
            return Err(StorageError::IndexAlreadyExists {
                table: table.to_string(),
                index: index.name,
            });
        }
        if data.schema.index_column(&index).is_none() {
            return Err(StorageError::ColumnNotFound {
                table: table.to_string(),
                column: index.column,
            });
        }

        data.schema.indexes.push(index);
        data.reindex();
        Ok(())
    }

    pub fn drop_index(&mut self, table: &str, name: &str) -> Result<(), StorageError> {
        let data = self.table_mut(table)?;
        let Some(pos) = data.schema.indexes.iter().position(|index| index.name == name) else {
            return Err(StorageError::IndexNotFound {
                table: table.to_string(),
                index: name.to_string(),
            });
        };

        data.schema.indexes.remove(pos);
        data.indexes.remove(name);
        Ok(())
    }

    /// Rebuilds a database from its serialized form
    pub fn from_file(file: DatabaseFile) -> Result<Self, StorageError> {
        let mut db = Self {
            tables: BTreeMap::new(),
            next_key: file.next_key,
        };

        for table in file.tables {
            let mut data = TableData::new(table.schema);
            for stored in table.rows {
                let row = Row::new(stored.values);
                data.schema.check_row(&row)?;
                if stored.key > db.next_key {
                    return Err(StorageError::Corrupted(format!(
                        "row key {} of table '{}' is beyond the key counter",
                        stored.key, data.schema.table_name
                    )));
                }
                data.put(stored.key, row);
            }
            db.tables
                .insert(data.schema.table_name.clone(), Arc::new(data));
        }

        Ok(db)
    }

    #[must_use]
    pub fn to_file(&self) -> DatabaseFile {
        DatabaseFile {
            next_key: self.next_key,
            tables: self
                .tables
                .values()
                .map(|t| TableFile {
                    schema: t.schema.clone(),
                    rows: t
                        .rows
                        .iter()
                        .map(|(key, row)| StoredRow {
                            key: *key,
                            values: row.values.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Serialized form of a whole [`MemoryDatabase`]; index entries are rebuilt
/// from the rows on load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseFile {
    pub next_key: u64,
    pub tables: Vec<TableFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFile {
    pub schema: Schema,
    pub rows: Vec<StoredRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRow {
    pub key: u64,
    pub values: Vec<Value>,
}

/// Owned cursor over one table snapshot
struct SnapshotIter {
    table: Arc<TableData>,
    last: Option<u64>,
}

impl Iterator for SnapshotIter {
    type Item = Result<(Key, Row), StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let lower = self.last.map_or(Bound::Unbounded, Bound::Excluded);
        let (id, row) = self.table.rows.range((lower, Bound::Unbounded)).next()?;
        self.last = Some(*id);
        Some(Ok((Key::from_id(*id), row.clone())))
    }
}
