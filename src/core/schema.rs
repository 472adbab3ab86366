use serde::{Deserialize, Serialize};
use super::column::Column;
use super::error::StorageError;
use super::row::Row;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub table_name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<SchemaIndex>,
}

/// Secondary index over one column; names are unique within a table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaIndex {
    pub name: String,
    pub column: String,
}

impl SchemaIndex {
    #[must_use]
    pub fn new(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
        }
    }
}

impl Schema {
    #[must_use]
    pub fn new(table_name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<&SchemaIndex> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Column position an index covers
    #[must_use]
    pub fn index_column(&self, index: &SchemaIndex) -> Option<usize> {
        self.get_column_index(&index.column)
    }

    /// First index over the column at `idx`
    #[must_use]
    pub fn index_on(&self, idx: usize) -> Option<&SchemaIndex> {
        let column = self.columns.get(idx)?;
        self.indexes
            .iter()
            .find(|index| index.column.eq_ignore_ascii_case(&column.name))
    }

    #[must_use]
    pub fn primary_key(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.primary_key)
    }

    #[must_use]
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.get_column_index(name).map(|idx| &self.columns[idx])
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Shape check every backend runs before accepting a row
    pub fn check_row(&self, row: &Row) -> Result<(), StorageError> {
        if row.len() != self.columns.len() {
            return Err(StorageError::SchemaMismatch {
                table: self.table_name.clone(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        Ok(())
    }

    /// `CREATE TABLE` statement recreating this schema
    #[must_use]
    pub fn to_ddl(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(Column::to_ddl)
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({columns});", self.table_name)
    }

    /// `CREATE INDEX` statements recreating the indexes of this schema
    #[must_use]
    pub fn index_ddl(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|index| {
                format!(
                    "CREATE INDEX {} ON {} ({});",
                    index.name, self.table_name, index.column
                )
            })
            .collect()
    }
}
