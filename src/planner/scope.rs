use crate::core::{DataType, Schema, SemanticError};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeColumn {
    /// Name of the table or alias this column is visible through
    pub table: String,
    pub name: String,
    pub data_type: DataType,
}

/// Columns visible to an expression, laid out as the combined row of the
/// tables in FROM order
#[derive(Debug, Clone, Default)]
pub struct Scope {
    columns: Vec<ScopeColumn>,
    tables: Vec<(String, Range<usize>)>,
}

impl Scope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn for_table(schema: &Schema) -> Self {
        let mut scope = Self::new();
        scope.push_table(&schema.table_name, schema);
        scope
    }

    pub fn push_table(&mut self, visible_name: &str, schema: &Schema) {
        let start = self.columns.len();
        self.columns.extend(schema.columns.iter().map(|c| ScopeColumn {
            table: visible_name.to_string(),
            name: c.name.clone(),
            data_type: c.data_type,
        }));
        self.tables
            .push((visible_name.to_string(), start..self.columns.len()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn column(&self, idx: usize) -> &ScopeColumn {
        &self.columns[idx]
    }

    /// Row positions of the table visible as `name`
    pub fn table_range(&self, name: &str) -> Result<Range<usize>, SemanticError> {
        self.tables
            .iter()
            .find(|(table, _)| table == name)
            .map(|(_, range)| range.clone())
            .ok_or_else(|| SemanticError::AliasNotFound(name.to_string()))
    }

    /// Index of the table owning row position `idx`
    #[must_use]
    pub fn table_of(&self, idx: usize) -> Option<usize> {
        self.tables.iter().position(|(_, range)| range.contains(&idx))
    }

    /// Resolves `name` or `table.name` to a row position.
    ///
    /// Table names match exactly; column names ignore ASCII case.
    pub fn resolve(&self, table: Option<&str>, name: &str) -> Result<usize, SemanticError> {
        let range = match table {
            Some(table) => self.table_range(table)?,
            None => 0..self.columns.len(),
        };

        let mut matches = range.filter(|&idx| self.columns[idx].name.eq_ignore_ascii_case(name));
        let Some(first) = matches.next() else {
            let full = table.map_or_else(|| name.to_string(), |t| format!("{t}.{name}"));
            return Err(SemanticError::ColumnNotFound(full));
        };
        if matches.next().is_some() {
            return Err(SemanticError::AmbiguousColumn(name.to_string()));
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    fn scope() -> Scope {
        let users = Schema::new(
            "users",
            vec![
                Column::new("id", DataType::Integer),
                Column::new("name", DataType::Text),
            ],
        );
        let orders = Schema::new(
            "orders",
            vec![
                Column::new("id", DataType::Integer),
                Column::new("user_id", DataType::Integer),
            ],
        );
        let mut scope = Scope::new();
        scope.push_table("u", &users);
        scope.push_table("orders", &orders);
        scope
    }

    #[test]
    fn test_resolve_qualified_and_unqualified() {
        let scope = scope();
        assert_eq!(scope.resolve(None, "NAME"), Ok(1));
        assert_eq!(scope.resolve(Some("orders"), "id"), Ok(2));
        assert_eq!(scope.resolve(None, "user_id"), Ok(3));
        assert_eq!(scope.table_of(3), Some(1));
    }

    #[test]
    fn test_resolve_errors() {
        let scope = scope();
        assert_eq!(
            scope.resolve(None, "id"),
            Err(SemanticError::AmbiguousColumn("id".to_string()))
        );
        assert_eq!(
            scope.resolve(None, "missing"),
            Err(SemanticError::ColumnNotFound("missing".to_string()))
        );
        assert_eq!(
            scope.resolve(Some("users"), "id"),
            Err(SemanticError::AliasNotFound("users".to_string()))
        );
        assert_eq!(
            scope.resolve(Some("u"), "user_id"),
            Err(SemanticError::ColumnNotFound("u.user_id".to_string()))
        );
    }
}
