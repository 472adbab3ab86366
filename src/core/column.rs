use serde::{Deserialize, Serialize};
use super::data_type::DataType;
use super::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// UNIQUE or PRIMARY KEY
    pub unique: bool,
    pub primary_key: bool,
    /// Constant DEFAULT, folded when the table is created
    pub default: Option<Value>,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            unique: false,
            primary_key: false,
            default: None,
        }
    }

    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Value used when an INSERT does not mention this column
    #[must_use]
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }

    #[must_use]
    pub fn to_ddl(&self) -> String {
        let mut ddl = format!("{} {}", self.name, self.data_type);
        if self.primary_key {
            ddl.push_str(" PRIMARY KEY");
        } else {
            if !self.nullable {
                ddl.push_str(" NOT NULL");
            }
            if self.unique {
                ddl.push_str(" UNIQUE");
            }
        }
        if let Some(default) = &self.default {
            ddl.push_str(" DEFAULT ");
            ddl.push_str(&default.to_sql_literal());
        }
        ddl
    }
}
