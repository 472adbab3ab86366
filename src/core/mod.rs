// Module declarations
pub mod error;
pub mod value;
pub mod data_type;
pub mod column;
pub mod row;
pub mod schema;
pub mod payload;

// Re-exports for convenience
pub use error::{ConstraintError, EngineError, SemanticError, StorageError};
pub use value::Value;
pub use data_type::DataType;
pub use column::Column;
pub use row::{Key, Row};
pub use schema::{Schema, SchemaIndex};
pub use payload::Payload;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn users() -> Schema {
        Schema::new(
            "users",
            vec![
                Column {
                    name: "id".to_string(),
                    data_type: DataType::Integer,
                    nullable: false,
                    unique: true,
                    primary_key: true,
                    default: None,
                },
                Column::new("name", DataType::Text),
            ],
        )
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Text("hello".to_string()).to_string(), "hello");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::Bytea(vec![0xde, 0xad]).to_string(), "\\xdead");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Integer(42).as_int(), Some(42));
        assert_eq!(Value::Text("hello".to_string()).as_int(), None);
        assert_eq!(Value::Text("hello".to_string()).as_text(), Some("hello"));
        assert_eq!(Value::Boolean(false).as_bool(), Some(false));
        assert_eq!(Value::Integer(2).as_f64(), Some(2.0));
    }

    #[test]
    fn test_value_coerce() {
        assert_eq!(Value::Integer(1).coerce(DataType::Float), Some(Value::Float(1.0)));
        assert_eq!(Value::Float(1.5).coerce(DataType::Integer), None);
        assert_eq!(Value::Text("abc".to_string()).coerce(DataType::Integer), None);
        assert_eq!(Value::Null.coerce(DataType::Boolean), Some(Value::Null));

        let date = Value::Text("2024-02-29".to_string()).coerce(DataType::Date);
        assert!(matches!(date, Some(Value::Date(_))));
        assert_eq!(Value::Text("2024-02-30".to_string()).coerce(DataType::Date), None);
    }

    #[test]
    fn test_value_cast() {
        assert_eq!(
            Value::Text(" 12 ".to_string()).cast(DataType::Integer),
            Ok(Value::Integer(12))
        );
        assert_eq!(Value::Float(2.9).cast(DataType::Integer), Ok(Value::Integer(2)));
        assert_eq!(
            Value::Integer(5).cast(DataType::Text),
            Ok(Value::Text("5".to_string()))
        );
        assert!(Value::Text("x".to_string()).cast(DataType::Boolean).is_err());
    }

    #[test]
    fn test_value_comparison() {
        assert_eq!(Value::Integer(1).sql_cmp(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Integer(1).sql_cmp(&Value::Null), None);
        assert_eq!(Value::Integer(1).sql_cmp(&Value::Text("1".to_string())), None);
        assert_eq!(Value::Null.total_cmp(&Value::Integer(1)), Ordering::Greater);
        assert_eq!(
            Value::Text("a".to_string()).total_cmp(&Value::Text("b".to_string())),
            Ordering::Less
        );
    }

    #[test]
    fn test_total_order_places_nan_after_numbers() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan.total_cmp(&Value::Integer(1)), Ordering::Greater);
        assert_eq!(Value::Float(1e300).total_cmp(&nan), Ordering::Less);
        assert_eq!(nan.total_cmp(&Value::Float(f64::NAN)), Ordering::Equal);
        assert_eq!(nan.total_cmp(&Value::Text("a".to_string())), Ordering::Less);
        assert_eq!(nan.total_cmp(&Value::Null), Ordering::Less);
        assert_eq!(Value::Integer(0).total_cmp(&Value::Float(-0.0)), Ordering::Equal);
    }

    #[test]
    fn test_value_sql_literal() {
        assert_eq!(Value::Text("it's".to_string()).to_sql_literal(), "'it''s'");
        assert_eq!(Value::Float(1.0).to_sql_literal(), "1.0");
        assert_eq!(Value::Bytea(vec![1, 255]).to_sql_literal(), "X'01ff'");
    }

    #[test]
    fn test_schema_get_column_index() {
        let schema = users();
        assert_eq!(schema.get_column_index("id"), Some(0));
        assert_eq!(schema.get_column_index("NAME"), Some(1));
        assert_eq!(schema.get_column_index("age"), None);
    }

    #[test]
    fn test_schema_check_row() {
        let schema = users();
        let ok = Row::new(vec![Value::Integer(1), Value::Text("Alice".to_string())]);
        let short = Row::new(vec![Value::Integer(1)]);

        assert!(schema.check_row(&ok).is_ok());
        assert!(matches!(
            schema.check_row(&short),
            Err(StorageError::SchemaMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_schema_to_ddl() {
        let mut schema = users();
        schema.columns.push(Column {
            default: Some(Value::Integer(0)),
            ..Column::new("age", DataType::Integer).not_null()
        });
        assert_eq!(
            schema.to_ddl(),
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER NOT NULL DEFAULT 0);"
        );
    }

    #[test]
    fn test_key_order_matches_allocation_order() {
        assert!(Key::from_id(1) < Key::from_id(256));
        assert_eq!(Key::from_id(256).id(), Some(256));
        assert_eq!(Key::from_bytes(b"abc").id(), None);
    }

    #[test]
    fn test_sort_key_follows_value_order() {
        let sorted = |values: Vec<Value>| {
            let mut by_key = values.clone();
            by_key.sort_by_key(Value::sort_key);
            let mut by_value = values;
            by_value.sort_by(Value::total_cmp);
            assert_eq!(by_key, by_value);
        };
        sorted(vec![
            Value::Integer(3),
            Value::Integer(-7),
            Value::Integer(0),
            Value::Integer(i64::MIN),
            Value::Integer(i64::MAX),
        ]);
        sorted(vec![
            Value::Float(2.5),
            Value::Float(-1e10),
            Value::Float(f64::MAX),
            Value::Float(0.0),
            Value::Float(-0.5),
        ]);
        sorted(
            ["-1.5", "-1.2", "-0.5", "0", "0.25", "10", "9.99"]
                .iter()
                .map(|s| Value::Decimal(s.parse().unwrap()))
                .collect(),
        );
        sorted(vec![Value::from("b"), Value::from("ab"), Value::from("abc")]);

        assert_eq!(Value::Float(-0.0).sort_key(), Value::Float(0.0).sort_key());
        assert!(Value::Float(f64::NAN).sort_key() > Value::Float(f64::INFINITY).sort_key());
    }
}
