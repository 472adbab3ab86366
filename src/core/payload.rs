use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use super::data_type::DataType;
use super::value::Value;

/// Result of one executed statement.
///
/// Serializes as an internally tagged record, e.g.
/// `{"type": "Insert", "rows": 2}`, so bindings can dispatch on the tag
/// without positional assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    Create { rows: usize },
    Insert { rows: usize },
    Update { rows: usize },
    Delete { rows: usize },
    Select {
        labels: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    DropTable { count: usize },
    AlterTable,
    CreateIndex,
    DropIndex,
    StartTransaction,
    Commit,
    Rollback,
    ShowVariable { name: String, value: String },
    ShowColumns { columns: Vec<(String, DataType)> },
}

impl Payload {
    /// Rows of a `Select` payload as label → value maps
    #[must_use]
    pub fn select_maps(&self) -> Option<Vec<HashMap<&str, &Value>>> {
        match self {
            Self::Select { labels, rows } => Some(
                rows.iter()
                    .map(|row| {
                        labels
                            .iter()
                            .map(String::as_str)
                            .zip(row.iter())
                            .collect()
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Number of rows affected or returned
    #[must_use]
    pub fn row_count(&self) -> Option<usize> {
        match self {
            Self::Create { rows }
            | Self::Insert { rows }
            | Self::Update { rows }
            | Self::Delete { rows } => Some(*rows),
            Self::Select { rows, .. } => Some(rows.len()),
            Self::DropTable { count } => Some(*count),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let json = serde_json::to_value(Payload::Insert { rows: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Insert", "rows": 2 }));

        let json = serde_json::to_value(Payload::Commit).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Commit" }));
    }

    #[test]
    fn test_payload_round_trips_select() {
        let payload = Payload::Select {
            labels: vec!["id".to_string(), "name".to_string()],
            rows: vec![vec![Value::Integer(1), Value::Text("a".to_string())]],
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_select_maps() {
        let payload = Payload::Select {
            labels: vec!["id".to_string()],
            rows: vec![vec![Value::Integer(7)]],
        };
        let maps = payload.select_maps().unwrap();
        assert_eq!(maps[0]["id"], &Value::Integer(7));
        assert!(Payload::Commit.select_maps().is_none());
    }
}
