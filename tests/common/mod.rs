// Helpers shared by the integration tests
#![allow(dead_code)]

use pondsql::{Handle, Payload, Value};

/// Rows of the single SELECT in `sql`
pub fn select(handle: &mut Handle, sql: &str) -> Vec<Vec<Value>> {
    let mut payloads = handle.query(sql).unwrap();
    match payloads.pop() {
        Some(Payload::Select { rows, .. }) => rows,
        other => panic!("Expected Select payload, got {other:?}"),
    }
}

/// `SELECT COUNT(*) FROM table`
pub fn count(handle: &mut Handle, table: &str) -> i64 {
    let rows = select(handle, &format!("SELECT COUNT(*) FROM {table}"));
    rows[0][0].as_int().unwrap()
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
