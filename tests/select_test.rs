mod common;

use common::{select, text};
use pondsql::{EngineError, Handle, Payload, SemanticError, StorageConfig, Value};

fn fixture() -> Handle {
    let mut handle = Handle::open(&StorageConfig::Memory).unwrap();
    handle
        .query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT); \
             CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total DECIMAL); \
             INSERT INTO users VALUES (1, 'ann', 'oslo'), (2, 'bob', 'rome'), (3, 'cy', 'oslo'), (4, 'dee', NULL); \
             INSERT INTO orders VALUES (10, 1, 5), (11, 1, 7.5), (12, 2, 3), (13, 9, 1)",
        )
        .unwrap();
    handle
}

fn decimal(s: &str) -> Value {
    Value::Decimal(s.parse().unwrap())
}

#[test]
fn test_inner_join_with_pushed_filter() {
    let mut handle = fixture();
    let rows = select(
        &mut handle,
        "SELECT u.name, o.total FROM users u JOIN orders o ON o.user_id = u.id \
         WHERE u.city = 'oslo' AND o.total > 6 ORDER BY o.id",
    );
    assert_eq!(rows, vec![vec![text("ann"), decimal("7.5")]]);
}

#[test]
fn test_left_join_keeps_unmatched_rows() {
    let mut handle = fixture();
    let rows = select(
        &mut handle,
        "SELECT u.id, o.id FROM users u LEFT OUTER JOIN orders o ON o.user_id = u.id \
         WHERE o.id IS NULL ORDER BY u.id",
    );
    assert_eq!(
        rows,
        vec![
            vec![Value::Integer(3), Value::Null],
            vec![Value::Integer(4), Value::Null]
        ]
    );
}

#[test]
fn test_group_by_having_order() {
    let mut handle = fixture();
    let payloads = handle
        .query(
            "SELECT u.name, COUNT(*) AS orders, SUM(o.total) FROM users u \
             JOIN orders o ON o.user_id = u.id GROUP BY u.name HAVING SUM(o.total) > 2 \
             ORDER BY orders DESC, u.name",
        )
        .unwrap();
    assert_eq!(
        payloads[0],
        Payload::Select {
            labels: vec!["name".to_string(), "orders".to_string(), "SUM(o.total)".to_string()],
            rows: vec![
                vec![text("ann"), Value::Integer(2), decimal("12.5")],
                vec![text("bob"), Value::Integer(1), decimal("3")],
            ],
        }
    );
}

#[test]
fn test_aggregates_without_group_by() {
    let mut handle = fixture();
    let rows = select(
        &mut handle,
        "SELECT COUNT(*), COUNT(city), COUNT(DISTINCT city), MIN(name), MAX(id) FROM users",
    );
    assert_eq!(
        rows,
        vec![vec![
            Value::Integer(4),
            Value::Integer(3),
            Value::Integer(2),
            text("ann"),
            Value::Integer(4)
        ]]
    );

    let rows = select(&mut handle, "SELECT COUNT(*), SUM(id) FROM users WHERE id > 100");
    assert_eq!(rows, vec![vec![Value::Integer(0), Value::Null]]);
}

#[test]
fn test_order_limit_offset_distinct() {
    let mut handle = fixture();
    assert_eq!(
        select(&mut handle, "SELECT DISTINCT city FROM users ORDER BY city"),
        vec![vec![text("oslo")], vec![text("rome")], vec![Value::Null]]
    );
    assert_eq!(
        select(&mut handle, "SELECT name FROM users ORDER BY id DESC LIMIT 2 OFFSET 1"),
        vec![vec![text("cy")], vec![text("bob")]]
    );
    assert_eq!(
        select(&mut handle, "SELECT name, id * 2 AS twice FROM users ORDER BY 2 DESC LIMIT 1"),
        vec![vec![text("dee"), Value::Integer(8)]]
    );
}

#[test]
fn test_natural_order_without_order_by() {
    let mut handle = fixture();
    handle.query("DELETE FROM users WHERE id = 2; INSERT INTO users VALUES (2, 'bo', NULL)").unwrap();
    assert_eq!(
        select(&mut handle, "SELECT id FROM users"),
        vec![
            vec![Value::Integer(1)],
            vec![Value::Integer(3)],
            vec![Value::Integer(4)],
            vec![Value::Integer(2)]
        ]
    );
}

#[test]
fn test_insert_select_and_create_as() {
    let mut handle = fixture();
    handle
        .query("CREATE TABLE big (uid INTEGER, amount DECIMAL, note TEXT DEFAULT 'copied')")
        .unwrap();
    let payloads = handle
        .query("INSERT INTO big (uid, amount) SELECT user_id, total FROM orders WHERE total >= 5")
        .unwrap();
    assert_eq!(payloads[0], Payload::Insert { rows: 2 });
    assert_eq!(
        select(&mut handle, "SELECT note FROM big WHERE uid = 1 LIMIT 1"),
        vec![vec![text("copied")]]
    );

    let payloads = handle
        .query("CREATE TABLE per_city AS SELECT city, COUNT(*) AS n FROM users GROUP BY city")
        .unwrap();
    assert_eq!(payloads[0], Payload::Create { rows: 3 });
    let payloads = handle.query("SHOW COLUMNS FROM per_city").unwrap();
    assert_eq!(
        payloads[0],
        Payload::ShowColumns {
            columns: vec![
                ("city".to_string(), pondsql::DataType::Text),
                ("n".to_string(), pondsql::DataType::Integer)
            ]
        }
    );
}

#[test]
fn test_resolution_errors() {
    let mut handle = fixture();
    let cases = [
        "SELECT nope FROM users",
        "SELECT id FROM users JOIN orders ON users.id = orders.user_id",
        "SELECT x.id FROM users u",
        "SELECT name, COUNT(*) FROM users",
        "SELECT * FROM users WHERE SUM(id) > 1",
        "SELECT FOO(1)",
    ];
    for sql in cases {
        assert!(handle.query(sql).unwrap_err().is_semantic(), "{sql}");
    }

    let err = handle.query("SELECT id FROM users JOIN orders ON users.id = orders.user_id").unwrap_err();
    assert!(matches!(err, EngineError::Semantic(SemanticError::AmbiguousColumn(_))));
}

#[test]
fn test_select_maps() {
    let mut handle = fixture();
    let payloads = handle.query("SELECT id, name FROM users WHERE id = 1").unwrap();
    let maps = payloads[0].select_maps().unwrap();
    assert_eq!(maps[0]["name"], &text("ann"));
}
