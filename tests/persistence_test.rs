mod common;

use common::{count, select, text};
use pondsql::{EngineError, Handle, KvConfig, KvMode, StorageConfig, StorageError, Value};
use tempfile::TempDir;

fn json(dir: &TempDir) -> StorageConfig {
    StorageConfig::Json {
        path: dir.path().join("db.json"),
    }
}

fn kv(dir: &TempDir) -> StorageConfig {
    StorageConfig::KeyValue(KvConfig::new(dir.path().join("db")))
}

#[test]
fn test_json_reopen_sees_committed_writes() {
    let dir = TempDir::new().unwrap();
    {
        let mut handle = Handle::open(&json(&dir)).unwrap();
        handle
            .query(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, born DATE); \
                 INSERT INTO t VALUES (1, 'a', '2000-01-01'), (2, 'b', NULL); \
                 UPDATE t SET name = 'bb' WHERE id = 2",
            )
            .unwrap();
        handle.query("BEGIN; DELETE FROM t WHERE id = 1; ROLLBACK").unwrap();
    }

    let mut handle = Handle::open(&json(&dir)).unwrap();
    assert_eq!(count(&mut handle, "t"), 2);
    assert_eq!(
        select(&mut handle, "SELECT name FROM t ORDER BY id"),
        vec![vec![text("a")], vec![text("bb")]]
    );
    let schema = handle.storage().fetch_schema("t").unwrap().unwrap();
    assert!(schema.columns[0].primary_key);
}

#[test]
fn test_json_commits_transaction_left_open() {
    let dir = TempDir::new().unwrap();
    {
        let mut handle = Handle::open(&json(&dir)).unwrap();
        handle
            .query("CREATE TABLE t (x INTEGER); BEGIN; INSERT INTO t VALUES (1)")
            .unwrap();
        assert!(!handle.in_transaction());
    }

    let mut handle = Handle::open(&json(&dir)).unwrap();
    assert_eq!(count(&mut handle, "t"), 1);
}

#[test]
fn test_kv_reopen_sees_only_committed_writes() {
    let dir = TempDir::new().unwrap();
    {
        let mut handle = Handle::open(&kv(&dir)).unwrap();
        handle
            .query(
                "CREATE TABLE t (id INTEGER, tag BYTEA); \
                 INSERT INTO t VALUES (1, X'01'), (2, X'02'); \
                 BEGIN; INSERT INTO t VALUES (3, X'03'); COMMIT; \
                 BEGIN; INSERT INTO t VALUES (4, X'04'); DELETE FROM t WHERE id = 1; ROLLBACK",
            )
            .unwrap();
        // Left open and discarded when the handle is dropped
        handle.query("BEGIN; INSERT INTO t VALUES (5, NULL)").unwrap();
        assert!(handle.in_transaction());
    }

    let mut handle = Handle::open(&kv(&dir)).unwrap();
    assert_eq!(
        select(&mut handle, "SELECT id FROM t ORDER BY id"),
        vec![
            vec![Value::Integer(1)],
            vec![Value::Integer(2)],
            vec![Value::Integer(3)]
        ]
    );
}

#[test]
fn test_kv_high_throughput_mode() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::KeyValue(KvConfig {
        mode: KvMode::HighThroughput,
        use_compression: true,
        compression_factor: 3,
        ..KvConfig::new(dir.path().join("db"))
    });
    let mut handle = Handle::open(&config).unwrap();
    handle
        .query("CREATE TABLE t (x TEXT); INSERT INTO t VALUES ('a'), ('b')")
        .unwrap();
    assert_eq!(count(&mut handle, "t"), 2);
}

#[test]
fn test_kv_invalid_compression_factor() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::KeyValue(KvConfig {
        use_compression: true,
        compression_factor: 23,
        ..KvConfig::new(dir.path().join("db"))
    });
    assert!(matches!(
        Handle::open(&config),
        Err(EngineError::Storage(StorageError::InvalidConfig(_)))
    ));
}

#[test]
fn test_kv_alter_and_drop_persist() {
    let dir = TempDir::new().unwrap();
    {
        let mut handle = Handle::open(&kv(&dir)).unwrap();
        handle
            .query(
                "CREATE TABLE a (x INTEGER); INSERT INTO a VALUES (1); \
                 ALTER TABLE a RENAME TO b; ALTER TABLE b ADD COLUMN y TEXT DEFAULT 'd'; \
                 CREATE TABLE gone (z INTEGER); DROP TABLE gone",
            )
            .unwrap();
    }

    let mut handle = Handle::open(&kv(&dir)).unwrap();
    assert_eq!(
        select(&mut handle, "SELECT * FROM b"),
        vec![vec![Value::Integer(1), text("d")]]
    );
    assert!(handle.query("SELECT * FROM a").unwrap_err().is_semantic());
    assert!(handle.query("SELECT * FROM gone").unwrap_err().is_semantic());
}

#[test]
fn test_json_failed_write_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::Json {
        path: dir.path().join("no_such_dir").join("db.json"),
    };
    let mut handle = Handle::open(&config).unwrap();

    let err = handle.query("CREATE TABLE t (id INTEGER)").unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::Io(_))));
    assert!(handle.query("SELECT * FROM t").unwrap_err().is_semantic());

    let err = handle.query("BEGIN; CREATE TABLE u (id INTEGER); COMMIT").unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::Io(_))));
    assert!(!handle.in_transaction());
    assert!(handle.query("SELECT * FROM u").unwrap_err().is_semantic());
}

#[test]
fn test_json_indexes_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut handle = Handle::open(&json(&dir)).unwrap();
        handle
            .query(
                "CREATE TABLE t (id INTEGER, tag TEXT); \
                 INSERT INTO t VALUES (1, 'a'), (2, 'b'), (3, 'a'); \
                 CREATE INDEX by_tag ON t (tag)",
            )
            .unwrap();
    }

    let mut handle = Handle::open(&json(&dir)).unwrap();
    let schema = handle.storage().fetch_schema("t").unwrap().unwrap();
    assert_eq!(schema.indexes.len(), 1);
    assert_eq!(
        select(&mut handle, "SELECT id FROM t WHERE tag = 'a'"),
        vec![vec![Value::Integer(1)], vec![Value::Integer(3)]]
    );
}

#[test]
fn test_kv_rows_follow_primary_key_order() {
    let dir = TempDir::new().unwrap();
    {
        let mut handle = Handle::open(&kv(&dir)).unwrap();
        handle
            .query(
                "CREATE TABLE k (id INTEGER PRIMARY KEY, tag TEXT); \
                 INSERT INTO k VALUES (30, 'a'), (-2, 'b'), (7, 'a'); \
                 CREATE INDEX by_tag ON k (tag); \
                 UPDATE k SET id = 1 WHERE id = 30",
            )
            .unwrap();
    }

    let mut handle = Handle::open(&kv(&dir)).unwrap();
    assert_eq!(
        select(&mut handle, "SELECT id FROM k"),
        vec![vec![Value::Integer(-2)], vec![Value::Integer(1)], vec![Value::Integer(7)]]
    );
    assert_eq!(
        select(&mut handle, "SELECT id FROM k WHERE tag = 'a'"),
        vec![vec![Value::Integer(1)], vec![Value::Integer(7)]]
    );

    assert!(handle.query("INSERT INTO k VALUES (7, 'c')").is_err());
    handle.query("DROP INDEX k.by_tag").unwrap();
    assert_eq!(count(&mut handle, "k"), 3);
    assert_eq!(
        select(&mut handle, "SELECT id FROM k WHERE tag = 'a'"),
        vec![vec![Value::Integer(1)], vec![Value::Integer(7)]]
    );
}
