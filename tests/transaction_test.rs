mod common;

use common::{count, select};
use pondsql::{
    EngineError, ExecutorState, Handle, KvConfig, Payload, StorageConfig, StorageError, Value,
};
use std::thread;
use tempfile::TempDir;

fn shared(name: &str) -> Handle {
    Handle::open(&StorageConfig::SharedNamespace {
        name: name.to_string(),
    })
    .unwrap()
}

fn memory() -> Handle {
    Handle::open(&StorageConfig::Memory).unwrap()
}

#[test]
fn test_rollback_discards_writes() {
    let mut handle = memory();
    handle.query("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1)").unwrap();
    let payloads = handle
        .query("START TRANSACTION; INSERT INTO t VALUES (2); UPDATE t SET x = 10; ROLLBACK")
        .unwrap();
    assert_eq!(payloads[0], Payload::StartTransaction);
    assert_eq!(payloads[3], Payload::Rollback);
    assert_eq!(select(&mut handle, "SELECT x FROM t"), vec![vec![Value::Integer(1)]]);
}

#[test]
fn test_commit_keeps_writes() {
    let mut handle = memory();
    handle
        .query("CREATE TABLE t (x INTEGER); BEGIN TRANSACTION; INSERT INTO t VALUES (1), (2); COMMIT")
        .unwrap();
    assert_eq!(count(&mut handle, "t"), 2);
    assert_eq!(handle.state(), ExecutorState::Idle);
}

#[test]
fn test_ddl_rolls_back() {
    let mut handle = memory();
    handle.query("BEGIN; CREATE TABLE t (x INTEGER); ROLLBACK").unwrap();
    assert!(handle.query("SELECT * FROM t").unwrap_err().is_semantic());
}

#[test]
fn test_nested_begin_and_stray_commit() {
    let mut handle = memory();
    let err = handle.query("BEGIN; BEGIN").unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::NestedTransaction)));
    // The first BEGIN stays in effect
    assert!(handle.in_transaction());
    handle.query("ROLLBACK").unwrap();

    let err = handle.query("COMMIT").unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::NoTransaction)));
}

#[test]
fn test_failed_statement_inside_transaction() {
    let mut handle = memory();
    handle.query("CREATE TABLE t (x INTEGER NOT NULL)").unwrap();
    let err = handle
        .query("BEGIN; INSERT INTO t VALUES (1); INSERT INTO t VALUES (2), (NULL)")
        .unwrap_err();
    assert!(err.is_constraint());

    // The failing statement applied nothing; the earlier one is still pending
    assert_eq!(handle.state(), ExecutorState::InTransaction);
    assert_eq!(count(&mut handle, "t"), 1);
    handle.query("COMMIT").unwrap();
    assert_eq!(count(&mut handle, "t"), 1);
}

#[test]
fn test_dropped_handle_rolls_back_shared_transaction() {
    let mut writer = shared("tx-drop");
    writer.query("CREATE TABLE t (x INTEGER)").unwrap();
    {
        let mut other = shared("tx-drop");
        other.query("BEGIN; INSERT INTO t VALUES (1)").unwrap();
    }
    assert_eq!(count(&mut writer, "t"), 0);
}

#[test]
fn test_shared_handles_see_committed_writes() {
    let mut a = shared("tx-visibility");
    let mut b = shared("tx-visibility");

    a.query("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(count(&mut b, "t"), 1);

    a.query("BEGIN; INSERT INTO t VALUES (2)").unwrap();
    assert_eq!(count(&mut b, "t"), 1);
    a.query("COMMIT").unwrap();
    assert_eq!(count(&mut b, "t"), 2);
}

#[test]
fn test_shared_conflicting_commit() {
    let mut a = shared("tx-conflict");
    let mut b = shared("tx-conflict");
    a.query("CREATE TABLE t (x INTEGER)").unwrap();

    a.query("BEGIN; INSERT INTO t VALUES (1)").unwrap();
    b.query("BEGIN; INSERT INTO t VALUES (2)").unwrap();
    a.query("COMMIT").unwrap();

    let err = b.query("COMMIT").unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::Conflict(_))));
    assert!(!b.in_transaction());
    assert_eq!(select(&mut b, "SELECT x FROM t"), vec![vec![Value::Integer(1)]]);
}

#[test]
fn test_kv_conflicting_commit() {
    let dir = TempDir::new().unwrap();
    let db = sled::open(dir.path().join("db")).unwrap();
    let mut a = Handle::new(pondsql::storage::KvStorage::from_db(db.clone()));
    let mut b = Handle::new(pondsql::storage::KvStorage::from_db(db));

    a.query("CREATE TABLE t (x INTEGER)").unwrap();
    a.query("BEGIN; INSERT INTO t VALUES (1)").unwrap();
    b.query("BEGIN; INSERT INTO t VALUES (2)").unwrap();
    a.query("COMMIT").unwrap();

    let err = b.query("COMMIT").unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::Conflict(_))));
    assert_eq!(count(&mut b, "t"), 1);
}

#[test]
fn test_shared_concurrent_statement_writers() {
    let mut setup = shared("tx-threads");
    setup.query("CREATE TABLE t (x INTEGER)").unwrap();

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            thread::spawn(move || {
                let mut handle = shared("tx-threads");
                for i in 0..25 {
                    handle
                        .query(&format!("INSERT INTO t VALUES ({})", worker * 100 + i))
                        .unwrap();
                    // A reader never sees a half-applied statement
                    let n = count(&mut handle, "t");
                    assert!(n >= i + 1);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(count(&mut setup, "t"), 100);
}

#[test]
fn test_kv_config_from_file_format() {
    let config: StorageConfig = serde_json::from_str(
        r#"{"type": "key_value", "path": "x", "cache_capacity": 1024, "use_compression": true}"#,
    )
    .unwrap();
    match config {
        StorageConfig::KeyValue(kv) => {
            assert_eq!(kv.cache_capacity, 1024);
            assert_eq!(kv.compression_factor, KvConfig::default().compression_factor);
        }
        other => panic!("Expected key-value config, got {other:?}"),
    }
}
