use crate::core::{EngineError, Payload};
use crate::executor::QueryExecutor;
use crate::parser::parse_batch;
use crate::storage::{open_storage, Storage, StorageConfig};
use crate::transaction::{ExecutorState, OpenTransactionPolicy};
use tracing::{debug, warn};

/// Connection to one storage backend.
///
/// Statements of a `query` call run in order; the first failure stops the
/// batch and is returned in place of the payloads. Statements that already
/// ran keep their effects.
pub struct Handle {
    storage: Box<dyn Storage>,
    state: ExecutorState,
}

impl Handle {
    /// Attaches a backend, built in or custom
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            state: ExecutorState::Idle,
        }
    }

    pub fn open(config: &StorageConfig) -> Result<Self, EngineError> {
        Ok(Self {
            storage: open_storage(config)?,
            state: ExecutorState::Idle,
        })
    }

    /// Parses `sql` and executes its statements, one payload per statement
    pub fn query(&mut self, sql: &str) -> Result<Vec<Payload>, EngineError> {
        let statements = parse_batch(sql)?;
        debug!(statements = statements.len(), "batch");

        self.state = self.state.start_batch(self.storage.in_transaction());
        let mut payloads = Vec::with_capacity(statements.len());
        let mut failure = None;

        for stmt in statements {
            match QueryExecutor::execute(self.storage.as_mut(), stmt) {
                Ok(payload) => {
                    payloads.push(payload);
                    self.state = self.state.after_statement(self.storage.in_transaction());
                }
                Err(e) => {
                    debug!(error = %e, "statement failed");
                    self.state = ExecutorState::Failed;
                    failure = Some(e);
                    break;
                }
            }
        }

        let settled = self.settle_open_transaction();
        self.state = self.state.end_batch(self.storage.in_transaction());

        match (failure, settled) {
            (Some(e), Err(settle)) => {
                warn!(error = %settle, "could not end transaction after failed batch");
                Err(e)
            }
            (Some(e), Ok(())) => Err(e),
            (None, Err(settle)) => Err(settle),
            (None, Ok(())) => Ok(payloads),
        }
    }

    /// Applies the backend's policy to an explicit transaction left open at
    /// the end of a batch
    fn settle_open_transaction(&mut self) -> Result<(), EngineError> {
        if !self.storage.in_transaction() {
            return Ok(());
        }
        match self.storage.open_transaction_policy() {
            OpenTransactionPolicy::KeepOpen => Ok(()),
            OpenTransactionPolicy::Commit => {
                debug!("committing transaction left open by batch");
                Ok(self.storage.commit()?)
            }
            OpenTransactionPolicy::Rollback => {
                debug!("rolling back transaction left open by batch");
                Ok(self.storage.rollback()?)
            }
        }
    }

    #[must_use]
    pub const fn state(&self) -> ExecutorState {
        self.state
    }

    /// True while an explicit transaction is open
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.storage.in_transaction()
    }

    #[must_use]
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.storage.in_transaction() {
            warn!("handle dropped with an open transaction, rolling back");
            if let Err(e) = self.storage.rollback() {
                warn!(error = %e, "rollback on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("state", &self.state)
            .field("in_transaction", &self.storage.in_transaction())
            .finish_non_exhaustive()
    }
}

/// Opens a handle on the backend described by `config`
pub fn open(config: &StorageConfig) -> Result<Handle, EngineError> {
    Handle::open(config)
}

/// Runs `sql` on `handle`; see [`Handle::query`]
pub fn query(handle: &mut Handle, sql: &str) -> Result<Vec<Payload>, EngineError> {
    handle.query(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_batch_payloads() {
        let mut handle = Handle::new(MemoryStorage::new());
        let payloads = handle
            .query("CREATE TABLE T (id INTEGER, name TEXT); INSERT INTO T VALUES (1,'a'),(2,'b'); SELECT * FROM T;")
            .unwrap();
        assert_eq!(
            payloads,
            vec![
                Payload::Create { rows: 0 },
                Payload::Insert { rows: 2 },
                Payload::Select {
                    labels: vec!["id".to_string(), "name".to_string()],
                    rows: vec![
                        vec![Value::Integer(1), Value::from("a")],
                        vec![Value::Integer(2), Value::from("b")],
                    ],
                },
            ]
        );
        assert_eq!(handle.state(), ExecutorState::Idle);
    }

    #[test]
    fn test_failure_stops_batch_and_keeps_earlier_effects() {
        let mut handle = Handle::new(MemoryStorage::new());
        let err = handle
            .query("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1); SELECT * FROM missing; INSERT INTO t VALUES (2)")
            .unwrap_err();
        assert!(err.is_semantic());

        let payloads = handle.query("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(payloads[0].row_count(), Some(1));
        assert_eq!(
            payloads[0],
            Payload::Select {
                labels: vec!["COUNT(*)".to_string()],
                rows: vec![vec![Value::Integer(1)]],
            }
        );
    }

    #[test]
    fn test_syntax_error_runs_nothing() {
        let mut handle = Handle::new(MemoryStorage::new());
        let err = handle.query("CREATE TABLE t (id INTEGER); SELEC 1").unwrap_err();
        assert!(err.is_syntax());
        assert!(handle.query("SELECT * FROM t").unwrap_err().is_semantic());
    }

    #[test]
    fn test_transaction_kept_open_across_calls() {
        let mut handle = Handle::new(MemoryStorage::new());
        handle.query("CREATE TABLE t (id INTEGER); BEGIN; INSERT INTO t VALUES (1)").unwrap();
        assert!(handle.in_transaction());
        assert_eq!(handle.state(), ExecutorState::InTransaction);

        handle.query("ROLLBACK").unwrap();
        assert_eq!(handle.state(), ExecutorState::Idle);
        let payloads = handle.query("SELECT * FROM t").unwrap();
        assert_eq!(payloads[0].row_count(), Some(0));
    }
}
