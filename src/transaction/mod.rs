// Transaction module - per-handle transaction context and batch state

mod snapshot;
mod state;

pub use snapshot::Transaction;
pub use state::ExecutorState;

use serde::{Deserialize, Serialize};

/// How a storage transaction was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionMode {
    /// `START TRANSACTION` / `BEGIN`, ended by `COMMIT` or `ROLLBACK`
    Explicit,
    /// Implicit transaction wrapping one mutating statement
    Statement,
}

/// What the handle does with an explicit transaction still open when a
/// `query` call reaches the end of its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenTransactionPolicy {
    /// The transaction stays open across calls
    KeepOpen,
    Commit,
    Rollback,
}
