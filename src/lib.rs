// pondsql - embeddable SQL engine over pluggable storage backends

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]

// Values, schemas, rows, payloads and errors
pub mod core;

// SQL parser (DDL, DML, queries, transaction control, SHOW)
pub mod parser;

// Binds statements to the live schema
pub mod planner;

// Runs plans: expressions, SELECT pipeline, DML, DDL
pub mod executor;

// Transaction modes, snapshots and the batch state machine
pub mod transaction;

// Storage trait and backends (memory, JSON file, sled, shared namespace)
pub mod storage;

mod handle;
pub mod dump;

// Re-export commonly used types for convenience
pub use core::{
    Column, ConstraintError, DataType, EngineError, Key, Payload, Row, Schema, SchemaIndex,
    SemanticError, StorageError, Value,
};
pub use handle::{open, query, Handle};
pub use parser::{parse_batch, parse_statement, Statement};
pub use storage::{KvConfig, KvMode, Storage, StorageConfig};
pub use transaction::{ExecutorState, OpenTransactionPolicy, TransactionMode};
