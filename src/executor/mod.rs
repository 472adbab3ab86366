/// Executor module - runs plans against a storage handle
///
/// Structure:
/// - dispatcher: plans a statement and routes it, wraps implicit statement transactions
/// - evaluate: expression evaluation over a row
/// - aggregate: GROUP BY and aggregate functions
/// - queries: SELECT (scan, join, filter, order, distinct, limit)
/// - dml: INSERT/UPDATE/DELETE operations
/// - ddl: CREATE/DROP/ALTER TABLE and SHOW operations

mod dispatcher;
pub mod evaluate;
pub mod aggregate;
pub mod queries;
pub mod dml;
pub mod ddl;

pub use dispatcher::QueryExecutor;
pub use evaluate::{like_match, Evaluator};
pub use aggregate::{AggregateExecutor, GroupKey};
pub use queries::SelectExecutor;
pub use dml::DmlExecutor;
pub use ddl::DdlExecutor;
