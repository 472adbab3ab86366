use thiserror::Error;

/// Error returned across the engine boundary.
///
/// Every failure of `query` is one of these four kinds. The `Display`
/// output is the human-readable message bindings forward to their callers.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Syntax error at line {line}, column {column}: {message}")]
    Syntax {
        /// Byte offset into the submitted SQL text
        position: usize,
        line: usize,
        column: usize,
        message: String,
    },
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    #[must_use]
    pub const fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }

    #[must_use]
    pub const fn is_semantic(&self) -> bool {
        matches!(self, Self::Semantic(_))
    }

    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Unresolvable references and type errors found while planning or evaluating
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),
    #[error("Column '{0}' is ambiguous")]
    AmbiguousColumn(String),
    #[error("Column '{0}' specified more than once")]
    DuplicateColumn(String),
    #[error("Column '{column}' expects {expected}, got {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },
    #[error("Expected {expected} values, got {found}")]
    ValueCountMismatch { expected: usize, found: usize },
    #[error("Column '{0}' must appear in GROUP BY or be used in an aggregate")]
    NotGrouped(String),
    #[error("Aggregate functions are not allowed in {0}")]
    MisplacedAggregate(&'static str),
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
    #[error("Function '{name}' expects {expected} arguments, got {found}")]
    FunctionArity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Table alias '{0}' not found")]
    AliasNotFound(String),
    #[error("Cannot drop the only column of table '{0}'")]
    DropLastColumn(String),
    #[error("Index '{0}' not found")]
    IndexNotFound(String),
    #[error("Index '{0}' already exists")]
    IndexAlreadyExists(String),
    #[error("{0}")]
    Evaluation(String),
}

/// Row violates the schema of its table on insert or update
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("Column '{0}' cannot be NULL")]
    NotNull(String),
    #[error("Duplicate value {value} for unique column '{column}'")]
    Unique { column: String, value: String },
    #[error("Column count mismatch: table '{table}' has {expected} columns, row has {found}")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        found: usize,
    },
    #[error("Value {value} does not fit column '{column}' of type {data_type}")]
    IncompatibleValue {
        column: String,
        data_type: String,
        value: String,
    },
}

/// Backend failures: IO, encoding, lock contention, transaction conflicts
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("Row shape does not match table '{table}': expected {expected} columns, got {found}")]
    SchemaMismatch {
        table: String,
        expected: usize,
        found: usize,
    },
    #[error("Index '{index}' not found on table '{table}'")]
    IndexNotFound { table: String, index: String },
    #[error("Index '{index}' already exists on table '{table}'")]
    IndexAlreadyExists { table: String, index: String },
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },
    #[error("Duplicate row key in table '{0}'")]
    DuplicateKey(String),
    #[error("Nested transactions are not supported")]
    NestedTransaction,
    #[error("No transaction is active")]
    NoTransaction,
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Binary Serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),
    #[error("Key-value store error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Corrupted storage: {0}")]
    Corrupted(String),
}
