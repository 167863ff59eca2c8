//! Error taxonomy for the GeeqoDB core.
//!
//! One stable kind per failure mode described by the component design; every
//! fallible operation in this crate returns `Result<T>` built on this enum
//! rather than panicking or swallowing the condition.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database is closed")]
    DatabaseClosed,

    #[error("write-ahead log is closed")]
    WALClosed,

    #[error("write-ahead log is corrupt: {0}")]
    WALCorrupt(String),

    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column count mismatch: expected {expected}, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("type mismatch for column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("transaction not active: {0}")]
    TransactionNotActive(u64),

    #[error("serialization conflict in transaction {0}")]
    SerializationConflict(u64),

    #[error("backup corrupted: {0}")]
    BackupCorrupted(String),

    #[error("backup not found: {0}")]
    BackupNotFound(String),

    #[error("not primary (current primary: {0:?})")]
    NotPrimary(Option<u64>),

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: String, to: String },

    #[error("primary already exists for view {0}")]
    PrimaryAlreadyExists(u64),

    #[error("replica not found: {0}")]
    ReplicaNotFound(u64),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("operation timed out")]
    OperationTimedOut,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for DbError {
    fn from(err: bincode::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}
