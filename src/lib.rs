//! GeeqoDB storage core
//!
//! An embedded OLAP database core: WAL-backed durable storage, a
//! catalog/row store that replays the log on open, two secondary-index
//! shapes (B-tree, skip-list) behind one contract, a cost-based query
//! planner and executor, a transaction manager, full/incremental backup
//! with point-in-time recovery, and a Viewstamped-Replication-style
//! replicated log with a deterministic simulation fabric for testing.
//!
//! The SQL text parser, the TCP line server, CLI tooling and the
//! RocksDB/GPU backends this crate's production sibling also ships are
//! external collaborators; this crate only assumes their key/value,
//! iterator, batch and typed-accelerator surfaces.

pub mod backup;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod index;
pub mod planner;
pub mod replication;
pub mod stats;
pub mod storage;
pub mod txn;
pub mod types;

pub mod database;

pub use config::{DBConfig, DurabilityLevel, ExecutionConfig, ReplicationConfig, WALConfig};
pub use database::Database;
pub use error::{DbError, Result};
pub use executor::ResultSet;
pub use planner::{LogicalPlan, PhysicalPlan, Predicate};
pub use txn::{IsolationLevel, TransactionContext};
pub use types::{ColumnDef, ColumnType, IndexShape, Row, RowId, TableSchema, TxnId, Value};
