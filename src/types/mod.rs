//! Core data model shared by storage, indexes, planner and executor.

mod schema;
mod value;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use schema::{ColumnDef, ColumnType, IndexShape, TableSchema};
pub use value::Value;

/// A row is an ordered tuple of typed values matching its table's columns.
pub type Row = Vec<Value>;

/// Row identifier, stable and monotonically assigned at insert. A distinct
/// newtype rather than a bare `u64` so a row id can't be silently mixed up
/// with a transaction id, LSN, or other unrelated counter at a call site.
/// `RowId(0)` (`INVALID_ROW_ID`) is never assigned to a live row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

pub const INVALID_ROW_ID: RowId = RowId(0);

impl RowId {
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        RowId(u64::from_be_bytes(bytes))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RowId {
    fn from(v: u64) -> Self {
        RowId(v)
    }
}

impl std::ops::Add<u64> for RowId {
    type Output = RowId;
    fn add(self, rhs: u64) -> RowId {
        RowId(self.0 + rhs)
    }
}

/// WAL sequence number / durable position. Strictly increasing, gap-free
/// within one process lifetime.
pub type Lsn = u64;

/// Transaction identifier. Strictly increasing, never reused (`>= 1`).
pub type TxnId = u64;
