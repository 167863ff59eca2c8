//! Transaction manager (spec.md §4.8).
//!
//! Adapted from the teacher's `txn::coordinator::{TransactionContext,
//! IsolationLevel, TransactionState}`: monotonic id allocation, an
//! active-set map, and the same four isolation levels. Unlike the
//! teacher's full MVCC `VersionChain` (which keeps every historical row
//! version so a snapshot read can see rows as of any past commit point),
//! this spec only needs a row's state as of one commit point per
//! transaction, so the manager tracks read/write sets for conflict
//! detection rather than row version chains.

use crate::error::{DbError, Result};
use crate::types::{Lsn, Row, RowId, TxnId};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_byte(self) -> u8 {
        match self {
            IsolationLevel::ReadUncommitted => 0,
            IsolationLevel::ReadCommitted => 1,
            IsolationLevel::RepeatableRead => 2,
            IsolationLevel::Serializable => 3,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(IsolationLevel::ReadUncommitted),
            1 => Ok(IsolationLevel::ReadCommitted),
            2 => Ok(IsolationLevel::RepeatableRead),
            3 => Ok(IsolationLevel::Serializable),
            _ => Err(DbError::InvalidArguments(format!("unknown isolation level byte {b}"))),
        }
    }

    /// Whether this level needs a snapshot fixed at `BEGIN` rather than
    /// seeing each statement's latest commit point.
    pub fn snapshot_at_begin(self) -> bool {
        matches!(self, IsolationLevel::RepeatableRead | IsolationLevel::Serializable)
    }

    pub fn tracks_read_write_sets(self) -> bool {
        matches!(self, IsolationLevel::Serializable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

type RowKey = (String, RowId);

/// A buffered row mutation not yet visible outside its owning transaction.
///
/// Writes are staged here rather than applied straight to the catalog so
/// that other transactions' reads never observe them before `COMMIT`
/// (spec.md §8 I1, S6): the catalog only ever holds committed rows, and
/// [`Database::commit`](crate::database::Database::commit) drains this
/// buffer into the catalog/indexes as its last step.
#[derive(Debug, Clone)]
pub enum PendingOp {
    Insert { table: String, row_id: RowId, tuple: Row },
    Update { table: String, row_id: RowId, tuple: Row },
    Delete { table: String, row_id: RowId },
}

impl PendingOp {
    fn matches(&self, table: &str, row_id: RowId) -> bool {
        match self {
            PendingOp::Insert { table: t, row_id: r, .. }
            | PendingOp::Update { table: t, row_id: r, .. }
            | PendingOp::Delete { table: t, row_id: r } => t == table && *r == row_id,
        }
    }
}

pub struct TransactionContext {
    pub id: TxnId,
    pub isolation: IsolationLevel,
    /// WAL position visible to this transaction's reads; fixed at begin
    /// for `RepeatableRead`/`Serializable`, advisory only otherwise.
    pub snapshot_lsn: Lsn,
    state: Mutex<TransactionState>,
    read_set: Mutex<HashSet<RowKey>>,
    write_set: Mutex<HashSet<RowKey>>,
    pending: Mutex<Vec<PendingOp>>,
}

impl TransactionContext {
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Buffer a row mutation made under this (still-active) transaction.
    pub fn stage(&self, op: PendingOp) {
        self.pending.lock().push(op);
    }

    /// The most recent buffered state of `(table, row_id)` under this
    /// transaction: `Some(Some(row))` for a staged insert/update,
    /// `Some(None)` for a staged delete, `None` if this transaction has
    /// not touched the row (caller should fall back to the catalog).
    pub fn staged_value(&self, table: &str, row_id: RowId) -> Option<Option<Row>> {
        let pending = self.pending.lock();
        for op in pending.iter().rev() {
            if !op.matches(table, row_id) {
                continue;
            }
            return Some(match op {
                PendingOp::Insert { tuple, .. } | PendingOp::Update { tuple, .. } => Some(tuple.clone()),
                PendingOp::Delete { .. } => None,
            });
        }
        None
    }

    /// Drain every buffered mutation, in the order it was staged, for the
    /// caller to apply to the catalog at commit time.
    pub fn take_pending(&self) -> Vec<PendingOp> {
        std::mem::take(&mut *self.pending.lock())
    }
}

struct CommittedRecord {
    commit_lsn: Lsn,
    write_set: HashSet<RowKey>,
}

/// Tracks every active transaction plus enough history of committed
/// write sets to validate `Serializable` transactions at commit time.
pub struct TransactionManager {
    next_id: AtomicU64,
    active: DashMap<TxnId, Arc<TransactionContext>>,
    history: Mutex<Vec<CommittedRecord>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: DashMap::new(),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn begin(&self, isolation: IsolationLevel, current_lsn: Lsn) -> Arc<TransactionContext> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let ctx = Arc::new(TransactionContext {
            id,
            isolation,
            snapshot_lsn: current_lsn,
            state: Mutex::new(TransactionState::Active),
            read_set: Mutex::new(HashSet::new()),
            write_set: Mutex::new(HashSet::new()),
            pending: Mutex::new(Vec::new()),
        });
        self.active.insert(id, ctx.clone());
        debug!(txn_id = id, ?isolation, current_lsn, "txn begin");
        ctx
    }

    fn require_active(&self, txn_id: TxnId) -> Result<Arc<TransactionContext>> {
        self.active
            .get(&txn_id)
            .map(|e| e.clone())
            .filter(|ctx| ctx.state() == TransactionState::Active)
            .ok_or(DbError::TransactionNotActive(txn_id))
    }

    pub fn record_read(&self, txn_id: TxnId, table: &str, row_id: RowId) -> Result<()> {
        let ctx = self.require_active(txn_id)?;
        if ctx.isolation.tracks_read_write_sets() {
            ctx.read_set.lock().insert((table.to_string(), row_id));
        }
        Ok(())
    }

    pub fn record_write(&self, txn_id: TxnId, table: &str, row_id: RowId) -> Result<()> {
        let ctx = self.require_active(txn_id)?;
        if ctx.isolation.tracks_read_write_sets() {
            ctx.write_set.lock().insert((table.to_string(), row_id));
        }
        Ok(())
    }

    /// Validate and commit `txn_id` at `commit_lsn` (the WAL position of
    /// its `Commit` record). `Serializable` transactions are checked
    /// against every transaction that committed after this one began; an
    /// overlap with either set is a write-write or read-write conflict.
    pub fn commit(&self, txn_id: TxnId, commit_lsn: Lsn) -> Result<()> {
        let ctx = self.require_active(txn_id)?;

        if ctx.isolation.tracks_read_write_sets() {
            let read_set = ctx.read_set.lock();
            let write_set = ctx.write_set.lock();
            let history = self.history.lock();
            for record in history.iter() {
                if record.commit_lsn <= ctx.snapshot_lsn {
                    continue;
                }
                let conflicts = record.write_set.iter().any(|k| read_set.contains(k) || write_set.contains(k));
                if conflicts {
                    *ctx.state.lock() = TransactionState::Aborted;
                    self.active.remove(&txn_id);
                    return Err(DbError::SerializationConflict(txn_id));
                }
            }
        }

        *ctx.state.lock() = TransactionState::Committed;
        if ctx.isolation.tracks_read_write_sets() {
            let write_set = ctx.write_set.lock().clone();
            self.history.lock().push(CommittedRecord {
                commit_lsn,
                write_set,
            });
        }
        self.active.remove(&txn_id);
        debug!(txn_id, commit_lsn, "txn commit");
        Ok(())
    }

    pub fn abort(&self, txn_id: TxnId) -> Result<()> {
        let ctx = self.require_active(txn_id)?;
        *ctx.state.lock() = TransactionState::Aborted;
        self.active.remove(&txn_id);
        debug!(txn_id, "txn abort");
        Ok(())
    }

    pub fn is_active(&self, txn_id: TxnId) -> bool {
        self.active
            .get(&txn_id)
            .map(|ctx| ctx.state() == TransactionState::Active)
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
