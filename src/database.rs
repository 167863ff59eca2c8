//! Database facade (spec.md §6): glues the WAL, catalog, index registry,
//! transaction manager, planner, executor and backup manager into the
//! single entry point an embedding server would call
//! (`Database::open`/`execute`/`begin`/`commit`). A `parking_lot::Mutex`
//! serializes catalog+WAL mutation exactly as `spec.md` §5's single
//! writer lock describes; reads take a point-in-time snapshot of the
//! catalog without blocking on it.

use crate::backup::BackupManager;
use crate::catalog::Catalog;
use crate::config::DBConfig;
use crate::error::{DbError, Result};
use crate::executor::{Executor, ResultSet};
use crate::index::{IndexDescriptor, IndexRegistry, OrderedIndex};
use crate::planner::accelerator::CpuAccelerator;
use crate::planner::{LogicalPlan, Planner};
use crate::stats::StatsCatalog;
use crate::storage::wal::{SchemaChangeKind, WalRecord, WriteAheadLog};
use crate::txn::{IsolationLevel, TransactionContext, TransactionManager};
use crate::types::{IndexShape, Row, RowId, TableSchema, Value};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct Database {
    data_dir: PathBuf,
    config: DBConfig,
    wal: Arc<WriteAheadLog>,
    catalog: Arc<Catalog>,
    index_registry: Arc<IndexRegistry>,
    stats: Arc<StatsCatalog>,
    txn_manager: Arc<TransactionManager>,
    planner: Planner,
    executor: Executor,
    backup_manager: BackupManager,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Database {
    pub fn open(data_dir: impl AsRef<Path>, config: DBConfig) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let wal_path = data_dir.join(&config.wal_config.wal_file_name);
        let wal = Arc::new(WriteAheadLog::open(&wal_path, config.wal_config.clone())?);
        let catalog = Arc::new(Catalog::open(&data_dir)?);

        // Two-pass replay: a transaction's Insert/Update/Delete records are
        // only durable *intent* until its Commit record is seen, so the
        // first pass just collects which txn-ids actually committed
        // (spec.md §8 I1 — a row is live only behind a committed Insert).
        // Records from a transaction with no Commit record in the log
        // (aborted, or never closed before crash) are skipped entirely.
        let mut committed = std::collections::HashSet::new();
        wal.recover(|_lsn, record| {
            if let WalRecord::Commit { txn_id } = record {
                committed.insert(*txn_id);
            }
            Ok(())
        })?;
        let replayed = wal.recover(|_lsn, record| apply_record(&catalog, record, &committed))?;
        info!(replayed, path = %wal_path.display(), "database recovered from wal");

        let index_registry = Arc::new(IndexRegistry::new());
        let stats = Arc::new(StatsCatalog::new());
        for table in catalog.table_names() {
            let rows = catalog.scan(&table)?;
            if let Some(max_id) = rows.iter().map(|(id, _)| *id).max() {
                catalog.bump_row_id_counter(&table, max_id + 1);
            }
            if config.enable_stats {
                stats.set_row_count(&table, rows.len() as u64);
            }
        }

        let accelerator = Some(CpuAccelerator::new());
        let planner = Planner::new(
            index_registry.clone(),
            stats.clone(),
            config.execution_config.clone(),
            accelerator.clone(),
        );
        let executor = Executor::new(catalog.clone(), index_registry.clone(), accelerator);
        let backup_manager = BackupManager::new(catalog.clone(), data_dir.join("backups"));

        Ok(Self {
            data_dir,
            config,
            wal,
            catalog,
            index_registry,
            stats,
            txn_manager: Arc::new(TransactionManager::new()),
            planner,
            executor,
            backup_manager,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::DatabaseClosed);
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // -- transactions --------------------------------------------------

    pub fn begin(&self, isolation: IsolationLevel) -> Result<Arc<TransactionContext>> {
        self.ensure_open()?;
        let ctx = self.txn_manager.begin(isolation, self.wal.get_position());
        self.wal.append(WalRecord::BeginTxn {
            txn_id: ctx.id,
            isolation: isolation.as_byte(),
        })?;
        Ok(ctx)
    }

    /// Commit `ctx`: validate (for `Serializable`), make the transaction's
    /// buffered writes durable, then apply them to the catalog and indexes
    /// so they finally become visible to other transactions (spec.md §8
    /// I1, S6 — nothing staged in [`TransactionContext::stage`] is
    /// observable outside this transaction before this point).
    pub fn commit(&self, ctx: &TransactionContext) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        let lsn = self.wal.append(WalRecord::Commit { txn_id: ctx.id })?;
        self.txn_manager.commit(ctx.id, lsn)?;
        self.apply_pending(ctx.take_pending())
    }

    pub fn abort(&self, ctx: &TransactionContext) -> Result<()> {
        self.ensure_open()?;
        self.wal.append(WalRecord::Abort { txn_id: ctx.id })?;
        self.txn_manager.abort(ctx.id)?;
        // Buffered writes were never applied to the catalog, so aborting
        // just discards them; the row ids they reserved are burned, never
        // reused, per spec.md §3.
        ctx.take_pending();
        Ok(())
    }

    /// Apply a transaction's buffered mutations to the catalog, indexes and
    /// stats, in the order they were staged. Called only from `commit`,
    /// already holding `write_lock`.
    fn apply_pending(&self, ops: Vec<crate::txn::PendingOp>) -> Result<()> {
        use crate::txn::PendingOp;
        for op in ops {
            match op {
                PendingOp::Insert { table, row_id, tuple } => {
                    self.catalog.insert_with_id(&table, row_id, tuple.clone())?;
                    self.stats.record_insert(&table);
                    let schema = self.catalog.table_schema(&table)?;
                    self.update_indexes_on_insert(&table, &schema, row_id, &tuple)?;
                }
                PendingOp::Update { table, row_id, tuple } => {
                    let old = self.catalog.lookup(&table, row_id)?;
                    self.catalog.update(&table, row_id, tuple.clone())?;
                    let schema = self.catalog.table_schema(&table)?;
                    if let Some(old) = old {
                        self.update_indexes_on_delete(&table, &schema, row_id, &old)?;
                    }
                    self.update_indexes_on_insert(&table, &schema, row_id, &tuple)?;
                }
                PendingOp::Delete { table, row_id } => {
                    if let Some(old) = self.catalog.delete(&table, row_id)? {
                        self.stats.record_delete(&table);
                        let schema = self.catalog.table_schema(&table)?;
                        self.update_indexes_on_delete(&table, &schema, row_id, &old)?;
                    }
                }
            }
        }
        Ok(())
    }

    // -- schema ----------------------------------------------------------

    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        let blob = bincode::serialize(&schema)?;
        self.wal.append(WalRecord::SchemaChange {
            kind: SchemaChangeKind::Create,
            schema_blob: blob,
        })?;
        self.catalog.create_table(schema.clone())?;
        self.stats.ensure_table(&schema.name);
        Ok(())
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        let schema = self.catalog.table_schema(name)?;
        let blob = bincode::serialize(&schema)?;
        self.wal.append(WalRecord::SchemaChange {
            kind: SchemaChangeKind::Drop,
            schema_blob: blob,
        })?;
        self.catalog.drop_table(name)?;
        self.stats.drop_table(name);
        for descriptor in self.index_registry.indexes_for_table(name) {
            let _ = self.index_registry.drop(&descriptor.name);
        }
        Ok(())
    }

    // -- indexes ----------------------------------------------------------

    /// Create a secondary index on `table.column` and backfill it from
    /// every row currently in the table.
    pub fn create_index(
        &self,
        name: &str,
        table: &str,
        column: &str,
        shape: IndexShape,
    ) -> Result<()> {
        self.ensure_open()?;
        let schema = self.catalog.table_schema(table)?;
        let handle = self
            .index_registry
            .create(name, table, vec![column.to_string()], shape)?;
        let pos = schema
            .column_position(column)
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string()))?;
        for (row_id, row) in self.catalog.scan(table)? {
            handle.insert(vec![row[pos].clone()], row_id)?;
        }
        Ok(())
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.index_registry.drop(name)
    }

    pub fn index_descriptor(&self, name: &str) -> Result<IndexDescriptor> {
        self.index_registry.descriptor(name)
    }

    fn index_key(schema: &TableSchema, row: &Row, columns: &[String]) -> Option<Vec<Value>> {
        columns
            .iter()
            .map(|c| schema.column_position(c).map(|p| row[p].clone()))
            .collect()
    }

    fn update_indexes_on_insert(&self, table: &str, schema: &TableSchema, row_id: RowId, row: &Row) -> Result<()> {
        for descriptor in self.index_registry.indexes_for_table(table) {
            if let Some(key) = Self::index_key(schema, row, &descriptor.columns) {
                self.index_registry.get(&descriptor.name)?.insert(key, row_id)?;
            }
        }
        Ok(())
    }

    fn update_indexes_on_delete(&self, table: &str, schema: &TableSchema, row_id: RowId, row: &Row) -> Result<()> {
        for descriptor in self.index_registry.indexes_for_table(table) {
            if let Some(key) = Self::index_key(schema, row, &descriptor.columns) {
                self.index_registry.get(&descriptor.name)?.remove(&key, row_id)?;
            }
        }
        Ok(())
    }

    // -- row mutation -----------------------------------------------------

    /// Insert `tuple` under `txn`. The row is durable as soon as this
    /// returns (its WAL record is appended before the call returns) but
    /// stays invisible to every other transaction's reads until `txn`
    /// commits — it is only staged on `txn` here, per spec.md §8 S6.
    pub fn insert(&self, txn: &TransactionContext, table: &str, tuple: Row) -> Result<RowId> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        let row_id = self.catalog.prepare_insert(table, &tuple)?;
        self.wal.append(WalRecord::Insert {
            txn_id: txn.id,
            table: table.to_string(),
            row_id,
            tuple: tuple.clone(),
        })?;
        txn.stage(crate::txn::PendingOp::Insert {
            table: table.to_string(),
            row_id,
            tuple,
        });
        self.txn_manager.record_write(txn.id, table, row_id)?;
        Ok(row_id)
    }

    pub fn update(&self, txn: &TransactionContext, table: &str, row_id: RowId, new: Row) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        let schema = self.catalog.table_schema(table)?;
        crate::catalog::rowstore::validate_tuple(&schema, &new)?;
        let old = match txn.staged_value(table, row_id) {
            Some(Some(row)) => row,
            Some(None) => {
                return Err(DbError::InvalidArguments(format!(
                    "row {row_id} not found in {table}"
                )))
            }
            None => self
                .catalog
                .lookup(table, row_id)?
                .ok_or_else(|| DbError::InvalidArguments(format!("row {row_id} not found in {table}")))?,
        };
        self.wal.append(WalRecord::Update {
            txn_id: txn.id,
            table: table.to_string(),
            row_id,
            old,
            new: new.clone(),
        })?;
        txn.stage(crate::txn::PendingOp::Update {
            table: table.to_string(),
            row_id,
            tuple: new,
        });
        self.txn_manager.record_write(txn.id, table, row_id)?;
        Ok(())
    }

    pub fn delete(&self, txn: &TransactionContext, table: &str, row_id: RowId) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        let old = match txn.staged_value(table, row_id) {
            Some(Some(row)) => row,
            Some(None) => return Ok(()),
            None => match self.catalog.lookup(table, row_id)? {
                Some(row) => row,
                None => return Ok(()),
            },
        };
        self.wal.append(WalRecord::Delete {
            txn_id: txn.id,
            table: table.to_string(),
            row_id,
            old,
        })?;
        txn.stage(crate::txn::PendingOp::Delete {
            table: table.to_string(),
            row_id,
        });
        self.txn_manager.record_write(txn.id, table, row_id)?;
        Ok(())
    }

    /// Look up a row as `txn` would see it: this transaction's own
    /// uncommitted writes first (read-your-own-writes), falling back to
    /// the catalog's last committed state otherwise.
    pub fn lookup(&self, txn: &TransactionContext, table: &str, row_id: RowId) -> Result<Option<Row>> {
        self.ensure_open()?;
        let row = match txn.staged_value(table, row_id) {
            Some(staged) => staged,
            None => self.catalog.lookup(table, row_id)?,
        };
        if row.is_some() {
            self.txn_manager.record_read(txn.id, table, row_id)?;
        }
        Ok(row)
    }

    // -- query ------------------------------------------------------------

    pub fn execute(&self, plan: LogicalPlan) -> Result<ResultSet> {
        self.ensure_open()?;
        let physical = self.planner.plan(plan)?;
        self.executor.execute(&physical)
    }

    // -- durability / backup -----------------------------------------------

    pub fn checkpoint(&self) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.write_lock.lock();
        self.catalog.checkpoint()?;
        let lsn = self.wal.get_position();
        self.wal.checkpoint(lsn)?;
        Ok(())
    }

    pub fn backup_manager(&self) -> &BackupManager {
        &self.backup_manager
    }

    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.wal.close()?;
        self.catalog.close()?;
        Ok(())
    }
}

/// Apply one replayed WAL record to the catalog during recovery.
fn apply_record(
    catalog: &Catalog,
    record: &WalRecord,
    committed: &std::collections::HashSet<crate::types::TxnId>,
) -> Result<()> {
    match record {
        WalRecord::Insert { txn_id, table, row_id, tuple } => {
            if !committed.contains(txn_id) {
                return Ok(());
            }
            catalog.insert_with_id(table, *row_id, tuple.clone())
        }
        WalRecord::Update { txn_id, table, row_id, new, .. } => {
            if !committed.contains(txn_id) {
                return Ok(());
            }
            catalog.update(table, *row_id, new.clone())
        }
        WalRecord::Delete { txn_id, table, row_id, .. } => {
            if !committed.contains(txn_id) {
                return Ok(());
            }
            catalog.delete(table, *row_id).map(|_| ())
        }
        WalRecord::SchemaChange { kind, schema_blob } => {
            let schema: TableSchema =
                bincode::deserialize(schema_blob).map_err(|e| DbError::Serialization(e.to_string()))?;
            match kind {
                SchemaChangeKind::Create => catalog.create_table_from_schema(schema),
                SchemaChangeKind::Drop => catalog.drop_table(&schema.name),
            }
        }
        WalRecord::BeginTxn { .. } | WalRecord::Commit { .. } | WalRecord::Abort { .. } | WalRecord::Checkpoint { .. } => {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::predicate::Predicate;
    use crate::types::{ColumnDef, ColumnType};
    use tempfile::tempdir;

    fn users_schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer, 0),
                ColumnDef::new("name", ColumnType::Text, 1),
            ],
        )
    }

    #[test]
    fn create_insert_query_round_trip() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        db.create_table(users_schema()).unwrap();

        let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
        db.insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
            .unwrap();
        db.insert(&txn, "users", vec![Value::Integer(2), Value::Text("bob".into())])
            .unwrap();
        db.commit(&txn).unwrap();

        let result = db
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: Some(Predicate::Eq("name".into(), Value::Text("bob".into()))),
            })
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    /// spec.md §8 R2: `recover(open(close(D)))` is identical to `D`, even
    /// when a checkpoint happened before the close (so the WAL's own
    /// replay floor has advanced past the committed rows and the row-store
    /// snapshot, not WAL replay, is what must carry them across reopen).
    #[test]
    fn checkpoint_then_reopen_preserves_committed_rows() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
            db.create_table(users_schema()).unwrap();
            let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
            db.insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
                .unwrap();
            db.insert(&txn, "users", vec![Value::Integer(2), Value::Text("bob".into())])
                .unwrap();
            db.commit(&txn).unwrap();
            db.checkpoint().unwrap();
            db.close().unwrap();
        }

        let reopened = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        let result = reopened
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert_eq!(result.len(), 2, "rows committed before checkpoint must survive reopen");
    }

    #[test]
    fn recovery_replays_committed_writes() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
            db.create_table(users_schema()).unwrap();
            let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
            db.insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
                .unwrap();
            db.commit(&txn).unwrap();
        }

        let reopened = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        let result = reopened
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn index_backfill_and_incremental_maintenance() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        db.create_table(users_schema()).unwrap();
        let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
        db.insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
            .unwrap();
        db.commit(&txn).unwrap();

        db.create_index("idx_id", "users", "id", IndexShape::BTree).unwrap();
        let txn2 = db.begin(IsolationLevel::ReadCommitted).unwrap();
        db.insert(&txn2, "users", vec![Value::Integer(2), Value::Text("bob".into())])
            .unwrap();
        db.commit(&txn2).unwrap();

        let handle = db.index_registry.get("idx_id").unwrap();
        assert_eq!(handle.count(), 2);
    }

    #[test]
    fn checkpoint_and_backup_restore() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        db.create_table(users_schema()).unwrap();
        let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
        db.insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
            .unwrap();
        db.commit(&txn).unwrap();
        db.checkpoint().unwrap();

        let manifest = db.backup_manager().create_full("snap1", db.wal.get_position()).unwrap();
        assert_eq!(manifest.name, "snap1");
        assert!(db.backup_manager().restore("snap1").is_ok());
    }

    /// spec.md §8 S6: an uncommitted insert is invisible to every other
    /// transaction's reads until the writer commits.
    #[test]
    fn uncommitted_insert_is_invisible_until_commit() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        db.create_table(users_schema()).unwrap();

        let t1 = db.begin(IsolationLevel::ReadCommitted).unwrap();
        let row_id = db
            .insert(&t1, "users", vec![Value::Integer(4), Value::Text("dave".into())])
            .unwrap();

        let before = db
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert_eq!(before.len(), 0, "row must stay invisible before commit");

        let t2 = db.begin(IsolationLevel::ReadCommitted).unwrap();
        assert_eq!(db.lookup(&t2, "users", row_id).unwrap(), None);

        db.commit(&t1).unwrap();

        let after = db
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert_eq!(after.len(), 1, "row must become visible once committed");
        assert!(db.lookup(&t2, "users", row_id).unwrap().is_some());
    }

    /// A transaction reads its own uncommitted writes (read-your-own-writes).
    #[test]
    fn transaction_sees_its_own_uncommitted_insert() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        db.create_table(users_schema()).unwrap();

        let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
        let row_id = db
            .insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
            .unwrap();
        assert!(db.lookup(&txn, "users", row_id).unwrap().is_some());
    }

    /// Aborting a transaction discards its staged writes entirely; they
    /// never become visible, even after a later unrelated commit.
    #[test]
    fn abort_discards_staged_writes() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        db.create_table(users_schema()).unwrap();

        let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
        db.insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
            .unwrap();
        db.abort(&txn).unwrap();

        let result = db
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert_eq!(result.len(), 0);
    }

    /// A crash between an uncommitted Insert record and its (never-written)
    /// Commit record must not resurrect the row on replay (spec.md §8 I1).
    #[test]
    fn recovery_does_not_replay_uncommitted_writes() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
            db.create_table(users_schema()).unwrap();
            let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
            db.insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
                .unwrap();
            // No commit: the process "crashes" here, with an Insert record
            // on disk but no matching Commit record.
        }

        let reopened = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        let result = reopened
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert_eq!(result.len(), 0);
    }

    /// spec.md §8 S4: a full backup B0 at P0, then an incremental B1 on top
    /// of it. Restoring B0∘B1 sees the post-B1 row count; restoring B0 alone
    /// with point-in-time P0 sees only the pre-B1 count.
    #[test]
    fn point_in_time_restore_returns_pre_incremental_count() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), DBConfig::for_testing()).unwrap();
        db.create_table(users_schema()).unwrap();

        let txn = db.begin(IsolationLevel::ReadCommitted).unwrap();
        db.insert(&txn, "users", vec![Value::Integer(1), Value::Text("alice".into())])
            .unwrap();
        db.insert(&txn, "users", vec![Value::Integer(2), Value::Text("bob".into())])
            .unwrap();
        db.commit(&txn).unwrap();
        db.checkpoint().unwrap();

        let p0 = db.wal.get_position();
        db.backup_manager().create_full("b0", p0).unwrap();

        let txn2 = db.begin(IsolationLevel::ReadCommitted).unwrap();
        db.insert(&txn2, "users", vec![Value::Integer(4), Value::Text("dave".into())])
            .unwrap();
        db.insert(&txn2, "users", vec![Value::Integer(5), Value::Text("eve".into())])
            .unwrap();
        db.commit(&txn2).unwrap();
        db.checkpoint().unwrap();

        let p1 = db.wal.get_position();
        db.backup_manager().create_incremental("b1", "b0", p1).unwrap();

        db.backup_manager().restore("b1").unwrap();
        let post = db
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert_eq!(post.len(), 4, "restoring b0-then-b1 must see the post-incremental count");

        db.backup_manager()
            .point_in_time_restore("b0", p0, &db.wal, |_lsn, _record| Ok(()))
            .unwrap();
        let pre = db
            .execute(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert_eq!(pre.len(), 2, "point-in-time restore to p0 must see only the pre-incremental count");
    }
}
