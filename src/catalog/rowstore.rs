//! Typed row storage (spec.md §4.3's data half), backed by
//! [`crate::storage::kv::FileKvStore`].
//!
//! Rows are stored under a key of `table_name ++ 0x00 ++ row_id.to_be_bytes()`
//! so that a prefix scan of `table_name ++ 0x00` yields rows in `RowId`
//! order — the same "namespaced key" trick the teacher's `storage::lsm`
//! layer uses to multiplex several logical column families over one flat
//! keyspace.

use crate::error::{DbError, Result};
use crate::storage::kv::FileKvStore;
use crate::types::{ColumnType, Row, RowId, TableSchema, Value};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

const SEPARATOR: u8 = 0x00;

fn row_key(table: &str, row_id: RowId) -> Vec<u8> {
    let mut key = Vec::with_capacity(table.len() + 1 + 8);
    key.extend_from_slice(table.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(&row_id.to_be_bytes());
    key
}

fn table_prefix(table: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(table.len() + 1);
    prefix.extend_from_slice(table.as_bytes());
    prefix.push(SEPARATOR);
    prefix
}

fn decode_row(bytes: &[u8]) -> Result<Row> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn encode_row(row: &Row) -> Result<Vec<u8>> {
    bincode::serialize(row).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Validate a candidate tuple against its table's schema: column count and
/// per-column type (allowing `Value::Null` anywhere, since the column
/// definitions here carry no nullability constraint beyond `spec.md`'s
/// baseline model).
pub fn validate_tuple(schema: &TableSchema, tuple: &Row) -> Result<()> {
    if tuple.len() != schema.column_count() {
        return Err(DbError::ColumnCountMismatch {
            expected: schema.column_count(),
            actual: tuple.len(),
        });
    }
    for (value, column) in tuple.iter().zip(schema.columns.iter()) {
        if matches!(value, Value::Null) {
            continue;
        }
        let actual = value.type_name();
        let expected = column_type_name(column.col_type);
        if actual != expected {
            return Err(DbError::TypeMismatch {
                column: column.name.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }
    Ok(())
}

fn column_type_name(col_type: ColumnType) -> &'static str {
    match col_type {
        ColumnType::Integer => "Integer",
        ColumnType::Real => "Real",
        ColumnType::Text => "Text",
        ColumnType::Boolean => "Boolean",
        ColumnType::Null => "Null",
    }
}

/// Row storage and row-id allocation, one logical partition per table
/// sharing a single [`FileKvStore`] keyspace.
pub struct RowStore {
    kv: FileKvStore,
    next_row_id: DashMap<String, AtomicU64>,
}

impl RowStore {
    pub fn new() -> Self {
        Self {
            kv: FileKvStore::new(),
            next_row_id: DashMap::new(),
        }
    }

    /// Register a table's row-id counter. Called on `CREATE TABLE` and
    /// during WAL/catalog recovery, where `start` is the highest row id
    /// already observed plus one.
    pub fn register_table(&self, table: &str, start: RowId) {
        self.next_row_id
            .insert(table.to_string(), AtomicU64::new(start.0));
    }

    pub fn drop_table(&self, table: &str) -> Result<()> {
        self.next_row_id.remove(table);
        let prefix = table_prefix(table);
        let mut it = self.kv.iterate()?;
        it.seek(&prefix);
        let mut keys = Vec::new();
        while it.is_valid() {
            let key = it.key().unwrap();
            if !key.starts_with(&prefix) {
                break;
            }
            keys.push(key.to_vec());
            it.next();
        }
        let mut batch = self.kv.batch();
        for key in &keys {
            batch.delete(key);
        }
        batch.commit()
    }

    pub fn next_row_id(&self, table: &str) -> RowId {
        let counter = self
            .next_row_id
            .entry(table.to_string())
            .or_insert_with(|| AtomicU64::new(1));
        RowId(counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Raise `table`'s row-id counter to at least `at_least`, never
    /// lowering it. Used after WAL replay so ids assigned before a crash
    /// are never reassigned to a later insert (spec.md §3: row ids are
    /// "never reused within a table's lifetime").
    pub fn bump_counter(&self, table: &str, at_least: RowId) {
        let counter = self
            .next_row_id
            .entry(table.to_string())
            .or_insert_with(|| AtomicU64::new(1));
        counter.fetch_max(at_least.0, Ordering::SeqCst);
    }

    /// Insert at a caller-chosen row id, used both for normal inserts
    /// (caller took the id from [`next_row_id`](Self::next_row_id)) and for
    /// WAL replay, where the id must match exactly what was logged.
    pub fn insert_with_id(&self, table: &str, row_id: RowId, row: &Row) -> Result<()> {
        let encoded = encode_row(row)?;
        self.kv.put(&row_key(table, row_id), &encoded)
    }

    pub fn lookup(&self, table: &str, row_id: RowId) -> Result<Option<Row>> {
        match self.kv.get(&row_key(table, row_id))? {
            Some(bytes) => Ok(Some(decode_row(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn update(&self, table: &str, row_id: RowId, row: &Row) -> Result<()> {
        self.insert_with_id(table, row_id, row)
    }

    pub fn delete(&self, table: &str, row_id: RowId) -> Result<()> {
        self.kv.delete(&row_key(table, row_id))
    }

    /// Full table scan in `RowId` order.
    pub fn scan(&self, table: &str) -> Result<Vec<(RowId, Row)>> {
        let prefix = table_prefix(table);
        let mut it = self.kv.iterate()?;
        it.seek(&prefix);
        let mut rows = Vec::new();
        while it.is_valid() {
            let key = it.key().unwrap();
            if !key.starts_with(&prefix) {
                break;
            }
            let row_id = RowId::from_be_bytes(key[prefix.len()..].try_into().unwrap());
            let row = decode_row(it.value().unwrap())?;
            rows.push((row_id, row));
            it.next();
        }
        Ok(rows)
    }

    pub fn create_backup(&self, dir: &std::path::Path) -> Result<()> {
        self.kv.create_backup(dir)
    }

    pub fn restore_from_backup(&self, dir: &std::path::Path) -> Result<()> {
        self.kv.restore_from_backup(dir)
    }

    pub fn close(&self) -> Result<()> {
        self.kv.close()
    }
}

impl Default for RowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnDef, Value};

    fn schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer, 0),
                ColumnDef::new("name", ColumnType::Text, 1),
            ],
        )
    }

    #[test]
    fn insert_lookup_scan_in_row_id_order() {
        let store = RowStore::new();
        store.register_table("users", RowId(1));
        let r1 = store.next_row_id("users");
        let r2 = store.next_row_id("users");
        store
            .insert_with_id("users", r1, &vec![Value::Integer(1), Value::Text("a".into())])
            .unwrap();
        store
            .insert_with_id("users", r2, &vec![Value::Integer(2), Value::Text("b".into())])
            .unwrap();

        let rows = store.scan("users").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, r1);
        assert_eq!(rows[1].0, r2);
    }

    #[test]
    fn two_tables_do_not_collide() {
        let store = RowStore::new();
        store.register_table("a", RowId(1));
        store.register_table("b", RowId(1));
        let id_a = store.next_row_id("a");
        let id_b = store.next_row_id("b");
        store.insert_with_id("a", id_a, &vec![Value::Integer(1)]).unwrap();
        store.insert_with_id("b", id_b, &vec![Value::Integer(2)]).unwrap();

        assert_eq!(store.scan("a").unwrap().len(), 1);
        assert_eq!(store.scan("b").unwrap().len(), 1);
    }

    #[test]
    fn drop_table_clears_rows() {
        let store = RowStore::new();
        store.register_table("users", RowId(1));
        let id = store.next_row_id("users");
        store
            .insert_with_id("users", id, &vec![Value::Integer(1), Value::Text("a".into())])
            .unwrap();
        store.drop_table("users").unwrap();
        assert!(store.scan("users").unwrap().is_empty());
    }

    #[test]
    fn validate_tuple_catches_count_and_type_mismatch() {
        let schema = schema();
        assert!(matches!(
            validate_tuple(&schema, &vec![Value::Integer(1)]),
            Err(DbError::ColumnCountMismatch { .. })
        ));
        assert!(matches!(
            validate_tuple(&schema, &vec![Value::Text("x".into()), Value::Text("y".into())]),
            Err(DbError::TypeMismatch { .. })
        ));
        assert!(validate_tuple(
            &schema,
            &vec![Value::Integer(1), Value::Null]
        )
        .is_ok());
    }
}
