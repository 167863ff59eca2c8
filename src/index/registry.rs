//! Index registry (spec.md §4.4): name -> descriptor + live handle.

use crate::error::{DbError, Result};
use crate::index::{BTreeIndex, OrderedIndex, SkipListIndex};
use crate::types::IndexShape;
use dashmap::DashMap;
use std::sync::Arc;

/// Static metadata about a registered index, independent of its runtime
/// contents.
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub shape: IndexShape,
}

struct Entry {
    descriptor: IndexDescriptor,
    handle: Arc<dyn OrderedIndex>,
}

/// Registry of live secondary indexes, keyed by index name (unique across
/// the whole database, mirroring the teacher's `index::registry` pattern
/// of one flat namespace rather than per-table namespacing).
pub struct IndexRegistry {
    indexes: DashMap<String, Entry>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self {
            indexes: DashMap::new(),
        }
    }

    pub fn create(
        &self,
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
        shape: IndexShape,
    ) -> Result<Arc<dyn OrderedIndex>> {
        let name = name.into();
        if self.indexes.contains_key(&name) {
            return Err(DbError::IndexAlreadyExists(name));
        }
        let handle: Arc<dyn OrderedIndex> = match shape {
            IndexShape::BTree => Arc::new(BTreeIndex::new()),
            IndexShape::SkipList => Arc::new(SkipListIndex::new()),
        };
        let descriptor = IndexDescriptor {
            name: name.clone(),
            table: table.into(),
            columns,
            shape,
        };
        self.indexes.insert(
            name,
            Entry {
                descriptor,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    pub fn drop(&self, name: &str) -> Result<()> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::IndexNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn OrderedIndex>> {
        self.indexes
            .get(name)
            .map(|e| e.handle.clone())
            .ok_or_else(|| DbError::IndexNotFound(name.to_string()))
    }

    pub fn descriptor(&self, name: &str) -> Result<IndexDescriptor> {
        self.indexes
            .get(name)
            .map(|e| e.descriptor.clone())
            .ok_or_else(|| DbError::IndexNotFound(name.to_string()))
    }

    /// All indexes registered against `table`, used by the planner to
    /// decide whether an index-backed access method is available.
    pub fn indexes_for_table(&self, table: &str) -> Vec<IndexDescriptor> {
        self.indexes
            .iter()
            .filter(|e| e.descriptor.table == table)
            .map(|e| e.descriptor.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.indexes.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn create_duplicate_fails() {
        let reg = IndexRegistry::new();
        reg.create("idx_id", "users", vec!["id".into()], IndexShape::BTree)
            .unwrap();
        assert!(matches!(
            reg.create("idx_id", "users", vec!["id".into()], IndexShape::BTree),
            Err(DbError::IndexAlreadyExists(_))
        ));
    }

    #[test]
    fn drop_missing_fails() {
        let reg = IndexRegistry::new();
        assert!(matches!(reg.drop("ghost"), Err(DbError::IndexNotFound(_))));
    }

    #[test]
    fn handle_is_live_and_shared() {
        let reg = IndexRegistry::new();
        let handle = reg
            .create("idx_id", "users", vec!["id".into()], IndexShape::SkipList)
            .unwrap();
        handle.insert(vec![Value::Integer(1)], 7).unwrap();

        let again = reg.get("idx_id").unwrap();
        assert_eq!(again.get(&[Value::Integer(1)]).unwrap(), vec![7]);
    }

    #[test]
    fn indexes_for_table_filters_correctly() {
        let reg = IndexRegistry::new();
        reg.create("idx_a", "users", vec!["id".into()], IndexShape::BTree)
            .unwrap();
        reg.create("idx_b", "orders", vec!["id".into()], IndexShape::BTree)
            .unwrap();
        let users_idx = reg.indexes_for_table("users");
        assert_eq!(users_idx.len(), 1);
        assert_eq!(users_idx[0].name, "idx_a");
    }
}
