//! Table schema and column definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
    /// Position in the row tuple, 0-indexed.
    pub position: usize,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType, position: usize) -> Self {
        Self {
            name: name.into(),
            col_type,
            position,
        }
    }
}

/// Index shape, shared contract between B-tree and skip-list (spec.md
/// §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexShape {
    BTree,
    SkipList,
}

/// A table schema: name unique per database, ordered column list, fixed
/// at `CREATE TABLE` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Column name -> position, rebuilt after deserialization since a
    /// `HashMap` doesn't serialize deterministically and is cheap to
    /// recompute (mirrors the teacher's `rebuild_column_map` pattern).
    #[serde(skip)]
    column_map: HashMap<String, usize>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        let mut schema = Self {
            name: name.into(),
            columns,
            column_map: HashMap::new(),
        };
        schema.rebuild_column_map();
        schema
    }

    pub fn rebuild_column_map(&mut self) {
        self.column_map = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.position))
            .collect();
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.column_map.get(name).copied()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.column_position(name).map(|p| &self.columns[p])
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_lookup_after_construction() {
        let schema = TableSchema::new(
            "users",
            vec![
                ColumnDef::new("id", ColumnType::Integer, 0),
                ColumnDef::new("name", ColumnType::Text, 1),
            ],
        );
        assert_eq!(schema.column_position("name"), Some(1));
        assert_eq!(schema.column_count(), 2);
    }

    #[test]
    fn rebuild_after_deserialize_roundtrip() {
        let schema = TableSchema::new(
            "t",
            vec![ColumnDef::new("a", ColumnType::Integer, 0)],
        );
        let bytes = bincode::serialize(&schema).unwrap();
        let mut restored: TableSchema = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored.column_position("a"), None);
        restored.rebuild_column_map();
        assert_eq!(restored.column_position("a"), Some(0));
    }
}
