//! Table schema registry (spec.md §4.3's schema half).
//!
//! Adapted from the teacher's `catalog::TableRegistry`: an in-memory map
//! guarded by a lock, persisted whole to a single JSON file on checkpoint
//! (`catalog.json` in the on-disk layout of `spec.md` §6) and reloaded —
//! with column maps rebuilt, since they don't round-trip through
//! serialization — on open.

use crate::error::{DbError, Result};
use crate::types::TableSchema;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub struct SchemaRegistry {
    tables: RwLock<HashMap<String, TableSchema>>,
    snapshot_path: PathBuf,
}

impl SchemaRegistry {
    /// Open (or create) the registry backed by `data_dir/catalog.json`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let snapshot_path = data_dir.as_ref().join("catalog.json");
        let tables = if snapshot_path.exists() {
            let data = fs::read_to_string(&snapshot_path)?;
            let mut loaded: HashMap<String, TableSchema> =
                serde_json::from_str(&data).map_err(|e| DbError::Serialization(e.to_string()))?;
            for schema in loaded.values_mut() {
                schema.rebuild_column_map();
            }
            loaded
        } else {
            HashMap::new()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            snapshot_path,
        })
    }

    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut tables = self.tables.write().unwrap();
        if tables.contains_key(&schema.name) {
            return Err(DbError::TableAlreadyExists(schema.name));
        }
        tables.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn drop_table(&self, name: &str) -> Result<TableSchema> {
        let mut tables = self.tables.write().unwrap();
        tables
            .remove(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<TableSchema> {
        self.tables
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.read().unwrap().contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().unwrap().keys().cloned().collect()
    }

    /// Persist the whole schema map to `catalog.json`, the checkpoint
    /// snapshot loaded before WAL replay on recovery (spec.md §4.9).
    pub fn checkpoint(&self) -> Result<()> {
        let tables = self.tables.read().unwrap();
        let json = serde_json::to_string_pretty(&*tables)
            .map_err(|e| DbError::Serialization(e.to_string()))?;
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.snapshot_path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnDef, ColumnType};
    use tempfile::tempdir;

    fn schema(name: &str) -> TableSchema {
        TableSchema::new(
            name,
            vec![
                ColumnDef::new("id", ColumnType::Integer, 0),
                ColumnDef::new("name", ColumnType::Text, 1),
            ],
        )
    }

    #[test]
    fn create_duplicate_table_fails() {
        let dir = tempdir().unwrap();
        let reg = SchemaRegistry::open(dir.path()).unwrap();
        reg.create_table(schema("users")).unwrap();
        assert!(matches!(
            reg.create_table(schema("users")),
            Err(DbError::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn drop_missing_table_fails() {
        let dir = tempdir().unwrap();
        let reg = SchemaRegistry::open(dir.path()).unwrap();
        assert!(matches!(
            reg.drop_table("nope"),
            Err(DbError::TableNotFound(_))
        ));
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        {
            let reg = SchemaRegistry::open(dir.path()).unwrap();
            reg.create_table(schema("users")).unwrap();
            reg.checkpoint().unwrap();
        }
        let reopened = SchemaRegistry::open(dir.path()).unwrap();
        let schema = reopened.get("users").unwrap();
        assert_eq!(schema.column_position("name"), Some(1));
    }
}
