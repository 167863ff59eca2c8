//! Query result set: ordered column names plus the matching rows.

use crate::types::{ColumnDef, ColumnType, Row, TableSchema};

#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Synthesize a throwaway schema from this result set's column names,
    /// typed `Null` (position is all that downstream predicate/aggregate
    /// evaluation over a `ResultSet` actually needs; type checking already
    /// happened against the real table schema at the base scan).
    pub fn as_schema(&self) -> TableSchema {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnDef::new(name.clone(), ColumnType::Null, i))
            .collect();
        TableSchema::new("__result", columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn schema_positions_match_columns() {
        let rs = ResultSet::new(
            vec!["id".into(), "name".into()],
            vec![vec![Value::Integer(1), Value::Text("a".into())]],
        );
        let schema = rs.as_schema();
        assert_eq!(schema.column_position("name"), Some(1));
    }
}
