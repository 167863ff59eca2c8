//! Predicates over a single table's rows, shared by the planner and
//! executor.

use crate::types::{Row, TableSchema, Value};

/// A boolean condition evaluable against one row, given the row's table
/// schema for column-name resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Range {
        column: String,
        low: Option<Value>,
        high: Option<Value>,
    },
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, schema: &TableSchema, row: &Row) -> bool {
        match self {
            Predicate::Eq(column, value) => match schema.column_position(column) {
                Some(pos) => &row[pos] == value,
                None => false,
            },
            Predicate::Range { column, low, high } => match schema.column_position(column) {
                Some(pos) => {
                    let v = &row[pos];
                    let above_low = low.as_ref().map_or(true, |l| v.cmp_total(l).is_ge());
                    let below_high = high.as_ref().map_or(true, |h| v.cmp_total(h).is_le());
                    above_low && below_high
                }
                None => false,
            },
            Predicate::And(preds) => preds.iter().all(|p| p.matches(schema, row)),
        }
    }

    /// Column names this predicate reads, used by predicate pushdown and
    /// access-method selection to find candidate indexes.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Predicate::Eq(column, _) => vec![column.as_str()],
            Predicate::Range { column, .. } => vec![column.as_str()],
            Predicate::And(preds) => preds.iter().flat_map(|p| p.columns()).collect(),
        }
    }

    /// Conjoin two predicates, flattening nested `And`s so pushdown can
    /// repeatedly merge filters into a scan without building deep trees.
    pub fn and(self, other: Predicate) -> Predicate {
        let mut parts = match self {
            Predicate::And(p) => p,
            single => vec![single],
        };
        match other {
            Predicate::And(p) => parts.extend(p),
            single => parts.push(single),
        }
        Predicate::And(parts)
    }

    /// An equality or single-bound range sub-predicate on exactly
    /// `column`, if this predicate (or one of its `And` conjuncts) is
    /// one — used by access-method selection to decide whether an index
    /// on `column` can serve this predicate.
    pub fn equality_on(&self, column: &str) -> Option<&Value> {
        match self {
            Predicate::Eq(c, v) if c == column => Some(v),
            Predicate::And(preds) => preds.iter().find_map(|p| p.equality_on(column)),
            _ => None,
        }
    }

    pub fn range_on(&self, column: &str) -> Option<(Option<&Value>, Option<&Value>)> {
        match self {
            Predicate::Range { column: c, low, high } if c == column => {
                Some((low.as_ref(), high.as_ref()))
            }
            Predicate::And(preds) => preds.iter().find_map(|p| p.range_on(column)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnDef, ColumnType};

    fn schema() -> TableSchema {
        TableSchema::new(
            "t",
            vec![
                ColumnDef::new("id", ColumnType::Integer, 0),
                ColumnDef::new("name", ColumnType::Text, 1),
            ],
        )
    }

    #[test]
    fn eq_matches_correct_row() {
        let schema = schema();
        let pred = Predicate::Eq("id".into(), Value::Integer(1));
        assert!(pred.matches(&schema, &vec![Value::Integer(1), Value::Text("a".into())]));
        assert!(!pred.matches(&schema, &vec![Value::Integer(2), Value::Text("a".into())]));
    }

    #[test]
    fn range_respects_bounds() {
        let schema = schema();
        let pred = Predicate::Range {
            column: "id".into(),
            low: Some(Value::Integer(2)),
            high: Some(Value::Integer(4)),
        };
        assert!(!pred.matches(&schema, &vec![Value::Integer(1), Value::Null]));
        assert!(pred.matches(&schema, &vec![Value::Integer(3), Value::Null]));
        assert!(!pred.matches(&schema, &vec![Value::Integer(5), Value::Null]));
    }

    #[test]
    fn and_flattens_conjuncts() {
        let a = Predicate::Eq("id".into(), Value::Integer(1));
        let b = Predicate::Eq("name".into(), Value::Text("x".into()));
        let conjoined = a.and(b);
        assert!(matches!(conjoined, Predicate::And(ref v) if v.len() == 2));
    }

    #[test]
    fn equality_on_finds_nested_conjunct() {
        let pred = Predicate::And(vec![
            Predicate::Eq("id".into(), Value::Integer(1)),
            Predicate::Eq("name".into(), Value::Text("x".into())),
        ]);
        assert_eq!(pred.equality_on("name"), Some(&Value::Text("x".into())));
        assert_eq!(pred.equality_on("missing"), None);
    }
}
