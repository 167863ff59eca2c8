//! Accelerator trait boundary (spec.md §4.6/§9): a typed interface for
//! offloading bulk row operations, never raw bytes, so a GPU-backed
//! implementation could be dropped in without touching the planner or
//! executor. This crate ships only the CPU-backed implementation; the
//! trait is the contract a GPU accelerator would satisfy.

use crate::planner::plan::AggregateExpr;
use crate::planner::predicate::Predicate;
use crate::types::{Row, TableSchema, Value};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

pub trait Accelerator: Send + Sync {
    fn filter(&self, schema: &TableSchema, rows: &[Row], predicate: &Predicate) -> Vec<Row>;

    fn aggregate(
        &self,
        schema: &TableSchema,
        rows: &[Row],
        group_by: &[String],
        aggregates: &[AggregateExpr],
    ) -> Vec<Row>;

    fn hash_join(
        &self,
        build_schema: &TableSchema,
        build_rows: &[Row],
        build_key: &str,
        probe_schema: &TableSchema,
        probe_rows: &[Row],
        probe_key: &str,
    ) -> Vec<Row>;
}

/// Data-parallel CPU implementation, fanning bulk row batches out across
/// `rayon`'s global thread pool — the teacher's dependency of choice for
/// parallel batch work, previously used only in its vector-index build
/// path.
pub struct CpuAccelerator;

impl CpuAccelerator {
    pub fn new() -> Arc<dyn Accelerator> {
        Arc::new(Self)
    }
}

fn group_key(schema: &TableSchema, row: &Row, group_by: &[String]) -> Vec<Value> {
    group_by
        .iter()
        .map(|c| {
            schema
                .column_position(c)
                .map(|pos| row[pos].clone())
                .unwrap_or(Value::Null)
        })
        .collect()
}

fn apply_aggregate(expr: &AggregateExpr, schema: &TableSchema, rows: &[&Row]) -> Value {
    match expr {
        AggregateExpr::Count => Value::Integer(rows.len() as i64),
        AggregateExpr::Sum(column) => {
            let pos = schema.column_position(column);
            let sum: f64 = rows
                .iter()
                .filter_map(|r| pos.map(|p| &r[p]))
                .filter_map(|v| match v {
                    Value::Integer(i) => Some(*i as f64),
                    Value::Real(f) => Some(*f),
                    _ => None,
                })
                .sum();
            Value::Real(sum)
        }
        AggregateExpr::Min(column) => {
            let pos = schema.column_position(column);
            rows.iter()
                .filter_map(|r| pos.map(|p| r[p].clone()))
                .min_by(|a, b| a.cmp_total(b))
                .unwrap_or(Value::Null)
        }
        AggregateExpr::Max(column) => {
            let pos = schema.column_position(column);
            rows.iter()
                .filter_map(|r| pos.map(|p| r[p].clone()))
                .max_by(|a, b| a.cmp_total(b))
                .unwrap_or(Value::Null)
        }
    }
}

impl Accelerator for CpuAccelerator {
    fn filter(&self, schema: &TableSchema, rows: &[Row], predicate: &Predicate) -> Vec<Row> {
        rows.par_iter()
            .filter(|row| predicate.matches(schema, row))
            .cloned()
            .collect()
    }

    fn aggregate(
        &self,
        schema: &TableSchema,
        rows: &[Row],
        group_by: &[String],
        aggregates: &[AggregateExpr],
    ) -> Vec<Row> {
        if group_by.is_empty() {
            let refs: Vec<&Row> = rows.iter().collect();
            let out: Row = aggregates
                .iter()
                .map(|expr| apply_aggregate(expr, schema, &refs))
                .collect();
            return vec![out];
        }

        let mut groups: HashMap<Vec<Value>, Vec<&Row>> = HashMap::new();
        for row in rows {
            groups
                .entry(group_key(schema, row, group_by))
                .or_default()
                .push(row);
        }

        groups
            .into_iter()
            .map(|(key, members)| {
                let mut out = key;
                for expr in aggregates {
                    out.push(apply_aggregate(expr, schema, &members));
                }
                out
            })
            .collect()
    }

    fn hash_join(
        &self,
        build_schema: &TableSchema,
        build_rows: &[Row],
        build_key: &str,
        probe_schema: &TableSchema,
        probe_rows: &[Row],
        probe_key: &str,
    ) -> Vec<Row> {
        let build_pos = match build_schema.column_position(build_key) {
            Some(p) => p,
            None => return Vec::new(),
        };
        let probe_pos = match probe_schema.column_position(probe_key) {
            Some(p) => p,
            None => return Vec::new(),
        };

        let mut table: HashMap<Value, Vec<&Row>> = HashMap::new();
        for row in build_rows {
            table.entry(row[build_pos].clone()).or_default().push(row);
        }

        probe_rows
            .par_iter()
            .flat_map(|probe_row| {
                let key = &probe_row[probe_pos];
                table
                    .get(key)
                    .into_iter()
                    .flatten()
                    .map(|build_row| {
                        let mut joined = build_row.to_vec();
                        joined.extend(probe_row.iter().cloned());
                        joined
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
