//! Physical-plan executor (spec.md §4.7): a bottom-up interpreter over
//! `PhysicalPlan`, generalizing the teacher's `query::executor::
//! ExecutionEngine` placeholder (a thin, largely unimplemented stub in
//! the source) into the full node set this spec requires.

pub mod result;

pub use result::ResultSet;

use crate::catalog::Catalog;
use crate::error::{DbError, Result};
use crate::index::IndexRegistry;
use crate::planner::accelerator::Accelerator;
use crate::planner::plan::{AccessMethod, AggregateExpr, PhysicalPlan};
use crate::types::{Row, RowId, TableSchema, Value};
use rayon::prelude::*;
use std::sync::Arc;

pub struct Executor {
    catalog: Arc<Catalog>,
    index_registry: Arc<IndexRegistry>,
    accelerator: Option<Arc<dyn Accelerator>>,
}

impl Executor {
    pub fn new(
        catalog: Arc<Catalog>,
        index_registry: Arc<IndexRegistry>,
        accelerator: Option<Arc<dyn Accelerator>>,
    ) -> Self {
        Self {
            catalog,
            index_registry,
            accelerator,
        }
    }

    pub fn execute(&self, plan: &PhysicalPlan) -> Result<ResultSet> {
        match plan {
            PhysicalPlan::Scan {
                table,
                method,
                predicate,
                parallel_degree,
                use_accelerator,
                ..
            } => {
                let schema = self.catalog.table_schema(table)?;
                let rows = self.run_scan(table, &schema, method, predicate.as_ref())?;
                let filtered = match predicate {
                    Some(predicate) => {
                        if *use_accelerator {
                            if let Some(acc) = &self.accelerator {
                                acc.filter(&schema, &rows, predicate)
                            } else {
                                apply_filter(&schema, rows, predicate, *parallel_degree)
                            }
                        } else {
                            apply_filter(&schema, rows, predicate, *parallel_degree)
                        }
                    }
                    None => rows,
                };
                Ok(ResultSet::new(schema.columns.iter().map(|c| c.name.clone()).collect(), filtered))
            }
            PhysicalPlan::Filter { input, predicate } => {
                let input_set = self.execute(input)?;
                let schema = input_set.as_schema();
                let rows = apply_filter(&schema, input_set.rows, predicate, 1);
                Ok(ResultSet::new(input_set.columns, rows))
            }
            PhysicalPlan::Project { input, columns } => {
                let input_set = self.execute(input)?;
                let positions: Vec<usize> = columns
                    .iter()
                    .map(|c| {
                        input_set
                            .columns
                            .iter()
                            .position(|ic| ic == c)
                            .ok_or_else(|| DbError::ColumnNotFound(c.clone()))
                    })
                    .collect::<Result<_>>()?;
                let rows = input_set
                    .rows
                    .into_iter()
                    .map(|row| positions.iter().map(|&p| row[p].clone()).collect())
                    .collect();
                Ok(ResultSet::new(columns.clone(), rows))
            }
            PhysicalPlan::HashJoin {
                build,
                probe,
                build_key,
                probe_key,
                use_accelerator,
            } => {
                let build_set = self.execute(build)?;
                let probe_set = self.execute(probe)?;
                let build_schema = build_set.as_schema();
                let probe_schema = probe_set.as_schema();

                let rows = if *use_accelerator {
                    if let Some(acc) = &self.accelerator {
                        acc.hash_join(
                            &build_schema,
                            &build_set.rows,
                            build_key,
                            &probe_schema,
                            &probe_set.rows,
                            probe_key,
                        )
                    } else {
                        hash_join(&build_schema, &build_set.rows, build_key, &probe_schema, &probe_set.rows, probe_key)?
                    }
                } else {
                    hash_join(&build_schema, &build_set.rows, build_key, &probe_schema, &probe_set.rows, probe_key)?
                };

                let mut columns = build_set.columns.clone();
                columns.extend(probe_set.columns.clone());
                Ok(ResultSet::new(columns, rows))
            }
            PhysicalPlan::NestedLoopJoin {
                outer,
                inner,
                outer_key,
                inner_key,
            } => {
                let outer_set = self.execute(outer)?;
                let inner_set = self.execute(inner)?;
                let outer_schema = outer_set.as_schema();
                let inner_schema = inner_set.as_schema();
                let outer_pos = outer_schema
                    .column_position(outer_key)
                    .ok_or_else(|| DbError::ColumnNotFound(outer_key.clone()))?;
                let inner_pos = inner_schema
                    .column_position(inner_key)
                    .ok_or_else(|| DbError::ColumnNotFound(inner_key.clone()))?;

                let mut rows = Vec::new();
                for outer_row in &outer_set.rows {
                    for inner_row in &inner_set.rows {
                        if outer_row[outer_pos] == inner_row[inner_pos] {
                            let mut joined = outer_row.clone();
                            joined.extend(inner_row.iter().cloned());
                            rows.push(joined);
                        }
                    }
                }
                let mut columns = outer_set.columns.clone();
                columns.extend(inner_set.columns.clone());
                Ok(ResultSet::new(columns, rows))
            }
            PhysicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                use_accelerator,
            } => {
                let input_set = self.execute(input)?;
                let schema = input_set.as_schema();

                let rows = if *use_accelerator {
                    if let Some(acc) = &self.accelerator {
                        acc.aggregate(&schema, &input_set.rows, group_by, aggregates)
                    } else {
                        run_aggregate(&schema, &input_set.rows, group_by, aggregates)
                    }
                } else {
                    run_aggregate(&schema, &input_set.rows, group_by, aggregates)
                };

                let mut columns = group_by.clone();
                for expr in aggregates {
                    columns.push(aggregate_label(expr));
                }
                Ok(ResultSet::new(columns, rows))
            }
            PhysicalPlan::Sort { input, by, descending } => {
                let input_set = self.execute(input)?;
                let schema = input_set.as_schema();
                let pos = schema
                    .column_position(by)
                    .ok_or_else(|| DbError::ColumnNotFound(by.clone()))?;
                let mut rows = input_set.rows;
                rows.sort_by(|a, b| {
                    let ord = a[pos].cmp_total(&b[pos]);
                    if *descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
                Ok(ResultSet::new(input_set.columns, rows))
            }
            PhysicalPlan::Limit { input, limit } => {
                let input_set = self.execute(input)?;
                let rows = input_set.rows.into_iter().take(*limit).collect();
                Ok(ResultSet::new(input_set.columns, rows))
            }
        }
    }

    fn run_scan(
        &self,
        table: &str,
        _schema: &TableSchema,
        method: &AccessMethod,
        predicate: Option<&crate::planner::predicate::Predicate>,
    ) -> Result<Vec<Row>> {
        match method {
            AccessMethod::TableScan => {
                Ok(self.catalog.scan(table)?.into_iter().map(|(_, row)| row).collect())
            }
            AccessMethod::IndexSeek { index } => {
                let handle = self.index_registry.get(index)?;
                let descriptor = self.index_registry.descriptor(index)?;
                let row_ids = match descriptor.columns.first().and_then(|c| {
                    predicate.and_then(|p| p.equality_on(c))
                }) {
                    Some(value) => handle.get(std::slice::from_ref(value))?,
                    None => handle.range(None, None)?.into_iter().map(|(_, id)| id).collect(),
                };
                self.materialize(table, row_ids)
            }
            AccessMethod::IndexRange { index } => {
                let handle = self.index_registry.get(index)?;
                let descriptor = self.index_registry.descriptor(index)?;
                let bounds = descriptor
                    .columns
                    .first()
                    .and_then(|c| predicate.and_then(|p| p.range_on(c)));
                let row_ids = match bounds {
                    Some((low, high)) => {
                        let low_key = low.map(|v| vec![v.clone()]);
                        let high_key = high.map(|v| vec![v.clone()]);
                        handle
                            .range(low_key.as_deref(), high_key.as_deref())?
                            .into_iter()
                            .map(|(_, id)| id)
                            .collect()
                    }
                    None => handle.range(None, None)?.into_iter().map(|(_, id)| id).collect(),
                };
                self.materialize(table, row_ids)
            }
        }
    }

    fn materialize(&self, table: &str, row_ids: Vec<RowId>) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(row_ids.len());
        for row_id in row_ids {
            if let Some(row) = self.catalog.lookup(table, row_id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

fn apply_filter(schema: &TableSchema, rows: Vec<Row>, predicate: &crate::planner::predicate::Predicate, parallel_degree: usize) -> Vec<Row> {
    if parallel_degree > 1 {
        rows.into_par_iter().filter(|row| predicate.matches(schema, row)).collect()
    } else {
        rows.into_iter().filter(|row| predicate.matches(schema, row)).collect()
    }
}

fn hash_join(
    build_schema: &TableSchema,
    build_rows: &[Row],
    build_key: &str,
    probe_schema: &TableSchema,
    probe_rows: &[Row],
    probe_key: &str,
) -> Result<Vec<Row>> {
    let build_pos = build_schema
        .column_position(build_key)
        .ok_or_else(|| DbError::ColumnNotFound(build_key.to_string()))?;
    let probe_pos = probe_schema
        .column_position(probe_key)
        .ok_or_else(|| DbError::ColumnNotFound(probe_key.to_string()))?;

    let mut table: std::collections::HashMap<Value, Vec<&Row>> = std::collections::HashMap::new();
    for row in build_rows {
        table.entry(row[build_pos].clone()).or_default().push(row);
    }

    let mut rows = Vec::new();
    for probe_row in probe_rows {
        if let Some(matches) = table.get(&probe_row[probe_pos]) {
            for build_row in matches {
                let mut joined = (*build_row).clone();
                joined.extend(probe_row.iter().cloned());
                rows.push(joined);
            }
        }
    }
    Ok(rows)
}

fn run_aggregate(
    schema: &TableSchema,
    rows: &[Row],
    group_by: &[String],
    aggregates: &[AggregateExpr],
) -> Vec<Row> {
    use std::collections::HashMap;

    let group_positions: Vec<Option<usize>> = group_by.iter().map(|c| schema.column_position(c)).collect();

    let key_of = |row: &Row| -> Vec<Value> {
        group_positions
            .iter()
            .map(|pos| pos.map(|p| row[p].clone()).unwrap_or(Value::Null))
            .collect()
    };

    if group_by.is_empty() {
        let refs: Vec<&Row> = rows.iter().collect();
        let out: Row = aggregates.iter().map(|expr| eval_aggregate(expr, schema, &refs)).collect();
        return vec![out];
    }

    let mut groups: HashMap<Vec<Value>, Vec<&Row>> = HashMap::new();
    for row in rows {
        groups.entry(key_of(row)).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = key;
            for expr in aggregates {
                out.push(eval_aggregate(expr, schema, &members));
            }
            out
        })
        .collect()
}

fn eval_aggregate(expr: &AggregateExpr, schema: &TableSchema, rows: &[&Row]) -> Value {
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

fn aggregate_label(expr: &AggregateExpr) -> String {
    match expr {
        AggregateExpr::Count => "count".to_string(),
        AggregateExpr::Sum(c) => format!("sum({c})"),
        AggregateExpr::Min(c) => format!("min({c})"),
        AggregateExpr::Max(c) => format!("max({c})"),
    }
}
