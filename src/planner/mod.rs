//! Query planner (spec.md §4.6): translates a caller-built `LogicalPlan`
//! into a `PhysicalPlan` through four rewrite passes — predicate
//! pushdown, access-method selection, join-order selection, and
//! parallelism/accelerator annotation.
//!
//! Generalizes the teacher's `query::planner::{Operator, ExecutionPlan,
//! QueryPlanner}` skeleton (an intentionally thin placeholder whose
//! `optimize()` is a no-op in the source) into the real four-pass
//! pipeline this spec requires.

pub mod accelerator;
pub mod plan;
pub mod predicate;

pub use accelerator::{Accelerator, CpuAccelerator};
pub use plan::{AccessMethod, AggregateExpr, LogicalPlan, PhysicalPlan};
pub use predicate::Predicate;

use crate::error::Result;
use crate::index::IndexRegistry;
use crate::config::ExecutionConfig;
use crate::stats::StatsCatalog;
use crate::types::IndexShape;
use std::sync::Arc;

/// Conservative row estimate used when a table has no recorded
/// statistics yet, per `spec.md` §4.5.
const DEFAULT_ROW_ESTIMATE: u64 = 1_000_000;

pub struct Planner {
    index_registry: Arc<IndexRegistry>,
    stats: Arc<StatsCatalog>,
    exec_config: ExecutionConfig,
    accelerator: Option<Arc<dyn Accelerator>>,
}

impl Planner {
    pub fn new(
        index_registry: Arc<IndexRegistry>,
        stats: Arc<StatsCatalog>,
        exec_config: ExecutionConfig,
        accelerator: Option<Arc<dyn Accelerator>>,
    ) -> Self {
        Self {
            index_registry,
            stats,
            exec_config,
            accelerator,
        }
    }

    pub fn plan(&self, logical: LogicalPlan) -> Result<PhysicalPlan> {
        let pushed = Self::pushdown(logical);
        let physical = self.translate(pushed);
        Ok(self.annotate(physical))
    }

    fn table_row_estimate(&self, table: &str) -> u64 {
        let count = self.stats.table(table);
        if count == 0 {
            DEFAULT_ROW_ESTIMATE
        } else {
            count
        }
    }

    /// Pass 1: push `Filter` nodes down into the `Scan` they sit above,
    /// merging predicates with `And` so the scan itself can apply them
    /// (and access-method selection can see the full predicate).
    fn pushdown(plan: LogicalPlan) -> LogicalPlan {
        match plan {
            LogicalPlan::Filter { input, predicate } => {
                let input = Self::pushdown(*input);
                match input {
                    LogicalPlan::Scan {
                        table,
                        predicate: existing,
                    } => {
                        let merged = match existing {
                            Some(existing) => existing.and(predicate),
                            None => predicate,
                        };
                        LogicalPlan::Scan {
                            table,
                            predicate: Some(merged),
                        }
                    }
                    other => LogicalPlan::Filter {
                        input: Box::new(other),
                        predicate,
                    },
                }
            }
            LogicalPlan::Scan { table, predicate } => LogicalPlan::Scan { table, predicate },
            LogicalPlan::Project { input, columns } => LogicalPlan::Project {
                input: Box::new(Self::pushdown(*input)),
                columns,
            },
            LogicalPlan::Join {
                left,
                right,
                left_key,
                right_key,
            } => LogicalPlan::Join {
                left: Box::new(Self::pushdown(*left)),
                right: Box::new(Self::pushdown(*right)),
                left_key,
                right_key,
            },
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
            } => LogicalPlan::Aggregate {
                input: Box::new(Self::pushdown(*input)),
                group_by,
                aggregates,
            },
            LogicalPlan::Sort {
                input,
                by,
                descending,
            } => LogicalPlan::Sort {
                input: Box::new(Self::pushdown(*input)),
                by,
                descending,
            },
            LogicalPlan::Limit { input, limit } => LogicalPlan::Limit {
                input: Box::new(Self::pushdown(*input)),
                limit,
            },
        }
    }

    /// Passes 2 and 3 together: translate each node bottom-up, choosing
    /// a scan's access method (consulting the index registry and cost
    /// model, tie-break `IndexSeek > IndexRange > TableScan`) and, once a
    /// join's children are translated and their row counts known,
    /// picking the build/probe ordering and the join strategy.
    fn translate(&self, plan: LogicalPlan) -> PhysicalPlan {
        match plan {
            LogicalPlan::Scan { table, predicate } => self.select_access_method(table, predicate),
            LogicalPlan::Filter { input, predicate } => PhysicalPlan::Filter {
                input: Box::new(self.translate(*input)),
                predicate,
            },
            LogicalPlan::Project { input, columns } => PhysicalPlan::Project {
                input: Box::new(self.translate(*input)),
                columns,
            },
            LogicalPlan::Join {
                left,
                right,
                left_key,
                right_key,
            } => {
                let left = self.translate(*left);
                let right = self.translate(*right);
                self.choose_join(left, right, left_key, right_key)
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
            } => PhysicalPlan::Aggregate {
                input: Box::new(self.translate(*input)),
                group_by,
                aggregates,
                use_accelerator: false,
            },
            LogicalPlan::Sort {
                input,
                by,
                descending,
            } => PhysicalPlan::Sort {
                input: Box::new(self.translate(*input)),
                by,
                descending,
            },
            LogicalPlan::Limit { input, limit } => PhysicalPlan::Limit {
                input: Box::new(self.translate(*input)),
                limit,
            },
        }
    }

    fn select_access_method(&self, table: String, predicate: Option<Predicate>) -> PhysicalPlan {
        let cost = self.stats.cost_parameters();
        let row_estimate = self.table_row_estimate(&table);
        let scan_cost = cost.scan_cost(row_estimate);

        let mut best = (AccessMethod::TableScan, scan_cost, row_estimate);

        if let Some(predicate) = &predicate {
            for descriptor in self.index_registry.indexes_for_table(&table) {
                // Only single-column indexes can serve a single-column
                // predicate under this spec's simplified access-method
                // matching.
                let Some(column) = descriptor.columns.first() else {
                    continue;
                };
                if let Some(_value) = predicate.equality_on(column) {
                    let matched = self.stats.estimate_equality_matches(&table).max(1);
                    let candidate_cost = cost.index_seek_cost();
                    if candidate_cost < best.1 {
                        best = (
                            AccessMethod::IndexSeek {
                                index: descriptor.name.clone(),
                            },
                            candidate_cost,
                            matched,
                        );
                    }
                } else if predicate.range_on(column).is_some()
                    && descriptor.shape == IndexShape::BTree
                {
                    let matched = self.stats.estimate_range_matches(&table).max(1);
                    let candidate_cost = cost.index_range_cost(matched);
                    if candidate_cost < best.1 {
                        best = (
                            AccessMethod::IndexRange {
                                index: descriptor.name.clone(),
                            },
                            candidate_cost,
                            matched,
                        );
                    }
                }
            }
        }

        PhysicalPlan::Scan {
            table,
            method: best.0,
            predicate,
            estimated_rows: best.2,
            parallel_degree: 1,
            use_accelerator: false,
        }
    }

    fn choose_join(
        &self,
        left: PhysicalPlan,
        right: PhysicalPlan,
        left_key: String,
        right_key: String,
    ) -> PhysicalPlan {
        let left_rows = estimated_rows(&left);
        let right_rows = estimated_rows(&right);

        // Tiny inputs favor a nested-loop join; the hash table build
        // overhead isn't worth it.
        if left_rows.min(right_rows) <= 1 {
            return PhysicalPlan::NestedLoopJoin {
                outer: Box::new(left),
                inner: Box::new(right),
                outer_key: left_key,
                inner_key: right_key,
            };
        }

        // Greedy smaller-side-builds: the build side should be the
        // cheaper one to hash.
        if left_rows <= right_rows {
            PhysicalPlan::HashJoin {
                build: Box::new(left),
                probe: Box::new(right),
                build_key: left_key,
                probe_key: right_key,
                use_accelerator: false,
            }
        } else {
            PhysicalPlan::HashJoin {
                build: Box::new(right),
                probe: Box::new(left),
                build_key: right_key,
                probe_key: left_key,
                use_accelerator: false,
            }
        }
    }

    /// Pass 4: annotate nodes expected to process more rows than
    /// `parallel_row_threshold` with a parallel degree, and mark them for
    /// accelerator use if one is registered.
    fn annotate(&self, plan: PhysicalPlan) -> PhysicalPlan {
        let rows = estimated_rows(&plan);
        let parallelize = rows > self.exec_config.parallel_row_threshold;
        let degree = if parallelize {
            self.exec_config.parallel_degree
        } else {
            1
        };
        let use_accelerator = parallelize && self.accelerator.is_some();

        match plan {
            PhysicalPlan::Scan {
                table,
                method,
                predicate,
                estimated_rows,
                ..
            } => PhysicalPlan::Scan {
                table,
                method,
                predicate,
                estimated_rows,
                parallel_degree: degree,
                use_accelerator,
            },
            PhysicalPlan::Filter { input, predicate } => PhysicalPlan::Filter {
                input: Box::new(self.annotate(*input)),
                predicate,
            },
            PhysicalPlan::Project { input, columns } => PhysicalPlan::Project {
                input: Box::new(self.annotate(*input)),
                columns,
            },
            PhysicalPlan::HashJoin {
                build,
                probe,
                build_key,
                probe_key,
                ..
            } => PhysicalPlan::HashJoin {
                build: Box::new(self.annotate(*build)),
                probe: Box::new(self.annotate(*probe)),
                build_key,
                probe_key,
                use_accelerator,
            },
            PhysicalPlan::NestedLoopJoin {
                outer,
                inner,
                outer_key,
                inner_key,
            } => PhysicalPlan::NestedLoopJoin {
                outer: Box::new(self.annotate(*outer)),
                inner: Box::new(self.annotate(*inner)),
                outer_key,
                inner_key,
            },
            PhysicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                ..
            } => PhysicalPlan::Aggregate {
                input: Box::new(self.annotate(*input)),
                group_by,
                aggregates,
                use_accelerator,
            },
            PhysicalPlan::Sort { input, by, descending } => PhysicalPlan::Sort {
                input: Box::new(self.annotate(*input)),
                by,
                descending,
            },
            PhysicalPlan::Limit { input, limit } => PhysicalPlan::Limit {
                input: Box::new(self.annotate(*input)),
                limit,
            },
        }
    }
}

/// Bottom-up row-count estimate for a physical plan node, used by both
/// join ordering and parallelism annotation.
fn estimated_rows(plan: &PhysicalPlan) -> u64 {
    match plan {
        PhysicalPlan::Scan { estimated_rows, .. } => *estimated_rows,
        PhysicalPlan::Filter { input, .. } => estimated_rows(input),
        PhysicalPlan::Project { input, .. } => estimated_rows(input),
        PhysicalPlan::HashJoin { build, probe, .. } => {
            estimated_rows(build).min(estimated_rows(probe))
        }
        PhysicalPlan::NestedLoopJoin { outer, inner, .. } => {
            estimated_rows(outer).max(estimated_rows(inner))
        }
        PhysicalPlan::Aggregate { input, .. } => estimated_rows(input),
        PhysicalPlan::Sort { input, .. } => estimated_rows(input),
        PhysicalPlan::Limit { input, limit } => estimated_rows(input).min(*limit as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexShape;

    fn planner() -> Planner {
        Planner::new(
            Arc::new(IndexRegistry::new()),
            Arc::new(StatsCatalog::new()),
            ExecutionConfig::default(),
            None,
        )
    }

    #[test]
    fn scan_with_no_index_uses_table_scan() {
        let p = planner();
        let plan = p
            .plan(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        assert!(matches!(
            plan,
            PhysicalPlan::Scan {
                method: AccessMethod::TableScan,
                ..
            }
        ));
    }

    #[test]
    fn filter_pushes_into_scan_predicate() {
        let p = planner();
        let plan = p
            .plan(LogicalPlan::Filter {
                input: Box::new(LogicalPlan::Scan {
                    table: "users".into(),
                    predicate: None,
                }),
                predicate: Predicate::Eq("id".into(), crate::types::Value::Integer(1)),
            })
            .unwrap();
        match plan {
            PhysicalPlan::Scan { predicate, .. } => assert!(predicate.is_some()),
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn equality_predicate_with_index_prefers_index_seek() {
        let registry = Arc::new(IndexRegistry::new());
        registry
            .create("idx_id", "users", vec!["id".into()], IndexShape::BTree)
            .unwrap();
        let stats = Arc::new(StatsCatalog::new());
        stats.set_row_count("users", 10_000);
        let p = Planner::new(registry, stats, ExecutionConfig::default(), None);

        let plan = p
            .plan(LogicalPlan::Scan {
                table: "users".into(),
                predicate: Some(Predicate::Eq("id".into(), crate::types::Value::Integer(1))),
            })
            .unwrap();
        assert!(matches!(
            plan,
            PhysicalPlan::Scan {
                method: AccessMethod::IndexSeek { .. },
                ..
            }
        ));
    }

    #[test]
    fn join_builds_on_smaller_side() {
        let registry = Arc::new(IndexRegistry::new());
        let stats = Arc::new(StatsCatalog::new());
        stats.set_row_count("small", 10);
        stats.set_row_count("big", 1_000_000);
        let p = Planner::new(registry, stats, ExecutionConfig::default(), None);

        let plan = p
            .plan(LogicalPlan::Join {
                left: Box::new(LogicalPlan::Scan {
                    table: "big".into(),
                    predicate: None,
                }),
                right: Box::new(LogicalPlan::Scan {
                    table: "small".into(),
                    predicate: None,
                }),
                left_key: "id".into(),
                right_key: "id".into(),
            })
            .unwrap();

        match plan {
            PhysicalPlan::HashJoin { build, .. } => match *build {
                PhysicalPlan::Scan { table, .. } => assert_eq!(table, "small"),
                _ => panic!("expected scan build side"),
            },
            _ => panic!("expected hash join"),
        }
    }

    #[test]
    fn high_row_count_triggers_parallel_annotation() {
        let registry = Arc::new(IndexRegistry::new());
        let stats = Arc::new(StatsCatalog::new());
        stats.set_row_count("users", 5_000_000);
        let mut exec_config = ExecutionConfig::default();
        exec_config.parallel_row_threshold = 1000;
        let p = Planner::new(registry, stats, exec_config, None);

        let plan = p
            .plan(LogicalPlan::Scan {
                table: "users".into(),
                predicate: None,
            })
            .unwrap();
        match plan {
            PhysicalPlan::Scan { parallel_degree, .. } => assert!(parallel_degree > 1),
            _ => panic!("expected scan"),
        }
    }
}
