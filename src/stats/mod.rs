//! Cost model and table/index statistics (spec.md §4.5), consulted by the
//! planner when choosing an access method and a join order.
//!
//! Grounded on the teacher's `sql::optimizer::{IndexStats, CostParameters}`:
//! same split between per-table row-count/size stats and a tunable cost
//! table of per-operator constants, generalized from vector-search access
//! paths (`VectorScan`, `ANNSearch`) to this spec's relational ones
//! (`TableScan`, `IndexSeek`, `IndexRange`, `HashJoin`, `NestedLoopJoin`).

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tunable per-operator cost constants, expressed in abstract cost units
/// rather than wall-clock time (mirrors the teacher's `CostParameters`).
#[derive(Debug, Clone, Copy)]
pub struct CostParameters {
    /// Cost to read and evaluate predicates against one row in a full
    /// table scan.
    pub scan_row_cost: f64,
    /// Cost to probe an index for a single exact-match key.
    pub index_seek_cost: f64,
    /// Per-row cost while walking an index range, in addition to the
    /// fixed `index_seek_cost` to position the cursor.
    pub index_range_row_cost: f64,
    /// Per-row cost to build a hash-join side's hash table.
    pub hash_build_row_cost: f64,
    /// Per-row cost to probe the hash-join's built side.
    pub hash_probe_row_cost: f64,
    /// Per-pair cost for a nested-loop join.
    pub nested_loop_pair_cost: f64,
    /// Default selectivity assumed for an equality predicate when no
    /// column statistics are available.
    pub default_equality_selectivity: f64,
    /// Default selectivity assumed for a range predicate when no column
    /// statistics are available.
    pub default_range_selectivity: f64,
}

impl Default for CostParameters {
    fn default() -> Self {
        Self {
            scan_row_cost: 1.0,
            index_seek_cost: 4.0,
            index_range_row_cost: 1.2,
            hash_build_row_cost: 1.5,
            hash_probe_row_cost: 0.8,
            nested_loop_pair_cost: 1.0,
            default_equality_selectivity: 0.1,
            default_range_selectivity: 0.3,
        }
    }
}

impl CostParameters {
    pub fn scan_cost(&self, row_count: u64) -> f64 {
        row_count as f64 * self.scan_row_cost
    }

    pub fn index_seek_cost(&self) -> f64 {
        self.index_seek_cost
    }

    pub fn index_range_cost(&self, matched_rows: u64) -> f64 {
        self.index_seek_cost + matched_rows as f64 * self.index_range_row_cost
    }

    pub fn hash_join_cost(&self, build_rows: u64, probe_rows: u64) -> f64 {
        build_rows as f64 * self.hash_build_row_cost + probe_rows as f64 * self.hash_probe_row_cost
    }

    pub fn nested_loop_cost(&self, outer_rows: u64, inner_rows: u64) -> f64 {
        outer_rows as f64 * inner_rows as f64 * self.nested_loop_pair_cost
    }
}

/// Running statistics for one table, updated on every catalog mutation
/// when `DBConfig::enable_stats` is set (teacher's `IndexStats` played the
/// same role for a vector index's point count).
#[derive(Debug, Default)]
pub struct TableStats {
    row_count: AtomicU64,
}

impl TableStats {
    pub fn row_count(&self) -> u64 {
        self.row_count.load(Ordering::Relaxed)
    }

    pub fn record_insert(&self) {
        self.row_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        let _ = self
            .row_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
    }

    pub fn set_row_count(&self, count: u64) {
        self.row_count.store(count, Ordering::Relaxed);
    }
}

/// Registry of per-table statistics plus the shared cost parameters,
/// handed to the planner for access-method and join-order decisions.
pub struct StatsCatalog {
    tables: DashMap<String, TableStats>,
    cost: CostParameters,
}

impl StatsCatalog {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            cost: CostParameters::default(),
        }
    }

    pub fn with_cost_parameters(cost: CostParameters) -> Self {
        Self {
            tables: DashMap::new(),
            cost,
        }
    }

    pub fn cost_parameters(&self) -> &CostParameters {
        &self.cost
    }

    pub fn table(&self, name: &str) -> u64 {
        self.tables.get(name).map(|s| s.row_count()).unwrap_or(0)
    }

    pub fn ensure_table(&self, name: &str) {
        self.tables.entry(name.to_string()).or_default();
    }

    pub fn record_insert(&self, table: &str) {
        self.tables.entry(table.to_string()).or_default().record_insert();
    }

    pub fn record_delete(&self, table: &str) {
        self.tables.entry(table.to_string()).or_default().record_delete();
    }

    pub fn set_row_count(&self, table: &str, count: u64) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .set_row_count(count);
    }

    pub fn drop_table(&self, table: &str) {
        self.tables.remove(table);
    }

    /// Estimate the number of rows an equality predicate on `table`
    /// matches, using the default equality selectivity since this spec
    /// carries no per-column histograms.
    pub fn estimate_equality_matches(&self, table: &str) -> u64 {
        let rows = self.table(table) as f64;
        (rows * self.cost.default_equality_selectivity).ceil() as u64
    }

    pub fn estimate_range_matches(&self, table: &str) -> u64 {
        let rows = self.table(table) as f64;
        (rows * self.cost.default_range_selectivity).ceil() as u64
    }
}

impl Default for StatsCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_count_tracks_insert_and_delete() {
        let stats = StatsCatalog::new();
        stats.record_insert("users");
        stats.record_insert("users");
        stats.record_delete("users");
        assert_eq!(stats.table("users"), 1);
    }

    #[test]
    fn selectivity_estimates_scale_with_row_count() {
        let stats = StatsCatalog::new();
        stats.set_row_count("users", 1000);
        assert_eq!(stats.estimate_equality_matches("users"), 100);
        assert_eq!(stats.estimate_range_matches("users"), 300);
    }

    #[test]
    fn cost_model_orders_access_methods_sensibly() {
        let cost = CostParameters::default();
        let scan = cost.scan_cost(10_000);
        let seek = cost.index_seek_cost();
        assert!(seek < scan);
    }

    #[test]
    fn drop_table_clears_stats() {
        let stats = StatsCatalog::new();
        stats.record_insert("users");
        stats.drop_table("users");
        assert_eq!(stats.table("users"), 0);
    }
}
