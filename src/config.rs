//! Database configuration and durability levels.
//!
//! Mirrors the teacher crate's split between a `DurabilityLevel` (the
//! fsync policy) and an aggregate `DBConfig`, with presets for common
//! deployment shapes instead of requiring callers to hand-assemble every
//! field.

use serde::{Deserialize, Serialize};

/// Trade-off between write latency and crash-safety for the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurabilityLevel {
    /// fsync after every append. Slowest, zero data loss on crash.
    Synchronous,
    /// Batch several appends before a single fsync.
    GroupCommit {
        max_batch_size: usize,
        max_wait_us: u64,
    },
    /// Background thread fsyncs on an interval; crash can lose that window.
    Periodic { interval_ms: u64 },
    /// Never fsync. Test/benchmark only.
    NoSync,
}

impl Default for DurabilityLevel {
    fn default() -> Self {
        DurabilityLevel::GroupCommit {
            max_batch_size: 1000,
            max_wait_us: 1000,
        }
    }
}

impl DurabilityLevel {
    pub fn synchronous() -> Self {
        Self::Synchronous
    }

    pub fn group_commit() -> Self {
        Self::default()
    }

    pub fn periodic(interval_ms: u64) -> Self {
        Self::Periodic { interval_ms }
    }

    pub fn no_sync() -> Self {
        Self::NoSync
    }

    /// Whether this level requires an fsync on every single append.
    pub fn requires_immediate_sync(&self) -> bool {
        matches!(self, Self::Synchronous)
    }

    pub fn is_no_sync(&self) -> bool {
        matches!(self, Self::NoSync)
    }
}

/// WAL-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WALConfig {
    pub durability_level: DurabilityLevel,
    /// File name for the WAL, relative to the database directory.
    pub wal_file_name: String,
    /// Soft size threshold (bytes) at which a checkpoint should be
    /// considered; not enforced automatically by the WAL itself.
    pub max_wal_size: u64,
}

impl Default for WALConfig {
    fn default() -> Self {
        Self {
            durability_level: DurabilityLevel::default(),
            wal_file_name: "wal.log".to_string(),
            max_wal_size: 64 * 1024 * 1024,
        }
    }
}

impl WALConfig {
    pub fn for_financial() -> Self {
        Self {
            durability_level: DurabilityLevel::Synchronous,
            ..Default::default()
        }
    }

    pub fn for_general() -> Self {
        Self::default()
    }

    pub fn for_testing() -> Self {
        Self {
            durability_level: DurabilityLevel::NoSync,
            ..Default::default()
        }
    }
}

/// Controls when the planner annotates a physical plan node with
/// parallelism / accelerator hints (`spec.md` §4.6 rule 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Row-count threshold above which a node gets `parallel_degree > 1`
    /// and, if an accelerator is registered, `use_accelerator = true`.
    pub parallel_row_threshold: u64,
    /// Degree to assign when the threshold is exceeded.
    pub parallel_degree: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallel_row_threshold: 1_000_000,
            parallel_degree: 4,
        }
    }
}

/// Replicated-log quorum sizing; `replica_count` should be `2f + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    pub replica_count: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self { replica_count: 3 }
    }
}

/// Top-level database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DBConfig {
    pub wal_config: WALConfig,
    pub execution_config: ExecutionConfig,
    pub replication_config: ReplicationConfig,
    /// Whether the catalog/row-store should keep running cost-model
    /// statistics up to date on every mutation.
    pub enable_stats: bool,
}

impl Default for DBConfig {
    fn default() -> Self {
        Self {
            wal_config: WALConfig::default(),
            execution_config: ExecutionConfig::default(),
            replication_config: ReplicationConfig::default(),
            enable_stats: true,
        }
    }
}

impl DBConfig {
    pub fn for_financial() -> Self {
        Self {
            wal_config: WALConfig::for_financial(),
            ..Default::default()
        }
    }

    pub fn for_general() -> Self {
        Self::default()
    }

    pub fn for_testing() -> Self {
        Self {
            wal_config: WALConfig::for_testing(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durability_levels() {
        assert!(DurabilityLevel::Synchronous.requires_immediate_sync());
        assert!(!DurabilityLevel::group_commit().requires_immediate_sync());
        assert!(DurabilityLevel::NoSync.is_no_sync());
    }

    #[test]
    fn config_presets() {
        let financial = DBConfig::for_financial();
        assert!(financial
            .wal_config
            .durability_level
            .requires_immediate_sync());

        let testing = DBConfig::for_testing();
        assert!(testing.wal_config.durability_level.is_no_sync());
    }
}
