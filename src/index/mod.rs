//! Secondary indexes (spec.md §4.4): a shared ordered-index contract with
//! two implementations — B-tree and skip-list — plus a registry mapping
//! index name to descriptor and live handle.

pub mod btree;
pub mod registry;
pub mod skiplist;

pub use btree::BTreeIndex;
pub use registry::{IndexDescriptor, IndexRegistry};
pub use skiplist::SkipListIndex;

use crate::error::Result;
use crate::types::{IndexShape, RowId, Value};

/// Contract shared by every ordered secondary index implementation.
/// Indexes map a `Value` key to the set of row ids holding that key
/// (composite keys are a `Vec<Value>` so multi-column indexes share the
/// same trait without a second type).
pub trait OrderedIndex: Send + Sync {
    /// Insert `row_id` under `key`. Keys are not required to be unique;
    /// the same key may map to many row ids.
    fn insert(&self, key: Vec<Value>, row_id: RowId) -> Result<()>;

    /// Remove exactly the `(key, row_id)` pair. A no-op if the pair isn't
    /// present.
    fn remove(&self, key: &[Value], row_id: RowId) -> Result<()>;

    /// Exact-match lookup, returning every row id stored under `key`.
    fn get(&self, key: &[Value]) -> Result<Vec<RowId>>;

    /// Inclusive range scan in key order. `None` on either bound means
    /// unbounded in that direction.
    fn range(&self, low: Option<&[Value]>, high: Option<&[Value]>) -> Result<Vec<(Vec<Value>, RowId)>>;

    /// Number of (key, row id) pairs currently stored.
    fn count(&self) -> usize;

    /// Drop all entries, leaving an empty index in place.
    fn clear(&self);

    fn shape(&self) -> IndexShape;
}
