//! B-tree ordered index (spec.md §4.4).
//!
//! The teacher crate's B-tree (`index::diskann`'s sibling structures) is a
//! page-oriented, `memmap2`-backed on-disk tree sized for nearest-neighbor
//! workloads. This spec's B-tree only needs to support an ordered
//! multi-map from composite key to row id, so it collapses to an
//! in-memory `BTreeMap<Vec<Value>, Vec<RowId>>` guarded by the same
//! `parking_lot::RwLock` idiom the teacher uses everywhere else for
//! shared structures — the page layout and mmap machinery buy nothing
//! here since nothing in this spec asks for a tree larger than memory.

use crate::error::Result;
use crate::index::OrderedIndex;
use crate::types::{IndexShape, RowId, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

pub struct BTreeIndex {
    map: RwLock<BTreeMap<Vec<Value>, Vec<RowId>>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedIndex for BTreeIndex {
    fn insert(&self, key: Vec<Value>, row_id: RowId) -> Result<()> {
        let mut map = self.map.write();
        let bucket = map.entry(key).or_insert_with(Vec::new);
        if !bucket.contains(&row_id) {
            bucket.push(row_id);
        }
        Ok(())
    }

    fn remove(&self, key: &[Value], row_id: RowId) -> Result<()> {
        let mut map = self.map.write();
        if let Some(bucket) = map.get_mut(key) {
            bucket.retain(|id| *id != row_id);
            if bucket.is_empty() {
                map.remove(key);
            }
        }
        Ok(())
    }

    fn get(&self, key: &[Value]) -> Result<Vec<RowId>> {
        Ok(self.map.read().get(key).cloned().unwrap_or_default())
    }

    fn range(&self, low: Option<&[Value]>, high: Option<&[Value]>) -> Result<Vec<(Vec<Value>, RowId)>> {
        let map = self.map.read();
        let lower = match low {
            Some(k) => Bound::Included(k.to_vec()),
            None => Bound::Unbounded,
        };
        let upper = match high {
            Some(k) => Bound::Included(k.to_vec()),
            None => Bound::Unbounded,
        };
        let mut out = Vec::new();
        for (key, ids) in map.range((lower, upper)) {
            for id in ids {
                out.push((key.clone(), *id));
            }
        }
        Ok(out)
    }

    fn count(&self) -> usize {
        self.map.read().values().map(|b| b.len()).sum()
    }

    fn clear(&self) {
        self.map.write().clear();
    }

    fn shape(&self) -> IndexShape {
        IndexShape::BTree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(i: i64) -> Vec<Value> {
        vec![Value::Integer(i)]
    }

    fn rid(i: i64) -> RowId {
        RowId(i as u64)
    }

    #[test]
    fn insert_get_remove() {
        let idx = BTreeIndex::new();
        idx.insert(k(1), rid(10)).unwrap();
        idx.insert(k(1), rid(11)).unwrap();
        assert_eq!(idx.get(&k(1)).unwrap(), vec![rid(10), rid(11)]);
        idx.remove(&k(1), rid(10)).unwrap();
        assert_eq!(idx.get(&k(1)).unwrap(), vec![rid(11)]);
    }

    #[test]
    fn range_scan_is_ordered() {
        let idx = BTreeIndex::new();
        for i in [5, 1, 3, 2, 4] {
            idx.insert(k(i), rid(i)).unwrap();
        }
        let got: Vec<_> = idx
            .range(Some(&k(2)), Some(&k(4)))
            .unwrap()
            .into_iter()
            .map(|(key, _)| key[0].clone())
            .collect();
        assert_eq!(got, vec![Value::Integer(2), Value::Integer(3), Value::Integer(4)]);
    }

    #[test]
    fn count_and_clear() {
        let idx = BTreeIndex::new();
        idx.insert(k(1), rid(1)).unwrap();
        idx.insert(k(2), rid(2)).unwrap();
        assert_eq!(idx.count(), 2);
        idx.clear();
        assert_eq!(idx.count(), 0);
    }

    use proptest::prelude::*;
    use std::collections::HashSet;

    /// spec.md §8 I2: an index's live `(key, rid)` set must always equal
    /// whatever a sequence of `insert`/`remove` calls would produce against
    /// a plain in-memory model, for any interleaving of the two.
    fn apply_ops_and_collect(ops: &[(bool, i64, u64)]) -> (HashSet<(i64, u64)>, HashSet<(i64, u64)>) {
        let idx = BTreeIndex::new();
        let mut model: HashSet<(i64, u64)> = HashSet::new();
        for &(is_insert, key, row) in ops {
            if is_insert {
                idx.insert(k(key), rid(row as i64)).unwrap();
                model.insert((key, row));
            } else {
                idx.remove(&k(key), rid(row as i64)).unwrap();
                model.remove(&(key, row));
            }
        }
        let got: HashSet<(i64, u64)> = idx
            .range(None, None)
            .unwrap()
            .into_iter()
            .map(|(key, row)| match key[0] {
                Value::Integer(n) => (n, row.0),
                _ => unreachable!(),
            })
            .collect();
        (got, model)
    }

    proptest! {
        #[test]
        fn matches_model_under_random_insert_remove(
            ops in prop::collection::vec((any::<bool>(), 0i64..8, 0u64..8), 0..200)
        ) {
            let (got, model) = apply_ops_and_collect(&ops);
            prop_assert_eq!(got, model);
        }

        /// spec.md §8 R3: insert then delete of the same row id leaves no
        /// trace of it, and two distinct row ids under the same key both
        /// survive independently.
        #[test]
        fn r3_insert_delete_and_distinct_row_ids(key in 0i64..50, a in 0u64..1000, b in 0u64..1000) {
            prop_assume!(a != b);
            let idx = BTreeIndex::new();
            idx.insert(k(key), rid(a as i64)).unwrap();
            idx.remove(&k(key), rid(a as i64)).unwrap();
            prop_assert!(!idx.get(&k(key)).unwrap().contains(&rid(a as i64)));

            idx.insert(k(key), rid(a as i64)).unwrap();
            idx.insert(k(key), rid(b as i64)).unwrap();
            let got = idx.get(&k(key)).unwrap();
            prop_assert!(got.contains(&rid(a as i64)));
            prop_assert!(got.contains(&rid(b as i64)));
            prop_assert_eq!(got.len(), 2);
        }
    }
}
