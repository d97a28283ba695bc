//! Key/value statistics (spec.md §3.4, §4.6, C7): multi-threaded aggregation
//! of `(key_id, value_id) -> count` over an item set, and top-k queries over
//! the result.
//!
//! Grounded on the teacher's rayon-based fan-out style (`spatial_index.rs`'s
//! parallel bulk-load) generalized to the aggregation-with-merge pattern the
//! original C++ `KVStats`/`Data::merge` describes: workers accumulate into
//! thread-local tables and fold pairwise into one sorted vector, so the
//! final `Stats` is independent of how many threads produced it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::exclusions::{KeyExclusions, KeyValueExclusions};
use crate::item_index::ItemIndex;

/// A single value under a key, with its occurrence count (spec.md §3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueInfo {
    pub value_id: u32,
    pub count: u32,
}

/// A key and the values it was seen paired with (spec.md §3.4). `values` is
/// this key's contiguous run inside [`Stats`]'s flat value pool; `count` is
/// the sum over `values[*].count`.
#[derive(Debug, Clone)]
pub struct KeyInfo {
    pub key_id: u32,
    pub count: u32,
    values_start: usize,
    values_len: usize,
}

impl KeyInfo {
    fn values<'a>(&self, pool: &'a [ValueInfo]) -> &'a [ValueInfo] {
        &pool[self.values_start..self.values_start + self.values_len]
    }
}

/// Aggregated `(key, value) -> count` statistics over an item set (spec.md
/// §3.4's `Stats { value_pool, key_pool, key_index }`).
#[derive(Debug, Clone, Default)]
pub struct Stats {
    key_pool: Vec<KeyInfo>,
    value_pool: Vec<ValueInfo>,
    key_index: FxHashMap<u32, usize>,
}

impl Stats {
    /// Aggregate key/value tag counts over `items`, fanning work out across
    /// `threads` rayon workers (spec.md §4.6's "workers consume item blocks
    /// ... accumulating counts in a thread-local hash-like table").
    pub fn build(items: &ItemIndex, collaborators: &Collaborators, config: &EngineConfig) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads_for(config))
            .build()
            .expect("thread pool construction");

        // Thread-local tables that outgrow `kv_stats_flush_threshold` are
        // pushed onto this shared stack, pairwise-merging with whatever is
        // already on top, so no single table keeps growing unbounded for
        // the lifetime of a fold (spec.md §4.6).
        let reducer_stack: parking_lot::Mutex<Vec<FxHashMap<(u32, u32), u32>>> = parking_lot::Mutex::new(Vec::new());

        let merged = pool.install(|| {
            items
                .as_slice()
                .par_chunks(config.kv_stats_block_size.max(1))
                .fold(FxHashMap::default, |mut table, block| {
                    for &item in block {
                        for (key, value) in collaborators.index_store.item_key_values(item) {
                            *table.entry((key, value)).or_insert(0) += 1;
                        }
                        if table.len() >= config.kv_stats_flush_threshold {
                            let mut stack = reducer_stack.lock();
                            let top = stack.pop().unwrap_or_default();
                            stack.push(merge_tables(std::mem::take(&mut table), top));
                        }
                    }
                    table
                })
                .reduce(FxHashMap::default, merge_tables)
        });

        let merged = reducer_stack
            .into_inner()
            .into_iter()
            .fold(merged, merge_tables);

        let mut sorted: Vec<((u32, u32), u32)> = merged.into_iter().collect();
        sorted.sort_unstable_by_key(|&((k, v), _)| (k, v));

        Self::from_sorted_pairs(sorted)
    }

    fn from_sorted_pairs(sorted: Vec<((u32, u32), u32)>) -> Self {
        let mut key_pool = Vec::new();
        let mut value_pool = Vec::with_capacity(sorted.len());
        let mut key_index = FxHashMap::default();

        let mut iter = sorted.into_iter().peekable();
        while let Some(&((key_id, _), _)) = iter.peek() {
            let values_start = value_pool.len();
            let mut count = 0u32;
            while let Some(&((k, value_id), c)) = iter.peek() {
                if k != key_id {
                    break;
                }
                value_pool.push(ValueInfo { value_id, count: c });
                count += c;
                iter.next();
            }
            key_index.insert(key_id, key_pool.len());
            key_pool.push(KeyInfo { key_id, count, values_start, values_len: value_pool.len() - values_start });
        }

        Self { key_pool, value_pool, key_index }
    }

    pub fn key_info(&self, key_id: u32) -> Option<&KeyInfo> {
        self.key_index.get(&key_id).map(|&i| &self.key_pool[i])
    }

    pub fn values_of(&self, key_id: u32) -> &[ValueInfo] {
        self.key_info(key_id).map(|k| k.values(&self.value_pool)).unwrap_or(&[])
    }

    pub fn keys(&self) -> &[KeyInfo] {
        &self.key_pool
    }

    /// Top-`k` keys by `cmp` (best first), skipping excluded keys (spec.md
    /// §4.6's `topk_keys`): a size-`k` min-heap ordered by the inverse of
    /// `cmp`, filled with the first `k` admissible keys, then each
    /// remaining admissible key pushed-then-popped.
    pub fn topk_keys(&self, k: usize, cmp: impl Fn(&KeyInfo, &KeyInfo) -> std::cmp::Ordering, exclude: &KeyExclusions) -> Vec<KeyInfo> {
        bounded_topk(self.key_pool.iter().filter(|k| !exclude.contains(k.key_id)), k, cmp)
    }

    /// Top-`k` `(key, value)` pairs by `cmp`, skipping excluded keys and
    /// key/value pairs (spec.md §4.6's `topk_keyvalues`).
    pub fn topk_keyvalues(
        &self,
        k: usize,
        cmp: impl Fn(&(u32, ValueInfo), &(u32, ValueInfo)) -> std::cmp::Ordering,
        exclude_key: &KeyExclusions,
        exclude_kv: &KeyValueExclusions,
    ) -> Vec<(u32, ValueInfo)> {
        let candidates = self.key_pool.iter().filter(|k| !exclude_key.contains(k.key_id)).flat_map(|key| {
            key.values(&self.value_pool)
                .iter()
                .filter(move |v| !exclude_kv.contains(key.key_id, v.value_id))
                .map(move |v| (key.key_id, *v))
        });
        bounded_topk(candidates, k, cmp)
    }

    /// Top-`k` values of a single key by `cmp` (spec.md §4.6's
    /// `topk_values_of_key`).
    pub fn topk_values_of_key(
        &self,
        key_id: u32,
        k: usize,
        cmp: impl Fn(&ValueInfo, &ValueInfo) -> std::cmp::Ordering,
        exclude: &KeyValueExclusions,
    ) -> Vec<ValueInfo> {
        let candidates = self.values_of(key_id).iter().filter(|v| !exclude.contains(key_id, v.value_id)).copied();
        bounded_topk(candidates, k, cmp)
    }
}

fn threads_for(config: &EngineConfig) -> usize {
    config.default_thread_count.max(1)
}

fn merge_tables(a: FxHashMap<(u32, u32), u32>, b: FxHashMap<(u32, u32), u32>) -> FxHashMap<(u32, u32), u32> {
    let (mut larger, smaller) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    for (k, v) in smaller {
        *larger.entry(k).or_insert(0) += v;
    }
    larger
}

/// Bounded size-`k` min-heap top-k, shared by all three `topk_*` variants
/// (spec.md §4.6: "O(N log k) time, O(k) auxiliary memory").
fn bounded_topk<T>(items: impl Iterator<Item = T>, k: usize, cmp: impl Fn(&T, &T) -> std::cmp::Ordering) -> Vec<T> {
    struct ByCmp<'a, T, F: Fn(&T, &T) -> std::cmp::Ordering> {
        item: T,
        cmp: &'a F,
    }
    impl<T, F: Fn(&T, &T) -> std::cmp::Ordering> PartialEq for ByCmp<'_, T, F> {
        fn eq(&self, other: &Self) -> bool {
            (self.cmp)(&self.item, &other.item) == std::cmp::Ordering::Equal
        }
    }
    impl<T, F: Fn(&T, &T) -> std::cmp::Ordering> Eq for ByCmp<'_, T, F> {}
    impl<T, F: Fn(&T, &T) -> std::cmp::Ordering> PartialOrd for ByCmp<'_, T, F> {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl<T, F: Fn(&T, &T) -> std::cmp::Ordering> Ord for ByCmp<'_, T, F> {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            (self.cmp)(&self.item, &other.item)
        }
    }

    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<ByCmp<T, _>>> = BinaryHeap::with_capacity(k);
    for item in items {
        let wrapped = ByCmp { item, cmp: &cmp };
        if heap.len() < k {
            heap.push(Reverse(wrapped));
        } else if let Some(Reverse(worst)) = heap.peek() {
            if cmp(&wrapped.item, &worst.item) == std::cmp::Ordering::Greater {
                heap.pop();
                heap.push(Reverse(wrapped));
            }
        }
    }

    let mut out: Vec<T> = heap.into_iter().map(|Reverse(w)| w.item).collect();
    out.sort_by(|a, b| cmp(b, a));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryCollaborators;
    use geocqr_types::{Geometry, ItemId};

    fn point_item(support: &mut InMemoryCollaborators) -> ItemId {
        support.add_item(Geometry::Point(geo::Point::new(0.0, 0.0)))
    }

    #[test]
    fn stats_counts_key_value_pairs_across_items() {
        let mut support = InMemoryCollaborators::empty();
        let a = point_item(&mut support);
        let b = point_item(&mut support);
        let c = point_item(&mut support);
        support.tag_item(a, 1, 10);
        support.tag_item(b, 1, 10);
        support.tag_item(c, 1, 20);

        let collaborators = support.collaborators();
        let config = EngineConfig::default();
        let items = ItemIndex::from_unsorted(vec![a, b, c]);
        let stats = Stats::build(&items, &collaborators, &config);

        let key = stats.key_info(1).expect("key present");
        assert_eq!(key.count, 3);
        assert_eq!(stats.values_of(1).len(), 2);
        let v10 = stats.values_of(1).iter().find(|v| v.value_id == 10).unwrap();
        assert_eq!(v10.count, 2);
    }

    #[test]
    fn stats_is_independent_of_thread_count() {
        let mut support = InMemoryCollaborators::empty();
        let items: Vec<ItemId> = (0..50)
            .map(|i| {
                let item = point_item(&mut support);
                support.tag_item(item, i % 3, i % 5);
                item
            })
            .collect();

        let collaborators = support.collaborators();
        let index = ItemIndex::from_unsorted(items);

        let mut one_thread = EngineConfig::default();
        one_thread.default_thread_count = 1;
        let mut many_threads = EngineConfig::default();
        many_threads.default_thread_count = 8;
        many_threads.kv_stats_block_size = 3;

        let a = Stats::build(&index, &collaborators, &one_thread);
        let b = Stats::build(&index, &collaborators, &many_threads);

        for key in a.keys() {
            let other = b.key_info(key.key_id).expect("same key present");
            assert_eq!(other.count, key.count);
            assert_eq!(a.values_of(key.key_id).len(), b.values_of(key.key_id).len());
        }
    }

    #[test]
    fn topk_keys_returns_best_first() {
        let mut support = InMemoryCollaborators::empty();
        let items: Vec<ItemId> = (0..6)
            .map(|i| {
                let item = point_item(&mut support);
                // key i appears (i+1) times across distinct items.
                for _ in 0..=i {
                    let extra = point_item(&mut support);
                    support.tag_item(extra, i, 0);
                }
                support.tag_item(item, i, 0);
                item
            })
            .collect();

        let collaborators = support.collaborators();
        let config = EngineConfig::default();
        let index = ItemIndex::from_unsorted(items);
        let stats = Stats::build(&index, &collaborators, &config);

        let top2 = stats.topk_keys(2, |a, b| a.count.cmp(&b.count), &KeyExclusions::none());
        assert_eq!(top2.len(), 2);
        assert!(top2[0].count >= top2[1].count);
        assert_eq!(top2[0].key_id, 5);
    }

    #[test]
    fn topk_keys_honours_exclusions() {
        let mut support = InMemoryCollaborators::empty();
        let a = point_item(&mut support);
        let b = point_item(&mut support);
        support.tag_item(a, 1, 0);
        support.tag_item(b, 2, 0);
        support.tag_item(b, 2, 0);

        let collaborators = support.collaborators();
        let config = EngineConfig::default();
        let index = ItemIndex::from_unsorted(vec![a, b]);
        let stats = Stats::build(&index, &collaborators, &config);

        let mut exclusions = KeyExclusions::none();
        exclusions.exclude_key(2);
        exclusions.preprocess();

        let top = stats.topk_keys(5, |a, b| a.count.cmp(&b.count), &exclusions);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].key_id, 1);
    }

    #[test]
    fn topk_values_of_key_orders_by_count() {
        let mut support = InMemoryCollaborators::empty();
        let items: Vec<ItemId> = (0..5)
            .map(|_| point_item(&mut support))
            .collect();
        support.tag_item(items[0], 7, 100);
        support.tag_item(items[1], 7, 200);
        support.tag_item(items[2], 7, 200);
        support.tag_item(items[3], 7, 300);
        support.tag_item(items[4], 7, 300);

        let collaborators = support.collaborators();
        let config = EngineConfig::default();
        let index = ItemIndex::from_unsorted(items);
        let stats = Stats::build(&index, &collaborators, &config);

        let top = stats.topk_values_of_key(7, 2, |a, b| a.count.cmp(&b.count), &KeyValueExclusions::none());
        assert_eq!(top.len(), 2);
        assert!(top[0].count >= top[1].count);
        assert_eq!(top[0].count, 2);
    }
}
