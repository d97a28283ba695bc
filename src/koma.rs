//! KoMa facet clustering (spec.md §4.7, C8): picks a set of "facet parent"
//! key/value pairs that jointly cover the item set without redundant
//! overlap, then lists up to `facet_size` values per parent.
//!
//! Grounded on the C++ `liboscar::KoMaClustering`: its `Worker`/`State`
//! preprocess pass builds a `(key,value) -> Vec<item_id>` map in parallel
//! (mirrored here with rayon fold/reduce, the same shape as
//! [`crate::stats::Stats::build`]); `topKeyValues`'s nested scan for the
//! first near-disjoint pair, then greedy admission against every admitted
//! parent, is reproduced in [`KomaClustering::top_key_values`] with the
//! same early-exit intersection test as `hasIntersection`.

use rustc_hash::FxHashMap;

use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::exclusions::{KeyExclusions, KeyValueExclusions};
use crate::item_index::ItemIndex;

/// A `(key, value)` pair with the number of items it was seen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyValueCount {
    pub key_id: u32,
    pub value_id: u32,
    pub count: u32,
}

/// Preprocessed facet-selection state over an item set (spec.md §4.7).
pub struct KomaClustering {
    item_lists: FxHashMap<(u32, u32), Vec<u32>>,
    by_count_desc: Vec<KeyValueCount>,
    by_key_asc: Vec<KeyValueCount>,
}

impl KomaClustering {
    /// Build the `(key,value) -> item ids` map in parallel and the two
    /// sorted views `topKeyValues`/`findValuesToKey` scan (spec.md §4.7
    /// "Preprocess").
    pub fn preprocess(items: &ItemIndex, collaborators: &Collaborators, config: &EngineConfig) -> Self {
        use rayon::prelude::*;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.default_thread_count.max(1))
            .build()
            .expect("thread pool construction");

        let item_lists: FxHashMap<(u32, u32), Vec<u32>> = pool.install(|| {
            items
                .as_slice()
                .par_chunks(config.kv_stats_block_size.max(1))
                .fold(FxHashMap::default, |mut table: FxHashMap<(u32, u32), Vec<u32>>, block| {
                    for &item in block {
                        for (key, value) in collaborators.index_store.item_key_values(item) {
                            table.entry((key, value)).or_default().push(item.get());
                        }
                    }
                    table
                })
                .reduce(FxHashMap::default, |mut a, b| {
                    for (k, mut v) in b {
                        a.entry(k).or_default().append(&mut v);
                    }
                    a
                })
        });

        let mut item_lists = item_lists;
        for list in item_lists.values_mut() {
            list.sort_unstable();
        }

        let mut by_count_desc: Vec<KeyValueCount> = item_lists
            .iter()
            .map(|(&(key_id, value_id), items)| KeyValueCount { key_id, value_id, count: items.len() as u32 })
            .collect();
        by_count_desc.sort_unstable_by(|a, b| b.count.cmp(&a.count).then((a.key_id, a.value_id).cmp(&(b.key_id, b.value_id))));

        let mut by_key_asc = by_count_desc.clone();
        by_key_asc.sort_unstable_by_key(|kv| (kv.key_id, std::cmp::Reverse(kv.count)));

        Self { item_lists, by_count_desc, by_key_asc }
    }

    fn items_of(&self, key_id: u32, value_id: u32) -> &[u32] {
        self.item_lists.get(&(key_id, value_id)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first near-disjoint seed pair, then every subsequent candidate
    /// near-disjoint from *all* admitted parents, up to `k` (spec.md §4.7
    /// "Top key-value selection").
    pub fn top_key_values(&self, k: usize, key_exclusions: &KeyExclusions, kv_exclusions: &KeyValueExclusions, denominator: f64) -> Vec<KeyValueCount> {
        let admissible = |kv: &KeyValueCount| !key_exclusions.contains(kv.key_id) && !kv_exclusions.contains(kv.key_id, kv.value_id);
        let candidates: Vec<&KeyValueCount> = self.by_count_desc.iter().filter(|kv| admissible(kv)).collect();

        let mut result: Vec<KeyValueCount> = Vec::new();
        let mut seed_index = None;
        'seed: for (i, &candidate_i) in candidates.iter().enumerate() {
            for &candidate_j in &candidates[..i] {
                let bound = (candidate_i.count + candidate_j.count) as f64 / denominator;
                if near_disjoint(self.items_of(candidate_i.key_id, candidate_i.value_id), self.items_of(candidate_j.key_id, candidate_j.value_id), bound) {
                    result.push(*candidate_j);
                    result.push(*candidate_i);
                    seed_index = Some(i);
                    break 'seed;
                }
            }
        }

        let Some(seed_index) = seed_index else {
            return result;
        };

        for &candidate in candidates.iter().skip(seed_index + 1) {
            if result.len() >= k {
                break;
            }
            let mut discarded = false;
            for parent in &result {
                let bound = (parent.count + candidate.count) as f64 / denominator;
                if near_disjoint_fails(self.items_of(candidate.key_id, candidate.value_id), self.items_of(parent.key_id, parent.value_id), bound) {
                    discarded = true;
                    break;
                }
            }
            if !discarded {
                result.push(*candidate);
            }
        }

        result
    }

    /// Up to `facet_size` values for `key_id`, best-count-first, drawn from
    /// the key-sorted contiguous run (spec.md §4.7 "Facets": "Values for a
    /// key are drawn from the key-sorted view in the key's contiguous
    /// run").
    pub fn values_of_key(&self, key_id: u32, facet_size: usize, kv_exclusions: &KeyValueExclusions) -> Vec<(u32, u32)> {
        self.by_key_asc
            .iter()
            .filter(|kv| kv.key_id == key_id && !kv_exclusions.contains(kv.key_id, kv.value_id))
            .take(facet_size)
            .map(|kv| (kv.value_id, kv.count))
            .collect()
    }

    /// Repeatedly selects a top-1 facet-parent key, excludes it, and lists
    /// up to `facet_size` values for it (spec.md §4.7 "Facets"). `key_size`
    /// overrides the default per key; `key_exclusions` is mutated as keys
    /// are chosen, mirroring the C++ original excluding each chosen key
    /// before the next `topKeyValues(1)` call.
    pub fn facets(
        &self,
        k: usize,
        default_facet_size: usize,
        facet_size_by_key: &FxHashMap<u32, usize>,
        key_exclusions: &mut KeyExclusions,
        kv_exclusions: &KeyValueExclusions,
        denominator: f64,
    ) -> Vec<(u32, Vec<(u32, u32)>)> {
        let mut facets = Vec::new();
        let mut chosen_keys = std::collections::HashSet::new();

        for _ in 0..k {
            let top = self.top_key_values(1, key_exclusions, kv_exclusions, denominator);
            let Some(top) = top.first() else {
                break;
            };
            if !chosen_keys.insert(top.key_id) {
                break;
            }
            let facet_size = facet_size_by_key.get(&top.key_id).copied().unwrap_or(default_facet_size);
            let values = self.values_of_key(top.key_id, facet_size, kv_exclusions);
            facets.push((top.key_id, values));
            key_exclusions.exclude_key(top.key_id);
            key_exclusions.preprocess();
        }

        facets
    }
}

/// `true` once more than `bound` common elements have been found between
/// two sorted id lists (early exit, spec.md §4.7's `hasIntersection`
/// bound check).
fn near_disjoint(a: &[u32], b: &[u32], bound: f64) -> bool {
    !near_disjoint_fails(a, b, bound)
}

fn near_disjoint_fails(a: &[u32], b: &[u32], bound: f64) -> bool {
    let (mut i, mut j) = (0, 0);
    let mut intersections = 0u32;
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
                intersections += 1;
                if intersections as f64 > bound {
                    return true;
                }
            }
        }
    }
    false
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
    fn top_key_values_picks_disjoint_parents() {
        let mut support = InMemoryCollaborators::empty();
        // Two fully disjoint groups of 10 items each, tagged with distinct keys.
        let mut items = Vec::new();
        for _ in 0..10 {
            let item = point_item(&mut support);
            support.tag_item(item, 1, 100);
            items.push(item);
        }
        for _ in 0..10 {
            let item = point_item(&mut support);
            support.tag_item(item, 2, 200);
            items.push(item);
        }

        let collaborators = support.collaborators();
        let config = EngineConfig::default();
        let index = ItemIndex::from_unsorted(items);
        let koma = KomaClustering::preprocess(&index, &collaborators, &config);

        let top = koma.top_key_values(2, &KeyExclusions::none(), &KeyValueExclusions::none(), config.koma_near_disjoint_denominator);
        assert_eq!(top.len(), 2);
        let keys: std::collections::HashSet<u32> = top.iter().map(|kv| kv.key_id).collect();
        assert_eq!(keys, [1u32, 2u32].into_iter().collect());
    }

    #[test]
    fn overlapping_parents_are_rejected() {
        let mut support = InMemoryCollaborators::empty();
        // key=1 and key=2 co-occur on every item: never near-disjoint.
        let mut items = Vec::new();
        for _ in 0..20 {
            let item = point_item(&mut support);
            support.tag_item(item, 1, 100);
            support.tag_item(item, 2, 200);
            items.push(item);
        }

        let collaborators = support.collaborators();
        let config = EngineConfig::default();
        let index = ItemIndex::from_unsorted(items);
        let koma = KomaClustering::preprocess(&index, &collaborators, &config);

        let top = koma.top_key_values(2, &KeyExclusions::none(), &KeyValueExclusions::none(), config.koma_near_disjoint_denominator);
        assert!(top.is_empty());
    }

    #[test]
    fn facets_excludes_chosen_keys_between_rounds() {
        let mut support = InMemoryCollaborators::empty();
        let mut items = Vec::new();
        for _ in 0..10 {
            let item = point_item(&mut support);
            support.tag_item(item, 1, 100);
            items.push(item);
        }
        for _ in 0..10 {
            let item = point_item(&mut support);
            support.tag_item(item, 2, 200);
            items.push(item);
        }

        let collaborators = support.collaborators();
        let config = EngineConfig::default();
        let index = ItemIndex::from_unsorted(items);
        let koma = KomaClustering::preprocess(&index, &collaborators, &config);

        let mut key_exclusions = KeyExclusions::none();
        key_exclusions.preprocess();
        let facets = koma.facets(2, 5, &FxHashMap::default(), &mut key_exclusions, &KeyValueExclusions::none(), config.koma_near_disjoint_denominator);

        let keys: Vec<u32> = facets.iter().map(|(k, _)| *k).collect();
        assert!(keys.contains(&1));
        assert!(keys.len() <= 2);
    }
}
