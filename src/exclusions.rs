//! Key/key-value exclusion sets (spec.md §4.8), used by the top-k queries
//! in [`crate::stats`] and the facet selection in [`crate::koma`].
//!
//! Grounded on the C++ `liboscar::kvclustering::KeyExclusions` /
//! `KeyValueExclusions`: the former merges added key ids/ranges into a
//! sorted, non-overlapping range list and binary-searches it; the latter is
//! a plain hash set of `(key_id, value_id)` pairs.

use rustc_hash::FxHashSet;

/// A set of key-id ranges `[begin, end)` (spec.md §4.8). Call
/// [`preprocess`](Self::preprocess) after all additions; `contains` before
/// that point may over-report overlaps but never under-reports membership.
#[derive(Debug, Clone, Default)]
pub struct KeyExclusions {
    ranges: Vec<(u32, u32)>,
    sorted: bool,
}

impl KeyExclusions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn exclude_key(&mut self, key_id: u32) {
        self.exclude_range(key_id, key_id + 1);
    }

    pub fn exclude_range(&mut self, begin: u32, end: u32) {
        self.ranges.push((begin, end));
        self.sorted = false;
    }

    /// Sort ranges by `begin` and merge overlaps so `contains` is
    /// `O(log n)` binary search (spec.md §4.8).
    pub fn preprocess(&mut self) {
        if self.ranges.is_empty() {
            self.sorted = true;
            return;
        }
        self.ranges.sort_unstable_by_key(|&(begin, _)| begin);
        let mut merged = Vec::with_capacity(self.ranges.len());
        let mut current = self.ranges[0];
        for &(begin, end) in &self.ranges[1..] {
            if begin <= current.1 {
                current.1 = current.1.max(end);
            } else {
                merged.push(current);
                current = (begin, end);
            }
        }
        merged.push(current);
        self.ranges = merged;
        self.sorted = true;
    }

    pub fn has_exceptions(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// `key_id`'s membership. Call [`preprocess`](Self::preprocess) first
    /// for the `O(log n)` binary-search path; an unprocessed set falls back
    /// to a linear scan.
    pub fn contains(&self, key_id: u32) -> bool {
        if self.sorted {
            self.ranges.binary_search_by(|&(begin, end)| {
                if key_id < begin {
                    std::cmp::Ordering::Greater
                } else if key_id >= end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            }).is_ok()
        } else {
            self.ranges.iter().any(|&(begin, end)| key_id >= begin && key_id < end)
        }
    }

    /// Union with `other` (spec.md §4.8: "both are composable (set
    /// union)"). The result is left unprocessed; call `preprocess` again.
    pub fn merge(mut self, other: Self) -> Self {
        self.ranges.extend(other.ranges);
        self.sorted = false;
        self
    }
}

/// A hash set of `(key_id, value_id)` pairs with `O(1)` `contains` (spec.md
/// §4.8).
#[derive(Debug, Clone, Default)]
pub struct KeyValueExclusions {
    pairs: FxHashSet<(u32, u32)>,
}

impl KeyValueExclusions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn exclude(&mut self, key_id: u32, value_id: u32) {
        self.pairs.insert((key_id, value_id));
    }

    pub fn has_exceptions(&self) -> bool {
        !self.pairs.is_empty()
    }

    pub fn contains(&self, key_id: u32, value_id: u32) -> bool {
        self.pairs.contains(&(key_id, value_id))
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.pairs.extend(other.pairs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_exclusions_merges_overlapping_ranges() {
        let mut ex = KeyExclusions::none();
        ex.exclude_range(1, 5);
        ex.exclude_range(4, 8);
        ex.exclude_range(20, 22);
        ex.preprocess();

        assert!(ex.contains(1));
        assert!(ex.contains(7));
        assert!(!ex.contains(8));
        assert!(ex.contains(20));
        assert!(!ex.contains(22));
        assert!(!ex.contains(10));
    }

    #[test]
    fn key_exclusions_single_key_shorthand() {
        let mut ex = KeyExclusions::none();
        ex.exclude_key(3);
        ex.preprocess();
        assert!(ex.contains(3));
        assert!(!ex.contains(4));
    }

    #[test]
    fn empty_key_exclusions_excludes_nothing() {
        let mut ex = KeyExclusions::none();
        ex.preprocess();
        assert!(!ex.has_exceptions());
        assert!(!ex.contains(0));
    }

    #[test]
    fn key_value_exclusions_are_pairwise() {
        let mut ex = KeyValueExclusions::none();
        ex.exclude(1, 2);
        assert!(ex.contains(1, 2));
        assert!(!ex.contains(1, 3));
        assert!(!ex.contains(2, 2));
    }

    #[test]
    fn key_exclusions_merge_is_union() {
        let mut a = KeyExclusions::none();
        a.exclude_key(1);
        let mut b = KeyExclusions::none();
        b.exclude_key(2);
        let mut merged = a.merge(b);
        merged.preprocess();
        assert!(merged.contains(1));
        assert!(merged.contains(2));
        assert!(!merged.contains(3));
    }
}
