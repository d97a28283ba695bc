//! `ItemIndex`: an immutable, sorted, reference-counted set of item ids.
//!
//! Spec.md §3.1 describes this as "backed by the index store" — in this
//! crate it is the common currency between collaborators (§6.2's
//! `IndexStore::at`) and the CQR algebra's per-cell partial-match sets.
//! Cheap to clone (an `Arc<[ItemId]>` behind the scenes) and cheap to
//! combine (merge-style linear passes over the sorted backing slice), the
//! way the teacher favors `Arc`-shared, move-cheap value types for data
//! handed around the query path (`storage.rs`'s `Bytes`, `cqr.rs`'s `Cqr`).

use geocqr_types::ItemId;
use std::sync::Arc;

/// An immutable sorted set of item ids.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemIndex {
    ids: Arc<[ItemId]>,
}

impl ItemIndex {
    /// Build an `ItemIndex` from an arbitrary slice, sorting and
    /// deduplicating it.
    pub fn from_unsorted(mut ids: Vec<ItemId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self { ids: ids.into() }
    }

    /// Build an `ItemIndex` from a slice that is already sorted and
    /// deduplicated. Debug-only assertion checks the precondition.
    pub fn from_sorted(ids: Vec<ItemId>) -> Self {
        debug_assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids must be sorted and unique");
        Self { ids: ids.into() }
    }

    pub fn empty() -> Self {
        Self { ids: Arc::from([]) }
    }

    pub fn single(id: ItemId) -> Self {
        Self { ids: Arc::from([id]) }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.ids.iter().copied()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// `i-th` item id in ascending order, mirroring spec.md §6.2's
    /// `ItemIndex::at`/`size` collaborator contract.
    pub fn at(&self, i: usize) -> Option<ItemId> {
        self.ids.get(i).copied()
    }

    pub fn union(&self, other: &ItemIndex) -> ItemIndex {
        merge_sorted(self.as_slice(), other.as_slice(), |a, b| match (a, b) {
            (Some(x), Some(y)) if x == y => MergeStep::Take(x),
            (Some(x), Some(y)) if x < y => MergeStep::TakeLeft(x),
            (Some(x), Some(_)) => MergeStep::TakeRight(x),
            (Some(x), None) => MergeStep::TakeLeft(x),
            (None, Some(y)) => MergeStep::TakeRight(y),
            (None, None) => unreachable!(),
        })
    }

    pub fn intersection(&self, other: &ItemIndex) -> ItemIndex {
        let mut out = Vec::new();
        let (a, b) = (self.as_slice(), other.as_slice());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        ItemIndex::from_sorted(out)
    }

    pub fn difference(&self, other: &ItemIndex) -> ItemIndex {
        let mut out = Vec::new();
        let (a, b) = (self.as_slice(), other.as_slice());
        let (mut i, mut j) = (0, 0);
        while i < a.len() {
            if j >= b.len() || a[i] < b[j] {
                out.push(a[i]);
                i += 1;
            } else if a[i] == b[j] {
                i += 1;
                j += 1;
            } else {
                j += 1;
            }
        }
        ItemIndex::from_sorted(out)
    }

    pub fn symmetric_difference(&self, other: &ItemIndex) -> ItemIndex {
        self.difference(other).union(&other.difference(self))
    }
}

enum MergeStep {
    Take(ItemId),
    TakeLeft(ItemId),
    TakeRight(ItemId),
}

/// Shared merge-walk used by `union`: advances whichever side produced the
/// lesser id, taking both on a tie. `step` never sees `(None, None)`.
fn merge_sorted(
    a: &[ItemId],
    b: &[ItemId],
    step: impl Fn(Option<ItemId>, Option<ItemId>) -> MergeStep,
) -> ItemIndex {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let left = a.get(i).copied();
        let right = b.get(j).copied();
        match step(left, right) {
            MergeStep::Take(id) => {
                out.push(id);
                i += 1;
                j += 1;
            }
            MergeStep::TakeLeft(id) => {
                out.push(id);
                i += 1;
            }
            MergeStep::TakeRight(id) => {
                out.push(id);
                j += 1;
            }
        }
    }
    ItemIndex::from_sorted(out)
}

impl FromIterator<ItemId> for ItemIndex {
    fn from_iter<T: IntoIterator<Item = ItemId>>(iter: T) -> Self {
        ItemIndex::from_unsorted(iter.into_iter().collect())
    }
}
