//! Cell Query Result: the central value of the algebra (spec.md §3.2, §4.2).
//!
//! `Cqr` is eager: every combinator materialises its result immediately.
//! `TreedCqr` defers combination into a tree of thunks and only
//! materialises on `to_cqr`. Both implement [`ResultShape`], the shared
//! trait spec.md §9 calls "template over result shape" — the calculator in
//! `calculator.rs` is generic over it rather than duplicated per shape, the
//! way the teacher keeps `DistanceMetric` dispatch in `spatial.rs` as one
//! function generic over its metric enum rather than four copies.

use std::sync::Arc;

use geocqr_types::{CellId, ItemIdFlags};
use rayon::prelude::*;

use crate::item_index::ItemIndex;

/// A fully- or partially-matched cell set with consistent item-id flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Cqr {
    fm: Vec<CellId>,
    pm: Vec<(CellId, ItemIndex)>,
    flags: ItemIdFlags,
}

impl Cqr {
    /// An empty result under the given flags.
    pub fn empty(flags: ItemIdFlags) -> Self {
        Self { fm: Vec::new(), pm: Vec::new(), flags }
    }

    /// Build from already-sorted, deduplicated `fm`/`pm` vectors. Debug
    /// assertions check the §3.2 well-formedness invariants.
    pub fn from_parts(fm: Vec<CellId>, pm: Vec<(CellId, ItemIndex)>, flags: ItemIdFlags) -> Self {
        debug_assert!(fm.windows(2).all(|w| w[0] < w[1]), "fm must be sorted and unique");
        debug_assert!(pm.windows(2).all(|w| w[0].0 < w[1].0), "pm must be sorted and unique");
        debug_assert!(pm.iter().all(|(_, idx)| !idx.is_empty()), "pm item-index must be non-empty");
        debug_assert!(
            {
                let mut fm_sorted = fm.clone();
                fm_sorted.sort_unstable();
                pm.iter().all(|(c, _)| fm_sorted.binary_search(c).is_err())
            },
            "fm and pm must be disjoint"
        );
        Self { fm, pm, flags }
    }

    pub fn full(cells: Vec<CellId>, flags: ItemIdFlags) -> Self {
        let mut fm = cells;
        fm.sort_unstable();
        fm.dedup();
        Self { fm, pm: Vec::new(), flags }
    }

    pub fn partial(cells: Vec<(CellId, ItemIndex)>, flags: ItemIdFlags) -> Self {
        let mut pm: Vec<_> = cells.into_iter().filter(|(_, idx)| !idx.is_empty()).collect();
        pm.sort_unstable_by_key(|(c, _)| *c);
        pm.dedup_by_key(|(c, _)| *c);
        Self { fm: Vec::new(), pm, flags }
    }

    pub fn fm(&self) -> &[CellId] {
        &self.fm
    }

    pub fn pm(&self) -> &[(CellId, ItemIndex)] {
        &self.pm
    }

    pub fn flags(&self) -> ItemIdFlags {
        self.flags
    }

    pub fn cell_count(&self) -> usize {
        self.fm.len() + self.pm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fm.is_empty() && self.pm.is_empty()
    }

    pub fn contains_cell(&self, cell: CellId) -> bool {
        self.fm.binary_search(&cell).is_ok() || self.pm.binary_search_by_key(&cell, |(c, _)| *c).is_ok()
    }

    /// All cells, fm first, each tagged with whether it was a full match.
    pub fn cells(&self) -> impl Iterator<Item = (CellId, bool)> + '_ {
        self.fm.iter().map(|&c| (c, true)).chain(self.pm.iter().map(|(c, _)| (*c, false)))
    }

    /// Flatten every partial cell's item-index into one sorted set. Full
    /// cells contribute nothing here — materialising their complete item
    /// list needs an `IndexStore` lookup the pure algebra doesn't hold.
    pub fn partial_items(&self) -> ItemIndex {
        self.pm.iter().fold(ItemIndex::empty(), |acc, (_, idx)| acc.union(idx))
    }

    fn ensure_flags(self, flags: ItemIdFlags) -> Self {
        if self.flags == flags {
            self
        } else {
            self.convert(flags)
        }
    }
}

impl ResultShape for Cqr {
    fn empty(flags: ItemIdFlags) -> Self {
        Cqr::empty(flags)
    }

    fn leaf_fm(cells: Vec<CellId>, flags: ItemIdFlags) -> Self {
        Cqr::full(cells, flags)
    }

    fn leaf_pm(cells: Vec<(CellId, ItemIndex)>, flags: ItemIdFlags) -> Self {
        Cqr::partial(cells, flags)
    }

    fn flags(&self) -> ItemIdFlags {
        self.flags
    }

    /// Union: `fm = fm(a) ∪ fm(b)`; residual partials are per-cell unioned,
    /// with any cell promoted to fm on either side dropped from `pm`.
    fn union(self, other: Self) -> Self {
        let other = other.ensure_flags(self.flags);
        let flags = self.flags;

        let mut fm: Vec<CellId> = self.fm.iter().chain(other.fm.iter()).copied().collect();
        fm.sort_unstable();
        fm.dedup();
        let fm_set = &fm;

        let mut pm: Vec<(CellId, ItemIndex)> = Vec::new();
        let (a, b) = (&self.pm, &other.pm);
        let (mut i, mut j) = (0, 0);
        while i < a.len() || j < b.len() {
            let (cell, items) = match (a.get(i), b.get(j)) {
                (Some((ca, ia)), Some((cb, ib))) if ca == cb => {
                    i += 1;
                    j += 1;
                    (*ca, ia.union(ib))
                }
                (Some((ca, ia)), Some((cb, _))) if ca < cb => {
                    i += 1;
                    (*ca, ia.clone())
                }
                (Some(_), Some((cb, ib))) => {
                    j += 1;
                    (*cb, ib.clone())
                }
                (Some((ca, ia)), None) => {
                    i += 1;
                    (*ca, ia.clone())
                }
                (None, Some((cb, ib))) => {
                    j += 1;
                    (*cb, ib.clone())
                }
                (None, None) => unreachable!(),
            };
            if fm_set.binary_search(&cell).is_err() {
                pm.push((cell, items));
            }
        }
        Cqr::from_parts(fm, pm, flags)
    }

    /// Intersection: `fm = fm(a) ∩ fm(b)`; a cell full on one side and
    /// partial on the other takes the partial side's items; partial on both
    /// sides intersects the two item-indices.
    fn intersection(self, other: Self) -> Self {
        let other = other.ensure_flags(self.flags);
        let flags = self.flags;

        let mut fm_a: Vec<CellId> = self.fm.clone();
        fm_a.sort_unstable();
        let mut fm_b: Vec<CellId> = other.fm.clone();
        fm_b.sort_unstable();

        let fm: Vec<CellId> = fm_a.iter().filter(|c| fm_b.binary_search(c).is_ok()).copied().collect();

        let mut pm: Vec<(CellId, ItemIndex)> = Vec::new();
        for (cell, items) in &self.pm {
            if fm_b.binary_search(cell).is_ok() {
                pm.push((*cell, items.clone()));
            } else if let Ok(idx) = other.pm.binary_search_by_key(cell, |(c, _)| *c) {
                let merged = items.intersection(&other.pm[idx].1);
                if !merged.is_empty() {
                    pm.push((*cell, merged));
                }
            }
        }
        for (cell, items) in &other.pm {
            if fm_a.binary_search(cell).is_ok() && self.pm.binary_search_by_key(cell, |(c, _)| *c).is_err() {
                pm.push((*cell, items.clone()));
            }
        }
        pm.sort_unstable_by_key(|(c, _)| *c);
        Cqr::from_parts(fm, pm, flags)
    }

    /// Difference, item-wise on partial overlap (spec.md §4.2). A fully
    /// matched cell can't be partially subtracted without the cell's
    /// complete item list, which the pure algebra doesn't hold; any
    /// right-hand presence therefore drops it outright rather than
    /// leaving a phantom partial cell.
    fn difference(self, other: Self) -> Self {
        let other = other.ensure_flags(self.flags);
        let flags = self.flags;

        let mut fm_b: Vec<CellId> = other.fm.clone();
        fm_b.sort_unstable();

        let fm: Vec<CellId> = self
            .fm
            .iter()
            .filter(|c| fm_b.binary_search(c).is_err() && other.pm.binary_search_by_key(c, |(x, _)| *x).is_err())
            .copied()
            .collect();

        let mut pm: Vec<(CellId, ItemIndex)> = Vec::new();
        for (cell, items) in &self.pm {
            if fm_b.binary_search(cell).is_ok() {
                continue;
            }
            if let Ok(idx) = other.pm.binary_search_by_key(cell, |(c, _)| *c) {
                let residual = items.difference(&other.pm[idx].1);
                if !residual.is_empty() {
                    pm.push((*cell, residual));
                }
            } else {
                pm.push((*cell, items.clone()));
            }
        }
        Cqr::from_parts(fm, pm, flags)
    }

    fn symmetric_difference(self, other: Self) -> Self {
        let other = other.ensure_flags(self.flags);
        self.clone().difference(other.clone()).union(other.difference(self))
    }

    /// Promotes every partial cell to full, discarding item lists.
    fn all_to_full(self) -> Self {
        let mut fm = self.fm;
        fm.extend(self.pm.into_iter().map(|(c, _)| c));
        fm.sort_unstable();
        fm.dedup();
        Cqr::from_parts(fm, Vec::new(), self.flags)
    }

    /// Relabels the item-id encoding. This engine stores item ids as plain
    /// integers regardless of cell-local vs global provenance, so there is
    /// no bit-pattern to rewrite; only the flags tag changes (see
    /// DESIGN.md's note on the dropped cell-local↔global mapping
    /// collaborator).
    fn convert(self, flags: ItemIdFlags) -> Self {
        Cqr { fm: self.fm, pm: self.pm, flags }
    }

    fn retain_cells(self, keep: &dyn Fn(CellId) -> bool) -> Self {
        let fm = self.fm.into_iter().filter(|&c| keep(c)).collect();
        let pm = self.pm.into_iter().filter(|(c, _)| keep(*c)).collect();
        Cqr { fm, pm, flags: self.flags }
    }

    fn into_cqr(self, _threads: usize) -> Cqr {
        self
    }

    fn of_cqr(cqr: Cqr) -> Self {
        cqr
    }
}

/// Shared algebra both `Cqr` and `TreedCqr` implement (spec.md §9:
/// "template over result shape").
pub trait ResultShape: Sized {
    fn empty(flags: ItemIdFlags) -> Self;
    fn leaf_fm(cells: Vec<CellId>, flags: ItemIdFlags) -> Self;
    fn leaf_pm(cells: Vec<(CellId, ItemIndex)>, flags: ItemIdFlags) -> Self;
    fn flags(&self) -> ItemIdFlags;
    fn union(self, other: Self) -> Self;
    fn intersection(self, other: Self) -> Self;
    fn difference(self, other: Self) -> Self;
    fn symmetric_difference(self, other: Self) -> Self;
    fn all_to_full(self) -> Self;
    fn convert(self, flags: ItemIdFlags) -> Self;

    /// Keep only cells for which `keep` returns true (spec.md §4.5's
    /// `QUERY_EXCLUSIVE_CELLS`). Unlike the rest of the algebra this needs
    /// per-cell introspection the lazy shape can't defer — `TreedCqr`
    /// materialises internally to apply it.
    fn retain_cells(self, keep: &dyn Fn(CellId) -> bool) -> Self;

    /// Bridge to the concrete `Cqr` the csq synthesisers (compass/between/
    /// dilation, all written against `Cqr` directly) need underneath either
    /// result shape.
    fn into_cqr(self, threads: usize) -> Cqr;
    fn of_cqr(cqr: Cqr) -> Self;
}

/// A deferred tree of set operations over base `Cqr`s (spec.md §3.2.1).
/// Combinators build the tree instead of computing; `to_cqr` walks it,
/// merging sibling base leaves in parallel when the tree is wide enough to
/// be worth the thread-pool hand-off.
#[derive(Debug, Clone)]
pub struct TreedCqr {
    node: Arc<TreeNode>,
    flags: ItemIdFlags,
}

#[derive(Debug)]
enum TreeNode {
    Leaf(Cqr),
    Union(Arc<TreeNode>, Arc<TreeNode>),
    Intersection(Arc<TreeNode>, Arc<TreeNode>),
    Difference(Arc<TreeNode>, Arc<TreeNode>),
    SymmetricDifference(Arc<TreeNode>, Arc<TreeNode>),
    AllToFull(Arc<TreeNode>),
    Convert(Arc<TreeNode>, ItemIdFlags),
}

/// Below this many leaves, evaluating sequentially avoids thread-pool
/// overhead that would dwarf the work itself.
const PARALLEL_LEAF_THRESHOLD: usize = 8;

impl TreedCqr {
    pub fn from_cqr(cqr: Cqr) -> Self {
        let flags = cqr.flags();
        Self { node: Arc::new(TreeNode::Leaf(cqr)), flags }
    }

    /// Materialise the deferred tree into a concrete `Cqr`.
    pub fn to_cqr(&self, threads: usize) -> Cqr {
        if self.leaf_count() >= PARALLEL_LEAF_THRESHOLD && threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build();
            match pool {
                Ok(pool) => pool.install(|| Self::eval(&self.node)),
                Err(_) => Self::eval(&self.node),
            }
        } else {
            Self::eval(&self.node)
        }
    }

    fn leaf_count(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf(_) => 1,
                TreeNode::Union(l, r)
                | TreeNode::Intersection(l, r)
                | TreeNode::Difference(l, r)
                | TreeNode::SymmetricDifference(l, r) => count(l) + count(r),
                TreeNode::AllToFull(n) | TreeNode::Convert(n, _) => count(n),
            }
        }
        count(&self.node)
    }

    fn eval(node: &TreeNode) -> Cqr {
        match node {
            TreeNode::Leaf(cqr) => cqr.clone(),
            TreeNode::Union(l, r) => {
                let (a, b) = rayon::join(|| Self::eval(l), || Self::eval(r));
                a.union(b)
            }
            TreeNode::Intersection(l, r) => {
                let (a, b) = rayon::join(|| Self::eval(l), || Self::eval(r));
                a.intersection(b)
            }
            TreeNode::Difference(l, r) => {
                let (a, b) = rayon::join(|| Self::eval(l), || Self::eval(r));
                a.difference(b)
            }
            TreeNode::SymmetricDifference(l, r) => {
                let (a, b) = rayon::join(|| Self::eval(l), || Self::eval(r));
                a.symmetric_difference(b)
            }
            TreeNode::AllToFull(n) => Self::eval(n).all_to_full(),
            TreeNode::Convert(n, flags) => Self::eval(n).convert(*flags),
        }
    }
}

impl ResultShape for TreedCqr {
    fn empty(flags: ItemIdFlags) -> Self {
        TreedCqr::from_cqr(Cqr::empty(flags))
    }

    fn leaf_fm(cells: Vec<CellId>, flags: ItemIdFlags) -> Self {
        TreedCqr::from_cqr(Cqr::leaf_fm(cells, flags))
    }

    fn leaf_pm(cells: Vec<(CellId, ItemIndex)>, flags: ItemIdFlags) -> Self {
        TreedCqr::from_cqr(Cqr::leaf_pm(cells, flags))
    }

    fn flags(&self) -> ItemIdFlags {
        self.flags
    }

    fn union(self, other: Self) -> Self {
        Self { node: Arc::new(TreeNode::Union(self.node, other.node)), flags: self.flags }
    }

    fn intersection(self, other: Self) -> Self {
        Self { node: Arc::new(TreeNode::Intersection(self.node, other.node)), flags: self.flags }
    }

    fn difference(self, other: Self) -> Self {
        Self { node: Arc::new(TreeNode::Difference(self.node, other.node)), flags: self.flags }
    }

    fn symmetric_difference(self, other: Self) -> Self {
        Self { node: Arc::new(TreeNode::SymmetricDifference(self.node, other.node)), flags: self.flags }
    }

    fn all_to_full(self) -> Self {
        Self { node: Arc::new(TreeNode::AllToFull(self.node)), flags: self.flags }
    }

    fn convert(self, flags: ItemIdFlags) -> Self {
        Self { node: Arc::new(TreeNode::Convert(self.node, flags)), flags }
    }

    /// Materialises with a single-threaded evaluation and wraps the
    /// filtered result back up as a leaf — see the trait doc for why this
    /// can't stay lazy.
    fn retain_cells(self, keep: &dyn Fn(CellId) -> bool) -> Self {
        let filtered = Self::eval(&self.node).retain_cells(keep);
        TreedCqr::from_cqr(filtered)
    }

    fn into_cqr(self, threads: usize) -> Cqr {
        TreedCqr::to_cqr(&self, threads)
    }

    fn of_cqr(cqr: Cqr) -> Self {
        TreedCqr::from_cqr(cqr)
    }
}

macro_rules! impl_cqr_operators {
    ($ty:ty) => {
        impl std::ops::Add for $ty {
            type Output = $ty;
            fn add(self, rhs: $ty) -> $ty {
                ResultShape::union(self, rhs)
            }
        }
        impl std::ops::BitAnd for $ty {
            type Output = $ty;
            fn bitand(self, rhs: $ty) -> $ty {
                ResultShape::intersection(self, rhs)
            }
        }
        impl std::ops::Sub for $ty {
            type Output = $ty;
            fn sub(self, rhs: $ty) -> $ty {
                ResultShape::difference(self, rhs)
            }
        }
        impl std::ops::BitXor for $ty {
            type Output = $ty;
            fn bitxor(self, rhs: $ty) -> $ty {
                ResultShape::symmetric_difference(self, rhs)
            }
        }
    };
}

impl_cqr_operators!(Cqr);
impl_cqr_operators!(TreedCqr);

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(id: u32) -> CellId {
        CellId::new(id)
    }

    fn items(ids: &[u32]) -> ItemIndex {
        ItemIndex::from_unsorted(ids.iter().map(|&i| geocqr_types::ItemId::new(i)).collect())
    }

    #[test]
    fn union_promotes_and_merges() {
        let a = Cqr::from_parts(vec![cell(1)], vec![(cell(2), items(&[1, 2]))], ItemIdFlags::default());
        let b = Cqr::from_parts(vec![cell(2)], vec![(cell(3), items(&[5]))], ItemIdFlags::default());
        let u = a.union(b);
        assert_eq!(u.fm(), &[cell(1), cell(2)]);
        assert_eq!(u.pm(), &[(cell(3), items(&[5]))]);
    }

    #[test]
    fn union_with_empty_is_identity() {
        let a = Cqr::from_parts(vec![cell(1)], vec![(cell(2), items(&[1]))], ItemIdFlags::default());
        let u = a.clone().union(Cqr::empty(ItemIdFlags::default()));
        assert_eq!(u, a);
    }

    #[test]
    fn intersection_keeps_partial_side_when_other_is_full() {
        let a = Cqr::from_parts(vec![cell(1)], vec![], ItemIdFlags::default());
        let b = Cqr::from_parts(vec![], vec![(cell(1), items(&[1, 2]))], ItemIdFlags::default());
        let i = a.intersection(b);
        assert!(i.fm().is_empty());
        assert_eq!(i.pm(), &[(cell(1), items(&[1, 2]))]);
    }

    #[test]
    fn intersection_of_two_partials_narrows_items() {
        let a = Cqr::from_parts(vec![], vec![(cell(1), items(&[1, 2, 3]))], ItemIdFlags::default());
        let b = Cqr::from_parts(vec![], vec![(cell(1), items(&[2, 3, 4]))], ItemIdFlags::default());
        let i = a.intersection(b);
        assert_eq!(i.pm(), &[(cell(1), items(&[2, 3]))]);
    }

    #[test]
    fn self_difference_is_empty() {
        let a = Cqr::from_parts(vec![cell(1)], vec![(cell(2), items(&[1]))], ItemIdFlags::default());
        let d = a.clone().difference(a);
        assert!(d.is_empty());
    }

    #[test]
    fn self_symmetric_difference_is_empty() {
        let a = Cqr::from_parts(vec![cell(1)], vec![(cell(2), items(&[1]))], ItemIdFlags::default());
        let d = a.clone().symmetric_difference(a);
        assert!(d.is_empty());
    }

    #[test]
    fn all_to_full_drops_item_lists() {
        let a = Cqr::from_parts(vec![cell(1)], vec![(cell(2), items(&[1, 2]))], ItemIdFlags::default());
        let full = a.all_to_full();
        assert_eq!(full.fm(), &[cell(1), cell(2)]);
        assert!(full.pm().is_empty());
    }

    #[test]
    fn treed_cqr_matches_eager_evaluation() {
        let a = Cqr::from_parts(vec![cell(1)], vec![(cell(2), items(&[1]))], ItemIdFlags::default());
        let b = Cqr::from_parts(vec![cell(3)], vec![], ItemIdFlags::default());
        let eager = a.clone().union(b.clone());

        let lazy = TreedCqr::from_cqr(a).union(TreedCqr::from_cqr(b)).to_cqr(1);
        assert_eq!(eager, lazy);
    }

    #[test]
    fn operator_overloads_match_named_methods() {
        let a = Cqr::from_parts(vec![cell(1)], vec![], ItemIdFlags::default());
        let b = Cqr::from_parts(vec![cell(2)], vec![], ItemIdFlags::default());
        assert_eq!(a.clone() + b.clone(), a.union(b));
    }
}
