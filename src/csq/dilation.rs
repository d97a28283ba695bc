//! Region- and cell-dilation operators (spec.md §4.4.3, §4.4.4).

use geocqr_types::RegionId;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::collaborators::Collaborators;
use crate::cqr::{Cqr, ResultShape};

#[derive(Default, Clone, Copy)]
struct Coverage {
    matched_cells: u32,
    matched_items: u32,
}

/// Per-ancestor-region tallies of matched cells/items, shared by both
/// dilation flavours below.
fn region_coverage(cqr: &Cqr, collaborators: &Collaborators) -> FxHashMap<RegionId, Coverage> {
    let hierarchy = &collaborators.geo_hierarchy;
    let mut coverage: FxHashMap<RegionId, Coverage> = FxHashMap::default();

    for (cell, _) in cqr.cells() {
        let item_count = collaborators.index_store.items_in_cell(cell).len() as u32;
        let mut seen = FxHashSet::default();
        let mut stack = hierarchy.cell_parents(cell);
        while let Some(region) = stack.pop() {
            if !seen.insert(region) {
                continue;
            }
            let entry = coverage.entry(region).or_default();
            entry.matched_cells += 1;
            entry.matched_items += item_count;
            stack.extend(hierarchy.parent_regions(region));
        }
    }
    coverage
}

/// Dilate `cqr` by including every ancestor region whose fraction of
/// matched cells exceeds `threshold` (spec.md §4.4.3's "by cell coverage").
pub fn dilate_by_cell_coverage(cqr: &Cqr, threshold: f64, collaborators: &Collaborators) -> Cqr {
    let hierarchy = &collaborators.geo_hierarchy;
    let coverage = region_coverage(cqr, collaborators);

    let mut fm = Vec::new();
    for (&region, tally) in &coverage {
        let region_cell_count = hierarchy.region_cell_count(region).max(1) as f64;
        if tally.matched_cells as f64 / region_cell_count > threshold {
            fm.extend(hierarchy.region_cells(region).iter().copied());
        }
    }
    cqr.clone().union(Cqr::full(fm, cqr.flags()))
}

/// Dilate `cqr` by including every ancestor region whose item-weighted
/// coverage exceeds `threshold` (spec.md §4.4.3's "by item coverage"; may
/// over-count items shared across cells, acceptable by design).
pub fn dilate_by_item_coverage(cqr: &Cqr, threshold: f64, collaborators: &Collaborators) -> Cqr {
    let hierarchy = &collaborators.geo_hierarchy;
    let coverage = region_coverage(cqr, collaborators);

    let mut fm = Vec::new();
    for (&region, tally) in &coverage {
        let region_item_count = hierarchy.region_item_count(region).max(1) as f64;
        if tally.matched_items as f64 / region_item_count > threshold {
            fm.extend(hierarchy.region_cells(region).iter().copied());
        }
    }
    cqr.clone().union(Cqr::full(fm, cqr.flags()))
}

/// `%N%`: dilate `cqr` by `distance_m` metres via the external
/// `CQRDilator`, merging the extra cells back as fm with the flags masked
/// to the cell-item-id portion (spec.md §4.4.4).
pub fn cell_dilate(cqr: &Cqr, distance_m: f64, threads: usize, collaborators: &Collaborators) -> Cqr {
    let extra = collaborators.dilator.dilate(cqr, distance_m, threads);
    let masked_flags = cqr.flags().cell_local_only();
    cqr.clone().convert(masked_flags).union(Cqr::full(extra, masked_flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryCollaborators;
    use geocqr_types::ItemIdFlags;

    #[test]
    fn cell_coverage_dilation_includes_fully_covered_region() {
        let mut support = InMemoryCollaborators::empty();
        let region = support.add_region(None);
        let cell_a = support.add_cell(region, (0.0, 0.0, 1.0, 1.0));

        let cqr = Cqr::full(vec![cell_a], ItemIdFlags::default());
        let collaborators = support.collaborators();
        let dilated = dilate_by_cell_coverage(&cqr, 0.5, &collaborators);
        assert_eq!(dilated.fm(), &[cell_a]);
    }
}
