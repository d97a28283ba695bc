//! Query-subject classification (spec.md §4.4.1): decide whether a CQR is
//! best read as a named region or a single standout item.

use geo::{BoundingRect, Distance, Haversine};
use geocqr_types::{ItemId, RegionId};
use rustc_hash::FxHashMap;

use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::cqr::Cqr;
use crate::item_index::ItemIndex;

/// The classification result of §4.4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySubject {
    Region(RegionId),
    Item(ItemId),
}

#[derive(Default, Clone, Copy)]
struct RegionTally {
    fm: u32,
    pm: u32,
}

/// Classify `cqr`'s subject, per spec.md §4.4.1's region/item test.
pub fn classify_subject(cqr: &Cqr, collaborators: &Collaborators, config: &EngineConfig) -> QuerySubject {
    let hierarchy = &collaborators.geo_hierarchy;
    let mut tallies: FxHashMap<RegionId, RegionTally> = FxHashMap::default();

    for (cell, is_full) in cqr.cells() {
        for region in ancestor_regions(cell, collaborators) {
            let tally = tallies.entry(region).or_default();
            if is_full {
                tally.fm += 1;
            } else {
                tally.pm += 1;
            }
        }
    }

    let best = tallies.iter().max_by(|(ra, a), (rb, b)| {
        let rcc_a = hierarchy.region_cell_count(**ra).max(1) as f64;
        let rcc_b = hierarchy.region_cell_count(**rb).max(1) as f64;
        let fm_ratio_a = a.fm as f64 / rcc_a;
        let fm_ratio_b = b.fm as f64 / rcc_b;
        fm_ratio_a
            .partial_cmp(&fm_ratio_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let pm_ratio_a = a.pm as f64 / rcc_a;
                let pm_ratio_b = b.pm as f64 / rcc_b;
                pm_ratio_a.partial_cmp(&pm_ratio_b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| (a.fm + a.pm).cmp(&(b.fm + b.pm)))
            .then_with(|| ra.cmp(rb))
    });

    let Some((&best_region, &tally)) = best else {
        // No cell in the CQR has a parent region at all; fall back to the
        // hierarchy's root, which trivially contains everything.
        return QuerySubject::Region(hierarchy.root_region());
    };

    let region_cell_count = hierarchy.region_cell_count(best_region);
    let items = flattened_items(cqr, collaborators);

    let looks_like_item = tally.fm < region_cell_count
        && tally.fm + tally.pm < config.cell_count_threshold
        && (items.len() as u32) < config.item_count_threshold;

    if looks_like_item {
        if let Some(item) = largest_diagonal_item(&items, collaborators) {
            return QuerySubject::Item(item);
        }
    }
    QuerySubject::Region(best_region)
}

/// Every ancestor region of `cell`: its direct parents and their
/// transitive parents, deduplicated.
fn ancestor_regions(cell: geocqr_types::CellId, collaborators: &Collaborators) -> Vec<RegionId> {
    let hierarchy = &collaborators.geo_hierarchy;
    let mut seen = rustc_hash::FxHashSet::default();
    let mut stack: Vec<RegionId> = hierarchy.cell_parents(cell);
    let mut out = Vec::new();
    while let Some(region) = stack.pop() {
        if !seen.insert(region) {
            continue;
        }
        out.push(region);
        stack.extend(hierarchy.parent_regions(region));
    }
    out
}

fn flattened_items(cqr: &Cqr, collaborators: &Collaborators) -> ItemIndex {
    let mut acc = cqr.partial_items();
    for &cell in cqr.fm() {
        acc = acc.union(&collaborators.index_store.items_in_cell(cell));
    }
    acc
}

/// The item with the largest bounding-box diagonal; points (zero diagonal)
/// break ties arbitrarily, per spec.md §4.4.1.
fn largest_diagonal_item(items: &ItemIndex, collaborators: &Collaborators) -> Option<ItemId> {
    items
        .iter()
        .map(|id| {
            let geometry = collaborators.index_store.item_geometry(id);
            let diagonal = geometry_diagonal(&geometry);
            (id, diagonal)
        })
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id)
}

fn geometry_diagonal(geometry: &geocqr_types::Geometry) -> f64 {
    let bbox = match geometry {
        geocqr_types::Geometry::Point(_) => return 0.0,
        geocqr_types::Geometry::Way(line) => line.bounding_rect(),
        geocqr_types::Geometry::Polygon(poly) => poly.bounding_rect(),
        geocqr_types::Geometry::MultiPolygon(mp) => mp.bounding_rect(),
    };
    match bbox {
        Some(rect) => Haversine.distance(geo::Point::from(rect.min()), geo::Point::from(rect.max())),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryCollaborators;
    use geocqr_types::{CellId, Geometry, ItemIdFlags};

    #[test]
    fn small_cqr_under_thresholds_classifies_as_item() {
        let mut support = InMemoryCollaborators::empty();
        let region = support.add_region(None);
        let cell = support.add_cell(region, (9.0, 48.0, 9.01, 48.01));
        let item = support.add_item(Geometry::Point(geo::Point::new(9.0, 48.0)));
        support.index_item_in_cell(cell, item);

        let cqr = Cqr::partial(vec![(cell, ItemIndex::single(item))], ItemIdFlags::default());
        let subject = classify_subject(&cqr, &support.collaborators(), &EngineConfig::default());
        assert_eq!(subject, QuerySubject::Item(item));
    }

    #[test]
    fn cqr_covering_whole_region_classifies_as_region() {
        let mut support = InMemoryCollaborators::empty();
        let region = support.add_region(None);
        let cell_a = support.add_cell(region, (9.0, 48.0, 9.01, 48.01));
        let cell_b = support.add_cell(region, (9.02, 48.0, 9.03, 48.01));

        let cqr = Cqr::full(vec![cell_a, cell_b], ItemIdFlags::default());
        let subject = classify_subject(&cqr, &support.collaborators(), &EngineConfig::default());
        assert_eq!(subject, QuerySubject::Region(region));
    }
}
