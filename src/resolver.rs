//! Polygon-to-CQR resolver (spec.md §4.3).
//!
//! Walks the region DAG breadth-first from the root, pruning by bounding-box
//! overlap before falling back to exact intersection tests, the way the
//! teacher's `spatial_index.rs` pre-filters by bbox before a precise
//! haversine distance check in `query_within_radius_2d`.

use std::collections::VecDeque;
use std::sync::Arc;

use geo::{BoundingRect, Contains, Distance, Haversine, Intersects, Length, Point, Polygon, Rect};
use geocqr_types::{CellId, ItemIdFlags, RegionId};
use rustc_hash::FxHashSet;

use crate::collaborators::Collaborators;
use crate::cqr::{Cqr, ResultShape};
use crate::item_index::ItemIndex;

/// Resolver precision vs. speed trade-off (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    /// Per-item exact intersection test.
    PolygonItem,
    /// Per-item bbox test.
    PolygonItemBbox,
    /// Per-cell bbox test (cell treated as a rectangle).
    PolygonCell,
    /// Same as `PolygonCell` — kept distinct because spec.md lists both
    /// names (§4.3), though both route through the cell-bbox predicate.
    PolygonCellBbox,
    /// Polygon approximated by its own bbox, then cell-bbox test.
    PolygonBboxCellBbox,
    /// Chosen automatically from the polygon's length/diagonal ratio.
    Auto,
}

const AUTO_ITEM_THRESHOLD_M: f64 = 1_000.0;
const AUTO_ITEM_BBOX_THRESHOLD_M: f64 = 2_000.0;
const AUTO_CELL_BBOX_THRESHOLD_M: f64 = 250_000.0;

/// Resolves `AC_AUTO` to a concrete accuracy from the polygon's perimeter
/// length and bbox diagonal (spec.md §4.3).
fn resolve_auto_accuracy(polygon: &Polygon<f64>) -> Accuracy {
    let length = Haversine.length(polygon.exterior());
    let bbox = polygon.bounding_rect().expect("polygon has at least one point");
    let diagonal = Haversine.distance(Point::from(bbox.min()), Point::from(bbox.max()));

    let threshold = if diagonal > 0.0 && length > 20.0 * diagonal {
        length / 20.0
    } else {
        diagonal
    };

    if threshold < AUTO_ITEM_THRESHOLD_M {
        Accuracy::PolygonItem
    } else if threshold < AUTO_ITEM_BBOX_THRESHOLD_M {
        Accuracy::PolygonItemBbox
    } else if threshold < AUTO_CELL_BBOX_THRESHOLD_M {
        Accuracy::PolygonCellBbox
    } else {
        Accuracy::PolygonBboxCellBbox
    }
}

/// Resolve a closed polygon to a `Cqr` at the requested accuracy.
pub fn resolve_polygon(polygon: &Polygon<f64>, accuracy: Accuracy, collaborators: &Collaborators) -> Cqr {
    let accuracy = match accuracy {
        Accuracy::Auto => resolve_auto_accuracy(polygon),
        other => other,
    };

    let test_polygon = match accuracy {
        Accuracy::PolygonBboxCellBbox => {
            let bbox = polygon.bounding_rect().expect("polygon has at least one point");
            rect_to_polygon(bbox)
        }
        _ => polygon.clone(),
    };

    let candidates = visit(&test_polygon, collaborators);
    classify_candidates(&test_polygon, candidates, accuracy, collaborators)
}

/// A cell that either fully matched during BFS descent (its region was
/// entirely enclosed) or needs a per-cell/per-item check.
enum Candidate {
    Enclosed(CellId),
    Unresolved(CellId),
}

/// BFS over the region DAG (spec.md §4.3's `visit` helper), returning every
/// candidate cell the polygon might touch.
fn visit(polygon: &Polygon<f64>, collaborators: &Collaborators) -> Vec<Candidate> {
    let polygon_bbox = polygon.bounding_rect().expect("polygon has at least one point");
    let hierarchy = &collaborators.geo_hierarchy;

    let mut queue: VecDeque<RegionId> = VecDeque::new();
    let mut visited: FxHashSet<RegionId> = FxHashSet::default();
    let mut candidates = Vec::new();

    let root = hierarchy.root_region();
    visited.insert(root);
    queue.push_back(root);

    while let Some(region) = queue.pop_front() {
        let boundary = hierarchy.region_boundary(region);
        let enclosed = boundary.as_ref().is_some_and(|b| polygon.contains(b));

        if enclosed {
            for &cell in hierarchy.region_cells(region).iter() {
                candidates.push(Candidate::Enclosed(cell));
            }
            continue;
        }

        for &cell in hierarchy.region_exclusive_cells(region).iter() {
            candidates.push(Candidate::Unresolved(cell));
        }

        for child in hierarchy.child_regions(region) {
            if visited.contains(&child) {
                continue;
            }
            let child_boundary = match hierarchy.region_boundary(child) {
                Some(b) => b,
                None => continue,
            };
            let child_bbox = match child_boundary.bounding_rect() {
                Some(b) => b,
                None => continue,
            };
            if rects_overlap(child_bbox, polygon_bbox) && child_boundary.intersects(polygon) {
                visited.insert(child);
                queue.push_back(child);
            }
        }
    }

    candidates
}

fn classify_candidates(
    polygon: &Polygon<f64>,
    candidates: Vec<Candidate>,
    accuracy: Accuracy,
    collaborators: &Collaborators,
) -> Cqr {
    let mut fm = Vec::new();
    let mut pm = Vec::new();

    for candidate in candidates {
        let cell = match candidate {
            Candidate::Enclosed(cell) => {
                fm.push(cell);
                continue;
            }
            Candidate::Unresolved(cell) => cell,
        };

        let cell_bbox = collaborators.geo_hierarchy.cell_boundary(cell);
        if polygon.contains(&rect_to_polygon(cell_bbox)) {
            fm.push(cell);
            continue;
        }
        if !polygon.intersects(&rect_to_polygon(cell_bbox)) {
            continue;
        }
        if matches!(accuracy, Accuracy::PolygonCell | Accuracy::PolygonCellBbox | Accuracy::PolygonBboxCellBbox) {
            // Cell-bbox-sufficient accuracies stop at the bbox test: any
            // overlap without full containment is a partial match with
            // every item in the cell (no item-level refinement).
            let items = collaborators.index_store.items_in_cell(cell);
            if !items.is_empty() {
                pm.push((cell, items));
            }
            continue;
        }

        let items = collaborators.index_store.items_in_cell(cell);
        let total = items.len();
        let mut matched = Vec::with_capacity(total);
        for item_id in items.iter() {
            if item_matches(polygon, item_id, accuracy, collaborators) {
                matched.push(item_id);
            }
        }
        if matched.len() == total && total > 0 {
            fm.push(cell);
        } else if !matched.is_empty() {
            pm.push((cell, matched.into_iter().collect::<ItemIndex>()));
        }
    }

    Cqr::full(fm, ItemIdFlags::default()).union(Cqr::partial(pm, ItemIdFlags::default()))
}

fn item_matches(
    polygon: &Polygon<f64>,
    item_id: geocqr_types::ItemId,
    accuracy: Accuracy,
    collaborators: &Collaborators,
) -> bool {
    let geometry = collaborators.index_store.item_geometry(item_id);
    match accuracy {
        Accuracy::PolygonItemBbox => match geometry_bbox(&geometry) {
            Some(bbox) => polygon.intersects(&rect_to_polygon(bbox)),
            None => false,
        },
        _ => match &geometry {
            geocqr_types::Geometry::Point(p) => polygon.contains(p),
            geocqr_types::Geometry::Way(line) => polygon.intersects(line),
            geocqr_types::Geometry::Polygon(poly) => polygon.intersects(poly),
            geocqr_types::Geometry::MultiPolygon(mp) => polygon.intersects(mp),
        },
    }
}

/// Point+radius resolution (spec.md §4.3). `radius <= 0` looks up the
/// containing cell by triangulation and tests every item in it for
/// (multi)polygon containment — Point and Way items never match a bare
/// point query, the way `CQRFromPolygon::cqr(GeoPoint, radius, ...)` only
/// ever considers `GS_POLYGON`/`GS_MULTI_POLYGON` geometries; otherwise a
/// bbox around the point is resolved like any other polygon.
pub fn resolve_point_radius(
    point: Point<f64>,
    radius_m: f64,
    accuracy: Accuracy,
    collaborators: &Collaborators,
) -> Cqr {
    if radius_m <= 0.0 {
        let cell = collaborators.triangulation.cell_id(point);
        if cell.is_null() {
            return Cqr::empty(ItemIdFlags::default());
        }
        let items = collaborators.index_store.items_in_cell(cell);
        let matched: ItemIndex = items
            .iter()
            .filter(|&item| item_polygon_contains_point(point, item, collaborators))
            .collect();
        if matched.is_empty() {
            return Cqr::empty(ItemIdFlags::default());
        }
        return Cqr::partial(vec![(cell, matched)], ItemIdFlags::default());
    }

    let bbox = bbox_around_point(point, radius_m);
    resolve_polygon(&rect_to_polygon(bbox), accuracy, collaborators)
}

/// `true` only for a polygon/multipolygon item whose geometry actually
/// contains `point`; Point and Way items are never a match (spec.md §4.3).
fn item_polygon_contains_point(point: Point<f64>, item_id: geocqr_types::ItemId, collaborators: &Collaborators) -> bool {
    match collaborators.index_store.item_geometry(item_id) {
        geocqr_types::Geometry::Polygon(poly) => poly.contains(&point),
        geocqr_types::Geometry::MultiPolygon(mp) => mp.contains(&point),
        geocqr_types::Geometry::Point(_) | geocqr_types::Geometry::Way(_) => false,
    }
}

fn bbox_around_point(point: Point<f64>, radius_m: f64) -> Rect<f64> {
    const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
    let lat_delta = radius_m / METERS_PER_DEGREE_LAT;
    let lon_scale = (point.y().to_radians().cos()).max(1e-6);
    let lon_delta = radius_m / (METERS_PER_DEGREE_LAT * lon_scale);
    Rect::new(
        (point.x() - lon_delta, point.y() - lat_delta),
        (point.x() + lon_delta, point.y() + lat_delta),
    )
}

fn geometry_bbox(geometry: &geocqr_types::Geometry) -> Option<Rect<f64>> {
    match geometry {
        geocqr_types::Geometry::Point(p) => Some(Rect::new((p.x(), p.y()), (p.x(), p.y()))),
        geocqr_types::Geometry::Way(line) => line.bounding_rect(),
        geocqr_types::Geometry::Polygon(poly) => poly.bounding_rect(),
        geocqr_types::Geometry::MultiPolygon(mp) => mp.bounding_rect(),
    }
}

pub(crate) fn rect_to_polygon(rect: Rect<f64>) -> Polygon<f64> {
    use geo::LineString;
    let (min, max) = (rect.min(), rect.max());
    Polygon::new(
        LineString::from(vec![
            (min.x, min.y),
            (max.x, min.y),
            (max.x, max.y),
            (min.x, max.y),
            (min.x, min.y),
        ]),
        vec![],
    )
}

fn rects_overlap(a: Rect<f64>, b: Rect<f64>) -> bool {
    a.min().x <= b.max().x && a.max().x >= b.min().x && a.min().y <= b.max().y && a.max().y >= b.min().y
}
