//! `BETWEEN` polygon synthesis (spec.md §4.4.2).

use geo::{ConvexHull, LineString, MultiPoint, Point, Polygon};
use geocqr_types::Geometry;

use crate::collaborators::Collaborators;
use crate::csq::subject::QuerySubject;
use crate::cqr::{Cqr, ResultShape};
use crate::resolver::{rect_to_polygon, resolve_polygon, Accuracy};

/// Synthesise the connector polygon between two subjects and resolve it,
/// subtracting the source regions' own cells when both sides are regions
/// (spec.md §4.4.2: "the two source regions are excluded from the result").
pub fn between(
    a: &QuerySubject,
    b: &QuerySubject,
    radius_m: f64,
    accuracy: Accuracy,
    collaborators: &Collaborators,
) -> Cqr {
    let polygon = synthesize_between(a, b, radius_m, collaborators);
    let mut result = resolve_polygon(&polygon, accuracy, collaborators);

    if let (QuerySubject::Region(ra), QuerySubject::Region(rb)) = (a, b) {
        let hierarchy = &collaborators.geo_hierarchy;
        let mut excluded = Vec::new();
        excluded.extend(hierarchy.region_cells(*ra).iter().copied());
        excluded.extend(hierarchy.region_cells(*rb).iter().copied());
        result = result.difference(Cqr::full(excluded, result.flags()));
    }

    result
}

fn synthesize_between(a: &QuerySubject, b: &QuerySubject, radius_m: f64, collaborators: &Collaborators) -> Polygon<f64> {
    match (a, b) {
        (QuerySubject::Item(item_a), QuerySubject::Item(item_b)) => {
            let geo_a = collaborators.index_store.item_geometry(*item_a);
            let geo_b = collaborators.index_store.item_geometry(*item_b);
            between_geometries(&geo_a, &geo_b, radius_m)
        }
        (QuerySubject::Item(item), QuerySubject::Region(region)) => {
            let geo_a = collaborators.index_store.item_geometry(*item);
            rectangular_connector(&geometry_points(&geo_a), &region_corner_points(*region, collaborators))
        }
        (QuerySubject::Region(region), QuerySubject::Item(item)) => {
            let geo_b = collaborators.index_store.item_geometry(*item);
            rectangular_connector(&region_corner_points(*region, collaborators), &geometry_points(&geo_b))
        }
        (QuerySubject::Region(ra), QuerySubject::Region(rb)) => {
            rectangular_connector(&region_corner_points(*ra, collaborators), &region_corner_points(*rb, collaborators))
        }
    }
}

fn between_geometries(a: &Geometry, b: &Geometry, radius_m: f64) -> Polygon<f64> {
    match (a, b) {
        (Geometry::Point(pa), Geometry::Point(pb)) => diamond_between_points(*pa, *pb, radius_m),
        _ => rectangular_connector(&geometry_points(a), &geometry_points(b)),
    }
}

/// A 4-vertex diamond through `p1`/`p2` with the cross-axis displaced
/// `radius_m` either side of the midpoint (spec.md §8's "synthesised
/// diamond polygon" scenario).
fn diamond_between_points(p1: Point<f64>, p2: Point<f64>, radius_m: f64) -> Polygon<f64> {
    const METERS_PER_DEGREE_LAT: f64 = 111_320.0;
    let mid = Point::new((p1.x() + p2.x()) / 2.0, (p1.y() + p2.y()) / 2.0);

    let dx = p2.x() - p1.x();
    let dy = p2.y() - p1.y();
    let len = (dx * dx + dy * dy).sqrt().max(1e-12);
    let (perp_x, perp_y) = (-dy / len, dx / len);

    let lon_scale = mid.y().to_radians().cos().max(1e-6);
    let lat_delta = radius_m / METERS_PER_DEGREE_LAT;
    let lon_delta = radius_m / (METERS_PER_DEGREE_LAT * lon_scale);

    let side_a = Point::new(mid.x() + perp_x * lon_delta, mid.y() + perp_y * lat_delta);
    let side_b = Point::new(mid.x() - perp_x * lon_delta, mid.y() - perp_y * lat_delta);

    Polygon::new(
        LineString::from(vec![
            (p1.x(), p1.y()),
            (side_a.x(), side_a.y()),
            (p2.x(), p2.y()),
            (side_b.x(), side_b.y()),
            (p1.x(), p1.y()),
        ]),
        vec![],
    )
}

/// Convex hull of both sides' corner/vertex sets (spec.md §4.4.2's
/// "rectangular connector"). Equivalent to the bearing-octant branch table
/// spec.md lists, since for any relative placement of two convex shapes the
/// hull of their combined corners traces the same tangent edges that table
/// would hand-pick by octant.
fn rectangular_connector(points_a: &[Point<f64>], points_b: &[Point<f64>]) -> Polygon<f64> {
    let mut all = Vec::with_capacity(points_a.len() + points_b.len());
    all.extend_from_slice(points_a);
    all.extend_from_slice(points_b);
    MultiPoint::new(all).convex_hull()
}

fn geometry_points(geometry: &Geometry) -> Vec<Point<f64>> {
    match geometry {
        Geometry::Point(p) => vec![*p],
        Geometry::Way(line) => line.points().collect(),
        Geometry::Polygon(poly) => poly.exterior().points().collect(),
        Geometry::MultiPolygon(mp) => mp.0.iter().flat_map(|p| p.exterior().points()).collect(),
    }
}

fn region_corner_points(region: geocqr_types::RegionId, collaborators: &Collaborators) -> Vec<Point<f64>> {
    let hierarchy = &collaborators.geo_hierarchy;
    let bbox = hierarchy
        .region_cells(region)
        .iter()
        .map(|&cell| hierarchy.cell_boundary(cell))
        .reduce(|a, b| {
            geo::Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        });
    match bbox {
        Some(rect) => rect_to_polygon(rect).exterior().points().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diamond_between_points_has_four_vertices() {
        let p1 = Point::new(9.0, 48.0);
        let p2 = Point::new(9.01, 48.01);
        let diamond = diamond_between_points(p1, p2, 500.0);
        assert_eq!(diamond.exterior().0.len(), 5);
    }

    #[test]
    fn diamond_is_centered_on_midpoint() {
        let p1 = Point::new(9.0, 48.0);
        let p2 = Point::new(9.02, 48.0);
        let diamond = diamond_between_points(p1, p2, 500.0);
        let xs: Vec<f64> = diamond.exterior().points().map(|p| p.x()).collect();
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        assert!((mean - 9.01).abs() < 0.01);
    }

    #[test]
    fn rectangular_connector_hull_contains_all_inputs() {
        use geo::Contains;
        let a = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0), Point::new(0.0, 1.0)];
        let b = vec![Point::new(5.0, 5.0), Point::new(6.0, 5.0), Point::new(6.0, 6.0), Point::new(5.0, 6.0)];
        let hull = rectangular_connector(&a, &b);
        for p in a.iter().chain(b.iter()) {
            assert!(hull.contains(p) || hull.exterior().points().any(|q| q == *p));
        }
    }
}
