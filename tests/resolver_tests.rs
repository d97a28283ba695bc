//! Integration coverage for the polygon/point-radius resolver over a small
//! in-memory region/cell fixture, complementing the unit tests inside
//! `src/resolver.rs`.

use geo::Point;
use geocqr::resolver::{resolve_point_radius, resolve_polygon, Accuracy};
use geocqr::test_support::InMemoryCollaborators;
use geocqr::Geometry;

fn square(min: (f64, f64), max: (f64, f64)) -> geo::Polygon<f64> {
    use geo::LineString;
    geo::Polygon::new(
        LineString::from(vec![(min.0, min.1), (max.0, min.1), (max.0, max.1), (min.0, max.1), (min.0, min.1)]),
        vec![],
    )
}

#[test]
fn polygon_enclosing_a_region_boundary_fully_matches_its_cells() {
    let mut support = InMemoryCollaborators::empty();
    let child = support.add_region(None);
    support.set_region_boundary(child, square((0.0, 0.0), (10.0, 10.0)));
    let cell = support.add_cell(child, (1.0, 1.0, 2.0, 2.0));

    let collaborators = support.collaborators();
    let query = square((-1.0, -1.0), (11.0, 11.0));
    let result = resolve_polygon(&query, Accuracy::PolygonCellBbox, &collaborators);

    assert_eq!(result.fm(), &[cell]);
    assert!(result.pm().is_empty());
}

#[test]
fn cell_fully_contained_in_the_polygon_is_a_full_match() {
    let mut support = InMemoryCollaborators::empty();
    let root = support.root();
    let cell = support.add_cell(root, (1.0, 1.0, 2.0, 2.0));

    let collaborators = support.collaborators();
    let query = square((0.0, 0.0), (5.0, 5.0));
    let result = resolve_polygon(&query, Accuracy::PolygonCellBbox, &collaborators);

    assert_eq!(result.fm(), &[cell]);
}

#[test]
fn cell_bbox_accuracies_stop_at_bbox_overlap_and_keep_every_item() {
    let mut support = InMemoryCollaborators::empty();
    let root = support.root();
    let cell = support.add_cell(root, (0.0, 0.0, 10.0, 10.0));
    let item_a = support.add_item(Geometry::Point(Point::new(1.0, 1.0)));
    let item_b = support.add_item(Geometry::Point(Point::new(9.0, 9.0)));
    support.index_item_in_cell(cell, item_a);
    support.index_item_in_cell(cell, item_b);

    let collaborators = support.collaborators();
    // Only overlaps the lower-left corner of the cell, doesn't contain it.
    let query = square((-1.0, -1.0), (5.0, 5.0));
    let result = resolve_polygon(&query, Accuracy::PolygonCellBbox, &collaborators);

    assert!(result.fm().is_empty());
    assert_eq!(result.pm().len(), 1);
    let (matched_cell, items) = &result.pm()[0];
    assert_eq!(*matched_cell, cell);
    assert_eq!(items.len(), 2);
}

#[test]
fn polygon_item_accuracy_refines_down_to_matching_geometries() {
    let mut support = InMemoryCollaborators::empty();
    let root = support.root();
    let cell = support.add_cell(root, (0.0, 0.0, 10.0, 10.0));
    let inside = support.add_item(Geometry::Point(Point::new(1.0, 1.0)));
    let outside = support.add_item(Geometry::Point(Point::new(9.0, 9.0)));
    support.index_item_in_cell(cell, inside);
    support.index_item_in_cell(cell, outside);

    let collaborators = support.collaborators();
    let query = square((-1.0, -1.0), (5.0, 5.0));
    let result = resolve_polygon(&query, Accuracy::PolygonItem, &collaborators);

    assert!(result.fm().is_empty());
    assert_eq!(result.pm().len(), 1);
    let (matched_cell, items) = &result.pm()[0];
    assert_eq!(*matched_cell, cell);
    assert_eq!(items.as_slice(), &[inside]);
}

#[test]
fn polygon_item_accuracy_promotes_to_full_match_when_every_item_matches() {
    let mut support = InMemoryCollaborators::empty();
    let root = support.root();
    let cell = support.add_cell(root, (0.0, 0.0, 10.0, 10.0));
    let item = support.add_item(Geometry::Point(Point::new(1.0, 1.0)));
    support.index_item_in_cell(cell, item);

    let collaborators = support.collaborators();
    let query = square((-1.0, -1.0), (5.0, 5.0));
    let result = resolve_polygon(&query, Accuracy::PolygonItem, &collaborators);

    assert_eq!(result.fm(), &[cell]);
    assert!(result.pm().is_empty());
}

#[test]
fn non_overlapping_cell_is_excluded_entirely() {
    let mut support = InMemoryCollaborators::empty();
    let root = support.root();
    let cell = support.add_cell(root, (100.0, 100.0, 101.0, 101.0));
    let item = support.add_item(Geometry::Point(Point::new(100.5, 100.5)));
    support.index_item_in_cell(cell, item);

    let collaborators = support.collaborators();
    let query = square((0.0, 0.0), (1.0, 1.0));
    let result = resolve_polygon(&query, Accuracy::PolygonCellBbox, &collaborators);

    assert!(result.fm().is_empty());
    assert!(result.pm().is_empty());
}

#[test]
fn zero_radius_point_query_ignores_point_geometry_items() {
    // A bare point+radius query only ever tests polygon/multipolygon items
    // for containment; a Point-geometry item in the same cell never
    // matches, however close it sits to the query point.
    let mut support = InMemoryCollaborators::empty();
    let root = support.root();
    let cell = support.add_cell(root, (0.0, 0.0, 1.0, 1.0));
    let item = support.add_item(Geometry::Point(Point::new(0.5, 0.5)));
    support.index_item_in_cell(cell, item);

    let collaborators = support.collaborators();
    let result = resolve_point_radius(Point::new(0.5, 0.5), 0.0, Accuracy::Auto, &collaborators);

    assert!(result.pm().is_empty());
    assert!(result.fm().is_empty());
}

#[test]
fn zero_radius_point_query_resolves_through_triangulation() {
    let mut support = InMemoryCollaborators::empty();
    let root = support.root();
    let cell = support.add_cell(root, (0.0, 0.0, 1.0, 1.0));
    let polygon_item = support.add_item(Geometry::Polygon(square((0.2, 0.2), (0.8, 0.8))));
    support.index_item_in_cell(cell, polygon_item);
    // A bystander Point item in the same cell must not leak into the match set.
    let bystander = support.add_item(Geometry::Point(Point::new(0.5, 0.5)));
    support.index_item_in_cell(cell, bystander);

    let collaborators = support.collaborators();
    let result = resolve_point_radius(Point::new(0.5, 0.5), 0.0, Accuracy::Auto, &collaborators);

    assert_eq!(result.pm(), &[(cell, geocqr::item_index::ItemIndex::from_unsorted(vec![polygon_item]))]);
    assert!(result.fm().is_empty());
}

#[test]
fn zero_radius_point_outside_any_cell_is_empty() {
    let support = InMemoryCollaborators::empty();
    let collaborators = support.collaborators();
    let result = resolve_point_radius(Point::new(50.0, 50.0), 0.0, Accuracy::Auto, &collaborators);
    assert!(result.fm().is_empty());
    assert!(result.pm().is_empty());
}

#[test]
fn positive_radius_point_query_resolves_like_a_bbox_polygon() {
    let mut support = InMemoryCollaborators::empty();
    let root = support.root();
    let cell = support.add_cell(root, (8.998, 47.999, 9.002, 48.001));

    let collaborators = support.collaborators();
    let result = resolve_point_radius(Point::new(9.0, 48.0), 200.0, Accuracy::PolygonCellBbox, &collaborators);

    assert_eq!(result.fm(), &[cell]);
}
