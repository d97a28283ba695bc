//! Compass-direction polygon synthesis (spec.md §4.4.2).

use geo::{BoundingRect, ConvexHull, LineString, MultiPoint, Point, Polygon, Rect};
use geocqr_types::Geometry;

use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::csq::subject::QuerySubject;

/// The four cardinal directions spec.md §3.3/§4.4.2 names for `COMPASS`
/// (named forms like `:north-of` are remapped to these by the tokenizer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// Bearing in degrees clockwise from north.
    fn bearing_degrees(self) -> f64 {
        match self {
            Direction::North => 0.0,
            Direction::East => 90.0,
            Direction::South => 180.0,
            Direction::West => 270.0,
        }
    }

    fn unit_vector(self) -> (f64, f64) {
        let rad = self.bearing_degrees().to_radians();
        (rad.sin(), rad.cos())
    }
}

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Offsets `origin` by `distance_m` metres toward `bearing_deg` (clockwise
/// from north), using a flat-earth approximation local to `origin`'s
/// latitude. Accurate enough at the sub-kilometre scale these constructions
/// operate at.
fn offset_point(origin: Point<f64>, bearing_deg: f64, distance_m: f64) -> Point<f64> {
    let rad = bearing_deg.to_radians();
    let lon_scale = origin.y().to_radians().cos().max(1e-6);
    let dlat = distance_m * rad.cos() / METERS_PER_DEGREE_LAT;
    let dlon = distance_m * rad.sin() / (METERS_PER_DEGREE_LAT * lon_scale);
    normalize_lonlat(Point::new(origin.x() + dlon, origin.y() + dlat))
}

/// Wraps longitude into `[-180, 180]` and clamps latitude into `[-90, 90]`
/// (spec.md §4.4.2).
pub fn normalize_lonlat(point: Point<f64>) -> Point<f64> {
    let mut lon = point.x() % 360.0;
    if lon > 180.0 {
        lon -= 360.0;
    } else if lon < -180.0 {
        lon += 360.0;
    }
    let lat = point.y().clamp(-90.0, 90.0);
    Point::new(lon, lat)
}

/// Build the compass polygon for `subject` looking toward `direction`.
pub fn synthesize_compass(
    subject: &QuerySubject,
    direction: Direction,
    collaborators: &Collaborators,
    config: &EngineConfig,
) -> Polygon<f64> {
    match subject {
        QuerySubject::Item(item) => {
            let geometry = collaborators.index_store.item_geometry(*item);
            compass_for_item(&geometry, direction, config)
        }
        QuerySubject::Region(region) => {
            let bbox = region_bbox(*region, collaborators);
            compass_for_region(bbox, direction, config)
        }
    }
}

fn compass_for_item(geometry: &Geometry, direction: Direction, config: &EngineConfig) -> Polygon<f64> {
    match geometry {
        Geometry::Point(p) => compass_triangle(*p, direction, config.compass_point_leg_meters, config.compass_opening_degrees),
        Geometry::Way(line) => compass_hull(line.points().collect(), direction, config),
        Geometry::Polygon(poly) => compass_hull(poly.exterior().points().collect(), direction, config),
        Geometry::MultiPolygon(mp) => {
            let points = mp.0.iter().flat_map(|p| p.exterior().points()).collect();
            compass_hull(points, direction, config)
        }
    }
}

/// A 90°(by default, `compass_opening_degrees`)-opening triangle anchored at
/// `origin`, `leg_m` long, pointing toward `direction` (spec.md §4.4.2).
fn compass_triangle(origin: Point<f64>, direction: Direction, leg_m: f64, opening_degrees: f64) -> Polygon<f64> {
    let bearing = direction.bearing_degrees();
    let a = offset_point(origin, bearing - opening_degrees / 2.0, leg_m);
    let b = offset_point(origin, bearing + opening_degrees / 2.0, leg_m);
    Polygon::new(
        LineString::from(vec![(origin.x(), origin.y()), (a.x(), a.y()), (b.x(), b.y()), (origin.x(), origin.y())]),
        vec![],
    )
}

/// Convex hull of `points` plus an extremal point offset toward `direction`
/// (spec.md §4.4.2's way/polygon case).
fn compass_hull(points: Vec<Point<f64>>, direction: Direction, config: &EngineConfig) -> Polygon<f64> {
    let (ux, uy) = direction.unit_vector();
    let extremal = points
        .iter()
        .copied()
        .max_by(|a, b| (a.x() * ux + a.y() * uy).partial_cmp(&(b.x() * ux + b.y() * uy)).unwrap())
        .unwrap_or_else(|| Point::new(0.0, 0.0));
    let apex = offset_point(extremal, direction.bearing_degrees(), config.compass_point_leg_meters);

    let mut all = points;
    all.push(apex);
    MultiPoint::new(all).convex_hull()
}

fn compass_for_region(bbox: Rect<f64>, direction: Direction, config: &EngineConfig) -> Polygon<f64> {
    let diagonal_m = geo::Distance::distance(geo::Haversine, Point::from(bbox.min()), Point::from(bbox.max()));
    let scale = config.compass_in_direction_scale(diagonal_m);
    let ortho_scale = config.compass_ortho_scale;

    let (min, max) = (bbox.min(), bbox.max());
    let width = max.x - min.x;
    let height = max.y - min.y;

    let (near_a, near_b, extension, flare, axis_is_vertical) = match direction {
        Direction::North => ((min.x, max.y), (max.x, max.y), height * scale, width * ortho_scale, true),
        Direction::South => ((min.x, min.y), (max.x, min.y), height * scale, width * ortho_scale, true),
        Direction::East => ((max.x, min.y), (max.x, max.y), width * scale, height * ortho_scale, false),
        Direction::West => ((min.x, min.y), (min.x, max.y), width * scale, height * ortho_scale, false),
    };

    let sign = match direction {
        Direction::North | Direction::East => 1.0,
        Direction::South | Direction::West => -1.0,
    };

    let (far_a, far_b) = if axis_is_vertical {
        ((near_a.0 - flare / 2.0, near_a.1 + sign * extension), (near_b.0 + flare / 2.0, near_b.1 + sign * extension))
    } else {
        ((near_a.0 + sign * extension, near_a.1 - flare / 2.0), (near_b.0 + sign * extension, near_b.1 + flare / 2.0))
    };

    let ring = vec![near_a, near_b, far_b, far_a, near_a];
    let points: Vec<_> = ring.into_iter().map(|(x, y)| normalize_lonlat(Point::new(x, y))).collect();
    Polygon::new(LineString::from(points.into_iter().map(|p| (p.x(), p.y())).collect::<Vec<_>>()), vec![])
}

fn region_bbox(region: geocqr_types::RegionId, collaborators: &Collaborators) -> Rect<f64> {
    let hierarchy = &collaborators.geo_hierarchy;
    hierarchy
        .region_cells(region)
        .iter()
        .map(|&cell| hierarchy.cell_boundary(cell))
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
        .unwrap_or_else(|| Rect::new((0.0, 0.0), (0.0, 0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_point_moves_north_increases_latitude() {
        let origin = Point::new(9.0, 48.0);
        let moved = offset_point(origin, 0.0, 1000.0);
        assert!(moved.y() > origin.y());
        assert!((moved.x() - origin.x()).abs() < 1e-6);
    }

    #[test]
    fn compass_triangle_has_three_distinct_vertices() {
        let origin = Point::new(9.0, 48.0);
        let config = EngineConfig::default();
        let triangle = compass_triangle(origin, Direction::North, config.compass_point_leg_meters, config.compass_opening_degrees);
        assert_eq!(triangle.exterior().0.len(), 4);
    }

    #[test]
    fn normalize_lonlat_wraps_longitude() {
        let p = normalize_lonlat(Point::new(190.0, 100.0));
        assert!(p.x() >= -180.0 && p.x() <= 180.0);
        assert!(p.y() >= -90.0 && p.y() <= 90.0);
    }

    #[test]
    fn region_compass_strip_extends_in_direction() {
        let bbox = Rect::new((9.0, 48.0), (9.01, 48.01));
        let config = EngineConfig::default();
        let strip = compass_for_region(bbox, Direction::North, &config);
        let strip_bbox = strip.bounding_rect().unwrap();
        assert!(strip_bbox.max().y > bbox.max().y);
    }
}
