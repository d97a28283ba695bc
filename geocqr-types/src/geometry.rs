//! Item geometry: the shape kinds a map feature can carry.

use geo::{LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

/// The geometry owned by a single item.
///
/// Mirrors spec.md §3.1: "owns a geometry of kind {point, way, polygon,
/// multipolygon}".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point<f64>),
    Way(LineString<f64>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    /// A representative point for geometries that need a single anchor
    /// (compass cone apex, between-operator centroid, ...).
    pub fn representative_point(&self) -> Point<f64> {
        use geo::algorithm::centroid::Centroid;
        match self {
            Geometry::Point(p) => *p,
            Geometry::Way(line) => line
                .points()
                .next()
                .unwrap_or_else(|| Point::new(0.0, 0.0)),
            Geometry::Polygon(poly) => poly.centroid().unwrap_or_else(|| Point::new(0.0, 0.0)),
            Geometry::MultiPolygon(mp) => mp.centroid().unwrap_or_else(|| Point::new(0.0, 0.0)),
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Geometry::Point(_))
    }

    pub fn is_areal(&self) -> bool {
        matches!(self, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
    }
}
