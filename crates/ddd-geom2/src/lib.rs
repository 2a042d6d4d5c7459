#![warn(missing_docs)]

//! Planar geometry algebra for ddd.
//!
//! Operations work on [`geo::Geometry`] values and return new geometries or
//! [`ddd_mesh::TriMesh`] values:
//!
//! - [`ops`]: buffer, union, intersection, difference, clean,
//!   individualize, simplify
//! - [`triangulate()`]: polygon to flat mesh on z = 0
//! - [`extrude`]: prisms, ribbons and ring-to-ring extrusion steps
//! - [`sweep`]: profile sweeps along 3D polylines
//!
//! Empty results are reported as `None` rather than as empty geometries.

pub mod extrude;
pub mod ops;
pub mod sweep;
mod triangulate;

use geo::{
    Area, BoundingRect, Centroid, ConvexHull, Coord, Geometry, GeometryCollection, LineString,
    MultiLineString, MultiPoint, MultiPolygon, Point, Polygon, Rect,
};
use thiserror::Error;

pub use triangulate::triangulate;

/// Errors from planar geometry operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeomError {
    /// Geometry is empty, degenerate or self-intersecting beyond repair.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// A buffer or boolean operation produced unusable output.
    #[error("topology operation failed: {0}")]
    Topology(String),
    /// Triangulation did not cover the polygon.
    #[error("triangulation failed: {0}")]
    Triangulation(String),
    /// Sweep path could not be sampled.
    #[error(transparent)]
    Path(#[from] ddd_path::PathError),
}

/// Short name of a geometry variant, for messages.
pub fn kind_name(g: &Geometry<f64>) -> &'static str {
    match g {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// All polygonal parts of `g`.
pub fn polygons(g: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match g {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(polygons).collect(),
        _ => Vec::new(),
    }
}

/// All linear parts of `g`.
pub fn line_strings(g: &Geometry<f64>) -> Vec<LineString<f64>> {
    match g {
        Geometry::Line(l) => vec![LineString::from(vec![l.start, l.end])],
        Geometry::LineString(ls) => vec![ls.clone()],
        Geometry::MultiLineString(mls) => mls.0.clone(),
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(line_strings).collect(),
        _ => Vec::new(),
    }
}

/// All point parts of `g`.
pub fn points(g: &Geometry<f64>) -> Vec<Point<f64>> {
    match g {
        Geometry::Point(p) => vec![*p],
        Geometry::MultiPoint(mp) => mp.0.clone(),
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(points).collect(),
        _ => Vec::new(),
    }
}

/// Builds the simplest geometry holding the given parts, or `None` when
/// all are empty.
pub fn from_parts(
    polys: Vec<Polygon<f64>>,
    lines: Vec<LineString<f64>>,
    pts: Vec<Point<f64>>,
) -> Option<Geometry<f64>> {
    let polys: Vec<_> = polys
        .into_iter()
        .filter(|p| p.exterior().0.len() >= 4)
        .collect();
    let lines: Vec<_> = lines.into_iter().filter(|l| l.0.len() >= 2).collect();

    let poly_geom = match polys.len() {
        0 => None,
        1 => polys.into_iter().next().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon(polys))),
    };
    let line_geom = match lines.len() {
        0 => None,
        1 => lines.into_iter().next().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString(lines))),
    };
    let point_geom = match pts.len() {
        0 => None,
        1 => Some(Geometry::Point(pts[0])),
        _ => Some(Geometry::MultiPoint(MultiPoint(pts))),
    };
    let mut parts: Vec<Geometry<f64>> = [poly_geom, line_geom, point_geom]
        .into_iter()
        .flatten()
        .collect();
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(Geometry::GeometryCollection(GeometryCollection(parts))),
    }
}

/// Polygonal parts of `g` as a multipolygon.
pub fn to_multipolygon(g: &Geometry<f64>) -> MultiPolygon<f64> {
    MultiPolygon(polygons(g))
}

/// Multipolygon result as a geometry, `None` when empty.
pub fn from_multipolygon(mp: MultiPolygon<f64>) -> Option<Geometry<f64>> {
    from_parts(mp.0, Vec::new(), Vec::new())
}

/// True when `g` has no polygon with area, no line with length and no point.
pub fn is_empty(g: &Geometry<f64>) -> bool {
    polygons(g).iter().all(|p| p.unsigned_area() <= 0.0)
        && line_strings(g).iter().all(|l| line_length(l) <= 0.0)
        && points(g).is_empty()
}

/// Unsigned area of the polygonal parts.
pub fn area(g: &Geometry<f64>) -> f64 {
    polygons(g).iter().map(|p| p.unsigned_area()).sum()
}

fn line_length(ls: &LineString<f64>) -> f64 {
    ls.lines().map(|l| (l.end - l.start).x.hypot((l.end - l.start).y)).sum()
}

/// Length of the linear parts plus the perimeter of the polygonal parts.
pub fn length(g: &Geometry<f64>) -> f64 {
    let rings: f64 = polygons(g)
        .iter()
        .map(|p| line_length(p.exterior()) + p.interiors().iter().map(line_length).sum::<f64>())
        .sum();
    rings + line_strings(g).iter().map(line_length).sum::<f64>()
}

/// Centroid, `None` for empty geometries.
pub fn centroid(g: &Geometry<f64>) -> Option<Point<f64>> {
    g.centroid()
}

/// Axis-aligned bounds, `None` for empty geometries.
pub fn bounds(g: &Geometry<f64>) -> Option<Rect<f64>> {
    g.bounding_rect()
}

/// Convex hull polygon.
pub fn convex_hull(g: &Geometry<f64>) -> Polygon<f64> {
    g.convex_hull()
}

/// Boundary lines: polygon rings become line strings, lines are kept.
pub fn outline(g: &Geometry<f64>) -> Option<Geometry<f64>> {
    let mut lines = Vec::new();
    for p in polygons(g) {
        lines.push(p.exterior().clone());
        lines.extend(p.interiors().iter().cloned());
    }
    lines.extend(line_strings(g));
    from_parts(Vec::new(), lines, Vec::new())
}

/// Rectangle polygon from `[x0, y0, x1, y1]`.
pub fn rect(bounds: [f64; 4]) -> Polygon<f64> {
    Rect::new(
        Coord {
            x: bounds[0],
            y: bounds[1],
        },
        Coord {
            x: bounds[2],
            y: bounds[3],
        },
    )
    .to_polygon()
}

/// Regular polygon with `sides` vertices on a circle of `radius`.
///
/// The first vertex is at angle 0; vertices run counter-clockwise.
pub fn regular_polygon(center: Coord<f64>, radius: f64, sides: usize) -> Polygon<f64> {
    let sides = sides.max(3);
    let ring: Vec<Coord<f64>> = (0..sides)
        .map(|i| {
            let a = std::f64::consts::TAU * i as f64 / sides as f64;
            Coord {
                x: center.x + radius * a.cos(),
                y: center.y + radius * a.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::from(ring), Vec::new())
}

/// Disc approximated with `4 * resolution` segments.
pub fn disc(center: Coord<f64>, radius: f64, resolution: usize) -> Polygon<f64> {
    regular_polygon(center, radius, 4 * resolution.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_parts_picks_simplest_variant() {
        let sq = rect([0.0, 0.0, 1.0, 1.0]);
        assert!(matches!(
            from_parts(vec![sq.clone()], vec![], vec![]),
            Some(Geometry::Polygon(_))
        ));
        assert!(matches!(
            from_parts(vec![sq.clone(), sq], vec![], vec![]),
            Some(Geometry::MultiPolygon(_))
        ));
        assert!(from_parts(vec![], vec![], vec![]).is_none());
        let mixed = from_parts(
            vec![rect([0.0, 0.0, 1.0, 1.0])],
            vec![LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])],
            vec![],
        );
        assert!(matches!(mixed, Some(Geometry::GeometryCollection(_))));
    }

    #[test]
    fn test_measures() {
        let g = Geometry::Polygon(rect([0.0, 0.0, 2.0, 3.0]));
        assert_relative_eq!(area(&g), 6.0);
        assert_relative_eq!(length(&g), 10.0);
        let c = centroid(&g).unwrap();
        assert_relative_eq!(c.x(), 1.0);
        assert_relative_eq!(c.y(), 1.5);
        assert!(!is_empty(&g));
        let empty = Geometry::LineString(LineString::new(vec![]));
        assert!(is_empty(&empty));
    }

    #[test]
    fn test_disc_area_converges() {
        let d = disc(Coord { x: 0.0, y: 0.0 }, 1.0, 32);
        assert!((d.unsigned_area() - std::f64::consts::PI).abs() < 0.01);
    }

    #[test]
    fn test_outline_of_polygon_with_hole() {
        let hole = rect([1.0, 1.0, 2.0, 2.0]).exterior().clone();
        let p = Polygon::new(rect([0.0, 0.0, 3.0, 3.0]).exterior().clone(), vec![hole]);
        let o = outline(&Geometry::Polygon(p)).unwrap();
        assert_relative_eq!(length(&o), 16.0);
    }
}
