//! Node factories.

use ddd_math::Point3;
use ddd_mesh::{primitives, TriMesh};
use geo::{coord, Geometry, LineString, Point, Polygon};

use crate::node::Node;

/// 2D point node.
pub fn point(name: &str, xy: [f64; 2]) -> Node {
    Node::new2(name, Some(Geometry::Point(Point::new(xy[0], xy[1]))))
}

/// 2D polyline node.
pub fn line(name: &str, coords: &[[f64; 2]]) -> Node {
    let ls: LineString<f64> = coords.iter().map(|c| coord! { x: c[0], y: c[1] }).collect();
    Node::new2(name, Some(Geometry::LineString(ls)))
}

/// Axis-aligned rectangle `[x0, y0, x1, y1]`.
pub fn rect(name: &str, bounds: [f64; 4]) -> Node {
    Node::new2(name, Some(Geometry::Polygon(ddd_geom2::rect(bounds))))
}

/// Disc approximated with `4 * resolution` sides.
pub fn disc(name: &str, center: [f64; 2], radius: f64, resolution: usize) -> Node {
    let c = coord! { x: center[0], y: center[1] };
    Node::new2(
        name,
        Some(Geometry::Polygon(ddd_geom2::disc(c, radius, resolution))),
    )
}

/// Regular polygon centered at the origin with one vertex on +X.
pub fn regular_polygon(name: &str, sides: usize, radius: f64) -> Node {
    let c = coord! { x: 0.0, y: 0.0 };
    Node::new2(
        name,
        Some(Geometry::Polygon(ddd_geom2::regular_polygon(c, radius, sides))),
    )
}

/// Polygon from an exterior ring; the ring is closed automatically.
pub fn polygon(name: &str, exterior: &[[f64; 2]]) -> Node {
    let ring: LineString<f64> = exterior.iter().map(|c| coord! { x: c[0], y: c[1] }).collect();
    Node::new2(name, Some(Geometry::Polygon(Polygon::new(ring, vec![]))))
}

/// 2D node wrapping an arbitrary geometry.
pub fn shape(name: &str, geometry: Geometry<f64>) -> Node {
    Node::new2(name, Some(geometry))
}

/// Empty 2D group.
pub fn group2(name: &str) -> Node {
    Node::new2(name, None)
}

/// Empty 3D group.
pub fn group3(name: &str) -> Node {
    Node::new3(name, None)
}

/// 3D node wrapping a mesh.
pub fn mesh(name: &str, mesh: TriMesh) -> Node {
    Node::new3(name, Some(mesh))
}

/// Icosphere.
pub fn sphere(name: &str, center: Point3, radius: f64, subdivisions: u32) -> Node {
    mesh(name, primitives::icosphere(&center, radius, subdivisions))
}

/// Cube of side `d` centered at the origin.
pub fn cube(name: &str, d: f64) -> Node {
    let h = d / 2.0;
    box3(name, [-h, -h, -h, h, h, h])
}

/// Box `[x0, y0, z0, x1, y1, z1]`.
pub fn box3(name: &str, bounds: [f64; 6]) -> Node {
    let min = Point3::new(bounds[0], bounds[1], bounds[2]);
    let max = Point3::new(bounds[3], bounds[4], bounds[5]);
    mesh(name, primitives::cuboid(&min, &max))
}

/// Instance of `target`.
pub fn instance(name: &str, target: &Node) -> Node {
    Node::new_instance(name, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_planar_builders() {
        let r = rect("r", [0.0, 0.0, 2.0, 3.0]);
        assert_relative_eq!(r.area(), 6.0);
        let p = polygon("p", &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        assert_relative_eq!(p.area(), 0.5);
        let l = line("l", &[[0.0, 0.0], [3.0, 4.0]]);
        assert_relative_eq!(l.length(), 5.0);
        let hex = regular_polygon("hex", 6, 1.0);
        assert_relative_eq!(hex.area(), 1.5 * 3f64.sqrt(), epsilon = 1e-9);
        assert!(disc("d", [0.0, 0.0], 1.0, 8).area() < std::f64::consts::PI);
    }

    #[test]
    fn test_solid_builders() {
        let b = box3("b", [0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
        let m = b.mesh().unwrap();
        assert_relative_eq!(m.signed_volume(), 6.0, epsilon = 1e-9);
        let s = sphere("s", Point3::origin(), 1.0, 2);
        assert!(s.mesh().unwrap().signed_volume() > 3.5);
        assert!(group3("g").mesh().is_none());
    }
}
