//! Sweeping planar profiles along 3D polylines.

use ddd_math::{Point2, Point3};
use ddd_mesh::TriMesh;
use ddd_path::{rotation_minimizing_frames, Frame};
use geo::orient::Direction;
use geo::{Geometry, Orient};

use crate::{polygons, triangulate, GeomError};

/// Sweeps the polygonal parts of `profile` along `path`.
///
/// Profile X maps to the frame normal (left of the direction of travel for
/// horizontal paths) and profile Y to the binormal (up). Frames are
/// rotation-minimizing, so the profile does not twist around the path.
/// Both ends are capped and the result is oriented outward.
///
/// # Errors
///
/// Returns [`GeomError::InvalidGeometry`] when the path has fewer than two
/// distinct points, and [`GeomError::Triangulation`] when a cap fails.
pub fn extrude_along(profile: &Geometry<f64>, path: &[Point3]) -> Result<TriMesh, GeomError> {
    let frames = rotation_minimizing_frames(path);
    if frames.len() < 2 {
        return Err(GeomError::InvalidGeometry(format!(
            "sweep path needs two distinct points, got {}",
            path.len()
        )));
    }

    let mut mesh = TriMesh::new();
    for polygon in polygons(profile) {
        let polygon = polygon.orient(Direction::Default);
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
        for ring in rings {
            let coords: Vec<Point2> = ring
                .0
                .iter()
                .map(|c| Point2::new(c.x, c.y))
                .collect();
            let n = coords.len().saturating_sub(1);
            if n < 3 {
                continue;
            }
            let base = mesh.vertices.len() as u32;
            for frame in &frames {
                for c in &coords[..n] {
                    mesh.vertices.push(frame.transform_point(*c));
                }
            }
            let n = n as u32;
            for k in 0..frames.len() as u32 - 1 {
                let (lo, hi) = (base + k * n, base + (k + 1) * n);
                for i in 0..n {
                    let j = (i + 1) % n;
                    mesh.faces.push([lo + i, lo + j, hi + j]);
                    mesh.faces.push([lo + i, hi + j, hi + i]);
                }
            }
        }
    }

    let cap = triangulate(profile, false)?;
    if !cap.is_empty() {
        let place = |frame: &Frame| cap.vertex_func(|p, _| frame.transform_point(Point2::new(p.x, p.y)));
        if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
            mesh.merge(&place(first).flipped());
            mesh.merge(&place(last));
        }
    }
    mesh.fix_orientation();
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rect;
    use approx::assert_relative_eq;

    #[test]
    fn test_straight_sweep_is_prism() {
        let profile = Geometry::Polygon(rect([-0.5, 0.0, 0.5, 2.0]));
        let path = [Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0)];
        let m = extrude_along(&profile, &path).unwrap();
        assert_relative_eq!(m.signed_volume(), 10.0, epsilon = 1e-9);
        let (lo, hi) = m.bounds().unwrap();
        // Profile Y is up, profile X is to the left of travel.
        assert_relative_eq!(lo.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(hi.z, 2.0, epsilon = 1e-12);
        assert_relative_eq!(lo.y, -0.5, epsilon = 1e-12);
        assert_relative_eq!(hi.x, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bent_sweep_is_closed_and_outward() {
        let profile = Geometry::Polygon(rect([-0.5, -0.5, 0.5, 0.5]));
        let path = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(4.0, 4.0, 0.0),
        ];
        let m = extrude_along(&profile, &path).unwrap();
        assert!(m.signed_volume() > 0.0);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_degenerate_path_fails() {
        let profile = Geometry::Polygon(rect([0.0, 0.0, 1.0, 1.0]));
        let p = Point3::new(1.0, 1.0, 1.0);
        assert!(matches!(
            extrude_along(&profile, &[p, p]),
            Err(GeomError::InvalidGeometry(_))
        ));
    }
}
