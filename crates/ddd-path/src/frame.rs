//! Moving frames along polylines for orienting 2D profiles in 3D.

use ddd_math::{Dir3, Point2, Point3, Vec3};

/// An orthonormal frame at a point of a path.
///
/// Profile coordinates map X to `normal` and Y to `binormal`; for a
/// horizontal path the binormal points up (+Z).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position on the path.
    pub position: Point3,
    /// Unit tangent (direction of travel).
    pub tangent: Dir3,
    /// Unit normal (profile X axis).
    pub normal: Dir3,
    /// Unit binormal, `tangent x normal` (profile Y axis).
    pub binormal: Dir3,
}

impl Frame {
    /// Initial frame for a path starting at `position` heading along `tangent`.
    fn initial(position: Point3, tangent: Dir3) -> Self {
        let up = Vec3::z();
        let side = up.cross(tangent.as_ref());
        let normal = if side.norm() < 1e-9 {
            // Vertical start: pick X as profile axis.
            Dir3::new_normalize(Vec3::x())
        } else {
            Dir3::new_normalize(side)
        };
        let binormal = Dir3::new_normalize(tangent.as_ref().cross(normal.as_ref()));
        Self {
            position,
            tangent,
            normal,
            binormal,
        }
    }

    /// Transform a profile point to world coordinates.
    pub fn transform_point(&self, p: Point2) -> Point3 {
        self.position + p.x * self.normal.as_ref() + p.y * self.binormal.as_ref()
    }
}

/// Tangent at each polyline vertex: mean of the adjacent segment directions.
fn vertex_tangents(points: &[Point3]) -> Vec<Option<Vec3>> {
    let seg = |a: &Point3, b: &Point3| {
        let d = b - a;
        let n = d.norm();
        (n > 1e-12).then(|| d / n)
    };
    (0..points.len())
        .map(|i| {
            let incoming = (i > 0).then(|| seg(&points[i - 1], &points[i])).flatten();
            let outgoing = (i + 1 < points.len())
                .then(|| seg(&points[i], &points[i + 1]))
                .flatten();
            match (incoming, outgoing) {
                (Some(a), Some(b)) => {
                    let m = a + b;
                    if m.norm() < 1e-9 {
                        Some(b)
                    } else {
                        Some(m.normalize())
                    }
                }
                (a, b) => a.or(b),
            }
        })
        .collect()
}

/// Rotation-minimizing frames along a polyline (double reflection method).
///
/// Returns one frame per input point, or an empty vector when the polyline
/// has fewer than two distinct points.
pub fn rotation_minimizing_frames(points: &[Point3]) -> Vec<Frame> {
    let tangents = vertex_tangents(points);
    let Some(first_tangent) = tangents.iter().flatten().next().copied() else {
        return Vec::new();
    };

    let mut frames: Vec<Frame> = Vec::with_capacity(points.len());
    frames.push(Frame::initial(
        points[0],
        Dir3::new_normalize(tangents[0].unwrap_or(first_tangent)),
    ));

    for i in 1..points.len() {
        let prev = &frames[i - 1];
        let xi = points[i];

        let v1 = xi - prev.position;
        let c1 = v1.dot(&v1);
        let Some(ti) = tangents[i] else {
            let copy = Frame {
                position: xi,
                ..prev.clone()
            };
            frames.push(copy);
            continue;
        };
        if c1 < 1e-24 {
            let copy = Frame {
                position: xi,
                ..prev.clone()
            };
            frames.push(copy);
            continue;
        }

        let ri_l = prev.normal.as_ref() - (2.0 / c1) * v1.dot(prev.normal.as_ref()) * v1;
        let ti_l = prev.tangent.as_ref() - (2.0 / c1) * v1.dot(prev.tangent.as_ref()) * v1;

        let v2 = ti - ti_l;
        let c2 = v2.dot(&v2);
        let ri = if c2 < 1e-24 {
            ri_l
        } else {
            ri_l - (2.0 / c2) * v2.dot(&ri_l) * v2
        };

        let tangent = Dir3::new_normalize(ti);
        let normal = Dir3::new_normalize(ri);
        let binormal = Dir3::new_normalize(tangent.as_ref().cross(normal.as_ref()));
        frames.push(Frame {
            position: xi,
            tangent,
            normal,
            binormal,
        });
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_horizontal_path_has_up_binormal() {
        let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)];
        let frames = rotation_minimizing_frames(&pts);
        assert_eq!(frames.len(), 2);
        for f in &frames {
            assert_relative_eq!(f.binormal.as_ref().z, 1.0, epsilon = 1e-9);
            assert_relative_eq!(f.tangent.as_ref().x, 1.0, epsilon = 1e-9);
        }
        // Profile X lies to the left of travel.
        assert_relative_eq!(frames[0].normal.as_ref().y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_frames_stay_orthonormal_through_corner() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(5.0, 5.0, 1.0),
            Point3::new(0.0, 8.0, 2.0),
        ];
        let frames = rotation_minimizing_frames(&pts);
        assert_eq!(frames.len(), pts.len());
        for f in &frames {
            assert!(f.tangent.as_ref().dot(f.normal.as_ref()).abs() < 1e-6);
            assert!(f.tangent.as_ref().dot(f.binormal.as_ref()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_vertical_start_uses_x_normal() {
        let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 3.0)];
        let frames = rotation_minimizing_frames(&pts);
        assert_relative_eq!(frames[0].normal.as_ref().x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_polyline_has_no_frames() {
        let pts = [Point3::new(1.0, 1.0, 1.0), Point3::new(1.0, 1.0, 1.0)];
        assert!(rotation_minimizing_frames(&pts).is_empty());
    }

    #[test]
    fn test_transform_point() {
        let pts = [Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 10.0, 0.0)];
        let frames = rotation_minimizing_frames(&pts);
        let p = frames[1].transform_point(Point2::new(1.0, 2.0));
        // Travelling +Y: left is -X, up is +Z.
        assert_relative_eq!(p, Point3::new(-1.0, 10.0, 2.0), epsilon = 1e-9);
    }
}
