//! Evaluation and arclength sampling of curve entities.

use ddd_math::{Point3, Vec3};

/// Number of samples used to build arclength lookup tables.
const DENSE_SAMPLES: usize = 128;

/// Evaluate a cubic Bezier at parameter `t` in `[0, 1]`.
pub fn cubic_bezier(p: &[Point3; 4], t: f64) -> Point3 {
    let u = 1.0 - t;
    let c = p[0].coords * (u * u * u)
        + p[1].coords * (3.0 * u * u * t)
        + p[2].coords * (3.0 * u * t * t)
        + p[3].coords * (t * t * t);
    Point3::from(c)
}

/// A circle in 3D: center, radius and plane normal.
#[derive(Debug, Clone, Copy)]
pub struct Circle {
    /// Center point.
    pub center: Point3,
    /// Radius.
    pub radius: f64,
    /// Unit normal of the circle plane, oriented so that `a -> b -> c`
    /// runs counter-clockwise around it.
    pub normal: Vec3,
}

/// Circle through three points, or `None` when they are collinear.
pub fn circle_through(a: &Point3, b: &Point3, c: &Point3) -> Option<Circle> {
    let ab = b - a;
    let ac = c - a;
    let n = ab.cross(&ac);
    let n2 = n.norm_squared();
    if n2 < 1e-18 {
        return None;
    }
    let offset = (n.cross(&ab) * ac.norm_squared() + ac.cross(&n) * ab.norm_squared()) / (2.0 * n2);
    Some(Circle {
        center: a + offset,
        radius: offset.norm(),
        normal: n / n2.sqrt(),
    })
}

/// Three-point arc from `start` through `mid` to `end`.
#[derive(Debug, Clone, Copy)]
pub struct Arc3 {
    circle: Circle,
    u: Vec3,
    v: Vec3,
    sweep: f64,
}

impl Arc3 {
    /// Builds the arc, or `None` when the points are collinear.
    pub fn new(start: &Point3, mid: &Point3, end: &Point3) -> Option<Self> {
        let circle = circle_through(start, mid, end)?;
        let u = (start - circle.center) / circle.radius;
        let v = circle.normal.cross(&u);
        let angle = |p: &Point3| {
            let d = p - circle.center;
            let a = d.dot(&v).atan2(d.dot(&u));
            if a < 0.0 {
                a + std::f64::consts::TAU
            } else {
                a
            }
        };
        Some(Self {
            circle,
            u,
            v,
            sweep: angle(end),
        })
    }

    /// Point at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f64) -> Point3 {
        let (s, c) = (self.sweep * t).sin_cos();
        self.circle.center + (self.u * c + self.v * s) * self.circle.radius
    }

    /// Arc length.
    pub fn length(&self) -> f64 {
        self.circle.radius * self.sweep
    }

    /// Underlying circle.
    pub fn circle(&self) -> &Circle {
        &self.circle
    }
}

/// Evaluate a clamped uniform B-spline at `t` in `[0, 1]` (de Boor).
///
/// The degree is clamped to `control.len() - 1`.
pub fn bspline(control: &[Point3], degree: usize, t: f64) -> Point3 {
    let n = control.len();
    if n == 0 {
        return Point3::origin();
    }
    let p = degree.min(n - 1);
    let t = t.clamp(0.0, 1.0);
    if p == 0 {
        let i = ((t * n as f64) as usize).min(n - 1);
        return control[i];
    }
    let knots = clamped_knots(n, p);

    let mut k = p;
    while k < n - 1 && t >= knots[k + 1] {
        k += 1;
    }

    let mut d: Vec<Vec3> = (0..=p).map(|j| control[j + k - p].coords).collect();
    for r in 1..=p {
        for j in (r..=p).rev() {
            let i = j + k - p;
            let denom = knots[i + p + 1 - r] - knots[i];
            let alpha = if denom.abs() < 1e-12 {
                0.0
            } else {
                (t - knots[i]) / denom
            };
            d[j] = d[j - 1] * (1.0 - alpha) + d[j] * alpha;
        }
    }
    Point3::from(d[p])
}

fn clamped_knots(n: usize, p: usize) -> Vec<f64> {
    (0..n + p + 1)
        .map(|i| {
            if i <= p {
                0.0
            } else if i >= n {
                1.0
            } else {
                (i - p) as f64 / (n - p) as f64
            }
        })
        .collect()
}

/// Number of equal pieces so that each is at most `distance` long.
pub fn segments_for(length: f64, distance: f64) -> usize {
    if distance.is_nan() || distance <= 0.0 || !length.is_finite() {
        return 1;
    }
    (length / distance).ceil().max(1.0) as usize
}

/// Polyline length of a dense sampling of `f` over `[0, 1]`.
pub fn approximate_length(f: impl Fn(f64) -> Point3) -> f64 {
    let mut prev = f(0.0);
    let mut total = 0.0;
    for i in 1..=DENSE_SAMPLES {
        let p = f(i as f64 / DENSE_SAMPLES as f64);
        total += (p - prev).norm();
        prev = p;
    }
    total
}

/// Samples `f` over `[0, 1]` at (approximately) equal arclength steps no
/// longer than `distance`. Both endpoints are included.
pub fn sample_by_arclength(f: impl Fn(f64) -> Point3, distance: f64) -> Vec<Point3> {
    let dense: Vec<(f64, Point3)> = (0..=DENSE_SAMPLES)
        .map(|i| {
            let t = i as f64 / DENSE_SAMPLES as f64;
            (t, f(t))
        })
        .collect();
    let mut cumulative = Vec::with_capacity(dense.len());
    cumulative.push(0.0);
    for w in dense.windows(2) {
        let last = cumulative[cumulative.len() - 1];
        cumulative.push(last + (w[1].1 - w[0].1).norm());
    }
    let total = cumulative[cumulative.len() - 1];
    let n = segments_for(total, distance);

    (0..=n)
        .map(|k| {
            let target = total * k as f64 / n as f64;
            let i = cumulative
                .partition_point(|&c| c < target)
                .clamp(1, DENSE_SAMPLES);
            let (c0, c1) = (cumulative[i - 1], cumulative[i]);
            let s = if c1 - c0 > 0.0 { (target - c0) / (c1 - c0) } else { 0.0 };
            let t = dense[i - 1].0 + s * (dense[i].0 - dense[i - 1].0);
            f(t)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_circle_through_three_points() {
        let c = circle_through(
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
            &Point3::new(-1.0, 0.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(c.center, Point3::origin(), epsilon = 1e-12);
        assert_relative_eq!(c.radius, 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.normal.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_collinear_has_no_circle() {
        let c = circle_through(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(2.0, 0.0, 0.0),
        );
        assert!(c.is_none());
    }

    #[test]
    fn test_half_circle_arc() {
        let arc = Arc3::new(
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
            &Point3::new(-1.0, 0.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(arc.length(), PI, epsilon = 1e-9);
        let mid = arc.point_at(0.5);
        assert_relative_eq!(mid, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(arc.point_at(1.0), Point3::new(-1.0, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_clockwise_arc_stays_on_its_side() {
        // Passing through (0, -1) the arc must bulge downward.
        let arc = Arc3::new(
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, -1.0, 0.0),
            &Point3::new(-1.0, 0.0, 0.0),
        )
        .unwrap();
        assert!(arc.point_at(0.5).y < -0.99);
    }

    #[test]
    fn test_bspline_degree3_matches_bezier() {
        let ctrl = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
            Point3::new(3.0, 2.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
        ];
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert_relative_eq!(bspline(&ctrl, 3, t), cubic_bezier(&ctrl, t), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_bspline_degree1_is_polyline() {
        let ctrl = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        assert_relative_eq!(bspline(&ctrl, 1, 0.5), ctrl[1], epsilon = 1e-12);
        assert_relative_eq!(bspline(&ctrl, 1, 1.0), ctrl[2], epsilon = 1e-12);
    }

    #[test]
    fn test_sample_by_arclength_spacing() {
        let line = |t: f64| Point3::new(10.0 * t, 0.0, 0.0);
        let pts = sample_by_arclength(line, 3.0);
        assert_eq!(pts.len(), 5, "ceil(10 / 3) = 4 pieces");
        for w in pts.windows(2) {
            assert!((w[1] - w[0]).norm() <= 3.0 + 1e-9);
        }
        assert_relative_eq!(pts[4].x, 10.0, epsilon = 1e-12);
    }
}
