#![warn(missing_docs)]

//! Entity paths in 3D.
//!
//! A [`Path3`] is a list of [`Entity`] values (polylines, cubic Beziers,
//! three-point arcs and B-splines) that index into a shared vertex array.
//! Paths can be discretized into polylines, have their Beziers replaced by
//! fitted arcs, and answer nearest-segment and bisector queries in the XY
//! plane. [`frame`] provides rotation-minimizing frames for sweeps.

pub mod curve;
pub mod frame;

use curve::{approximate_length, bspline, cubic_bezier, sample_by_arclength, segments_for, Arc3};
use ddd_math::{Point3, Tolerance, Vec2};
use thiserror::Error;

pub use frame::{rotation_minimizing_frames, Frame};

/// Sampling step used for curved entities by [`Path3::polyline`].
pub const DEFAULT_CURVE_STEP: f64 = 0.5;

/// Errors from path construction and queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    /// The path has nothing to sample.
    #[error("path has no entities")]
    Empty,
    /// An entity refers to a vertex that does not exist.
    #[error("entity {entity} references vertex {index} but path has {len} vertices")]
    IndexOutOfRange {
        /// Entity index.
        entity: usize,
        /// Offending vertex index.
        index: usize,
        /// Number of vertices.
        len: usize,
    },
    /// A polyline vertex index is out of range.
    #[error("vertex {index} is out of range for a polyline of {len} points")]
    VertexOutOfRange {
        /// Requested vertex.
        index: usize,
        /// Polyline size.
        len: usize,
    },
    /// An entity has too few points, or all its points coincide.
    #[error("entity {0} is degenerate")]
    Degenerate(usize),
}

/// A path entity. Indices refer to [`Path3::vertices`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// Polyline through the indexed vertices.
    Line(Vec<usize>),
    /// Cubic Bezier: start, control 1, control 2, end.
    Bezier([usize; 4]),
    /// Circular arc: start, a point on the arc, end.
    Arc([usize; 3]),
    /// Clamped uniform B-spline.
    BSpline {
        /// Control points.
        points: Vec<usize>,
        /// Spline degree.
        degree: usize,
    },
}

impl Entity {
    /// Vertex indices used by this entity.
    pub fn indices(&self) -> &[usize] {
        match self {
            Entity::Line(v) => v,
            Entity::Bezier(v) => v,
            Entity::Arc(v) => v,
            Entity::BSpline { points, .. } => points,
        }
    }
}

/// Result of [`Path3::closest_segment`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClosestSegment {
    /// Projection of the query point on the segment, Z interpolated.
    pub point: Point3,
    /// Segment index in [`Path3::polyline`].
    pub index: usize,
    /// Segment start.
    pub a: Point3,
    /// Segment end.
    pub b: Point3,
    /// Index of the entity the segment belongs to.
    pub entity: usize,
    /// XY distance from the query point to the projection.
    pub distance: f64,
    /// `distance`, negative when the query point lies right of travel.
    pub signed_distance: f64,
    /// Arclength (XY) from the path start to the projection.
    pub along: f64,
}

/// A 3D path made of entities over a shared vertex array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path3 {
    /// Shared vertices.
    pub vertices: Vec<Point3>,
    /// Entities, in travel order.
    pub entities: Vec<Entity>,
}

impl Path3 {
    /// An empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// A path with a single polyline through `points`.
    pub fn from_points(points: &[Point3]) -> Self {
        let mut path = Self::new();
        path.add_line(points);
        path
    }

    /// Appends a vertex, reusing the last vertex when it coincides.
    fn push_vertex(&mut self, p: Point3) -> usize {
        if let Some(last) = self.vertices.last() {
            if Tolerance::DEFAULT.points_equal(last, &p) {
                return self.vertices.len() - 1;
            }
        }
        self.vertices.push(p);
        self.vertices.len() - 1
    }

    /// Appends a polyline entity.
    pub fn add_line(&mut self, points: &[Point3]) {
        let idx = points.iter().map(|p| self.push_vertex(*p)).collect();
        self.entities.push(Entity::Line(idx));
    }

    /// Appends a cubic Bezier entity.
    pub fn add_bezier(&mut self, p: [Point3; 4]) {
        // Control points may legitimately coincide, so only the start is shared.
        let start = self.push_vertex(p[0]);
        let mut idx = [start, 0, 0, 0];
        for (slot, point) in idx.iter_mut().skip(1).zip(&p[1..]) {
            self.vertices.push(*point);
            *slot = self.vertices.len() - 1;
        }
        self.entities.push(Entity::Bezier(idx));
    }

    /// Appends a three-point arc entity.
    pub fn add_arc(&mut self, p: [Point3; 3]) {
        let idx = p.map(|q| self.push_vertex(q));
        self.entities.push(Entity::Arc(idx));
    }

    /// Appends a B-spline entity.
    pub fn add_bspline(&mut self, control: &[Point3], degree: usize) {
        let start = control.first().map(|p| self.push_vertex(*p));
        let mut points: Vec<usize> = start.into_iter().collect();
        for p in control.iter().skip(1) {
            self.vertices.push(*p);
            points.push(self.vertices.len() - 1);
        }
        self.entities.push(Entity::BSpline { points, degree });
    }

    fn entity_points(&self, entity: usize) -> Result<Vec<Point3>, PathError> {
        let e = &self.entities[entity];
        e.indices()
            .iter()
            .map(|&index| {
                self.vertices
                    .get(index)
                    .copied()
                    .ok_or(PathError::IndexOutOfRange {
                        entity,
                        index,
                        len: self.vertices.len(),
                    })
            })
            .collect()
    }

    /// Samples entity `entity`.
    ///
    /// With `step = Some(d)` every piece is at most `d` long (straight
    /// segments are subdivided too). With `None`, straight segments are kept
    /// as-is and curves use [`DEFAULT_CURVE_STEP`].
    fn sample_entity(&self, entity: usize, step: Option<f64>) -> Result<Vec<Point3>, PathError> {
        let pts = self.entity_points(entity)?;
        let curve_step = step.unwrap_or(DEFAULT_CURVE_STEP);
        let sampled = match &self.entities[entity] {
            Entity::Line(_) => {
                if pts.is_empty() {
                    return Err(PathError::Degenerate(entity));
                }
                match step {
                    None => pts,
                    Some(d) => {
                        let mut out = vec![pts[0]];
                        for w in pts.windows(2) {
                            let n = segments_for((w[1] - w[0]).norm(), d);
                            out.extend((1..=n).map(|k| w[0] + (w[1] - w[0]) * (k as f64 / n as f64)));
                        }
                        out
                    }
                }
            }
            Entity::Bezier(_) => {
                let ctrl = [pts[0], pts[1], pts[2], pts[3]];
                sample_by_arclength(|t| cubic_bezier(&ctrl, t), curve_step)
            }
            Entity::Arc(_) => match Arc3::new(&pts[0], &pts[1], &pts[2]) {
                Some(arc) => {
                    let n = segments_for(arc.length(), curve_step);
                    (0..=n).map(|k| arc.point_at(k as f64 / n as f64)).collect()
                }
                None => vec![pts[0], pts[2]],
            },
            Entity::BSpline { degree, .. } => {
                if pts.is_empty() {
                    return Err(PathError::Degenerate(entity));
                }
                sample_by_arclength(|t| bspline(&pts, *degree, t), curve_step)
            }
        };
        Ok(sampled)
    }

    /// Sampled polyline plus, for each segment, the owning entity.
    fn tagged_polyline(&self, step: Option<f64>) -> Result<(Vec<Point3>, Vec<usize>), PathError> {
        if self.entities.is_empty() {
            return Err(PathError::Empty);
        }
        let mut points: Vec<Point3> = Vec::new();
        let mut owners = Vec::new();
        for entity in 0..self.entities.len() {
            for p in self.sample_entity(entity, step)? {
                if let Some(last) = points.last() {
                    if Tolerance::DEFAULT.points_equal(last, &p) {
                        continue;
                    }
                    owners.push(entity);
                }
                points.push(p);
            }
        }
        Ok((points, owners))
    }

    /// The path as a polyline: straight segments kept, curves sampled at
    /// [`DEFAULT_CURVE_STEP`].
    pub fn polyline(&self) -> Result<Vec<Point3>, PathError> {
        Ok(self.tagged_polyline(None)?.0)
    }

    /// Samples every entity at arclength steps no longer than `distance`,
    /// producing a path with a single polyline entity.
    pub fn discretize(&self, distance: f64) -> Result<Path3, PathError> {
        let (points, _) = self.tagged_polyline(Some(distance))?;
        Ok(Path3::from_points(&points))
    }

    /// Total length of the path.
    pub fn length(&self) -> Result<f64, PathError> {
        let mut total = 0.0;
        for entity in 0..self.entities.len() {
            let pts = self.entity_points(entity)?;
            total += match &self.entities[entity] {
                Entity::Line(_) => pts.windows(2).map(|w| (w[1] - w[0]).norm()).sum(),
                Entity::Bezier(_) => {
                    let ctrl = [pts[0], pts[1], pts[2], pts[3]];
                    approximate_length(|t| cubic_bezier(&ctrl, t))
                }
                Entity::Arc(_) => match Arc3::new(&pts[0], &pts[1], &pts[2]) {
                    Some(arc) => arc.length(),
                    None => (pts[2] - pts[0]).norm(),
                },
                Entity::BSpline { degree, .. } => approximate_length(|t| bspline(&pts, *degree, t)),
            };
        }
        Ok(total)
    }

    /// Replaces every cubic Bezier with a sequence of circular arcs whose
    /// radial error stays below `tolerance`. Other entities are copied.
    pub fn bezier_to_arcs(&self, tolerance: f64) -> Result<Path3, PathError> {
        let mut out = Path3::new();
        for entity in 0..self.entities.len() {
            let pts = self.entity_points(entity)?;
            match &self.entities[entity] {
                Entity::Line(_) => out.add_line(&pts),
                Entity::Arc(_) => out.add_arc([pts[0], pts[1], pts[2]]),
                Entity::BSpline { degree, .. } => out.add_bspline(&pts, *degree),
                Entity::Bezier(_) => {
                    let ctrl = [pts[0], pts[1], pts[2], pts[3]];
                    for piece in fit_arcs(&ctrl, tolerance) {
                        match piece {
                            ArcPiece::Arc(p) => out.add_arc(p),
                            ArcPiece::Line(a, b) => out.add_line(&[a, b]),
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Line through polyline vertex `i`, perpendicular to the angle
    /// bisector of its adjacent segments, extending `length` to each side.
    ///
    /// Computed in XY; both ends keep the vertex Z. End vertices use the
    /// normal of their only segment. `i` indexes [`Path3::polyline`].
    pub fn vertex_bisector(&self, i: usize, length: f64) -> Result<(Point3, Point3), PathError> {
        let points = self.polyline()?;
        let len = points.len();
        if i >= len {
            return Err(PathError::VertexOutOfRange { index: i, len });
        }
        let left_normal = |a: &Point3, b: &Point3| {
            let d = Vec2::new(b.x - a.x, b.y - a.y);
            let n = d.norm();
            (n > 1e-12).then(|| Vec2::new(-d.y, d.x) / n)
        };
        let incoming = (i > 0)
            .then(|| left_normal(&points[i - 1], &points[i]))
            .flatten();
        let outgoing = (i + 1 < len)
            .then(|| left_normal(&points[i], &points[i + 1]))
            .flatten();
        let dir = match (incoming, outgoing) {
            (Some(a), Some(b)) => {
                let s = a + b;
                if s.norm() < 1e-9 {
                    a
                } else {
                    s.normalize()
                }
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return Err(PathError::Degenerate(0)),
        };
        let p = points[i];
        let offset = |k: f64| Point3::new(p.x + dir.x * k, p.y + dir.y * k, p.z);
        Ok((offset(-length), offset(length)))
    }

    /// Nearest polyline segment to `point` in XY, or `None` for paths with
    /// fewer than two distinct points.
    pub fn closest_segment(&self, point: &Point3) -> Option<ClosestSegment> {
        let (points, owners) = self.tagged_polyline(None).ok()?;
        let mut best: Option<ClosestSegment> = None;
        let mut along = 0.0;
        for (index, w) in points.windows(2).enumerate() {
            let (a, b) = (w[0], w[1]);
            let ab = Vec2::new(b.x - a.x, b.y - a.y);
            let ap = Vec2::new(point.x - a.x, point.y - a.y);
            let seg_len2 = ab.norm_squared();
            let t = if seg_len2 > 0.0 {
                (ap.dot(&ab) / seg_len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let proj = a + (b - a) * t;
            let dx = point.x - proj.x;
            let dy = point.y - proj.y;
            let distance = (dx * dx + dy * dy).sqrt();
            if best.as_ref().map_or(true, |c| distance < c.distance) {
                let cross = ab.x * ap.y - ab.y * ap.x;
                best = Some(ClosestSegment {
                    point: proj,
                    index,
                    a,
                    b,
                    entity: owners[index],
                    distance,
                    signed_distance: if cross < 0.0 { -distance } else { distance },
                    along: along + seg_len2.sqrt() * t,
                });
            }
            along += seg_len2.sqrt();
        }
        best
    }
}

enum ArcPiece {
    Arc([Point3; 3]),
    Line(Point3, Point3),
}

/// Maximum bisection steps per emitted arc.
const FIT_ITERATIONS: usize = 40;

/// Radial error of the arc through `b(ts)`, `b(tm)`, `b(te)`, sampled at the
/// quarter points of the span. Collinear spans measure distance to the chord.
fn fit_error(ctrl: &[Point3; 4], ts: f64, te: f64) -> (f64, ArcPiece) {
    let n = te - ts;
    let (s, m, e) = (
        cubic_bezier(ctrl, ts),
        cubic_bezier(ctrl, ts + n / 2.0),
        cubic_bezier(ctrl, te),
    );
    let q1 = cubic_bezier(ctrl, ts + n / 4.0);
    let q2 = cubic_bezier(ctrl, ts + 3.0 * n / 4.0);
    match curve::circle_through(&s, &m, &e) {
        Some(c) => {
            let err = |q: &Point3| ((q - c.center).norm() - c.radius).abs();
            (err(&q1).max(err(&q2)), ArcPiece::Arc([s, m, e]))
        }
        None => {
            let chord = e - s;
            let dist = |q: &Point3| {
                let len = chord.norm();
                if len < 1e-12 {
                    (q - s).norm()
                } else {
                    (q - s).cross(&chord).norm() / len
                }
            };
            (dist(&q1).max(dist(&q2)), ArcPiece::Line(s, e))
        }
    }
}

/// Pomax-style bisection: from each start parameter, find the largest end
/// parameter whose arc fit stays within `tolerance`, emit it and advance.
fn fit_arcs(ctrl: &[Point3; 4], tolerance: f64) -> Vec<ArcPiece> {
    let mut pieces = Vec::new();
    let mut ts = 0.0;
    while ts < 1.0 {
        let (mut lo, mut hi) = (ts, 1.0);
        let mut te = 1.0;
        let mut accepted: Option<(f64, ArcPiece)> = None;
        for _ in 0..FIT_ITERATIONS {
            let (err, piece) = fit_error(ctrl, ts, te);
            if err <= tolerance {
                accepted = Some((te, piece));
                if te >= 1.0 {
                    break;
                }
                lo = te;
            } else {
                hi = te;
            }
            te = (lo + hi) / 2.0;
        }
        let (end, piece) = match accepted {
            Some(a) => a,
            None => {
                // Nothing fit: emit the smallest span tried.
                let (_, piece) = fit_error(ctrl, ts, hi);
                (hi, piece)
            }
        };
        pieces.push(piece);
        ts = end;
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn l_path() -> Path3 {
        Path3::from_points(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 10.0, 5.0),
        ])
    }

    #[test]
    fn test_discretize_bounds_step() {
        let path = l_path().discretize(3.0).unwrap();
        assert_eq!(path.entities.len(), 1);
        let Entity::Line(idx) = &path.entities[0] else {
            panic!("expected a single line");
        };
        for w in idx.windows(2) {
            let d = (path.vertices[w[1]] - path.vertices[w[0]]).norm();
            assert!(d <= 3.0 + 1e-9, "piece of length {d}");
        }
        assert_relative_eq!(path.vertices[0], Point3::origin());
        assert_relative_eq!(
            path.vertices[path.vertices.len() - 1],
            Point3::new(10.0, 10.0, 5.0)
        );
    }

    #[test]
    fn test_discretize_mixed_entities_single_chain() {
        let mut path = Path3::new();
        path.add_line(&[Point3::new(-5.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)]);
        path.add_arc([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(5.0, 5.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
        ]);
        path.add_bezier([
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(12.0, -3.0, 0.0),
            Point3::new(15.0, -3.0, 0.0),
            Point3::new(17.0, 0.0, 0.0),
        ]);
        let d = path.discretize(0.5).unwrap();
        assert_eq!(d.entities.len(), 1);
        assert!(d.vertices.len() > 40);
        let total = path.length().unwrap();
        let sampled = d.length().unwrap();
        assert!((total - sampled).abs() < 0.1, "{total} vs {sampled}");
    }

    #[test]
    fn test_bezier_to_arcs_within_tolerance() {
        let ctrl = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 5.0, 0.0),
            Point3::new(10.0, 5.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
        ];
        let mut path = Path3::new();
        path.add_bezier(ctrl);
        let arcs = path.bezier_to_arcs(0.01).unwrap();
        assert!(!arcs.entities.is_empty());
        assert!(arcs
            .entities
            .iter()
            .all(|e| matches!(e, Entity::Arc(_) | Entity::Line(_))));

        // Arcs are contiguous and span the whole curve.
        let first = arcs.entities[0].indices()[0];
        let last = *arcs.entities[arcs.entities.len() - 1].indices().last().unwrap();
        assert_relative_eq!(arcs.vertices[first], ctrl[0], epsilon = 1e-9);
        assert_relative_eq!(arcs.vertices[last], ctrl[3], epsilon = 1e-9);

        // Arc lengths approximate the curve length.
        let diff = (arcs.length().unwrap() - path.length().unwrap()).abs();
        assert!(diff < 0.05, "length differs by {diff}");
    }

    #[test]
    fn test_straight_bezier_becomes_line() {
        let mut path = Path3::new();
        path.add_bezier([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ]);
        let arcs = path.bezier_to_arcs(0.001).unwrap();
        assert_eq!(arcs.entities.len(), 1);
        assert!(matches!(arcs.entities[0], Entity::Line(_)));
    }

    #[test]
    fn test_vertex_bisector_at_corner() {
        let path = l_path();
        let (a, b) = path.vertex_bisector(1, 1.0).unwrap();
        // At a left turn the bisector normal points inward (-x, +y).
        let d = b - a;
        assert_relative_eq!(d.x, -2.0 * std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        assert_relative_eq!(d.y, 2.0 * std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
        assert_relative_eq!(a.z, 0.0);
    }

    #[test]
    fn test_vertex_bisector_endpoints_use_segment_normal() {
        let path = l_path();
        let (a, b) = path.vertex_bisector(0, 2.0).unwrap();
        assert_relative_eq!(a, Point3::new(0.0, -2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(b, Point3::new(0.0, 2.0, 0.0), epsilon = 1e-12);

        let (a, _) = path.vertex_bisector(2, 1.0).unwrap();
        assert_relative_eq!(a, Point3::new(11.0, 10.0, 5.0), epsilon = 1e-12);

        assert!(matches!(
            path.vertex_bisector(3, 1.0),
            Err(PathError::VertexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_closest_segment_interpolates_z() {
        let path = l_path();
        let c = path.closest_segment(&Point3::new(12.0, 5.0, 0.0)).unwrap();
        assert_eq!(c.index, 1);
        assert_eq!(c.entity, 0);
        assert_relative_eq!(c.point, Point3::new(10.0, 5.0, 2.5), epsilon = 1e-12);
        assert_relative_eq!(c.distance, 2.0, epsilon = 1e-12);
        // Right of travel (+y heading, point at +x).
        assert_relative_eq!(c.signed_distance, -2.0, epsilon = 1e-12);
        assert_relative_eq!(c.along, 15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_closest_segment_reports_owner_entity() {
        let mut path = Path3::new();
        path.add_line(&[Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0)]);
        path.add_line(&[Point3::new(5.0, 0.0, 0.0), Point3::new(5.0, 5.0, 0.0)]);
        let c = path.closest_segment(&Point3::new(6.0, 4.0, 0.0)).unwrap();
        assert_eq!(c.entity, 1);
        assert!(Path3::new().closest_segment(&Point3::origin()).is_none());
    }

    #[test]
    fn test_bad_index_is_reported() {
        let path = Path3 {
            vertices: vec![Point3::origin()],
            entities: vec![Entity::Line(vec![0, 3])],
        };
        assert!(matches!(
            path.discretize(1.0),
            Err(PathError::IndexOutOfRange { index: 3, .. })
        ));
    }
}
