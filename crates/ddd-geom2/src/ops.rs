//! Buffer, boolean and cleanup operations.
//!
//! All operations take geometries by reference and return new ones.
//! Polygonal parts go through `geo`'s boolean engine; line parts are
//! clipped; points are kept or dropped by containment.

use std::f64::consts::FRAC_PI_2;

use geo::algorithm::buffer::{Buffer, BufferStyle, LineCap, LineJoin};
use geo::{
    unary_union, BooleanOps, Contains, Geometry, LineString, MultiLineString, MultiPolygon,
    Polygon, Simplify, SimplifyVwPreserve, Validation,
};

use crate::{from_multipolygon, from_parts, is_empty, line_strings, points, polygons};

/// End cap of buffered lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapStyle {
    /// Half disc around the end point.
    #[default]
    Round,
    /// Cut at the end point.
    Flat,
    /// Half square around the end point.
    Square,
}

/// Corner join of buffered outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinStyle {
    /// Circular arc.
    #[default]
    Round,
    /// Extended edges, limited by the mitre limit.
    Mitre,
    /// Straight cut.
    Bevel,
}

/// Options of [`buffer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferOptions {
    /// Segments per quarter circle in round caps and joins.
    pub resolution: usize,
    /// Line end caps.
    pub cap: CapStyle,
    /// Corner joins.
    pub join: JoinStyle,
    /// Ratio of mitre length to buffer distance above which mitres are bevelled.
    pub mitre_limit: f64,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            resolution: 8,
            cap: CapStyle::Round,
            join: JoinStyle::Round,
            mitre_limit: 5.0,
        }
    }
}

impl BufferOptions {
    /// Mitre joins with flat caps, used by snapping in [`clean`].
    pub fn mitre() -> Self {
        Self {
            cap: CapStyle::Flat,
            join: JoinStyle::Mitre,
            ..Self::default()
        }
    }

    fn style(&self, distance: f64) -> BufferStyle<f64> {
        let step = FRAC_PI_2 / self.resolution.max(1) as f64;
        let join = match self.join {
            JoinStyle::Round => LineJoin::Round(step),
            JoinStyle::Bevel => LineJoin::Bevel,
            // A mitre of ratio r spans a corner whose angle is 2·asin(1/r).
            JoinStyle::Mitre => LineJoin::Miter(2.0 * (1.0 / self.mitre_limit.max(1.0)).asin()),
        };
        let cap = match self.cap {
            CapStyle::Round => LineCap::Round(step),
            CapStyle::Flat => LineCap::Butt,
            CapStyle::Square => LineCap::Square,
        };
        BufferStyle::new(distance).line_join(join).line_cap(cap)
    }
}

/// Minkowski buffer of `g` by `distance`.
///
/// Negative distances shrink polygons; lines and points vanish under a
/// negative buffer. Returns `None` when nothing is left.
pub fn buffer(g: &Geometry<f64>, distance: f64, options: &BufferOptions) -> Option<Geometry<f64>> {
    if distance == 0.0 {
        return (!is_empty(g)).then(|| g.clone());
    }
    let mut parts: Vec<MultiPolygon<f64>> = Vec::new();
    let polys = polygons(g);
    if !polys.is_empty() {
        parts.push(MultiPolygon(polys).buffer_with_style(options.style(distance)));
    }
    if distance > 0.0 {
        let lines = line_strings(g);
        if !lines.is_empty() {
            parts.push(MultiLineString(lines).buffer_with_style(options.style(distance)));
        }
        for p in points(g) {
            parts.push(p.buffer_with_style(options.style(distance)));
        }
    }
    let merged = match parts.len() {
        0 => return None,
        1 => parts.swap_remove(0),
        _ => unary_union(parts.iter()),
    };
    from_multipolygon(merged)
}

/// Union of all geometries.
///
/// Polygonal parts are dissolved; lines and points are collected.
pub fn union_all<'a>(geoms: impl IntoIterator<Item = &'a Geometry<f64>>) -> Option<Geometry<f64>> {
    let mut polys = Vec::new();
    let mut lines = Vec::new();
    let mut pts = Vec::new();
    for g in geoms {
        polys.extend(polygons(g));
        lines.extend(line_strings(g));
        pts.extend(points(g));
    }
    let dissolved = if polys.is_empty() {
        Vec::new()
    } else {
        unary_union(polys.iter()).0
    };
    from_parts(dissolved, lines, pts)
}

/// Union of two geometries.
pub fn union(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Geometry<f64>> {
    union_all([a, b])
}

fn clip_parts(a: &Geometry<f64>, b: &Geometry<f64>, invert: bool) -> Option<Geometry<f64>> {
    let mask = MultiPolygon(polygons(b));
    let mut polys = Vec::new();
    let a_polys = MultiPolygon(polygons(a));
    if !a_polys.0.is_empty() {
        polys = if invert {
            a_polys.difference(&mask).0
        } else {
            a_polys.intersection(&mask).0
        };
    }
    let lines = line_strings(a);
    let lines: Vec<LineString<f64>> = if lines.is_empty() {
        lines
    } else if mask.0.is_empty() {
        if invert {
            lines
        } else {
            Vec::new()
        }
    } else {
        mask.clip(&MultiLineString(lines), invert).0
    };
    let pts = points(a)
        .into_iter()
        .filter(|p| mask.contains(p) != invert)
        .collect();
    from_parts(polys, lines, pts)
}

/// Parts of `a` inside `b`.
pub fn intersection(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Geometry<f64>> {
    clip_parts(a, b, false)
}

/// Parts of `a` outside `b`.
pub fn difference(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Geometry<f64>> {
    clip_parts(a, b, true)
}

/// Options of [`clean`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanOptions {
    /// Snap distance; zero disables snapping.
    pub eps: f64,
    /// Return `None` for empty results.
    pub remove_empty: bool,
    /// Check polygon validity after snapping.
    pub validate: bool,
    /// Try to repair invalid polygons before dropping them.
    pub fix_invalid: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            eps: 0.01,
            remove_empty: true,
            validate: true,
            fix_invalid: true,
        }
    }
}

/// Outcome of [`clean`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cleaned {
    /// Geometry after snapping and repair.
    Kept(Geometry<f64>),
    /// Everything collapsed or stayed invalid.
    Dropped {
        /// Polygons discarded because they could not be repaired.
        invalid: usize,
    },
}

impl Cleaned {
    /// The kept geometry, if any.
    pub fn into_option(self) -> Option<Geometry<f64>> {
        match self {
            Cleaned::Kept(g) => Some(g),
            Cleaned::Dropped { .. } => None,
        }
    }
}

/// Snaps, closes and repairs `g`.
///
/// With `eps != 0` polygons are buffered out and back in by `eps` using
/// mitre joins, which closes slivers and snaps near-coincident edges.
/// Invalid polygons are re-resolved through a unary union; polygons that
/// stay invalid are dropped.
pub fn clean(g: &Geometry<f64>, options: &CleanOptions) -> Cleaned {
    let mut polys = polygons(g);
    if options.eps != 0.0 && !polys.is_empty() {
        let mitre = BufferOptions::mitre();
        let grown = MultiPolygon(polys).buffer_with_style(mitre.style(options.eps));
        polys = grown.buffer_with_style(mitre.style(-options.eps)).0;
    }

    let mut invalid = 0;
    if options.validate {
        let mut kept = Vec::with_capacity(polys.len());
        for p in polys {
            if p.is_valid() {
                kept.push(p);
                continue;
            }
            let repaired: Vec<Polygon<f64>> = if options.fix_invalid {
                unary_union([&p]).0
            } else {
                Vec::new()
            };
            if !repaired.is_empty() && repaired.iter().all(|r| r.is_valid()) {
                kept.extend(repaired);
            } else {
                invalid += 1;
            }
        }
        polys = kept;
    }

    match from_parts(polys, line_strings(g), points(g)) {
        Some(out) if !(options.remove_empty && is_empty(&out)) => Cleaned::Kept(out),
        _ => Cleaned::Dropped { invalid },
    }
}

/// Splits `g` into one geometry per part.
///
/// With `remove_interiors` polygon holes are dropped.
pub fn individualize(g: &Geometry<f64>, remove_interiors: bool) -> Vec<Geometry<f64>> {
    let mut out = Vec::new();
    for p in polygons(g) {
        let p = if remove_interiors {
            Polygon::new(p.exterior().clone(), Vec::new())
        } else {
            p
        };
        out.push(Geometry::Polygon(p));
    }
    out.extend(line_strings(g).into_iter().map(Geometry::LineString));
    out.extend(points(g).into_iter().map(Geometry::Point));
    out
}

/// Douglas-Peucker simplification with tolerance `distance`.
///
/// Falls back to topology-preserving Visvalingam-Whyatt when the
/// Douglas-Peucker result is not valid.
pub fn simplify(g: &Geometry<f64>, distance: f64) -> Option<Geometry<f64>> {
    let polys = MultiPolygon(polygons(g));
    let mut simplified = polys.simplify(distance);
    if !simplified.is_valid() {
        simplified = polys.simplify_vw_preserve(distance * distance);
    }
    let lines = MultiLineString(line_strings(g)).simplify(distance);
    from_parts(simplified.0, lines.0, points(g))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{area, rect};
    use approx::assert_relative_eq;
    use geo::{Area, Point};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(rect([x0, y0, x1, y1]))
    }

    #[test]
    fn test_buffer_point_is_inscribed_disc() {
        let p = Geometry::Point(Point::new(0.0, 0.0));
        let b = buffer(&p, 1.0, &BufferOptions::default()).unwrap();
        assert!(area(&b) > 3.0 && area(&b) < std::f64::consts::PI + 1e-9);
    }

    #[test]
    fn test_mitre_buffer_of_unit_square() {
        let g = square(-0.5, -0.5, 0.5, 0.5);
        let b = buffer(&g, 0.5, &BufferOptions::mitre()).unwrap();
        assert_relative_eq!(area(&b), 4.0, epsilon = 1e-9);
        // Round joins cut the corners.
        let rounded = buffer(&g, 0.5, &BufferOptions::default()).unwrap();
        assert!(area(&rounded) < 4.0 && area(&rounded) > 1.0 + 4.0 * 0.5);
    }

    #[test]
    fn test_buffer_grow_and_shrink_round_trip() {
        let g = square(0.0, 0.0, 4.0, 3.0);
        let opts = BufferOptions::mitre();
        let grown = buffer(&g, 0.5, &opts).unwrap();
        assert_relative_eq!(area(&grown), 5.0 * 4.0, epsilon = 1e-6);
        let back = buffer(&grown, -0.5, &opts).unwrap();
        assert_relative_eq!(area(&back), 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_negative_buffer_collapses() {
        let g = square(0.0, 0.0, 1.0, 1.0);
        assert!(buffer(&g, -0.6, &BufferOptions::default()).is_none());
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]));
        assert!(buffer(&line, -1.0, &BufferOptions::default()).is_none());
    }

    #[test]
    fn test_flat_line_buffer_is_rectangle() {
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]));
        let opts = BufferOptions {
            cap: CapStyle::Flat,
            ..BufferOptions::default()
        };
        let b = buffer(&line, 1.0, &opts).unwrap();
        assert_relative_eq!(area(&b), 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_union_dissolves_overlap() {
        let u = union(&square(0.0, 0.0, 2.0, 2.0), &square(1.0, 0.0, 3.0, 2.0)).unwrap();
        assert!(matches!(u, Geometry::Polygon(_)));
        assert_relative_eq!(area(&u), 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_union_keeps_disjoint_parts() {
        let u = union_all(&[square(0.0, 0.0, 1.0, 1.0), square(5.0, 5.0, 6.0, 6.0)]).unwrap();
        assert!(matches!(u, Geometry::MultiPolygon(ref mp) if mp.0.len() == 2));
    }

    #[test]
    fn test_intersection_and_difference() {
        let a = square(0.0, 0.0, 2.0, 2.0);
        let b = square(1.0, 1.0, 3.0, 3.0);
        assert_relative_eq!(area(&intersection(&a, &b).unwrap()), 1.0, epsilon = 1e-9);
        assert_relative_eq!(area(&difference(&a, &b).unwrap()), 3.0, epsilon = 1e-9);
        assert!(intersection(&a, &square(5.0, 5.0, 6.0, 6.0)).is_none());
    }

    #[test]
    fn test_lines_are_clipped() {
        let line = Geometry::LineString(LineString::from(vec![(-1.0, 0.5), (3.0, 0.5)]));
        let mask = square(0.0, 0.0, 2.0, 1.0);
        let inside = intersection(&line, &mask).unwrap();
        assert_relative_eq!(crate::length(&inside), 2.0, epsilon = 1e-9);
        let outside = difference(&line, &mask).unwrap();
        assert_relative_eq!(crate::length(&outside), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_points_filtered_by_containment() {
        let pts = Geometry::MultiPoint(vec![Point::new(0.5, 0.5), Point::new(5.0, 5.0)].into());
        let mask = square(0.0, 0.0, 1.0, 1.0);
        assert_eq!(points(&intersection(&pts, &mask).unwrap()).len(), 1);
        assert_eq!(points(&difference(&pts, &mask).unwrap()), vec![Point::new(5.0, 5.0)]);
    }

    #[test]
    fn test_clean_closes_slits() {
        // A 0.001 wide slit closes under a 0.01 snap.
        let ring = LineString::from(vec![
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 1.0),
            (1.0005, 1.0),
            (1.0005, 0.5),
            (0.9995, 0.5),
            (0.9995, 1.0),
            (0.0, 1.0),
            (0.0, 0.0),
        ]);
        let g = Geometry::Polygon(Polygon::new(ring, vec![]));
        let cleaned = clean(&g, &CleanOptions::default()).into_option().unwrap();
        assert_relative_eq!(area(&cleaned), 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_clean_drops_collapsed() {
        let flat = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]);
        let g = Geometry::Polygon(Polygon::new(flat, vec![]));
        assert!(matches!(
            clean(&g, &CleanOptions::default()),
            Cleaned::Dropped { .. }
        ));
    }

    #[test]
    fn test_individualize_splits_parts() {
        let hole = rect([1.0, 1.0, 2.0, 2.0]).exterior().clone();
        let holed = Polygon::new(rect([0.0, 0.0, 3.0, 3.0]).exterior().clone(), vec![hole]);
        let g = Geometry::MultiPolygon(MultiPolygon(vec![holed, rect([5.0, 5.0, 6.0, 6.0])]));
        let parts = individualize(&g, false);
        assert_eq!(parts.len(), 2);
        assert_relative_eq!(area(&parts[0]), 8.0);
        let solid = individualize(&g, true);
        assert_relative_eq!(area(&solid[0]), 9.0);
    }

    #[test]
    fn test_simplify_drops_collinear_vertices() {
        let ring = LineString::from(vec![
            (0.0, 0.0),
            (1.0, 0.001),
            (2.0, 0.0),
            (2.0, 2.0),
            (0.0, 2.0),
            (0.0, 0.0),
        ]);
        let g = Geometry::Polygon(Polygon::new(ring, vec![]));
        let s = simplify(&g, 0.01).unwrap();
        let p = &polygons(&s)[0];
        assert_eq!(p.exterior().0.len(), 5);
        assert_relative_eq!(p.unsigned_area(), 4.0, epsilon = 1e-9);
    }
}
