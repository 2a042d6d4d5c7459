//! Prismatic extrusion and stacked extrusion steps.
//!
//! Walls are built ring by ring: for consecutive ring coordinates `a`, `b`
//! at bottom (`0`) and top (`1`) the quad is split as `[a0, b0, b1]` and
//! `[a0, b1, a1]`. Polygons are oriented first (exterior counter-clockwise,
//! holes clockwise) so every wall faces out of the solid.

use ddd_math::Point3;
use ddd_mesh::TriMesh;
use geo::orient::Direction;
use geo::{Centroid, Coord, Geometry, LineString, Orient, Polygon};

use crate::ops::difference;
use crate::{line_strings, polygons, triangulate, GeomError};

/// Options of [`extrude`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtrudeOptions {
    /// Center the prism on z = 0 instead of starting at z = 0.
    pub center: bool,
    /// Add the top face.
    pub cap: bool,
    /// Add the bottom face.
    pub base: bool,
}

impl Default for ExtrudeOptions {
    fn default() -> Self {
        Self {
            center: false,
            cap: true,
            base: true,
        }
    }
}

/// Ring coordinates without the closing duplicate.
fn open_ring(ring: &LineString<f64>) -> &[Coord<f64>] {
    let coords = &ring.0[..];
    match (coords.first(), coords.last()) {
        (Some(a), Some(b)) if coords.len() > 1 && a == b => &coords[..coords.len() - 1],
        _ => coords,
    }
}

fn oriented_rings(polygon: &Polygon<f64>) -> Vec<Vec<Coord<f64>>> {
    let p = polygon.orient(Direction::Default);
    std::iter::once(p.exterior())
        .chain(p.interiors())
        .map(|r| open_ring(r).to_vec())
        .filter(|r| r.len() >= 3)
        .collect()
}

/// Adds the walls between `coords` at `z0` and `z1`.
fn add_walls(mesh: &mut TriMesh, coords: &[Coord<f64>], z0: f64, z1: f64, closed: bool) {
    let n = coords.len();
    if n < 2 {
        return;
    }
    let bottom: Vec<u32> = coords
        .iter()
        .map(|c| mesh.push_vertex(Point3::new(c.x, c.y, z0)))
        .collect();
    let top: Vec<u32> = coords
        .iter()
        .map(|c| mesh.push_vertex(Point3::new(c.x, c.y, z1)))
        .collect();
    let segments = if closed { n } else { n - 1 };
    for i in 0..segments {
        let j = (i + 1) % n;
        mesh.faces.push([bottom[i], bottom[j], top[j]]);
        mesh.faces.push([bottom[i], top[j], top[i]]);
    }
}

/// Flat face of `g` at height `z`, facing up or down.
fn horizontal(g: &Geometry<f64>, z: f64, up: bool) -> Result<TriMesh, GeomError> {
    let flat = triangulate(g, false)?.vertex_func(|p, _| Point3::new(p.x, p.y, z));
    Ok(if up { flat } else { flat.flipped() })
}

/// Extrudes `g` vertically by `height`.
///
/// The prism spans `min(0, height)..max(0, height)`, so a negative height
/// places the top face at z = 0. With `center` the span is shifted down by
/// half its length. Line strings become open ribbon walls without caps;
/// points are ignored.
///
/// # Errors
///
/// Returns [`GeomError::Triangulation`] when a cap cannot be triangulated.
pub fn extrude(
    g: &Geometry<f64>,
    height: f64,
    options: &ExtrudeOptions,
) -> Result<TriMesh, GeomError> {
    let (z0, z1) = if options.center {
        (-height.abs() / 2.0, height.abs() / 2.0)
    } else {
        (height.min(0.0), height.max(0.0))
    };

    let mut mesh = TriMesh::new();
    let polys = polygons(g);
    if z1 > z0 {
        for p in &polys {
            for ring in oriented_rings(p) {
                add_walls(&mut mesh, &ring, z0, z1, true);
            }
        }
        for line in line_strings(g) {
            add_walls(&mut mesh, &line.0, z0, z1, false);
        }
    }
    if !polys.is_empty() {
        if options.cap {
            mesh.merge(&horizontal(g, z1, true)?);
        }
        if options.base && z1 > z0 {
            mesh.merge(&horizontal(g, z0, false)?);
        }
    }
    Ok(mesh)
}

/// How [`extrude_step`] connects two consecutive shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtrudeMethod {
    /// Join the rings of both shapes with a triangle strip.
    #[default]
    Wrap,
    /// Add a horizontal ledge for the difference of both shapes, then
    /// vertical walls of the new shape.
    Subtract,
}

/// Options of [`extrude_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtrudeStepOptions {
    /// Close the new top with a cap.
    pub cap: bool,
    /// Close the bottom on the first step.
    pub base: bool,
    /// Connection method.
    pub method: ExtrudeMethod,
}

impl Default for ExtrudeStepOptions {
    fn default() -> Self {
        Self {
            cap: true,
            base: true,
            method: ExtrudeMethod::Wrap,
        }
    }
}

/// Where the previous extrusion step stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct StepState {
    /// Shape at the last offset; `None` once the extrusion converged to a point.
    pub shape: Option<Geometry<f64>>,
    /// Height of the last step.
    pub offset: f64,
    /// Index of the first face of the last cap, removed by the next step.
    pub cap_start: Option<usize>,
}

impl StepState {
    /// State before the first step: `shape` at height 0, nothing built.
    pub fn start(shape: Geometry<f64>) -> Self {
        Self {
            shape: Some(shape),
            offset: 0.0,
            cap_start: None,
        }
    }
}

/// Rotates `b` so that its first vertex is the one nearest to `a0` in XY.
fn align_ring(b: &mut [Coord<f64>], a0: Coord<f64>) {
    let d2 = |c: &Coord<f64>| (c.x - a0.x).powi(2) + (c.y - a0.y).powi(2);
    if let Some(start) = (0..b.len()).min_by(|&i, &j| d2(&b[i]).total_cmp(&d2(&b[j]))) {
        b.rotate_left(start);
    }
}

/// Stitches ring `a` at `za` to ring `b` at `zb`, always advancing along
/// the shorter diagonal. Both rings must share the same winding.
fn join_rings(mesh: &mut TriMesh, a: &[Coord<f64>], za: f64, b: &[Coord<f64>], zb: f64) {
    let mut b = b.to_vec();
    align_ring(&mut b, a[0]);
    let (na, nb) = (a.len(), b.len());
    let ia: Vec<u32> = a
        .iter()
        .map(|c| mesh.push_vertex(Point3::new(c.x, c.y, za)))
        .collect();
    let ib: Vec<u32> = b
        .iter()
        .map(|c| mesh.push_vertex(Point3::new(c.x, c.y, zb)))
        .collect();
    let d2 = |p: &Coord<f64>, q: &Coord<f64>| (p.x - q.x).powi(2) + (p.y - q.y).powi(2);

    let (mut i, mut j) = (0, 0);
    while i < na || j < nb {
        let advance_a = if i == na {
            false
        } else if j == nb {
            true
        } else {
            d2(&a[(i + 1) % na], &b[j % nb]) <= d2(&b[(j + 1) % nb], &a[i % na])
        };
        if advance_a {
            mesh.faces.push([ia[i % na], ia[(i + 1) % na], ib[j % nb]]);
            i += 1;
        } else {
            mesh.faces.push([ia[i % na], ib[(j + 1) % nb], ib[j % nb]]);
            j += 1;
        }
    }
}

/// Fans ring `a` at `za` to a single apex.
fn fan_ring(mesh: &mut TriMesh, a: &[Coord<f64>], za: f64, apex: Point3) {
    let ia: Vec<u32> = a
        .iter()
        .map(|c| mesh.push_vertex(Point3::new(c.x, c.y, za)))
        .collect();
    let tip = mesh.push_vertex(apex);
    for i in 0..ia.len() {
        mesh.faces.push([ia[i], ia[(i + 1) % ia.len()], tip]);
    }
}

fn wrap(
    mesh: &mut TriMesh,
    last: &Geometry<f64>,
    za: f64,
    next: Option<&Geometry<f64>>,
    zb: f64,
) {
    let last_polys = polygons(last);
    let next_polys = next.map(polygons).unwrap_or_default();
    for (k, pa) in last_polys.iter().enumerate() {
        let rings_a = oriented_rings(pa);
        let rings_b = next_polys.get(k).map(oriented_rings).unwrap_or_default();
        for (r, ring_a) in rings_a.iter().enumerate() {
            match rings_b.get(r) {
                Some(ring_b) => join_rings(mesh, ring_a, za, ring_b, zb),
                None => {
                    let c = pa.centroid().map_or(ring_a[0], |c| c.0);
                    fan_ring(mesh, ring_a, za, Point3::new(c.x, c.y, zb));
                }
            }
        }
    }
}

/// Adds one step to a stacked extrusion.
///
/// # Arguments
///
/// * `mesh` - Mesh built by previous steps (empty on the first step)
/// * `state` - Where the previous step stopped
/// * `next` - Shape at the new height; `None` converges to the centroid
/// * `offset` - Absolute height of the new shape
///
/// The cap of the previous step (faces from `state.cap_start`) is removed
/// before the new walls are added, so the stack stays closed at the top
/// only. Steps may go up or down; faces always point out of the solid.
///
/// # Returns
///
/// The extended mesh and the state to pass to the next step.
pub fn extrude_step(
    mesh: &TriMesh,
    state: &StepState,
    next: Option<&Geometry<f64>>,
    offset: f64,
    options: &ExtrudeStepOptions,
) -> Result<(TriMesh, StepState), GeomError> {
    let mut out = mesh.clone();
    if let Some(start) = state.cap_start {
        out.faces.truncate(start);
        out.remove_unreferenced_vertices();
    }
    let Some(last) = &state.shape else {
        return Ok((
            out,
            StepState {
                shape: None,
                offset: state.offset,
                cap_start: None,
            },
        ));
    };
    let (za, zb) = (state.offset, offset);
    let upward = zb >= za;
    let next = next.filter(|g| !polygons(g).is_empty());

    if mesh.is_empty() && state.cap_start.is_none() && options.base {
        out.merge(&horizontal(last, za, !upward)?);
    }

    let mut step = TriMesh::new();
    match options.method {
        ExtrudeMethod::Wrap => wrap(&mut step, last, za, next, zb),
        ExtrudeMethod::Subtract => match next {
            Some(shape) => {
                if let Some(ledge) = difference(last, shape) {
                    step.merge(&horizontal(&ledge, za, true)?);
                }
                if let Some(overhang) = difference(shape, last) {
                    step.merge(&horizontal(&overhang, za, false)?);
                }
                for p in polygons(shape) {
                    for ring in oriented_rings(&p) {
                        add_walls(&mut step, &ring, za, zb, true);
                    }
                }
            }
            None => wrap(&mut step, last, za, None, zb),
        },
    }
    // Walls and ledges above were built for an upward step.
    if !upward {
        step = step.flipped();
    }
    out.merge(&step);

    let mut cap_start = None;
    if let Some(shape) = next.filter(|_| options.cap) {
        cap_start = Some(out.faces.len());
        out.merge(&horizontal(shape, zb, upward)?);
    }
    Ok((
        out,
        StepState {
            shape: next.cloned(),
            offset,
            cap_start,
        },
    ))
}
