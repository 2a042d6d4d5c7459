//! Planar operations on node trees.
//!
//! Every operation returns a new tree and leaves its input untouched.
//! Operations that act per geometry apply to the node and all its
//! descendants; instances and 3D nodes are carried over unchanged.

use ddd_geom2::extrude::{self, ExtrudeOptions, ExtrudeStepOptions, StepState};
use ddd_geom2::ops::{self, BufferOptions, CleanOptions, Cleaned};
use ddd_mesh::TriMesh;
use ddd_path::Path3;
use geo::{Geometry, Rect, Validation};
use tracing::{debug, warn};

use crate::meta::MetaValue;
use crate::node::{Node, NodeKind};
use crate::{DddError, Result};

const LAST_SHAPE: &str = "_extrusion_last_shape";
const LAST_OFFSET: &str = "_extrusion_last_offset";
const LAST_CAP: &str = "_extrusion_last_cap_idx";

fn is_valid(g: &Geometry<f64>) -> bool {
    ddd_geom2::to_multipolygon(g).is_valid()
}

/// Runs `op`, retrying on the cleaned input when the output is invalid.
/// A result that is still invalid is dropped.
fn robust(
    node: &Node,
    g: &Geometry<f64>,
    op: impl Fn(&Geometry<f64>) -> Option<Geometry<f64>>,
) -> Option<Geometry<f64>> {
    let out = op(g);
    if out.as_ref().is_none_or(is_valid) {
        return out;
    }
    debug!(node = %node.path(), "invalid result, retrying on cleaned input");
    let retried = match ops::clean(g, &CleanOptions::default()) {
        Cleaned::Kept(cleaned) => op(&cleaned),
        Cleaned::Dropped { .. } => out,
    };
    if retried.as_ref().is_none_or(is_valid) {
        return retried;
    }
    warn!(node = %node.path(), "invalid geometry after cleaning, dropped");
    None
}

/// Converts a planar tree to a 3D tree, mapping each geometry with `f`.
fn to_3d(node: &Node, f: &mut dyn FnMut(&Geometry<f64>) -> Result<TriMesh>) -> Result<Node> {
    let kind = node.kind().clone();
    let kind = match kind {
        NodeKind::Geom2(Some(g)) => {
            let mesh = f(&g).map_err(|e| e.at(node))?;
            NodeKind::Mesh3((!mesh.is_empty()).then_some(mesh))
        }
        NodeKind::Geom2(None) => NodeKind::Mesh3(None),
        other => other,
    };
    let out = node.copy_with(kind);
    for c in node.children() {
        out.append(&to_3d(&c, f)?)?;
    }
    Ok(out)
}

impl Node {
    /// Copy of the subtree with every geometry replaced by `f(node, geometry)`.
    pub fn map_geometries(
        &self,
        mut f: impl FnMut(&Node, &Geometry<f64>) -> Option<Geometry<f64>>,
    ) -> Node {
        let copy = self.copy();
        for n in copy.descendants() {
            if let Some(g) = n.geometry() {
                n.set_geometry(f(&n, &g));
            }
        }
        copy
    }

    /// Geometries of the subtree in pre-order.
    pub fn geometries(&self) -> Vec<Geometry<f64>> {
        self.descendants().iter().filter_map(Node::geometry).collect()
    }

    /// Buffers every geometry by `distance`.
    pub fn buffer(&self, distance: f64, options: &BufferOptions) -> Node {
        self.map_geometries(|n, g| robust(n, g, |g| ops::buffer(g, distance, options)))
    }

    /// Single node holding the union of all geometries of the subtree.
    pub fn union(&self) -> Node {
        let geoms = self.geometries();
        self.copy_with(NodeKind::Geom2(ops::union_all(&geoms)))
    }

    /// Single node holding the union of this subtree and `other`.
    pub fn union_with(&self, other: &Node) -> Node {
        let mut geoms = self.geometries();
        geoms.extend(other.geometries());
        self.copy_with(NodeKind::Geom2(ops::union_all(&geoms)))
    }

    /// Intersects every geometry with the union of `other`.
    pub fn intersection(&self, other: &Node) -> Node {
        let mask = other.union().geometry();
        self.map_geometries(|n, g| {
            let m = mask.as_ref()?;
            robust(n, g, |g| ops::intersection(g, m))
        })
    }

    /// Removes the union of `other` from every geometry. Children are kept.
    pub fn subtract(&self, other: &Node) -> Node {
        let mask = other.union().geometry();
        self.map_geometries(|n, g| match &mask {
            Some(m) => robust(n, g, |g| ops::difference(g, m)),
            None => Some(g.clone()),
        })
    }

    /// Snaps and repairs every geometry.
    ///
    /// Geometries that collapse or stay invalid are dropped with a warning;
    /// with `remove_empty`, leaf nodes that lost their geometry are removed.
    pub fn clean(&self, options: &CleanOptions) -> Node {
        let copy = self.copy();
        for n in copy.descendants() {
            let Some(g) = n.geometry() else {
                continue;
            };
            match ops::clean(&g, options) {
                Cleaned::Kept(g) => n.set_geometry(Some(g)),
                Cleaned::Dropped { invalid } => {
                    if invalid > 0 {
                        warn!(node = %n.path(), invalid, "dropping invalid geometry");
                    }
                    n.set_geometry(None);
                    if options.remove_empty && n.num_children() == 0 {
                        n.detach();
                    }
                }
            }
        }
        copy
    }

    /// Splits multi-part geometries into one child per part.
    ///
    /// Parts are named `<name>_<i>` and inherit metadata and material.
    /// With `always`, single-part geometries are moved to a child too.
    pub fn individualize(&self, remove_interiors: bool, always: bool) -> Result<Node> {
        let copy = self.copy();
        for n in copy.descendants() {
            let Some(g) = n.geometry() else {
                continue;
            };
            let parts = ops::individualize(&g, remove_interiors);
            if parts.len() < 2 && !always {
                if remove_interiors {
                    n.set_geometry(parts.into_iter().next());
                }
                continue;
            }
            n.set_geometry(None);
            for (i, part) in parts.into_iter().enumerate() {
                let child = n.copy_with(NodeKind::Geom2(Some(part)));
                child.set_name(format!("{}_{i}", n.name()));
                n.append(&child)?;
            }
        }
        Ok(copy)
    }

    /// Simplifies every geometry with tolerance `distance`.
    pub fn simplify(&self, distance: f64) -> Node {
        self.map_geometries(|_, g| ops::simplify(g, distance))
    }

    /// Triangulates the tree into 3D nodes on z = 0.
    ///
    /// # Errors
    ///
    /// [`DddError::Triangulation`] naming the node whose geometry could not
    /// be triangulated even after cleaning.
    pub fn triangulate(&self, twosided: bool) -> Result<Node> {
        to_3d(self, &mut |g| Ok(ddd_geom2::triangulate(g, twosided)?))
    }

    /// Extrudes the tree into prisms of height `height`.
    pub fn extrude(&self, height: f64, options: &ExtrudeOptions) -> Result<Node> {
        to_3d(self, &mut |g| Ok(extrude::extrude(g, height, options)?))
    }

    /// Sweeps every geometry along `path`.
    pub fn extrude_along(&self, path: &Path3) -> Result<Node> {
        let points = path.polyline()?;
        to_3d(self, &mut |g| Ok(ddd_geom2::sweep::extrude_along(g, &points)?))
    }

    /// Extends a stacked extrusion up (or down) to `shape` at absolute height `offset`.
    ///
    /// The first step starts from a 2D node's own geometry at height 0; later
    /// steps continue from the state stored in the 3D node's transient
    /// `_extrusion_*` metadata. An empty `shape` converges to the centroid.
    pub fn extrude_step(
        &self,
        shape: &Node,
        offset: f64,
        options: &ExtrudeStepOptions,
    ) -> Result<Node> {
        let (mesh, state) = self.step_state()?;
        let next = shape.union().geometry();
        let (mesh, state) = extrude::extrude_step(&mesh, &state, next.as_ref(), offset, options)
            .map_err(|e| DddError::from(e).at(self))?;

        let out = self.copy_with(NodeKind::Mesh3(Some(mesh)));
        let last = match state.shape {
            Some(g) => MetaValue::Node(Node::new2("_extrusion_shape", Some(g))),
            None => MetaValue::Null,
        };
        out.set(LAST_SHAPE, last).set(LAST_OFFSET, state.offset).set(
            LAST_CAP,
            state.cap_start.map_or(MetaValue::Null, MetaValue::from),
        );
        for c in self.children() {
            out.append(&c.copy())?;
        }
        Ok(out)
    }

    fn step_state(&self) -> Result<(TriMesh, StepState)> {
        if let Some(g) = self.geometry() {
            return Ok((TriMesh::new(), StepState::start(g)));
        }
        let mesh = self.mesh().unwrap_or_default();
        let shape = match self.require(LAST_SHAPE)? {
            MetaValue::Node(n) => n.geometry(),
            _ => None,
        };
        let offset = self
            .get(LAST_OFFSET)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                DddError::MissingMetadata {
                    key: LAST_OFFSET.to_string(),
                    node: None,
                }
                .at(self)
            })?;
        let cap_start = self
            .get(LAST_CAP)
            .and_then(|v| v.as_f64())
            .map(|v| v as usize);
        Ok((
            mesh,
            StepState {
                shape,
                offset,
                cap_start,
            },
        ))
    }

    // -- measures ------------------------------------------------------------

    /// Total area of the subtree's geometries.
    pub fn area(&self) -> f64 {
        self.geometries().iter().map(ddd_geom2::area).sum()
    }

    /// Total length of the subtree's line geometries.
    pub fn length(&self) -> f64 {
        self.geometries().iter().map(ddd_geom2::length).sum()
    }

    /// Centroid of the union of the subtree.
    pub fn centroid(&self) -> Option<geo::Point<f64>> {
        self.union().geometry().as_ref().and_then(ddd_geom2::centroid)
    }

    /// Bounding rectangle of the subtree's geometries.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let geoms = self.geometries();
        let collection: geo::GeometryCollection<f64> = geoms.into_iter().collect();
        ddd_geom2::bounds(&Geometry::GeometryCollection(collection))
    }

    /// Node holding the convex hull of the subtree.
    pub fn convex_hull(&self) -> Node {
        let geoms = self.geometries();
        let hull = (!geoms.is_empty()).then(|| {
            let collection: geo::GeometryCollection<f64> = geoms.into_iter().collect();
            Geometry::Polygon(ddd_geom2::convex_hull(&Geometry::GeometryCollection(collection)))
        });
        self.copy_with(NodeKind::Geom2(hull))
    }

    /// Copy of the subtree with polygons replaced by their boundary lines.
    pub fn outline(&self) -> Node {
        self.map_geometries(|_, g| ddd_geom2::outline(g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use approx::assert_relative_eq;
    use geo::polygon;

    #[test]
    fn test_subtract_then_triangulate_area() {
        let a = builder::rect("a", [0.0, 0.0, 2.0, 2.0]);
        let b = builder::rect("b", [1.0, 1.0, 2.0, 2.0]);
        let mesh = a.subtract(&b).triangulate(false).unwrap().mesh().unwrap();
        assert_relative_eq!(mesh.area(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(a.area(), 4.0);
    }

    #[test]
    fn test_robust_drops_invalid_after_retry() {
        let node = builder::rect("a", [0.0, 0.0, 1.0, 1.0]);
        let g = node.geometry().unwrap();
        let bowtie: Geometry<f64> = geo::polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 0.0),
            (x: 0.0, y: 1.0),
        ]
        .into();
        assert!(!is_valid(&bowtie));
        assert!(robust(&node, &g, |_| Some(bowtie.clone())).is_none());
        assert_eq!(robust(&node, &g, |g| Some(g.clone())), Some(g.clone()));
    }

    #[test]
    fn test_square_mitre_buffer() {
        let r = builder::rect("r", [0.0, 0.0, 1.0, 1.0]);
        let opts = BufferOptions {
            cap: ddd_geom2::ops::CapStyle::Square,
            ..BufferOptions::mitre()
        };
        assert_relative_eq!(r.buffer(0.5, &opts).area(), 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_buffer_round_trip() {
        let r = builder::rect("r", [0.0, 0.0, 4.0, 3.0]);
        let back = r.buffer(0.1, &BufferOptions::mitre()).buffer(-0.1, &BufferOptions::mitre());
        assert_relative_eq!(back.area(), 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_union_folds_children() {
        let g = builder::group2("g");
        g.append(&builder::rect("a", [0.0, 0.0, 2.0, 1.0])).unwrap();
        g.append(&builder::rect("b", [1.0, 0.0, 3.0, 1.0])).unwrap();
        let u = g.union();
        assert_eq!(u.num_children(), 0);
        assert_relative_eq!(u.area(), 3.0, epsilon = 1e-9);
        assert_eq!(g.num_children(), 2);
        let w = builder::rect("w", [10.0, 0.0, 11.0, 1.0]);
        assert_relative_eq!(g.union_with(&w).area(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_intersection_recurses_into_children() {
        let g = builder::rect("g", [0.0, 0.0, 2.0, 2.0]);
        g.append(&builder::rect("c", [1.0, 1.0, 4.0, 4.0])).unwrap();
        let mask = builder::rect("m", [0.0, 0.0, 1.5, 1.5]);
        let out = g.intersection(&mask);
        assert_relative_eq!(out.geometries().iter().map(ddd_geom2::area).sum::<f64>(), 2.25 + 0.25, epsilon = 1e-9);
        let none = g.intersection(&builder::group2("empty"));
        assert!(none.geometries().is_empty());
    }

    #[test]
    fn test_clean_removes_collapsed_leaves() {
        let g = builder::group2("g");
        g.append(&builder::rect("ok", [0.0, 0.0, 1.0, 1.0])).unwrap();
        g.append(&builder::polygon("flat", &[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]])).unwrap();
        let cleaned = g.clean(&CleanOptions::default());
        let names: Vec<String> = cleaned.children().iter().map(Node::name).collect();
        assert_eq!(names, ["ok"]);
    }

    #[test]
    fn test_individualize_names_parts() {
        let u = builder::rect("a", [0.0, 0.0, 1.0, 1.0])
            .union_with(&builder::rect("b", [3.0, 0.0, 4.0, 1.0]));
        u.set("osm:landuse", "grass");
        let parts = u.individualize(false, false).unwrap();
        assert!(parts.geometry().is_none());
        let names: Vec<String> = parts.children().iter().map(Node::name).collect();
        assert_eq!(names, ["a_0", "a_1"]);
        assert_eq!(parts.child(1).unwrap().get("osm:landuse"), Some("grass".into()));
    }

    #[test]
    fn test_extrude_keeps_metadata_and_children() {
        let r = builder::rect("house", [0.0, 0.0, 2.0, 3.0]);
        r.set("ddd:height", 4.0);
        r.append(&builder::rect("annex", [2.0, 0.0, 3.0, 1.0])).unwrap();
        let solid = r.extrude(4.0, &ExtrudeOptions::default()).unwrap();
        assert!(solid.is_3d());
        assert_eq!(solid.get("ddd:height"), Some(4.0.into()));
        assert_relative_eq!(solid.mesh().unwrap().signed_volume(), 24.0, epsilon = 1e-9);
        assert!(solid.child(0).unwrap().is_3d());
    }

    #[test]
    fn test_extrude_step_same_shape_has_extent_h() {
        let r = builder::rect("tower", [0.0, 0.0, 2.0, 2.0]);
        let s = r.extrude_step(&r, 5.0, &ExtrudeStepOptions::default()).unwrap();
        let (min, max) = s.mesh().unwrap().bounds().unwrap();
        assert_relative_eq!(max.z - min.z, 5.0);
        assert_eq!(s.get(LAST_OFFSET), Some(5.0.into()));

        let roof = builder::rect("roof", [0.5, 0.5, 1.5, 1.5]);
        let s2 = s.extrude_step(&roof, 6.0, &ExtrudeStepOptions::default()).unwrap();
        let (_, max) = s2.mesh().unwrap().bounds().unwrap();
        assert_relative_eq!(max.z, 6.0);
        assert!(s2.mesh().unwrap().signed_volume() > 20.0);
    }

    #[test]
    fn test_extrude_step_on_plain_mesh_needs_state() {
        let c = builder::cube("c", 1.0);
        let r = builder::rect("r", [0.0, 0.0, 1.0, 1.0]);
        let err = c.extrude_step(&r, 1.0, &ExtrudeStepOptions::default()).unwrap_err();
        assert!(matches!(err, DddError::MissingMetadata { .. }));
    }

    #[test]
    fn test_sweep_along_path() {
        let profile = builder::rect("p", [-0.5, 0.0, 0.5, 1.0]);
        let path = Path3::from_points(&[
            ddd_math::Point3::new(0.0, 0.0, 0.0),
            ddd_math::Point3::new(10.0, 0.0, 0.0),
        ]);
        let solid = profile.extrude_along(&path).unwrap();
        assert_relative_eq!(solid.mesh().unwrap().signed_volume(), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_measures() {
        let r = builder::rect("r", [0.0, 0.0, 2.0, 2.0]);
        let c = r.centroid().unwrap();
        assert_relative_eq!(c.x(), 1.0);
        let b = r.bounds().unwrap();
        assert_relative_eq!(b.max().x, 2.0);
        assert_relative_eq!(r.outline().length(), 8.0);
        let tri = builder::polygon("t", &[[0.0, 0.0], [2.0, 0.0], [1.0, 0.2], [1.0, 2.0]]);
        assert!(tri.convex_hull().area() > tri.area());
    }
}
