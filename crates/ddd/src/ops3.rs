//! Mesh operations on node trees.

use ddd_math::{Point3, Transform, Vec3};
use ddd_mesh::uv::{self, UvParams};
use ddd_mesh::TriMesh;
use ddd_path::Path3;
use geo::{AffineOps, AffineTransform};
use tracing::warn;

use crate::node::{Node, NodeKind};

/// Instances nested deeper than this are not expanded.
const MAX_INSTANCE_DEPTH: usize = 64;

/// XY part of `t` as a planar affine transform.
pub(crate) fn planar_affine(t: &Transform) -> AffineTransform<f64> {
    let m = t.to_matrix_scaled();
    AffineTransform::new(
        m[(0, 0)],
        m[(0, 1)],
        m[(0, 3)],
        m[(1, 0)],
        m[(1, 1)],
        m[(1, 3)],
    )
}

fn collect_meshes(node: &Node, frame: &Transform, out: &mut TriMesh, depth: usize) {
    if depth > MAX_INSTANCE_DEPTH {
        warn!(node = %node.path(), "instance nesting too deep, not expanded");
        return;
    }
    let kind = node.kind().clone();
    match kind {
        NodeKind::Mesh3(Some(m)) => out.merge(&m.transformed(&frame.to_matrix_scaled())),
        NodeKind::Instance(target) => {
            let placed = frame.compose(&target.transform());
            collect_meshes(&target, &placed, out, depth + 1);
        }
        _ => {}
    }
    for c in node.children() {
        collect_meshes(&c, &frame.compose(&c.transform()), out, depth);
    }
}

impl Node {
    /// Copy of the subtree with every mesh replaced by `f(mesh)`.
    pub fn map_meshes(&self, mut f: impl FnMut(&TriMesh) -> TriMesh) -> Node {
        let copy = self.copy();
        for n in copy.descendants() {
            if let Some(m) = n.mesh() {
                n.set_mesh(Some(f(&m)));
            }
        }
        copy
    }

    /// Meshes of the subtree merged into one, in this node's frame.
    ///
    /// Child transforms are baked into the vertices and instances are
    /// expanded; the node's own transform is kept on the result.
    pub fn combine(&self) -> Node {
        let mut mesh = TriMesh::new();
        collect_meshes(self, &Transform::identity(), &mut mesh, 0);
        self.copy_with(NodeKind::Mesh3((!mesh.is_empty()).then_some(mesh)))
    }

    /// Bounds of the combined subtree in this node's frame.
    pub fn bounds3(&self) -> Option<(Point3, Point3)> {
        let mut mesh = TriMesh::new();
        collect_meshes(self, &Transform::identity(), &mut mesh, 0);
        mesh.bounds()
    }

    /// Applies the node's transform to its own payload and pushes it down to
    /// its children; the node ends with an identity transform.
    pub fn bake_transform(&self) -> Node {
        let copy = self.copy();
        let t = copy.transform();
        if t.is_identity() {
            return copy;
        }
        let kind = copy.kind().clone();
        match kind {
            NodeKind::Mesh3(Some(m)) => copy.set_mesh(Some(m.transformed(&t.to_matrix_scaled()))),
            NodeKind::Geom2(Some(g)) => {
                copy.set_geometry(Some(g.affine_transform(&planar_affine(&t))));
            }
            _ => {}
        }
        for c in copy.children() {
            c.set_transform(t.compose(&c.transform()));
        }
        copy.set_transform(Transform::identity());
        copy
    }

    /// Splits every mesh along an XY grid of cell `size`.
    pub fn subdivide_to_grid(&self, size: f64) -> Node {
        self.map_meshes(|m| m.subdivide_to_grid(size))
    }

    /// Removes faces whose unit normal has a dot product of at least
    /// `min_dot` with `direction`.
    pub fn remove_faces_by_normal(&self, direction: Vec3, min_dot: f64) -> Node {
        self.map_meshes(|m| m.remove_faces_by_normal(&direction, min_dot))
    }

    /// Angle-limited smooth normals.
    pub fn smooth(&self, max_angle: f64) -> Node {
        self.map_meshes(|m| m.smooth_by_angle(max_angle))
    }

    /// Moves every vertex through `f(vertex, index)`.
    pub fn vertex_func(&self, mut f: impl FnMut(Point3, usize) -> Point3) -> Node {
        self.map_meshes(|m| m.vertex_func(&mut f))
    }

    /// Box UV projection.
    pub fn uv_cubic(&self, params: &UvParams) -> Node {
        self.map_meshes(|m| uv::cubic(m, params))
    }

    /// Cylindrical UV projection around the vertical axis through `center`.
    pub fn uv_cylindrical(&self, center: &Point3, params: &UvParams) -> Node {
        self.map_meshes(|m| uv::cylindrical(m, center, params))
    }

    /// Spherical UV projection around `center`.
    pub fn uv_spherical(&self, center: &Point3, params: &UvParams) -> Node {
        self.map_meshes(|m| uv::spherical(m, center, params))
    }

    /// UVs along `path`: U across, V along.
    pub fn uv_path(&self, path: &Path3, params: &UvParams) -> Node {
        self.map_meshes(|m| uv::path(m, path, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use approx::assert_relative_eq;

    #[test]
    fn test_combine_expands_instances() {
        let proto = builder::cube("tree", 1.0);
        let root = builder::group3("forest");
        for i in 0..3 {
            let inst = builder::instance(&format!("t{i}"), &proto);
            inst.translate(Vec3::new(i as f64 * 2.0, 0.0, 0.0));
            root.append(&inst).unwrap();
        }
        let combined = root.combine();
        let mesh = combined.mesh().unwrap();
        assert_eq!(mesh.num_triangles(), 36);
        assert_eq!(combined.num_children(), 0);
        let (min, max) = root.bounds3().unwrap();
        assert_relative_eq!(min.x, -0.5);
        assert_relative_eq!(max.x, 4.5);
        assert_relative_eq!(mesh.signed_volume(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_combine_bakes_child_scale() {
        let root = builder::group3("root");
        let c = builder::cube("c", 1.0);
        c.scale(Vec3::new(2.0, 1.0, 1.0));
        root.append(&c).unwrap();
        assert_relative_eq!(root.combine().mesh().unwrap().signed_volume(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_remove_top_faces() {
        let c = builder::cube("c", 1.0);
        let open = c.remove_faces_by_normal(Vec3::z(), 0.9);
        assert_eq!(open.mesh().unwrap().num_triangles(), 10);
        assert_eq!(c.mesh().unwrap().num_triangles(), 12);
    }

    #[test]
    fn test_uv_cubic_assigns_coordinates() {
        let c = builder::cube("c", 1.0).uv_cubic(&UvParams::default());
        let m = c.mesh().unwrap();
        assert_eq!(m.uvs.as_ref().unwrap().len(), m.vertices.len());
    }

    #[test]
    fn test_vertex_func_and_bake() {
        let c = builder::cube("c", 2.0).vertex_func(|p, _| Point3::new(p.x, p.y, p.z + 1.0));
        let (min, _) = c.mesh().unwrap().bounds().unwrap();
        assert_relative_eq!(min.z, 0.0);

        c.translate(Vec3::new(10.0, 0.0, 0.0));
        let child = builder::cube("child", 1.0);
        c.append(&child).unwrap();
        let baked = c.bake_transform();
        assert!(baked.transform().is_identity());
        let (min, _) = baked.mesh().unwrap().bounds().unwrap();
        assert_relative_eq!(min.x, 9.0);
        assert_relative_eq!(baked.child(0).unwrap().transform().position.x, 10.0);
    }

    #[test]
    fn test_bake_planar_translation() {
        let r = builder::rect("r", [0.0, 0.0, 1.0, 1.0]);
        r.translate(Vec3::new(3.0, 0.0, 0.0));
        let baked = r.bake_transform();
        assert_relative_eq!(baked.bounds().unwrap().min().x, 3.0);
        assert_relative_eq!(baked.area(), 1.0);
    }
}
