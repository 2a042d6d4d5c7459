#![warn(missing_docs)]

//! Triangle meshes for ddd.
//!
//! [`TriMesh`] stores indexed triangles with optional per-vertex UVs and
//! normals. The free-standing algorithms live in submodules:
//! - [`grid`]: clip triangles to an XY grid
//! - [`smooth`]: angle-limited vertex normal smoothing
//! - [`uv`]: cubic, cylindrical, spherical and path UV projection
//! - [`primitives`]: spheres and boxes

pub mod grid;
pub mod primitives;
pub mod smooth;
pub mod uv;

use ddd_math::{Point3, Vec3};
use nalgebra::Matrix4;
use thiserror::Error;

/// Errors from mesh validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeshError {
    /// A face refers to a vertex that does not exist.
    #[error("face {face} references vertex {index} but mesh has {len} vertices")]
    IndexOutOfRange {
        /// Face index.
        face: usize,
        /// Offending vertex index.
        index: u32,
        /// Number of vertices.
        len: usize,
    },
    /// A per-vertex attribute does not match the vertex count.
    #[error("{attribute} has {actual} entries, expected {expected}")]
    AttributeLength {
        /// Attribute name.
        attribute: &'static str,
        /// Vertex count.
        expected: usize,
        /// Attribute length.
        actual: usize,
    },
}

/// Quantize a position for vertex welding.
pub(crate) fn quantize(p: &Point3) -> [i64; 3] {
    [
        (p.x * 1e9).round() as i64,
        (p.y * 1e9).round() as i64,
        (p.z * 1e9).round() as i64,
    ]
}

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Triangles, counter-clockwise when seen from outside.
    pub faces: Vec<[u32; 3]>,
    /// Optional per-vertex texture coordinates.
    pub uvs: Option<Vec<[f64; 2]>>,
    /// Optional per-vertex normals.
    pub normals: Option<Vec<Vec3>>,
}

impl TriMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mesh from positions and faces, without attributes.
    pub fn from_parts(vertices: Vec<Point3>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            faces,
            uvs: None,
            normals: None,
        }
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.faces.len()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// True when the mesh has no faces.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Appends a vertex and returns its index.
    pub fn push_vertex(&mut self, p: Point3) -> u32 {
        self.vertices.push(p);
        (self.vertices.len() - 1) as u32
    }

    /// Checks face indices and attribute lengths.
    pub fn validate(&self) -> Result<(), MeshError> {
        let len = self.vertices.len();
        for (face, tri) in self.faces.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= len) {
                return Err(MeshError::IndexOutOfRange { face, index, len });
            }
        }
        if let Some(uvs) = &self.uvs {
            if uvs.len() != len {
                return Err(MeshError::AttributeLength {
                    attribute: "uvs",
                    expected: len,
                    actual: uvs.len(),
                });
            }
        }
        if let Some(normals) = &self.normals {
            if normals.len() != len {
                return Err(MeshError::AttributeLength {
                    attribute: "normals",
                    expected: len,
                    actual: normals.len(),
                });
            }
        }
        Ok(())
    }

    /// Appends `other`, offsetting its face indices.
    ///
    /// An attribute present on only one side is padded with zeros.
    pub fn merge(&mut self, other: &TriMesh) {
        let offset = self.vertices.len() as u32;
        let (n_self, n_other) = (self.vertices.len(), other.vertices.len());

        self.uvs = merge_attribute(self.uvs.take(), other.uvs.as_ref(), n_self, n_other, [0.0; 2]);
        self.normals = merge_attribute(
            self.normals.take(),
            other.normals.as_ref(),
            n_self,
            n_other,
            Vec3::zeros(),
        );
        self.vertices.extend_from_slice(&other.vertices);
        self.faces
            .extend(other.faces.iter().map(|f| [f[0] + offset, f[1] + offset, f[2] + offset]));
    }

    /// Merges several meshes into one.
    pub fn combine<'a>(meshes: impl IntoIterator<Item = &'a TriMesh>) -> TriMesh {
        let mut out = TriMesh::new();
        for m in meshes {
            out.merge(m);
        }
        out
    }

    /// Copy with every vertex transformed by `matrix`; normals use the
    /// inverse transpose. Winding is reversed for mirroring matrices.
    pub fn transformed(&self, matrix: &Matrix4<f64>) -> TriMesh {
        let vertices = self
            .vertices
            .iter()
            .map(|p| matrix.transform_point(p))
            .collect();
        let linear = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let normals = self.normals.as_ref().map(|ns| {
            let inv_t = linear.try_inverse().map(|m| m.transpose()).unwrap_or(linear);
            ns.iter()
                .map(|n| {
                    let t = inv_t * n;
                    let len = t.norm();
                    if len > 1e-12 {
                        t / len
                    } else {
                        *n
                    }
                })
                .collect()
        });
        let mut out = TriMesh {
            vertices,
            faces: self.faces.clone(),
            uvs: self.uvs.clone(),
            normals,
        };
        if linear.determinant() < 0.0 {
            out.faces.iter_mut().for_each(|f| f.swap(1, 2));
        }
        out
    }

    /// Copy with reversed winding and negated normals.
    pub fn flipped(&self) -> TriMesh {
        let mut out = self.clone();
        out.faces.iter_mut().for_each(|f| f.swap(1, 2));
        if let Some(ns) = &mut out.normals {
            ns.iter_mut().for_each(|n| *n = -*n);
        }
        out
    }

    fn corners(&self, face: usize) -> [Point3; 3] {
        let f = self.faces[face];
        [
            self.vertices[f[0] as usize],
            self.vertices[f[1] as usize],
            self.vertices[f[2] as usize],
        ]
    }

    /// Unnormalized face normal (length is twice the face area).
    pub fn face_cross(&self, face: usize) -> Vec3 {
        let [a, b, c] = self.corners(face);
        (b - a).cross(&(c - a))
    }

    /// Unit face normals; degenerate faces get a zero vector.
    pub fn face_normals(&self) -> Vec<Vec3> {
        (0..self.faces.len())
            .map(|i| {
                let n = self.face_cross(i);
                let len = n.norm();
                if len > 1e-12 {
                    n / len
                } else {
                    Vec3::zeros()
                }
            })
            .collect()
    }

    /// Total surface area.
    pub fn area(&self) -> f64 {
        (0..self.faces.len())
            .map(|i| self.face_cross(i).norm() / 2.0)
            .sum()
    }

    /// Signed enclosed volume; positive for outward-facing closed meshes.
    pub fn signed_volume(&self) -> f64 {
        (0..self.faces.len())
            .map(|i| {
                let [a, b, c] = self.corners(i);
                a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
            })
            .sum()
    }

    /// Flips a closed mesh whose faces point inward.
    pub fn fix_orientation(&mut self) {
        if self.signed_volume() < 0.0 {
            *self = self.flipped();
        }
    }

    /// Axis-aligned bounds, or `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), p| {
            (
                Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        }))
    }

    /// Removes faces whose unit normal has `dot(normal, direction) >= min_dot`,
    /// then drops vertices no longer referenced.
    pub fn remove_faces_by_normal(&self, direction: &Vec3, min_dot: f64) -> TriMesh {
        let dir = direction.try_normalize(1e-12).unwrap_or(Vec3::z());
        let normals = self.face_normals();
        let mut out = self.clone();
        out.faces = self
            .faces
            .iter()
            .zip(&normals)
            .filter(|(_, n)| n.dot(&dir) < min_dot)
            .map(|(f, _)| *f)
            .collect();
        out.remove_unreferenced_vertices();
        out
    }

    /// Drops vertices not used by any face and reindexes faces.
    pub fn remove_unreferenced_vertices(&mut self) {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut next = 0u32;
        for f in &self.faces {
            for &i in f {
                if remap[i as usize] == u32::MAX {
                    remap[i as usize] = next;
                    next += 1;
                }
            }
        }
        let count = next as usize;
        self.vertices = compact(std::mem::take(&mut self.vertices), &remap, count);
        if let Some(uvs) = self.uvs.take() {
            self.uvs = Some(compact(uvs, &remap, count));
        }
        if let Some(ns) = self.normals.take() {
            self.normals = Some(compact(ns, &remap, count));
        }
        for f in &mut self.faces {
            for i in f.iter_mut() {
                *i = remap[*i as usize];
            }
        }
    }

    /// Copy with every vertex remapped by `f(position, index)`.
    pub fn vertex_func(&self, mut f: impl FnMut(Point3, usize) -> Point3) -> TriMesh {
        let mut out = self.clone();
        for (i, v) in out.vertices.iter_mut().enumerate() {
            *v = f(*v, i);
        }
        out
    }

    /// Area-weighted vertex normals from the current faces.
    pub fn compute_vertex_normals(&mut self) {
        let mut acc = vec![Vec3::zeros(); self.vertices.len()];
        for i in 0..self.faces.len() {
            let n = self.face_cross(i);
            for &v in &self.faces[i] {
                acc[v as usize] += n;
            }
        }
        self.normals = Some(
            acc.into_iter()
                .map(|n| n.try_normalize(1e-12).unwrap_or(Vec3::z()))
                .collect(),
        );
    }

    /// Welds vertices at identical positions (1e-9 quantization) that also
    /// share UVs and normals.
    pub fn merge_vertices(&mut self) {
        use std::collections::HashMap;
        let mut cache: HashMap<([i64; 3], [i64; 2], [i64; 3]), u32> = HashMap::new();
        let mut remap = Vec::with_capacity(self.vertices.len());
        let mut out = TriMesh {
            uvs: self.uvs.as_ref().map(|_| Vec::new()),
            normals: self.normals.as_ref().map(|_| Vec::new()),
            ..TriMesh::new()
        };
        for (i, p) in self.vertices.iter().enumerate() {
            let uv = self.uvs.as_ref().map(|u| u[i]);
            let n = self.normals.as_ref().map(|ns| ns[i]);
            let uv_key = uv.map_or([0, 0], |u| [(u[0] * 1e9).round() as i64, (u[1] * 1e9).round() as i64]);
            let n_key = n.map_or([0; 3], |n| quantize(&Point3::from(n)));
            let idx = *cache.entry((quantize(p), uv_key, n_key)).or_insert_with(|| {
                out.vertices.push(*p);
                if let (Some(dst), Some(uv)) = (&mut out.uvs, uv) {
                    dst.push(uv);
                }
                if let (Some(dst), Some(n)) = (&mut out.normals, n) {
                    dst.push(n);
                }
                (out.vertices.len() - 1) as u32
            });
            remap.push(idx);
        }
        out.faces = self
            .faces
            .iter()
            .map(|f| [remap[f[0] as usize], remap[f[1] as usize], remap[f[2] as usize]])
            .filter(|f| f[0] != f[1] && f[1] != f[2] && f[0] != f[2])
            .collect();
        *self = out;
    }
}

fn compact<T: Clone>(items: Vec<T>, remap: &[u32], count: usize) -> Vec<T> {
    let mut out: Vec<Option<T>> = vec![None; count];
    for (old, item) in items.into_iter().enumerate() {
        if remap[old] != u32::MAX {
            out[remap[old] as usize] = Some(item);
        }
    }
    out.into_iter().flatten().collect()
}

fn merge_attribute<T: Clone>(
    mine: Option<Vec<T>>,
    theirs: Option<&Vec<T>>,
    n_mine: usize,
    n_theirs: usize,
    zero: T,
) -> Option<Vec<T>> {
    match (mine, theirs) {
        (None, None) => None,
        (Some(mut a), Some(b)) => {
            a.extend_from_slice(b);
            Some(a)
        }
        (Some(mut a), None) => {
            a.extend(std::iter::repeat(zero).take(n_theirs));
            Some(a)
        }
        (None, Some(b)) => {
            let mut a = vec![zero; n_mine];
            a.extend_from_slice(b);
            Some(a)
        }
    }
}
