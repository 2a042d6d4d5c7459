//! Angle-limited smoothing.

use crate::TriMesh;
use ddd_math::Vec3;

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

impl TriMesh {
    /// Smooth shading limited by `max_angle` (radians).
    ///
    /// Around every vertex, incident faces whose normals differ by at most
    /// `max_angle` are grouped (transitively); each group gets its own copy
    /// of the vertex with the area-weighted mean normal of the group. Sharp
    /// edges therefore keep split vertices and flat shading.
    pub fn smooth_by_angle(&self, max_angle: f64) -> TriMesh {
        let cos_limit = max_angle.cos();
        let face_cross: Vec<Vec3> = (0..self.faces.len()).map(|i| self.face_cross(i)).collect();
        let unit: Vec<Vec3> = face_cross
            .iter()
            .map(|n| n.try_normalize(1e-12).unwrap_or(Vec3::zeros()))
            .collect();

        let mut incident: Vec<Vec<(usize, usize)>> = vec![Vec::new(); self.vertices.len()];
        for (fi, f) in self.faces.iter().enumerate() {
            for (corner, &v) in f.iter().enumerate() {
                incident[v as usize].push((fi, corner));
            }
        }

        let mut out = TriMesh {
            vertices: Vec::new(),
            faces: self.faces.clone(),
            uvs: self.uvs.as_ref().map(|_| Vec::new()),
            normals: Some(Vec::new()),
        };

        for (v, corners) in incident.iter().enumerate() {
            if corners.is_empty() {
                continue;
            }
            let mut parent: Vec<usize> = (0..corners.len()).collect();
            for a in 0..corners.len() {
                for b in a + 1..corners.len() {
                    if unit[corners[a].0].dot(&unit[corners[b].0]) >= cos_limit - 1e-12 {
                        let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                        parent[ra] = rb;
                    }
                }
            }

            let mut group_vertex: Vec<Option<u32>> = vec![None; corners.len()];
            for k in 0..corners.len() {
                let root = find(&mut parent, k);
                let existing = group_vertex[root];
                let idx = match existing {
                    Some(idx) => idx,
                    None => {
                        let normal: Vec3 = (0..corners.len())
                            .filter(|&j| find(&mut parent, j) == root)
                            .map(|j| face_cross[corners[j].0])
                            .sum();
                        out.vertices.push(self.vertices[v]);
                        if let (Some(dst), Some(src)) = (&mut out.uvs, &self.uvs) {
                            dst.push(src[v]);
                        }
                        if let Some(ns) = &mut out.normals {
                            ns.push(normal.try_normalize(1e-12).unwrap_or(Vec3::z()));
                        }
                        let idx = (out.vertices.len() - 1) as u32;
                        group_vertex[root] = Some(idx);
                        idx
                    }
                };
                let (fi, corner) = corners[k];
                out.faces[fi][corner] = idx;
            }
        }
        out
    }
}
