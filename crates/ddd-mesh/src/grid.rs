//! Subdivision of meshes along an XY grid.
//!
//! Each triangle is clipped against every grid cell it overlaps
//! (Sutherland-Hodgman on the four cell edges) and the convex pieces are
//! fan-triangulated. Attributes are interpolated linearly along clipped
//! edges. Triangles that are vertical in XY are kept unchanged.

use std::collections::HashMap;

use crate::{quantize, TriMesh};
use ddd_math::{Point3, Vec3};

#[derive(Debug, Clone, Copy)]
struct Corner {
    p: Point3,
    uv: [f64; 2],
    n: Vec3,
}

impl Corner {
    fn lerp(&self, other: &Corner, t: f64) -> Corner {
        Corner {
            p: self.p + (other.p - self.p) * t,
            uv: [
                self.uv[0] + (other.uv[0] - self.uv[0]) * t,
                self.uv[1] + (other.uv[1] - self.uv[1]) * t,
            ],
            n: self.n + (other.n - self.n) * t,
        }
    }
}

/// Clip a convex polygon to the half-plane `sign * (coord(axis) - value) >= 0`.
fn clip(poly: &[Corner], axis: usize, value: f64, sign: f64) -> Vec<Corner> {
    let inside = |c: &Corner| sign * (c.p[axis] - value) >= -1e-12;
    let mut out = Vec::with_capacity(poly.len() + 2);
    for i in 0..poly.len() {
        let cur = &poly[i];
        let next = &poly[(i + 1) % poly.len()];
        match (inside(cur), inside(next)) {
            (true, true) => out.push(*next),
            (true, false) => {
                let t = (value - cur.p[axis]) / (next.p[axis] - cur.p[axis]);
                out.push(cur.lerp(next, t));
            }
            (false, true) => {
                let t = (value - cur.p[axis]) / (next.p[axis] - cur.p[axis]);
                out.push(cur.lerp(next, t));
                out.push(*next);
            }
            (false, false) => {}
        }
    }
    out
}

fn projected_area2(poly: &[Corner]) -> f64 {
    let mut a = 0.0;
    for i in 0..poly.len() {
        let (p, q) = (&poly[i].p, &poly[(i + 1) % poly.len()].p);
        a += p.x * q.y - q.x * p.y;
    }
    a
}

struct Builder {
    mesh: TriMesh,
    cache: HashMap<([i64; 3], [i64; 2]), u32>,
    with_uv: bool,
    with_normals: bool,
}

impl Builder {
    fn vertex(&mut self, c: &Corner) -> u32 {
        let uv_key = if self.with_uv {
            [(c.uv[0] * 1e9).round() as i64, (c.uv[1] * 1e9).round() as i64]
        } else {
            [0, 0]
        };
        let mesh = &mut self.mesh;
        let (with_uv, with_normals) = (self.with_uv, self.with_normals);
        *self.cache.entry((quantize(&c.p), uv_key)).or_insert_with(|| {
            mesh.vertices.push(c.p);
            if with_uv {
                if let Some(uvs) = &mut mesh.uvs {
                    uvs.push(c.uv);
                }
            }
            if with_normals {
                if let Some(ns) = &mut mesh.normals {
                    ns.push(c.n.try_normalize(1e-12).unwrap_or(Vec3::z()));
                }
            }
            (mesh.vertices.len() - 1) as u32
        })
    }

    fn polygon(&mut self, poly: &[Corner]) {
        let idx: Vec<u32> = poly.iter().map(|c| self.vertex(c)).collect();
        for i in 1..idx.len().saturating_sub(1) {
            let f = [idx[0], idx[i], idx[i + 1]];
            if f[0] != f[1] && f[1] != f[2] && f[0] != f[2] {
                self.mesh.faces.push(f);
            }
        }
    }
}

impl TriMesh {
    /// Splits every triangle along an XY grid of square cells of `size`.
    ///
    /// The result covers the same surface; shared vertices are welded.
    /// A non-positive `size` returns an unchanged copy.
    pub fn subdivide_to_grid(&self, size: f64) -> TriMesh {
        if size.is_nan() || size <= 0.0 {
            return self.clone();
        }
        let with_uv = self.uvs.is_some();
        let with_normals = self.normals.is_some();
        let mut b = Builder {
            mesh: TriMesh {
                uvs: with_uv.then(Vec::new),
                normals: with_normals.then(Vec::new),
                ..TriMesh::new()
            },
            cache: HashMap::new(),
            with_uv,
            with_normals,
        };

        for f in &self.faces {
            let tri: Vec<Corner> = f
                .iter()
                .map(|&i| Corner {
                    p: self.vertices[i as usize],
                    uv: self.uvs.as_ref().map_or([0.0; 2], |u| u[i as usize]),
                    n: self.normals.as_ref().map_or(Vec3::zeros(), |n| n[i as usize]),
                })
                .collect();

            if projected_area2(&tri).abs() < 1e-12 {
                b.polygon(&tri);
                continue;
            }

            let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
            for c in &tri {
                x0 = x0.min(c.p.x);
                y0 = y0.min(c.p.y);
                x1 = x1.max(c.p.x);
                y1 = y1.max(c.p.y);
            }
            let (ix0, ix1) = ((x0 / size).floor() as i64, (x1 / size).ceil() as i64);
            let (iy0, iy1) = ((y0 / size).floor() as i64, (y1 / size).ceil() as i64);

            for ix in ix0..ix1.max(ix0 + 1) {
                let (cx0, cx1) = (ix as f64 * size, (ix + 1) as f64 * size);
                let strip = clip(&clip(&tri, 0, cx0, 1.0), 0, cx1, -1.0);
                if strip.len() < 3 {
                    continue;
                }
                for iy in iy0..iy1.max(iy0 + 1) {
                    let (cy0, cy1) = (iy as f64 * size, (iy + 1) as f64 * size);
                    let cell = clip(&clip(&strip, 1, cy0, 1.0), 1, cy1, -1.0);
                    if cell.len() >= 3 && projected_area2(&cell).abs() > 1e-12 {
                        b.polygon(&cell);
                    }
                }
            }
        }
        b.mesh
    }
}
