//! UV mapping.
//!
//! Every projection assigns UVs per face corner. When a vertex is reached
//! with a UV different from the one already stored for it, the vertex is
//! duplicated and the face index rewritten, so faces never share a vertex
//! whose UV would be wrong for one of them.

use crate::TriMesh;
use ddd_math::{Point3, Vec3};
use ddd_path::Path3;
use std::f64::consts::{PI, TAU};

const UV_EPS: f64 = 1e-9;

/// Scale and offset applied to raw projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvParams {
    /// Multiplier on the projected coordinates.
    pub scale: [f64; 2],
    /// Added after scaling.
    pub offset: [f64; 2],
}

impl Default for UvParams {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0],
            offset: [0.0, 0.0],
        }
    }
}

impl UvParams {
    fn apply(&self, raw: [f64; 2]) -> [f64; 2] {
        [
            raw[0] * self.scale[0] + self.offset[0],
            raw[1] * self.scale[1] + self.offset[1],
        ]
    }
}

fn same_uv(a: &[f64; 2], b: &[f64; 2]) -> bool {
    (a[0] - b[0]).abs() < UV_EPS && (a[1] - b[1]).abs() < UV_EPS
}

/// Assigns UVs per face corner with `f(mesh, face, vertex) -> (uv, group)`.
///
/// A vertex is shared between corners only when both the UV and the
/// projection group agree; otherwise it is duplicated.
fn assign(mesh: &TriMesh, mut f: impl FnMut(&TriMesh, usize, usize) -> ([f64; 2], u8)) -> TriMesh {
    let mut out = mesh.clone();
    let mut uvs: Vec<Option<([f64; 2], u8)>> = vec![None; mesh.vertices.len()];
    // Copies made for each original vertex: (new index, uv, group).
    let mut copies: Vec<Vec<(usize, [f64; 2], u8)>> = vec![Vec::new(); mesh.vertices.len()];

    for fi in 0..mesh.faces.len() {
        for corner in 0..3 {
            let v = mesh.faces[fi][corner] as usize;
            let (uv, group) = f(mesh, fi, v);
            let target = match uvs[v] {
                None => {
                    uvs[v] = Some((uv, group));
                    v
                }
                Some((existing, g)) if g == group && same_uv(&existing, &uv) => v,
                Some(_) => match copies[v]
                    .iter()
                    .find(|(_, c, g)| *g == group && same_uv(c, &uv))
                {
                    Some(&(idx, _, _)) => idx,
                    None => {
                        out.vertices.push(mesh.vertices[v]);
                        if let (Some(dst), Some(src)) = (&mut out.normals, &mesh.normals) {
                            dst.push(src[v]);
                        }
                        uvs.push(Some((uv, group)));
                        let idx = out.vertices.len() - 1;
                        copies[v].push((idx, uv, group));
                        idx
                    }
                },
            };
            out.faces[fi][corner] = target as u32;
        }
    }
    out.uvs = Some(
        uvs.into_iter()
            .map(|u| u.map_or([0.0, 0.0], |(uv, _)| uv))
            .collect(),
    );
    out
}

/// Box projection: each face projects on the plane orthogonal to the
/// dominant axis of its normal. Vertices shared by faces projecting on
/// different planes are always split.
pub fn cubic(mesh: &TriMesh, params: &UvParams) -> TriMesh {
    let normals = mesh.face_normals();
    assign(mesh, |m, fi, v| {
        let n = normals[fi];
        let p = m.vertices[v];
        let (ax, ay, az) = (n.x.abs(), n.y.abs(), n.z.abs());
        let (raw, axis) = if az >= ax && az >= ay {
            ([p.x, p.y], 2)
        } else if ax >= ay {
            ([p.y, p.z], 0)
        } else {
            ([p.x, p.z], 1)
        };
        (params.apply(raw), axis)
    })
}

/// Cylindrical projection around the vertical axis through `center`.
///
/// U is the angle around the axis in turns, V the height. Faces crossing
/// the seam are unwrapped so their U values stay contiguous.
pub fn cylindrical(mesh: &TriMesh, center: &Point3, params: &UvParams) -> TriMesh {
    let seam_fix = seam_offsets(mesh, center);
    assign(mesh, |m, fi, v| {
        let d = m.vertices[v] - center;
        let u = turns(&d) + seam_fix(fi, &d);
        (params.apply([u, d.z]), 0)
    })
}

/// Spherical projection around `center`.
///
/// U is the longitude in turns, V the colatitude in half turns (0 at +Z).
pub fn spherical(mesh: &TriMesh, center: &Point3, params: &UvParams) -> TriMesh {
    let seam_fix = seam_offsets(mesh, center);
    assign(mesh, |m, fi, v| {
        let d = m.vertices[v] - center;
        let r = d.norm();
        let colat = if r > 1e-12 { (d.z / r).clamp(-1.0, 1.0).acos() / PI } else { 0.0 };
        let u = turns(&d) + seam_fix(fi, &d);
        (params.apply([u, colat]), 0)
    })
}

fn turns(d: &Vec3) -> f64 {
    d.y.atan2(d.x) / TAU + 0.5
}

/// For faces straddling the angular seam, shifts the low side by one turn.
fn seam_offsets<'a>(mesh: &'a TriMesh, center: &'a Point3) -> impl Fn(usize, &Vec3) -> f64 + 'a {
    move |fi, d| {
        let us: Vec<f64> = mesh.faces[fi]
            .iter()
            .map(|&i| turns(&(mesh.vertices[i as usize] - center)))
            .collect();
        let lo = us.iter().cloned().fold(f64::MAX, f64::min);
        let hi = us.iter().cloned().fold(f64::MIN, f64::max);
        if hi - lo > 0.5 && turns(d) < 0.5 {
            1.0
        } else {
            0.0
        }
    }
}

/// Path projection for a list of coordinates: U is the signed offset from
/// the nearest segment of `path` (positive to the left), V the arclength
/// along the path to the projection. Points are compared in XY.
pub fn path_coords(points: &[Point3], path: &Path3, params: &UvParams) -> Vec<[f64; 2]> {
    points
        .iter()
        .map(|p| match path.closest_segment(p) {
            Some(c) => params.apply([c.signed_distance, c.along]),
            None => params.apply([0.0, 0.0]),
        })
        .collect()
}

/// Path projection of mesh vertices, see [`path_coords`].
pub fn path(mesh: &TriMesh, path: &Path3, params: &UvParams) -> TriMesh {
    let coords = path_coords(&mesh.vertices, path, params);
    assign(mesh, |_, _, v| (coords[v], 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{cuboid, icosphere};
    use crate::tests::unit_quad;

    fn distinct(a: &[f64; 2], b: &[f64; 2]) -> bool {
        !same_uv(a, b)
    }

    #[test]
    fn test_cubic_on_box_duplicates_shared_corners() {
        let cube = cuboid(&Point3::new(0.0, 0.0, 0.0), &Point3::new(1.0, 1.0, 1.0));
        let mapped = cubic(&cube, &UvParams::default());
        assert!(mapped.validate().is_ok());
        assert!(mapped.num_vertices() > cube.num_vertices());

        let uvs = mapped.uvs.as_ref().unwrap();
        let normals = mapped.face_normals();
        for (fi, f) in mapped.faces.iter().enumerate() {
            let [a, b, c] = f.map(|i| uvs[i as usize]);
            assert!(distinct(&a, &b) && distinct(&b, &c) && distinct(&a, &c));

            // A vertex shared with another face must share its normal too.
            for (fj, g) in mapped.faces.iter().enumerate() {
                if fi != fj && f.iter().any(|v| g.contains(v)) {
                    let cos = normals[fi].dot(&normals[fj]);
                    assert!(cos > 1.0 - 1e-9, "faces {fi} and {fj} share a vertex across an edge");
                }
            }
        }
    }

    #[test]
    fn test_cubic_params_scale_and_offset() {
        let params = UvParams {
            scale: [2.0, 2.0],
            offset: [0.5, 0.0],
        };
        let mapped = cubic(&unit_quad(), &params);
        assert_eq!(mapped.num_vertices(), 4, "coplanar faces agree on every UV");
        let uvs = mapped.uvs.unwrap();
        assert_eq!(uvs[2], [2.5, 2.0]);
    }

    #[test]
    fn test_spherical_ranges() {
        let sphere = icosphere(&Point3::origin(), 1.0, 2);
        let mapped = spherical(&sphere, &Point3::origin(), &UvParams::default());
        assert!(mapped.validate().is_ok());
        for uv in mapped.uvs.as_ref().unwrap() {
            assert!((0.0..=1.5).contains(&uv[0]));
            assert!((0.0..=1.0).contains(&uv[1]));
        }
        // Seam faces never span more than half a turn. Pole vertices have no
        // defined longitude and are left out.
        let uvs = mapped.uvs.as_ref().unwrap();
        let at_pole = |i: u32| {
            let p = mapped.vertices[i as usize];
            p.x.abs() < 1e-9 && p.y.abs() < 1e-9
        };
        for f in mapped.faces.iter().filter(|f| !f.iter().any(|&i| at_pole(i))) {
            let us: Vec<f64> = f.iter().map(|&i| uvs[i as usize][0]).collect();
            let spread = us.iter().cloned().fold(f64::MIN, f64::max)
                - us.iter().cloned().fold(f64::MAX, f64::min);
            assert!(spread < 0.5);
        }
    }

    #[test]
    fn test_cylindrical_height_is_v() {
        let cube = cuboid(&Point3::new(-1.0, -1.0, 0.0), &Point3::new(1.0, 1.0, 4.0));
        let mapped = cylindrical(&cube, &Point3::origin(), &UvParams::default());
        for (p, uv) in mapped.vertices.iter().zip(mapped.uvs.as_ref().unwrap()) {
            assert!((uv[1] - p.z).abs() < 1e-12);
        }
    }

    #[test]
    fn test_path_projection() {
        let road = Path3::from_points(&[Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)]);
        let uv = path_coords(
            &[Point3::new(3.0, 2.0, 0.0), Point3::new(7.0, -1.0, 0.0)],
            &road,
            &UvParams::default(),
        );
        assert_eq!(uv[0], [2.0, 3.0]);
        assert_eq!(uv[1], [-1.0, 7.0]);
    }
}
