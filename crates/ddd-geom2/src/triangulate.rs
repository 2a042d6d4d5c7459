use ddd_math::Point3;
use ddd_mesh::TriMesh;
use geo::orient::Direction;
use geo::{Area, Geometry, Orient, Polygon, TriangulateEarcut};

use crate::ops::{clean, CleanOptions};
use crate::{polygons, GeomError};

const AREA_TOLERANCE: f64 = 1e-6;

fn triangulate_polygon(polygon: &Polygon<f64>, mesh: &mut TriMesh) -> Result<(), GeomError> {
    let polygon = polygon.orient(Direction::Default);
    let raw = polygon.earcut_triangles_raw();
    let base = mesh.vertices.len() as u32;
    for xy in raw.vertices.chunks_exact(2) {
        mesh.vertices.push(Point3::new(xy[0], xy[1], 0.0));
    }

    let mut covered = 0.0;
    for tri in raw.triangle_indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| base + i as u32);
        let [pa, pb, pc] = [a, b, c].map(|i| mesh.vertices[i as usize]);
        let cross = (pb.x - pa.x) * (pc.y - pa.y) - (pb.y - pa.y) * (pc.x - pa.x);
        if cross >= 0.0 {
            mesh.faces.push([a, b, c]);
        } else {
            mesh.faces.push([a, c, b]);
        }
        covered += cross.abs() / 2.0;
    }

    let expected = polygon.unsigned_area();
    if (covered - expected).abs() > AREA_TOLERANCE * expected.max(1.0) {
        return Err(GeomError::Triangulation(format!(
            "triangles cover {covered:.6} of polygon area {expected:.6}"
        )));
    }
    Ok(())
}

fn triangulate_all(polys: &[Polygon<f64>]) -> Result<TriMesh, GeomError> {
    let mut mesh = TriMesh::new();
    for p in polys {
        triangulate_polygon(p, &mut mesh)?;
    }
    mesh.remove_unreferenced_vertices();
    Ok(mesh)
}

/// Triangulates the polygonal parts of `g` into a flat mesh on z = 0.
///
/// Faces point up (+Z). Holes are respected. When the triangles do not
/// cover the polygon area the geometry is cleaned with `eps = 0.01` and
/// triangulated once more before failing. With `twosided` a flipped copy
/// of every face is added.
pub fn triangulate(g: &Geometry<f64>, twosided: bool) -> Result<TriMesh, GeomError> {
    let polys = polygons(g);
    let mut mesh = match triangulate_all(&polys) {
        Ok(mesh) => mesh,
        Err(first) => {
            let options = CleanOptions {
                eps: 0.01,
                ..CleanOptions::default()
            };
            let cleaned = clean(g, &options).into_option().ok_or(first)?;
            triangulate_all(&polygons(&cleaned))?
        }
    };
    if twosided {
        let back = mesh.flipped();
        mesh.merge(&back);
    }
    Ok(mesh)
}
