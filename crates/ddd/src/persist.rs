//! Conversion between node trees and [`ddd_ir::Document`].
//!
//! Ids are assigned in pre-order from the roots, so equal trees encode to
//! equal documents. Instance targets and node-valued metadata that live
//! outside the saved roots are stored as extra records; every node is
//! written once and shared references stay shared after loading.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::Rc;

use ddd_ir::{
    Document, GeometryRecord, MeshRecord, NodeId, NodeKind as IrKind, NodeRecord, NodeRef,
    PolygonRecord, TransformRecord, Value,
};
use ddd_math::{Point3, Rotation, Transform, Vec3};
use ddd_mesh::TriMesh;
use geo::{Coord, Geometry, LineString, Point, Polygon};
use nalgebra::Quaternion;
use tracing::debug;

use crate::material::Material;
use crate::meta::{MetaValue, Metadata};
use crate::node::{Node, NodeKind};
use crate::{DddError, Result};

/// Converts a metadata value; nodes without an id are written as their path.
pub fn meta_to_ir(value: &MetaValue, ids: &mut dyn FnMut(&Node) -> Option<NodeId>) -> Value {
    match value {
        MetaValue::Null => Value::Null,
        MetaValue::Bool(b) => Value::Bool(*b),
        MetaValue::Number(n) => Value::Number(*n),
        MetaValue::String(s) => Value::String(s.clone()),
        MetaValue::List(l) => Value::List(l.iter().map(|v| meta_to_ir(v, ids)).collect()),
        MetaValue::Map(m) => Value::Map(
            m.iter()
                .map(|(k, v)| (k.clone(), meta_to_ir(v, ids)))
                .collect(),
        ),
        MetaValue::Node(n) => match ids(n) {
            Some(id) => Value::NodeRef(NodeRef { node: id }),
            None => Value::String(n.path()),
        },
    }
}

/// Converts a stored value; unresolved node references become `Null`.
pub fn meta_from_ir(value: &Value, resolve: &dyn Fn(NodeId) -> Option<Node>) -> MetaValue {
    match value {
        Value::Null => MetaValue::Null,
        Value::Bool(b) => MetaValue::Bool(*b),
        Value::Number(n) => MetaValue::Number(*n),
        Value::String(s) => MetaValue::String(s.clone()),
        Value::List(l) => MetaValue::List(l.iter().map(|v| meta_from_ir(v, resolve)).collect()),
        Value::Map(m) => MetaValue::Map(
            m.iter()
                .map(|(k, v)| (k.clone(), meta_from_ir(v, resolve)))
                .collect(),
        ),
        Value::NodeRef(r) => resolve(r.node).map_or(MetaValue::Null, MetaValue::Node),
    }
}

// -- geometry ----------------------------------------------------------------

fn coords_to_ir(ls: &LineString<f64>) -> Vec<[f64; 2]> {
    ls.0.iter().map(|c| [c.x, c.y]).collect()
}

fn coords_from_ir(coords: &[[f64; 2]]) -> LineString<f64> {
    coords.iter().map(|c| Coord { x: c[0], y: c[1] }).collect()
}

fn polygon_to_ir(p: &Polygon<f64>) -> PolygonRecord {
    PolygonRecord {
        exterior: coords_to_ir(p.exterior()),
        interiors: p.interiors().iter().map(coords_to_ir).collect(),
    }
}

fn polygon_from_ir(p: &PolygonRecord) -> Polygon<f64> {
    Polygon::new(
        coords_from_ir(&p.exterior),
        p.interiors.iter().map(|r| coords_from_ir(r)).collect(),
    )
}

/// Stored form of a planar geometry.
pub fn geometry_to_ir(g: &Geometry<f64>) -> GeometryRecord {
    match g {
        Geometry::Point(p) => GeometryRecord::Point {
            coord: [p.x(), p.y()],
        },
        Geometry::Line(l) => GeometryRecord::LineString {
            coords: vec![[l.start.x, l.start.y], [l.end.x, l.end.y]],
        },
        Geometry::LineString(ls) => GeometryRecord::LineString {
            coords: coords_to_ir(ls),
        },
        Geometry::Polygon(p) => GeometryRecord::Polygon {
            polygon: polygon_to_ir(p),
        },
        Geometry::MultiPoint(mp) => GeometryRecord::MultiPoint {
            points: mp.0.iter().map(|p| [p.x(), p.y()]).collect(),
        },
        Geometry::MultiLineString(ml) => GeometryRecord::MultiLineString {
            lines: ml.0.iter().map(coords_to_ir).collect(),
        },
        Geometry::MultiPolygon(mp) => GeometryRecord::MultiPolygon {
            polygons: mp.0.iter().map(polygon_to_ir).collect(),
        },
        Geometry::GeometryCollection(gc) => GeometryRecord::GeometryCollection {
            geometries: gc.0.iter().map(geometry_to_ir).collect(),
        },
        Geometry::Rect(r) => GeometryRecord::Polygon {
            polygon: polygon_to_ir(&r.to_polygon()),
        },
        Geometry::Triangle(t) => GeometryRecord::Polygon {
            polygon: polygon_to_ir(&t.to_polygon()),
        },
    }
}

/// Planar geometry from its stored form.
pub fn geometry_from_ir(g: &GeometryRecord) -> Geometry<f64> {
    match g {
        GeometryRecord::Point { coord } => Geometry::Point(Point::new(coord[0], coord[1])),
        GeometryRecord::LineString { coords } => Geometry::LineString(coords_from_ir(coords)),
        GeometryRecord::Polygon { polygon } => Geometry::Polygon(polygon_from_ir(polygon)),
        GeometryRecord::MultiPoint { points } => Geometry::MultiPoint(
            points.iter().map(|c| Point::new(c[0], c[1])).collect(),
        ),
        GeometryRecord::MultiLineString { lines } => Geometry::MultiLineString(
            geo::MultiLineString::new(lines.iter().map(|l| coords_from_ir(l)).collect()),
        ),
        GeometryRecord::MultiPolygon { polygons } => Geometry::MultiPolygon(
            geo::MultiPolygon::new(polygons.iter().map(polygon_from_ir).collect()),
        ),
        GeometryRecord::GeometryCollection { geometries } => {
            Geometry::GeometryCollection(geometries.iter().map(geometry_from_ir).collect())
        }
    }
}

fn mesh_to_ir(m: &TriMesh) -> MeshRecord {
    MeshRecord {
        vertices: m.vertices.iter().map(|p| [p.x, p.y, p.z]).collect(),
        faces: m.faces.clone(),
        uvs: m.uvs.clone(),
        normals: m
            .normals
            .as_ref()
            .map(|n| n.iter().map(|v| [v.x, v.y, v.z]).collect()),
    }
}

fn mesh_from_ir(m: &MeshRecord) -> TriMesh {
    let mut mesh = TriMesh::from_parts(
        m.vertices.iter().map(|v| Point3::new(v[0], v[1], v[2])).collect(),
        m.faces.clone(),
    );
    mesh.uvs = m.uvs.clone();
    mesh.normals = m
        .normals
        .as_ref()
        .map(|n| n.iter().map(|v| Vec3::new(v[0], v[1], v[2])).collect());
    mesh
}

fn transform_to_ir(t: &Transform) -> TransformRecord {
    let q = t.rotation.coords;
    TransformRecord {
        position: [t.position.x, t.position.y, t.position.z],
        rotation: [q.x, q.y, q.z, q.w],
        scale: [t.scale.x, t.scale.y, t.scale.z],
    }
}

fn transform_from_ir(t: &TransformRecord) -> Transform {
    let [x, y, z, w] = t.rotation;
    let q = Quaternion::new(w, x, y, z);
    // Keep stored unit quaternions bit-exact so content hashes survive a reload.
    let rotation = if (q.norm() - 1.0).abs() < 1e-12 {
        Rotation::new_unchecked(q)
    } else {
        Rotation::from_quaternion(q)
    };
    Transform {
        position: Vec3::from(t.position),
        rotation,
        scale: Vec3::from(t.scale),
    }
}

// -- trees -------------------------------------------------------------------

#[derive(Default)]
struct Encoder {
    ids: HashMap<usize, NodeId>,
    order: Vec<Node>,
    material_keys: HashMap<*const Material, String>,
    materials: BTreeMap<String, ddd_ir::MaterialDef>,
}

impl Encoder {
    fn visit(&mut self, node: &Node) {
        if self.ids.contains_key(&node.addr()) {
            return;
        }
        self.ids.insert(node.addr(), self.order.len() as NodeId);
        self.order.push(node.clone());
        for c in node.children() {
            self.visit(&c);
        }
        if let Some(t) = node.target() {
            self.visit(&t);
        }
        let refs: Vec<Node> = node
            .metadata()
            .values()
            .flat_map(collect_node_refs)
            .collect();
        for r in refs {
            self.visit(&r);
        }
    }

    fn material_key(&mut self, m: &Rc<Material>) -> String {
        if let Some(k) = self.material_keys.get(&Rc::as_ptr(m)) {
            return k.clone();
        }
        let def = m.to_def();
        let mut key = m.name.clone();
        let mut n = 1;
        while self.materials.get(&key).is_some_and(|d| *d != def) {
            n += 1;
            key = format!("{}#{n}", m.name);
        }
        self.materials.insert(key.clone(), def);
        self.material_keys.insert(Rc::as_ptr(m), key.clone());
        key
    }

    fn record(&mut self, node: &Node) -> NodeRecord {
        let ids = &self.ids;
        let id_of = |n: &Node| ids.get(&n.addr()).copied();
        let kind = match &*node.kind() {
            NodeKind::Geom2(g) => IrKind::Node2 {
                geometry: g.as_ref().map(geometry_to_ir),
            },
            NodeKind::Mesh3(m) => IrKind::Node3 {
                mesh: m.as_ref().map(mesh_to_ir),
            },
            NodeKind::Instance(t) => IrKind::Instance {
                target: id_of(t).unwrap_or_default(),
            },
        };
        let metadata = node
            .metadata()
            .iter()
            .map(|(k, v)| (k.clone(), meta_to_ir(v, &mut |n| id_of(n))))
            .collect();
        let children = node.children().iter().filter_map(id_of).collect();
        let id = id_of(node).unwrap_or_default();
        let material = node.material().map(|m| self.material_key(&m));
        NodeRecord {
            id,
            name: node.name(),
            kind,
            metadata,
            material,
            transform: transform_to_ir(&node.transform()),
            children,
        }
    }
}

fn collect_node_refs(v: &MetaValue) -> Vec<Node> {
    match v {
        MetaValue::Node(n) => vec![n.clone()],
        MetaValue::List(l) => l.iter().flat_map(collect_node_refs).collect(),
        MetaValue::Map(m) => m.values().flat_map(collect_node_refs).collect(),
        _ => Vec::new(),
    }
}

/// Encodes the trees under `roots` together with pipeline `data`.
pub fn to_document(roots: &[&Node], data: &Metadata) -> Document {
    let mut enc = Encoder::default();
    for r in roots {
        enc.visit(r);
    }
    let data_refs: Vec<Node> = data.values().flat_map(collect_node_refs).collect();
    for r in &data_refs {
        enc.visit(r);
    }

    let mut doc = Document::new();
    for node in enc.order.clone() {
        let rec = enc.record(&node);
        doc.nodes.insert(rec.id, rec);
    }
    doc.roots = roots
        .iter()
        .filter_map(|r| enc.ids.get(&r.addr()).copied())
        .collect();
    doc.data = data
        .iter()
        .map(|(k, v)| {
            let ids = &enc.ids;
            (k.clone(), meta_to_ir(v, &mut |n| ids.get(&n.addr()).copied()))
        })
        .collect();
    doc.materials = enc.materials;
    doc
}

/// Decodes a document into its root nodes and pipeline data.
pub fn from_document(doc: &Document) -> Result<(Vec<Node>, Metadata)> {
    let missing = doc.missing_references();
    if !missing.is_empty() {
        return Err(DddError::Serialization(format!(
            "document references missing nodes {missing:?}"
        )));
    }

    let materials: HashMap<&str, Rc<Material>> = doc
        .materials
        .iter()
        .map(|(k, def)| (k.as_str(), Rc::new(Material::from_def(def))))
        .collect();

    let nodes: HashMap<NodeId, Node> = doc
        .nodes
        .values()
        .map(|rec| (rec.id, Node::new2(rec.name.clone(), None)))
        .collect();
    let lookup = |id: NodeId| nodes.get(&id).cloned();

    for rec in doc.nodes.values() {
        let Some(node) = nodes.get(&rec.id) else {
            continue;
        };
        let kind = match &rec.kind {
            IrKind::Node2 { geometry } => NodeKind::Geom2(geometry.as_ref().map(geometry_from_ir)),
            IrKind::Node3 { mesh } => NodeKind::Mesh3(mesh.as_ref().map(mesh_from_ir)),
            IrKind::Instance { target } => match lookup(*target) {
                Some(t) => NodeKind::Instance(t),
                None => NodeKind::Geom2(None),
            },
        };
        node.set_kind(kind);
        node.set_transform(transform_from_ir(&rec.transform));
        if let Some(key) = &rec.material {
            match materials.get(key.as_str()) {
                Some(m) => {
                    node.set_material(Some(m.clone()));
                }
                None => debug!(material = %key, node = %rec.name, "undefined material"),
            }
        }
        {
            let mut meta = node.metadata_mut();
            for (k, v) in &rec.metadata {
                meta.insert(k.clone(), meta_from_ir(v, &lookup));
            }
        }
        for child in &rec.children {
            if let Some(c) = nodes.get(child) {
                node.append(c)?;
            }
        }
    }

    let roots = doc.roots.iter().filter_map(|id| lookup(*id)).collect();
    let data = doc
        .data
        .iter()
        .map(|(k, v)| (k.clone(), meta_from_ir(v, &lookup)))
        .collect();
    Ok((roots, data))
}

/// Document format chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Pretty JSON (`.json`).
    Json,
    /// YAML (`.yaml`, `.yml`).
    Yaml,
    /// Compact JSON (`.ddd`, `.cache`).
    Compact,
}

impl Format {
    /// Format for `path`, if it is a document format.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "yaml" | "yml" => Some(Format::Yaml),
            "ddd" | "cache" => Some(Format::Compact),
            _ => None,
        }
    }
}

/// Writes `roots` and `data` to `path`; the format follows the extension.
pub fn save(path: &Path, roots: &[&Node], data: &Metadata) -> Result<()> {
    let format = Format::from_path(path)
        .ok_or_else(|| DddError::UnsupportedFormat(path.display().to_string()))?;
    let doc = to_document(roots, data);
    let text = match format {
        Format::Json => doc.to_json()?,
        Format::Yaml => serde_yaml::to_string(&doc)?,
        Format::Compact => doc.to_json_compact()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, text)?;
    debug!(path = %path.display(), nodes = doc.nodes.len(), "saved document");
    Ok(())
}

/// Reads the roots and data stored at `path`.
pub fn load(path: &Path) -> Result<(Vec<Node>, Metadata)> {
    let format = Format::from_path(path)
        .ok_or_else(|| DddError::UnsupportedFormat(path.display().to_string()))?;
    let text = std::fs::read_to_string(path)?;
    let doc: Document = match format {
        Format::Yaml => serde_yaml::from_str(&text)?,
        Format::Json | Format::Compact => Document::from_json(&text)?,
    };
    from_document(&doc)
}

impl Node {
    /// Loads a single tree. Several stored roots are wrapped in a group.
    pub fn load(path: impl AsRef<Path>) -> Result<Node> {
        let path = path.as_ref();
        let (mut roots, _) = load(path)?;
        if roots.len() == 1 {
            return Ok(roots.swap_remove(0));
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let group = match roots.first() {
            Some(r) if r.is_3d() => Node::new3(name, None),
            _ => Node::new2(name, None),
        };
        group.extend(&roots)?;
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use approx::assert_relative_eq;

    fn scene() -> (Node, Node) {
        let root = builder::group3("root");
        let proto = builder::cube("tree", 1.0);
        proto.set_material(Some(Material::new("leaves").with_hex("#228822").shared()));
        let a = builder::instance("tree-a", &proto);
        a.translate(Vec3::new(5.0, 0.0, 0.0));
        let b = builder::instance("tree-b", &proto);
        b.rotate(Vec3::new(0.0, 0.0, 0.7));
        root.extend([&a, &b]).unwrap();
        let area = builder::rect("park", [0.0, 0.0, 10.0, 10.0]);
        area.set("ddd:area:type", "park").set("ddd:tree", proto.clone());
        root.append(&area).unwrap();
        (root, proto)
    }

    #[test]
    fn test_ids_are_preorder() {
        let (root, _) = scene();
        let doc = to_document(&[&root], &Metadata::new());
        let names: Vec<&str> = doc.nodes.values().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["root", "tree-a", "tree", "tree-b", "park"]);
        assert_eq!(doc.roots, vec![0]);
        assert!(doc.missing_references().is_empty());
        assert!(doc.missing_materials().is_empty());
    }

    #[test]
    fn test_shared_prototype_survives_round_trip() {
        let (root, _) = scene();
        let doc = to_document(&[&root], &Metadata::new());
        let (roots, _) = from_document(&doc).unwrap();
        let back = &roots[0];
        let a = back.find("tree-a").unwrap().target().unwrap();
        let b = back.find("tree-b").unwrap().target().unwrap();
        assert!(a.ptr_eq(&b));
        let referenced = back.find("park").unwrap().get("ddd:tree").unwrap();
        assert!(referenced.as_node().unwrap().ptr_eq(&a));
        assert_eq!(a.material().unwrap().name, "leaves");
        assert_relative_eq!(back.find("tree-a").unwrap().transform().position.x, 5.0);
    }

    #[test]
    fn test_round_trip_preserves_hash() {
        let (root, _) = scene();
        let (roots, _) = from_document(&to_document(&[&root], &Metadata::new())).unwrap();
        assert_eq!(roots[0].content_hash(), root.content_hash());
    }

    #[test]
    fn test_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (root, _) = scene();
        let mut data = Metadata::new();
        data.insert("ddd:osm:area:default".into(), "park".into());
        for name in ["scene.json", "scene.yaml", "scene.ddd"] {
            let path = dir.path().join(name);
            save(&path, &[&root], &data).unwrap();
            let (roots, back) = load(&path).unwrap();
            assert_eq!(roots[0].count(), root.count(), "{name}");
            assert_eq!(back, data);
        }
        let bad = save(&dir.path().join("scene.obj"), &[&root], &data);
        assert!(matches!(bad, Err(DddError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_dangling_reference_is_error() {
        let (root, _) = scene();
        let mut doc = to_document(&[&root], &Metadata::new());
        doc.roots.push(99);
        assert!(matches!(
            from_document(&doc),
            Err(DddError::Serialization(_))
        ));
    }
}
