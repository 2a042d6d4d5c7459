//! Serializable scene document for ddd.
//!
//! A [`Document`] is the portable, language-neutral form of a scene tree:
//! nodes are flattened into a map keyed by [`NodeId`], children and
//! instance targets refer to nodes by id, and metadata values that point at
//! other nodes are stored as [`Value::NodeRef`]. Shared prototypes therefore
//! stay shared across a save/load cycle.
//!
//! The document is used for pipeline cache files, catalog entries and the
//! `.json` scene export.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Unique identifier for a node within a document.
pub type NodeId = u64;

/// Current format version written by [`Document::new`].
pub const FORMAT_VERSION: &str = "1";

/// Node-local transform: position, rotation quaternion `[x, y, z, w]`, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    /// Translation.
    pub position: [f64; 3],
    /// Rotation quaternion stored as `[x, y, z, w]`.
    pub rotation: [f64; 4],
    /// Per-axis scale.
    pub scale: [f64; 3],
}

impl Default for TransformRecord {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

/// A polygon ring set: exterior ring plus holes, coordinates in XY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonRecord {
    /// Exterior ring (closed).
    pub exterior: Vec<[f64; 2]>,
    /// Interior rings (holes).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interiors: Vec<Vec<[f64; 2]>>,
}

/// Planar geometry carried by a 2D node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeometryRecord {
    /// A single point.
    Point {
        /// Point coordinate.
        coord: [f64; 2],
    },
    /// An open or closed polyline.
    LineString {
        /// Vertices in order.
        coords: Vec<[f64; 2]>,
    },
    /// A polygon with optional holes.
    Polygon {
        /// Rings of the polygon.
        polygon: PolygonRecord,
    },
    /// A set of points.
    MultiPoint {
        /// Point coordinates.
        points: Vec<[f64; 2]>,
    },
    /// A set of polylines.
    MultiLineString {
        /// Polylines.
        lines: Vec<Vec<[f64; 2]>>,
    },
    /// A set of polygons.
    MultiPolygon {
        /// Polygons.
        polygons: Vec<PolygonRecord>,
    },
    /// Heterogeneous collection.
    GeometryCollection {
        /// Member geometries.
        geometries: Vec<GeometryRecord>,
    },
}

/// Triangle mesh carried by a 3D node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshRecord {
    /// Vertex positions.
    pub vertices: Vec<[f64; 3]>,
    /// Triangles as vertex index triples.
    pub faces: Vec<[u32; 3]>,
    /// Optional per-vertex texture coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uvs: Option<Vec<[f64; 2]>>,
    /// Optional per-vertex normals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<[f64; 3]>>,
}

/// Payload of a node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    /// A node carrying an optional planar geometry.
    Node2 {
        /// Geometry, absent for group nodes.
        geometry: Option<GeometryRecord>,
    },
    /// A node carrying an optional triangle mesh.
    Node3 {
        /// Mesh, absent for group nodes.
        mesh: Option<MeshRecord>,
    },
    /// A node placing another node (the prototype).
    Instance {
        /// Prototype node id.
        target: NodeId,
    },
}

/// Reference to another node inside a metadata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeRef {
    /// Referenced node id.
    #[serde(rename = "$node")]
    pub node: NodeId,
}

/// Metadata value.
///
/// Serialized as plain JSON, except node references which are written as
/// `{"$node": id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (always stored as f64).
    Number(f64),
    /// String.
    String(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Reference to a node in the same document.
    NodeRef(NodeRef),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
}

/// A node in the flattened scene tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique identifier.
    pub id: NodeId,
    /// Human-readable name.
    pub name: String,
    /// Node payload.
    pub kind: NodeKind,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Material key referencing [`Document::materials`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    /// Local transform.
    #[serde(default)]
    pub transform: TransformRecord,
    /// Child node ids, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
}

/// Alpha blending mode of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlphaMode {
    /// Fully opaque.
    #[default]
    Opaque,
    /// Alpha blended.
    Blend,
    /// Alpha tested against a cutoff.
    Mask,
}

/// Material definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDef {
    /// Material name.
    pub name: String,
    /// Base color as `[r, g, b, a]` in 0.0..1.0.
    pub color: [f32; 4],
    /// Metallic factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metallic: Option<f32>,
    /// Roughness factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roughness: Option<f32>,
    /// Texture paths keyed by slot (`albedo`, `normal`, `displacement`, `roughness`, `emissive`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub textures: BTreeMap<String, String>,
    /// Alpha mode.
    #[serde(default)]
    pub alpha_mode: AlphaMode,
    /// Alpha cutoff for [`AlphaMode::Mask`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_cutoff: Option<f32>,
    /// Render both faces.
    #[serde(default)]
    pub double_sided: bool,
    /// Texture atlas reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atlas: Option<String>,
    /// Free-form extras.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, Value>,
}

/// A ddd document: flattened nodes, materials, roots and pipeline data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Format version string.
    pub version: String,
    /// All nodes, keyed by [`NodeId`].
    pub nodes: BTreeMap<NodeId, NodeRecord>,
    /// Material definitions, keyed by material key.
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialDef>,
    /// Root node ids.
    pub roots: Vec<NodeId>,
    /// Auxiliary key/value data (pipeline state).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            nodes: BTreeMap::new(),
            materials: BTreeMap::new(),
            roots: Vec::new(),
            data: BTreeMap::new(),
        }
    }
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize to compact JSON, used for hashing.
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Node ids referenced anywhere in the document that have no record.
    pub fn missing_references(&self) -> Vec<NodeId> {
        let mut missing = BTreeSet::new();
        let mut check = |id: NodeId| {
            if !self.nodes.contains_key(&id) {
                missing.insert(id);
            }
        };
        for &id in &self.roots {
            check(id);
        }
        for node in self.nodes.values() {
            for &child in &node.children {
                check(child);
            }
            if let NodeKind::Instance { target } = node.kind {
                check(target);
            }
            for value in node.metadata.values() {
                value.visit_refs(&mut check);
            }
        }
        missing.into_iter().collect()
    }

    /// Material keys used by nodes but not defined in [`Document::materials`].
    pub fn missing_materials(&self) -> Vec<String> {
        let keys: BTreeSet<&String> = self
            .nodes
            .values()
            .filter_map(|n| n.material.as_ref())
            .filter(|k| !self.materials.contains_key(*k))
            .collect();
        keys.into_iter().cloned().collect()
    }
}

impl Value {
    fn visit_refs(&self, f: &mut impl FnMut(NodeId)) {
        match self {
            Value::NodeRef(r) => f(r.node),
            Value::List(items) => items.iter().for_each(|v| v.visit_refs(f)),
            Value::Map(map) => map.values().for_each(|v| v.visit_refs(f)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> GeometryRecord {
        GeometryRecord::Polygon {
            polygon: PolygonRecord {
                exterior: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]],
                interiors: vec![],
            },
        }
    }

    #[test]
    fn roundtrip_document() {
        let mut doc = Document::new();
        let mut metadata = BTreeMap::new();
        metadata.insert("osm:building".to_string(), Value::String("yes".into()));
        metadata.insert("ddd:height".to_string(), Value::Number(12.5));
        metadata.insert("ddd:ref".to_string(), Value::NodeRef(NodeRef { node: 2 }));

        doc.nodes.insert(
            1,
            NodeRecord {
                id: 1,
                name: "building".into(),
                kind: NodeKind::Node2 {
                    geometry: Some(square()),
                },
                metadata,
                material: Some("wall".into()),
                transform: TransformRecord::default(),
                children: vec![2],
            },
        );
        doc.nodes.insert(
            2,
            NodeRecord {
                id: 2,
                name: "roof".into(),
                kind: NodeKind::Node3 {
                    mesh: Some(MeshRecord {
                        vertices: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                        faces: vec![[0, 1, 2]],
                        uvs: None,
                        normals: None,
                    }),
                },
                metadata: BTreeMap::new(),
                material: None,
                transform: TransformRecord::default(),
                children: vec![],
            },
        );
        doc.materials.insert(
            "wall".into(),
            MaterialDef {
                name: "wall".into(),
                color: [0.8, 0.8, 0.8, 1.0],
                metallic: None,
                roughness: Some(0.9),
                textures: BTreeMap::new(),
                alpha_mode: AlphaMode::Opaque,
                alpha_cutoff: None,
                double_sided: false,
                atlas: None,
                extras: BTreeMap::new(),
            },
        );
        doc.roots.push(1);

        let json = doc.to_json().unwrap();
        let restored = Document::from_json(&json).unwrap();
        assert_eq!(doc, restored);
        assert!(restored.missing_references().is_empty());
        assert!(restored.missing_materials().is_empty());
    }

    #[test]
    fn node_ref_is_distinct_from_map() {
        let r: Value = serde_json::from_str(r#"{"$node": 7}"#).unwrap();
        assert_eq!(r, Value::NodeRef(NodeRef { node: 7 }));

        let m: Value = serde_json::from_str(r#"{"$node": 7, "other": 1}"#).unwrap();
        assert!(matches!(m, Value::Map(_)), "extra keys make it a plain map");
    }

    #[test]
    fn metadata_scalars_deserialize() {
        let v: Value = serde_json::from_str(r#"[null, true, 3, "x", {"a": [1.5]}]"#).unwrap();
        let Value::List(items) = v else {
            panic!("expected list");
        };
        assert_eq!(items[0], Value::Null);
        assert_eq!(items[1], Value::Bool(true));
        assert_eq!(items[2], Value::Number(3.0));
        assert_eq!(items[3], Value::String("x".into()));
        assert!(matches!(items[4], Value::Map(_)));
    }

    #[test]
    fn missing_references_reported() {
        let mut doc = Document::new();
        doc.nodes.insert(
            1,
            NodeRecord {
                id: 1,
                name: "tree".into(),
                kind: NodeKind::Instance { target: 42 },
                metadata: BTreeMap::new(),
                material: Some("bark".into()),
                transform: TransformRecord::default(),
                children: vec![],
            },
        );
        doc.roots.push(1);
        assert_eq!(doc.missing_references(), vec![42]);
        assert_eq!(doc.missing_materials(), vec!["bark".to_string()]);
    }

    #[test]
    fn transform_defaults_when_absent() {
        let json = r#"{"id": 3, "name": "n", "kind": {"type": "Node3", "mesh": null}}"#;
        let rec: NodeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.transform, TransformRecord::default());
        assert!(rec.children.is_empty());
    }
}
