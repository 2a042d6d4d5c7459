//! glTF 2.0 export.
//!
//! The scene graph is kept: every node becomes a glTF node carrying its
//! translation and rotation, and its exported metadata in `extras`. Scale
//! never reaches a node matrix; it is baked into mesh vertices (and into
//! the positions of descendants). Meshes of instance targets are written
//! once and shared by every unscaled instance.
//!
//! ddd is Z-up; the scene root is rotated into glTF's Y-up frame.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use base64::Engine;
use ddd_math::{Rotation, Vec3};
use ddd_mesh::TriMesh;
use gltf::json::{self, validation::Checked::Valid, validation::USize64};
use tracing::{debug, warn};

use super::{child_path, ExportOptions, Namer, MAX_DEPTH};
use crate::material::Material;
use crate::meta::MetadataExt;
use crate::node::{Node, NodeKind};
use crate::{texture, DddError, Result};

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

fn is_one(v: &Vec3) -> bool {
    (v - Vec3::new(1.0, 1.0, 1.0)).norm() < 1e-9
}

fn f32_bytes<const N: usize>(items: impl Iterator<Item = [f32; N]>) -> Vec<u8> {
    items.flat_map(|a| a.into_iter().flat_map(f32::to_le_bytes)).collect()
}

struct Writer<'a> {
    root: json::Root,
    bin: Vec<u8>,
    options: &'a ExportOptions,
    namer: Namer,
    embed_images_in_buffer: bool,
    meshes: HashMap<usize, Option<json::Index<json::Mesh>>>,
    materials: HashMap<*const Material, json::Index<json::Material>>,
    textures: HashMap<String, Option<json::Index<json::Texture>>>,
}

impl<'a> Writer<'a> {
    fn new(options: &'a ExportOptions, embed_images_in_buffer: bool) -> Self {
        let mut root = json::Root::default();
        root.asset.generator = Some(format!("ddd {}", env!("CARGO_PKG_VERSION")));
        Self {
            root,
            bin: Vec::new(),
            options,
            namer: Namer::new(options.naming, true),
            embed_images_in_buffer,
            meshes: HashMap::new(),
            materials: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    fn push_view(
        &mut self,
        bytes: &[u8],
        target: Option<json::buffer::Target>,
    ) -> json::Index<json::buffer::View> {
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.bin.resize(align4(self.bin.len()), 0);
        self.root.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64::from(bytes.len()),
            byte_offset: Some(USize64::from(offset)),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: target.map(Valid),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn push_accessor(
        &mut self,
        bytes: &[u8],
        count: usize,
        component: json::accessor::ComponentType,
        type_: json::accessor::Type,
        target: json::buffer::Target,
        min: Option<serde_json::Value>,
        max: Option<serde_json::Value>,
    ) -> json::Index<json::Accessor> {
        let view = self.push_view(bytes, Some(target));
        self.root.push(json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(0)),
            count: USize64::from(count),
            component_type: Valid(json::accessor::GenericComponentType(component)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(type_),
            min,
            max,
            name: None,
            normalized: false,
            sparse: None,
        })
    }

    fn mesh(
        &mut self,
        name: &str,
        mesh: &TriMesh,
        material: Option<json::Index<json::Material>>,
    ) -> Option<json::Index<json::Mesh>> {
        if mesh.is_empty() {
            return None;
        }
        use json::accessor::{ComponentType, Type};
        use json::buffer::Target;

        let positions: Vec<[f32; 3]> = mesh
            .vertices
            .iter()
            .map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect();
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for p in &positions {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        let count = positions.len();
        let mut attributes = BTreeMap::new();
        let pos = self.push_accessor(
            &f32_bytes(positions.into_iter()),
            count,
            ComponentType::F32,
            Type::Vec3,
            Target::ArrayBuffer,
            Some(serde_json::json!(min)),
            Some(serde_json::json!(max)),
        );
        attributes.insert(Valid(json::mesh::Semantic::Positions), pos);

        if self.options.normals {
            let normals = match &mesh.normals {
                Some(n) => n.clone(),
                None => {
                    let mut m = mesh.clone();
                    m.compute_vertex_normals();
                    m.normals.unwrap_or_default()
                }
            };
            if normals.len() == count {
                let bytes = f32_bytes(normals.iter().map(|n| [n.x as f32, n.y as f32, n.z as f32]));
                let acc = self.push_accessor(
                    &bytes,
                    count,
                    ComponentType::F32,
                    Type::Vec3,
                    Target::ArrayBuffer,
                    None,
                    None,
                );
                attributes.insert(Valid(json::mesh::Semantic::Normals), acc);
            }
        }
        if let Some(uvs) = mesh.uvs.as_ref().filter(|uv| uv.len() == count) {
            // glTF puts the texture origin at the top left.
            let bytes = f32_bytes(uvs.iter().map(|uv| [uv[0] as f32, 1.0 - uv[1] as f32]));
            let acc = self.push_accessor(
                &bytes,
                count,
                ComponentType::F32,
                Type::Vec2,
                Target::ArrayBuffer,
                None,
                None,
            );
            attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), acc);
        }

        let indices: Vec<u8> = mesh
            .faces
            .iter()
            .flat_map(|f| f.iter().flat_map(|i| i.to_le_bytes()))
            .collect();
        let idx = self.push_accessor(
            &indices,
            mesh.faces.len() * 3,
            ComponentType::U32,
            Type::Scalar,
            Target::ElementArrayBuffer,
            None,
            None,
        );
        let primitive = json::mesh::Primitive {
            attributes,
            extensions: Default::default(),
            extras: Default::default(),
            indices: Some(idx),
            material,
            mode: Valid(json::mesh::Mode::Triangles),
            targets: None,
        };
        Some(self.root.push(json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some(name.to_string()),
            primitives: vec![primitive],
            weights: None,
        }))
    }

    fn texture(&mut self, path: &str) -> Option<json::Index<json::Texture>> {
        if let Some(t) = self.textures.get(path) {
            return *t;
        }
        let png = texture::load(path, None).and_then(|img| texture::encode_png(&img));
        let index = match png {
            Ok(bytes) => {
                let image = if self.embed_images_in_buffer {
                    let view = self.push_view(&bytes, None);
                    json::Image {
                        buffer_view: Some(view),
                        mime_type: Some(json::image::MimeType("image/png".to_string())),
                        name: Some(path.to_string()),
                        uri: None,
                        extensions: Default::default(),
                        extras: Default::default(),
                    }
                } else {
                    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
                    json::Image {
                        buffer_view: None,
                        mime_type: None,
                        name: Some(path.to_string()),
                        uri: Some(format!("data:image/png;base64,{data}")),
                        extensions: Default::default(),
                        extras: Default::default(),
                    }
                };
                let source = self.root.push(image);
                Some(self.root.push(json::Texture {
                    sampler: None,
                    source,
                    name: None,
                    extensions: Default::default(),
                    extras: Default::default(),
                }))
            }
            Err(e) => {
                warn!(texture = %path, error = %e, "texture not embedded");
                None
            }
        };
        self.textures.insert(path.to_string(), index);
        index
    }

    fn material(&mut self, m: &Rc<Material>) -> json::Index<json::Material> {
        if let Some(i) = self.materials.get(&Rc::as_ptr(m)) {
            return *i;
        }
        use json::material::{AlphaCutoff, AlphaMode, PbrBaseColorFactor, StrengthFactor};

        let base_color_texture = match m.albedo() {
            Some(path) if self.options.textures => self.texture(path).map(|index| {
                json::texture::Info {
                    index,
                    tex_coord: 0,
                    extensions: Default::default(),
                    extras: Default::default(),
                }
            }),
            _ => None,
        };
        let alpha_mode = match m.alpha_mode {
            crate::material::AlphaMode::Opaque => AlphaMode::Opaque,
            crate::material::AlphaMode::Blend => AlphaMode::Blend,
            crate::material::AlphaMode::Mask => AlphaMode::Mask,
        };
        let extras = if m.extras.is_empty() {
            Default::default()
        } else {
            let map: serde_json::Map<String, serde_json::Value> = m
                .extras
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            serde_json::value::to_raw_value(&map).ok()
        };
        let material = json::Material {
            name: Some(m.name.clone()),
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_factor: PbrBaseColorFactor(m.color),
                base_color_texture,
                metallic_factor: StrengthFactor(m.metallic.unwrap_or(0.0)),
                roughness_factor: StrengthFactor(m.roughness.unwrap_or(1.0)),
                ..Default::default()
            },
            alpha_mode: Valid(alpha_mode),
            alpha_cutoff: m.alpha_cutoff.map(AlphaCutoff),
            double_sided: m.double_sided,
            extras,
            ..Default::default()
        };
        let index = self.root.push(material);
        self.materials.insert(Rc::as_ptr(m), index);
        index
    }

    /// Emits `node` and its subtree; `inherited` is the scale baked in by ancestors.
    fn node(
        &mut self,
        node: &Node,
        path: &str,
        inherited: Vec3,
        depth: usize,
    ) -> json::Index<json::Node> {
        let t = node.transform();
        let bake = inherited.component_mul(&t.scale);
        let share = is_one(&bake) && !self.options.export_meshes;

        let meta = node.metadata().exported();
        let extras = if meta.is_empty() {
            Default::default()
        } else {
            serde_json::value::to_raw_value(&meta).ok()
        };
        let translation = inherited.component_mul(&t.position);
        let q = t.rotation.coords;
        let mut gnode = json::Node {
            name: Some(self.namer.name(&node.name(), path)),
            translation: (translation.norm() > 0.0)
                .then(|| [translation.x as f32, translation.y as f32, translation.z as f32]),
            rotation: (t.rotation.angle() > 0.0).then(|| {
                json::scene::UnitQuaternion([q.x as f32, q.y as f32, q.z as f32, q.w as f32])
            }),
            extras,
            ..Default::default()
        };

        let mut children = Vec::new();
        let kind = node.kind().clone();
        match kind {
            NodeKind::Mesh3(Some(mesh)) => {
                let material = node.material().map(|m| self.material(&m));
                let key = node.addr();
                let cached = if share { self.meshes.get(&key).copied() } else { None };
                gnode.mesh = match cached {
                    Some(index) => index,
                    None => {
                        let mesh = if is_one(&bake) {
                            mesh
                        } else {
                            mesh.transformed(&nalgebra::Matrix4::new_nonuniform_scaling(&bake))
                        };
                        let index = self.mesh(&node.name(), &mesh, material);
                        if share {
                            self.meshes.insert(key, index);
                        }
                        index
                    }
                };
            }
            NodeKind::Instance(target) => {
                if depth >= MAX_DEPTH {
                    warn!(node = %path, "instance nesting too deep, not expanded");
                } else {
                    if !t.is_uniform_scale() {
                        warn!(node = %path, "non-uniformly scaled instance exported as a mesh copy");
                    } else if !is_one(&bake) {
                        debug!(node = %path, "scaled instance exported as a mesh copy");
                    }
                    let p = child_path(path, &target.name());
                    children.push(self.node(&target, &p, bake, depth + 1));
                }
            }
            _ => {}
        }
        for c in node.children() {
            let p = child_path(path, &c.name());
            children.push(self.node(&c, &p, bake, depth));
        }
        if !children.is_empty() {
            gnode.children = Some(children);
        }
        self.root.push(gnode)
    }

    fn finish(mut self, top: json::Index<json::Node>) -> (json::Root, Vec<u8>) {
        // Z-up to Y-up.
        let axes = Rotation::from_euler_angles(-std::f64::consts::FRAC_PI_2, 0.0, 0.0);
        if let Some(n) = self.root.nodes.get_mut(top.value()) {
            let r = match &n.rotation {
                Some(json::scene::UnitQuaternion([x, y, z, w])) => {
                    Rotation::from_quaternion(nalgebra::Quaternion::new(
                        *w as f64, *x as f64, *y as f64, *z as f64,
                    ))
                }
                None => Rotation::identity(),
            };
            let q = (axes * r).coords;
            n.rotation = Some(json::scene::UnitQuaternion([
                q.x as f32, q.y as f32, q.z as f32, q.w as f32,
            ]));
            if let Some([x, y, z]) = n.translation {
                let v = axes * Vec3::new(x as f64, y as f64, z as f64);
                n.translation = Some([v.x as f32, v.y as f32, v.z as f32]);
            }
        }
        let scene = self.root.push(json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            nodes: vec![top],
        });
        self.root.scene = Some(scene);
        if !self.bin.is_empty() {
            self.root.push(json::Buffer {
                byte_length: USize64::from(self.bin.len()),
                extensions: Default::default(),
                extras: Default::default(),
                name: None,
                uri: None,
            });
        }
        (self.root, self.bin)
    }
}

fn build(root: &Node, options: &ExportOptions, glb: bool) -> (json::Root, Vec<u8>) {
    let mut w = Writer::new(options, glb);
    let path = child_path("", &root.name());
    let top = w.node(root, &path, Vec3::new(1.0, 1.0, 1.0), 0);
    debug!(
        nodes = w.root.nodes.len(),
        meshes = w.root.meshes.len(),
        bytes = w.bin.len(),
        "built glTF scene"
    );
    w.finish(top)
}

/// Binary glTF of the tree.
pub fn to_glb(root: &Node, options: &ExportOptions) -> Result<Vec<u8>> {
    let (doc, bin) = build(root, options, true);
    let mut json_bytes = serde_json::to_vec(&doc)?;
    json_bytes.resize(align4(json_bytes.len()), b' ');
    let bin_len = if bin.is_empty() { 0 } else { 8 + bin.len() };
    let length = 12 + 8 + json_bytes.len() + bin_len;
    let glb = gltf::binary::Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length: u32::try_from(length)
                .map_err(|_| DddError::Serialization("glb larger than 4 GiB".into()))?,
        },
        json: Cow::Owned(json_bytes),
        bin: (!bin.is_empty()).then_some(Cow::Owned(bin)),
    };
    glb.to_vec()
        .map_err(|e| DddError::Serialization(e.to_string()))
}

/// glTF JSON of the tree with the buffer embedded as a data URI.
pub fn to_gltf(root: &Node, options: &ExportOptions) -> Result<String> {
    let (mut doc, bin) = build(root, options, false);
    if let Some(buffer) = doc.buffers.first_mut() {
        let data = base64::engine::general_purpose::STANDARD.encode(&bin);
        buffer.uri = Some(format!("data:application/octet-stream;base64,{data}"));
    }
    Ok(serde_json::to_string_pretty(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;

    fn forest() -> Node {
        let proto = builder::cube("tree", 1.0);
        proto.set_material(Some(Material::new("leaves").with_hex("#2a7f2a").shared()));
        let root = builder::group3("forest");
        for i in 0..3 {
            let inst = builder::instance(&format!("t{i}"), &proto);
            inst.translate(Vec3::new(i as f64 * 3.0, 0.0, 0.0));
            inst.set("osm:natural", "tree");
            root.append(&inst).unwrap();
        }
        root
    }

    #[test]
    fn test_instances_share_one_mesh() {
        let bytes = to_glb(&forest(), &ExportOptions::default()).unwrap();
        let gltf = gltf::Gltf::from_slice(&bytes).unwrap();
        assert_eq!(gltf.meshes().count(), 1);
        assert_eq!(gltf.materials().count(), 1);
        let names: Vec<&str> = gltf.nodes().filter_map(|n| n.name()).collect();
        for expected in ["forest", "t0", "tree", "tree#1", "tree#2"] {
            assert!(names.contains(&expected), "{names:?}");
        }
        let t0 = gltf.nodes().find(|n| n.name() == Some("t0")).unwrap();
        let extras = t0.extras().as_ref().unwrap().get();
        assert!(extras.contains("osm:natural"));
    }

    #[test]
    fn test_export_meshes_expands_instances() {
        let options = ExportOptions {
            export_meshes: true,
            ..Default::default()
        };
        let bytes = to_glb(&forest(), &options).unwrap();
        let gltf = gltf::Gltf::from_slice(&bytes).unwrap();
        assert_eq!(gltf.meshes().count(), 3);
    }

    #[test]
    fn test_scale_is_baked_into_vertices() {
        let root = builder::group3("root");
        let c = builder::cube("c", 1.0);
        c.scale(Vec3::new(2.0, 1.0, 1.0));
        root.append(&c).unwrap();
        let bytes = to_glb(&root, &ExportOptions::default()).unwrap();
        let gltf = gltf::Gltf::from_slice(&bytes).unwrap();
        assert!(gltf.nodes().all(|n| n.transform().decomposed().2 == [1.0, 1.0, 1.0]));
        let mesh = gltf.meshes().next().unwrap();
        let bounds = mesh.primitives().next().unwrap().bounding_box();
        assert_eq!(bounds.max[0], 1.0);
    }

    #[test]
    fn test_gltf_embeds_data_uri() {
        let text = to_gltf(&forest(), &ExportOptions::default()).unwrap();
        assert!(text.contains("data:application/octet-stream;base64,"));
        let gltf = gltf::Gltf::from_slice(text.as_bytes()).unwrap();
        assert_eq!(gltf.scenes().count(), 1);
    }
}
