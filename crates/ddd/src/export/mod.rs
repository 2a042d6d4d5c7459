//! Scene export.
//!
//! [`Node::save`] picks the format from the file extension:
//!
//! | Extension | Output |
//! |---|---|
//! | `.glb`, `.gltf` | glTF 2.0 scene (feature `gltf`) |
//! | `.json`, `.yaml`, `.ddd` | portable scene document |
//! | `.geojson` | 2D features with metadata properties |
//! | `.svg` | 2D outlines with metadata as `data-*` attributes |

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ddd_math::Transform;
use tracing::{info, warn};

use crate::meta::Metadata;
use crate::node::{Node, NodeKind};
use crate::{persist, DddError, Result};

pub mod geojson;
#[cfg(feature = "gltf")]
pub mod gltf;
pub mod svg;

/// How exported nodes are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingMode {
    /// Node name; glTF makes duplicates unique with `#N`.
    #[default]
    Name,
    /// Slash path from the export root.
    Path,
    /// Node name followed by a running counter.
    NameNumbered,
    /// Node name, duplicates made unique with `#N` in every format.
    NameUnique,
}

impl FromStr for NamingMode {
    type Err = DddError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(NamingMode::Name),
            "path" => Ok(NamingMode::Path),
            "name_numbered" => Ok(NamingMode::NameNumbered),
            "name_unique" => Ok(NamingMode::NameUnique),
            other => Err(DddError::UnsupportedFormat(format!("naming mode '{other}'"))),
        }
    }
}

impl fmt::Display for NamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NamingMode::Name => "name",
            NamingMode::Path => "path",
            NamingMode::NameNumbered => "name_numbered",
            NamingMode::NameUnique => "name_unique",
        })
    }
}

/// Export settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Node naming.
    pub naming: NamingMode,
    /// Expand instances into standalone meshes instead of sharing them.
    pub export_meshes: bool,
    /// Write vertex normals.
    pub normals: bool,
    /// Embed textures.
    pub textures: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            naming: NamingMode::Name,
            export_meshes: false,
            normals: true,
            textures: true,
        }
    }
}

/// Assigns export names.
pub(crate) struct Namer {
    mode: NamingMode,
    unique: bool,
    counter: usize,
    suffixes: HashMap<String, usize>,
    emitted: HashSet<String>,
}

impl Namer {
    /// `force_unique` makes duplicates unique in every mode.
    pub(crate) fn new(mode: NamingMode, force_unique: bool) -> Self {
        Self {
            mode,
            unique: force_unique || mode == NamingMode::NameUnique,
            counter: 0,
            suffixes: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    pub(crate) fn name(&mut self, name: &str, path: &str) -> String {
        let base = match self.mode {
            NamingMode::Name | NamingMode::NameUnique => name.to_string(),
            NamingMode::Path => path.to_string(),
            NamingMode::NameNumbered => {
                self.counter += 1;
                format!("{name}_{}", self.counter)
            }
        };
        if !self.unique {
            return base;
        }
        let mut candidate = base.clone();
        if self.emitted.contains(&candidate) {
            let n = self.suffixes.entry(base.clone()).or_insert(0);
            // Literal names may already look like `name#N`.
            loop {
                *n += 1;
                candidate = format!("{base}#{n}");
                if !self.emitted.contains(&candidate) {
                    break;
                }
            }
        }
        self.emitted.insert(candidate.clone());
        candidate
    }
}

/// Export path of a child.
pub(crate) fn child_path(parent: &str, name: &str) -> String {
    format!("{}/{name}", parent.trim_end_matches('/'))
}

/// Instances nested deeper than this are not expanded on export.
pub(crate) const MAX_DEPTH: usize = 64;

/// A node placed in the export root's frame.
pub(crate) struct Placed {
    pub node: Node,
    pub path: String,
    pub world: Transform,
}

/// Pre-order list of the tree with world transforms; instances are
/// expanded in place of their targets.
pub(crate) fn flatten(root: &Node) -> Vec<Placed> {
    let mut out = Vec::new();
    flatten_into(
        root,
        &child_path("", &root.name()),
        &root.transform(),
        0,
        &mut out,
    );
    out
}

fn flatten_into(node: &Node, path: &str, world: &Transform, depth: usize, out: &mut Vec<Placed>) {
    out.push(Placed {
        node: node.clone(),
        path: path.to_string(),
        world: world.clone(),
    });
    if let NodeKind::Instance(target) = &*node.kind() {
        if depth >= MAX_DEPTH {
            warn!(node = %path, "instance nesting too deep, not expanded");
        } else {
            let placed = world.compose(&target.transform());
            flatten_into(target, &child_path(path, &target.name()), &placed, depth + 1, out);
        }
    }
    for c in node.children() {
        let w = world.compose(&c.transform());
        flatten_into(&c, &child_path(path, &c.name()), &w, depth, out);
    }
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

impl Node {
    /// Writes the subtree to `path`; the format follows the extension.
    ///
    /// # Errors
    ///
    /// [`DddError::UnsupportedFormat`] for unknown extensions (and `.png`,
    /// which is not rendered), I/O and encoding errors otherwise.
    pub fn save(&self, path: impl AsRef<Path>, options: &ExportOptions) -> Result<()> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            #[cfg(feature = "gltf")]
            "glb" => write_bytes(path, &gltf::to_glb(self, options)?)?,
            #[cfg(feature = "gltf")]
            "gltf" => write_bytes(path, gltf::to_gltf(self, options)?.as_bytes())?,
            "json" | "yaml" | "yml" | "ddd" => persist::save(path, &[self], &Metadata::new())?,
            "geojson" => write_bytes(path, geojson::to_geojson(self, options)?.as_bytes())?,
            "svg" => write_bytes(path, svg::to_svg(self, options).as_bytes())?,
            _ => return Err(DddError::UnsupportedFormat(path.display().to_string())),
        }
        info!(path = %path.display(), nodes = self.count(), "exported");
        Ok(())
    }
}
