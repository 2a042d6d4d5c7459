#![warn(missing_docs)]

//! ddd — procedural 2D/3D scene generation.
//!
//! A scene is a tree of [`Node`]s carrying planar geometries, triangle
//! meshes or instances of other nodes. Trees are transformed by geometric
//! operations, queried and edited with [selectors](selector), and driven
//! by an ordered [`Pipeline`] of tasks. Finished scenes are written as
//! glTF, GeoJSON, SVG or the portable JSON document.
//!
//! # Example
//!
//! ```rust,no_run
//! use ddd::builder;
//! use ddd_geom2::extrude::ExtrudeOptions;
//! use ddd_geom2::ops::BufferOptions;
//!
//! let plot = builder::rect("plot", [0.0, 0.0, 10.0, 6.0]);
//! let wall = plot.buffer(-0.5, &BufferOptions::mitre());
//! let building = wall.extrude(8.0, &ExtrudeOptions::default()).unwrap();
//! building.set("ddd:height", 8.0);
//! building.save("building.glb", &Default::default()).unwrap();
//! ```

use std::fmt;

use thiserror::Error;

pub mod builder;
pub mod catalog;
pub mod export;
pub mod lock;
pub mod material;
pub mod meta;
pub mod node;
pub mod ops2;
pub mod ops3;
pub mod persist;
pub mod pipeline;
pub mod selector;
pub mod settings;
pub mod texture;
pub mod traverse;

pub use catalog::Catalog;
pub use material::Material;
pub use meta::{MetaValue, Metadata, MetadataExt};
pub use node::{Node, NodeKind};
pub use pipeline::{Pipeline, PipelineBuilder, Task, TaskContext};
pub use selector::{Selector, SelectorError};
pub use settings::Settings;
pub use traverse::{Edit, SelectOptions, Selection};

/// Identifies the node an error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    /// Node name.
    pub name: String,
    /// Slash path from the tree root.
    pub path: String,
    /// Node kind (`Node2`, `Node3` or `Instance`).
    pub kind: &'static str,
}

impl fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' at {}", self.kind, self.name, self.path)
    }
}

fn located(node: &Option<NodeSummary>) -> String {
    node.as_ref().map(|n| format!(" ({n})")).unwrap_or_default()
}

/// Errors returned by scene operations.
#[derive(Error, Debug)]
pub enum DddError {
    /// Empty, degenerate or self-intersecting geometry.
    #[error("invalid geometry: {message}{}", located(.node))]
    InvalidGeometry {
        /// What is wrong.
        message: String,
        /// Offending node.
        node: Option<NodeSummary>,
    },
    /// A buffer or boolean operation failed.
    #[error("topology error: {message}{}", located(.node))]
    Topology {
        /// What failed.
        message: String,
        /// Offending node.
        node: Option<NodeSummary>,
    },
    /// A required metadata key is absent or has the wrong type.
    #[error("missing metadata '{key}'{}", located(.node))]
    MissingMetadata {
        /// Metadata key.
        key: String,
        /// Offending node.
        node: Option<NodeSummary>,
    },
    /// A texture, catalog entry or file could not be found.
    #[error("missing resource {resource}: {message}")]
    MissingResource {
        /// Path or key of the resource.
        resource: String,
        /// Why it could not be used.
        message: String,
    },
    /// A polygon could not be triangulated, even after cleaning.
    #[error("triangulation failed: {message}{}", located(.node))]
    Triangulation {
        /// Failure detail.
        message: String,
        /// Offending node.
        node: Option<NodeSummary>,
    },
    /// A selector string could not be parsed.
    #[error(transparent)]
    Selector(#[from] SelectorError),
    /// A node would become its own ancestor or instance target.
    #[error("cycle detected: {message}{}", located(.node))]
    Cycle {
        /// Description of the cycle.
        message: String,
        /// Offending node.
        node: Option<NodeSummary>,
    },
    /// A catalog key is already taken.
    #[error("catalog key '{0}' already defined")]
    DuplicateKey(String),
    /// A pipeline task failed.
    #[error("task '{task}' failed: {source}")]
    Task {
        /// Task name.
        task: String,
        /// Underlying error.
        #[source]
        source: Box<DddError>,
    },
    /// Encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A file format is not supported for the requested operation.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DddError {
    /// Attaches `node` to errors that identify a node and have none yet.
    pub fn at(mut self, node: &Node) -> Self {
        match &mut self {
            DddError::InvalidGeometry { node: slot, .. }
            | DddError::Topology { node: slot, .. }
            | DddError::MissingMetadata { node: slot, .. }
            | DddError::Triangulation { node: slot, .. }
            | DddError::Cycle { node: slot, .. } => {
                if slot.is_none() {
                    *slot = Some(node.summary());
                }
            }
            _ => {}
        }
        self
    }
}

impl From<ddd_geom2::GeomError> for DddError {
    fn from(e: ddd_geom2::GeomError) -> Self {
        use ddd_geom2::GeomError;
        match e {
            GeomError::InvalidGeometry(message) => DddError::InvalidGeometry {
                message,
                node: None,
            },
            GeomError::Topology(message) => DddError::Topology {
                message,
                node: None,
            },
            GeomError::Triangulation(message) => DddError::Triangulation {
                message,
                node: None,
            },
            GeomError::Path(e) => DddError::InvalidGeometry {
                message: e.to_string(),
                node: None,
            },
        }
    }
}

impl From<ddd_path::PathError> for DddError {
    fn from(e: ddd_path::PathError) -> Self {
        DddError::InvalidGeometry {
            message: e.to_string(),
            node: None,
        }
    }
}

impl From<ddd_mesh::MeshError> for DddError {
    fn from(e: ddd_mesh::MeshError) -> Self {
        DddError::InvalidGeometry {
            message: e.to_string(),
            node: None,
        }
    }
}

impl From<serde_json::Error> for DddError {
    fn from(e: serde_json::Error) -> Self {
        DddError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for DddError {
    fn from(e: serde_yaml::Error) -> Self {
        DddError::Serialization(e.to_string())
    }
}

/// Result alias for scene operations.
pub type Result<T, E = DddError> = std::result::Result<T, E>;
