//! Declarative pipeline files.
//!
//! ```toml
//! root = "site"
//!
//! [[task]]
//! name = "plot"
//! order = "10"
//! op = "rect"
//! node = "plot"
//! bounds = [0, 0, 20, 12]
//!
//! [[task]]
//! name = "buildings"
//! order = "20"
//! select = "[osm:building]"
//! op = "extrude"
//! height = 9.0
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// A pipeline file.
#[derive(Debug, Deserialize)]
pub struct Script {
    /// Name of the root node.
    #[serde(default = "default_root")]
    pub root: String,
    /// Tasks in declaration order.
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskDef>,
    /// Directory of the file; relative inputs resolve against it.
    #[serde(skip)]
    pub base: PathBuf,
}

fn default_root() -> String {
    "root".to_string()
}

fn yes() -> bool {
    true
}

/// One `[[task]]` table.
#[derive(Debug, Deserialize)]
pub struct TaskDef {
    pub name: String,
    pub order: Option<String>,
    pub path: Option<String>,
    pub select: Option<String>,
    #[serde(default = "yes")]
    pub recurse: bool,
    #[serde(default)]
    pub init: bool,
    #[serde(default)]
    pub cache_override: bool,
    #[serde(flatten)]
    pub op: Op,
}

/// Buffer end caps.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cap {
    #[default]
    Round,
    Flat,
    Square,
}

/// Buffer corner joins.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Join {
    #[default]
    Round,
    Mitre,
    Bevel,
}

fn default_resolution() -> usize {
    8
}

fn default_eps() -> f64 {
    0.01
}

/// Built-in operations.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Appends the features of a GeoJSON file.
    LoadGeojson { file: PathBuf },
    /// Appends a stored scene document.
    Load { file: PathBuf },
    /// Appends a rectangle `[x0, y0, x1, y1]`.
    Rect { node: String, bounds: [f64; 4] },
    /// Appends a disc.
    Disc {
        node: String,
        center: [f64; 2],
        radius: f64,
        #[serde(default = "default_resolution")]
        resolution: usize,
    },
    /// Sets a metadata key on selected nodes.
    Set { key: String, value: toml::Value },
    /// Removes selected nodes.
    Remove,
    /// Buffers selected nodes.
    Buffer {
        distance: f64,
        #[serde(default)]
        cap: Cap,
        #[serde(default)]
        join: Join,
    },
    /// Cleans selected nodes.
    Clean {
        #[serde(default = "default_eps")]
        eps: f64,
    },
    /// Unions each selected subtree into one node.
    Union,
    /// Extrudes selected nodes by `height`, or by their `ddd:height`.
    Extrude {
        height: Option<f64>,
        #[serde(default)]
        center: bool,
    },
    /// Triangulates selected nodes.
    Triangulate,
    /// Merges the meshes of selected subtrees.
    Combine,
    /// Replaces selected nodes by catalog instances, cataloguing the first.
    Catalog { key: String },
    /// Skips the tasks ordered below unless a data key is true.
    Condition { key: String },
    /// Caches the scene in the cache directory.
    Cache { file: String },
    /// Exports the scene.
    Save { file: PathBuf },
}

impl Script {
    /// Reads a pipeline file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline {}", path.display()))?;
        let mut script: Script = toml::from_str(&text)
            .with_context(|| format!("invalid pipeline {}", path.display()))?;
        script.base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(script)
    }

    /// `file` relative to the pipeline file.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.base.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tasks() {
        let script: Script = toml::from_str(
            r#"
            [[task]]
            name = "plot"
            order = "10"
            op = "rect"
            node = "plot"
            bounds = [0, 0, 2, 2]

            [[task]]
            name = "grow"
            select = "[osm:building]"
            op = "buffer"
            distance = 0.5
            join = "mitre"

            [[task]]
            name = "drop"
            op = "remove"
            path = "/tmp"
            "#,
        )
        .unwrap();
        assert_eq!(script.root, "root");
        assert_eq!(script.tasks.len(), 3);
        assert!(matches!(script.tasks[0].op, Op::Rect { ref node, bounds } if node == "plot" && bounds[2] == 2.0));
        assert!(matches!(script.tasks[1].op, Op::Buffer { join: Join::Mitre, cap: Cap::Round, .. }));
        assert!(script.tasks[1].order.is_none());
        assert!(matches!(script.tasks[2].op, Op::Remove));
    }

    #[test]
    fn test_unknown_op() {
        let err = toml::from_str::<Script>("[[task]]\nname = \"x\"\nop = \"teleport\"\n");
        assert!(err.is_err());
    }
}
