//! Build settings.
//!
//! Settings come from TOML files, then `DDD_*` environment variables, then
//! command-line properties, each layer overriding the previous one.
//!
//! ```toml
//! include = ["common.toml"]
//! workdir = "build"
//! naming = "name_unique"
//!
//! [data]
//! "ddd:osm:area:default" = "park"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::export::{ExportOptions, NamingMode};
use crate::meta::{MetaValue, Metadata};
use crate::{DddError, Result};

/// Resolved settings of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Working directory; the catalog lives under `<workdir>/_catalog`.
    pub workdir: PathBuf,
    /// Input data directory.
    pub datadir: PathBuf,
    /// Directory for pipeline cache files; `<workdir>/cache` when unset.
    pub cache_dir: Option<PathBuf>,
    /// Cache files are read but never written.
    pub cache_ro: bool,
    /// Export options.
    pub export: ExportOptions,
    /// Initial pipeline data.
    pub data: Metadata,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            datadir: PathBuf::from("data"),
            cache_dir: None,
            cache_ro: false,
            export: ExportOptions::default(),
            data: Metadata::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    include: Vec<PathBuf>,
    workdir: Option<PathBuf>,
    datadir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    cache_ro: Option<bool>,
    naming: Option<String>,
    export_meshes: Option<bool>,
    normals: Option<bool>,
    textures: Option<bool>,
    #[serde(default)]
    data: BTreeMap<String, toml::Value>,
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Text of a property value: JSON scalars are parsed, anything else is a string.
pub fn parse_value(text: &str) -> MetaValue {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(v) if !v.is_object() && !v.is_array() => MetaValue::from_json(&v),
        _ => MetaValue::String(text.to_string()),
    }
}

/// `DDD_OSM_AREA_DEFAULT` -> `ddd:osm:area:default`.
fn env_data_key(var: &str) -> Option<String> {
    let rest = var.strip_prefix("DDD_")?;
    if rest.is_empty() {
        return None;
    }
    Some(format!("ddd:{}", rest.to_ascii_lowercase().replace('_', ":")))
}

impl Settings {
    /// Defaults, then each file in order.
    pub fn from_files<P: AsRef<Path>>(files: &[P]) -> Result<Self> {
        let mut settings = Self::default();
        for f in files {
            settings.load_file(f.as_ref())?;
        }
        Ok(settings)
    }

    /// Applies a TOML settings file. Included files are applied first, so
    /// the including file overrides them.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let mut stack = Vec::new();
        self.load_file_nested(path, &mut stack)
    }

    fn load_file_nested(&mut self, path: &Path, stack: &mut Vec<PathBuf>) -> Result<()> {
        let abs = absolute(path)?;
        if stack.contains(&abs) {
            return Err(DddError::Cycle {
                message: format!("settings file {} includes itself", abs.display()),
                node: None,
            });
        }
        let text = std::fs::read_to_string(&abs).map_err(|e| DddError::MissingResource {
            resource: abs.display().to_string(),
            message: e.to_string(),
        })?;
        let file: SettingsFile = toml::from_str(&text)
            .map_err(|e| DddError::Serialization(format!("{}: {e}", abs.display())))?;

        stack.push(abs.clone());
        let base = abs.parent().map(Path::to_path_buf).unwrap_or_default();
        for inc in &file.include {
            self.load_file_nested(&base.join(inc), stack)?;
        }
        stack.pop();

        if let Some(p) = file.workdir {
            self.workdir = p;
        }
        if let Some(p) = file.datadir {
            self.datadir = p;
        }
        if let Some(p) = file.cache_dir {
            self.cache_dir = Some(p);
        }
        if let Some(v) = file.cache_ro {
            self.cache_ro = v;
        }
        if let Some(n) = file.naming {
            self.export.naming = n.parse()?;
        }
        if let Some(v) = file.export_meshes {
            self.export.export_meshes = v;
        }
        if let Some(v) = file.normals {
            self.export.normals = v;
        }
        if let Some(v) = file.textures {
            self.export.textures = v;
        }
        for (k, v) in file.data {
            let json = serde_json::to_value(&v)?;
            self.data.insert(k, MetaValue::from_json(&json));
        }
        debug!(file = %abs.display(), "loaded settings");
        Ok(())
    }

    /// Applies `DDD_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(std::env::vars())
    }

    /// Applies `DDD_*` variables. `DDD_WORKDIR` and `DDD_DATADIR` are made
    /// absolute; unknown variables become `ddd:*` data keys.
    pub fn apply_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        for (name, value) in vars {
            match name.as_str() {
                "DDD_WORKDIR" => self.workdir = absolute(Path::new(&value))?,
                "DDD_DATADIR" => self.datadir = absolute(Path::new(&value))?,
                "DDD_CACHE_DIR" => self.cache_dir = Some(PathBuf::from(value)),
                "DDD_NAMING" => self.export.naming = value.parse::<NamingMode>()?,
                _ => {
                    if let Some(key) = env_data_key(&name) {
                        self.data.insert(key, parse_value(&value));
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies a `key=value` property.
    pub fn set_property(&mut self, property: &str) -> Result<()> {
        let (key, value) = property
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| {
                DddError::Serialization(format!("property '{property}' is not key=value"))
            })?;
        self.data.insert(key.trim().to_string(), parse_value(value));
        Ok(())
    }

    /// Directory holding the catalog.
    pub fn catalog_dir(&self) -> PathBuf {
        self.workdir.join("_catalog")
    }

    /// Directory holding pipeline caches.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.workdir.join("cache"))
    }
}
