//! Keyed store of prototype nodes.
//!
//! Prototypes are kept in memory and saved as scene documents under
//! `<workdir>/_catalog/<key>.ddd`, so later builds can instance them
//! without regenerating. Keys are normalized to dashes: `tree.oak:big`
//! and `tree-oak-big` name the same entry.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::export::{ExportOptions, NamingMode};
use crate::meta::Metadata;
use crate::node::{Node, NodeKind};
use crate::settings::Settings;
use crate::{builder, persist, DddError, Result};

/// Metadata key tagging catalogued prototypes.
pub const CATALOG_KEY: &str = "ddd:catalog:key";

const EXTENSION: &str = "ddd";

/// Catalog key with `.`, `:` and `_` replaced by `-`.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| if matches!(c, '.' | ':' | '_') { '-' } else { c })
        .collect()
}

/// Prototype catalog.
#[derive(Debug)]
pub struct Catalog {
    dir: PathBuf,
    prototypes: BTreeMap<String, Node>,
    /// Lookups miss so prototypes are rebuilt and replaced.
    pub overwrite: bool,
    /// Nothing is stored or looked up.
    pub ignore: bool,
    /// Added prototypes are written to disk.
    pub autosave: bool,
}

fn find_cycle(node: &Node, stack: &mut Vec<usize>, done: &mut HashSet<usize>) -> Option<String> {
    let addr = node.addr();
    if stack.contains(&addr) {
        return Some(node.name());
    }
    if !done.insert(addr) {
        return None;
    }
    stack.push(addr);
    let mut next = node.children();
    if let NodeKind::Instance(target) = &*node.kind() {
        next.push(target.clone());
    }
    let found = next.iter().find_map(|n| find_cycle(n, stack, done));
    stack.pop();
    found
}

impl Catalog {
    /// Catalog stored in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prototypes: BTreeMap::new(),
            overwrite: false,
            ignore: false,
            autosave: true,
        }
    }

    /// Catalog in the settings' work directory.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.catalog_dir())
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{EXTENSION}"))
    }

    /// Registers `prototype` under `key` and returns an instance of it.
    ///
    /// # Errors
    ///
    /// [`DddError::DuplicateKey`] when the key is taken (unless
    /// `overwrite`), [`DddError::Cycle`] when the prototype instances
    /// itself, and I/O errors from autosave.
    pub fn add(&mut self, key: &str, prototype: &Node) -> Result<Node> {
        let key = normalize_key(key);
        if self.ignore {
            return Ok(Node::new_instance(key, prototype));
        }
        if self.prototypes.contains_key(&key) && !self.overwrite {
            return Err(DddError::DuplicateKey(key));
        }
        if let Some(name) = find_cycle(prototype, &mut Vec::new(), &mut HashSet::new()) {
            return Err(DddError::Cycle {
                message: format!("catalog prototype '{key}' instances '{name}' recursively"),
                node: Some(prototype.summary()),
            });
        }
        prototype.set(CATALOG_KEY, key.as_str());
        if self.autosave {
            persist::save(&self.file(&key), &[prototype], &Metadata::new())?;
        }
        debug!(key = %key, nodes = prototype.count(), "catalogued");
        self.prototypes.insert(key.clone(), prototype.clone());
        Ok(Node::new_instance(key, prototype))
    }

    /// Prototype under `key`, loading it from disk on first use.
    ///
    /// With `overwrite`, only prototypes added in this session are found.
    pub fn get(&mut self, key: &str) -> Option<Node> {
        if self.ignore {
            return None;
        }
        let key = normalize_key(key);
        if let Some(p) = self.prototypes.get(&key) {
            return Some(p.clone());
        }
        let path = self.file(&key);
        if self.overwrite || !path.exists() {
            return None;
        }
        match Node::load(&path) {
            Ok(p) => {
                debug!(key = %key, "loaded from catalog");
                self.prototypes.insert(key, p.clone());
                Some(p)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "catalog entry could not be loaded");
                None
            }
        }
    }

    /// New instance of the prototype under `key`; `None` when it is not
    /// catalogued (or lookups are disabled).
    pub fn instance(&mut self, key: &str, name: Option<&str>) -> Option<Node> {
        let proto = self.get(key)?;
        let name = name.map_or_else(|| normalize_key(key), str::to_string);
        Some(Node::new_instance(name, &proto))
    }

    /// Loads every stored prototype; returns how many are in memory.
    pub fn load_all(&mut self) -> Result<usize> {
        if self.dir.is_dir() {
            let mut keys: Vec<String> = std::fs::read_dir(&self.dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|x| x == EXTENSION))
                .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .collect();
            keys.sort();
            for key in keys {
                self.get(&key);
            }
        }
        Ok(self.prototypes.len())
    }

    /// Keys of the prototypes in memory, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.prototypes.keys().cloned().collect()
    }

    /// Number of prototypes in memory.
    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    /// True when no prototype is in memory.
    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    /// Forgets every prototype and deletes the stored files; returns the
    /// number of files removed.
    pub fn clear(&mut self) -> Result<usize> {
        self.prototypes.clear();
        let mut removed = 0;
        if self.dir.is_dir() {
            for entry in std::fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|x| x == EXTENSION) {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        info!(dir = %self.dir.display(), removed, "catalog cleared");
        Ok(removed)
    }

    /// Every prototype laid out on a grid, one instance each.
    pub fn layout(&self) -> Node {
        let group = builder::group3("catalog");
        let n = self.prototypes.len();
        if n == 0 {
            return group;
        }
        let cols = (n as f64).sqrt().ceil() as usize;
        let spacing = self
            .prototypes
            .values()
            .filter_map(extent)
            .fold(1.0_f64, f64::max)
            + 2.0;
        for (i, (key, proto)) in self.prototypes.iter().enumerate() {
            let inst = Node::new_instance(key.clone(), proto);
            inst.translate(ddd_math::Vec3::new(
                (i % cols) as f64 * spacing,
                (i / cols) as f64 * spacing,
                0.0,
            ));
            // Fresh instances are never ancestors of the group.
            let _ = group.append(&inst);
        }
        group
    }

    /// Writes the [`layout`](Self::layout) next to `path` as `.json` and
    /// `.glb` (instances expanded, names unique).
    pub fn export(&self, path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let path = path.as_ref();
        let group = self.layout();
        let options = ExportOptions {
            naming: NamingMode::NameUnique,
            export_meshes: true,
            ..ExportOptions::default()
        };
        #[allow(unused_mut)]
        let mut written = vec![path.with_extension("json")];
        #[cfg(feature = "gltf")]
        written.push(path.with_extension("glb"));
        for p in &written {
            group.save(p, &options)?;
        }
        Ok(written)
    }
}

/// Largest horizontal size of a prototype.
fn extent(node: &Node) -> Option<f64> {
    if let Some((lo, hi)) = node.bounds3() {
        return Some((hi.x - lo.x).max(hi.y - lo.y));
    }
    node.bounds().map(|r| r.width().max(r.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddd_math::Vec3;

    fn tree() -> Node {
        let t = builder::group3("tree");
        let trunk = builder::box3("trunk", [-0.2, -0.2, 0.0, 0.2, 0.2, 3.0]);
        let crown = builder::cube("crown", 2.0);
        crown.translate(Vec3::new(0.0, 0.0, 4.0));
        t.extend([&trunk, &crown]).unwrap();
        t
    }

    #[test]
    fn test_keys_are_normalized() {
        assert_eq!(normalize_key("tree.oak:big_1"), "tree-oak-big-1");
    }

    #[test]
    fn test_instance_shares_prototype() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = Catalog::new(dir.path());
        let t = tree();
        let inst = cat.add("tree-1", &t).unwrap();
        assert!(inst.target().unwrap().ptr_eq(&t));
        assert!(cat.instance("tree-1", None).unwrap().target().unwrap().ptr_eq(&t));
        assert_eq!(t.get(CATALOG_KEY), Some("tree-1".into()));
        assert!(dir.path().join("tree-1.ddd").exists());
        assert!(matches!(cat.add("tree.1", &tree()), Err(DddError::DuplicateKey(_))));
    }

    #[test]
    fn test_reload_from_disk_is_structurally_equal() {
        let dir = tempfile::tempdir().unwrap();
        let t = tree();
        Catalog::new(dir.path()).add("tree-1", &t).unwrap();

        let mut reloaded = Catalog::new(dir.path());
        let inst = reloaded.instance("tree-1", Some("t")).unwrap();
        assert_eq!(inst.name(), "t");
        assert_eq!(inst.target().unwrap().content_hash(), t.content_hash());
        assert!(reloaded.instance("bush", None).is_none());
    }

    #[test]
    fn test_self_instancing_prototype_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = Catalog::new(dir.path());
        let p = builder::group3("p");
        let inner = Node::new_instance("self", &p);
        p.append(&inner).unwrap();
        assert!(matches!(cat.add("p", &p), Err(DddError::Cycle { .. })));
        assert!(cat.is_empty());
    }

    #[test]
    fn test_flags() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = Catalog::new(dir.path());
        cat.add("a", &tree()).unwrap();

        let mut rebuilding = Catalog::new(dir.path());
        rebuilding.overwrite = true;
        assert!(rebuilding.instance("a", None).is_none());
        let fresh = tree();
        rebuilding.add("a", &fresh).unwrap();
        let inst = rebuilding.instance("a", None).unwrap();
        assert!(inst.target().unwrap().ptr_eq(&fresh));
        assert!(rebuilding.add("a", &tree()).is_ok());

        let mut ignoring = Catalog::new(dir.path());
        ignoring.ignore = true;
        ignoring.add("b", &tree()).unwrap();
        assert!(!dir.path().join("b.ddd").exists());
        assert!(ignoring.instance("a", None).is_none());
    }

    #[test]
    fn test_load_all_clear_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = Catalog::new(dir.path().join("_catalog"));
        cat.add("tree:oak", &tree()).unwrap();
        cat.add("tree:pine", &tree()).unwrap();

        let mut fresh = Catalog::new(dir.path().join("_catalog"));
        assert_eq!(fresh.load_all().unwrap(), 2);
        assert_eq!(fresh.keys(), ["tree-oak", "tree-pine"]);

        let written = fresh.export(dir.path().join("catalog")).unwrap();
        assert!(written.iter().all(|p| p.exists()));
        let layout = fresh.layout();
        assert_eq!(layout.num_children(), 2);
        assert!(layout.child(1).unwrap().transform().position.x > 0.0);

        assert_eq!(fresh.clear().unwrap(), 2);
        assert!(fresh.is_empty());
        assert_eq!(Catalog::new(dir.path().join("_catalog")).load_all().unwrap(), 0);
    }
}
