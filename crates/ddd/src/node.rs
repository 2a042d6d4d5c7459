//! Scene graph nodes.
//!
//! A [`Node`] is a shared handle: cloning it clones the handle, not the
//! node. Use [`Node::copy`] for a deep copy. Children are owned by their
//! parent; the parent link is weak. A node has at most one parent and can
//! never become its own ancestor.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use ddd_math::{Transform, Vec3};
use ddd_mesh::TriMesh;
use geo::Geometry;

use crate::material::Material;
use crate::meta::{MetaValue, Metadata};
use crate::{DddError, NodeSummary, Result};

/// Payload of a node.
#[derive(Clone)]
pub enum NodeKind {
    /// Planar geometry; `None` for 2D groups.
    Geom2(Option<Geometry<f64>>),
    /// Triangle mesh; `None` for 3D groups.
    Mesh3(Option<TriMesh>),
    /// Placement of a shared prototype.
    Instance(Node),
}

impl NodeKind {
    /// `Node2`, `Node3` or `Instance`.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Geom2(_) => "Node2",
            NodeKind::Mesh3(_) => "Node3",
            NodeKind::Instance(_) => "Instance",
        }
    }
}

struct NodeData {
    name: String,
    kind: NodeKind,
    metadata: Metadata,
    material: Option<Rc<Material>>,
    transform: Transform,
    children: Vec<Node>,
    parent: Weak<RefCell<NodeData>>,
}

/// Shared handle to a scene node.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0.borrow();
        f.debug_struct("Node")
            .field("name", &d.name)
            .field("kind", &d.kind.name())
            .field("children", &d.children.len())
            .finish()
    }
}

impl Node {
    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Node(Rc::new(RefCell::new(NodeData {
            name: name.into(),
            kind,
            metadata: Metadata::new(),
            material: None,
            transform: Transform::identity(),
            children: Vec::new(),
            parent: Weak::new(),
        })))
    }

    /// New 2D node.
    pub fn new2(name: impl Into<String>, geometry: Option<Geometry<f64>>) -> Self {
        Self::with_kind(name, NodeKind::Geom2(geometry))
    }

    /// New 3D node.
    pub fn new3(name: impl Into<String>, mesh: Option<TriMesh>) -> Self {
        Self::with_kind(name, NodeKind::Mesh3(mesh))
    }

    /// New instance of `target`.
    pub fn new_instance(name: impl Into<String>, target: &Node) -> Self {
        Self::with_kind(name, NodeKind::Instance(target.clone()))
    }

    /// Handle identity.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable identity of the underlying node while it is alive.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Name.
    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// Renames the node.
    pub fn set_name(&self, name: impl Into<String>) {
        self.0.borrow_mut().name = name.into();
    }

    /// Payload.
    pub fn kind(&self) -> Ref<'_, NodeKind> {
        Ref::map(self.0.borrow(), |d| &d.kind)
    }

    /// Replaces the payload.
    pub fn set_kind(&self, kind: NodeKind) {
        self.0.borrow_mut().kind = kind;
    }

    /// True for 2D nodes.
    pub fn is_2d(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Geom2(_))
    }

    /// True for 3D nodes.
    pub fn is_3d(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Mesh3(_))
    }

    /// Prototype of an instance.
    pub fn target(&self) -> Option<Node> {
        match &self.0.borrow().kind {
            NodeKind::Instance(t) => Some(t.clone()),
            _ => None,
        }
    }

    /// Copy of the planar geometry of a 2D node.
    pub fn geometry(&self) -> Option<Geometry<f64>> {
        match &self.0.borrow().kind {
            NodeKind::Geom2(g) => g.clone(),
            _ => None,
        }
    }

    /// Sets the geometry, turning the node into a 2D node.
    pub fn set_geometry(&self, geometry: Option<Geometry<f64>>) {
        self.0.borrow_mut().kind = NodeKind::Geom2(geometry);
    }

    /// Copy of the mesh of a 3D node.
    pub fn mesh(&self) -> Option<TriMesh> {
        match &self.0.borrow().kind {
            NodeKind::Mesh3(m) => m.clone(),
            _ => None,
        }
    }

    /// Sets the mesh, turning the node into a 3D node.
    pub fn set_mesh(&self, mesh: Option<TriMesh>) {
        self.0.borrow_mut().kind = NodeKind::Mesh3(mesh);
    }

    /// Metadata map.
    pub fn metadata(&self) -> Ref<'_, Metadata> {
        Ref::map(self.0.borrow(), |d| &d.metadata)
    }

    /// Mutable metadata map.
    pub fn metadata_mut(&self) -> RefMut<'_, Metadata> {
        RefMut::map(self.0.borrow_mut(), |d| &mut d.metadata)
    }

    /// Metadata value for `key`.
    pub fn get(&self, key: &str) -> Option<MetaValue> {
        self.0.borrow().metadata.get(key).cloned()
    }

    /// Metadata value for `key`, or [`DddError::MissingMetadata`].
    pub fn require(&self, key: &str) -> Result<MetaValue> {
        self.get(key).ok_or_else(|| {
            DddError::MissingMetadata {
                key: key.to_string(),
                node: None,
            }
            .at(self)
        })
    }

    /// Sets a metadata value and returns the handle for chaining.
    pub fn set(&self, key: impl Into<String>, value: impl Into<MetaValue>) -> &Self {
        self.0.borrow_mut().metadata.insert(key.into(), value.into());
        self
    }

    /// Removes a metadata key.
    pub fn unset(&self, key: &str) -> Option<MetaValue> {
        self.0.borrow_mut().metadata.remove(key)
    }

    /// Shared material.
    pub fn material(&self) -> Option<Rc<Material>> {
        self.0.borrow().material.clone()
    }

    /// Sets the material and returns the handle for chaining.
    pub fn set_material(&self, material: Option<Rc<Material>>) -> &Self {
        self.0.borrow_mut().material = material;
        self
    }

    /// Local transform.
    pub fn transform(&self) -> Transform {
        self.0.borrow().transform.clone()
    }

    /// Replaces the local transform.
    pub fn set_transform(&self, transform: Transform) {
        self.0.borrow_mut().transform = transform;
    }

    /// Moves the node by `v`.
    pub fn translate(&self, v: Vec3) -> &Self {
        self.0.borrow_mut().transform.translate(v);
        self
    }

    /// Rotates the node by Euler angles (radians).
    pub fn rotate(&self, euler: Vec3) -> &Self {
        self.0.borrow_mut().transform.rotate(euler);
        self
    }

    /// Scales the node component-wise.
    pub fn scale(&self, v: Vec3) -> &Self {
        self.0.borrow_mut().transform.scale_by(v);
        self
    }

    // -- tree ----------------------------------------------------------------

    /// Children, in order.
    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    /// Number of direct children.
    pub fn num_children(&self) -> usize {
        self.0.borrow().children.len()
    }

    /// Child at `index`.
    pub fn child(&self, index: usize) -> Option<Node> {
        self.0.borrow().children.get(index).cloned()
    }

    /// Parent node.
    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade().map(Node)
    }

    /// Topmost ancestor, or the node itself.
    pub fn root(&self) -> Node {
        let mut node = self.clone();
        while let Some(p) = node.parent() {
            node = p;
        }
        node
    }

    /// True when `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &Node) -> bool {
        let mut cur = Some(other.clone());
        while let Some(n) = cur {
            if n.ptr_eq(self) {
                return true;
            }
            cur = n.parent();
        }
        false
    }

    fn check_insert(&self, child: &Node) -> Result<()> {
        if child.is_ancestor_of(self) {
            return Err(DddError::Cycle {
                message: format!("'{}' cannot become a descendant of itself", child.name()),
                node: Some(self.summary()),
            });
        }
        Ok(())
    }

    /// Appends `child`, detaching it from its previous parent.
    pub fn append(&self, child: &Node) -> Result<&Self> {
        let len = self.num_children();
        self.insert(len, child)
    }

    /// Inserts `child` at `index` (clamped), detaching it from its previous parent.
    pub fn insert(&self, index: usize, child: &Node) -> Result<&Self> {
        self.check_insert(child)?;
        child.detach();
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        let mut d = self.0.borrow_mut();
        let index = index.min(d.children.len());
        d.children.insert(index, child.clone());
        Ok(self)
    }

    /// Appends every node of `children`.
    pub fn extend<'a>(&self, children: impl IntoIterator<Item = &'a Node>) -> Result<&Self> {
        for c in children {
            self.append(c)?;
        }
        Ok(self)
    }

    /// Removes `child` from the children; returns false when it is not a child.
    pub fn remove_child(&self, child: &Node) -> bool {
        let pos = self.0.borrow().children.iter().position(|c| c.ptr_eq(child));
        match pos {
            Some(i) => {
                self.0.borrow_mut().children.remove(i);
                child.0.borrow_mut().parent = Weak::new();
                true
            }
            None => false,
        }
    }

    /// Replaces `old` by `new` at the same position.
    pub fn replace_child(&self, old: &Node, new: &Node) -> Result<bool> {
        if old.ptr_eq(new) {
            return Ok(true);
        }
        let Some(i) = self.0.borrow().children.iter().position(|c| c.ptr_eq(old)) else {
            return Ok(false);
        };
        self.check_insert(new)?;
        self.remove_child(old);
        self.insert(i, new)?;
        Ok(true)
    }

    /// Replaces all children.
    pub fn set_children(&self, children: &[Node]) -> Result<()> {
        for c in self.children() {
            self.remove_child(&c);
        }
        self.extend(children)?;
        Ok(())
    }

    /// Detaches the node from its parent. The subtree stays intact.
    pub fn detach(&self) {
        if let Some(p) = self.parent() {
            p.remove_child(self);
        }
    }

    /// Slash path from the root: `/` for a root, `/a/b` below it.
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        let mut cur = self.clone();
        while let Some(p) = cur.parent() {
            names.push(cur.name());
            cur = p;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Path of this node relative to `ancestor`, or `None` when not below it.
    pub fn path_from(&self, ancestor: &Node) -> Option<String> {
        let mut names = Vec::new();
        let mut cur = self.clone();
        while !cur.ptr_eq(ancestor) {
            names.push(cur.name());
            cur = cur.parent()?;
        }
        names.reverse();
        Some(format!("/{}", names.join("/")))
    }

    /// Finds a descendant by slash path of names (`a/b/c`).
    pub fn find(&self, path: &str) -> Option<Node> {
        let mut cur = self.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let next = cur.children().into_iter().find(|c| c.name() == part)?;
            cur = next;
        }
        Some(cur)
    }

    /// Number of nodes in the subtree, this one included.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(Node::count).sum::<usize>()
    }

    /// Indented description of the subtree.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        use std::fmt::Write;
        let d = self.0.borrow();
        let detail = match &d.kind {
            NodeKind::Geom2(Some(g)) => ddd_geom2::kind_name(g).to_string(),
            NodeKind::Mesh3(Some(m)) => format!("{} faces", m.num_triangles()),
            NodeKind::Instance(t) => format!("-> {}", t.name()),
            _ => "empty".to_string(),
        };
        let _ = writeln!(
            out,
            "{}{} [{}] ({}, {} meta)",
            "  ".repeat(depth),
            d.name,
            d.kind.name(),
            detail,
            d.metadata.len()
        );
        let children = d.children.clone();
        drop(d);
        for c in children {
            c.dump_into(out, depth + 1);
        }
    }

    /// Identification for error messages.
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            name: self.name(),
            path: self.path(),
            kind: self.0.borrow().kind.name(),
        }
    }

    /// True when neither the node nor any descendant carries geometry.
    /// Instances are never empty.
    pub fn is_empty(&self) -> bool {
        let own_empty = match &self.0.borrow().kind {
            NodeKind::Geom2(g) => g.as_ref().is_none_or(ddd_geom2::is_empty),
            NodeKind::Mesh3(m) => m.as_ref().is_none_or(TriMesh::is_empty),
            NodeKind::Instance(_) => false,
        };
        own_empty && self.children().iter().all(Node::is_empty)
    }

    /// Deep copy: geometry, metadata and children are copied; the material
    /// and instance targets are shared. The copy has no parent.
    pub fn copy(&self) -> Node {
        let d = self.0.borrow();
        let copy = Node(Rc::new(RefCell::new(NodeData {
            name: d.name.clone(),
            kind: d.kind.clone(),
            metadata: d.metadata.clone(),
            material: d.material.clone(),
            transform: d.transform.clone(),
            children: Vec::new(),
            parent: Weak::new(),
        })));
        let children: Vec<Node> = d.children.iter().map(Node::copy).collect();
        drop(d);
        for c in &children {
            c.0.borrow_mut().parent = Rc::downgrade(&copy.0);
        }
        copy.0.borrow_mut().children = children;
        copy
    }

    /// Copy of this node with a different payload and no children.
    pub fn copy_with(&self, kind: NodeKind) -> Node {
        let d = self.0.borrow();
        Node(Rc::new(RefCell::new(NodeData {
            name: d.name.clone(),
            kind,
            metadata: d.metadata.clone(),
            material: d.material.clone(),
            transform: d.transform.clone(),
            children: Vec::new(),
            parent: Weak::new(),
        })))
    }

    /// Imports metadata from `other` without overwriting existing keys,
    /// optionally its material and copies of its children.
    pub fn copy_from(&self, other: &Node, material: bool, children: bool) -> Result<&Self> {
        if other.ptr_eq(self) {
            return Ok(self);
        }
        let meta = other.metadata().clone();
        {
            let mut d = self.0.borrow_mut();
            for (k, v) in meta {
                d.metadata.entry(k).or_insert(v);
            }
            if material {
                d.material = other.material();
            }
        }
        if children {
            for c in other.children() {
                self.append(&c.copy())?;
            }
        }
        Ok(self)
    }

    /// BLAKE3 hash of the canonical document encoding of the subtree.
    ///
    /// Structurally equal subtrees hash equal, independent of handle identity.
    pub fn content_hash(&self) -> String {
        let doc = crate::persist::to_document(&[self], &Default::default());
        let bytes = doc.to_json_compact().unwrap_or_default();
        blake3::hash(bytes.as_bytes()).to_hex().to_string()
    }

    /// Pre-order list of the subtree, this node first.
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = vec![self.clone()];
        let mut i = 0;
        while i < out.len() {
            let children = out[i].children();
            out.splice(i + 1..i + 1, children);
            i += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;

    #[test]
    fn test_append_detaches_from_old_parent() {
        let a = builder::group2("a");
        let b = builder::group2("b");
        let c = builder::point("c", [0.0, 0.0]);
        a.append(&c).unwrap();
        b.append(&c).unwrap();
        assert_eq!(a.num_children(), 0);
        assert!(c.parent().unwrap().ptr_eq(&b));
        assert_eq!(c.path(), "/c");
    }

    #[test]
    fn test_cycle_rejected() {
        let a = builder::group2("a");
        let b = builder::group2("b");
        a.append(&b).unwrap();
        assert!(matches!(b.append(&a), Err(DddError::Cycle { .. })));
        assert!(matches!(a.append(&a), Err(DddError::Cycle { .. })));
        assert!(a.parent().is_none());
    }

    #[test]
    fn test_paths_and_find() {
        let root = builder::group3("root");
        let city = builder::group3("city");
        let tower = builder::cube("tower", 1.0);
        root.append(&city).unwrap();
        city.append(&tower).unwrap();
        assert_eq!(root.path(), "/");
        assert_eq!(tower.path(), "/city/tower");
        assert_eq!(tower.path_from(&city).as_deref(), Some("/tower"));
        assert!(root.find("city/tower").unwrap().ptr_eq(&tower));
        assert!(root.find("city/missing").is_none());
        assert_eq!(root.count(), 3);
        assert!(root.dump().contains("    tower [Node3] (12 faces, 0 meta)"));
    }

    #[test]
    fn test_remove_keeps_subtree() {
        let root = builder::group2("root");
        let branch = builder::group2("branch");
        let leaf = builder::point("leaf", [1.0, 1.0]);
        root.append(&branch).unwrap();
        branch.append(&leaf).unwrap();
        assert!(root.remove_child(&branch));
        assert!(branch.parent().is_none());
        assert!(leaf.parent().unwrap().ptr_eq(&branch));
        assert!(!root.remove_child(&branch));
    }

    #[test]
    fn test_replace_child_keeps_position() {
        let root = builder::group2("root");
        let names = ["a", "b", "c"];
        for n in names {
            root.append(&builder::group2(n)).unwrap();
        }
        let b = root.child(1).unwrap();
        let x = builder::group2("x");
        assert!(root.replace_child(&b, &x).unwrap());
        let got: Vec<String> = root.children().iter().map(Node::name).collect();
        assert_eq!(got, ["a", "x", "c"]);
        assert!(b.parent().is_none());
    }

    #[test]
    fn test_copy_does_not_mutate_original() {
        let n = builder::rect("r", [0.0, 0.0, 1.0, 1.0]);
        n.append(&builder::point("p", [0.5, 0.5])).unwrap();
        let c = n.copy();
        c.translate(Vec3::new(1.0, 0.0, 0.0))
            .rotate(Vec3::new(0.0, 0.0, 1.0))
            .scale(Vec3::new(2.0, 2.0, 2.0));
        c.set("k", 1.0);
        c.child(0).unwrap().set_name("q");
        assert!(n.transform().is_identity());
        assert!(n.get("k").is_none());
        assert_eq!(n.child(0).unwrap().name(), "p");
    }

    #[test]
    fn test_instance_copy_shares_target() {
        let proto = builder::cube("tree", 1.0);
        let inst = builder::instance("tree-1", &proto);
        let copy = inst.copy();
        assert!(copy.target().unwrap().ptr_eq(&proto));
        assert!(!inst.is_empty());
    }

    #[test]
    fn test_copy_from_does_not_overwrite() {
        let a = builder::group2("a");
        a.set("osm:name", "A").set("ddd:height", 3.0);
        let b = builder::group2("b");
        b.set("osm:name", "B");
        b.copy_from(&a, false, false).unwrap();
        assert_eq!(b.get("osm:name"), Some("B".into()));
        assert_eq!(b.get("ddd:height"), Some(3.0.into()));
    }

    #[test]
    fn test_emptiness() {
        let g = builder::group2("g");
        assert!(g.is_empty());
        g.append(&builder::rect("r", [0.0, 0.0, 1.0, 1.0])).unwrap();
        assert!(!g.is_empty());
        assert!(builder::group3("e").is_empty());
    }

    #[test]
    fn test_content_hash_is_structural() {
        let a = builder::rect("r", [0.0, 0.0, 1.0, 1.0]);
        a.set("osm:building", "yes");
        let b = a.copy();
        assert_eq!(a.content_hash(), b.content_hash());
        b.set("osm:building", "no");
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_missing_metadata_error() {
        let n = builder::group2("n");
        assert!(matches!(
            n.require("ddd:height"),
            Err(DddError::MissingMetadata { .. })
        ));
    }
}
