//! Tree queries and in-place edits.

use std::rc::Rc;

use tracing::warn;

use crate::node::Node;
use crate::selector::{Selector, SelectorError};
use crate::Result;

/// What to select.
#[derive(Clone)]
pub struct SelectOptions {
    /// Metadata selector.
    pub selector: Option<Selector>,
    /// Path prefix relative to the traversal root; `*` is ignored.
    pub path: Option<String>,
    /// Free-form predicate.
    pub filter: Option<Rc<dyn Fn(&Node) -> bool>>,
    /// Descend into the children of matched nodes.
    pub recurse: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            selector: None,
            path: None,
            filter: None,
            recurse: true,
        }
    }
}

impl std::fmt::Debug for SelectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectOptions")
            .field("selector", &self.selector.as_ref().map(Selector::as_str))
            .field("path", &self.path)
            .field("filter", &self.filter.is_some())
            .field("recurse", &self.recurse)
            .finish()
    }
}

impl SelectOptions {
    /// Options matching the selector `text`.
    pub fn selector(text: &str) -> std::result::Result<Self, SelectorError> {
        Ok(Self {
            selector: Some(Selector::parse(text)?),
            ..Self::default()
        })
    }

    /// Restricts matches to a path prefix.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Adds a predicate.
    pub fn with_filter(mut self, f: impl Fn(&Node) -> bool + 'static) -> Self {
        self.filter = Some(Rc::new(f));
        self
    }

    /// Sets whether matched nodes are descended into.
    pub fn recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    fn matches(&self, node: &Node, rel_path: &str) -> bool {
        if let Some(p) = &self.path {
            let prefix = p.replace('*', "");
            if !rel_path.starts_with(&prefix) {
                return false;
            }
        }
        if let Some(s) = &self.selector {
            if !s.evaluate(node) {
                return false;
            }
        }
        self.filter.as_ref().is_none_or(|f| f(node))
    }
}

/// Nodes matched by [`Node::select`], in pre-order.
///
/// The nodes stay where they are in their tree; the selection only holds
/// handles.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    nodes: Vec<Node>,
}

impl Selection {
    /// Matched nodes.
    pub fn children(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of matches.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The match, when there is exactly one.
    pub fn one(&self) -> Option<&Node> {
        match self.nodes.as_slice() {
            [n] => Some(n),
            _ => None,
        }
    }

    /// Iterator over matches.
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// Names of the matches.
    pub fn names(&self) -> Vec<String> {
        self.nodes.iter().map(Node::name).collect()
    }
}

impl IntoIterator for Selection {
    type Item = Node;
    type IntoIter = std::vec::IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Edit returned by [`Node::select_apply`] callbacks.
#[derive(Debug, Clone, Default)]
pub enum Edit {
    /// Leave the node in place.
    #[default]
    Keep,
    /// Remove the node from its parent.
    Remove,
    /// Put another node in its place.
    Replace(Node),
    /// Put several nodes in its place.
    Splice(Vec<Node>),
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Rewrites the children of `parent` according to `edits`, keyed by handle.
fn apply_edits(parent: &Node, edits: Vec<(Node, Edit)>) -> Result<()> {
    if edits.iter().all(|(_, e)| matches!(e, Edit::Keep)) {
        return Ok(());
    }
    let mut edits = edits;
    let mut children = Vec::new();
    for c in parent.children() {
        let pos = edits.iter().position(|(n, _)| n.ptr_eq(&c));
        match pos.map(|i| edits.swap_remove(i).1) {
            None | Some(Edit::Keep) => children.push(c),
            Some(Edit::Remove) => {}
            Some(Edit::Replace(n)) => children.push(n),
            Some(Edit::Splice(nodes)) => children.extend(nodes),
        }
    }
    parent.set_children(&children)
}

impl Node {
    /// Matching nodes of the subtree in pre-order, this node included.
    pub fn select(&self, options: &SelectOptions) -> Selection {
        let mut nodes = Vec::new();
        select_into(self, "/", options, &mut nodes);
        Selection { nodes }
    }

    /// Nodes of the subtree matching the selector `text`.
    pub fn select_str(&self, text: &str) -> Result<Selection> {
        Ok(self.select(&SelectOptions::selector(text)?))
    }

    /// Calls `f` on every match in pre-order and applies the returned edits.
    ///
    /// Edits to a node's children are applied once all of them have been
    /// visited, so sibling order is stable. Replacement and spliced nodes
    /// are not traversed. Returns the number of matches.
    pub fn select_apply(
        &self,
        options: &SelectOptions,
        mut f: impl FnMut(&Node) -> Result<Edit>,
    ) -> Result<usize> {
        let mut count = 0;
        let edit = apply_into(self, "/", options, &mut f, &mut count)?;
        if matches!(edit, Edit::Keep) {
            return Ok(count);
        }
        match self.parent() {
            Some(parent) => apply_edits(&parent, vec![(self.clone(), edit)])?,
            None => warn!(node = %self.name(), "ignoring edit of traversal root without parent"),
        }
        Ok(count)
    }
}

fn select_into(node: &Node, rel_path: &str, options: &SelectOptions, out: &mut Vec<Node>) {
    let matched = options.matches(node, rel_path);
    if matched {
        out.push(node.clone());
        if !options.recurse {
            return;
        }
    }
    for c in node.children() {
        select_into(&c, &child_path(rel_path, &c.name()), options, out);
    }
}

fn apply_into(
    node: &Node,
    rel_path: &str,
    options: &SelectOptions,
    f: &mut dyn FnMut(&Node) -> Result<Edit>,
    count: &mut usize,
) -> Result<Edit> {
    let matched = options.matches(node, rel_path);
    let edit = if matched {
        *count += 1;
        match f(node)? {
            Edit::Replace(n) if n.ptr_eq(node) => Edit::Keep,
            e => e,
        }
    } else {
        Edit::Keep
    };
    if !matches!(edit, Edit::Keep) || (matched && !options.recurse) {
        return Ok(edit);
    }
    let mut edits = Vec::new();
    for c in node.children() {
        let e = apply_into(&c, &child_path(rel_path, &c.name()), options, f, count)?;
        edits.push((c, e));
    }
    apply_edits(node, edits)?;
    Ok(edit)
}
