//! Generic n-ary tree over keyed elements.
//!
//! Nodes live in an arena (`Vec`) and reference each other by index, with
//! parent links kept as back-references; replacing a child re-points the
//! key slot and leaves the orphaned node in the arena. Traversal is
//! breadth-first with per-node flow control, and `build` assembles a tree
//! from a flat element list using each element's hierarchy predicate.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::Error;

/// Element stored at a tree node.
pub trait TreeElement {
    type Key: Hash + Eq + Clone;

    /// The key this element occupies in its parent's child map.
    fn key(&self) -> Self::Key;

    /// Whether this element belongs directly under `parent`.
    fn child_of(&self, parent: &Self) -> bool;
}

/// Index of a node inside its owning [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Flow control returned by a traversal callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traverse {
    /// Stop the whole traversal.
    Stop,
    /// Stop visiting the current node's remaining siblings.
    Break,
    /// Do not descend into this node, continue with its siblings.
    Skip,
    /// Descend into this node's children.
    Continue,
}

struct Node<E: TreeElement> {
    element: E,
    parent: Option<NodeId>,
    children: HashMap<E::Key, NodeId>,
}

pub struct Tree<E: TreeElement> {
    nodes: Vec<Node<E>>,
}

impl<E: TreeElement> Tree<E> {
    pub fn new(root: E) -> Self {
        Tree {
            nodes: vec![Node { element: root, parent: None, children: HashMap::new() }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn element(&self, id: NodeId) -> &E {
        &self.nodes[id.0].element
    }

    pub fn element_mut(&mut self, id: NodeId) -> &mut E {
        &mut self.nodes[id.0].element
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn child(&self, id: NodeId, key: &E::Key) -> Option<NodeId> {
        self.nodes[id.0].children.get(key).copied()
    }

    /// Walks `path` key by key from `from`; an empty path yields `from`.
    pub fn child_by_path(&self, from: NodeId, path: &[E::Key]) -> Option<NodeId> {
        let mut node = from;
        for key in path {
            node = self.child(node, key)?;
        }
        Some(node)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.values().copied()
    }

    /// Inserts `element` under `parent`, replacing any child with the same
    /// key. The replaced subtree stays in the arena but becomes
    /// unreachable.
    pub fn insert(&mut self, parent: NodeId, element: E) -> NodeId {
        let key = element.key();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { element, parent: Some(parent), children: HashMap::new() });
        self.nodes[parent.0].children.insert(key, id);
        id
    }

    pub fn insert_if_absent(&mut self, parent: NodeId, element: E) -> NodeId {
        match self.child(parent, &element.key()) {
            Some(existing) => existing,
            None => self.insert(parent, element),
        }
    }

    /// Inserts `element` at `path` (its last key slot), requiring every
    /// intermediate node to already exist.
    pub fn insert_by_path(&mut self, path: &[E::Key], element: E) -> Result<NodeId, Error> {
        if path.is_empty() {
            return Err(Error::closed0("cannot insert by an empty path"));
        }
        let parent = self
            .child_by_path(self.root(), &path[..path.len() - 1])
            .ok_or_else(|| Error::closed0("cannot find parent node for insertion path"))?;
        Ok(self.insert(parent, element))
    }

    /// Breadth-first traversal starting below the root. The callback
    /// receives the tree and the visited node id so it may mutate elements
    /// anywhere in the tree while walking.
    pub fn traverse<F>(&mut self, mut callback: F)
    where
        F: FnMut(&mut Self, NodeId) -> Traverse,
    {
        let mut queue = vec![self.root()];
        let mut at = 0;
        'outer: while at < queue.len() {
            let parent = queue[at];
            at += 1;
            let children: Vec<NodeId> = self.nodes[parent.0].children.values().copied().collect();
            for child in children {
                match callback(self, child) {
                    Traverse::Stop => break 'outer,
                    Traverse::Break => break,
                    Traverse::Skip => continue,
                    Traverse::Continue => queue.push(child),
                }
            }
        }
    }

    /// Builds the tree from a flat list: each pass attaches every element
    /// that is a direct child of an already-placed node. Elements that
    /// never find a parent (missing intermediate nodes) are handed to
    /// `remains_handler` for the caller to place.
    pub fn build<F>(&mut self, mut elements: Vec<E>, remains_handler: F)
    where
        F: FnOnce(&mut Self, Vec<E>),
    {
        let mut parents = vec![self.root()];
        let mut at = 0;
        while at < parents.len() {
            let parent = parents[at];
            at += 1;
            let mut i = 0;
            while i < elements.len() {
                if elements[i].child_of(self.element(parent)) {
                    let element = elements.remove(i);
                    parents.push(self.insert(parent, element));
                } else {
                    i += 1;
                }
            }
        }
        remains_handler(self, elements);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct PathElem(String);

    impl PathElem {
        fn new(path: &str) -> Self {
            PathElem(path.to_string())
        }
    }

    impl TreeElement for PathElem {
        type Key = String;

        fn key(&self) -> String {
            match self.0.rfind('/') {
                Some(i) => self.0[i + 1..].to_string(),
                None => self.0.clone(),
            }
        }

        fn child_of(&self, parent: &Self) -> bool {
            match self.0.rfind('/') {
                Some(i) => self.0[..i] == parent.0,
                None => parent.0.is_empty(),
            }
        }
    }

    #[test]
    fn build_attaches_hierarchy_and_reports_orphans() {
        let mut tree = Tree::new(PathElem::new(""));
        let elements = vec![
            PathElem::new("a"),
            PathElem::new("a/b"),
            PathElem::new("a/b/c"),
            PathElem::new("x/y/z"),
        ];
        let mut orphans = Vec::new();
        tree.build(elements, |_, remains| orphans = remains);

        assert_eq!(orphans, vec![PathElem::new("x/y/z")]);
        let keys: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert!(tree.child_by_path(tree.root(), &keys).is_some());
    }

    #[test]
    fn insert_replaces_same_key_child() {
        let mut tree = Tree::new(PathElem::new(""));
        let first = tree.insert(tree.root(), PathElem::new("a"));
        let second = tree.insert(tree.root(), PathElem::new("a"));
        assert_ne!(first, second);
        assert_eq!(tree.child(tree.root(), &"a".to_string()), Some(second));
    }

    #[test]
    fn traversal_is_breadth_first() {
        let mut tree = Tree::new(PathElem::new(""));
        let a = tree.insert(tree.root(), PathElem::new("a"));
        tree.insert(a, PathElem::new("a/b"));
        tree.insert(tree.root(), PathElem::new("c"));

        let mut depth_one = 0;
        let mut total = 0;
        tree.traverse(|tree, node| {
            total += 1;
            if tree.parent(node) == Some(tree.root()) {
                depth_one += 1;
            }
            Traverse::Continue
        });
        assert_eq!(depth_one, 2);
        assert_eq!(total, 3);
    }
}
