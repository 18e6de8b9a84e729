#![forbid(unsafe_code)]

//! Node sets for canonicalization and transforms.
//!
//! A `NodeSet` identifies document nodes by index, so a set built against
//! one parse of a document remains valid for any later re-parse of the
//! same text.

use std::collections::HashSet;

/// A set of XML document nodes identified by node index.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node set containing every node of the document.
    pub fn document(doc: &roxmltree::Document<'_>) -> Self {
        let mut nodes = HashSet::new();
        for node in doc.root().descendants() {
            nodes.insert(node.id().get_usize());
        }
        Self { nodes }
    }

    /// Create a node set containing every node except comments.
    ///
    /// Per the DSig spec, `URI=""` selects the document without comments.
    pub fn document_without_comments(doc: &roxmltree::Document<'_>) -> Self {
        let mut nodes = HashSet::new();
        for node in doc.root().descendants() {
            if node.node_type() != roxmltree::NodeType::Comment {
                nodes.insert(node.id().get_usize());
            }
        }
        Self { nodes }
    }

    /// Create a node set for the subtree rooted at `root`.
    pub fn subtree(root: roxmltree::Node<'_, '_>, include_comments: bool) -> Self {
        let mut nodes = HashSet::new();
        for node in root.descendants() {
            if !include_comments && node.node_type() == roxmltree::NodeType::Comment {
                continue;
            }
            nodes.insert(node.id().get_usize());
        }
        Self { nodes }
    }

    /// Check whether a node is in this set.
    pub fn contains(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id().get_usize())
    }

    /// Check whether a node index is in this set.
    pub fn contains_index(&self, index: usize) -> bool {
        self.nodes.contains(&index)
    }

    /// Add a node index to this set.
    pub fn insert(&mut self, index: usize) {
        self.nodes.insert(index);
    }

    /// Remove a node index from this set.
    pub fn remove(&mut self, index: usize) {
        self.nodes.remove(&index);
    }

    /// Remove the subtree rooted at `root` (all descendants included).
    pub fn remove_subtree(&mut self, root: roxmltree::Node<'_, '_>) {
        for node in root.descendants() {
            self.nodes.remove(&node.id().get_usize());
        }
    }

    /// Compute the intersection of two node sets.
    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.intersection(&other.nodes).copied().collect(),
        }
    }

    /// Compute the union of two node sets.
    pub fn union(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.union(&other.nodes).copied().collect(),
        }
    }

    /// Compute `self - other`.
    pub fn subtract(&self, other: &NodeSet) -> NodeSet {
        NodeSet {
            nodes: self.nodes.difference(&other.nodes).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Node indices in ascending (document) order.
    pub fn sorted_indices(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.nodes.iter().copied().collect();
        v.sort_unstable();
        v
    }
}
