//! Mapping between node identities and matrix indices.

use std::collections::HashMap;

use crate::error::RoutingError;

use super::{CoordKey, Node, DEFAULT_COORD_PRECISION};

/// Bijection between coordinate keys and dense matrix indices `0..len()`.
///
/// Nodes are indexed in order of first appearance; a node whose key was
/// already seen collapses onto the earlier index. Lookups of unknown keys
/// fail with [`RoutingError::Index`] instead of falling back to a default.
///
/// Keys are built at the index's precision; nodes keyed at another precision
/// are re-keyed on the way in. The mapping is call-scoped: indices are only
/// meaningful together with the matrix built from [`NodeIndex::nodes`].
///
/// # Examples
///
/// ```
/// use u_delivery::models::{Node, NodeIndex};
///
/// let nodes = vec![
///     Node::depot(1.0, 1.0),
///     Node::stop(1, 2.0, 2.0),
///     Node::stop(2, 2.0, 2.0), // same coordinates as stop 1
///     Node::stop(3, 3.0, 3.0),
/// ];
/// let index = NodeIndex::build(&nodes);
/// assert_eq!(index.len(), 3);
/// assert_eq!(index.index_of(&nodes[2]).unwrap(), 1);
/// assert_eq!(index.node(2).unwrap().id(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct NodeIndex {
    index_of: HashMap<CoordKey, usize>,
    node_at: Vec<Node>,
    precision: u32,
}

impl Default for NodeIndex {
    fn default() -> Self {
        Self::with_precision(DEFAULT_COORD_PRECISION)
    }
}

impl NodeIndex {
    /// Creates an empty index keying coordinates at `precision` decimals.
    pub fn with_precision(precision: u32) -> Self {
        Self {
            index_of: HashMap::new(),
            node_at: Vec::new(),
            precision,
        }
    }

    /// Builds the index over `nodes` at the default precision.
    pub fn build(nodes: &[Node]) -> Self {
        Self::build_with_precision(nodes, DEFAULT_COORD_PRECISION)
    }

    /// Builds the index over `nodes` at `precision` decimals.
    pub fn build_with_precision(nodes: &[Node], precision: u32) -> Self {
        let mut index = Self::with_precision(precision);
        for node in nodes {
            index.insert(node.clone());
        }
        index
    }

    /// Inserts a node, returning its index (existing index for a known key).
    pub fn insert(&mut self, node: Node) -> usize {
        let node = self.rekey(node);
        if let Some(&idx) = self.index_of.get(&node.key()) {
            return idx;
        }
        let idx = self.node_at.len();
        self.index_of.insert(node.key(), idx);
        self.node_at.push(node);
        idx
    }

    /// Resolves a coordinate key.
    pub fn resolve(&self, key: &CoordKey) -> Result<usize, RoutingError> {
        self.index_of
            .get(key)
            .copied()
            .ok_or_else(|| RoutingError::Index(format!("coordinate key {key} is not indexed")))
    }

    /// Resolves the index of a node by its coordinate key.
    pub fn index_of(&self, node: &Node) -> Result<usize, RoutingError> {
        self.resolve(&CoordKey::new(node.lat(), node.lon(), self.precision))
    }

    /// Returns the node stored at `idx`.
    pub fn node(&self, idx: usize) -> Result<&Node, RoutingError> {
        self.node_at.get(idx).ok_or_else(|| {
            RoutingError::Index(format!(
                "node index {idx} out of range (len {})",
                self.node_at.len()
            ))
        })
    }

    /// Indexed nodes in index order.
    pub fn nodes(&self) -> &[Node] {
        &self.node_at
    }

    /// Coordinate keys in index order.
    pub fn keys(&self) -> Vec<CoordKey> {
        self.node_at.iter().map(Node::key).collect()
    }

    /// Number of distinct nodes.
    pub fn len(&self) -> usize {
        self.node_at.len()
    }

    /// Returns `true` if no node is indexed.
    pub fn is_empty(&self) -> bool {
        self.node_at.is_empty()
    }

    /// Decimal precision of the keys.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    fn rekey(&self, node: Node) -> Node {
        if node.key().precision() == self.precision {
            node
        } else {
            node.with_precision(self.precision)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_bijection() {
        let nodes: Vec<Node> = (0..5).map(|i| Node::stop(i, i as f64, 0.0)).collect();
        let index = NodeIndex::build(&nodes);
        assert_eq!(index.len(), 5);
        for (i, node) in nodes.iter().enumerate() {
            let idx = index.index_of(node).expect("indexed");
            assert_eq!(idx, i);
            assert_eq!(index.node(idx).expect("present").id(), node.id());
        }
    }

    #[test]
    fn test_duplicates_collapse_to_first() {
        let nodes = vec![
            Node::stop(10, 1.0, 1.0),
            Node::stop(11, 1.0, 1.0),
        ];
        let index = NodeIndex::build(&nodes);
        assert_eq!(index.len(), 1);
        assert_eq!(index.node(0).expect("present").id(), 10);
    }

    #[test]
    fn test_unknown_key_fails() {
        let index = NodeIndex::build(&[Node::depot(0.0, 0.0)]);
        let err = index.resolve(&CoordKey::new(5.0, 5.0, 6)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexError);
        assert!(index.node(3).is_err());
    }

    #[test]
    fn test_insert_returns_existing() {
        let mut index = NodeIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.insert(Node::stop(1, 1.0, 1.0)), 0);
        assert_eq!(index.insert(Node::stop(2, 2.0, 2.0)), 1);
        assert_eq!(index.insert(Node::stop(3, 1.0, 1.0)), 0);
        assert_eq!(index.keys().len(), 2);
    }

    #[test]
    fn test_precision_controls_collapse() {
        let nodes = vec![Node::stop(1, 1.0001, 1.0), Node::stop(2, 1.0002, 1.0)];
        assert_eq!(NodeIndex::build(&nodes).len(), 2);

        let coarse = NodeIndex::build_with_precision(&nodes, 3);
        assert_eq!(coarse.len(), 1);
        assert_eq!(coarse.precision(), 3);
        assert_eq!(coarse.nodes()[0].key().precision(), 3);
        assert_eq!(coarse.index_of(&nodes[1]).expect("indexed"), 0);
    }
}
