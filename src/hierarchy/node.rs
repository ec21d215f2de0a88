//! Merge-tree node.

use core::fmt;

use crate::point::PointId;

/// Identifier of a node in a merge tree.
///
/// Leaves keep the id of the point they hold. Each merge gets the next
/// internal id: `-1`, `-2`, `-3`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    /// A single input point.
    Leaf(PointId),
    /// The result of a merge, always negative.
    Internal(i64),
}

impl NodeId {
    /// Whether this is a leaf id.
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeId::Leaf(_))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Leaf(id) => write!(f, "{id}"),
            NodeId::Internal(id) => write!(f, "{id}"),
        }
    }
}

/// A node in a merge tree.
///
/// Children are arena indices into the owning [`Dendrogram`](super::Dendrogram);
/// a node owns its two children exclusively.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    /// Node identifier.
    pub id: NodeId,
    /// Number of leaf descendants.
    pub size: usize,
    /// Merge distance (0 for leaves).
    pub height: f64,
    /// Arena indices of the merged children (`None` for leaves).
    pub children: Option<[usize; 2]>,
}

impl ClusterNode {
    /// Create a new leaf node.
    pub fn leaf(id: PointId) -> Self {
        Self {
            id: NodeId::Leaf(id),
            size: 1,
            height: 0.0,
            children: None,
        }
    }

    /// Create a new internal node.
    pub fn internal(id: i64, size: usize, height: f64, children: [usize; 2]) -> Self {
        Self {
            id: NodeId::Internal(id),
            size,
            height,
            children: Some(children),
        }
    }

    /// Check if this is a leaf node.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.children {
            None => write!(f, "Leaf[{}]", self.id),
            Some(_) => write!(f, "Node[{}] n={} h={}", self.id, self.size, self.height),
        }
    }
}
