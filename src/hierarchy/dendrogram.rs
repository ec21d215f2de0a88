//! Dendrogram for agglomerative clustering.
//!
//! A dendrogram records the nested structure of clusters produced by
//! bottom-up merging. Nodes live in an arena: leaves first, in point-set
//! order, then one node per merge. The set of live nodes (not yet merged
//! away) always partitions the leaves.

use crate::error::{Error, Result};
use crate::point::PointId;

use super::node::{ClusterNode, NodeId};

/// A single merge operation in the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// First merged node (earlier in scan order).
    pub left: NodeId,
    /// Second merged node.
    pub right: NodeId,
    /// Id of the node created by the merge.
    pub id: NodeId,
    /// Distance at which the merge occurred.
    pub distance: f64,
    /// Size of resulting cluster.
    pub size: usize,
}

/// A dendrogram representing hierarchical cluster merges.
#[derive(Debug, Clone)]
pub struct Dendrogram {
    nodes: Vec<ClusterNode>,
    merges: Vec<Merge>,
    /// Arena indices of live nodes, survivors in order then new merges.
    live: Vec<usize>,
    n_items: usize,
}

impl Dendrogram {
    /// Create a dendrogram with one live leaf per id.
    pub fn new(leaves: &[PointId]) -> Self {
        let n = leaves.len();
        let mut nodes = Vec::with_capacity(2 * n);
        nodes.extend(leaves.iter().map(|&id| ClusterNode::leaf(id)));
        Self {
            nodes,
            merges: Vec::with_capacity(n.saturating_sub(1)),
            live: (0..n).collect(),
            n_items: n,
        }
    }

    /// Merge two live nodes (by arena index). Returns the new node's index.
    ///
    /// The new node is appended to the end of the live list.
    pub fn merge(&mut self, left: usize, right: usize, distance: f64) -> Result<usize> {
        let pos_left = self.live_position(left)?;
        let pos_right = self.live_position(right)?;
        if pos_left == pos_right {
            return Err(Error::invalid_parameter("right", "cannot merge a node with itself"));
        }
        for pos in [pos_left.max(pos_right), pos_left.min(pos_right)] {
            self.live.remove(pos);
        }

        let id = -(self.merges.len() as i64) - 1;
        let size = self.nodes[left].size + self.nodes[right].size;
        let index = self.nodes.len();
        self.merges.push(Merge {
            left: self.nodes[left].id,
            right: self.nodes[right].id,
            id: NodeId::Internal(id),
            distance,
            size,
        });
        self.nodes
            .push(ClusterNode::internal(id, size, distance, [left, right]));
        self.live.push(index);
        Ok(index)
    }

    fn live_position(&self, index: usize) -> Result<usize> {
        self.live
            .iter()
            .position(|&i| i == index)
            .ok_or_else(|| Error::invalid_parameter("node", format!("node {index} is not live")))
    }

    /// Node by arena index.
    pub fn node(&self, index: usize) -> Option<&ClusterNode> {
        self.nodes.get(index)
    }

    /// Arena indices of live nodes.
    pub fn live(&self) -> &[usize] {
        &self.live
    }

    /// Leaf point ids under a node, left subtree first.
    pub fn leaves_of(&self, index: usize) -> Vec<PointId> {
        let mut out = Vec::new();
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            match (&self.nodes[i].children, self.nodes[i].id) {
                (Some([l, r]), _) => {
                    stack.push(*r);
                    stack.push(*l);
                }
                (None, NodeId::Leaf(id)) => out.push(id),
                (None, NodeId::Internal(_)) => {}
            }
        }
        out
    }

    /// Leaf sets of the live nodes, in live order.
    pub fn clusters(&self) -> Vec<Vec<PointId>> {
        self.live.iter().map(|&i| self.leaves_of(i)).collect()
    }

    /// Label per leaf in leaf order: the position of its live ancestor.
    pub fn labels(&self) -> Vec<usize> {
        let mut labels = vec![0usize; self.n_items];
        for (label, &root) in self.live.iter().enumerate() {
            let mut stack = vec![root];
            while let Some(i) = stack.pop() {
                match self.nodes[i].children {
                    Some([l, r]) => stack.extend([l, r]),
                    None => labels[i] = label,
                }
            }
        }
        labels
    }

    /// Leaf sets after only the first `n - k` merges.
    ///
    /// Replays the merge history, so a dendrogram built down to one cluster
    /// can be cut at any level.
    pub fn cut_to_k(&self, k: usize) -> Result<Vec<Vec<PointId>>> {
        if k == 0 || k > self.n_items {
            return Err(Error::InsufficientPoints {
                requested: k,
                available: self.n_items,
            });
        }
        let needed = self.n_items - k;
        if needed > self.merges.len() {
            return Err(Error::invalid_parameter(
                "k",
                format!("only {} merges recorded", self.merges.len()),
            ));
        }
        let mut live: Vec<usize> = (0..self.n_items).collect();
        for step in 0..needed {
            let index = self.n_items + step;
            if let Some([l, r]) = self.nodes[index].children {
                live.retain(|&i| i != l && i != r);
            }
            live.push(index);
        }
        Ok(live.iter().map(|&i| self.leaves_of(i)).collect())
    }

    /// Number of original items.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    /// Iterate over merges.
    pub fn merges(&self) -> impl Iterator<Item = &Merge> {
        self.merges.iter()
    }

    /// Get the merge distances.
    pub fn distances(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }
}
