//! Height-balanced tree of clustering features.
//!
//! Nodes live in an arena and refer to each other by index. A parent index
//! is only used to find the node to replace after a split; features are
//! updated on the way back up the insertion path.
//!
//! ```text
//!                 [root: NonLeaf]
//!                /       |       \
//!        [NonLeaf]   [NonLeaf]   [NonLeaf]      <= branch_factor children
//!         /    \        ...
//!     [Leaf]  [Leaf]                            <= max_entries entries
//! ```
//!
//! A new entry descends into the child whose centroid is nearest, then is
//! absorbed by the nearest leaf entry if the merged diameter stays within
//! `threshold`, or appended otherwise. Overfull nodes split around their
//! farthest pair; after a split the two nearest non-leaf siblings merge back
//! when their combined fan-out fits.

use std::collections::HashMap;

use ndarray::Array1;
use tracing::trace;

use super::cf_entry::CfEntry;
use crate::distance::{FeatureSpace, Measure, Metric, PlanarMeasure};
use crate::hierarchy::{
    validate_tree_structure, HealthCheck, HealthReport, Severity, ValidationIssue,
};
use crate::point::Coordinate;

/// Payload of a CF node.
#[derive(Debug, Clone)]
pub enum CfNodeKind {
    /// Ordered clustering features.
    Leaf(Vec<CfEntry>),
    /// Ordered arena indices of child nodes.
    NonLeaf(Vec<usize>),
}

/// A node of the CF-tree.
#[derive(Debug, Clone)]
pub struct CfNode {
    /// Sum of every entry below this node.
    pub feature: CfEntry,
    /// Arena index of the parent (`None` for the root).
    pub parent: Option<usize>,
    /// Entries or children.
    pub kind: CfNodeKind,
}

impl CfNode {
    /// Whether this node holds entries.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, CfNodeKind::Leaf(_))
    }

    /// Entries of a leaf (empty for non-leaves).
    pub fn entries(&self) -> &[CfEntry] {
        match &self.kind {
            CfNodeKind::Leaf(entries) => entries,
            CfNodeKind::NonLeaf(_) => &[],
        }
    }

    /// Children of a non-leaf (empty for leaves).
    pub fn children(&self) -> &[usize] {
        match &self.kind {
            CfNodeKind::Leaf(_) => &[],
            CfNodeKind::NonLeaf(children) => children,
        }
    }

    fn vacant() -> Self {
        Self {
            feature: CfEntry::new(0, Array1::zeros(FeatureSpace::DIM), 0.0),
            parent: None,
            kind: CfNodeKind::NonLeaf(Vec::new()),
        }
    }
}

/// CF-tree.
#[derive(Debug, Clone)]
pub struct CfTree<M = PlanarMeasure> {
    nodes: Vec<CfNode>,
    free: Vec<usize>,
    root: Option<usize>,
    leaves: Vec<usize>,
    branch_factor: usize,
    max_entries: usize,
    threshold: f64,
    metric: Metric<M>,
    space: FeatureSpace,
    amount_nodes: usize,
    amount_entries: usize,
    height: usize,
}

impl<M: Measure> CfTree<M> {
    /// Create an empty tree.
    ///
    /// `branch_factor` is raised to 2 and `max_entries` to 1 if smaller.
    pub fn new(branch_factor: usize, max_entries: usize, threshold: f64, metric: Metric<M>) -> Self {
        let space = metric.config().feature_space();
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leaves: Vec::new(),
            branch_factor: branch_factor.max(2),
            max_entries: max_entries.max(1),
            threshold,
            metric,
            space,
            amount_nodes: 0,
            amount_entries: 0,
            height: 0,
        }
    }

    /// Maximum children of a non-leaf node.
    pub fn branch_factor(&self) -> usize {
        self.branch_factor
    }

    /// Maximum entries of a leaf node.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Largest diameter an entry may reach by absorbing points.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The distance used for descent and splits.
    pub fn metric(&self) -> &Metric<M> {
        &self.metric
    }

    /// Weighted space the features are summed in.
    pub fn space(&self) -> &FeatureSpace {
        &self.space
    }

    /// Arena index of the root.
    pub fn root(&self) -> Option<usize> {
        self.root
    }

    /// Node by arena index.
    pub fn node(&self, index: usize) -> Option<&CfNode> {
        self.nodes.get(index)
    }

    /// Arena indices of the current leaves.
    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    /// Number of nodes in the tree.
    pub fn amount_nodes(&self) -> usize {
        self.amount_nodes
    }

    /// Number of leaf entries created so far.
    ///
    /// Absorbing a point into an existing entry does not change it.
    pub fn amount_entries(&self) -> usize {
        self.amount_entries
    }

    /// Number of points summarized by the tree.
    pub fn amount_points(&self) -> usize {
        self.root
            .map_or(0, |root| self.nodes[root].feature.number_points())
    }

    /// Number of levels, leaves included.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Whether nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Every leaf entry, leaf by leaf.
    pub fn leaf_entries(&self) -> impl Iterator<Item = &CfEntry> + '_ {
        self.leaves
            .iter()
            .flat_map(move |&leaf| self.nodes[leaf].entries().iter())
    }

    /// Centroids of the leaf entries, as coordinates.
    pub fn centroids(&self) -> Vec<Coordinate> {
        self.leaf_entries()
            .map(|entry| entry.centroid_coordinate(&self.space))
            .collect()
    }

    /// Nodes at `level` below the root (level 0 is the root), left to right.
    pub fn level_nodes(&self, level: usize) -> Vec<usize> {
        let mut current: Vec<usize> = self.root.into_iter().collect();
        for _ in 0..level {
            current = current
                .iter()
                .flat_map(|&i| self.nodes[i].children().iter().copied())
                .collect();
        }
        current
    }

    /// Leaf reached by descending toward `entry`.
    pub fn find_nearest_leaf(&self, entry: &CfEntry) -> Option<usize> {
        let mut node = self.root?;
        while let CfNodeKind::NonLeaf(children) = &self.nodes[node].kind {
            node = self.nearest_child(children, entry)?;
        }
        Some(node)
    }

    /// Insert a single point.
    pub fn insert_point(&mut self, point: &Coordinate) {
        let entry = CfEntry::from_point(point, &self.space);
        self.insert(entry);
    }

    /// Insert a clustering feature.
    pub fn insert(&mut self, entry: CfEntry) {
        match self.root {
            None => {
                let root = self.alloc(CfNode {
                    feature: entry.clone(),
                    parent: None,
                    kind: CfNodeKind::Leaf(vec![entry]),
                });
                self.root = Some(root);
                self.leaves.push(root);
                self.amount_entries += 1;
                self.amount_nodes += 1;
                self.height += 1;
            }
            Some(root) => {
                // a split may have grown a new root
                if self.insert_into(root, &entry) {
                    if let Some(current) = self.root {
                        if self.merge_nearest_successors(current) {
                            self.amount_nodes -= 1;
                        }
                    }
                }
            }
        }
    }

    /// Returns true when the number of nodes below `index` changed.
    fn insert_into(&mut self, index: usize, entry: &CfEntry) -> bool {
        if self.nodes[index].is_leaf() {
            self.insert_into_leaf(index, entry)
        } else {
            self.insert_into_nonleaf(index, entry)
        }
    }

    fn insert_into_leaf(&mut self, index: usize, entry: &CfEntry) -> bool {
        let metric = &self.metric;
        let node = &mut self.nodes[index];
        let CfNodeKind::Leaf(entries) = &mut node.kind else {
            return false;
        };

        let mut nearest = 0;
        let mut best = f64::INFINITY;
        for (i, candidate) in entries.iter().enumerate() {
            let d = candidate.distance(entry, metric);
            if d < best {
                best = d;
                nearest = i;
            }
        }

        let merged = &entries[nearest] + entry;
        if merged.diameter() > self.threshold {
            entries.push(entry.clone());
            let overfull = entries.len() > self.max_entries;
            node.feature += entry;
            self.amount_entries += 1;
            if overfull {
                self.split_leaf(index);
                return true;
            }
        } else {
            entries[nearest] = merged;
            node.feature += entry;
        }
        false
    }

    fn insert_into_nonleaf(&mut self, index: usize, entry: &CfEntry) -> bool {
        let Some(child) = self.nearest_child(self.nodes[index].children(), entry) else {
            return false;
        };
        let child_changed = self.insert_into(child, entry);
        self.nodes[index].feature += entry;

        if self.nodes[index].children().len() > self.branch_factor {
            if self.root == Some(index) {
                self.grow_root(index);
            }
            self.split_nonleaf(index);
            return true;
        }
        if child_changed && self.merge_nearest_successors(index) {
            self.amount_nodes -= 1;
        }
        false
    }

    fn nearest_child(&self, children: &[usize], entry: &CfEntry) -> Option<usize> {
        let mut nearest = None;
        let mut best = f64::INFINITY;
        for &child in children {
            let d = self.nodes[child].feature.distance(entry, &self.metric);
            if nearest.is_none() || d < best {
                best = d;
                nearest = Some(child);
            }
        }
        nearest
    }

    /// Put a new root above the current one.
    fn grow_root(&mut self, old_root: usize) {
        let root = self.alloc(CfNode {
            feature: self.nodes[old_root].feature.clone(),
            parent: None,
            kind: CfNodeKind::NonLeaf(vec![old_root]),
        });
        self.nodes[old_root].parent = Some(root);
        self.root = Some(root);
        self.amount_nodes += 1;
        self.height += 1;
    }

    fn split_leaf(&mut self, index: usize) {
        if self.root == Some(index) {
            self.grow_root(index);
        }
        let entries = match &mut self.nodes[index].kind {
            CfNodeKind::Leaf(entries) => std::mem::take(entries),
            CfNodeKind::NonLeaf(_) => return,
        };
        let (a, b) = farthest_pair(entries.len(), |i, j| {
            entries[i].distance(&entries[j], &self.metric)
        });

        let mut first = (entries[a].clone(), vec![entries[a].clone()]);
        let mut second = (entries[b].clone(), vec![entries[b].clone()]);
        for (i, entry) in entries.into_iter().enumerate() {
            if i == a || i == b {
                continue;
            }
            let to_first = first.0.distance(&entry, &self.metric);
            let to_second = second.0.distance(&entry, &self.metric);
            let side = if to_first < to_second { &mut first } else { &mut second };
            side.0 += &entry;
            side.1.push(entry);
        }

        let parent = self.nodes[index].parent;
        self.nodes[index] = CfNode {
            feature: first.0,
            parent,
            kind: CfNodeKind::Leaf(first.1),
        };
        let sibling = self.alloc(CfNode {
            feature: second.0,
            parent,
            kind: CfNodeKind::Leaf(second.1),
        });

        self.leaves.retain(|&leaf| leaf != index);
        self.leaves.extend([index, sibling]);
        self.replace_in_parent(parent, index, sibling);
        self.amount_nodes += 1;
        trace!(leaf = index, sibling, "split leaf");
    }

    fn split_nonleaf(&mut self, index: usize) {
        let children = match &mut self.nodes[index].kind {
            CfNodeKind::NonLeaf(children) => std::mem::take(children),
            CfNodeKind::Leaf(_) => return,
        };
        let (a, b) = farthest_pair(children.len(), |i, j| {
            self.nodes[children[i]]
                .feature
                .distance(&self.nodes[children[j]].feature, &self.metric)
        });

        let mut first = (self.nodes[children[a]].feature.clone(), vec![children[a]]);
        let mut second = (self.nodes[children[b]].feature.clone(), vec![children[b]]);
        for (i, &child) in children.iter().enumerate() {
            if i == a || i == b {
                continue;
            }
            let feature = &self.nodes[child].feature;
            let to_first = first.0.distance(feature, &self.metric);
            let to_second = second.0.distance(feature, &self.metric);
            let side = if to_first < to_second { &mut first } else { &mut second };
            side.0 += feature;
            side.1.push(child);
        }

        let parent = self.nodes[index].parent;
        let moved = second.1.clone();
        self.nodes[index] = CfNode {
            feature: first.0,
            parent,
            kind: CfNodeKind::NonLeaf(first.1),
        };
        let sibling = self.alloc(CfNode {
            feature: second.0,
            parent,
            kind: CfNodeKind::NonLeaf(second.1),
        });
        for child in moved {
            self.nodes[child].parent = Some(sibling);
        }

        self.replace_in_parent(parent, index, sibling);
        self.amount_nodes += 1;
        trace!(node = index, sibling, "split non-leaf");
    }

    fn replace_in_parent(&mut self, parent: Option<usize>, index: usize, sibling: usize) {
        if let Some(parent) = parent {
            if let CfNodeKind::NonLeaf(children) = &mut self.nodes[parent].kind {
                children.retain(|&c| c != index);
                children.extend([index, sibling]);
            }
        }
    }

    /// Merge the two nearest non-leaf children of `index` if they fit.
    ///
    /// Scans every pair; the first strictly nearest pair wins.
    fn merge_nearest_successors(&mut self, index: usize) -> bool {
        let children = self.nodes[index].children().to_vec();
        if children.len() < 2 || self.nodes[children[0]].is_leaf() {
            return false;
        }

        let mut pair = (0, 1);
        let mut best = f64::INFINITY;
        for i in 0..children.len() {
            for j in i + 1..children.len() {
                let d = self.nodes[children[i]]
                    .feature
                    .distance(&self.nodes[children[j]].feature, &self.metric);
                if d < best {
                    best = d;
                    pair = (i, j);
                }
            }
        }

        let (keep, absorb) = (children[pair.0], children[pair.1]);
        let fan_out =
            self.nodes[keep].children().len() + self.nodes[absorb].children().len();
        if fan_out > self.branch_factor {
            return false;
        }

        if let CfNodeKind::NonLeaf(siblings) = &mut self.nodes[index].kind {
            siblings.retain(|&c| c != absorb);
        }
        let absorbed = std::mem::replace(&mut self.nodes[absorb], CfNode::vacant());
        for &child in absorbed.children() {
            self.nodes[child].parent = Some(keep);
        }
        let keep_node = &mut self.nodes[keep];
        keep_node.feature += &absorbed.feature;
        if let CfNodeKind::NonLeaf(kept) = &mut keep_node.kind {
            kept.extend_from_slice(absorbed.children());
        }
        self.free.push(absorb);
        trace!(node = keep, absorbed = absorb, "merged siblings");
        true
    }

    fn alloc(&mut self, node: CfNode) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }
}

/// Indices of the farthest pair among `n >= 2` items. Ties keep the first.
fn farthest_pair(n: usize, mut distance: impl FnMut(usize, usize) -> f64) -> (usize, usize) {
    let mut pair = (0, 1.min(n.saturating_sub(1)));
    let mut best = f64::NEG_INFINITY;
    for i in 0..n {
        for j in i + 1..n {
            let d = distance(i, j);
            if d > best {
                best = d;
                pair = (i, j);
            }
        }
    }
    pair
}

impl<M: Measure> HealthCheck for CfTree<M> {
    fn health_check(&self) -> HealthReport {
        let allocated: Vec<usize> = (0..self.nodes.len())
            .filter(|i| !self.free.contains(i))
            .collect();

        let mut parents = HashMap::new();
        let mut children = HashMap::new();
        for &i in &allocated {
            if let CfNodeKind::NonLeaf(kids) = &self.nodes[i].kind {
                children.insert(i, kids.clone());
                for &kid in kids {
                    parents.insert(kid, i);
                }
            }
        }

        let mut validation = validate_tree_structure(&parents, &children, &allocated);
        let mut internal = 0usize;
        let mut fan_out = 0usize;

        for &i in &allocated {
            let node = &self.nodes[i];
            if node.parent != parents.get(&i).copied() {
                validation.add(
                    ValidationIssue::new(Severity::Error, "parent index disagrees with child list")
                        .with_node(i),
                );
            }

            let mut parts = node.entries().iter().chain(
                node.children().iter().map(|&c| &self.nodes[c].feature),
            );
            let sum = parts.next().map(|first| {
                parts.fold(first.clone(), |mut acc, part| {
                    acc += part;
                    acc
                })
            });
            match (&node.kind, sum) {
                (CfNodeKind::Leaf(entries), _) if entries.len() > self.max_entries => {
                    validation.add(
                        ValidationIssue::new(Severity::Error, "leaf exceeds max_entries")
                            .with_node(i)
                            .with_detail(format!("{} > {}", entries.len(), self.max_entries)),
                    );
                }
                (CfNodeKind::NonLeaf(kids), _) if kids.len() > self.branch_factor => {
                    validation.add(
                        ValidationIssue::new(Severity::Error, "node exceeds branch_factor")
                            .with_node(i)
                            .with_detail(format!("{} > {}", kids.len(), self.branch_factor)),
                    );
                }
                (_, None) => {
                    validation.add(ValidationIssue::new(Severity::Error, "empty node").with_node(i));
                }
                (_, Some(sum)) if !sum.approx_eq(&node.feature, 1e-7) => {
                    validation.add(
                        ValidationIssue::new(Severity::Error, "feature is not the sum of its parts")
                            .with_node(i)
                            .with_detail(format!("{:?} vs {:?}", node.feature, sum)),
                    );
                }
                _ => {}
            }

            if let CfNodeKind::NonLeaf(kids) = &node.kind {
                internal += 1;
                fan_out += kids.len();
            }
        }

        // Every leaf hangs at the same depth and the flat list matches.
        let mut reachable_leaves = Vec::new();
        let mut reachable_nodes = 0usize;
        let mut stack: Vec<(usize, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((i, depth)) = stack.pop() {
            reachable_nodes += 1;
            match &self.nodes[i].kind {
                CfNodeKind::Leaf(_) => {
                    if depth != self.height {
                        validation.add(
                            ValidationIssue::new(Severity::Error, "unbalanced leaf")
                                .with_node(i)
                                .with_detail(format!("depth {depth}, height {}", self.height)),
                        );
                    }
                    reachable_leaves.push(i);
                }
                CfNodeKind::NonLeaf(kids) => stack.extend(kids.iter().map(|&k| (k, depth + 1))),
            }
        }
        let mut listed = self.leaves.clone();
        listed.sort_unstable();
        reachable_leaves.sort_unstable();
        if listed != reachable_leaves {
            validation.add(ValidationIssue::new(
                Severity::Error,
                "leaf list does not match the leaves reachable from the root",
            ));
        }

        if reachable_nodes != self.amount_nodes {
            validation.add(
                ValidationIssue::new(Severity::Warning, "amount_nodes out of date")
                    .with_detail(format!("{} counted, {} recorded", reachable_nodes, self.amount_nodes)),
            );
        }
        let entries = self.leaf_entries().count();
        if entries > self.amount_entries {
            validation.add(
                ValidationIssue::new(Severity::Error, "more leaf entries than insertions")
                    .with_detail(format!("{} entries, {} recorded", entries, self.amount_entries)),
            );
        }

        HealthReport {
            validation,
            node_count: allocated.len(),
            leaf_count: self.leaves.len(),
            height: self.height,
            avg_branching_factor: if internal == 0 {
                0.0
            } else {
                fan_out as f64 / internal as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceConfig;

    fn grid(n: usize) -> Vec<Coordinate> {
        (0..n)
            .map(|i| Coordinate::new((i % 10) as f64 * 3.0, (i / 10) as f64 * 3.0))
            .collect()
    }

    #[test]
    fn empty_tree() {
        let tree = CfTree::new(3, 4, 0.5, Metric::default());
        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.leaf_entries().count(), 0);
        assert!(tree.health_check().is_healthy());
    }

    #[test]
    fn close_points_are_absorbed() {
        let mut tree = CfTree::new(3, 4, 1.0, Metric::default());
        tree.insert_point(&Coordinate::new(0.0, 0.0));
        tree.insert_point(&Coordinate::new(0.5, 0.0));
        tree.insert_point(&Coordinate::new(0.0, 0.5));
        assert_eq!(tree.amount_entries(), 1);
        assert_eq!(tree.amount_points(), 3);
        assert_eq!(tree.amount_nodes(), 1);
        assert_eq!(tree.height(), 1);
    }

    #[test]
    fn far_points_append_then_split() {
        let mut tree = CfTree::new(3, 2, 0.1, Metric::default());
        for x in [0.0, 10.0, 20.0] {
            tree.insert_point(&Coordinate::new(x, 0.0));
        }
        assert_eq!(tree.amount_entries(), 3);
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.leaves().len(), 2);
        assert_eq!(tree.amount_nodes(), 3);

        // farthest pair is (0, 20); 10 ties and goes to the second seed
        let sizes: Vec<usize> = tree
            .leaves()
            .iter()
            .map(|&l| tree.node(l).unwrap().entries().len())
            .collect();
        assert_eq!(sizes, vec![1, 2]);

        let report = tree.health_check();
        assert!(report.is_healthy(), "{report}");
    }

    #[test]
    fn many_insertions_stay_balanced() {
        let mut tree = CfTree::new(3, 4, 0.5, Metric::default());
        let points = grid(200);
        for p in &points {
            tree.insert_point(p);
        }
        let report = tree.health_check();
        assert!(report.is_healthy(), "{report}");
        assert!(tree.height() >= 3);
        assert_eq!(tree.amount_points(), 200);
        assert_eq!(tree.leaf_entries().count(), tree.amount_entries());
        for &leaf in tree.leaves() {
            assert!(tree.node(leaf).unwrap().entries().len() <= tree.max_entries());
        }
        assert_eq!(tree.level_nodes(tree.height() - 1).len(), tree.leaves().len());
    }

    #[test]
    fn entry_count_sums_to_points() {
        let mut tree = CfTree::new(4, 5, 5.0, Metric::default());
        for p in &grid(57) {
            tree.insert_point(p);
        }
        let total: usize = tree.leaf_entries().map(CfEntry::number_points).sum();
        assert_eq!(total, 57);
    }

    #[test]
    fn nearest_leaf_descends() {
        let mut tree = CfTree::new(2, 1, 0.1, Metric::default());
        for x in [0.0, 100.0, 1.0, 101.0] {
            tree.insert_point(&Coordinate::new(x, 0.0));
        }
        let space = *tree.space();
        let probe = CfEntry::from_point(&Coordinate::new(100.5, 0.0), &space);
        let leaf = tree.find_nearest_leaf(&probe).unwrap();
        let centroid = tree.node(leaf).unwrap().feature.centroid_coordinate(&space);
        assert!(centroid.x >= 100.0);
    }

    #[test]
    fn scalar_weight_is_part_of_the_diameter() {
        let metric = Metric::planar(DistanceConfig::planar().with_pz(100.0));
        let mut tree = CfTree::new(3, 4, 0.5, metric);
        tree.insert_point(&Coordinate::new(0.0, 0.0).with_z(0.0));
        tree.insert_point(&Coordinate::new(500.0, 0.0).with_z(0.1));
        tree.insert_point(&Coordinate::new(0.0, 0.0).with_z(5.0));
        // spatial spread is ignored, the z jump is not
        assert_eq!(tree.amount_entries(), 2);
    }
}
