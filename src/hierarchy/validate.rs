//! Tree validation and health checking utilities.
//!
//! Provides tools to verify tree structure integrity and detect common issues:
//! - Orphaned nodes (allocated but unreachable from a root)
//! - Cycles in the tree
//! - Parent pointers that disagree with child lists
//! - Capacity and summary invariants specific to each tree type
//!
//! # Example
//!
//! ```rust
//! use geoclust::aggregate::CfTree;
//! use geoclust::hierarchy::HealthCheck;
//! use geoclust::{Coordinate, Metric};
//!
//! let mut tree = CfTree::new(3, 4, 0.5, Metric::default());
//! for i in 0..50 {
//!     tree.insert_point(&Coordinate::new(i as f64, (i % 7) as f64));
//! }
//!
//! let report = tree.health_check();
//! if !report.is_healthy() {
//!     for issue in &report.validation.issues {
//!         eprintln!("{}", issue);
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet};

use super::{Dendrogram, NodeId};

/// How much a structural finding matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Shape note, e.g. a forest of live dendrogram roots.
    Info,
    /// Stale bookkeeping that does not affect results.
    Warning,
    /// Broken invariant.
    Error,
    /// The tree cannot be trusted at all.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

/// One finding about a CF-tree or dendrogram.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    /// Arena index of the offending node.
    pub node: Option<usize>,
    /// Observed values, e.g. `"12 > 10"`.
    pub detail: Option<String>,
}

impl ValidationIssue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            node: None,
            detail: None,
        }
    }

    pub fn with_node(mut self, index: usize) -> Self {
        self.node = Some(index);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(index) = self.node {
            write!(f, " at node {index}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Findings of one structural pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    fn note(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Info, message));
    }

    fn critical(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Critical, message));
    }

    /// Most severe finding, if any.
    pub fn worst(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// No broken invariants (info and warnings are allowed).
    pub fn is_healthy(&self) -> bool {
        self.worst().map_or(true, |s| s < Severity::Error)
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.worst() {
            None => return write!(f, "no structural issues"),
            Some(worst) => writeln!(f, "{} issues, worst: {worst}", self.issues.len())?,
        }
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

/// Health report with additional statistics.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Validation issues.
    pub validation: ValidationReport,
    /// Total number of nodes.
    pub node_count: usize,
    /// Number of leaf nodes.
    pub leaf_count: usize,
    /// Number of levels, leaves included.
    pub height: usize,
    /// Average number of children per internal node.
    pub avg_branching_factor: f64,
}

impl HealthReport {
    /// Check if the tree is healthy (no errors or critical issues).
    pub fn is_healthy(&self) -> bool {
        self.validation.is_healthy()
    }
}

impl std::fmt::Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Tree Health Report")?;
        writeln!(f, "==================")?;
        writeln!(f, "Nodes: {} ({} leaves)", self.node_count, self.leaf_count)?;
        writeln!(f, "Height: {}", self.height)?;
        writeln!(f, "Avg branching factor: {:.2}", self.avg_branching_factor)?;
        writeln!(f)?;
        write!(f, "{}", self.validation)
    }
}

/// Trait for types that can be health-checked.
pub trait HealthCheck {
    /// Perform a health check and return a report.
    fn health_check(&self) -> HealthReport;

    /// Quick check: returns true if healthy.
    fn is_healthy(&self) -> bool {
        self.health_check().is_healthy()
    }
}

impl HealthCheck for Dendrogram {
    fn health_check(&self) -> HealthReport {
        let n_items = self.n_items();
        let node_count = n_items + self.n_merges();

        let mut parents: HashMap<usize, usize> = HashMap::new();
        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut shared = Vec::new();
        for index in 0..node_count {
            if let Some([l, r]) = self.node(index).and_then(|n| n.children) {
                children.insert(index, vec![l, r]);
                for child in [l, r] {
                    if parents.insert(child, index).is_some() {
                        shared.push(child);
                    }
                }
            }
        }

        let nodes: Vec<usize> = (0..node_count).collect();
        let mut validation = validate_tree_structure(&parents, &children, &nodes);

        for child in shared {
            validation.add(
                ValidationIssue::new(Severity::Error, "node merged more than once")
                    .with_node(child),
            );
        }

        for (step, merge) in self.merges().enumerate() {
            let expected = NodeId::Internal(-(step as i64) - 1);
            if merge.id != expected {
                validation.add(
                    ValidationIssue::new(Severity::Error, "merge id out of sequence")
                        .with_node(n_items + step)
                        .with_detail(format!("expected {expected}, found {}", merge.id)),
                );
            }
        }

        for index in n_items..node_count {
            let Some(node) = self.node(index) else {
                continue;
            };
            let Some([l, r]) = node.children else {
                validation.add(
                    ValidationIssue::new(Severity::Error, "merge node has no children")
                        .with_node(index),
                );
                continue;
            };
            let sum = self.node(l).map_or(0, |n| n.size) + self.node(r).map_or(0, |n| n.size);
            if sum != node.size {
                validation.add(
                    ValidationIssue::new(Severity::Error, "size is not the sum of children")
                        .with_node(index)
                        .with_detail(format!("size {}, children {}", node.size, sum)),
                );
            }
        }

        // Live nodes partition the leaves.
        let mut seen = vec![0usize; n_items];
        for &root in self.live() {
            let mut stack = vec![root];
            while let Some(i) = stack.pop() {
                match self.node(i).and_then(|n| n.children) {
                    Some([l, r]) => stack.extend([l, r]),
                    None if i < n_items => seen[i] += 1,
                    None => {}
                }
            }
        }
        let uncovered = seen.iter().filter(|&&c| c != 1).count();
        if uncovered > 0 {
            validation.add(
                ValidationIssue::new(Severity::Critical, "live nodes do not partition the leaves")
                    .with_detail(format!("{uncovered} leaves covered zero or several times")),
            );
        }

        let height = self
            .live()
            .iter()
            .map(|&i| self.depth_below(i))
            .max()
            .unwrap_or(0);
        HealthReport {
            validation,
            node_count,
            leaf_count: n_items,
            height,
            avg_branching_factor: if self.n_merges() == 0 { 0.0 } else { 2.0 },
        }
    }
}

impl Dendrogram {
    /// Levels under a node, the node included.
    fn depth_below(&self, index: usize) -> usize {
        let mut best = 0;
        let mut stack = vec![(index, 1usize)];
        while let Some((i, depth)) = stack.pop() {
            best = best.max(depth);
            if let Some([l, r]) = self.node(i).and_then(|n| n.children) {
                stack.push((l, depth + 1));
                stack.push((r, depth + 1));
            }
        }
        best
    }
}

/// Validate that a parent-child relationship forms a proper tree.
///
/// # Arguments
/// * `parents` - Map from node index to parent index (roots have no entry)
/// * `children` - Map from node index to child indices
/// * `nodes` - Every allocated node index; arena slots may be sparse
///
/// # Returns
/// A validation report with any issues found.
pub fn validate_tree_structure(
    parents: &HashMap<usize, usize>,
    children: &HashMap<usize, Vec<usize>>,
    nodes: &[usize],
) -> ValidationReport {
    let mut report = ValidationReport::default();

    // Find root(s) - nodes without parents
    let all_nodes: HashSet<usize> = nodes.iter().copied().collect();
    let mut roots: Vec<usize> = nodes
        .iter()
        .copied()
        .filter(|n| !parents.contains_key(n))
        .collect();
    roots.sort_unstable();

    if roots.is_empty() && !nodes.is_empty() {
        report.critical("No root node found - tree has cycles");
    } else if roots.len() > 1 {
        report.note(format!("{} roots found", roots.len()));
    }

    // Check for orphaned nodes (not reachable from root)
    let mut reachable = HashSet::new();
    let mut stack = roots.clone();

    while let Some(node) = stack.pop() {
        if reachable.insert(node) {
            if let Some(node_children) = children.get(&node) {
                stack.extend(node_children);
            }
        }
    }

    let mut orphans: Vec<usize> = all_nodes.difference(&reachable).copied().collect();
    orphans.sort_unstable();
    if !orphans.is_empty() {
        report.add(
            ValidationIssue::new(
                Severity::Error,
                format!("{} orphaned nodes not reachable from root", orphans.len()),
            )
            .with_detail(format!("first few: {:?}", &orphans[..orphans.len().min(5)])),
        );
    }

    // Check parent-child consistency
    for (child, parent) in parents {
        if let Some(parent_children) = children.get(parent) {
            if !parent_children.contains(child) {
                report.add(
                    ValidationIssue::new(
                        Severity::Error,
                        "Parent-child inconsistency: child claims parent but parent doesn't list child",
                    )
                    .with_node(*child)
                    .with_detail(format!("parent: {}", parent)),
                );
            }
        } else {
            report.add(
                ValidationIssue::new(Severity::Error, "Parent node has no children list")
                    .with_node(*parent),
            );
        }
    }

    // Cycles reachable from a root: white/grey/black DFS.
    let mut state: HashMap<usize, u8> = HashMap::new();
    'roots: for &root in &roots {
        let mut stack = vec![(root, false)];
        while let Some((node, exiting)) = stack.pop() {
            if exiting {
                state.insert(node, 2);
                continue;
            }
            if state.contains_key(&node) {
                continue;
            }
            state.insert(node, 1);
            stack.push((node, true));
            for &child in children.get(&node).into_iter().flatten() {
                match state.get(&child) {
                    Some(1) => {
                        report.critical("Cycle detected in tree structure");
                        break 'roots;
                    }
                    Some(_) => {}
                    None => stack.push((child, false)),
                }
            }
        }
    }

    report
}
