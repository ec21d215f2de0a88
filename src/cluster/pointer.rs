//! Pointer-representation algorithms for single and complete linkage.
//!
//! SLINK (Sibson, 1973) and CLINK (Defays, 1977) build the whole dendrogram
//! in O(n²) time and O(n) space. SLINK is exact. CLINK is not: it yields a
//! complete-linkage-like tree whose shape depends on input order, and may
//! differ from the exact complete-linkage merge sequence. Points are absorbed
//! one at a time; after
//! point `i` is absorbed, for every earlier point `p`:
//!
//! - `pi[p]` is the last point (highest index) of the cluster `p` joins
//!   when it stops being the last point of its own cluster,
//! - `lambda[p]` is the distance at which that happens.
//!
//! The last point has `pi = n - 1` and `lambda = ∞`.
//!
//! # Extracting k clusters
//!
//! The `k - 1` largest `lambda` values mark the last `k - 1` merges. Cutting
//! each of those pointers splits the pointer tree into `k` components: one
//! per cut point (the point and everything that points into it, transitively)
//! and the component holding the last point, which collects everything left.

use tracing::debug;

use super::hierarchical::Linkage;
use crate::distance::{Measure, Metric};
use crate::error::{Error, Result};
use crate::point::{PointId, PointSet};
use crate::progress::{Progress, ProgressSink};

/// Pointer representation of a single- or complete-linkage dendrogram.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerRepresentation {
    /// Pointer to the last point of the cluster each point joins.
    pub pi: Vec<usize>,
    /// Merge level of each pointer.
    pub lambda: Vec<f64>,
}

impl PointerRepresentation {
    /// Build with SLINK (single) or CLINK (complete).
    pub fn build<M: Measure>(
        points: &PointSet,
        metric: &Metric<M>,
        linkage: Linkage,
        sink: &mut dyn ProgressSink,
    ) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut progress = Progress::new(sink);
        match linkage {
            Linkage::Single => Self::slink(points, metric, &mut progress),
            Linkage::Complete => Self::clink(points, metric, &mut progress),
            other => Err(Error::invalid_parameter(
                "linkage",
                format!("no pointer algorithm for {other:?} linkage"),
            )),
        }
    }

    fn slink<M: Measure>(
        points: &PointSet,
        metric: &Metric<M>,
        progress: &mut Progress<'_>,
    ) -> Result<Self> {
        let coords = points.coords();
        let n = coords.len();
        let mut pi = vec![0usize; n];
        let mut lambda = vec![f64::MAX; n];
        let mut m = vec![0.0f64; n];

        for i in 1..n {
            progress.checkpoint()?;
            pi[i] = i;
            lambda[i] = f64::MAX;
            for p in 0..i {
                m[p] = metric.distance(&coords[p], &coords[i]);
            }
            for p in 0..i {
                if lambda[p] >= m[p] {
                    m[pi[p]] = m[pi[p]].min(lambda[p]);
                    lambda[p] = m[p];
                    pi[p] = i;
                } else {
                    m[pi[p]] = m[pi[p]].min(m[p]);
                }
            }
            for p in 0..i {
                if lambda[p] >= lambda[pi[p]] {
                    pi[p] = i;
                }
            }
            progress.fraction(i, n, 0, 90);
        }
        debug!(points = n, "slink finished");
        Ok(Self { pi, lambda })
    }

    fn clink<M: Measure>(
        points: &PointSet,
        metric: &Metric<M>,
        progress: &mut Progress<'_>,
    ) -> Result<Self> {
        let coords = points.coords();
        let n = coords.len();
        let mut pi = vec![0usize; n];
        let mut lambda = vec![f64::MAX; n];
        let mut m = vec![0.0f64; n];

        for i in 1..n {
            progress.checkpoint()?;
            pi[i] = i;
            lambda[i] = f64::MAX;
            for p in 0..i {
                m[p] = metric.distance(&coords[p], &coords[i]);
            }
            for p in 0..i {
                if lambda[p] < m[p] {
                    m[pi[p]] = m[pi[p]].max(m[p]);
                    m[p] = f64::MAX;
                }
            }

            let mut a = i - 1;
            for p in (0..i).rev() {
                if lambda[p] >= m[pi[p]] {
                    if m[p] < m[a] {
                        a = p;
                    }
                } else {
                    m[p] = f64::MAX;
                }
            }

            let mut b = pi[a];
            let mut c = lambda[a];
            pi[a] = i;
            lambda[a] = m[a];
            if a < i - 1 {
                while b < i - 1 {
                    let d = pi[b];
                    let e = lambda[b];
                    pi[b] = i;
                    lambda[b] = c;
                    b = d;
                    c = e;
                }
                if b == i - 1 {
                    pi[b] = i;
                    lambda[b] = c;
                }
            }

            for p in 0..i {
                if pi[pi[p]] == i && lambda[p] >= lambda[pi[p]] {
                    pi[p] = i;
                }
            }
            progress.fraction(i, n, 0, 90);
        }
        debug!(points = n, "clink finished");
        Ok(Self { pi, lambda })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.pi.len()
    }

    /// Whether the representation is empty.
    pub fn is_empty(&self) -> bool {
        self.pi.is_empty()
    }

    /// Split into `k` clusters of ids (`ids[p]` names point `p`).
    ///
    /// Clusters come in ascending order of their cut level, followed by the
    /// component of the last point.
    pub fn clusters(&self, k: usize, ids: &[PointId]) -> Result<Vec<Vec<PointId>>> {
        let n = self.len();
        if k == 0 || k > n {
            return Err(Error::InsufficientPoints {
                requested: k,
                available: n,
            });
        }
        if ids.len() != n {
            return Err(Error::invalid_parameter(
                "ids",
                format!("expected {n} ids, got {}", ids.len()),
            ));
        }

        let mut cut = vec![false; n];
        let mut cuts = Vec::with_capacity(k - 1);
        for _ in 1..k {
            let mut best = None;
            let mut highest = f64::NEG_INFINITY;
            for p in 0..n - 1 {
                if !cut[p] && self.lambda[p] > highest {
                    highest = self.lambda[p];
                    best = Some(p);
                }
            }
            if let Some(p) = best {
                cut[p] = true;
                cuts.push(p);
            }
        }
        // descendants sit at lower indices, so this claims them first on ties
        cuts.sort_by(|&a, &b| self.lambda[a].total_cmp(&self.lambda[b]).then(a.cmp(&b)));

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (p, &parent) in self.pi.iter().enumerate() {
            if parent != p {
                children[parent].push(p);
            }
        }

        let mut claimed = vec![false; n];
        let mut clusters = Vec::with_capacity(k);
        for &root in &cuts {
            let mut members = Vec::new();
            if !claimed[root] {
                members.push(root);
            }
            let mut stack: Vec<usize> = children[root].iter().rev().copied().collect();
            while let Some(p) = stack.pop() {
                if !claimed[p] {
                    members.push(p);
                }
                stack.extend(children[p].iter().rev());
            }
            for &p in &members {
                claimed[p] = true;
            }
            clusters.push(members.into_iter().map(|p| ids[p]).collect());
        }
        clusters.push((0..n).filter(|&p| !claimed[p]).map(|p| ids[p]).collect());
        Ok(clusters)
    }
}
