//! Hierarchical (agglomerative) clustering.
//!
//! Bottom-up clustering that builds a **dendrogram** by repeatedly merging
//! the closest pair of live clusters until `k` remain.
//!
//! # Lance-Williams Recurrence
//!
//! After merging `i` and `j`, the distance from the new cluster to every other
//! live cluster `l` follows from the pre-merge distances alone:
//!
//! ```text
//! d(ij, l) = αᵢ·d(i,l) + αⱼ·d(j,l) + β·d(i,j) + γ·|d(i,l) - d(j,l)|
//! ```
//!
//! | Linkage | αᵢ | β | γ |
//! |---------|----|---|---|
//! | Single | 1/2 | 0 | -1/2 |
//! | Complete | 1/2 | 0 | +1/2 |
//! | Average | nᵢ/(nᵢ+nⱼ) | 0 | 0 |
//! | Ward | (nᵢ+nₗ)/(nᵢ+nⱼ+nₗ) | -nₗ/(nᵢ+nⱼ+nₗ) | 0 |
//! | Centroid | nᵢ/(nᵢ+nⱼ) | -nᵢnⱼ/(nᵢ+nⱼ)² | 0 |
//!
//! (αⱼ is symmetric.) Distances are the configured blended metric, not
//! squared Euclidean, so Ward and centroid follow the same recurrence on
//! whatever the metric returns.
//!
//! # Cost
//!
//! Every merge rescans all live pairs: O(n²) per merge, O(n³) overall, on an
//! O(n²) condensed matrix. Large inputs should be pre-aggregated first.
//! Single linkage defaults to SLINK in [`super::pointer`], which is exact and
//! O(n²). CLINK only approximates complete linkage (its tree depends on input
//! order), so it runs only when [`PointerStrategy::Pointer`] asks for it.
//!
//! # Ties
//!
//! Pairs are scanned row by row over the live list (survivors in input order,
//! merged nodes appended). The first pair with the strictly smallest distance
//! wins, so the result depends on input order and nothing else.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pointer::PointerRepresentation;
use super::traits::Clustering;
use crate::distance::{Measure, Metric, PlanarMeasure};
use crate::error::{Error, Result};
use crate::hierarchy::Dendrogram;
use crate::point::{PointId, PointSet};
use crate::progress::{Progress, ProgressSink};

/// Linkage method for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Single linkage: minimum distance between clusters.
    Single,
    /// Complete linkage: maximum distance between clusters.
    Complete,
    /// Average linkage (UPGMA): mean distance between clusters.
    Average,
    /// Ward's method: minimize within-cluster variance.
    Ward,
    /// Centroid linkage (UPGMC): distance between centroids.
    Centroid,
}

/// Lance-Williams coefficients for one update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    /// Weight of `d(i, l)`.
    pub alpha_i: f64,
    /// Weight of `d(j, l)`.
    pub alpha_j: f64,
    /// Weight of `d(i, j)`.
    pub beta: f64,
    /// Weight of `|d(i, l) - d(j, l)|`.
    pub gamma: f64,
}

impl Linkage {
    /// All linkages.
    pub const ALL: [Linkage; 5] = [
        Linkage::Single,
        Linkage::Complete,
        Linkage::Average,
        Linkage::Ward,
        Linkage::Centroid,
    ];

    /// Coefficients for merging clusters of sizes `n_i` and `n_j`, seen from
    /// a cluster of size `n_l`.
    pub fn coefficients(self, n_i: usize, n_j: usize, n_l: usize) -> Coefficients {
        let (ni, nj, nl) = (n_i as f64, n_j as f64, n_l as f64);
        match self {
            Linkage::Single => Coefficients {
                alpha_i: 0.5,
                alpha_j: 0.5,
                beta: 0.0,
                gamma: -0.5,
            },
            Linkage::Complete => Coefficients {
                alpha_i: 0.5,
                alpha_j: 0.5,
                beta: 0.0,
                gamma: 0.5,
            },
            Linkage::Average => Coefficients {
                alpha_i: ni / (ni + nj),
                alpha_j: nj / (ni + nj),
                beta: 0.0,
                gamma: 0.0,
            },
            Linkage::Ward => {
                let total = ni + nj + nl;
                Coefficients {
                    alpha_i: (ni + nl) / total,
                    alpha_j: (nj + nl) / total,
                    beta: -nl / total,
                    gamma: 0.0,
                }
            }
            Linkage::Centroid => {
                let sum = ni + nj;
                Coefficients {
                    alpha_i: ni / sum,
                    alpha_j: nj / sum,
                    beta: -(ni * nj) / (sum * sum),
                    gamma: 0.0,
                }
            }
        }
    }

    /// Distance from the merged cluster `i ∪ j` to `l`.
    pub fn update(self, d_il: f64, d_jl: f64, d_ij: f64, sizes: [usize; 3]) -> f64 {
        // the recurrence reduces to min/max here; take them exactly
        match self {
            Linkage::Single => return d_il.min(d_jl),
            Linkage::Complete => return d_il.max(d_jl),
            _ => {}
        }
        let c = self.coefficients(sizes[0], sizes[1], sizes[2]);
        c.alpha_i * d_il + c.alpha_j * d_jl + c.beta * d_ij + c.gamma * (d_il - d_jl).abs()
    }

    /// Whether a pointer-representation algorithm exists for this linkage.
    pub fn has_pointer_algorithm(self) -> bool {
        matches!(self, Linkage::Single | Linkage::Complete)
    }
}

/// Which driver runs single and complete linkage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerStrategy {
    /// SLINK for single, Lance-Williams otherwise.
    #[default]
    Auto,
    /// Always the generic Lance-Williams driver.
    LanceWilliams,
    /// SLINK for single, CLINK for complete, Lance-Williams otherwise.
    Pointer,
}

impl PointerStrategy {
    /// Whether `linkage` runs on a pointer representation.
    pub fn uses_pointer(self, linkage: Linkage) -> bool {
        match self {
            PointerStrategy::Auto => linkage == Linkage::Single,
            PointerStrategy::LanceWilliams => false,
            PointerStrategy::Pointer => linkage.has_pointer_algorithm(),
        }
    }
}

/// Condensed upper-triangle distance matrix.
struct Condensed {
    n: usize,
    values: Vec<f64>,
}

impl Condensed {
    fn new(n: usize) -> Self {
        Self {
            n,
            values: vec![0.0; n * n.saturating_sub(1) / 2],
        }
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        self.n * a - a * (a + 1) / 2 + (b - a - 1)
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.values[self.index(i, j)]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.values[idx] = value;
    }
}

/// Hierarchical (agglomerative) clustering.
#[derive(Debug, Clone)]
pub struct HierarchicalClustering<M = PlanarMeasure> {
    /// Number of clusters to produce.
    n_clusters: usize,
    /// Linkage method.
    linkage: Option<Linkage>,
    /// Pairwise distance.
    metric: Metric<M>,
    /// Driver selection for single/complete.
    strategy: PointerStrategy,
}

impl HierarchicalClustering<PlanarMeasure> {
    /// Create a new hierarchical clusterer over a planar Euclidean metric.
    pub fn new(n_clusters: usize) -> Self {
        Self::with_metric(n_clusters, Metric::default())
    }
}

impl<M: Measure> HierarchicalClustering<M> {
    /// Create a new hierarchical clusterer over `metric`. No linkage is set.
    pub fn with_metric(n_clusters: usize, metric: Metric<M>) -> Self {
        Self {
            n_clusters,
            linkage: None,
            metric,
            strategy: PointerStrategy::Auto,
        }
    }

    /// Set linkage method.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = Some(linkage);
        self
    }

    /// Set driver selection.
    pub fn with_strategy(mut self, strategy: PointerStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn check(&self, points: &PointSet) -> Result<Linkage> {
        let linkage = self.linkage.ok_or(Error::InvalidLinkage)?;
        if points.is_empty() {
            return Err(Error::EmptyInput);
        }
        if self.n_clusters == 0 {
            return Err(Error::invalid_parameter("n_clusters", "must be at least 1"));
        }
        if self.n_clusters > points.len() {
            return Err(Error::InsufficientPoints {
                requested: self.n_clusters,
                available: points.len(),
            });
        }
        Ok(linkage)
    }

    /// Run the Lance-Williams driver down to `n_clusters` live nodes.
    pub fn fit_dendrogram(
        &self,
        points: &PointSet,
        sink: &mut dyn ProgressSink,
    ) -> Result<Dendrogram> {
        let linkage = self.check(points)?;
        let mut progress = Progress::new(sink);
        let coords = points.coords();
        let n = coords.len();

        let mut dist = Condensed::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                dist.set(i, j, self.metric.distance(&coords[i], &coords[j]));
            }
        }

        // Arena index of the node stored in each matrix slot.
        let mut node_of_slot: Vec<usize> = (0..n).collect();
        // Matrix slots of live nodes, in live order.
        let mut live: Vec<usize> = (0..n).collect();
        let mut sizes = vec![1usize; n];
        let mut dendro = Dendrogram::new(points.ids());

        let total = n - self.n_clusters;
        for done in 0..total {
            progress.checkpoint()?;

            let mut closest = f64::MAX;
            let mut pair = (0, 1);
            for a in 0..live.len() {
                for b in (a + 1)..live.len() {
                    let d = dist.get(live[a], live[b]);
                    if d < closest {
                        closest = d;
                        pair = (a, b);
                    }
                }
            }

            let (si, sj) = (live[pair.0], live[pair.1]);
            let d_ij = dist.get(si, sj);
            let (n_i, n_j) = (sizes[si], sizes[sj]);
            for &sl in &live {
                if sl == si || sl == sj {
                    continue;
                }
                let updated =
                    linkage.update(dist.get(si, sl), dist.get(sj, sl), d_ij, [n_i, n_j, sizes[sl]]);
                // slot si is reused for the merged node
                dist.set(si, sl, updated);
            }

            let node = dendro.merge(node_of_slot[si], node_of_slot[sj], d_ij)?;
            node_of_slot[si] = node;
            sizes[si] = n_i + n_j;
            live.remove(pair.1);
            live.remove(pair.0);
            live.push(si);

            progress.fraction(done + 1, total, 0, 90);
        }

        debug!(merges = total, ?linkage, "lance-williams driver finished");
        progress.info("Cluster tree computed");
        Ok(dendro)
    }

    /// Run whichever driver the strategy selects and return clusters of
    /// point ids, in output label order.
    pub fn fit_clusters(
        &self,
        points: &PointSet,
        sink: &mut dyn ProgressSink,
    ) -> Result<Vec<Vec<PointId>>> {
        let linkage = self.check(points)?;
        if self.strategy.uses_pointer(linkage) {
            let pointer = PointerRepresentation::build(points, &self.metric, linkage, sink)?;
            let mut progress = Progress::new(sink);
            let clusters = pointer.clusters(self.n_clusters, points.ids())?;
            progress.set(90);
            progress.info("Cluster tree computed");
            return Ok(clusters);
        }
        Ok(self.fit_dendrogram(points, sink)?.clusters())
    }
}

impl<M: Measure> Clustering for HierarchicalClustering<M> {
    fn fit_predict(&self, points: &PointSet, progress: &mut dyn ProgressSink) -> Result<Vec<usize>> {
        let clusters = self.fit_clusters(points, progress)?;
        let mut labels = vec![0usize; points.len()];
        for (label, members) in clusters.iter().enumerate() {
            for &id in members {
                if let Some(pos) = points.position(id) {
                    labels[pos] = label;
                }
            }
        }
        Ok(labels)
    }

    fn n_clusters(&self) -> usize {
        self.n_clusters
    }
}
