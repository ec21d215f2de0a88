//! K-means clustering.
//!
//! Partitions points into k clusters by repeatedly moving each center to the
//! mean of the points nearest to it (Lloyd, 1957).
//!
//! # Lloyd's Algorithm
//!
//! 1. Initialize k centers via k-means++
//! 2. **Assign**: each point goes to the nearest center
//! 3. **Update**: each center moves to the mean of its members
//! 4. Repeat until the largest center shift falls below `cutoff`
//!
//! Distances use the configured [`Metric`], so the scalar dimension takes part
//! in both assignment and the mean update.
//!
//! ## K-means++ Initialization
//!
//! 1. Choose the first center uniformly at random
//! 2. Choose each next center with probability proportional to D(x),
//!    the configured distance to the nearest existing center
//!
//! Sampling draws one uniform value over the total weight and locates it in
//! the prefix-sum array by binary search.
//!
//! # Failure Modes
//!
//! - **Empty cluster**: a center that attracts no point is fatal. There is no
//!   reseeding; the error names the iteration so the caller can change the
//!   seed or reduce k.
//! - **Determinism**: the RNG is seeded from `seed`, and ties in assignment go
//!   to the lowest cluster index. Same seed and same point order give the
//!   same clustering bit for bit.

use rand::prelude::*;
use tracing::debug;

use super::traits::Clustering;
use crate::distance::{Measure, Metric, PlanarMeasure};
use crate::error::{Error, Result};
use crate::point::{fsum, Coordinate, PointId, PointSet};
use crate::progress::{Progress, ProgressSink};

/// Default convergence cutoff: ten machine epsilons.
pub const DEFAULT_CUTOFF: f64 = 10.0 * f64::EPSILON;

/// One K-means cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansCluster {
    /// Member ids in point-set order.
    pub members: Vec<PointId>,
    /// Mean of the members.
    pub center: Coordinate,
}

/// Result of a K-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Final clusters, indexed by label.
    pub clusters: Vec<KMeansCluster>,
    /// Label per point, in point-set order.
    pub labels: Vec<usize>,
    /// Number of Lloyd iterations performed.
    pub iterations: usize,
}

/// K-means clustering algorithm.
#[derive(Debug, Clone)]
pub struct KMeans<M = PlanarMeasure> {
    /// Number of clusters.
    k: usize,
    /// Distance used for seeding, assignment and shifts.
    metric: Metric<M>,
    /// Random seed.
    seed: u64,
    /// Convergence cutoff on the largest center shift.
    cutoff: f64,
    /// Safety bound on Lloyd iterations.
    max_iter: usize,
}

impl KMeans<PlanarMeasure> {
    /// Create a new K-means clusterer with a planar Euclidean metric.
    pub fn new(k: usize) -> Self {
        Self::with_metric(k, Metric::default())
    }
}

impl<M: Measure> KMeans<M> {
    /// Create a new K-means clusterer over `metric`.
    pub fn with_metric(k: usize, metric: Metric<M>) -> Self {
        Self {
            k,
            metric,
            seed: 1,
            cutoff: DEFAULT_CUTOFF,
            max_iter: 10_000,
        }
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the convergence cutoff.
    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Set maximum iterations.
    ///
    /// Lloyd's algorithm converges in finitely many steps, but floating point
    /// can make the final centers oscillate at the ulp level. Hitting this
    /// bound sends a warning to the progress sink and returns the last
    /// assignment.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    /// The metric in use.
    pub fn metric(&self) -> &Metric<M> {
        &self.metric
    }

    /// K-means++ seeding. Returns the positions of the chosen points.
    fn init_centers(&self, coords: &[Coordinate], rng: &mut impl Rng) -> Vec<usize> {
        let n = coords.len();
        let mut chosen = Vec::with_capacity(self.k);
        chosen.push(rng.random_range(0..n));

        let mut nearest = vec![f64::MAX; n];
        let mut cumulative = vec![0.0; n];
        while chosen.len() < self.k {
            let last = &coords[chosen[chosen.len() - 1]];
            let mut total = 0.0;
            for (i, c) in coords.iter().enumerate() {
                nearest[i] = nearest[i].min(self.metric.distance(last, c));
                total += nearest[i];
                cumulative[i] = total;
            }

            let next = if total > f64::EPSILON {
                let r = rng.random::<f64>() * (total - f64::EPSILON);
                cumulative.partition_point(|&c| c <= r).min(n - 1)
            } else {
                // every point coincides with a center
                rng.random_range(0..n)
            };
            chosen.push(next);
        }
        chosen
    }

    /// Index of the nearest center; ties go to the lowest index.
    fn nearest(&self, p: &Coordinate, centers: &[Coordinate]) -> usize {
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (i, c) in centers.iter().enumerate() {
            let d = self.metric.distance(c, p);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    /// Run k-means++ and Lloyd iterations.
    pub fn fit(&self, points: &PointSet, sink: &mut dyn ProgressSink) -> Result<KMeansFit> {
        if points.is_empty() {
            return Err(Error::EmptyInput);
        }
        if self.k == 0 {
            return Err(Error::invalid_parameter("k", "must be at least 1"));
        }
        if self.k > points.len() {
            return Err(Error::InsufficientPoints {
                requested: self.k,
                available: points.len(),
            });
        }

        let mut progress = Progress::new(sink);
        let coords = points.coords();
        let mut rng = StdRng::seed_from_u64(self.seed);

        progress.info("Initializing clusters with K-means++");
        let mut centers: Vec<Coordinate> = self
            .init_centers(coords, &mut rng)
            .into_iter()
            .map(|i| coords[i])
            .collect();
        progress.info(&format!("{} clusters successfully initialized", self.k));

        let mut labels = vec![0usize; coords.len()];
        let mut iteration = 0;
        loop {
            progress.checkpoint()?;
            iteration += 1;
            progress.set(iteration.min(90));

            for (label, p) in labels.iter_mut().zip(coords) {
                *label = self.nearest(p, &centers);
            }

            let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.k];
            for (i, &label) in labels.iter().enumerate() {
                members[label].push(i);
            }

            let mut biggest_shift = 0.0f64;
            for (cluster, idx) in members.iter().enumerate() {
                if idx.is_empty() {
                    return Err(Error::EmptyCluster { iteration, cluster });
                }
                let n = idx.len() as f64;
                let center = Coordinate::new(
                    fsum(idx.iter().map(|&i| coords[i].x)) / n,
                    fsum(idx.iter().map(|&i| coords[i].y)) / n,
                )
                .with_z(fsum(idx.iter().map(|&i| coords[i].z)) / n);
                let shift = self.metric.distance(&centers[cluster], &center);
                biggest_shift = biggest_shift.max(shift);
                centers[cluster] = center;
            }
            debug!(iteration, biggest_shift, "k-means iteration");

            if biggest_shift < self.cutoff {
                progress.set(90);
                progress.info(&format!("Converged after {iteration} iterations"));
                break;
            }
            if iteration >= self.max_iter {
                debug!(iteration, biggest_shift, "k-means hit the iteration bound");
                progress.set(90);
                progress.warn(&format!(
                    "K-means stopped after {iteration} iterations without converging"
                ));
                break;
            }
        }

        let ids = points.ids();
        let mut clusters: Vec<KMeansCluster> = centers
            .into_iter()
            .map(|center| KMeansCluster {
                members: Vec::new(),
                center,
            })
            .collect();
        for (i, &label) in labels.iter().enumerate() {
            clusters[label].members.push(ids[i]);
        }

        Ok(KMeansFit {
            clusters,
            labels,
            iterations: iteration,
        })
    }
}

impl<M: Measure> Clustering for KMeans<M> {
    fn fit_predict(&self, points: &PointSet, progress: &mut dyn ProgressSink) -> Result<Vec<usize>> {
        Ok(self.fit(points, progress)?.labels)
    }

    fn n_clusters(&self) -> usize {
        self.k
    }
}
