//! End-to-end clustering runs.
//!
//! [`ClusterOrchestrator`] validates a [`ClusterConfig`], optionally shrinks
//! the input with a pre-aggregator, runs K-means or hierarchical clustering,
//! and carries the labels back to every original point.
//!
//! ```text
//! PointSet ──► [Birch | Blobs] ──► KMeans | Hierarchical ──► expand ──► Assignment
//!   0%            0-30%                  30-95%                 100%
//! ```
//!
//! The free functions [`run_kmeans`], [`run_hierarchical`] and
//! [`run_birch_precompute`] are the single-stage entry points.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{Birch, BirchParams, BlobAggregator, BlobParams, Reduction};
use crate::cluster::{
    Assignment, Clustering, HierarchicalClustering, KMeans, Linkage, PointerStrategy,
    DEFAULT_CUTOFF,
};
use crate::distance::{DistanceConfig, Measure, Metric, PlanarMeasure};
use crate::error::{Error, Result};
use crate::point::PointSet;
use crate::progress::{Phase, Progress, ProgressSink};

/// Clustering family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// K-means++ seeding and Lloyd iterations.
    #[default]
    KMeans,
    /// Agglomerative clustering with a linkage rule.
    Hierarchical,
}

/// Optional input reduction ahead of clustering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreAggregation {
    /// Cluster every point directly.
    #[default]
    None,
    /// BIRCH CF-tree leaf entries.
    CfTree(BirchParams),
    /// Radius blobs.
    Blobs(BlobParams),
}

fn default_seed() -> u64 {
    1
}

fn default_cutoff() -> f64 {
    DEFAULT_CUTOFF
}

/// Everything a clustering run needs besides the points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of clusters.
    pub n_clusters: usize,
    /// Clustering family.
    #[serde(default)]
    pub algorithm: Algorithm,
    /// Linkage rule, required for hierarchical runs.
    #[serde(default)]
    pub linkage: Option<Linkage>,
    /// Distance settings.
    #[serde(default)]
    pub distance: DistanceConfig,
    /// K-means and sampling seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// K-means convergence cutoff.
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,
    /// Driver selection for single/complete linkage.
    #[serde(default)]
    pub pointer_strategy: PointerStrategy,
    /// Input reduction.
    #[serde(default)]
    pub pre_aggregation: PreAggregation,
}

impl ClusterConfig {
    /// K-means over planar distance with the default seed and cutoff.
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            algorithm: Algorithm::KMeans,
            linkage: None,
            distance: DistanceConfig::default(),
            seed: default_seed(),
            cutoff: default_cutoff(),
            pointer_strategy: PointerStrategy::Auto,
            pre_aggregation: PreAggregation::None,
        }
    }

    /// Hierarchical clustering with `linkage`.
    pub fn hierarchical(n_clusters: usize, linkage: Linkage) -> Self {
        Self::new(n_clusters)
            .with_algorithm(Algorithm::Hierarchical)
            .with_linkage(linkage)
    }

    /// Set the clustering family.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the linkage rule.
    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = Some(linkage);
        self
    }

    /// Set the distance settings.
    pub fn with_distance(mut self, distance: DistanceConfig) -> Self {
        self.distance = distance;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the K-means cutoff.
    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Set the single/complete driver selection.
    pub fn with_pointer_strategy(mut self, strategy: PointerStrategy) -> Self {
        self.pointer_strategy = strategy;
        self
    }

    /// Set the input reduction.
    pub fn with_pre_aggregation(mut self, pre_aggregation: PreAggregation) -> Self {
        self.pre_aggregation = pre_aggregation;
        self
    }

    /// Check the configuration before touching any point.
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(Error::invalid_parameter("n_clusters", "must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.distance.pz) {
            return Err(Error::invalid_parameter(
                "pz",
                format!("must be within 0..=100, got {}", self.distance.pz),
            ));
        }
        if self.cutoff.is_nan() || self.cutoff <= 0.0 {
            return Err(Error::invalid_parameter(
                "cutoff",
                format!("must be positive, got {}", self.cutoff),
            ));
        }
        if self.algorithm == Algorithm::Hierarchical && self.linkage.is_none() {
            return Err(Error::InvalidLinkage);
        }
        match &self.pre_aggregation {
            PreAggregation::None => Ok(()),
            PreAggregation::CfTree(params) => params.validate(),
            PreAggregation::Blobs(params) => params.validate(),
        }
    }
}

/// K-means over `points`, keyed by point id.
pub fn run_kmeans<M: Measure>(
    points: &PointSet,
    k: usize,
    metric: &Metric<M>,
    seed: u64,
    cutoff: f64,
    sink: &mut dyn ProgressSink,
) -> Result<Assignment> {
    KMeans::with_metric(k, metric.by_ref())
        .with_seed(seed)
        .with_cutoff(cutoff)
        .assign(points, sink)
}

/// Hierarchical clustering over `points`, keyed by point id.
///
/// Single and complete linkage use the pointer algorithms; see
/// [`HierarchicalClustering::with_strategy`] to force the generic driver.
pub fn run_hierarchical<M: Measure>(
    points: &PointSet,
    k: usize,
    metric: &Metric<M>,
    linkage: Option<Linkage>,
    sink: &mut dyn ProgressSink,
) -> Result<Assignment> {
    let linkage = linkage.ok_or(Error::InvalidLinkage)?;
    HierarchicalClustering::with_metric(k, metric.by_ref())
        .with_linkage(linkage)
        .assign(points, sink)
}

/// Reduce `points` to CF-tree representatives.
///
/// Cluster [`Reduction::representatives`] and pass the labels to
/// [`Reduction::expand`] to label the original points.
pub fn run_birch_precompute<M: Measure>(
    points: &PointSet,
    params: &BirchParams,
    metric: &Metric<M>,
    sink: &mut dyn ProgressSink,
) -> Result<Reduction> {
    Birch::with_metric(*params, metric.by_ref()).reduce(points, sink)
}

/// Drives a configured run from raw points to per-point labels.
#[derive(Debug, Clone)]
pub struct ClusterOrchestrator<M = PlanarMeasure> {
    config: ClusterConfig,
    metric: Metric<M>,
}

impl ClusterOrchestrator<PlanarMeasure> {
    /// Orchestrator measuring lines in the Cartesian plane.
    pub fn new(config: ClusterConfig) -> Self {
        Self::with_measure(config, PlanarMeasure)
    }
}

impl<M: Measure> ClusterOrchestrator<M> {
    /// Orchestrator over a host measurement engine.
    pub fn with_measure(config: ClusterConfig, measure: M) -> Self {
        let metric = Metric::new(config.distance, measure);
        Self { config, metric }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Run the whole pipeline.
    ///
    /// Every point id in `points` gets a label. Labels are `0..k` unless a
    /// pre-aggregated cluster ends up owning no original point.
    pub fn run(&self, points: &PointSet, sink: &mut dyn ProgressSink) -> Result<Assignment> {
        self.config.validate()?;
        let k = self.config.n_clusters;
        if points.len() < k {
            return Err(Error::InsufficientPoints {
                requested: k,
                available: points.len(),
            });
        }
        info!(
            points = points.len(),
            k,
            algorithm = ?self.config.algorithm,
            linkage = ?self.config.linkage,
            "clustering run started"
        );
        if self.config.algorithm == Algorithm::KMeans && self.config.linkage.is_some() {
            Progress::new(sink).info("Linkage not used for K-Means");
        }

        let reduction = match self.config.pre_aggregation {
            PreAggregation::None => None,
            PreAggregation::CfTree(params) => Some(
                Birch::with_metric(params, self.metric.by_ref())
                    .reduce(points, &mut Phase::new(sink, 0, 30))?,
            ),
            PreAggregation::Blobs(params) => Some(
                BlobAggregator::with_metric(params, self.metric.by_ref())
                    .with_seed(self.config.seed)
                    .reduce(points, &mut Phase::new(sink, 0, 30))?,
            ),
        };

        let assignment = match reduction {
            None => self.cluster(points, &mut Phase::new(sink, 0, 95))?,
            Some(reduction) => {
                if reduction.len() < k {
                    return Err(Error::InsufficientPoints {
                        requested: k,
                        available: reduction.len(),
                    });
                }
                Progress::new(sink).info(&format!(
                    "{} points reduced to {} representatives",
                    points.len(),
                    reduction.len()
                ));
                let labels =
                    self.cluster(reduction.representatives(), &mut Phase::new(sink, 30, 95))?;
                reduction.expand(&labels)?
            }
        };

        Progress::new(sink).set(100);
        Ok(assignment)
    }

    fn cluster(&self, points: &PointSet, sink: &mut dyn ProgressSink) -> Result<Assignment> {
        let k = self.config.n_clusters;
        match self.config.algorithm {
            Algorithm::KMeans => run_kmeans(
                points,
                k,
                &self.metric,
                self.config.seed,
                self.config.cutoff,
                sink,
            ),
            Algorithm::Hierarchical => {
                let linkage = self.config.linkage.ok_or(Error::InvalidLinkage)?;
                HierarchicalClustering::with_metric(k, self.metric.by_ref())
                    .with_linkage(linkage)
                    .with_strategy(self.config.pointer_strategy)
                    .assign(points, sink)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::groups;
    use crate::progress::{NoProgress, RecordingProgress};

    fn blocks() -> PointSet {
        let mut xy = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (100.0, 0.0), (0.0, 100.0)] {
            for i in 0..20 {
                xy.push([cx + (i % 5) as f64 * 0.5, cy + (i / 5) as f64 * 0.5]);
            }
        }
        PointSet::from_xy(&xy)
    }

    #[test]
    fn config_validation() {
        assert!(ClusterConfig::new(2).validate().is_ok());
        assert!(ClusterConfig::new(0).validate().is_err());
        assert_eq!(
            ClusterConfig::new(2)
                .with_algorithm(Algorithm::Hierarchical)
                .validate(),
            Err(Error::InvalidLinkage)
        );
        assert!(ClusterConfig::new(2).with_cutoff(0.0).validate().is_err());
        assert!(ClusterConfig::new(2).with_cutoff(f64::NAN).validate().is_err());

        let mut config = ClusterConfig::new(2);
        config.distance.pz = 150.0;
        assert!(config.validate().is_err());

        let bad = PreAggregation::CfTree(BirchParams::default().with_branching_factor(1));
        assert!(ClusterConfig::new(2).with_pre_aggregation(bad).validate().is_err());
    }

    #[test]
    fn insufficient_points_checked_first() {
        let err = ClusterOrchestrator::new(ClusterConfig::new(5))
            .run(&PointSet::from_xy(&[[0.0, 0.0], [1.0, 1.0]]), &mut NoProgress)
            .unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientPoints {
                requested: 5,
                available: 2
            }
        );
    }

    #[test]
    fn linkage_with_kmeans_is_reported() {
        let mut sink = RecordingProgress::new();
        let config = ClusterConfig::new(3).with_linkage(Linkage::Ward);
        ClusterOrchestrator::new(config).run(&blocks(), &mut sink).unwrap();
        assert_eq!(sink.messages[0], "Linkage not used for K-Means");
    }

    #[test]
    fn hierarchical_run() {
        let config = ClusterConfig::hierarchical(3, Linkage::Average);
        let assignment = ClusterOrchestrator::new(config).run(&blocks(), &mut NoProgress).unwrap();
        let mut sizes: Vec<usize> = groups(&assignment).iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![20, 20, 20]);
    }

    #[test]
    fn cf_tree_pipeline_labels_every_point() {
        let params = BirchParams::default()
            .with_branching_factor(3)
            .with_max_node_entries(4)
            .with_threshold(1.0);
        let config = ClusterConfig::hierarchical(3, Linkage::Ward)
            .with_pre_aggregation(PreAggregation::CfTree(params));
        let points = blocks();
        let mut sink = RecordingProgress::new();
        let assignment = ClusterOrchestrator::new(config).run(&points, &mut sink).unwrap();

        assert_eq!(assignment.len(), points.len());
        let mut sizes: Vec<usize> = groups(&assignment).iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![20, 20, 20]);
        assert!(sink.percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(sink.percents.last(), Some(&100));
    }

    #[test]
    fn blob_pipeline_labels_every_point() {
        let config = ClusterConfig::new(3)
            .with_seed(7)
            .with_pre_aggregation(PreAggregation::Blobs(BlobParams::default()));
        let points = blocks();
        let assignment = ClusterOrchestrator::new(config).run(&points, &mut NoProgress).unwrap();
        assert_eq!(assignment.len(), points.len());
        assert!(groups(&assignment).len() <= 3);
    }

    #[test]
    fn too_few_representatives() {
        // one CF entry swallows everything
        let params = BirchParams::default().with_threshold(1e6);
        let config = ClusterConfig::hierarchical(2, Linkage::Single)
            .with_pre_aggregation(PreAggregation::CfTree(params));
        let err = ClusterOrchestrator::new(config)
            .run(&blocks(), &mut NoProgress)
            .unwrap_err();
        assert_eq!(
            err,
            Error::InsufficientPoints {
                requested: 2,
                available: 1
            }
        );
    }

    #[test]
    fn single_stage_entry_points() {
        let metric = Metric::default();
        let points = blocks();
        let km = run_kmeans(&points, 3, &metric, 1, DEFAULT_CUTOFF, &mut NoProgress).unwrap();
        assert_eq!(km.len(), 60);
        assert_eq!(
            run_hierarchical(&points, 3, &metric, None, &mut NoProgress),
            Err(Error::InvalidLinkage)
        );

        let reduction =
            run_birch_precompute(&points, &BirchParams::default(), &metric, &mut NoProgress)
                .unwrap();
        let labels = run_hierarchical(
            reduction.representatives(),
            3,
            &metric,
            Some(Linkage::Complete),
            &mut NoProgress,
        )
        .unwrap();
        let expanded = reduction.expand(&labels).unwrap();
        assert_eq!(expanded.len(), 60);
    }

    #[test]
    fn cancellation_propagates() {
        let mut sink = RecordingProgress::cancel_after(0);
        let err = ClusterOrchestrator::new(ClusterConfig::hierarchical(3, Linkage::Centroid))
            .run(&blocks(), &mut sink)
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }
}
