//! BIRCH pre-aggregation: build a CF-tree over every point, rebuilding with
//! a larger threshold whenever the tree holds too many entries.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cf_tree::CfTree;
use super::Reduction;
use crate::distance::{Measure, Metric, PlanarMeasure};
use crate::error::{Error, Result};
use crate::point::{Coordinate, PointSet};
use crate::progress::{Progress, ProgressSink};

/// CF-tree construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BirchParams {
    /// Maximum children per non-leaf node.
    pub branching_factor: usize,
    /// Maximum entries per leaf node.
    pub max_node_entries: usize,
    /// Initial diameter threshold for absorbing a point into an entry.
    pub threshold: f64,
    /// Rebuild once the tree holds more entries than this.
    pub entry_size_limit: usize,
    /// Threshold growth factor on rebuild.
    pub diameter_multiplier: f64,
}

impl Default for BirchParams {
    fn default() -> Self {
        Self {
            branching_factor: 50,
            max_node_entries: 200,
            threshold: 0.5,
            entry_size_limit: 1000,
            diameter_multiplier: 1.5,
        }
    }
}

impl BirchParams {
    /// Set the branching factor.
    pub fn with_branching_factor(mut self, branching_factor: usize) -> Self {
        self.branching_factor = branching_factor;
        self
    }

    /// Set the leaf capacity.
    pub fn with_max_node_entries(mut self, max_node_entries: usize) -> Self {
        self.max_node_entries = max_node_entries;
        self
    }

    /// Set the initial threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the entry cap.
    pub fn with_entry_size_limit(mut self, entry_size_limit: usize) -> Self {
        self.entry_size_limit = entry_size_limit;
        self
    }

    /// Set the rebuild growth factor.
    pub fn with_diameter_multiplier(mut self, diameter_multiplier: f64) -> Self {
        self.diameter_multiplier = diameter_multiplier;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.branching_factor < 2 {
            return Err(Error::invalid_parameter(
                "branching_factor",
                "must be at least 2",
            ));
        }
        if self.max_node_entries == 0 {
            return Err(Error::invalid_parameter(
                "max_node_entries",
                "must be at least 1",
            ));
        }
        if !(self.threshold >= 0.0 && self.threshold.is_finite()) {
            return Err(Error::invalid_parameter(
                "threshold",
                format!("must be finite and non-negative, got {}", self.threshold),
            ));
        }
        if self.entry_size_limit == 0 {
            return Err(Error::invalid_parameter(
                "entry_size_limit",
                "must be at least 1",
            ));
        }
        if !(self.diameter_multiplier > 1.0 && self.diameter_multiplier.is_finite()) {
            return Err(Error::invalid_parameter(
                "diameter_multiplier",
                format!("must be greater than 1, got {}", self.diameter_multiplier),
            ));
        }
        Ok(())
    }
}

/// CF-tree builder with rebuild-on-overflow.
#[derive(Debug, Clone)]
pub struct Birch<M = PlanarMeasure> {
    params: BirchParams,
    metric: Metric<M>,
}

impl Birch<PlanarMeasure> {
    /// Builder over a planar Euclidean metric.
    pub fn new(params: BirchParams) -> Self {
        Self::with_metric(params, Metric::default())
    }
}

impl<M: Measure + Clone> Birch<M> {
    /// Builder over `metric`.
    pub fn with_metric(params: BirchParams, metric: Metric<M>) -> Self {
        Self { params, metric }
    }

    /// The parameters in use.
    pub fn params(&self) -> &BirchParams {
        &self.params
    }

    fn empty_tree(&self, threshold: f64) -> CfTree<M> {
        CfTree::new(
            self.params.branching_factor,
            self.params.max_node_entries,
            threshold,
            self.metric.clone(),
        )
    }

    /// Insert every point, in order, into a CF-tree.
    ///
    /// Polls for cancellation once per point.
    pub fn build(&self, points: &PointSet, sink: &mut dyn ProgressSink) -> Result<CfTree<M>> {
        self.params.validate()?;
        if points.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut progress = Progress::new(sink);
        let coords = points.coords();
        let n = coords.len();

        let mut tree = self.empty_tree(self.params.threshold);
        for (i, point) in coords.iter().enumerate() {
            progress.checkpoint()?;
            tree.insert_point(point);
            if tree.amount_entries() > self.params.entry_size_limit {
                tree = self.rebuild(&coords[..=i], tree.threshold(), &mut progress)?;
            }
            progress.fraction(i + 1, n, 0, 90);
        }

        debug!(
            points = n,
            entries = tree.amount_entries(),
            nodes = tree.amount_nodes(),
            height = tree.height(),
            threshold = tree.threshold(),
            "cf-tree built"
        );
        Ok(tree)
    }

    /// Replay `prefix` into fresh trees with growing thresholds until the
    /// entry cap holds.
    fn rebuild(
        &self,
        prefix: &[Coordinate],
        threshold: f64,
        progress: &mut Progress<'_>,
    ) -> Result<CfTree<M>> {
        let mut diameter = threshold * self.params.diameter_multiplier;
        loop {
            progress.checkpoint()?;
            if diameter == 0.0 {
                diameter = 1.0;
            }
            let mut tree = self.empty_tree(diameter);
            let mut fits = true;
            for point in prefix {
                tree.insert_point(point);
                if tree.amount_entries() > self.params.entry_size_limit {
                    fits = false;
                    break;
                }
            }
            if fits {
                progress.info(&format!(
                    "CF-tree rebuilt with threshold {diameter} after {} points",
                    prefix.len()
                ));
                return Ok(tree);
            }
            debug!(threshold = diameter, "cf-tree still over the entry cap");
            diameter *= self.params.diameter_multiplier;
        }
    }

    /// Build the tree and reduce the points to its leaf-entry centroids.
    pub fn reduce(&self, points: &PointSet, sink: &mut dyn ProgressSink) -> Result<Reduction> {
        let tree = self.build(points, sink)?;
        let centroids = tree.centroids();
        Reduction::nearest(points, centroids, self.metric.config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HealthCheck;
    use crate::progress::{NoProgress, RecordingProgress};

    fn spread(n: usize) -> PointSet {
        let xy: Vec<[f64; 2]> = (0..n)
            .map(|i| [(i % 20) as f64, (i / 20) as f64])
            .collect();
        PointSet::from_xy(&xy)
    }

    #[test]
    fn defaults_validate() {
        assert!(BirchParams::default().validate().is_ok());
        assert!(BirchParams::default().with_branching_factor(1).validate().is_err());
        assert!(BirchParams::default().with_diameter_multiplier(1.0).validate().is_err());
        assert!(BirchParams::default().with_threshold(-1.0).validate().is_err());
        assert!(BirchParams::default().with_entry_size_limit(0).validate().is_err());
    }

    #[test]
    fn no_rebuild_under_the_cap() {
        let params = BirchParams::default().with_threshold(0.1);
        let tree = Birch::new(params).build(&spread(100), &mut NoProgress).unwrap();
        assert_eq!(tree.threshold(), 0.1);
        assert_eq!(tree.amount_entries(), 100);
        assert!(tree.is_healthy());
    }

    #[test]
    fn rebuild_grows_threshold_until_cap_holds() {
        let params = BirchParams::default()
            .with_branching_factor(4)
            .with_max_node_entries(5)
            .with_threshold(0.0)
            .with_entry_size_limit(20);
        let mut sink = RecordingProgress::new();
        let tree = Birch::new(params).build(&spread(200), &mut sink).unwrap();
        assert!(tree.threshold() >= 1.0);
        assert!(tree.amount_entries() <= 20);
        assert_eq!(tree.amount_points(), 200);
        assert!(tree.is_healthy());
        assert!(sink.messages.iter().any(|m| m.starts_with("CF-tree rebuilt")));
        assert_eq!(sink.percents.last(), Some(&90));
    }

    #[test]
    fn reduction_covers_every_point() {
        let params = BirchParams::default()
            .with_threshold(1.5)
            .with_branching_factor(3)
            .with_max_node_entries(4);
        let points = spread(60);
        let reduction = Birch::new(params).reduce(&points, &mut NoProgress).unwrap();
        assert!(reduction.len() < points.len());
        assert_eq!(reduction.owners().len(), points.len());
        assert!(reduction.owners().iter().all(|&(_, r)| r < reduction.len()));
    }

    #[test]
    fn cancellation_per_point() {
        let mut sink = RecordingProgress::cancel_after(5);
        let err = Birch::new(BirchParams::default())
            .build(&spread(50), &mut sink)
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }

    #[test]
    fn empty_input() {
        let err = Birch::new(BirchParams::default())
            .build(&PointSet::new(), &mut NoProgress)
            .unwrap_err();
        assert_eq!(err, Error::EmptyInput);
    }
}
