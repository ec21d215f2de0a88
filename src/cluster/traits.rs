//! Clustering traits.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::point::{PointId, PointSet};
use crate::progress::ProgressSink;

/// Cluster label per point id.
pub type Assignment = BTreeMap<PointId, usize>;

/// Trait for clustering algorithms.
pub trait Clustering {
    /// Fit the model to the points and return cluster assignments.
    ///
    /// Returns one label in `0..n_clusters()` per point, in the set's
    /// insertion order.
    fn fit_predict(&self, points: &PointSet, progress: &mut dyn ProgressSink) -> Result<Vec<usize>>;

    /// Get the number of clusters.
    fn n_clusters(&self) -> usize;

    /// Like [`fit_predict`](Self::fit_predict), keyed by point id.
    fn assign(&self, points: &PointSet, progress: &mut dyn ProgressSink) -> Result<Assignment> {
        let labels = self.fit_predict(points, progress)?;
        Ok(points.ids().iter().copied().zip(labels).collect())
    }
}

/// Group point ids by label. Labels with no members are skipped.
pub fn groups(assignment: &Assignment) -> Vec<Vec<PointId>> {
    let mut by_label: BTreeMap<usize, Vec<PointId>> = BTreeMap::new();
    for (&id, &label) in assignment {
        by_label.entry(label).or_default().push(id);
    }
    by_label.into_values().collect()
}
