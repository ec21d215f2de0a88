//! Pre-aggregation of large point sets.
//!
//! The hierarchical driver is cubic in the number of points. Both
//! aggregators here shrink the input to a bounded set of representatives,
//! which is clustered instead; the labels are then carried back to every
//! original point.
//!
//! | Aggregator | Representatives | Back-mapping |
//! |------------|-----------------|--------------|
//! | [`Birch`] | CF-tree leaf-entry centroids | nearest centroid in the weighted space |
//! | [`BlobAggregator`] | running means of radius blobs | blob membership |
//!
//! ```rust
//! use geoclust::aggregate::{BlobAggregator, BlobParams};
//! use geoclust::{NoProgress, PointSet};
//!
//! let xy: Vec<[f64; 2]> = (0..100).map(|i| [(i % 10) as f64, (i / 10) as f64]).collect();
//! let points = PointSet::from_xy(&xy);
//!
//! let reduction = BlobAggregator::new(BlobParams::default())
//!     .reduce(&points, &mut NoProgress)
//!     .unwrap();
//! assert!(reduction.len() <= points.len());
//! ```

mod birch;
mod blobs;
mod cf_entry;
mod cf_tree;

pub use birch::{Birch, BirchParams};
pub use blobs::{Blob, BlobAggregator, BlobParams};
pub use cf_entry::{CfEntry, FEATURE_TOLERANCE};
pub use cf_tree::{CfNode, CfNodeKind, CfTree};

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2, Axis};
use tracing::warn;

use crate::cluster::Assignment;
use crate::distance::DistanceConfig;
use crate::error::{Error, Result};
use crate::point::{Coordinate, PointId, PointSet};

/// A point set shrunk to representatives.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    representatives: PointSet,
    owners: Vec<(PointId, usize)>,
}

impl Reduction {
    /// Representatives keyed `0..len`, with an owner per original point.
    pub fn new(representatives: Vec<Coordinate>, owners: Vec<(PointId, usize)>) -> Self {
        Self {
            representatives: PointSet::from_positions(&representatives),
            owners,
        }
    }

    /// Map every point to its nearest representative.
    ///
    /// Distances are taken in the weighted space of `config`: L1 for the
    /// manhattan mode, squared L2 otherwise. Ties go to the first
    /// representative.
    pub fn nearest(
        points: &PointSet,
        representatives: Vec<Coordinate>,
        config: &DistanceConfig,
    ) -> Result<Self> {
        if representatives.is_empty() {
            return Err(Error::EmptyInput);
        }
        let space = config.feature_space();
        let weighted = |coords: &[Coordinate]| -> Array2<f64> {
            let mut out = Array2::zeros((coords.len(), 3));
            for (mut row, c) in out.axis_iter_mut(Axis(0)).zip(coords) {
                row.assign(&Array1::from(space.project(c).to_vec()));
            }
            out
        };
        let reps = weighted(&representatives);
        let manhattan = config.is_manhattan();

        let owners = points
            .iter()
            .map(|(id, c)| {
                let p = Array1::from(space.project(c).to_vec());
                let diff = &reps - &p;
                let cost = if manhattan {
                    diff.mapv(f64::abs).sum_axis(Axis(1))
                } else {
                    diff.mapv(|v| v * v).sum_axis(Axis(1))
                };
                let mut best = 0;
                for (i, &value) in cost.iter().enumerate() {
                    if value < cost[best] {
                        best = i;
                    }
                }
                (id, best)
            })
            .collect();
        Ok(Self::new(representatives, owners))
    }

    /// Representatives keyed `0..len`.
    pub fn representatives(&self) -> &PointSet {
        &self.representatives
    }

    /// `(original id, representative index)` in original point order.
    pub fn owners(&self) -> &[(PointId, usize)] {
        &self.owners
    }

    /// Number of representatives.
    pub fn len(&self) -> usize {
        self.representatives.len()
    }

    /// Whether there are no representatives.
    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }

    /// Carry representative labels back to the original points.
    ///
    /// A label whose representatives own no original point disappears; the
    /// remaining labels are renumbered `0..` in ascending order.
    pub fn expand(&self, labels: &Assignment) -> Result<Assignment> {
        let mut raw = Vec::with_capacity(self.owners.len());
        for &(id, rep) in &self.owners {
            let label = labels.get(&(rep as PointId)).copied().ok_or_else(|| {
                Error::invalid_parameter("labels", format!("no label for representative {rep}"))
            })?;
            raw.push((id, label));
        }

        let mut compact: BTreeMap<usize, usize> = raw.iter().map(|&(_, l)| (l, 0)).collect();
        for (next, slot) in compact.values_mut().enumerate() {
            *slot = next;
        }
        let before = labels.values().collect::<BTreeSet<_>>().len();
        if compact.len() < before {
            warn!(
                requested = before,
                kept = compact.len(),
                "some clusters lost every point after expansion"
            );
        }
        Ok(raw.into_iter().map(|(id, l)| (id, compact[&l])).collect())
    }
}
