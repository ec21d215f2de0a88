//! Radius blobs: a one-pass, order-dependent alternative to the CF-tree.
//!
//! The working radius is a low percentile of the pairwise distances in a
//! random sample. Points are then visited in order; each joins the blob with
//! the nearest centroid if that centroid is closer than the radius, and
//! starts a new blob otherwise.

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Reduction;
use crate::distance::{Measure, Metric, PlanarMeasure};
use crate::error::{Error, Result};
use crate::point::{Coordinate, PointId, PointSet};
use crate::progress::{Progress, ProgressSink};

/// Blob aggregation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobParams {
    /// Percentile (0-100) of sampled pairwise distances used as the radius.
    pub percentile: f64,
    /// Number of points sampled to estimate the radius.
    pub sample_size: usize,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            percentile: 5.0,
            sample_size: 250,
        }
    }
}

impl BlobParams {
    /// Set the percentile.
    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = percentile;
        self
    }

    /// Set the sample size.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(Error::invalid_parameter(
                "percentile",
                format!("must be within 0..=100, got {}", self.percentile),
            ));
        }
        if self.sample_size < 2 {
            return Err(Error::invalid_parameter("sample_size", "must be at least 2"));
        }
        Ok(())
    }
}

/// A group of nearby points with a running mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Member ids in visiting order.
    pub members: Vec<PointId>,
    /// Mean of the members.
    pub centroid: Coordinate,
    /// Number of members.
    pub size: usize,
}

impl Blob {
    fn new(id: PointId, point: Coordinate) -> Self {
        Self {
            members: vec![id],
            centroid: point,
            size: 1,
        }
    }

    /// Add a member and move the centroid by `(point - centroid) / size`.
    pub fn push(&mut self, id: PointId, point: &Coordinate) {
        self.members.push(id);
        self.size += 1;
        let step = 1.0 / self.size as f64;
        self.centroid.x += step * (point.x - self.centroid.x);
        self.centroid.y += step * (point.y - self.centroid.y);
        self.centroid.z += step * (point.z - self.centroid.z);
    }
}

/// Radius-based single-pass aggregator.
#[derive(Debug, Clone)]
pub struct BlobAggregator<M = PlanarMeasure> {
    params: BlobParams,
    metric: Metric<M>,
    seed: u64,
}

impl BlobAggregator<PlanarMeasure> {
    /// Aggregator over a planar Euclidean metric.
    pub fn new(params: BlobParams) -> Self {
        Self::with_metric(params, Metric::default())
    }
}

impl<M: Measure> BlobAggregator<M> {
    /// Aggregator over `metric`.
    pub fn with_metric(params: BlobParams, metric: Metric<M>) -> Self {
        Self {
            params,
            metric,
            seed: 1,
        }
    }

    /// Set the seed of the radius sample.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Percentile of pairwise distances in a random sample of the points.
    ///
    /// Percentiles interpolate linearly between neighbouring order
    /// statistics. Fewer than two points give a radius of zero.
    pub fn derive_radius(&self, points: &PointSet) -> f64 {
        let coords = points.coords();
        let n = coords.len();
        if n < 2 {
            return 0.0;
        }

        let sample: Vec<usize> = if n > self.params.sample_size {
            let mut rng = StdRng::seed_from_u64(self.seed);
            rand::seq::index::sample(&mut rng, n, self.params.sample_size).into_vec()
        } else {
            (0..n).collect()
        };

        let mut distances = Vec::with_capacity(sample.len() * (sample.len() - 1) / 2);
        for (a, &i) in sample.iter().enumerate() {
            for &j in &sample[a + 1..] {
                distances.push(self.metric.distance(&coords[i], &coords[j]));
            }
        }
        distances.sort_by(f64::total_cmp);
        percentile(&distances, self.params.percentile)
    }

    /// Group the points into blobs of the given radius.
    ///
    /// Polls for cancellation once per point.
    pub fn create_blobs(
        &self,
        points: &PointSet,
        radius: f64,
        sink: &mut dyn ProgressSink,
    ) -> Result<Vec<Blob>> {
        let mut progress = Progress::new(sink);
        let n = points.len();
        let mut blobs: Vec<Blob> = Vec::new();

        for (done, (id, point)) in points.iter().enumerate() {
            progress.checkpoint()?;
            let mut nearest = None;
            let mut best = f64::MAX;
            for (j, blob) in blobs.iter().enumerate() {
                let d = self.metric.distance(&blob.centroid, point);
                if d < best {
                    best = d;
                    nearest = Some(j);
                }
            }
            match nearest {
                Some(j) if best < radius => blobs[j].push(id, point),
                _ => blobs.push(Blob::new(id, *point)),
            }
            progress.fraction(done + 1, n, 0, 90);
        }

        debug!(points = n, blobs = blobs.len(), radius, "blobs created");
        Ok(blobs)
    }

    /// Derive the radius, build blobs, and reduce the points to their
    /// centroids. Each point is owned by its blob.
    pub fn reduce(&self, points: &PointSet, sink: &mut dyn ProgressSink) -> Result<Reduction> {
        self.params.validate()?;
        if points.is_empty() {
            return Err(Error::EmptyInput);
        }
        let radius = self.derive_radius(points);
        Progress::new(sink).info(&format!("Blob radius: {radius}"));

        let blobs = self.create_blobs(points, radius, sink)?;
        let mut owners: Vec<(PointId, usize)> = Vec::with_capacity(points.len());
        for (index, blob) in blobs.iter().enumerate() {
            owners.extend(blob.members.iter().map(|&id| (id, index)));
        }
        owners.sort_by_key(|&(id, _)| points.position(id));
        let centroids = blobs.iter().map(|b| b.centroid).collect();
        Ok(Reduction::new(centroids, owners))
    }
}

/// Linear-interpolation percentile of sorted values.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = pct.clamp(0.0, 100.0) / 100.0 * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceConfig;
    use crate::progress::{NoProgress, RecordingProgress};

    #[test]
    fn percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert!((percentile(&values, 10.0) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn radius_of_tiny_sets() {
        let agg = BlobAggregator::new(BlobParams::default());
        assert_eq!(agg.derive_radius(&PointSet::from_xy(&[[1.0, 1.0]])), 0.0);
        let pair = PointSet::from_xy(&[[0.0, 0.0], [3.0, 4.0]]);
        assert_eq!(agg.derive_radius(&pair), 5.0);
    }

    #[test]
    fn radius_sample_is_seeded() {
        let xy: Vec<[f64; 2]> = (0..400).map(|i| [(i * 37 % 101) as f64, i as f64]).collect();
        let points = PointSet::from_xy(&xy);
        let params = BlobParams::default().with_sample_size(50);
        let a = BlobAggregator::new(params).with_seed(3).derive_radius(&points);
        let b = BlobAggregator::new(params).with_seed(3).derive_radius(&points);
        assert_eq!(a, b);
    }

    #[test]
    fn blobs_join_within_radius() {
        let points = PointSet::from_xy(&[[0.0, 0.0], [1.0, 0.0], [10.0, 0.0], [0.5, 0.0]]);
        let agg = BlobAggregator::new(BlobParams::default());
        let blobs = agg.create_blobs(&points, 2.0, &mut NoProgress).unwrap();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].members, vec![0, 1, 3]);
        assert_eq!(blobs[0].size, 3);
        assert!((blobs[0].centroid.x - 0.5).abs() < 1e-12);
        assert_eq!(blobs[1].members, vec![2]);
    }

    #[test]
    fn radius_is_strict() {
        let points = PointSet::from_xy(&[[0.0, 0.0], [2.0, 0.0]]);
        let agg = BlobAggregator::new(BlobParams::default());
        let blobs = agg.create_blobs(&points, 2.0, &mut NoProgress).unwrap();
        assert_eq!(blobs.len(), 2);
    }

    #[test]
    fn centroid_tracks_scalar_dimension() {
        let mut blob = Blob::new(0, Coordinate::new(0.0, 0.0).with_z(1.0));
        blob.push(1, &Coordinate::new(2.0, 4.0).with_z(3.0));
        blob.push(2, &Coordinate::new(4.0, 2.0).with_z(8.0));
        assert!((blob.centroid.x - 2.0).abs() < 1e-12);
        assert!((blob.centroid.y - 2.0).abs() < 1e-12);
        assert!((blob.centroid.z - 4.0).abs() < 1e-12);
    }

    #[test]
    fn reduction_owns_by_membership() {
        let metric = Metric::planar(DistanceConfig::manhattan());
        let points = PointSet::from_xy(&[[0.0, 0.0], [50.0, 50.0], [0.1, 0.0], [50.0, 50.1]]);
        let reduction = BlobAggregator::with_metric(BlobParams::default().with_percentile(30.0), metric)
            .reduce(&points, &mut NoProgress)
            .unwrap();
        assert_eq!(reduction.len(), 2);
        assert_eq!(reduction.owners(), &[(0, 0), (1, 1), (2, 0), (3, 1)]);
    }

    #[test]
    fn cancellation_per_point() {
        let points = PointSet::from_xy(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        let mut sink = RecordingProgress::cancel_after(1);
        let err = BlobAggregator::new(BlobParams::default())
            .create_blobs(&points, 1.0, &mut sink)
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }
}
