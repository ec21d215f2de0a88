//! Clustering features.
//!
//! A clustering feature summarizes a set of points as `(N, LS, SS)`: count,
//! per-axis linear sum and total squared magnitude. Two features add
//! componentwise, so a summary never needs its raw points again.
//!
//! Points are summed in the weighted [`FeatureSpace`] of the run's distance
//! config, so the closed-form radius and diameter already reflect the
//! spatial/scalar blend.
//!
//! # Derived quantities
//!
//! ```text
//! centroid  c = LS / N
//! radius    R = sqrt((SS - 2·LS·c + N·c·c) / N)
//! diameter  D = sqrt((2N·SS - 2·|LS|²) / (N(N-1)))
//! ```

use std::cell::OnceCell;
use std::fmt;
use std::ops::{Add, AddAssign};

use ndarray::Array1;

use crate::distance::{FeatureSpace, Measure, Metric};
use crate::point::Coordinate;

/// Absolute tolerance used by `==` on features.
pub const FEATURE_TOLERANCE: f64 = 1e-5;

/// Numerators below this make the diameter exactly zero.
const DIAMETER_FLOOR: f64 = 1e-9;

/// Clustering feature of a set of points.
#[derive(Clone)]
pub struct CfEntry {
    number_points: usize,
    linear_sum: Array1<f64>,
    square_sum: f64,
    centroid: OnceCell<Array1<f64>>,
    radius: OnceCell<f64>,
    diameter: OnceCell<f64>,
}

impl CfEntry {
    /// Feature from raw sums.
    pub fn new(number_points: usize, linear_sum: Array1<f64>, square_sum: f64) -> Self {
        Self {
            number_points,
            linear_sum,
            square_sum,
            centroid: OnceCell::new(),
            radius: OnceCell::new(),
            diameter: OnceCell::new(),
        }
    }

    /// Feature of a single point in the weighted space.
    pub fn from_point(point: &Coordinate, space: &FeatureSpace) -> Self {
        let ls = Array1::from(space.project(point).to_vec());
        let ss = ls.dot(&ls);
        Self::new(1, ls, ss)
    }

    /// Number of points summarized.
    #[inline]
    pub fn number_points(&self) -> usize {
        self.number_points
    }

    /// Per-axis linear sum.
    #[inline]
    pub fn linear_sum(&self) -> &Array1<f64> {
        &self.linear_sum
    }

    /// Sum of squared magnitudes.
    #[inline]
    pub fn square_sum(&self) -> f64 {
        self.square_sum
    }

    fn invalidate(&mut self) {
        self.centroid = OnceCell::new();
        self.radius = OnceCell::new();
        self.diameter = OnceCell::new();
    }

    /// Mean in the weighted space.
    pub fn centroid(&self) -> &Array1<f64> {
        self.centroid
            .get_or_init(|| &self.linear_sum / self.number_points.max(1) as f64)
    }

    /// Centroid mapped back to coordinates.
    pub fn centroid_coordinate(&self, space: &FeatureSpace) -> Coordinate {
        space.unproject(self.centroid().as_slice().unwrap_or(&[0.0; 3]))
    }

    /// Root mean squared distance of the members from the centroid.
    pub fn radius(&self) -> f64 {
        *self.radius.get_or_init(|| {
            if self.number_points == 0 {
                return 0.0;
            }
            let n = self.number_points as f64;
            let c = self.centroid();
            let value = (self.square_sum - 2.0 * self.linear_sum.dot(c) + n * c.dot(c)) / n;
            value.max(0.0).sqrt()
        })
    }

    /// Root mean squared pairwise distance of the members.
    pub fn diameter(&self) -> f64 {
        *self.diameter.get_or_init(|| {
            if self.number_points <= 1 {
                return 0.0;
            }
            let n = self.number_points as f64;
            let part = 2.0 * n * self.square_sum - 2.0 * self.linear_sum.dot(&self.linear_sum);
            if part < DIAMETER_FLOOR {
                0.0
            } else {
                (part / (n * (n - 1.0))).sqrt()
            }
        })
    }

    /// Configured distance between the two centroids.
    pub fn distance<M: Measure>(&self, other: &CfEntry, metric: &Metric<M>) -> f64 {
        let space = metric.config().feature_space();
        metric.distance(
            &self.centroid_coordinate(&space),
            &other.centroid_coordinate(&space),
        )
    }

    /// Average distance between members of `self` and members of `other`.
    pub fn average_inter_cluster_distance(&self, other: &CfEntry) -> f64 {
        let (n1, n2) = (self.number_points as f64, other.number_points as f64);
        let cross = self.linear_sum.dot(&other.linear_sum);
        let value = (n2 * self.square_sum - 2.0 * cross + n1 * other.square_sum) / (n1 * n2);
        value.max(0.0).sqrt()
    }

    /// Average pairwise distance inside the union of `self` and `other`.
    pub fn average_intra_cluster_distance(&self, other: &CfEntry) -> f64 {
        let n = (self.number_points + other.number_points) as f64;
        if n <= 1.0 {
            return 0.0;
        }
        let ls = &self.linear_sum + &other.linear_sum;
        let value =
            (2.0 * n * (self.square_sum + other.square_sum) - 2.0 * ls.dot(&ls)) / (n * (n - 1.0));
        value.max(0.0).sqrt()
    }

    /// Increase in within-cluster squared error caused by merging.
    pub fn variance_increase_distance(&self, other: &CfEntry) -> f64 {
        (self + other).squared_error() - self.squared_error() - other.squared_error()
    }

    fn squared_error(&self) -> f64 {
        if self.number_points == 0 {
            return 0.0;
        }
        self.square_sum - self.linear_sum.dot(&self.linear_sum) / self.number_points as f64
    }

    /// Componentwise comparison with a tolerance relative to magnitude.
    pub fn approx_eq(&self, other: &CfEntry, rel: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= rel * 1f64.max(a.abs()).max(b.abs());
        self.number_points == other.number_points
            && self.linear_sum.len() == other.linear_sum.len()
            && close(self.square_sum, other.square_sum)
            && self
                .linear_sum
                .iter()
                .zip(other.linear_sum.iter())
                .all(|(&a, &b)| close(a, b))
    }
}

impl PartialEq for CfEntry {
    fn eq(&self, other: &Self) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() < FEATURE_TOLERANCE;
        self.number_points == other.number_points
            && self.linear_sum.len() == other.linear_sum.len()
            && close(self.square_sum, other.square_sum)
            && self
                .linear_sum
                .iter()
                .zip(other.linear_sum.iter())
                .all(|(&a, &b)| close(a, b))
    }
}

impl AddAssign<&CfEntry> for CfEntry {
    fn add_assign(&mut self, rhs: &CfEntry) {
        self.number_points += rhs.number_points;
        self.linear_sum += &rhs.linear_sum;
        self.square_sum += rhs.square_sum;
        self.invalidate();
    }
}

impl Add<&CfEntry> for &CfEntry {
    type Output = CfEntry;

    fn add(self, rhs: &CfEntry) -> CfEntry {
        CfEntry::new(
            self.number_points + rhs.number_points,
            &self.linear_sum + &rhs.linear_sum,
            self.square_sum + rhs.square_sum,
        )
    }
}

impl fmt::Debug for CfEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CfEntry")
            .field("n", &self.number_points)
            .field("ls", &self.linear_sum.as_slice())
            .field("ss", &self.square_sum)
            .field("d", &self.diameter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceConfig;

    fn entry(points: &[[f64; 2]]) -> CfEntry {
        let space = DistanceConfig::planar().feature_space();
        let mut it = points.iter();
        let first = it.next().unwrap();
        let mut acc = CfEntry::from_point(&Coordinate::new(first[0], first[1]), &space);
        for p in it {
            acc += &CfEntry::from_point(&Coordinate::new(p[0], p[1]), &space);
        }
        acc
    }

    #[test]
    fn singleton_has_zero_spread() {
        let e = entry(&[[3.0, 4.0]]);
        assert_eq!(e.number_points(), 1);
        assert_eq!(e.square_sum(), 25.0);
        assert_eq!(e.radius(), 0.0);
        assert_eq!(e.diameter(), 0.0);
    }

    #[test]
    fn two_points() {
        let e = entry(&[[0.0, 0.0], [2.0, 0.0]]);
        assert_eq!(e.centroid().as_slice().unwrap(), &[1.0, 0.0, 0.0]);
        assert!((e.radius() - 1.0).abs() < 1e-12);
        // sqrt(2·2·4 - 2·4) / sqrt(2) = 2
        assert!((e.diameter() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn caches_are_invalidated() {
        let space = DistanceConfig::planar().feature_space();
        let mut e = entry(&[[0.0, 0.0]]);
        assert_eq!(e.diameter(), 0.0);
        e += &CfEntry::from_point(&Coordinate::new(0.0, 2.0), &space);
        assert!((e.diameter() - 2.0).abs() < 1e-12);
        assert_eq!(e.centroid().as_slice().unwrap(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn addition_is_associative_and_commutative() {
        let a = entry(&[[0.1, 0.2]]);
        let b = entry(&[[5.0, -1.0], [2.0, 2.0]]);
        let c = entry(&[[7.5, 3.25]]);
        let left = &(&a + &b) + &c;
        let right = &a + &(&b + &c);
        let swapped = &a + &(&c + &b);
        assert_eq!(left, right);
        assert_eq!(right, swapped);
    }

    #[test]
    fn equality_uses_tolerance() {
        let a = CfEntry::new(2, Array1::from(vec![1.0, 2.0, 0.0]), 5.0);
        let b = CfEntry::new(2, Array1::from(vec![1.000001, 2.0, 0.0]), 5.000001);
        let c = CfEntry::new(2, Array1::from(vec![1.001, 2.0, 0.0]), 5.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn distance_family() {
        let a = entry(&[[0.0, 0.0], [0.0, 2.0]]);
        let b = entry(&[[4.0, 0.0], [4.0, 2.0]]);
        let metric = Metric::planar(DistanceConfig::planar());
        assert!((a.distance(&b, &metric) - 4.0).abs() < 1e-12);

        // mean squared cross distance = (16 + 20 + 20 + 16) / 4 = 18
        assert!((a.average_inter_cluster_distance(&b) - 18f64.sqrt()).abs() < 1e-12);

        // merged SSE = 4·(4 + 1) = 20, each part SSE = 2
        assert!((a.variance_increase_distance(&b) - 16.0).abs() < 1e-12);

        let merged = &a + &b;
        assert!((a.average_intra_cluster_distance(&b) - merged.diameter()).abs() < 1e-12);
    }

    #[test]
    fn weighted_space_uses_pz() {
        let config = DistanceConfig::planar().with_pz(50.0);
        let space = config.feature_space();
        let e = CfEntry::from_point(&Coordinate::new(2.0, 4.0).with_z(6.0), &space);
        assert_eq!(e.linear_sum().as_slice().unwrap(), &[1.0, 2.0, 3.0]);
        let back = e.centroid_coordinate(&space);
        assert!((back.z - 6.0).abs() < 1e-12);
    }
}
