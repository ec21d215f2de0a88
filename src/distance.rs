//! Mixed spatial/scalar distance.
//!
//! The engines never measure lines themselves. A host supplies a [`Measure`]
//! (planar, ellipsoidal, projected...) and [`Metric`] blends its result with
//! the scalar dimension of each point.
//!
//! # Blending
//!
//! With `w = pz / 100`:
//!
//! ```text
//! planar     d = (1 - w) · measure(p, q)                + w · |z_p - z_q|
//! manhattan  d = (1 - w) · (sum of four right-angle legs) + 2w · |z_p - z_q|
//! ```
//!
//! The manhattan spatial part walks both right-angle detours between the two
//! points, so it is twice the axis-aligned distance under a planar measure.
//! Doubling the scalar term keeps `pz` a comparable fraction in both modes.
//! `pz = 0` collapses exactly to the pure 2D distance.

use serde::{Deserialize, Serialize};

use crate::point::Coordinate;

/// Line measurement between two planar positions.
///
/// This is the host's measurement engine; implementations may be geodesic.
pub trait Measure {
    /// Length of the line from `a` to `b`.
    fn measure_line(&self, a: [f64; 2], b: [f64; 2]) -> f64;
}

/// Straight Cartesian measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanarMeasure;

impl Measure for PlanarMeasure {
    #[inline]
    fn measure_line(&self, a: [f64; 2], b: [f64; 2]) -> f64 {
        (a[0] - b[0]).hypot(a[1] - b[1])
    }
}

impl<M: Measure + ?Sized> Measure for &M {
    #[inline]
    fn measure_line(&self, a: [f64; 2], b: [f64; 2]) -> f64 {
        (**self).measure_line(a, b)
    }
}

/// How the spatial component is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMode {
    /// Direct line measurement.
    #[default]
    Planar,
    /// Right-angle detours along both axis orders.
    Manhattan,
}

/// Distance settings shared by every engine in a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceConfig {
    /// Spatial measurement mode.
    pub mode: DistanceMode,
    /// Percentage (0-100) contribution of the scalar dimension.
    pub pz: f64,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            mode: DistanceMode::Planar,
            pz: 0.0,
        }
    }
}

impl DistanceConfig {
    /// Create a config with no scalar contribution.
    pub fn new(mode: DistanceMode) -> Self {
        Self { mode, pz: 0.0 }
    }

    /// Planar measurement, no scalar contribution.
    pub fn planar() -> Self {
        Self::new(DistanceMode::Planar)
    }

    /// Manhattan measurement, no scalar contribution.
    pub fn manhattan() -> Self {
        Self::new(DistanceMode::Manhattan)
    }

    /// Set the scalar percentage, clamped to `[0, 100]`.
    pub fn with_pz(mut self, pz: f64) -> Self {
        self.pz = if pz.is_nan() { 0.0 } else { pz.clamp(0.0, 100.0) };
        self
    }

    /// Whether the manhattan mode is selected.
    #[inline]
    pub fn is_manhattan(&self) -> bool {
        self.mode == DistanceMode::Manhattan
    }

    /// Fractional weight of the scalar dimension.
    #[inline]
    pub fn scalar_weight(&self) -> f64 {
        0.01 * self.pz
    }

    /// Fractional weight of the spatial dimensions.
    #[inline]
    pub fn spatial_weight(&self) -> f64 {
        1.0 - self.scalar_weight()
    }

    /// Weighted embedding used by clustering features.
    pub fn feature_space(&self) -> FeatureSpace {
        FeatureSpace {
            spatial: self.spatial_weight(),
            scalar: self.scalar_weight(),
        }
    }
}

/// Linear embedding `(x, y, z) -> (ws·x, ws·y, wz·z)`.
///
/// Clustering features sum points in this space so that the closed-form
/// diameter reflects the configured blend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSpace {
    /// Weight of x and y.
    pub spatial: f64,
    /// Weight of z.
    pub scalar: f64,
}

impl FeatureSpace {
    /// Dimension of the embedding.
    pub const DIM: usize = 3;

    /// Map a coordinate into the weighted space.
    #[inline]
    pub fn project(&self, c: &Coordinate) -> [f64; 3] {
        [self.spatial * c.x, self.spatial * c.y, self.scalar * c.z]
    }

    /// Map a weighted vector back. Axes with zero weight come back as zero.
    #[inline]
    pub fn unproject(&self, v: &[f64]) -> Coordinate {
        let undo = |value: f64, weight: f64| if weight > 0.0 { value / weight } else { 0.0 };
        Coordinate::new(undo(v[0], self.spatial), undo(v[1], self.spatial))
            .with_z(undo(v[2], self.scalar))
    }
}

/// A [`DistanceConfig`] bound to a measurement engine.
#[derive(Debug, Clone)]
pub struct Metric<M = PlanarMeasure> {
    config: DistanceConfig,
    measure: M,
}

impl Metric<PlanarMeasure> {
    /// Metric over the Cartesian plane.
    pub fn planar(config: DistanceConfig) -> Self {
        Self::new(config, PlanarMeasure)
    }
}

impl Default for Metric<PlanarMeasure> {
    fn default() -> Self {
        Self::planar(DistanceConfig::default())
    }
}

impl<M: Measure> Metric<M> {
    /// Bind a config to a measurement engine.
    pub fn new(config: DistanceConfig, measure: M) -> Self {
        Self { config, measure }
    }

    /// The distance settings.
    #[inline]
    pub fn config(&self) -> &DistanceConfig {
        &self.config
    }

    /// The measurement engine.
    #[inline]
    pub fn measure(&self) -> &M {
        &self.measure
    }

    /// Borrow the measurement engine, for engines that want to own a metric.
    pub fn by_ref(&self) -> Metric<&M> {
        Metric::new(self.config, &self.measure)
    }

    /// Spatial-only distance for the configured mode.
    pub fn spatial(&self, p: &Coordinate, q: &Coordinate) -> f64 {
        match self.config.mode {
            DistanceMode::Planar => self.measure.measure_line(p.xy(), q.xy()),
            DistanceMode::Manhattan => {
                let corner_a = [q.x, p.y];
                let corner_b = [p.x, q.y];
                self.measure.measure_line(p.xy(), corner_a)
                    + self.measure.measure_line(p.xy(), corner_b)
                    + self.measure.measure_line(q.xy(), corner_a)
                    + self.measure.measure_line(q.xy(), corner_b)
            }
        }
    }

    /// Blended distance between two points.
    pub fn distance(&self, p: &Coordinate, q: &Coordinate) -> f64 {
        let spatial = self.spatial(p, q);
        let dz = (p.z - q.z).abs();
        let w = self.config.scalar_weight();
        if w == 0.0 {
            return spatial;
        }
        match self.config.mode {
            DistanceMode::Planar => (1.0 - w) * spatial + w * dz,
            DistanceMode::Manhattan => (1.0 - w) * spatial + 2.0 * w * dz,
        }
    }
}
