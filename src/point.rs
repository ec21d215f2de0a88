//! Points and point sets.
//!
//! A [`PointSet`] is the only input the engines accept. It keeps insertion
//! order, which is what makes every engine deterministic: two sets built from
//! the same sequence of points produce identical clusterings.

use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance::{DistanceConfig, DistanceMode};
use crate::error::{Error, FieldProblem, Result};

/// Stable point identifier, unique within one run.
pub type PointId = u64;

/// A position with a scalar dimension.
///
/// `z` is either a height or a standardized attribute value; it only matters
/// when the distance config gives it a non-zero weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Easting.
    pub x: f64,
    /// Northing.
    pub y: f64,
    /// Scalar dimension.
    pub z: f64,
}

impl Coordinate {
    /// Planar coordinate with `z = 0`.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Replace the scalar dimension.
    #[inline]
    pub const fn with_z(mut self, z: f64) -> Self {
        self.z = z;
        self
    }

    /// The planar part.
    #[inline]
    pub const fn xy(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Attribute value carried by a host feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Integer.
    Int(i64),
    /// Floating point.
    Real(f64),
    /// Text.
    Text(String),
    /// Missing value.
    Null,
}

impl AttributeValue {
    /// Numeric value, `None` for null.
    fn numeric(&self) -> std::result::Result<Option<f64>, FieldProblem> {
        match self {
            AttributeValue::Int(v) => Ok(Some(*v as f64)),
            AttributeValue::Real(v) if v.is_nan() => Ok(None),
            AttributeValue::Real(v) => Ok(Some(*v)),
            AttributeValue::Null => Ok(None),
            AttributeValue::Text(_) => Err(FieldProblem::NonNumeric),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Real(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

/// A host feature before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Identifier.
    pub id: PointId,
    /// Easting.
    pub x: f64,
    /// Northing.
    pub y: f64,
    /// Named attributes.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Feature {
    /// Feature without attributes.
    pub fn new(id: PointId, x: f64, y: f64) -> Self {
        Self {
            id,
            x,
            y,
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Insertion-ordered mapping from point id to coordinate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    ids: Vec<PointId>,
    coords: Vec<Coordinate>,
    index: HashMap<PointId, usize>,
}

impl PointSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty set with room for `n` points.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            ids: Vec::with_capacity(n),
            coords: Vec::with_capacity(n),
            index: HashMap::with_capacity(n),
        }
    }

    /// Build from `(id, coordinate)` pairs, keeping their order.
    pub fn from_coordinates<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = (PointId, Coordinate)>,
    {
        let iter = points.into_iter();
        let mut set = Self::with_capacity(iter.size_hint().0);
        for (id, c) in iter {
            set.push(id, c)?;
        }
        Ok(set)
    }

    /// Build from planar positions with ids `0..n`.
    pub fn from_xy(points: &[[f64; 2]]) -> Self {
        let mut set = Self::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            set.ids.push(i as PointId);
            set.coords.push(Coordinate::new(p[0], p[1]));
            set.index.insert(i as PointId, i);
        }
        set
    }

    /// Build from coordinates with ids `0..n`.
    pub fn from_positions(coords: &[Coordinate]) -> Self {
        Self {
            ids: (0..coords.len() as PointId).collect(),
            coords: coords.to_vec(),
            index: (0..coords.len()).map(|i| (i as PointId, i)).collect(),
        }
    }

    /// Normalize host features.
    ///
    /// With `pz > 0` and a `field`, the field's values become the scalar
    /// dimension: features with a null value are dropped and the remaining
    /// values are standardized to the spread of the planar positions. Without
    /// a field every point gets `z = 0`.
    pub fn from_features(
        features: &[Feature],
        field: Option<&str>,
        config: &DistanceConfig,
    ) -> Result<Self> {
        let field = match field {
            Some(f) if config.pz > 0.0 => f,
            _ => {
                return Self::from_coordinates(
                    features.iter().map(|f| (f.id, Coordinate::new(f.x, f.y))),
                )
            }
        };

        if !features.iter().any(|f| f.attributes.contains_key(field)) {
            return Err(Error::invalid_field(field, FieldProblem::Missing));
        }

        let mut set = Self::with_capacity(features.len());
        let mut dropped = 0usize;
        for f in features {
            let value = f
                .attributes
                .get(field)
                .map(AttributeValue::numeric)
                .transpose()
                .map_err(|reason| Error::invalid_field(field, reason))?
                .flatten();
            match value {
                Some(z) => set.push(f.id, Coordinate::new(f.x, f.y).with_z(z))?,
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!(field, dropped, "dropped features without a value");
        }

        if !set.is_empty() {
            set.standardize_z(config.mode)
                .map_err(|reason| Error::invalid_field(field, reason))?;
        }
        Ok(set)
    }

    /// Append a point. Fails if the id is already present.
    pub fn push(&mut self, id: PointId, coord: Coordinate) -> Result<()> {
        if self.index.contains_key(&id) {
            return Err(Error::DuplicatePoint { id });
        }
        self.index.insert(id, self.ids.len());
        self.ids.push(id);
        self.coords.push(coord);
        Ok(())
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in insertion order.
    #[inline]
    pub fn ids(&self) -> &[PointId] {
        &self.ids
    }

    /// Coordinates in insertion order.
    #[inline]
    pub fn coords(&self) -> &[Coordinate] {
        &self.coords
    }

    /// Coordinate of a point.
    pub fn get(&self, id: PointId) -> Option<&Coordinate> {
        self.index.get(&id).map(|&i| &self.coords[i])
    }

    /// Position of a point in insertion order.
    pub fn position(&self, id: PointId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// `(id, coordinate)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &Coordinate)> + '_ {
        self.ids.iter().copied().zip(self.coords.iter())
    }

    /// `n x 3` matrix of `(x, y, z)` rows.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), 3), |(i, j)| {
            let c = &self.coords[i];
            match j {
                0 => c.x,
                1 => c.y,
                _ => c.z,
            }
        })
    }

    /// `z' = (z - mean(z)) * sd_dist / sd(z)`.
    ///
    /// `sd_dist` is the spread of the planar positions around their mean:
    /// radial distances for planar mode, `x + y - x̄ - ȳ` for manhattan.
    fn standardize_z(&mut self, mode: DistanceMode) -> std::result::Result<(), FieldProblem> {
        let z: Vec<f64> = self.coords.iter().map(|c| c.z).collect();
        let sd_z = sample_sd(&z);
        if sd_z.is_nan() || sd_z <= 0.0 {
            return Err(FieldProblem::Constant);
        }

        let n = self.len() as f64;
        let x_mean = fsum(self.coords.iter().map(|c| c.x)) / n;
        let y_mean = fsum(self.coords.iter().map(|c| c.y)) / n;
        let spread: Vec<f64> = self
            .coords
            .iter()
            .map(|c| match mode {
                DistanceMode::Planar => (c.x - x_mean).hypot(c.y - y_mean),
                DistanceMode::Manhattan => c.x + c.y - x_mean - y_mean,
            })
            .collect();
        let factor = sample_sd(&spread) / sd_z;
        let z_mean = fsum(z.iter().copied()) / n;

        debug!(factor, z_mean, "standardized scalar dimension");
        for c in &mut self.coords {
            c.z = (c.z - z_mean) * factor;
        }
        Ok(())
    }
}

/// Compensated (Neumaier) summation.
pub(crate) fn fsum<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut sum = 0.0f64;
    let mut comp = 0.0f64;
    for v in values {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            comp += (sum - t) + v;
        } else {
            comp += (v - t) + sum;
        }
        sum = t;
    }
    sum + comp
}

/// Unbiased (n - 1) standard deviation. Zero for fewer than two values.
pub(crate) fn sample_sd(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = fsum(values.iter().copied()) / n;
    let ss = fsum(values.iter().map(|v| (v - mean) * (v - mean)));
    (ss / (n - 1.0)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let set = PointSet::from_coordinates([
            (7, Coordinate::new(1.0, 1.0)),
            (3, Coordinate::new(2.0, 2.0)),
            (5, Coordinate::new(3.0, 3.0)),
        ])
        .unwrap();
        assert_eq!(set.ids(), &[7, 3, 5]);
        assert_eq!(set.position(5), Some(2));
        assert_eq!(set.get(3).map(|c| c.x), Some(2.0));
    }

    #[test]
    fn rejects_duplicates() {
        let err = PointSet::from_coordinates([
            (1, Coordinate::new(0.0, 0.0)),
            (1, Coordinate::new(1.0, 1.0)),
        ])
        .unwrap_err();
        assert_eq!(err, Error::DuplicatePoint { id: 1 });
    }

    #[test]
    fn fsum_is_compensated() {
        let values = [1e16, 1.0, -1e16];
        assert_eq!(fsum(values), 1.0);
    }

    #[test]
    fn sample_sd_is_unbiased() {
        let sd = sample_sd(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    fn features() -> Vec<Feature> {
        vec![
            Feature::new(1, 0.0, 0.0).with_attribute("h", 1.0),
            Feature::new(2, 4.0, 0.0).with_attribute("h", 3i64),
            Feature::new(3, 0.0, 4.0).with_attribute("h", AttributeValue::Null),
            Feature::new(4, 4.0, 4.0).with_attribute("h", 5.0),
        ]
    }

    #[test]
    fn without_field_z_is_zero() {
        let set = PointSet::from_features(&features(), None, &DistanceConfig::planar().with_pz(50.0))
            .unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.coords().iter().all(|c| c.z == 0.0));
    }

    #[test]
    fn zero_pz_ignores_field() {
        let set = PointSet::from_features(&features(), Some("h"), &DistanceConfig::planar()).unwrap();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn nulls_are_dropped_and_z_standardized() {
        let config = DistanceConfig::planar().with_pz(50.0);
        let set = PointSet::from_features(&features(), Some("h"), &config).unwrap();
        assert_eq!(set.ids(), &[1, 2, 4]);
        let z: Vec<f64> = set.coords().iter().map(|c| c.z).collect();
        // centered
        assert!(fsum(z.iter().copied()).abs() < 1e-9);
        // rescaled to the planar spread
        let spread: Vec<f64> = {
            let (mx, my) = (8.0 / 3.0, 4.0 / 3.0);
            set.coords()
                .iter()
                .map(|c| (c.x - mx).hypot(c.y - my))
                .collect()
        };
        assert!((sample_sd(&z) - sample_sd(&spread)).abs() < 1e-9);
    }

    #[test]
    fn field_errors() {
        let config = DistanceConfig::planar().with_pz(10.0);
        let err = PointSet::from_features(&features(), Some("nope"), &config).unwrap_err();
        assert!(matches!(err, Error::InvalidField { reason: FieldProblem::Missing, .. }));

        let text = vec![
            Feature::new(1, 0.0, 0.0).with_attribute("h", "tall"),
            Feature::new(2, 1.0, 0.0).with_attribute("h", 2.0),
        ];
        let err = PointSet::from_features(&text, Some("h"), &config).unwrap_err();
        assert!(matches!(err, Error::InvalidField { reason: FieldProblem::NonNumeric, .. }));

        let flat = vec![
            Feature::new(1, 0.0, 0.0).with_attribute("h", 2.0),
            Feature::new(2, 1.0, 0.0).with_attribute("h", 2.0),
        ];
        let err = PointSet::from_features(&flat, Some("h"), &config).unwrap_err();
        assert!(matches!(err, Error::InvalidField { reason: FieldProblem::Constant, .. }));
    }

    #[test]
    fn single_valued_field_is_constant() {
        let config = DistanceConfig::planar().with_pz(10.0);
        let lone = vec![
            Feature::new(1, 0.0, 0.0).with_attribute("h", 2.0),
            Feature::new(2, 1.0, 0.0).with_attribute("h", AttributeValue::Null),
            Feature::new(3, 2.0, 0.0).with_attribute("h", AttributeValue::Null),
        ];
        let err = PointSet::from_features(&lone, Some("h"), &config).unwrap_err();
        assert!(matches!(err, Error::InvalidField { reason: FieldProblem::Constant, .. }));
    }

    #[test]
    fn to_array_rows() {
        let set = PointSet::from_xy(&[[1.0, 2.0], [3.0, 4.0]]);
        let a = set.to_array();
        assert_eq!(a.dim(), (2, 3));
        assert_eq!(a[[1, 1]], 4.0);
    }
}
