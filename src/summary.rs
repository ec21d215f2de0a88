//! Per-cluster summaries of a finished run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cluster::Assignment;
use crate::point::{fsum, Coordinate, PointSet};

/// Mean position and size of one output cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterCenter {
    /// Cluster label.
    pub label: usize,
    /// Number of member points.
    pub size: usize,
    /// Mean of the member coordinates, scalar dimension included.
    pub center: Coordinate,
}

/// Center of every label in `assignment`, sorted by label.
///
/// Ids in `assignment` that `points` does not contain are ignored.
pub fn cluster_centers(points: &PointSet, assignment: &Assignment) -> Vec<ClusterCenter> {
    let mut members: BTreeMap<usize, Vec<&Coordinate>> = BTreeMap::new();
    for (&id, &label) in assignment {
        if let Some(c) = points.get(id) {
            members.entry(label).or_default().push(c);
        }
    }

    members
        .into_iter()
        .map(|(label, coords)| {
            let n = coords.len() as f64;
            let center = Coordinate::new(
                fsum(coords.iter().map(|c| c.x)) / n,
                fsum(coords.iter().map(|c| c.y)) / n,
            )
            .with_z(fsum(coords.iter().map(|c| c.z)) / n);
            ClusterCenter {
                label,
                size: coords.len(),
                center,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_are_member_means() {
        let points = PointSet::from_xy(&[[0.0, 0.0], [2.0, 0.0], [10.0, 10.0], [1.0, 3.0]]);
        let assignment = Assignment::from([(0, 0), (1, 0), (2, 1), (3, 0)]);
        let centers = cluster_centers(&points, &assignment);

        assert_eq!(centers.len(), 2);
        assert_eq!(centers[0].label, 0);
        assert_eq!(centers[0].size, 3);
        assert!((centers[0].center.x - 1.0).abs() < 1e-12);
        assert!((centers[0].center.y - 1.0).abs() < 1e-12);
        assert_eq!(centers[1].center, Coordinate::new(10.0, 10.0));
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let points = PointSet::from_xy(&[[4.0, 4.0]]);
        let assignment = Assignment::from([(0, 2), (99, 5)]);
        let centers = cluster_centers(&points, &assignment);
        assert_eq!(centers.len(), 1);
        assert_eq!(centers[0].label, 2);
        assert_eq!(centers[0].size, 1);
    }

    #[test]
    fn scalar_dimension_is_averaged() {
        let mut points = PointSet::new();
        points.push(1, Coordinate::new(0.0, 0.0).with_z(-1.0)).unwrap();
        points.push(2, Coordinate::new(0.0, 0.0).with_z(3.0)).unwrap();
        let centers = cluster_centers(&points, &Assignment::from([(1, 0), (2, 0)]));
        assert!((centers[0].center.z - 1.0).abs() < 1e-12);
    }
}
