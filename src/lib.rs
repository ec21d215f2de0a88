//! # geoclust
//!
//! Point clustering for spatial data: K-means++, Lance-Williams agglomerative
//! clustering with SLINK/CLINK fast paths, and BIRCH or radius-blob
//! pre-aggregation for inputs too large to cluster directly.
//!
//! Distances mix planar position with an optional scalar dimension (height
//! or a standardized attribute) weighted by a percentage `pz`. Every
//! long-running call reports progress to a [`ProgressSink`] and stops with
//! [`Error::Cancelled`] when the sink asks it to.
//!
//! ```rust
//! use geoclust::cluster::Linkage;
//! use geoclust::{ClusterConfig, ClusterOrchestrator, NoProgress, PointSet};
//!
//! let points = PointSet::from_xy(&[
//!     [0.0, 0.0],
//!     [0.5, 0.2],
//!     [9.0, 9.0],
//!     [9.3, 8.8],
//!     [20.0, 0.0],
//!     [20.2, 0.4],
//! ]);
//!
//! let config = ClusterConfig::hierarchical(3, Linkage::Average);
//! let labels = ClusterOrchestrator::new(config)
//!     .run(&points, &mut NoProgress)
//!     .unwrap();
//! assert_eq!(labels[&0], labels[&1]);
//! assert_ne!(labels[&1], labels[&2]);
//! ```

pub mod aggregate;
pub mod cluster;
pub mod distance;
mod error;
pub mod hierarchy;
pub mod pipeline;
pub mod point;
pub mod progress;
pub mod summary;

pub use distance::{DistanceConfig, DistanceMode, FeatureSpace, Measure, Metric, PlanarMeasure};
pub use error::{Error, FieldProblem, Result};
pub use pipeline::{
    run_birch_precompute, run_hierarchical, run_kmeans, Algorithm, ClusterConfig,
    ClusterOrchestrator, PreAggregation,
};
pub use point::{AttributeValue, Coordinate, Feature, PointId, PointSet};
pub use progress::{NoProgress, ProgressSink, RecordingProgress};
pub use summary::{cluster_centers, ClusterCenter};
