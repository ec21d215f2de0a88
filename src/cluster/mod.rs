//! Clustering algorithms for grouping points.
//!
//! Every engine takes a [`PointSet`](crate::PointSet), a
//! [`Metric`](crate::Metric) and a [`ProgressSink`](crate::ProgressSink), and
//! produces a hard partition: each point id gets exactly one label.
//!
//! ## Algorithms
//!
//! ### K-means
//!
//! Assign each point to the nearest center, move each center to the mean of
//! its points, repeat until the centers stop moving. Seeded with k-means++.
//!
//! **When to use**: k roughly spherical groups and you want speed. Sensitive
//! to the random seed; a cluster that empties is reported, not repaired.
//!
//! ### Hierarchical (Agglomerative) Clustering
//!
//! Start with each point as its own cluster and repeatedly merge the two
//! closest clusters until k remain. The merge history forms a
//! **dendrogram**.
//!
//! **Linkage methods** determine "distance between clusters":
//!
//! | Linkage | Distance | Effect |
//! |---------|----------|--------|
//! | Single | min(pairwise) | Chaining; elongated clusters |
//! | Complete | max(pairwise) | Compact clusters |
//! | Average | mean(pairwise) | Balanced compromise |
//! | Ward | Variance increase | Compact, similar-sized clusters |
//! | Centroid | Centroid distance | Can produce inversions |
//!
//! All five run through the Lance-Williams driver. Single and complete
//! linkage also have pointer-representation drivers (SLINK, CLINK) that are
//! O(n²) instead of O(n³); [`PointerStrategy`] picks between them. SLINK is
//! used by default. CLINK approximates complete linkage and is opt-in.
//!
//! ## Usage
//!
//! ```rust
//! use geoclust::cluster::{Clustering, HierarchicalClustering, KMeans, Linkage};
//! use geoclust::{NoProgress, PointSet};
//!
//! let points = PointSet::from_xy(&[
//!     [0.0, 0.0],
//!     [0.1, 0.1],
//!     [10.0, 10.0],
//!     [10.1, 10.1],
//! ]);
//!
//! let labels = KMeans::new(2).with_seed(42).fit_predict(&points, &mut NoProgress).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//!
//! let labels = HierarchicalClustering::new(2)
//!     .with_linkage(Linkage::Ward)
//!     .fit_predict(&points, &mut NoProgress)
//!     .unwrap();
//! assert_eq!(labels[2], labels[3]);
//! ```

mod hierarchical;
mod kmeans;
mod pointer;
mod traits;

pub use hierarchical::{Coefficients, HierarchicalClustering, Linkage, PointerStrategy};
pub use kmeans::{KMeans, KMeansCluster, KMeansFit, DEFAULT_CUTOFF};
pub use pointer::PointerRepresentation;
pub use traits::{groups, Assignment, Clustering};
