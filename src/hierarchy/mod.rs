//! Merge trees produced by agglomerative clustering.
//!
//! A [`Dendrogram`] records every merge as a binary node over two earlier
//! nodes. Leaves carry point ids; merge nodes carry ids counting down from
//! `-1`, a height (the linkage distance of the merge) and the size of the
//! cluster they stand for.
//!
//! ```text
//!        -2  (h = 4.0)
//!       /  \
//!     -1    \      (h = 1.0)
//!    /  \    \
//!   0    1    2
//! ```
//!
//! The [`validate`] helpers check structural invariants of any arena tree:
//! reachability, parent/child agreement, absence of cycles. Both the
//! dendrogram and the CF-tree implement [`HealthCheck`].

mod dendrogram;
mod node;
pub mod validate;

pub use dendrogram::{Dendrogram, Merge};
pub use node::{ClusterNode, NodeId};
pub use validate::{
    validate_tree_structure, HealthCheck, HealthReport, Severity, ValidationIssue,
    ValidationReport,
};
