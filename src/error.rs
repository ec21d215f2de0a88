use core::fmt;

use thiserror::Error;

use crate::point::PointId;

/// Result alias for `geoclust`.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a configured attribute field cannot serve as the scalar dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    /// No feature carries the field.
    Missing,
    /// At least one value is not numeric.
    NonNumeric,
    /// Every valid point has the same value, so standardization is undefined.
    Constant,
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing => write!(f, "not found in input"),
            FieldProblem::NonNumeric => write!(f, "must be numeric"),
            FieldProblem::Constant => write!(f, "must not be constant"),
        }
    }
}

/// Errors returned by the clustering engines.
///
/// None of these are recovered internally: a run is deterministic given its
/// seed and inputs, so repeating it with the same arguments fails the same way.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Fewer valid points than requested clusters.
    #[error("too little valid points available for {requested} clusters (found {available})")]
    InsufficientPoints {
        /// Requested number of clusters.
        requested: usize,
        /// Number of points (or representatives) available.
        available: usize,
    },

    /// A K-means iteration left a cluster without members.
    #[error(
        "algorithm failed after {iteration} iterations: cluster {cluster} is empty; \
         choose a different random seed or a smaller number of clusters"
    )]
    EmptyCluster {
        /// Iteration (1-based) in which the cluster emptied.
        iteration: usize,
        /// Index of the empty cluster.
        cluster: usize,
    },

    /// Hierarchical clustering was selected without a linkage.
    #[error("linkage must be single, complete, average, ward or centroid")]
    InvalidLinkage,

    /// The configured attribute field is unusable.
    #[error("field {field} {reason}")]
    InvalidField {
        /// Field name.
        field: String,
        /// What is wrong with it.
        reason: FieldProblem,
    },

    /// The progress sink requested cancellation.
    #[error("clustering cancelled")]
    Cancelled,

    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Two points share the same identifier.
    #[error("duplicate point id {id}")]
    DuplicatePoint {
        /// The repeated id.
        id: PointId,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },
}

impl Error {
    pub(crate) fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_field(field: &str, reason: FieldProblem) -> Self {
        Error::InvalidField {
            field: field.to_string(),
            reason,
        }
    }
}
