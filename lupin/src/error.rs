//! Error types for the clustering core.

use thiserror::Error;

/// Violated preconditions and invariants of the clustering core.
/// Each variant names the offending value so that the caller can fix
/// a single parameter and retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LupinError {
    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("invalid marker subset: column index {index} out of range for {ncols} columns")]
    InvalidSubset { index: usize, ncols: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(
        "cannot cut the dendrogram into exactly {requested} metaclusters: \
         merges {step} and {next} tie at height {height}"
    )]
    MergeInfeasible {
        requested: usize,
        step: usize,
        next: usize,
        height: f64,
    },

    #[error("metacluster {id} has no cells")]
    EmptyMetacluster { id: usize },
}

/// Result type alias for the clustering core.
pub type Result<T> = std::result::Result<T, LupinError>;
