//! Error types for linkage and elbow analysis.
//!
//! Every algorithm returns `Result<T, ClusterError>` instead of producing a
//! wrong table from bad input. With the `python` feature enabled the errors
//! are converted to Python `ValueError` in `lib.rs`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    /// `children` and `distances` describe a different number of merges.
    #[error("merge tree has {children} children pairs but {distances} distances")]
    LengthMismatch { children: usize, distances: usize },

    /// More merges than a binary tree over `leaves` observations can hold.
    #[error("{merges} merges cannot come from {leaves} leaves")]
    TooManyMerges { merges: usize, leaves: usize },

    /// A composite child id points at its own merge or a later one.
    #[error("merge {merge} references node {child}, which is not formed before it")]
    ForwardReference { merge: usize, child: usize },

    /// A node was consumed by more than one merge.
    #[error("merge {merge} reuses node {child}, which was already merged")]
    DuplicateChild { merge: usize, child: usize },

    /// Not enough distances in the window to take a second difference.
    #[error("need at least {needed} distances to compute acceleration, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;
