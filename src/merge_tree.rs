//! Merge tree input shared by the linkage builder and the flat cut.
//!
//! A merge tree is the raw output of agglomerative clustering: one
//! `(a, b)` pair per merge plus the distance at which it happened.
//! Ids below `n_leaves` are original observations; id `n_leaves + j`
//! is the cluster created by merge `j`.
//!
//! The [`MergeTree`] trait is the only thing the algorithms need, so any
//! clustering library that exposes children, distances and a leaf count
//! can be plugged in.

use serde::{Deserialize, Serialize};

use crate::errors::{ClusterError, ClusterResult};

/// Capability set of a fitted hierarchical clustering model.
pub trait MergeTree {
    /// Merge pairs in merge order.
    fn children(&self) -> &[(usize, usize)];

    /// Merge distances, parallel to [`MergeTree::children`].
    fn distances(&self) -> &[f64];

    /// Number of original observations.
    ///
    /// A full binary tree over `N` leaves has `N - 1` merges, which is the
    /// default. Partial trees override this.
    fn n_leaves(&self) -> usize {
        self.children().len() + 1
    }
}

/// Owned merge tree, e.g. copied out of a numpy array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMergeTree {
    pub children: Vec<(usize, usize)>,
    pub distances: Vec<f64>,
    /// `None` means a full tree (`children.len() + 1` leaves).
    pub n_leaves: Option<usize>,
}

impl RawMergeTree {
    pub fn new(children: Vec<(usize, usize)>, distances: Vec<f64>) -> Self {
        Self {
            children,
            distances,
            n_leaves: None,
        }
    }

    pub fn with_leaves(
        children: Vec<(usize, usize)>,
        distances: Vec<f64>,
        n_leaves: usize,
    ) -> Self {
        Self {
            children,
            distances,
            n_leaves: Some(n_leaves),
        }
    }
}

impl MergeTree for RawMergeTree {
    fn children(&self) -> &[(usize, usize)] {
        &self.children
    }

    fn distances(&self) -> &[f64] {
        &self.distances
    }

    fn n_leaves(&self) -> usize {
        self.n_leaves.unwrap_or(self.children.len() + 1)
    }
}

/// Validate that merges only reference nodes formed before them.
///
/// # Errors
/// - `LengthMismatch` if `distances_len != children.len()`
/// - `TooManyMerges` if there are more merges than `n_leaves - 1`
/// - `ForwardReference` if merge `i` names a cluster id `>= n_leaves + i`
/// - `DuplicateChild` if a node is merged twice
pub fn validate_merges(
    children: &[(usize, usize)],
    distances_len: usize,
    n_leaves: usize,
) -> ClusterResult<()> {
    if children.len() != distances_len {
        return Err(ClusterError::LengthMismatch {
            children: children.len(),
            distances: distances_len,
        });
    }
    if children.len() >= n_leaves.max(1) {
        return Err(ClusterError::TooManyMerges {
            merges: children.len(),
            leaves: n_leaves,
        });
    }

    // Every node (leaf or cluster) may be consumed by exactly one merge.
    let mut consumed = vec![false; n_leaves + children.len()];
    for (i, &(a, b)) in children.iter().enumerate() {
        for child in [a, b] {
            if child >= n_leaves + i {
                return Err(ClusterError::ForwardReference { merge: i, child });
            }
            if consumed[child] {
                return Err(ClusterError::DuplicateChild { merge: i, child });
            }
            consumed[child] = true;
        }
    }
    Ok(())
}

/// Convert signed node ids laid out as an `(M, 2)` array, read row-major.
///
/// numpy hands `children_` over as `int64`, so ids arrive signed.
///
/// # Errors
/// - `InvalidParameter` if the shape is not `(M, 2)`, the value count does
///   not match it, or an id is negative
pub fn children_from_signed(
    shape: (usize, usize),
    values: impl IntoIterator<Item = i64>,
) -> ClusterResult<Vec<(usize, usize)>> {
    if shape.1 != 2 {
        return Err(ClusterError::InvalidParameter(format!(
            "children must have shape (M, 2), got {:?}",
            shape
        )));
    }
    let values: Vec<i64> = values.into_iter().collect();
    if values.len() != shape.0 * 2 {
        return Err(ClusterError::InvalidParameter(format!(
            "children shape {:?} does not match {} values",
            shape,
            values.len()
        )));
    }
    values
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let (a, b) = (pair[0], pair[1]);
            if a < 0 || b < 0 {
                return Err(ClusterError::InvalidParameter(format!(
                    "merge {} has a negative node id ({}, {})",
                    i, a, b
                )));
            }
            Ok((a as usize, b as usize))
        })
        .collect()
}

/// Check whether distances are sorted ascending by merge order.
pub(crate) fn is_monotonic(distances: &[f64]) -> bool {
    distances.windows(2).all(|w| w[0] <= w[1])
}
