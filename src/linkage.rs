// Linkage tables for dendrograms and flat cuts
//
// WHY THIS EXISTS:
// sklearn's AgglomerativeClustering exposes `children_` and `distances_` but
// not the per-merge observation counts that scipy's `dendrogram` and
// `fcluster` expect as the 4th linkage column. This module rebuilds that
// column and converts between row and scipy matrix layouts.
//
// ERROR HANDLING:
// Merge trees are validated before counting. A forward reference would
// otherwise read a count that has not been computed yet and silently
// produce a wrong table.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{ClusterError, ClusterResult};
use crate::merge_tree::{is_monotonic, validate_merges, MergeTree};

/// One merge of the linkage table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkageRow {
    pub left_child: usize,
    pub right_child: usize,
    pub distance: f64,
    /// Number of original observations under this merge.
    pub leaf_count: usize,
}

// ============================================================================
// LEAF COUNTS
// ============================================================================
//
// Merge i with children (a, b):
//   leaf child      (id < N)  contributes 1
//   composite child (id >= N) contributes counts[id - N]
//
// Example (4 leaves):
//   merge 0: (0, 1)  -> 1 + 1           = 2   creates id 4
//   merge 1: (2, 4)  -> 1 + counts[0]   = 3   creates id 5
//   merge 2: (3, 5)  -> 1 + counts[1]   = 4   creates id 6
//
// Composite ids only point backwards, so one forward pass over a pre-sized
// array is enough.
// ============================================================================

/// Build a linkage table from a full merge tree (`N = M + 1` leaves).
///
/// # Errors
/// - `LengthMismatch` if `children` and `distances` differ in length
/// - `ForwardReference` if a merge references itself or a later merge
/// - `DuplicateChild` if a node is merged twice
pub fn build_linkage(
    children: &[(usize, usize)],
    distances: &[f64],
) -> ClusterResult<Vec<LinkageRow>> {
    build_linkage_with_leaves(children, distances, children.len() + 1)
}

/// Build a linkage table from anything that exposes a merge tree.
pub fn build_linkage_from_tree<T: MergeTree + ?Sized>(tree: &T) -> ClusterResult<Vec<LinkageRow>> {
    build_linkage_with_leaves(tree.children(), tree.distances(), tree.n_leaves())
}

/// Build a linkage table with an explicit leaf count.
///
/// Partial trees (fewer than `n_leaves - 1` merges) are accepted.
///
/// # Errors
/// Same as [`build_linkage`], plus `TooManyMerges` when the tree has more
/// merges than `n_leaves` observations allow.
pub fn build_linkage_with_leaves(
    children: &[(usize, usize)],
    distances: &[f64],
    n_leaves: usize,
) -> ClusterResult<Vec<LinkageRow>> {
    validate_merges(children, distances.len(), n_leaves)?;
    if !is_monotonic(distances) {
        warn!("Merge distances are not sorted ascending; elbow selection assumes they are");
    }

    let mut counts: Vec<usize> = vec![0; children.len()];
    for (i, &(a, b)) in children.iter().enumerate() {
        counts[i] = subtree_size(a, n_leaves, &counts) + subtree_size(b, n_leaves, &counts);
    }

    debug!("Built linkage for {} merges over {} leaves", children.len(), n_leaves);

    Ok(children
        .iter()
        .zip(distances)
        .zip(counts)
        .map(|((&(left_child, right_child), &distance), leaf_count)| LinkageRow {
            left_child,
            right_child,
            distance,
            leaf_count,
        })
        .collect())
}

#[inline]
fn subtree_size(node: usize, n_leaves: usize, counts: &[usize]) -> usize {
    if node < n_leaves {
        1
    } else {
        counts[node - n_leaves]
    }
}

// ============================================================================
// SCIPY MATRIX LAYOUT
// ============================================================================

/// Convert rows to scipy's `(M, 4)` layout: `[c0, c1, distance, count]`.
pub fn linkage_matrix(rows: &[LinkageRow]) -> Vec<[f64; 4]> {
    rows.iter()
        .map(|r| {
            [
                r.left_child as f64,
                r.right_child as f64,
                r.distance,
                r.leaf_count as f64,
            ]
        })
        .collect()
}

/// Read rows back from a scipy-style linkage matrix.
///
/// # Errors
/// - `InvalidParameter` if an id or count cell is negative, fractional or
///   not finite
pub fn rows_from_matrix(matrix: &[[f64; 4]]) -> ClusterResult<Vec<LinkageRow>> {
    matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Ok(LinkageRow {
                left_child: integral_cell(row[0], i, "children_0")?,
                right_child: integral_cell(row[1], i, "children_1")?,
                distance: row[2],
                leaf_count: integral_cell(row[3], i, "count")?,
            })
        })
        .collect()
}

fn integral_cell(value: f64, row: usize, column: &str) -> ClusterResult<usize> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(ClusterError::InvalidParameter(format!(
            "linkage row {} column '{}' must be a non-negative integer, got {}",
            row, column, value
        )));
    }
    Ok(value as usize)
}

/// Distance column of a linkage table.
pub fn distances_of(rows: &[LinkageRow]) -> Vec<f64> {
    rows.iter().map(|r| r.distance).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge_tree::RawMergeTree;

    /// Chain tree: leaves are added one at a time to a growing cluster.
    fn chain_tree(n_leaves: usize) -> (Vec<(usize, usize)>, Vec<f64>) {
        let mut children = vec![(0, 1)];
        for i in 1..n_leaves - 1 {
            children.push((i + 1, n_leaves + i - 1));
        }
        let distances = (0..children.len()).map(|i| i as f64 + 1.0).collect();
        (children, distances)
    }

    /// Balanced tree over a power-of-two leaf count.
    fn balanced_tree(n_leaves: usize) -> (Vec<(usize, usize)>, Vec<f64>) {
        let mut children = Vec::new();
        let mut level: Vec<usize> = (0..n_leaves).collect();
        while level.len() > 1 {
            let mut next = Vec::new();
            for pair in level.chunks(2) {
                children.push((pair[0], pair[1]));
                next.push(n_leaves + children.len() - 1);
            }
            level = next;
        }
        let distances = (0..children.len()).map(|i| i as f64 * 0.5).collect();
        (children, distances)
    }

    #[test]
    fn test_concrete_scenario() {
        let rows = build_linkage(&[(0, 1), (2, 4), (3, 5)], &[0.1, 0.3, 0.9]).unwrap();
        let counts: Vec<usize> = rows.iter().map(|r| r.leaf_count).collect();
        assert_eq!(counts, vec![2, 3, 4]);
        assert_eq!(rows[2].left_child, 3);
        assert_eq!(rows[2].right_child, 5);
        assert_eq!(rows[1].distance, 0.3);
    }

    #[test]
    fn test_final_row_counts_all_leaves() {
        for n in [2, 3, 8, 50] {
            let (children, distances) = chain_tree(n);
            let rows = build_linkage(&children, &distances).unwrap();
            assert_eq!(rows.last().unwrap().leaf_count, n);
        }
        let (children, distances) = balanced_tree(16);
        let rows = build_linkage(&children, &distances).unwrap();
        assert_eq!(rows.last().unwrap().leaf_count, 16);
        // First level merges two leaves each
        assert!(rows[..8].iter().all(|r| r.leaf_count == 2));
    }

    #[test]
    fn test_parent_count_exceeds_child_count() {
        let (children, distances) = balanced_tree(8);
        let n = 8;
        let rows = build_linkage(&children, &distances).unwrap();
        for (i, row) in rows.iter().enumerate() {
            for child in [row.left_child, row.right_child] {
                if child >= n {
                    assert!(row.leaf_count > rows[child - n].leaf_count, "merge {}", i);
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let (children, distances) = chain_tree(20);
        let a = build_linkage(&children, &distances).unwrap();
        let b = build_linkage(&children, &distances).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_self_reference_is_error() {
        // Merge 1 would create id 5 (4 leaves); it cannot contain itself
        let result = build_linkage(&[(0, 1), (2, 5), (3, 4)], &[0.1, 0.2, 0.3]);
        assert!(matches!(result, Err(ClusterError::ForwardReference { merge: 1, child: 5 })));
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let result = build_linkage(&[(0, 1), (2, 3)], &[0.1]);
        assert!(matches!(result, Err(ClusterError::LengthMismatch { children: 2, distances: 1 })));
    }

    #[test]
    fn test_from_tree_partial() {
        // 5 observations, only two merges computed
        let tree = RawMergeTree::with_leaves(vec![(0, 1), (5, 2)], vec![0.2, 0.4], 5);
        let rows = build_linkage_from_tree(&tree).unwrap();
        assert_eq!(rows[0].leaf_count, 2);
        assert_eq!(rows[1].leaf_count, 3);
    }

    #[test]
    fn test_empty_tree() {
        let rows = build_linkage(&[], &[]).unwrap();
        assert!(rows.is_empty());
        assert!(linkage_matrix(&rows).is_empty());
    }

    #[test]
    fn test_matrix_layout() {
        let rows = build_linkage(&[(0, 1), (2, 4), (3, 5)], &[0.1, 0.3, 0.9]).unwrap();
        let matrix = linkage_matrix(&rows);
        assert_eq!(matrix[1], [2.0, 4.0, 0.3, 3.0]);
        assert_eq!(rows_from_matrix(&matrix).unwrap(), rows);
    }

    #[test]
    fn test_matrix_rejects_fractional_ids() {
        let result = rows_from_matrix(&[[0.5, 1.0, 0.1, 2.0]]);
        assert!(matches!(result, Err(ClusterError::InvalidParameter(_))));
        let result = rows_from_matrix(&[[0.0, 1.0, 0.1, -2.0]]);
        assert!(matches!(result, Err(ClusterError::InvalidParameter(_))));
    }

    #[test]
    fn test_distances_of() {
        let rows = build_linkage(&[(0, 1), (2, 4), (3, 5)], &[0.1, 0.3, 0.9]).unwrap();
        assert_eq!(distances_of(&rows), vec![0.1, 0.3, 0.9]);
    }
}
