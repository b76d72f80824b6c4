//! Flat cuts of a merge tree.
//!
//! Once a k has been chosen, callers need one cluster label per
//! observation. Cutting after the first `N - k` merges leaves exactly `k`
//! clusters; labels are numbered by first appearance in observation order
//! so the same tree always gives the same labels.

use crate::errors::{ClusterError, ClusterResult};
use crate::merge_tree::{validate_merges, MergeTree};

/// Label every observation with one of `n_clusters` flat clusters.
///
/// # Arguments
/// * `children` - Merge pairs in merge order
/// * `n_leaves` - Number of original observations
/// * `n_clusters` - Number of clusters to keep
///
/// # Errors
/// - Merge tree errors (see [`validate_merges`])
/// - `InvalidParameter` if `n_clusters` is outside `[N - M, N]` or 0
pub fn cut_tree(
    children: &[(usize, usize)],
    n_leaves: usize,
    n_clusters: usize,
) -> ClusterResult<Vec<usize>> {
    validate_merges(children, children.len(), n_leaves)?;
    cut_validated(children, n_leaves, n_clusters)
}

/// [`cut_tree`] for anything that exposes a merge tree.
pub fn cut_tree_from<T: MergeTree + ?Sized>(
    tree: &T,
    n_clusters: usize,
) -> ClusterResult<Vec<usize>> {
    validate_merges(tree.children(), tree.distances().len(), tree.n_leaves())?;
    cut_validated(tree.children(), tree.n_leaves(), n_clusters)
}

fn cut_validated(
    children: &[(usize, usize)],
    n_leaves: usize,
    n_clusters: usize,
) -> ClusterResult<Vec<usize>> {
    let min_clusters = n_leaves - children.len();
    if n_clusters == 0 || n_clusters < min_clusters || n_clusters > n_leaves {
        return Err(ClusterError::InvalidParameter(format!(
            "n_clusters must be between {} and {}, got {}",
            min_clusters.max(1),
            n_leaves,
            n_clusters
        )));
    }

    // Parent links: merge i points both children at node N + i
    let n_merges = n_leaves - n_clusters;
    let mut parent: Vec<usize> = (0..n_leaves + n_merges).collect();
    for (i, &(a, b)) in children.iter().take(n_merges).enumerate() {
        parent[a] = n_leaves + i;
        parent[b] = n_leaves + i;
    }

    // Iterative: chain-shaped trees are as deep as they are wide
    fn find(parent: &mut [usize], x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        let mut node = x;
        while parent[node] != root {
            let next = parent[node];
            parent[node] = root;
            node = next;
        }
        root
    }

    // Relabel roots 0..k in order of first appearance
    let mut label_of_root: Vec<Option<usize>> = vec![None; parent.len()];
    let mut next_label = 0;
    let mut labels = Vec::with_capacity(n_leaves);
    for leaf in 0..n_leaves {
        let root = find(&mut parent, leaf);
        let label = *label_of_root[root].get_or_insert_with(|| {
            next_label += 1;
            next_label - 1
        });
        labels.push(label);
    }
    Ok(labels)
}

/// Number of clusters left when every merge at or below `threshold` is applied.
///
/// This is where a horizontal cut line at `threshold` crosses a dendrogram
/// built from ascending distances.
pub fn n_clusters_at_distance(distances: &[f64], n_leaves: usize, threshold: f64) -> usize {
    let applied = distances.iter().filter(|&&d| d <= threshold).count();
    n_leaves.saturating_sub(applied)
}
