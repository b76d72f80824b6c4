//! Post-processing for hierarchical clustering runs.
//!
//! Rebuilds the observation counts of a merge tree for dendrograms and
//! flat cuts, and picks a number of clusters per k-range from the
//! curvature of the merge-distance curve.
//!
//! ```
//! use subclu_fast::{build_linkage, select_optimal_k, KInterval};
//!
//! let rows = build_linkage(&[(0, 1), (2, 4), (3, 5)], &[0.1, 0.3, 0.9]).unwrap();
//! assert_eq!(rows.last().unwrap().leaf_count, 4);
//!
//! let distances = [1.0, 2.0, 4.0, 7.0, 11.0, 16.0];
//! let report = select_optimal_k(&distances, 500, &[KInterval::new(2, 5)]).unwrap();
//! assert_eq!(report.optimal["002_to_005"].k, 2);
//! ```
//!
//! Enable the `python` feature to build the `subclu_fast` extension module.

pub mod config;
pub mod elbow;
pub mod errors;
pub mod flat;
pub mod linkage;
pub mod merge_tree;

#[cfg(feature = "python")]
mod python;

pub use config::ElbowConfig;
pub use elbow::{
    select_optimal_k, select_optimal_k_batch, select_optimal_k_from_linkage, select_optimal_k_with,
    AccelerationPoint, DistanceCurvePoint, ElbowReport, KInterval, OptimalK, OptimalKResult,
    TieBreak,
};
pub use errors::{ClusterError, ClusterResult};
pub use flat::{cut_tree, cut_tree_from, n_clusters_at_distance};
pub use linkage::{build_linkage, build_linkage_from_tree, build_linkage_with_leaves, LinkageRow};
pub use merge_tree::{MergeTree, RawMergeTree};
