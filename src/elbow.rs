// Elbow-based selection of the number of clusters
//
// Reading a merge-distance curve backwards gives "distance as a function of
// the number of remaining clusters". Where that curve bends hardest, cutting
// the tree gives well separated clusters. The bend is measured with the
// discrete second derivative ("acceleration") and the best k is picked
// separately inside each configured k-range.
//
// Example (tail of merge distances, ascending by merge order):
//   distances  [1, 2, 4, 7, 11, 16]
//   reversed   [16, 11, 7, 4, 2, 1]     k = 1..6
//   accel      [1, 1, 1, 1]              k = 2..5
//
// The acceleration at k is centered on the distance at k, so the two
// end points (k = 1 and the largest k) have no acceleration.

use std::str::FromStr;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ElbowConfig;
use crate::errors::{ClusterError, ClusterResult};
use crate::linkage::{distances_of, LinkageRow};
use crate::merge_tree::is_monotonic;

/// Default number of trailing merges to inspect.
pub const DEFAULT_N_TAIL: usize = 500;

/// Default k-ranges. There is no `(2, 10)` range.
pub const DEFAULT_K_INTERVALS: [(usize, usize); 7] = [
    (10, 20),
    (20, 50),
    (50, 100),
    (100, 200),
    (200, 300),
    (300, 400),
    (400, 600),
];

/// Second difference needs three points.
const MIN_POINTS: usize = 3;

// ============================================================================
// TYPES
// ============================================================================

/// Closed range of k values, `low <= k <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct KInterval {
    pub low: usize,
    pub high: usize,
}

impl KInterval {
    pub fn new(low: usize, high: usize) -> Self {
        Self { low, high }
    }

    #[inline]
    pub fn contains(&self, k: usize) -> bool {
        self.low <= k && k <= self.high
    }

    /// Key used in [`OptimalKResult`], e.g. `"010_to_020"`.
    pub fn label(&self) -> String {
        format!("{:03}_to_{:03}", self.low, self.high)
    }
}

impl From<(usize, usize)> for KInterval {
    fn from((low, high): (usize, usize)) -> Self {
        Self::new(low, high)
    }
}

impl From<KInterval> for (usize, usize) {
    fn from(interval: KInterval) -> Self {
        (interval.low, interval.high)
    }
}

/// Which k wins when several share the peak acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    SmallestK,
    LargestK,
}

impl FromStr for TieBreak {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "smallest" | "smallest_k" => Ok(TieBreak::SmallestK),
            "largest" | "largest_k" => Ok(TieBreak::LargestK),
            other => Err(ClusterError::InvalidParameter(format!(
                "tie_break must be 'smallest_k' or 'largest_k', got '{}'",
                other
            ))),
        }
    }
}

/// Merge distance at the cut that leaves `k` clusters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceCurvePoint {
    pub k: usize,
    pub distance: f64,
}

/// Second difference of the distance curve at `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelerationPoint {
    pub k: usize,
    pub acceleration: f64,
    /// Label of the interval this k was chosen for, if any.
    pub optimal_k_for_interval: Option<String>,
}

/// Chosen k for one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalK {
    pub k: usize,
    pub distance_derivative_peak: f64,
    /// Column prefix for per-k label columns, e.g. `"015_k"`.
    pub col_prefix: String,
}

impl OptimalK {
    fn new(k: usize, acceleration: f64) -> Self {
        Self {
            k,
            distance_derivative_peak: acceleration,
            col_prefix: format!("{:03}_k", k),
        }
    }
}

/// Interval label -> chosen k, in interval order.
pub type OptimalKResult = IndexMap<String, OptimalK>;

/// Everything the elbow plot and the downstream labeling step need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElbowReport {
    /// Distance curve, ascending k starting at 1.
    pub distances: Vec<DistanceCurvePoint>,
    /// Acceleration curve, ascending k starting at 2.
    pub accelerations: Vec<AccelerationPoint>,
    pub optimal: OptimalKResult,
}

// ============================================================================
// CURVES
// ============================================================================

/// Last `n_tail` distances, reversed so index 0 is the final merge (k = 1).
///
/// `n_tail == 0` takes the whole sequence.
fn tail_window(distances: &[f64], n_tail: usize) -> Vec<f64> {
    let start = match n_tail {
        0 => 0,
        n => distances.len().saturating_sub(n),
    };
    distances[start..].iter().rev().copied().collect()
}

/// Distance as a function of k for the last `n_tail` merges
/// (all of them when `n_tail` is 0).
pub fn distance_curve(distances: &[f64], n_tail: usize) -> Vec<DistanceCurvePoint> {
    tail_window(distances, n_tail)
        .into_iter()
        .enumerate()
        .map(|(i, distance)| DistanceCurvePoint { k: i + 1, distance })
        .collect()
}

/// Second difference of the reversed tail, aligned to ascending k.
///
/// `accel(k) = d(k - 1) - 2 d(k) + d(k + 1)` for `k` in `2..len`.
///
/// # Errors
/// - `InsufficientData` if the window holds fewer than 3 distances
pub fn acceleration_curve(
    distances: &[f64],
    n_tail: usize,
) -> ClusterResult<Vec<AccelerationPoint>> {
    let window = tail_window(distances, n_tail);
    if window.len() < MIN_POINTS {
        return Err(ClusterError::InsufficientData {
            needed: MIN_POINTS,
            got: window.len(),
        });
    }
    Ok(window
        .windows(3)
        .enumerate()
        .map(|(j, w)| AccelerationPoint {
            k: j + 2,
            acceleration: w[0] - 2.0 * w[1] + w[2],
            optimal_k_for_interval: None,
        })
        .collect())
}

// ============================================================================
// PEAK SELECTION
// ============================================================================

/// Point with the highest acceleration whose k lies in `interval`.
///
/// NaN accelerations are skipped. Returns `None` when no k falls inside,
/// which includes inverted intervals (`low > high`).
pub fn peak_in_interval(
    accelerations: &[AccelerationPoint],
    interval: KInterval,
    tie_break: TieBreak,
) -> Option<&AccelerationPoint> {
    let mut best: Option<&AccelerationPoint> = None;
    for point in accelerations.iter().filter(|p| interval.contains(p.k)) {
        if point.acceleration.is_nan() {
            continue;
        }
        let better = match best {
            None => true,
            Some(current) => match tie_break {
                TieBreak::SmallestK => {
                    point.acceleration > current.acceleration
                        || (point.acceleration == current.acceleration && point.k < current.k)
                }
                TieBreak::LargestK => {
                    point.acceleration > current.acceleration
                        || (point.acceleration == current.acceleration && point.k > current.k)
                }
            },
        };
        if better {
            best = Some(point);
        }
    }
    best
}

/// Pick the peak of every interval and mark the winning rows.
///
/// A row chosen by two overlapping intervals keeps the later label.
/// Intervals without candidates are left out of the result.
fn annotate_peaks(
    accelerations: &mut [AccelerationPoint],
    intervals: &[KInterval],
    tie_break: TieBreak,
) -> OptimalKResult {
    let mut optimal = OptimalKResult::with_capacity(intervals.len());
    for &interval in intervals {
        let label = interval.label();
        if interval.low > interval.high {
            warn!("Interval {} has low > high and can never match a k", label);
            continue;
        }
        let Some(peak) = peak_in_interval(accelerations, interval, tie_break) else {
            debug!("No k candidates in interval {}", label);
            continue;
        };
        let (k, acceleration) = (peak.k, peak.acceleration);
        // Rows are contiguous and start at k = 2
        accelerations[k - 2].optimal_k_for_interval = Some(label.clone());
        optimal.insert(label, OptimalK::new(k, acceleration));
    }
    optimal
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Choose the best k inside each interval, smallest k winning ties.
///
/// # Arguments
/// * `distances` - Merge distances in merge order (ascending)
/// * `n_tail` - How many trailing merges to examine (0 means all)
/// * `intervals` - Closed k-ranges to pick a k for; ranges with no
///   candidate k are absent from the result
///
/// # Errors
/// - `InsufficientData` if fewer than 3 distances are in the window
pub fn select_optimal_k(
    distances: &[f64],
    n_tail: usize,
    intervals: &[KInterval],
) -> ClusterResult<ElbowReport> {
    select(distances, n_tail, intervals, TieBreak::SmallestK)
}

/// [`select_optimal_k`] driven by an [`ElbowConfig`].
pub fn select_optimal_k_with(
    distances: &[f64],
    config: &ElbowConfig,
) -> ClusterResult<ElbowReport> {
    select(distances, config.n_tail, &config.intervals, config.tie_break)
}

/// Run elbow selection on the distance column of a linkage table.
pub fn select_optimal_k_from_linkage(
    rows: &[LinkageRow],
    config: &ElbowConfig,
) -> ClusterResult<ElbowReport> {
    select_optimal_k_with(&distances_of(rows), config)
}

/// Elbow selection for many independent clustering runs in parallel.
///
/// One result per run, in input order; a bad run does not affect the others.
pub fn select_optimal_k_batch(
    runs: &[Vec<f64>],
    config: &ElbowConfig,
) -> Vec<ClusterResult<ElbowReport>> {
    runs.par_iter()
        .map(|distances| select_optimal_k_with(distances, config))
        .collect()
}

fn select(
    distances: &[f64],
    n_tail: usize,
    intervals: &[KInterval],
    tie_break: TieBreak,
) -> ClusterResult<ElbowReport> {
    let mut accelerations = acceleration_curve(distances, n_tail)?;
    let curve = distance_curve(distances, n_tail);
    if !is_monotonic(&distances[distances.len() - curve.len()..]) {
        warn!("Merge distances in the elbow window are not sorted ascending");
    }

    let optimal = annotate_peaks(&mut accelerations, intervals, tie_break);
    debug!(
        "Elbow selection over {} merges picked k for {}/{} intervals",
        curve.len(),
        optimal.len(),
        intervals.len()
    );

    Ok(ElbowReport {
        distances: curve,
        accelerations,
        optimal,
    })
}
