// Python bindings (`import subclu_fast`)
//
// Inputs are copied into owned vectors so the interpreter can be released
// while the Rust side runs. Every ClusterError surfaces as ValueError.

use std::path::Path;

use numpy::{PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ElbowConfig;
use crate::elbow::{self, ElbowReport};
use crate::errors::ClusterError;
use crate::flat;
use crate::linkage::{self, LinkageRow};
use crate::merge_tree::{children_from_signed, RawMergeTree};

impl From<ClusterError> for PyErr {
    fn from(err: ClusterError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

// ============================================================================
// INPUT ADAPTERS
// ============================================================================

/// Copy an `(M, 2)` integer array of merge pairs.
fn children_from_array(children: &PyReadonlyArray2<'_, i64>) -> PyResult<Vec<(usize, usize)>> {
    let view = children.as_array();
    Ok(children_from_signed(view.dim(), view.iter().copied())?)
}

/// Adapt a fitted sklearn-style model (`children_`, `distances_`, `labels_`).
fn merge_tree_from_model(model: &Bound<'_, PyAny>) -> PyResult<RawMergeTree> {
    if !model.hasattr("distances_")? {
        return Err(PyValueError::new_err(
            "model has no distances_; fit it with compute_distances=True or a distance_threshold",
        ));
    }
    let children_attr = model.getattr("children_")?;
    let children: PyReadonlyArray2<'_, i64> = children_attr.extract()?;
    let distances_attr = model.getattr("distances_")?;
    let distances: PyReadonlyArray1<'_, f64> = distances_attr.extract()?;
    let n_leaves = model.getattr("labels_")?.len()?;

    Ok(RawMergeTree::with_leaves(
        children_from_array(&children)?,
        distances.as_array().to_vec(),
        n_leaves,
    ))
}

/// Defaults, then the config file, then explicit keyword arguments.
fn resolve_config(
    n_clusters_to_check: Option<usize>,
    intervals: Option<Vec<(usize, usize)>>,
    tie_break: Option<String>,
    config_path: Option<String>,
) -> PyResult<ElbowConfig> {
    ElbowConfig::resolve(
        config_path.as_deref().map(Path::new),
        n_clusters_to_check,
        intervals,
        tie_break.as_deref(),
    )
    .map_err(|e| PyValueError::new_err(format!("{:#}", e)))
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One merge of a linkage table
#[pyclass(name = "LinkageRow")]
#[derive(Clone)]
pub struct PyLinkageRow {
    #[pyo3(get)]
    pub left_child: usize,
    #[pyo3(get)]
    pub right_child: usize,
    #[pyo3(get)]
    pub distance: f64,
    #[pyo3(get)]
    pub leaf_count: usize,
}

impl From<LinkageRow> for PyLinkageRow {
    fn from(row: LinkageRow) -> Self {
        PyLinkageRow {
            left_child: row.left_child,
            right_child: row.right_child,
            distance: row.distance,
            leaf_count: row.leaf_count,
        }
    }
}

#[pymethods]
impl PyLinkageRow {
    fn __repr__(&self) -> String {
        format!(
            "LinkageRow(left_child={}, right_child={}, distance={}, leaf_count={})",
            self.left_child, self.right_child, self.distance, self.leaf_count
        )
    }

    /// Convert to a dict with the column names of the linkage DataFrame
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("children_0", self.left_child)?;
        dict.set_item("children_1", self.right_child)?;
        dict.set_item("distance", self.distance)?;
        dict.set_item("count", self.leaf_count)?;
        Ok(dict)
    }
}

/// Distance curve, acceleration curve and optimal k per interval
#[pyclass(name = "ElbowReport")]
#[derive(Clone)]
pub struct PyElbowReport {
    inner: ElbowReport,
}

#[pymethods]
impl PyElbowReport {
    /// List of (k, distance), ascending k
    #[getter]
    fn distances(&self) -> Vec<(usize, f64)> {
        self.inner.distances.iter().map(|p| (p.k, p.distance)).collect()
    }

    /// List of (k, acceleration, optimal_k_for_interval), ascending k
    #[getter]
    fn accelerations(&self) -> Vec<(usize, f64, Option<String>)> {
        self.inner
            .accelerations
            .iter()
            .map(|p| (p.k, p.acceleration, p.optimal_k_for_interval.clone()))
            .collect()
    }

    /// {"010_to_020": {"k": ..., "distance_derivative_peak": ..., "col_prefix": ...}, ...}
    #[getter]
    fn optimal_k<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        for (label, best) in &self.inner.optimal {
            let entry = PyDict::new(py);
            entry.set_item("k", best.k)?;
            entry.set_item("distance_derivative_peak", best.distance_derivative_peak)?;
            entry.set_item("col_prefix", &best.col_prefix)?;
            dict.set_item(label, entry)?;
        }
        Ok(dict)
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        let picks: Vec<String> = self
            .inner
            .optimal
            .iter()
            .map(|(label, best)| format!("{}={}", label, best.k))
            .collect();
        format!(
            "ElbowReport(n_distances={}, optimal=[{}])",
            self.inner.distances.len(),
            picks.join(", ")
        )
    }
}

// ============================================================================
// LINKAGE
// ============================================================================

/// Build the linkage table (children, distance, leaf count) of a merge tree.
///
/// Raises ValueError if the tree is malformed (length mismatch, forward or
/// self reference, node merged twice).
#[pyfunction]
#[pyo3(signature = (children, distances, n_leaves=None))]
fn build_linkage<'py>(
    py: Python<'py>,
    children: PyReadonlyArray2<'py, i64>,
    distances: PyReadonlyArray1<'py, f64>,
    n_leaves: Option<usize>,
) -> PyResult<Vec<PyLinkageRow>> {
    let children = children_from_array(&children)?;
    let distances = distances.as_array().to_vec();
    let n_leaves = n_leaves.unwrap_or(children.len() + 1);

    let rows = py.detach(|| linkage::build_linkage_with_leaves(&children, &distances, n_leaves))?;
    Ok(rows.into_iter().map(PyLinkageRow::from).collect())
}

/// Build the linkage table straight from a fitted AgglomerativeClustering model.
#[pyfunction]
fn linkage_from_model(py: Python<'_>, model: &Bound<'_, PyAny>) -> PyResult<Vec<PyLinkageRow>> {
    let tree = merge_tree_from_model(model)?;
    let rows = py.detach(|| linkage::build_linkage_from_tree(&tree))?;
    Ok(rows.into_iter().map(PyLinkageRow::from).collect())
}

/// Linkage table in scipy's (M, 4) layout, ready for dendrogram/fcluster.
#[pyfunction]
#[pyo3(signature = (children, distances, n_leaves=None))]
fn linkage_matrix<'py>(
    py: Python<'py>,
    children: PyReadonlyArray2<'py, i64>,
    distances: PyReadonlyArray1<'py, f64>,
    n_leaves: Option<usize>,
) -> PyResult<Vec<[f64; 4]>> {
    let children = children_from_array(&children)?;
    let distances = distances.as_array().to_vec();
    let n_leaves = n_leaves.unwrap_or(children.len() + 1);

    let rows = py.detach(|| linkage::build_linkage_with_leaves(&children, &distances, n_leaves))?;
    Ok(linkage::linkage_matrix(&rows))
}

// ============================================================================
// ELBOW
// ============================================================================

/// Pick an optimal k per interval with the elbow (max acceleration) method.
///
/// # Arguments
/// * `distances` - Merge distances in merge order
/// * `n_clusters_to_check` - Trailing merges to examine (default: 500)
/// * `intervals` - List of inclusive (low, high) k-ranges
/// * `tie_break` - "smallest_k" (default) or "largest_k"
/// * `config_path` - TOML/JSON file with the same settings; keyword
///   arguments override it
///
/// Raises ValueError if fewer than 3 distances are in the window.
#[pyfunction]
#[pyo3(signature = (distances, n_clusters_to_check=None, intervals=None, tie_break=None, config_path=None))]
fn elbow_optimal_k<'py>(
    py: Python<'py>,
    distances: PyReadonlyArray1<'py, f64>,
    n_clusters_to_check: Option<usize>,
    intervals: Option<Vec<(usize, usize)>>,
    tie_break: Option<String>,
    config_path: Option<String>,
) -> PyResult<PyElbowReport> {
    let config = resolve_config(n_clusters_to_check, intervals, tie_break, config_path)?;
    let distances = distances.as_array().to_vec();

    let report = py.detach(|| elbow::select_optimal_k_with(&distances, &config))?;
    Ok(PyElbowReport { inner: report })
}

/// Same as elbow_optimal_k, reading the distance column of an (M, 4) linkage matrix.
#[pyfunction]
#[pyo3(signature = (linkage, n_clusters_to_check=None, intervals=None, tie_break=None, config_path=None))]
fn elbow_optimal_k_from_linkage<'py>(
    py: Python<'py>,
    linkage: PyReadonlyArray2<'py, f64>,
    n_clusters_to_check: Option<usize>,
    intervals: Option<Vec<(usize, usize)>>,
    tie_break: Option<String>,
    config_path: Option<String>,
) -> PyResult<PyElbowReport> {
    let config = resolve_config(n_clusters_to_check, intervals, tie_break, config_path)?;
    let view = linkage.as_array();
    if view.ncols() != 4 {
        return Err(PyValueError::new_err(format!(
            "linkage must have shape (M, 4), got {:?}",
            view.shape()
        )));
    }
    let matrix: Vec<[f64; 4]> = view.rows().into_iter().map(|r| [r[0], r[1], r[2], r[3]]).collect();

    let report = py.detach(|| {
        let rows = linkage::rows_from_matrix(&matrix)?;
        elbow::select_optimal_k_from_linkage(&rows, &config)
    })?;
    Ok(PyElbowReport { inner: report })
}

/// Run elbow selection for many clustering runs in parallel.
///
/// Raises ValueError for the first run that fails.
#[pyfunction]
#[pyo3(signature = (runs, n_clusters_to_check=None, intervals=None, tie_break=None, config_path=None))]
fn elbow_optimal_k_batch(
    py: Python<'_>,
    runs: Vec<Vec<f64>>,
    n_clusters_to_check: Option<usize>,
    intervals: Option<Vec<(usize, usize)>>,
    tie_break: Option<String>,
    config_path: Option<String>,
) -> PyResult<Vec<PyElbowReport>> {
    let config = resolve_config(n_clusters_to_check, intervals, tie_break, config_path)?;

    // Detach Python thread state during parallel selection
    let results = py.detach(|| elbow::select_optimal_k_batch(&runs, &config));
    results
        .into_iter()
        .enumerate()
        .map(|(i, result)| {
            result
                .map(|inner| PyElbowReport { inner })
                .map_err(|e| PyValueError::new_err(format!("run {}: {}", i, e)))
        })
        .collect()
}

// ============================================================================
// FLAT CUTS
// ============================================================================

/// Flat cluster label per observation after cutting the tree at n_clusters.
#[pyfunction]
#[pyo3(signature = (children, n_clusters, n_leaves=None))]
fn cut_tree_labels<'py>(
    py: Python<'py>,
    children: PyReadonlyArray2<'py, i64>,
    n_clusters: usize,
    n_leaves: Option<usize>,
) -> PyResult<Vec<usize>> {
    let children = children_from_array(&children)?;
    let n_leaves = n_leaves.unwrap_or(children.len() + 1);
    Ok(py.detach(|| flat::cut_tree(&children, n_leaves, n_clusters))?)
}

/// Number of clusters left when the dendrogram is cut at `threshold`.
#[pyfunction]
#[pyo3(signature = (distances, threshold, n_leaves=None))]
fn clusters_at_distance<'py>(
    distances: PyReadonlyArray1<'py, f64>,
    threshold: f64,
    n_leaves: Option<usize>,
) -> usize {
    let view = distances.as_array();
    let n_leaves = n_leaves.unwrap_or(view.len() + 1);
    let distances = view.to_vec();
    flat::n_clusters_at_distance(&distances, n_leaves, threshold)
}

// ============================================================================
// LOGGING
// ============================================================================

/// Send Rust-side logs to stderr. RUST_LOG takes precedence over `level`.
///
/// Returns False if a subscriber was already installed.
#[pyfunction]
#[pyo3(signature = (level="info"))]
fn init_logging(level: &str) -> PyResult<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| PyValueError::new_err(format!("Invalid log level '{}': {}", level, e)))?;

    Ok(tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .is_ok())
}

#[pymodule]
fn subclu_fast(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyLinkageRow>()?;
    m.add_class::<PyElbowReport>()?;
    // Linkage
    m.add_function(wrap_pyfunction!(build_linkage, m)?)?;
    m.add_function(wrap_pyfunction!(linkage_from_model, m)?)?;
    m.add_function(wrap_pyfunction!(linkage_matrix, m)?)?;
    // Elbow
    m.add_function(wrap_pyfunction!(elbow_optimal_k, m)?)?;
    m.add_function(wrap_pyfunction!(elbow_optimal_k_from_linkage, m)?)?;
    m.add_function(wrap_pyfunction!(elbow_optimal_k_batch, m)?)?;
    // Flat cuts
    m.add_function(wrap_pyfunction!(cut_tree_labels, m)?)?;
    m.add_function(wrap_pyfunction!(clusters_at_distance, m)?)?;
    m.add_function(wrap_pyfunction!(init_logging, m)?)?;
    Ok(())
}
