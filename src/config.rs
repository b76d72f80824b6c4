//! Elbow selection configuration
//!
//! Loads the k-interval set, the tail size and the tie-break rule from a
//! TOML or JSON file. Every field is optional and falls back to the
//! defaults used by the clustering reports.
//!
//! # Configuration Format
//!
//! ```toml
//! # elbow.toml
//! n_clusters_to_check = 500
//! intervals = [[10, 20], [20, 50], [50, 100]]
//! tie_break = "smallest_k"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::elbow::{KInterval, TieBreak, DEFAULT_K_INTERVALS, DEFAULT_N_TAIL};

/// Settings for [`crate::elbow::select_optimal_k_with`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElbowConfig {
    /// How many trailing merges to examine.
    #[serde(default = "default_n_tail", alias = "n_clusters_to_check")]
    pub n_tail: usize,

    /// Closed k-ranges, each reported under `"{low:03}_to_{high:03}"`.
    #[serde(default = "default_intervals")]
    pub intervals: Vec<KInterval>,

    #[serde(default)]
    pub tie_break: TieBreak,
}

fn default_n_tail() -> usize {
    DEFAULT_N_TAIL
}

fn default_intervals() -> Vec<KInterval> {
    DEFAULT_K_INTERVALS
        .iter()
        .map(|&(low, high)| KInterval::new(low, high))
        .collect()
}

impl Default for ElbowConfig {
    fn default() -> Self {
        Self {
            n_tail: default_n_tail(),
            intervals: default_intervals(),
            tie_break: TieBreak::default(),
        }
    }
}

impl ElbowConfig {
    /// Load a config file; the format is picked from the extension
    /// (`.json` is JSON, anything else is TOML).
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        };
        Ok(config)
    }

    /// Defaults, then the file at `path`, then each explicit override.
    ///
    /// `tie_break` accepts the names understood by [`TieBreak`]'s `FromStr`.
    pub fn resolve(
        path: Option<&Path>,
        n_tail: Option<usize>,
        intervals: Option<Vec<(usize, usize)>>,
        tie_break: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        if let Some(n_tail) = n_tail {
            config.n_tail = n_tail;
        }
        if let Some(intervals) = intervals {
            config.intervals = intervals.into_iter().map(KInterval::from).collect();
        }
        if let Some(tie_break) = tie_break {
            config.tie_break = tie_break.parse::<TieBreak>()?;
        }
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it is missing or
    /// cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No elbow config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::from_path(path) {
            Ok(config) => {
                debug!("Loaded elbow config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to load {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ElbowConfig::default();
        assert_eq!(config.n_tail, 500);
        assert_eq!(config.tie_break, TieBreak::SmallestK);
        let pairs: Vec<(usize, usize)> = config.intervals.iter().map(|i| (i.low, i.high)).collect();
        assert_eq!(
            pairs,
            vec![(10, 20), (20, 50), (50, 100), (100, 200), (200, 300), (300, 400), (400, 600)]
        );
    }

    #[test]
    fn test_toml_overrides() {
        let config: ElbowConfig = toml::from_str(
            r#"
            n_clusters_to_check = 40
            intervals = [[2, 5], [5, 9]]
            tie_break = "largest_k"
            "#,
        )
        .unwrap();
        assert_eq!(config.n_tail, 40);
        assert_eq!(config.intervals, vec![KInterval::new(2, 5), KInterval::new(5, 9)]);
        assert_eq!(config.tie_break, TieBreak::LargestK);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ElbowConfig = toml::from_str("n_tail = 100").unwrap();
        assert_eq!(config.n_tail, 100);
        assert_eq!(config.intervals.len(), 7);
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elbow.json");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"n_tail": 60, "intervals": [[10, 20]]}}"#).unwrap();

        let config = ElbowConfig::from_path(&path).unwrap();
        assert_eq!(config.n_tail, 60);
        assert_eq!(config.intervals, vec![KInterval::new(10, 20)]);
    }

    #[test]
    fn test_resolve_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elbow.toml");
        std::fs::write(
            &path,
            "n_tail = 60\nintervals = [[10, 20]]\ntie_break = \"largest_k\"\n",
        )
        .unwrap();

        // File beats defaults
        let config = ElbowConfig::resolve(Some(&path), None, None, None).unwrap();
        assert_eq!(config.n_tail, 60);
        assert_eq!(config.intervals, vec![KInterval::new(10, 20)]);
        assert_eq!(config.tie_break, TieBreak::LargestK);

        // Explicit values beat the file, the rest still comes from it
        let config =
            ElbowConfig::resolve(Some(&path), Some(40), None, Some("smallest")).unwrap();
        assert_eq!(config.n_tail, 40);
        assert_eq!(config.intervals, vec![KInterval::new(10, 20)]);
        assert_eq!(config.tie_break, TieBreak::SmallestK);

        let config = ElbowConfig::resolve(Some(&path), None, Some(vec![(2, 5)]), None).unwrap();
        assert_eq!(config.n_tail, 60);
        assert_eq!(config.intervals, vec![KInterval::new(2, 5)]);
    }

    #[test]
    fn test_resolve_without_file() {
        let config = ElbowConfig::resolve(None, None, None, None).unwrap();
        assert_eq!(config, ElbowConfig::default());
        assert!(ElbowConfig::resolve(None, None, None, Some("median")).is_err());

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(ElbowConfig::resolve(Some(&missing), None, None, None).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ElbowConfig::load_or_default(&dir.path().join("nope.toml"));
        assert_eq!(config, ElbowConfig::default());
    }

    #[test]
    fn test_broken_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elbow.toml");
        std::fs::write(&path, "n_tail = [").unwrap();
        assert!(ElbowConfig::from_path(&path).is_err());
        assert_eq!(ElbowConfig::load_or_default(&path), ElbowConfig::default());
    }
}
