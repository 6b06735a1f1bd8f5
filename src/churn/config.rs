//! Churn run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::action::WeightTable;

/// Worker count used when none is given.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Engine tunables shared by every worker of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Relative weight per action.
    pub weights: WeightTable,
    /// Ticks a worker stays inert after picking `Wait`.
    pub wait_ticks: u32,
    /// Words appended to a file after picking `ChangeFile` (one per tick).
    pub write_ticks: u32,
    /// Pause between two waves, in milliseconds.
    pub wave_interval_ms: u64,
    /// Only offer `EnterDirectory` when the current directory also holds owned files.
    pub enter_requires_files: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            weights: WeightTable::default(),
            wait_ticks: 500,
            write_ticks: 50,
            wave_interval_ms: 1,
            enter_requires_files: false,
        }
    }
}

/// Tunables file loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO failure.
    #[error("io error reading {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Malformed JSON.
    #[error("invalid tunables in {}: {source}", path.display())]
    Json {
        /// File being parsed.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

impl Tunables {
    /// Load tunables from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Set the weight table.
    pub fn with_weights(mut self, weights: WeightTable) -> Self {
        self.weights = weights;
        self
    }

    /// Set wait and write tick budgets.
    pub fn with_tick_budgets(mut self, wait_ticks: u32, write_ticks: u32) -> Self {
        self.wait_ticks = wait_ticks;
        self.write_ticks = write_ticks;
        self
    }

    /// Set the pause between waves.
    pub fn with_wave_interval_ms(mut self, wave_interval_ms: u64) -> Self {
        self.wave_interval_ms = wave_interval_ms;
        self
    }

    /// Require owned files next to owned directories before entering one.
    pub fn with_enter_requires_files(mut self, enabled: bool) -> Self {
        self.enter_requires_files = enabled;
        self
    }
}

/// Configuration for one churn run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnConfig {
    /// Directory the workers mutate.
    pub root: PathBuf,
    /// Seed for the whole run; drawn from system randomness when unset.
    pub seed: Option<u64>,
    /// Number of workers.
    pub worker_count: usize,
    /// Engine tunables.
    pub tunables: Tunables,
}

impl ChurnConfig {
    /// Configuration with default worker count and tunables.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seed: None,
            worker_count: DEFAULT_WORKER_COUNT,
            tunables: Tunables::default(),
        }
    }

    /// Set seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set worker count.
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set tunables.
    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }
}
