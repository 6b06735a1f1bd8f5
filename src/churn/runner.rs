//! Embedded entry point: churn a directory for a while, in the caller's runtime.

use std::path::PathBuf;
use std::time::Duration;

use super::config::{ChurnConfig, DEFAULT_WORKER_COUNT, Tunables};
use super::driver::{ChurnError, Driver, RunLimit, RunSummary, StopHandle};
use super::events::LogRelay;

/// Optional knobs for [`run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChurnOptions {
    /// Seed for a reproducible run.
    pub seed: Option<u64>,
    /// Number of workers; more workers means more changes.
    pub worker_count: Option<usize>,
}

impl ChurnOptions {
    /// Set seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set worker count.
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = Some(worker_count);
        self
    }
}

/// Builder for an embedded run; `path` and a limit are required.
#[derive(Default)]
pub struct ChurnRequest {
    path: Option<PathBuf>,
    limit: Option<RunLimit>,
    options: ChurnOptions,
    tunables: Tunables,
    relay: Option<LogRelay>,
    stop: Option<StopHandle>,
}

impl ChurnRequest {
    /// Empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory to churn.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Run for a wall-clock duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.limit = Some(RunLimit::Duration(duration));
        self
    }

    /// Run until `limit`.
    pub fn with_limit(mut self, limit: RunLimit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Seed and worker count.
    pub fn with_options(mut self, options: ChurnOptions) -> Self {
        self.options = options;
        self
    }

    /// Engine tunables.
    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }

    /// Receive one line per non-wait action and per isolated failure.
    pub fn with_log_relay(mut self, relay: LogRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// External stop signal; the run also ends early when it fires.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Validate the request, then churn until the limit or the stop signal.
    pub async fn run(self) -> Result<RunSummary, ChurnError> {
        let path = self
            .path
            .ok_or_else(|| ChurnError::Configuration("path argument can't be null".to_string()))?;
        let limit = self.limit.ok_or_else(|| {
            ChurnError::Configuration("duration argument can't be null".to_string())
        })?;

        let mut config = ChurnConfig::new(path)
            .with_worker_count(self.options.worker_count.unwrap_or(DEFAULT_WORKER_COUNT))
            .with_tunables(self.tunables);
        config.seed = self.options.seed;

        let mut driver = Driver::new(&config).await?;
        if let Some(relay) = self.relay {
            driver = driver.with_log_relay(relay);
        }
        let stop = self.stop.unwrap_or_default();
        Ok(driver.run(limit, stop.subscribe()).await)
    }
}

/// Churn `path` for `duration`.
///
/// Fails before any mutation when the path does not exist or is not a directory.
pub async fn run(
    path: impl Into<PathBuf>,
    duration: Duration,
    options: ChurnOptions,
) -> Result<RunSummary, ChurnError> {
    ChurnRequest::new()
        .with_path(path)
        .with_duration(duration)
        .with_options(options)
        .run()
        .await
}
