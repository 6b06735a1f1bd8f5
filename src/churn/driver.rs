//! Worker pool and the wave-based run loop.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::action::Action;
use super::config::ChurnConfig;
use super::events::{ChurnEvent, LogRelay, display_relative};
use super::worker::{Worker, WorkerError};

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum ChurnError {
    /// A required argument is missing or invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The root path could not be found.
    #[error("could not find path {}: {source}", path.display())]
    TargetNotFound {
        /// Requested root.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The root path exists but is not a directory.
    #[error("path isn't a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

/// When a run ends on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Stop once this much wall-clock time has elapsed.
    Duration(Duration),
    /// Stop after this many waves.
    Waves(u64),
    /// Run until the stop signal fires.
    UntilStopped,
}

/// Counters reported when a run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Seed the run used.
    pub seed: u64,
    /// Number of workers.
    pub worker_count: usize,
    /// Completed waves.
    pub waves: u64,
    /// Actions decided across all workers.
    pub events: u64,
    /// Isolated worker failures.
    pub failures: u64,
    /// Wall-clock run time.
    pub elapsed_ms: u64,
}

/// Cloneable external stop signal.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StopHandle {
    /// Fresh, unfired signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request a stop; idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// True once [`StopHandle::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver side, for use with [`Driver::run`].
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Validate that `root` exists and is a directory.
pub async fn validate_root(root: &std::path::Path) -> Result<(), ChurnError> {
    let meta = tokio::fs::metadata(root)
        .await
        .map_err(|source| ChurnError::TargetNotFound {
            path: root.to_path_buf(),
            source,
        })?;
    if !meta.is_dir() {
        return Err(ChurnError::NotADirectory(root.to_path_buf()));
    }
    Ok(())
}

/// Owns the workers of one run and advances them in waves.
pub struct Driver {
    workers: Vec<Worker>,
    seed: u64,
    wave_interval: Duration,
    relay: Option<LogRelay>,
    waves: u64,
    events: u64,
    failures: u64,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("workers", &self.workers.len())
            .field("seed", &self.seed)
            .field("waves", &self.waves)
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Validate the root and create `config.worker_count` workers.
    pub async fn new(config: &ChurnConfig) -> Result<Self, ChurnError> {
        if config.worker_count == 0 {
            return Err(ChurnError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        validate_root(&config.root).await?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let tunables = Arc::new(config.tunables.clone());
        let workers = (0..config.worker_count)
            .map(|index| Worker::seeded(index, &config.root, seed, Arc::clone(&tunables)))
            .collect();

        tracing::info!(
            root = %config.root.display(),
            seed,
            workers = config.worker_count,
            "churn driver ready"
        );

        Ok(Self {
            workers,
            seed,
            wave_interval: Duration::from_millis(config.tunables.wave_interval_ms),
            relay: None,
            waves: 0,
            events: 0,
            failures: 0,
        })
    }

    /// Forward one line per non-wait action and per isolated failure to `relay`.
    pub fn with_log_relay(mut self, relay: LogRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Seed in use (resolved from system randomness if none was configured).
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Workers in creation order.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Completed waves so far.
    pub fn waves(&self) -> u64 {
        self.waves
    }

    fn relay_line(&self, line: &str) {
        if let Some(relay) = &self.relay {
            relay(line);
        }
    }

    fn record_event(&mut self, event: &ChurnEvent) {
        self.events += 1;
        if !event.action.is_mutation() {
            tracing::debug!(actor = %event.actor, action = %event.action, path = %display_relative(&event.path), "churn");
        } else {
            tracing::info!(actor = %event.actor, action = %event.action, path = %display_relative(&event.path), "churn");
        }
        // Waits are counted but never relayed.
        if event.action != Action::Wait {
            self.relay_line(&event.to_string());
        }
    }

    /// Advance every worker exactly once, concurrently, and wait for all of them.
    ///
    /// A worker that fails is logged, forced idle and kept in the pool.
    pub async fn wave(&mut self) {
        let count = self.workers.len();
        let mut set = JoinSet::new();
        for (index, mut worker) in self.workers.drain(..).enumerate() {
            set.spawn(async move {
                let outcome = worker.tick().await;
                (index, worker, outcome)
            });
        }

        let mut slots: Vec<Option<(Worker, Result<Option<ChurnEvent>, WorkerError>)>> =
            (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, worker, outcome)) => slots[index] = Some((worker, outcome)),
                Err(err) => std::panic::resume_unwind(err.into_panic()),
            }
        }

        for (mut worker, outcome) in slots.into_iter().flatten() {
            match outcome {
                Ok(Some(event)) => self.record_event(&event),
                Ok(None) => {}
                Err(err) => {
                    self.failures += 1;
                    tracing::warn!(actor = %worker.name(), error = %err, "worker tick failed");
                    self.relay_line(&format!("{} error: {err}", worker.name()));
                    if let Err(err) = worker.force_idle().await {
                        tracing::warn!(actor = %worker.name(), error = %err, "worker reset failed");
                    }
                }
            }
            self.workers.push(worker);
        }
        self.waves += 1;
    }

    /// Force every worker back to idle, closing open files.
    pub async fn shutdown(&mut self) {
        for worker in &mut self.workers {
            if let Err(err) = worker.force_idle().await {
                tracing::warn!(actor = %worker.name(), error = %err, "failed to close worker file");
            }
        }
    }

    /// Run waves until `limit` is reached or `stop` fires, then force all workers idle.
    ///
    /// A stop request never interrupts a wave in flight; it prevents the next one.
    pub async fn run(mut self, limit: RunLimit, stop: watch::Receiver<bool>) -> RunSummary {
        let started = Instant::now();
        loop {
            if *stop.borrow() {
                tracing::info!(waves = self.waves, "stop requested");
                break;
            }
            let reached = match limit {
                RunLimit::Duration(duration) => started.elapsed() >= duration,
                RunLimit::Waves(waves) => self.waves >= waves,
                RunLimit::UntilStopped => false,
            };
            if reached {
                break;
            }

            self.wave().await;
            if !self.wave_interval.is_zero() {
                tokio::time::sleep(self.wave_interval).await;
            }
        }

        self.shutdown().await;
        let summary = RunSummary {
            seed: self.seed,
            worker_count: self.workers.len(),
            waves: self.waves,
            events: self.events,
            failures: self.failures,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        tracing::info!(
            waves = summary.waves,
            events = summary.events,
            failures = summary.failures,
            "churn run finished"
        );
        summary
    }
}
