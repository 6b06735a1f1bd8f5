//! Per-worker random walk over a subtree.
//!
//! A worker only ever touches entries whose name starts with `<name>_`, so several workers can
//! share one root without locking. Its cursor is stored relative to the base directory and only
//! grows by owned directory names or shrinks by one component, so it can never leave the base.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::action::Action;
use super::config::Tunables;
use super::events::ChurnEvent;
use super::selector::WeightedSelector;
use super::words;

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Next tick runs the decision procedure.
    Idle,
    /// A file is open and receives one word per tick.
    Writing,
    /// Inert for a number of ticks.
    Waiting,
}

/// Unexpected filesystem failure during a tick.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// IO failure while performing `operation` on `path`.
    #[error("could not {operation} {}: {source}", path.display())]
    Io {
        /// Worker name.
        actor: String,
        /// Short description of the failed operation.
        operation: &'static str,
        /// Absolute path involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

#[derive(Debug)]
enum Activity {
    Idle,
    Writing {
        file: File,
        path: PathBuf,
        ticks_remaining: i64,
    },
    Waiting {
        ticks_remaining: i64,
    },
}

#[derive(Debug, Default)]
struct OwnedEntries {
    directories: Vec<String>,
    files: Vec<String>,
}

/// One random-walk state machine.
#[derive(Debug)]
pub struct Worker<R = SmallRng> {
    name: String,
    prefix: String,
    base: PathBuf,
    cursor: PathBuf,
    activity: Activity,
    rng: R,
    tunables: Arc<Tunables>,
}

impl Worker<SmallRng> {
    /// Worker `worker<index>` whose generator is seeded from `run_seed + index`.
    pub fn seeded(
        index: usize,
        base: impl Into<PathBuf>,
        run_seed: u64,
        tunables: Arc<Tunables>,
    ) -> Self {
        let rng = SmallRng::seed_from_u64(run_seed.wrapping_add(index as u64));
        Self::with_rng(format!("worker{index}"), base, rng, tunables)
    }
}

impl<R: Rng> Worker<R> {
    /// Worker with an explicit name and generator.
    pub fn with_rng(
        name: impl Into<String>,
        base: impl Into<PathBuf>,
        rng: R,
        tunables: Arc<Tunables>,
    ) -> Self {
        let name = name.into();
        Self {
            prefix: format!("{name}_"),
            name,
            base: base.into(),
            cursor: PathBuf::new(),
            activity: Activity::Idle,
            rng,
            tunables,
        }
    }

    /// Worker name, also the prefix of every entry it owns.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root of the worker's authority.
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Cursor relative to the base; empty at the base itself.
    pub fn relative_path(&self) -> &Path {
        &self.cursor
    }

    /// Absolute cursor.
    pub fn current_path(&self) -> PathBuf {
        if self.cursor.as_os_str().is_empty() {
            self.base.clone()
        } else {
            self.base.join(&self.cursor)
        }
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        match self.activity {
            Activity::Idle => WorkerState::Idle,
            Activity::Writing { .. } => WorkerState::Writing,
            Activity::Waiting { .. } => WorkerState::Waiting,
        }
    }

    /// Remaining ticks while writing or waiting.
    pub fn ticks_remaining(&self) -> Option<i64> {
        match self.activity {
            Activity::Idle => None,
            Activity::Writing {
                ticks_remaining, ..
            }
            | Activity::Waiting { ticks_remaining } => Some(ticks_remaining),
        }
    }

    /// True if an entry with this file name belongs to the worker.
    pub fn owns(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.prefix)
    }

    /// Advance by one unit of work.
    ///
    /// Returns the action decided on when the worker was idle, `None` for continuation ticks and
    /// for idle ticks where no candidate had a positive weight.
    pub async fn tick(&mut self) -> Result<Option<ChurnEvent>, WorkerError> {
        match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Idle => self.decide().await,
            Activity::Writing {
                mut file,
                path,
                ticks_remaining,
            } => {
                let mut chunk = words::word(&mut self.rng);
                chunk.push(' ');
                if let Err(source) = append(&mut file, chunk.as_bytes()).await {
                    return Err(self.io_error("append to", &path, source));
                }
                let ticks_remaining = ticks_remaining - 1;
                if ticks_remaining >= 0 {
                    self.activity = Activity::Writing {
                        file,
                        path,
                        ticks_remaining,
                    };
                }
                Ok(None)
            }
            Activity::Waiting { ticks_remaining } => {
                let ticks_remaining = ticks_remaining - 1;
                if ticks_remaining >= 0 {
                    self.activity = Activity::Waiting { ticks_remaining };
                }
                Ok(None)
            }
        }
    }

    /// Drop whatever the worker is doing and return to idle, flushing and closing an open file.
    ///
    /// The worker is idle afterwards even when the flush fails.
    pub async fn force_idle(&mut self) -> Result<(), WorkerError> {
        match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Writing { mut file, path, .. } => file
                .flush()
                .await
                .map_err(|source| self.io_error("flush", &path, source)),
            Activity::Idle | Activity::Waiting { .. } => Ok(()),
        }
    }

    fn io_error(&self, operation: &'static str, path: &Path, source: io::Error) -> WorkerError {
        WorkerError::Io {
            actor: self.name.clone(),
            operation,
            path: path.to_path_buf(),
            source,
        }
    }

    async fn decide(&mut self) -> Result<Option<ChurnEvent>, WorkerError> {
        let here = self.current_path();
        let owned = match self.list_owned(&here).await {
            Ok(owned) => owned,
            Err(source) => {
                // Our own directory was removed from outside; start over from the base.
                if source.kind() == io::ErrorKind::NotFound {
                    self.cursor.clear();
                }
                return Err(self.io_error("list", &here, source));
            }
        };

        let candidates = self.candidates(&owned);
        let selector = WeightedSelector::from_candidates(&candidates, &self.tunables.weights);
        let Some(action) = selector.pick(&mut self.rng) else {
            return Ok(None);
        };
        self.execute(action, &here, &owned).await
    }

    async fn list_owned(&self, dir: &Path) -> io::Result<OwnedEntries> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if self.owns(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        let mut owned = OwnedEntries::default();
        for name in names {
            match fs::metadata(dir.join(&name)).await {
                Ok(meta) if meta.is_dir() => owned.directories.push(name),
                Ok(_) => owned.files.push(name),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::trace!(actor = %self.name, entry = %name, "entry vanished after listing");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(owned)
    }

    fn candidates(&self, owned: &OwnedEntries) -> Vec<Action> {
        let mut candidates = vec![Action::Wait, Action::AddFile, Action::AddDirectory];
        if !self.cursor.as_os_str().is_empty() {
            candidates.push(Action::ExitDirectory);
        }
        if !owned.directories.is_empty() {
            candidates.push(Action::DeleteDirectory);
            if !self.tunables.enter_requires_files || !owned.files.is_empty() {
                candidates.push(Action::EnterDirectory);
            }
        }
        if !owned.files.is_empty() {
            candidates.push(Action::ChangeFile);
            candidates.push(Action::DeleteFile);
        }
        candidates
    }

    async fn execute(
        &mut self,
        action: Action,
        here: &Path,
        owned: &OwnedEntries,
    ) -> Result<Option<ChurnEvent>, WorkerError> {
        let first_file = owned.files.first();
        let first_directory = owned.directories.first();

        let relative = match (action, first_file, first_directory) {
            (Action::AddFile, _, _) => {
                let name = self.fresh_name(here).await?;
                let path = here.join(&name);
                let contents = words::sentence(&mut self.rng);
                fs::write(&path, contents)
                    .await
                    .map_err(|source| self.io_error("create file", &path, source))?;
                self.cursor.join(name)
            }
            (Action::AddDirectory, _, _) => {
                let name = self.fresh_name(here).await?;
                let path = here.join(&name);
                fs::create_dir(&path)
                    .await
                    .map_err(|source| self.io_error("create directory", &path, source))?;
                self.cursor.join(name)
            }
            (Action::ChangeFile, Some(name), _) => {
                let path = here.join(name);
                let file = OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .create(true)
                    .open(&path)
                    .await
                    .map_err(|source| self.io_error("open", &path, source))?;
                self.activity = Activity::Writing {
                    file,
                    path,
                    ticks_remaining: i64::from(self.tunables.write_ticks),
                };
                self.cursor.join(name)
            }
            (Action::DeleteFile, Some(name), _) => {
                let path = here.join(name);
                fs::remove_file(&path)
                    .await
                    .map_err(|source| self.io_error("delete file", &path, source))?;
                self.cursor.join(name)
            }
            (Action::DeleteDirectory, _, Some(name)) => {
                let path = here.join(name);
                fs::remove_dir_all(&path)
                    .await
                    .map_err(|source| self.io_error("delete directory", &path, source))?;
                self.cursor.join(name)
            }
            (Action::EnterDirectory, _, Some(name)) => {
                self.cursor.push(name);
                self.cursor.clone()
            }
            (Action::ExitDirectory, _, _) => {
                let left = self.cursor.clone();
                self.cursor.pop();
                left
            }
            (Action::Wait, _, _) => {
                self.activity = Activity::Waiting {
                    ticks_remaining: i64::from(self.tunables.wait_ticks),
                };
                self.cursor.clone()
            }
            // Candidates guarantee the lists are non-empty for these actions.
            (Action::ChangeFile | Action::DeleteFile, None, _)
            | (Action::DeleteDirectory | Action::EnterDirectory, _, None) => return Ok(None),
        };

        Ok(Some(ChurnEvent::new(self.name.clone(), action, relative)))
    }

    async fn fresh_name(&mut self, dir: &Path) -> Result<String, WorkerError> {
        let mut name = format!("{}{}", self.prefix, words::d8(&mut self.rng));
        loop {
            let candidate = dir.join(&name);
            match fs::symlink_metadata(&candidate).await {
                Ok(_) => name.push(words::d8(&mut self.rng)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(name),
                Err(source) => return Err(self.io_error("probe", &candidate, source)),
            }
        }
    }
}

async fn append(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}
