//! Host side of the control protocol.
//!
//! A [`Controller`] runs an engine in a separate execution context (a tokio task or a child
//! process) and drives it with [`HostMessage`]s. `stop()` resolves only once the engine has
//! confirmed with `Stopped`; there is no timeout.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::config::Tunables;
use super::engine::Engine;
use super::events::LogRelay;
use super::protocol::{EngineMessage, HostMessage, decode_line, encode_line};

/// Controller errors.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The engine exited or its channel closed before answering.
    #[error("engine is no longer reachable")]
    EngineGone,
    /// The engine process could not be started.
    #[error("failed to spawn engine process: {0}")]
    Spawn(#[source] std::io::Error),
    /// IO failure while releasing the engine process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for [`Controller::create`] and [`Controller::spawn_process`].
#[derive(Clone, Default)]
pub struct ControllerOptions {
    /// Seed for a reproducible run.
    pub seed: Option<u64>,
    /// Number of workers.
    pub worker_count: Option<usize>,
    /// Receives every engine log line; defaults to `tracing` at info level.
    pub log_sink: Option<LogRelay>,
    /// Engine tunables for the in-task engine. A child process uses its own.
    pub tunables: Tunables,
}

impl ControllerOptions {
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

    /// Set log sink.
    pub fn with_log_sink(mut self, sink: LogRelay) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Set tunables for the in-task engine.
    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        self.tunables = tunables;
        self
    }
}

enum Context {
    Task(JoinHandle<()>),
    Process {
        child: Child,
        bridges: Vec<JoinHandle<()>>,
    },
}

#[derive(Default)]
struct AckSlot {
    pending: Option<oneshot::Sender<()>>,
    closed: bool,
}

fn lock(slot: &Mutex<AckSlot>) -> MutexGuard<'_, AckSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to an engine running in its own execution context.
pub struct Controller {
    commands: mpsc::UnboundedSender<HostMessage>,
    ack: Arc<Mutex<AckSlot>>,
    relay: JoinHandle<()>,
    context: Context,
}

impl Controller {
    /// Spawn an engine on a tokio task and send it `Setup`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(
        path: impl Into<PathBuf>,
        options: ControllerOptions,
    ) -> Result<Self, ControlError> {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (outbox, events) = mpsc::unbounded_channel();
        let engine = Engine::new(outbox, options.tunables.clone());
        let task = tokio::spawn(engine.serve(inbox));
        Self::attach(commands, events, Context::Task(task), path.into(), options)
    }

    /// Spawn `program args...` as an engine process speaking JSON lines on stdin/stdout, and send
    /// it `Setup`.
    pub fn spawn_process<I, S>(
        program: impl AsRef<OsStr>,
        args: I,
        path: impl Into<PathBuf>,
        options: ControllerOptions,
    ) -> Result<Self, ControlError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(ControlError::Spawn)?;
        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ControlError::EngineGone);
        };

        let (commands, mut outgoing) = mpsc::unbounded_channel::<HostMessage>();
        let (incoming, events) = mpsc::unbounded_channel::<EngineMessage>();

        // Dropping stdin at the end of this task is what tells the engine to exit.
        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing.recv().await {
                let line = match encode_line(&message) {
                    Ok(line) => line,
                    Err(err) => {
                        tracing::warn!(error = %err, "could not encode host message");
                        continue;
                    }
                };
                if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err()
                {
                    break;
                }
            }
        });
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match decode_line::<EngineMessage>(&line) {
                    Ok(message) => {
                        if incoming.send(message).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, line = %line, "skipping malformed engine line"),
                }
            }
        });

        let context = Context::Process {
            child,
            bridges: vec![writer, reader],
        };
        Self::attach(commands, events, context, path.into(), options)
    }

    fn attach(
        commands: mpsc::UnboundedSender<HostMessage>,
        mut events: mpsc::UnboundedReceiver<EngineMessage>,
        context: Context,
        path: PathBuf,
        options: ControllerOptions,
    ) -> Result<Self, ControlError> {
        let ack = Arc::new(Mutex::new(AckSlot::default()));
        let slot = Arc::clone(&ack);
        let sink = options.log_sink.clone();
        let relay = tokio::spawn(async move {
            while let Some(message) = events.recv().await {
                match message {
                    EngineMessage::Log { message } => match &sink {
                        Some(sink) => sink(&message),
                        None => tracing::info!(target: "fs_churn::engine", "{message}"),
                    },
                    EngineMessage::Stopped => {
                        if let Some(tx) = lock(&slot).pending.take() {
                            let _ = tx.send(());
                        }
                    }
                }
            }
            let mut slot = lock(&slot);
            slot.closed = true;
            slot.pending = None;
        });

        let controller = Self {
            commands,
            ack,
            relay,
            context,
        };
        controller.send(HostMessage::Setup {
            path,
            seed: options.seed,
            worker_count: options.worker_count,
        })?;
        Ok(controller)
    }

    fn send(&self, message: HostMessage) -> Result<(), ControlError> {
        self.commands
            .send(message)
            .map_err(|_| ControlError::EngineGone)
    }

    /// Ask the engine to start churning. Starting twice is the same as starting once.
    pub fn start(&self) -> Result<(), ControlError> {
        self.send(HostMessage::Start)
    }

    /// Ask the engine to stop, wait for its confirmation, then release the execution context.
    pub async fn stop(self) -> Result<(), ControlError> {
        let (tx, rx) = oneshot::channel();
        let armed = {
            let mut slot = lock(&self.ack);
            if slot.closed {
                false
            } else {
                slot.pending = Some(tx);
                true
            }
        };

        let acknowledged = if armed && self.send(HostMessage::Stop).is_ok() {
            rx.await.map_err(|_| ControlError::EngineGone)
        } else {
            Err(ControlError::EngineGone)
        };

        self.release().await?;
        acknowledged
    }

    async fn release(self) -> Result<(), ControlError> {
        let Controller {
            commands,
            relay,
            context,
            ..
        } = self;
        drop(commands);

        match context {
            Context::Task(task) => {
                if let Err(err) = task.await {
                    tracing::error!(error = %err, "engine task failed");
                }
            }
            Context::Process { mut child, bridges } => {
                for bridge in bridges {
                    let _ = bridge.await;
                }
                let status = child.wait().await?;
                tracing::debug!(%status, "engine process exited");
            }
        }
        let _ = relay.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;

    fn fast_options() -> ControllerOptions {
        ControllerOptions::default()
            .with_seed(9999)
            .with_worker_count(2)
            .with_tunables(
                Tunables::default()
                    .with_tick_budgets(2, 2)
                    .with_wave_interval_ms(1),
            )
    }

    fn snapshot(root: &std::path::Path) -> Vec<(PathBuf, u64)> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).expect("dir should list") {
                let entry = entry.expect("entry should read");
                let meta = entry.metadata().expect("metadata should read");
                if meta.is_dir() {
                    stack.push(entry.path());
                }
                out.push((entry.path(), meta.len()));
            }
        }
        out.sort();
        out
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn create_start_stop_churns_and_releases() {
        let tmp = tempdir().expect("tempdir should be created");
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&lines);
        let options = fast_options().with_log_sink(Arc::new(move |line: &str| {
            sink.lock().expect("lines mutex should lock").push(line.to_string());
        }));

        let controller = Controller::create(tmp.path(), options).expect("controller should spawn");
        controller.start().expect("start should send");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.stop().await.expect("stop should be acknowledged");

        let lines = lines.lock().expect("lines mutex should lock").clone();
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|l| l.starts_with("worker0 ") || l.starts_with("worker1 ")));

        // Nothing keeps writing after stop, and every file can be removed.
        let before = snapshot(tmp.path());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(before, snapshot(tmp.path()));
        for entry in std::fs::read_dir(tmp.path()).expect("root should list") {
            let path = entry.expect("entry should read").path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path).expect("dir should be removable");
            } else {
                std::fs::remove_file(&path).expect("file should be removable");
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn starting_twice_runs_one_engine() {
        let tmp = tempdir().expect("tempdir should be created");
        let controller =
            Controller::create(tmp.path(), fast_options()).expect("controller should spawn");
        controller.start().expect("start should send");
        controller.start().expect("second start should send");
        tokio::time::sleep(Duration::from_millis(50)).await;
        // An orphaned second run would keep the engine's outbox open and stall the release.
        tokio::time::timeout(Duration::from_secs(5), controller.stop())
            .await
            .expect("stop should release the engine")
            .expect("one stop should be enough");

        let before = snapshot(tmp.path());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(before, snapshot(tmp.path()));
    }

    #[tokio::test]
    async fn stop_without_start_still_resolves() {
        let tmp = tempdir().expect("tempdir should be created");
        let controller =
            Controller::create(tmp.path(), fast_options()).expect("controller should spawn");
        controller.stop().await.expect("idle engine should acknowledge");
        assert_eq!(std::fs::read_dir(tmp.path()).expect("root should list").count(), 0);
    }

    #[tokio::test]
    async fn invalid_root_is_logged_not_fatal() {
        let tmp = tempdir().expect("tempdir should be created");
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&lines);
        let options = fast_options().with_log_sink(Arc::new(move |line: &str| {
            sink.lock().expect("lines mutex should lock").push(line.to_string());
        }));
        let controller = Controller::create(tmp.path().join("missing"), options)
            .expect("controller should spawn");
        controller.start().expect("start should send");
        tokio::time::sleep(Duration::from_millis(30)).await;
        controller.stop().await.expect("stop should be acknowledged");

        let lines = lines.lock().expect("lines mutex should lock").clone();
        assert!(lines.iter().any(|l| l.starts_with("Error: could not find path")));
    }

    #[tokio::test]
    async fn missing_engine_binary_is_a_spawn_error() {
        let tmp = tempdir().expect("tempdir should be created");
        let result = Controller::spawn_process(
            tmp.path().join("no-such-engine"),
            ["engine"],
            tmp.path(),
            ControllerOptions::default(),
        );
        assert!(matches!(result, Err(ControlError::Spawn(_))));
    }
}
