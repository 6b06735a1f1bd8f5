//! Engine side of the control protocol.
//!
//! An [`Engine`] owns its own run state (pending setup and active run), so several engines can
//! live in one process. It reacts to [`HostMessage`]s and answers with [`EngineMessage`]s.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use super::config::{ChurnConfig, DEFAULT_WORKER_COUNT, Tunables};
use super::driver::{ChurnError, Driver, RunLimit, RunSummary, StopHandle};
use super::events::LogRelay;
use super::protocol::{EngineMessage, HostMessage, decode_line, encode_line};

type RunTask = JoinHandle<Result<RunSummary, ChurnError>>;

struct ActiveRun {
    stop: StopHandle,
    task: RunTask,
}

enum Wake {
    Message(Option<HostMessage>),
    RunEnded(Result<Result<RunSummary, ChurnError>, JoinError>),
}

/// Message-driven wrapper around a [`Driver`].
pub struct Engine {
    outbox: mpsc::UnboundedSender<EngineMessage>,
    tunables: Tunables,
    setup: Option<ChurnConfig>,
    active: Option<ActiveRun>,
}

impl Engine {
    /// Engine that reports to `outbox` and runs with `tunables`.
    pub fn new(outbox: mpsc::UnboundedSender<EngineMessage>, tunables: Tunables) -> Self {
        Self {
            outbox,
            tunables,
            setup: None,
            active: None,
        }
    }

    /// True while a run is active.
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Configuration stored by the last accepted `Setup`.
    pub fn setup(&self) -> Option<&ChurnConfig> {
        self.setup.as_ref()
    }

    fn send(&self, message: EngineMessage) {
        if self.outbox.send(message).is_err() {
            tracing::debug!("host went away; dropping engine message");
        }
    }

    /// Process messages until the host side of `inbox` closes.
    ///
    /// Closing the inbox stops any active run before returning.
    pub async fn serve(mut self, mut inbox: mpsc::UnboundedReceiver<HostMessage>) {
        loop {
            let wake = match self.active.as_mut() {
                Some(active) => tokio::select! {
                    message = inbox.recv() => Wake::Message(message),
                    ended = &mut active.task => Wake::RunEnded(ended),
                },
                None => Wake::Message(inbox.recv().await),
            };

            match wake {
                Wake::Message(Some(message)) => self.handle(message).await,
                Wake::Message(None) => {
                    self.halt().await;
                    break;
                }
                Wake::RunEnded(ended) => {
                    self.active = None;
                    self.report(ended);
                }
            }
        }
        tracing::debug!("engine exiting");
    }

    /// Apply one host message.
    pub async fn handle(&mut self, message: HostMessage) {
        tracing::debug!(?message, "engine received message");
        match message {
            HostMessage::Setup {
                path,
                seed,
                worker_count,
            } => {
                if self.is_running() {
                    tracing::debug!("ignoring setup while running");
                    return;
                }
                let config = ChurnConfig::new(path)
                    .with_seed(seed.unwrap_or_else(rand::random))
                    .with_worker_count(worker_count.unwrap_or(DEFAULT_WORKER_COUNT))
                    .with_tunables(self.tunables.clone());
                self.setup = Some(config);
            }
            HostMessage::Start => {
                if self.is_running() {
                    tracing::debug!("ignoring start while running");
                    return;
                }
                let Some(config) = self.setup.clone() else {
                    tracing::debug!("ignoring start without setup");
                    return;
                };
                self.active = Some(self.launch(config));
            }
            HostMessage::Stop => {
                self.halt().await;
                self.send(EngineMessage::Stopped);
            }
        }
    }

    fn launch(&self, config: ChurnConfig) -> ActiveRun {
        let stop = StopHandle::new();
        let receiver = stop.subscribe();
        let outbox = self.outbox.clone();
        let relay: LogRelay = Arc::new(move |line: &str| {
            let _ = outbox.send(EngineMessage::log(line));
        });
        let task = tokio::spawn(async move {
            let driver = Driver::new(&config).await?.with_log_relay(relay);
            Ok(driver.run(RunLimit::UntilStopped, receiver).await)
        });
        ActiveRun { stop, task }
    }

    async fn halt(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.stop();
            let ended = active.task.await;
            self.report(ended);
        }
    }

    fn report(&self, ended: Result<Result<RunSummary, ChurnError>, JoinError>) {
        match ended {
            Ok(Ok(summary)) => {
                tracing::debug!(waves = summary.waves, events = summary.events, "run ended");
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "run could not start");
                self.send(EngineMessage::log(format!("Error: {err}")));
            }
            Err(err) => {
                tracing::error!(error = %err, "run task failed");
                self.send(EngineMessage::log(format!("Error: run task failed: {err}")));
            }
        }
    }
}

/// Serve an engine over a line transport until the reader reaches end of input.
///
/// Malformed lines are logged and skipped.
pub async fn serve_lines<R, W>(reader: R, mut writer: W, tunables: Tunables) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
    let engine = tokio::spawn(Engine::new(outbox_tx, tunables).serve(inbox_rx));

    let mut reader = reader;
    let mut buf = Vec::new();
    let mut inbox_tx = Some(inbox_tx);
    loop {
        tokio::select! {
            // `read_until` keeps partial input in `buf` when the other branch wins.
            read = reader.read_until(b'\n', &mut buf), if inbox_tx.is_some() => {
                let read = read?;
                let line = std::mem::take(&mut buf);
                if let Some(tx) = &inbox_tx {
                    forward_line(&line, tx);
                }
                // End of input: closing the inbox makes the engine stop and exit.
                if read == 0 {
                    inbox_tx = None;
                }
            }
            message = outbox_rx.recv() => match message {
                Some(message) => {
                    let line = encode_line(&message).map_err(std::io::Error::other)?;
                    writer.write_all(line.as_bytes()).await?;
                    writer.flush().await?;
                }
                None => break,
            },
        }
    }

    if let Err(err) = engine.await {
        tracing::error!(error = %err, "engine task failed");
    }
    Ok(())
}

fn forward_line(bytes: &[u8], inbox: &mpsc::UnboundedSender<HostMessage>) {
    let line = match std::str::from_utf8(bytes) {
        Ok(line) => line,
        Err(err) => {
            tracing::warn!(error = %err, "skipping non utf-8 line");
            return;
        }
    };
    if line.trim().is_empty() {
        return;
    }
    match decode_line::<HostMessage>(line) {
        Ok(message) => {
            let _ = inbox.send(message);
        }
        Err(err) => tracing::warn!(error = %err, line = %line.trim_end(), "skipping malformed message"),
    }
}
