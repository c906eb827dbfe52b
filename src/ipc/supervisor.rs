//! Worker process supervision: lazy start, output routing, crash recovery.
//!
//! The supervisor owns the sidecar lifecycle as an explicit state machine
//! (`NotStarted` → `Running` → `Stopped`, with `Stopped` → `Running` on a
//! later call). One background task per process generation owns the
//! `Child`: it routes stdout lines to the pending table, mirrors stderr
//! into the log, and on exit fails every request registered under its
//! generation before the state machine can leave `Stopped`.
//!
//! The pending table and the state machine share a single mutex, so a
//! registration races with a crash drain in exactly one of two ways: the
//! entry is included in the drain, or it belongs to the next generation
//! and survives. Nothing is ever lost in between.
//!
//! Stdin writes go through a dedicated writer task fed by a channel. The
//! shared mutex is never held across a pipe write, so a worker that stops
//! draining its stdin stalls only the requests queued behind the full
//! pipe; their callers still time out on schedule, and new callers still
//! register, read counters, and stop the worker without waiting.

use std::process::Stdio;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use super::client::SidecarError;
use super::codec;
use super::launch::LaunchResolver;
use super::pending::{PendingEntry, PendingTable};

/// Hint attached to spawn failures whose cause is a missing executable.
const SPAWN_HINT: &str =
    "build it with `cargo build --bin the-search-thing-sidecar` or install the Rust toolchain so cargo is available";

/// One framed request on its way to the writer task. The id travels with
/// the line so a failed write can fail exactly the right caller.
#[derive(Debug)]
struct Outbound {
    id: u64,
    line: String,
}

#[derive(Debug)]
enum WorkerState {
    NotStarted,
    Running {
        writer: mpsc::UnboundedSender<Outbound>,
        kill: Option<oneshot::Sender<()>>,
    },
    Stopped,
}

#[derive(Debug)]
struct Inner {
    state: WorkerState,
    /// Bumped on every spawn; tags pending entries so a crash drain for a
    /// dead process cannot touch requests sent to its successor.
    generation: u64,
    pending: PendingTable,
    /// Stdout lines discarded as unparseable or uncorrelatable.
    dropped_lines: u64,
}

/// Supervises the sidecar process and owns all shared bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct Supervisor {
    resolver: LaunchResolver,
    inner: Arc<Mutex<Inner>>,
}

impl Supervisor {
    pub fn new(resolver: LaunchResolver) -> Self {
        Self {
            resolver,
            inner: Arc::new(Mutex::new(Inner {
                state: WorkerState::NotStarted,
                generation: 0,
                pending: PendingTable::default(),
                dropped_lines: 0,
            })),
        }
    }

    /// Start the worker if needed, register the pending entry, and hand
    /// the encoded request to the writer task, all under one lock
    /// acquisition. The handoff is a non-blocking channel send: the
    /// actual pipe write happens outside the lock, and a failed write
    /// removes the entry again so no timeout can fire later for a
    /// request that was never sent, failing only this call.
    pub async fn register_and_send(
        &self,
        id: u64,
        method: &str,
        line: String,
    ) -> Result<oneshot::Receiver<Result<Value, SidecarError>>, SidecarError> {
        let mut inner = self.inner.lock().await;
        self.ensure_started(&mut inner)?;

        let (tx, rx) = oneshot::channel();
        let generation = inner.generation;
        inner
            .pending
            .register(id, PendingEntry::new(method, generation, tx));

        let WorkerState::Running { writer, .. } = &inner.state else {
            // ensure_started either errors or leaves the worker running.
            inner.pending.remove(id);
            return Err(SidecarError::Protocol(
                "worker not running after start".to_string(),
            ));
        };

        if writer.send(Outbound { id, line }).is_err() {
            // Writer task already gone: the process died under us.
            inner.pending.remove(id);
            return Err(SidecarError::ProcessFault { code: None });
        }

        Ok(rx)
    }

    /// Drop the pending entry for `id`, if still registered. Called by a
    /// timed-out caller; any response arriving afterwards finds nothing.
    pub async fn forget(&self, id: u64) {
        self.inner.lock().await.pending.remove(id);
    }

    /// Forcibly terminate the worker, allowing a lazy restart later.
    ///
    /// Pending entries are not failed here; the exit path of the worker
    /// task is the single place that drains them.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let WorkerState::Running { kill, .. } = &mut inner.state {
            if let Some(kill) = kill.take() {
                let _ = kill.send(());
            }
        }
        inner.state = WorkerState::Stopped;
    }

    /// How many stdout lines have been discarded as malformed or
    /// uncorrelatable since the client was created.
    pub async fn dropped_lines(&self) -> u64 {
        self.inner.lock().await.dropped_lines
    }

    fn ensure_started(&self, inner: &mut Inner) -> Result<(), SidecarError> {
        if matches!(inner.state, WorkerState::Running { .. }) {
            return Ok(());
        }

        let spec = self.resolver.resolve()?;
        info!("starting sidecar: {:?} {:?}", spec.command, spec.args);

        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                let hint =
                    (source.kind() == std::io::ErrorKind::NotFound).then_some(SPAWN_HINT);
                SidecarError::SpawnFailed { source, hint }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SidecarError::Protocol("worker stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SidecarError::Protocol("worker stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SidecarError::Protocol("worker stderr not captured".to_string()))?;

        inner.generation += 1;
        let generation = inner.generation;
        let (kill_tx, kill_rx) = oneshot::channel();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        inner.state = WorkerState::Running {
            writer: writer_tx,
            kill: Some(kill_tx),
        };

        tokio::spawn(run_writer(stdin, writer_rx, Arc::clone(&self.inner)));
        tokio::spawn(run_worker(
            child,
            stdout,
            stderr,
            Arc::clone(&self.inner),
            generation,
            kill_rx,
        ));

        Ok(())
    }
}

/// Owns the worker's stdin for one process generation: drains the
/// outbound channel and writes each framed request in turn. Runs until
/// the state machine drops the sender (stop, crash, or restart), then
/// drops stdin so the worker sees EOF.
///
/// A failed write fails exactly the request being written: its entry is
/// removed and completed with `SendFailed`, so the caller hears back
/// immediately instead of waiting out its timeout, and nothing else in
/// flight is touched.
async fn run_writer(
    mut stdin: ChildStdin,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Mutex<Inner>>,
) {
    while let Some(outbound) = outbound_rx.recv().await {
        let write = async {
            stdin.write_all(outbound.line.as_bytes()).await?;
            stdin.flush().await
        };
        if let Err(err) = write.await {
            warn!(
                "failed to write request {} to sidecar stdin: {err}",
                outbound.id
            );
            let entry = shared.lock().await.pending.remove(outbound.id);
            if let Some(entry) = entry {
                entry.complete(Err(SidecarError::SendFailed(err)));
            }
        }
    }
}

/// Owns the child for one process generation: pumps stdout into the
/// pending table until exit or kill, then reaps the process and fails
/// everything still in flight for this generation.
async fn run_worker(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    shared: Arc<Mutex<Inner>>,
    generation: u64,
    mut kill_rx: oneshot::Receiver<()>,
) {
    // Stderr is diagnostic text only: log it, never parse it.
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                warn!("sidecar stderr: {trimmed}");
            }
        }
    });

    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            // Resolves on stop() and also when the client itself is
            // dropped, so the worker never outlives its supervisor.
            _ = &mut kill_rx => {
                if let Err(err) = child.start_kill() {
                    warn!("failed to kill sidecar: {err}");
                }
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => dispatch_line(&shared, &line).await,
                Ok(None) => break,
                Err(err) => {
                    warn!("sidecar stdout read error: {err}");
                    break;
                }
            }
        }
    }

    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(err) => {
            warn!("failed to reap sidecar: {err}");
            None
        }
    };

    let drained = {
        let mut inner = shared.lock().await;
        if inner.generation == generation {
            inner.state = WorkerState::Stopped;
        }
        inner.pending.drain_generation(generation)
    };
    if !drained.is_empty() {
        warn!(
            "sidecar exited with code {code:?}; failing {} in-flight request(s)",
            drained.len()
        );
    }
    for entry in drained {
        debug!("failing in-flight {} with process fault", entry.method());
        entry.complete(Err(SidecarError::ProcessFault { code }));
    }
}

/// Route one stdout line: complete the matching pending entry, or count
/// and drop it. Never fails the reader.
async fn dispatch_line(shared: &Mutex<Inner>, line: &str) {
    if line.trim().is_empty() {
        return;
    }

    match codec::decode_line(line) {
        Some(response) => {
            let mut inner = shared.lock().await;
            match inner.pending.remove(response.id) {
                Some(entry) => {
                    let outcome = response.outcome.map_err(|error| SidecarError::Remote {
                        code: error.code,
                        message: error.message,
                        data: error.data,
                    });
                    entry.complete(outcome);
                }
                // Already completed, timed out, or never ours.
                None => debug!("dropping response for unknown request id {}", response.id),
            }
        }
        None => {
            shared.lock().await.dropped_lines += 1;
        }
    }
}
