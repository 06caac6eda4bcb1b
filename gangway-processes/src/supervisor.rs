//! Single-slot child process supervision.
//!
//! The supervisor owns at most one external process at a time. Starting it
//! wires both output streams into the shared ring buffer and forwards every
//! line to the caller's event channel; stopping it sends SIGTERM to the
//! process group and arms one deferred SIGKILL that fires after the grace
//! period unless the process exits first.
//!
//! The one non-trivial concurrency contract lives in `stop`: the race between
//! "process exits naturally" and "grace period expires" must always resolve
//! in favor of not double-signaling. Exit observation cancels the slot's
//! `CancellationToken`, and the kill task additionally re-checks the slot
//! generation before signaling, so a recycled pid is never killed.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::SpawnSpec;
use crate::error::{Error, Result};
use crate::log_buffer::{OutputEntry, OutputRingBuffer, StreamKind};

/// Default wait between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(5000);

/// Lifecycle of the supervised process.
///
/// Spawning is synchronous, so `Starting` is transient; `Exited` is reported
/// through [`ProcessEvent::Exited`] as the slot is vacated rather than parked
/// in the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Stopping,
    Exited,
}

/// Notifications delivered on the supervisor's event channel.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// One captured output line, forwarded unmodified.
    Output { stream: StreamKind, text: String },
    /// The supervised process terminated. Non-zero exits and signals are
    /// reported here and logged as warnings; they are not host faults.
    Exited {
        code: Option<i32>,
        signal: Option<String>,
    },
    /// The process could not be spawned or waited on.
    SpawnFailed { message: String },
}

struct ActiveProcess {
    pid: i32,
    generation: u64,
    state: ProcessState,
    cancel: CancellationToken,
    spec: SpawnSpec,
}

/// Supervises exactly one foreground child process.
///
/// Owned by the composition root and shared by reference; all mutation of the
/// process slot happens here.
pub struct Supervisor {
    slot: Arc<Mutex<Option<ActiveProcess>>>,
    logs: Arc<Mutex<OutputRingBuffer>>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    next_generation: AtomicU64,
    forced_kills: Arc<AtomicU64>,
    grace_period: Duration,
}

impl Supervisor {
    pub fn new(events: mpsc::UnboundedSender<ProcessEvent>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            logs: Arc::new(Mutex::new(OutputRingBuffer::default())),
            events,
            next_generation: AtomicU64::new(0),
            forced_kills: Arc::new(AtomicU64::new(0)),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_buffer_capacity(self, capacity: usize) -> Self {
        *self.logs.lock().unwrap() = OutputRingBuffer::new(capacity);
        self
    }

    /// Launch the process described by `spec` into the singleton slot.
    ///
    /// Fails with [`Error::AlreadyRunning`] when a process is active; the
    /// existing process is never replaced. Spawn-level failures (executable
    /// not found, permission denied) are returned synchronously and leave the
    /// slot vacant.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, spec: SpawnSpec) -> Result<()> {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let mut cmd = build_command(&spec);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("failed to spawn `{}`: {e}", spec.display_command());
                let _ = self.events.send(ProcessEvent::SpawnFailed {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let pid = child.id().map(|id| id as i32).unwrap_or(-1);
        let cancel = CancellationToken::new();

        info!("started `{}` (pid {pid})", spec.display_command());

        let stdout_task = child
            .stdout
            .take()
            .map(|s| self.spawn_stream_reader(s, StreamKind::Stdout));
        let stderr_task = child
            .stderr
            .take()
            .map(|s| self.spawn_stream_reader(s, StreamKind::Stderr));

        *slot = Some(ActiveProcess {
            pid,
            generation,
            state: ProcessState::Running,
            cancel: cancel.clone(),
            spec,
        });
        drop(slot);

        self.spawn_exit_observer(child, generation, stdout_task, stderr_task);
        Ok(())
    }

    /// Request shutdown of the active process, if any.
    ///
    /// Sends SIGTERM to the process group and arms a single deferred SIGKILL
    /// for after the grace period. The deferred kill is cancelled the instant
    /// termination is observed. No-op when the slot is empty or when a stop
    /// is already in progress; at most one kill timer is armed per process.
    pub fn stop(&self) {
        let (pid, generation, cancel) = {
            let mut slot = self.slot.lock().unwrap();
            match slot.as_mut() {
                None => {
                    debug!("stop requested with no active process");
                    return;
                }
                Some(active) if active.state == ProcessState::Stopping => {
                    debug!("stop already in progress for pid {}", active.pid);
                    return;
                }
                Some(active) => {
                    active.state = ProcessState::Stopping;
                    (active.pid, active.generation, active.cancel.clone())
                }
            }
        };

        info!("stopping process (pid {pid})");
        send_signal(pid, TerminateKind::Graceful);

        let slot = Arc::clone(&self.slot);
        let forced_kills = Arc::clone(&self.forced_kills);
        let grace_period = self.grace_period;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("process exited within grace period, forceful kill cancelled");
                }
                _ = tokio::time::sleep(grace_period) => {
                    // Only fire if the slot still holds the same generation;
                    // the pid may have been recycled otherwise.
                    let still_ours = slot
                        .lock()
                        .unwrap()
                        .as_ref()
                        .is_some_and(|active| active.generation == generation);
                    if still_ours {
                        warn!("grace period expired, force killing pid {pid}");
                        send_signal(pid, TerminateKind::Forceful);
                        forced_kills.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        });
    }

    /// O(1) query of slot occupancy.
    pub fn is_running(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    /// State of the active process, if any.
    pub fn state(&self) -> Option<ProcessState> {
        self.slot.lock().unwrap().as_ref().map(|active| active.state)
    }

    /// The command line of the active process, for display.
    pub fn current_command(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .map(|active| active.spec.display_command())
    }

    /// The most recent `count` captured output lines, oldest first.
    pub fn tail(&self, count: usize) -> Vec<OutputEntry> {
        self.logs.lock().unwrap().tail(count)
    }

    /// How many forceful kills have been issued over the supervisor's life.
    pub fn forced_kill_count(&self) -> u64 {
        self.forced_kills.load(Ordering::SeqCst)
    }

    fn spawn_stream_reader(
        &self,
        stream: impl AsyncRead + Unpin + Send + 'static,
        kind: StreamKind,
    ) -> JoinHandle<()> {
        let logs = Arc::clone(&self.logs);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        logs.lock().unwrap().append(kind, line.clone());
                        let _ = events.send(ProcessEvent::Output {
                            stream: kind,
                            text: line,
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("error reading {kind:?} stream: {e}");
                        break;
                    }
                }
            }
        })
    }

    /// Await process exit, after both output streams have drained, then
    /// vacate the slot and report the exit condition.
    fn spawn_exit_observer(
        &self,
        mut child: tokio::process::Child,
        generation: u64,
        stdout_task: Option<JoinHandle<()>>,
        stderr_task: Option<JoinHandle<()>>,
    ) {
        let slot = Arc::clone(&self.slot);
        let events = self.events.clone();
        tokio::spawn(async move {
            // Drain output first so the exit notification is ordered after
            // every buffered chunk.
            if let Some(task) = stdout_task {
                let _ = task.await;
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }
            let status = child.wait().await;

            // Vacate the slot and cancel any pending forceful kill.
            {
                let mut guard = slot.lock().unwrap();
                if guard
                    .as_ref()
                    .is_some_and(|active| active.generation == generation)
                {
                    if let Some(active) = guard.take() {
                        active.cancel.cancel();
                    }
                }
            }

            match status {
                Ok(status) => {
                    let code = status.code();
                    let signal = signal_name(&status);
                    if let Some(code) = code
                        && code != 0
                    {
                        warn!("process exited with code {code}");
                    }
                    if let Some(ref signal) = signal {
                        warn!("process killed with signal {signal}");
                    }
                    let _ = events.send(ProcessEvent::Exited { code, signal });
                }
                Err(e) => {
                    error!("failed to observe process exit: {e}");
                    let _ = events.send(ProcessEvent::SpawnFailed {
                        message: e.to_string(),
                    });
                }
            }
        });
    }
}

fn build_command(spec: &SpawnSpec) -> Command {
    let mut cmd = if spec.use_shell {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(spec.display_command());
        shell
    } else {
        let mut direct = Command::new(&spec.program);
        direct.args(&spec.args);
        direct
    };
    cmd.current_dir(&spec.cwd);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    cmd
}

enum TerminateKind {
    Graceful,
    Forceful,
}

#[cfg(unix)]
fn send_signal(pid: i32, kind: TerminateKind) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let signal = match kind {
        TerminateKind::Graceful => Signal::SIGTERM,
        TerminateKind::Forceful => Signal::SIGKILL,
    };
    // Negative pid targets the process group created at spawn.
    match signal::kill(Pid::from_raw(-pid), signal) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => debug!("process group {pid} already gone"),
        Err(e) => warn!("failed to send {signal} to process group {pid}: {e}"),
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: i32, _kind: TerminateKind) {}

#[cfg(unix)]
fn signal_name(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|raw| {
        nix::sys::signal::Signal::try_from(raw)
            .map(|signal| signal.as_str().to_string())
            .unwrap_or_else(|_| raw.to_string())
    })
}

#[cfg(not(unix))]
fn signal_name(_status: &std::process::ExitStatus) -> Option<String> {
    None
}
