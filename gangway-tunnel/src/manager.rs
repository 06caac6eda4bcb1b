//! The singleton tunnel session and its lifecycle.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::provider::{LOCALTUNNEL_PASSWORD_URL, Provider, TunnelOptions};

struct ActiveTunnel {
    provider: Provider,
    generation: u64,
    pid: i32,
    /// First-wins latch for the discovered public URL.
    url: Arc<OnceLock<String>>,
    /// Best-effort LocalTunnel access password.
    password: Arc<OnceLock<String>>,
}

/// Owns the single active tunnel session.
///
/// Starting a session while one is active is rejected with
/// [`Error::AlreadyRunning`]; the session slot is vacated when the backend
/// exits or when [`stop`] tears it down.
///
/// [`stop`]: TunnelManager::stop
pub struct TunnelManager {
    session: Arc<Mutex<Option<ActiveTunnel>>>,
    next_generation: AtomicU64,
}

impl TunnelManager {
    pub fn new() -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Start a tunnel for `port` via `provider`.
    ///
    /// Returns as soon as the backend is spawned; the public URL resolves
    /// asynchronously, once, when it first appears in the backend's output.
    /// A missing backend executable surfaces synchronously as
    /// [`Error::DependencyUnavailable`] and leaves the slot vacant.
    pub fn start(&self, port: u16, provider: Provider, options: &TunnelOptions) -> Result<()> {
        info!("starting {} tunnel for port {port}", provider.name());
        let (program, args) = provider.command(port, options);
        self.launch(provider, &program, &args)
    }

    fn launch(&self, provider: Provider, program: &str, args: &[String]) -> Result<()> {
        let mut session = self.session.lock().unwrap();
        if session.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| Error::DependencyUnavailable {
            provider: provider.name().to_string(),
            reason: e.to_string(),
        })?;

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let pid = child.id().map(|id| id as i32).unwrap_or(-1);
        let url = Arc::new(OnceLock::new());
        let password = Arc::new(OnceLock::new());

        let stdout_task = child
            .stdout
            .take()
            .map(|s| spawn_scan_reader(s, provider, Arc::clone(&url), Arc::clone(&password)));
        let stderr_task = child
            .stderr
            .take()
            .map(|s| spawn_scan_reader(s, provider, Arc::clone(&url), Arc::clone(&password)));

        *session = Some(ActiveTunnel {
            provider,
            generation,
            pid,
            url: Arc::clone(&url),
            password,
        });
        drop(session);

        // Observe backend exit: a backend that dies before producing a URL is
        // a provider failure; either way the slot is vacated so a new
        // session can start.
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            if let Some(task) = stdout_task {
                let _ = task.await;
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }
            let status = child.wait().await;

            let vacated = {
                let mut guard = session.lock().unwrap();
                if guard
                    .as_ref()
                    .is_some_and(|active| active.generation == generation)
                {
                    guard.take()
                } else {
                    None
                }
            };

            if vacated.is_some() {
                if url.get().is_none() {
                    warn!(
                        "{} backend exited before producing a URL ({})",
                        provider.name(),
                        status
                            .map(|s| s.to_string())
                            .unwrap_or_else(|e| e.to_string())
                    );
                } else {
                    info!("{} tunnel closed", provider.name());
                }
            }
        });

        Ok(())
    }

    /// The resolved public URL, if the session has settled.
    pub fn url(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|active| active.url.get().cloned())
    }

    /// The fetched LocalTunnel access password, if any.
    pub fn password(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|active| active.password.get().cloned())
    }

    /// Whether a session slot is occupied (starting or active).
    pub fn is_running(&self) -> bool {
        self.session.lock().unwrap().is_some()
    }

    /// The provider of the active session, if any.
    pub fn provider(&self) -> Option<Provider> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|active| active.provider)
    }

    /// Tear down the active session: best-effort SIGTERM to the backend,
    /// then clear the slot regardless of outcome. No-op without a session.
    pub fn stop(&self) {
        let Some(active) = self.session.lock().unwrap().take() else {
            return;
        };
        info!("stopping {} tunnel", active.provider.name());
        send_sigterm(active.pid);
    }
}

impl Default for TunnelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan one output stream line-by-line for the provider's URL shape.
/// The first match across both streams wins; later matches are ignored.
fn spawn_scan_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    provider: Provider,
    url: Arc<OnceLock<String>>,
    password: Arc<OnceLock<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("{}: {line}", provider.name());
            if let Some(matched) = provider.match_url(&line)
                && url.set(matched.clone()).is_ok()
            {
                info!("tunnel active: {matched}");
                if provider == Provider::LocalTunnel {
                    spawn_password_fetch(Arc::clone(&password));
                }
            }
        }
    })
}

/// Best-effort fetch of the LocalTunnel public-access password; failure
/// merely leaves the password unset.
fn spawn_password_fetch(password: Arc<OnceLock<String>>) {
    tokio::spawn(async move {
        let fetched = async {
            reqwest::get(LOCALTUNNEL_PASSWORD_URL)
                .await?
                .error_for_status()?
                .text()
                .await
        }
        .await;
        match fetched {
            Ok(body) => {
                let _ = password.set(body.trim().to_string());
            }
            Err(e) => debug!("tunnel password fetch failed: {e}"),
        }
    });
}

#[cfg(unix)]
fn send_sigterm(pid: i32) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    match signal::kill(Pid::from_raw(-pid), Signal::SIGTERM) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => debug!("tunnel process group {pid} already gone"),
        Err(e) => warn!("failed to terminate tunnel process group {pid}: {e}"),
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: i32) {}
