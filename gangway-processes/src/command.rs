//! Command strategy selection: resolving a requested run mode into a
//! concrete [`SpawnSpec`] for the supervisor.
//!
//! Three strategies exist, mirroring the caller's intent:
//!
//! - [`direct`]: an arbitrary shell command, passed to the shell verbatim.
//! - [`npm_script`]: a script key looked up (and validated) in the
//!   `package.json` of the working directory.
//! - [`pm2`]: delegation to the external PM2 process manager, probed for
//!   liveness before anything is started.
//!
//! All resolution errors surface here, synchronously, before any process is
//! spawned.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::debug;

use crate::error::{Error, Result};

/// Default PM2 app name when the caller does not pass one.
pub const DEFAULT_PROCESS_NAME: &str = "gangway-app";

/// A fully-resolved description of an external process to launch.
/// Immutable after construction; consumed once by the supervisor.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Launch through the shell interpreter (`sh -c`).
    pub use_shell: bool,
    pub env: Vec<(String, String)>,
}

impl SpawnSpec {
    /// The command line as a single displayable string.
    pub fn display_command(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&shell_escape::escape(arg.into()));
        }
        out
    }
}

/// Caller-provided options for resolving a run mode.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory; defaults to the current directory.
    pub cwd: Option<PathBuf>,
    /// PM2 app name.
    pub name: Option<String>,
    /// Ask PM2 to watch for file changes.
    pub watch: bool,
}

impl RunOptions {
    fn resolve_cwd(&self) -> Result<PathBuf> {
        match &self.cwd {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

/// The package manager executable, platform-adjusted.
fn npm_binary() -> &'static str {
    if cfg!(windows) { "npm.cmd" } else { "npm" }
}

fn pm2_binary() -> &'static str {
    if cfg!(windows) { "pm2.cmd" } else { "pm2" }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

/// Wrap an arbitrary shell command verbatim.
pub fn direct(command: &str, options: &RunOptions) -> Result<SpawnSpec> {
    if command.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "command must not be empty".to_string(),
        ));
    }
    Ok(SpawnSpec {
        program: command.to_string(),
        args: Vec::new(),
        cwd: options.resolve_cwd()?,
        use_shell: true,
        env: Vec::new(),
    })
}

/// Resolve an npm script against the manifest in the working directory.
///
/// Fails with [`Error::ManifestNotFound`] when there is no `package.json`,
/// and with [`Error::ScriptNotFound`] (carrying the names of the scripts that
/// do exist) when the key is missing.
pub fn npm_script(script: &str, options: &RunOptions) -> Result<SpawnSpec> {
    let cwd = options.resolve_cwd()?;
    let manifest_path = cwd.join("package.json");
    if !manifest_path.exists() {
        return Err(Error::ManifestNotFound(cwd));
    }

    let raw = std::fs::read_to_string(&manifest_path)?;
    let manifest: Manifest = serde_json::from_str(&raw)?;

    if !manifest.scripts.contains_key(script) {
        return Err(Error::ScriptNotFound {
            script: script.to_string(),
            available: manifest.scripts.keys().cloned().collect(),
        });
    }

    Ok(SpawnSpec {
        program: npm_binary().to_string(),
        args: vec!["run".to_string(), script.to_string()],
        cwd,
        use_shell: true,
        env: Vec::new(),
    })
}

/// Resolve a PM2-delegated start.
///
/// Probes `pm2 --version` first and fails fast with
/// [`Error::DependencyUnavailable`] when the manager is missing or broken,
/// without attempting the actual start.
pub async fn pm2(target: &str, options: &RunOptions) -> Result<SpawnSpec> {
    if target.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "pm2 target must not be empty".to_string(),
        ));
    }
    let cwd = options.resolve_cwd()?;

    probe_manager(pm2_binary()).await?;

    let name = options
        .name
        .clone()
        .unwrap_or_else(|| DEFAULT_PROCESS_NAME.to_string());
    let args = pm2_start_args(target, &name, &cwd, options.watch);
    debug!("resolved pm2 start: pm2 {}", args.join(" "));

    Ok(SpawnSpec {
        program: pm2_binary().to_string(),
        args,
        cwd,
        use_shell: true,
        env: Vec::new(),
    })
}

/// Check that an external process manager responds to a version request.
async fn probe_manager(binary: &str) -> Result<()> {
    let status = tokio::process::Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(Error::dependency_unavailable(
            binary,
            format!("version probe exited with {status}"),
        )),
        Err(e) => Err(Error::dependency_unavailable(binary, e)),
    }
}

/// Build the `pm2 start` argument list for a target.
///
/// An `npm ...`-prefixed target is rewritten to `npm -- run <script>`;
/// anything else is passed to PM2 literally.
fn pm2_start_args(target: &str, name: &str, cwd: &std::path::Path, watch: bool) -> Vec<String> {
    let mut args = vec!["start".to_string()];

    if target.starts_with("npm ") {
        args.push("npm".to_string());
        args.push("--".to_string());
        args.push("run".to_string());
        args.push(strip_npm_prefix(target).to_string());
    } else {
        args.push(target.to_string());
    }

    args.push("--name".to_string());
    args.push(name.to_string());
    args.push("--cwd".to_string());
    args.push(cwd.to_string_lossy().into_owned());

    if watch {
        args.push("--watch".to_string());
    }

    args
}

/// Strip a leading `npm run ` or `npm ` prefix, longest match first.
fn strip_npm_prefix(target: &str) -> &str {
    target
        .strip_prefix("npm run ")
        .or_else(|| target.strip_prefix("npm "))
        .unwrap_or(target)
}
