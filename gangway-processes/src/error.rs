use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from resolving and supervising child processes.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command: {0}")]
    InvalidArgument(String),

    #[error("package.json not found in {0}")]
    ManifestNotFound(PathBuf),

    #[error("failed to parse package.json: {0}")]
    ManifestParse(#[from] serde_json::Error),

    #[error("script {script:?} not found in package.json (available: {})", available.join(", "))]
    ScriptNotFound {
        script: String,
        /// Script names present in the manifest, for diagnostic display.
        available: Vec<String>,
    },

    #[error("{tool} is not available: {reason}")]
    #[diagnostic(help("install {tool} or run the command directly with --exec"))]
    DependencyUnavailable { tool: String, reason: String },

    #[error("a supervised process is already running")]
    AlreadyRunning,
}

impl Error {
    pub fn dependency_unavailable(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::DependencyUnavailable {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
