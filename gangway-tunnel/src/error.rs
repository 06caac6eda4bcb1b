use miette::Diagnostic;
use thiserror::Error;

/// Errors from starting and stopping tunnel sessions.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("{provider} backend is not available: {reason}")]
    #[diagnostic(help("install the {provider} client or pick another provider"))]
    DependencyUnavailable { provider: String, reason: String },

    #[error("{provider} tunnel failed: {message}")]
    ProviderError { provider: String, message: String },

    #[error("a tunnel session is already active")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, Error>;
