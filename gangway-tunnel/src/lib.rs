//! Public tunnel providers for gangway.
//!
//! Exposes a local port to the internet through one of six pluggable
//! backends. Every backend here runs as a subprocess (or an SSH session)
//! whose output streams are scraped for the first URL matching the
//! provider's pattern; that first match resolves the session's public URL
//! exactly once. One session may be active at a time, mirroring the process
//! supervisor's singleton discipline.

pub mod error;
pub mod manager;
pub mod provider;

pub use error::{Error, Result};
pub use manager::TunnelManager;
pub use provider::{Provider, TunnelOptions};
