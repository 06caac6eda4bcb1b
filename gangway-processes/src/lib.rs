//! Child process supervision for gangway.
//!
//! This crate owns the "run something alongside the static server" half of
//! gangway: resolving a requested run mode into a concrete [`SpawnSpec`],
//! launching it as the single supervised child process, capturing its output
//! into a bounded ring buffer, and coordinating a graceful-then-forceful
//! shutdown with a cancellable grace period.
//!
//! At most one supervised process exists at a time. Requesting a second run
//! while one is active is a caller error ([`Error::AlreadyRunning`]), never a
//! silent replacement.

pub mod command;
pub mod error;
pub mod log_buffer;
pub mod supervisor;

pub use command::{RunOptions, SpawnSpec, direct, npm_script, pm2};
pub use error::{Error, Result};
pub use log_buffer::{OutputEntry, OutputRingBuffer, StreamKind};
pub use supervisor::{ProcessEvent, ProcessState, Supervisor};
