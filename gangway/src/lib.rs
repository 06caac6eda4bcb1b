//! gangway: a local development server wrapping static file serving with
//! operational conveniences.
//!
//! The heavy lifting lives in the companion crates: `gangway-processes`
//! supervises the single foreground child process, and `gangway-tunnel`
//! manages the single public tunnel session. This crate is the glue: CLI,
//! logging, and the axum HTTP server with its middleware stack.

pub mod cli;
pub mod log;
pub mod middleware;
pub mod server;

pub use server::{ServerConfig, ServerState, SharedState, SpaMode, build_router, build_state};
