//! The HTTP middleware set: ordinary request/response glue layered over the
//! static file service.

pub mod history;
pub mod logger;
pub mod performance;
pub mod rate_limit;
pub mod security;
pub mod spa;
pub mod upload;

pub use history::{RequestHistory, RequestRecord};
pub use logger::{RequestLog, RequestLogEntry};
pub use performance::PerformanceTracker;
pub use rate_limit::RateLimiter;

use axum::extract::Request;

/// Client address for logging and rate limiting: first entry of
/// `x-forwarded-for` when present, else the connecting socket address.
pub fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
