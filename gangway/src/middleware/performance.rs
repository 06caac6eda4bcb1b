//! Per-path response time tracking with slow-request reporting.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

pub const SLOW_THRESHOLD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize)]
pub struct SlowRequest {
    pub path: String,
    pub duration_ms: u64,
}

/// Remembers the latest response time per path and collects requests slower
/// than [`SLOW_THRESHOLD`].
#[derive(Default)]
pub struct PerformanceTracker {
    latest: Mutex<HashMap<String, Duration>>,
    slow: Mutex<Vec<SlowRequest>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: &str, duration: Duration) {
        self.latest
            .lock()
            .unwrap()
            .insert(path.to_string(), duration);

        if duration > SLOW_THRESHOLD {
            let duration_ms = duration.as_millis() as u64;
            warn!("slow request: {path} ({duration_ms}ms)");
            self.slow.lock().unwrap().push(SlowRequest {
                path: path.to_string(),
                duration_ms,
            });
        }
    }

    pub fn latest(&self, path: &str) -> Option<Duration> {
        self.latest.lock().unwrap().get(path).copied()
    }

    pub fn slow_requests(&self) -> Vec<SlowRequest> {
        self.slow.lock().unwrap().clone()
    }
}
