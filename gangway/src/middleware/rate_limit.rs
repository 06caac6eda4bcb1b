//! Per-IP sliding-window rate limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_REQUESTS: usize = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window request counter keyed by client IP.
///
/// Stale timestamps are pruned on every check, so the map cannot grow past
/// one window's worth of traffic per client.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request from `ip`. Returns `false` when the client is over
    /// its budget (the request is not recorded in that case).
    pub fn check(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().unwrap();

        let timestamps = requests.entry(ip.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }
        timestamps.push(now);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));
        // Other clients have their own budget.
        assert!(limiter.check("5.6.7.8"));
    }

    #[test]
    fn window_expiry_restores_the_budget() {
        let limiter = RateLimiter::new(1, Duration::from_millis(30));
        assert!(limiter.check("1.2.3.4"));
        assert!(!limiter.check("1.2.3.4"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.check("1.2.3.4"));
    }
}
