use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const CHAT_RATE_LIMIT: u32 = 5;
pub const CHAT_RATE_WINDOW: Duration = Duration::from_secs(1);

/// Fixed-window per-sender rate limiter, one bucket per client ID.
#[derive(Debug)]
pub struct ChatRateLimiter {
    limit: u32,
    window: Duration,
    buckets: HashMap<String, (u32, Instant)>,
}

impl ChatRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: HashMap::new(),
        }
    }

    /// `true` if this sender is still within budget for the current window.
    pub fn check(&mut self, client_id: &str) -> bool {
        let now = Instant::now();
        let entry = self.buckets.entry(client_id.to_string()).or_insert((0, now));

        if now.duration_since(entry.1) >= self.window {
            *entry = (1, now);
            return true;
        }

        if entry.0 < self.limit {
            entry.0 += 1;
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, client_id: &str) {
        self.buckets.remove(client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let mut limiter = ChatRateLimiter::new(3, Duration::from_secs(1));
        assert!(limiter.check("u-A"));
        assert!(limiter.check("u-A"));
        assert!(limiter.check("u-A"));
        assert!(!limiter.check("u-A"));
    }

    #[test]
    fn buckets_are_independent_per_client() {
        let mut limiter = ChatRateLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.check("u-A"));
        assert!(limiter.check("u-B"));
        assert!(!limiter.check("u-A"));
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let mut limiter = ChatRateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("u-A"));
        assert!(!limiter.check("u-A"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("u-A"));
    }
}
