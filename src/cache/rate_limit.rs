//! Request throttling composed explicitly at call sites.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Capability to admit or reject a unit of work for a caller key.
pub trait RateLimiter: Send + Sync {
    /// Try to take one permit for `key`; `false` means the caller must back off.
    fn try_acquire(&self, key: &str) -> bool;
}

/// Request and rejection counters for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RateLimitStats {
    /// Total permits requested.
    pub requests: u64,
    /// Requests rejected because the window was exhausted.
    pub rejects: u64,
}

impl RateLimitStats {
    /// Percentage of rejected requests, `None` before the first request.
    pub fn reject_rate(&self) -> Option<f64> {
        (self.requests > 0).then(|| self.rejects as f64 / self.requests as f64 * 100.0)
    }
}

#[derive(Debug)]
struct Window {
    started_at: Instant,
    used: u32,
    stats: RateLimitStats,
}

struct Windows {
    by_key: HashMap<String, Window>,
    last_sweep: Instant,
}

impl Windows {
    /// Drop windows that have been idle for a full period, at most once per period.
    fn sweep(&mut self, now: Instant, period: Duration) {
        if now.duration_since(self.last_sweep) < period {
            return;
        }
        let before = self.by_key.len();
        self.by_key
            .retain(|_, window| now.duration_since(window.started_at) < period);
        self.last_sweep = now;
        let dropped = before - self.by_key.len();
        if dropped > 0 {
            tracing::trace!(dropped, "Expired rate limit windows dropped");
        }
    }
}

/// Fixed-window limiter admitting `limit + burst` permits per key and window.
///
/// Keys whose window expired are forgotten, so per-key counters cover recent traffic only.
pub struct WindowRateLimiter {
    limit: u32,
    burst: u32,
    window: Duration,
    windows: Mutex<Windows>,
}

impl WindowRateLimiter {
    /// Create a limiter with `limit` permits per `window` and no burst allowance.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            burst: 0,
            window,
            windows: Mutex::new(Windows {
                by_key: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Allow `burst` extra permits on top of the steady limit.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Counters for `key`; zeroed when the key has never been seen.
    pub fn stats(&self, key: &str) -> RateLimitStats {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows
            .by_key
            .get(key)
            .map(|window| window.stats)
            .unwrap_or_default()
    }

    /// Number of keys currently holding a window.
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_key
            .len()
    }

    /// Forget the window and counters for `key`.
    pub fn reset(&self, key: &str) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.by_key.remove(key);
        tracing::info!(key, "Rate limit state reset");
    }
}

impl RateLimiter for WindowRateLimiter {
    fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.sweep(now, self.window);
        let window = windows.by_key.entry(key.to_string()).or_insert_with(|| Window {
            started_at: now,
            used: 0,
            stats: RateLimitStats::default(),
        });

        if now.duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.used = 0;
        }

        window.stats.requests += 1;
        if window.used < self.limit.saturating_add(self.burst) {
            window.used += 1;
            true
        } else {
            window.stats.rejects += 1;
            tracing::debug!(key, used = window.used, "Rate limited request rejected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let limiter = WindowRateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire("client"));
        assert!(limiter.try_acquire("client"));
        assert!(!limiter.try_acquire("client"));

        let stats = limiter.stats("client");
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.rejects, 1);
        let rate = stats.reject_rate().expect("rate");
        assert!((rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn keys_are_isolated() {
        let limiter = WindowRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("b"));
        assert!(!limiter.try_acquire("a"));
        assert_eq!(limiter.stats("unknown"), RateLimitStats::default());
    }

    #[test]
    fn burst_extends_the_window_allowance() {
        let limiter = WindowRateLimiter::new(1, Duration::from_secs(60)).with_burst(1);
        assert!(limiter.try_acquire("k"));
        assert!(limiter.try_acquire("k"));
        assert!(!limiter.try_acquire("k"));
    }

    #[test]
    fn window_rolls_over() {
        let limiter = WindowRateLimiter::new(1, Duration::ZERO);
        assert!(limiter.try_acquire("k"));
        assert!(limiter.try_acquire("k"));
    }

    #[test]
    fn expired_windows_are_dropped() {
        let limiter = WindowRateLimiter::new(5, Duration::from_millis(200));
        for client in 0..100 {
            assert!(limiter.try_acquire(&format!("client-{client}")));
        }
        assert_eq!(limiter.tracked_keys(), 100);

        std::thread::sleep(Duration::from_millis(250));
        assert!(limiter.try_acquire("late"));
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.stats("client-0"), RateLimitStats::default());
    }

    #[test]
    fn reset_clears_counters() {
        let limiter = WindowRateLimiter::new(1, Duration::from_secs(60));
        limiter.try_acquire("k");
        limiter.try_acquire("k");
        limiter.reset("k");
        assert_eq!(limiter.stats("k").requests, 0);
        assert!(limiter.try_acquire("k"));
    }
}
