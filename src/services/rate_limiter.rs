//! Fixed-window request admission control.
//!
//! One counter per client key; the counter resets when its window elapses.
//! Sits in front of authentication so unauthenticated flooding never reaches
//! session validation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Map size past which a sweep of elapsed windows runs before admitting the
/// next request. Keeps one-off client keys from accumulating forever.
const CLEANUP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

pub struct FixedWindowRateLimiter {
    limit: u32,
    window: Duration,
    enabled: bool,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowRateLimiter {
    pub fn new(limit: u32, window: Duration, enabled: bool) -> Self {
        Self {
            limit: limit.max(1),
            window,
            enabled,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether the request is permitted and, when it is not, how
    /// long until the key's window resets.
    pub fn allow(&self, key: &str) -> (bool, Duration) {
        if !self.enabled {
            return (true, Duration::ZERO);
        }
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> (bool, Duration) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() > CLEANUP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started_at) < self.window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let retry_after = self
                .window
                .saturating_sub(now.duration_since(entry.started_at));
            return (false, retry_after);
        }

        entry.count += 1;
        (true, Duration::ZERO)
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
