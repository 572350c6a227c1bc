//! Process-wide minimum-interval limiter for outbound API calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between calls, across every caller.
///
/// The slot lock is held while waiting, so concurrent callers queue up
/// and are released one interval apart.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
    granted: AtomicU64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
            granted: AtomicU64::new(0),
        }
    }

    /// Wait until the next slot is available, then claim it.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of slots handed out so far.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }
}
