//! Minimum spacing between outbound requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Default spacing between requests in seconds.
/// One request per second keeps us well clear of the site's abuse limits.
pub const DEFAULT_MIN_INTERVAL_SECS: f64 = 1.0;

/// Single-flow limiter. Callers are served one at a time, in lock order.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call_at: Mutex<Option<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs_f64(DEFAULT_MIN_INTERVAL_SECS))
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call_at: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until `min_interval` has passed since the previous call returned
    pub async fn throttle(&self) {
        // Held across the sleep so concurrent callers queue up behind it
        let mut last = self.last_call_at.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "Rate limiting");
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// When `throttle` last returned, if ever
    pub async fn last_call(&self) -> Option<Instant> {
        *self.last_call_at.lock().await
    }
}
