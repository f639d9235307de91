//! Minimum-interval pacing for calls to a single provider.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces successive calls at least `interval` apart.
///
/// Shared by reference across one provider's calls; each provider owns its own limiter.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing at most `calls_per_minute` calls. `0` disables pacing.
    pub fn per_minute(calls_per_minute: u32) -> Self {
        let interval = if calls_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / calls_per_minute
        };
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::with_interval(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next call is allowed, then record it.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::trace!(wait = ?(ready_at - now), "rate limit pause");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
