// Request pacing for the generative-text service.
//
// Theme labels are requested concurrently, but free-tier Gemini keys are
// throttled per second. Each caller reserves the next free slot under the
// lock, then sleeps outside it, so N concurrent callers end up spaced one
// interval apart instead of bunching up after a shared sleep.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Spaces requests at least `1 / requests_per_second` apart.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
}

struct RateLimiterInner {
    interval: Duration,
    /// Earliest instant the next request may start
    next_slot: Option<Instant>,
}

impl RateLimiter {
    /// Non-positive or non-finite rates disable pacing.
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            inner: Arc::new(Mutex::new(RateLimiterInner {
                interval,
                next_slot: None,
            })),
        }
    }

    /// Wait for this caller's slot.
    pub async fn acquire(&self) {
        let slot = {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            let slot = match inner.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            inner.next_slot = Some(slot + inner.interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_request_is_immediate() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_second_request_waits_one_interval() {
        let limiter = RateLimiter::new(4.0); // 250ms apart
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(200),
            "Expected ~250ms delay, got {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = RateLimiter::new(10.0); // 100ms apart
        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let l = limiter.clone();
                tokio::spawn(async move { l.acquire().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        // Three slots: 0ms, 100ms, 200ms
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_zero_rate_disables_pacing() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
