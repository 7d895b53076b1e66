//! Client-side sliding-window rate limiter.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Allows at most `max_requests` acquisitions in any `window`.
///
/// Waiters queue on a fair mutex, so acquisitions are granted in arrival order.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    recent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            recent: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    fn prune(&self, recent: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = recent.front() {
            if now.duration_since(*oldest) >= self.window {
                recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait until a slot is free, then take it.
    pub async fn acquire(&self) {
        let mut recent = self.recent.lock().await;
        loop {
            let now = Instant::now();
            self.prune(&mut recent, now);
            if recent.len() < self.max_requests {
                recent.push_back(now);
                return;
            }
            let Some(oldest) = recent.front().copied() else {
                continue;
            };
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            debug!(
                wait_ms = wait.as_millis() as u64,
                max_requests = self.max_requests,
                "Rate limit window full, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a slot if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        let mut recent = self.recent.lock().await;
        let now = Instant::now();
        self.prune(&mut recent, now);
        if recent.len() < self.max_requests {
            recent.push_back(now);
            true
        } else {
            false
        }
    }

    /// Slots free right now.
    pub async fn available(&self) -> usize {
        let mut recent = self.recent.lock().await;
        self.prune(&mut recent, Instant::now());
        self.max_requests - recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn allows_burst_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
        assert_eq!(limiter.available().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_oldest_to_leave_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire().await;

        let started = Instant::now();
        limiter.acquire().await;
        assert_eq!(started.elapsed(), Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn slots_free_up_after_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.try_acquire().await);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.available().await, 1);
    }
}
