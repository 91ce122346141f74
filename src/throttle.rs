use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::trace;

/// Minimum gap between any two outbound requests made by this process.
pub const DEFAULT_MIN_GAP: Duration = Duration::from_secs(1);

static SHARED: OnceLock<Arc<RateLimiter>> = OnceLock::new();

/// Client-side throttle: at most one request per `min_gap`.
///
/// The lock is held while waiting, so concurrent callers queue up and are
/// released one gap apart.
#[derive(Debug)]
pub struct RateLimiter {
    min_gap: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: Mutex::new(None),
        }
    }

    /// Process-wide limiter used by the API client and the notifier.
    pub fn shared() -> Arc<Self> {
        SHARED
            .get_or_init(|| Arc::new(Self::new(DEFAULT_MIN_GAP)))
            .clone()
    }

    /// No throttling at all.
    pub fn unlimited() -> Arc<Self> {
        Arc::new(Self::new(Duration::ZERO))
    }

    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    /// Wait until the next request slot is free and claim it.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_gap {
                let wait = self.min_gap - elapsed;
                trace!("Throttling request for {wait:?}");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(30));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn second_acquire_waits_for_gap() {
        let limiter = RateLimiter::new(Duration::from_millis(150));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.min_gap(), Duration::ZERO);
    }

    #[test]
    fn shared_is_a_singleton() {
        let a = RateLimiter::shared();
        let b = RateLimiter::shared();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.min_gap(), DEFAULT_MIN_GAP);
    }
}
