//! Source request rate limiting
//!
//! The source enforces a hard request ceiling, so every fetcher shares one
//! process-wide token bucket: tokens refill at the ceiling rate up to a
//! single burst token, and [`RateLimiter::acquire`] suspends the caller
//! until a token is available. The bucket lives behind a fair async mutex,
//! so waiters are served in best-effort arrival order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

/// Token bucket limiter shared by all fetchers of a run
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    /// Tokens per second; 0 means unlimited
    rate: f64,
    capacity: f64,
    acquired: AtomicU64,
    throttled: AtomicU64,
    total_wait_ms: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter for the given ceiling. A ceiling of 0 disables
    /// limiting entirely.
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: 1.0,
                last_refill: Instant::now(),
            }),
            rate: f64::from(requests_per_second),
            // one burst token: over any window the request count stays
            // within ceiling * window + 1
            capacity: 1.0,
            acquired: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
        }
    }

    /// Create a limiter that never throttles (used by tests)
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.rate > 0.0
    }

    /// Take one request token, waiting for the next refill if none is
    /// available. Returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        if !self.is_enabled() {
            self.acquired.fetch_add(1, Ordering::Relaxed);
            return Duration::ZERO;
        }

        let start = Instant::now();
        let mut bucket = self.bucket.lock().await;
        bucket.refill(self.rate, self.capacity);

        if bucket.tokens < 1.0 {
            let deficit = 1.0 - bucket.tokens;
            let wait = Duration::from_secs_f64(deficit / self.rate);
            self.throttled.fetch_add(1, Ordering::Relaxed);
            debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
            // The lock is held across the sleep: later arrivals queue on
            // the mutex and drain in order.
            tokio::time::sleep(wait).await;
            bucket.refill(self.rate, self.capacity);
        }

        // A slightly short refill can leave the balance marginally below
        // one; going negative here just lengthens the next caller's wait.
        bucket.tokens -= 1.0;
        drop(bucket);

        let waited = start.elapsed();
        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.total_wait_ms
            .fetch_add(waited.as_millis() as u64, Ordering::Relaxed);
        waited
    }

    /// Get counters for observability
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            total_wait_ms: self.total_wait_ms.load(Ordering::Relaxed),
            rate_limit: self.rate as u64,
            enabled: self.is_enabled(),
        }
    }
}

/// Rate limiter counters
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    /// Requests that passed the limiter
    pub acquired: u64,
    /// Requests that had to wait
    pub throttled: u64,
    /// Total time spent waiting in milliseconds
    pub total_wait_ms: u64,
    /// Configured ceiling (requests per second)
    pub rate_limit: u64,
    /// Whether limiting is enabled
    pub enabled: bool,
}

impl std::fmt::Display for RateLimiterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.enabled {
            write!(
                f,
                "RateLimiter({}rps, {} acquired, {} throttled, {}ms waited)",
                self.rate_limit, self.acquired, self.throttled, self.total_wait_ms
            )
        } else {
            write!(f, "RateLimiter(unlimited)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        for _ in 0..1000 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        let stats = limiter.stats();
        assert!(!stats.enabled);
        assert_eq!(stats.acquired, 1000);
        assert_eq!(stats.throttled, 0);
    }

    #[tokio::test]
    async fn test_first_token_is_immediate() {
        let limiter = RateLimiter::new(10);
        let waited = limiter.acquire().await;
        assert!(waited < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_second_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(100);
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        // one token at 100rps refills in ~10ms
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert_eq!(limiter.stats().throttled, 1);
    }

    #[tokio::test]
    async fn test_rate_bound_over_window() {
        let rate = 200u32;
        let n = 10u32;
        let limiter = RateLimiter::new(rate);

        let start = Instant::now();
        for _ in 0..n {
            limiter.acquire().await;
        }
        // n acquisitions, one burst token: at least (n - 1) / rate elapsed
        let floor = Duration::from_secs_f64(f64::from(n - 1) / f64::from(rate) * 0.8);
        assert!(
            start.elapsed() >= floor,
            "{} requests finished in {:?}",
            n,
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_concurrent_acquire_holds_ceiling() {
        let limiter = Arc::new(RateLimiter::new(500));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    limiter.acquire().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 20 acquisitions at 500rps need at least ~(20 - 1) / 500 seconds
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(limiter.stats().acquired, 20);
    }

    #[test]
    fn test_stats_display() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.stats().to_string().contains("2rps"));
        assert_eq!(
            RateLimiter::unlimited().stats().to_string(),
            "RateLimiter(unlimited)"
        );
    }
}
