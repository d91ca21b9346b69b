//! Token bucket that paces batch upserts.
//!
//! Holds up to `burst` tokens and refills at `per_second`. `acquire` waits for
//! a token instead of rejecting, so a caller is delayed exactly as long as the
//! configured rate requires and not longer.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub struct RateLimiter {
    state: Mutex<RateState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct RateState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `per_second` must be positive and `burst` at least 1; settings
    /// validation enforces both.
    pub fn new(per_second: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            state: Mutex::new(RateState { tokens: capacity, last_refill: Instant::now() }),
            capacity,
            refill_per_sec: per_second.max(f64::MIN_POSITIVE),
        }
    }

    /// Take one token, sleeping until one is available. Returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        loop {
            let wait = {
                let mut guard = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(guard.last_refill).as_secs_f64();
                guard.last_refill = now;
                guard.tokens = (guard.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                if guard.tokens >= 1.0 {
                    guard.tokens -= 1.0;
                    return started.elapsed();
                }
                (1.0 - guard.tokens) / self.refill_per_sec
            };
            tokio::time::sleep(Duration::from_secs_f64(wait.min(60.0))).await;
        }
    }
}
