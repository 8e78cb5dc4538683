//! A single global token-bucket limiter protecting the resolver's external calls.

use std::time::{Duration, Instant};

/// Token-bucket limiter refilling continuously at `rate_per_minute`.
pub(crate) struct RateLimiter {
    capacity: u128,
    tokens: std::sync::Mutex<BucketState>,
    period_micros: u128,
}

struct BucketState {
    tokens: u128,
    last_refill: Instant,
}

const TOKEN_SCALE: u128 = 1_000_000;

impl RateLimiter {
    /// Build a limiter that allows `rate_per_minute` requests per minute,
    /// with burst capacity equal to one minute's worth of tokens.
    pub(crate) fn new(rate_per_minute: u32) -> Self {
        let capacity = u128::from(rate_per_minute) * TOKEN_SCALE;
        Self {
            capacity,
            tokens: std::sync::Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            period_micros: Duration::from_secs(60).as_micros(),
        }
    }

    /// Attempt to consume one request's worth of tokens. Returns the number
    /// of seconds to wait before retrying when denied.
    pub(crate) fn try_acquire(&self) -> Result<(), u64> {
        let mut state = self.tokens.lock().unwrap_or_else(|err| err.into_inner());
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed > Duration::ZERO && self.period_micros > 0 {
            let replenished = self
                .capacity
                .saturating_mul(elapsed.as_micros())
                .checked_div(self.period_micros)
                .unwrap_or(0);
            if replenished > 0 {
                state.tokens = (state.tokens + replenished).min(self.capacity);
                state.last_refill = now;
            }
        }

        if state.tokens >= TOKEN_SCALE {
            state.tokens -= TOKEN_SCALE;
            Ok(())
        } else {
            let deficit = TOKEN_SCALE.saturating_sub(state.tokens);
            let retry_micros = deficit.saturating_mul(self.period_micros) / self.capacity.max(1);
            Err(u64::try_from(retry_micros / 1_000_000).unwrap_or(u64::MAX).max(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RateLimiter;

    #[test]
    fn denies_once_burst_capacity_is_exhausted() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }
}
