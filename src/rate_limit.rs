//! Token bucket admission gate shared by every outbound attempt of one client.

// crates.io
use tokio::time::Instant;
// self
use crate::{_prelude::*, error::ConfigError};

/// Token bucket state.
///
/// `0 <= tokens <= capacity` holds after every [`refill`](RateBucket::refill) and
/// [`try_take`](RateBucket::try_take).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateBucket {
	/// Maximum number of tokens the bucket holds.
	pub capacity: f64,
	/// Tokens currently available.
	pub tokens: f64,
	/// Instant of the last refill.
	pub last_refill_at: Instant,
	/// Tokens added per elapsed second.
	pub refill_rate_per_second: f64,
}
impl RateBucket {
	/// Creates a full bucket.
	pub fn full(capacity: f64, refill_rate_per_second: f64, now: Instant) -> Self {
		Self { capacity, tokens: capacity, last_refill_at: now, refill_rate_per_second }
	}

	/// Adds tokens for the time elapsed since the last refill, capped at `capacity`.
	///
	/// A `now` earlier than `last_refill_at` adds nothing.
	pub fn refill(&mut self, now: Instant) {
		let elapsed = now.saturating_duration_since(self.last_refill_at).as_secs_f64();

		self.tokens = (self.tokens + elapsed * self.refill_rate_per_second).min(self.capacity);
		self.last_refill_at = self.last_refill_at.max(now);
	}

	/// Refills, then consumes one token if at least one is available.
	pub fn try_take(&mut self, now: Instant) -> bool {
		self.refill(now);

		if self.tokens >= 1. {
			self.tokens -= 1.;

			true
		} else {
			false
		}
	}

	/// Time until one whole token is available, assuming no other consumer.
	pub fn time_until_token(&self) -> Duration {
		if self.tokens >= 1. {
			Duration::ZERO
		} else {
			Duration::from_secs_f64((1. - self.tokens) / self.refill_rate_per_second)
		}
	}
}

/// Async token bucket limiter.
///
/// Each acquisition attempt refills and consumes under one short critical section.
/// Denied callers sleep for [`RateLimiter::POLL_INTERVAL`] and retry the whole cycle, so
/// waiters are not served in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
	bucket: Mutex<RateBucket>,
}
impl RateLimiter {
	/// Sleep between denied acquisition attempts.
	pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

	/// Creates a full limiter.
	pub fn new(requests_per_second: f64, burst_capacity: f64) -> Result<Self, ConfigError> {
		if !requests_per_second.is_finite() || requests_per_second <= 0. {
			return Err(ConfigError::invalid_setting(
				"requests_per_second",
				"must be a positive finite number",
			));
		}
		if !burst_capacity.is_finite() || burst_capacity < 1. {
			return Err(ConfigError::invalid_setting("burst_capacity", "must be at least 1"));
		}

		Ok(Self {
			bucket: Mutex::new(RateBucket::full(burst_capacity, requests_per_second, Instant::now())),
		})
	}

	/// Attempts to take one token as of `now`.
	pub fn try_acquire_at(&self, now: Instant) -> bool {
		self.bucket.lock().try_take(now)
	}

	/// Attempts to take one token without waiting.
	pub fn try_acquire(&self) -> bool {
		self.try_acquire_at(Instant::now())
	}

	/// Waits until a token is available, then consumes it.
	pub async fn acquire(&self) {
		while !self.try_acquire() {
			tokio::time::sleep(Self::POLL_INTERVAL).await;
		}
	}

	/// Copy of the current bucket state.
	pub fn snapshot(&self) -> RateBucket {
		*self.bucket.lock()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn assert_bounded(bucket: &RateBucket) {
		assert!(bucket.tokens >= 0., "Tokens went negative: {}.", bucket.tokens);
		assert!(
			bucket.tokens <= bucket.capacity,
			"Tokens {} exceeded capacity {}.",
			bucket.tokens,
			bucket.capacity
		);
	}

	#[test]
	fn refill_is_capped_and_monotonic_under_arbitrary_sequences() {
		let start = Instant::now();
		let mut bucket = RateBucket::full(5., 10., start);
		let offsets_ms = [0, 0, 1, 7, 7, 3, 250, 251, 5_000, 5_001, 5_002, 4_000, 10_000];

		for offset in offsets_ms {
			bucket.try_take(start + Duration::from_millis(offset));
			assert_bounded(&bucket);
			bucket.refill(start + Duration::from_millis(offset));
			assert_bounded(&bucket);
		}
	}

	#[test]
	fn burst_is_admitted_then_denied() {
		let start = Instant::now();
		let mut bucket = RateBucket::full(5., 10., start);

		for _ in 0..5 {
			assert!(bucket.try_take(start));
		}

		assert!(!bucket.try_take(start));
		assert!(!bucket.try_take(start + Duration::from_millis(50)));
		assert!(bucket.try_take(start + Duration::from_millis(100)));
		assert_bounded(&bucket);
	}

	#[test]
	fn clock_going_backwards_adds_nothing() {
		let start = Instant::now() + Duration::from_secs(1);
		let mut bucket = RateBucket::full(1., 1., start);

		assert!(bucket.try_take(start));
		assert!(!bucket.try_take(start - Duration::from_millis(500)));
		assert_eq!(bucket.last_refill_at, start);
	}

	#[test]
	fn time_until_token_reflects_deficit() {
		let start = Instant::now();
		let mut bucket = RateBucket::full(1., 4., start);

		assert_eq!(bucket.time_until_token(), Duration::ZERO);
		assert!(bucket.try_take(start));
		assert_eq!(bucket.time_until_token(), Duration::from_millis(250));
	}

	#[test]
	fn invalid_limits_are_rejected() {
		assert!(RateLimiter::new(0., 5.).is_err());
		assert!(RateLimiter::new(f64::INFINITY, 5.).is_err());
		assert!(RateLimiter::new(10., 0.).is_err());
	}

	#[tokio::test(start_paused = true)]
	async fn acquire_waits_for_refill() {
		let limiter = RateLimiter::new(10., 1.).expect("Limiter should build.");
		let start = Instant::now();

		limiter.acquire().await;
		limiter.acquire().await;

		assert!(start.elapsed() >= Duration::from_millis(100));
		assert_bounded(&limiter.snapshot());
	}
}
