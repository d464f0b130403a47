//! Usage counters owned by one client.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{ConnectionId, ProviderConfigKey},
};

/// Read-only snapshot returned by [`ApiClient::stats`](crate::client::ApiClient::stats).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClientStats {
	/// Logical requests issued, cache hits included.
	pub request_count: u64,
	/// Requests that produced a failed response or raised an error.
	pub error_count: u64,
	/// `error_count / max(1, request_count)`.
	pub error_rate: f64,
	/// Connection the client serves.
	pub connection_id: ConnectionId,
	/// Provider configuration key.
	pub provider: ProviderConfigKey,
	/// Outbound attempts, retries included and cache hits excluded.
	pub attempt_count: u64,
	/// Requests answered from the cache.
	pub cache_hits: u64,
	/// Cacheable requests that missed.
	pub cache_misses: u64,
	/// `cache_hits / max(1, cache_hits + cache_misses)`.
	pub cache_hit_rate: f64,
}

/// Monotonic counters backing [`ClientStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
	requests: AtomicU64,
	errors: AtomicU64,
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
}
impl StatsRecorder {
	pub(crate) fn record_request(&self) {
		self.requests.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_error(&self) {
		self.errors.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_miss(&self) {
		self.cache_misses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn snapshot(
		&self,
		connection_id: ConnectionId,
		provider: ProviderConfigKey,
		attempt_count: u64,
	) -> ClientStats {
		let request_count = self.requests.load(Ordering::Relaxed);
		let error_count = self.errors.load(Ordering::Relaxed);
		let cache_hits = self.cache_hits.load(Ordering::Relaxed);
		let cache_misses = self.cache_misses.load(Ordering::Relaxed);

		ClientStats {
			request_count,
			error_count,
			error_rate: ratio(error_count, request_count),
			connection_id,
			provider,
			attempt_count,
			cache_hits,
			cache_misses,
			cache_hit_rate: ratio(cache_hits, cache_hits + cache_misses),
		}
	}
}

fn ratio(part: u64, whole: u64) -> f64 {
	part as f64 / whole.max(1) as f64
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rates_divide_by_at_least_one() {
		let recorder = StatsRecorder::default();
		let connection = ConnectionId::new("c").expect("Connection id should be valid.");
		let provider = ProviderConfigKey::new("p").expect("Provider key should be valid.");
		let empty = recorder.snapshot(connection.clone(), provider.clone(), 0);

		assert_eq!(empty.error_rate, 0.);
		assert_eq!(empty.cache_hit_rate, 0.);

		for _ in 0..4 {
			recorder.record_request();
		}

		recorder.record_error();
		recorder.record_cache_hit();
		recorder.record_cache_miss();
		recorder.record_cache_miss();
		recorder.record_cache_miss();

		let stats = recorder.snapshot(connection, provider, 7);

		assert_eq!(stats.request_count, 4);
		assert_eq!(stats.error_count, 1);
		assert_eq!(stats.error_rate, 0.25);
		assert_eq!(stats.attempt_count, 7);
		assert_eq!(stats.cache_hit_rate, 0.25);
	}
}
