//! TTL cache for successful `GET` results.
//!
//! Expiry is lazy: an entry past its deadline is removed by the lookup that finds it.
//! Nothing sweeps the map in the background.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
// self
use crate::{_prelude::*, http::HttpMethod, obs, response::ApiResponse};

/// Cached response plus its deadline.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
	/// Cached response.
	pub value: ApiResponse,
	/// Instant at which the entry stops being served; `None` when the TTL outlasts the clock.
	pub expires_at: Option<Instant>,
}
impl CacheEntry {
	/// Returns `true` once `now >= expires_at`.
	pub fn is_expired_at(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|deadline| now >= deadline)
	}
}

/// In-memory response cache keyed by [`cache_key`].
#[derive(Debug)]
pub struct ResponseCache {
	entries: Mutex<HashMap<String, CacheEntry>>,
	default_ttl: Duration,
}
impl ResponseCache {
	/// Creates an empty cache whose entries live for `default_ttl` unless overridden.
	pub fn new(default_ttl: Duration) -> Self {
		Self { entries: Mutex::new(HashMap::new()), default_ttl }
	}

	/// TTL applied by [`set`](ResponseCache::set) when no override is given.
	pub fn default_ttl(&self) -> Duration {
		self.default_ttl
	}

	/// Returns the cached value, evicting it first if it expired.
	pub fn get(&self, key: &str) -> Option<ApiResponse> {
		self.get_at(key, Instant::now())
	}

	/// [`get`](ResponseCache::get) evaluated at `now`.
	pub fn get_at(&self, key: &str, now: Instant) -> Option<ApiResponse> {
		let mut entries = self.entries.lock();

		match entries.get(key) {
			Some(entry) if !entry.is_expired_at(now) => {
				obs::cache_event("hit", key);

				Some(entry.value.clone())
			},
			Some(_) => {
				entries.remove(key);
				obs::cache_event("expired", key);

				None
			},
			None => {
				obs::cache_event("miss", key);

				None
			},
		}
	}

	/// Stores `value` for `ttl`, or for the default TTL when `ttl` is `None`.
	pub fn set(&self, key: impl Into<String>, value: ApiResponse, ttl: Option<Duration>) {
		self.set_at(key, value, ttl, Instant::now());
	}

	/// [`set`](ResponseCache::set) evaluated at `now`.
	pub fn set_at(
		&self,
		key: impl Into<String>,
		value: ApiResponse,
		ttl: Option<Duration>,
		now: Instant,
	) {
		let key = key.into();
		let expires_at = now.checked_add(ttl.unwrap_or(self.default_ttl));

		obs::cache_event("store", &key);
		self.entries.lock().insert(key, CacheEntry { value, expires_at });
	}

	/// Removes one entry. Returns `true` if it was present.
	pub fn invalidate(&self, key: &str) -> bool {
		self.entries.lock().remove(key).is_some()
	}

	/// Removes every entry.
	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Number of stored entries, expired ones included until they are looked up.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns `true` if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}
impl Default for ResponseCache {
	fn default() -> Self {
		Self::new(Duration::from_secs(300))
	}
}

/// Deterministic digest over method, path, query parameters, and body.
///
/// Parameters are ordered by name and JSON object keys are serialized sorted, so requests
/// that differ only in ordering share a key.
pub fn cache_key(
	method: HttpMethod,
	path: &str,
	params: &BTreeMap<String, String>,
	body: Option<&Value>,
) -> String {
	let canonical = serde_json::json!([method.as_str(), path, params, body]);
	let digest = Sha256::digest(canonical.to_string().as_bytes());

	URL_SAFE_NO_PAD.encode(digest)
}
