//! Bearer credential records and the single-flight cache that keeps them fresh.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{_prelude::*, auth::TokenSecret, error::AuthError};

/// Immutable bearer credential issued for one logical connection.
///
/// Credentials are never patched in place; a refresh replaces the whole value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Bearer token; callers must avoid logging it.
	pub token: TokenSecret,
	/// Instant the credential was issued (as observed locally).
	pub issued_at: OffsetDateTime,
	/// Instant the credential stops being valid upstream.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Safety margin subtracted from `expires_at` before a credential counts as expired.
	pub const DEFAULT_SKEW: Duration = Duration::from_secs(5 * 60);

	/// Creates a credential valid for `expires_in` starting at `issued_at`.
	///
	/// Fails with [`AuthError::ExpiryOutOfRange`] when the deadline cannot be represented.
	pub fn new(
		token: TokenSecret,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Result<Self, AuthError> {
		let expires_at = time::Duration::try_from(expires_in)
			.ok()
			.and_then(|lifetime| issued_at.checked_add(lifetime))
			.ok_or(AuthError::ExpiryOutOfRange { expires_in_secs: expires_in.as_secs() })?;

		Ok(Self { token, issued_at, expires_at })
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(token: TokenSecret, expires_in: Duration) -> Result<Self, AuthError> {
		Self::new(token, OffsetDateTime::now_utc(), expires_in)
	}

	/// Returns `true` once `now >= expires_at - skew`.
	///
	/// A skew reaching past the earliest representable instant counts as expired.
	pub fn is_expired_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
		time::Duration::try_from(skew)
			.ok()
			.and_then(|skew| self.expires_at.checked_sub(skew))
			.is_none_or(|deadline| now >= deadline)
	}

	/// Returns `true` if the credential is expired relative to the current clock.
	pub fn is_expired(&self, skew: Duration) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc(), skew)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Cached credential slot with a single-flight refresh guard.
///
/// Readers take the fast path while the cached credential is fresh. When it is missing
/// or inside the skew window, callers serialize on an async guard, re-check the slot, and
/// only the first caller runs the refresh. Everyone queued behind it reuses the result.
#[derive(Debug)]
pub struct CredentialCache {
	current: RwLock<Option<Credential>>,
	refresh_guard: AsyncMutex<()>,
	refreshes: AtomicU64,
	skew: Duration,
}
impl CredentialCache {
	/// Creates an empty cache that treats credentials as expired `skew` before expiry.
	pub fn new(skew: Duration) -> Self {
		Self {
			current: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
			refreshes: AtomicU64::new(0),
			skew,
		}
	}

	/// Safety margin applied to every freshness check.
	pub fn skew(&self) -> Duration {
		self.skew
	}

	/// Returns the cached credential if it is still fresh at `now`.
	pub fn fresh_at(&self, now: OffsetDateTime) -> Option<Credential> {
		self.current
			.read()
			.as_ref()
			.filter(|credential| !credential.is_expired_at(now, self.skew))
			.cloned()
	}

	/// Returns a fresh credential, running `refresh` at most once across concurrent callers.
	pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<Credential>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<Credential>>,
	{
		if let Some(credential) = self.fresh_at(OffsetDateTime::now_utc()) {
			return Ok(credential);
		}

		let _singleflight = self.refresh_guard.lock().await;

		if let Some(credential) = self.fresh_at(OffsetDateTime::now_utc()) {
			return Ok(credential);
		}

		let credential = refresh().await?;

		self.refreshes.fetch_add(1, Ordering::Relaxed);
		*self.current.write() = Some(credential.clone());

		Ok(credential)
	}

	/// Replaces the cached credential wholesale.
	pub fn store(&self, credential: Credential) {
		*self.current.write() = Some(credential);
	}

	/// Drops the cached credential so the next caller refreshes.
	pub fn invalidate(&self) {
		self.current.write().take();
	}

	/// Number of refreshes that completed successfully.
	pub fn refresh_count(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}
}
impl Default for CredentialCache {
	fn default() -> Self {
		Self::new(Credential::DEFAULT_SKEW)
	}
}
