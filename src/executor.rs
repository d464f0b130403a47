//! Per-request execution with admission, authentication, classification, and retries.
//!
//! Every attempt re-enters the rate limiter and re-reads the credential, so a refreshed
//! token is picked up between attempts. Only 429 and 5xx responses are retried (plus 401
//! when [`RetryPolicy::refresh_on_unauthorized`] is set). Transport failures come back as
//! a status `0` [`ApiResponse`] and are not retried at this layer.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use rand::Rng;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::TokenSource,
	error::{ConfigError, TransportError},
	http::{self, HttpMethod, HttpTransport, OutboundRequest, RawResponse},
	obs::{self, RequestOutcome},
	rate_limit::RateLimiter,
	response::{self, ApiResponse, FailureKind},
};

/// Retry and backoff settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Retries allowed after the initial attempt.
	pub max_retries: u32,
	/// Growth factor of the 5xx backoff: `backoff_base * backoff_multiplier^retry`.
	pub backoff_multiplier: f64,
	/// Unit the exponential backoff is expressed in.
	pub backoff_base: Duration,
	/// Wait used when a 429 carries no parseable `Retry-After`.
	pub default_retry_after: Duration,
	/// Adds up to 25% random delay to each 5xx backoff.
	pub jitter: bool,
	/// Invalidate the credential and retry once when the provider answers 401.
	pub refresh_on_unauthorized: bool,
}
impl RetryPolicy {
	/// Upper bound on any single computed backoff.
	pub const MAX_BACKOFF: Duration = Duration::from_secs(86_400);

	/// Delay before retry number `retry + 1` of a 5xx response.
	pub fn backoff_delay(&self, retry: u32) -> Duration {
		let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
		let secs = self.backoff_base.as_secs_f64() * self.backoff_multiplier.powi(exponent);
		let max = Self::MAX_BACKOFF.as_secs_f64();
		let secs = if secs.is_finite() { secs.clamp(0., max) } else { max };
		let delay = Duration::from_secs_f64(secs);

		if self.jitter {
			let factor = rand::rng().random_range(0.0..=0.25);

			(delay + delay.mul_f64(factor)).min(Self::MAX_BACKOFF)
		} else {
			delay
		}
	}

	/// Rejects multipliers below 1 or non-finite values.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1. {
			return Err(ConfigError::invalid_setting(
				"backoff_multiplier",
				format!("must be a finite number >= 1, got {}", self.backoff_multiplier),
			));
		}

		Ok(())
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			backoff_multiplier: 1.5,
			backoff_base: Duration::from_secs(1),
			default_retry_after: Duration::from_secs(60),
			jitter: false,
			refresh_on_unauthorized: false,
		}
	}
}

/// Message carried by a 429 response once the retry budget is spent.
pub const RATE_LIMIT_EXHAUSTED: &str = "Rate limit exceeded, max retries reached";

/// Issues authenticated attempts until a final [`ApiResponse`] is reached.
pub struct RequestExecutor {
	transport: Arc<dyn HttpTransport>,
	limiter: Arc<RateLimiter>,
	tokens: Arc<dyn TokenSource>,
	policy: RetryPolicy,
	request_timeout: Option<Duration>,
	attempts: AtomicU64,
}
impl RequestExecutor {
	/// Creates an executor sharing the given transport, limiter, and credential source.
	pub fn new(
		transport: Arc<dyn HttpTransport>,
		limiter: Arc<RateLimiter>,
		tokens: Arc<dyn TokenSource>,
		policy: RetryPolicy,
	) -> Self {
		Self {
			transport,
			limiter,
			tokens,
			policy,
			request_timeout: None,
			attempts: AtomicU64::new(0),
		}
	}

	/// Bounds every attempt by `timeout`, on top of whatever the transport enforces.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);

		self
	}

	/// Retry settings in effect.
	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Outbound attempts dispatched so far, retries included.
	pub fn attempt_count(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Sends one logical request.
	///
	/// Returns `Err` only for process-level faults: the body cannot be serialized, the
	/// transport cannot construct the request, or no credential can be obtained. Every HTTP
	/// outcome and transport failure is an [`ApiResponse`].
	pub async fn send(
		&self,
		method: HttpMethod,
		url: &Url,
		body: Option<&Value>,
		params: &BTreeMap<String, String>,
		headers: &BTreeMap<String, String>,
	) -> Result<ApiResponse> {
		let body = body.map(serde_json::to_vec).transpose().map_err(ConfigError::from)?;
		let query = params.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>();
		let mut retry = 0;
		let mut refreshed = false;

		loop {
			self.limiter.acquire().await;

			let token = self.tokens.token().await?;
			let mut request = OutboundRequest::new(method, url.clone())
				.with_header("Authorization", token.bearer())
				.with_header("Content-Type", "application/json")
				.with_header("Accept", "application/json");

			for (name, value) in headers {
				request.headers.insert(name.clone(), value.clone());
			}

			request.query = query.clone();
			request.body = body.clone();

			self.attempts.fetch_add(1, Ordering::Relaxed);
			obs::record_request_outcome(method, RequestOutcome::Attempt);

			let raw = match self.dispatch(request).await {
				Ok(raw) => raw,
				Err(TransportError::Build { source }) =>
					return Err(ConfigError::RequestBuild { source }.into()),
				Err(e) => {
					obs::transport_failed(method, &e);

					return Ok(ApiResponse::transport_failure(format!("Connection error: {e}")));
				},
			};
			let budget_left = retry < self.policy.max_retries;
			let delay = match raw.status {
				429 if budget_left => raw
					.header("retry-after")
					.and_then(http::parse_retry_after)
					.unwrap_or(self.policy.default_retry_after),
				429 => return Ok(rate_limit_exhausted(raw)),
				s if s >= 500 && budget_left => self.policy.backoff_delay(retry),
				401 if budget_left && self.policy.refresh_on_unauthorized && !refreshed => {
					refreshed = true;
					self.tokens.invalidate();

					Duration::ZERO
				},
				_ => return Ok(ApiResponse::from_raw(raw)),
			};

			obs::retry_scheduled(method, retry + 1, raw.status, delay);

			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			retry += 1;
		}
	}

	async fn dispatch(&self, request: OutboundRequest) -> Result<RawResponse, TransportError> {
		match self.request_timeout {
			Some(limit) => tokio::time::timeout(limit, self.transport.execute(request))
				.await
				.unwrap_or(Err(TransportError::Timeout)),
			None => self.transport.execute(request).await,
		}
	}
}
impl Debug for RequestExecutor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestExecutor")
			.field("policy", &self.policy)
			.field("request_timeout", &self.request_timeout)
			.field("attempts", &self.attempt_count())
			.finish_non_exhaustive()
	}
}

fn rate_limit_exhausted(raw: RawResponse) -> ApiResponse {
	let body = response::parse_body(&raw.body);

	ApiResponse::failure(
		raw.status,
		body,
		raw.headers,
		FailureKind::RateLimitExceeded,
		RATE_LIMIT_EXHAUSTED,
	)
}
