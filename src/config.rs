//! Client configuration with validated defaults.

// self
use crate::{_prelude::*, auth::Credential, error::ConfigError, executor::RetryPolicy};

/// Tunables shared by every component of one [`ApiClient`](crate::client::ApiClient).
///
/// Construct through [`ClientConfig::builder`] so invalid values are rejected up front.
/// [`Default`] yields the documented defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Token bucket refill rate.
	pub requests_per_second: f64,
	/// Token bucket capacity; also the number of requests admitted back-to-back.
	pub burst_capacity: f64,
	/// Retry and backoff behavior.
	pub retry: RetryPolicy,
	/// Lifetime of cached `GET` results.
	pub cache_ttl: Duration,
	/// Whether `GET` results are cached at all.
	pub cache_enabled: bool,
	/// Total timeout per attempt.
	pub request_timeout: Duration,
	/// Connect timeout per attempt.
	pub connect_timeout: Duration,
	/// Upper bound on concurrent in-flight attempts across all hosts.
	pub max_connections: usize,
	/// Upper bound on pooled connections per host.
	pub max_connections_per_host: usize,
	/// `User-Agent` header sent on every request.
	pub user_agent: String,
	/// Safety margin applied before credential expiry.
	pub credential_skew: Duration,
}
impl ClientConfig {
	/// Default refill rate.
	pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 10.;
	/// Default bucket capacity.
	pub const DEFAULT_BURST_CAPACITY: f64 = 5.;
	/// Default cache TTL.
	pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
	/// Default total timeout.
	pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
	/// Default connect timeout.
	pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
	/// Default global connection cap.
	pub const DEFAULT_MAX_CONNECTIONS: usize = 100;
	/// Default per-host connection cap.
	pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 30;

	/// Starts a builder seeded with the defaults.
	pub fn builder() -> ClientConfigBuilder {
		ClientConfigBuilder::default()
	}

	/// Checks every setting, returning the first violation.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.requests_per_second.is_finite() || self.requests_per_second <= 0. {
			return Err(ConfigError::invalid_setting(
				"requests_per_second",
				format!("must be a positive finite number, got {}", self.requests_per_second),
			));
		}
		if !self.burst_capacity.is_finite() || self.burst_capacity < 1. {
			return Err(ConfigError::invalid_setting(
				"burst_capacity",
				format!("must be at least 1, got {}", self.burst_capacity),
			));
		}

		self.retry.validate()?;

		validate_nonzero("request_timeout", self.request_timeout)?;
		validate_nonzero("connect_timeout", self.connect_timeout)?;

		if self.max_connections == 0 {
			return Err(ConfigError::invalid_setting("max_connections", "must be at least 1"));
		}
		if self.max_connections_per_host == 0 {
			return Err(ConfigError::invalid_setting(
				"max_connections_per_host",
				"must be at least 1",
			));
		}

		Ok(())
	}
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			requests_per_second: Self::DEFAULT_REQUESTS_PER_SECOND,
			burst_capacity: Self::DEFAULT_BURST_CAPACITY,
			retry: RetryPolicy::default(),
			cache_ttl: Self::DEFAULT_CACHE_TTL,
			cache_enabled: true,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
			connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
			max_connections: Self::DEFAULT_MAX_CONNECTIONS,
			max_connections_per_host: Self::DEFAULT_MAX_CONNECTIONS_PER_HOST,
			user_agent: concat!("integration-client/", env!("CARGO_PKG_VERSION")).into(),
			credential_skew: Credential::DEFAULT_SKEW,
		}
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
	config: ClientConfig,
}
impl ClientConfigBuilder {
	/// Sets the token bucket refill rate.
	pub fn requests_per_second(mut self, value: f64) -> Self {
		self.config.requests_per_second = value;

		self
	}

	/// Sets the token bucket capacity.
	pub fn burst_capacity(mut self, value: f64) -> Self {
		self.config.burst_capacity = value;

		self
	}

	/// Replaces the whole retry policy.
	pub fn retry(mut self, policy: RetryPolicy) -> Self {
		self.config.retry = policy;

		self
	}

	/// Sets how many retries follow the initial attempt.
	pub fn max_retries(mut self, value: u32) -> Self {
		self.config.retry.max_retries = value;

		self
	}

	/// Sets the exponential backoff multiplier applied to 5xx retries.
	pub fn backoff_multiplier(mut self, value: f64) -> Self {
		self.config.retry.backoff_multiplier = value;

		self
	}

	/// Sets the unit the backoff exponent is scaled by.
	pub fn backoff_base(mut self, value: Duration) -> Self {
		self.config.retry.backoff_base = value;

		self
	}

	/// Sets the wait used when a 429 carries no usable `Retry-After`.
	pub fn default_retry_after(mut self, value: Duration) -> Self {
		self.config.retry.default_retry_after = value;

		self
	}

	/// Enables or disables randomized backoff jitter.
	pub fn jitter(mut self, enabled: bool) -> Self {
		self.config.retry.jitter = enabled;

		self
	}

	/// Enables a credential refresh plus retry when the provider answers 401.
	pub fn refresh_on_unauthorized(mut self, enabled: bool) -> Self {
		self.config.retry.refresh_on_unauthorized = enabled;

		self
	}

	/// Sets the cache TTL.
	pub fn cache_ttl(mut self, value: Duration) -> Self {
		self.config.cache_ttl = value;

		self
	}

	/// Enables or disables `GET` caching.
	pub fn cache_enabled(mut self, enabled: bool) -> Self {
		self.config.cache_enabled = enabled;

		self
	}

	/// Sets the total timeout per attempt.
	pub fn request_timeout(mut self, value: Duration) -> Self {
		self.config.request_timeout = value;

		self
	}

	/// Sets the connect timeout per attempt.
	pub fn connect_timeout(mut self, value: Duration) -> Self {
		self.config.connect_timeout = value;

		self
	}

	/// Sets the global connection cap.
	pub fn max_connections(mut self, value: usize) -> Self {
		self.config.max_connections = value;

		self
	}

	/// Sets the per-host connection cap.
	pub fn max_connections_per_host(mut self, value: usize) -> Self {
		self.config.max_connections_per_host = value;

		self
	}

	/// Overrides the `User-Agent` header.
	pub fn user_agent(mut self, value: impl Into<String>) -> Self {
		self.config.user_agent = value.into();

		self
	}

	/// Sets the credential expiry skew.
	pub fn credential_skew(mut self, value: Duration) -> Self {
		self.config.credential_skew = value;

		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		self.config.validate()?;

		Ok(self.config)
	}
}

pub(crate) fn validate_nonzero(field: &'static str, value: Duration) -> Result<(), ConfigError> {
	if value.is_zero() {
		Err(ConfigError::invalid_setting(field, "must be greater than zero"))
	} else {
		Ok(())
	}
}
