//! Composition root tying credentials, admission, execution, and caching together.
//!
//! [`ApiClient::request`] runs, in order: interceptors, cache lookup (`GET` only),
//! [`RequestExecutor::send`] (rate limiter, credential, dispatch, retries), cache store on
//! `GET` success, reverse-order interceptors, and statistics.

pub mod integration;
pub mod request;
pub mod stats;

pub use integration::*;
pub use request::*;
pub use stats::*;

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{ConnectionId, ConnectionTokenSource, ProviderConfigKey, TokenSecret, TokenSource},
	cache::ResponseCache,
	config::ClientConfig,
	error::ConfigError,
	executor::RequestExecutor,
	http::HttpTransport,
	middleware::{Interceptor, InterceptorChain},
	obs::{self, RequestOutcome, RequestSpan},
	rate_limit::RateLimiter,
	response::ApiResponse,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Authenticated, rate-limited, retrying client for one external connection.
pub struct ApiClient {
	connection_id: ConnectionId,
	provider: ProviderConfigKey,
	base_url: Url,
	config: ClientConfig,
	transport: Arc<dyn HttpTransport>,
	tokens: Arc<dyn TokenSource>,
	executor: RequestExecutor,
	cache: Option<ResponseCache>,
	interceptors: InterceptorChain,
	stats: StatsRecorder,
	closed: AtomicBool,
}
impl ApiClient {
	/// Starts a builder for the given connection, provider, and API base URL.
	pub fn builder(
		connection_id: ConnectionId,
		provider: ProviderConfigKey,
		base_url: impl Into<String>,
	) -> ApiClientBuilder {
		ApiClientBuilder {
			connection_id,
			provider,
			base_url: base_url.into(),
			config: ClientConfig::default(),
			transport: None,
			token_source: None,
			connection_service: None,
			interceptors: InterceptorChain::default(),
		}
	}

	/// Connection this client serves.
	pub fn connection_id(&self) -> &ConnectionId {
		&self.connection_id
	}

	/// Provider configuration key.
	pub fn provider(&self) -> &ProviderConfigKey {
		&self.provider
	}

	/// Base URL endpoints are appended to.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Effective configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Response cache, when enabled.
	pub fn cache(&self) -> Option<&ResponseCache> {
		self.cache.as_ref()
	}

	/// Credential source.
	pub fn token_source(&self) -> &Arc<dyn TokenSource> {
		&self.tokens
	}

	/// Returns `true` once [`close`](ApiClient::close) ran.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Runs one logical request through the full pipeline.
	///
	/// HTTP and transport failures come back as an [`ApiResponse`] with
	/// `succeeded = false`. `Err` is reserved for configuration faults, credential
	/// failures, interceptor rejections, and calls on a closed client.
	pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
		let method = request.method;
		let span = RequestSpan::new(method, "request");

		span.instrument(async move {
			if self.is_closed() {
				return Err(Error::Closed);
			}

			self.stats.record_request();

			let result = self.run(request).await;

			match &result {
				Ok(response) if response.succeeded =>
					obs::record_request_outcome(method, RequestOutcome::Success),
				_ => {
					self.stats.record_error();
					obs::record_request_outcome(method, RequestOutcome::Failure);
				},
			}

			result
		})
		.await
	}

	/// `GET endpoint` with optional query parameters.
	pub async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
		self.request(ApiRequest::get(endpoint).with_params(params.iter().copied())).await
	}

	/// `POST endpoint` with an optional JSON body.
	pub async fn post(&self, endpoint: &str, body: Option<Value>) -> Result<ApiResponse> {
		self.request(with_optional_body(ApiRequest::post(endpoint), body)).await
	}

	/// `PUT endpoint` with an optional JSON body.
	pub async fn put(&self, endpoint: &str, body: Option<Value>) -> Result<ApiResponse> {
		self.request(with_optional_body(ApiRequest::put(endpoint), body)).await
	}

	/// `PATCH endpoint` with an optional JSON body.
	pub async fn patch(&self, endpoint: &str, body: Option<Value>) -> Result<ApiResponse> {
		self.request(with_optional_body(ApiRequest::patch(endpoint), body)).await
	}

	/// `DELETE endpoint`.
	pub async fn delete(&self, endpoint: &str) -> Result<ApiResponse> {
		self.request(ApiRequest::delete(endpoint)).await
	}

	/// Probes `/`; reachable on success, 200, or 404. Never served from the cache.
	pub async fn health_check(&self) -> bool {
		integration::is_reachable(&self.request(ApiRequest::get("/").without_cache()).await)
	}

	/// Snapshot of the usage counters.
	pub fn stats(&self) -> ClientStats {
		self.stats.snapshot(
			self.connection_id.clone(),
			self.provider.clone(),
			self.executor.attempt_count(),
		)
	}

	/// Shuts the transport down and drops cached responses.
	///
	/// Later calls to [`request`](ApiClient::request) fail with [`Error::Closed`]. Closing
	/// twice is a no-op.
	pub fn close(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}

		self.transport.shutdown();

		if let Some(cache) = &self.cache {
			cache.clear();
		}
	}

	async fn run(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		self.interceptors.before_request(&mut request)?;

		let cache = self.cache.as_ref().filter(|_| request.is_cacheable());
		let key = cache.map(|_| request.cache_key());

		if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
			if let Some(hit) = cache.get(key) {
				self.stats.record_cache_hit();
				obs::record_request_outcome(request.method, RequestOutcome::CacheHit);

				return Ok(self.interceptors.after_response(&request, hit));
			}

			self.stats.record_cache_miss();
		}

		let url = self.resolve(&request.endpoint)?;
		let response = self
			.executor
			.send(request.method, &url, request.body.as_ref(), &request.params, &request.headers)
			.await?;

		match (cache, key) {
			(Some(cache), Some(key)) if response.succeeded => cache.set(key, response.clone(), None),
			_ => {},
		}

		Ok(self.interceptors.after_response(&request, response))
	}

	fn resolve(&self, endpoint: &str) -> Result<Url, ConfigError> {
		resolve_endpoint(&self.base_url, endpoint)
	}
}
impl Debug for ApiClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("connection_id", &self.connection_id)
			.field("provider", &self.provider)
			.field("base_url", &self.base_url.as_str())
			.field("config", &self.config)
			.field("interceptors", &self.interceptors.len())
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
	connection_id: ConnectionId,
	provider: ProviderConfigKey,
	base_url: String,
	config: ClientConfig,
	transport: Option<Arc<dyn HttpTransport>>,
	token_source: Option<Arc<dyn TokenSource>>,
	connection_service: Option<(Url, TokenSecret)>,
	interceptors: InterceptorChain,
}
impl ApiClientBuilder {
	/// Replaces the configuration. It is validated again by [`build`](ApiClientBuilder::build).
	pub fn config(mut self, config: ClientConfig) -> Self {
		self.config = config;

		self
	}

	/// Uses a custom transport instead of the reqwest default.
	pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Uses an explicit credential source.
	pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
		self.token_source = Some(tokens);

		self
	}

	/// Resolves credentials from a connection service through the client's own transport.
	///
	/// Ignored when [`token_source`](ApiClientBuilder::token_source) is also set.
	pub fn connection_service(mut self, service_url: Url, public_key: TokenSecret) -> Self {
		self.connection_service = Some((service_url, public_key));

		self
	}

	/// Appends an interceptor to the chain.
	pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
		self.interceptors.push(interceptor);

		self
	}

	/// Validates the configuration and assembles the client.
	pub fn build(self) -> Result<ApiClient> {
		self.config.validate()?;

		let base_url = Url::parse(&self.base_url)
			.map_err(|source| ConfigError::InvalidBaseUrl { url: self.base_url.clone(), source })?;
		let transport = match self.transport {
			Some(transport) => transport,
			None => default_transport(&self.config)?,
		};
		let tokens: Arc<dyn TokenSource> = match (self.token_source, self.connection_service) {
			(Some(tokens), _) => tokens,
			(None, Some((service_url, public_key))) => Arc::new(
				ConnectionTokenSource::new(
					transport.clone(),
					service_url,
					public_key,
					self.connection_id.clone(),
					self.provider.clone(),
				)
				.with_skew(self.config.credential_skew),
			),
			(None, None) =>
				return Err(ConfigError::invalid_setting(
					"token_source",
					"a token source or connection service is required",
				)
				.into()),
		};
		let limiter =
			Arc::new(RateLimiter::new(self.config.requests_per_second, self.config.burst_capacity)?);
		let executor = RequestExecutor::new(
			transport.clone(),
			limiter,
			tokens.clone(),
			self.config.retry.clone(),
		)
		.with_request_timeout(self.config.request_timeout);
		let cache = self.config.cache_enabled.then(|| ResponseCache::new(self.config.cache_ttl));

		Ok(ApiClient {
			connection_id: self.connection_id,
			provider: self.provider,
			base_url,
			config: self.config,
			transport,
			tokens,
			executor,
			cache,
			interceptors: self.interceptors,
			stats: StatsRecorder::default(),
			closed: AtomicBool::new(false),
		})
	}
}
impl Debug for ApiClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClientBuilder")
			.field("connection_id", &self.connection_id)
			.field("provider", &self.provider)
			.field("base_url", &self.base_url)
			.field("config", &self.config)
			.field("transport_set", &self.transport.is_some())
			.field("token_source_set", &self.token_source.is_some())
			.finish_non_exhaustive()
	}
}

#[cfg(feature = "reqwest")]
fn default_transport(config: &ClientConfig) -> Result<Arc<dyn HttpTransport>, ConfigError> {
	Ok(Arc::new(ReqwestHttpClient::from_config(config)?))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport(_: &ClientConfig) -> Result<Arc<dyn HttpTransport>, ConfigError> {
	Err(ConfigError::invalid_setting("transport", "no default transport without `reqwest`"))
}

fn with_optional_body(request: ApiRequest, body: Option<Value>) -> ApiRequest {
	match body {
		Some(body) => request.with_json(body),
		None => request,
	}
}

/// Appends `endpoint` to `base`, keeping the base path.
pub(crate) fn resolve_endpoint(base: &Url, endpoint: &str) -> Result<Url, ConfigError> {
	if endpoint.contains("://") {
		return Err(ConfigError::InvalidEndpoint { endpoint: endpoint.to_owned() });
	}

	let joined =
		format!("{}/{}", base.as_str().trim_end_matches('/'), endpoint.trim_start_matches('/'));

	Url::parse(&joined).map_err(|_| ConfigError::InvalidEndpoint { endpoint: endpoint.to_owned() })
}
