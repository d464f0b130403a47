//! Bearer credential sources consumed by the request executor.
//!
//! [`ConnectionTokenSource`] resolves credentials for one logical connection from a
//! connection service, [`StaticTokenSource`] serves a fixed token, and
//! [`ClientCredentialsTokenSource`](crate::auth::ClientCredentialsTokenSource) runs an
//! OAuth 2.0 `client_credentials` grant. All of them share [`CredentialCache`] so only
//! one refresh per source is ever in flight.

// self
use crate::{
	_prelude::*,
	auth::{ConnectionId, Credential, CredentialCache, ProviderConfigKey, TokenSecret},
	error::{AuthError, ConfigError},
	http::{HttpMethod, HttpTransport, OutboundRequest},
	obs,
};

/// Boxed future returned by [`TokenSource::token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenSecret>> + 'a + Send>>;

/// Supplies bearer tokens for outbound requests.
///
/// Implementations must return a token that is not within the expiry skew window and must
/// collapse concurrent refreshes into one upstream call.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Returns a currently valid bearer token, refreshing it first when needed.
	fn token(&self) -> TokenFuture<'_>;

	/// Discards the cached credential so the next [`token`](TokenSource::token) call refreshes.
	fn invalidate(&self);

	/// Number of completed upstream refreshes.
	fn refresh_count(&self) -> u64 {
		0
	}
}

/// Token source backed by a connection service that stores provider credentials.
///
/// Each refresh issues `GET {service_url}/connection/{connection_id}` authenticated with the
/// service's public key and parses `credentials.access_token` plus an optional
/// `credentials.expires_in` (seconds, defaulting to one hour).
pub struct ConnectionTokenSource {
	transport: Arc<dyn HttpTransport>,
	service_url: Url,
	public_key: TokenSecret,
	connection_id: ConnectionId,
	provider_config_key: ProviderConfigKey,
	cache: CredentialCache,
}
impl ConnectionTokenSource {
	/// Connection service endpoint used when none is configured.
	pub const DEFAULT_SERVICE_URL: &'static str = "https://api.nango.dev";
	/// Lifetime assumed when the service omits `expires_in`.
	pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

	/// Creates a source for one connection with the default expiry skew.
	pub fn new(
		transport: Arc<dyn HttpTransport>,
		service_url: Url,
		public_key: TokenSecret,
		connection_id: ConnectionId,
		provider_config_key: ProviderConfigKey,
	) -> Self {
		Self {
			transport,
			service_url,
			public_key,
			connection_id,
			provider_config_key,
			cache: CredentialCache::default(),
		}
	}

	/// Overrides the expiry skew applied to cached credentials.
	pub fn with_skew(mut self, skew: Duration) -> Self {
		self.cache = CredentialCache::new(skew);

		self
	}

	/// Connection this source resolves credentials for.
	pub fn connection_id(&self) -> &ConnectionId {
		&self.connection_id
	}

	/// Provider configuration key forwarded to the connection service.
	pub fn provider_config_key(&self) -> &ProviderConfigKey {
		&self.provider_config_key
	}

	/// Returns the cached credential if it is still outside the skew window.
	pub fn cached(&self) -> Option<Credential> {
		self.cache.fresh_at(OffsetDateTime::now_utc())
	}

	fn connection_url(&self) -> Result<Url, ConfigError> {
		let mut url = self.service_url.clone();

		url.path_segments_mut()
			.map_err(|_| ConfigError::InvalidEndpoint {
				endpoint: format!("connection/{}", self.connection_id),
			})?
			.pop_if_empty()
			.extend(["connection", self.connection_id.as_ref()]);

		Ok(url)
	}

	async fn fetch(&self) -> Result<Credential> {
		let request = OutboundRequest::new(HttpMethod::Get, self.connection_url()?)
			.with_header("Authorization", self.public_key.bearer())
			.with_header("Provider-Config-Key", self.provider_config_key.as_ref())
			.with_header("Connection-Id", self.connection_id.as_ref())
			.with_header("Accept", "application/json");
		let response = self.transport.execute(request).await.map_err(AuthError::from)?;

		if response.status != 200 {
			return Err(AuthError::TokenEndpoint {
				status: response.status,
				message: body_preview(&response.text()),
			}
			.into());
		}

		let payload: ConnectionPayload = {
			let mut de = serde_json::Deserializer::from_slice(&response.body);

			serde_path_to_error::deserialize(&mut de)
				.map_err(|source| AuthError::TokenResponseParse { source })?
		};
		let access_token = payload
			.credentials
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or(AuthError::MissingAccessToken)?;
		let expires_in = payload
			.credentials
			.expires_in
			.map(Duration::from_secs)
			.unwrap_or(Self::DEFAULT_EXPIRES_IN);

		let credential = Credential::issued_now(TokenSecret::new(access_token), expires_in)?;

		obs::credential_refreshed(self.connection_id.as_ref(), expires_in);

		Ok(credential)
	}
}
impl Debug for ConnectionTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConnectionTokenSource")
			.field("service_url", &self.service_url.as_str())
			.field("connection_id", &self.connection_id)
			.field("provider_config_key", &self.provider_config_key)
			.field("cache", &self.cache)
			.finish_non_exhaustive()
	}
}
impl TokenSource for ConnectionTokenSource {
	fn token(&self) -> TokenFuture<'_> {
		Box::pin(async move {
			self.cache.get_or_refresh(|| self.fetch()).await.map(|credential| credential.token)
		})
	}

	fn invalidate(&self) {
		self.cache.invalidate();
	}

	fn refresh_count(&self) -> u64 {
		self.cache.refresh_count()
	}
}

/// Token source that always returns the same bearer token.
#[derive(Clone, Debug)]
pub struct StaticTokenSource(TokenSecret);
impl StaticTokenSource {
	/// Wraps a fixed token.
	pub fn new(token: impl Into<String>) -> Self {
		Self(TokenSecret::new(token))
	}
}
impl TokenSource for StaticTokenSource {
	fn token(&self) -> TokenFuture<'_> {
		let token = self.0.clone();

		Box::pin(async move { Ok(token) })
	}

	fn invalidate(&self) {}
}

#[derive(Deserialize)]
struct ConnectionPayload {
	credentials: ConnectionCredentials,
}

#[derive(Deserialize)]
struct ConnectionCredentials {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	expires_in: Option<u64>,
}

pub(crate) fn body_preview(body: &str) -> String {
	const LIMIT: usize = 256;

	let trimmed = body.trim();

	if trimmed.is_empty() {
		return "empty response body".into();
	}

	match trimmed.char_indices().nth(LIMIT) {
		Some((idx, _)) => format!("{}...", &trimmed[..idx]),
		None => trimmed.to_owned(),
	}
}
