//! OAuth 2.0 `client_credentials` token source.
//!
//! The grant itself is delegated to the `oauth2` crate. Requests flow through the same
//! [`HttpTransport`] the API client uses, bridged into `oauth2`'s [`AsyncHttpClient`]
//! contract by [`TransportBridge`].

// crates.io
use oauth2::{
	AsyncHttpClient, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	HttpRequest, HttpResponse, RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialCache, TokenFuture, TokenSecret, TokenSource},
	error::{AuthError, ConfigError, TransportError},
	http::{HttpMethod, HttpTransport, OutboundRequest},
	obs,
};

type TokenEndpointClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Token source that exchanges client credentials at an OAuth 2.0 token endpoint.
pub struct ClientCredentialsTokenSource {
	oauth_client: TokenEndpointClient,
	bridge: TransportBridge,
	scopes: Vec<String>,
	token_url: Url,
	cache: CredentialCache,
}
impl ClientCredentialsTokenSource {
	/// Lifetime assumed when the token endpoint omits `expires_in`.
	pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

	/// Creates a source for the given token endpoint and client identity.
	pub fn new(
		transport: Arc<dyn HttpTransport>,
		token_url: Url,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let endpoint = TokenUrl::new(token_url.to_string()).map_err(|source| {
			ConfigError::InvalidBaseUrl { url: token_url.to_string(), source }
		})?;
		let oauth_client = BasicClient::new(ClientId::new(client_id.into()))
			.set_client_secret(ClientSecret::new(client_secret.into()))
			.set_token_uri(endpoint);

		Ok(Self {
			oauth_client,
			bridge: TransportBridge(transport),
			scopes: Vec::new(),
			token_url,
			cache: CredentialCache::default(),
		})
	}

	/// Requests the provided scopes on every exchange.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Overrides the expiry skew applied to cached credentials.
	pub fn with_skew(mut self, skew: Duration) -> Self {
		self.cache = CredentialCache::new(skew);

		self
	}

	async fn exchange(&self) -> Result<Credential> {
		let mut request = self.oauth_client.exchange_client_credentials();

		for scope in &self.scopes {
			request = request.add_scope(Scope::new(scope.clone()));
		}

		let response = request.request_async(&self.bridge).await.map_err(map_request_error)?;
		let expires_in = response.expires_in().unwrap_or(Self::DEFAULT_EXPIRES_IN);
		let token = response.access_token().secret();

		if token.is_empty() {
			return Err(AuthError::MissingAccessToken.into());
		}

		let credential = Credential::issued_now(TokenSecret::new(token.as_str()), expires_in)?;

		obs::credential_refreshed(self.token_url.as_str(), expires_in);

		Ok(credential)
	}
}
impl Debug for ClientCredentialsTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentialsTokenSource")
			.field("token_url", &self.token_url.as_str())
			.field("scopes", &self.scopes)
			.field("cache", &self.cache)
			.finish_non_exhaustive()
	}
}
impl TokenSource for ClientCredentialsTokenSource {
	fn token(&self) -> TokenFuture<'_> {
		Box::pin(async move {
			self.cache.get_or_refresh(|| self.exchange()).await.map(|credential| credential.token)
		})
	}

	fn invalidate(&self) {
		self.cache.invalidate();
	}

	fn refresh_count(&self) -> u64 {
		self.cache.refresh_count()
	}
}

/// Adapts an [`HttpTransport`] to `oauth2`'s [`AsyncHttpClient`].
struct TransportBridge(Arc<dyn HttpTransport>);
impl<'c> AsyncHttpClient<'c> for TransportBridge {
	type Error = HttpClientError<TransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			let method = request
				.method()
				.as_str()
				.parse::<HttpMethod>()
				.map_err(|e| HttpClientError::Other(e.to_string()))?;
			let url = Url::parse(&request.uri().to_string())
				.map_err(|e| HttpClientError::Other(e.to_string()))?;
			let mut outbound = OutboundRequest::new(method, url);

			for (name, value) in request.headers() {
				let value = value.to_str().map_err(|e| HttpClientError::Other(e.to_string()))?;

				outbound = outbound.with_header(name.as_str(), value);
			}

			outbound = outbound.with_body(request.into_body());

			let raw = self.0.execute(outbound).await.map_err(Box::new)?;
			let mut builder = oauth2::http::Response::builder().status(raw.status);

			for (name, value) in &raw.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}

			Ok::<_, Self::Error>(builder.body(raw.body)?)
		})
	}
}

fn map_request_error(err: BasicRequestTokenError<HttpClientError<TransportError>>) -> Error {
	match err {
		RequestTokenError::ServerResponse(response) => {
			let reason = match response.error_description() {
				Some(description) => format!("{}: {description}", response.error().as_ref()),
				None => response.error().as_ref().to_owned(),
			};

			AuthError::GrantRejected { reason }.into()
		},
		RequestTokenError::Request(HttpClientError::Reqwest(inner)) =>
			AuthError::Transport(*inner).into(),
		RequestTokenError::Request(HttpClientError::Io(inner)) =>
			AuthError::Transport(TransportError::Io(inner)).into(),
		RequestTokenError::Request(HttpClientError::Http(inner)) =>
			ConfigError::RequestBuild { source: Box::new(inner) }.into(),
		RequestTokenError::Request(other) =>
			AuthError::Transport(TransportError::network(other)).into(),
		RequestTokenError::Parse(source, _body) => AuthError::TokenResponseParse { source }.into(),
		RequestTokenError::Other(message) => AuthError::GrantRejected { reason: message }.into(),
	}
}
