//! Transport primitives for outbound provider calls.
//!
//! The module exposes [`HttpTransport`] as the client's only dependency on an HTTP stack,
//! alongside the crate-owned [`OutboundRequest`] and [`RawResponse`] shapes. The executor,
//! the token sources, and the OAuth 2.0 bridge all speak these types, so a custom
//! transport (or a scripted fake in tests) plugs in without touching any reqwest type.

// std
#[cfg(feature = "reqwest")] use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::{config::ClientConfig, error::ConfigError};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing one outbound attempt.
///
/// Implementations must apply their own connect/total timeouts and must never retry;
/// retry decisions belong to [`RequestExecutor`](crate::executor::RequestExecutor).
/// Any HTTP status (including 4xx/5xx) is a successful transport outcome.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes a single attempt.
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_>;

	/// Stops dispatching new attempts. Called once when the owning client closes.
	fn shutdown(&self) {}
}

/// HTTP methods the client issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl HttpMethod {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			HttpMethod::Get => "GET",
			HttpMethod::Post => "POST",
			HttpMethod::Put => "PUT",
			HttpMethod::Patch => "PATCH",
			HttpMethod::Delete => "DELETE",
		}
	}

	/// Only `GET` results may be served from the response cache.
	pub const fn is_cacheable(self) -> bool {
		matches!(self, HttpMethod::Get)
	}

	#[cfg(feature = "reqwest")]
	fn as_reqwest(self) -> reqwest::Method {
		match self {
			HttpMethod::Get => reqwest::Method::GET,
			HttpMethod::Post => reqwest::Method::POST,
			HttpMethod::Put => reqwest::Method::PUT,
			HttpMethod::Patch => reqwest::Method::PATCH,
			HttpMethod::Delete => reqwest::Method::DELETE,
		}
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for HttpMethod {
	type Err = UnsupportedMethod;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"GET" => Ok(HttpMethod::Get),
			"POST" => Ok(HttpMethod::Post),
			"PUT" => Ok(HttpMethod::Put),
			"PATCH" => Ok(HttpMethod::Patch),
			"DELETE" => Ok(HttpMethod::Delete),
			_ => Err(UnsupportedMethod(s.to_owned())),
		}
	}
}

/// Error returned when parsing an HTTP method the client does not issue.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unsupported HTTP method `{0}`.")]
pub struct UnsupportedMethod(pub String);

/// Fully resolved request handed to a transport for one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundRequest {
	/// HTTP method.
	pub method: HttpMethod,
	/// Absolute target URL (query parameters are kept separately).
	pub url: Url,
	/// Request headers.
	pub headers: BTreeMap<String, String>,
	/// Query parameters appended to `url`.
	pub query: Vec<(String, String)>,
	/// Encoded request body.
	pub body: Option<Vec<u8>>,
}
impl OutboundRequest {
	/// Creates a request without headers, query, or body.
	pub fn new(method: HttpMethod, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), query: Vec::new(), body: None }
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Attaches an encoded body.
	pub fn with_body(mut self, body: Vec<u8>) -> Self {
		self.body = Some(body);

		self
	}
}

/// Status, headers, and body captured from one attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers keyed by lower-case name.
	pub headers: BTreeMap<String, String>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl RawResponse {
	/// Creates a response, normalizing header names to lower case.
	pub fn new<I, K, V>(status: u16, headers: I, body: impl Into<Vec<u8>>) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		let headers =
			headers.into_iter().map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into())).collect();

		Self { status, headers, body: body.into() }
	}

	/// Case-insensitive header lookup.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Lossy UTF-8 view of the body.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// reqwest-backed [`HttpTransport`] with a bounded number of in-flight requests.
///
/// reqwest pools idle connections per host but has no global connection cap, so the
/// transport gates every attempt on a semaphore sized by `max_connections`. Clones share
/// the gate and the shutdown flag.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
	permits: Arc<Semaphore>,
	shut_down: Arc<AtomicBool>,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient, max_connections: usize) -> Self {
		Self {
			client,
			permits: Arc::new(Semaphore::new(max_connections)),
			shut_down: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Returns `true` once [`shutdown`](HttpTransport::shutdown) ran on this client or a clone.
	pub fn is_shut_down(&self) -> bool {
		self.shut_down.load(Ordering::Acquire)
	}

	/// Builds a pooled client from the timeouts and limits in `config`.
	pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.timeout(config.request_timeout)
			.connect_timeout(config.connect_timeout)
			.pool_max_idle_per_host(config.max_connections_per_host)
			.user_agent(config.user_agent.as_str())
			.build()?;

		Ok(Self::with_client(client, config.max_connections))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			if self.is_shut_down() {
				return Err(TransportError::Shutdown);
			}

			let _permit = self.permits.acquire().await;
			let mut builder = self.client.request(request.method.as_reqwest(), request.url);

			if !request.query.is_empty() {
				builder = builder.query(&request.query);
			}
			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect::<Vec<_>>();
			let body = response.bytes().await?;

			Ok::<_, TransportError>(RawResponse::new(status, headers, body.to_vec()))
		})
	}

	/// Stops dispatching; later attempts fail with [`TransportError::Shutdown`].
	///
	/// Pooled connections close once the last clone of the inner client drops.
	fn shutdown(&self) {
		self.shut_down.store(true, Ordering::Release);
	}
}

/// Parses a `Retry-After` value given either as delta-seconds or as an HTTP date.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
	parse_retry_after_at(raw, OffsetDateTime::now_utc())
}

pub(crate) fn parse_retry_after_at(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	// crates.io
	use time::format_description::well_known::Rfc2822;

	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::from_secs(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		return Some(Duration::try_from(delta).unwrap_or(Duration::ZERO));
	}

	None
}
