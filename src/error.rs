//! Client-level error types shared across credential sources, the executor, and the
//! composition root.
//!
//! Only process-level faults travel through [`Error`]. Ordinary HTTP outcomes (4xx, 5xx,
//! exhausted 429 retries, transport failures) are returned as data inside
//! [`ApiResponse`](crate::response::ApiResponse).

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration or request construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Bearer credential could not be obtained or refreshed.
	#[error(transparent)]
	Auth(#[from] AuthError),

	/// An interceptor refused to dispatch the request.
	#[error("Request rejected before dispatch: {reason}.")]
	Rejected {
		/// Interceptor-supplied reason string.
		reason: String,
	},
	/// The client was shut down and no longer accepts requests.
	#[error("Client has been closed.")]
	Closed,
}

/// Configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot be parsed.
	#[error("Base URL `{url}` is invalid.")]
	InvalidBaseUrl {
		/// Offending URL string.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoint cannot be joined onto the base URL.
	#[error("Endpoint `{endpoint}` cannot be resolved against the base URL.")]
	InvalidEndpoint {
		/// Endpoint path supplied by the caller.
		endpoint: String,
	},
	/// A numeric or duration setting is out of range.
	#[error("Setting `{field}` is invalid: {reason}.")]
	InvalidSetting {
		/// Name of the offending setting.
		field: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	BodySerialize(#[from] serde_json::Error),
	/// HTTP request construction failed inside the transport.
	#[error("HTTP request could not be constructed.")]
	RequestBuild {
		/// Transport-specific builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_setting(field: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidSetting { field, reason: reason.into() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while obtaining a bearer credential.
///
/// An [`AuthError`] fails the in-flight request only; the next request retries the refresh.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Token service answered with a non-200 status.
	#[error("Token service returned HTTP {status}: {message}.")]
	TokenEndpoint {
		/// HTTP status code returned by the token service.
		status: u16,
		/// Body preview or provider-supplied message.
		message: String,
	},
	/// Token service responded with malformed JSON.
	#[error("Token service returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Token service response did not carry an access token.
	#[error("Token service response is missing an access token.")]
	MissingAccessToken,
	/// Token service reported a lifetime too large to turn into an expiry instant.
	#[error("Token service reported an out-of-range lifetime of {expires_in_secs} seconds.")]
	ExpiryOutOfRange {
		/// Reported lifetime in seconds.
		expires_in_secs: u64,
	},
	/// OAuth 2.0 token endpoint rejected the grant.
	#[error("Token endpoint rejected the grant: {reason}.")]
	GrantRejected {
		/// Provider- or client-supplied reason string.
		reason: String,
	},
	/// Token service could not be reached.
	#[error("Token service is unreachable.")]
	Transport(#[from] TransportError),
}

/// Transport-level failures (network, timeout, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure (DNS, TCP, TLS).
	#[error("Network error: {source}")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The attempt exceeded its connect or total timeout.
	#[error("Request timed out.")]
	Timeout,
	/// The transport could not construct the request.
	#[error("Request could not be constructed: {source}")]
	Build {
		/// Transport-specific builder failure.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	/// The transport was shut down and no longer dispatches requests.
	#[error("Transport has been shut down.")]
	Shutdown,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific request builder error.
	pub fn build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Build { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::Timeout
		} else if e.is_builder() {
			Self::build(e)
		} else {
			Self::network(e)
		}
	}
}
