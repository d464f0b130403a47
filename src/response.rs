//! Uniform request outcome returned by the client.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, http::RawResponse};

/// Failure classification attached to unsuccessful [`ApiResponse`] values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	/// 4xx other than 429; never retried.
	ClientError,
	/// 429 after the retry budget ran out.
	RateLimitExceeded,
	/// 5xx after the retry budget ran out.
	ServerError,
	/// Connection, DNS, TLS, or timeout failure; reported with status `0`.
	Transport,
}
impl FailureKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FailureKind::ClientError => "client_error",
			FailureKind::RateLimitExceeded => "rate_limit_exceeded",
			FailureKind::ServerError => "server_error",
			FailureKind::Transport => "transport",
		}
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Immutable outcome of one logical request.
///
/// Ordinary HTTP failures are reported here with `succeeded = false` rather than through
/// [`Error`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
	/// HTTP status code, or `0` for transport failures.
	pub status_code: u16,
	/// Parsed body. Non-JSON bodies are wrapped as `{"raw_response": "<text>"}`.
	pub body: Option<Value>,
	/// Response headers keyed by lower-case name.
	pub headers: BTreeMap<String, String>,
	/// Whether the request succeeded.
	pub succeeded: bool,
	/// Human-readable failure description.
	pub error_message: Option<String>,
	/// Failure classification.
	pub failure: Option<FailureKind>,
	/// Value of `X-RateLimit-Remaining`.
	pub rate_limit_remaining: Option<u64>,
	/// Value of `X-RateLimit-Reset`, interpreted as unix seconds.
	pub rate_limit_reset_at: Option<OffsetDateTime>,
}
impl ApiResponse {
	/// Builds a successful response, reading rate-limit headers.
	pub fn success(
		status_code: u16,
		body: Option<Value>,
		headers: BTreeMap<String, String>,
	) -> Self {
		let rate_limit_remaining =
			headers.get("x-ratelimit-remaining").and_then(|v| v.trim().parse().ok());
		let rate_limit_reset_at = headers
			.get("x-ratelimit-reset")
			.and_then(|v| v.trim().parse::<i64>().ok())
			.and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());

		Self {
			status_code,
			body,
			headers,
			succeeded: true,
			error_message: None,
			failure: None,
			rate_limit_remaining,
			rate_limit_reset_at,
		}
	}

	/// Builds a failed response.
	pub fn failure(
		status_code: u16,
		body: Option<Value>,
		headers: BTreeMap<String, String>,
		kind: FailureKind,
		message: impl Into<String>,
	) -> Self {
		Self {
			status_code,
			body,
			headers,
			succeeded: false,
			error_message: Some(message.into()),
			failure: Some(kind),
			rate_limit_remaining: None,
			rate_limit_reset_at: None,
		}
	}

	/// Builds the status `0` response used for transport failures.
	pub fn transport_failure(message: impl Into<String>) -> Self {
		Self::failure(0, None, BTreeMap::new(), FailureKind::Transport, message)
	}

	/// Classifies a raw response that will not be retried.
	///
	/// `< 400` succeeds. Anything else fails with the message extracted from the body.
	pub fn from_raw(raw: RawResponse) -> Self {
		let body = parse_body(&raw.body);

		if raw.status < 400 {
			return Self::success(raw.status, body, raw.headers);
		}

		let kind = match raw.status {
			429 => FailureKind::RateLimitExceeded,
			s if s >= 500 => FailureKind::ServerError,
			_ => FailureKind::ClientError,
		};
		let message = error_message(body.as_ref(), raw.status);

		Self::failure(raw.status, body, raw.headers, kind, message)
	}

	/// Case-insensitive header lookup.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}
}

/// Parses a response body as JSON, wrapping anything else as `{"raw_response": text}`.
///
/// An empty body yields `None`.
pub fn parse_body(bytes: &[u8]) -> Option<Value> {
	if bytes.iter().all(u8::is_ascii_whitespace) {
		return None;
	}

	match serde_json::from_slice(bytes) {
		Ok(value) => Some(value),
		Err(_) => Some(serde_json::json!({ "raw_response": String::from_utf8_lossy(bytes) })),
	}
}

/// Picks the body's `error` field, then `message`, then falls back to `HTTP <status>`.
pub fn error_message(body: Option<&Value>, status: u16) -> String {
	let field = |name: &str| match body?.get(name)? {
		Value::Null => None,
		Value::String(s) => Some(s.clone()),
		other => Some(other.to_string()),
	};

	field("error").or_else(|| field("message")).unwrap_or_else(|| format!("HTTP {status}"))
}
