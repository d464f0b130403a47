//! Caller-facing request description.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, cache, error::ConfigError, http::HttpMethod};

/// One logical request before authentication and dispatch.
///
/// Interceptors receive a mutable reference before dispatch and may rewrite any field.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: HttpMethod,
	/// Path appended to the client's base URL.
	pub endpoint: String,
	/// Query parameters.
	pub params: BTreeMap<String, String>,
	/// JSON body.
	pub body: Option<Value>,
	/// Extra headers; these override the client's defaults on conflict.
	pub headers: BTreeMap<String, String>,
	/// Bypasses the response cache for this request only.
	pub skip_cache: bool,
}
impl ApiRequest {
	/// Creates a request with no parameters, body, or extra headers.
	pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
		Self {
			method,
			endpoint: endpoint.into(),
			params: BTreeMap::new(),
			body: None,
			headers: BTreeMap::new(),
			skip_cache: false,
		}
	}

	/// `GET` request.
	pub fn get(endpoint: impl Into<String>) -> Self {
		Self::new(HttpMethod::Get, endpoint)
	}

	/// `POST` request.
	pub fn post(endpoint: impl Into<String>) -> Self {
		Self::new(HttpMethod::Post, endpoint)
	}

	/// `PUT` request.
	pub fn put(endpoint: impl Into<String>) -> Self {
		Self::new(HttpMethod::Put, endpoint)
	}

	/// `PATCH` request.
	pub fn patch(endpoint: impl Into<String>) -> Self {
		Self::new(HttpMethod::Patch, endpoint)
	}

	/// `DELETE` request.
	pub fn delete(endpoint: impl Into<String>) -> Self {
		Self::new(HttpMethod::Delete, endpoint)
	}

	/// Adds one query parameter.
	pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.params.insert(name.into(), value.into());

		self
	}

	/// Adds several query parameters.
	pub fn with_params<I, K, V>(mut self, params: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.params.extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));

		self
	}

	/// Attaches a JSON body.
	pub fn with_json(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Serializes `body` and attaches it.
	pub fn with_body<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		Ok(self.with_json(serde_json::to_value(body)?))
	}

	/// Adds or replaces a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Skips the response cache for this request.
	pub fn without_cache(mut self) -> Self {
		self.skip_cache = true;

		self
	}

	/// Returns `true` if a header with this name (any case) is set.
	pub fn has_header(&self, name: &str) -> bool {
		self.headers.keys().any(|key| key.eq_ignore_ascii_case(name))
	}

	/// Encoded body size in bytes.
	pub fn body_len(&self) -> Result<usize, ConfigError> {
		match &self.body {
			Some(body) => Ok(serde_json::to_vec(body)?.len()),
			None => Ok(0),
		}
	}

	/// Whether this request may be answered from, or stored into, the cache.
	pub fn is_cacheable(&self) -> bool {
		self.method.is_cacheable() && !self.skip_cache
	}

	/// Cache key over method, endpoint, parameters, and body.
	pub fn cache_key(&self) -> String {
		cache::cache_key(self.method, &self.endpoint, &self.params, self.body.as_ref())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn builders_accumulate_fields() {
		let request = ApiRequest::get("/users")
			.with_param("page", "1")
			.with_params([("limit", "5")])
			.with_header("X-Trace", "abc");

		assert_eq!(request.method, HttpMethod::Get);
		assert_eq!(request.params.len(), 2);
		assert!(request.has_header("x-trace"));
		assert!(request.is_cacheable());
		assert!(!request.clone().without_cache().is_cacheable());
		assert!(!ApiRequest::post("/users").is_cacheable());
	}

	#[test]
	fn body_len_counts_encoded_bytes() {
		let request = ApiRequest::post("/items")
			.with_body(&serde_json::json!({ "a": 1 }))
			.expect("JSON values always serialize.");

		assert_eq!(request.body_len().expect("Body should encode."), r#"{"a":1}"#.len());
		assert_eq!(ApiRequest::delete("/items/1").body_len().expect("Empty body."), 0);
	}
}
