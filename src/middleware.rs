//! Ordered request/response interceptors run by [`ApiClient`](crate::client::ApiClient).
//!
//! `before_request` hooks run in insertion order and may rewrite or reject a request;
//! `after_response` hooks run in reverse order, so the first interceptor registered sees
//! the response last.

// self
use crate::{_prelude::*, client::ApiRequest, obs, response::ApiResponse};

/// Hook invoked around every request a client handles, cache hits included.
pub trait Interceptor
where
	Self: Send + Sync,
{
	/// Inspects or rewrites the request. Returning `Err` aborts it before dispatch.
	fn before_request(&self, request: &mut ApiRequest) -> Result<()> {
		let _ = request;

		Ok(())
	}

	/// Inspects or rewrites the response.
	fn after_response(&self, request: &ApiRequest, response: ApiResponse) -> ApiResponse {
		let _ = request;

		response
	}
}

/// Ordered list of interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
	interceptors: Vec<Arc<dyn Interceptor>>,
}
impl InterceptorChain {
	/// Appends an interceptor.
	pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
		self.interceptors.push(interceptor);
	}

	/// Appends an interceptor, builder style.
	pub fn with(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
		self.push(interceptor);

		self
	}

	/// Number of interceptors.
	pub fn len(&self) -> usize {
		self.interceptors.len()
	}

	/// Returns `true` if the chain is empty.
	pub fn is_empty(&self) -> bool {
		self.interceptors.is_empty()
	}

	/// Runs every `before_request` hook in order, stopping at the first rejection.
	pub fn before_request(&self, request: &mut ApiRequest) -> Result<()> {
		for interceptor in &self.interceptors {
			interceptor.before_request(request)?;
		}

		Ok(())
	}

	/// Runs every `after_response` hook in reverse order.
	pub fn after_response(&self, request: &ApiRequest, response: ApiResponse) -> ApiResponse {
		self.interceptors
			.iter()
			.rev()
			.fold(response, |response, interceptor| interceptor.after_response(request, response))
	}
}
impl Debug for InterceptorChain {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InterceptorChain").field("len", &self.len()).finish()
	}
}

/// Adds headers the request does not already carry (compared case-insensitively).
#[derive(Clone, Debug, Default)]
pub struct DefaultHeaders {
	headers: BTreeMap<String, String>,
}
impl DefaultHeaders {
	/// Creates the interceptor from name/value pairs.
	pub fn new<I, K, V>(headers: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self { headers: headers.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
	}
}
impl Interceptor for DefaultHeaders {
	fn before_request(&self, request: &mut ApiRequest) -> Result<()> {
		for (name, value) in &self.headers {
			if !request.has_header(name) {
				request.headers.insert(name.clone(), value.clone());
			}
		}

		Ok(())
	}
}

/// Rejects requests whose encoded JSON body exceeds a byte limit.
#[derive(Clone, Copy, Debug)]
pub struct BodySizeLimit {
	max_bytes: usize,
}
impl BodySizeLimit {
	/// 10 MiB.
	pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

	/// Creates a limit of `max_bytes`.
	pub fn new(max_bytes: usize) -> Self {
		Self { max_bytes }
	}

	/// Configured limit in bytes.
	pub fn max_bytes(&self) -> usize {
		self.max_bytes
	}
}
impl Default for BodySizeLimit {
	fn default() -> Self {
		Self::new(Self::DEFAULT_MAX_BYTES)
	}
}
impl Interceptor for BodySizeLimit {
	fn before_request(&self, request: &mut ApiRequest) -> Result<()> {
		let len = request.body_len()?;

		if len > self.max_bytes {
			return Err(Error::Rejected {
				reason: format!("body is {len} bytes, limit is {} bytes", self.max_bytes),
			});
		}

		Ok(())
	}
}

/// Emits a tracing event when a request starts and when its response is produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLog;
impl Interceptor for RequestLog {
	fn before_request(&self, request: &mut ApiRequest) -> Result<()> {
		obs::request_logged(request.method, &request.endpoint, None, false);

		Ok(())
	}

	fn after_response(&self, request: &ApiRequest, response: ApiResponse) -> ApiResponse {
		obs::request_logged(
			request.method,
			&request.endpoint,
			Some(response.status_code),
			response.succeeded,
		);

		response
	}
}
