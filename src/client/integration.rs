//! Capability every provider integration implements.

// self
use crate::{
	_prelude::*,
	client::{ApiClient, ApiRequest},
	response::ApiResponse,
};

/// Boxed future returned by [`Integration`] methods.
pub type IntegrationFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a + Send>>;

/// A provider integration riding on one [`ApiClient`].
///
/// Implementors decide what a lightweight reachability probe looks like for their
/// provider; registries and health reports only rely on this trait.
pub trait Integration
where
	Self: Send + Sync,
{
	/// Client the integration issues requests through.
	fn client(&self) -> &ApiClient;

	/// Issues a lightweight call and reports whether the provider is reachable.
	fn test_connection(&self) -> IntegrationFuture<'_, bool>;
}

/// Integration that probes a single endpoint with [`ApiClient::health_check`] semantics.
#[derive(Debug)]
pub struct ProbeIntegration {
	client: ApiClient,
	probe: String,
}
impl ProbeIntegration {
	/// Probes `/` on the client's base URL.
	pub fn new(client: ApiClient) -> Self {
		Self { client, probe: "/".into() }
	}

	/// Probes `endpoint` instead of `/`.
	pub fn with_probe(mut self, endpoint: impl Into<String>) -> Self {
		self.probe = endpoint.into();

		self
	}

	/// Endpoint used by [`Integration::test_connection`].
	pub fn probe(&self) -> &str {
		&self.probe
	}
}
impl Integration for ProbeIntegration {
	fn client(&self) -> &ApiClient {
		&self.client
	}

	fn test_connection(&self) -> IntegrationFuture<'_, bool> {
		Box::pin(async move {
			let outcome =
				self.client.request(ApiRequest::get(self.probe.as_str()).without_cache()).await;

			is_reachable(&outcome)
		})
	}
}

/// A probe counts as reachable on success, 200, or 404.
pub(crate) fn is_reachable(outcome: &Result<ApiResponse>) -> bool {
	match outcome {
		Ok(response) => response.succeeded || matches!(response.status_code, 200 | 404),
		Err(_) => false,
	}
}
