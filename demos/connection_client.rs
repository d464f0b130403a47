//! Demonstrates an API client that resolves its bearer token from a connection service,
//! caches `GET` results, and reports usage statistics.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use integration_client::{
	auth::{ConnectionId, ProviderConfigKey, TokenSecret},
	client::ApiClient,
	config::ClientConfig,
	middleware::{BodySizeLimit, DefaultHeaders, RequestLog},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let connection_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/connection/demo-connection");
			then.status(200).header("content-type", "application/json").body(
				"{\"credentials\":{\"access_token\":\"demo-access\",\"expires_in\":900}}",
			);
		})
		.await;
	let contacts_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/crm/v3/contacts")
				.header("authorization", "Bearer demo-access")
				.header("x-demo-tenant", "acme");
			then.status(200)
				.header("content-type", "application/json")
				.header("x-ratelimit-remaining", "249")
				.body("{\"results\":[{\"id\":\"1\",\"email\":\"ada@example.com\"}]}");
		})
		.await;
	let config = ClientConfig::builder().requests_per_second(5.).burst_capacity(5.).build()?;
	let client = ApiClient::builder(
		ConnectionId::new("demo-connection")?,
		ProviderConfigKey::new("hubspot")?,
		server.url("/crm/v3"),
	)
	.config(config)
	.connection_service(Url::parse(&server.base_url())?, TokenSecret::new("demo-public-key"))
	.interceptor(Arc::new(DefaultHeaders::new([("X-Demo-Tenant", "acme")])))
	.interceptor(Arc::new(BodySizeLimit::default()))
	.interceptor(Arc::new(RequestLog))
	.build()?;

	for _ in 0..3 {
		let response = client.get("/contacts", &[("limit", "10")]).await?;

		println!(
			"HTTP {} with {:?} requests left: {}.",
			response.status_code,
			response.rate_limit_remaining,
			response.body.unwrap_or_default()
		);
	}

	let stats = client.stats();

	println!(
		"{} requests, {} outbound attempts, cache hit rate {:.2}.",
		stats.request_count, stats.attempt_count, stats.cache_hit_rate
	);

	client.close();
	connection_mock.assert_async().await;
	contacts_mock.assert_async().await;

	Ok(())
}
