#![cfg(feature = "reqwest")]

// crates.io
use httpmock::{Mock, prelude::*};
use serde_json::json;
// self
use integration_client::{
	_preludet::*,
	auth::TokenSource,
	config::ClientConfig,
	error::AuthError,
	response::FailureKind,
};

fn test_config() -> ClientConfig {
	ClientConfig::builder()
		.backoff_base(Duration::from_millis(10))
		.cache_ttl(Duration::from_millis(250))
		.build()
		.expect("Test configuration should be valid.")
}

async fn mock_connection<'a>(server: &'a MockServer, connection: &str, token: &str) -> Mock<'a> {
	let path = format!("/connection/{connection}");
	let body = json!({ "credentials": { "access_token": token, "expires_in": 3600 } });

	server
		.mock_async(|when, then| {
			when.method(GET)
				.path(path)
				.header("authorization", format!("Bearer {TEST_PUBLIC_KEY}"))
				.header("provider-config-key", "mock-provider")
				.header("connection-id", connection);
			then.status(200).header("content-type", "application/json").json_body(body);
		})
		.await
}

#[tokio::test]
async fn get_sends_bearer_token_and_query() {
	let server = MockServer::start_async().await;
	let token_mock = mock_connection(&server, "conn-get", "tok-get").await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/items")
				.query_param("page", "2")
				.header("authorization", "Bearer tok-get")
				.header("accept", "application/json");
			then.status(200)
				.header("content-type", "application/json")
				.header("x-ratelimit-remaining", "99")
				.body("{\"items\":[\"a\",\"b\"]}");
		})
		.await;
	let (client, _) =
		build_reqwest_test_client(&server.base_url(), &server.url("/api"), "conn-get", test_config());
	let response = client.get("/items", &[("page", "2")]).await.expect("GET should complete.");

	assert!(response.succeeded);
	assert_eq!(response.status_code, 200);
	assert_eq!(response.body, Some(json!({ "items": ["a", "b"] })));
	assert_eq!(response.rate_limit_remaining, Some(99));

	token_mock.assert_calls_async(1).await;
	api_mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn post_sends_json_body() {
	let server = MockServer::start_async().await;
	let _token = mock_connection(&server, "conn-post", "tok-post").await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/items")
				.header("content-type", "application/json")
				.json_body(json!({ "name": "widget" }));
			then.status(201).header("content-type", "application/json").body("{\"id\":7}");
		})
		.await;
	let (client, _) = build_reqwest_test_client(
		&server.base_url(),
		&server.url("/api"),
		"conn-post",
		test_config(),
	);
	let first = client
		.post("/items", Some(json!({ "name": "widget" })))
		.await
		.expect("POST should complete.");
	let second = client
		.post("/items", Some(json!({ "name": "widget" })))
		.await
		.expect("POST should complete.");

	assert_eq!(first.status_code, 201);
	assert_eq!(second.body, Some(json!({ "id": 7 })));

	api_mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn repeated_get_within_ttl_hits_cache() {
	let server = MockServer::start_async().await;
	let _token = mock_connection(&server, "conn-cache", "tok-cache").await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/profile");
			then.status(200).header("content-type", "application/json").body("{\"name\":\"x\"}");
		})
		.await;
	let config = ClientConfig { cache_ttl: Duration::from_secs(60), ..test_config() };
	let (client, _) =
		build_reqwest_test_client(&server.base_url(), &server.url("/api"), "conn-cache", config);
	let first = client.get("/profile", &[]).await.expect("First GET should complete.");
	let second = client.get("/profile", &[]).await.expect("Second GET should complete.");

	assert_eq!(first, second);

	api_mock.assert_calls_async(1).await;

	let stats = client.stats();

	assert_eq!(stats.request_count, 2);
	assert_eq!(stats.error_count, 0);
	assert_eq!(stats.attempt_count, 1);
	assert_eq!(stats.cache_hits, 1);
	assert_eq!(stats.cache_misses, 1);
	assert_eq!(stats.cache_hit_rate, 0.5);
}

#[tokio::test]
async fn unbounded_ttl_and_skew_do_not_panic() {
	let server = MockServer::start_async().await;
	let token_mock = mock_connection(&server, "conn-forever", "tok-forever").await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/profile");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let config = ClientConfig::builder()
		.cache_ttl(Duration::MAX)
		.credential_skew(Duration::MAX)
		.build()
		.expect("Unbounded durations should validate.");
	let (client, _) =
		build_reqwest_test_client(&server.base_url(), &server.url("/api"), "conn-forever", config);

	for _ in 0..2 {
		assert!(client.get("/profile", &[]).await.expect("GET should complete.").succeeded);
	}

	assert!(client.post("/profile", None).await.is_ok());

	api_mock.assert_calls_async(1).await;
	// The skew swallows the whole lifetime, so each outbound request refreshes.
	token_mock.assert_calls_async(2).await;
	assert_eq!(client.stats().cache_hits, 1);
}

#[tokio::test]
async fn expired_cache_entry_is_refetched() {
	let server = MockServer::start_async().await;
	let _token = mock_connection(&server, "conn-ttl", "tok-ttl").await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/profile");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let (client, _) =
		build_reqwest_test_client(&server.base_url(), &server.url("/api"), "conn-ttl", test_config());

	client.get("/profile", &[]).await.expect("First GET should complete.");
	tokio::time::sleep(Duration::from_millis(500)).await;
	client.get("/profile", &[]).await.expect("Second GET should complete.");

	api_mock.assert_calls_async(2).await;
	assert_eq!(client.stats().cache_hits, 0);
}

#[tokio::test]
async fn failed_responses_are_not_cached() {
	let server = MockServer::start_async().await;
	let _token = mock_connection(&server, "conn-miss", "tok-miss").await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/missing");
			then.status(404).header("content-type", "application/json").body(
				"{\"message\":\"not found\"}",
			);
		})
		.await;
	let (client, _) =
		build_reqwest_test_client(&server.base_url(), &server.url("/api"), "conn-miss", test_config());
	let response = client.get("/missing", &[]).await.expect("GET should complete.");

	client.get("/missing", &[]).await.expect("GET should complete.");

	assert!(!response.succeeded);
	assert_eq!(response.failure, Some(FailureKind::ClientError));
	assert_eq!(response.error_message.as_deref(), Some("not found"));

	api_mock.assert_calls_async(2).await;

	let stats = client.stats();

	assert_eq!(stats.error_count, 2);
	assert_eq!(stats.error_rate, 1.);
}

#[tokio::test]
async fn server_errors_are_retried_until_budget_is_spent() {
	let server = MockServer::start_async().await;
	let _token = mock_connection(&server, "conn-5xx", "tok-5xx").await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/flaky");
			then.status(502).body("bad gateway");
		})
		.await;
	let config = ClientConfig::builder()
		.max_retries(2)
		.backoff_base(Duration::from_millis(10))
		.build()
		.expect("Retry configuration should be valid.");
	let (client, _) =
		build_reqwest_test_client(&server.base_url(), &server.url("/api"), "conn-5xx", config);
	let response = client.get("/flaky", &[]).await.expect("GET should complete.");

	assert_eq!(response.status_code, 502);
	assert_eq!(response.failure, Some(FailureKind::ServerError));
	assert_eq!(response.body, Some(json!({ "raw_response": "bad gateway" })));

	api_mock.assert_calls_async(3).await;
	assert_eq!(client.stats().attempt_count, 3);
}

#[tokio::test]
async fn credential_is_reused_across_requests() {
	let server = MockServer::start_async().await;
	let token_mock = mock_connection(&server, "conn-reuse", "tok-reuse").await;
	let _api = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/api/items/1").header("authorization", "Bearer tok-reuse");
			then.status(204);
		})
		.await;
	let (client, source) = build_reqwest_test_client(
		&server.base_url(),
		&server.url("/api"),
		"conn-reuse",
		test_config(),
	);

	for _ in 0..3 {
		let response = client.delete("/items/1").await.expect("DELETE should complete.");

		assert_eq!(response.status_code, 204);
		assert_eq!(response.body, None);
	}

	token_mock.assert_calls_async(1).await;
	assert_eq!(source.refresh_count(), 1);
}

#[tokio::test]
async fn token_service_failure_surfaces_auth_error() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/connection/conn-denied");
			then.status(401).body("{\"error\":\"invalid key\"}");
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.path("/api/items");
			then.status(200);
		})
		.await;
	let (client, _) = build_reqwest_test_client(
		&server.base_url(),
		&server.url("/api"),
		"conn-denied",
		test_config(),
	);
	let err = client.get("/items", &[]).await.expect_err("Credential failure should raise.");

	assert!(matches!(err, Error::Auth(AuthError::TokenEndpoint { status: 401, .. })));

	token_mock.assert_calls_async(1).await;
	api_mock.assert_calls_async(0).await;
	assert_eq!(client.stats().error_count, 1);
}

#[tokio::test]
async fn closed_client_rejects_requests() {
	let server = MockServer::start_async().await;
	let (client, _) = build_reqwest_test_client(
		&server.base_url(),
		&server.url("/api"),
		"conn-closed",
		test_config(),
	);

	client.close();
	client.close();

	assert!(client.is_closed());
	assert!(matches!(client.get("/items", &[]).await, Err(Error::Closed)));
}

#[tokio::test]
async fn health_check_treats_not_found_as_reachable() {
	let server = MockServer::start_async().await;
	let _token = mock_connection(&server, "conn-health", "tok-health").await;
	let root = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/");
			then.status(404);
		})
		.await;
	let (client, _) = build_reqwest_test_client(
		&server.base_url(),
		&server.url("/api"),
		"conn-health",
		test_config(),
	);

	assert!(client.health_check().await);
	assert!(client.health_check().await);

	root.assert_calls_async(2).await;
}

#[tokio::test]
async fn health_check_fails_on_forbidden() {
	let server = MockServer::start_async().await;
	let _token = mock_connection(&server, "conn-forbidden", "tok-forbidden").await;
	let _root = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/");
			then.status(403);
		})
		.await;
	let (client, _) = build_reqwest_test_client(
		&server.base_url(),
		&server.url("/api"),
		"conn-forbidden",
		test_config(),
	);

	assert!(!client.health_check().await);
}
