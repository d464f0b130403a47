#![cfg(feature = "reqwest")]

// std
use std::{
	collections::VecDeque,
	sync::atomic::{AtomicUsize, Ordering},
};
// crates.io
use serde_json::json;
use tokio::time::Instant;
// self
use integration_client::{
	_preludet::*,
	auth::{StaticTokenSource, TokenFuture, TokenSecret, TokenSource},
	error::TransportError,
	executor::{RATE_LIMIT_EXHAUSTED, RequestExecutor, RetryPolicy},
	http::{HttpMethod, HttpTransport, OutboundRequest, RawResponse, TransportFuture},
	rate_limit::RateLimiter,
	response::FailureKind,
};

type Reply = Result<RawResponse, TransportError>;

#[derive(Default)]
struct ScriptedTransport {
	replies: Mutex<VecDeque<Reply>>,
	seen: Mutex<Vec<(Instant, OutboundRequest)>>,
}
impl ScriptedTransport {
	fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
		Arc::new(Self { replies: Mutex::new(replies.into_iter().collect()), ..Self::default() })
	}

	fn calls(&self) -> usize {
		self.seen.lock().len()
	}

	fn call_times(&self) -> Vec<Instant> {
		self.seen.lock().iter().map(|(at, _)| *at).collect()
	}
}
impl HttpTransport for ScriptedTransport {
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		self.seen.lock().push((Instant::now(), request));

		let reply = self.replies.lock().pop_front().unwrap_or_else(|| Ok(status(200, "{}")));

		Box::pin(async move { reply })
	}
}

#[derive(Default)]
struct RotatingTokens {
	issued: AtomicUsize,
	invalidations: AtomicUsize,
}
impl TokenSource for RotatingTokens {
	fn token(&self) -> TokenFuture<'_> {
		let generation = self.invalidations.load(Ordering::SeqCst);

		self.issued.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Ok(TokenSecret::new(format!("token-{generation}"))) })
	}

	fn invalidate(&self) {
		self.invalidations.fetch_add(1, Ordering::SeqCst);
	}
}

fn status(code: u16, body: &str) -> RawResponse {
	RawResponse::new(code, [("content-type", "application/json")], body.as_bytes().to_vec())
}

fn fast_policy() -> RetryPolicy {
	RetryPolicy { backoff_base: Duration::from_millis(100), ..RetryPolicy::default() }
}

fn executor(
	transport: Arc<ScriptedTransport>,
	tokens: Arc<dyn TokenSource>,
	policy: RetryPolicy,
) -> RequestExecutor {
	let limiter = Arc::new(RateLimiter::new(1_000., 1_000.).expect("Limiter should build."));

	RequestExecutor::new(transport, limiter, tokens, policy)
}

fn static_tokens() -> Arc<dyn TokenSource> {
	Arc::new(StaticTokenSource::new("static-token"))
}

fn target() -> Url {
	Url::parse("https://api.example.com/v1/items").expect("Target URL should parse.")
}

async fn send_get(executor: &RequestExecutor) -> integration_client::response::ApiResponse {
	executor
		.send(HttpMethod::Get, &target(), None, &BTreeMap::new(), &BTreeMap::new())
		.await
		.expect("Executor should return a response.")
}

#[tokio::test(start_paused = true)]
async fn server_errors_exhaust_retry_budget() {
	let transport = ScriptedTransport::new((0..4).map(|_| Ok(status(500, "{\"error\":\"boom\"}"))));
	let executor = executor(transport.clone(), static_tokens(), fast_policy());
	let response = send_get(&executor).await;

	assert_eq!(transport.calls(), 4);
	assert_eq!(executor.attempt_count(), 4);
	assert_eq!(response.status_code, 500);
	assert!(!response.succeeded);
	assert_eq!(response.failure, Some(FailureKind::ServerError));
	assert_eq!(response.error_message.as_deref(), Some("boom"));

	let times = transport.call_times();

	assert!(times[1] - times[0] >= Duration::from_millis(100));
	assert!(times[2] - times[1] >= Duration::from_millis(140));
	assert!(times[3] - times[2] >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn server_error_then_success_returns_success() {
	let transport =
		ScriptedTransport::new([Ok(status(503, "")), Ok(status(200, "{\"items\":[1,2]}"))]);
	let executor = executor(transport.clone(), static_tokens(), fast_policy());
	let response = send_get(&executor).await;

	assert!(response.succeeded);
	assert_eq!(response.body, Some(json!({ "items": [1, 2] })));
	assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_attempt_honors_retry_after() {
	let limited =
		RawResponse::new(429, [("Retry-After", "2")], b"{\"message\":\"slow down\"}".to_vec());
	let transport = ScriptedTransport::new([Ok(limited), Ok(status(200, "{}"))]);
	let executor = executor(transport.clone(), static_tokens(), fast_policy());
	let response = send_get(&executor).await;
	let times = transport.call_times();

	assert!(response.succeeded);
	assert_eq!(times.len(), 2);
	assert!(times[1] - times[0] >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_without_header_uses_default_wait() {
	let transport = ScriptedTransport::new([Ok(status(429, "")), Ok(status(200, "{}"))]);
	let policy = RetryPolicy { default_retry_after: Duration::from_secs(7), ..fast_policy() };
	let executor = executor(transport.clone(), static_tokens(), policy);

	send_get(&executor).await;

	let times = transport.call_times();

	assert!(times[1] - times[0] >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_exhaustion_reports_fixed_message() {
	let transport = ScriptedTransport::new((0..2).map(|_| Ok(status(429, ""))));
	let policy = RetryPolicy {
		max_retries: 1,
		default_retry_after: Duration::from_secs(1),
		..fast_policy()
	};
	let executor = executor(transport.clone(), static_tokens(), policy);
	let response = send_get(&executor).await;

	assert_eq!(transport.calls(), 2);
	assert_eq!(response.status_code, 429);
	assert_eq!(response.failure, Some(FailureKind::RateLimitExceeded));
	assert_eq!(response.error_message.as_deref(), Some(RATE_LIMIT_EXHAUSTED));
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
	let transport = ScriptedTransport::new([Ok(status(404, "{\"message\":\"no such item\"}"))]);
	let executor = executor(transport.clone(), static_tokens(), fast_policy());
	let response = send_get(&executor).await;

	assert_eq!(transport.calls(), 1);
	assert_eq!(response.status_code, 404);
	assert_eq!(response.failure, Some(FailureKind::ClientError));
	assert_eq!(response.error_message.as_deref(), Some("no such item"));
}

#[tokio::test(start_paused = true)]
async fn transport_failures_become_status_zero() {
	let transport = ScriptedTransport::new([Err(TransportError::Timeout)]);
	let executor = executor(transport.clone(), static_tokens(), fast_policy());
	let response = send_get(&executor).await;

	assert_eq!(transport.calls(), 1);
	assert_eq!(response.status_code, 0);
	assert!(!response.succeeded);
	assert_eq!(response.failure, Some(FailureKind::Transport));
	assert!(
		response
			.error_message
			.as_deref()
			.is_some_and(|message| message.starts_with("Connection error:"))
	);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_is_final_unless_refresh_is_enabled() {
	let transport = ScriptedTransport::new([Ok(status(401, "")), Ok(status(200, "{}"))]);
	let tokens = Arc::new(RotatingTokens::default());
	let executor = executor(transport.clone(), tokens.clone(), fast_policy());
	let response = send_get(&executor).await;

	assert_eq!(response.status_code, 401);
	assert_eq!(transport.calls(), 1);
	assert_eq!(tokens.invalidations.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_refreshes_credential_once() {
	let transport = ScriptedTransport::new([
		Ok(status(401, "")),
		Ok(status(401, "")),
		Ok(status(200, "{}")),
	]);
	let tokens = Arc::new(RotatingTokens::default());
	let policy = RetryPolicy { refresh_on_unauthorized: true, ..fast_policy() };
	let executor = executor(transport.clone(), tokens.clone(), policy);
	let response = send_get(&executor).await;
	let seen = transport.seen.lock();

	assert_eq!(response.status_code, 401);
	assert_eq!(seen.len(), 2);
	assert_eq!(tokens.invalidations.load(Ordering::SeqCst), 1);
	assert_eq!(tokens.issued.load(Ordering::SeqCst), 2);
	assert_eq!(seen[0].1.headers.get("Authorization").map(String::as_str), Some("Bearer token-0"));
	assert_eq!(seen[1].1.headers.get("Authorization").map(String::as_str), Some("Bearer token-1"));
}

#[tokio::test(start_paused = true)]
async fn every_attempt_carries_auth_and_json_headers() {
	let transport = ScriptedTransport::new([Ok(status(200, "{}"))]);
	let executor = executor(transport.clone(), static_tokens(), fast_policy());
	let params = BTreeMap::from([("page".to_owned(), "2".to_owned())]);
	let headers = BTreeMap::from([("Accept".to_owned(), "application/vnd.api+json".to_owned())]);
	let body = json!({ "name": "widget" });

	executor
		.send(HttpMethod::Post, &target(), Some(&body), &params, &headers)
		.await
		.expect("Executor should return a response.");

	let seen = transport.seen.lock();
	let request = &seen[0].1;

	assert_eq!(request.method, HttpMethod::Post);
	assert_eq!(
		request.headers.get("Authorization").map(String::as_str),
		Some("Bearer static-token")
	);
	assert_eq!(request.headers.get("Content-Type").map(String::as_str), Some("application/json"));
	assert_eq!(request.headers.get("Accept").map(String::as_str), Some("application/vnd.api+json"));
	assert_eq!(request.query, vec![("page".to_owned(), "2".to_owned())]);

	let sent: serde_json::Value = serde_json::from_slice(
		request.body.as_deref().expect("POST attempt should carry the encoded body."),
	)
	.expect("Encoded body should be valid JSON.");

	assert_eq!(sent, body);
}
