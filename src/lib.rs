//! Resilient outbound API client runtime: bearer credential lifecycles, token-bucket
//! admission, bounded retries with backoff, and TTL response caching behind one uniform
//! request contract.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod middleware;
pub mod obs;
pub mod rate_limit;
pub mod registry;
pub mod response;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{ConnectionId, ConnectionTokenSource, ProviderConfigKey, TokenSecret, TokenSource},
		client::ApiClient,
		config::ClientConfig,
		http::{HttpTransport, ReqwestHttpClient},
	};

	/// Public key used by every mocked token service in the test suite.
	pub const TEST_PUBLIC_KEY: &str = "public-test-key";

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client(config: &ClientConfig) -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.timeout(config.request_timeout)
			.connect_timeout(config.connect_timeout)
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client, config.max_connections)
	}

	/// Constructs an [`ApiClient`] whose credentials come from a mocked token service at
	/// `token_service` and whose provider API lives at `base_url`.
	pub fn build_reqwest_test_client(
		token_service: &str,
		base_url: &str,
		connection: &str,
		config: ClientConfig,
	) -> (ApiClient, Arc<ConnectionTokenSource>) {
		let transport: Arc<dyn HttpTransport> = Arc::new(test_reqwest_http_client(&config));
		let connection_id =
			ConnectionId::new(connection).expect("Test connection identifier should be valid.");
		let provider =
			ProviderConfigKey::new("mock-provider").expect("Test provider key should be valid.");
		let source = Arc::new(
			ConnectionTokenSource::new(
				transport.clone(),
				Url::parse(token_service).expect("Mock token service URL should parse."),
				TokenSecret::new(TEST_PUBLIC_KEY),
				connection_id.clone(),
				provider.clone(),
			)
			.with_skew(config.credential_skew),
		);
		let tokens: Arc<dyn TokenSource> = source.clone();
		let client = ApiClient::builder(connection_id, provider, base_url)
			.config(config)
			.transport(transport)
			.token_source(tokens)
			.build()
			.expect("Test client should build successfully.");

		(client, source)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::{Mutex as AsyncMutex, Semaphore};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
