// self
use crate::{_prelude::*, http::HttpMethod};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRequest<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRequest<F> = F;

/// Span wrapping one pass through the request pipeline.
#[derive(Clone, Debug)]
pub struct RequestSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RequestSpan {
	/// Creates a new span tagged with the method + stage.
	pub fn new(method: HttpMethod, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("integration_client.request", method = method.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRequest<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a warning before the executor sleeps ahead of a retry.
pub fn retry_scheduled(method: HttpMethod, attempt: u32, status: u16, delay: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			method = method.as_str(),
			attempt,
			status,
			delay_ms = delay.as_millis() as u64,
			"Retrying request."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (method, attempt, status, delay);
	}
}

/// Emits a warning when an attempt fails below the HTTP layer.
pub fn transport_failed(method: HttpMethod, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(method = method.as_str(), error = %error, "Transport failure.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (method, error);
	}
}

/// Records a completed credential refresh. `subject` names the connection or token URL.
pub fn credential_refreshed(subject: &str, expires_in: Duration) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(subject, expires_in_secs = expires_in.as_secs(), "Credential refreshed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (subject, expires_in);
	}
}

/// Records cache activity (`hit`, `miss`, `expired`, `store`).
pub fn cache_event(event: &'static str, key: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(event, key, "Response cache.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (event, key);
	}
}

/// Records a request boundary for request logging interceptors.
pub fn request_logged(method: HttpMethod, endpoint: &str, status: Option<u16>, succeeded: bool) {
	#[cfg(feature = "tracing")]
	{
		match status {
			Some(status) => tracing::info!(
				method = method.as_str(),
				endpoint,
				status,
				succeeded,
				"Request finished."
			),
			None => tracing::info!(method = method.as_str(), endpoint, "Request started."),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (method, endpoint, status, succeeded);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn helpers_run_without_subscriber() {
		retry_scheduled(HttpMethod::Get, 1, 503, Duration::from_secs(1));
		transport_failed(HttpMethod::Post, &"connection refused");
		credential_refreshed("conn-1", Duration::from_secs(3600));
		cache_event("hit", "key");
		request_logged(HttpMethod::Delete, "/items/1", Some(204), true);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = RequestSpan::new(HttpMethod::Get, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
