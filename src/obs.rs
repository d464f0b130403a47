//! Optional observability helpers for the request pipeline.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to run every request inside a span named `integration_client.request`
//!   with `method` and `stage` fields, and to emit events for retries, credential refreshes,
//!   cache activity, and transport failures.
//! - Enable `metrics` to increment the `integration_client_request_total` counter, labeled by
//!   `method` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
	/// One outbound attempt was dispatched.
	Attempt,
	/// The request produced a successful response.
	Success,
	/// The request produced a failed response or an error.
	Failure,
	/// The request was answered from the response cache.
	CacheHit,
}
impl RequestOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestOutcome::Attempt => "attempt",
			RequestOutcome::Success => "success",
			RequestOutcome::Failure => "failure",
			RequestOutcome::CacheHit => "cache_hit",
		}
	}
}
impl Display for RequestOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
