// self
use crate::{http::HttpMethod, obs::RequestOutcome};

/// Records a request outcome via the global metrics recorder (when enabled).
pub fn record_request_outcome(method: HttpMethod, outcome: RequestOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"integration_client_request_total",
			"method" => method.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (method, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_request_outcome_without_recorder() {
		record_request_outcome(HttpMethod::Get, RequestOutcome::CacheHit);
	}
}
