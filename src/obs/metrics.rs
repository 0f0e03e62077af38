//! Counters and histograms published through the `metrics` facade.

// self
use crate::obs::{FlowKind, FlowOutcome};

/// Increments `bearer_renewal_flow_total{flow, outcome}` when the `metrics` feature is enabled.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"bearer_renewal_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Records how many queued callers one renewal episode served.
pub(crate) fn record_fan_out(waiters: usize) {
	#[cfg(feature = "metrics")]
	metrics::histogram!("bearer_renewal_fan_out").record(waiters as f64);
	#[cfg(not(feature = "metrics"))]
	let _ = waiters;
}
