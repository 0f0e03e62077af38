// std
use std::path::Path;
// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by the pipeline and coordinator.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("bearer_renewal.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
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

/// Logs that a caller queued behind an in-flight renewal.
pub(crate) fn record_waiter_joined(position: usize) {
	#[cfg(feature = "tracing")]
	tracing::debug!(position, "joined in-flight credential renewal");
	#[cfg(not(feature = "tracing"))]
	let _ = position;
}

/// Logs the outcome a leader is about to fan out.
pub(crate) fn record_renewal_settled(succeeded: bool, waiters: usize, error: Option<&dyn StdError>) {
	#[cfg(feature = "tracing")]
	{
		if succeeded {
			tracing::info!(waiters, "credential renewed");
		} else {
			tracing::warn!(waiters, error = error.map(tracing::field::display), "credential renewal failed");
		}
	}
	#[cfg(not(feature = "tracing"))]
	let _ = (succeeded, waiters, error);
}

/// Logs a leader dropped before finishing its exchange.
pub(crate) fn record_leader_abandoned(waiters: usize) {
	#[cfg(feature = "tracing")]
	tracing::warn!(waiters, "renewal leader dropped before completion; waiters re-enter election");
	#[cfg(not(feature = "tracing"))]
	let _ = waiters;
}

/// Logs the first invalidation of a session.
pub(crate) fn record_session_invalid(reason: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(reason, "session invalidated");
	#[cfg(not(feature = "tracing"))]
	let _ = reason;
}

/// Logs a persistence failure the store absorbed.
pub(crate) fn record_store_failure(operation: &'static str, path: &Path, error: &dyn StdError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(operation, path = %path.display(), error = %error, "credential store persistence failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (operation, path, error);
}
