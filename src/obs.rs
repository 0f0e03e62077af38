//! Optional observability helpers for the request pipeline and renewal coordinator.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `bearer_renewal.flow` with the `flow` and
//!   `stage` (call site) fields, plus events for renewal elections, outcomes, session
//!   invalidation, and store persistence failures.
//! - Enable `metrics` to increment the `bearer_renewal_flow_total` counter for every
//!   attempt/success/failure/coalesced outcome, labeled by `flow` + `outcome`, and to record
//!   the `bearer_renewal_fan_out` histogram (callers served per renewal).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline stages observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Outbound business request, including its replay.
	Request,
	/// Credential renewal exchange.
	Renewal,
	/// Session invalidation.
	Session,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Request => "request",
			FlowKind::Renewal => "renewal",
			FlowKind::Session => "session",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a client helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Caller joined an operation already in flight instead of starting one.
	Coalesced,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Coalesced => "coalesced",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
