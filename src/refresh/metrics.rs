//! In-process renewal counters, available without the `metrics` feature.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Point-in-time copy of [`RefreshMetrics`], e.g. for a health endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefreshMetricsSnapshot {
	/// Exchange calls issued.
	pub attempts: u64,
	/// Episodes that stored a new credential.
	pub successes: u64,
	/// Episodes that cleared the store.
	pub failures: u64,
	/// Callers that joined an episode already in flight.
	pub coalesced: u64,
}

/// Counters shared by every clone of a client.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	coalesced: AtomicU64,
}
impl RefreshMetrics {
	/// Exchange calls issued. A renewal skipped for lack of a refresh token is not counted.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Episodes that stored a new credential.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Episodes that cleared the store.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Callers that joined an episode already in flight instead of starting one.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	/// Reads every counter. Values are individually exact but not a consistent cut.
	pub fn snapshot(&self) -> RefreshMetricsSnapshot {
		RefreshMetricsSnapshot {
			attempts: self.attempts(),
			successes: self.successes(),
			failures: self.failures(),
			coalesced: self.coalesced(),
		}
	}

	pub(crate) fn record_attempt(&self) {
		Self::bump(&self.attempts);
	}

	pub(crate) fn record_success(&self) {
		Self::bump(&self.successes);
	}

	pub(crate) fn record_failure(&self) {
		Self::bump(&self.failures);
	}

	pub(crate) fn record_coalesced(&self) {
		Self::bump(&self.coalesced);
	}

	fn bump(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}
}
