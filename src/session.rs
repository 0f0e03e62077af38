//! Terminal session handling: clear local state and tell the embedding application once.

// std
use std::{
	panic::{self, AssertUnwindSafe},
	sync::atomic::{AtomicBool, Ordering},
};
// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
	store::CredentialStore,
};

/// Event delivered when a session can no longer be renewed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInvalid {
	/// Human-readable cause, suitable for a login or error surface.
	pub reason: String,
	/// Instant the session was invalidated.
	pub at: OffsetDateTime,
}

/// Receiver of [`SessionInvalid`] events, typically the application shell that navigates to
/// its login surface.
pub trait SessionListener
where
	Self: Send + Sync,
{
	/// Called once per invalidated session.
	fn on_session_invalid(&self, event: &SessionInvalid);
}
impl<F> SessionListener for F
where
	F: Fn(&SessionInvalid) + Send + Sync,
{
	fn on_session_invalid(&self, event: &SessionInvalid) {
		self(event)
	}
}

/// Clears the credential store and emits one `session-invalid` event per session.
pub struct SessionGateway {
	store: Arc<dyn CredentialStore>,
	listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
	invalidated: AtomicBool,
	last_event: Mutex<Option<SessionInvalid>>,
}
impl SessionGateway {
	/// Creates an armed gateway over `store`.
	pub fn new(store: Arc<dyn CredentialStore>) -> Self {
		Self {
			store,
			listeners: Default::default(),
			invalidated: AtomicBool::new(false),
			last_event: Default::default(),
		}
	}

	/// Registers a listener for future invalidations.
	pub fn subscribe(&self, listener: Arc<dyn SessionListener>) {
		self.listeners.write().push(listener);
	}

	/// Clears the store and notifies listeners unless this session was already invalidated.
	///
	/// Returns `true` for the call that emitted the event. Listener panics are contained.
	pub fn invalidate(&self, reason: impl Into<String>) -> bool {
		self.store.clear();

		if self.invalidated.swap(true, Ordering::AcqRel) {
			return false;
		}

		let event = SessionInvalid { reason: reason.into(), at: OffsetDateTime::now_utc() };

		obs::record_flow_outcome(FlowKind::Session, FlowOutcome::Failure);
		obs::record_session_invalid(&event.reason);
		*self.last_event.lock() = Some(event.clone());

		let listeners = self.listeners.read().clone();

		for listener in listeners {
			let _ = panic::catch_unwind(AssertUnwindSafe(|| listener.on_session_invalid(&event)));
		}

		true
	}

	/// Returns `true` once the current session has been invalidated.
	pub fn is_invalidated(&self) -> bool {
		self.invalidated.load(Ordering::Acquire)
	}

	/// Most recent event emitted by this gateway.
	pub fn last_event(&self) -> Option<SessionInvalid> {
		self.last_event.lock().clone()
	}

	/// Starts a new session so the next invalidation is reported again.
	pub fn rearm(&self) {
		self.invalidated.store(false, Ordering::Release);
	}
}
impl Debug for SessionGateway {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionGateway")
			.field("invalidated", &self.is_invalidated())
			.field("listeners", &self.listeners.read().len())
			.finish()
	}
}
