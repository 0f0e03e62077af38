//! Single-flight credential renewal.
//!
//! Many requests can observe an expired access token at once. [`RefreshCoordinator`] collapses
//! their renewal demands into one exchange: the first caller to find the coordinator idle
//! becomes the leader and performs the exchange, every later caller queues as a waiter, and all
//! of them receive the same outcome. The state lock is held only to elect a leader and to
//! enqueue or drain waiters, never across the exchange call.
//!
//! A successful renewal overwrites the [`CredentialStore`]; a failed one clears it. Either way
//! the coordinator is idle again before any waiter is notified.

mod exchange;
mod metrics;

pub use exchange::*;
pub use metrics::{RefreshMetrics, RefreshMetricsSnapshot};

// crates.io
use futures::channel::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenSecret},
	error::TransportError,
	http::ApiResponse,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::CredentialStore,
};

type RefreshOutcome = Result<Credential, RefreshError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

/// Renewal failures fanned out to every waiter of an episode.
#[derive(Clone, Debug, ThisError)]
pub enum RefreshError {
	/// No refresh token was available when the leader was elected.
	#[error("No refresh token is available.")]
	MissingRefreshToken,
	/// Renewal endpoint could not be reached.
	#[error("Renewal endpoint could not be reached.")]
	Transport(#[source] Arc<TransportError>),
	/// Renewal endpoint rejected the refresh token.
	#[error("Renewal endpoint rejected the refresh token with HTTP status {status}.")]
	Rejected {
		/// HTTP status returned by the renewal endpoint.
		status: u16,
	},
	/// Renewal endpoint answered with a body that is not the expected JSON.
	#[error("Renewal endpoint returned malformed JSON: {message}.")]
	MalformedResponse {
		/// Parser message including the failing path.
		message: String,
	},
	/// Neither the renewal response nor the failing response carried an access token.
	#[error("Renewal produced no access token.")]
	MissingAccessToken,
	/// Renewal request could not be assembled.
	#[error("Renewal request could not be built: {message}.")]
	InvalidRequest {
		/// Construction failure message.
		message: String,
	},
	/// The leader was dropped before it finished; waiters elect a new one.
	#[error("Renewal leader was dropped before completing.")]
	Abandoned,
}
impl RefreshError {
	/// Short lowercase summary used as the session-invalid reason.
	pub fn summary(&self) -> &'static str {
		match self {
			Self::MissingRefreshToken => "no refresh token is available",
			Self::Transport(_) => "renewal endpoint unreachable",
			Self::Rejected { .. } => "refresh token rejected",
			Self::MalformedResponse { .. } => "renewal response was malformed",
			Self::MissingAccessToken => "renewal produced no access token",
			Self::InvalidRequest { .. } => "renewal request could not be built",
			Self::Abandoned => "renewal was abandoned",
		}
	}
}

/// What the failing request knew when it asked for renewal.
#[derive(Clone, Debug, Default)]
pub struct RefreshContext {
	/// Access token the failing request was sent with.
	pub sent_with: Option<TokenSecret>,
	/// Renewed pair the server embedded in the failing response, if any.
	pub embedded: Option<Credential>,
}
impl RefreshContext {
	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds the context for a request sent with `credential` that received `response`.
	pub fn from_failure(credential: Option<&Credential>, response: &ApiResponse) -> Self {
		Self {
			sent_with: credential.map(|value| value.access_token.clone()),
			embedded: embedded_credential(&response.body),
		}
	}

	/// Records the access token the failing request carried.
	pub fn with_sent_with(mut self, access_token: impl Into<String>) -> Self {
		self.sent_with = Some(TokenSecret::new(access_token));

		self
	}

	/// Records an embedded renewed pair.
	pub fn with_embedded(mut self, credential: Credential) -> Self {
		self.embedded = Some(credential);

		self
	}

	/// `true` when `current` differs from the credential the request was sent with, meaning a
	/// renewal completed after the request left.
	fn is_superseded_by(&self, current: &Credential) -> bool {
		if current.access_token.is_empty() {
			return false;
		}

		match self.sent_with.as_ref() {
			Some(sent) => !current.has_access_token(sent.expose()),
			None => true,
		}
	}
}

enum RefreshState {
	Idle,
	InFlight { waiters: Vec<Waiter> },
}

enum Election {
	Leader(Option<Credential>),
	Waiter(oneshot::Receiver<RefreshOutcome>),
	Superseded(Credential),
}

/// Collapses concurrent renewal demands into one exchange and fans the outcome out.
pub struct RefreshCoordinator {
	store: Arc<dyn CredentialStore>,
	exchange: Arc<dyn RenewalExchange>,
	state: Mutex<RefreshState>,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator over `store`, renewing through `exchange`.
	pub fn new(store: Arc<dyn CredentialStore>, exchange: Arc<dyn RenewalExchange>) -> Self {
		Self {
			store,
			exchange,
			state: Mutex::new(RefreshState::Idle),
			metrics: Default::default(),
		}
	}

	/// Shared counters for renewal episodes.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns `true` while a leader is exchanging.
	pub fn is_in_flight(&self) -> bool {
		matches!(*self.state.lock(), RefreshState::InFlight { .. })
	}

	/// Number of callers queued behind the current leader.
	pub fn waiting(&self) -> usize {
		match &*self.state.lock() {
			RefreshState::InFlight { waiters } => waiters.len(),
			RefreshState::Idle => 0,
		}
	}

	/// Returns a renewed credential, performing at most one exchange for every caller that
	/// arrives while it is in flight.
	pub async fn request_refresh(&self, context: RefreshContext) -> RefreshOutcome {
		loop {
			match self.elect(&context) {
				Election::Superseded(current) => return Ok(current),
				Election::Leader(current) => return self.lead(current, context.embedded).await,
				Election::Waiter(outcome) => match outcome.await {
					Ok(Err(RefreshError::Abandoned)) | Err(oneshot::Canceled) => continue,
					Ok(outcome) => return outcome,
				},
			}
		}
	}

	fn elect(&self, context: &RefreshContext) -> Election {
		let mut state = self.state.lock();

		if let RefreshState::InFlight { waiters } = &mut *state {
			let (tx, rx) = oneshot::channel();

			waiters.push(tx);
			self.metrics.record_coalesced();
			obs::record_flow_outcome(FlowKind::Renewal, FlowOutcome::Coalesced);
			obs::record_waiter_joined(waiters.len());

			return Election::Waiter(rx);
		}

		// Read inside the lock so the leader acts on the credential it was elected against.
		let current = self.store.get();

		if let Some(current) = current.as_ref().filter(|value| context.is_superseded_by(value)) {
			return Election::Superseded(current.clone());
		}

		*state = RefreshState::InFlight { waiters: Vec::new() };

		Election::Leader(current)
	}

	async fn lead(&self, current: Option<Credential>, embedded: Option<Credential>) -> RefreshOutcome {
		const KIND: FlowKind = FlowKind::Renewal;

		let mut leadership = Leadership { coordinator: self, settled: false };
		let span = FlowSpan::new(KIND, "lead");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let outcome = span.instrument(self.renew(current, embedded)).await;

		match &outcome {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		leadership.settle(&outcome);

		outcome
	}

	async fn renew(&self, current: Option<Credential>, embedded: Option<Credential>) -> RefreshOutcome {
		let current = current.ok_or(RefreshError::MissingRefreshToken)?;
		let refresh_token = current.refresh_secret().ok_or(RefreshError::MissingRefreshToken)?;

		self.metrics.record_attempt();

		let issued = self.exchange.exchange(refresh_token).await?;
		// A pair embedded in the failing response overrides the exchange body.
		let renewed = embedded
			.filter(|value| !value.access_token.is_empty())
			.or(issued)
			.ok_or(RefreshError::MissingAccessToken)?;

		Ok(renewed.or_keep_refresh(&current))
	}

	fn finish(&self) -> Vec<Waiter> {
		match std::mem::replace(&mut *self.state.lock(), RefreshState::Idle) {
			RefreshState::InFlight { waiters } => waiters,
			RefreshState::Idle => Vec::new(),
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("in_flight", &self.is_in_flight())
			.field("waiting", &self.waiting())
			.finish()
	}
}

/// Returns the coordinator to idle however the leader's future ends.
struct Leadership<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl Leadership<'_> {
	fn settle(&mut self, outcome: &RefreshOutcome) {
		let coordinator = self.coordinator;

		self.settled = true;

		match outcome {
			Ok(credential) => {
				coordinator.store.set(credential.clone());
				coordinator.metrics.record_success();
			},
			Err(_) => {
				coordinator.store.clear();
				coordinator.metrics.record_failure();
			},
		}

		let waiters = coordinator.finish();

		obs::record_fan_out(waiters.len());
		obs::record_renewal_settled(
			outcome.is_ok(),
			waiters.len(),
			outcome.as_ref().err().map(|err| err as &dyn StdError),
		);

		for waiter in waiters {
			// A dropped receiver belongs to a caller that gave up; nothing to deliver.
			let _ = waiter.send(outcome.clone());
		}
	}
}
impl Drop for Leadership<'_> {
	fn drop(&mut self) {
		if self.settled {
			return;
		}

		let waiters = self.coordinator.finish();

		obs::record_leader_abandoned(waiters.len());

		for waiter in waiters {
			let _ = waiter.send(Err(RefreshError::Abandoned));
		}
	}
}
