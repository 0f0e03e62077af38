//! The request pipeline: attach the bearer credential, detect expiry, renew once, replay.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::ClientConfig,
	http::{self, ApiRequest, ApiResponse, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{
		HttpRenewalExchange, RefreshContext, RefreshCoordinator, RefreshError, RefreshMetrics,
		RenewalExchange,
	},
	session::{SessionGateway, SessionListener},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestAuthClient = AuthClient<ReqwestTransport>;

const REPLAY_REJECTED: &str = "authorization rejected after renewal";

/// A request on its way through the pipeline.
#[derive(Debug)]
struct PendingRequest {
	descriptor: ApiRequest,
	/// Set once, right before the replay; a second 401 then ends the session.
	retried: bool,
}
impl PendingRequest {
	fn new(descriptor: ApiRequest) -> Self {
		Self { descriptor, retried: false }
	}
}

/// Authenticated HTTP client with transparent, single-flight credential renewal.
///
/// Every request carries the store's current access token. A 401 triggers one renewal through
/// the shared [`RefreshCoordinator`] followed by one replay; concurrent 401s share the same
/// renewal. When renewal is impossible, the [`SessionGateway`] clears the store and notifies
/// its listeners once, and every affected request fails with [`Error::SessionExpired`].
pub struct AuthClient<T>
where
	T: HttpTransport,
{
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	config: Arc<ClientConfig>,
	coordinator: Arc<RefreshCoordinator>,
	session: Arc<SessionGateway>,
}
impl<T> AuthClient<T>
where
	T: HttpTransport,
{
	/// Creates a client that reuses `transport` for both business calls and renewal.
	pub fn with_transport(
		store: Arc<dyn CredentialStore>,
		config: ClientConfig,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let transport = transport.into();
		let exchange: Arc<dyn RenewalExchange> =
			Arc::new(HttpRenewalExchange::<T>::new(transport.clone(), &config));

		Self::with_exchange(store, config, transport, exchange)
	}

	/// Creates a client with a caller-provided renewal exchange.
	pub fn with_exchange(
		store: Arc<dyn CredentialStore>,
		config: ClientConfig,
		transport: impl Into<Arc<T>>,
		exchange: Arc<dyn RenewalExchange>,
	) -> Self {
		Self {
			transport: transport.into(),
			coordinator: Arc::new(RefreshCoordinator::new(store.clone(), exchange)),
			session: Arc::new(SessionGateway::new(store.clone())),
			config: Arc::new(config),
			store,
		}
	}

	/// Store holding the current credential.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Validated configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Coordinator shared by every clone of this client.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}

	/// Session gateway shared by every clone of this client.
	pub fn session(&self) -> &Arc<SessionGateway> {
		&self.session
	}

	/// Renewal counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.coordinator.metrics()
	}

	/// Registers a `session-invalid` listener.
	pub fn subscribe(&self, listener: Arc<dyn SessionListener>) {
		self.session.subscribe(listener);
	}

	/// Starts a session with a freshly issued credential.
	pub fn login(&self, credential: Credential) {
		// Re-arm first so an expiry racing the write is reported instead of silently wiping it.
		self.session.rearm();
		self.store.set(credential);
	}

	/// Ends the session locally without emitting `session-invalid`.
	pub fn logout(&self) {
		self.store.clear();
	}

	/// Sends `request`, renewing the credential and replaying once if the server answers 401.
	///
	/// 1xx-3xx responses are returned as `Ok`. Every other status, except a recoverable 401,
	/// surfaces unmodified as [`Error::Status`].
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send_pending(PendingRequest::new(request))).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn send_pending(&self, mut pending: PendingRequest) -> Result<ApiResponse> {
		let mut credential = self.store.get();

		loop {
			let response = self.dispatch(&pending.descriptor, credential.as_ref()).await?;

			if !response.is_unauthorized() || self.config.is_exempt(&pending.descriptor.url) {
				return response.error_for_status();
			}
			if pending.retried {
				return Err(self.expire(REPLAY_REJECTED.into(), None));
			}

			pending.retried = true;

			let context = RefreshContext::from_failure(credential.as_ref(), &response);

			match self.coordinator.request_refresh(context).await {
				Ok(renewed) => credential = Some(renewed),
				Err(err) => return Err(self.expire(err.summary().into(), Some(err))),
			}
		}
	}

	async fn dispatch(
		&self,
		request: &ApiRequest,
		credential: Option<&Credential>,
	) -> Result<ApiResponse> {
		let wire = request.to_http(
			&self.config.default_headers,
			credential.map(|value| &value.access_token),
		)?;

		self.transport
			.execute(wire)
			.await
			.map_err(|err| http::map_transport_error(&request.url, err).into())
	}

	fn expire(&self, reason: String, source: Option<RefreshError>) -> Error {
		self.session.invalidate(reason.clone());

		Error::SessionExpired { reason, source }
	}
}
#[cfg(feature = "reqwest")]
impl AuthClient<ReqwestTransport> {
	/// Creates a client backed by a default reqwest transport.
	pub fn new(store: Arc<dyn CredentialStore>, config: ClientConfig) -> Self {
		Self::with_transport(store, config, ReqwestTransport::default())
	}
}
impl<T> Clone for AuthClient<T>
where
	T: HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			config: self.config.clone(),
			coordinator: self.coordinator.clone(),
			session: self.session.clone(),
		}
	}
}
impl<T> Debug for AuthClient<T>
where
	T: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthClient")
			.field("renewal_endpoint", &self.config.renewal_endpoint.as_str())
			.field("coordinator", &self.coordinator)
			.field("session", &self.session)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{io, time::Duration};
	// crates.io
	use ::http::{
		StatusCode,
		header::{AUTHORIZATION, HeaderName},
	};
	use futures::channel::oneshot;
	// self
	use super::*;
	use crate::{
		http::{HttpRequest, TransportFuture},
		session::SessionInvalid,
		store::MemoryStore,
	};

	const RENEWAL_PATH: &str = "/v1/auth/refresh";

	type Handler = Box<dyn Fn(&str, Option<&str>, Option<&str>) -> ApiResponse + Send + Sync>;

	/// Routes every call through `handler(path, bearer, refresh_header)` and logs it.
	struct ScriptedTransport {
		handler: Handler,
		calls: Mutex<Vec<String>>,
	}
	impl ScriptedTransport {
		fn new(
			handler: impl Fn(&str, Option<&str>, Option<&str>) -> ApiResponse + 'static + Send + Sync,
		) -> Self {
			Self { handler: Box::new(handler), calls: Default::default() }
		}

		fn calls_to(&self, path: &str) -> usize {
			self.calls.lock().iter().filter(|call| call.as_str() == path).count()
		}
	}
	impl HttpTransport for ScriptedTransport {
		type TransportError = io::Error;

		fn execute(&self, request: HttpRequest) -> TransportFuture<'_, Self::TransportError> {
			let refresh_header = HeaderName::from_static("x-refresh-token");
			let header = |name: &HeaderName| {
				request.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
			};
			let bearer = header(&AUTHORIZATION)
				.and_then(|value| value.strip_prefix("Bearer ").map(str::to_owned));
			let refresh = header(&refresh_header);
			let path = request.uri().path().to_owned();

			self.calls.lock().push(path.clone());

			let response = (self.handler)(&path, bearer.as_deref(), refresh.as_deref());

			Box::pin(async move { Ok(response) })
		}
	}

	fn url(path: &str) -> Url {
		Url::parse(&format!("http://127.0.0.1:9{path}")).expect("Failed to parse test URL.")
	}

	/// Answers 401 to business calls; renewal calls park on a gate, then fail at the network level.
	struct StalledRenewalTransport {
		gate: Mutex<Option<oneshot::Receiver<()>>>,
	}
	impl HttpTransport for StalledRenewalTransport {
		type TransportError = io::Error;

		fn execute(&self, request: HttpRequest) -> TransportFuture<'_, Self::TransportError> {
			let renewal = request.uri().path() == RENEWAL_PATH;
			let gate = if renewal { self.gate.lock().take() } else { None };

			Box::pin(async move {
				if !renewal {
					return Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "{}"));
				}
				if let Some(gate) = gate {
					let _ = gate.await;
				}

				Err(io::Error::new(io::ErrorKind::ConnectionReset, "renewal endpoint went away"))
			})
		}
	}

	/// Memory store that runs a one-shot hook right after a write lands.
	#[derive(Default)]
	struct HookedStore {
		inner: MemoryStore,
		after_set: Mutex<Option<Box<dyn FnOnce() + Send>>>,
	}
	impl CredentialStore for HookedStore {
		fn get(&self) -> Option<Credential> {
			self.inner.get()
		}

		fn set(&self, credential: Credential) {
			self.inner.set(credential);

			let hook = self.after_set.lock().take();

			if let Some(hook) = hook {
				hook();
			}
		}

		fn clear(&self) {
			self.inner.clear();
		}
	}

	fn client<T>(store: Arc<dyn CredentialStore>, transport: Arc<T>) -> AuthClient<T>
	where
		T: HttpTransport,
	{
		let config = ClientConfig::builder(url(RENEWAL_PATH))
			.exempt_path("/v1/auth/login")
			.build()
			.expect("Test configuration should validate.");

		AuthClient::with_transport(store, config, transport)
	}

	fn renewing_handler(
		path: &str,
		bearer: Option<&str>,
		refresh: Option<&str>,
	) -> ApiResponse {
		match (path, bearer, refresh) {
			(RENEWAL_PATH, _, Some("rt-1")) => ApiResponse::new(
				StatusCode::OK,
				r#"{"data":{"accessToken":"at-2","refreshToken":"rt-2"}}"#,
			),
			(RENEWAL_PATH, ..) => ApiResponse::new(StatusCode::FORBIDDEN, "{}"),
			("/v1/books", Some("at-2"), _) => ApiResponse::new(StatusCode::OK, r#"{"items":[]}"#),
			("/v1/missing", ..) => ApiResponse::new(StatusCode::NOT_FOUND, r#"{"message":"gone"}"#),
			_ => ApiResponse::new(StatusCode::UNAUTHORIZED, r#"{"message":"expired"}"#),
		}
	}

	fn record_events<T>(client: &AuthClient<T>) -> Arc<Mutex<Vec<String>>>
	where
		T: HttpTransport,
	{
		let events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();

		client.subscribe(Arc::new(move |event: &SessionInvalid| {
			sink.lock().push(event.reason.clone());
		}));

		events
	}

	#[tokio::test]
	async fn expired_access_token_is_renewed_and_request_replayed() {
		let store = Arc::new(MemoryStore::with_credential(Credential::new("at-1", "rt-1")));
		let transport = Arc::new(ScriptedTransport::new(renewing_handler));
		let client = client(store.clone(), transport.clone());
		let events = record_events(&client);
		let response = client
			.send(ApiRequest::get(url("/v1/books")))
			.await
			.expect("Replayed request should succeed.");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(response.text(), r#"{"items":[]}"#);
		assert_eq!(store.get(), Some(Credential::new("at-2", "rt-2")));
		assert_eq!(transport.calls_to("/v1/books"), 2);
		assert_eq!(transport.calls_to(RENEWAL_PATH), 1);
		assert!(events.lock().is_empty());
		assert_eq!(client.refresh_metrics().snapshot().successes, 1);
	}

	#[tokio::test]
	async fn unauthorized_replay_ends_the_session() {
		let store = Arc::new(MemoryStore::with_credential(Credential::new("at-1", "rt-1")));
		let transport = Arc::new(ScriptedTransport::new(|path, _, _| match path {
			RENEWAL_PATH => ApiResponse::new(
				StatusCode::OK,
				r#"{"data":{"accessToken":"at-2","refreshToken":"rt-2"}}"#,
			),
			_ => ApiResponse::new(StatusCode::UNAUTHORIZED, "{}"),
		}));
		let client = client(store.clone(), transport.clone());
		let events = record_events(&client);
		let err = client
			.send(ApiRequest::get(url("/v1/books")))
			.await
			.expect_err("A second 401 should not be retried.");

		match &err {
			Error::SessionExpired { reason, source } => {
				assert_eq!(reason, "authorization rejected after renewal");
				assert!(source.is_none());
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}

		assert!(store.get().is_none());
		assert_eq!(transport.calls_to("/v1/books"), 2);
		assert_eq!(transport.calls_to(RENEWAL_PATH), 1);
		assert_eq!(*events.lock(), vec!["authorization rejected after renewal".to_string()]);
	}

	#[tokio::test]
	async fn missing_refresh_token_skips_the_exchange() {
		let store = Arc::new(MemoryStore::with_credential(Credential::access_only("at-1")));
		let transport = Arc::new(ScriptedTransport::new(renewing_handler));
		let client = client(store.clone(), transport.clone());
		let events = record_events(&client);
		let err = client
			.send(ApiRequest::get(url("/v1/books")))
			.await
			.expect_err("Renewal without a refresh token should fail.");

		assert!(matches!(
			err,
			Error::SessionExpired { source: Some(RefreshError::MissingRefreshToken), .. }
		));
		assert_eq!(transport.calls_to(RENEWAL_PATH), 0);
		assert_eq!(*events.lock(), vec!["no refresh token is available".to_string()]);
		assert!(store.get().is_none());
	}

	#[tokio::test]
	async fn rejected_refresh_token_reports_rejection() {
		let store = Arc::new(MemoryStore::with_credential(Credential::new("at-1", "rt-stale")));
		let transport = Arc::new(ScriptedTransport::new(renewing_handler));
		let client = client(store.clone(), transport.clone());
		let events = record_events(&client);
		let err = client
			.send(ApiRequest::get(url("/v1/books")))
			.await
			.expect_err("A rejected refresh token ends the session.");

		assert!(matches!(
			err,
			Error::SessionExpired { source: Some(RefreshError::Rejected { status: 403 }), .. }
		));
		assert_eq!(*events.lock(), vec!["refresh token rejected".to_string()]);
		assert_eq!(transport.calls_to("/v1/books"), 1);
	}

	#[tokio::test]
	async fn non_unauthorized_failures_pass_through() {
		let store = Arc::new(MemoryStore::with_credential(Credential::new("at-1", "rt-1")));
		let transport = Arc::new(ScriptedTransport::new(renewing_handler));
		let client = client(store.clone(), transport.clone());
		let err = client
			.send(ApiRequest::get(url("/v1/missing")))
			.await
			.expect_err("404 should surface as a status error.");

		assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
		assert_eq!(transport.calls_to(RENEWAL_PATH), 0);
		assert_eq!(store.get(), Some(Credential::new("at-1", "rt-1")));
	}

	#[tokio::test]
	async fn exempt_path_returns_unauthorized_without_renewal() {
		let store = Arc::new(MemoryStore::with_credential(Credential::new("at-1", "rt-1")));
		let transport = Arc::new(ScriptedTransport::new(renewing_handler));
		let client = client(store.clone(), transport.clone());
		let events = record_events(&client);
		let err = client
			.send(ApiRequest::post(url("/v1/auth/login")))
			.await
			.expect_err("Login failures should surface unchanged.");

		assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
		assert!(!err.is_session_expired());
		assert_eq!(transport.calls_to(RENEWAL_PATH), 0);
		assert!(events.lock().is_empty());
		assert!(store.get().is_some());
	}

	#[tokio::test]
	async fn login_rearms_the_session_gateway() {
		let store = Arc::new(MemoryStore::with_credential(Credential::access_only("at-1")));
		let transport = Arc::new(ScriptedTransport::new(renewing_handler));
		let client = client(store.clone(), transport.clone());
		let events = record_events(&client);

		let _ = client.send(ApiRequest::get(url("/v1/books"))).await;

		client.login(Credential::access_only("at-9"));

		let _ = client.send(ApiRequest::get(url("/v1/books"))).await;

		assert_eq!(events.lock().len(), 2);

		client.login(Credential::new("at-2", "rt-2"));
		client.logout();

		assert!(store.get().is_none());
		assert_eq!(events.lock().len(), 2);
	}

	#[tokio::test]
	async fn failed_renewal_reaches_queued_request_with_the_same_error() {
		let store = Arc::new(MemoryStore::with_credential(Credential::new("at-1", "rt-1")));
		let (release, gate) = oneshot::channel();
		let transport = Arc::new(StalledRenewalTransport { gate: Mutex::new(Some(gate)) });
		let client = client(store.clone(), transport);
		let events = record_events(&client);
		let release_once_queued = async {
			for _ in 0..500 {
				if client.coordinator().waiting() == 1 {
					release.send(()).expect("Renewal gate should still be open.");

					return;
				}

				tokio::time::sleep(Duration::from_millis(2)).await;
			}

			panic!("Second request never queued behind the renewal.");
		};
		let (first, second, ()) = tokio::join!(
			client.send(ApiRequest::get(url("/v1/books"))),
			client.send(ApiRequest::get(url("/v1/shelves"))),
			release_once_queued,
		);

		for outcome in [first, second] {
			let err = outcome.expect_err("Both requests should fail with the renewal error.");

			assert!(
				matches!(
					err,
					Error::SessionExpired { source: Some(RefreshError::Transport(_)), .. }
				),
				"Unexpected error: {err:?}."
			);
		}

		let metrics = client.refresh_metrics().snapshot();

		assert_eq!(metrics.attempts, 1);
		assert_eq!(metrics.coalesced, 1);
		assert_eq!(metrics.failures, 1);
		assert_eq!(*events.lock(), vec!["renewal endpoint unreachable".to_string()]);
		assert!(store.get().is_none());
		assert!(!client.coordinator().is_in_flight());
	}

	#[test]
	fn expiry_racing_login_is_reported() {
		let store = Arc::new(HookedStore::default());
		let transport = Arc::new(ScriptedTransport::new(renewing_handler));
		let client = client(store.clone(), transport);
		let events = record_events(&client);

		client.session().invalidate("refresh token rejected");

		let session = client.session().clone();

		*store.after_set.lock() = Some(Box::new(move || {
			session.invalidate(REPLAY_REJECTED);
		}));
		client.login(Credential::new("at-2", "rt-2"));

		// The late expiry wiped the new credential, so it must have been announced.
		assert!(store.get().is_none());
		assert!(client.session().is_invalidated());
		assert_eq!(
			*events.lock(),
			vec!["refresh token rejected".to_string(), REPLAY_REJECTED.to_string()]
		);
	}
}
