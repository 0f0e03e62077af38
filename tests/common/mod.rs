//! Shared fixtures for the reqwest-backed integration suites.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use parking_lot::Mutex;
use url::Url;
// self
use bearer_renewal::{
	auth::Credential,
	client::ReqwestAuthClient,
	config::ClientConfig,
	session::{SessionInvalid, SessionListener},
	store::MemoryStore,
};

pub const RENEWAL_PATH: &str = "/v1/auth/refresh";
pub const LOGIN_PATH: &str = "/v1/auth/login";

/// Collects every `session-invalid` event.
#[derive(Debug, Default)]
pub struct EventLog(Mutex<Vec<SessionInvalid>>);
impl EventLog {
	pub fn reasons(&self) -> Vec<String> {
		self.0.lock().iter().map(|event| event.reason.clone()).collect()
	}

	pub fn len(&self) -> usize {
		self.0.lock().len()
	}
}
impl SessionListener for EventLog {
	fn on_session_invalid(&self, event: &SessionInvalid) {
		self.0.lock().push(event.clone());
	}
}

pub fn url(server: &MockServer, path: &str) -> Url {
	Url::parse(&server.url(path)).expect("Mock server URL should parse.")
}

pub fn config(renewal_endpoint: Url) -> ClientConfig {
	ClientConfig::builder(renewal_endpoint)
		.exempt_path(LOGIN_PATH)
		.build()
		.expect("Test configuration should validate.")
}

/// Builds a client against `server`, seeded with `credential`, with an attached event log.
pub fn build_client(
	server: &MockServer,
	credential: Option<Credential>,
) -> (ReqwestAuthClient, Arc<MemoryStore>, Arc<EventLog>) {
	build_client_with_config(config(url(server, RENEWAL_PATH)), credential)
}

pub fn build_client_with_config(
	config: ClientConfig,
	credential: Option<Credential>,
) -> (ReqwestAuthClient, Arc<MemoryStore>, Arc<EventLog>) {
	let store = Arc::new(credential.map(MemoryStore::with_credential).unwrap_or_default());
	let client = ReqwestAuthClient::new(store.clone(), config);
	let events = Arc::new(EventLog::default());

	client.subscribe(events.clone());

	(client, store, events)
}

pub fn renewal_body(access: &str, refresh: &str) -> String {
	format!("{{\"status\":200,\"data\":{{\"accessToken\":\"{access}\",\"refreshToken\":\"{refresh}\"}}}}")
}
