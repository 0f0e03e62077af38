//! The access/refresh pair that identifies an authenticated session.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Current bearer credential pair.
///
/// Both halves are opaque; the client never parses or validates them. The JSON form matches
/// what the authorization server issues (`{"accessToken": "..", "refreshToken": ".."}`), so a
/// persisted credential can be read back by any client speaking the same API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
	/// Access token attached as `Authorization: Bearer <token>`.
	pub access_token: TokenSecret,
	/// Refresh token traded for a new pair during renewal, if the server issued one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
}
impl Credential {
	/// Builds a credential from an access/refresh pair.
	pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: Some(TokenSecret::new(refresh_token)),
		}
	}

	/// Builds a credential that cannot be renewed.
	pub fn access_only(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), refresh_token: None }
	}

	/// Returns the refresh token, treating an empty string as absent.
	pub fn refresh_secret(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref().filter(|secret| !secret.is_empty())
	}

	/// Returns `true` if the access token matches `access`.
	pub fn has_access_token(&self, access: &str) -> bool {
		self.access_token.expose() == access
	}

	/// Keeps `previous`'s refresh token when this pair arrived without one.
	pub fn or_keep_refresh(mut self, previous: &Credential) -> Self {
		if self.refresh_secret().is_none() {
			self.refresh_token = previous.refresh_secret().cloned();
		}

		self
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &self.access_token)
			.field("refresh_token_set", &self.refresh_secret().is_some())
			.finish()
	}
}
