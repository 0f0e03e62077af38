//! Opaque bearer strings that stay out of logs.

// self
use crate::_prelude::*;

const PLACEHOLDER: &str = "***";

/// Access or refresh token.
///
/// `Debug` and `Display` print a placeholder; [`TokenSecret::expose`] is the only way to read the
/// value, which keeps it out of spans and error messages. Serializes as a bare JSON string.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps `value`.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw token, for building headers only.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// `true` for the empty string, which servers use to mean "no token".
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for TokenSecret {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret({PLACEHOLDER})")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(PLACEHOLDER)
	}
}
