//! Storage contract and built-in stores for the current credential.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Credential};

/// Holder of the single current [`Credential`].
///
/// Every method swaps or reads the whole pair under one lock, so a concurrent reader sees
/// either the old pair or the new one, never a mix. Implementations absorb persistence
/// failures: the in-memory value stays authoritative for the lifetime of the process.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the current credential, if any.
	fn get(&self) -> Option<Credential>;

	/// Replaces the current credential.
	fn set(&self, credential: Credential);

	/// Removes the credential and any other session-scoped state. Idempotent.
	fn clear(&self);
}

/// Error type produced by store construction and auxiliary item APIs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// The key belongs to the credential and cannot be written as a plain item.
	#[error("Key `{key}` is reserved for the credential.")]
	ReservedKey {
		/// Rejected key.
		key: String,
	},
}
