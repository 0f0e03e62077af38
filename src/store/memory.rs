//! Thread-safe in-memory [`CredentialStore`] for services, tests, and demos.

// self
use crate::{_prelude::*, auth::Credential, store::CredentialStore};

type Slot = Arc<RwLock<Option<Credential>>>;

/// Process-local store; clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Creates a store seeded with `credential`.
	pub fn with_credential(credential: Credential) -> Self {
		Self(Arc::new(RwLock::new(Some(credential))))
	}
}
impl CredentialStore for MemoryStore {
	fn get(&self) -> Option<Credential> {
		self.0.read().clone()
	}

	fn set(&self, credential: Credential) {
		*self.0.write() = Some(credential);
	}

	fn clear(&self) {
		self.0.write().take();
	}
}
