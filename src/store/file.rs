//! File-backed [`CredentialStore`] that survives restarts, modelled on browser local storage.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	obs,
	store::{CredentialStore, StoreError},
};

/// Key the credential is persisted under unless overridden.
pub const CREDENTIAL_KEY: &str = "token";

#[derive(Debug, Default)]
struct Snapshot {
	credential: Option<Credential>,
	items: BTreeMap<String, Value>,
}

/// Persists the credential and session-scoped items to one JSON object file after each
/// mutation.
///
/// The file maps keys to JSON values. The credential lives under [`CREDENTIAL_KEY`]; every
/// other key is a session item that [`CredentialStore::clear`] wipes together with the
/// credential.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	key: String,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		Self::open_with_key(path, CREDENTIAL_KEY)
	}

	/// Opens a store that keeps the credential under `key`.
	pub fn open_with_key(path: impl Into<PathBuf>, key: impl Into<String>) -> Result<Self, StoreError> {
		let path = path.into();
		let key = key.into();

		Self::ensure_parent_exists(&path)?;

		let mut items = Self::load_entries(&path)?;
		let credential = items
			.remove(&key)
			.filter(|value| !value.is_null())
			.map(serde_json::from_value::<Credential>)
			.transpose()
			.map_err(|e| StoreError::Serialization {
				message: format!("Failed to decode `{key}` in {}: {e}", path.display()),
			})?;

		Ok(Self { path, key, inner: Arc::new(RwLock::new(Snapshot { credential, items })) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns a session item.
	pub fn item(&self, key: &str) -> Option<Value> {
		self.inner.read().items.get(key).cloned()
	}

	/// Stores a session item and persists the snapshot.
	///
	/// The in-memory value is updated even when persisting fails.
	pub fn set_item(&self, key: impl Into<String>, value: Value) -> Result<(), StoreError> {
		let key = self.ensure_not_reserved(key.into())?;
		let mut guard = self.inner.write();

		guard.items.insert(key, value);

		self.persist_locked(&guard)
	}

	/// Removes a session item, returning its previous value.
	pub fn remove_item(&self, key: &str) -> Result<Option<Value>, StoreError> {
		let key = self.ensure_not_reserved(key.to_owned())?;
		let mut guard = self.inner.write();
		let previous = guard.items.remove(&key);

		if previous.is_some() {
			self.persist_locked(&guard)?;
		}

		Ok(previous)
	}

	fn ensure_not_reserved(&self, key: String) -> Result<String, StoreError> {
		if key == self.key { Err(StoreError::ReservedKey { key }) } else { Ok(key) }
	}

	fn load_entries(path: &Path) -> Result<BTreeMap<String, Value>, StoreError> {
		if !path.exists() {
			return Ok(BTreeMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(BTreeMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist_locked(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let mut entries = snapshot.items.clone();

		if let Some(credential) = snapshot.credential.as_ref() {
			let value = serde_json::to_value(credential).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential: {e}"),
			})?;

			entries.insert(self.key.clone(), value);
		}

		let serialized =
			serde_json::to_vec_pretty(&entries).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn persist_best_effort(&self, snapshot: &Snapshot, operation: &'static str) {
		if let Err(err) = self.persist_locked(snapshot) {
			obs::record_store_failure(operation, &self.path, &err);
		}
	}
}
impl CredentialStore for FileStore {
	fn get(&self) -> Option<Credential> {
		self.inner.read().credential.clone()
	}

	fn set(&self, credential: Credential) {
		let mut guard = self.inner.write();

		guard.credential = Some(credential);
		self.persist_best_effort(&guard, "set");
	}

	fn clear(&self) {
		let mut guard = self.inner.write();

		if guard.credential.is_none() && guard.items.is_empty() {
			return;
		}

		guard.credential = None;
		guard.items.clear();
		self.persist_best_effort(&guard, "clear");
	}
}
