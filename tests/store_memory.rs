// std
use std::{sync::Arc, thread};
// self
use bearer_renewal::{
	auth::Credential,
	store::{CredentialStore, MemoryStore},
};

#[test]
fn clones_share_one_slot() {
	let store = MemoryStore::default();
	let alias = store.clone();

	assert!(store.get().is_none());

	alias.set(Credential::new("at-1", "rt-1"));

	assert_eq!(store.get(), Some(Credential::new("at-1", "rt-1")));

	store.clear();

	assert!(alias.get().is_none());
}

#[test]
fn readers_never_observe_a_mixed_pair() {
	let store: Arc<dyn CredentialStore> =
		Arc::new(MemoryStore::with_credential(Credential::new("at-0", "rt-0")));
	let writer = {
		let store = store.clone();

		thread::spawn(move || {
			for generation in 1..=500 {
				store.set(Credential::new(format!("at-{generation}"), format!("rt-{generation}")));
			}
		})
	};
	let readers: Vec<_> = (0..4)
		.map(|_| {
			let store = store.clone();

			thread::spawn(move || {
				for _ in 0..500 {
					let credential = store.get().expect("Store should never be empty here.");
					let access = credential.access_token.expose().trim_start_matches("at-").to_owned();
					let refresh = credential
						.refresh_secret()
						.map(|secret| secret.expose().trim_start_matches("rt-").to_owned());

					assert_eq!(Some(access), refresh, "Access and refresh halves must match.");
				}
			})
		})
		.collect();

	writer.join().expect("Writer thread should not panic.");

	for reader in readers {
		reader.join().expect("Reader thread should not panic.");
	}

	assert_eq!(store.get(), Some(Credential::new("at-500", "rt-500")));
}
