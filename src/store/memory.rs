//! Thread-safe in-memory [`SessionStore`] implementation for tests and ephemeral sessions.

// self
use crate::{
	_prelude::*,
	auth::SessionKey,
	store::{SessionStore, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<BTreeMap<SessionKey, String>>>;

/// Storage backend that keeps the session in-process.
///
/// Clones share the same map, so a clone handed to another component observes (and can
/// clear) the dispatcher's session.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns a copy of every persisted key/value pair.
	pub fn snapshot(&self) -> BTreeMap<SessionKey, String> {
		self.0.read().clone()
	}

	/// Returns `true` when no session state is persisted.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn save_now(map: StoreMap, key: SessionKey, value: String) -> Result<(), StoreError> {
		map.write().insert(key, value);

		Ok(())
	}
}
impl SessionStore for MemoryStore {
	fn fetch(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(&key).cloned()) })
	}

	fn save(&self, key: SessionKey, value: String) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::save_now(map, key, value) })
	}

	fn remove(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(&key)) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().clear();

			Ok(())
		})
	}
}
