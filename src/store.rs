//! Session storage contract and built-in store implementations.
//!
//! Stores hold the persisted session (credential pair plus user metadata) keyed by
//! [`SessionKey`]. The dispatcher re-reads the store on every call, so a store may be
//! mutated by other components (a logout elsewhere in the application, another process
//! sharing a [`FileStore`]) without invalidating any dispatcher state.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::SessionKey};

/// Boxed future returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for persisted session state.
///
/// Writes are single string values with last-writer-wins semantics.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if present.
	fn fetch(&self, key: SessionKey) -> StoreFuture<'_, Option<String>>;

	/// Persists or replaces the value stored under `key`.
	fn save(&self, key: SessionKey, value: String) -> StoreFuture<'_, ()>;

	/// Removes `key`, returning the previous value.
	fn remove(&self, key: SessionKey) -> StoreFuture<'_, Option<String>>;

	/// Removes every persisted key.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`SessionStore`] implementations.
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
}
