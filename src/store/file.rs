//! Durable file-backed [`SessionStore`] that survives process restarts.

// std
use std::{
	ffi::OsString,
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use tempfile::NamedTempFile;
// self
use crate::{
	_prelude::*,
	auth::SessionKey,
	store::{SessionStore, StoreError, StoreFuture},
};

type Snapshot = BTreeMap<SessionKey, String>;

/// Persists the session to a JSON file after each mutation.
///
/// Reads always go to disk so that a logout performed by another process sharing the file
/// is observed by the next dispatch. Every mutation holds an exclusive lock on a sidecar
/// `<path>.lock` file for its whole load-modify-persist cycle, so handles in this or other
/// processes never interleave writes, and lands through a uniquely named temp file that is
/// atomically renamed over the snapshot.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	lock_path: PathBuf,
}
impl FileStore {
	/// Opens (or prepares) a store at the provided path, validating any existing snapshot.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();
		let lock_path = {
			let mut name = OsString::from(path.as_os_str());

			name.push(".lock");

			PathBuf::from(name)
		};

		Self::ensure_parent_exists(&path)?;
		Self::load_snapshot(&path)?;

		Ok(Self { path, lock_path })
	}

	/// Returns the backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns the sidecar file used to serialize writers.
	pub fn lock_path(&self) -> &Path {
		&self.lock_path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(Snapshot::new());
		}

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

	// The lock is released when the returned handle is dropped.
	fn lock_writers(&self) -> Result<File, StoreError> {
		let file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.read(true)
			.write(true)
			.open(&self.lock_path)
			.map_err(|e| StoreError::Backend {
				message: format!("Failed to open {}: {e}", self.lock_path.display()),
			})?;

		file.lock().map_err(|e| StoreError::Backend {
			message: format!("Failed to lock {}: {e}", self.lock_path.display()),
		})?;

		Ok(file)
	}

	fn persist(&self, contents: &Snapshot) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize session snapshot: {e}"),
			})?;
		let parent = self
			.path
			.parent()
			.filter(|p| !p.as_os_str().is_empty())
			.unwrap_or_else(|| Path::new("."));
		let mut tmp = NamedTempFile::new_in(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create a temp file in {}: {e}", parent.display()),
		})?;

		tmp.write_all(&serialized).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp.path().display()),
		})?;
		tmp.as_file().sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp.path().display()),
		})?;
		tmp.persist(&self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {}", self.path.display(), e.error),
		})?;

		Ok(())
	}

	fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> T) -> Result<T, StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let _lock = self.lock_writers()?;
		let mut snapshot = Self::load_snapshot(&self.path)?;
		let output = f(&mut snapshot);

		self.persist(&snapshot)?;

		Ok(output)
	}
}
impl SessionStore for FileStore {
	fn fetch(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
		Box::pin(async move { Ok(Self::load_snapshot(&self.path)?.remove(&key)) })
	}

	fn save(&self, key: SessionKey, value: String) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.mutate(|snapshot| {
				snapshot.insert(key, value);
			})
		})
	}

	fn remove(&self, key: SessionKey) -> StoreFuture<'_, Option<String>> {
		Box::pin(async move { self.mutate(|snapshot| snapshot.remove(&key)) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(Snapshot::clear) })
	}
}
