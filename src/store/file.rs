//! Simple file-backed [`SessionStorage`] for desktop shells and long-lived CLIs.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{CompareAndSwapOutcome, SessionStorage, StoreError},
};

/// Persists session entries to a JSON file after each mutation.
///
/// Every mutation rewrites a sibling `.tmp` file and renames it over the snapshot, so a
/// crash never leaves a half-written credential behind.
#[derive(Clone, Debug)]
pub struct FileStorage {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, String>>>,
}
impl FileStorage {
	/// Opens (or creates) storage at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the JSON snapshot.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, String>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
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
				message: format!("Failed to create storage directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, String>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize storage snapshot: {e}"),
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
}
impl SessionStorage for FileStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.inner.read().get(key).cloned())
	}

	fn get_all(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
		let guard = self.inner.read();

		Ok(keys.iter().map(|key| guard.get(*key).cloned()).collect())
	}

	fn compare_and_swap(
		&self,
		key: &str,
		expected: &str,
		entries: &[(&str, String)],
	) -> Result<CompareAndSwapOutcome, StoreError> {
		let mut guard = self.inner.write();

		match guard.get(key) {
			None => return Ok(CompareAndSwapOutcome::Missing),
			Some(current) if current != expected => return Ok(CompareAndSwapOutcome::Mismatch),
			Some(_) => {},
		}

		let mut next = guard.clone();

		for (key, value) in entries {
			next.insert((*key).to_owned(), value.clone());
		}

		self.persist_locked(&next)?;
		*guard = next;

		Ok(CompareAndSwapOutcome::Updated)
	}

	fn set_all(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		for (key, value) in entries {
			next.insert((*key).to_owned(), value.clone());
		}

		self.persist_locked(&next)?;
		*guard = next;

		Ok(())
	}

	fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		if !keys.iter().any(|key| guard.contains_key(*key)) {
			return Ok(());
		}

		let mut next = guard.clone();

		for key in keys {
			next.remove(*key);
		}

		self.persist_locked(&next)?;
		*guard = next;

		Ok(())
	}
}
