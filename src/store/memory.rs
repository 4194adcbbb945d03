//! Thread-safe in-memory [`SessionStorage`] for tests and short-lived processes.

// self
use crate::{
	_prelude::*,
	store::{CompareAndSwapOutcome, SessionStorage, StoreError},
};

type StorageMap = Arc<RwLock<HashMap<String, String>>>;

/// Keeps session entries in-process; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(StorageMap);
impl MemoryStorage {
	/// Returns the number of stored entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl SessionStorage for MemoryStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn get_all(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
		let guard = self.0.read();

		Ok(keys.iter().map(|key| guard.get(*key).cloned()).collect())
	}

	fn set_all(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
		let mut guard = self.0.write();

		for (key, value) in entries {
			guard.insert((*key).to_owned(), value.clone());
		}

		Ok(())
	}

	fn compare_and_swap(
		&self,
		key: &str,
		expected: &str,
		entries: &[(&str, String)],
	) -> Result<CompareAndSwapOutcome, StoreError> {
		let mut guard = self.0.write();

		match guard.get(key) {
			None => return Ok(CompareAndSwapOutcome::Missing),
			Some(current) if current != expected => return Ok(CompareAndSwapOutcome::Mismatch),
			Some(_) => {},
		}

		for (key, value) in entries {
			guard.insert((*key).to_owned(), value.clone());
		}

		Ok(CompareAndSwapOutcome::Updated)
	}

	fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
		let mut guard = self.0.write();

		for key in keys {
			guard.remove(*key);
		}

		Ok(())
	}
}
