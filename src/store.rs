//! Storage contracts, built-in key/value backends, and the credential-aware [`TokenStore`].

pub mod file;
pub mod memory;
pub mod token;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use token::*;

// self
use crate::_prelude::*;

/// Synchronous key/value backend that holds the persisted session.
///
/// Multi-key writes and removals must be atomic: readers observe either every entry of
/// a batch or none of it.
pub trait SessionStorage
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, if any.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Reads every listed key from one consistent snapshot, in order.
	fn get_all(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError>;

	/// Writes every entry in one atomic step, replacing previous values.
	fn set_all(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;

	/// Writes `entries` only while `key` still holds `expected`, in one atomic step.
	fn compare_and_swap(
		&self,
		key: &str,
		expected: &str,
		entries: &[(&str, String)],
	) -> Result<CompareAndSwapOutcome, StoreError>;

	/// Removes every listed key in one atomic step. Missing keys are ignored.
	fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError>;
}

/// Result of a compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The guarded value matched and the entries were written.
	Updated,
	/// The guarded value exists but no longer matches.
	Mismatch,
	/// Nothing is stored under the guarded key.
	Missing,
}

/// Error type produced by [`SessionStorage`] implementations and the [`TokenStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced while encoding or decoding stored values.
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
