//! Credential-aware view over a [`SessionStorage`] backend.
//!
//! The [`TokenStore`] owns the persisted session layout: the serialized
//! [`CredentialRecord`] under [`CREDENTIAL_KEY`] and the client-derived refresh-token
//! expiry under [`REFRESH_EXPIRES_AT_KEY`]. Both keys are written and removed together,
//! so readers never see a record without its expiry. Every predicate has an `_at`
//! variant that evaluates against a caller-supplied instant; the plain variants read the
//! store's [`Clock`].

// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{CredentialRecord, TokenSecret},
	clock::Clock,
	store::{CompareAndSwapOutcome, SessionStorage, StoreError},
};

/// Storage key holding the serialized [`CredentialRecord`].
pub const CREDENTIAL_KEY: &str = "user_token";
/// Storage key holding the RFC 3339 refresh-token expiry.
pub const REFRESH_EXPIRES_AT_KEY: &str = "refresh_token_expires_at";
/// Local approximation of the backend's refresh-token lifetime.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::days(10);

/// Stored record paired with its derived refresh expiry.
#[derive(Clone, Debug)]
pub struct StoredCredential {
	/// Credential record written by the last login or refresh.
	pub record: CredentialRecord,
	/// Instant after which the refresh token is no longer presented.
	pub refresh_expires_at: OffsetDateTime,
}
impl StoredCredential {
	/// Returns `true` once `instant` reaches the refresh expiry (boundary inclusive).
	pub fn is_refresh_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.refresh_expires_at
	}
}

/// Synchronous reader/writer for the current session's credentials.
#[derive(Clone)]
pub struct TokenStore {
	storage: Arc<dyn SessionStorage>,
	clock: Arc<dyn Clock>,
	refresh_window: Duration,
}
impl TokenStore {
	/// Creates a store over `storage` using the default refresh window.
	pub fn new(storage: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Self {
		Self { storage, clock, refresh_window: DEFAULT_REFRESH_WINDOW }
	}

	/// Overrides the refresh window applied on every [`save`](Self::save).
	pub fn with_refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = window;

		self
	}

	/// Current instant according to the store's clock.
	pub fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	/// Refresh window applied on every save.
	pub fn refresh_window(&self) -> Duration {
		self.refresh_window
	}

	/// Atomically replaces the current record and stamps its refresh expiry.
	pub fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
		self.storage.set_all(&self.entries(record)?)
	}

	/// Replaces the record only while the stored refresh token is still `expected_refresh`.
	///
	/// Anything that replaced or removed the session in the meantime (login, logout,
	/// [`clear`](Self::clear)) wins; the caller's `replacement` is dropped.
	pub fn compare_and_swap_refresh(
		&self,
		expected_refresh: &TokenSecret,
		replacement: &CredentialRecord,
	) -> Result<CompareAndSwapOutcome, StoreError> {
		let entries = self.entries(replacement)?;

		loop {
			let Some(serialized) = self.storage.get(CREDENTIAL_KEY)? else {
				return Ok(CompareAndSwapOutcome::Missing);
			};

			if parse_record(&serialized)?.refresh_token != *expected_refresh {
				return Ok(CompareAndSwapOutcome::Mismatch);
			}

			match self.storage.compare_and_swap(CREDENTIAL_KEY, &serialized, &entries)? {
				// Rewritten between the read and the swap; check the new value.
				CompareAndSwapOutcome::Mismatch => continue,
				outcome => return Ok(outcome),
			}
		}
	}

	/// Loads the stored record and its refresh expiry, if a session exists.
	pub fn load(&self) -> Result<Option<StoredCredential>, StoreError> {
		let [serialized, expires]: [Option<String>; 2] = self
			.storage
			.get_all(&[CREDENTIAL_KEY, REFRESH_EXPIRES_AT_KEY])?
			.try_into()
			.map_err(|values: Vec<_>| StoreError::Backend {
				message: format!("Storage returned {} values for 2 keys", values.len()),
			})?;
		let Some(serialized) = serialized else {
			return Ok(None);
		};
		let record = parse_record(&serialized)?;
		let refresh_expires_at = match expires {
			Some(raw) => OffsetDateTime::parse(&raw, &Rfc3339).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to parse refresh expiry: {e}") }
			})?,
			// A record without its expiry was never written by `save`; treat it as spent.
			None => OffsetDateTime::UNIX_EPOCH,
		};

		Ok(Some(StoredCredential { record, refresh_expires_at }))
	}

	/// Returns `true` when a record is stored, regardless of expiry.
	pub fn has_credentials(&self) -> Result<bool, StoreError> {
		Ok(self.storage.get(CREDENTIAL_KEY)?.is_some())
	}

	/// Raw read of the access token; callers decide whether to trust it.
	pub fn access_token(&self) -> Result<Option<TokenSecret>, StoreError> {
		Ok(self.load()?.map(|stored| stored.record.access_token))
	}

	/// Access-safe read: returns the token only while it has not expired.
	pub fn valid_access_token(&self) -> Result<Option<TokenSecret>, StoreError> {
		self.valid_access_token_at(self.now())
	}

	/// Access-safe read evaluated at `instant`.
	pub fn valid_access_token_at(
		&self,
		instant: OffsetDateTime,
	) -> Result<Option<TokenSecret>, StoreError> {
		Ok(self
			.load()?
			.filter(|stored| !stored.record.is_access_expired_at(instant))
			.map(|stored| stored.record.access_token))
	}

	/// `true` once the access token expired, or when no record exists.
	pub fn is_access_expired(&self) -> Result<bool, StoreError> {
		self.is_access_expired_at(self.now())
	}

	/// Expiry check evaluated at `instant`.
	pub fn is_access_expired_at(&self, instant: OffsetDateTime) -> Result<bool, StoreError> {
		Ok(self.load()?.is_none_or(|stored| stored.record.is_access_expired_at(instant)))
	}

	/// Whole seconds of access lifetime left; `0` when absent.
	pub fn remaining_access_seconds(&self) -> Result<i64, StoreError> {
		self.remaining_access_seconds_at(self.now())
	}

	/// Remaining access lifetime evaluated at `instant`.
	pub fn remaining_access_seconds_at(&self, instant: OffsetDateTime) -> Result<i64, StoreError> {
		Ok(self
			.load()?
			.map_or(0, |stored| stored.record.remaining_access_seconds_at(instant)))
	}

	/// Returns the refresh token while it is still presentable.
	///
	/// Once the refresh window has elapsed the store is cleared as a side effect; only a
	/// new login can restore a session afterwards.
	pub fn refresh_token(&self) -> Result<Option<TokenSecret>, StoreError> {
		self.refresh_token_at(self.now())
	}

	/// Refresh token read evaluated at `instant`.
	pub fn refresh_token_at(
		&self,
		instant: OffsetDateTime,
	) -> Result<Option<TokenSecret>, StoreError> {
		let Some(stored) = self.load()? else {
			return Ok(None);
		};

		if stored.is_refresh_expired_at(instant) || stored.record.refresh_token.is_empty() {
			tracing::debug!("refresh token is no longer presentable; clearing stored session");

			self.clear()?;

			return Ok(None);
		}

		Ok(Some(stored.record.refresh_token))
	}

	/// Removes the record and its derived expiry. Idempotent.
	pub fn clear(&self) -> Result<(), StoreError> {
		self.storage.remove_all(&[CREDENTIAL_KEY, REFRESH_EXPIRES_AT_KEY])
	}

	fn entries(&self, record: &CredentialRecord) -> Result<[(&'static str, String); 2], StoreError> {
		let refresh_expires_at = self.now().saturating_add(self.refresh_window);
		let serialized = serde_json::to_string(record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize credential record: {e}"),
		})?;
		let expires = refresh_expires_at.format(&Rfc3339).map_err(|e| {
			StoreError::Serialization { message: format!("Failed to format refresh expiry: {e}") }
		})?;

		Ok([(CREDENTIAL_KEY, serialized), (REFRESH_EXPIRES_AT_KEY, expires)])
	}
}
fn parse_record(serialized: &str) -> Result<CredentialRecord, StoreError> {
	serde_json::from_str(serialized).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse stored credential record: {e}"),
	})
}

impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore").field("refresh_window", &self.refresh_window).finish()
	}
}
