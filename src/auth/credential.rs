//! The credential record persisted for the current session.

// crates.io
use time::{PrimitiveDateTime, format_description::well_known::Rfc3339, macros::format_description};
// self
use crate::{_prelude::*, api::TokenInfo, auth::TokenSecret, error::DecodeError};

/// Token pair issued by the backend on login or refresh.
///
/// Records are immutable; a new login or refresh replaces the stored record wholesale.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
	/// Short-lived bearer token attached to authenticated requests.
	pub access_token: TokenSecret,
	/// Longer-lived token exchanged for a new record.
	pub refresh_token: TokenSecret,
	/// Instant the backend generated the access token.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
	/// Backend-declared access token lifetime in seconds.
	pub access_ttl_seconds: i64,
}
impl CredentialRecord {
	/// Creates a record from raw token values.
	pub fn new(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		issued_at: OffsetDateTime,
		access_ttl_seconds: i64,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			issued_at,
			access_ttl_seconds,
		}
	}

	/// Converts the backend's wire payload into a record.
	pub fn from_token_info(info: TokenInfo) -> Result<Self, DecodeError> {
		let issued_at = parse_issued_at(&info.srv_create_time)?;

		Ok(Self::new(info.access_token, info.refresh_token, issued_at, info.duration))
	}

	/// Instant at which the access token stops being usable.
	pub fn access_expires_at(&self) -> OffsetDateTime {
		self.issued_at.saturating_add(Duration::seconds(self.access_ttl_seconds))
	}

	/// Returns `true` once `instant` reaches the access expiry (boundary inclusive).
	pub fn is_access_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.access_expires_at()
	}

	/// Whole seconds of access token lifetime left at `instant`, never negative.
	pub fn remaining_access_seconds_at(&self, instant: OffsetDateTime) -> i64 {
		(self.access_expires_at() - instant).whole_seconds().max(0)
	}
}
impl Debug for CredentialRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialRecord")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("access_ttl_seconds", &self.access_ttl_seconds)
			.finish()
	}
}

/// Accepts RFC 3339 and the backend's `YYYY-MM-DD HH:MM:SS` form (read as UTC).
fn parse_issued_at(raw: &str) -> Result<OffsetDateTime, DecodeError> {
	let raw = raw.trim();

	if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Ok(instant);
	}

	let backend_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

	PrimitiveDateTime::parse(raw, backend_format)
		.map(PrimitiveDateTime::assume_utc)
		.map_err(|_| DecodeError::Timestamp { value: raw.to_owned() })
}
