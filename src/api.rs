//! Backend wire contract: the response envelope and session endpoint payloads.
//!
//! Every backend endpoint answers with `{code, msg, request_id, data}`. A `code` of
//! [`SUCCESS_CODE`] means the call succeeded and `data` carries the payload; any other
//! value is an application-level failure that surfaces as [`Error::Business`].

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, error::DecodeError, http::HttpResponse};

/// Application status code signaling success.
pub const SUCCESS_CODE: i64 = 0;
/// Application status code the backend uses for an invalid or expired access token.
pub const TOKEN_INVALID_CODE: i64 = 10000004;

/// Uniform response envelope returned by the backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
	/// Application status code; [`SUCCESS_CODE`] on success.
	pub code: i64,
	/// Human-readable status message.
	#[serde(default)]
	pub msg: String,
	/// Backend request identifier.
	#[serde(default)]
	pub request_id: Option<String>,
	/// Payload; absent or `null` for acknowledgement-only endpoints.
	pub data: Option<T>,
}
impl<T> ApiEnvelope<T> {
	/// Returns `true` when `code` equals [`SUCCESS_CODE`].
	pub fn is_success(&self) -> bool {
		self.code == SUCCESS_CODE
	}

	/// Converts a failed envelope into [`Error::Business`]; passes successful ones through.
	pub fn into_success(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Business { code: self.code, message: self.msg, request_id: self.request_id })
		}
	}
}
impl<T> ApiEnvelope<T>
where
	T: DeserializeOwned,
{
	/// Extracts the payload of a successful envelope.
	///
	/// Payload types that accept `null` (such as `()` or `Option<_>`) tolerate a missing
	/// `data` field; everything else reports [`DecodeError::MissingData`].
	pub fn into_data(self) -> Result<T> {
		match self.into_success()?.data {
			Some(data) => Ok(data),
			None => serde_json::from_value(Value::Null).map_err(|_| DecodeError::MissingData.into()),
		}
	}
}

/// Token payload returned by the login and refresh endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenInfo {
	/// Access token string.
	pub access_token: String,
	/// Refresh token string.
	pub refresh_token: String,
	/// Access token lifetime in seconds.
	pub duration: i64,
	/// Backend issuance timestamp.
	pub srv_create_time: String,
}
impl Debug for TokenInfo {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenInfo")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("duration", &self.duration)
			.field("srv_create_time", &self.srv_create_time)
			.finish()
	}
}

/// Body of the login request.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginParams {
	/// Account login name.
	pub login_name: String,
	/// Account password.
	pub password: String,
}
impl Debug for LoginParams {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginParams")
			.field("login_name", &self.login_name)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Strictly decodes an envelope from raw JSON, reporting the failing path on error.
pub fn decode_envelope<T>(status: Option<u16>, body: &[u8]) -> Result<ApiEnvelope<T>>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| DecodeError::Json { source, status }.into())
}

/// Decodes an HTTP response into an envelope, mapping failures into gateway errors.
///
/// Non-2xx responses that still carry a failed envelope surface as [`Error::Business`];
/// anything else non-2xx becomes [`Error::Status`].
pub fn read_envelope<T>(response: &HttpResponse) -> Result<ApiEnvelope<T>>
where
	T: DeserializeOwned,
{
	let status = response.status();

	if !status.is_success() {
		return match serde_json::from_slice::<ApiEnvelope<Value>>(response.body()) {
			Ok(envelope) if !envelope.is_success() => Err(Error::Business {
				code: envelope.code,
				message: envelope.msg,
				request_id: envelope.request_id,
			}),
			_ => Err(Error::Status { status: status.as_u16() }),
		};
	}

	decode_envelope(Some(status.as_u16()), response.body())?.into_success()
}

/// Reads only the application code from a body, ignoring anything malformed.
pub(crate) fn peek_code(body: &[u8]) -> Option<i64> {
	#[derive(Deserialize)]
	struct CodeOnly {
		code: i64,
	}

	serde_json::from_slice::<CodeOnly>(body).ok().map(|head| head.code)
}
