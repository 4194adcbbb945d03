//! Gateway-level error types shared across the token store, refresh coordinator, and
//! request pipeline.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or request construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Backend response could not be decoded.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Backend rejected the login or refresh credentials.
	#[error("Backend rejected the credentials: {reason}.")]
	InvalidCredentials {
		/// Backend- or gateway-supplied reason string.
		reason: String,
	},
	/// No usable access token exists and a refresh was impossible; the session is gone.
	#[error("No usable session is available; sign in again.")]
	Unauthenticated,
	/// Backend answered with a non-zero application status code.
	#[error("Backend reported error {code}: {message}.")]
	Business {
		/// Application status code from the response envelope.
		code: i64,
		/// User-facing message from the response envelope.
		message: String,
		/// Backend request identifier, when supplied.
		request_id: Option<String>,
	},
	/// Backend answered with an HTTP status the gateway cannot interpret.
	#[error("Backend responded with unexpected HTTP status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
	},
}
impl Error {
	/// Returns `true` when the error means the caller must sign in again.
	pub fn is_unauthenticated(&self) -> bool {
		matches!(self, Self::Unauthenticated)
	}
}

/// Request construction failures raised at runtime.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] ::http::Error),
	/// Request path cannot be resolved against the base URL.
	#[error("Request path `{path}` cannot be resolved against the base URL.")]
	InvalidPath {
		/// Offending request path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request header name or value is invalid.
	#[error("Request header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[source] serde_json::Error),
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The call exceeded the transport timeout.
	#[error("The backend did not respond before the request timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

/// Failures raised while decoding backend payloads.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Backend responded with malformed JSON that could not be parsed.
	#[error("Backend returned malformed JSON.")]
	Json {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Envelope reported success without the expected `data` payload.
	#[error("Backend response is missing its data payload.")]
	MissingData,
	/// Token issuance timestamp uses an unsupported format.
	#[error("Token issuance timestamp `{value}` is not a supported date-time.")]
	Timestamp {
		/// Raw timestamp string.
		value: String,
	},
}
