//! Logical requests accepted by the gateway pipeline.

// crates.io
use ::http::{HeaderMap, HeaderName, HeaderValue, Method};
// self
use crate::{_prelude::*, error::ConfigError};

/// How a request relates to the session credentials.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Credentials {
	/// Fail with [`Error::Unauthenticated`] when no usable access token exists.
	#[default]
	Required,
	/// Attach the access token when one exists; otherwise send anonymously.
	Optional,
	/// Never attach credentials and skip the refresh machinery entirely.
	Public,
}

/// Transport-agnostic description of a backend call.
///
/// Requests are kept as plain data so the pipeline can rebuild and replay them after a
/// token refresh.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path resolved against the gateway's base URL.
	pub path: String,
	/// Query parameters appended in order.
	pub query: Vec<(String, String)>,
	/// Per-request headers; these override the configured defaults.
	pub headers: HeaderMap,
	/// Buffered request body.
	pub body: Option<Vec<u8>>,
	/// Credential requirement.
	pub credentials: Credentials,
}
impl ApiRequest {
	/// Creates a credentialed request.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: HeaderMap::new(),
			body: None,
			credentials: Credentials::Required,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Shorthand for a `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends a query parameter.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Sets a request header.
	pub fn header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
		let invalid = || ConfigError::InvalidHeader { name: name.to_owned() };
		let header_name = HeaderName::try_from(name).map_err(|_| invalid())?;
		let header_value = HeaderValue::try_from(value).map_err(|_| invalid())?;

		self.headers.insert(header_name, header_value);

		Ok(self)
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(ConfigError::RequestBody)?;

		self.headers.insert(
			::http::header::CONTENT_TYPE,
			HeaderValue::from_static("application/json"),
		);
		self.body = Some(bytes);

		Ok(self)
	}

	/// Overrides the credential requirement.
	pub fn credentials(mut self, credentials: Credentials) -> Self {
		self.credentials = credentials;

		self
	}

	/// Marks the request as not needing credentials.
	pub fn public(self) -> Self {
		self.credentials(Credentials::Public)
	}

	/// Marks the request as attaching credentials only when available.
	pub fn optional_auth(self) -> Self {
		self.credentials(Credentials::Optional)
	}
}
