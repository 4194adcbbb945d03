//! Transport primitives for backend calls.
//!
//! The module exposes [`HttpTransport`] so embedding applications can route gateway
//! traffic through their own HTTP stack (or a fake in tests). Requests and responses use
//! the `http` crate's types with fully buffered bodies, which keeps replaying a request
//! after a token refresh cheap.

// std
#[cfg(feature = "reqwest")] use std::{ops::Deref, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::TransportError};

/// Outbound request with a buffered body.
pub type HttpRequest = ::http::Request<Vec<u8>>;
/// Inbound response with a buffered body.
pub type HttpResponse = ::http::Response<Vec<u8>>;
/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports that execute gateway requests.
///
/// The trait is the gateway's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` so one transport can be shared by the request pipeline and the
/// refresh coordinator. Every HTTP status (including 401) is a successful `execute`;
/// only failures that produced no response map to [`TransportError`].
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the full response.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
	timeout: Option<StdDuration>,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, timeout: None }
	}

	/// Applies `timeout` to every request executed through this client.
	pub fn with_timeout(mut self, timeout: Option<StdDuration>) -> Self {
		self.timeout = timeout;

		self
	}

	/// Per-request timeout, if configured.
	pub fn timeout(&self) -> Option<StdDuration> {
		self.timeout
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let mut request = reqwest::Request::try_from(request)?;

			if let Some(timeout) = self.timeout {
				*request.timeout_mut() = Some(timeout);
			}

			let response = self.client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new = HttpResponse::new(response.bytes().await?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
