//! Request interceptor pipeline.
//!
//! Every credentialed request walks the same path: an outbound step makes sure a usable
//! access token is attached (refreshing proactively through the shared coordinator), the
//! transport runs, and an inbound step replays the request at most once when the backend
//! rejects the token. A second rejection ends the session.

// crates.io
use ::http::{HeaderValue, StatusCode};
// self
use crate::{
	_prelude::*,
	api,
	auth::TokenSecret,
	error::ConfigError,
	gateway::{ApiRequest, Credentials, Gateway, InvalidationReason},
	http::{HttpRequest, HttpResponse, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C> Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	/// Sends a request through the credential pipeline and returns the raw response.
	///
	/// Non-2xx responses other than credential rejections are returned as-is; use
	/// [`send_json`](Self::send_json) to decode the backend envelope.
	pub async fn send(&self, request: ApiRequest) -> Result<HttpResponse> {
		const KIND: FlowKind = FlowKind::Send;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.run(&request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Sends a request and decodes the `data` member of a successful envelope.
	pub async fn send_json<T>(&self, request: ApiRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response = self.send(request).await?;

		api::read_envelope::<T>(&response)?.into_data()
	}

	async fn run(&self, request: &ApiRequest) -> Result<HttpResponse> {
		let url = self.config.resolve(&request.path)?;

		if request.credentials == Credentials::Public || self.config.is_refresh_url(&url) {
			return self.dispatch(request, None).await;
		}

		let token = self.attach(request).await?;
		let response = self.dispatch(request, token.as_ref()).await?;
		let Some(sent_with) = token else {
			return Ok(response);
		};

		if !self.is_rejected(&response) {
			return Ok(response);
		}

		self.replay(request, sent_with).await
	}

	/// Outbound step: returns the token to attach, refreshing first when it is expired or
	/// close to expiry.
	async fn attach(&self, request: &ApiRequest) -> Result<Option<TokenSecret>> {
		let now = self.store.now();
		let stored = self.store.load()?;

		if stored.is_none() && request.credentials == Credentials::Optional {
			return Ok(None);
		}

		let needs_refresh = stored.as_ref().is_none_or(|stored| {
			let record = &stored.record;

			record.is_access_expired_at(now)
				|| record.remaining_access_seconds_at(now)
					< self.config.effective_refresh_threshold(record.access_ttl_seconds)
		});

		if needs_refresh {
			tracing::debug!(path = %request.path, "access token needs refresh before sending");

			if !self.coordinator.ensure_fresh_token().await {
				let reason = if stored.is_some() {
					InvalidationReason::RefreshFailed
				} else {
					InvalidationReason::MissingCredentials
				};

				self.invalidate_session(reason);

				return Err(Error::Unauthenticated);
			}
		}

		match self.store.valid_access_token()? {
			Some(token) => Ok(Some(token)),
			None if request.credentials == Credentials::Optional => Ok(None),
			None => {
				self.invalidate_session(InvalidationReason::MissingCredentials);

				Err(Error::Unauthenticated)
			},
		}
	}

	/// Inbound step: replays a rejected request once with a fresh token.
	async fn replay(&self, request: &ApiRequest, sent_with: TokenSecret) -> Result<HttpResponse> {
		tracing::debug!(path = %request.path, "access token rejected; replaying once");

		let fresh = match self.store.valid_access_token()? {
			// Another request rotated the token while this one was in flight.
			Some(current) if current != sent_with => Some(current),
			_ =>
				if self.coordinator.ensure_fresh_token().await {
					self.store.valid_access_token()?
				} else {
					None
				},
		};
		let Some(fresh) = fresh else {
			self.invalidate_session(InvalidationReason::RefreshFailed);

			return Err(Error::Unauthenticated);
		};
		let response = self.dispatch(request, Some(&fresh)).await?;

		if self.is_rejected(&response) {
			tracing::warn!(
				path = %request.path,
				status = response.status().as_u16(),
				"replayed request was rejected again"
			);
			self.invalidate_session(InvalidationReason::CredentialsRejected);

			return Err(Error::Unauthenticated);
		}

		Ok(response)
	}

	/// Returns `true` when the backend refused the attached credentials.
	fn is_rejected(&self, response: &HttpResponse) -> bool {
		if response.status() == StatusCode::UNAUTHORIZED {
			return true;
		}

		match self.config.token_invalid_code {
			Some(code) =>
				response.status().is_success() && api::peek_code(response.body()) == Some(code),
			None => false,
		}
	}

	/// Builds and executes one HTTP exchange without any credential handling.
	pub(crate) async fn dispatch(
		&self,
		request: &ApiRequest,
		token: Option<&TokenSecret>,
	) -> Result<HttpResponse> {
		let http_request = self.build_http_request(request, token)?;

		Ok(self.http_client.execute(http_request).await?)
	}

	fn build_http_request(
		&self,
		request: &ApiRequest,
		token: Option<&TokenSecret>,
	) -> Result<HttpRequest, ConfigError> {
		let mut url = self.config.resolve(&request.path)?;

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(request.query.iter());
		}

		let mut http_request = ::http::Request::builder()
			.method(request.method.clone())
			.uri(url.as_str())
			.body(request.body.clone().unwrap_or_default())?;
		let headers = http_request.headers_mut();

		headers.extend(self.config.default_headers.clone());
		headers.extend(request.headers.clone());

		if let Some(token) = token {
			let mut value = HeaderValue::try_from(token.expose()).map_err(|_| {
				ConfigError::InvalidHeader { name: self.config.credential_header.to_string() }
			})?;

			value.set_sensitive(true);
			headers.insert(self.config.credential_header.clone(), value);
		}

		Ok(http_request)
	}
}
