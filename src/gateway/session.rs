//! Session lifecycle: login, logout, and the "session invalidated" signal.
//!
//! The gateway never navigates anywhere itself. When a session becomes unusable it clears
//! the store and notifies every registered [`SessionObserver`] once per session, so the
//! embedding application can redirect to its login screen however it likes.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	api::{self, LoginParams, TokenInfo},
	auth::CredentialRecord,
	gateway::{ApiRequest, Gateway},
	http::HttpTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Why the gateway gave up on the current session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvalidationReason {
	/// A credentialed request found no stored session.
	MissingCredentials,
	/// The refresh call failed or the refresh token was no longer presentable.
	RefreshFailed,
	/// The backend rejected a freshly refreshed token.
	CredentialsRejected,
}
impl InvalidationReason {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::MissingCredentials => "missing_credentials",
			Self::RefreshFailed => "refresh_failed",
			Self::CredentialsRejected => "credentials_rejected",
		}
	}
}
impl Display for InvalidationReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Receives "session invalidated" notifications.
pub trait SessionObserver
where
	Self: Send + Sync,
{
	/// Called after the store was cleared because the session became unusable.
	fn session_invalidated(&self, reason: InvalidationReason);
}
impl<F> SessionObserver for F
where
	F: Fn(InvalidationReason) + Send + Sync,
{
	fn session_invalidated(&self, reason: InvalidationReason) {
		self(reason)
	}
}

/// Observer registry that deduplicates notifications per session generation.
#[derive(Default)]
pub(crate) struct SessionSignal {
	generation: AtomicU64,
	notified: Mutex<Option<u64>>,
	observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
}
impl SessionSignal {
	pub(crate) fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
		self.observers.write().push(observer);
	}

	/// Starts a new session generation; the next invalidation notifies again.
	pub(crate) fn begin(&self) {
		self.generation.fetch_add(1, Ordering::SeqCst);
	}

	/// Ends the current generation without notifying; later invalidations stay silent
	/// until the next [`begin`](Self::begin).
	pub(crate) fn silence(&self) {
		*self.notified.lock() = Some(self.generation.load(Ordering::SeqCst));
	}

	/// Notifies observers unless this generation was already reported.
	pub(crate) fn invalidate(&self, reason: InvalidationReason) -> bool {
		let generation = self.generation.load(Ordering::SeqCst);

		{
			let mut notified = self.notified.lock();

			if *notified == Some(generation) {
				return false;
			}

			*notified = Some(generation);
		}

		let observers = self.observers.read().clone();

		for observer in observers {
			observer.session_invalidated(reason);
		}

		true
	}
}

impl<C> Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	/// Exchanges account credentials for a session and stores the issued record.
	pub async fn login(
		&self,
		login_name: impl Into<String>,
		password: impl Into<String>,
	) -> Result<CredentialRecord> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let params = LoginParams { login_name: login_name.into(), password: password.into() };
		let result = span
			.instrument(async move {
				let request =
					ApiRequest::post(self.config.endpoints.login.as_str()).public().json(&params)?;
				let response = self.dispatch(&request, None).await?;
				let info = api::read_envelope::<TokenInfo>(&response)
					.and_then(|envelope| envelope.into_data())
					.map_err(|err| match err {
						Error::Business { message, .. } => Error::InvalidCredentials { reason: message },
						other => other,
					})?;
				let record = CredentialRecord::from_token_info(info)?;

				self.store.save(&record)?;
				self.session.begin();
				tracing::info!(ttl = record.access_ttl_seconds, "session established");

				Ok(record)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Tells the backend to end the session, then clears local credentials regardless of
	/// the backend's answer.
	pub async fn logout(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let token = self.store.access_token()?;
				let request = ApiRequest::delete(self.config.endpoints.logout.as_str());

				match self.dispatch(&request, token.as_ref()).await {
					Ok(response) if response.status().is_success() => {
						if let Err(err) = api::read_envelope::<serde_json::Value>(&response) {
							tracing::warn!(error = %err, "backend refused logout; clearing anyway");
						}
					},
					Ok(response) => tracing::warn!(
						status = response.status().as_u16(),
						"backend refused logout; clearing anyway"
					),
					Err(err) => tracing::warn!(error = %err, "logout call failed; clearing anyway"),
				}

				self.store.clear()?;
				self.session.silence();
				tracing::info!("session closed");

				Ok(())
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Logged-out side effect: clears the store and notifies observers once per session.
	///
	/// Safe to call from any error path, any number of times.
	pub fn invalidate_session(&self, reason: InvalidationReason) {
		if let Err(err) = self.store.clear() {
			tracing::warn!(error = %err, "failed to clear credentials while invalidating session");
		}
		if self.session.invalidate(reason) {
			tracing::info!(reason = reason.as_str(), "session invalidated");
		}
	}
}
