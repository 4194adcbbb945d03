//! The authenticated request gateway and its collaborators.

pub mod config;
pub mod refresh;
pub mod request;
pub mod session;

mod pipeline;

pub use config::*;
pub use refresh::*;
pub use request::*;
pub use session::*;

// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	auth::TokenSecret,
	clock::{Clock, SystemClock},
	http::HttpTransport,
	store::{SessionStorage, TokenStore},
};

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = Gateway<ReqwestHttpClient>;

/// Wraps an HTTP transport with session credentials and coordinated token refresh.
///
/// The gateway owns the transport, the validated configuration, the [`TokenStore`], and
/// one [`RefreshCoordinator`]; clones share all of them, so every clone takes part in the
/// same single-flight refresh. Route guards and UI code call the small session surface
/// ([`is_logged_in`](Self::is_logged_in), [`access_token`](Self::access_token),
/// [`clear`](Self::clear), [`ensure_fresh_token`](Self::ensure_fresh_token)); endpoint
/// wrappers go through [`send`](Self::send) or [`send_json`](Self::send_json).
pub struct Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	/// HTTP transport used for every backend call, including refreshes.
	pub http_client: Arc<C>,
	/// Validated configuration.
	pub config: Arc<GatewayConfig>,
	/// Credential store for the current session.
	pub store: TokenStore,
	/// Single-flight refresh coordinator shared by every request.
	pub coordinator: Arc<RefreshCoordinator>,
	session: Arc<SessionSignal>,
}
impl<C> Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a gateway around a caller-provided transport, storage backend, and clock.
	pub fn with_http_client(
		config: GatewayConfig,
		storage: Arc<dyn SessionStorage>,
		clock: Arc<dyn Clock>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		let config = Arc::new(config);
		let http_client = http_client.into();
		let store = TokenStore::new(storage, clock).with_refresh_window(config.refresh_window);
		let refresher: Arc<dyn TokenRefresher> =
			Arc::new(BackendRefresher::new(http_client.clone(), config.clone()));
		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), refresher));

		Self { http_client, config, store, coordinator, session: Default::default() }
	}

	/// Registers an observer for session invalidation events.
	pub fn with_session_observer(self, observer: Arc<dyn SessionObserver>) -> Self {
		self.subscribe(observer);

		self
	}

	/// Registers an observer on an existing gateway (shared by every clone).
	pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
		self.session.subscribe(observer);
	}

	/// Makes sure a fresh access token is stored, joining any in-flight refresh.
	pub async fn ensure_fresh_token(&self) -> bool {
		self.coordinator.ensure_fresh_token().await
	}

	/// Raw read of the stored access token.
	pub fn access_token(&self) -> Result<Option<TokenSecret>> {
		Ok(self.store.access_token()?)
	}

	/// Returns `true` while a session exists whose refresh token is still presentable.
	///
	/// An expired refresh window clears the store as a side effect.
	pub fn is_logged_in(&self) -> Result<bool> {
		Ok(self.store.refresh_token()?.is_some())
	}

	/// Drops the stored session without contacting the backend. Idempotent.
	///
	/// Requests failing afterwards because of the missing session do not notify observers.
	pub fn clear(&self) -> Result<()> {
		self.store.clear()?;
		self.session.silence();

		Ok(())
	}

	/// Shared refresh counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.coordinator.metrics()
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient> {
	/// Creates a gateway over a reqwest transport using wall-clock time.
	///
	/// The transport applies the configured request timeout to every call.
	pub fn new(config: GatewayConfig, storage: Arc<dyn SessionStorage>) -> Self {
		let http_client = ReqwestHttpClient::default().with_timeout(config.request_timeout);

		Self::with_http_client(config, storage, Arc::new(SystemClock), http_client)
	}
}
impl<C> Clone for Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			config: self.config.clone(),
			store: self.store.clone(),
			coordinator: self.coordinator.clone(),
			session: self.session.clone(),
		}
	}
}
impl<C> Debug for Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("base_url", &self.config.base_url.as_str())
			.field("store", &self.store)
			.field("coordinator", &self.coordinator)
			.finish()
	}
}
