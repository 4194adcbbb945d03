//! Single-flight token refresh coordination.
//!
//! The [`RefreshCoordinator`] guarantees that at most one refresh call is outstanding no
//! matter how many requests discover an expired token at once. The first caller becomes
//! the leader and talks to the backend; everyone arriving while `refreshing` is set parks
//! on a one-shot channel and receives the leader's outcome. The critical section is keyed
//! on the coordinator's flag rather than on the token value, because the token changes
//! underneath the refresh. Successful refreshes replace the stored record; failures clear
//! it so the session reads as logged out.

mod metrics;

pub use self::metrics::RefreshMetrics;

// std
use std::mem;
// crates.io
use ::http::{Method, StatusCode};
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	api::{self, TokenInfo},
	auth::{CredentialRecord, TokenSecret},
	error::ConfigError,
	gateway::GatewayConfig,
	http::{HttpRequest, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{CompareAndSwapOutcome, TokenStore},
};

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<CredentialRecord>> + 'a + Send>>;

/// Exchanges a refresh token for a new credential record.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Calls the backend's refresh endpoint with `refresh_token`.
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a>;
}

/// [`TokenRefresher`] that calls the configured refresh endpoint over an [`HttpTransport`].
pub struct BackendRefresher<C>
where
	C: ?Sized + HttpTransport,
{
	http_client: Arc<C>,
	config: Arc<GatewayConfig>,
}
impl<C> BackendRefresher<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a refresher sharing the gateway's transport and configuration.
	pub fn new(http_client: Arc<C>, config: Arc<GatewayConfig>) -> Self {
		Self { http_client, config }
	}

	fn build_request(&self, refresh_token: &TokenSecret) -> Result<HttpRequest> {
		let mut url = self.config.endpoints.refresh.clone();

		url.query_pairs_mut().append_pair("refresh_token", refresh_token.expose());

		let mut request = ::http::Request::builder()
			.method(Method::GET)
			.uri(url.as_str())
			.body(Vec::new())
			.map_err(ConfigError::from)?;

		request.headers_mut().extend(self.config.default_headers.clone());

		Ok(request)
	}
}
impl<C> TokenRefresher for BackendRefresher<C>
where
	C: ?Sized + HttpTransport,
{
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
		Box::pin(async move {
			let request = self.build_request(refresh_token)?;
			let response = self.http_client.execute(request).await?;

			if response.status() == StatusCode::UNAUTHORIZED {
				return Err(Error::InvalidCredentials {
					reason: "Refresh endpoint rejected the refresh token".into(),
				});
			}

			let info = api::read_envelope::<TokenInfo>(&response)
				.and_then(|envelope| envelope.into_data())
				.map_err(|err| match err {
					Error::Business { code, message, .. } => Error::InvalidCredentials {
						reason: if message.is_empty() { format!("code {code}") } else { message },
					},
					other => other,
				})?;

			Ok(CredentialRecord::from_token_info(info)?)
		})
	}
}

#[derive(Default)]
struct CoordinatorState {
	refreshing: bool,
	waiters: Vec<oneshot::Sender<bool>>,
}

/// Ensures at most one refresh call is in flight and fans its outcome out to every caller.
pub struct RefreshCoordinator {
	state: Mutex<CoordinatorState>,
	store: TokenStore,
	refresher: Arc<dyn TokenRefresher>,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshCoordinator {
	/// Creates a coordinator that persists refreshed records into `store`.
	pub fn new(store: TokenStore, refresher: Arc<dyn TokenRefresher>) -> Self {
		Self { state: Default::default(), store, refresher, metrics: Default::default() }
	}

	/// Shared counters for refresh cycles.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns `true` while a refresh call is outstanding.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().refreshing
	}

	/// Number of callers parked on the in-flight refresh.
	pub fn waiting(&self) -> usize {
		self.state.lock().waiters.len()
	}

	/// Makes sure the store holds a fresh access token, refreshing at most once per cycle.
	///
	/// Resolves `true` when the refresh cycle this caller started or joined stored a new
	/// record, `false` when it failed (the store is cleared in that case). A caller whose
	/// leader is cancelled mid-refresh retries and may lead the next cycle itself.
	pub async fn ensure_fresh_token(&self) -> bool {
		loop {
			let waiter = {
				let mut state = self.state.lock();

				if state.refreshing {
					let (tx, rx) = oneshot::channel();

					state.waiters.push(tx);

					Some(rx)
				} else {
					state.refreshing = true;

					None
				}
			};
			let Some(waiter) = waiter else {
				break;
			};

			self.metrics.record_joined();

			match waiter.await {
				Ok(fresh) => return fresh,
				Err(_) => tracing::debug!("refresh leader was cancelled; retrying"),
			}
		}

		let cycle = RefreshCycle { coordinator: self, settled: false };
		let fresh = FlowSpan::new(FlowKind::Refresh, "ensure_fresh_token")
			.instrument(self.refresh_once())
			.await;

		cycle.settle(fresh);

		fresh
	}

	async fn refresh_once(&self) -> bool {
		let refresh_token = match self.store.refresh_token() {
			Ok(Some(token)) => token,
			Ok(None) => {
				tracing::debug!("no presentable refresh token; session cannot be refreshed");

				return self.fail();
			},
			Err(err) => {
				tracing::warn!(error = %err, "failed to read refresh token");

				return self.fail();
			},
		};

		self.metrics.record_attempt();
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Attempt);

		let record = match self.refresher.refresh(&refresh_token).await {
			Ok(record) => record,
			Err(err) => {
				tracing::warn!(error = %err, "token refresh failed");

				return self.fail();
			},
		};

		match self.store.compare_and_swap_refresh(&refresh_token, &record) {
			Ok(CompareAndSwapOutcome::Updated) => {},
			Ok(outcome) => return self.discard(outcome),
			Err(err) => {
				tracing::warn!(error = %err, "failed to persist refreshed credentials");

				return self.fail();
			},
		}

		tracing::debug!(ttl = record.access_ttl_seconds, "access token refreshed");
		self.metrics.record_success();
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Success);

		true
	}

	fn fail(&self) -> bool {
		if let Err(err) = self.store.clear() {
			tracing::warn!(error = %err, "failed to clear credentials after refresh failure");
		}

		self.metrics.record_failure();
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);

		false
	}

	/// The session was cleared or replaced while the refresh was in flight; the refreshed
	/// record is dropped and whatever is stored now stands.
	fn discard(&self, outcome: CompareAndSwapOutcome) -> bool {
		tracing::debug!(
			?outcome,
			"session changed during refresh; discarding refreshed credentials"
		);
		self.metrics.record_discarded();
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);

		match outcome {
			CompareAndSwapOutcome::Mismatch =>
				self.store.valid_access_token().is_ok_and(|token| token.is_some()),
			_ => false,
		}
	}

	/// Resets the flag and drains the waiters in one critical section, so a waiter never
	/// observes the outcome of a later cycle.
	fn drain(&self) -> Vec<oneshot::Sender<bool>> {
		let mut state = self.state.lock();

		state.refreshing = false;

		mem::take(&mut state.waiters)
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("RefreshCoordinator")
			.field("refreshing", &state.refreshing)
			.field("waiters", &state.waiters.len())
			.field("metrics", &self.metrics)
			.finish()
	}
}

/// Leader-side guard; dropping it unsettled (cancellation, panic) releases the waiters.
struct RefreshCycle<'a> {
	coordinator: &'a RefreshCoordinator,
	settled: bool,
}
impl RefreshCycle<'_> {
	fn settle(mut self, fresh: bool) {
		self.settled = true;

		for waiter in self.coordinator.drain() {
			let _ = waiter.send(fresh);
		}
	}
}
impl Drop for RefreshCycle<'_> {
	fn drop(&mut self) {
		if !self.settled {
			// Dropping the senders wakes every waiter with a closed channel.
			drop(self.coordinator.drain());
		}
	}
}
