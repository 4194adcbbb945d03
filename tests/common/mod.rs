//! Shared fixtures for gateway integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::MockServer;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime, macros::datetime};
// self
use storefront_gateway::{
	auth::CredentialRecord,
	clock::ManualClock,
	gateway::{GatewayConfig, InvalidationReason, ReqwestGateway},
	http::ReqwestHttpClient,
	store::MemoryStorage,
	url::Url,
};

/// Login instant shared by every scenario.
pub const T0: OffsetDateTime = datetime!(2025-06-01 08:00 UTC);
/// Access token lifetime issued by the fake backend.
pub const TTL: i64 = 3_600;

/// Gateway wired to a mock server, a manual clock, and an observer log.
pub struct Harness {
	pub gateway: ReqwestGateway,
	pub clock: ManualClock,
	pub storage: Arc<MemoryStorage>,
	pub invalidations: Arc<Mutex<Vec<InvalidationReason>>>,
}
impl Harness {
	/// Builds a gateway rooted at `<server>/api/` with the clock parked at [`T0`].
	pub fn new(server: &MockServer) -> Self {
		let base_url =
			Url::parse(&server.url("/api/")).expect("Mock base URL should parse successfully.");
		let config =
			GatewayConfig::builder(base_url).build().expect("Default gateway config should build.");
		let clock = ManualClock::new(T0);
		let storage = Arc::new(MemoryStorage::default());
		let invalidations = Arc::new(Mutex::new(Vec::new()));
		let seen = invalidations.clone();
		let gateway = ReqwestGateway::with_http_client(
			config,
			storage.clone(),
			Arc::new(clock.clone()),
			ReqwestHttpClient::default(),
		)
		.with_session_observer(Arc::new(move |reason: InvalidationReason| {
			seen.lock().push(reason);
		}));

		Self { gateway, clock, storage, invalidations }
	}

	/// Stores `access`/`refresh` as if a login happened at [`T0`].
	pub fn seed(&self, access: &str, refresh: &str) {
		self.gateway
			.store
			.save(&CredentialRecord::new(access, refresh, T0, TTL))
			.expect("Seeding credentials should succeed.");
	}

	/// Moves the clock to `T0 + offset`.
	pub fn at(&self, offset: Duration) {
		self.clock.set(T0 + offset);
	}

	pub fn invalidations(&self) -> Vec<InvalidationReason> {
		self.invalidations.lock().clone()
	}

	pub fn stored_access(&self) -> Option<String> {
		self.gateway
			.access_token()
			.expect("Reading the access token should succeed.")
			.map(|token| token.expose().to_owned())
	}
}

/// Success envelope wrapping a token payload issued at `srv_create_time`.
pub fn token_body(access: &str, refresh: &str, srv_create_time: &str) -> String {
	serde_json::json!({
		"code": 0,
		"msg": "success",
		"request_id": "req-token",
		"data": {
			"access_token": access,
			"refresh_token": refresh,
			"duration": TTL,
			"srv_create_time": srv_create_time,
		},
	})
	.to_string()
}

/// Success envelope carrying `data`.
pub fn ok_body(data: serde_json::Value) -> String {
	serde_json::json!({ "code": 0, "msg": "success", "data": data }).to_string()
}

/// Failure envelope with a business `code`.
pub fn error_body(code: i64, msg: &str) -> String {
	serde_json::json!({ "code": code, "msg": msg, "request_id": "req-fail" }).to_string()
}
