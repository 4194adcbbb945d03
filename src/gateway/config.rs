//! Gateway configuration and its validating builder.

// std
use std::time::Duration as StdDuration;
// crates.io
use ::http::{HeaderMap, HeaderName, HeaderValue};
// self
use crate::{
	_prelude::*,
	api::TOKEN_INVALID_CODE,
	error::ConfigError,
	store::DEFAULT_REFRESH_WINDOW,
};

/// Default header carrying the access token.
pub const DEFAULT_CREDENTIAL_HEADER: &str = "go-mall-token";
/// Default proactive refresh threshold.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::seconds(300);
/// Default per-request transport timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(15);

/// Errors raised while validating a [`GatewayConfig`].
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum GatewayConfigError {
	/// Base URL cannot have relative paths joined onto it.
	#[error("Base URL `{url}` cannot be used as a base for endpoint paths.")]
	UnsupportedBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// A session endpoint path does not resolve against the base URL.
	#[error("The {endpoint} endpoint path `{path}` is invalid.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed validation.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Header name or value is not valid HTTP.
	#[error("Header `{name}` is not a valid HTTP header.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Proactive refresh threshold is negative.
	#[error("The refresh threshold must not be negative.")]
	NegativeRefreshThreshold,
	/// Refresh window is zero or negative.
	#[error("The refresh window must be positive.")]
	NonPositiveRefreshWindow,
	/// Request timeout is zero or negative.
	#[error("The request timeout must be positive.")]
	NonPositiveTimeout,
}

/// Resolved locations of the session endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEndpoints {
	/// `POST` credential exchange.
	pub login: Url,
	/// `GET` token refresh; the refresh token travels as the `refresh_token` query parameter.
	pub refresh: Url,
	/// `DELETE` session teardown.
	pub logout: Url,
}

/// Validated gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
	/// Base URL every request path is resolved against; always ends with `/`.
	pub base_url: Url,
	/// Session endpoint locations.
	pub endpoints: SessionEndpoints,
	/// Header that carries the access token.
	pub credential_header: HeaderName,
	/// Headers attached to every request, including refresh and login calls.
	pub default_headers: HeaderMap,
	/// Refresh proactively once less than this much access lifetime remains.
	pub refresh_threshold: Duration,
	/// Caps the proactive threshold at half the access token lifetime.
	pub cap_threshold_at_half_ttl: bool,
	/// Client-side approximation of the refresh token lifetime.
	pub refresh_window: Duration,
	/// Business code that marks the access token as rejected, if the backend uses one.
	pub token_invalid_code: Option<i64>,
	/// Per-request transport timeout.
	pub request_timeout: Option<StdDuration>,
}
impl GatewayConfig {
	/// Returns a builder rooted at `base_url`.
	pub fn builder(base_url: Url) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(base_url)
	}

	/// Resolves a request path against the base URL.
	///
	/// Leading slashes are ignored so `"/user/info"` and `"user/info"` both stay under the
	/// base path.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}

	/// Returns `true` when `url` targets the refresh endpoint (query ignored).
	pub fn is_refresh_url(&self, url: &Url) -> bool {
		url.scheme() == self.endpoints.refresh.scheme()
			&& url.host_str() == self.endpoints.refresh.host_str()
			&& url.port_or_known_default() == self.endpoints.refresh.port_or_known_default()
			&& url.path() == self.endpoints.refresh.path()
	}

	/// Proactive threshold applied to a token with `access_ttl_seconds` of lifetime.
	///
	/// Equals the configured threshold unless
	/// [`cap_threshold_at_half_ttl`](Self::cap_threshold_at_half_ttl) is set, in which case
	/// tokens shorter than the threshold are not refreshed on every request.
	pub fn effective_refresh_threshold(&self, access_ttl_seconds: i64) -> i64 {
		let threshold = self.refresh_threshold.whole_seconds();

		if self.cap_threshold_at_half_ttl {
			threshold.min(access_ttl_seconds.max(0) / 2)
		} else {
			threshold
		}
	}
}

/// Builder for [`GatewayConfig`] values.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	/// Base URL for every request path.
	pub base_url: Url,
	/// Login endpoint path.
	pub login_path: String,
	/// Refresh endpoint path.
	pub refresh_path: String,
	/// Logout endpoint path.
	pub logout_path: String,
	/// Header carrying the access token.
	pub credential_header: String,
	/// Headers attached to every request.
	pub default_headers: Vec<(String, String)>,
	/// Proactive refresh threshold.
	pub refresh_threshold: Duration,
	/// Whether the threshold is capped at half the access token lifetime.
	pub cap_threshold_at_half_ttl: bool,
	/// Refresh token lifetime approximation.
	pub refresh_window: Duration,
	/// Business code treated like HTTP 401.
	pub token_invalid_code: Option<i64>,
	/// Per-request transport timeout.
	pub request_timeout: Option<Duration>,
}
impl GatewayConfigBuilder {
	/// Creates a builder seeded with the storefront backend's defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			login_path: "user/login".into(),
			refresh_path: "user/token/refresh".into(),
			logout_path: "user/logout".into(),
			credential_header: DEFAULT_CREDENTIAL_HEADER.into(),
			default_headers: vec![("platform".into(), "H5".into())],
			refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
			cap_threshold_at_half_ttl: false,
			refresh_window: DEFAULT_REFRESH_WINDOW,
			token_invalid_code: Some(TOKEN_INVALID_CODE),
			request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
		}
	}

	/// Overrides the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the logout endpoint path.
	pub fn logout_path(mut self, path: impl Into<String>) -> Self {
		self.logout_path = path.into();

		self
	}

	/// Overrides the header that carries the access token.
	pub fn credential_header(mut self, name: impl Into<String>) -> Self {
		self.credential_header = name.into();

		self
	}

	/// Adds (or replaces) a header attached to every request.
	pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		let name = name.into();

		self.default_headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
		self.default_headers.push((name, value.into()));

		self
	}

	/// Drops every default header, including the built-in `platform` header.
	pub fn clear_default_headers(mut self) -> Self {
		self.default_headers.clear();

		self
	}

	/// Overrides the proactive refresh threshold (defaults to 300 seconds).
	pub fn refresh_threshold(mut self, threshold: Duration) -> Self {
		self.refresh_threshold = threshold;

		self
	}

	/// Caps the proactive threshold at half of each token's lifetime (off by default).
	pub fn cap_threshold_at_half_ttl(mut self, enabled: bool) -> Self {
		self.cap_threshold_at_half_ttl = enabled;

		self
	}

	/// Overrides the refresh window (defaults to 10 days).
	pub fn refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = window;

		self
	}

	/// Overrides the business code treated like HTTP 401; `None` disables the check.
	pub fn token_invalid_code(mut self, code: Option<i64>) -> Self {
		self.token_invalid_code = code;

		self
	}

	/// Overrides the per-request timeout; `None` defers to the transport.
	pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Validates the builder and produces a [`GatewayConfig`].
	pub fn build(self) -> Result<GatewayConfig, GatewayConfigError> {
		if self.refresh_threshold.is_negative() {
			return Err(GatewayConfigError::NegativeRefreshThreshold);
		}
		if !self.refresh_window.is_positive() {
			return Err(GatewayConfigError::NonPositiveRefreshWindow);
		}

		let request_timeout = match self.request_timeout {
			Some(timeout) if !timeout.is_positive() =>
				return Err(GatewayConfigError::NonPositiveTimeout),
			Some(timeout) => Some(
				StdDuration::try_from(timeout)
					.map_err(|_| GatewayConfigError::NonPositiveTimeout)?,
			),
			None => None,
		};
		let base_url = normalize_base(self.base_url)?;
		let endpoints = SessionEndpoints {
			login: resolve_endpoint(&base_url, "login", &self.login_path)?,
			refresh: resolve_endpoint(&base_url, "refresh", &self.refresh_path)?,
			logout: resolve_endpoint(&base_url, "logout", &self.logout_path)?,
		};
		let credential_header = HeaderName::try_from(self.credential_header.as_str())
			.map_err(|_| GatewayConfigError::InvalidHeader { name: self.credential_header })?;
		let mut default_headers = HeaderMap::new();

		for (name, value) in self.default_headers {
			let header_name = HeaderName::try_from(name.as_str());
			let header_value = HeaderValue::try_from(value.as_str());

			match (header_name, header_value) {
				(Ok(header_name), Ok(header_value)) => {
					default_headers.insert(header_name, header_value);
				},
				_ => return Err(GatewayConfigError::InvalidHeader { name }),
			}
		}

		Ok(GatewayConfig {
			base_url,
			endpoints,
			credential_header,
			default_headers,
			refresh_threshold: self.refresh_threshold,
			cap_threshold_at_half_ttl: self.cap_threshold_at_half_ttl,
			refresh_window: self.refresh_window,
			token_invalid_code: self.token_invalid_code,
			request_timeout,
		})
	}
}

fn normalize_base(mut base_url: Url) -> Result<Url, GatewayConfigError> {
	if base_url.cannot_be_a_base() {
		return Err(GatewayConfigError::UnsupportedBaseUrl { url: base_url.to_string() });
	}
	if !base_url.path().ends_with('/') {
		let path = format!("{}/", base_url.path());

		base_url.set_path(&path);
	}

	base_url.set_query(None);
	base_url.set_fragment(None);

	Ok(base_url)
}

fn resolve_endpoint(
	base_url: &Url,
	endpoint: &'static str,
	path: &str,
) -> Result<Url, GatewayConfigError> {
	base_url.join(path.trim_start_matches('/')).map_err(|source| {
		GatewayConfigError::InvalidEndpoint { endpoint, path: path.to_owned(), source }
	})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse fixture URL.")
	}

	#[test]
	fn defaults_follow_storefront_backend() {
		let config = GatewayConfig::builder(url("https://shop.example.com/api"))
			.build()
			.expect("Default configuration should be valid.");

		assert_eq!(config.base_url.as_str(), "https://shop.example.com/api/");
		assert_eq!(config.endpoints.login.as_str(), "https://shop.example.com/api/user/login");
		assert_eq!(
			config.endpoints.refresh.as_str(),
			"https://shop.example.com/api/user/token/refresh"
		);
		assert_eq!(config.credential_header.as_str(), "go-mall-token");
		assert_eq!(config.default_headers.get("platform").map(|v| v.as_bytes()), Some(&b"H5"[..]));
		assert_eq!(config.refresh_threshold, Duration::seconds(300));
		assert_eq!(config.refresh_window, Duration::days(10));
		assert_eq!(config.token_invalid_code, Some(TOKEN_INVALID_CODE));
		assert_eq!(config.request_timeout, Some(StdDuration::from_secs(15)));
	}

	#[test]
	fn resolve_keeps_requests_under_base_path() {
		let config = GatewayConfig::builder(url("https://shop.example.com/api/"))
			.build()
			.expect("Configuration should be valid.");
		let resolved = config.resolve("/user/info").expect("Request path should resolve.");

		assert_eq!(resolved.as_str(), "https://shop.example.com/api/user/info");

		let mut refresh = config.resolve("user/token/refresh").expect("Refresh path should resolve.");

		refresh.query_pairs_mut().append_pair("refresh_token", "R1");

		assert!(config.is_refresh_url(&refresh));
		assert!(!config.is_refresh_url(&resolved));
	}

	#[test]
	fn builder_rejects_invalid_policies() {
		let base = url("https://shop.example.com/");

		assert_eq!(
			GatewayConfig::builder(base.clone())
				.refresh_threshold(Duration::seconds(-1))
				.build()
				.expect_err("Negative thresholds should be rejected."),
			GatewayConfigError::NegativeRefreshThreshold
		);
		assert_eq!(
			GatewayConfig::builder(base.clone())
				.refresh_window(Duration::ZERO)
				.build()
				.expect_err("Empty refresh windows should be rejected."),
			GatewayConfigError::NonPositiveRefreshWindow
		);
		assert_eq!(
			GatewayConfig::builder(base.clone())
				.request_timeout(Some(Duration::ZERO))
				.build()
				.expect_err("Zero timeouts should be rejected."),
			GatewayConfigError::NonPositiveTimeout
		);
		assert!(matches!(
			GatewayConfig::builder(base)
				.default_header("bad header", "x")
				.build()
				.expect_err("Invalid header names should be rejected."),
			GatewayConfigError::InvalidHeader { .. }
		));
		assert!(matches!(
			GatewayConfig::builder(url("mailto:shop@example.com"))
				.build()
				.expect_err("Opaque URLs should be rejected."),
			GatewayConfigError::UnsupportedBaseUrl { .. }
		));
	}

	#[test]
	fn effective_threshold_uses_configured_value_by_default() {
		let config = GatewayConfig::builder(url("https://shop.example.com/"))
			.refresh_threshold(Duration::seconds(400))
			.build()
			.expect("Configuration should be valid.");

		assert!(!config.cap_threshold_at_half_ttl);
		assert_eq!(config.effective_refresh_threshold(600), 400);
		assert_eq!(config.effective_refresh_threshold(120), 400);
	}

	#[test]
	fn effective_threshold_caps_at_half_lifetime_when_enabled() {
		let config = GatewayConfig::builder(url("https://shop.example.com/"))
			.cap_threshold_at_half_ttl(true)
			.build()
			.expect("Configuration should be valid.");

		assert_eq!(config.effective_refresh_threshold(3600), 300);
		assert_eq!(config.effective_refresh_threshold(120), 60);
		assert_eq!(config.effective_refresh_threshold(-5), 0);
	}
}
