//! Provider and cache configuration with validation.
//!
//! Two separately typed option sets are exposed: [`ProviderConfig`] describes how keys are
//! fetched for an issuer, [`CacheConfig`] describes how the caching layer keeps them fresh.

// std
use std::mem;
// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{_prelude::*, security};

/// TTL applied when the configured TTL is zero.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
/// Independent deadline bounding a background refresh.
pub const DEFAULT_BACKGROUND_TIMEOUT: Duration = Duration::from_secs(15);
/// Default size guard (1 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 1_048_576;
/// Maximum redirect depth followed by the default HTTP client.
pub const MAX_REDIRECTS: usize = 10;

/// Granularity of the refresh gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshScope {
	/// One in-flight refresh across every issuer served by the cache.
	#[default]
	Global,
	/// One in-flight refresh per issuer.
	PerIssuer,
}

/// Describes where and how signing keys are fetched for an issuer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
	/// Issuer URL; its host is the cache key and discovery runs against it.
	pub issuer_url: Url,
	/// Fixed JWKS endpoint that skips discovery when set.
	#[serde(default)]
	pub jwks_uri: Option<Url>,
	/// Whether HTTPS is required for discovery and key-set retrieval.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Optional suffix allowlist applied to the resolved JWKS host.
	#[serde(default, deserialize_with = "crate::security::deserialize_allowed_domains")]
	pub allowed_domains: Vec<String>,
	/// Maximum size allowed for key-set payloads in bytes.
	#[serde(default = "default_max_response_bytes")]
	pub max_response_bytes: u64,
	/// Per-request timeout applied to each outbound call.
	#[serde(default)]
	pub request_timeout: Option<Duration>,
}
impl ProviderConfig {
	/// Construct a configuration for the given issuer with default settings.
	pub fn new(issuer_url: impl AsRef<str>) -> Result<Self> {
		let issuer_url = Url::parse(issuer_url.as_ref())?;

		Ok(Self {
			issuer_url,
			jwks_uri: None,
			require_https: true,
			allowed_domains: Vec::new(),
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
			request_timeout: None,
		})
	}

	/// Fetch keys from a fixed endpoint instead of running discovery.
	pub fn with_jwks_uri(mut self, jwks_uri: impl AsRef<str>) -> Result<Self> {
		self.jwks_uri = Some(Url::parse(jwks_uri.as_ref())?);

		Ok(self)
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Replace the JWKS host allowlist.
	pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.allowed_domains = security::normalize_allowlist(domains.into_iter().map(Into::into));

		self
	}

	/// Bound each outbound request by the given timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);

		self
	}

	/// Canonicalise the domain allowlist in-place.
	pub fn normalize_allowed_domains(&mut self) {
		let domains = mem::take(&mut self.allowed_domains);

		self.allowed_domains = security::normalize_allowlist(domains);
	}

	/// Issuer identity used as the cache key.
	pub fn issuer_identity(&self) -> Result<&str> {
		issuer_identity(&self.issuer_url)
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		self.issuer_identity()?;

		if self.require_https {
			security::enforce_https(&self.issuer_url)?;

			if let Some(jwks_uri) = &self.jwks_uri {
				security::enforce_https(jwks_uri)?;
			}
		}

		if let Some(jwks_uri) = &self.jwks_uri {
			let Some(host) = jwks_uri.host_str() else {
				return Err(Error::Validation {
					field: "jwks_uri",
					reason: "Must include a host component.".into(),
				});
			};

			if !security::host_is_allowed(host, &self.allowed_domains) {
				return Err(Error::Validation {
					field: "jwks_uri",
					reason: "Host is not within the allowed_domains allowlist.".into(),
				});
			}
		}

		if self.max_response_bytes == 0 {
			return Err(Error::Validation {
				field: "max_response_bytes",
				reason: "Must be greater than zero.".into(),
			});
		}
		if let Some(timeout) = self.request_timeout
			&& timeout.is_zero()
		{
			return Err(Error::Validation {
				field: "request_timeout",
				reason: "Must be greater than zero when set.".into(),
			});
		}

		Ok(())
	}
}

/// Controls how the caching layer keeps key sets fresh.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
	/// Freshness window of a cached key set; zero selects [`DEFAULT_TTL`].
	#[serde(default)]
	pub ttl: Duration,
	/// Block callers on refresh instead of serving stale data.
	#[serde(default)]
	pub synchronous_refresh: bool,
	/// Deadline applied to background refreshes.
	#[serde(default = "default_background_timeout")]
	pub background_timeout: Duration,
	/// Whether the refresh gate spans the whole cache or a single issuer.
	#[serde(default)]
	pub refresh_scope: RefreshScope,
}
impl CacheConfig {
	/// Create a configuration with the given TTL; zero selects [`DEFAULT_TTL`].
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, ..Default::default() }
	}

	/// Choose whether expired entries are refreshed on the caller's task.
	pub fn with_synchronous_refresh(mut self, synchronous_refresh: bool) -> Self {
		self.synchronous_refresh = synchronous_refresh;

		self
	}

	/// Override the deadline applied to background refreshes.
	pub fn with_background_timeout(mut self, timeout: Duration) -> Self {
		self.background_timeout = timeout;

		self
	}

	/// Select the refresh gate granularity.
	pub fn with_refresh_scope(mut self, scope: RefreshScope) -> Self {
		self.refresh_scope = scope;

		self
	}

	/// TTL after substituting the default for zero.
	pub fn effective_ttl(&self) -> Duration {
		if self.ttl.is_zero() { DEFAULT_TTL } else { self.ttl }
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.background_timeout.is_zero() {
			return Err(Error::Validation {
				field: "background_timeout",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			ttl: DEFAULT_TTL,
			synchronous_refresh: false,
			background_timeout: DEFAULT_BACKGROUND_TIMEOUT,
			refresh_scope: RefreshScope::Global,
		}
	}
}

/// Derive the cache key for an issuer: its host component.
pub fn issuer_identity(issuer_url: &Url) -> Result<&str> {
	issuer_url.host_str().filter(|host| !host.is_empty()).ok_or_else(|| Error::Validation {
		field: "issuer_url",
		reason: "Must include a host component.".into(),
	})
}

fn default_true() -> bool {
	true
}

fn default_max_response_bytes() -> u64 {
	DEFAULT_MAX_RESPONSE_BYTES
}

fn default_background_timeout() -> Duration {
	DEFAULT_BACKGROUND_TIMEOUT
}
