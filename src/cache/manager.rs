//! Caching provider serving key sets per issuer and coordinating their refresh.

// std
use std::collections::HashMap;
// crates.io
use jsonwebtoken::jwk::JwkSet;
use serde::Serialize;
use tokio::{
	sync::{OwnedSemaphorePermit, RwLock},
	time,
};
use url::Url;
// self
use crate::{
	_prelude::*,
	cache::{entry::CacheEntry, gate::RefreshGate},
	config::{self, CacheConfig, ProviderConfig},
	metrics::{self, ProviderMetrics, ProviderMetricsSnapshot},
	provider::{KeyFetcher, KeySource, Provider},
};

/// Serves key sets from an issuer-keyed TTL cache in front of a [`KeyFetcher`].
///
/// Expired entries are refreshed behind a [`RefreshGate`]; in asynchronous mode the caller gets
/// the stale set immediately while a background task fetches, in synchronous mode the caller
/// waits for the fetch and sees its error. Cloning is cheap and shares the cache.
#[derive(Debug)]
pub struct CachingProvider<F = Provider> {
	inner: Arc<Inner<F>>,
}
impl<F> CachingProvider<F>
where
	F: KeyFetcher,
{
	/// Wrap `fetcher`, serving `issuer_url` through [`KeySource::key_set`].
	pub fn new(fetcher: F, issuer_url: Url, config: CacheConfig) -> Result<Self> {
		config.validate()?;
		config::issuer_identity(&issuer_url)?;

		let ttl = config.effective_ttl();

		Ok(Self {
			inner: Arc::new(Inner {
				fetcher,
				issuer_url,
				ttl,
				gate: RefreshGate::new(config.refresh_scope),
				config,
				cache: RwLock::new(HashMap::new()),
				metrics: ProviderMetrics::new(),
			}),
		})
	}

	/// Issuer served by [`KeySource::key_set`].
	pub fn issuer_url(&self) -> &Url {
		&self.inner.issuer_url
	}

	/// Cache configuration in effect.
	pub fn config(&self) -> &CacheConfig {
		&self.inner.config
	}

	/// TTL applied to freshly fetched key sets.
	pub fn ttl(&self) -> Duration {
		self.inner.ttl
	}

	/// Underlying fetcher.
	pub fn fetcher(&self) -> &F {
		&self.inner.fetcher
	}

	/// Counters accumulated by this cache.
	pub fn metrics(&self) -> ProviderMetricsSnapshot {
		self.inner.metrics.snapshot()
	}

	/// Resolve the key set for `issuer`, fetching only when nothing usable is cached.
	#[tracing::instrument(skip_all, fields(issuer = %issuer))]
	pub async fn get(&self, issuer: &Url) -> Result<Arc<JwkSet>> {
		let identity = config::issuer_identity(issuer)?.to_owned();
		let cache = self.inner.cache.read().await;
		let Some(entry) = cache.get(&identity) else {
			drop(cache);

			tracing::debug!("cache empty; performing initial fetch");

			return self.inner.resolve_miss(issuer, &identity).await;
		};
		let now = Instant::now();

		if !entry.is_expired(now) {
			let jwks = entry.jwks().clone();

			drop(cache);
			self.inner.observe_hit(&identity, false);

			return Ok(jwks);
		}

		let stale = entry.jwks().clone();
		let Some(permit) = self.inner.gate.try_acquire(&identity) else {
			drop(cache);

			tracing::debug!("refresh already in flight; serving stale key set");

			self.inner.observe_coalesced(&identity);
			self.inner.observe_hit(&identity, true);

			return Ok(stale);
		};

		drop(cache);

		if self.inner.config.synchronous_refresh {
			tracing::debug!("entry expired; refreshing synchronously");

			let outcome =
				self.inner.refresh_key(issuer, &identity, RefreshMode::Synchronous).await;

			drop(permit);
			self.inner.observe_miss(&identity);

			return outcome.map(RefreshOutcome::into_jwks);
		}

		tracing::debug!("entry expired; serving stale key set while refreshing in background");

		self.spawn_background_refresh(issuer.clone(), identity.clone(), permit);
		self.inner.observe_hit(&identity, true);

		Ok(stale)
	}

	/// Report every cached issuer, sorted by identity.
	pub async fn status(&self) -> Vec<IssuerStatus> {
		let captured_at = Instant::now();
		let captured_at_wallclock = Utc::now();
		let mut statuses: Vec<IssuerStatus> = {
			let cache = self.inner.cache.read().await;

			cache
				.iter()
				.map(|(issuer, entry)| IssuerStatus {
					issuer: issuer.clone(),
					key_count: entry.jwks().keys.len(),
					refreshed_at: entry.refreshed_at(),
					expires_at: to_datetime(
						captured_at,
						captured_at_wallclock,
						entry.expires_at(),
					),
					expired: entry.is_expired(captured_at),
				})
				.collect()
		};

		statuses.sort_by(|a, b| a.issuer.cmp(&b.issuer));

		statuses
	}

	fn spawn_background_refresh(
		&self,
		issuer: Url,
		identity: String,
		permit: OwnedSemaphorePermit,
	) {
		let inner = self.inner.clone();
		let timeout = inner.config.background_timeout;

		tokio::spawn(async move {
			let _permit = permit;
			let refresh = inner.refresh_key(&issuer, &identity, RefreshMode::Background);
			let outcome = time::timeout(timeout, refresh).await;

			match outcome {
				Ok(Ok(_)) => tracing::debug!(issuer = %identity, "background refresh complete"),
				Ok(Err(err)) => tracing::warn!(
					issuer = %identity,
					error = %err,
					"background refresh failed; stale entry evicted"
				),
				Err(_) => {
					tracing::warn!(
						issuer = %identity,
						timeout = ?timeout,
						"background refresh timed out; stale entry evicted"
					);

					inner.observe_refresh_error(&identity);

					let _mutation = inner.gate.lock_mutation(&identity).await;

					inner.evict(&identity).await;
				},
			}
		});
	}
}
impl CachingProvider<Provider> {
	/// Wrap an HTTP provider, serving its configured issuer.
	pub fn from_provider(provider: Provider, config: CacheConfig) -> Result<Self> {
		let issuer_url = provider.issuer_url().clone();

		Self::new(provider, issuer_url, config)
	}

	/// Build the HTTP provider and the cache in front of it from their configurations.
	pub fn from_config(provider: ProviderConfig, cache: CacheConfig) -> Result<Self> {
		Self::from_provider(Provider::new(provider)?, cache)
	}
}
impl<F> Clone for CachingProvider<F> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<F> KeySource for CachingProvider<F>
where
	F: KeyFetcher,
{
	async fn key_set(&self) -> Result<Arc<JwkSet>> {
		self.get(&self.inner.issuer_url).await
	}
}

/// Status projection for one cached issuer.
#[derive(Clone, Debug, Serialize)]
pub struct IssuerStatus {
	/// Issuer identity (host) the entry is cached under.
	pub issuer: String,
	/// Number of keys in the cached set.
	pub key_count: usize,
	/// Timestamp of the refresh that produced the entry.
	pub refreshed_at: DateTime<Utc>,
	/// Expiration timestamp of the entry.
	pub expires_at: Option<DateTime<Utc>>,
	/// Whether the entry was stale when the status was captured.
	pub expired: bool,
}

#[derive(Debug)]
struct Inner<F> {
	fetcher: F,
	issuer_url: Url,
	config: CacheConfig,
	ttl: Duration,
	cache: RwLock<HashMap<String, CacheEntry>>,
	gate: RefreshGate,
	metrics: Arc<ProviderMetrics>,
}
impl<F> Inner<F>
where
	F: KeyFetcher,
{
	async fn resolve_miss(&self, issuer: &Url, identity: &str) -> Result<Arc<JwkSet>> {
		match self.refresh_key(issuer, identity, RefreshMode::Miss).await? {
			RefreshOutcome::Fetched(jwks) => {
				self.observe_miss(identity);

				Ok(jwks)
			},
			RefreshOutcome::Reused(jwks) => {
				self.observe_hit(identity, false);

				Ok(jwks)
			},
		}
	}

	/// Fetch and install a fresh entry for `identity`.
	///
	/// Only a background refresh evicts on failure; other modes leave the map untouched.
	#[tracing::instrument(skip(self, issuer), fields(issuer = %identity))]
	async fn refresh_key(
		&self,
		issuer: &Url,
		identity: &str,
		mode: RefreshMode,
	) -> Result<RefreshOutcome> {
		// Held across fetch and install so mutations within a gate lane never interleave.
		let _mutation = self.gate.lock_mutation(identity).await;

		// A concurrent miss may have installed the entry while this one waited.
		if let RefreshMode::Miss = mode {
			let now = Instant::now();
			let cached = {
				let cache = self.cache.read().await;

				cache.get(identity).filter(|entry| !entry.is_expired(now)).map(|e| e.jwks().clone())
			};

			if let Some(jwks) = cached {
				return Ok(RefreshOutcome::Reused(jwks));
			}
		}

		let started = Instant::now();

		match self.fetcher.fetch(issuer).await {
			Ok(jwks) => {
				let now = Instant::now();

				{
					let mut cache = self.cache.write().await;

					cache.insert(identity.to_owned(), CacheEntry::new(jwks.clone(), now, self.ttl));
				}

				self.observe_refresh_success(identity, started.elapsed());

				tracing::debug!(keys = jwks.keys.len(), ttl = ?self.ttl, "key set installed");

				Ok(RefreshOutcome::Fetched(jwks))
			},
			Err(err) => {
				self.observe_refresh_error(identity);

				if let RefreshMode::Background = mode {
					self.evict(identity).await;
				}

				Err(err)
			},
		}
	}

	// Callers must hold the mutation lock for `identity`.
	async fn evict(&self, identity: &str) {
		let removed = { self.cache.write().await.remove(identity).is_some() };

		if removed {
			metrics::record_eviction(identity);

			self.metrics.record_eviction();
		}
	}

	fn observe_hit(&self, issuer: &str, stale: bool) {
		metrics::record_resolve_hit(issuer, stale);

		self.metrics.record_hit(stale);
	}

	fn observe_miss(&self, issuer: &str) {
		metrics::record_resolve_miss(issuer);

		self.metrics.record_miss();
	}

	fn observe_coalesced(&self, issuer: &str) {
		metrics::record_refresh_coalesced(issuer);

		self.metrics.record_refresh_coalesced();
	}

	fn observe_refresh_success(&self, issuer: &str, duration: Duration) {
		metrics::record_refresh_success(issuer, duration);

		self.metrics.record_refresh_success(duration);
	}

	fn observe_refresh_error(&self, issuer: &str) {
		metrics::record_refresh_error(issuer);

		self.metrics.record_refresh_error();
	}
}

#[derive(Clone, Copy, Debug)]
enum RefreshMode {
	Miss,
	Synchronous,
	Background,
}

#[derive(Debug)]
enum RefreshOutcome {
	Fetched(Arc<JwkSet>),
	Reused(Arc<JwkSet>),
}
impl RefreshOutcome {
	fn into_jwks(self) -> Arc<JwkSet> {
		match self {
			Self::Fetched(jwks) | Self::Reused(jwks) => jwks,
		}
	}
}

/// Convert a monotonic instant into UTC relative to a paired capture point.
fn to_datetime(
	captured_at: Instant,
	captured_at_wallclock: DateTime<Utc>,
	instant: Instant,
) -> Option<DateTime<Utc>> {
	if let Some(delta) = instant.checked_duration_since(captured_at) {
		let chrono = TimeDelta::from_std(delta).ok()?;

		captured_at_wallclock.checked_add_signed(chrono)
	} else if let Some(delta) = captured_at.checked_duration_since(instant) {
		let chrono = TimeDelta::from_std(delta).ok()?;

		captured_at_wallclock.checked_sub_signed(chrono)
	} else {
		None
	}
}
