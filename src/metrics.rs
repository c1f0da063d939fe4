//! Metrics helpers and per-cache telemetry bookkeeping.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 2]>;

const METRIC_REQUESTS_TOTAL: &str = "jwks_provider_requests_total";
const METRIC_HITS_TOTAL: &str = "jwks_provider_hits_total";
const METRIC_STALE_TOTAL: &str = "jwks_provider_stale_total";
const METRIC_MISSES_TOTAL: &str = "jwks_provider_misses_total";
const METRIC_REFRESH_TOTAL: &str = "jwks_provider_refresh_total";
const METRIC_REFRESH_DURATION: &str = "jwks_provider_refresh_duration_seconds";
const METRIC_REFRESH_ERRORS: &str = "jwks_provider_refresh_errors_total";
const METRIC_REFRESH_COALESCED: &str = "jwks_provider_refresh_coalesced_total";
const METRIC_EVICTIONS_TOTAL: &str = "jwks_provider_evictions_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for a single caching provider.
#[derive(Debug, Default)]
pub struct ProviderMetrics {
	total_requests: AtomicU64,
	cache_hits: AtomicU64,
	stale_serves: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_errors: AtomicU64,
	refresh_coalesced: AtomicU64,
	evictions: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl ProviderMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a hit outcome.
	pub fn record_hit(&self, stale: bool) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
		if stale {
			self.stale_serves.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Record a miss outcome.
	pub fn record_miss(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a successful refresh and latency.
	pub fn record_refresh_success(&self, duration: Duration) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
		self.last_refresh_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record refresh failure.
	pub fn record_refresh_error(&self) {
		self.refresh_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Record an expired lookup that found another refresh already in flight.
	pub fn record_refresh_coalesced(&self) {
		self.refresh_coalesced.fetch_add(1, Ordering::Relaxed);
	}

	/// Record removal of a stale entry after a failed background refresh.
	pub fn record_eviction(&self) {
		self.evictions.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> ProviderMetricsSnapshot {
		let total_requests = self.total_requests.load(Ordering::Relaxed);
		let cache_hits = self.cache_hits.load(Ordering::Relaxed);

		ProviderMetricsSnapshot {
			total_requests,
			cache_hits,
			cache_misses: total_requests.saturating_sub(cache_hits),
			stale_serves: self.stale_serves.load(Ordering::Relaxed),
			refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			refresh_coalesced: self.refresh_coalesced.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
			last_refresh_micros: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of per-cache telemetry counters.
#[derive(Clone, Debug)]
pub struct ProviderMetricsSnapshot {
	/// Total number of cache lookups observed.
	pub total_requests: u64,
	/// Count of lookups served from the cache.
	pub cache_hits: u64,
	/// Count of lookups that had to fetch before answering.
	pub cache_misses: u64,
	/// Count of lookups served from stale payloads.
	pub stale_serves: u64,
	/// Count of successful refresh operations.
	pub refresh_successes: u64,
	/// Count of refresh attempts that resulted in errors.
	pub refresh_errors: u64,
	/// Count of expired lookups that deferred to an in-flight refresh.
	pub refresh_coalesced: u64,
	/// Count of entries dropped after a failed background refresh.
	pub evictions: u64,
	/// Microsecond latency of the most recent refresh.
	pub last_refresh_micros: Option<u64>,
}
impl ProviderMetricsSnapshot {
	/// Convenience method to compute the cache hit rate.
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.cache_hits as f64 / self.total_requests as f64
		}
	}

	/// Ratio of stale serves over total requests.
	pub fn stale_ratio(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.stale_serves as f64 / self.total_requests as f64
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a cache hit, tagging whether it was served stale.
pub fn record_resolve_hit(issuer: &str, stale: bool) {
	let labels = issuer_labels(issuer);

	metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
	metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);

	if stale {
		metrics::counter!(METRIC_STALE_TOTAL, labels.iter()).increment(1);
	}
}

/// Record a cache miss that required an upstream fetch.
pub fn record_resolve_miss(issuer: &str) {
	let labels = issuer_labels(issuer);

	metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
	metrics::counter!(METRIC_MISSES_TOTAL, labels.iter()).increment(1);
}

/// Record a successful refresh attempt along with its latency.
pub fn record_refresh_success(issuer: &str, duration: Duration) {
	metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(issuer, "success").iter()).increment(1);
	metrics::histogram!(METRIC_REFRESH_DURATION, issuer_labels(issuer).iter())
		.record(duration.as_secs_f64());
}

/// Record a failed refresh attempt.
pub fn record_refresh_error(issuer: &str) {
	metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(issuer, "error").iter()).increment(1);
	metrics::counter!(METRIC_REFRESH_ERRORS, issuer_labels(issuer).iter()).increment(1);
}

/// Record an expired lookup that found the refresh gate taken.
pub fn record_refresh_coalesced(issuer: &str) {
	metrics::counter!(METRIC_REFRESH_COALESCED, issuer_labels(issuer).iter()).increment(1);
}

/// Record an eviction following a failed background refresh.
pub fn record_eviction(issuer: &str) {
	metrics::counter!(METRIC_EVICTIONS_TOTAL, issuer_labels(issuer).iter()).increment(1);
}

fn issuer_labels(issuer: &str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("issuer", issuer.to_owned()));

	labels
}

fn status_labels(issuer: &str, status: &'static str) -> LabelSet {
	let mut labels = issuer_labels(issuer);

	labels.push(Label::new("status", status));

	labels
}
