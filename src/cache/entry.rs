//! Cache entry definitions.

// crates.io
use jsonwebtoken::jwk::JwkSet;
// self
use crate::_prelude::*;

// Deadline used when `now + ttl` does not fit in an `Instant`; roughly thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Key set cached for one issuer together with its freshness deadline.
///
/// Entries are never updated in place; a successful refresh replaces the whole entry.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	jwks: Arc<JwkSet>,
	expires_at: Instant,
	refreshed_at: DateTime<Utc>,
}
impl CacheEntry {
	/// Create an entry for a key set fetched at `now`, fresh for `ttl`.
	///
	/// A TTL too large to represent saturates to a deadline decades away.
	pub fn new(jwks: Arc<JwkSet>, now: Instant, ttl: Duration) -> Self {
		let expires_at = now
			.checked_add(ttl)
			.or_else(|| now.checked_add(FAR_FUTURE))
			.unwrap_or(now);

		Self { jwks, expires_at, refreshed_at: Utc::now() }
	}

	/// Cached key set.
	pub fn jwks(&self) -> &Arc<JwkSet> {
		&self.jwks
	}

	/// Monotonic deadline after which the entry is stale.
	pub fn expires_at(&self) -> Instant {
		self.expires_at
	}

	/// Wall-clock time of the refresh that produced the entry.
	pub fn refreshed_at(&self) -> DateTime<Utc> {
		self.refreshed_at
	}

	/// Whether the entry has exceeded its freshness window.
	pub fn is_expired(&self, now: Instant) -> bool {
		now >= self.expires_at
	}
}
