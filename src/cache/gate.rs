//! Refresh gate limiting in-flight refreshes and serialising cache mutations.

// std
use std::{
	collections::HashMap,
	sync::{Mutex as StdMutex, PoisonError},
};
// crates.io
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
// self
use crate::{_prelude::*, config::RefreshScope};

/// Single-permit gate serialising refreshes, either across the whole cache or per issuer.
///
/// Each scope owns a lane: a one-permit semaphore taken without waiting by callers that find an
/// expired entry, and a mutation lock held by whoever fetches and installs a key set. A caller
/// that cannot get the permit serves what is cached instead. Dropping the permit reopens the
/// gate.
#[derive(Debug)]
pub struct RefreshGate {
	scope: RefreshScope,
	global: Lane,
	per_issuer: StdMutex<HashMap<String, Lane>>,
}
impl RefreshGate {
	/// Create an open gate with the given scope.
	pub fn new(scope: RefreshScope) -> Self {
		Self { scope, global: Lane::default(), per_issuer: StdMutex::new(HashMap::new()) }
	}

	/// Take the permit covering `issuer` if nobody holds it.
	pub fn try_acquire(&self, issuer: &str) -> Option<OwnedSemaphorePermit> {
		self.lane(issuer).permit.try_acquire_owned().ok()
	}

	/// Wait for exclusive mutation rights over the entries covered by `issuer`'s lane.
	pub async fn lock_mutation(&self, issuer: &str) -> OwnedMutexGuard<()> {
		self.lane(issuer).mutation.lock_owned().await
	}

	fn lane(&self, issuer: &str) -> Lane {
		match self.scope {
			RefreshScope::Global => self.global.clone(),
			RefreshScope::PerIssuer => {
				let mut lanes = self.per_issuer.lock().unwrap_or_else(PoisonError::into_inner);

				lanes.entry(issuer.to_owned()).or_default().clone()
			},
		}
	}
}

#[derive(Clone, Debug)]
struct Lane {
	permit: Arc<Semaphore>,
	mutation: Arc<Mutex<()>>,
}
impl Default for Lane {
	fn default() -> Self {
		Self { permit: Arc::new(Semaphore::new(1)), mutation: Arc::new(Mutex::new(())) }
	}
}
