//! Issuer-keyed JWKS provider with TTL caching, coalesced refresh, and stale-while-revalidate
//! serving for JWT verifiers.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod config;
pub mod http;
pub mod metrics;
pub mod provider;
pub mod security;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::manager::{CachingProvider, IssuerStatus},
	config::{CacheConfig, ProviderConfig, RefreshScope},
	error::{Error, Result},
	provider::{KeyFetcher, KeySource, Provider},
};
