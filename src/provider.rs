//! Key fetching: the uncached provider and the traits the caching layer and verifiers build on.

// std
use std::future::Future;
// crates.io
use jsonwebtoken::{DecodingKey, jwk::JwkSet};
use reqwest::Client;
use url::Url;
// self
use crate::{
	_prelude::*,
	config::ProviderConfig,
	http::{
		client::{self, RequestLimits},
		discovery,
	},
	security,
};

/// Fetches the complete key set for an issuer in one attempt.
///
/// Implementations perform no caching and no retries. Dropping the returned future must abort
/// any in-flight request.
pub trait KeyFetcher: Send + Sync + 'static {
	/// Retrieve the key set currently published by `issuer`.
	fn fetch(&self, issuer: &Url) -> impl Future<Output = Result<Arc<JwkSet>>> + Send;
}

impl<T> KeyFetcher for Arc<T>
where
	T: KeyFetcher,
{
	fn fetch(&self, issuer: &Url) -> impl Future<Output = Result<Arc<JwkSet>>> + Send {
		T::fetch(self, issuer)
	}
}

/// Source of verification keys consumed by token validators.
pub trait KeySource: Send + Sync {
	/// Key set to verify signatures against.
	fn key_set(&self) -> impl Future<Output = Result<Arc<JwkSet>>> + Send;

	/// Decoding key for the JWK identified by `kid`.
	fn decoding_key(&self, kid: &str) -> impl Future<Output = Result<DecodingKey>> + Send {
		async move {
			let jwks = self.key_set().await?;

			select_key(&jwks, kid)
		}
	}
}

/// Fetches key sets over HTTP, resolving the endpoint through discovery unless overridden.
#[derive(Clone, Debug)]
pub struct Provider {
	config: Arc<ProviderConfig>,
	client: Client,
}
impl Provider {
	/// Build a provider with the default reqwest client.
	pub fn new(config: ProviderConfig) -> Result<Self> {
		let client = client::default_client()?;

		Self::with_client(config, client)
	}

	/// Build a provider that sends requests through the supplied client.
	pub fn with_client(mut config: ProviderConfig, client: Client) -> Result<Self> {
		config.normalize_allowed_domains();
		config.validate()?;

		Ok(Self { config: Arc::new(config), client })
	}

	/// Configuration the provider was built with.
	pub fn config(&self) -> &ProviderConfig {
		&self.config
	}

	/// Issuer URL the provider serves by default.
	pub fn issuer_url(&self) -> &Url {
		&self.config.issuer_url
	}

	/// Resolve the key-set endpoint for `issuer`.
	pub async fn resolve_jwks_url(&self, issuer: &Url) -> Result<Url> {
		let url = match &self.config.jwks_uri {
			Some(url) => url.clone(),
			None => {
				if self.config.require_https {
					security::enforce_https(issuer).map_err(|err| Error::discovery(issuer, err))?;
				}

				discovery::resolve_endpoints(&self.client, issuer, self.limits())
					.await?
					.jwks_url()
					.map_err(|err| Error::discovery(issuer, err))?
			},
		};

		security::check_endpoint(&url, self.config.require_https, &self.config.allowed_domains)?;

		Ok(url)
	}

	fn limits(&self) -> RequestLimits {
		RequestLimits {
			max_response_bytes: self.config.max_response_bytes,
			timeout: self.config.request_timeout,
		}
	}
}
impl KeyFetcher for Provider {
	async fn fetch(&self, issuer: &Url) -> Result<Arc<JwkSet>> {
		let url = self.resolve_jwks_url(issuer).await?;
		let jwks = client::fetch_jwks(&self.client, &url, self.limits()).await?;

		tracing::debug!(issuer = %issuer, jwks_url = %url, keys = jwks.keys.len(), "jwks fetched");

		Ok(jwks)
	}
}
impl KeySource for Provider {
	async fn key_set(&self) -> Result<Arc<JwkSet>> {
		self.fetch(&self.config.issuer_url).await
	}
}

/// Pick the JWK identified by `kid` and turn it into a decoding key.
pub fn select_key(jwks: &JwkSet, kid: &str) -> Result<DecodingKey> {
	let jwk = jwks.find(kid).ok_or_else(|| Error::KeyNotFound { kid: kid.to_owned() })?;

	Ok(DecodingKey::from_jwk(jwk)?)
}
