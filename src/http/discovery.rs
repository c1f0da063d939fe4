//! OpenID Connect discovery: resolving an issuer URL to its JWKS endpoint.

// crates.io
use reqwest::Client;
use serde::Deserialize;
use url::Url;
// self
use crate::{
	_prelude::*,
	http::client::{self, RequestLimits},
};

const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// Endpoints advertised by an issuer's discovery document.
#[derive(Clone, Debug, Deserialize)]
pub struct WellKnownEndpoints {
	/// Location of the issuer's key set.
	pub jwks_uri: String,
}
impl WellKnownEndpoints {
	/// Parse the advertised key-set location.
	pub fn jwks_url(&self) -> Result<Url> {
		Url::parse(&self.jwks_uri).map_err(|err| Error::Validation {
			field: "jwks_uri",
			reason: format!("Discovery document advertised an unparsable JWKS URI: {err}."),
		})
	}
}

/// Location of the discovery document for `issuer`, keeping any path the issuer carries.
pub fn discovery_url(issuer: &Url) -> Url {
	let mut url = issuer.clone();

	url.set_query(None);
	url.set_fragment(None);

	let base = url.path().trim_end_matches('/').to_owned();

	url.set_path(&format!("{base}/{WELL_KNOWN_PATH}"));

	url
}

/// Fetch the discovery document for `issuer`.
///
/// Every failure is reported as [`Error::Discovery`].
#[tracing::instrument(skip_all, fields(issuer = %issuer))]
pub async fn resolve_endpoints(
	client: &Client,
	issuer: &Url,
	limits: RequestLimits,
) -> Result<WellKnownEndpoints> {
	let url = discovery_url(issuer);

	client::fetch_json(client, &url, "discovery document", limits)
		.await
		.map_err(|err| Error::discovery(issuer, err))
}
