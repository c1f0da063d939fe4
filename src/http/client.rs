//! HTTP client integration for JSON document retrieval.

// crates.io
use http::header::ACCEPT;
use jsonwebtoken::jwk::JwkSet;
use reqwest::{Client, redirect::Policy};
use serde::de::DeserializeOwned;
use url::Url;
// self
use crate::{_prelude::*, config::MAX_REDIRECTS};

/// Limits applied to a single outbound request.
#[derive(Clone, Copy, Debug)]
pub struct RequestLimits {
	/// Upper bound on the accepted body size.
	pub max_response_bytes: u64,
	/// Optional timeout for the whole exchange.
	pub timeout: Option<Duration>,
}

/// Build the default HTTP client used when the host does not inject one.
pub fn default_client() -> Result<Client> {
	let client = Client::builder()
		.redirect(Policy::limited(MAX_REDIRECTS))
		.user_agent(format!("jwks-provider/{}", env!("CARGO_PKG_VERSION")))
		.connect_timeout(Duration::from_secs(5))
		.build()?;

	Ok(client)
}

/// Execute one GET against `url` and decode the JSON body as `T`.
///
/// `document` names the payload in decode errors.
pub async fn fetch_json<T>(
	client: &Client,
	url: &Url,
	document: &'static str,
	limits: RequestLimits,
) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut builder = client.get(url.clone()).header(ACCEPT, "application/json");

	if let Some(timeout) = limits.timeout {
		builder = builder.timeout(timeout);
	}

	let start = Instant::now();
	let response = builder.send().await.map_err(|err| transport(err, document, limits))?;
	let status = response.status();

	if !status.is_success() {
		let body = response.text().await.ok();

		return Err(Error::HttpStatus { status, url: url.clone(), body });
	}
	if let Some(length) = response.content_length()
		&& length > limits.max_response_bytes
	{
		return Err(oversized(length, limits.max_response_bytes));
	}

	let bytes = response.bytes().await.map_err(|err| transport(err, document, limits))?;

	if bytes.len() as u64 > limits.max_response_bytes {
		return Err(oversized(bytes.len() as u64, limits.max_response_bytes));
	}

	let value = serde_json::from_slice(&bytes).map_err(|source| Error::Decode {
		document,
		url: url.clone(),
		source,
	})?;

	tracing::debug!(%url, %status, elapsed = ?start.elapsed(), document, "fetch complete");

	Ok(value)
}

/// Fetch and decode the key set published at `url`.
pub async fn fetch_jwks(client: &Client, url: &Url, limits: RequestLimits) -> Result<Arc<JwkSet>> {
	let jwks: JwkSet = fetch_json(client, url, "jwks", limits).await?;

	Ok(Arc::new(jwks))
}

fn transport(err: reqwest::Error, document: &'static str, limits: RequestLimits) -> Error {
	match limits.timeout {
		Some(timeout) if err.is_timeout() => Error::Timeout { operation: document, timeout },
		_ => err.into(),
	}
}

fn oversized(size: u64, limit: u64) -> Error {
	Error::Validation {
		field: "max_response_bytes",
		reason: format!(
			"Response size {size} bytes exceeds the configured guard of {limit} bytes."
		),
	}
}
