//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the JWKS provider crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Jsonwebtoken(#[from] jsonwebtoken::errors::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Could not decode {document} from {url}: {source}")]
	Decode {
		document: &'static str,
		url: url::Url,
		#[source]
		source: serde_json::Error,
	},
	#[error("Discovery against issuer {issuer} failed: {source}")]
	Discovery {
		issuer: url::Url,
		#[source]
		source: Box<Error>,
	},
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: http::StatusCode, url: url::Url, body: Option<String> },
	#[error("No key with id '{kid}' in the issuer key set.")]
	KeyNotFound { kid: String },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Security violation: {0}")]
	Security(String),
	#[error("{operation} request timed out after {timeout:?}.")]
	Timeout { operation: &'static str, timeout: std::time::Duration },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether the error came from the discovery step rather than the key-set fetch.
	pub fn is_discovery(&self) -> bool {
		matches!(self, Self::Discovery { .. })
	}

	pub(crate) fn discovery(issuer: &url::Url, source: Error) -> Self {
		Self::Discovery { issuer: issuer.clone(), source: Box::new(source) }
	}
}
