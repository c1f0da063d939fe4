//! Endpoint policy for key-set retrieval: HTTPS enforcement and JWKS host allowlists.
//!
//! A discovery document or a redirect must not be able to downgrade the key-set fetch to plain
//! HTTP or move it to a host outside the configured allowlist. Certificate validation is left to
//! the HTTP client.

// crates.io
use serde::{Deserialize, de::Deserializer};
use url::Url;
// self
use crate::_prelude::*;

/// Lowercase a DNS name, dropping surrounding whitespace and the trailing root dot.
///
/// Returns `None` for names that are empty once trimmed.
pub fn canonicalize_dns_name(value: &str) -> Option<String> {
	let name = value.trim().trim_end_matches('.');

	(!name.is_empty()).then(|| name.to_ascii_lowercase())
}

/// Canonicalise allowlist entries, keeping first occurrences and dropping blanks.
pub fn normalize_allowlist<I>(domains: I) -> Vec<String>
where
	I: IntoIterator<Item = String>,
{
	let mut allowlist = Vec::<String>::new();

	for domain in domains.into_iter().filter_map(|domain| canonicalize_dns_name(&domain)) {
		if !allowlist.contains(&domain) {
			allowlist.push(domain);
		}
	}

	allowlist
}

/// `serde` adapter that canonicalises `allowed_domains` while deserialising.
pub fn deserialize_allowed_domains<'de, D>(
	deserializer: D,
) -> std::result::Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Vec::<String>::deserialize(deserializer).map(normalize_allowlist)
}

/// Reject any URL whose scheme is not `https`.
pub fn enforce_https(url: &Url) -> Result<()> {
	match url.scheme() {
		"https" => Ok(()),
		scheme => Err(Error::Security(format!("Refusing {scheme} URL {url}; HTTPS is required."))),
	}
}

/// Check a resolved key-set endpoint against the scheme requirement and the host allowlist.
pub fn check_endpoint(url: &Url, require_https: bool, allowed_domains: &[String]) -> Result<()> {
	if require_https {
		enforce_https(url)?;
	}

	let host = url
		.host_str()
		.ok_or_else(|| Error::Security(format!("Key-set URL {url} has no host.")))?;

	if host_is_allowed(host, allowed_domains) {
		Ok(())
	} else {
		Err(Error::Security(format!("Key-set host '{host}' is outside the allowlist.")))
	}
}

/// Whether `host` equals, or is a subdomain of, some allowlist entry.
///
/// An empty allowlist admits every host.
pub fn host_is_allowed(host: &str, allowed_domains: &[String]) -> bool {
	if allowed_domains.is_empty() {
		return true;
	}

	let Some(host) = canonicalize_dns_name(host) else {
		return false;
	};

	allowed_domains
		.iter()
		.filter_map(|domain| canonicalize_dns_name(domain))
		.any(|domain| within_domain(&host, &domain))
}

fn within_domain(host: &str, domain: &str) -> bool {
	match host.strip_suffix(domain) {
		Some("") => true,
		Some(label) => label.ends_with('.'),
		None => false,
	}
}
