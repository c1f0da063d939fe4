//! Integration coverage for discovery-based endpoint resolution.

// std
use std::time::Duration;
// crates.io
use jwks_provider::{
	CacheConfig, CachingProvider, Error, KeySource, Provider, ProviderConfig, Result,
};
use serde_json::json;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::{JWKS_PATH, jwks_body, kids};

const DISCOVERY_PATH: &str = "/realms/main/.well-known/openid-configuration";

fn provider_config(server: &MockServer) -> ProviderConfig {
	ProviderConfig::new(format!("{}/realms/main", server.uri()))
		.expect("issuer")
		.with_require_https(false)
}

#[tokio::test]
async fn resolves_jwks_uri_through_discovery() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"issuer": format!("{}/realms/main", server.uri()),
			"jwks_uri": format!("{}{JWKS_PATH}", server.uri()),
		})))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_string(jwks_body("discovered")))
		.expect(1)
		.mount(&server)
		.await;

	let provider = CachingProvider::from_config(
		provider_config(&server),
		CacheConfig::new(Duration::from_secs(60)),
	)?;
	let first = provider.key_set().await?;
	let second = provider.key_set().await?;

	assert_eq!(kids(&first), ["discovered"]);
	assert_eq!(kids(&second), ["discovered"]);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn discovery_failure_is_reported_as_such() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(404))
		.mount(&server)
		.await;

	let provider = Provider::new(provider_config(&server)).expect("provider");
	let err = provider.key_set().await.unwrap_err();

	match err {
		Error::Discovery { source, .. } => {
			assert!(matches!(*source, Error::HttpStatus { .. }), "got {source:?}");
		},
		other => panic!("expected discovery error, got {other:?}"),
	}
}

#[tokio::test]
async fn discovered_endpoint_outside_allowlist_is_refused() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"jwks_uri": "http://keys.attacker.example/jwks.json",
		})))
		.mount(&server)
		.await;

	let config = provider_config(&server).with_allowed_domains(["127.0.0.1"]);
	let provider = Provider::new(config).expect("provider");
	let err = provider.key_set().await.unwrap_err();

	assert!(matches!(err, Error::Security(_)), "got {err:?}");
}
