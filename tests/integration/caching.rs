//! Integration tests for TTL caching and refresh behaviour over HTTP.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use jwks_provider::{
	CacheConfig, CachingProvider, Error, KeySource, Provider, ProviderConfig, Result,
};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::{JWKS_PATH, jwks_body, kids};

fn ok(kid: &str) -> ResponseTemplate {
	ResponseTemplate::new(200)
		.set_body_string(jwks_body(kid))
		.insert_header("content-type", "application/json")
}

/// Mount a responder replaying `responses` in order, repeating the last one.
async fn mount_sequence(
	server: &MockServer,
	responses: Vec<ResponseTemplate>,
) -> Arc<AtomicUsize> {
	let counter = Arc::new(AtomicUsize::new(0));
	let handle = counter.clone();

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(move |_: &wiremock::Request| {
			let idx = handle.fetch_add(1, Ordering::SeqCst);

			responses[idx.min(responses.len() - 1)].clone()
		})
		.mount(server)
		.await;

	counter
}

fn caching_provider(server: &MockServer, cache: CacheConfig) -> CachingProvider {
	let config = ProviderConfig::new(server.uri())
		.expect("issuer")
		.with_jwks_uri(format!("{}{JWKS_PATH}", server.uri()))
		.expect("jwks uri")
		.with_require_https(false);

	CachingProvider::from_config(config, cache).expect("caching provider")
}

async fn served_kids(provider: &CachingProvider) -> Result<Vec<String>> {
	let jwks = provider.key_set().await?;

	Ok(kids(&jwks))
}

#[tokio::test]
async fn caches_jwks_after_initial_fetch() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ok("primary"))
		.expect(1)
		.mount(&server)
		.await;

	let provider = caching_provider(&server, CacheConfig::new(Duration::from_secs(60)));
	let first = provider.key_set().await?;
	let second = provider.key_set().await?;

	assert_eq!(kids(&first), ["primary"]);
	assert!(Arc::ptr_eq(&first, &second));

	let status = provider.status().await;

	assert_eq!(status.len(), 1);
	assert_eq!(status[0].issuer, "127.0.0.1");
	assert!(status[0].expires_at.is_some());

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn serves_stale_while_refreshing_in_background() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let slow_b = ok("b").set_delay(Duration::from_millis(200));
	let counter = mount_sequence(&server, vec![ok("a"), slow_b]).await;
	let provider = caching_provider(&server, CacheConfig::new(Duration::from_millis(300)));

	assert_eq!(served_kids(&provider).await?, ["a"]);

	tokio::time::sleep(Duration::from_millis(350)).await;

	let started = std::time::Instant::now();
	let stale = provider.key_set().await?;

	assert_eq!(kids(&stale), ["a"]);
	assert!(started.elapsed() < Duration::from_millis(100), "stale read waited on the refresh");

	for _ in 0..10 {
		assert_eq!(served_kids(&provider).await?, ["a"]);
	}

	tokio::time::sleep(Duration::from_millis(300)).await;

	assert_eq!(served_kids(&provider).await?, ["b"]);
	assert_eq!(counter.load(Ordering::SeqCst), 2, "refreshes must be coalesced");

	Ok(())
}

#[tokio::test]
async fn failed_background_refresh_evicts_and_refetches() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let counter =
		mount_sequence(&server, vec![ok("a"), ResponseTemplate::new(500), ok("c")]).await;
	let provider = caching_provider(&server, CacheConfig::new(Duration::from_millis(100)));

	provider.key_set().await?;
	tokio::time::sleep(Duration::from_millis(150)).await;

	assert_eq!(served_kids(&provider).await?, ["a"], "upstream failure must stay hidden");

	tokio::time::sleep(Duration::from_millis(200)).await;

	assert!(provider.status().await.is_empty(), "stale entry should be evicted");
	assert_eq!(served_kids(&provider).await?, ["c"]);
	assert_eq!(counter.load(Ordering::SeqCst), 3);

	let metrics = provider.metrics();

	assert_eq!(metrics.evictions, 1);
	assert_eq!(metrics.refresh_errors, 1);

	Ok(())
}

#[tokio::test]
async fn synchronous_refresh_surfaces_upstream_status() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_sequence(&server, vec![ok("a"), ResponseTemplate::new(503).set_body_string("down")])
		.await;

	let provider = caching_provider(
		&server,
		CacheConfig::new(Duration::from_millis(100)).with_synchronous_refresh(true),
	);

	provider.key_set().await?;
	tokio::time::sleep(Duration::from_millis(150)).await;

	let err = provider.key_set().await.unwrap_err();

	match err {
		Error::HttpStatus { status, body, .. } => {
			assert_eq!(status.as_u16(), 503);
			assert_eq!(body.as_deref(), Some("down"));
		},
		other => panic!("expected upstream status error, got {other:?}"),
	}

	Ok(())
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_string("{\"keys\": 42}"))
		.mount(&server)
		.await;

	let provider = caching_provider(&server, CacheConfig::default());
	let err = provider.key_set().await.unwrap_err();

	assert!(matches!(err, Error::Decode { document: "jwks", .. }), "got {err:?}");
	assert!(provider.status().await.is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ok("primary"))
		.mount(&server)
		.await;

	let mut config = ProviderConfig::new(server.uri())
		.expect("issuer")
		.with_jwks_uri(format!("{}{JWKS_PATH}", server.uri()))
		.expect("jwks uri")
		.with_require_https(false);

	config.max_response_bytes = 16;

	let provider = Provider::new(config).expect("provider");
	let err = provider.key_set().await.unwrap_err();

	assert!(matches!(err, Error::Validation { field: "max_response_bytes", .. }), "got {err:?}");
}

#[tokio::test]
async fn decoding_key_is_selected_by_kid() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ok("signing-2024"))
		.expect(1)
		.mount(&server)
		.await;

	let provider = caching_provider(&server, CacheConfig::default());

	provider.decoding_key("signing-2024").await?;

	let err = provider.decoding_key("unknown").await.err().expect("unknown kid");

	assert!(matches!(err, Error::KeyNotFound { .. }));

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn slow_upstream_hits_request_timeout() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ok("late").set_delay(Duration::from_millis(500)))
		.mount(&server)
		.await;

	let config = ProviderConfig::new(server.uri())
		.expect("issuer")
		.with_jwks_uri(format!("{}{JWKS_PATH}", server.uri()))
		.expect("jwks uri")
		.with_require_https(false)
		.with_request_timeout(Duration::from_millis(100));
	let provider = Provider::new(config).expect("provider");
	let err = provider.key_set().await.unwrap_err();

	assert!(matches!(err, Error::Timeout { operation: "jwks", .. }), "got {err:?}");
}
