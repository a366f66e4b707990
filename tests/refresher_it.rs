#![cfg(feature = "reqwest")]

// std
use std::{sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use token_keeper::{
	error::{Error, ExchangeError},
	http::ReqwestTransport,
	refresh::{StaticFingerprint, TokenRefresher},
	retry::RetryPolicy,
	url::Url,
};

const CLIENT_ID: &str = "client-it";
const CLIENT_SECRET: &str = "secret-it";

fn build_refresher(server: &MockServer) -> TokenRefresher {
	let endpoint =
		Url::parse(&server.url("/token")).expect("Mock token endpoint should parse successfully.");

	TokenRefresher::new(endpoint, CLIENT_ID, Arc::new(ReqwestTransport::default()))
		.with_client_secret(CLIENT_SECRET)
		.with_fingerprint(Arc::new(StaticFingerprint::new("fp-it")))
		.with_policy(RetryPolicy {
			base_delay: Duration::from_millis(10),
			max_delay: Duration::from_millis(40),
			jitter: false,
			..Default::default()
		})
}

#[tokio::test]
async fn refresh_posts_the_wire_contract_and_rotates_tokens() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").json_body(json!({
				"grant_type": "refresh_token",
				"refresh_token": "refresh-old",
				"client_id": CLIENT_ID,
				"client_secret": CLIENT_SECRET,
			}));
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"token_type\":\"Bearer\",\"expires_in\":1800,\"scope\":\"email profile\"}",
			);
		})
		.await;
	let token = build_refresher(&server)
		.refresh("refresh-old", &[], "alice")
		.await
		.expect("Refresh against the mock endpoint should succeed.");

	mock.assert_async().await;

	assert_eq!(token.access_token.expose(), "access-new");
	assert_eq!(token.refresh_token.expose(), "refresh-new");
	assert_eq!(token.scopes, vec!["email".to_string(), "profile".to_string()]);
	assert_eq!(token.device_fingerprint, "fp-it");
	token.validate().expect("Rotated credential should validate.");
}

#[tokio::test]
async fn persistent_server_errors_exhaust_the_retry_budget() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500)
				.header("content-type", "application/json")
				.body("{\"error\":\"temporarily_unavailable\"}");
		})
		.await;
	let err = build_refresher(&server)
		.refresh("refresh-old", &[], "alice")
		.await
		.expect_err("An endpoint that only answers 500 should exhaust the retry budget.");

	// Default budget: one initial attempt plus two retries.
	mock.assert_calls_async(3).await;

	assert!(matches!(
		err,
		Error::Exchange(ExchangeError::RetriesExhausted { attempts: 3, .. })
	));
}

#[tokio::test]
async fn unauthorized_fails_on_the_first_wire_call() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let err = build_refresher(&server)
		.refresh("refresh-revoked", &[], "alice")
		.await
		.expect_err("A 401 should surface immediately.");

	mock.assert_async().await;

	assert!(matches!(err, Error::Exchange(ExchangeError::RefreshRejected)));
}
