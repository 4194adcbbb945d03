#![cfg(feature = "reqwest")]

mod common;

// std
use std::time::Duration as StdDuration;
// crates.io
use httpmock::prelude::*;
use serde_json::{Value, json};
use time::Duration;
// self
use common::{Harness, ok_body, token_body};
use storefront_gateway::{
	error::Error,
	gateway::{ApiRequest, InvalidationReason},
};

const REFRESHED_AT: &str = "2025-06-01 09:00:50";

#[tokio::test]
async fn expired_access_refreshes_once_for_concurrent_requests() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	harness.at(Duration::seconds(3_650));

	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/token/refresh").query_param("refresh_token", "R1");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("A2", "R2", REFRESHED_AT))
				.delay(StdDuration::from_millis(100));
		})
		.await;
	let info = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/info").header("go-mall-token", "A2");
			then.status(200)
				.header("content-type", "application/json")
				.body(ok_body(json!({ "nick_name": "alice" })));
		})
		.await;
	let gateway = &harness.gateway;
	let (first, second, third, fourth) = tokio::join!(
		gateway.send_json::<Value>(ApiRequest::get("user/info")),
		gateway.send_json::<Value>(ApiRequest::get("user/info")),
		gateway.send_json::<Value>(ApiRequest::get("/user/info")),
		gateway.send_json::<Value>(ApiRequest::get("user/info"))
	);

	for result in [first, second, third, fourth] {
		let data = result.expect("Every queued request should succeed after the refresh.");

		assert_eq!(data["nick_name"], "alice");
	}

	refresh.assert_calls_async(1).await;
	info.assert_calls_async(4).await;

	assert_eq!(harness.stored_access().as_deref(), Some("A2"));
	assert_eq!(gateway.refresh_metrics().attempts(), 1);
	assert_eq!(gateway.refresh_metrics().joined(), 3);
	assert!(harness.invalidations().is_empty());
}

#[tokio::test]
async fn access_inside_threshold_refreshes_before_sending() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	// 200 seconds left is below the default 300 second threshold.
	harness.at(Duration::seconds(3_400));

	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/token/refresh").query_param("refresh_token", "R1");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("A2", "R2", "2025-06-01 08:56:40"));
		})
		.await;
	let info = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/info").header("go-mall-token", "A2");
			then.status(200).body(ok_body(json!(null)));
		})
		.await;
	let response = harness
		.gateway
		.send(ApiRequest::get("user/info"))
		.await
		.expect("Proactive refresh should let the request through.");

	assert_eq!(response.status().as_u16(), 200);

	refresh.assert_calls_async(1).await;
	info.assert_calls_async(1).await;
}

#[tokio::test]
async fn fresh_access_is_sent_without_refreshing() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	harness.at(Duration::seconds(60));

	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/token/refresh");
			then.status(500);
		})
		.await;
	let info = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/user/info")
				.header("go-mall-token", "A1")
				.header("platform", "H5");
			then.status(200).body(ok_body(json!({ "id": 7 })));
		})
		.await;
	let data = harness
		.gateway
		.send_json::<Value>(ApiRequest::get("user/info"))
		.await
		.expect("A fresh token should be attached as-is.");

	assert_eq!(data["id"], 7);

	refresh.assert_calls_async(0).await;
	info.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_request_is_replayed_once_with_refreshed_token() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	harness.at(Duration::seconds(60));

	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/token/refresh").query_param("refresh_token", "R1");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("A2", "R2", "2025-06-01 08:01:00"));
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/cart/add").header("go-mall-token", "A1");
			then.status(401);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/cart/add")
				.header("go-mall-token", "A2")
				.json_body(json!({ "commodity_id": 3, "commodity_num": 1 }));
			then.status(200).body(ok_body(json!({ "cart_item_id": 11 })));
		})
		.await;
	let request = ApiRequest::post("cart/add")
		.json(&json!({ "commodity_id": 3, "commodity_num": 1 }))
		.expect("JSON body should serialize.");
	let data = harness
		.gateway
		.send_json::<Value>(request)
		.await
		.expect("The replay with the refreshed token should succeed.");

	assert_eq!(data["cart_item_id"], 11);

	refresh.assert_calls_async(1).await;
	rejected.assert_calls_async(1).await;
	accepted.assert_calls_async(1).await;

	assert_eq!(harness.stored_access().as_deref(), Some("A2"));
}

#[tokio::test]
async fn concurrent_rejections_share_one_refresh() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	harness.at(Duration::seconds(60));

	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/token/refresh").query_param("refresh_token", "R1");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("A2", "R2", "2025-06-01 08:01:00"))
				.delay(StdDuration::from_millis(50));
		})
		.await;
	let slow_rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/order/list").header("go-mall-token", "A1");
			then.status(401).delay(StdDuration::from_millis(400));
		})
		.await;
	let slow_accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/order/list").header("go-mall-token", "A2");
			then.status(200).body(ok_body(json!([])));
		})
		.await;
	let fast_rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/info").header("go-mall-token", "A1");
			then.status(401);
		})
		.await;
	let fast_accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/info").header("go-mall-token", "A2");
			then.status(200).body(ok_body(json!({ "nick_name": "alice" })));
		})
		.await;
	let gateway = &harness.gateway;
	let (slow, fast) = tokio::join!(
		gateway.send_json::<Vec<Value>>(ApiRequest::get("order/list")),
		gateway.send_json::<Value>(ApiRequest::get("user/info"))
	);

	assert!(slow.expect("The slow request should replay with the rotated token.").is_empty());
	assert_eq!(fast.expect("The fast request should replay after refreshing.")["nick_name"], "alice");

	refresh.assert_calls_async(1).await;
	slow_rejected.assert_calls_async(1).await;
	slow_accepted.assert_calls_async(1).await;
	fast_rejected.assert_calls_async(1).await;
	fast_accepted.assert_calls_async(1).await;

	assert_eq!(harness.stored_access().as_deref(), Some("A2"));
	assert!(harness.invalidations().is_empty());
}

#[tokio::test]
async fn second_rejection_ends_the_session() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	harness.at(Duration::seconds(60));

	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/token/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("A2", "R2", "2025-06-01 08:01:00"));
		})
		.await;
	let info = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/info");
			then.status(401);
		})
		.await;
	let err = harness
		.gateway
		.send(ApiRequest::get("user/info"))
		.await
		.expect_err("A request rejected twice should fail.");

	assert!(matches!(err, Error::Unauthenticated));

	refresh.assert_calls_async(1).await;
	info.assert_calls_async(2).await;

	assert_eq!(harness.stored_access(), None);
	assert_eq!(harness.invalidations(), vec![InvalidationReason::CredentialsRejected]);
}

#[tokio::test]
async fn token_invalid_code_is_treated_like_unauthorized() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	harness.at(Duration::seconds(60));

	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/token/refresh");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("A2", "R2", "2025-06-01 08:01:00"));
		})
		.await;
	let invalid = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/order/list").header("go-mall-token", "A1");
			then.status(200).body(common::error_body(10000004, "token invalid"));
		})
		.await;
	let valid = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/order/list").header("go-mall-token", "A2");
			then.status(200).body(ok_body(json!([])));
		})
		.await;
	let orders = harness
		.gateway
		.send_json::<Vec<Value>>(ApiRequest::get("order/list").query("page", "1"))
		.await
		.expect("The token-invalid code should trigger a refresh and replay.");

	assert!(orders.is_empty());

	refresh.assert_calls_async(1).await;
	invalid.assert_calls_async(1).await;
	valid.assert_calls_async(1).await;
}

#[tokio::test]
async fn refresh_failure_clears_session_and_notifies_once() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	harness.at(Duration::seconds(3_650));

	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/token/refresh");
			then.status(401);
		})
		.await;
	let info = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/user/info");
			then.status(200).body(ok_body(json!(null)));
		})
		.await;
	let gateway = &harness.gateway;
	let (first, second) = tokio::join!(
		gateway.send(ApiRequest::get("user/info")),
		gateway.send(ApiRequest::get("user/info"))
	);

	assert!(matches!(first, Err(Error::Unauthenticated)));
	assert!(matches!(second, Err(Error::Unauthenticated)));

	let third = gateway.send(ApiRequest::get("user/info")).await;

	assert!(matches!(third, Err(Error::Unauthenticated)));

	refresh.assert_calls_async(1).await;
	info.assert_calls_async(0).await;

	assert!(!gateway.is_logged_in().expect("Login state should be readable."));
	assert_eq!(harness.invalidations(), vec![InvalidationReason::RefreshFailed]);
}

#[tokio::test]
async fn public_and_optional_requests_skip_credentials_without_session() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);
	let goods = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/goods/list").header_missing("go-mall-token");
			then.status(200).body(ok_body(json!([{ "id": 1 }])));
		})
		.await;
	let public = harness
		.gateway
		.send_json::<Vec<Value>>(ApiRequest::get("goods/list").public())
		.await
		.expect("Public requests should not need a session.");
	let optional = harness
		.gateway
		.send_json::<Vec<Value>>(ApiRequest::get("goods/list").optional_auth())
		.await
		.expect("Optional requests should go out anonymously without a session.");

	assert_eq!(public.len(), 1);
	assert_eq!(optional.len(), 1);

	goods.assert_calls_async(2).await;

	assert!(harness.invalidations().is_empty());
}

#[tokio::test]
async fn required_request_without_session_fails_locally() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);
	let any = server
		.mock_async(|when, then| {
			when.any_request();
			then.status(200).body(ok_body(json!(null)));
		})
		.await;
	let err = harness
		.gateway
		.send(ApiRequest::get("user/info"))
		.await
		.expect_err("Credentialed requests should fail without a session.");

	assert!(matches!(err, Error::Unauthenticated));

	any.assert_calls_async(0).await;

	assert_eq!(harness.invalidations(), vec![InvalidationReason::MissingCredentials]);
}

#[tokio::test]
async fn business_failures_surface_without_touching_the_session() {
	let server = MockServer::start_async().await;
	let harness = Harness::new(&server);

	harness.seed("A1", "R1");
	harness.at(Duration::seconds(60));

	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/order/create");
			then.status(200).body(common::error_body(10010001, "stock not enough"));
		})
		.await;

	let err = harness
		.gateway
		.send_json::<Value>(ApiRequest::post("order/create"))
		.await
		.expect_err("Business failures should surface to the caller.");

	match err {
		Error::Business { code, message, request_id } => {
			assert_eq!(code, 10010001);
			assert_eq!(message, "stock not enough");
			assert_eq!(request_id.as_deref(), Some("req-fail"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(harness.stored_access().as_deref(), Some("A1"));
}
