//! HTTP surface tests: the assembled router driven with `oneshot`.

mod common;

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{invoice_event, sign, Harness, COMMUNITY, OWNER};
use community_support::adapters::http::app;

fn router(harness: &Harness) -> Router {
    app(harness.state.clone(), Duration::from_secs(5))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn create_request(user_id: Option<i64>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/communities/{}/subscriptions", COMMUNITY))
        .header("content-type", "application/json");
    if let Some(id) = user_id {
        builder = builder.header("X-User-Id", id.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_as(user_id: i64, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-User-Id", user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

fn webhook(provider: &str, payload: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhooks/{}", provider))
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Stripe-Signature", signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

fn card() -> Value {
    json!({ "paymentMethodId": "pm_card_visa", "provider": "stripe" })
}

async fn create(harness: &Harness) -> Value {
    harness.provider.set_next_subscription_id("sub_X");
    let (status, body) = send(router(harness), create_request(Some(3), card())).await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn health_reports_ok() {
    let harness = Harness::new().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(router(&harness), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_returns_created_subscription() {
    let harness = Harness::new().await;

    let body = create(&harness).await;

    assert_eq!(body["status"], "active");
    assert_eq!(body["userId"], 3);
    assert_eq!(body["communityId"], COMMUNITY);
    assert_eq!(body["providerSubscriptionId"], "sub_X");
    assert_eq!(body["cancelAtPeriodEnd"], false);
}

#[tokio::test]
async fn create_without_caller_is_unauthorized() {
    let harness = Harness::new().await;

    let (status, body) = send(router(&harness), create_request(None, card())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTHENTICATION_REQUIRED");
    assert!(harness.provider.calls().is_empty());
}

#[tokio::test]
async fn second_create_for_same_pair_conflicts() {
    let harness = Harness::new().await;
    create(&harness).await;

    let (status, _) = send(router(&harness), create_request(Some(3), card())).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(harness.store.subscription_count().await, 1);
}

#[tokio::test]
async fn create_with_unsupported_provider_is_bad_request() {
    let harness = Harness::new().await;
    let body = json!({ "paymentMethodId": "pm_1", "provider": "paypal" });

    let (status, _) = send(router(&harness), create_request(Some(3), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscription_is_visible_to_holder_and_owner_only() {
    let harness = Harness::new().await;
    let id = create(&harness).await["id"].as_str().unwrap().to_string();
    let uri = format!("/subscriptions/{}", id);

    let (status, body) = send(router(&harness), get_as(3, &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());

    let (status, _) = send(router(&harness), get_as(OWNER, &uri)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(router(&harness), get_as(4, &uri)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_subscription_id_is_bad_request() {
    let harness = Harness::new().await;

    let (status, _) = send(router(&harness), get_as(3, "/subscriptions/not-a-uuid")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lists_are_paged() {
    let harness = Harness::new().await;
    create(&harness).await;

    let (status, body) = send(router(&harness), get_as(3, "/me/subscriptions?page=1&per_page=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["perPage"], 5);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let community_uri = format!("/communities/{}/subscriptions", COMMUNITY);
    let (status, body) = send(router(&harness), get_as(OWNER, &community_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = send(router(&harness), get_as(3, &community_uri)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cancel_with_empty_body_schedules_period_end() {
    let harness = Harness::new().await;
    let id = create(&harness).await["id"].as_str().unwrap().to_string();
    let request = Request::builder()
        .method("POST")
        .uri(format!("/subscriptions/{}/cancel", id))
        .header("X-User-Id", "3")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(router(&harness), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["cancelAtPeriodEnd"], true);
    assert!(body["canceledAt"].is_string());
}

#[tokio::test]
async fn signed_webhook_is_acknowledged_and_recorded_in_history() {
    let harness = Harness::new().await;
    let id = create(&harness).await["id"].as_str().unwrap().to_string();
    let payload = invoice_event("evt_1", "in_1", "sub_X", true).to_string();

    let (status, body) = send(
        router(&harness),
        webhook("stripe", &payload, Some(&sign(&payload))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["eventId"], "evt_1");
    assert_eq!(body["outcome"], "processed");

    let (status, body) = send(
        router(&harness),
        webhook("stripe", &payload, Some(&sign(&payload))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");

    let (status, body) = send(
        router(&harness),
        get_as(3, &format!("/subscriptions/{}/payments", id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["providerTransactionId"], "in_1:succeeded");
    assert_eq!(body["items"][0]["status"], "succeeded");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let harness = Harness::new().await;
    let payload = invoice_event("evt_1", "in_1", "sub_X", true).to_string();
    let forged = sign("{\"id\":\"evt_other\"}");

    let (status, body) = send(router(&harness), webhook("stripe", &payload, Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_WEBHOOK_SIGNATURE");

    let (status, _) = send(router(&harness), webhook("stripe", &payload, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.ledger.record_count().await, 0);
}

#[tokio::test]
async fn webhook_for_unknown_provider_is_not_found() {
    let harness = Harness::new().await;
    let payload = invoice_event("evt_1", "in_1", "sub_X", true).to_string();

    let (status, body) = send(
        router(&harness),
        webhook("paypal", &payload, Some(&sign(&payload))),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "UNKNOWN_PROVIDER");
}
