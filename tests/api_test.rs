//! Control API tests driven through `tower::ServiceExt::oneshot`

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use lotus_relay::api::{create_router, AppState};
use lotus_relay::models::FeedKind;
use lotus_relay::storage::SubscriptionStore;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;

fn router_for(h: Harness) -> (Router, Arc<lotus_relay::storage::MemorySubscriptionStore>, Arc<ScriptedSource>) {
    let store = h.store.clone();
    let worldstate = h.worldstate.clone();
    let router = create_router(AppState::new(Arc::new(h.engine)));
    (router, store, worldstate)
}

async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_lists_enabled_feeds() {
    let (router, _, _) = router_for(harness(test_config().with_feed_enabled(FeedKind::Trader, false)));

    let (status, body) = call(&router, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["feeds"], json!(["fissures", "arbitration"]));
}

#[tokio::test]
async fn test_feed_statuses() {
    let (router, _, _) = router_for(harness(test_config()));

    let (status, body) = call(&router, get("/api/feeds")).await;
    assert_eq!(status, StatusCode::OK);
    let feeds = body["data"].as_array().unwrap();
    assert_eq!(feeds.len(), 3);
    assert_eq!(feeds[0]["feed"], "fissures");
    assert_eq!(feeds[0]["passes"], 0);
    assert_eq!(feeds[0]["intervalSecs"], 60);
}

#[tokio::test]
async fn test_subscribe_reconciles_immediately() {
    let (router, store, worldstate) = router_for(harness(test_config()));
    let base = now_ms();
    worldstate.set(fissures(vec![fissure(
        "f1",
        "SolNode1",
        "VoidT4",
        base - 60_000,
        base + HOUR_MS,
    )]));

    let (status, body) = call(
        &router,
        send_json(
            "PUT",
            "/api/subscriptions/fissures",
            json!({
                "communityId": "guild-1",
                "targetChannelId": "chan-1",
                "matchCriteria": {"tiers": ["Axi"], "steelPath": false},
                "pingTargetId": "role-1"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["report"]["succeeded"], 1);
    assert_eq!(body["data"]["subscription"]["lastMessageRef"], "1");
    let id = body["data"]["subscription"]["subscriptionId"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(store.len(), 1);

    // Reconfiguring keeps the row and edits the same message
    let (status, body) = call(
        &router,
        send_json(
            "PUT",
            "/api/subscriptions/fissures",
            json!({"communityId": "guild-1", "targetChannelId": "chan-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subscription"]["subscriptionId"], id.as_str());
    assert_eq!(store.len(), 1);

    let (status, body) = call(&router, get("/api/subscriptions/fissures?community=guild-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["lastMessageRef"], "1");

    let (status, body) = call(&router, get("/api/subscriptions/fissures?community=other")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/subscriptions/id/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&router, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_subscribe_saved_even_when_reconcile_fails() {
    let (router, store, worldstate) = router_for(harness(test_config()));
    worldstate.fail();

    let (status, body) = call(
        &router,
        send_json(
            "PUT",
            "/api/subscriptions/fissures",
            json!({"communityId": "guild-1", "targetChannelId": "chan-1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("report").is_none());
    assert!(body["data"]["reconcileError"].is_string());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_subscribe_rejects_bad_requests() {
    let (router, store, _) = router_for(harness(test_config()));

    let (status, body) = call(
        &router,
        send_json(
            "PUT",
            "/api/subscriptions/sortie",
            json!({"communityId": "g", "targetChannelId": "c"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(
        &router,
        send_json(
            "PUT",
            "/api/subscriptions/trader",
            json!({"communityId": " ", "targetChannelId": "c"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &router,
        send_json(
            "PUT",
            "/api/subscriptions/fissures",
            json!({"communityId": "g", "targetChannelId": "c", "matchCriteria": {"tiers": "Axi"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid criteria"));

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unknown_subscription_and_feed_are_not_found() {
    let (router, _, _) = router_for(harness(test_config()));

    let delete = Request::builder()
        .method("DELETE")
        .uri("/api/subscriptions/id/missing")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&router, delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&router, get("/api/subscriptions/sortie")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_trigger_endpoint() {
    let config = test_config().with_feed_enabled(FeedKind::Arbitration, false);
    let (router, store, worldstate) = router_for(harness(config));

    store
        .upsert(FeedKind::Fissures, "guild-1", "chan-1", &Value::Null, None)
        .unwrap();
    let base = now_ms();
    worldstate.set(fissures(vec![fissure(
        "f1",
        "SolNode1",
        "VoidT2",
        base - 60_000,
        base + HOUR_MS,
    )]));

    let trigger = |uri: &str| {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = call(&router, trigger("/api/feeds/fissures/trigger/guild-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["succeeded"], 1);

    let (status, _) = call(&router, trigger("/api/feeds/sortie/trigger/guild-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&router, trigger("/api/feeds/arbitration/trigger/guild-1")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    worldstate.fail();
    let (status, body) = call(&router, trigger("/api/feeds/fissures/trigger/guild-1")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    lotus_relay::metrics::init_metrics().unwrap();
    let (router, _, _) = router_for(harness(test_config()));

    // One routed request so the API counter has a sample
    call(&router, get("/api/health")).await;

    let response = router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("relay_api_requests_total"));
}
