// tests/api_test.rs — Integration test: HTTP surface

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chatrelay::api::auth::{register_session, Identity};
use chatrelay::api::{build_router, ApiState};
use chatrelay::infra::config::Config;
use chatrelay::session::RawEvent;
use chatrelay::store::chats::ChatRecord;
use chatrelay::store::StoreManager;
use tower::ServiceExt;

async fn test_state() -> ApiState {
    let manager = StoreManager::in_memory().unwrap();
    let (kv, _join) = manager.spawn();
    let mut config = Config::default();
    config.quota.daily_limit = Some(2);
    let state = ApiState::new(kv.clone(), config);

    register_session(
        &kv,
        "tok-u1",
        &Identity {
            user_id: "u1".into(),
            email: "u1@example.com".into(),
        },
    )
    .await
    .unwrap();

    state
}

fn authed(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", "Bearer tok-u1")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unauthenticated_requests_are_401() {
    let app = build_router(test_state().await);

    for (method, uri) in [
        ("POST", "/api/quota"),
        ("GET", "/api/settings"),
        ("GET", "/api/settings/api-key"),
        ("GET", "/api/chats"),
    ] {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_unknown_token_is_401() {
    let app = build_router(test_state().await);
    let req = Request::builder()
        .method("POST")
        .uri("/api/quota")
        .header("authorization", "Bearer nope")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_quota_endpoint_counts_down_then_denies() {
    let app = build_router(test_state().await);

    for expected in 1..=2u64 {
        let resp = app
            .clone()
            .oneshot(authed("POST", "/api/quota", r#"{"chatId":"c1"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["allowed"], true);
        assert_eq!(json["count"], expected);
        assert_eq!(json["limit"], 2);
    }

    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/quota", "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["allowed"], false);
    assert!(json["message"].as_str().unwrap().contains("free questions"));
}

#[tokio::test]
async fn test_api_key_save_then_fetch() {
    let app = build_router(test_state().await);

    let resp = app
        .clone()
        .oneshot(authed(
            "POST",
            "/api/settings/api-key",
            r#"{"apiKey": "sk-ant-REDACTED"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["maskedKey"], "sk-ant-api03-abc...0123");

    // the GET returns the raw key to its owner
    let resp = app
        .clone()
        .oneshot(authed("GET", "/api/settings/api-key", "{}"))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["apiKey"], "sk-ant-REDACTED");

    // snapshot shows the masked form and a zeroed count
    let resp = app
        .clone()
        .oneshot(authed("GET", "/api/settings", "{}"))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["hasApiKey"], true);
    assert_eq!(json["dailyCount"], 0);
}

#[tokio::test]
async fn test_empty_api_key_is_400() {
    let app = build_router(test_state().await);
    let resp = app
        .oneshot(authed("POST", "/api/settings/api-key", r#"{"apiKey": ""}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_listing_and_deletion() {
    let state = test_state().await;
    let app = build_router(state.clone());

    let chat = ChatRecord::new("c1", "first", "u1", vec![RawEvent::user_input("q", &[])]);
    state.chats.save(&chat).await.unwrap();

    let resp = app
        .clone()
        .oneshot(authed("GET", "/api/chats?limit=10&offset=0", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["chats"][0]["id"], "c1");

    let resp = app
        .clone()
        .oneshot(authed("DELETE", "/api/chats/c1", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(authed("GET", "/api/chats", ""))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["total"], 0);

    let resp = app
        .clone()
        .oneshot(authed("GET", "/api/chats/c1", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_share_flow_and_public_projection() {
    let state = test_state().await;
    let app = build_router(state.clone());

    let chat = ChatRecord::new("c1", "shared chat", "u1", vec![RawEvent::user_input("q", &[])]);
    state.chats.save(&chat).await.unwrap();

    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/chats/c1/share", ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["sharePath"], "/share/c1");

    // the public view needs no auth and carries projected units
    let req = Request::builder()
        .uri("/api/share/c1")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["title"], "shared chat");
    assert_eq!(json["units"][0]["kind"], "user");
}

#[tokio::test]
async fn test_empty_turn_message_is_400() {
    let app = build_router(test_state().await);
    let resp = app
        .oneshot(authed("POST", "/api/chat", r#"{"message": "   "}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_exhausted_quota_blocks_turn() {
    let app = build_router(test_state().await);

    for _ in 0..2 {
        app.clone()
            .oneshot(authed("POST", "/api/quota", "{}"))
            .await
            .unwrap();
    }

    let resp = app
        .oneshot(authed("POST", "/api/chat", r#"{"message": "one more"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}
