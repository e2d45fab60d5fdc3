#![allow(clippy::unwrap_used, clippy::expect_used)]

//! HTTP surface exercised through the router with `tower::ServiceExt::oneshot`.

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
    },
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use iam::{
    api::{
        self,
        delivery::{CodeDelivery, CodeSender},
    },
    identity::{AuthConfig, IamService, MfaConfig, NewAccount, models::AuthProvider},
    store::memory::MemoryStore,
};

#[derive(Default)]
struct CapturingSender {
    sent: Mutex<Vec<CodeDelivery>>,
}

impl CapturingSender {
    fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .ok()
            .and_then(|sent| sent.last().map(|delivery| delivery.code.clone()))
    }
}

impl CodeSender for CapturingSender {
    fn send(&self, delivery: &CodeDelivery) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push(delivery.clone());
        Ok(())
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    service: Arc<IamService>,
    sender: Arc<CapturingSender>,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(IamService::new(
        store.clone(),
        AuthConfig::new().with_session_ttl_seconds(3600),
        MfaConfig::new(),
    ));
    for (username, role) in [("alice", Some("admin")), ("bob", None)] {
        let user = service
            .provision_user(NewAccount {
                parent_id: 0,
                username: username.to_string(),
                email: format!("{username}@example.com"),
                phone_number: Some("+1-555-0100".to_string()),
                display_name: username.to_uppercase(),
                auth_provider: AuthProvider::Local,
                password: Some(format!("{username}-pw")),
                created_by: None,
            })
            .await
            .unwrap();
        if let Some(role) = role {
            service.assign_role(user.user_id, role, None).await.unwrap();
        }
    }
    let sender = Arc::new(CapturingSender::default());
    let app = api::app(service.clone(), sender.clone());
    Harness {
        app,
        store,
        service,
        sender,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, cookie, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "198.51.100.7, 10.0.0.1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn login(app: &Router, username: &str) -> String {
    let (status, _, body) = send(
        app,
        post_json(
            "/api/auth/login",
            &json!({"username": username, "password": format!("{username}-pw")}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["session_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn login_sets_cookie_and_returns_identity() {
    let h = harness().await;
    let (status, cookie, body) = send(
        &h.app,
        post_json(
            "/api/auth/login",
            &json!({"username": "alice", "password": "alice-pw"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["roles"], json!(["admin"]));
    assert_eq!(body["user"]["auth_provider"], "local");
    let token = body["session_token"].as_str().unwrap();
    let cookie = cookie.unwrap();
    assert!(cookie.starts_with(&format!("iam_session={token};")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=3600"));

    let sessions = h.service.active_sessions().await.unwrap();
    assert_eq!(sessions[0].ip_address.as_deref(), Some("198.51.100.7"));
}

#[tokio::test]
async fn login_error_statuses() {
    let h = harness().await;

    let (status, _, body) = send(
        &h.app,
        post_json(
            "/api/auth/login",
            &json!({"username": "alice", "password": "nope"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"status": "error", "message": "Invalid credentials"}));

    let (status, _, body) = send(
        &h.app,
        post_json("/api/auth/login", &json!({"username": "", "password": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username and password required");

    let request = Request::post("/api/auth/login")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bob = h.service.store().user_by_username("bob").await.unwrap().unwrap();
    h.service
        .set_account_status(
            bob.user_id,
            iam::identity::models::AccountStatus {
                is_active: true,
                is_locked: true,
            },
            None,
        )
        .await
        .unwrap();
    let (status, _, body) = send(
        &h.app,
        post_json(
            "/api/auth/login",
            &json!({"username": "bob", "password": "bob-pw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Account disabled or locked");
}

#[tokio::test]
async fn verify_accepts_cookie_and_bearer() {
    let h = harness().await;
    let token = login(&h.app, "alice").await;

    let (status, _, body) = send(&h.app, get_with_token("/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["username"], "alice");

    let request = Request::get("/api/auth/verify")
        .header(COOKIE, format!("theme=dark; iam_session={token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::get("/api/auth/verify").body(Body::empty()).unwrap();
    let (status, _, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Authentication required");
}

#[tokio::test]
async fn logout_clears_cookie_and_ends_session() {
    let h = harness().await;
    let token = login(&h.app, "bob").await;

    let request = Request::post("/api/auth/logout")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, cookie, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success", "message": "Logged out"}));
    assert!(cookie.unwrap().contains("Max-Age=0"));

    let (status, _, _) = send(&h.app, get_with_token("/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::post("/api/auth/logout")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn locked_user_can_still_log_out() {
    let h = harness().await;
    let token = login(&h.app, "bob").await;
    let bob = h.service.store().user_by_username("bob").await.unwrap().unwrap();
    h.service
        .set_account_status(
            bob.user_id,
            iam::identity::models::AccountStatus {
                is_active: true,
                is_locked: true,
            },
            None,
        )
        .await
        .unwrap();

    let (status, _, _) = send(&h.app, get_with_token("/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::post("/api/auth/logout")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, cookie, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.unwrap().contains("Max-Age=0"));
    let sessions = h.service.active_sessions().await.unwrap();
    assert!(sessions.iter().all(|session| session.username != "bob"));
}

#[tokio::test]
async fn login_matches_username_exactly() {
    let h = harness().await;

    let (status, _, body) = send(
        &h.app,
        post_json(
            "/api/auth/login",
            &json!({"username": "  alice ", "password": "alice-pw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    h.service
        .provision_user(NewAccount {
            parent_id: 0,
            username: "carol ".to_string(),
            email: "carol@example.com".to_string(),
            phone_number: None,
            display_name: "Carol".to_string(),
            auth_provider: AuthProvider::Local,
            password: Some("carol-pw".to_string()),
            created_by: None,
        })
        .await
        .unwrap();
    let (status, _, body) = send(
        &h.app,
        post_json(
            "/api/auth/login",
            &json!({"username": "carol ", "password": "carol-pw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "carol ");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let h = harness().await;
    for uri in [
        "/api/users",
        "/api/users/1",
        "/api/roles",
        "/api/audit/logs",
        "/api/sessions/active",
    ] {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, _, _) = send(&h.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
    let (status, _, _) = send(
        &h.app,
        post_json("/api/mfa/challenges", &json!({"method_type": "email_otp"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_listing_and_detail() {
    let h = harness().await;
    let token = login(&h.app, "alice").await;

    let (status, _, body) = send(&h.app, get_with_token("/api/users?per_page=1000", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["per_page"], 100);
    assert_eq!(body["total"], 2);
    assert_eq!(body["pages"], 1);
    assert_eq!(body["users"].as_array().unwrap().len(), 2);

    let (_, _, body) = send(&h.app, get_with_token("/api/users?page=9&per_page=1", &token)).await;
    assert_eq!(body["users"], json!([]));
    assert_eq!(body["total"], 2);
    assert_eq!(body["pages"], 2);

    let (status, _, _) = send(&h.app, get_with_token("/api/users?page=abc", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let alice = h.service.store().user_by_username("alice").await.unwrap().unwrap();
    let (status, _, body) = send(
        &h.app,
        get_with_token(&format!("/api/users/{}", alice.user_id), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["phone_number"], "+1-555-0100");
    assert_eq!(body["user"]["roles"], json!(["admin"]));
    assert!(body["user"]["last_login_at"].is_string());

    let (status, _, body) = send(&h.app, get_with_token("/api/users/999999", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
}

#[tokio::test]
async fn roles_audit_and_sessions() {
    let h = harness().await;
    let token = login(&h.app, "alice").await;
    login(&h.app, "bob").await;

    let (status, _, body) = send(&h.app, get_with_token("/api/roles", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let admin = &body["roles"][0];
    assert_eq!(admin["role_name"], "admin");
    assert_eq!(admin["user_count"], 1);

    let (status, _, body) = send(&h.app, get_with_token("/api/audit/logs?limit=1", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["logs"][0]["event_type"], "login_success");
    assert_eq!(body["logs"][0]["username"], "bob");

    let (status, _, body) = send(&h.app, get_with_token("/api/sessions/active", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    let mut usernames: Vec<&str> = body["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|session| session["username"].as_str())
        .collect();
    usernames.sort_unstable();
    assert_eq!(usernames, ["alice", "bob"]);
}

#[tokio::test]
async fn mfa_challenge_round_trip() {
    let h = harness().await;
    let token = login(&h.app, "bob").await;

    let request = Request::post("/api/mfa/challenges")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"method_type": "email_otp", "purpose": "step_up"}).to_string(),
        ))
        .unwrap();
    let (status, _, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.get("code").is_none());
    let challenge_id = body["challenge_id"].as_i64().unwrap();
    let code = h.sender.last_code().unwrap();

    let verify = |code: String| {
        Request::post(format!("/api/mfa/challenges/{challenge_id}/verify"))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "code": code }).to_string()))
            .unwrap()
    };

    let (status, _, body) = send(&h.app, verify("not-a-code".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired code");

    let (status, _, body) = send(&h.app, verify(code.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let (status, _, _) = send(&h.app, verify(code)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn foreign_challenge_is_rejected() {
    let h = harness().await;
    let alice_token = login(&h.app, "alice").await;
    let bob_token = login(&h.app, "bob").await;

    let request = Request::post("/api/mfa/challenges")
        .header(AUTHORIZATION, format!("Bearer {alice_token}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"method_type": "email_otp"}).to_string()))
        .unwrap();
    let (_, _, body) = send(&h.app, request).await;
    let challenge_id = body["challenge_id"].as_i64().unwrap();
    let code = h.sender.last_code().unwrap();

    let request = Request::post(format!("/api/mfa/challenges/{challenge_id}/verify"))
        .header(AUTHORIZATION, format!("Bearer {bob_token}"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "code": code }).to_string()))
        .unwrap();
    let (status, _, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_store_state() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!({"status": "ok", "service": "IAM", "database": "connected"})
    );

    h.store.set_unavailable(true);
    let (status, _, body) = send(
        &h.app,
        Request::get("/healthz").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["database"], "error: unavailable");
    assert!(!body.to_string().contains("memory store offline"));
}

#[tokio::test]
async fn unavailable_store_maps_to_503() {
    let h = harness().await;
    let token = login(&h.app, "alice").await;
    h.store.set_unavailable(true);

    let (status, _, body) = send(
        &h.app,
        post_json(
            "/api/auth/login",
            &json!({"username": "alice", "password": "alice-pw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "Service temporarily unavailable");

    let (status, _, _) = send(&h.app, get_with_token("/api/auth/verify", &token)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn request_id_is_preserved() {
    let h = harness().await;
    let request = Request::get("/healthz")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("req-123")
    );
}
