mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{build, into_reply, login, register, send, settings};
use crudforge::relation::Record;
use crudforge::{DataEngine, HookRegistry};
use serde_json::json;
use tower::ServiceExt;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn cookie_of(reply: &common::Reply) -> String {
    reply
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn protected_routes_reject_missing_and_expired_credentials() {
    let app = build(settings(), HookRegistry::new());
    let r = send(&app.router, Method::POST, "/posts", None, Some(json!({"title": "a"}))).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.body["error"]["code"], json!("authentication_error"));

    let expired = app.state.tokens.issue_at("1", now() - 100 * 24 * 60 * 60).unwrap();
    let r = send(&app.router, Method::POST, "/posts", Some(&expired), Some(json!({"title": "a"}))).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);

    let r = send(&app.router, Method::POST, "/posts", Some("not-a-token"), Some(json!({"title": "a"}))).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.engine.total_calls(), 0);

    // declared public
    let r = send(&app.router, Method::GET, "/posts", None, None).await;
    assert_eq!(r.status, StatusCode::OK);
}

#[tokio::test]
async fn signup_hides_the_password_and_assigns_default_roles() {
    let app = build(settings(), HookRegistry::new());
    let r = send(
        &app.router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({"email": "a@x.io", "username": "a", "password": "pw-1", "roles": ["admin"]})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED, "{}", r.body);
    assert!(r.body.get("password").is_none());
    assert_eq!(r.body["roles"], json!(["user"]));

    let stored = app.engine.records("user").await;
    assert_ne!(stored[0]["password"], json!("pw-1"));

    let r = send(
        &app.router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({"email": "a@x.io", "password": "other"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CONFLICT);

    let r = send(
        &app.router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({"email": "not-an-email", "password": "pw"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.body["error"]["details"][0]["field"], json!("email"));
}

#[tokio::test]
async fn login_sets_a_cookie_and_rejects_bad_passwords() {
    let app = build(settings(), HookRegistry::new());
    register(&app.router, "b@x.io", "secret").await;

    let r = send(
        &app.router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"email": "b@x.io", "password": "secret"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::OK);
    let cookie = cookie_of(&r);
    assert!(cookie.starts_with("access_token="));
    assert!(cookie.contains("HttpOnly"));

    let r = send(
        &app.router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"email": "b@x.io", "password": "wrong"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    let r = send(
        &app.router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"email": "nobody@x.io", "password": "secret"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_accepts_bearer_or_cookie() {
    let app = build(settings(), HookRegistry::new());
    let token = register(&app.router, "c@x.io", "pw").await;

    let r = send(&app.router, Method::GET, "/users/me", Some(&token), None).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["email"], json!("c@x.io"));
    assert!(r.body.get("password").is_none());

    let req = Request::builder()
        .method(Method::GET)
        .uri("/users/me")
        .header(header::COOKIE, format!("theme=dark; access_token={}", token))
        .body(Body::empty())
        .unwrap();
    let r = into_reply(app.router.clone().oneshot(req).await.unwrap()).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["email"], json!("c@x.io"));
}

#[tokio::test]
async fn update_me_refuses_credentials_and_roles() {
    let app = build(settings(), HookRegistry::new());
    let token = register(&app.router, "d@x.io", "pw").await;

    let r = send(&app.router, Method::PATCH, "/users/me", Some(&token), Some(json!({"password": "x"}))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    let r = send(&app.router, Method::PATCH, "/users/me", Some(&token), Some(json!({"roles": ["admin"]}))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);

    let r = send(&app.router, Method::PATCH, "/users/me", Some(&token), Some(json!({"username": "dee"}))).await;
    assert_eq!(r.status, StatusCode::OK, "{}", r.body);
    assert_eq!(r.body["username"], json!("dee"));
}

#[tokio::test]
async fn password_change_invalidates_older_credentials() {
    let app = build(settings(), HookRegistry::new());
    register(&app.router, "e@x.io", "old-pw").await;
    let old = app.state.tokens.issue_at("1", now() - 10).unwrap();

    let r = send(
        &app.router,
        Method::POST,
        "/auth/update-password",
        Some(&old),
        Some(json!({"currentPassword": "nope", "newPassword": "new-pw"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);

    let r = send(
        &app.router,
        Method::POST,
        "/auth/update-password",
        Some(&old),
        Some(json!({"currentPassword": "old-pw", "newPassword": "new-pw"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::OK, "{}", r.body);
    let fresh = r.body["accessToken"].as_str().unwrap().to_string();
    assert!(cookie_of(&r).contains(&fresh));

    let r = send(&app.router, Method::GET, "/users/me", Some(&old), None).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    let r = send(&app.router, Method::GET, "/users/me", Some(&fresh), None).await;
    assert_eq!(r.status, StatusCode::OK);

    // logging out still works with the stale credential
    let r = send(&app.router, Method::DELETE, "/auth/logout", Some(&old), None).await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert!(cookie_of(&r).contains("Max-Age=0"));

    let r = send(
        &app.router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"email": "e@x.io", "password": "old-pw"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    login(&app.router, "e@x.io", "new-pw").await;
}

#[tokio::test]
async fn delete_me_removes_the_identity() {
    let app = build(settings(), HookRegistry::new());
    let token = register(&app.router, "f@x.io", "pw").await;
    let r = send(&app.router, Method::DELETE, "/users/me", Some(&token), None).await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert!(app.engine.records("user").await.is_empty());

    let r = send(&app.router, Method::GET, "/users/me", Some(&token), None).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unverified_identities_are_locked_when_verification_is_required() {
    let mut s = settings();
    s.auth.require_verification = true;
    let app = build(s, HookRegistry::new());
    let r = send(
        &app.router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({"email": "g@x.io", "password": "pw"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED);

    let r = send(
        &app.router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"email": "g@x.io", "password": "pw"})),
    )
    .await;
    assert_eq!(r.status, StatusCode::LOCKED);

    let token = app.state.tokens.issue("1").unwrap();
    let r = send(&app.router, Method::GET, "/users/me", Some(&token), None).await;
    assert_eq!(r.status, StatusCode::LOCKED);
}

#[tokio::test]
async fn access_table_restricts_by_role() {
    let app = build(settings(), HookRegistry::new());
    let token = register(&app.router, "h@x.io", "pw").await;

    let r = send(&app.router, Method::GET, "/reports", Some(&token), None).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    // the table has no entry for findOne and it is not public
    let r = send(&app.router, Method::GET, "/reports/1", Some(&token), None).await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);

    let filter = Record::from_iter([("email".to_string(), json!("h@x.io"))]);
    let set = Record::from_iter([("roles".to_string(), json!(["admin"]))]);
    assert_eq!(app.engine.update_many("user", &filter, set).await.unwrap(), 1);

    let r = send(&app.router, Method::GET, "/reports", Some(&token), None).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["total"], json!(0));
}

#[tokio::test]
async fn public_actions_open_unlisted_entries() {
    let mut s = settings();
    s.public_actions = vec![crudforge::Action::FindOne];
    let app = build(s, HookRegistry::new());
    let token = register(&app.router, "i@x.io", "pw").await;
    let r = send(&app.router, Method::GET, "/reports/1", Some(&token), None).await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validation_runs_after_authentication() {
    let app = build(settings(), HookRegistry::new());
    let token = register(&app.router, "j@x.io", "pw").await;
    let before = app.engine.calls("create");

    let r = send(&app.router, Method::POST, "/posts", Some(&token), Some(json!({}))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.body["error"]["details"][0]["field"], json!("title"));
    assert_eq!(app.engine.calls("create"), before);

    let r = send(&app.router, Method::POST, "/posts", Some(&token), Some(json!({"title": "ok"}))).await;
    assert_eq!(r.status, StatusCode::CREATED);
}
