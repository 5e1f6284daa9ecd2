#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use crudforge::{resolve, AppBuilder, AppState, AuthSettings, HookRegistry, MemoryEngine, ModelConfig, Settings};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";

pub fn models() -> Vec<ModelConfig> {
    serde_json::from_value(json!([
        {
            "name": "user",
            "disabled": true,
            "fields": [
                {"name": "id", "type": "bigserial"},
                {"name": "email", "type": "text", "unique": true},
                {"name": "username", "type": "text", "unique": true},
                {"name": "password", "type": "text"},
                {"name": "roles", "type": "jsonb"},
                {"name": "passwordChangedAt", "type": "timestamptz"},
                {"name": "isVerified", "type": "boolean"}
            ],
            "validation": {
                "signup": {"email": {"required": true, "format": "email"}}
            }
        },
        {
            "name": "post",
            "auth": {"disabledFor": ["findMany", "findOne"]},
            "fields": [
                {"name": "id", "type": "bigserial"},
                {"name": "title", "type": "text"},
                {"name": "views", "type": "integer"},
                {"name": "categoryId", "type": "bigint"}
            ],
            "relations": [
                {"name": "tags", "target": "tag", "kind": "list",
                 "foreignKey": {"holder": "target", "column": "postId"}},
                {"name": "comments", "target": "comment", "kind": "list",
                 "foreignKey": {"holder": "target", "column": "postId"}},
                {"name": "category", "target": "category", "kind": "singular",
                 "foreignKey": {"holder": "local", "column": "categoryId"}}
            ],
            "validation": {
                "createOne": {"title": {"required": true, "type": "string", "maxLength": 100}}
            }
        },
        {
            "name": "tag",
            "fields": [
                {"name": "id", "type": "bigserial"},
                {"name": "name", "type": "text", "unique": true},
                {"name": "postId", "type": "bigint"}
            ]
        },
        {
            "name": "comment",
            "fields": [
                {"name": "id", "type": "bigserial"},
                {"name": "text", "type": "text"},
                {"name": "postId", "type": "bigint"}
            ]
        },
        {
            "name": "category",
            "auth": false,
            "fields": [
                {"name": "id", "type": "bigint"},
                {"name": "name", "type": "text"}
            ]
        },
        {
            "name": "report",
            "fields": [
                {"name": "id", "type": "bigserial"},
                {"name": "body", "type": "text"}
            ],
            "access": {"findMany": ["admin"]}
        }
    ]))
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub engine: Arc<MemoryEngine>,
    pub state: AppState,
}

pub fn settings() -> Settings {
    Settings::new(AuthSettings::with_secret(SECRET))
}

pub fn open_settings() -> Settings {
    Settings::new(AuthSettings::disabled())
}

pub fn build(settings: Settings, hooks: HookRegistry) -> TestApp {
    build_with(AppBuilder::new(settings, resolve(&models()).unwrap()).hooks(hooks))
}

pub fn build_with(builder: AppBuilder) -> TestApp {
    let engine = builder.memory_engine();
    let app = builder.with_engine(engine.clone()).build().unwrap();
    TestApp {
        router: app.router,
        engine,
        state: app.state,
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(router: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&b).unwrap()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    into_reply(router.clone().oneshot(req).await.unwrap()).await
}

pub async fn into_reply(resp: axum::response::Response) -> Reply {
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    Reply { status, headers, body }
}

/// Signs up and logs in; returns the access token.
pub async fn register(router: &Router, email: &str, password: &str) -> String {
    let reply = send(
        router,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({"email": email, "password": password})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    login(router, email, password).await
}

pub async fn login(router: &Router, email: &str, password: &str) -> String {
    let reply = send(
        router,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"email": email, "password": password})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    reply.body["accessToken"].as_str().unwrap().to_string()
}
