mod common;

use axum::http::{Method, StatusCode};
use common::{build, open_settings, send};
use crudforge::HookRegistry;
use serde_json::json;

#[tokio::test]
async fn lone_unique_fields_connect_existing_records() {
    let app = build(open_settings(), HookRegistry::new());
    let r = send(&app.router, Method::POST, "/tags", None, Some(json!({"name": "x"}))).await;
    assert_eq!(r.status, StatusCode::CREATED);
    let r = send(&app.router, Method::POST, "/categories", None, Some(json!({"id": 7, "name": "news"}))).await;
    assert_eq!(r.status, StatusCode::CREATED);

    let r = send(
        &app.router,
        Method::POST,
        "/posts",
        None,
        Some(json!({"title": "A", "tags": [{"name": "x"}], "category": {"id": "7"}})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED, "{}", r.body);
    assert_eq!(r.body["categoryId"], json!(7));

    // connected, not created
    assert_eq!(app.engine.records("tag").await.len(), 1);
    assert_eq!(app.engine.records("category").await.len(), 1);

    let r = send(&app.router, Method::GET, "/posts/1?include=tags,category", None, None).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body["tags"][0]["name"], json!("x"));
    assert_eq!(r.body["category"]["name"], json!("news"));
}

#[tokio::test]
async fn identifier_with_fields_updates_the_related_record() {
    let app = build(open_settings(), HookRegistry::new());
    let r = send(
        &app.router,
        Method::POST,
        "/posts",
        None,
        Some(json!({"title": "P", "comments": [{"text": "first"}, {"text": "second"}]})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED);

    let r = send(
        &app.router,
        Method::PATCH,
        "/posts/1",
        None,
        Some(json!({"title": "P2", "comments": [{"id": 1, "text": "hi"}]})),
    )
    .await;
    assert_eq!(r.status, StatusCode::OK, "{}", r.body);
    assert_eq!(r.body["title"], json!("P2"));

    let comments = app.engine.records("comment").await;
    assert_eq!(comments[0]["text"], json!("hi"));
    assert_eq!(comments[1]["text"], json!("second"));
}

#[tokio::test]
async fn tagged_items_are_deleted_and_disconnected() {
    let app = build(open_settings(), HookRegistry::new());
    send(
        &app.router,
        Method::POST,
        "/posts",
        None,
        Some(json!({"title": "P", "comments": [{"text": "a"}, {"text": "b"}, {"text": "c"}]})),
    )
    .await;

    let r = send(
        &app.router,
        Method::PATCH,
        "/posts/1",
        None,
        Some(json!({"comments": [
            {"id": 1, "apiAction": "delete"},
            {"id": 3, "apiAction": "delete"},
            {"id": 2, "apiAction": "disconnect"}
        ]})),
    )
    .await;
    assert_eq!(r.status, StatusCode::OK, "{}", r.body);

    let comments = app.engine.records("comment").await;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["id"], json!(2));
    assert_eq!(comments[0]["postId"], json!(null));
}

#[tokio::test]
async fn delete_tags_are_ignored_on_create() {
    let app = build(open_settings(), HookRegistry::new());
    let r = send(
        &app.router,
        Method::POST,
        "/posts",
        None,
        Some(json!({"title": "P", "comments": [{"id": 9, "apiAction": "delete"}, {"text": "kept"}]})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED, "{}", r.body);
    let comments = app.engine.records("comment").await;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["text"], json!("kept"));
}

#[tokio::test]
async fn connecting_a_missing_record_is_not_found() {
    let app = build(open_settings(), HookRegistry::new());
    let r = send(
        &app.router,
        Method::POST,
        "/posts",
        None,
        Some(json!({"title": "A", "category": {"id": 404}})),
    )
    .await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
    assert_eq!(r.body["error"]["code"], json!("not_found"));
}

#[tokio::test]
async fn batch_routes_create_update_and_delete() {
    let app = build(open_settings(), HookRegistry::new());
    let r = send(
        &app.router,
        Method::POST,
        "/posts/many",
        None,
        Some(json!([{"title": "a", "views": 1}, {"title": "b", "views": 1}, {"title": "c", "views": 2}])),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED, "{}", r.body);
    assert_eq!(r.body["total"], json!(3));

    let r = send(&app.router, Method::PATCH, "/posts/many", None, Some(json!({"views": 5}))).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);

    let r = send(&app.router, Method::PATCH, "/posts/many?views=1", None, Some(json!({"views": 5}))).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body, json!({"total": 2}));

    let r = send(&app.router, Method::DELETE, "/posts/many?views=5", None, None).await;
    assert_eq!(r.body, json!({"total": 2}));

    let r = send(&app.router, Method::GET, "/posts", None, None).await;
    assert_eq!(r.body["total"], json!(1));
    assert_eq!(r.body["data"][0]["title"], json!("c"));
}

#[tokio::test]
async fn find_many_pages_sorts_and_filters() {
    let app = build(open_settings(), HookRegistry::new());
    for (title, views) in [("a", 3), ("b", 1), ("c", 2), ("d", 1)] {
        send(&app.router, Method::POST, "/posts", None, Some(json!({"title": title, "views": views}))).await;
    }
    let r = send(&app.router, Method::GET, "/posts?sort=-views,title&limit=2&page=2", None, None).await;
    assert_eq!(r.status, StatusCode::OK);
    let titles: Vec<_> = r.body["data"].as_array().unwrap().iter().map(|p| p["title"].clone()).collect();
    assert_eq!(titles, vec![json!("b"), json!("d")]);
    assert_eq!(r.body["total"], json!(4));

    let r = send(&app.router, Method::GET, "/posts?views=1&fields=title", None, None).await;
    assert_eq!(r.body["total"], json!(2));
    assert_eq!(r.body["data"][0], json!({"id": 2, "title": "b"}));

    let r = send(&app.router, Method::GET, "/posts?include=nope", None, None).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn item_routes_report_missing_records() {
    let app = build(open_settings(), HookRegistry::new());
    assert_eq!(send(&app.router, Method::GET, "/posts/3", None, None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app.router, Method::DELETE, "/posts/3", None, None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        send(&app.router, Method::GET, "/posts/abc", None, None).await.status,
        StatusCode::BAD_REQUEST
    );

    send(&app.router, Method::POST, "/posts", None, Some(json!({"title": "x"}))).await;
    let r = send(&app.router, Method::DELETE, "/posts/1", None, None).await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert!(r.body.is_null());
}

#[tokio::test]
async fn list_only_tags_on_a_singular_relation_are_rejected() {
    let app = build(open_settings(), HookRegistry::new());
    send(&app.router, Method::POST, "/categories", None, Some(json!({"id": 7, "name": "news"}))).await;
    let r = send(
        &app.router,
        Method::POST,
        "/posts",
        None,
        Some(json!({"title": "A", "category": {"id": 7}})),
    )
    .await;
    assert_eq!(r.status, StatusCode::CREATED);

    let r = send(
        &app.router,
        Method::PATCH,
        "/posts/1",
        None,
        Some(json!({"category": {"id": 7, "apiAction": "disconnect"}})),
    )
    .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST, "{}", r.body);
    let r = send(
        &app.router,
        Method::PATCH,
        "/posts/1",
        None,
        Some(json!({"category": {"name": "other", "apiAction": "delete"}})),
    )
    .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);

    assert_eq!(app.engine.records("category").await.len(), 1);
    let r = send(&app.router, Method::GET, "/posts/1", None, None).await;
    assert_eq!(r.body["categoryId"], json!(7));
}
