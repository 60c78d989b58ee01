//! HTTP API tests
//!
//! Drives the router directly with collected request bodies, the way the
//! server hands requests over after reading them.

use bytes::Bytes;
use clap::Parser;
use http_body_util::BodyExt;
use hyper::{header, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

use codex::auth::{Principal, Role};
use codex::db::memory_store;
use codex::routes::{self, FullBody};
use codex::schema::EntityKind;
use codex::users::UserDoc;
use codex::{AppState, Args};

fn state() -> AppState {
    let args = Args::try_parse_from(["codex", "--dev-mode"]).unwrap();
    AppState::new(args, Arc::new(memory_store())).unwrap()
}

async fn seed_item(state: &AppState) {
    let record = json!({
        "id": "gpu",
        "name": "Graphics card",
        "category": "barter",
        "base_price": 250000,
        "weight": 0.6,
        "width": 2,
        "height": 1,
        "quest_item": false
    });
    let Value::Object(record) = record else {
        unreachable!()
    };
    state.entities.insert_record(EntityKind::Item, record).await.unwrap();
}

fn token(state: &AppState, principal: &Principal) -> String {
    state.jwt.issue(principal, 3600).unwrap()
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Bytes> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = body
        .map(|v| Bytes::from(serde_json::to_vec(&v).unwrap()))
        .unwrap_or_default();
    builder.body(body).unwrap()
}

async fn body_json(response: Response<FullBody>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn header_str<'a>(response: &'a Response<FullBody>, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn test_health() {
    let state = state();
    let response = routes::route(&state, request(Method::GET, "/health", None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_entity_page_cached_with_etag() {
    let state = state();
    seed_item(&state).await;

    let first = routes::route(&state, request(Method::GET, "/entities/item/gpu", None, None)).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_str(&first, "X-Cache"), "MISS");
    let etag = header_str(&first, "etag").to_string();
    let body = body_json(first).await;
    assert_eq!(body["record"]["name"], "Graphics card");
    assert_eq!(body["editable"]["name"], "Graphics card");
    assert!(body["editable"].get("version").is_none());

    let second = routes::route(&state, request(Method::GET, "/entities/item/gpu", None, None)).await;
    assert_eq!(header_str(&second, "X-Cache"), "HIT");

    let mut conditional = request(Method::GET, "/entities/item/gpu", None, None);
    conditional
        .headers_mut()
        .insert(header::IF_NONE_MATCH, etag.parse().unwrap());
    let third = routes::route(&state, conditional).await;
    assert_eq!(third.status(), StatusCode::NOT_MODIFIED);

    let missing = routes::route(&state, request(Method::GET, "/entities/item/nope", None, None)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_requires_token() {
    let state = state();
    let response = routes::route(
        &state,
        request(Method::POST, "/corrections", None, Some(json!({}))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_correction_round_trip() {
    let state = state();
    seed_item(&state).await;

    let user = token(&state, &Principal::new("u-1", "alice", [Role::User]));
    let moderator = token(
        &state,
        &Principal::new("m-1", "mod", [Role::User, Role::Moderator]),
    );

    // Warm the page so the merge has something to invalidate
    routes::route(&state, request(Method::GET, "/entities/item/gpu", None, None)).await;

    let submitted = routes::route(
        &state,
        request(
            Method::POST,
            "/corrections",
            Some(&user),
            Some(json!({
                "entityType": "item",
                "entityId": "gpu",
                "proposedData": { "base_price": 240000, "name": "Graphics card" },
                "reason": "Flea market price dropped"
            })),
        ),
    )
    .await;
    assert_eq!(submitted.status(), StatusCode::CREATED);
    let correction = body_json(submitted).await;
    assert_eq!(correction["status"], "pending");
    assert_eq!(correction["changes"], json!({ "base_price": 240000 }));
    let id = correction["id"].as_str().unwrap().to_string();
    let review_uri = format!("/admin/corrections/{id}/review");

    // Submitters cannot review
    let forbidden = routes::route(
        &state,
        request(Method::POST, &review_uri, Some(&user), Some(json!({ "decision": "approved" }))),
    )
    .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(forbidden).await["error"],
        "You do not have permission to perform this action"
    );

    let bad_decision = routes::route(
        &state,
        request(Method::POST, &review_uri, Some(&moderator), Some(json!({ "decision": "maybe" }))),
    )
    .await;
    assert_eq!(bad_decision.status(), StatusCode::BAD_REQUEST);

    let approved = routes::route(
        &state,
        request(Method::POST, &review_uri, Some(&moderator), Some(json!({ "decision": "approved" }))),
    )
    .await;
    assert_eq!(approved.status(), StatusCode::OK);
    let approved = body_json(approved).await;
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["applyState"], "applied");

    let again = routes::route(
        &state,
        request(Method::POST, &review_uri, Some(&moderator), Some(json!({ "decision": "rejected" }))),
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let page = routes::route(&state, request(Method::GET, "/entities/item/gpu", None, None)).await;
    assert_eq!(header_str(&page, "X-Cache"), "MISS");
    let page = body_json(page).await;
    assert_eq!(page["record"]["base_price"], 240000);
    assert_eq!(page["record"]["weight"], 0.6);

    // The submitter sees it in their own list
    let mine = routes::route(&state, request(Method::GET, "/corrections", Some(&user), None)).await;
    let mine = body_json(mine).await;
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["corrections"][0]["id"], id.as_str());
}

#[tokio::test]
async fn test_unchanged_submission_rejected() {
    let state = state();
    seed_item(&state).await;
    let user = token(&state, &Principal::new("u-1", "alice", [Role::User]));

    let response = routes::route(
        &state,
        request(
            Method::POST,
            "/corrections",
            Some(&user),
            Some(json!({
                "entityType": "item",
                "entityId": "gpu",
                "proposedData": { "name": "Graphics card" },
                "reason": "Looks wrong"
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_admin_user_update_errors() {
    let state = state();
    let alice = state
        .users
        .create_user(UserDoc::new("alice", "alice@example.com"))
        .await
        .unwrap();
    let admin = token(
        &state,
        &Principal::new(uuid::Uuid::new_v4().to_string(), "root", [Role::User, Role::Admin]),
    );
    let uri = format!("/admin/users/{}", alice.id);

    let response = routes::route(
        &state,
        request(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "fields": { "username": "no spaces allowed", "rank": "general" } })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|issue| issue["field"].as_str())
        .collect();
    assert!(fields.contains(&"username"));
    assert!(fields.contains(&"rank"));

    let response = routes::route(
        &state,
        request(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "fields": { "displayName": "Alice", "rank": "scout" } })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["displayName"], "Alice");
    assert_eq!(body["rank"], "scout");

    let profile = routes::route(&state, request(Method::GET, "/users/Alice", None, None)).await;
    assert_eq!(profile.status(), StatusCode::OK);
    let profile = body_json(profile).await;
    assert_eq!(profile["displayName"], "Alice");
    assert!(profile.get("email").is_none());
}
