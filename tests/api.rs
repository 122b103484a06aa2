use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    Router,
};
use axum_test::TestServer;
use serde_json::{json, Value};
use taxonomy_reorder::api::{self, TermRecord, TermStore};
use taxonomy_reorder::tree::{collect_ids, Forest};
use tower::ServiceExt;

const NONCE: &str = "test-nonce";

fn term(id: i32, name: &str, parent: i32) -> TermRecord {
    TermRecord {
        id,
        name: name.to_string(),
        slug: String::new(),
        parent,
        menu_order: None,
    }
}

fn setup() -> Router {
    let mut store = TermStore::new();
    store.seed(
        "category",
        true,
        vec![term(1, "News", 0), term(2, "Sport", 0), term(3, "Tennis", 2)],
    );
    store.seed("post_tag", false, vec![term(9, "misc", 0)]);
    api::create_router(store, NONCE)
}

fn nonce_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-wp-nonce"),
        HeaderValue::from_static(NONCE),
    )
}

#[tokio::test]
async fn test_terms_and_save_round_trip() {
    let server = TestServer::new(setup()).unwrap();
    let (name, value) = nonce_header();

    let response = server
        .get("/reorder/v1/terms")
        .add_query_param("taxonomy", "category")
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();
    let forest: Forest = response.json();
    assert_eq!(collect_ids(&forest), vec![1, 2, 3]);
    assert_eq!(forest[1].children[0].name.as_deref(), Some("Tennis"));

    let response = server
        .post("/reorder/v1/save")
        .add_query_param("taxonomy", "category")
        .add_header(name.clone(), value.clone())
        .json(&json!([
            { "id": 2, "children": [{ "id": 3, "children": [{ "id": 1, "children": [] }] }] }
        ]))
        .await;
    response.assert_status_ok();
    response.assert_json(&json!({ "success": true }));

    let forest: Forest = server
        .get("/reorder/v1/terms")
        .add_query_param("taxonomy", "category")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(collect_ids(&forest), vec![2, 3, 1]);
    assert_eq!(forest[0].children[0].children[0].parent, Some(3));
}

#[tokio::test]
async fn test_error_envelopes() {
    let server = TestServer::new(setup()).unwrap();
    let (name, value) = nonce_header();

    let response = server
        .get("/reorder/v1/terms")
        .add_query_param("taxonomy", "post_tag")
        .add_header(name.clone(), value.clone())
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "invalid_taxonomy");
    assert_eq!(body["data"]["status"], 400);

    let response = server
        .post("/reorder/v1/save")
        .add_query_param("taxonomy", "category")
        .add_header(name.clone(), value.clone())
        .text("not json")
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "invalid_data");
    assert_eq!(body["message"], "Invalid JSON payload.");

    let response = server
        .get("/reorder/v1/terms")
        .add_header(name, value)
        .expect_failure()
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_nonce_is_forbidden() {
    let response = setup()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/reorder/v1/terms?taxonomy=category")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "rest_forbidden");
}

#[tokio::test]
async fn test_save_with_wrong_nonce_changes_nothing() {
    let app = setup();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reorder/v1/save?taxonomy=category")
                .header("Content-Type", "application/json")
                .header("X-WP-Nonce", "stale")
                .body(Body::from(json!([{ "id": 3 }]).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/reorder/v1/terms?taxonomy=category")
                .header("X-WP-Nonce", NONCE)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let forest: Forest = serde_json::from_slice(&body).unwrap();
    assert_eq!(collect_ids(&forest), vec![1, 2, 3]);
}
