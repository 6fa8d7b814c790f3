mod common;

use axum::http::StatusCode;
use common::{Credential, TestApp, TEST_MASTER_KEY};
use serde_json::json;

fn note_table() -> serde_json::Value {
    json!({
        "access": [
            {"record_type": "note", "record_field": "title", "user_role": "_public",
             "readable": true, "comparable": true},
            {"record_type": "note", "record_field": "title", "user_role": "_owner",
             "readable": true, "writable": true, "comparable": true}
        ]
    })
}

#[tokio::test]
async fn test_update_requires_master_key() {
    let app = TestApp::spawn().await;
    let (_, token) = app.signup("alice", "pw").await;

    let (status, _) = app
        .post(
            "/schema/field_access/update",
            note_table(),
            Credential::Bearer(&token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post("/schema/field_access/update", note_table(), Credential::None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            "/schema/field_access/update",
            note_table(),
            Credential::MasterKey(TEST_MASTER_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .get("/schema/field_access", Credential::MasterKey(TEST_MASTER_KEY))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access"][0]["record_field"], "title");
    assert_eq!(body["access"][0]["user_role"], "_public");
}

#[tokio::test]
async fn test_invalid_table_keeps_previous_rules() {
    let app = TestApp::spawn().await;
    let master = Credential::MasterKey(TEST_MASTER_KEY);

    let (status, _) = app
        .post("/schema/field_access/update", note_table(), master)
        .await;
    assert_eq!(status, StatusCode::OK);

    let duplicated = json!({
        "access": [
            {"record_type": "note", "record_field": "title", "user_role": "_public"},
            {"record_type": "note", "record_field": "title", "user_role": "_public",
             "readable": true}
        ]
    });
    let (status, _) = app
        .post("/schema/field_access/update", duplicated, master)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/schema/field_access", master).await;
    assert_eq!(body["access"].as_array().unwrap().len(), 2);
}
