mod common;

use axum::http::StatusCode;
use common::{Credential, TestApp, TEST_MASTER_KEY};
use serde_json::json;

#[tokio::test]
async fn test_signup_then_login() {
    let app = TestApp::spawn().await;
    let (user_id, _) = app.signup("alice", "correct horse").await;

    let (status, body) = app
        .post(
            "/auth/login",
            json!({"auth_data": {"username": "alice"}, "password": "correct horse"}),
            Credential::None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.as_str());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["auth_data"]["username"], "alice");

    let (status, _) = app
        .post(
            "/auth/login",
            json!({"auth_data": {"username": "alice"}, "password": "wrong"}),
            Credential::None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_signup_conflicts() {
    let app = TestApp::spawn().await;
    app.signup("alice", "pw-1").await;

    let (status, _) = app
        .post(
            "/auth/signup",
            json!({"auth_data": {"username": "alice"}, "password": "pw-2"}),
            Credential::None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_anonymous_signup_and_rejected_auth_data() {
    let app = TestApp::spawn().await;

    let (status, body) = app.post("/auth/signup", json!({}), Credential::None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body.get("auth_data").is_none());

    let (status, _) = app
        .post(
            "/auth/signup",
            json!({"auth_data": {"username": "bob"}}),
            Credential::None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_password_change_revokes_older_tokens() {
    let app = TestApp::spawn().await;
    let (_, old_token) = app.signup("alice", "first").await;

    let (status, body) = app
        .post(
            "/auth/password",
            json!({"old_password": "first", "password": "second"}),
            Credential::Bearer(&old_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_token = body["access_token"].as_str().unwrap().to_string();

    let query = json!({"record_type": "note"});
    let (status, _) = app
        .post("/records/query", query.clone(), Credential::Bearer(&old_token))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/records/query", query, Credential::Bearer(&new_token))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_role_assignment_requires_master_key_or_admin() {
    let app = TestApp::spawn().await;
    let (alice, alice_token) = app.signup("alice", "pw").await;
    let (bob, _) = app.signup("bob", "pw").await;

    let assign = |user: &str| json!({"user_ids": [user], "roles": ["admin"]});

    let (status, _) = app
        .post("/auth/role/assign", assign(bob.as_str()), Credential::Bearer(&alice_token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/auth/role/assign",
            assign(alice.as_str()),
            Credential::MasterKey(TEST_MASTER_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Roles are read from storage on every request, so the same token now
    // carries the admin role.
    let (status, _) = app
        .post("/auth/role/assign", assign(bob.as_str()), Credential::Bearer(&alice_token))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_bad_credentials_are_unauthorized() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .get("/schema/field_access", Credential::MasterKey("not-the-key"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/records/query",
            json!({"record_type": "note"}),
            Credential::Bearer("garbage"),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/records/query", json!({"record_type": "note"}), Credential::None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
