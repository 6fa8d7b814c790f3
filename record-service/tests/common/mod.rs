//! Shared setup for the HTTP integration tests: an in-memory app driven
//! through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use record_service::{
    build_router,
    config::{
        AuthSettings, Environment, JwtConfig, RecordConfig, SecurityConfig, StorageConfig,
    },
    AppState,
};
use serde_json::Value;
use tower::util::ServiceExt;

pub const TEST_MASTER_KEY: &str = "test-master-key";

pub fn test_config() -> RecordConfig {
    RecordConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "record-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        storage: StorageConfig::Memory,
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_token_expiry_minutes: 15,
        },
        auth: AuthSettings {
            record_keys: vec![vec!["username".to_string()], vec!["email".to_string()]],
            admin_roles: vec!["admin".to_string()],
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            master_key: TEST_MASTER_KEY.to_string(),
        },
    }
}

pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let state = AppState::new(test_config())
            .await
            .expect("Failed to build app state");
        let router = build_router(state).await.expect("Failed to build router");
        Self { router }
    }

    /// POST a JSON body, optionally with a bearer token or the master key.
    pub async fn post(&self, uri: &str, body: Value, auth: Credential<'_>) -> (StatusCode, Value) {
        let request = auth
            .apply(Request::builder().method("POST").uri(uri))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, auth: Credential<'_>) -> (StatusCode, Value) {
        let request = auth
            .apply(Request::builder().method("GET").uri(uri))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Sign up with a username and password, returning `(user_id, token)`.
    pub async fn signup(&self, username: &str, password: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/auth/signup",
                serde_json::json!({
                    "auth_data": {"username": username},
                    "password": password
                }),
                Credential::None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["access_token"].as_str().unwrap().to_string(),
        )
    }
}

#[derive(Clone, Copy)]
pub enum Credential<'a> {
    None,
    Bearer(&'a str),
    MasterKey(&'a str),
}

impl Credential<'_> {
    fn apply(self, builder: axum::http::request::Builder) -> axum::http::request::Builder {
        match self {
            Credential::None => builder,
            Credential::Bearer(token) => {
                builder.header(header::AUTHORIZATION, format!("Bearer {}", token))
            }
            Credential::MasterKey(key) => builder.header("x-master-key", key),
        }
    }
}
