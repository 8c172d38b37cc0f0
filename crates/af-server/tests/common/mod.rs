// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for daemon integration tests.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use af_config::ControlConfig;
use af_server::{AppState, InMemoryParts};

/// 32+ bytes, shared with tests that hand-craft tokens.
pub const TEST_SECRET: &str = "test-secret-test-secret-test-secret!";

pub fn test_config() -> ControlConfig {
    let mut config = ControlConfig::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.rate_limit.max_requests = 1000;
    config
}

pub async fn test_state(config: ControlConfig) -> (AppState, InMemoryParts) {
    let (state, parts) = AppState::in_memory(config).expect("state assembles");
    // A registered tenant so name resolution has something to find.
    parts
        .db
        .seed(
            "tenants",
            af_store::Row::from_iter([
                ("id".to_string(), Value::from("T1")),
                ("name".to_string(), Value::from("Tenant One")),
                ("tier".to_string(), Value::from("pro")),
            ]),
        )
        .await;
    (state, parts)
}

pub fn token(state: &AppState, tenant: &str, user: &str, roles: &[&str]) -> String {
    let permissions = match roles.first().copied() {
        Some("admin") => vec!["*:*".to_string()],
        Some("developer") => vec![
            "workflows:read".into(),
            "workflows:write".into(),
            "agents:read".into(),
            "agents:write".into(),
            "tools:read".into(),
            "tools:write".into(),
            "budgets:read".into(),
            "budgets:write".into(),
        ],
        _ => vec!["workflows:read".into(), "agents:read".into()],
    };
    state
        .auth
        .local_service()
        .issue(
            tenant,
            user,
            roles.iter().map(|r| r.to_string()).collect(),
            permissions,
        )
        .expect("token issues")
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

pub async fn call(
    app: &Router,
    method: Method,
    path: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        headers,
        body,
    }
}
