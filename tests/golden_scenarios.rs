// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-crate golden scenarios: the end-to-end behaviors the control plane
//! guarantees, exercised through the full admission pipeline and the
//! in-memory collaborators.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use af_audit::{AuditStore, ChainVerifier};
use af_bus::Broker;
use af_config::ControlConfig;
use af_server::{AppState, InMemoryParts, build_app};

const SECRET: &str = "golden-scenario-secret-0123456789abcdef";

fn config(max_requests: u32) -> ControlConfig {
    let mut config = ControlConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config.rate_limit.max_requests = max_requests;
    config
}

async fn stack(config: ControlConfig) -> (Router, AppState, InMemoryParts) {
    let (state, parts) = AppState::in_memory(config).unwrap();
    state
        .bus
        .init_streams(std::time::Duration::from_secs(3600))
        .await
        .unwrap();
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
    let app = build_app(state.clone());
    (app, state, parts)
}

fn viewer_token(state: &AppState, tenant: &str) -> String {
    state
        .auth
        .local_service()
        .issue(
            tenant,
            "u-viewer",
            vec!["viewer".into()],
            vec!["workflows:read".into(), "agents:read".into()],
        )
        .unwrap()
}

async fn get(app: &Router, path: &str, token: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

// Scenario 1 — happy-path workflow read.
#[tokio::test]
async fn happy_path_workflow_read() {
    let (app, state, parts) = stack(config(1000)).await;
    let token = viewer_token(&state, "T1");

    let (status, headers, body) = get(&app, "/api/v1/workflows", &token).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["metadata"]["request_id"].is_string());
    assert!(headers.contains_key("x-ratelimit-limit"));
    assert!(headers.contains_key("x-ratelimit-remaining"));
    assert!(headers.contains_key("x-ratelimit-reset"));

    let log = parts.db.statement_log().await;
    assert!(
        log.iter()
            .any(|stmt| stmt.contains("FROM workflows") && stmt.contains("WHERE tenant_id = 'T1'")),
        "expected a tenant-scoped workflows query, got: {log:?}"
    );
}

// Scenario 2 — cross-tenant read answers NOT_FOUND and is audited.
#[tokio::test]
async fn cross_tenant_denial_is_not_found_and_audited() {
    let (app, state, parts) = stack(config(1000)).await;
    parts
        .db
        .seed(
            "workflows",
            af_store::Row::from_iter([
                ("id".to_string(), Value::from("wf-of-t2")),
                ("tenant_id".to_string(), Value::from("T2")),
                ("name".to_string(), Value::from("hidden")),
                ("version".to_string(), Value::from(1)),
                ("definition".to_string(), Value::from("")),
                ("planner_kind".to_string(), Value::from("static")),
                ("created_at".to_string(), Value::from("2026-01-01T00:00:00Z")),
                ("updated_at".to_string(), Value::from("2026-01-01T00:00:00Z")),
            ]),
        )
        .await;
    let token = viewer_token(&state, "T1");

    let (status, _, body) = get(&app, "/api/v1/workflows/wf-of-t2", &token).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let entries = parts.audit_store.page("T1", 0, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "cross_tenant_attempt");
}

// Scenario 3 — RBAC denial carries the required permission.
#[tokio::test]
async fn viewer_write_is_denied_with_required_permission() {
    let (app, state, _parts) = stack(config(1000)).await;
    let token = viewer_token(&state, "T1");

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/api/v1/workflows/w1")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"definition": "x"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");
    assert_eq!(
        body["error"]["details"]["required_permission"],
        "workflows:write"
    );
}

// Scenario 4 — the request past the window limit is rejected with
// Retry-After.
#[tokio::test]
async fn request_over_window_limit_is_429() {
    let (app, state, _parts) = stack(config(1000)).await;
    let token = viewer_token(&state, "T1");

    let mut last_remaining = u64::MAX;
    for _ in 0..1000 {
        let (status, headers, _) = get(&app, "/api/v1/workflows", &token).await;
        assert_eq!(status, StatusCode::OK);
        let remaining: u64 = headers["x-ratelimit-remaining"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(remaining <= last_remaining, "remaining must not grow");
        last_remaining = remaining;
    }

    let (status, headers, body) = get(&app, "/api/v1/workflows", &token).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    let retry_after: u64 = headers[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
}

// Scenario 5 — chain verification pinpoints the tampered entry.
#[tokio::test]
async fn audit_tamper_is_detected_at_index_one() {
    let (_, state, parts) = stack(config(1000)).await;

    for action in ["one", "two", "three"] {
        state
            .audit
            .append(af_audit::AuditDraft::new(
                "T1",
                af_audit::ActorType::System,
                "core",
                action,
                "test",
            ))
            .await
            .unwrap();
    }
    parts
        .audit_store
        .tamper_with("T1", 1, |entry| entry.action = "forged".into())
        .await;

    let store: Arc<dyn AuditStore> = parts.audit_store.clone();
    let report = ChainVerifier::new().verify(&store, "T1").await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.first_tampered_index, Some(1));
    assert_eq!(report.total, 2);
}

// Scenario 6 — a consumer rejects an envelope whose payload was swapped
// after sealing; the handler never runs.
#[tokio::test]
async fn tampered_envelope_never_reaches_the_handler() {
    let (_, state, parts) = stack(config(1000)).await;

    let sealed = af_core::EnvelopeBuilder::new("publisher", "consumer", af_core::MessageKind::Event)
        .payload(json!({"amount": 1}))
        .build()
        .seal()
        .unwrap();
    let mut forged = sealed.clone();
    forged.payload = Some(json!({"amount": 1_000_000}));
    // Same envelope_hash, different payload.
    parts
        .broker
        .publish(
            "T1.workflows.transfer",
            serde_json::to_vec(&forged).unwrap(),
        )
        .await
        .unwrap();

    let invocations = Arc::new(std::sync::Mutex::new(0usize));
    let seen = invocations.clone();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let bus = state.bus.clone();
    let worker = tokio::spawn(async move {
        bus.run_subscription("workflows", "golden", shutdown_rx, move |_env| {
            let seen = seen.clone();
            async move {
                *seen.lock().unwrap() += 1;
                Ok(())
            }
        })
        .await
    });

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();
    worker.await.unwrap().unwrap();

    assert_eq!(*invocations.lock().unwrap(), 0);
}
