// SPDX-License-Identifier: MIT OR Apache-2.0
//! The admission pipeline.
//!
//! Stage order is contractual: recovery → correlation + logging → tracing →
//! authentication → tenant scoping → RBAC → rate limiting → redaction.
//! Tracing precedes authn so auth spans exist; tenant scoping precedes RBAC
//! so permissions evaluate in the right tenant; rate limiting follows authn
//! so quotas key on identity.
//!
//! Stages publish response headers through a shared [`PipelineHeaders`]
//! slot that the recovery stage merges into every response, including the
//! 500 it synthesizes from a panic, so correlation and quota headers
//! survive unwinding.

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::Instrument;
use ulid::Ulid;

use af_core::context::{TenantContext, TraceContext};
use af_error::{ControlError, ErrorCode};
use af_token::{Claims, TokenError};

use crate::api::ApiFailure;
use crate::state::AppState;

/// Routes exempt from authentication and quota (liveness must never 401).
pub const HEALTH_PATH: &str = "/api/v1/health";

// ---------------------------------------------------------------------------
// Shared response-header slot
// ---------------------------------------------------------------------------

/// Headers recorded by pipeline stages before the handler runs, merged into
/// the response by the recovery stage on both normal and panic paths.
#[derive(Clone, Default)]
pub struct PipelineHeaders(Arc<Mutex<Vec<(HeaderName, HeaderValue)>>>);

impl PipelineHeaders {
    /// Record a header.
    pub fn set(&self, name: HeaderName, value: HeaderValue) {
        self.0.lock().expect("header slot poisoned").push((name, value));
    }

    fn snapshot(&self) -> Vec<(HeaderName, HeaderValue)> {
        self.0.lock().expect("header slot poisoned").clone()
    }

    fn correlation_id(&self) -> Option<String> {
        self.snapshot()
            .iter()
            .find(|(name, _)| name == &HeaderName::from_static("x-correlation-id"))
            .and_then(|(_, value)| value.to_str().ok().map(str::to_string))
    }
}

/// The request's correlation id, as a request extension.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

// ---------------------------------------------------------------------------
// Stage 1: recovery
// ---------------------------------------------------------------------------

/// Catches panics from every later stage and handler, answering a clean 500
/// without leaking the panic payload. The stack and correlation id go to
/// the log.
pub async fn recovery(mut req: Request, next: Next) -> Response {
    let slot = PipelineHeaders::default();
    req.extensions_mut().insert(slot.clone());

    let outcome = AssertUnwindSafe(next.run(req)).catch_unwind().await;
    let mut response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            let request_id = slot.correlation_id().unwrap_or_else(|| "unknown".to_string());
            tracing::error!(
                request_id = %request_id,
                panic = %detail,
                "handler panicked"
            );
            ApiFailure::new(
                ControlError::internal(format!("panic: {detail}")),
                request_id,
            )
            .into_response()
        }
    };

    for (name, value) in slot.snapshot() {
        if !response.headers().contains_key(&name) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Stage 2: correlation + logging
// ---------------------------------------------------------------------------

/// Assigns (or adopts) the correlation id, echoes it as a response header,
/// and logs one structured line per request.
pub async fn correlation(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Ulid::new().to_string());

    req.extensions_mut().insert(CorrelationId(id.clone()));
    if let Some(slot) = req.extensions().get::<PipelineHeaders>() {
        if let Ok(value) = HeaderValue::from_str(&id) {
            slot.set(HeaderName::from_static("x-correlation-id"), value);
        }
    }

    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    let bytes = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    tracing::info!(
        http.method = %method,
        http.path = %path,
        http.status = response.status().as_u16(),
        http.bytes = bytes,
        http.duration_ms = start.elapsed().as_millis() as u64,
        correlation_id = %id,
        "request completed"
    );

    response
}

// ---------------------------------------------------------------------------
// Stage 3: tracing
// ---------------------------------------------------------------------------

/// Starts the server span, adopting upstream trace context from the
/// `traceparent` header when present. The [`TraceContext`] extension is
/// what downstream publishes inject into envelopes.
pub async fn trace_stage(mut req: Request, next: Next) -> Response {
    let trace = req
        .headers()
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .and_then(TraceContext::from_traceparent)
        .map_or_else(TraceContext::new_root, |upstream| upstream.child());

    let span = tracing::info_span!(
        "http_request",
        http.method = %req.method(),
        http.path = %req.uri().path(),
        trace_id = %trace.trace_id,
        span_id = %trace.span_id,
    );

    req.extensions_mut().insert(trace);
    next.run(req).instrument(span).await
}

// ---------------------------------------------------------------------------
// Stage 4: authentication
// ---------------------------------------------------------------------------

/// Extracts and validates the bearer token, attaching [`Claims`] on
/// success.
pub async fn auth_stage(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }
    let request_id = correlation_of(&req);

    let token = match bearer_token(&req) {
        Some(token) => token,
        None => {
            return ApiFailure::new(
                ControlError::new(ErrorCode::AuthTokenInvalid, "missing bearer token"),
                request_id,
            )
            .into_response();
        }
    };

    match state.auth.validate(&token).await {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(TokenError::Expired) => ApiFailure::new(
            ControlError::new(ErrorCode::AuthTokenExpired, "token expired"),
            request_id,
        )
        .into_response(),
        Err(e) => ApiFailure::new(
            ControlError::new(ErrorCode::AuthTokenInvalid, "token validation failed")
                .with_source(e),
            request_id,
        )
        .into_response(),
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Stage 5: tenant scoping
// ---------------------------------------------------------------------------

/// Converts validated claims into the request's [`TenantContext`].
pub async fn tenant_stage(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }
    let request_id = correlation_of(&req);

    let Some(claims) = req.extensions().get::<Claims>().cloned() else {
        return ApiFailure::new(
            ControlError::new(ErrorCode::AuthTokenInvalid, "claims missing from request"),
            request_id,
        )
        .into_response();
    };
    if claims.tenant_id.is_empty() {
        return ApiFailure::new(
            ControlError::new(ErrorCode::CrossTenantDenied, "token carries no tenant"),
            request_id,
        )
        .into_response();
    }

    // The tenants registry is unscoped by design; resolve the display name
    // when the row exists, otherwise fall back to the id.
    let tenant_name = state
        .db
        .raw()
        .query(
            "SELECT * FROM tenants WHERE id = ?",
            &[serde_json::Value::from(claims.tenant_id.clone())],
        )
        .await
        .ok()
        .and_then(|rows| {
            rows.first()
                .and_then(|row| row.get("name"))
                .and_then(|v| v.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| claims.tenant_id.clone());

    let ctx = TenantContext::for_tenant(claims.tenant_id.clone(), tenant_name)
        .with_user(claims.user_id.clone())
        .with_permissions(claims.permissions.clone());
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

// ---------------------------------------------------------------------------
// Stage 6: RBAC
// ---------------------------------------------------------------------------

/// Resources whose routes carry a derived `resource:action` requirement.
const GUARDED_RESOURCES: &[&str] = &["workflows", "agents", "tools", "budgets", "plans"];

/// Derive the permission a route requires: the resource is the first path
/// segment under the API prefix, the action follows the method.
#[must_use]
pub fn route_permission(method: &Method, path: &str) -> Option<(String, &'static str)> {
    let rest = path.strip_prefix("/api/v1/")?;
    let resource = rest.split('/').next()?;
    if !GUARDED_RESOURCES.contains(&resource) {
        return None;
    }
    let action = if *method == Method::GET || *method == Method::HEAD {
        "read"
    } else {
        "write"
    };
    Some((resource.to_string(), action))
}

/// Enforces the route's required permission against the caller's roles.
pub async fn rbac_stage(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }
    let request_id = correlation_of(&req);

    let Some((resource, action)) = route_permission(req.method(), req.uri().path()) else {
        return next.run(req).await;
    };
    let Some(claims) = req.extensions().get::<Claims>().cloned() else {
        return next.run(req).await;
    };

    match state
        .rbac
        .require(&claims.tenant_id, &claims.roles, &resource, action)
        .await
    {
        Ok(()) => next.run(req).await,
        Err(af_rbac::RbacError::InsufficientPermissions { required, effective }) => {
            ApiFailure::new(
                ControlError::new(ErrorCode::InsufficientPermissions, "permission denied")
                    .with_detail("required_permission", &required)
                    .with_detail("effective_permissions", &effective),
                request_id,
            )
            .into_response()
        }
        Err(e) => ApiFailure::new(
            ControlError::upstream("role definitions unavailable").with_source(e),
            request_id,
        )
        .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Stage 7: rate limiting
// ---------------------------------------------------------------------------

/// Applies the distributed limiter and publishes the quota headers.
pub async fn ratelimit_stage(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == HEALTH_PATH {
        return next.run(req).await;
    }
    let request_id = correlation_of(&req);

    let tenant = req
        .extensions()
        .get::<TenantContext>()
        .map(|ctx| ctx.tenant_id.clone())
        .unwrap_or_default();
    let user = req
        .extensions()
        .get::<TenantContext>()
        .and_then(|ctx| ctx.user_id.clone());
    let endpoint = endpoint_class(req.uri().path());
    let mutating = *req.method() != Method::GET && *req.method() != Method::HEAD;

    let decision = state
        .limiter
        .check(&tenant, &endpoint, user.as_deref(), mutating)
        .await;

    if let Some(slot) = req.extensions().get::<PipelineHeaders>() {
        set_quota_headers(slot, &decision);
    }
    req.extensions_mut().insert(decision);

    if !decision.allowed {
        let retry_after = decision.retry_after_secs.unwrap_or(1);
        let mut response = ApiFailure::new(
            ControlError::new(ErrorCode::RateLimited, "rate limit exceeded")
                .with_detail("retry_after", retry_after),
            request_id,
        )
        .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(req).await
}

fn set_quota_headers(slot: &PipelineHeaders, decision: &af_ratelimit::Decision) {
    for (name, value) in [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_unix.to_string()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            slot.set(HeaderName::from_static(name), value);
        }
    }
}

fn endpoint_class(path: &str) -> String {
    path.strip_prefix("/api/v1/")
        .and_then(|rest| rest.split('/').next())
        .unwrap_or("other")
        .to_string()
}

// ---------------------------------------------------------------------------
// Stage 8: redaction (feature-flagged)
// ---------------------------------------------------------------------------

/// When data minimization is enabled, rewrites response bodies through the
/// configured redaction rules before they leave the process.
pub async fn redaction_stage(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.config.data_minimization_enabled {
        return next.run(req).await;
    }

    let response = next.run(req).await;
    let (mut parts, body) = response.into_parts();

    let bytes = match http_body_util::BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return Response::from_parts(parts, axum::body::Body::empty());
        }
    };

    let redacted = match std::str::from_utf8(&bytes) {
        Ok(text) => {
            let mut text = text.to_string();
            for (pattern, replacement) in state.redaction.iter() {
                text = pattern.replace_all(&text, replacement.as_str()).into_owned();
            }
            axum::body::Bytes::from(text)
        }
        Err(_) => bytes,
    };

    // The body length may have changed.
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, axum::body::Body::from(redacted))
}

/// The default redaction rule set: emails, bearer tokens, SSN-shaped
/// digits.
#[must_use]
pub fn default_redaction_rules() -> Vec<(regex::Regex, String)> {
    [
        (
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            "[redacted-email]",
        ),
        (r"(?i)bearer\s+[A-Za-z0-9._\-]+", "Bearer [redacted]"),
        (r"\b\d{3}-\d{2}-\d{4}\b", "[redacted-ssn]"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            regex::Regex::new(pattern).expect("redaction pattern compiles"),
            replacement.to_string(),
        )
    })
    .collect()
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// The fixed CORS policy: any origin, the API methods, the API headers.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-correlation-id"),
        ]))
}

fn correlation_of(req: &Request) -> String {
    req.extensions()
        .get::<CorrelationId>()
        .map(|c| c.0.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_permission_derivation() {
        assert_eq!(
            route_permission(&Method::GET, "/api/v1/workflows"),
            Some(("workflows".into(), "read"))
        );
        assert_eq!(
            route_permission(&Method::PUT, "/api/v1/workflows/w1"),
            Some(("workflows".into(), "write"))
        );
        assert_eq!(
            route_permission(&Method::POST, "/api/v1/plans/estimate"),
            Some(("plans".into(), "write"))
        );
        assert_eq!(route_permission(&Method::GET, "/api/v1/health"), None);
        assert_eq!(route_permission(&Method::GET, "/other"), None);
    }

    #[test]
    fn endpoint_class_is_first_segment() {
        assert_eq!(endpoint_class("/api/v1/workflows/w1/start"), "workflows");
        assert_eq!(endpoint_class("/api/v1/health"), "health");
        assert_eq!(endpoint_class("/metrics"), "other");
    }

    #[test]
    fn redaction_rules_compile_and_match() {
        let rules = default_redaction_rules();
        let mut text = "contact dev@example.com with Bearer abc.def.ghi".to_string();
        for (pattern, replacement) in &rules {
            text = pattern.replace_all(&text, replacement.as_str()).into_owned();
        }
        assert!(!text.contains("dev@example.com"));
        assert!(!text.contains("abc.def.ghi"));
        assert!(text.contains("[redacted-email]"));
    }

    #[test]
    fn pipeline_headers_roundtrip() {
        let slot = PipelineHeaders::default();
        slot.set(
            HeaderName::from_static("x-correlation-id"),
            HeaderValue::from_static("abc"),
        );
        assert_eq!(slot.correlation_id().as_deref(), Some("abc"));
    }
}
