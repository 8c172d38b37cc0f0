// SPDX-License-Identifier: MIT OR Apache-2.0
//! Response envelope and the single error-conversion point.
//!
//! Every success and failure leaving the daemon uses the same shape:
//!
//! ```json
//! { "success": bool, "data": ..., "error": { "code", "message", "details" },
//!   "metadata": { "request_id", "timestamp", "version", "rate_limit" } }
//! ```
//!
//! Handlers and middleware never format HTTP errors themselves; they return
//! [`ApiFailure`] and the `IntoResponse` impl here does the rest. 5xx
//! responses carry only the code and correlation id; internal specifics
//! stay in logs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use af_error::{ControlError, ErrorBody, ErrorCode};
use af_ratelimit::Decision;

/// Quota metadata mirrored from the `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitMeta {
    /// The limit in effect.
    pub limit: u32,
    /// Remaining quota in the window.
    pub remaining: u32,
    /// Unix second the window resets.
    pub reset: u64,
}

impl From<Decision> for RateLimitMeta {
    fn from(d: Decision) -> Self {
        Self {
            limit: d.limit,
            remaining: d.remaining,
            reset: d.reset_unix,
        }
    }
}

/// The `metadata` object of every response.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMeta {
    /// Correlation id of the request.
    pub request_id: String,
    /// Server time the response was produced.
    pub timestamp: String,
    /// Service contract version.
    pub version: &'static str,
    /// Quota state, when the rate limiter ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitMeta>,
}

impl ResponseMeta {
    /// Metadata for the given correlation id.
    #[must_use]
    pub fn new(request_id: impl Into<String>, rate_limit: Option<Decision>) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: Utc::now().to_rfc3339(),
            version: af_core::CONTRACT_VERSION,
            rate_limit: rate_limit.map(RateLimitMeta::from),
        }
    }
}

#[derive(Serialize)]
struct Envelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    metadata: ResponseMeta,
}

/// Build a success response.
#[must_use]
pub fn api_ok(status: StatusCode, data: serde_json::Value, meta: ResponseMeta) -> Response {
    let body = Envelope {
        success: true,
        data: Some(data),
        error: None,
        metadata: meta,
    };
    (status, Json(body)).into_response()
}

/// A failed request: the domain error plus the correlation id to echo.
#[derive(Debug)]
pub struct ApiFailure {
    /// The taxonomy error.
    pub error: ControlError,
    /// Correlation id of the request.
    pub request_id: String,
}

impl ApiFailure {
    /// Pair an error with its request's correlation id.
    #[must_use]
    pub fn new(error: ControlError, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // 5xx: scrub the message and details; the correlation id is enough
        // for the caller, the rest lives in logs.
        let error_body = if status.is_server_error() {
            tracing::error!(
                code = %self.error.code,
                request_id = %self.request_id,
                error = %self.error,
                "request failed"
            );
            ErrorBody {
                code: self.error.code,
                message: user_safe_5xx_message(self.error.code),
                details: Default::default(),
            }
        } else {
            ErrorBody::from(&self.error)
        };

        let body = Envelope {
            success: false,
            data: None,
            error: Some(error_body),
            metadata: ResponseMeta::new(self.request_id, None),
        };
        (status, Json(body)).into_response()
    }
}

fn user_safe_5xx_message(code: ErrorCode) -> String {
    match code {
        ErrorCode::UpstreamUnavailable => "a dependency is temporarily unavailable".to_string(),
        _ => "internal server error".to_string(),
    }
}
