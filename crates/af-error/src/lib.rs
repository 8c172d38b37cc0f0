//! Closed error taxonomy with stable codes for the AgentFlow control plane.
//!
//! Every user-visible failure carries an [`ErrorCode`] (a machine-readable,
//! stable string tag with a fixed HTTP status), a user-safe message, an
//! optional cause chain, and structured diagnostic details. Use the builder
//! returned by [`ControlError::new`] to construct errors fluently. The
//! taxonomy is closed: handlers and middleware may only surface these codes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Token validation failures.
    Authentication,
    /// Permission and role failures.
    Authorization,
    /// Attempts to reach across the tenant boundary.
    CrossTenant,
    /// Malformed or semantically invalid input.
    Validation,
    /// Quota exhaustion.
    RateLimit,
    /// Missing or conflicting resources.
    Resource,
    /// Hash-chain or envelope integrity violations.
    Integrity,
    /// Failures of external collaborators (database, broker, cache, IdP).
    Upstream,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::CrossTenant => "cross_tenant",
            Self::Validation => "validation",
            Self::RateLimit => "rate_limit",
            Self::Resource => "resource",
            Self::Integrity => "integrity",
            Self::Upstream => "upstream",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases, and maps 1–1 onto an
/// HTTP status via [`ErrorCode::http_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bearer token failed signature or structural validation.
    AuthTokenInvalid,
    /// Bearer token is past its expiry.
    AuthTokenExpired,
    /// Caller lacks the permission a route requires.
    InsufficientPermissions,
    /// Caller addressed data owned by another tenant.
    CrossTenantDenied,
    /// Request body or parameters failed validation.
    ValidationFailed,
    /// Quota for the caller's window is exhausted.
    RateLimited,
    /// The addressed resource does not exist (for the caller).
    NotFound,
    /// The request conflicts with current state (version, budget, CAS).
    Conflict,
    /// An envelope hash or audit chain failed verification.
    IntegrityError,
    /// An external collaborator (cache, broker, IdP) is unreachable.
    UpstreamUnavailable,
    /// Unexpected internal failure; details stay in logs.
    InternalServerError,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthTokenInvalid | Self::AuthTokenExpired => ErrorCategory::Authentication,

            Self::InsufficientPermissions => ErrorCategory::Authorization,

            Self::CrossTenantDenied => ErrorCategory::CrossTenant,

            Self::ValidationFailed => ErrorCategory::Validation,

            Self::RateLimited => ErrorCategory::RateLimit,

            Self::NotFound | Self::Conflict => ErrorCategory::Resource,

            Self::IntegrityError => ErrorCategory::Integrity,

            Self::UpstreamUnavailable => ErrorCategory::Upstream,

            Self::InternalServerError => ErrorCategory::Internal,
        }
    }

    /// The single HTTP status this code maps onto.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthTokenInvalid | Self::AuthTokenExpired => 401,
            Self::InsufficientPermissions | Self::CrossTenantDenied => 403,
            Self::ValidationFailed => 400,
            Self::RateLimited => 429,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::IntegrityError => 422,
            Self::UpstreamUnavailable => 503,
            Self::InternalServerError => 500,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"AUTH_TOKEN_INVALID"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthTokenInvalid => "AUTH_TOKEN_INVALID",
            Self::AuthTokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::CrossTenantDenied => "CROSS_TENANT_DENIED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::IntegrityError => "INTEGRITY_ERROR",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ControlError
// ---------------------------------------------------------------------------

/// Unified control-plane error.
///
/// Carries a stable [`ErrorCode`], a user-safe message, an optional source
/// error for cause-chaining, and structured details surfaced to 4xx callers.
/// 5xx callers only ever see the code and a correlation id; the message and
/// details of internal errors stay in logs.
///
/// # Builder usage
///
/// ```
/// use af_error::{ControlError, ErrorCode};
///
/// let err = ControlError::new(ErrorCode::InsufficientPermissions, "permission denied")
///     .with_detail("required_permission", "workflows:write")
///     .with_detail("effective_permissions", vec!["workflows:read"]);
/// ```
pub struct ControlError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// User-safe description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Structured details for diagnostic responses.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ControlError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            details: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic details.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Shorthand for `self.code.http_status()`.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    // -- Convenience constructors for the common codes -----------------------

    /// `NOT_FOUND` — the resource does not exist for this caller.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// `VALIDATION_FAILED` — malformed or invalid input.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    /// `CONFLICT` — the request conflicts with current state.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// `INTERNAL_SERVER_ERROR` — unexpected failure; message is logged, not
    /// surfaced.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    /// `UPSTREAM_UNAVAILABLE` — an external collaborator is down.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }
}

impl fmt::Debug for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ControlError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.details.is_empty() {
            d.field("details", &self.details);
        }
        d.finish()
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.details.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(details) = serde_json::to_string(&self.details) {
                write!(f, " {details}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`ControlError`] — the wire `error` object of
/// the response envelope (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    /// Error code.
    pub code: ErrorCode,
    /// User-safe message.
    pub message: String,
    /// Structured details.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl From<&ControlError> for ErrorBody {
    fn from(err: &ControlError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
