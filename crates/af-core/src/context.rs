// SPDX-License-Identifier: MIT OR Apache-2.0
//! Request-scoped context values carried through the admission pipeline.
//!
//! A [`TenantContext`] is derived from validated token claims and travels
//! with every call into the data layer; a [`TraceContext`] carries W3C
//! trace identity into logs and downstream message publishes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TenantContext
// ---------------------------------------------------------------------------

/// Per-tenant resource ceilings attached to the request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceLimits {
    /// Maximum concurrently running workflows, if capped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_workflows: Option<u32>,
    /// Maximum agents registered, if capped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_agents: Option<u32>,
}

/// The validated tenant identity of a request.
///
/// Produced exactly once per request by the tenant-scoping stage and never
/// constructed from unverified input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Opaque tenant identifier. Never empty.
    pub tenant_id: String,
    /// Human-readable tenant name.
    pub tenant_name: String,
    /// Acting user, when the token is user-bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Effective permissions resolved at authentication time.
    pub permissions: Vec<String>,
    /// Resource ceilings for this tenant.
    #[serde(default)]
    pub limits: ResourceLimits,
}

impl TenantContext {
    /// Construct a context for the given tenant with no user binding.
    pub fn for_tenant(tenant_id: impl Into<String>, tenant_name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tenant_name: tenant_name.into(),
            user_id: None,
            permissions: Vec::new(),
            limits: ResourceLimits::default(),
        }
    }

    /// Attach the acting user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach resolved permissions.
    #[must_use]
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }
}

// ---------------------------------------------------------------------------
// TraceContext
// ---------------------------------------------------------------------------

/// W3C-shaped trace identity: 32-hex trace id, 16-hex span id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// 32 lowercase hex chars identifying the distributed trace.
    pub trace_id: String,
    /// 16 lowercase hex chars identifying the current span.
    pub span_id: String,
}

impl TraceContext {
    /// Generate a fresh root trace context.
    #[must_use]
    pub fn new_root() -> Self {
        // A ULID carries 128 random+time bits; reuse its u128 for the trace
        // id and the low 64 bits of a second one for the span id.
        let trace: u128 = ulid::Ulid::new().into();
        let span: u128 = ulid::Ulid::new().into();
        Self {
            trace_id: format!("{trace:032x}"),
            span_id: format!("{:016x}", span as u64),
        }
    }

    /// Derive a child context: same trace, fresh span.
    #[must_use]
    pub fn child(&self) -> Self {
        let span: u128 = ulid::Ulid::new().into();
        Self {
            trace_id: self.trace_id.clone(),
            span_id: format!("{:016x}", span as u64),
        }
    }

    /// Render as a W3C `traceparent` header value.
    #[must_use]
    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }

    /// Parse a W3C `traceparent` header value.
    ///
    /// Returns `None` for anything that is not `00-<32hex>-<16hex>-<2hex>`.
    #[must_use]
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        if version != "00" || flags.len() != 2 {
            return None;
        }
        if trace_id.len() != 32 || !trace_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        if span_id.len() != 16 || !span_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
        })
    }
}
