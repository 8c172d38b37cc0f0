// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable wire contract for AgentFlow.
//!
//! This crate is the single source of truth for on-the-wire equivalence:
//! every component that computes or verifies an envelope hash MUST go
//! through [`MessageEnvelope::seal`] / [`MessageEnvelope::validate`].

/// Request-scoped tenant and trace context carried through the pipeline.
pub mod context;
/// Wire-schema validation for the message envelope.
pub mod schema;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use ulid::Ulid;

/// Current contract version string embedded in API response metadata.
///
/// # Examples
///
/// ```
/// assert_eq!(af_core::CONTRACT_VERSION, "af/v1");
/// ```
pub const CONTRACT_VERSION: &str = "af/v1";

/// Length of a wire message id (a ULID in its canonical Crockford form).
pub const MESSAGE_ID_LEN: usize = 26;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Message class carried in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A request expecting a correlated response.
    Request,
    /// A response correlated to an earlier request.
    Response,
    /// A fire-and-forget fact about something that happened.
    Event,
    /// Control-plane traffic (pause, resume, cancel).
    Control,
}

/// Token and dollar cost attribution attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct CostInfo {
    /// Tokens consumed producing this message.
    pub tokens: u64,
    /// Estimated dollar cost of this message.
    pub dollars: f64,
}

/// The canonical message wrapper whose hash seals integrity on the bus.
///
/// Immutable once sealed: any field change after [`seal`](Self::seal)
/// invalidates the stored hash and is detected by
/// [`validate`](Self::validate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MessageEnvelope {
    /// Monotonic sortable 26-char identifier (ULID).
    pub id: String,

    /// Logical sender (agent, service, or tenant-scoped actor name).
    pub from: String,

    /// Logical recipient.
    pub to: String,

    /// Message class.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Emission timestamp (RFC 3339).
    pub ts: DateTime<Utc>,

    /// W3C trace id (32 lowercase hex chars), when tracing is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// W3C span id (16 lowercase hex chars), when tracing is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,

    /// Message body. Free-form JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Transport metadata (deterministic ordering).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,

    /// Cost attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostInfo>,

    /// SHA-256 hex of the canonical content, excluding this field.
    /// Filled in by [`seal`](Self::seal).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_hash: Option<String>,
}

/// Errors from envelope-level operations (serialization, hashing, schema).
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// JSON serialization or deserialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope has no stored hash to verify against.
    #[error("envelope is not sealed")]
    Unsealed,

    /// The stored hash does not match the recomputed canonical hash.
    #[error("envelope integrity mismatch: stored {stored}, computed {computed}")]
    IntegrityMismatch {
        /// Hash carried by the envelope.
        stored: String,
        /// Hash recomputed from the canonical content.
        computed: String,
    },

    /// The value does not conform to the wire schema.
    #[error("envelope schema violation: {}", reasons.join("; "))]
    Schema {
        /// Individual schema violation messages.
        reasons: Vec<String>,
    },
}

/// Generate a fresh 26-char sortable message id.
#[must_use]
pub fn new_message_id() -> String {
    Ulid::new().to_string()
}

/// Produce a deterministic JSON string for hashing.
///
/// This is not a full JCS implementation, but it is stable for our types:
/// - keys are sorted at every depth (serde_json maps are BTreeMaps here)
/// - numbers and strings are serialized consistently by serde_json
///
/// # Errors
///
/// Returns [`EnvelopeError::Json`] if the value cannot be serialized.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, EnvelopeError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&v)?)
}

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compute the canonical hash of an envelope.
///
/// **Gotcha:** strips the `envelope_hash` field before hashing so the stored
/// hash never becomes self-referential. Prefer
/// [`MessageEnvelope::seal`] over calling this directly.
///
/// # Errors
///
/// Returns [`EnvelopeError::Json`] if the envelope cannot be serialized.
pub fn envelope_hash(envelope: &MessageEnvelope) -> Result<String, EnvelopeError> {
    // Canonicalize via serde_json::Value so the hash field can be removed
    // without cloning the envelope (payloads may be large).
    let mut v = serde_json::to_value(envelope)?;
    if let serde_json::Value::Object(map) = &mut v {
        map.remove("envelope_hash");
    }
    let json = serde_json::to_string(&v)?;
    Ok(sha256_hex(json.as_bytes()))
}

impl MessageEnvelope {
    /// Compute and attach the canonical SHA-256 hash, returning the sealed
    /// envelope.
    ///
    /// # Examples
    ///
    /// ```
    /// use af_core::{EnvelopeBuilder, MessageKind};
    ///
    /// let env = EnvelopeBuilder::new("planner", "executor", MessageKind::Request)
    ///     .payload(serde_json::json!({"step": 1}))
    ///     .build()
    ///     .seal()
    ///     .unwrap();
    ///
    /// assert_eq!(env.envelope_hash.as_ref().unwrap().len(), 64);
    /// assert!(env.validate().is_ok());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if the envelope cannot be serialized.
    pub fn seal(mut self) -> Result<Self, EnvelopeError> {
        let h = envelope_hash(&self)?;
        self.envelope_hash = Some(h);
        Ok(self)
    }

    /// Recompute the canonical hash and compare with the stored one.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::Unsealed`] when no hash is stored,
    /// [`EnvelopeError::IntegrityMismatch`] when the content was modified
    /// after sealing, [`EnvelopeError::Json`] on serialization failure.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        let stored = self.envelope_hash.as_ref().ok_or(EnvelopeError::Unsealed)?;
        let computed = envelope_hash(self)?;
        if *stored != computed {
            return Err(EnvelopeError::IntegrityMismatch {
                stored: stored.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Enforce the wire shape of §external-interfaces on a raw JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Schema`] listing every violation.
    pub fn validate_schema(value: &serde_json::Value) -> Result<(), EnvelopeError> {
        schema::validate_wire(value)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing [`MessageEnvelope`]s ergonomically.
///
/// # Examples
///
/// ```
/// use af_core::{EnvelopeBuilder, MessageKind};
///
/// let env = EnvelopeBuilder::new("orchestrator", "agent-7", MessageKind::Event)
///     .metadata("workflow_id", "wf-42")
///     .cost(120, 0.0018)
///     .build();
///
/// assert_eq!(env.from, "orchestrator");
/// assert_eq!(env.id.len(), af_core::MESSAGE_ID_LEN);
/// assert!(env.envelope_hash.is_none());
/// ```
#[derive(Debug)]
pub struct EnvelopeBuilder {
    from: String,
    to: String,
    kind: MessageKind,
    trace_id: Option<String>,
    span_id: Option<String>,
    payload: Option<serde_json::Value>,
    metadata: BTreeMap<String, serde_json::Value>,
    cost: Option<CostInfo>,
}

impl EnvelopeBuilder {
    /// Create a new builder with sender, recipient, and message class.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            trace_id: None,
            span_id: None,
            payload: None,
            metadata: BTreeMap::new(),
            cost: None,
        }
    }

    /// Set the message payload.
    #[must_use]
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Insert a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the cost attribution.
    #[must_use]
    pub fn cost(mut self, tokens: u64, dollars: f64) -> Self {
        self.cost = Some(CostInfo { tokens, dollars });
        self
    }

    /// Attach trace context for downstream propagation.
    #[must_use]
    pub fn trace(mut self, trace: &context::TraceContext) -> Self {
        self.trace_id = Some(trace.trace_id.clone());
        self.span_id = Some(trace.span_id.clone());
        self
    }

    /// Consume the builder and produce an unsealed [`MessageEnvelope`].
    #[must_use]
    pub fn build(self) -> MessageEnvelope {
        MessageEnvelope {
            id: new_message_id(),
            from: self.from,
            to: self.to,
            kind: self.kind,
            ts: Utc::now(),
            trace_id: self.trace_id,
            span_id: self.span_id,
            payload: self.payload,
            metadata: if self.metadata.is_empty() {
                None
            } else {
                Some(self.metadata)
            },
            cost: self.cost,
            envelope_hash: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
