// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-audit
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Append-only storage seam and in-memory reference implementation.
pub mod store;
/// Streamed chain verification.
pub mod verify;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use store::{AuditStore, AuditStoreError, MemoryAuditStore};
pub use verify::{ChainVerifier, VerificationReport};

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// A human user acting through the API.
    User,
    /// An agent acting on a tenant's behalf.
    Agent,
    /// The control plane itself.
    System,
}

/// One link in a tenant's audit chain.
///
/// `hash` covers `prev_hash` plus the canonical JSON of the entry with its
/// `id` and `hash` fields excluded, so storage-assigned ids never influence
/// integrity. The genesis entry of a tenant has `prev_hash = None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Storage-assigned sequence id. Excluded from hashing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Owning tenant.
    pub tenant_id: String,
    /// Kind of actor.
    pub actor_type: ActorType,
    /// Actor identifier (user id, agent id, or service name).
    pub actor_id: String,
    /// What happened (e.g. `workflow_created`, `cross_tenant_attempt`).
    pub action: String,
    /// The resource class acted upon.
    pub resource_type: String,
    /// The specific resource, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Structured event details.
    #[serde(default)]
    pub details: serde_json::Value,
    /// Event timestamp.
    pub ts: DateTime<Utc>,
    /// Hash of the preceding entry; `None` for the genesis entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    /// SHA-256 hex over `prev_hash ‖ canonical(entry without id/hash)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Errors from audit-chain operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Canonical serialization failed.
    #[error("failed to canonicalize audit entry: {0}")]
    Canonical(#[from] af_core::EnvelopeError),

    /// The store rejected or failed the operation.
    #[error(transparent)]
    Store(#[from] AuditStoreError),

    /// The append lost the compare-and-set race too many times.
    #[error("audit append contention exhausted after {attempts} attempts for tenant {tenant_id}")]
    ContentionExhausted {
        /// Tenant whose chain head kept moving.
        tenant_id: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

/// Compute an entry's chain hash.
///
/// The digest input is the previous hash (empty for genesis) concatenated
/// with the canonical JSON of the entry, with `id` and `hash` removed to
/// avoid self-reference.
///
/// # Errors
///
/// Returns [`AuditError::Canonical`] if the entry cannot be serialized.
pub fn entry_hash(entry: &AuditEntry) -> Result<String, AuditError> {
    let mut v = serde_json::to_value(entry).map_err(af_core::EnvelopeError::from)?;
    if let serde_json::Value::Object(map) = &mut v {
        map.remove("id");
        map.remove("hash");
    }
    let canonical = serde_json::to_string(&v).map_err(af_core::EnvelopeError::from)?;

    let mut input =
        Vec::with_capacity(entry.prev_hash.as_ref().map_or(0, String::len) + canonical.len());
    if let Some(prev) = &entry.prev_hash {
        input.extend_from_slice(prev.as_bytes());
    }
    input.extend_from_slice(canonical.as_bytes());
    Ok(af_core::sha256_hex(&input))
}

// ---------------------------------------------------------------------------
// Draft & logger
// ---------------------------------------------------------------------------

/// The caller-supplied part of an audit entry; the logger stamps timestamp,
/// linkage, and hash.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    /// Owning tenant.
    pub tenant_id: String,
    /// Kind of actor.
    pub actor_type: ActorType,
    /// Actor identifier.
    pub actor_id: String,
    /// What happened.
    pub action: String,
    /// The resource class acted upon.
    pub resource_type: String,
    /// The specific resource, when one exists.
    pub resource_id: Option<String>,
    /// Structured event details.
    pub details: serde_json::Value,
}

impl AuditDraft {
    /// Start a draft for the given tenant and action.
    pub fn new(
        tenant_id: impl Into<String>,
        actor_type: ActorType,
        actor_id: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_type,
            actor_id: actor_id.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: None,
            details: serde_json::Value::Null,
        }
    }

    /// Set the specific resource id.
    #[must_use]
    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Set structured details.
    #[must_use]
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Appends entries to a tenant's chain with compare-and-set retry.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    max_attempts: u32,
}

impl AuditLogger {
    /// Create a logger over the given store.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            max_attempts: 5,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.store)
    }

    /// Append a draft to its tenant's chain.
    ///
    /// Reads the current chain head, links and hashes the new entry, and
    /// commits with compare-and-set semantics. Lost races are retried
    /// against the fresh head; the chain can never fork.
    ///
    /// # Errors
    ///
    /// [`AuditError::ContentionExhausted`] after too many lost races, or the
    /// underlying store/serialization error.
    pub async fn append(&self, draft: AuditDraft) -> Result<AuditEntry, AuditError> {
        for _ in 0..self.max_attempts {
            let head = self.store.latest(&draft.tenant_id).await?;
            let expected_prev = head.as_ref().and_then(|e| e.hash.clone());

            let mut entry = AuditEntry {
                id: None,
                tenant_id: draft.tenant_id.clone(),
                actor_type: draft.actor_type,
                actor_id: draft.actor_id.clone(),
                action: draft.action.clone(),
                resource_type: draft.resource_type.clone(),
                resource_id: draft.resource_id.clone(),
                details: draft.details.clone(),
                ts: Utc::now(),
                prev_hash: expected_prev.clone(),
                hash: None,
            };
            entry.hash = Some(entry_hash(&entry)?);

            match self.store.append_cas(entry, expected_prev.as_deref()).await {
                Ok(committed) => return Ok(committed),
                Err(AuditStoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AuditError::ContentionExhausted {
            tenant_id: draft.tenant_id,
            attempts: self.max_attempts,
        })
    }
}
