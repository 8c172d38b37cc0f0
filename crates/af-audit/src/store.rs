// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only audit storage seam.
//!
//! The production store is the external relational database; the in-memory
//! implementation here backs tests and single-process deployments. The
//! contract that matters is `append_cas`: the commit fails whenever the
//! tenant's chain head moved since the caller read it.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::AuditEntry;

/// Errors from audit stores.
#[derive(Debug, thiserror::Error)]
pub enum AuditStoreError {
    /// The chain head moved between read and commit.
    #[error("audit chain head moved for tenant {tenant_id}")]
    Conflict {
        /// Tenant whose head moved.
        tenant_id: String,
    },

    /// The store could not be reached.
    #[error("audit store unavailable: {reason}")]
    Unavailable {
        /// Human-readable failure detail.
        reason: String,
    },
}

/// Append-only, per-tenant ordered audit storage.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// The newest entry of a tenant's chain, if any.
    async fn latest(&self, tenant_id: &str) -> Result<Option<AuditEntry>, AuditStoreError>;

    /// Commit `entry` iff the tenant's current head hash equals
    /// `expected_prev` (`None` ⇒ the chain must be empty). Returns the
    /// committed entry with its storage id assigned.
    async fn append_cas(
        &self,
        entry: AuditEntry,
        expected_prev: Option<&str>,
    ) -> Result<AuditEntry, AuditStoreError>;

    /// A page of a tenant's entries in timestamp order (ties broken by
    /// storage id).
    async fn page(
        &self,
        tenant_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditStoreError>;

    /// Total entries recorded for a tenant.
    async fn count(&self, tenant_id: &str) -> Result<usize, AuditStoreError>;

    /// All tenants with at least one entry, sorted.
    async fn tenants(&self) -> Result<Vec<String>, AuditStoreError>;
}

/// In-memory reference store.
#[derive(Default)]
pub struct MemoryAuditStore {
    chains: Mutex<HashMap<String, Vec<AuditEntry>>>,
}

impl MemoryAuditStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn latest(&self, tenant_id: &str) -> Result<Option<AuditEntry>, AuditStoreError> {
        let chains = self.chains.lock().await;
        Ok(chains.get(tenant_id).and_then(|c| c.last().cloned()))
    }

    async fn append_cas(
        &self,
        mut entry: AuditEntry,
        expected_prev: Option<&str>,
    ) -> Result<AuditEntry, AuditStoreError> {
        let mut chains = self.chains.lock().await;
        let chain = chains.entry(entry.tenant_id.clone()).or_default();

        let head_hash = chain.last().and_then(|e| e.hash.as_deref());
        if head_hash != expected_prev {
            return Err(AuditStoreError::Conflict {
                tenant_id: entry.tenant_id.clone(),
            });
        }

        entry.id = Some(chain.len() as u64 + 1);
        chain.push(entry.clone());
        Ok(entry)
    }

    async fn page(
        &self,
        tenant_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let chains = self.chains.lock().await;
        Ok(chains
            .get(tenant_id)
            .map(|c| c.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, tenant_id: &str) -> Result<usize, AuditStoreError> {
        let chains = self.chains.lock().await;
        Ok(chains.get(tenant_id).map_or(0, Vec::len))
    }

    async fn tenants(&self) -> Result<Vec<String>, AuditStoreError> {
        let chains = self.chains.lock().await;
        let mut tenants: Vec<String> = chains
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        tenants.sort();
        Ok(tenants)
    }
}

/// Test-only helper: overwrite a stored entry in place, bypassing the
/// append-only contract, to simulate external tampering.
impl MemoryAuditStore {
    /// Replace the entry at `index` of a tenant's chain with the result of
    /// `mutate`. Returns `false` when the index does not exist.
    pub async fn tamper_with<F>(&self, tenant_id: &str, index: usize, mutate: F) -> bool
    where
        F: FnOnce(&mut AuditEntry),
    {
        let mut chains = self.chains.lock().await;
        match chains.get_mut(tenant_id).and_then(|c| c.get_mut(index)) {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }
}
