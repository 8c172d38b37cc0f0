// SPDX-License-Identifier: MIT OR Apache-2.0
//! Streamed chain verification.
//!
//! The verifier never loads a whole chain at once: it pulls fixed-size pages
//! in timestamp order and carries the expected predecessor hash across page
//! boundaries. The first mismatch is reported by its zero-based index and
//! verification stops there. Integrity failures are never repaired.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{AuditEntry, AuditStore, AuditStoreError, entry_hash};

/// Outcome of a chain verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Whether every entry verified.
    pub valid: bool,
    /// Number of entries examined.
    pub total: usize,
    /// Zero-based index of the first tampered entry, when invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_tampered_index: Option<usize>,
    /// Human-readable failure description, when invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Entries verified per second.
    pub throughput_per_sec: f64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl VerificationReport {
    fn finish(checker: ChainChecker, elapsed: Duration) -> Self {
        let total = checker.examined;
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            total as f64 / secs
        } else {
            total as f64
        };
        match checker.failure {
            None => Self {
                valid: true,
                total,
                first_tampered_index: None,
                error_message: None,
                throughput_per_sec: throughput,
                duration_ms: elapsed.as_millis() as u64,
            },
            Some((index, message)) => Self {
                valid: false,
                total,
                first_tampered_index: Some(index),
                error_message: Some(message),
                throughput_per_sec: throughput,
                duration_ms: elapsed.as_millis() as u64,
            },
        }
    }
}

/// Incremental linkage + hash checker fed one entry at a time.
struct ChainChecker {
    expected_prev: Option<String>,
    index: usize,
    examined: usize,
    failure: Option<(usize, String)>,
}

impl ChainChecker {
    fn new() -> Self {
        Self {
            expected_prev: None,
            index: 0,
            examined: 0,
            failure: None,
        }
    }

    fn check(&mut self, entry: &AuditEntry) {
        if self.failure.is_some() {
            return;
        }
        self.examined += 1;

        if entry.prev_hash != self.expected_prev {
            self.failure = Some((
                self.index,
                format!(
                    "broken linkage at index {}: prev_hash does not match predecessor",
                    self.index
                ),
            ));
            return;
        }

        let Some(stored) = &entry.hash else {
            self.failure = Some((self.index, format!("entry {} has no hash", self.index)));
            return;
        };

        match entry_hash(entry) {
            Ok(computed) if computed == *stored => {
                self.expected_prev = Some(stored.clone());
                self.index += 1;
            }
            Ok(_) => {
                self.failure = Some((
                    self.index,
                    format!("hash mismatch at index {}", self.index),
                ));
            }
            Err(e) => {
                self.failure = Some((
                    self.index,
                    format!("cannot canonicalize entry {}: {e}", self.index),
                ));
            }
        }
    }
}

/// Verifies per-tenant chains by streaming pages from an [`AuditStore`].
#[derive(Clone)]
pub struct ChainVerifier {
    page_size: usize,
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainVerifier {
    /// Create a verifier with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self { page_size: 1000 }
    }

    /// Override the page size (mainly for tests).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Verify one tenant's chain.
    ///
    /// An empty chain verifies as `valid = true, total = 0`.
    ///
    /// # Errors
    ///
    /// Propagates store failures; a tampered chain is a *report*, not an
    /// error.
    pub async fn verify(
        &self,
        store: &Arc<dyn AuditStore>,
        tenant_id: &str,
    ) -> Result<VerificationReport, AuditStoreError> {
        let started = Instant::now();
        let mut checker = ChainChecker::new();
        let mut offset = 0;

        loop {
            let page = store.page(tenant_id, offset, self.page_size).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            for entry in &page {
                checker.check(entry);
                if checker.failure.is_some() {
                    break;
                }
            }
            if checker.failure.is_some() {
                break;
            }
        }

        let report = VerificationReport::finish(checker, started.elapsed());
        if !report.valid {
            tracing::warn!(
                security_event = true,
                tenant_id,
                first_tampered_index = report.first_tampered_index,
                "audit chain verification failed"
            );
        }
        Ok(report)
    }

    /// Verify every tenant in the store, returning `(tenant, report)` pairs
    /// in tenant order.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn verify_all(
        &self,
        store: &Arc<dyn AuditStore>,
    ) -> Result<Vec<(String, VerificationReport)>, AuditStoreError> {
        let mut reports = Vec::new();
        for tenant in store.tenants().await? {
            let report = self.verify(store, &tenant).await?;
            reports.push((tenant, report));
        }
        Ok(reports)
    }
}

/// Verify an already-materialized slice of entries (CLI export path).
///
/// Entries must be in chain order for the tenant they belong to.
#[must_use]
pub fn verify_entries(entries: &[AuditEntry]) -> VerificationReport {
    let started = Instant::now();
    let mut checker = ChainChecker::new();
    for entry in entries {
        checker.check(entry);
        if checker.failure.is_some() {
            break;
        }
    }
    VerificationReport::finish(checker, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActorType, AuditDraft, AuditLogger, MemoryAuditStore};
    use std::sync::Arc;

    async fn seeded_store(n: usize) -> Arc<MemoryAuditStore> {
        let store = Arc::new(MemoryAuditStore::new());
        let logger = AuditLogger::new(store.clone());
        for i in 0..n {
            logger
                .append(
                    AuditDraft::new("t1", ActorType::User, "u1", format!("act-{i}"), "workflow")
                        .details(serde_json::json!({"n": i})),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn valid_chain_verifies() {
        let store = seeded_store(25).await;
        let store: Arc<dyn AuditStore> = store;
        let report = ChainVerifier::new()
            .with_page_size(7)
            .verify(&store, "t1")
            .await
            .unwrap();
        assert!(report.valid);
        assert_eq!(report.total, 25);
        assert!(report.first_tampered_index.is_none());
        assert!(report.throughput_per_sec > 0.0);
    }

    #[tokio::test]
    async fn empty_chain_is_valid_with_zero_total() {
        let store: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::new());
        let report = ChainVerifier::new().verify(&store, "ghost").await.unwrap();
        assert!(report.valid);
        assert_eq!(report.total, 0);
    }

    #[tokio::test]
    async fn content_tampering_is_detected_at_the_right_index() {
        let store = seeded_store(3).await;
        assert!(
            store
                .tamper_with("t1", 1, |e| e.action = "forged".into())
                .await
        );
        let dyn_store: Arc<dyn AuditStore> = store;
        let report = ChainVerifier::new().verify(&dyn_store, "t1").await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_tampered_index, Some(1));
    }

    #[tokio::test]
    async fn linkage_tampering_is_detected() {
        let store = seeded_store(3).await;
        store
            .tamper_with("t1", 2, |e| e.prev_hash = Some("0".repeat(64)))
            .await;
        let dyn_store: Arc<dyn AuditStore> = store;
        let report = ChainVerifier::new().verify(&dyn_store, "t1").await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_tampered_index, Some(2));
        assert!(report.error_message.unwrap().contains("linkage"));
    }

    #[tokio::test]
    async fn tamper_detection_crosses_page_boundaries() {
        let store = seeded_store(10).await;
        store
            .tamper_with("t1", 7, |e| e.details = serde_json::json!({"n": 999}))
            .await;
        let dyn_store: Arc<dyn AuditStore> = store;
        let report = ChainVerifier::new()
            .with_page_size(3)
            .verify(&dyn_store, "t1")
            .await
            .unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_tampered_index, Some(7));
    }

    #[tokio::test]
    async fn verify_entries_matches_store_verification() {
        let store = seeded_store(5).await;
        let entries = store.page("t1", 0, 100).await.unwrap();
        let report = verify_entries(&entries);
        assert!(report.valid);
        assert_eq!(report.total, 5);
    }

    #[tokio::test]
    async fn verify_all_covers_every_tenant() {
        let store = Arc::new(MemoryAuditStore::new());
        let logger = AuditLogger::new(store.clone());
        for tenant in ["t1", "t2"] {
            logger
                .append(AuditDraft::new(
                    tenant,
                    ActorType::System,
                    "core",
                    "boot",
                    "process",
                ))
                .await
                .unwrap();
        }
        let dyn_store: Arc<dyn AuditStore> = store;
        let reports = ChainVerifier::new().verify_all(&dyn_store).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|(_, r)| r.valid));
    }
}
