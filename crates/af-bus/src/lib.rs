// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-bus
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// In-memory reference broker.
pub mod memory;
/// Reconnect backoff policy.
pub mod reconnect;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use af_core::context::TraceContext;
use af_core::{EnvelopeError, MessageEnvelope};

pub use memory::MemoryBroker;
pub use reconnect::ReconnectPolicy;

// ---------------------------------------------------------------------------
// Broker seam
// ---------------------------------------------------------------------------

/// The three named streams declared on startup.
pub const STREAM_WORKFLOWS: &str = "workflows";
/// Tool traffic stream.
pub const STREAM_TOOLS: &str = "tools";
/// Control-plane/system traffic stream.
pub const STREAM_SYSTEM: &str = "system";

/// Declares a named stream with subject filters and time-based retention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    /// Stream name.
    pub name: String,
    /// Subject filters (`*` = one token, `>` = rest).
    pub subjects: Vec<String>,
    /// How long messages are retained.
    pub max_age: Duration,
}

/// The standard stream set: workflow, tool, and system traffic.
#[must_use]
pub fn standard_streams(max_age: Duration) -> Vec<StreamSpec> {
    [STREAM_WORKFLOWS, STREAM_TOOLS, STREAM_SYSTEM]
        .into_iter()
        .map(|name| StreamSpec {
            name: name.to_string(),
            subjects: vec![format!("*.{name}.>")],
            max_age,
        })
        .collect()
}

/// A message as stored by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Stream sequence number.
    pub seq: u64,
    /// Full subject the message was published on.
    pub subject: String,
    /// Serialized envelope bytes.
    pub payload: Vec<u8>,
    /// Broker receive time.
    pub ts: DateTime<Utc>,
}

/// Errors from broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The named stream does not exist.
    #[error("stream not found: {name}")]
    StreamNotFound {
        /// The missing stream.
        name: String,
    },

    /// No declared stream's filters match the subject.
    #[error("no stream matches subject '{subject}'")]
    NoMatchingStream {
        /// The unroutable subject.
        subject: String,
    },

    /// A publish addressed a subject outside the caller's tenant.
    #[error("subject '{subject}' is not owned by tenant '{tenant}'")]
    SubjectNotOwned {
        /// The offending subject.
        subject: String,
        /// The publishing tenant.
        tenant: String,
    },

    /// The envelope failed sealing or validation.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The broker could not be reached.
    #[error("bus unavailable: {reason}")]
    Unavailable {
        /// Human-readable failure detail.
        reason: String,
    },
}

/// A pull consumer over one stream.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Fetch up to `max` deliveries, waiting at most `timeout` (kept ≤ 1 s
    /// by callers so cancellation stays prompt).
    async fn fetch(&self, max: usize, timeout: Duration) -> Result<Vec<StoredMessage>, BusError>;

    /// Acknowledge successful processing.
    async fn ack(&self, seq: u64) -> Result<(), BusError>;

    /// Negative-acknowledge; the message becomes eligible for redelivery.
    async fn nack(&self, seq: u64) -> Result<(), BusError>;
}

/// The broker seam. Production wires a real broker client; tests and
/// single-process deployments use [`MemoryBroker`].
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a stream (idempotent).
    async fn ensure_stream(&self, spec: StreamSpec) -> Result<(), BusError>;

    /// Publish bytes on a subject; routed to the stream whose filter
    /// matches. Returns the assigned sequence number.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<u64, BusError>;

    /// Create or resume a durable pull consumer on a stream.
    async fn subscribe(
        &self,
        stream: &str,
        durable: &str,
    ) -> Result<Arc<dyn Subscription>, BusError>;

    /// All messages of a stream received at or after `since`, in broker
    /// order (the replay source).
    async fn fetch_since(
        &self,
        stream: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredMessage>, BusError>;
}

/// NATS-style subject filter match: `*` matches one token, `>` the rest.
#[must_use]
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (None, None) => return true,
            // `>` requires at least one remaining token.
            (Some(">"), remainder) => return remainder.is_some(),
            (Some(f), Some(s)) if f == "*" || f == s => continue,
            _ => return false,
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Ties the envelope contract to the broker: seals on publish, validates on
/// delivery, replays deterministically.
#[derive(Clone)]
pub struct BusAdapter {
    broker: Arc<dyn Broker>,
    residency_strict: bool,
}

impl BusAdapter {
    /// Create an adapter over a broker.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            residency_strict: false,
        }
    }

    /// Enforce (rather than just log) subject-ownership violations.
    #[must_use]
    pub fn with_strict_residency(mut self, strict: bool) -> Self {
        self.residency_strict = strict;
        self
    }

    /// The underlying broker.
    #[must_use]
    pub fn broker(&self) -> Arc<dyn Broker> {
        Arc::clone(&self.broker)
    }

    /// Declare the standard streams. Called once at startup.
    ///
    /// # Errors
    ///
    /// Propagates broker failures.
    pub async fn init_streams(&self, max_age: Duration) -> Result<(), BusError> {
        for spec in standard_streams(max_age) {
            self.broker.ensure_stream(spec).await?;
        }
        Ok(())
    }

    /// Seal and publish an envelope on `{tenant}.{stream}.{name}`.
    ///
    /// Trace context, when given, is injected before sealing so consumers
    /// can join the publisher's trace.
    ///
    /// # Errors
    ///
    /// Sealing failures, ownership violations (strict residency), and
    /// broker failures.
    pub async fn publish(
        &self,
        tenant: &str,
        stream: &str,
        name: &str,
        mut envelope: MessageEnvelope,
        trace: Option<&TraceContext>,
    ) -> Result<String, BusError> {
        if let Some(trace) = trace {
            envelope.trace_id = Some(trace.trace_id.clone());
            envelope.span_id = Some(trace.span_id.clone());
        }
        let sealed = envelope.seal()?;
        let subject = format!("{tenant}.{stream}.{name}");

        // Subjects are tenant-owned; a publisher may only write under its
        // own prefix.
        if !subject.starts_with(&format!("{tenant}.")) || tenant.is_empty() {
            let violation = BusError::SubjectNotOwned {
                subject: subject.clone(),
                tenant: tenant.to_string(),
            };
            if self.residency_strict {
                return Err(violation);
            }
            tracing::warn!(%subject, tenant, "subject ownership violation (non-strict)");
        }

        let payload = serde_json::to_vec(&sealed).map_err(EnvelopeError::from)?;
        let seq = self.broker.publish(&subject, payload).await?;
        tracing::debug!(%subject, seq, id = %sealed.id, "message published");
        Ok(subject)
    }

    /// Run a durable subscription until `shutdown` flips to `true`.
    ///
    /// Each delivery is schema- and hash-validated before the handler runs;
    /// validation failures are negative-acked and logged as security events
    /// without invoking the handler. Handler errors are negative-acked for
    /// redelivery.
    ///
    /// # Errors
    ///
    /// Propagates subscription-setup failures; per-message failures are
    /// handled in-loop.
    pub async fn run_subscription<F, Fut>(
        &self,
        stream: &str,
        durable: &str,
        mut shutdown: watch::Receiver<bool>,
        handler: F,
    ) -> Result<(), BusError>
    where
        F: Fn(MessageEnvelope) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        let subscription = self.broker.subscribe(stream, durable).await?;
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            let fetched = tokio::select! {
                _ = shutdown.changed() => continue,
                fetched = subscription.fetch(16, Duration::from_secs(1)) => fetched?,
            };

            for delivery in fetched {
                match decode_validated(&delivery.payload) {
                    Ok(envelope) => match handler(envelope).await {
                        Ok(()) => subscription.ack(delivery.seq).await?,
                        Err(reason) => {
                            tracing::warn!(seq = delivery.seq, %reason, "handler failed; nacking");
                            subscription.nack(delivery.seq).await?;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(
                            security_event = true,
                            seq = delivery.seq,
                            subject = %delivery.subject,
                            error = %e,
                            "rejected message failing integrity validation"
                        );
                        subscription.nack(delivery.seq).await?;
                    }
                }
            }
        }
    }

    /// Replay a tenant's messages on a stream from `since`, in
    /// deterministic timestamp order.
    ///
    /// Invalid messages are skipped and logged; the replayed sequence
    /// contains only hash-validated envelopes.
    ///
    /// # Errors
    ///
    /// Propagates broker failures.
    pub async fn replay(
        &self,
        tenant: &str,
        stream: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MessageEnvelope>, BusError> {
        let prefix = format!("{tenant}.");
        let stored = self.broker.fetch_since(stream, since).await?;

        let mut envelopes = Vec::with_capacity(stored.len());
        for message in stored {
            if !message.subject.starts_with(&prefix) {
                continue;
            }
            match decode_validated(&message.payload) {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => {
                    tracing::warn!(
                        security_event = true,
                        seq = message.seq,
                        subject = %message.subject,
                        error = %e,
                        "skipping invalid message during replay"
                    );
                }
            }
        }
        // Broker order in, timestamp order out; stable sort keeps broker
        // order for equal timestamps.
        envelopes.sort_by_key(|e| e.ts);
        Ok(envelopes)
    }
}

/// Decode payload bytes into a schema-valid, hash-verified envelope.
fn decode_validated(payload: &[u8]) -> Result<MessageEnvelope, EnvelopeError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    MessageEnvelope::validate_schema(&value)?;
    let envelope: MessageEnvelope = serde_json::from_value(value)?;
    envelope.validate()?;
    Ok(envelope)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
