// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory reference broker.
//!
//! Routes publishes to the first stream whose subject filter matches,
//! retains messages by age, and gives each durable consumer a cursor plus a
//! redelivery list so nacked messages come back on the next fetch. A
//! delivered message that is neither acked nor nacked within the ack-wait
//! window is redelivered as well.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::{Broker, BusError, StoredMessage, StreamSpec, Subscription, subject_matches};

/// Redelivery window for unacknowledged deliveries.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ConsumerState {
    cursor: u64,
    pending: HashMap<u64, Instant>,
    redeliver: Vec<u64>,
}

struct StreamState {
    spec: StreamSpec,
    messages: Vec<StoredMessage>,
    next_seq: u64,
    consumers: HashMap<String, ConsumerState>,
}

/// In-memory broker for tests and single-process deployments.
pub struct MemoryBroker {
    streams: Arc<Mutex<HashMap<String, StreamState>>>,
    ack_wait: Duration,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create an empty broker with the default ack-wait.
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            ack_wait: DEFAULT_ACK_WAIT,
        }
    }

    /// Override the ack-wait window (mainly for tests).
    #[must_use]
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ensure_stream(&self, spec: StreamSpec) -> Result<(), BusError> {
        let mut streams = self.streams.lock().await;
        streams.entry(spec.name.clone()).or_insert(StreamState {
            spec,
            messages: Vec::new(),
            next_seq: 1,
            consumers: HashMap::new(),
        });
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<u64, BusError> {
        let mut streams = self.streams.lock().await;
        let now = Utc::now();

        let state = streams
            .values_mut()
            .find(|s| s.spec.subjects.iter().any(|f| subject_matches(f, subject)))
            .ok_or_else(|| BusError::NoMatchingStream {
                subject: subject.to_string(),
            })?;

        // Time-based retention, applied on the write path.
        let horizon = now
            - chrono::Duration::from_std(state.spec.max_age)
                .unwrap_or_else(|_| chrono::Duration::days(365));
        state.messages.retain(|m| m.ts >= horizon);

        let seq = state.next_seq;
        state.next_seq += 1;
        state.messages.push(StoredMessage {
            seq,
            subject: subject.to_string(),
            payload,
            ts: now,
        });
        Ok(seq)
    }

    async fn subscribe(
        &self,
        stream: &str,
        durable: &str,
    ) -> Result<Arc<dyn Subscription>, BusError> {
        let mut streams = self.streams.lock().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| BusError::StreamNotFound {
                name: stream.to_string(),
            })?;
        state.consumers.entry(durable.to_string()).or_default();

        Ok(Arc::new(MemorySubscription {
            streams: Arc::clone(&self.streams),
            stream: stream.to_string(),
            durable: durable.to_string(),
            ack_wait: self.ack_wait,
        }))
    }

    async fn fetch_since(
        &self,
        stream: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredMessage>, BusError> {
        let streams = self.streams.lock().await;
        let state = streams.get(stream).ok_or_else(|| BusError::StreamNotFound {
            name: stream.to_string(),
        })?;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.ts >= since)
            .cloned()
            .collect())
    }
}

struct MemorySubscription {
    streams: Arc<Mutex<HashMap<String, StreamState>>>,
    stream: String,
    durable: String,
    ack_wait: Duration,
}

impl MemorySubscription {
    async fn take_ready(&self, max: usize) -> Result<Vec<StoredMessage>, BusError> {
        let mut streams = self.streams.lock().await;
        let state = streams
            .get_mut(&self.stream)
            .ok_or_else(|| BusError::StreamNotFound {
                name: self.stream.clone(),
            })?;

        // Split borrows: redelivery decisions need the message list.
        let StreamState {
            messages, consumers, ..
        } = &mut *state;
        let consumer = consumers
            .get_mut(&self.durable)
            .expect("consumer registered at subscribe time");

        // Deliveries that outlived the ack-wait window go back on the
        // redelivery list.
        let now = Instant::now();
        let mut timed_out: Vec<u64> = consumer
            .pending
            .iter()
            .filter(|(_, delivered)| now.duration_since(**delivered) >= self.ack_wait)
            .map(|(seq, _)| *seq)
            .collect();
        timed_out.sort_unstable();
        for seq in timed_out {
            consumer.pending.remove(&seq);
            if !consumer.redeliver.contains(&seq) {
                consumer.redeliver.push(seq);
            }
        }

        let mut out = Vec::new();

        // Redeliveries first, in nack order.
        while out.len() < max {
            let Some(seq) = consumer.redeliver.first().copied() else {
                break;
            };
            consumer.redeliver.remove(0);
            if let Some(message) = messages.iter().find(|m| m.seq == seq) {
                consumer.pending.insert(seq, now);
                out.push(message.clone());
            }
        }

        // Then new messages beyond the cursor.
        let cursor = consumer.cursor;
        for message in messages.iter().filter(|m| m.seq > cursor) {
            if out.len() >= max {
                break;
            }
            consumer.cursor = message.seq;
            consumer.pending.insert(message.seq, now);
            out.push(message.clone());
        }

        Ok(out)
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn fetch(&self, max: usize, timeout: Duration) -> Result<Vec<StoredMessage>, BusError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let ready = self.take_ready(max).await?;
            if !ready.is_empty() {
                return Ok(ready);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            // Cooperative wait; keeps fetch cancellable within the timeout.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn ack(&self, seq: u64) -> Result<(), BusError> {
        let mut streams = self.streams.lock().await;
        let state = streams
            .get_mut(&self.stream)
            .ok_or_else(|| BusError::StreamNotFound {
                name: self.stream.clone(),
            })?;
        if let Some(consumer) = state.consumers.get_mut(&self.durable) {
            consumer.pending.remove(&seq);
        }
        Ok(())
    }

    async fn nack(&self, seq: u64) -> Result<(), BusError> {
        let mut streams = self.streams.lock().await;
        let state = streams
            .get_mut(&self.stream)
            .ok_or_else(|| BusError::StreamNotFound {
                name: self.stream.clone(),
            })?;
        if let Some(consumer) = state.consumers.get_mut(&self.durable) {
            if consumer.pending.remove(&seq).is_some() && !consumer.redeliver.contains(&seq) {
                consumer.redeliver.push(seq);
            }
        }
        Ok(())
    }
}
