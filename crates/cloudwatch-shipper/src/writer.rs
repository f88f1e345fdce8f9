//! Stream writer owning the sequence token and the pending delivery queue.
//!
//! One writer exists per target log stream. It is the only holder of the
//! stream's sequence token, so appends are naturally serialized: the pipeline
//! service drives at most one flush at a time through it.
//!
//! # Delivery guarantees
//!
//! A batch is removed from the pending queue only after the remote service
//! confirms the append. Two failure modes are repaired in place with a single
//! retry each, mirroring how the service expects clients to behave:
//!
//! - **Sequence conflict**: the current token is re-fetched from the
//!   stream-description call and the same batch is retried once.
//! - **Missing stream**: the stream is created, the token reset, and the
//!   batch retried once. The stream handle is thereby created lazily on the
//!   first flush that needs it.
//!
//! Everything else goes through the retry policy: throttled and transient
//! failures back off and retry up to the attempt bound, permanent failures
//! surface immediately as fatal.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::buffer::EventBatch;
use crate::error::DeliveryError;
use crate::retry::{FailureKind, RetryPolicy};
use crate::transport::{LogsTransport, SequenceToken, TransportError};

pub struct StreamWriter {
    group: String,
    stream: String,
    transport: Arc<dyn LogsTransport>,
    policy: RetryPolicy,
    sequence_token: Option<SequenceToken>,
    pending: VecDeque<EventBatch>,
    delivered_events: u64,
}

impl StreamWriter {
    #[must_use]
    pub fn new(
        transport: Arc<dyn LogsTransport>,
        policy: RetryPolicy,
        group: impl Into<String>,
        stream: impl Into<String>,
    ) -> Self {
        StreamWriter {
            group: group.into(),
            stream: stream.into(),
            transport,
            policy,
            sequence_token: None,
            pending: VecDeque::new(),
            delivered_events: 0,
        }
    }

    /// Queues a batch for delivery. Empty batches are ignored.
    pub fn enqueue(&mut self, batch: EventBatch) {
        if !batch.is_empty() {
            self.pending.push_back(batch);
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Takes ownership of everything still undelivered, for shutdown
    /// reporting.
    pub fn take_pending(&mut self) -> Vec<EventBatch> {
        self.pending.drain(..).collect()
    }

    #[must_use]
    pub fn sequence_token(&self) -> Option<&str> {
        self.sequence_token.as_deref()
    }

    /// Total events confirmed delivered over this writer's lifetime.
    #[must_use]
    pub fn delivered_events(&self) -> u64 {
        self.delivered_events
    }

    /// Delivers queued batches in order, returning the number of events
    /// confirmed delivered.
    ///
    /// On error the failing batch is back at the front of the queue and
    /// later batches are untouched, preserving stream order for the next
    /// attempt.
    pub async fn flush_pending(&mut self) -> Result<usize, DeliveryError> {
        let mut delivered = 0;
        while let Some(batch) = self.pending.pop_front() {
            match self.flush_batch(&batch).await {
                Ok(count) => delivered += count,
                Err(err) => {
                    self.pending.push_front(batch);
                    return Err(err);
                }
            }
        }
        Ok(delivered)
    }

    /// Sends one batch using the current sequence token.
    async fn flush_batch(&mut self, batch: &EventBatch) -> Result<usize, DeliveryError> {
        let mut token_refreshed = false;
        let mut stream_created = false;
        let mut attempts: u32 = 0;

        loop {
            let result = self
                .transport
                .put_events(
                    &self.group,
                    &self.stream,
                    self.sequence_token.as_deref(),
                    batch,
                )
                .await;

            match result {
                Ok(outcome) => {
                    if outcome.rejected_events > 0 {
                        warn!(
                            "remote service discarded {} events outside its time window",
                            outcome.rejected_events
                        );
                    }
                    self.sequence_token = outcome.next_token;
                    self.delivered_events += batch.len() as u64;
                    debug!(
                        "delivered {} events ({} bytes) to {}/{}",
                        batch.len(),
                        batch.payload_bytes(),
                        self.group,
                        self.stream
                    );
                    return Ok(batch.len());
                }
                Err(TransportError::SequenceConflict { expected }) => {
                    if token_refreshed {
                        return Err(escalate(
                            TransportError::SequenceConflict { expected },
                            attempts,
                        ));
                    }
                    token_refreshed = true;
                    debug!("sequence token rejected, re-fetching from stream description");
                    self.sequence_token = self
                        .transport
                        .fetch_sequence_token(&self.group, &self.stream)
                        .await
                        .map_err(|err| escalate(err, attempts))?;
                }
                Err(TransportError::ResourceMissing(reason)) => {
                    if stream_created {
                        return Err(escalate(TransportError::ResourceMissing(reason), attempts));
                    }
                    stream_created = true;
                    info!("log stream {}/{} missing, creating it", self.group, self.stream);
                    self.transport
                        .create_stream(&self.group, &self.stream)
                        .await
                        .map_err(|err| escalate(err, attempts))?;
                    self.sequence_token = None;
                }
                Err(other) => match FailureKind::of(&other) {
                    FailureKind::Permanent => {
                        error!("permanent delivery failure on {}: {other}", self.group);
                        return Err(DeliveryError::Fatal { source: other });
                    }
                    kind => {
                        attempts += 1;
                        if attempts >= self.policy.max_attempts {
                            warn!(
                                "giving up on batch after {attempts} attempts: {other}"
                            );
                            return Err(DeliveryError::Failed {
                                attempts,
                                source: other,
                            });
                        }
                        let delay = self.policy.delay_for(kind, attempts);
                        debug!(
                            "delivery attempt {attempts} failed ({other}), retrying in {delay:?}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }
    }
}

/// Maps a non-recoverable error from a repair step onto the delivery
/// taxonomy: permanent causes pause the pipeline, everything else leaves the
/// batch queued for a later flush.
fn escalate(err: TransportError, attempts: u32) -> DeliveryError {
    if FailureKind::of(&err) == FailureKind::Permanent
        && !matches!(err, TransportError::SequenceConflict { .. })
    {
        DeliveryError::Fatal { source: err }
    } else {
        DeliveryError::Failed {
            attempts: attempts + 1,
            source: err,
        }
    }
}
