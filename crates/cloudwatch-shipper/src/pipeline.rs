//! Actor-based shipping pipeline for one target stream.
//!
//! A single service task owns the event buffer and the stream writer, so
//! all sequence-token mutation happens under exclusive access with at most
//! one flush in flight. Producers hold a cheap cloneable handle and never
//! touch the network.
//!
//! ```text
//!    Producers (handles)
//!         │ append
//!         v
//!    ┌──────────────┐   periodic tick / Flush command
//!    │ ShipperService│ ────────────────────────────────┐
//!    └──────┬───────┘                                  v
//!           │                                   ┌──────────────┐
//!       EventBuffer ── drain batches ─────────> │ StreamWriter │
//!                                               └──────┬───────┘
//!                                                      v
//!                                                CloudWatch Logs
//! ```
//!
//! # Shutdown
//!
//! Shutdown — via the handle or the cancellation token — lets any in-flight
//! flush finish, submits nothing further, and reports every
//! buffered-but-undelivered batch instead of dropping it.
//!
//! # Fatal failures
//!
//! A permanent delivery failure pauses the pipeline: appends are still
//! buffered (bounded by eviction) but no batches are submitted until an
//! operator intervenes, mirroring the preflight validator's verdict.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::buffer::{EventBatch, EventBuffer};
use crate::config::ShipperConfig;
use crate::error::DeliveryError;
use crate::transport::LogsTransport;
use crate::writer::StreamWriter;

/// Errors surfaced through the pipeline handle.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The service task is gone or shutting down.
    #[error("pipeline unavailable: {0}")]
    Channel(String),

    /// A flush ran and failed.
    #[error(transparent)]
    Delivery(DeliveryError),

    /// The pipeline is paused after a fatal delivery error and needs
    /// operator intervention.
    #[error("pipeline paused after fatal delivery error: {0}")]
    Paused(String),
}

/// What was and was not delivered by the time the pipeline stopped.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Batches that never got a confirmed append, oldest first.
    pub undelivered: Vec<EventBatch>,
    /// Events confirmed delivered over the pipeline's lifetime.
    pub delivered_events: u64,
    /// Events evicted from the buffer under backpressure.
    pub dropped_events: u64,
}

impl ShutdownReport {
    /// Total events across the undelivered batches.
    #[must_use]
    pub fn undelivered_events(&self) -> usize {
        self.undelivered.iter().map(EventBatch::len).sum()
    }
}

/// Commands sent from handles to the service task.
#[derive(Debug)]
pub enum ShipperCommand {
    /// Buffer one log line (non-blocking).
    Append { message: String, timestamp: i64 },
    /// Drain the buffer and deliver everything pending.
    Flush(oneshot::Sender<Result<usize, PipelineError>>),
    /// Stop the service and report undelivered batches.
    Shutdown(oneshot::Sender<ShutdownReport>),
}

/// Cloneable producer-side handle to a running pipeline.
#[derive(Clone, Debug)]
pub struct ShipperHandle {
    tx: mpsc::UnboundedSender<ShipperCommand>,
}

impl ShipperHandle {
    /// Buffers one log line without blocking the producer.
    ///
    /// Ordering violations are detected on the service side and logged
    /// there; this only fails when the pipeline is gone.
    pub fn append(
        &self,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Result<(), PipelineError> {
        self.tx
            .send(ShipperCommand::Append {
                message: message.into(),
                timestamp,
            })
            .map_err(|err| PipelineError::Channel(err.to_string()))
    }

    /// Flushes everything buffered and pending, returning the number of
    /// events confirmed delivered by this flush.
    pub async fn flush(&self) -> Result<usize, PipelineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ShipperCommand::Flush(response_tx))
            .map_err(|err| PipelineError::Channel(err.to_string()))?;
        response_rx
            .await
            .map_err(|err| PipelineError::Channel(err.to_string()))?
    }

    /// Stops the pipeline and returns what was left undelivered.
    pub async fn shutdown(&self) -> Result<ShutdownReport, PipelineError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(ShipperCommand::Shutdown(response_tx))
            .map_err(|err| PipelineError::Channel(err.to_string()))?;
        response_rx
            .await
            .map_err(|err| PipelineError::Channel(err.to_string()))
    }
}

/// Service task owning the buffer and writer for one target stream.
pub struct ShipperService {
    rx: mpsc::UnboundedReceiver<ShipperCommand>,
    buffer: EventBuffer,
    writer: StreamWriter,
    target: String,
    max_batch_payload_bytes: usize,
    max_batch_event_count: usize,
    flush_interval: std::time::Duration,
    cancel_token: CancellationToken,
    fatal: Option<String>,
}

impl ShipperService {
    /// Creates a service for the configured target.
    ///
    /// Returns the service (to be spawned with [`ShipperService::run`]) and
    /// a handle for producers.
    #[must_use]
    pub fn new(
        config: &ShipperConfig,
        transport: Arc<dyn LogsTransport>,
    ) -> (Self, ShipperHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let buffer = EventBuffer::new(config.clock_skew_tolerance_ms, config.max_queued_events);
        let writer = StreamWriter::new(
            transport,
            config.retry_policy(),
            config.log_group_name.clone(),
            config.log_stream_name.clone(),
        );

        let service = ShipperService {
            rx,
            buffer,
            writer,
            target: format!("{}/{}", config.log_group_name, config.log_stream_name),
            max_batch_payload_bytes: config.max_batch_payload_bytes,
            max_batch_event_count: config.max_batch_event_count,
            flush_interval: config.flush_interval(),
            cancel_token: CancellationToken::new(),
            fatal: None,
        };
        let handle = ShipperHandle { tx };

        (service, handle)
    }

    /// Token for triggering shutdown without a handle.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Runs the service until shutdown, flushing periodically.
    pub async fn run(mut self) {
        debug!("log shipper started for {}", self.target);
        let mut interval = tokio::time::interval(self.flush_interval);
        interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                Some(command) = self.rx.recv() => match command {
                    ShipperCommand::Append { message, timestamp } => {
                        self.handle_append(message, timestamp);
                    }
                    ShipperCommand::Flush(response_tx) => {
                        let result = self.flush_once().await;
                        if response_tx.send(result).is_err() {
                            debug!("flush requester went away before the response");
                        }
                    }
                    ShipperCommand::Shutdown(response_tx) => {
                        let report = self.shutdown_report();
                        let _ = response_tx.send(report);
                        return;
                    }
                },
                _ = interval.tick() => {
                    match self.flush_once().await {
                        Ok(0) => {}
                        Ok(delivered) => debug!("periodic flush delivered {delivered} events"),
                        Err(PipelineError::Paused(_)) => {}
                        Err(err) => warn!("periodic flush failed on {}: {err}", self.target),
                    }
                }
                () = self.cancel_token.cancelled() => {
                    debug!("shutdown signal received for {}, draining producers", self.target);
                    let mut requesters = self.drain_commands();
                    let report = self.shutdown_report();
                    if !report.undelivered.is_empty() {
                        warn!(
                            "{} shut down with {} undelivered events",
                            self.target,
                            report.undelivered_events()
                        );
                    }
                    // A Shutdown command racing with cancellation still gets
                    // the real report; there is only one to hand out.
                    if let Some(first) = requesters.pop() {
                        let _ = first.send(report);
                    }
                    for response_tx in requesters {
                        let _ = response_tx.send(ShutdownReport::default());
                    }
                    return;
                }
            }
        }
    }

    fn handle_append(&mut self, message: String, timestamp: i64) {
        if let Err(err) = self.buffer.append(message, timestamp) {
            warn!("dropping log line: {err}");
        }
    }

    /// Moves buffered events into the writer's pending queue and delivers
    /// everything queued.
    async fn flush_once(&mut self) -> Result<usize, PipelineError> {
        if let Some(cause) = &self.fatal {
            return Err(PipelineError::Paused(cause.clone()));
        }

        while let Some(batch) = self
            .buffer
            .next_batch(self.max_batch_payload_bytes, self.max_batch_event_count)
        {
            self.writer.enqueue(batch);
        }

        match self.writer.flush_pending().await {
            Ok(delivered) => Ok(delivered),
            Err(err) => {
                if matches!(err, DeliveryError::Fatal { .. }) {
                    error!("pausing pipeline for {}: {err}", self.target);
                    self.fatal = Some(err.to_string());
                }
                Err(PipelineError::Delivery(err))
            }
        }
    }

    /// Processes whatever producers managed to send before cancellation,
    /// returning any shutdown requesters still waiting on a report.
    fn drain_commands(&mut self) -> Vec<oneshot::Sender<ShutdownReport>> {
        let mut shutdown_requesters = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            match command {
                ShipperCommand::Append { message, timestamp } => {
                    self.handle_append(message, timestamp);
                }
                ShipperCommand::Flush(response_tx) => {
                    let _ = response_tx.send(Err(PipelineError::Channel(
                        "pipeline is shutting down".to_string(),
                    )));
                }
                ShipperCommand::Shutdown(response_tx) => shutdown_requesters.push(response_tx),
            }
        }
        shutdown_requesters
    }

    /// Collects everything undelivered: the writer's pending queue plus
    /// whatever is still buffered.
    fn shutdown_report(&mut self) -> ShutdownReport {
        let mut undelivered = self.writer.take_pending();
        while let Some(batch) = self
            .buffer
            .next_batch(self.max_batch_payload_bytes, self.max_batch_event_count)
        {
            undelivered.push(batch);
        }
        ShutdownReport {
            undelivered,
            delivered_events: self.writer.delivered_events(),
            dropped_events: self.buffer.dropped(),
        }
    }
}
