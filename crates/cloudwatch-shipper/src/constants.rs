//! Constants for CloudWatch Logs API limits.
//!
//! The PutLogEvents API enforces hard limits on batch payloads and on event
//! timestamps. These constants keep the pipeline within those limits so the
//! service never rejects a batch for a reason the pipeline could have
//! prevented locally.

/// Maximum serialized payload size of a single PutLogEvents batch.
///
/// The service counts each event as its UTF-8 message length plus
/// [`EVENT_OVERHEAD_BYTES`]. Batches exceeding this are rejected outright,
/// so the buffer never drains past it.
///
/// # Value: 1 MiB (1,048,576 bytes)
pub(crate) const MAX_BATCH_PAYLOAD_BYTES: usize = 1_048_576;

/// Maximum number of events per PutLogEvents batch.
pub(crate) const MAX_BATCH_EVENT_COUNT: usize = 10_000;

/// Fixed per-event accounting overhead the service adds on top of the
/// message bytes.
pub(crate) const EVENT_OVERHEAD_BYTES: usize = 26;

/// Maximum size of a single event, overhead included.
///
/// Messages longer than this are truncated at append time; the service
/// would reject the whole batch otherwise.
///
/// # Value: 256 KiB (262,144 bytes)
pub(crate) const MAX_EVENT_BYTES: usize = 256 * 1_024;

/// Oldest event timestamp the service accepts, relative to now.
///
/// # Value: 14 days
pub(crate) const EVENT_MAX_AGE_MS: i64 = 14 * 24 * 60 * 60 * 1_000;

/// Farthest-future event timestamp the service accepts, relative to now.
///
/// # Value: 2 hours
pub(crate) const EVENT_MAX_FUTURE_MS: i64 = 2 * 60 * 60 * 1_000;

/// Maximum number of buffered events before FIFO eviction.
///
/// When the queue is full the oldest event is dropped with a warning,
/// bounding memory under sustained delivery failure. Assuming ~1 KiB per
/// console line this is roughly 50 MiB of buffered logs.
pub(crate) const MAX_QUEUED_EVENTS: usize = 50_000;

/// Tolerated producer clock regression between consecutive appends.
///
/// Timestamps within the tolerance are clamped up to the previous event's
/// timestamp; regressions beyond it are rejected as out of order.
pub(crate) const DEFAULT_SKEW_TOLERANCE_MS: i64 = 5_000;

/// Default interval between periodic flushes of the event buffer.
pub(crate) const DEFAULT_FLUSH_INTERVAL_MS: u64 = 2_000;
