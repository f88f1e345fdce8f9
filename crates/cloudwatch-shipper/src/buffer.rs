//! Event buffering and batching ahead of delivery to CloudWatch Logs.
//!
//! Console lines produced by a build are appended here and accumulate until
//! the pipeline drains them into size/count-bounded batches. The buffer
//! enforces the ordering and timestamp-window invariants the remote service
//! requires, so a drained batch is always acceptable to PutLogEvents.
//!
//! # Batching rules
//!
//! A drain stops at whichever limit is reached first:
//! 1. **Count limit**: at most `max_count` events
//! 2. **Size limit**: serialized payload at most `max_bytes`
//! 3. **Queue empty**: no more buffered events
//!
//! # Memory management
//!
//! The queue is bounded at [`constants::MAX_QUEUED_EVENTS`] entries; when it
//! is full the oldest event is evicted (FIFO) and a warning is logged, so
//! sustained delivery failure cannot grow memory without bound.

use std::collections::VecDeque;

use tracing::warn;

use crate::constants;
use crate::now_millis;

/// A single log line pending delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Event timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Raw console line.
    pub message: String,
}

impl LogEvent {
    /// Serialized cost of this event against the batch payload limit.
    ///
    /// The service charges the UTF-8 message length plus a fixed per-event
    /// overhead.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.message.len() + constants::EVENT_OVERHEAD_BYTES
    }
}

/// Errors rejected at append time.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The timestamp precedes the last accepted event by more than the
    /// clock-skew tolerance.
    #[error("event timestamp {timestamp} is out of order (last accepted {last_timestamp})")]
    OutOfOrder {
        timestamp: i64,
        last_timestamp: i64,
    },

    /// The timestamp falls outside the window the service accepts
    /// (too old or too far in the future).
    #[error("event timestamp {timestamp} is outside the accepted time window")]
    OutsideWindow { timestamp: i64 },
}

/// An ordered run of events bounded by the service batch limits.
///
/// Invariant: timestamps are non-decreasing and the total payload does not
/// exceed the byte ceiling it was drained with.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    events: Vec<LogEvent>,
    payload_bytes: usize,
}

impl EventBatch {
    /// Builds a batch from already-ordered events.
    #[must_use]
    pub fn from_events(events: Vec<LogEvent>) -> Self {
        debug_assert!(
            events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "batch timestamps must be non-decreasing"
        );
        let payload_bytes = events.iter().map(LogEvent::payload_bytes).sum();
        EventBatch {
            events,
            payload_bytes,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialized payload size, per-event overhead included.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    #[must_use]
    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }
}

/// Accumulates produced log lines into an ordered queue pending upload.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<LogEvent>,
    payload_bytes: usize,
    last_timestamp: Option<i64>,
    skew_tolerance_ms: i64,
    max_queued_events: usize,
    dropped: u64,
}

impl Default for EventBuffer {
    fn default() -> Self {
        EventBuffer::new(
            constants::DEFAULT_SKEW_TOLERANCE_MS,
            constants::MAX_QUEUED_EVENTS,
        )
    }
}

impl EventBuffer {
    /// Creates a buffer with custom skew tolerance and queue capacity.
    ///
    /// Prefer [`EventBuffer::default`] outside tests.
    #[must_use]
    pub fn new(skew_tolerance_ms: i64, max_queued_events: usize) -> Self {
        EventBuffer {
            events: VecDeque::new(),
            payload_bytes: 0,
            last_timestamp: None,
            skew_tolerance_ms,
            max_queued_events,
            dropped: 0,
        }
    }

    /// Appends a single log line.
    ///
    /// Timestamps regressing within the skew tolerance are clamped up to the
    /// last accepted timestamp so batch ordering holds; regressions beyond
    /// the tolerance fail with [`BufferError::OutOfOrder`]. Timestamps
    /// outside the service's accepted window fail with
    /// [`BufferError::OutsideWindow`]. Oversized messages are truncated to
    /// the per-event ceiling.
    pub fn append(
        &mut self,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Result<(), BufferError> {
        let now = now_millis();
        if timestamp < now - constants::EVENT_MAX_AGE_MS
            || timestamp > now + constants::EVENT_MAX_FUTURE_MS
        {
            return Err(BufferError::OutsideWindow { timestamp });
        }

        let timestamp = match self.last_timestamp {
            Some(last) if timestamp < last => {
                if last - timestamp > self.skew_tolerance_ms {
                    return Err(BufferError::OutOfOrder {
                        timestamp,
                        last_timestamp: last,
                    });
                }
                // Within tolerance: clamp up so the queue stays ordered.
                last
            }
            _ => timestamp,
        };

        let mut message = message.into();
        let budget = constants::MAX_EVENT_BYTES - constants::EVENT_OVERHEAD_BYTES;
        if message.len() > budget {
            let mut cut = budget;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            warn!(
                "log event of {} bytes exceeds the per-event limit, truncating",
                message.len()
            );
            message.truncate(cut);
        }

        if self.events.len() >= self.max_queued_events {
            if let Some(evicted) = self.events.pop_front() {
                self.payload_bytes -= evicted.payload_bytes();
                self.dropped += 1;
                warn!(
                    "event buffer full ({} events), dropping oldest log line",
                    self.max_queued_events
                );
            }
        }

        let event = LogEvent { timestamp, message };
        self.payload_bytes += event.payload_bytes();
        self.last_timestamp = Some(timestamp);
        self.events.push_back(event);
        Ok(())
    }

    /// Drains the oldest contiguous run of events within the given ceilings.
    ///
    /// The returned iterator is lazy, finite, and one-shot: every event it
    /// yields is removed from the buffer and the internal size accounting is
    /// updated as it goes. Dropping the iterator early leaves the remaining
    /// events buffered.
    pub fn drain(&mut self, max_bytes: usize, max_count: usize) -> Drain<'_> {
        Drain {
            bytes_left: max_bytes,
            count_left: max_count,
            buffer: self,
        }
    }

    /// Drains one batch, or `None` when the buffer is empty.
    pub fn next_batch(&mut self, max_bytes: usize, max_count: usize) -> Option<EventBatch> {
        let events: Vec<LogEvent> = self.drain(max_bytes, max_count).collect();
        if events.is_empty() {
            None
        } else {
            Some(EventBatch::from_events(events))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialized payload size of everything currently buffered.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Number of events evicted since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// One-shot draining iterator returned by [`EventBuffer::drain`].
#[derive(Debug)]
pub struct Drain<'a> {
    buffer: &'a mut EventBuffer,
    bytes_left: usize,
    count_left: usize,
}

impl Iterator for Drain<'_> {
    type Item = LogEvent;

    fn next(&mut self) -> Option<LogEvent> {
        if self.count_left == 0 {
            return None;
        }
        let size = self.buffer.events.front()?.payload_bytes();
        if size > self.bytes_left {
            return None;
        }
        let event = self.buffer.events.pop_front()?;
        self.buffer.payload_bytes -= size;
        self.bytes_left -= size;
        self.count_left -= 1;
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> EventBuffer {
        EventBuffer::default()
    }

    #[test]
    fn test_append_in_order() {
        let mut buf = buffer();
        let now = now_millis();

        buf.append("one", now).unwrap();
        buf.append("two", now + 1).unwrap();
        buf.append("three", now + 1).unwrap();

        assert_eq!(buf.len(), 3);
        assert_eq!(
            buf.payload_bytes(),
            3 + 3 + 5 + 3 * constants::EVENT_OVERHEAD_BYTES
        );
    }

    #[test]
    fn test_append_within_tolerance_clamps() {
        let mut buf = buffer();
        let now = now_millis();

        buf.append("first", now).unwrap();
        buf.append("skewed", now - 3_000).unwrap();

        let events: Vec<LogEvent> = buf.drain(usize::MAX, usize::MAX).collect();
        assert_eq!(events[1].timestamp, now);
    }

    #[test]
    fn test_append_beyond_tolerance_fails() {
        let mut buf = buffer();
        let now = now_millis();

        buf.append("first", now).unwrap();
        let err = buf.append("late", now - 6_000).unwrap_err();

        assert!(matches!(err, BufferError::OutOfOrder { .. }));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_append_at_last_timestamp_succeeds() {
        let mut buf = buffer();
        let now = now_millis();

        buf.append("first", now).unwrap();
        buf.append("same instant", now).unwrap();
        buf.append("later", now + 10).unwrap();

        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_append_outside_window() {
        let mut buf = buffer();
        let now = now_millis();

        let stale = buf.append("old", now - constants::EVENT_MAX_AGE_MS - 60_000);
        assert!(matches!(stale, Err(BufferError::OutsideWindow { .. })));

        let future = buf.append("future", now + constants::EVENT_MAX_FUTURE_MS + 60_000);
        assert!(matches!(future, Err(BufferError::OutsideWindow { .. })));

        assert!(buf.is_empty());
    }

    #[test]
    fn test_append_truncates_oversized_message() {
        let mut buf = buffer();
        let budget = constants::MAX_EVENT_BYTES - constants::EVENT_OVERHEAD_BYTES;
        let message = "x".repeat(budget + 100);

        buf.append(message, now_millis()).unwrap();

        let events: Vec<LogEvent> = buf.drain(usize::MAX, usize::MAX).collect();
        assert_eq!(events[0].message.len(), budget);
    }

    #[test]
    fn test_eviction_when_full() {
        let mut buf = EventBuffer::new(constants::DEFAULT_SKEW_TOLERANCE_MS, 3);
        let now = now_millis();

        for i in 0..4 {
            buf.append(format!("line {i}"), now + i).unwrap();
        }

        assert_eq!(buf.len(), 3);
        assert_eq!(buf.dropped(), 1);
        let events: Vec<LogEvent> = buf.drain(usize::MAX, usize::MAX).collect();
        assert_eq!(events[0].message, "line 1");
    }

    #[test]
    fn test_drain_respects_count_limit() {
        let mut buf = buffer();
        let now = now_millis();
        for i in 0..5 {
            buf.append(format!("line {i}"), now + i).unwrap();
        }

        let drained: Vec<LogEvent> = buf.drain(usize::MAX, 2).collect();

        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "line 0");
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_drain_respects_byte_limit() {
        let mut buf = buffer();
        let now = now_millis();
        for i in 0..3 {
            buf.append("aaaa", now + i).unwrap();
        }
        let one_event = 4 + constants::EVENT_OVERHEAD_BYTES;

        let drained: Vec<LogEvent> = buf.drain(one_event * 2, usize::MAX).collect();

        assert_eq!(drained.len(), 2);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.payload_bytes(), one_event);
    }

    #[test]
    fn test_drain_is_one_shot() {
        let mut buf = buffer();
        let now = now_millis();
        buf.append("only", now).unwrap();

        let first: Vec<LogEvent> = buf.drain(usize::MAX, usize::MAX).collect();
        let second: Vec<LogEvent> = buf.drain(usize::MAX, usize::MAX).collect();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(buf.payload_bytes(), 0);
    }

    #[test]
    fn test_drain_dropped_early_keeps_remainder() {
        let mut buf = buffer();
        let now = now_millis();
        for i in 0..4 {
            buf.append(format!("line {i}"), now + i).unwrap();
        }

        {
            let mut drain = buf.drain(usize::MAX, usize::MAX);
            drain.next().unwrap();
            drain.next().unwrap();
        }

        assert_eq!(buf.len(), 2);
        let rest: Vec<LogEvent> = buf.drain(usize::MAX, usize::MAX).collect();
        assert_eq!(rest[0].message, "line 2");
    }

    #[test]
    fn test_next_batch_builds_ordered_batch() {
        let mut buf = buffer();
        let now = now_millis();
        for i in 0..3 {
            buf.append(format!("line {i}"), now + i).unwrap();
        }

        let batch = buf.next_batch(usize::MAX, usize::MAX).unwrap();

        assert_eq!(batch.len(), 3);
        assert!(batch
            .events()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(buf.next_batch(usize::MAX, usize::MAX).is_none());
    }

    #[test]
    fn test_batch_payload_accounting() {
        let events = vec![
            LogEvent {
                timestamp: 1,
                message: "ab".to_string(),
            },
            LogEvent {
                timestamp: 2,
                message: "cde".to_string(),
            },
        ];

        let batch = EventBatch::from_events(events);

        assert_eq!(
            batch.payload_bytes(),
            5 + 2 * constants::EVENT_OVERHEAD_BYTES
        );
    }
}
