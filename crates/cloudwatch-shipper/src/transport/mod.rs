//! Remote logging API seam.
//!
//! The pipeline and validator talk to CloudWatch Logs exclusively through the
//! [`LogsTransport`] trait, kept thin so tests can script remote behavior
//! without a network. The AWS SDK implementation lives in [`cloudwatch`];
//! client construction for a given region/credentials pair lives in
//! [`factory`].

use async_trait::async_trait;

use crate::buffer::EventBatch;

pub mod cloudwatch;
pub mod factory;
#[cfg(test)]
pub(crate) mod testing;

/// Opaque continuation token returned by the service after each successful
/// append, required to authorize the next append to the same stream.
pub type SequenceToken = String;

/// Classified remote failure, as surfaced by a transport implementation.
///
/// The retry controller maps these onto retry decisions; sequence conflicts
/// and missing resources are resolved by the stream writer itself with
/// one-shot recoveries.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Credential or permission failure. Permanent.
    #[error("authorization failure: {0}")]
    Auth(String),

    /// Network-level failure or timeout. Transient.
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// Remote rate limiting. Retryable with backoff.
    #[error("throttled by remote service: {0}")]
    Throttled(String),

    /// The sequence token was rejected; the stream has advanced elsewhere.
    #[error("sequence token rejected by remote service")]
    SequenceConflict {
        /// Token the service reported as current, when it said so.
        expected: Option<SequenceToken>,
    },

    /// The target stream (or group, depending on the operation) is missing.
    #[error("remote resource missing: {0}")]
    ResourceMissing(String),

    /// The request itself was rejected as invalid. Permanent.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Unclassified remote service failure. Treated as transient.
    #[error("remote service error: {0}")]
    Service(String),
}

/// Result of a successful append.
#[derive(Debug, Clone, Default)]
pub struct PutOutcome {
    /// Token to use for the next append on this stream.
    pub next_token: Option<SequenceToken>,
    /// Events the service accepted the batch with but discarded
    /// (expired or too far ahead of its clock).
    pub rejected_events: usize,
}

/// Operations the pipeline consumes from the remote logging API.
#[async_trait]
pub trait LogsTransport: Send + Sync {
    /// Creates a log stream inside the group. Succeeds if it already exists.
    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), TransportError>;

    /// Fetches the stream's current sequence token via the stream-description
    /// call. `Ok(None)` means the stream exists but has no token yet, or does
    /// not exist at all; a missing *group* is an error.
    async fn fetch_sequence_token(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<SequenceToken>, TransportError>;

    /// Appends one batch using the given sequence token.
    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        token: Option<&str>,
        batch: &EventBatch,
    ) -> Result<PutOutcome, TransportError>;

    /// Read-only probe confirming the group is reachable and the caller can
    /// read it. The result set is capped at `limit` events; only success or
    /// failure matters.
    async fn probe_read(&self, group: &str, limit: i32) -> Result<(), TransportError>;

    /// Dry-run permission check for the write actions the pipeline needs.
    /// `Ok(Some(message))` describes a reported restriction.
    async fn simulate_write_policy(&self, group: &str) -> Result<Option<String>, TransportError>;
}
