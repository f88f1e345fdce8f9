//! # CloudWatch Shipper
//!
//! Durable, ordered, retry-safe shipping of build console logs to AWS
//! CloudWatch Logs, plus the configuration and preflight-validation surface
//! that gates a pipeline's activation.
//!
//! ## Architecture
//!
//! ```text
//!    Producer (build output)
//!         │ append
//!         v
//!    ┌─────────────┐
//!    │ EventBuffer │  (ordering, skew clamp, size accounting)
//!    └──────┬──────┘
//!           │ drain (bounded batches)
//!           v
//!    ┌─────────────┐
//!    │ StreamWriter│  (sequence token, pending queue, one-shot repairs)
//!    └──────┬──────┘
//!           │ put-log-events
//!           v
//!    ┌─────────────┐
//!    │ Retry policy│  (classify, backoff with jitter)
//!    └──────┬──────┘
//!           v
//!     CloudWatch Logs
//! ```
//!
//! The library is organized into:
//! - [`buffer`]: event accumulation and bounded batch extraction
//! - [`writer`]: sequence-token ownership and confirmed delivery
//! - [`retry`]: failure classification and backoff policy
//! - [`pipeline`]: the actor service driving buffer → writer per stream
//! - [`validator`]: one-shot preflight connectivity and permission checks
//! - [`transport`]: the remote-API seam and its AWS SDK implementation
//! - [`config`]: runtime configuration and the persisted settings store
//! - [`credentials`]: resolution of opaque credentials identifiers

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod transport;
pub mod validator;
pub mod writer;

/// Current wall-clock time in milliseconds since the Unix epoch, the
/// timestamp base the remote service expects.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        // Clock before the epoch; clamp rather than panic.
        Err(_) => 0,
    }
}
