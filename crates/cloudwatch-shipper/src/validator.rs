//! One-shot preflight validation of a log-shipping target.
//!
//! Run before a pipeline is activated: builds an authenticated client,
//! probes the log group with a bounded read, and dry-runs the write
//! permissions the pipeline will need. Every failure mode is converted into
//! a [`ValidationOutcome`]; nothing escapes this boundary as an error.

use std::sync::Arc;

use tracing::debug;

use crate::transport::factory::TransportFactory;

/// Maximum events the read probe asks the service for. Only reachability
/// matters; anything larger is wasted transfer.
const READ_PROBE_LIMIT: i32 = 1;

/// Maximum message length shown in constrained UI contexts; longer causes
/// are cut by [`abbreviate`] at display time.
pub const DISPLAY_MESSAGE_MAX_CHARS: usize = 200;

/// Result of a validation run.
///
/// `Warning` covers conditions worth an operator's attention that do not
/// block activation (blank group name, conservative policy-simulation
/// restrictions); `Error` means the pipeline cannot be expected to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Ok(String),
    Warning(String),
    Error(String),
}

impl ValidationOutcome {
    /// The full, untruncated human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            ValidationOutcome::Ok(msg)
            | ValidationOutcome::Warning(msg)
            | ValidationOutcome::Error(msg) => msg,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, ValidationOutcome::Ok(_))
    }

    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self, ValidationOutcome::Warning(_))
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, ValidationOutcome::Error(_))
    }
}

impl std::fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationOutcome::Ok(msg) => write!(f, "OK: {msg}"),
            ValidationOutcome::Warning(msg) => write!(f, "WARNING: {msg}"),
            ValidationOutcome::Error(msg) => write!(f, "ERROR: {msg}"),
        }
    }
}

/// Truncates a message for display in a constrained context.
///
/// Keeps at most `max_chars` characters, replacing the tail with `...` when
/// the message is cut. Truncation is a presentation concern; outcomes always
/// carry the full message.
#[must_use]
pub fn abbreviate(message: &str, max_chars: usize) -> String {
    let length = message.chars().count();
    if length <= max_chars {
        return message.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = message.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Preflight validator for a log-group target.
pub struct Validator {
    factory: Arc<dyn TransportFactory>,
}

impl Validator {
    #[must_use]
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Validator { factory }
    }

    /// Validates connectivity and permissions for the given target.
    ///
    /// Steps short-circuit on the first failure:
    /// 1. blank group name → `Warning`, before any network call;
    /// 2. client construction → `Error("Unable to validate credentials: …")`;
    /// 3. bounded read probe → `Error(<cause>)`;
    /// 4. policy simulation → reported restriction is a `Warning` (simulation
    ///    results can be conservative), an unexpected failure is an
    ///    `Error("Unable to simulate policy restriction: …")`.
    pub async fn validate(
        &self,
        log_group_name: &str,
        region: Option<&str>,
        credentials_id: Option<&str>,
    ) -> ValidationOutcome {
        if log_group_name.trim().is_empty() {
            return ValidationOutcome::Warning("The log group name cannot be empty".to_string());
        }

        let transport = match self.factory.connect(region, credentials_id).await {
            Ok(transport) => transport,
            Err(err) => {
                return ValidationOutcome::Error(format!("Unable to validate credentials: {err}"));
            }
        };

        if let Err(err) = transport.probe_read(log_group_name, READ_PROBE_LIMIT).await {
            return ValidationOutcome::Error(err.to_string());
        }
        debug!("read probe against {log_group_name} succeeded");

        match transport.simulate_write_policy(log_group_name).await {
            Ok(Some(restriction)) => ValidationOutcome::Warning(restriction),
            Ok(None) => ValidationOutcome::Ok("success".to_string()),
            Err(err) => {
                ValidationOutcome::Error(format!("Unable to simulate policy restriction: {err}"))
            }
        }
    }
}
