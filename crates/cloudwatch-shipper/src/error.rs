use crate::transport::TransportError;

/// Errors raised by the configuration surface.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting was blank. Rejected at set-time.
    #[error("the {0} cannot be empty")]
    BlankField(&'static str),

    /// A setting failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The settings store could not be read or written.
    #[error("settings store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted settings document could not be encoded or decoded.
    #[error("settings serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Terminal outcome of attempting to deliver one batch.
///
/// In both cases the batch stays at the front of the pending queue; the
/// caller decides whether to keep retrying later or alert.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Bounded retries were exhausted without a confirmed append.
    #[error("delivery failed after {attempts} attempts: {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// A permanent failure; the pipeline pauses and requires operator
    /// intervention.
    #[error("fatal delivery error: {source}")]
    Fatal {
        #[source]
        source: TransportError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::BlankField("log group name");
        assert_eq!(err.to_string(), "the log group name cannot be empty");
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::Failed {
            attempts: 5,
            source: TransportError::Throttled("rate exceeded".into()),
        };
        assert!(err.to_string().contains("after 5 attempts"));

        let err = DeliveryError::Fatal {
            source: TransportError::Auth("access denied".into()),
        };
        assert!(err.to_string().starts_with("fatal delivery error"));
    }
}
