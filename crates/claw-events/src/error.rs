//! Error types for the claw-events crate.

use thiserror::Error;

/// Errors that can occur when building or parsing event classification inputs.
#[derive(Debug, Error)]
pub enum EventError {
    /// A watch change kind string was not recognized.
    #[error("invalid change kind: {value}")]
    InvalidChangeKind {
        /// The unrecognized value.
        value: String,
    },

    /// Classifier configuration is invalid.
    #[error("invalid classifier config: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },
}

/// Result type for event operations.
pub type Result<T> = std::result::Result<T, EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_change_kind() {
        let err = EventError::InvalidChangeKind {
            value: "RENAMED".to_string(),
        };
        assert_eq!(err.to_string(), "invalid change kind: RENAMED");
    }

    #[test]
    fn error_display_invalid_config() {
        let err = EventError::InvalidConfig {
            reason: "backoff escalation count must be greater than 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid classifier config: backoff escalation count must be greater than 0"
        );
    }
}
