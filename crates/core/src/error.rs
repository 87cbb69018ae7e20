// crates/core/src/error.rs
use std::time::Duration;
use thiserror::Error;

/// Errors raised while constructing a wire message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Task id must not be empty")]
    EmptyTaskId,

    #[error("Percentage out of range: {0} (expected 0-100)")]
    PercentageOutOfRange(u8),
}

/// Errors returned by a connection handle when a frame cannot be delivered.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Connection closed")]
    Closed,

    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Reasons an emission did not complete.
///
/// Only surfaced by the `try_*` entry points of the emission bridge; the
/// plain `emit_*` calls log these and return normally.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("Emission bridge has no owning runtime registered")]
    Unconfigured,

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] MessageError),

    #[error("Delivery not confirmed within {0:?}")]
    Timeout(Duration),

    #[error("Owning runtime dropped the delivery before confirming it")]
    Dropped,
}

impl EmitError {
    /// Short label used for metrics and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            EmitError::Unconfigured => "unconfigured",
            EmitError::InvalidMessage(_) => "invalid_message",
            EmitError::Timeout(_) => "timeout",
            EmitError::Dropped => "dropped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_error_display() {
        let err = MessageError::PercentageOutOfRange(150);
        assert!(err.to_string().contains("150"));
        assert!(MessageError::EmptyTaskId.to_string().contains("empty"));
    }

    #[test]
    fn test_send_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SendError = serde_err.into();
        assert!(matches!(err, SendError::Serialize(_)));
    }

    #[test]
    fn test_emit_error_reason_labels() {
        assert_eq!(EmitError::Unconfigured.reason(), "unconfigured");
        assert_eq!(
            EmitError::Timeout(Duration::from_secs(5)).reason(),
            "timeout"
        );
        assert_eq!(EmitError::Dropped.reason(), "dropped");
        assert_eq!(
            EmitError::from(MessageError::EmptyTaskId).reason(),
            "invalid_message"
        );
    }
}
