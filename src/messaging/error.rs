//! Error types for messaging operations

use crate::error::AppError;
use crate::messaging::connection::ConnectionState;

/// Result type for messaging operations
pub type MessagingResult<T> = std::result::Result<T, MessagingError>;

/// Errors that can occur during messaging operations
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Broker unreachable or connection lost
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Broker rejected the message
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Subscribe failed
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Consume failed
    #[error("Consume failed: {0}")]
    ConsumeFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Payload could not be read as an event
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Operation attempted without a live connection
    #[error("Not connected")]
    NotConnected,

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Connection state machine refused a transition
    #[error("Invalid connection state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl MessagingError {
    /// Whether the error means the broker connection itself is gone
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            MessagingError::ConnectionFailed(_) | MessagingError::NotConnected
        )
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::SerializationError(err.to_string())
    }
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::ConfigurationError(msg) => AppError::Configuration(msg),
            MessagingError::InvalidMessage(msg) => AppError::Validation(msg),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_loss_classification() {
        assert!(MessagingError::ConnectionFailed("down".into()).is_connection_loss());
        assert!(MessagingError::NotConnected.is_connection_loss());
        assert!(!MessagingError::PublishFailed("unknown topic".into()).is_connection_loss());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = MessagingError::InvalidTransition {
            from: ConnectionState::Connected,
            to: ConnectionState::Connected,
        };
        assert_eq!(
            err.to_string(),
            "Invalid connection state transition: connected -> connected"
        );
    }
}
