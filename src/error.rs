//! Error types for the subscription server
//!
//! Handler-level failures are converted into scoped protocol messages at the
//! engine boundary; only connect-init failures also close the transport.

use thiserror::Error;

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting or answering protocol messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The connect hook rejected `connection_init`
    #[error("{0}")]
    ConnectInit(#[from] ConnectError),

    /// The execution engine failed for an operation
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// `start` reused the id of a live operation
    #[error("Operation id '{0}' is already in use")]
    DuplicateOperation(String),

    /// Inbound frame was not a JSON object
    #[error("Message must be a JSON object: {0}")]
    InvalidMessage(String),

    /// Inbound `type` tag is missing or unknown
    #[error("Invalid message type: {0}")]
    UnknownMessageType(String),

    /// `start` or `stop` arrived without an operation id
    #[error("Message of type '{0}' requires an id")]
    MissingOperationId(String),

    /// `start` payload is not a valid GraphQL request
    #[error("Invalid start payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure reported by the execution engine
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by the `on_connect` hook
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConnectError {
    pub message: String,
}

impl ConnectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport was closed or the peer disconnected
    #[error("transport is closed")]
    Closed,

    #[error("failed to send frame: {0}")]
    Send(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProtocolError::DuplicateOperation("7".to_string());
        assert_eq!(err.to_string(), "Operation id '7' is already in use");

        let err: ProtocolError = ExecutionError::new("boom").into();
        assert_eq!(err.to_string(), "boom");

        let err: ProtocolError = TransportError::Closed.into();
        assert_eq!(err.to_string(), "transport is closed");
    }
}
