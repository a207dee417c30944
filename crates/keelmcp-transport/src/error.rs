//! Transport error types.

use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by transports. These terminate the session; protocol
/// errors inside a healthy connection are JSON-RPC error responses
/// instead.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,
    /// A send did not complete
    #[error("send failed: {0}")]
    SendFailed(String),
    /// A receive did not complete
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
    /// The transport was misconfigured
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    /// An operation exceeded its deadline
    #[error("timed out")]
    Timeout,
    /// The transport is not connected
    #[error("not connected")]
    NotConnected,
}
