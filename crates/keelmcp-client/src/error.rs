//! Client error types.

use thiserror::Error;

use keelmcp_protocol::jsonrpc::JsonRpcError;
use keelmcp_transport::TransportError;

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server answered with a JSON-RPC error
    #[error("server error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),
    /// A payload failed to encode or decode
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    /// An operation requiring the handshake ran before `initialize`
    #[error("client is not initialized")]
    NotInitialized,
    /// A request exceeded its deadline
    #[error("request timed out")]
    Timeout,
    /// The connection went away mid-request
    #[error("connection closed")]
    ConnectionClosed,
}
