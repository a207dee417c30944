//! Server error types.

use thiserror::Error;

use keelmcp_protocol::jsonrpc::JsonRpcError;
use keelmcp_protocol::{ProtocolError, ResourceError, ToolError};
use keelmcp_transport::TransportError;

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised inside the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Protocol-level failure, maps straight to a JSON-RPC error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Tool execution failure
    #[error(transparent)]
    Tool(#[from] ToolError),
    /// Resource lookup or read failure
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// Transport failure, terminates the session
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A server-initiated call needs a capability the client lacks
    #[error("client does not support {capability}")]
    ClientLacksCapability {
        /// The missing capability
        capability: &'static str,
    },
    /// An outbound call exceeded its deadline
    #[error("request timed out")]
    Timeout,
    /// The request or session was cancelled
    #[error("cancelled")]
    Cancelled,
    /// Prompt rendering failure
    #[error("prompt failed: {0}")]
    Prompt(String),
    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    /// Internal error from any displayable value.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Map to a JSON-RPC error object for the wire.
    pub fn to_json_rpc(&self) -> JsonRpcError {
        match self {
            Self::Protocol(p) => p.clone().into(),
            Self::Tool(t) if t.is_invalid_params() => JsonRpcError {
                code: -32602,
                message: t.to_string(),
                data: None,
            },
            Self::Cancelled => JsonRpcError {
                code: -32000,
                message: "Cancelled".to_string(),
                data: None,
            },
            Self::Timeout => JsonRpcError {
                code: -32000,
                message: "Timed out".to_string(),
                data: None,
            },
            other => JsonRpcError {
                code: -32000,
                message: other.to_string(),
                data: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_failures_map_to_invalid_params() {
        let err = ServerError::Tool(ToolError::MissingRequired { parameter: "a".into() });
        assert_eq!(err.to_json_rpc().code, -32602);
    }

    #[test]
    fn cancellation_maps_to_domain_code() {
        assert_eq!(ServerError::Cancelled.to_json_rpc().code, -32000);
    }

    #[test]
    fn method_not_found_maps_through_protocol() {
        let err = ServerError::Protocol(ProtocolError::MethodNotFound { method: "x/y".into() });
        assert_eq!(err.to_json_rpc().code, -32601);
    }
}
