//! # keelmcp-protocol
//!
//! Protocol layer for the keelmcp MCP framework: the JSON-RPC 2.0
//! envelope, the MCP type set, the JSON Schema model used for tool
//! inputs, and the RFC 6570 URI template engine backing resource
//! bindings.
//!
//! Everything in this crate is plain data plus codecs; transports and
//! dispatch live in the sibling crates.

pub mod error;
pub mod jsonrpc;
pub mod message_id;
pub mod schema;
pub mod types;
pub mod uri_template;

pub use error::{AuthError, ProtocolError, ResourceError, ToolError};
pub use jsonrpc::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion, ResponseId,
};
pub use message_id::RequestId;
pub use schema::{JsonSchema, SchemaArena};
pub use uri_template::UriTemplate;

/// The protocol version this implementation emits during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Protocol versions accepted from clients, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Maximum accepted wire message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Negotiate a protocol version with a client.
///
/// Returns the client's version when we support it, otherwise our own
/// latest version (the client may disconnect if that is unacceptable).
pub fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    match requested {
        Some(v) => SUPPORTED_PROTOCOL_VERSIONS
            .iter()
            .find(|s| **s == v)
            .copied()
            .unwrap_or(PROTOCOL_VERSION),
        None => PROTOCOL_VERSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_accepts_supported_versions() {
        assert_eq!(negotiate_protocol_version(Some("2024-11-05")), "2024-11-05");
        assert_eq!(negotiate_protocol_version(Some("2025-06-18")), "2025-06-18");
    }

    #[test]
    fn negotiation_falls_back_to_default() {
        assert_eq!(negotiate_protocol_version(Some("1999-01-01")), PROTOCOL_VERSION);
        assert_eq!(negotiate_protocol_version(None), PROTOCOL_VERSION);
    }
}
