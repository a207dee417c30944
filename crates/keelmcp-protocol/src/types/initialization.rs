//! The `initialize` handshake payloads.

use serde::{Deserialize, Serialize};

use super::capabilities::{ClientCapabilities, ServerCapabilities};
use super::core::Implementation;

/// `initialize` request parameters.
///
/// Every field tolerates absence: an `initialize` with empty params is
/// answered with the server's defaults rather than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InitializeRequest {
    /// Protocol version the client speaks
    #[serde(rename = "protocolVersion", skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Client capabilities
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    /// Client implementation info
    #[serde(rename = "clientInfo", skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Implementation>,
}

/// `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializeResult {
    /// Negotiated protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Server implementation info
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Optional usage instructions for the client's model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initialize_request_decodes_from_empty_params() {
        let req: InitializeRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.capabilities, ClientCapabilities::default());
        assert!(req.client_info.is_none());
        assert!(req.protocol_version.is_none());
    }

    #[test]
    fn initialize_request_decodes_client_info() {
        let req: InitializeRequest = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }))
        .unwrap();
        assert_eq!(req.client_info.unwrap().name, "test-client");
    }

    #[test]
    fn initialize_result_wire_names() {
        let result = InitializeResult {
            protocol_version: "2024-11-05".into(),
            capabilities: ServerCapabilities::default(),
            server_info: Implementation::new("keelmcp", "0.4.2"),
            instructions: None,
        };
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["protocolVersion"], json!("2024-11-05"));
        assert_eq!(v["serverInfo"]["name"], json!("keelmcp"));
    }
}
