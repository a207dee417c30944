//! Capability negotiation types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capabilities a client declares during `initialize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientCapabilities {
    /// The client can answer `roots/list`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapabilities>,
    /// The client can answer `sampling/createMessage`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapabilities>,
    /// The client can answer `elicitation/create`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapabilities>,
    /// Experimental extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

/// Capabilities a server reports during `initialize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerCapabilities {
    /// Tool support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapabilities>,
    /// Resource support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapabilities>,
    /// Prompt support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapabilities>,
    /// Logging notification support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapabilities>,
    /// Argument completion support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionCapabilities>,
    /// Experimental extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

/// Roots capability marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RootsCapabilities {
    /// Whether the client emits `notifications/roots/list_changed`
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Sampling capability marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SamplingCapabilities {}

/// Elicitation capability marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElicitationCapabilities {}

/// Logging capability marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingCapabilities {}

/// Completion capability marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionCapabilities {}

/// Tools capability flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolsCapabilities {
    /// Whether the server emits `notifications/tools/list_changed`
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resources capability flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourcesCapabilities {
    /// Whether the server emits `notifications/resources/list_changed`
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
    /// Whether `resources/subscribe` is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
}

/// Prompts capability flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptsCapabilities {
    /// Whether the server emits `notifications/prompts/list_changed`
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

impl ClientCapabilities {
    /// True when the client declared sampling support.
    pub fn supports_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    /// True when the client declared elicitation support.
    pub fn supports_elicitation(&self) -> bool {
        self.elicitation.is_some()
    }

    /// True when the client declared roots support.
    pub fn supports_roots(&self) -> bool {
        self.roots.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_capabilities_are_empty_objects() {
        let caps = ClientCapabilities::default();
        assert_eq!(serde_json::to_value(&caps).unwrap(), json!({}));
    }

    #[test]
    fn server_capabilities_wire_names() {
        let caps = ServerCapabilities {
            tools: Some(ToolsCapabilities {
                list_changed: Some(false),
            }),
            resources: Some(ResourcesCapabilities {
                list_changed: Some(false),
                subscribe: Some(true),
            }),
            ..Default::default()
        };
        let v = serde_json::to_value(&caps).unwrap();
        assert_eq!(v["tools"]["listChanged"], json!(false));
        assert_eq!(v["resources"]["subscribe"], json!(true));
    }
}
