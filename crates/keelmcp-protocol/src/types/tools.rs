//! Tool definitions, hints, and call payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::content::Content;
use super::core::Cursor;
use crate::schema::JsonSchema;

/// Behavioral hints attached to a tool. Wire names are fixed by the
/// MCP specification; all hints are advisory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolAnnotations {
    /// Display title, takes precedence over the tool name in UIs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The tool does not modify its environment
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// The tool may perform destructive updates
    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Repeated calls with the same arguments have no additional effect
    #[serde(rename = "idempotentHint", skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// The tool may interact with an open world of external entities
    #[serde(rename = "openWorldHint", skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// Compact bitset form of the tool hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ToolHints(u8);

impl ToolHints {
    /// The tool does not modify its environment.
    pub const READ_ONLY: Self = Self(1);
    /// The tool may perform destructive updates.
    pub const DESTRUCTIVE: Self = Self(2);
    /// Repeated calls have no additional effect.
    pub const IDEMPOTENT: Self = Self(4);
    /// The tool may reach external entities.
    pub const OPEN_WORLD: Self = Self(8);

    /// No hints set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Union of two hint sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// A call whose effects matter: anything not read-only, or anything
    /// destructive even if also marked read-only.
    pub const fn is_consequential(self) -> bool {
        !self.contains(Self::READ_ONLY) || self.contains(Self::DESTRUCTIVE)
    }

    /// Raw bit pattern.
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl From<&ToolAnnotations> for ToolHints {
    fn from(a: &ToolAnnotations) -> Self {
        let mut hints = Self::empty();
        if a.read_only_hint == Some(true) {
            hints = hints.union(Self::READ_ONLY);
        }
        if a.destructive_hint == Some(true) {
            hints = hints.union(Self::DESTRUCTIVE);
        }
        if a.idempotent_hint == Some(true) {
            hints = hints.union(Self::IDEMPOTENT);
        }
        if a.open_world_hint == Some(true) {
            hints = hints.union(Self::OPEN_WORLD);
        }
        hints
    }
}

/// Tool definition as listed by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// Tool name (programmatic identifier)
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments (always an object schema)
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonSchema,
    /// Behavioral hints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    /// A tool with an empty object schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: JsonSchema::empty_object(),
            annotations: None,
        }
    }

    /// The hint bitset for this tool.
    pub fn hints(&self) -> ToolHints {
        self.annotations.as_ref().map(ToolHints::from).unwrap_or_default()
    }
}

/// `tools/list` request parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListToolsRequest {
    /// Pagination cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListToolsResult {
    /// Available tools
    pub tools: Vec<Tool>,
    /// Next-page cursor
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// `tools/call` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolRequest {
    /// Tool name
    pub name: String,
    /// Tool arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, Value>>,
}

/// `tools/call` result envelope. Handler failures set `is_error` so the
/// model can observe them without breaking the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolResult {
    /// Result content blocks
    pub content: Vec<Content>,
    /// Whether the call failed
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Successful result from content blocks.
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    /// Failure result carrying the error message as text content.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hint_bits_match_assignments() {
        assert_eq!(ToolHints::READ_ONLY.bits(), 1);
        assert_eq!(ToolHints::DESTRUCTIVE.bits(), 2);
        assert_eq!(ToolHints::IDEMPOTENT.bits(), 4);
        assert_eq!(ToolHints::OPEN_WORLD.bits(), 8);
    }

    #[test]
    fn consequential_derivation() {
        // !readOnly || destructive
        assert!(ToolHints::empty().is_consequential());
        assert!(!ToolHints::READ_ONLY.is_consequential());
        assert!(ToolHints::READ_ONLY.union(ToolHints::DESTRUCTIVE).is_consequential());
        assert!(ToolHints::DESTRUCTIVE.is_consequential());
        assert!(!ToolHints::READ_ONLY.union(ToolHints::IDEMPOTENT).is_consequential());
    }

    #[test]
    fn annotations_wire_names() {
        let a = ToolAnnotations {
            title: Some("Add".into()),
            read_only_hint: Some(true),
            destructive_hint: None,
            idempotent_hint: Some(true),
            open_world_hint: None,
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(
            v,
            json!({"title": "Add", "readOnlyHint": true, "idempotentHint": true})
        );
    }

    #[test]
    fn call_result_error_shape() {
        let r = CallToolResult::error("The tool 'x' was not found on the server");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["isError"], json!(true));
        assert_eq!(v["content"][0]["type"], json!("text"));
    }
}
