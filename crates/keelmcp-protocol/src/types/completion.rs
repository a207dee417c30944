//! Argument completion (`completion/complete`).

use serde::{Deserialize, Serialize};

/// What the completion request refers to: a prompt or a resource
/// template, identified on the wire by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// A prompt argument
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Prompt name
        name: String,
    },
    /// A resource template variable
    #[serde(rename = "ref/resource")]
    Resource {
        /// The URI template
        uri: String,
    },
}

/// The argument being completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionArgument {
    /// Argument name
    pub name: String,
    /// Partial value typed so far
    pub value: String,
}

/// Previously resolved arguments, passed along so hooks can narrow
/// their candidates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompletionContext {
    /// Already-bound argument values
    #[serde(default)]
    pub arguments: std::collections::HashMap<String, String>,
}

/// `completion/complete` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteRequest {
    /// What is being completed
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// The argument and its partial value
    pub argument: CompletionArgument,
    /// Already-bound sibling arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CompletionContext>,
}

/// Completion values with paging hints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    /// Candidate values (at most 100)
    pub values: Vec<String>,
    /// Total candidates, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Whether more candidates exist beyond `values`
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// `completion/complete` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteResult {
    /// The completion payload
    pub completion: Completion,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reference_tags() {
        let r = CompletionReference::Prompt { name: "greet".into() };
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"type": "ref/prompt", "name": "greet"})
        );
        let r = CompletionReference::Resource { uri: "users://{user_id}/profile".into() };
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"type": "ref/resource", "uri": "users://{user_id}/profile"})
        );
    }
}
