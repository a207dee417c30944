//! Server-initiated elicitation (`elicitation/create`).

use serde::{Deserialize, Serialize};

use crate::schema::JsonSchema;

/// `elicitation/create` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElicitRequest {
    /// Message shown to the user
    pub message: String,
    /// Schema of the structured input being requested
    #[serde(rename = "requestedSchema")]
    pub requested_schema: JsonSchema,
}

/// How the user answered an elicitation request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    /// The user submitted values
    Accept,
    /// The user explicitly declined
    Decline,
    /// The user dismissed the request
    Cancel,
}

/// `elicitation/create` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElicitResult {
    /// The user's action
    pub action: ElicitAction,
    /// Submitted values when the action is `accept`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}
