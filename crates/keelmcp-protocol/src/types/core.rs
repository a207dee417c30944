//! Core protocol types shared across features.

use serde::{Deserialize, Serialize};

use crate::message_id::RequestId;

/// URI string
pub type Uri = String;

/// MIME type string
pub type MimeType = String;

/// Base64 encoded data
pub type Base64String = String;

/// Pagination cursor
pub type Cursor = String;

/// Progress token - echoes the originating request's id.
pub type ProgressToken = RequestId;

/// Implementation information exchanged during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Implementation {
    /// Implementation name (programmatic identifier)
    pub name: String,
    /// Display title for UI contexts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Implementation version
    pub version: String,
}

impl Implementation {
    /// Create implementation info from a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            version: version.into(),
        }
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User role
    User,
    /// Assistant role
    Assistant,
}

/// An empty result payload (`{}` on the wire).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmptyResult {}

/// Notification that a request was cancelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelledNotification {
    /// The id of the request being cancelled
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    /// Optional human-readable reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Progress update for a long-running request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressNotification {
    /// Token correlating this update with the inbound request
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    /// Progress so far
    pub progress: f64,
    /// Total work units, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Optional status message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cancelled_notification_wire_shape() {
        let n = CancelledNotification {
            request_id: RequestId::Number(9),
            reason: None,
        };
        assert_eq!(serde_json::to_value(&n).unwrap(), json!({"requestId": 9}));
    }

    #[test]
    fn progress_token_echoes_request_id() {
        let p = ProgressNotification {
            progress_token: RequestId::String("r-1".into()),
            progress: 0.5,
            total: Some(1.0),
            message: None,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["progressToken"], json!("r-1"));
    }
}
