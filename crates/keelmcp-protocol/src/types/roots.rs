//! Client filesystem roots (`roots/list`).

use serde::{Deserialize, Serialize};

/// A root location the client exposes to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Root {
    /// Root URI (commonly `file://`)
    pub uri: String,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `roots/list` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListRootsResult {
    /// The client's roots
    pub roots: Vec<Root>,
}
