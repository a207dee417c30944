//! Handlers for server-initiated requests.
//!
//! Registering a handler also switches on the matching capability in
//! the `initialize` handshake; requests for which no handler exists are
//! answered with method-not-found.

use std::sync::Arc;

use async_trait::async_trait;

use keelmcp_protocol::jsonrpc::JsonRpcNotification;
use keelmcp_protocol::types::{
    CreateMessageRequest, CreateMessageResult, ElicitRequest, ElicitResult, Root,
};

/// Answers `sampling/createMessage`.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Generate a message with the client's model.
    async fn create_message(&self, request: CreateMessageRequest) -> Result<CreateMessageResult, String>;
}

/// Answers `elicitation/create`.
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    /// Gather structured input from the user.
    async fn elicit(&self, request: ElicitRequest) -> Result<ElicitResult, String>;
}

/// Answers `roots/list`.
#[async_trait]
pub trait RootsProvider: Send + Sync {
    /// The roots this client exposes.
    async fn list_roots(&self) -> Vec<Root>;
}

/// Callback invoked for every notification from the server.
pub type NotificationCallback = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;

/// Fixed roots, for clients whose exposure does not change.
pub struct StaticRoots(pub Vec<Root>);

#[async_trait]
impl RootsProvider for StaticRoots {
    async fn list_roots(&self) -> Vec<Root> {
        self.0.clone()
    }
}
