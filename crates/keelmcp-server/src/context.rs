//! The context a handler runs with.
//!
//! Carries the session handle, the inbound request id, the
//! cancellation token, and the server->client call surface (sampling,
//! elicitation, roots, logging, progress). Notifications emitted here
//! go to the per-request sink when the transport provides one
//! (streamable HTTP response streams), else to the session stream.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use keelmcp_protocol::jsonrpc::{JsonRpcMessage, JsonRpcNotification};
use keelmcp_protocol::message_id::RequestId;
use keelmcp_protocol::schema::JsonSchema;
use keelmcp_protocol::types::{
    CreateMessageRequest, CreateMessageResult, ElicitRequest, ElicitResult, ListRootsResult,
    LogLevel, ProgressNotification, Root, methods,
};

use crate::error::{ServerError, ServerResult};
use crate::session::{MessageSender, Session};

/// Context threaded through every handler invocation.
#[derive(Clone)]
pub struct RequestContext {
    session: Arc<Session>,
    request_id: Option<RequestId>,
    cancel: CancellationToken,
    per_request_sink: Option<MessageSender>,
    /// Per-call deadline for outbound requests; `None` waits forever.
    outbound_timeout: Option<Duration>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("session_id", &self.session.id)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Context for an inbound request.
    pub fn new(
        session: Arc<Session>,
        request_id: Option<RequestId>,
        cancel: CancellationToken,
        per_request_sink: Option<MessageSender>,
    ) -> Self {
        Self {
            session,
            request_id,
            cancel,
            per_request_sink,
            outbound_timeout: None,
        }
    }

    /// The owning session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// The session id.
    pub fn session_id(&self) -> uuid::Uuid {
        self.session.id
    }

    /// The inbound request id, absent for notifications.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// The cancellation token for this request.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once `notifications/cancelled` hit this request.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Set the deadline applied to outbound server->client calls made
    /// through this context.
    pub fn with_outbound_timeout(mut self, timeout: Duration) -> Self {
        self.outbound_timeout = Some(timeout);
        self
    }

    // ---- notifications ------------------------------------------------

    fn send_notification(&self, notification: JsonRpcNotification) -> ServerResult<()> {
        if let Some(sink) = &self.per_request_sink {
            sink.send(JsonRpcMessage::Notification(notification)).map_err(|_| {
                ServerError::Transport(keelmcp_transport::TransportError::ConnectionClosed)
            })
        } else {
            self.session.notify(notification)
        }
    }

    /// Emit a log notification, subject to the session floor.
    pub fn log(&self, level: LogLevel, data: Value) -> ServerResult<()> {
        self.log_with_logger(level, None, data)
    }

    /// Emit a log notification with a logger name.
    pub fn log_with_logger(
        &self,
        level: LogLevel,
        logger: Option<String>,
        data: Value,
    ) -> ServerResult<()> {
        if !level.passes(self.session.log_level()) {
            return Ok(());
        }
        let notification = JsonRpcNotification::with_params(
            methods::NOTIFICATION_MESSAGE,
            keelmcp_protocol::types::LoggingMessageNotification { level, logger, data },
        )
        .map_err(|e| ServerError::internal(e.to_string()))?;
        self.send_notification(notification)
    }

    /// Report progress on this request. The progress token is the
    /// inbound request id; without one this is a no-op.
    pub fn report_progress(&self, progress: f64, total: Option<f64>) -> ServerResult<()> {
        let Some(id) = &self.request_id else {
            return Ok(());
        };
        let notification = JsonRpcNotification::with_params(
            methods::NOTIFICATION_PROGRESS,
            ProgressNotification {
                progress_token: id.clone(),
                progress,
                total,
                message: None,
            },
        )
        .map_err(|e| ServerError::internal(e.to_string()))?;
        self.send_notification(notification)
    }

    // ---- server-initiated calls ---------------------------------------

    /// Ask the client to gather structured input from its user.
    pub async fn elicit(&self, message: impl Into<String>, schema: JsonSchema) -> ServerResult<ElicitResult> {
        let caps = self.session.client_capabilities().unwrap_or_default();
        if !caps.supports_elicitation() {
            return Err(ServerError::ClientLacksCapability { capability: "elicitation" });
        }
        let params = serde_json::to_value(ElicitRequest {
            message: message.into(),
            requested_schema: schema,
        })
        .map_err(|e| ServerError::internal(e.to_string()))?;

        let result = self
            .session
            .send_request(methods::ELICITATION_CREATE, Some(params), self.outbound_timeout)
            .await?;
        serde_json::from_value(result).map_err(|e| ServerError::internal(e.to_string()))
    }

    /// Ask the client's model to generate a message.
    pub async fn create_message(&self, request: CreateMessageRequest) -> ServerResult<CreateMessageResult> {
        let caps = self.session.client_capabilities().unwrap_or_default();
        if !caps.supports_sampling() {
            return Err(ServerError::ClientLacksCapability { capability: "sampling" });
        }
        let params = serde_json::to_value(request).map_err(|e| ServerError::internal(e.to_string()))?;
        let result = self
            .session
            .send_request(methods::SAMPLING_CREATE_MESSAGE, Some(params), self.outbound_timeout)
            .await?;
        serde_json::from_value(result).map_err(|e| ServerError::internal(e.to_string()))
    }

    /// The client's roots, served from the session cache when warm.
    pub async fn list_roots(&self) -> ServerResult<Vec<Root>> {
        let caps = self.session.client_capabilities().unwrap_or_default();
        if !caps.supports_roots() {
            return Err(ServerError::ClientLacksCapability { capability: "roots" });
        }
        if let Some(cached) = self.session.roots() {
            return Ok(cached);
        }
        let result = self
            .session
            .send_request(methods::ROOTS_LIST, None, self.outbound_timeout)
            .await?;
        let listed: ListRootsResult =
            serde_json::from_value(result).map_err(|e| ServerError::internal(e.to_string()))?;
        self.session.set_roots(listed.roots.clone());
        Ok(listed.roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelmcp_protocol::types::ClientCapabilities;
    use keelmcp_transport::TransportType;
    use tokio::sync::mpsc;

    fn context_with_caps(
        caps: ClientCapabilities,
    ) -> (RequestContext, mpsc::UnboundedReceiver<JsonRpcMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(TransportType::Stdio, tx, LogLevel::Info));
        session.set_client_capabilities(caps, "2024-11-05".into());
        let ctx = RequestContext::new(
            Arc::clone(&session),
            Some(RequestId::Number(1)),
            CancellationToken::new(),
            None,
        );
        (ctx, rx)
    }

    #[tokio::test]
    async fn elicit_without_capability_fails_fast() {
        let (ctx, _rx) = context_with_caps(ClientCapabilities::default());
        let err = ctx.elicit("name?", JsonSchema::empty_object()).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::ClientLacksCapability { capability: "elicitation" }
        ));
    }

    #[tokio::test]
    async fn progress_carries_the_inbound_id_as_token() {
        let (ctx, mut rx) = context_with_caps(ClientCapabilities::default());
        ctx.report_progress(0.5, Some(1.0)).unwrap();
        match rx.try_recv().unwrap() {
            JsonRpcMessage::Notification(n) => {
                assert_eq!(n.method, methods::NOTIFICATION_PROGRESS);
                assert_eq!(n.params.unwrap()["progressToken"], serde_json::json!(1));
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn roots_are_cached_after_first_fetch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(TransportType::Stdio, tx, LogLevel::Info));
        session.set_client_capabilities(
            ClientCapabilities {
                roots: Some(Default::default()),
                ..Default::default()
            },
            "2024-11-05".into(),
        );
        let ctx = RequestContext::new(Arc::clone(&session), None, CancellationToken::new(), None);

        let fetch = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.list_roots().await }
        });
        let id = match rx.recv().await.unwrap() {
            JsonRpcMessage::Request(r) => r.id,
            other => panic!("expected request, got {other:?}"),
        };
        session.complete_pending(keelmcp_protocol::jsonrpc::JsonRpcResponse::success(
            serde_json::json!({"roots": [{"uri": "file:///work"}]}),
            id,
        ));
        let roots = fetch.await.unwrap().unwrap();
        assert_eq!(roots.len(), 1);

        // Second call is served from the cache; no request goes out.
        let again = ctx.list_roots().await.unwrap();
        assert_eq!(again.len(), 1);
        assert!(rx.try_recv().is_err());
    }
}
