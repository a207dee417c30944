//! The client core.
//!
//! A background read loop drains the transport: responses complete the
//! pending table, server-initiated requests dispatch to the registered
//! handlers, notifications go to the callback. All requests allocate
//! monotonic ids.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use keelmcp_protocol::jsonrpc::{
    self, JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcResponsePayload,
};
use keelmcp_protocol::message_id::RequestId;
use keelmcp_protocol::types::{
    CallToolResult, ClientCapabilities, CreateMessageRequest, ElicitRequest, ElicitationCapabilities,
    GetPromptResult, Implementation, InitializeRequest, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListRootsResult, ListToolsResult, LogLevel, Prompt,
    ReadResourceResult, ResourceTemplate, RootsCapabilities, SamplingCapabilities, Tool, methods,
};
use keelmcp_protocol::PROTOCOL_VERSION;
use keelmcp_transport::{Transport, TransportMessage};

use crate::error::{ClientError, ClientResult};
use crate::handlers::{ElicitationHandler, NotificationCallback, RootsProvider, SamplingHandler};

type PendingTable = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Result<Value, JsonRpcError>>>>>;

#[derive(Default)]
struct Handlers {
    sampling: Option<Arc<dyn SamplingHandler>>,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    roots: Option<Arc<dyn RootsProvider>>,
    notifications: Option<NotificationCallback>,
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    info: Option<Implementation>,
    handlers: Handlers,
    request_timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Fresh builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Client name and version sent during `initialize`.
    pub fn info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = Some(Implementation::new(name, version));
        self
    }

    /// Answer `sampling/createMessage` with this handler.
    pub fn sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.handlers.sampling = Some(handler);
        self
    }

    /// Answer `elicitation/create` with this handler.
    pub fn elicitation_handler(mut self, handler: Arc<dyn ElicitationHandler>) -> Self {
        self.handlers.elicitation = Some(handler);
        self
    }

    /// Answer `roots/list` with this provider.
    pub fn roots_provider(mut self, provider: Arc<dyn RootsProvider>) -> Self {
        self.handlers.roots = Some(provider);
        self
    }

    /// Receive every notification from the server.
    pub fn on_notification(mut self, callback: NotificationCallback) -> Self {
        self.handlers.notifications = Some(callback);
        self
    }

    /// Deadline applied to every request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Connect over `transport` and start the read loop. The transport
    /// must already be constructed; `connect` is called here.
    pub async fn connect(self, transport: Arc<dyn Transport>) -> ClientResult<Client> {
        transport.connect().await?;

        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let handlers = Arc::new(self.handlers);

        let read_task = tokio::spawn(read_loop(
            Arc::clone(&transport),
            Arc::clone(&pending),
            Arc::clone(&handlers),
        ));

        Ok(Client {
            transport,
            pending,
            handlers,
            next_id: AtomicI64::new(1),
            info: self
                .info
                .unwrap_or_else(|| Implementation::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))),
            request_timeout: self.request_timeout,
            initialize_result: Mutex::new(None),
            read_task: Some(read_task),
        })
    }
}

/// An MCP client over one transport connection.
pub struct Client {
    transport: Arc<dyn Transport>,
    pending: PendingTable,
    handlers: Arc<Handlers>,
    next_id: AtomicI64,
    info: Implementation,
    request_timeout: Option<Duration>,
    initialize_result: Mutex<Option<InitializeResult>>,
    read_task: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Start building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The capabilities implied by the registered handlers.
    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            roots: self.handlers.roots.as_ref().map(|_| RootsCapabilities {
                list_changed: Some(false),
            }),
            sampling: self.handlers.sampling.as_ref().map(|_| SamplingCapabilities {}),
            elicitation: self
                .handlers
                .elicitation
                .as_ref()
                .map(|_| ElicitationCapabilities {}),
            experimental: None,
        }
    }

    /// Perform the `initialize` handshake and mark the session active.
    pub async fn initialize(&self) -> ClientResult<InitializeResult> {
        let params = serde_json::to_value(InitializeRequest {
            protocol_version: Some(PROTOCOL_VERSION.to_string()),
            capabilities: self.capabilities(),
            client_info: Some(self.info.clone()),
        })?;
        let result = self.request(methods::INITIALIZE, Some(params)).await?;
        let initialized: InitializeResult = serde_json::from_value(result)?;
        *self.initialize_result.lock() = Some(initialized.clone());

        self.notify(methods::INITIALIZED, None).await?;
        Ok(initialized)
    }

    /// The server's `initialize` result, once the handshake ran.
    pub fn server_info(&self) -> Option<InitializeResult> {
        self.initialize_result.lock().clone()
    }

    /// `tools/list`.
    pub async fn list_tools(&self) -> ClientResult<Vec<Tool>> {
        let result = self.request(methods::TOOLS_LIST, None).await?;
        let listed: ListToolsResult = serde_json::from_value(result)?;
        Ok(listed.tools)
    }

    /// `tools/call`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<CallToolResult> {
        let result = self
            .request(
                methods::TOOLS_CALL,
                Some(json!({"name": name, "arguments": arguments})),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// `resources/read`.
    pub async fn read_resource(&self, uri: &str) -> ClientResult<ReadResourceResult> {
        let result = self
            .request(methods::RESOURCES_READ, Some(json!({"uri": uri})))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// `resources/templates/list`.
    pub async fn list_resource_templates(&self) -> ClientResult<Vec<ResourceTemplate>> {
        let result = self.request(methods::RESOURCES_TEMPLATES_LIST, None).await?;
        let listed: ListResourceTemplatesResult = serde_json::from_value(result)?;
        Ok(listed.resource_templates)
    }

    /// `prompts/list`.
    pub async fn list_prompts(&self) -> ClientResult<Vec<Prompt>> {
        let result = self.request(methods::PROMPTS_LIST, None).await?;
        let listed: ListPromptsResult = serde_json::from_value(result)?;
        Ok(listed.prompts)
    }

    /// `prompts/get`.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> ClientResult<GetPromptResult> {
        let mut params = json!({"name": name});
        if let Some(arguments) = arguments {
            params["arguments"] = serde_json::to_value(arguments)?;
        }
        let result = self.request(methods::PROMPTS_GET, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// `ping`.
    pub async fn ping(&self) -> ClientResult<()> {
        self.request(methods::PING, None).await?;
        Ok(())
    }

    /// `logging/setLevel`.
    pub async fn set_log_level(&self, level: LogLevel) -> ClientResult<()> {
        self.request(methods::LOGGING_SET_LEVEL, Some(json!({"level": level})))
            .await?;
        Ok(())
    }

    /// Send a request and await its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        let request = JsonRpcRequest::new(method, params, id.clone());
        let payload = jsonrpc::serialize_message(&JsonRpcMessage::Request(request))?;
        if let Err(err) = self.transport.send(TransportMessage::from_json(payload)).await {
            self.pending.lock().remove(&id);
            return Err(err.into());
        }

        let wait = async {
            match rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(ClientError::Rpc(error)),
                Err(_) => Err(ClientError::ConnectionClosed),
            }
        };
        let outcome = match self.request_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, wait).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ClientError::Timeout),
            },
            None => wait.await,
        };
        if outcome.is_err() {
            self.pending.lock().remove(&id);
        }
        outcome
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let payload = jsonrpc::serialize_message(&JsonRpcMessage::Notification(
            JsonRpcNotification::new(method, params),
        ))?;
        self.transport.send(TransportMessage::from_json(payload)).await?;
        Ok(())
    }

    /// Close the connection and stop the read loop.
    pub async fn close(&mut self) -> ClientResult<()> {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.transport.disconnect().await?;
        self.pending.lock().clear();
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

async fn read_loop(transport: Arc<dyn Transport>, pending: PendingTable, handlers: Arc<Handlers>) {
    loop {
        let message = match transport.receive().await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("transport closed, stopping client read loop");
                break;
            }
            Err(err) => {
                warn!(error = %err, "client receive failed");
                break;
            }
        };
        let Some(raw) = message.as_str() else {
            warn!("dropping non-UTF-8 message");
            continue;
        };
        let parsed = match jsonrpc::parse_message(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "dropping malformed message");
                continue;
            }
        };

        match parsed {
            JsonRpcMessage::Response(response) => {
                complete(&pending, response);
            }
            JsonRpcMessage::Notification(notification) => {
                if let Some(callback) = &handlers.notifications {
                    callback(notification);
                }
            }
            JsonRpcMessage::Request(request) => {
                let transport = Arc::clone(&transport);
                let handlers = Arc::clone(&handlers);
                tokio::spawn(async move {
                    let response = answer_server_request(&handlers, request).await;
                    match jsonrpc::serialize_message(&JsonRpcMessage::Response(response)) {
                        Ok(payload) => {
                            if let Err(err) =
                                transport.send(TransportMessage::from_json(payload)).await
                            {
                                warn!(error = %err, "failed to answer server request");
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to serialize answer"),
                    }
                });
            }
        }
    }

    // Fail anything still waiting.
    pending.lock().clear();
}

fn complete(pending: &PendingTable, response: JsonRpcResponse) {
    let Some(id) = response.request_id().cloned() else {
        debug!("dropping response with null id");
        return;
    };
    let Some(tx) = pending.lock().remove(&id) else {
        debug!(%id, "dropping response for unknown id");
        return;
    };
    let outcome = match response.payload {
        JsonRpcResponsePayload::Success { result } => Ok(result),
        JsonRpcResponsePayload::Error { error } => Err(error),
    };
    let _ = tx.send(outcome);
}

async fn answer_server_request(handlers: &Handlers, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    let outcome: Result<Value, JsonRpcError> = match method {
        methods::SAMPLING_CREATE_MESSAGE => match &handlers.sampling {
            Some(handler) => {
                match serde_json::from_value::<CreateMessageRequest>(
                    request.params.unwrap_or_else(|| json!({})),
                ) {
                    Ok(params) => handler
                        .create_message(params)
                        .await
                        .map_err(|e| JsonRpcError::new(JsonRpcErrorCode::InternalError, e))
                        .and_then(|result| {
                            serde_json::to_value(result).map_err(|e| {
                                JsonRpcError::new(JsonRpcErrorCode::InternalError, e.to_string())
                            })
                        }),
                    Err(e) => Err(JsonRpcError::new(JsonRpcErrorCode::InvalidParams, e.to_string())),
                }
            }
            None => Err(JsonRpcError::new(
                JsonRpcErrorCode::MethodNotFound,
                "no sampling handler registered",
            )),
        },
        methods::ELICITATION_CREATE => match &handlers.elicitation {
            Some(handler) => {
                match serde_json::from_value::<ElicitRequest>(request.params.unwrap_or_else(|| json!({}))) {
                    Ok(params) => handler
                        .elicit(params)
                        .await
                        .map_err(|e| JsonRpcError::new(JsonRpcErrorCode::InternalError, e))
                        .and_then(|result| {
                            serde_json::to_value(result).map_err(|e| {
                                JsonRpcError::new(JsonRpcErrorCode::InternalError, e.to_string())
                            })
                        }),
                    Err(e) => Err(JsonRpcError::new(JsonRpcErrorCode::InvalidParams, e.to_string())),
                }
            }
            None => Err(JsonRpcError::new(
                JsonRpcErrorCode::MethodNotFound,
                "no elicitation handler registered",
            )),
        },
        methods::ROOTS_LIST => match &handlers.roots {
            Some(provider) => serde_json::to_value(ListRootsResult {
                roots: provider.list_roots().await,
            })
            .map_err(|e| JsonRpcError::new(JsonRpcErrorCode::InternalError, e.to_string())),
            None => Err(JsonRpcError::new(
                JsonRpcErrorCode::MethodNotFound,
                "no roots provider registered",
            )),
        },
        methods::PING => Ok(json!({})),
        other => Err(JsonRpcError::new(
            JsonRpcErrorCode::MethodNotFound,
            format!("unsupported server request '{other}'"),
        )),
    };

    match outcome {
        Ok(result) => JsonRpcResponse::success(result, id),
        Err(error) => JsonRpcResponse::error_response(error, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::StaticRoots;
    use keelmcp_protocol::types::Root;

    #[tokio::test]
    async fn unhandled_server_requests_get_method_not_found() {
        let handlers = Handlers::default();
        let request = JsonRpcRequest::new("sampling/createMessage", None, RequestId::Number(1));
        let response = answer_server_request(&handlers, request).await;
        assert_eq!(response.error().unwrap().code, -32601);
        assert_eq!(response.request_id(), Some(&RequestId::Number(1)));
    }

    #[tokio::test]
    async fn roots_requests_use_the_provider() {
        let handlers = Handlers {
            roots: Some(Arc::new(StaticRoots(vec![Root {
                uri: "file:///work".into(),
                name: Some("work".into()),
            }]))),
            ..Default::default()
        };
        let request = JsonRpcRequest::new("roots/list", None, RequestId::Number(2));
        let response = answer_server_request(&handlers, request).await;
        let result = response.result().unwrap();
        assert_eq!(result["roots"][0]["uri"], json!("file:///work"));
    }

    #[tokio::test]
    async fn ping_from_server_is_answered_empty() {
        let handlers = Handlers::default();
        let request = JsonRpcRequest::new("ping", None, RequestId::String("p".into()));
        let response = answer_server_request(&handlers, request).await;
        assert_eq!(response.result().unwrap(), &json!({}));
    }
}
