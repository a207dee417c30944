//! JSON-RPC request dispatch.
//!
//! Maps inbound messages to registry handlers, running each request
//! with a [`RequestContext`] carrying the session, cancellation token
//! and notification sink. Exactly one terminal message is produced per
//! inbound id; notifications emitted during a handler are queued before
//! the response on the same outbound path.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use keelmcp_protocol::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use keelmcp_protocol::schema::JsonSchema;
use keelmcp_protocol::types::{
    CallToolRequest, CallToolResult, CancelledNotification, CompleteRequest, Completion,
    CompleteResult, CompletionReference, Content, GetPromptRequest, Implementation,
    InitializeRequest, InitializeResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, ReadResourceRequest, ReadResourceResult,
    SetLevelRequest, SubscribeRequest, methods,
};
use keelmcp_protocol::{ProtocolError, ResourceError, ToolError, negotiate_protocol_version};

use crate::coercion::coerce_arguments;
use crate::context::RequestContext;
use crate::error::{ServerError, ServerResult};
use crate::registry::Registry;
use crate::session::{MessageSender, Session};

/// Cap on `completion/complete` candidate lists.
const COMPLETION_PAGE_LIMIT: usize = 100;

/// Encode a handler's scalar result as tool content: strings go out
/// bare, everything else as compact JSON.
pub fn tool_content(value: &Value) -> Content {
    match value {
        Value::String(s) => Content::text(s.clone()),
        other => Content::text(other.to_string()),
    }
}

/// The request dispatcher, shared by all transport runtimes.
pub struct Dispatcher {
    registry: Arc<Registry>,
    server_info: Implementation,
    instructions: Option<String>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("server_info", &self.server_info)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a dispatcher over a finished registry.
    pub fn new(registry: Arc<Registry>, server_info: Implementation, instructions: Option<String>) -> Self {
        Self {
            registry,
            server_info,
            instructions,
        }
    }

    /// The registry this dispatcher serves.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handle one inbound message. Returns the terminal response for
    /// requests; responses and notifications produce `None`.
    pub async fn handle_message(
        &self,
        session: &Arc<Session>,
        message: JsonRpcMessage,
        per_request_sink: Option<MessageSender>,
    ) -> Option<JsonRpcResponse> {
        match message {
            JsonRpcMessage::Response(response) => {
                session.complete_pending(response);
                None
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(session, &notification.method, notification.params);
                None
            }
            JsonRpcMessage::Request(request) => {
                Some(self.handle_request(session, request, per_request_sink).await)
            }
        }
    }

    /// Handle one request to a terminal response.
    pub async fn handle_request(
        &self,
        session: &Arc<Session>,
        request: JsonRpcRequest,
        per_request_sink: Option<MessageSender>,
    ) -> JsonRpcResponse {
        let id = request.id.clone();
        let token = session.register_inbound(id.clone());
        let ctx = RequestContext::new(
            Arc::clone(session),
            Some(id.clone()),
            token.clone(),
            per_request_sink,
        );

        let outcome = tokio::select! {
            outcome = self.dispatch(session, &request.method, request.params, ctx) => outcome,
            () = token.cancelled() => Err(ServerError::Cancelled),
        };
        session.finish_inbound(&id);

        match outcome {
            Ok(result) => JsonRpcResponse::success(result, id),
            Err(err) => {
                debug!(method = %request.method, error = %err, "request failed");
                JsonRpcResponse::error_response(err.to_json_rpc(), id)
            }
        }
    }

    /// Route a notification. Unknown notifications are ignored.
    pub fn handle_notification(&self, session: &Arc<Session>, method: &str, params: Option<Value>) {
        match method {
            methods::INITIALIZED | "initialized" => session.mark_initialized(),
            methods::NOTIFICATION_CANCELLED => {
                let Some(params) = params else { return };
                match serde_json::from_value::<CancelledNotification>(params) {
                    Ok(cancelled) => session.cancel_inbound(&cancelled.request_id),
                    Err(err) => warn!(error = %err, "malformed cancellation notification"),
                }
            }
            methods::NOTIFICATION_ROOTS_LIST_CHANGED => session.invalidate_roots(),
            other => debug!(method = other, "ignoring notification"),
        }
    }

    async fn dispatch(
        &self,
        session: &Arc<Session>,
        method: &str,
        params: Option<Value>,
        ctx: RequestContext,
    ) -> ServerResult<Value> {
        match method {
            methods::INITIALIZE => self.initialize(session, params),
            // Some clients send the initialized marker as a request.
            methods::INITIALIZED | "initialized" => {
                session.mark_initialized();
                Ok(json!({}))
            }
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => to_result(ListToolsResult {
                tools: self.registry.list_tools(),
                next_cursor: None,
            }),
            methods::TOOLS_CALL => self.call_tool(params, ctx).await,
            methods::RESOURCES_LIST => to_result(ListResourcesResult {
                resources: self.registry.list_resources(),
                next_cursor: None,
            }),
            methods::RESOURCES_TEMPLATES_LIST => to_result(ListResourceTemplatesResult {
                resource_templates: self.registry.list_resource_templates(),
                next_cursor: None,
            }),
            methods::RESOURCES_READ => self.read_resource(params, ctx).await,
            methods::RESOURCES_SUBSCRIBE => {
                let request: SubscribeRequest = parse_params(params)?;
                session.subscribe(request.uri);
                Ok(json!({}))
            }
            methods::RESOURCES_UNSUBSCRIBE => {
                let request: SubscribeRequest = parse_params(params)?;
                session.unsubscribe(&request.uri);
                Ok(json!({}))
            }
            methods::PROMPTS_LIST => to_result(ListPromptsResult {
                prompts: self.registry.list_prompts(),
                next_cursor: None,
            }),
            methods::PROMPTS_GET => self.get_prompt(params, ctx).await,
            methods::LOGGING_SET_LEVEL => {
                let request: SetLevelRequest = parse_params(params)?;
                session.set_log_level(request.level);
                Ok(json!({}))
            }
            methods::COMPLETION_COMPLETE => self.complete(params),
            other => Err(ServerError::Protocol(ProtocolError::MethodNotFound {
                method: other.to_string(),
            })),
        }
    }

    fn initialize(&self, session: &Arc<Session>, params: Option<Value>) -> ServerResult<Value> {
        let request: InitializeRequest = match params {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?,
            None => InitializeRequest::default(),
        };

        let version = negotiate_protocol_version(request.protocol_version.as_deref());
        session.set_client_capabilities(request.capabilities, version.to_string());
        if let Some(client) = &request.client_info {
            debug!(client = %client.name, version = %client.version, "client connected");
        }

        to_result(InitializeResult {
            protocol_version: version.to_string(),
            capabilities: self.registry.capabilities(),
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        })
    }

    async fn call_tool(&self, params: Option<Value>, ctx: RequestContext) -> ServerResult<Value> {
        let request: CallToolRequest = parse_params(params)?;

        let Some(registration) = self.registry.tool(&request.name) else {
            // Unknown tools are observable to the model, not session errors.
            let error = ToolError::UnknownTool { name: request.name };
            return to_result(CallToolResult::error(error.to_string()));
        };

        let arguments: Map<String, Value> = request
            .arguments
            .map(|args| args.into_iter().collect())
            .unwrap_or_default();

        let coerced = match coerce_arguments(&registration.tool.input_schema, &arguments) {
            Ok(coerced) => coerced,
            Err(err) if err.is_invalid_params() => return Err(ServerError::Tool(err)),
            Err(err) => return to_result(CallToolResult::error(err.to_string())),
        };

        match registration.handler.call(coerced, ctx).await {
            Ok(content) => to_result(CallToolResult::success(content)),
            Err(err) if err.is_invalid_params() => Err(ServerError::Tool(err)),
            Err(ToolError::Cancelled) => Err(ServerError::Cancelled),
            Err(err) => to_result(CallToolResult::error(err.to_string())),
        }
    }

    async fn read_resource(&self, params: Option<Value>, ctx: RequestContext) -> ServerResult<Value> {
        let request: ReadResourceRequest = parse_params(params)?;

        let Some((registration, vars)) = self.registry.match_resource(&request.uri) else {
            return Err(ServerError::Resource(ResourceError::TemplateMismatch {
                uri: request.uri,
            }));
        };
        let contents = registration
            .handler
            .read(&request.uri, vars, ctx)
            .await
            .map_err(ServerError::Resource)?;
        to_result(ReadResourceResult { contents })
    }

    async fn get_prompt(&self, params: Option<Value>, ctx: RequestContext) -> ServerResult<Value> {
        let request: GetPromptRequest = parse_params(params)?;
        let Some(registration) = self.registry.prompt(&request.name) else {
            return Err(ServerError::Prompt(format!(
                "prompt '{}' is not registered",
                request.name
            )));
        };
        let args: HashMap<String, String> = request.arguments.unwrap_or_default();
        let rendered = registration.handler.render(args, ctx).await?;
        to_result(rendered)
    }

    fn complete(&self, params: Option<Value>) -> ServerResult<Value> {
        let request: CompleteRequest = parse_params(params)?;
        let already_bound = request.context.map(|c| c.arguments).unwrap_or_default();

        let hook = match &request.reference {
            CompletionReference::Prompt { name } => {
                self.registry.prompt_completion(name, &request.argument.name)
            }
            CompletionReference::Resource { uri } => {
                self.registry.resource_completion(uri, &request.argument.name)
            }
        };

        let mut values = match hook {
            Some(hook) => hook(&request.argument.name, &request.argument.value, &already_bound),
            None => Vec::new(),
        };

        let completion = if values.len() > COMPLETION_PAGE_LIMIT {
            values.truncate(COMPLETION_PAGE_LIMIT);
            Completion {
                values,
                total: None,
                has_more: Some(true),
            }
        } else {
            let total = values.len() as u64;
            Completion {
                values,
                total: Some(total),
                has_more: Some(false),
            }
        };
        to_result(CompleteResult { completion })
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> ServerResult<T> {
    let value = params.unwrap_or_else(|| json!({}));
    serde_json::from_value(value)
        .map_err(|e| ServerError::Protocol(ProtocolError::InvalidParams(e.to_string())))
}

fn to_result<T: serde::Serialize>(value: T) -> ServerResult<Value> {
    serde_json::to_value(value).map_err(|e| ServerError::internal(e.to_string()))
}

/// Helper for building schemas for object tools in tests and binaries.
pub fn object_schema(properties: Vec<(&str, JsonSchema)>, required: &[&str]) -> JsonSchema {
    JsonSchema::Object {
        properties: properties.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        required: required.iter().map(|s| (*s).to_string()).collect(),
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        FnResourceHandler, FnToolHandler, Registry, ResourceRegistration, ToolRegistration,
    };
    use keelmcp_protocol::message_id::RequestId;
    use keelmcp_protocol::types::{LogLevel, ResourceContents, Tool};
    use keelmcp_protocol::uri_template::UriTemplate;
    use keelmcp_transport::TransportType;
    use tokio::sync::mpsc;

    fn calculator_dispatcher() -> Dispatcher {
        let mut registry = Registry::new();
        registry.add_tool(ToolRegistration {
            tool: Tool {
                name: "add".into(),
                description: Some("Add two integers".into()),
                input_schema: object_schema(
                    vec![("a", JsonSchema::integer()), ("b", JsonSchema::integer())],
                    &["a", "b"],
                ),
                annotations: None,
            },
            handler: Arc::new(FnToolHandler(|args: Value, _ctx| async move {
                let a = args["a"].as_i64().ok_or(ToolError::Handler("bad a".into()))?;
                let b = args["b"].as_i64().ok_or(ToolError::Handler("bad b".into()))?;
                Ok(vec![tool_content(&json!(a + b))])
            })),
            completions: HashMap::new(),
        });
        registry.add_resource(ResourceRegistration {
            name: "profile".into(),
            templates: vec![UriTemplate::parse("users://{user_id}/profile").unwrap()],
            description: None,
            mime_type: Some("text/plain".into()),
            handler: Arc::new(FnResourceHandler(
                |uri: String, params: HashMap<String, String>, _ctx| async move {
                    let user = params.get("user_id").cloned().unwrap_or_default();
                    Ok(vec![ResourceContents::text(uri, format!("Profile data for user {user}"))])
                },
            )),
            completions: HashMap::new(),
        });
        Dispatcher::new(
            Arc::new(registry),
            Implementation::new("calculator", "1.0.0"),
            None,
        )
    }

    fn session() -> (Arc<Session>, mpsc::UnboundedReceiver<JsonRpcMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Session::new(TransportType::Stdio, tx, LogLevel::Info)),
            rx,
        )
    }

    async fn roundtrip(dispatcher: &Dispatcher, session: &Arc<Session>, raw: Value) -> JsonRpcResponse {
        let message: JsonRpcMessage = serde_json::from_value(raw).unwrap();
        dispatcher.handle_message(session, message, None).await.unwrap()
    }

    #[tokio::test]
    async fn initialize_with_empty_params_reports_capabilities() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "initialize", "params": {}, "id": 1}),
        )
        .await;

        let result = response.result().unwrap();
        assert_eq!(result["protocolVersion"], json!("2024-11-05"));
        assert_eq!(result["capabilities"]["tools"]["listChanged"], json!(false));
        assert_eq!(result["serverInfo"]["name"], json!("calculator"));
    }

    #[tokio::test]
    async fn tools_call_add_returns_text_five() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "tools/call",
                   "params": {"name": "add", "arguments": {"a": 2, "b": 3}}, "id": 2}),
        )
        .await;

        let result = response.result().unwrap();
        assert_eq!(result["content"], json!([{"type": "text", "text": "5"}]));
        assert_eq!(result["isError"], json!(false));
    }

    #[tokio::test]
    async fn tools_call_with_bad_type_is_invalid_params() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "tools/call",
                   "params": {"name": "add", "arguments": {"a": "x", "b": 3}}, "id": 3}),
        )
        .await;

        let error = response.error().unwrap();
        assert_eq!(error.code, -32602);
        assert!(error.message.contains("expected type Int"), "message: {}", error.message);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_is_error_result() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "tools/call",
                   "params": {"name": "unknownTool", "arguments": {}}, "id": 4}),
        )
        .await;

        let result = response.result().unwrap();
        assert_eq!(result["isError"], json!(true));
        assert_eq!(
            result["content"][0]["text"],
            json!("The tool 'unknownTool' was not found on the server")
        );
    }

    #[tokio::test]
    async fn resources_read_extracts_template_variables() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "resources/read",
                   "params": {"uri": "users://123/profile"}, "id": 5}),
        )
        .await;

        let result = response.result().unwrap();
        assert_eq!(result["contents"][0]["text"], json!("Profile data for user 123"));
        assert_eq!(result["contents"][0]["uri"], json!("users://123/profile"));
    }

    #[tokio::test]
    async fn unmatched_resource_is_a_domain_error() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "resources/read",
                   "params": {"uri": "users://123/settings"}, "id": 6}),
        )
        .await;
        assert_eq!(response.error().unwrap().code, -32000);
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "wat/wat", "id": 7}),
        )
        .await;
        assert_eq!(response.error().unwrap().code, -32601);
    }

    #[tokio::test]
    async fn set_level_rejects_unknown_levels() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "logging/setLevel",
                   "params": {"level": "verbose"}, "id": 8}),
        )
        .await;
        assert_eq!(response.error().unwrap().code, -32602);

        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "logging/setLevel",
                   "params": {"level": "debug"}, "id": 9}),
        )
        .await;
        assert!(response.is_success());
        assert_eq!(session.log_level(), LogLevel::Debug);
    }

    #[tokio::test]
    async fn ping_answers_empty_object() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "ping", "id": 10}),
        )
        .await;
        assert_eq!(response.result().unwrap(), &json!({}));
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_mutate_the_session() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "resources/subscribe",
                   "params": {"uri": "users://1/profile"}, "id": 11}),
        )
        .await;
        assert!(session.is_subscribed("users://1/profile"));

        roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "resources/unsubscribe",
                   "params": {"uri": "users://1/profile"}, "id": 12}),
        )
        .await;
        assert!(!session.is_subscribed("users://1/profile"));
    }

    #[tokio::test]
    async fn cancelled_notification_for_finished_request_is_noop() {
        let dispatcher = calculator_dispatcher();
        let (session, _rx) = session();
        // Complete a request, then cancel its id.
        roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "ping", "id": 13}),
        )
        .await;
        dispatcher.handle_notification(
            &session,
            methods::NOTIFICATION_CANCELLED,
            Some(json!({"requestId": 13})),
        );
        // Nothing to assert beyond "no panic, no message": the token
        // table no longer holds id 13.
        assert!(session.client_capabilities().is_none());
        let _ = RequestId::Number(13);
    }

    #[tokio::test]
    async fn notifications_during_handler_precede_the_response() {
        let mut registry = Registry::new();
        registry.add_tool(ToolRegistration {
            tool: Tool {
                name: "noisy".into(),
                description: None,
                input_schema: JsonSchema::empty_object(),
                annotations: None,
            },
            handler: Arc::new(FnToolHandler(|_args, ctx: RequestContext| async move {
                ctx.report_progress(0.5, None)
                    .map_err(|e| ToolError::Handler(e.to_string()))?;
                ctx.log(LogLevel::Info, json!("halfway"))
                    .map_err(|e| ToolError::Handler(e.to_string()))?;
                Ok(vec![Content::text("done")])
            })),
            completions: HashMap::new(),
        });
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Implementation::new("test", "0.0.0"),
            None,
        );

        let (session, mut rx) = session();
        let response = roundtrip(
            &dispatcher,
            &session,
            json!({"jsonrpc": "2.0", "method": "tools/call",
                   "params": {"name": "noisy", "arguments": {}}, "id": 14}),
        )
        .await;
        assert!(response.is_success());

        // Both notifications were queued before the handler returned.
        assert!(matches!(rx.try_recv().unwrap(), JsonRpcMessage::Notification(_)));
        assert!(matches!(rx.try_recv().unwrap(), JsonRpcMessage::Notification(_)));
        assert!(rx.try_recv().is_err());
    }
}
