//! Server assembly.
//!
//! `McpServer::builder()` collects tools, resources and prompts into
//! an immutable registry, then the `serve_*` methods hand the finished
//! dispatcher to a transport runtime.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;

use keelmcp_auth::TokenValidator;
use keelmcp_protocol::schema::JsonSchema;
use keelmcp_protocol::types::{
    Content, Implementation, LogLevel, PromptMessage, ResourceContents, Tool, ToolAnnotations,
};
use keelmcp_protocol::uri_template::UriTemplate;
use keelmcp_protocol::{ResourceError, ToolError};

use crate::context::RequestContext;
use crate::error::ServerResult;
use crate::registry::{
    CompletionHook, FnPromptHandler, FnResourceHandler, FnToolHandler, PromptRegistration,
    Registry, ResourceRegistration, ToolRegistration,
};
use crate::router::Dispatcher;
use crate::session::SessionStore;

/// Bearer authentication for the HTTP runtimes.
#[derive(Clone)]
pub struct BearerAuth {
    /// Validator consulted per request
    pub validator: Arc<dyn TokenValidator>,
    /// Advertised in the `WWW-Authenticate` challenge
    pub resource_metadata_url: String,
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("resource_metadata_url", &self.resource_metadata_url)
            .finish_non_exhaustive()
    }
}

/// A fully assembled MCP server.
pub struct McpServer {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) default_log_level: LogLevel,
    pub(crate) bearer: Option<BearerAuth>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl McpServer {
    /// Start building a server.
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    /// The dispatcher, for embedding in custom runtimes.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The session store shared across runtimes.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Push `notifications/resources/updated` to every session
    /// subscribed to `uri`.
    pub fn notify_resource_updated(&self, uri: &str) {
        use keelmcp_protocol::jsonrpc::JsonRpcNotification;
        use keelmcp_protocol::types::{ResourceUpdatedNotification, methods};

        self.sessions.for_each(|session| {
            if !session.is_subscribed(uri) {
                return;
            }
            if let Ok(notification) = JsonRpcNotification::with_params(
                methods::NOTIFICATION_RESOURCES_UPDATED,
                ResourceUpdatedNotification { uri: uri.to_string() },
            ) {
                let _ = session.notify(notification);
            }
        });
    }

    /// Serve on the current process's stdin/stdout until EOF.
    pub async fn serve_stdio(self: &Arc<Self>) -> ServerResult<()> {
        let transport = keelmcp_stdio::StdioTransport::new();
        crate::runtime::stdio::serve(Arc::clone(self), transport).await
    }

    /// Serve the HTTP+SSE framing on `addr`.
    pub async fn serve_sse(self: &Arc<Self>, addr: SocketAddr) -> ServerResult<()> {
        crate::runtime::sse::serve(Arc::clone(self), addr).await
    }

    /// Serve the streamable HTTP framing on `addr`.
    pub async fn serve_http(self: &Arc<Self>, addr: SocketAddr) -> ServerResult<()> {
        crate::runtime::http::serve(Arc::clone(self), addr).await
    }
}

/// Builder for [`McpServer`].
pub struct McpServerBuilder {
    name: String,
    version: String,
    title: Option<String>,
    instructions: Option<String>,
    default_log_level: LogLevel,
    registry: Registry,
    bearer: Option<BearerAuth>,
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl McpServerBuilder {
    /// Fresh builder with library defaults.
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            instructions: None,
            default_log_level: LogLevel::Info,
            registry: Registry::new(),
            bearer: None,
        }
    }

    /// Server name reported during `initialize`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Server version reported during `initialize`.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Display title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Usage instructions surfaced to the client's model.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Default log floor for new sessions.
    pub fn default_log_level(mut self, level: LogLevel) -> Self {
        self.default_log_level = level;
        self
    }

    /// Require bearer tokens on the HTTP runtimes.
    pub fn bearer_auth(
        mut self,
        validator: Arc<dyn TokenValidator>,
        resource_metadata_url: impl Into<String>,
    ) -> Self {
        self.bearer = Some(BearerAuth {
            validator,
            resource_metadata_url: resource_metadata_url.into(),
        });
        self
    }

    /// Register a prebuilt tool registration.
    pub fn tool(mut self, registration: ToolRegistration) -> Self {
        self.registry.add_tool(registration);
        self
    }

    /// Register a tool from an async closure.
    pub fn tool_fn<F, Fut>(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Content>, ToolError>> + Send + 'static,
    {
        self.tool_with_annotations(name, description, input_schema, None, handler)
    }

    /// Register a tool with behavioral hints.
    pub fn tool_with_annotations<F, Fut>(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonSchema,
        annotations: Option<ToolAnnotations>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Content>, ToolError>> + Send + 'static,
    {
        self.registry.add_tool(ToolRegistration {
            tool: Tool {
                name: name.into(),
                description: Some(description.into()),
                input_schema,
                annotations,
            },
            handler: Arc::new(FnToolHandler(handler)),
            completions: HashMap::new(),
        });
        self
    }

    /// Register a prebuilt resource binding.
    pub fn resource(mut self, registration: ResourceRegistration) -> Self {
        self.registry.add_resource(registration);
        self
    }

    /// Register a resource binding from templates and an async closure.
    ///
    /// # Panics
    ///
    /// Panics when a template fails to parse; bindings are wired at
    /// startup where a bad template is a programming error.
    pub fn resource_fn<F, Fut>(
        mut self,
        name: impl Into<String>,
        templates: &[&str],
        mime_type: Option<&str>,
        handler: F,
    ) -> Self
    where
        F: Fn(String, HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ResourceContents>, ResourceError>> + Send + 'static,
    {
        let parsed = templates
            .iter()
            .map(|t| UriTemplate::parse(t).unwrap_or_else(|e| panic!("invalid URI template '{t}': {e}")))
            .collect();
        self.registry.add_resource(ResourceRegistration {
            name: name.into(),
            templates: parsed,
            description: None,
            mime_type: mime_type.map(String::from),
            handler: Arc::new(FnResourceHandler(handler)),
            completions: HashMap::new(),
        });
        self
    }

    /// Register a prompt from declared arguments and an async closure.
    pub fn prompt_fn<F, Fut>(
        mut self,
        prompt: keelmcp_protocol::types::Prompt,
        handler: F,
    ) -> Self
    where
        F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServerResult<Vec<PromptMessage>>> + Send + 'static,
    {
        self.registry.add_prompt(PromptRegistration {
            prompt,
            handler: Arc::new(FnPromptHandler(handler)),
            completions: HashMap::new(),
        });
        self
    }

    /// Attach a completion hook to a registered prompt argument.
    pub fn prompt_completion(
        mut self,
        prompt: &str,
        argument: impl Into<String>,
        hook: CompletionHook,
    ) -> Self {
        if let Some(registration) = self.registry.prompt_mut(prompt) {
            registration.completions.insert(argument.into(), hook);
        }
        self
    }

    /// Attach a completion hook to a resource-template variable.
    pub fn resource_completion(
        mut self,
        resource: &str,
        argument: impl Into<String>,
        hook: CompletionHook,
    ) -> Self {
        if let Some(registration) = self.registry.resource_mut(resource) {
            registration.completions.insert(argument.into(), hook);
        }
        self
    }

    /// Finish: the registry becomes immutable.
    pub fn build(self) -> Arc<McpServer> {
        let mut info = Implementation::new(self.name, self.version);
        info.title = self.title;
        let dispatcher = Dispatcher::new(Arc::new(self.registry), info, self.instructions);
        Arc::new(McpServer {
            dispatcher: Arc::new(dispatcher),
            sessions: Arc::new(SessionStore::new()),
            default_log_level: self.default_log_level,
            bearer: self.bearer,
        })
    }
}
