//! The tool / resource / prompt catalog.
//!
//! The registry is immutable once the server is built; handlers are
//! async trait objects sharing a uniform `(args, ctx) -> Result`
//! interface. Resource bindings carry RFC 6570 templates matched in
//! declaration order, first match wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use keelmcp_protocol::schema::JsonSchema;
use keelmcp_protocol::types::{
    CompletionCapabilities, Content, GetPromptResult, LoggingCapabilities, Prompt, PromptMessage,
    PromptsCapabilities, Resource, ResourceContents, ResourceTemplate, ResourcesCapabilities,
    Role, ServerCapabilities, Tool, ToolsCapabilities,
};
use keelmcp_protocol::uri_template::UriTemplate;
use keelmcp_protocol::{ResourceError, ToolError};

use crate::context::RequestContext;
use crate::error::ServerResult;

/// Completion hook: `(argument name, partial value, already-bound
/// arguments) -> candidate values`.
pub type CompletionHook =
    Arc<dyn Fn(&str, &str, &HashMap<String, String>) -> Vec<String> + Send + Sync>;

/// Uniform tool handler interface.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with coerced arguments.
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Vec<Content>, ToolError>;
}

/// Resource handler: runs with the variables extracted from the
/// matched template.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource at `uri`.
    async fn read(
        &self,
        uri: &str,
        params: HashMap<String, String>,
        ctx: RequestContext,
    ) -> Result<Vec<ResourceContents>, ResourceError>;
}

/// Prompt renderer.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Render the prompt with the given arguments.
    async fn render(
        &self,
        args: HashMap<String, String>,
        ctx: RequestContext,
    ) -> ServerResult<GetPromptResult>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnToolHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Content>, ToolError>> + Send,
{
    async fn call(&self, args: Value, ctx: RequestContext) -> Result<Vec<Content>, ToolError> {
        (self.0)(args, ctx).await
    }
}

/// Adapter turning an async closure into a [`ResourceHandler`].
pub struct FnResourceHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ResourceHandler for FnResourceHandler<F>
where
    F: Fn(String, HashMap<String, String>, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<ResourceContents>, ResourceError>> + Send,
{
    async fn read(
        &self,
        uri: &str,
        params: HashMap<String, String>,
        ctx: RequestContext,
    ) -> Result<Vec<ResourceContents>, ResourceError> {
        (self.0)(uri.to_string(), params, ctx).await
    }
}

/// Adapter turning an async closure into a [`PromptHandler`].
pub struct FnPromptHandler<F>(pub F);

#[async_trait]
impl<F, Fut> PromptHandler for FnPromptHandler<F>
where
    F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = ServerResult<Vec<PromptMessage>>> + Send,
{
    async fn render(
        &self,
        args: HashMap<String, String>,
        ctx: RequestContext,
    ) -> ServerResult<GetPromptResult> {
        let messages = (self.0)(args, ctx).await?;
        Ok(GetPromptResult {
            description: None,
            messages,
        })
    }
}

/// A registered tool.
pub struct ToolRegistration {
    /// The listed definition
    pub tool: Tool,
    /// The handler
    pub handler: Arc<dyn ToolHandler>,
    /// Per-argument completion hooks
    pub completions: HashMap<String, CompletionHook>,
}

/// A registered resource binding.
pub struct ResourceRegistration {
    /// Binding name
    pub name: String,
    /// Templates, matched in declaration order
    pub templates: Vec<UriTemplate>,
    /// Human-readable description
    pub description: Option<String>,
    /// MIME type produced by the binding
    pub mime_type: Option<String>,
    /// The handler
    pub handler: Arc<dyn ResourceHandler>,
    /// Per-variable completion hooks
    pub completions: HashMap<String, CompletionHook>,
}

impl ResourceRegistration {
    /// True when every template is a fixed URI (no variables).
    pub fn is_static(&self) -> bool {
        self.templates.iter().all(|t| t.variable_names().is_empty())
    }
}

/// A registered prompt.
pub struct PromptRegistration {
    /// The listed definition
    pub prompt: Prompt,
    /// The renderer
    pub handler: Arc<dyn PromptHandler>,
    /// Per-argument completion hooks
    pub completions: HashMap<String, CompletionHook>,
}

/// The immutable catalog the dispatcher works against.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, ToolRegistration>,
    /// Kept in declaration order for first-match-wins reads.
    resources: Vec<ResourceRegistration>,
    prompts: HashMap<String, PromptRegistration>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.iter().map(|r| &r.name).collect::<Vec<_>>())
            .field("prompts", &self.prompts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Later registrations replace earlier ones of the
    /// same name.
    pub fn add_tool(&mut self, registration: ToolRegistration) {
        self.tools.insert(registration.tool.name.clone(), registration);
    }

    /// Register a resource binding, appended after existing bindings.
    pub fn add_resource(&mut self, registration: ResourceRegistration) {
        self.resources.push(registration);
    }

    /// Register a prompt.
    pub fn add_prompt(&mut self, registration: PromptRegistration) {
        self.prompts.insert(registration.prompt.name.clone(), registration);
    }

    /// Look up a tool by exact name.
    pub fn tool(&self, name: &str) -> Option<&ToolRegistration> {
        self.tools.get(name)
    }

    /// Look up a prompt by exact name.
    pub fn prompt(&self, name: &str) -> Option<&PromptRegistration> {
        self.prompts.get(name)
    }

    /// Mutable prompt lookup, for wiring completion hooks at build time.
    pub fn prompt_mut(&mut self, name: &str) -> Option<&mut PromptRegistration> {
        self.prompts.get_mut(name)
    }

    /// Mutable resource lookup by binding name.
    pub fn resource_mut(&mut self, name: &str) -> Option<&mut ResourceRegistration> {
        self.resources.iter_mut().find(|r| r.name == name)
    }

    /// All tool definitions, sorted by name for stable listings.
    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.values().map(|r| r.tool.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Static resources: bindings whose templates carry no variables.
    pub fn list_resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .filter(|r| r.is_static())
            .flat_map(|r| {
                r.templates.iter().map(|t| Resource {
                    uri: t.as_str().to_string(),
                    name: r.name.clone(),
                    description: r.description.clone(),
                    mime_type: r.mime_type.clone(),
                })
            })
            .collect()
    }

    /// Parameterized bindings.
    pub fn list_resource_templates(&self) -> Vec<ResourceTemplate> {
        self.resources
            .iter()
            .filter(|r| !r.is_static())
            .flat_map(|r| {
                r.templates.iter().map(|t| ResourceTemplate {
                    uri_template: t.as_str().to_string(),
                    name: r.name.clone(),
                    description: r.description.clone(),
                    mime_type: r.mime_type.clone(),
                })
            })
            .collect()
    }

    /// All prompt definitions, sorted by name.
    pub fn list_prompts(&self) -> Vec<Prompt> {
        let mut prompts: Vec<Prompt> = self.prompts.values().map(|r| r.prompt.clone()).collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }

    /// Match a concrete URI against the bindings in declaration order.
    ///
    /// Returns the first binding whose template matches, together with
    /// the extracted variables.
    pub fn match_resource(
        &self,
        uri: &str,
    ) -> Option<(&ResourceRegistration, HashMap<String, String>)> {
        for registration in &self.resources {
            for template in &registration.templates {
                if let Some(vars) = template.match_uri(uri) {
                    return Some((registration, vars));
                }
            }
        }
        None
    }

    /// Completion hook for a prompt argument.
    pub fn prompt_completion(&self, prompt: &str, argument: &str) -> Option<&CompletionHook> {
        self.prompts.get(prompt)?.completions.get(argument)
    }

    /// Completion hook for a resource-template variable, looked up by
    /// the template text.
    pub fn resource_completion(&self, uri_template: &str, argument: &str) -> Option<&CompletionHook> {
        self.resources
            .iter()
            .find(|r| r.templates.iter().any(|t| t.as_str() == uri_template))?
            .completions
            .get(argument)
    }

    /// Server capabilities derived from the registry contents.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapabilities {
                list_changed: Some(false),
            }),
            resources: Some(ResourcesCapabilities {
                list_changed: Some(false),
                subscribe: Some(!self.resources.is_empty()),
            }),
            prompts: Some(PromptsCapabilities {
                list_changed: Some(false),
            }),
            logging: Some(LoggingCapabilities {}),
            completions: Some(CompletionCapabilities {}),
            experimental: Some(HashMap::new()),
        }
    }
}

/// Helpers for building prompt messages in handlers.
pub fn user_message(text: impl Into<String>) -> PromptMessage {
    PromptMessage {
        role: Role::User,
        content: Content::text(text),
    }
}

/// Assistant-side prompt message.
pub fn assistant_message(text: impl Into<String>) -> PromptMessage {
    PromptMessage {
        role: Role::Assistant,
        content: Content::text(text),
    }
}
