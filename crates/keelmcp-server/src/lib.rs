//! # keelmcp-server
//!
//! The server half of keelmcp: a declarative registry of tools,
//! resources and prompts; a JSON-RPC dispatcher with per-session state
//! and cancellation; a bidirectional channel for server-initiated
//! calls; and runtimes for the stdio, HTTP+SSE and streamable HTTP
//! transports.
//!
//! ```rust,no_run
//! use keelmcp_server::McpServer;
//! use keelmcp_protocol::schema::JsonSchema;
//! use keelmcp_protocol::types::Content;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = McpServer::builder()
//!     .name("calculator")
//!     .version("1.0.0")
//!     .tool_fn(
//!         "add",
//!         "Add two integers",
//!         JsonSchema::Object {
//!             properties: vec![
//!                 ("a".into(), JsonSchema::integer()),
//!                 ("b".into(), JsonSchema::integer()),
//!             ],
//!             required: vec!["a".into(), "b".into()],
//!             description: None,
//!         },
//!         |args, _ctx| async move {
//!             let a = args["a"].as_i64().unwrap_or_default();
//!             let b = args["b"].as_i64().unwrap_or_default();
//!             Ok(vec![Content::text((a + b).to_string())])
//!         },
//!     )
//!     .build();
//!
//! server.serve_stdio().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod coercion;
pub mod context;
pub mod error;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod session;

pub use builder::{BearerAuth, McpServer, McpServerBuilder};
pub use context::RequestContext;
pub use error::{ServerError, ServerResult};
pub use registry::{
    CompletionHook, PromptHandler, Registry, ResourceHandler, ResourceRegistration, ToolHandler,
    ToolRegistration,
};
pub use router::Dispatcher;
pub use session::{Session, SessionStore};
