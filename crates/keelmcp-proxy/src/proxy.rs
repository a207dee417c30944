//! The proxy client.
//!
//! Wraps a [`keelmcp_client::Client`] with the proxy discipline: one
//! request in flight at a time, the first successful `tools/list`
//! memoized until disconnect, and remote log notifications fanned out
//! to a handler with consecutive duplicates coalesced inside a short
//! window.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use keelmcp_client::{Client, ClientError};
use keelmcp_http::{SseClientConfig, SseClientTransport};
use keelmcp_protocol::types::{CallToolResult, LoggingMessageNotification, Tool, methods};
use keelmcp_stdio::StdioTransport;
use keelmcp_transport::Transport;

use crate::config::ServerConfig;

/// Consecutive identical log notifications inside this window collapse
/// into one delivery.
const LOG_COALESCE_WINDOW: Duration = Duration::from_millis(250);

/// Result alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Receives log notifications forwarded from the remote server.
pub type LogHandler = Arc<dyn Fn(LoggingMessageNotification) + Send + Sync>;

/// Errors raised by the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The underlying client failed
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The child process could not be spawned
    #[error("failed to spawn server process: {0}")]
    Spawn(std::io::Error),
    /// The transport could not be built
    #[error(transparent)]
    Transport(#[from] keelmcp_transport::TransportError),
}

struct LogDeduper {
    handler: LogHandler,
    last: Mutex<Option<(Value, std::time::Instant)>>,
}

impl LogDeduper {
    fn deliver(&self, notification: LoggingMessageNotification) {
        let key = serde_json::to_value(&notification).unwrap_or(Value::Null);
        let now = std::time::Instant::now();
        {
            let mut last = self.last.lock();
            if let Some((previous, at)) = last.as_ref()
                && *previous == key
                && now.duration_since(*at) < LOG_COALESCE_WINDOW
            {
                debug!("coalescing duplicate log notification");
                return;
            }
            *last = Some((key, now));
        }
        (self.handler)(notification);
    }
}

/// A connected proxy to one remote MCP server.
pub struct ProxyClient {
    client: Client,
    /// At most one request in flight toward the remote server.
    in_flight: tokio::sync::Mutex<()>,
    /// Memoized `tools/list`, populated on first success.
    tool_cache: Mutex<Option<Vec<Tool>>>,
    cache_tools: bool,
    /// Keeps a spawned server process alive for the proxy's lifetime.
    _child: Option<Child>,
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("cache_tools", &self.cache_tools)
            .finish_non_exhaustive()
    }
}

impl ProxyClient {
    /// Connect to the configured server and perform `initialize`.
    pub async fn connect(config: ServerConfig, log_handler: Option<LogHandler>) -> ProxyResult<Self> {
        Self::connect_with_options(config, log_handler, true).await
    }

    /// Connect with explicit control over tool-list caching.
    pub async fn connect_with_options(
        config: ServerConfig,
        log_handler: Option<LogHandler>,
        cache_tools: bool,
    ) -> ProxyResult<Self> {
        let mut child = None;
        let transport: Arc<dyn Transport> = match config {
            ServerConfig::Sse { url, headers } => {
                let mut sse_config = SseClientConfig::new(url);
                sse_config.headers = headers;
                Arc::new(SseClientTransport::new(sse_config)?)
            }
            ServerConfig::Stdio { command, args, cwd, env } => {
                let mut cmd = Command::new(&command);
                cmd.args(&args)
                    .stdin(std::process::Stdio::piped())
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::inherit())
                    .kill_on_drop(true);
                if let Some(cwd) = cwd {
                    cmd.current_dir(cwd);
                }
                for (key, value) in env {
                    cmd.env(key, value);
                }
                let mut spawned = cmd.spawn().map_err(ProxyError::Spawn)?;
                info!(%command, "spawned MCP server process");
                let transport = StdioTransport::from_child(&mut spawned)?;
                child = Some(spawned);
                Arc::new(transport)
            }
            ServerConfig::StdioHandles { reader, writer } => {
                Arc::new(StdioTransport::from_raw(reader, writer))
            }
        };

        let mut builder = Client::builder().info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        if let Some(handler) = log_handler {
            let deduper = Arc::new(LogDeduper {
                handler,
                last: Mutex::new(None),
            });
            builder = builder.on_notification(Arc::new(move |notification| {
                if notification.method != methods::NOTIFICATION_MESSAGE {
                    return;
                }
                let Some(params) = notification.params else { return };
                match serde_json::from_value::<LoggingMessageNotification>(params) {
                    Ok(log) => deduper.deliver(log),
                    Err(err) => debug!(error = %err, "dropping malformed log notification"),
                }
            }));
        }

        let client = builder.connect(transport).await?;
        client.initialize().await?;

        Ok(Self {
            client,
            in_flight: tokio::sync::Mutex::new(()),
            tool_cache: Mutex::new(None),
            cache_tools,
            _child: child,
        })
    }

    /// The remote server's tools. The first successful listing is
    /// cached until [`ProxyClient::disconnect`] when caching is on.
    pub async fn list_tools(&self) -> ProxyResult<Vec<Tool>> {
        if self.cache_tools
            && let Some(cached) = self.tool_cache.lock().clone()
        {
            return Ok(cached);
        }

        let _slot = self.in_flight.lock().await;
        let tools = self.client.list_tools().await?;
        if self.cache_tools {
            *self.tool_cache.lock() = Some(tools.clone());
        }
        Ok(tools)
    }

    /// Call a tool on the remote server.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ProxyResult<CallToolResult> {
        let _slot = self.in_flight.lock().await;
        Ok(self.client.call_tool(name, arguments).await?)
    }

    /// Ping the remote server.
    pub async fn ping(&self) -> ProxyResult<()> {
        let _slot = self.in_flight.lock().await;
        Ok(self.client.ping().await?)
    }

    /// Close the connection. The tool cache is invalidated; a spawned
    /// child process is killed by drop.
    pub async fn disconnect(mut self) -> ProxyResult<()> {
        self.tool_cache.lock().take();
        self.client.close().await?;
        Ok(())
    }
}
