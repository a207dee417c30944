//! Where the proxied server lives.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

/// How to reach the remote MCP server.
pub enum ServerConfig {
    /// An HTTP+SSE endpoint.
    Sse {
        /// Base URL, e.g. `http://localhost:8080`
        url: String,
        /// Extra headers (auth and the like)
        headers: HashMap<String, String>,
    },
    /// A command to spawn, talked to over its stdio pipes.
    Stdio {
        /// Executable
        command: String,
        /// Arguments
        args: Vec<String>,
        /// Working directory
        cwd: Option<PathBuf>,
        /// Extra environment variables
        env: HashMap<String, String>,
    },
    /// Pre-established byte streams, e.g. an in-process pipe pair.
    StdioHandles {
        /// Stream carrying the server's output
        reader: Pin<Box<dyn AsyncRead + Send + Sync + 'static>>,
        /// Stream carrying the server's input
        writer: Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>,
    },
}

impl ServerConfig {
    /// SSE endpoint without extra headers.
    pub fn sse(url: impl Into<String>) -> Self {
        Self::Sse {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Spawn `command` with `args`.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self::Stdio {
            command: command.into(),
            args,
            cwd: None,
            env: HashMap::new(),
        }
    }

    /// Use pre-established streams.
    pub fn stdio_handles(
        reader: impl AsyncRead + Send + Sync + 'static,
        writer: impl AsyncWrite + Send + Sync + 'static,
    ) -> Self {
        Self::StdioHandles {
            reader: Box::pin(reader),
            writer: Box::pin(writer),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sse { url, .. } => f.debug_struct("Sse").field("url", url).finish_non_exhaustive(),
            Self::Stdio { command, args, .. } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .finish_non_exhaustive(),
            Self::StdioHandles { .. } => f.write_str("StdioHandles"),
        }
    }
}
