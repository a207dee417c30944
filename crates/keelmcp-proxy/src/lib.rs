//! # keelmcp-proxy
//!
//! A proxy client that drives a remote MCP server: connect over SSE, a
//! spawned child process, or in-process stdio pipes; initialize; then
//! `list_tools` (memoized), `call_tool`, and `ping` with an
//! at-most-one-concurrent-request discipline. Log notifications from
//! the remote server fan out to an optional handler, with identical
//! consecutive notifications coalesced.

mod config;
mod proxy;

pub use config::ServerConfig;
pub use proxy::{LogHandler, ProxyClient, ProxyError, ProxyResult};
