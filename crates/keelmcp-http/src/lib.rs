//! # keelmcp-http
//!
//! Client-side HTTP transports:
//!
//! - [`SseClientTransport`]: the HTTP+SSE framing. `GET /sse` opens an
//!   event stream whose first event names a session-scoped POST URL;
//!   requests go to that URL and responses come back on the stream.
//! - [`StreamableClientTransport`]: the streamable HTTP framing. Each
//!   request is a POST to a single endpoint; the response is either a
//!   JSON body or an SSE stream, and `Mcp-Session-Id` ties requests to
//!   a session.

mod event;
mod sse_client;
mod streamable;

pub use event::SseEvent;
pub use sse_client::{SseClientConfig, SseClientTransport};
pub use streamable::{StreamableClientConfig, StreamableClientTransport};
