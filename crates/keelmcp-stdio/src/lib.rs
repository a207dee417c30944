//! # keelmcp-stdio
//!
//! Standard I/O transport: one JSON-RPC message per line, UTF-8, no
//! headers. Works over the current process's stdin/stdout, a spawned
//! child's pipes, or an in-process duplex pair (used by the proxy's
//! in-process mode).

mod transport;

pub use transport::StdioTransport;
