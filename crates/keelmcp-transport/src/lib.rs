//! # keelmcp-transport
//!
//! The transport contract every keelmcp framing implements: a
//! message-oriented, full-duplex channel carrying serialized JSON-RPC
//! payloads. Implementations live in `keelmcp-stdio` and
//! `keelmcp-http`.

pub mod error;
pub mod message;

pub use error::{TransportError, TransportResult};
pub use message::TransportMessage;

use std::future::Future;
use std::pin::Pin;

/// Identifies a transport framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Newline-delimited JSON over a byte-stream pair
    Stdio,
    /// HTTP with a GET event stream and a POST message endpoint
    HttpSse,
    /// Single-endpoint HTTP with per-request JSON or SSE responses
    StreamableHttp,
    /// In-process pipe pair
    InProcess,
}

/// Connection state of a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportState {
    /// Not yet connected
    #[default]
    Disconnected,
    /// Connecting
    Connecting,
    /// Ready to send and receive
    Connected,
    /// Closed, either locally or by the peer
    Closed,
}

/// A message-oriented, full-duplex communication channel.
///
/// `send` is safe to call from multiple tasks; implementations enforce
/// a single-writer discipline internally. `receive` is intended for a
/// single consumer and resolves to `None` when the peer closes the
/// channel.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// The framing this transport implements.
    fn transport_type(&self) -> TransportType;

    /// Current connection state.
    fn state(&self) -> Pin<Box<dyn Future<Output = TransportState> + Send + '_>>;

    /// Establish the connection.
    fn connect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Close the connection. Pending receives resolve to `None`.
    fn disconnect(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Send one message.
    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Receive the next message, or `None` on a clean close.
    fn receive(
        &self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>>;

    /// True when the transport is currently connected.
    fn is_connected(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move { matches!(self.state().await, TransportState::Connected) })
    }

    /// Endpoint address or identifier, when meaningful.
    fn endpoint(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The trait must stay object-safe; the dispatcher stores Box<dyn Transport>.
    fn _assert_object_safe(_t: &dyn Transport) {}

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(TransportState::default(), TransportState::Disconnected);
    }
}
