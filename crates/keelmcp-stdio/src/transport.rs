//! Standard I/O transport implementation.
//!
//! Framing is newline-delimited JSON via [`LinesCodec`]; serde's string
//! escaping guarantees no payload ever contains a raw newline. Writes
//! are serialized behind a single async mutex; a background reader task
//! decodes lines sequentially into an mpsc channel.

use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, warn};

use keelmcp_protocol::MAX_MESSAGE_SIZE;
use keelmcp_transport::{
    Transport, TransportError, TransportMessage, TransportResult, TransportState, TransportType,
};

type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedAsyncWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type LineReader = FramedRead<BufReader<BoxedAsyncRead>, LinesCodec>;
type LineWriter = FramedWrite<BoxedAsyncWrite, LinesCodec>;

/// Where the byte streams come from.
enum StreamSource {
    /// The current process's stdin/stdout
    ProcessStdio,
    /// Pre-supplied streams (child pipes, duplex halves, ...)
    Raw {
        reader: Option<BoxedAsyncRead>,
        writer: Option<BoxedAsyncWrite>,
    },
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessStdio => write!(f, "ProcessStdio"),
            Self::Raw { .. } => write!(f, "Raw"),
        }
    }
}

/// Standard I/O transport.
///
/// The same type serves three setups:
/// - [`StdioTransport::new`] - the current process's stdin/stdout
///   (server side of a spawned MCP process)
/// - [`StdioTransport::from_child`] - a spawned child's pipes (client
///   side)
/// - [`StdioTransport::pipe`] - a connected in-process pair
pub struct StdioTransport {
    transport_type: TransportType,
    state: Arc<StdMutex<TransportState>>,
    stream_source: TokioMutex<Option<StreamSource>>,
    writer: Arc<TokioMutex<Option<LineWriter>>>,
    receiver: TokioMutex<Option<mpsc::Receiver<TransportMessage>>>,
    reader_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("transport_type", &self.transport_type)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Transport over the current process's stdin/stdout.
    pub fn new() -> Self {
        Self::with_source(StreamSource::ProcessStdio, TransportType::Stdio)
    }

    /// Transport over a spawned child's pipes.
    ///
    /// The child must have been spawned with `stdin(Stdio::piped())`
    /// and `stdout(Stdio::piped())`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when either pipe is missing.
    pub fn from_child(child: &mut Child) -> TransportResult<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::ConfigurationError("child stdin was not piped".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::ConfigurationError("child stdout was not piped".to_string())
        })?;
        Ok(Self::from_raw(stdout, stdin))
    }

    /// Transport over arbitrary async streams.
    ///
    /// `reader` is what we read from (a child's stdout); `writer` is
    /// what we write to (a child's stdin).
    pub fn from_raw(
        reader: impl AsyncRead + Send + Sync + 'static,
        writer: impl AsyncWrite + Send + Sync + 'static,
    ) -> Self {
        Self::with_source(
            StreamSource::Raw {
                reader: Some(Box::pin(reader)),
                writer: Some(Box::pin(writer)),
            },
            TransportType::Stdio,
        )
    }

    /// A connected in-process pair.
    ///
    /// What one side sends the other receives. Used to run a server and
    /// its client inside the same process without real pipes.
    pub fn pipe() -> (Self, Self) {
        let (near, far) = tokio::io::duplex(MAX_MESSAGE_SIZE);
        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);
        let a = Self::with_source(
            StreamSource::Raw {
                reader: Some(Box::pin(near_read)),
                writer: Some(Box::pin(near_write)),
            },
            TransportType::InProcess,
        );
        let b = Self::with_source(
            StreamSource::Raw {
                reader: Some(Box::pin(far_read)),
                writer: Some(Box::pin(far_write)),
            },
            TransportType::InProcess,
        );
        (a, b)
    }

    fn with_source(source: StreamSource, transport_type: TransportType) -> Self {
        Self {
            transport_type,
            state: Arc::new(StdMutex::new(TransportState::Disconnected)),
            stream_source: TokioMutex::new(Some(source)),
            writer: Arc::new(TokioMutex::new(None)),
            receiver: TokioMutex::new(None),
            reader_task: StdMutex::new(None),
        }
    }

    fn set_state(&self, state: TransportState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn take_streams(source: StreamSource) -> TransportResult<(BoxedAsyncRead, BoxedAsyncWrite)> {
        match source {
            StreamSource::ProcessStdio => Ok((
                Box::pin(tokio::io::stdin()) as BoxedAsyncRead,
                Box::pin(tokio::io::stdout()) as BoxedAsyncWrite,
            )),
            StreamSource::Raw { reader, writer } => {
                let reader = reader.ok_or(TransportError::NotConnected)?;
                let writer = writer.ok_or(TransportError::NotConnected)?;
                Ok((reader, writer))
            }
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    fn state(&self) -> Pin<Box<dyn std::future::Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move {
            self.state
                .lock()
                .map(|guard| *guard)
                .unwrap_or(TransportState::Closed)
        })
    }

    fn connect(&self) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let source = self
                .stream_source
                .lock()
                .await
                .take()
                .ok_or(TransportError::ConnectionFailed("already connected".to_string()))?;

            self.set_state(TransportState::Connecting);
            let (reader, writer) = Self::take_streams(source)?;

            let codec = LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE);
            let mut framed_reader: LineReader = FramedRead::new(BufReader::new(reader), codec.clone());
            *self.writer.lock().await = Some(FramedWrite::new(writer, codec));

            let (tx, rx) = mpsc::channel::<TransportMessage>(64);
            *self.receiver.lock().await = Some(rx);

            let state = Arc::clone(&self.state);
            let task = tokio::spawn(async move {
                while let Some(line) = framed_reader.next().await {
                    match line {
                        Ok(line) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            if tx.send(TransportMessage::new(Bytes::from(line))).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "stdio read failed, closing transport");
                            break;
                        }
                    }
                }
                debug!("stdio reader finished");
                if let Ok(mut guard) = state.lock() {
                    *guard = TransportState::Closed;
                }
            });
            *self
                .reader_task
                .lock()
                .map_err(|_| TransportError::ConnectionFailed("poisoned state".to_string()))? =
                Some(task);

            self.set_state(TransportState::Connected);
            Ok(())
        })
    }

    fn disconnect(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.set_state(TransportState::Closed);
            if let Some(mut writer) = self.writer.lock().await.take() {
                let _ = futures::SinkExt::<String>::close(&mut writer).await;
            }
            self.receiver.lock().await.take();
            if let Ok(mut guard) = self.reader_task.lock()
                && let Some(task) = guard.take()
            {
                task.abort();
            }
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let line = message
                .as_str()
                .ok_or_else(|| TransportError::SendFailed("payload is not UTF-8".to_string()))?
                .to_string();

            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
            writer
                .send(line)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
    }

    fn receive(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>>
    {
        Box::pin(async move {
            let mut guard = self.receiver.lock().await;
            let receiver = guard.as_mut().ok_or(TransportError::NotConnected)?;
            Ok(receiver.recv().await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipe_pair_round_trips_messages() {
        let (a, b) = StdioTransport::pipe();
        a.connect().await.unwrap();
        b.connect().await.unwrap();

        a.send(TransportMessage::from_json(
            r#"{"jsonrpc":"2.0","method":"ping","id":1}"#.to_string(),
        ))
        .await
        .unwrap();

        let received = b.receive().await.unwrap().unwrap();
        assert!(received.as_str().unwrap().contains("ping"));

        b.send(TransportMessage::from_json(
            r#"{"jsonrpc":"2.0","result":{},"id":1}"#.to_string(),
        ))
        .await
        .unwrap();
        let reply = a.receive().await.unwrap().unwrap();
        assert!(reply.as_str().unwrap().contains("result"));
    }

    #[tokio::test]
    async fn messages_with_embedded_newlines_stay_single_line() {
        let (a, b) = StdioTransport::pipe();
        a.connect().await.unwrap();
        b.connect().await.unwrap();

        // serde escapes the newline; the wire sees one line.
        let payload = serde_json::json!({"jsonrpc": "2.0", "method": "notifications/message",
            "params": {"level": "info", "data": "line one\nline two"}});
        a.send(TransportMessage::from_json(payload.to_string())).await.unwrap();

        let received = b.receive().await.unwrap().unwrap();
        let decoded: serde_json::Value = serde_json::from_str(received.as_str().unwrap()).unwrap();
        assert_eq!(decoded["params"]["data"], serde_json::json!("line one\nline two"));
    }

    #[tokio::test]
    async fn receive_returns_none_after_peer_disconnect() {
        let (a, b) = StdioTransport::pipe();
        a.connect().await.unwrap();
        b.connect().await.unwrap();

        a.disconnect().await.unwrap();
        assert_eq!(b.receive().await.unwrap().map(|m| m.size()), None);
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let (a, _b) = StdioTransport::pipe();
        let result = a.send(TransportMessage::from_json("{}".to_string())).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let (a, b) = StdioTransport::pipe();
        a.connect().await.unwrap();
        b.connect().await.unwrap();

        a.send(TransportMessage::from_json(String::new())).await.unwrap();
        a.send(TransportMessage::from_json(r#"{"jsonrpc":"2.0","method":"ping","id":2}"#.to_string()))
            .await
            .unwrap();

        let received = b.receive().await.unwrap().unwrap();
        assert!(received.as_str().unwrap().contains("ping"));
    }
}
