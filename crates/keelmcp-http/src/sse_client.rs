//! HTTP+SSE client transport.
//!
//! `GET {base}/sse` opens the event stream. The first event must be
//! `endpoint`, carrying the session-scoped URL requests are POSTed to;
//! every later `message` event is a JSON-RPC message from the server.
//! POSTs are acknowledged with `202 Accepted` and answered on the
//! stream.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, warn};

use keelmcp_transport::{
    Transport, TransportError, TransportMessage, TransportResult, TransportState, TransportType,
};

use crate::event::SseBuffer;

/// Configuration for [`SseClientTransport`].
#[derive(Debug, Clone)]
pub struct SseClientConfig {
    /// Server base URL, e.g. `http://localhost:8080`
    pub base_url: String,
    /// Path of the SSE endpoint
    pub sse_path: String,
    /// Extra request headers (auth tokens and the like)
    pub headers: HashMap<String, String>,
    /// Per-request timeout for POSTs
    pub timeout: Duration,
}

impl SseClientConfig {
    /// Config for a base URL with default paths.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            sse_path: "/sse".to_string(),
            headers: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP+SSE client transport.
pub struct SseClientTransport {
    config: SseClientConfig,
    http: reqwest::Client,
    state: Arc<RwLock<TransportState>>,
    /// Session-scoped POST URL from the `endpoint` event.
    messages_url: Arc<RwLock<Option<String>>>,
    endpoint_ready: Arc<tokio::sync::Notify>,
    incoming: Mutex<Option<mpsc::Receiver<TransportMessage>>>,
    stream_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for SseClientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseClientTransport")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl SseClientTransport {
    /// Build a transport for the given config.
    pub fn new(config: SseClientConfig) -> TransportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::ConfigurationError(e.to_string()))?;
        Ok(Self {
            config,
            http,
            state: Arc::new(RwLock::new(TransportState::Disconnected)),
            messages_url: Arc::new(RwLock::new(None)),
            endpoint_ready: Arc::new(tokio::sync::Notify::new()),
            incoming: Mutex::new(None),
            stream_task: Mutex::new(None),
        })
    }

    fn extra_headers(&self) -> header::HeaderMap {
        let mut map = header::HeaderMap::new();
        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::from_bytes(name.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        map
    }

    /// Resolve the endpoint-event data against the base URL.
    fn resolve_messages_url(base_url: &str, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), endpoint)
        }
    }

    /// Wait until the `endpoint` event has arrived.
    async fn await_messages_url(&self) -> TransportResult<String> {
        loop {
            // Register before checking, so a notify between the check
            // and the await is not lost.
            let notified = self.endpoint_ready.notified();
            if let Some(url) = self.messages_url.read().await.clone() {
                return Ok(url);
            }
            let state = *self.state.read().await;
            if state != TransportState::Connected && state != TransportState::Connecting {
                return Err(TransportError::NotConnected);
            }
            notified.await;
        }
    }
}

impl Transport for SseClientTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::HttpSse
    }

    fn state(&self) -> Pin<Box<dyn std::future::Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { *self.state.read().await })
    }

    fn endpoint(&self) -> Option<String> {
        Some(format!("{}{}", self.config.base_url, self.config.sse_path))
    }

    fn connect(&self) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.write().await = TransportState::Connecting;

            let url = format!("{}{}", self.config.base_url, self.config.sse_path);
            let response = self
                .http
                .get(&url)
                .headers(self.extra_headers())
                .header(header::ACCEPT, "text/event-stream")
                // The stream outlives any per-request deadline.
                .timeout(Duration::from_secs(u64::MAX >> 1))
                .send()
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

            if !response.status().is_success() {
                *self.state.write().await = TransportState::Disconnected;
                return Err(TransportError::ConnectionFailed(format!(
                    "SSE endpoint returned {}",
                    response.status()
                )));
            }

            let (tx, rx) = mpsc::channel::<TransportMessage>(64);
            *self.incoming.lock().await = Some(rx);

            let state = Arc::clone(&self.state);
            let messages_url = Arc::clone(&self.messages_url);
            let endpoint_ready = Arc::clone(&self.endpoint_ready);
            let base_url = self.config.base_url.clone();

            let task = tokio::spawn(async move {
                let mut stream = response.bytes_stream();
                let mut buffer = SseBuffer::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = match chunk {
                        Ok(c) => c,
                        Err(err) => {
                            warn!(error = %err, "SSE stream read failed");
                            break;
                        }
                    };
                    for event in buffer.push(&String::from_utf8_lossy(&chunk)) {
                        match event.event.as_str() {
                            "endpoint" => {
                                let url = Self::resolve_messages_url(&base_url, event.data.trim());
                                debug!(messages_url = %url, "received endpoint event");
                                *messages_url.write().await = Some(url);
                                endpoint_ready.notify_waiters();
                            }
                            "message" => {
                                if tx
                                    .send(TransportMessage::from_json(event.data))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            other => debug!(event = other, "ignoring unknown SSE event"),
                        }
                    }
                }
                *state.write().await = TransportState::Closed;
            });
            *self.stream_task.lock().await = Some(task);

            *self.state.write().await = TransportState::Connected;
            Ok(())
        })
    }

    fn disconnect(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.write().await = TransportState::Closed;
            if let Some(task) = self.stream_task.lock().await.take() {
                task.abort();
            }
            self.incoming.lock().await.take();
            *self.messages_url.write().await = None;
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let url = self.await_messages_url().await?;
            let body = message
                .as_str()
                .ok_or_else(|| TransportError::SendFailed("payload is not UTF-8".to_string()))?
                .to_string();

            let response = self
                .http
                .post(&url)
                .headers(self.extra_headers())
                .header(header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;

            // The server acknowledges and answers on the stream.
            if response.status().is_success() {
                Ok(())
            } else {
                Err(TransportError::SendFailed(format!(
                    "messages endpoint returned {}",
                    response.status()
                )))
            }
        })
    }

    fn receive(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>>
    {
        Box::pin(async move {
            let mut guard = self.incoming.lock().await;
            let receiver = guard.as_mut().ok_or(TransportError::NotConnected)?;
            Ok(receiver.recv().await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_endpoints_resolve_against_base() {
        assert_eq!(
            SseClientTransport::resolve_messages_url("http://localhost:8080", "/messages/abc"),
            "http://localhost:8080/messages/abc"
        );
        assert_eq!(
            SseClientTransport::resolve_messages_url(
                "http://localhost:8080/",
                "http://other/messages/abc"
            ),
            "http://other/messages/abc"
        );
    }
}
