//! Streamable HTTP client transport.
//!
//! One endpoint, one POST per request. The server answers with either
//! `application/json` (a single message) or `text/event-stream`
//! (notifications then the final response). `Mcp-Session-Id` arrives on
//! the `initialize` response and is echoed on every later request. A
//! long-lived GET stream carries server-initiated messages once a
//! session exists.

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

/// Configuration for [`StreamableClientTransport`].
#[derive(Debug, Clone)]
pub struct StreamableClientConfig {
    /// Server base URL, e.g. `http://localhost:8080`
    pub base_url: String,
    /// MCP endpoint path
    pub endpoint_path: String,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl StreamableClientConfig {
    /// Config for a base URL with the conventional `/mcp` path.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint_path: "/mcp".to_string(),
            headers: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    fn endpoint_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.endpoint_path)
    }
}

/// Streamable HTTP client transport.
pub struct StreamableClientTransport {
    config: StreamableClientConfig,
    http: reqwest::Client,
    state: Arc<RwLock<TransportState>>,
    session_id: Arc<RwLock<Option<String>>>,
    incoming_tx: mpsc::Sender<TransportMessage>,
    incoming_rx: Mutex<Option<mpsc::Receiver<TransportMessage>>>,
    listen_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamableClientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableClientTransport")
            .field("endpoint", &self.config.endpoint_url())
            .finish_non_exhaustive()
    }
}

impl StreamableClientTransport {
    /// Build a transport for the given config.
    pub fn new(config: StreamableClientConfig) -> TransportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::ConfigurationError(e.to_string()))?;
        let (incoming_tx, incoming_rx) = mpsc::channel(64);
        Ok(Self {
            config,
            http,
            state: Arc::new(RwLock::new(TransportState::Disconnected)),
            session_id: Arc::new(RwLock::new(None)),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            listen_task: Mutex::new(None),
        })
    }

    /// The session id assigned by the server, once known.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    fn request_headers(&self, session_id: Option<&str>) -> header::HeaderMap {
        let mut map = header::HeaderMap::new();
        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::from_bytes(name.as_bytes()),
                header::HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        if let Some(sid) = session_id
            && let Ok(value) = header::HeaderValue::from_str(sid)
        {
            map.insert("Mcp-Session-Id", value);
        }
        map
    }

    /// Drain an SSE response body into the incoming channel.
    async fn drain_sse_body(
        response: reqwest::Response,
        tx: mpsc::Sender<TransportMessage>,
    ) {
        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(err) => {
                    warn!(error = %err, "SSE body read failed");
                    return;
                }
            };
            for event in buffer.push(&String::from_utf8_lossy(&chunk)) {
                if event.event == "message"
                    && tx.send(TransportMessage::from_json(event.data)).await.is_err()
                {
                    return;
                }
            }
        }
    }

    /// Open the long-lived GET stream for server-initiated messages.
    /// No-op until the server has assigned a session id.
    async fn ensure_listen_stream(&self) {
        let Some(session_id) = self.session_id.read().await.clone() else { return };
        let mut guard = self.listen_task.lock().await;
        if guard.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let url = self.config.endpoint_url();
        let http = self.http.clone();
        let headers = self.request_headers(Some(&session_id));
        let tx = self.incoming_tx.clone();

        *guard = Some(tokio::spawn(async move {
            let response = http
                .get(&url)
                .headers(headers)
                .header(header::ACCEPT, "text/event-stream")
                .timeout(Duration::from_secs(u64::MAX >> 1))
                .send()
                .await;
            match response {
                Ok(response) if response.status().is_success() => {
                    Self::drain_sse_body(response, tx).await;
                }
                Ok(response) => {
                    debug!(status = %response.status(), "server declined listen stream");
                }
                Err(err) => warn!(error = %err, "listen stream connect failed"),
            }
        }));
    }
}

impl Transport for StreamableClientTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::StreamableHttp
    }

    fn state(&self) -> Pin<Box<dyn std::future::Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { *self.state.read().await })
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.config.endpoint_url())
    }

    fn connect(&self) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            // Connection is per-request; nothing to dial up front.
            *self.state.write().await = TransportState::Connected;
            Ok(())
        })
    }

    fn disconnect(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.write().await = TransportState::Closed;
            if let Some(task) = self.listen_task.lock().await.take() {
                task.abort();
            }
            // Tell the server the session is over.
            if let Some(sid) = self.session_id.write().await.take() {
                let _ = self
                    .http
                    .delete(self.config.endpoint_url())
                    .headers(self.request_headers(Some(&sid)))
                    .send()
                    .await;
            }
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if *self.state.read().await != TransportState::Connected {
                return Err(TransportError::NotConnected);
            }
            let body = message
                .as_str()
                .ok_or_else(|| TransportError::SendFailed("payload is not UTF-8".to_string()))?
                .to_string();

            let session_id = self.session_id.read().await.clone();
            let response = self
                .http
                .post(self.config.endpoint_url())
                .headers(self.request_headers(session_id.as_deref()))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "application/json, text/event-stream")
                .body(body)
                .send()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(TransportError::SendFailed(format!(
                    "endpoint returned {}",
                    response.status()
                )));
            }

            // Capture the session id the server assigned on initialize.
            if let Some(sid) = response
                .headers()
                .get("Mcp-Session-Id")
                .and_then(|v| v.to_str().ok())
            {
                let mut guard = self.session_id.write().await;
                if guard.as_deref() != Some(sid) {
                    debug!(session_id = sid, "assigned session id");
                    *guard = Some(sid.to_string());
                }
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if content_type.starts_with("text/event-stream") {
                let tx = self.incoming_tx.clone();
                tokio::spawn(Self::drain_sse_body(response, tx));
            } else if content_type.starts_with("application/json") {
                let body = response
                    .text()
                    .await
                    .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
                if !body.trim().is_empty()
                    && self
                        .incoming_tx
                        .send(TransportMessage::from_json(body))
                        .await
                        .is_err()
                {
                    return Err(TransportError::ConnectionClosed);
                }
            }
            // 202/204 with no body: a notification was accepted.

            self.ensure_listen_stream().await;
            Ok(())
        })
    }

    fn receive(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>>
    {
        Box::pin(async move {
            let mut guard = self.incoming_rx.lock().await;
            let receiver = guard.as_mut().ok_or(TransportError::NotConnected)?;
            Ok(receiver.recv().await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_joins_base_and_path() {
        let config = StreamableClientConfig::new("http://localhost:8080/");
        assert_eq!(config.endpoint_url(), "http://localhost:8080/mcp");
    }
}
