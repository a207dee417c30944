//! Per-session state and the cross-session store.
//!
//! A session owns everything scoped to one connected client: the
//! negotiated capabilities, resource subscriptions, the log-level
//! floor, the pending table for server-initiated requests, the roots
//! cache, and an opaque context store. Mutable state sits behind
//! short-lived `parking_lot` locks; nothing here is held across an
//! `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use keelmcp_protocol::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponsePayload,
};
use keelmcp_protocol::message_id::RequestId;
use keelmcp_protocol::types::{ClientCapabilities, LogLevel, Root};
use keelmcp_protocol::{PROTOCOL_VERSION, types::methods};
use keelmcp_transport::TransportType;

use crate::error::{ServerError, ServerResult};

/// Sender half of a session's outbound message path. The transport
/// runtime drains the receiver and owns the single writer.
pub type MessageSender = mpsc::UnboundedSender<JsonRpcMessage>;

#[derive(Debug)]
struct SessionState {
    client_capabilities: Option<ClientCapabilities>,
    initialized: bool,
    protocol_version: String,
    subscriptions: HashSet<String>,
    min_log_level: LogLevel,
    roots: Option<Vec<Root>>,
    context_values: HashMap<String, Value>,
}

/// State owned by one connected client.
pub struct Session {
    /// Session identifier; carried in HTTP headers and URLs.
    pub id: Uuid,
    transport: TransportType,
    state: RwLock<SessionState>,
    outbound: MessageSender,
    /// Promises for server-initiated requests, keyed by outbound id.
    pending_outbound: Mutex<HashMap<RequestId, oneshot::Sender<Result<Value, JsonRpcError>>>>,
    next_outbound_id: AtomicI64,
    /// Cancellation tokens for in-flight inbound requests.
    inbound_tokens: Mutex<HashMap<RequestId, CancellationToken>>,
    /// stdio permits a single in-flight server->client request.
    outbound_gate: Option<tokio::sync::Mutex<()>>,
    /// Cancelled when the transport goes away.
    closed: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session bound to a transport's outbound sender.
    pub fn new(transport: TransportType, outbound: MessageSender, default_log_level: LogLevel) -> Self {
        let single_flight = matches!(transport, TransportType::Stdio | TransportType::InProcess);
        Self {
            id: Uuid::new_v4(),
            transport,
            state: RwLock::new(SessionState {
                client_capabilities: None,
                initialized: false,
                protocol_version: PROTOCOL_VERSION.to_string(),
                subscriptions: HashSet::new(),
                min_log_level: default_log_level,
                roots: None,
                context_values: HashMap::new(),
            }),
            outbound,
            pending_outbound: Mutex::new(HashMap::new()),
            next_outbound_id: AtomicI64::new(1),
            inbound_tokens: Mutex::new(HashMap::new()),
            outbound_gate: single_flight.then(|| tokio::sync::Mutex::new(())),
            closed: CancellationToken::new(),
        }
    }

    /// The transport framing this session arrived on.
    pub fn transport(&self) -> TransportType {
        self.transport
    }

    // ---- capabilities & lifecycle -------------------------------------

    /// Record the client's capabilities and negotiated version. Only the
    /// first call wins; `initialize` happens once per session.
    pub fn set_client_capabilities(&self, caps: ClientCapabilities, protocol_version: String) {
        let mut state = self.state.write();
        if state.client_capabilities.is_none() {
            state.client_capabilities = Some(caps);
            state.protocol_version = protocol_version;
        }
    }

    /// The client's declared capabilities.
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.state.read().client_capabilities.clone()
    }

    /// Mark the session active after `notifications/initialized`.
    pub fn mark_initialized(&self) {
        self.state.write().initialized = true;
    }

    /// True once the client has sent `notifications/initialized`.
    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// The negotiated protocol version.
    pub fn protocol_version(&self) -> String {
        self.state.read().protocol_version.clone()
    }

    // ---- subscriptions ------------------------------------------------

    /// Subscribe to updates for a resource URI.
    pub fn subscribe(&self, uri: impl Into<String>) {
        self.state.write().subscriptions.insert(uri.into());
    }

    /// Drop a subscription.
    pub fn unsubscribe(&self, uri: &str) {
        self.state.write().subscriptions.remove(uri);
    }

    /// True when the session subscribed to this URI.
    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.state.read().subscriptions.contains(uri)
    }

    // ---- logging ------------------------------------------------------

    /// Update the minimum level for `notifications/message`.
    pub fn set_log_level(&self, level: LogLevel) {
        self.state.write().min_log_level = level;
    }

    /// The current log floor.
    pub fn log_level(&self) -> LogLevel {
        self.state.read().min_log_level
    }

    // ---- roots cache & context store ----------------------------------

    /// Cache the client's roots.
    pub fn set_roots(&self, roots: Vec<Root>) {
        self.state.write().roots = Some(roots);
    }

    /// The cached roots, when fetched.
    pub fn roots(&self) -> Option<Vec<Root>> {
        self.state.read().roots.clone()
    }

    /// Drop the roots cache (on `notifications/roots/list_changed`).
    pub fn invalidate_roots(&self) {
        self.state.write().roots = None;
    }

    /// Store an opaque task-scoped value.
    pub fn set_context_value(&self, key: impl Into<String>, value: Value) {
        self.state.write().context_values.insert(key.into(), value);
    }

    /// Fetch an opaque task-scoped value.
    pub fn context_value(&self, key: &str) -> Option<Value> {
        self.state.read().context_values.get(key).cloned()
    }

    // ---- outbound path ------------------------------------------------

    /// Queue a message for the transport writer.
    pub fn send_message(&self, message: JsonRpcMessage) -> ServerResult<()> {
        self.outbound
            .send(message)
            .map_err(|_| ServerError::Transport(keelmcp_transport::TransportError::ConnectionClosed))
    }

    /// Queue a notification.
    pub fn notify(&self, notification: JsonRpcNotification) -> ServerResult<()> {
        self.send_message(JsonRpcMessage::Notification(notification))
    }

    /// Send a log notification, filtered by the session floor.
    pub fn log(&self, level: LogLevel, logger: Option<String>, data: Value) -> ServerResult<()> {
        if !level.passes(self.log_level()) {
            return Ok(());
        }
        let notification = JsonRpcNotification::with_params(
            methods::NOTIFICATION_MESSAGE,
            keelmcp_protocol::types::LoggingMessageNotification { level, logger, data },
        )
        .map_err(|e| ServerError::internal(e.to_string()))?;
        self.notify(notification)
    }

    /// Issue a server-initiated request and await the client's answer.
    ///
    /// Outbound ids are monotonic per session. On stdio at most one
    /// such request is in flight at a time. `timeout` of `None` waits
    /// indefinitely (until cancellation).
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> ServerResult<Value> {
        let _permit = match &self.outbound_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let id = RequestId::Number(self.next_outbound_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending_outbound.lock().insert(id.clone(), tx);

        let request = JsonRpcRequest::new(method, params, id.clone());
        if let Err(err) = self.send_message(JsonRpcMessage::Request(request)) {
            self.pending_outbound.lock().remove(&id);
            return Err(err);
        }

        let result = async {
            tokio::select! {
                outcome = rx => match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(error)) => Err(ServerError::Protocol(
                        keelmcp_protocol::ProtocolError::Server {
                            code: error.code,
                            message: error.message,
                        },
                    )),
                    Err(_) => Err(ServerError::Cancelled),
                },
                () = self.closed.cancelled() => Err(ServerError::Cancelled),
            }
        };

        let outcome = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, result).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ServerError::Timeout),
            },
            None => result.await,
        };
        if outcome.is_err() {
            self.pending_outbound.lock().remove(&id);
        }
        outcome
    }

    /// Complete a pending outbound request from a client response.
    /// Unmatched responses are dropped with a debug log.
    pub fn complete_pending(&self, response: JsonRpcResponse) {
        let Some(id) = response.request_id().cloned() else {
            debug!("dropping response with null id");
            return;
        };
        let Some(tx) = self.pending_outbound.lock().remove(&id) else {
            debug!(%id, "dropping response for unknown outbound id");
            return;
        };
        let outcome = match response.payload {
            JsonRpcResponsePayload::Success { result } => Ok(result),
            JsonRpcResponsePayload::Error { error } => Err(error),
        };
        let _ = tx.send(outcome);
    }

    // ---- inbound cancellation ----------------------------------------

    /// Register a token for an in-flight inbound request.
    pub fn register_inbound(&self, id: RequestId) -> CancellationToken {
        let token = self.closed.child_token();
        self.inbound_tokens.lock().insert(id, token.clone());
        token
    }

    /// Deregister an inbound request once its terminal message is out.
    pub fn finish_inbound(&self, id: &RequestId) {
        self.inbound_tokens.lock().remove(id);
    }

    /// Cancel the matching inbound request. No-op when the request has
    /// already completed.
    pub fn cancel_inbound(&self, id: &RequestId) {
        if let Some(token) = self.inbound_tokens.lock().get(id) {
            token.cancel();
        }
    }

    /// Tear the session down: cancel every in-flight inbound request
    /// and fail every pending outbound call.
    pub fn close(&self) {
        self.closed.cancel();
        for (_, token) in self.inbound_tokens.lock().drain() {
            token.cancel();
        }
        self.pending_outbound.lock().clear();
    }

    /// Token observed by handlers for session shutdown.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Cross-session map, safe to share between transport runtimes.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a session.
    pub fn create(
        &self,
        transport: TransportType,
        outbound: MessageSender,
        default_log_level: LogLevel,
    ) -> Arc<Session> {
        let session = Arc::new(Session::new(transport, outbound, default_log_level));
        self.sessions.insert(session.id, Arc::clone(&session));
        session
    }

    /// Look up a session by id.
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and close a session.
    pub fn remove(&self, id: &Uuid) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.close();
        }
    }

    /// Run `f` over every live session.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Session>)) {
        for entry in self.sessions.iter() {
            f(entry.value());
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_session() -> (Arc<Session>, mpsc::UnboundedReceiver<JsonRpcMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Session::new(TransportType::Stdio, tx, LogLevel::Info)),
            rx,
        )
    }

    #[test]
    fn client_capabilities_are_write_once() {
        let (session, _rx) = test_session();
        let first = ClientCapabilities {
            sampling: Some(Default::default()),
            ..Default::default()
        };
        session.set_client_capabilities(first.clone(), "2024-11-05".into());
        session.set_client_capabilities(ClientCapabilities::default(), "2025-06-18".into());

        assert_eq!(session.client_capabilities(), Some(first));
        assert_eq!(session.protocol_version(), "2024-11-05");
    }

    #[test]
    fn log_floor_filters_notifications() {
        let (session, mut rx) = test_session();
        session.log(LogLevel::Debug, None, json!("hidden")).unwrap();
        session.log(LogLevel::Error, None, json!("visible")).unwrap();

        let delivered = rx.try_recv().unwrap();
        match delivered {
            JsonRpcMessage::Notification(n) => {
                assert_eq!(n.params.unwrap()["data"], json!("visible"));
            }
            other => panic!("expected notification, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn outbound_ids_are_monotonic() {
        let (session, mut rx) = test_session();
        let s2 = Arc::clone(&session);
        let call = tokio::spawn(async move {
            let _ = s2.send_request("roots/list", None, Some(Duration::from_millis(50))).await;
        });
        let first_id = match rx.recv().await.unwrap() {
            JsonRpcMessage::Request(r) => r.id,
            other => panic!("expected request, got {other:?}"),
        };
        call.await.unwrap();

        let s3 = Arc::clone(&session);
        let call = tokio::spawn(async move {
            let _ = s3.send_request("roots/list", None, Some(Duration::from_millis(50))).await;
        });
        let second_id = match rx.recv().await.unwrap() {
            JsonRpcMessage::Request(r) => r.id,
            other => panic!("expected request, got {other:?}"),
        };
        call.await.unwrap();

        assert_eq!(first_id, RequestId::Number(1));
        assert_eq!(second_id, RequestId::Number(2));
    }

    #[tokio::test]
    async fn responses_complete_pending_requests() {
        let (session, mut rx) = test_session();
        let s2 = Arc::clone(&session);
        let call = tokio::spawn(async move { s2.send_request("roots/list", None, None).await });

        let id = match rx.recv().await.unwrap() {
            JsonRpcMessage::Request(r) => r.id,
            other => panic!("expected request, got {other:?}"),
        };
        session.complete_pending(JsonRpcResponse::success(json!({"roots": []}), id));

        let result = call.await.unwrap().unwrap();
        assert_eq!(result, json!({"roots": []}));
    }

    #[tokio::test]
    async fn close_fails_outstanding_outbound_calls() {
        let (session, mut rx) = test_session();
        let s2 = Arc::clone(&session);
        let call = tokio::spawn(async move { s2.send_request("elicitation/create", None, None).await });
        let _ = rx.recv().await; // wait for the request to be queued
        session.close();
        assert!(matches!(call.await.unwrap(), Err(ServerError::Cancelled)));
    }

    #[test]
    fn cancel_inbound_is_noop_after_completion() {
        let (session, _rx) = test_session();
        let id = RequestId::Number(7);
        let token = session.register_inbound(id.clone());
        session.finish_inbound(&id);
        session.cancel_inbound(&id);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn store_creates_and_removes() {
        let store = SessionStore::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = store.create(TransportType::StreamableHttp, tx, LogLevel::Info);
        assert!(store.get(&session.id).is_some());
        store.remove(&session.id);
        assert!(store.get(&session.id).is_none());
        assert!(store.is_empty());
    }
}
