//! The HTTP+SSE runtime.
//!
//! `GET /sse` opens the event stream for a new session; the first event
//! is `endpoint` carrying the session-scoped messages URL. Clients POST
//! JSON-RPC messages to `/messages/{session_id}` and get `202
//! Accepted`; responses and notifications are pushed as `message`
//! events on the stream. Comment keep-alives flow every 15 seconds.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use keelmcp_protocol::jsonrpc::{self, JsonRpcMessage};
use keelmcp_transport::TransportType;

use crate::builder::McpServer;
use crate::error::{ServerError, ServerResult};

/// Interval between SSE comment keep-alives.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Serve the HTTP+SSE framing on `addr` until the task is cancelled.
pub async fn serve(server: Arc<McpServer>, addr: SocketAddr) -> ServerResult<()> {
    let app = router(server);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::internal(format!("bind {addr}: {e}")))?;
    info!(%addr, "HTTP+SSE transport listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::internal(e.to_string()))
}

/// The axum router, exposed for embedding and tests.
pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/sse", get(sse_handler))
        .route("/messages/{session_id}", post(messages_handler))
        .with_state(server)
}

/// Reject unauthenticated requests when bearer auth is configured.
pub(crate) async fn check_bearer(server: &McpServer, headers: &HeaderMap) -> Result<(), Response> {
    let Some(auth) = &server.bearer else {
        return Ok(());
    };
    let token = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if auth.validator.validate(token).await {
        return Ok(());
    }
    let challenge = format!(
        "Bearer resource_metadata=\"{}\"",
        auth.resource_metadata_url
    );
    Err((
        StatusCode::UNAUTHORIZED,
        [(http::header::WWW_AUTHENTICATE, challenge)],
    )
        .into_response())
}

/// Removes the session when the SSE stream is dropped.
struct SessionGuard {
    server: Arc<McpServer>,
    session_id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!(session_id = %self.session_id, "SSE stream closed, removing session");
        self.server.sessions.remove(&self.session_id);
    }
}

async fn sse_handler(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Response> {
    check_bearer(&server, &headers).await?;

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();
    let session = server
        .sessions
        .create(TransportType::HttpSse, outbound_tx, server.default_log_level);
    let session_id = session.id;
    info!(%session_id, "SSE session opened");

    let guard = SessionGuard {
        server: Arc::clone(&server),
        session_id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;

        // First event names the session-scoped POST endpoint.
        yield Ok::<Event, Infallible>(
            Event::default()
                .event("endpoint")
                .data(format!("/messages/{session_id}")),
        );

        while let Some(message) = outbound_rx.recv().await {
            match jsonrpc::serialize_message(&message) {
                Ok(json) => yield Ok(Event::default().event("message").data(json)),
                Err(err) => warn!(error = %err, "failed to serialize SSE message"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

async fn messages_handler(
    State(server): State<Arc<McpServer>>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, Response> {
    check_bearer(&server, &headers).await?;

    let Some(session) = server.sessions.get(&session_id) else {
        return Err((StatusCode::NOT_FOUND, "unknown session").into_response());
    };

    let message: JsonRpcMessage = match serde_json::from_value(body) {
        Ok(message) => message,
        Err(err) => {
            // Push the parse error onto the stream; the POST itself is
            // still acknowledged.
            let response = keelmcp_protocol::jsonrpc::JsonRpcResponse::parse_error(Some(err.to_string()));
            let _ = session.send_message(JsonRpcMessage::Response(response));
            return Ok(StatusCode::ACCEPTED);
        }
    };

    tokio::spawn(async move {
        if let Some(response) = server
            .dispatcher
            .handle_message(&session, message, None)
            .await
        {
            let _ = session.send_message(JsonRpcMessage::Response(response));
        }
    });

    Ok(StatusCode::ACCEPTED)
}
