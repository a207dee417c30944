//! The streamable HTTP runtime.
//!
//! A single `/mcp` endpoint. POST carries one client message: the
//! response body is plain JSON when the handler stayed quiet, or an SSE
//! stream replaying the notifications emitted during handling followed
//! by the final response. The server assigns `Mcp-Session-Id` on the
//! `initialize` response; every later request echoes it. GET opens the
//! session's server->client stream; DELETE ends the session.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::post,
};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use keelmcp_protocol::jsonrpc::{self, JsonRpcMessage, JsonRpcResponse};
use keelmcp_transport::TransportType;

use crate::builder::McpServer;
use crate::error::{ServerError, ServerResult};
use crate::runtime::sse::check_bearer;

/// Interval between SSE comment keep-alives on the GET stream.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Header carrying the session id.
const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Clone)]
struct HttpState {
    server: Arc<McpServer>,
    /// Session outbound receivers parked until the client opens its GET
    /// stream.
    parked_streams: Arc<DashMap<Uuid, mpsc::UnboundedReceiver<JsonRpcMessage>>>,
}

/// Serve the streamable HTTP framing on `addr`.
pub async fn serve(server: Arc<McpServer>, addr: SocketAddr) -> ServerResult<()> {
    let app = router(server);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::internal(format!("bind {addr}: {e}")))?;
    info!(%addr, "streamable HTTP transport listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::internal(e.to_string()))
}

/// The axum router, exposed for embedding and tests.
pub fn router(server: Arc<McpServer>) -> Router {
    let state = HttpState {
        server,
        parked_streams: Arc::new(DashMap::new()),
    };
    Router::new()
        .route(
            "/mcp",
            post(post_handler).get(get_handler).delete(delete_handler),
        )
        .with_state(state)
}

fn session_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

fn json_response(response: &JsonRpcResponse, session_id: Option<Uuid>) -> Response {
    let body = serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string());
    let mut http_response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response();
    if let Some(id) = session_id
        && let Ok(value) = HeaderValue::from_str(&id.to_string())
    {
        http_response.headers_mut().insert(SESSION_HEADER, value);
    }
    http_response
}

async fn post_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, Response> {
    check_bearer(&state.server, &headers).await?;

    let message = match jsonrpc::parse_message(&body) {
        Ok(message) => message,
        Err(err) => {
            let response = JsonRpcResponse::parse_error(Some(err.to_string()));
            return Ok(json_response(&response, None));
        }
    };

    match message {
        // A client answer to a server-initiated request.
        JsonRpcMessage::Response(response) => {
            let Some(session) = session_id_from(&headers).and_then(|id| state.server.sessions.get(&id))
            else {
                return Err(StatusCode::BAD_REQUEST.into_response());
            };
            session.complete_pending(response);
            Ok(StatusCode::ACCEPTED.into_response())
        }
        JsonRpcMessage::Notification(notification) => {
            let Some(session) = session_id_from(&headers).and_then(|id| state.server.sessions.get(&id))
            else {
                return Err(StatusCode::BAD_REQUEST.into_response());
            };
            state
                .server
                .dispatcher
                .handle_notification(&session, &notification.method, notification.params);
            Ok(StatusCode::ACCEPTED.into_response())
        }
        JsonRpcMessage::Request(request) => {
            // initialize creates the session; everything else requires
            // the header.
            let session = match session_id_from(&headers).and_then(|id| state.server.sessions.get(&id)) {
                Some(session) => session,
                None if request.method == "initialize" => {
                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    let session = state.server.sessions.create(
                        TransportType::StreamableHttp,
                        outbound_tx,
                        state.server.default_log_level,
                    );
                    state.parked_streams.insert(session.id, outbound_rx);
                    info!(session_id = %session.id, "streamable session opened");
                    session
                }
                None => return Err(StatusCode::BAD_REQUEST.into_response()),
            };
            let session_id = session.id;

            // Per-request sink: notifications emitted by the handler
            // are replayed before the response on the response stream.
            let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
            let response = state
                .server
                .dispatcher
                .handle_request(&session, request, Some(sink_tx))
                .await;

            let mut streamed: Vec<JsonRpcMessage> = Vec::new();
            while let Ok(message) = sink_rx.try_recv() {
                streamed.push(message);
            }

            if streamed.is_empty() {
                return Ok(json_response(&response, Some(session_id)));
            }

            streamed.push(JsonRpcMessage::Response(response));
            let stream = async_stream::stream! {
                for message in streamed {
                    match jsonrpc::serialize_message(&message) {
                        Ok(json) => yield Ok::<Event, Infallible>(
                            Event::default().event("message").data(json),
                        ),
                        Err(err) => warn!(error = %err, "failed to serialize streamed message"),
                    }
                }
            };

            let mut http_response = Sse::new(stream).into_response();
            if let Ok(value) = HeaderValue::from_str(&session_id.to_string()) {
                http_response.headers_mut().insert(SESSION_HEADER, value);
            }
            Ok(http_response)
        }
    }
}

async fn get_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    check_bearer(&state.server, &headers).await?;

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !accept.contains("text/event-stream") {
        return Err(StatusCode::NOT_ACCEPTABLE.into_response());
    }

    let Some(session_id) = session_id_from(&headers) else {
        return Err(StatusCode::BAD_REQUEST.into_response());
    };
    if state.server.sessions.get(&session_id).is_none() {
        return Err(StatusCode::NOT_FOUND.into_response());
    }
    let Some((_, mut outbound_rx)) = state.parked_streams.remove(&session_id) else {
        // A GET stream is already active for this session.
        return Err(StatusCode::CONFLICT.into_response());
    };
    debug!(%session_id, "server->client stream attached");

    let stream = async_stream::stream! {
        while let Some(message) = outbound_rx.recv().await {
            match jsonrpc::serialize_message(&message) {
                Ok(json) => yield Ok::<Event, Infallible>(
                    Event::default().event("message").data(json),
                ),
                Err(err) => warn!(error = %err, "failed to serialize stream message"),
            }
        }
    };

    let mut http_response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&session_id.to_string()) {
        http_response.headers_mut().insert(SESSION_HEADER, value);
    }
    Ok(http_response)
}

async fn delete_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<StatusCode, Response> {
    check_bearer(&state.server, &headers).await?;

    let Some(session_id) = session_id_from(&headers) else {
        return Err(StatusCode::BAD_REQUEST.into_response());
    };
    state.parked_streams.remove(&session_id);
    state.server.sessions.remove(&session_id);
    info!(%session_id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelmcp_protocol::schema::JsonSchema;
    use keelmcp_protocol::types::Content;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_server() -> Arc<McpServer> {
        McpServer::builder()
            .name("http-test")
            .version("0.0.1")
            .tool_fn(
                "add",
                "Add two integers",
                crate::router::object_schema(
                    vec![("a", JsonSchema::integer()), ("b", JsonSchema::integer())],
                    &["a", "b"],
                ),
                |args: Value, _ctx| async move {
                    let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
                    Ok(vec![Content::text(sum.to_string())])
                },
            )
            .build()
    }

    async fn post(app: Router, body: Value, session: Option<&str>) -> http::Response<axum::body::Body> {
        let mut request = http::Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        if let Some(sid) = session {
            request = request.header(SESSION_HEADER, sid);
        }
        app.oneshot(request.body(axum::body::Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: http::Response<axum::body::Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn initialize_assigns_a_session_id() {
        let app = router(test_server());
        let response = post(
            app,
            json!({"jsonrpc": "2.0", "method": "initialize", "params": {}, "id": 1}),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let session_header = response.headers().get(SESSION_HEADER).cloned();
        assert!(session_header.is_some());
        let body = body_json(response).await;
        assert_eq!(body["result"]["protocolVersion"], json!("2024-11-05"));
    }

    #[tokio::test]
    async fn requests_without_a_session_are_rejected() {
        let app = router(test_server());
        let response = post(
            app,
            json!({"jsonrpc": "2.0", "method": "tools/list", "id": 2}),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_id_is_echoed_through_a_call() {
        let server = test_server();
        let app = router(Arc::clone(&server));

        let response = post(
            app.clone(),
            json!({"jsonrpc": "2.0", "method": "initialize", "params": {}, "id": 1}),
            None,
        )
        .await;
        let sid = response
            .headers()
            .get(SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let response = post(
            app,
            json!({"jsonrpc": "2.0", "method": "tools/call",
                   "params": {"name": "add", "arguments": {"a": 2, "b": 3}}, "id": 2}),
            Some(&sid),
        )
        .await;
        assert_eq!(
            response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap(),
            sid
        );
        let body = body_json(response).await;
        assert_eq!(body["result"]["content"][0]["text"], json!("5"));
        assert_eq!(body["result"]["isError"], json!(false));
    }

    #[tokio::test]
    async fn delete_ends_the_session() {
        let server = test_server();
        let app = router(Arc::clone(&server));

        let response = post(
            app.clone(),
            json!({"jsonrpc": "2.0", "method": "initialize", "params": {}, "id": 1}),
            None,
        )
        .await;
        let sid = response
            .headers()
            .get(SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let request = http::Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION_HEADER, &sid)
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // The session is gone; the next call is rejected.
        let response = post(
            app,
            json!({"jsonrpc": "2.0", "method": "tools/list", "id": 3}),
            Some(&sid),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn parse_errors_come_back_with_null_id() {
        let app = router(test_server());
        let request = http::Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!(-32700));
        assert_eq!(body["id"], Value::Null);
    }
}
