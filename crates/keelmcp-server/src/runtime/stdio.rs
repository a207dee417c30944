//! The stdio serve loop.
//!
//! One session per transport lifetime. Lines are decoded sequentially;
//! each request runs in its own task so handlers can suspend on
//! outbound calls, while the single writer drains the session's
//! outbound channel. Closing the transport cancels every pending
//! inbound and outbound request.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use keelmcp_protocol::jsonrpc::{self, JsonRpcMessage, JsonRpcResponse};
use keelmcp_stdio::StdioTransport;
use keelmcp_transport::{Transport, TransportMessage, TransportType};

use crate::builder::McpServer;
use crate::error::ServerResult;

/// Run the server over a stdio transport until EOF.
pub async fn serve(server: Arc<McpServer>, transport: StdioTransport) -> ServerResult<()> {
    transport.connect().await?;
    let transport = Arc::new(transport);

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<JsonRpcMessage>();
    let session = server
        .sessions
        .create(TransportType::Stdio, outbound_tx, server.default_log_level);

    // Single writer: everything leaves through this task.
    let writer = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match jsonrpc::serialize_message(&message) {
                    Ok(json) => {
                        if let Err(err) = transport.send(TransportMessage::from_json(json)).await {
                            warn!(error = %err, "stdio write failed, stopping writer");
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to serialize outbound message"),
                }
            }
        })
    };

    loop {
        let Some(message) = transport.receive().await? else {
            debug!("stdio transport closed");
            break;
        };
        let Some(raw) = message.as_str() else {
            warn!("dropping non-UTF-8 line");
            continue;
        };

        match jsonrpc::parse_message(raw) {
            Ok(parsed) => {
                let server = Arc::clone(&server);
                let session = Arc::clone(&session);
                // Decode stays sequential; handling may suspend.
                tokio::spawn(async move {
                    if let Some(response) = server
                        .dispatcher
                        .handle_message(&session, parsed, None)
                        .await
                    {
                        let _ = session.send_message(JsonRpcMessage::Response(response));
                    }
                });
            }
            Err(err) => {
                // Answer with a parse error when an id is recoverable,
                // otherwise log and drop the line.
                if let Some(id) = jsonrpc::recover_id(raw) {
                    let response = JsonRpcResponse::error_response(
                        keelmcp_protocol::jsonrpc::JsonRpcError::new(
                            keelmcp_protocol::jsonrpc::JsonRpcErrorCode::ParseError,
                            err.to_string(),
                        ),
                        id,
                    );
                    let _ = session.send_message(JsonRpcMessage::Response(response));
                } else {
                    warn!(error = %err, "dropping malformed line");
                }
            }
        }
    }

    // Cancel everything still in flight, then stop the writer.
    let session_id = session.id;
    drop(session);
    server.sessions.remove(&session_id);
    writer.abort();
    transport.disconnect().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelmcp_protocol::schema::JsonSchema;
    use keelmcp_protocol::types::Content;
    use serde_json::{Value, json};

    fn test_server() -> Arc<McpServer> {
        McpServer::builder()
            .name("stdio-test")
            .version("0.0.1")
            .tool_fn(
                "echo",
                "Echo the input",
                JsonSchema::Object {
                    properties: vec![("text".into(), JsonSchema::string())],
                    required: vec!["text".into()],
                    description: None,
                },
                |args: Value, _ctx| async move {
                    Ok(vec![Content::text(args["text"].as_str().unwrap_or_default())])
                },
            )
            .build()
    }

    #[tokio::test]
    async fn serves_requests_over_an_in_process_pipe() {
        let (server_side, client_side) = StdioTransport::pipe();
        client_side.connect().await.unwrap();

        let server = test_server();
        let serve_task = tokio::spawn(async move { serve(server, server_side).await });

        client_side
            .send(TransportMessage::from_json(
                json!({"jsonrpc": "2.0", "method": "initialize", "params": {}, "id": 1}).to_string(),
            ))
            .await
            .unwrap();
        let reply = client_side.receive().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(reply.as_str().unwrap()).unwrap();
        assert_eq!(reply["result"]["protocolVersion"], json!("2024-11-05"));

        client_side
            .send(TransportMessage::from_json(
                json!({"jsonrpc": "2.0", "method": "tools/call",
                       "params": {"name": "echo", "arguments": {"text": "hi"}}, "id": 2})
                .to_string(),
            ))
            .await
            .unwrap();
        let reply = client_side.receive().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(reply.as_str().unwrap()).unwrap();
        assert_eq!(reply["result"]["content"][0]["text"], json!("hi"));

        client_side.disconnect().await.unwrap();
        serve_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_line_with_id_gets_a_parse_error() {
        let (server_side, client_side) = StdioTransport::pipe();
        client_side.connect().await.unwrap();

        let server = test_server();
        let serve_task = tokio::spawn(async move { serve(server, server_side).await });

        // Parseable JSON, invalid envelope (method is a number).
        client_side
            .send(TransportMessage::from_json(
                r#"{"jsonrpc":"2.0","method":42,"id":9}"#.to_string(),
            ))
            .await
            .unwrap();
        let reply = client_side.receive().await.unwrap().unwrap();
        let reply: Value = serde_json::from_str(reply.as_str().unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], json!(-32700));
        assert_eq!(reply["id"], json!(9));

        client_side.disconnect().await.unwrap();
        serve_task.await.unwrap().unwrap();
    }
}
