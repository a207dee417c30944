//! Property tests for the JSON-RPC codec: decode(encode(m)) == m for
//! arbitrary messages, and id echo through response construction.

use proptest::prelude::*;
use serde_json::{Value, json};

use keelmcp_protocol::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    parse_message, serialize_message,
};
use keelmcp_protocol::message_id::RequestId;

fn arb_request_id() -> impl Strategy<Value = RequestId> {
    prop_oneof![
        any::<i64>().prop_map(RequestId::Number),
        "[a-zA-Z0-9_-]{1,24}".prop_map(RequestId::String),
    ]
}

fn arb_params() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(json!({}))),
        ("[a-z]{1,8}", any::<i64>()).prop_map(|(k, v)| Some(json!({ k: v }))),
        ("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}").prop_map(|(k, v)| Some(json!({ k: v }))),
    ]
}

fn arb_method() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("ping".to_string()),
        Just("tools/call".to_string()),
        Just("notifications/message".to_string()),
        "[a-z]{1,12}(/[a-z]{1,12})?",
    ]
}

fn arb_message() -> impl Strategy<Value = JsonRpcMessage> {
    prop_oneof![
        (arb_method(), arb_params(), arb_request_id())
            .prop_map(|(m, p, id)| JsonRpcMessage::Request(JsonRpcRequest::new(m, p, id))),
        (arb_method(), arb_params())
            .prop_map(|(m, p)| JsonRpcMessage::Notification(JsonRpcNotification::new(m, p))),
        (arb_params(), arb_request_id()).prop_map(|(p, id)| {
            JsonRpcMessage::Response(JsonRpcResponse::success(
                p.unwrap_or_else(|| json!({})),
                id,
            ))
        }),
        (any::<i16>(), "[a-zA-Z ]{1,24}", arb_request_id()).prop_map(|(code, msg, id)| {
            JsonRpcMessage::Response(JsonRpcResponse::error_response(
                JsonRpcError {
                    code: i32::from(code),
                    message: msg,
                    data: None,
                },
                id,
            ))
        }),
    ]
}

proptest! {
    #[test]
    fn decode_encode_round_trips(message in arb_message()) {
        let encoded = serialize_message(&message).unwrap();
        let decoded = parse_message(&encoded).unwrap();
        let reencoded = serialize_message(&decoded).unwrap();
        let a: Value = serde_json::from_str(&encoded).unwrap();
        let b: Value = serde_json::from_str(&reencoded).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn responses_echo_the_request_id(id in arb_request_id()) {
        let response = JsonRpcResponse::success(json!({"ok": true}), id.clone());
        prop_assert_eq!(response.request_id(), Some(&id));

        let encoded = serde_json::to_string(&response).unwrap();
        let decoded: JsonRpcResponse = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded.request_id(), Some(&id));
    }
}
