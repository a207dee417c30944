//! The reference registry: a calculator tool, user-profile resources,
//! and a greeting prompt.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use keelmcp_protocol::ToolError;
use keelmcp_protocol::schema::JsonSchema;
use keelmcp_protocol::types::{
    Content, Prompt, PromptArgument, ResourceContents, ToolAnnotations,
};
use keelmcp_server::registry::user_message;
use keelmcp_server::{McpServerBuilder, RequestContext};

/// Languages the localized profile resource can answer in.
const KNOWN_LOCALES: &[&str] = &["en", "fr", "de", "es", "ja"];

/// Attach the reference tools, resources and prompts.
pub fn build(builder: McpServerBuilder) -> McpServerBuilder {
    builder
        .name("keelmcp-reference")
        .version(env!("CARGO_PKG_VERSION"))
        .instructions("A reference MCP server: a calculator, user profiles, and a greeting prompt.")
        .tool_with_annotations(
            "add",
            "Add two integers",
            JsonSchema::Object {
                properties: vec![
                    ("a".into(), JsonSchema::integer()),
                    ("b".into(), JsonSchema::integer()),
                ],
                required: vec!["a".into(), "b".into()],
                description: Some("The two addends".into()),
            },
            Some(ToolAnnotations {
                title: Some("Add".into()),
                read_only_hint: Some(true),
                idempotent_hint: Some(true),
                ..Default::default()
            }),
            add,
        )
        .tool_with_annotations(
            "divide",
            "Divide one number by another",
            JsonSchema::Object {
                properties: vec![
                    ("numerator".into(), JsonSchema::number()),
                    ("denominator".into(), JsonSchema::number()),
                ],
                required: vec!["numerator".into(), "denominator".into()],
                description: None,
            },
            Some(ToolAnnotations {
                read_only_hint: Some(true),
                idempotent_hint: Some(true),
                ..Default::default()
            }),
            divide,
        )
        .resource_fn(
            "user-profile",
            &["users://{user_id}/profile"],
            Some("text/plain"),
            |uri: String, params: HashMap<String, String>, _ctx| async move {
                let user = params.get("user_id").cloned().unwrap_or_default();
                Ok(vec![ResourceContents::text(
                    uri,
                    format!("Profile data for user {user}"),
                )])
            },
        )
        .resource_fn(
            "user-profile-localized",
            &["users://{user_id}/profile/localized?locale={lang}"],
            Some("text/plain"),
            |uri: String, params: HashMap<String, String>, _ctx| async move {
                let user = params.get("user_id").cloned().unwrap_or_default();
                let lang = params.get("lang").map(String::as_str).unwrap_or("en");
                Ok(vec![ResourceContents::text(
                    uri,
                    format!("Profile data for user {user} ({lang})"),
                )])
            },
        )
        .resource_completion(
            "user-profile-localized",
            "lang",
            Arc::new(|_arg, partial, _bound| {
                KNOWN_LOCALES
                    .iter()
                    .filter(|l| l.starts_with(partial))
                    .map(|l| (*l).to_string())
                    .collect()
            }),
        )
        .prompt_fn(
            Prompt {
                name: "greeting".into(),
                description: Some("Greet someone by name".into()),
                arguments: Some(vec![PromptArgument {
                    name: "name".into(),
                    description: Some("Who to greet".into()),
                    required: Some(true),
                }]),
            },
            |args: HashMap<String, String>, _ctx: RequestContext| async move {
                let name = args.get("name").cloned().unwrap_or_else(|| "stranger".into());
                Ok(vec![user_message(format!(
                    "Please write a short, warm greeting for {name}."
                ))])
            },
        )
}

async fn add(args: Value, _ctx: RequestContext) -> Result<Vec<Content>, ToolError> {
    let a = int_arg(&args, "a")?;
    let b = int_arg(&args, "b")?;
    Ok(vec![Content::text(json!(a + b).to_string())])
}

async fn divide(args: Value, _ctx: RequestContext) -> Result<Vec<Content>, ToolError> {
    let numerator = args["numerator"].as_f64().ok_or_else(|| bad_number("numerator"))?;
    let denominator = args["denominator"].as_f64().ok_or_else(|| bad_number("denominator"))?;
    if denominator == 0.0 {
        return Err(ToolError::Handler("division by zero".into()));
    }
    Ok(vec![Content::text(json!(numerator / denominator).to_string())])
}

fn int_arg(args: &Value, name: &str) -> Result<i64, ToolError> {
    args[name].as_i64().ok_or_else(|| ToolError::InvalidArgumentType {
        parameter: name.to_string(),
        expected: "Int".to_string(),
        actual: args[name].to_string(),
    })
}

fn bad_number(name: &str) -> ToolError {
    ToolError::InvalidArgumentType {
        parameter: name.to_string(),
        expected: "Double".to_string(),
        actual: "Null".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelmcp_protocol::jsonrpc::JsonRpcMessage;
    use keelmcp_protocol::types::LogLevel;
    use keelmcp_server::McpServer;
    use keelmcp_transport::TransportType;
    use tokio::sync::mpsc;

    async fn dispatch(raw: Value) -> keelmcp_protocol::jsonrpc::JsonRpcResponse {
        let server = build(McpServer::builder().default_log_level(LogLevel::Info)).build();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Arc::new(keelmcp_server::Session::new(
            TransportType::Stdio,
            tx,
            LogLevel::Info,
        ));
        let message: JsonRpcMessage = serde_json::from_value(raw).unwrap();
        server
            .dispatcher()
            .handle_message(&session, message, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_works_end_to_end() {
        let response = dispatch(json!({"jsonrpc": "2.0", "method": "tools/call",
            "params": {"name": "add", "arguments": {"a": 2, "b": 3}}, "id": 1}))
        .await;
        let result = response.result().unwrap();
        assert_eq!(result["content"], json!([{"type": "text", "text": "5"}]));
        assert_eq!(result["isError"], json!(false));
    }

    #[tokio::test]
    async fn divide_by_zero_is_observable() {
        let response = dispatch(json!({"jsonrpc": "2.0", "method": "tools/call",
            "params": {"name": "divide", "arguments": {"numerator": 1, "denominator": 0}}, "id": 2}))
        .await;
        let result = response.result().unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("division by zero"));
    }

    #[tokio::test]
    async fn localized_profile_drops_missing_locale() {
        let response = dispatch(json!({"jsonrpc": "2.0", "method": "resources/templates/list", "id": 3})).await;
        let templates = response.result().unwrap()["resourceTemplates"].clone();
        let listed: Vec<String> = templates
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["uriTemplate"].as_str().unwrap().to_string())
            .collect();
        assert!(listed.contains(&"users://{user_id}/profile".to_string()));
        assert!(listed.contains(&"users://{user_id}/profile/localized?locale={lang}".to_string()));

        let response = dispatch(json!({"jsonrpc": "2.0", "method": "resources/read",
            "params": {"uri": "users://456/profile/localized"}, "id": 4}))
        .await;
        let text = response.result().unwrap()["contents"][0]["text"].clone();
        assert_eq!(text, json!("Profile data for user 456 (en)"));
    }

    #[tokio::test]
    async fn locale_completion_filters_by_prefix() {
        let response = dispatch(json!({"jsonrpc": "2.0", "method": "completion/complete",
            "params": {
                "ref": {"type": "ref/resource", "uri": "users://{user_id}/profile/localized?locale={lang}"},
                "argument": {"name": "lang", "value": "f"}
            }, "id": 5}))
        .await;
        let completion = response.result().unwrap()["completion"].clone();
        assert_eq!(completion["values"], json!(["fr"]));
        assert_eq!(completion["hasMore"], json!(false));
    }

    #[tokio::test]
    async fn greeting_prompt_renders() {
        let response = dispatch(json!({"jsonrpc": "2.0", "method": "prompts/get",
            "params": {"name": "greeting", "arguments": {"name": "Ada"}}, "id": 6}))
        .await;
        let message = response.result().unwrap()["messages"][0].clone();
        assert_eq!(message["role"], json!("user"));
        assert!(message["content"]["text"].as_str().unwrap().contains("Ada"));
    }
}
