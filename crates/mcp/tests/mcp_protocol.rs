use indexmap::IndexMap;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use utcp_mcp::McpProtocol;
use utcp_types::{
    Auth, CallTemplate, CommunicationProtocol, McpCallTemplate, McpServerConfig, McpTransport, OAuth2Auth, ProtocolContext,
    ToolArguments, UtcpError,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_server(url: String) -> McpServerConfig {
    McpServerConfig {
        url: Some(url),
        ..McpServerConfig::default()
    }
}

fn multi_server_template(servers: Vec<(&str, McpServerConfig)>, auth: Option<Auth>) -> CallTemplate {
    let servers: IndexMap<String, McpServerConfig> = servers.into_iter().map(|(name, config)| (name.to_string(), config)).collect();
    CallTemplate::Mcp(McpCallTemplate {
        name: "mcp_manual".into(),
        auth,
        transport: McpTransport::Stdio,
        command: None,
        url: None,
        servers: Some(servers),
        config: None,
    })
}

fn arguments(value: Value) -> ToolArguments {
    value.as_object().cloned().unwrap_or_default()
}

async fn listing_server(route: &str, tools: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tools": tools})))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn register_aggregates_tools_from_every_server() {
    let first = listing_server("/mcp", json!([{"name": "echo", "description": "Echo text"}])).await;
    let second = listing_server("/mcp", json!(["add"])).await;

    let template = multi_server_template(
        vec![
            ("one", http_server(format!("{}/mcp", first.uri()))),
            ("two", http_server(format!("{}/mcp", second.uri()))),
        ],
        None,
    );

    let result = McpProtocol::new()
        .register_manual(&ProtocolContext::default(), &template, &CancellationToken::new())
        .await
        .expect("register");

    assert!(result.success, "unexpected errors: {:?}", result.errors);
    let names: Vec<&str> = result.manual.tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "add"]);
    assert_eq!(result.manual.tools[0].description, "Echo text");
}

#[tokio::test]
async fn register_records_failing_servers_and_keeps_the_rest() {
    let healthy = listing_server("/mcp", json!(["ping"])).await;
    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&broken)
        .await;

    let template = multi_server_template(
        vec![
            ("broken", http_server(format!("{}/mcp", broken.uri()))),
            ("healthy", http_server(format!("{}/mcp", healthy.uri()))),
        ],
        None,
    );

    let result = McpProtocol::new()
        .register_manual(&ProtocolContext::default(), &template, &CancellationToken::new())
        .await
        .expect("register");

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("broken: "));
    assert_eq!(result.manual.tools.len(), 1);
    assert_eq!(result.manual.tools[0].name, "ping");
}

#[tokio::test]
async fn non_json_listing_is_recorded_as_a_server_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let template = multi_server_template(vec![("html", http_server(format!("{}/mcp", server.uri())))], None);
    let result = McpProtocol::new()
        .register_manual(&ProtocolContext::default(), &template, &CancellationToken::new())
        .await
        .expect("register");

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("html: "), "{}", result.errors[0]);
    assert!(result.manual.tools.is_empty());
}

#[tokio::test]
async fn oauth_token_is_requested_once_across_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok-1", "token_type": "bearer"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({"toolName": "echo", "arguments": {"text": "hi"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": [{"type": "text", "text": "hi"}]})))
        .expect(2)
        .mount(&server)
        .await;

    let auth = Auth::OAuth2(OAuth2Auth {
        token_url: format!("{}/token", server.uri()),
        client_id: Some("client".into()),
        client_secret: Some("secret".into()),
        scopes: Vec::new(),
    });
    let template = multi_server_template(vec![("main", http_server(format!("{}/mcp", server.uri())))], Some(auth));
    let protocol = McpProtocol::new();
    let context = ProtocolContext::default();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let value = protocol
            .call_tool(&context, "mcp_manual.echo", &arguments(json!({"text": "hi"})), &template, &cancel)
            .await
            .expect("call");
        assert_eq!(value, json!("hi"));
    }
    assert_eq!(protocol.token_cache().len().await, 1);
}

#[tokio::test]
async fn call_falls_back_to_the_next_server() {
    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&failing)
        .await;
    let working = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"structured_output": {"sum": 3}})))
        .mount(&working)
        .await;

    let template = multi_server_template(
        vec![
            ("failing", http_server(format!("{}/mcp", failing.uri()))),
            ("working", http_server(format!("{}/mcp", working.uri()))),
        ],
        None,
    );

    let value = McpProtocol::new()
        .call_tool(&ProtocolContext::default(), "add", &arguments(json!({"a": 1, "b": 2})), &template, &CancellationToken::new())
        .await
        .expect("call");
    assert_eq!(value, json!({"sum": 3}));
}

#[tokio::test]
async fn call_fails_once_every_server_fails() {
    let failing = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&failing)
        .await;

    let template = multi_server_template(
        vec![
            ("a", http_server(format!("{}/mcp", failing.uri()))),
            ("b", http_server(format!("{}/other", failing.uri()))),
        ],
        None,
    );

    let error = McpProtocol::new()
        .call_tool(&ProtocolContext::default(), "add", &ToolArguments::new(), &template, &CancellationToken::new())
        .await
        .expect_err("all servers fail");
    assert!(error.is_transport());
    assert!(error.to_string().contains("Tool call failed on all configured MCP servers"));
}

#[tokio::test]
async fn streaming_yields_each_normalized_event() {
    let server = MockServer::start().await;
    let events = concat!(
        ": keep-alive\n\n",
        "data: {\"content\": [{\"type\": \"text\", \"text\": \"1\"}]}\n\n",
        "event: progress\n\n",
        "data: {\"structured_output\": \"{\\\"done\\\": true}\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(events, "text/event-stream"))
        .mount(&server)
        .await;

    let template = multi_server_template(vec![("sse", http_server(format!("{}/mcp", server.uri())))], None);
    let stream = McpProtocol::new()
        .call_tool_streaming(&ProtocolContext::default(), "count", &ToolArguments::new(), &template, &CancellationToken::new())
        .await
        .expect("stream");

    let values = stream.collect_values().await.expect("values");
    assert_eq!(values, vec![json!(1), json!({"done": true})]);
}

#[tokio::test]
async fn cancelled_call_returns_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(30)))
        .mount(&server)
        .await;

    let template = multi_server_template(vec![("slow", http_server(format!("{}/mcp", server.uri())))], None);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let error = McpProtocol::new()
        .call_tool(&ProtocolContext::default(), "wait", &ToolArguments::new(), &template, &cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(error, UtcpError::Cancelled { .. }));
}

#[cfg(unix)]
mod stdio {
    use super::*;

    fn command_server(script: &str) -> McpServerConfig {
        McpServerConfig {
            command: Some("sh".into()),
            args: vec!["-c".into(), script.into()],
            ..McpServerConfig::default()
        }
    }

    #[tokio::test]
    async fn register_reads_listing_from_process_output_in_root_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::write(root.path().join("tools.json"), r#"{"tools": [{"name": "list_files"}]}"#).expect("write listing");

        let template = multi_server_template(vec![("local", command_server("cat tools.json"))], None);
        let result = McpProtocol::new()
            .register_manual(&ProtocolContext::new(root.path()), &template, &CancellationToken::new())
            .await
            .expect("register");

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.manual.tools[0].name, "list_files");
    }

    #[tokio::test]
    async fn call_writes_a_json_rpc_request_to_stdin() {
        let script = r#"read request; case "$request" in *'"method":"tools/call"'*'"name":"add"'*) echo '{"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"42"}]}}' ;; *) exit 1 ;; esac"#;
        let template = multi_server_template(vec![("calc", command_server(script))], None);

        let value = McpProtocol::new()
            .call_tool(&ProtocolContext::default(), "mcp_manual.add", &arguments(json!({"a": 40, "b": 2})), &template, &CancellationToken::new())
            .await
            .expect("call");
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn legacy_stdio_template_calls_its_command() {
        let template = CallTemplate::Mcp(McpCallTemplate {
            name: "legacy".into(),
            auth: None,
            transport: McpTransport::Stdio,
            command: Some("cat".into()),
            url: None,
            servers: None,
            config: None,
        });

        // `cat` echoes the request back; its `params` object has no known result field.
        let value = McpProtocol::new()
            .call_tool(&ProtocolContext::default(), "legacy.echo", &arguments(json!({"x": 1})), &template, &CancellationToken::new())
            .await
            .expect("call");
        assert_eq!(value["method"], json!("tools/call"));
        assert_eq!(value["params"]["name"], json!("echo"));
    }
}
