use std::fs;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use utcp_engine::{ProtocolRegistry, UtcpClient, UtcpClientConfig};
use utcp_types::{CallTemplate, TextCallTemplate, ToolArguments, UtcpError};

fn text_template(name: &str, file_path: &str) -> CallTemplate {
    CallTemplate::Text(TextCallTemplate {
        name: name.into(),
        auth: None,
        file_path: Some(file_path.into()),
        encoding_name: None,
        chunk_size_bytes: 0,
        ensure_under_root: true,
    })
}

fn arguments(value: Value) -> ToolArguments {
    value.as_object().cloned().unwrap_or_default()
}

/// A manual file whose tools read other files in the same directory.
fn write_text_manual(root: &std::path::Path) {
    fs::write(root.join("greeting.txt"), "hello\nworld\n").expect("write greeting");
    let manual = json!({
        "utcp_version": "1.0.0",
        "tools": [
            {
                "name": "greeting",
                "description": "Read the greeting file",
                "tags": ["text", "greeting"],
                "tool_call_template": {"call_template_type": "text", "name": "files", "file_path": "greeting.txt"}
            },
            {
                "name": "weather_report",
                "description": "Get current weather by city",
                "tags": ["weather", "forecast"],
                "tool_call_template": {"call_template_type": "text", "name": "files", "file_path": "weather.json"}
            },
            {
                "name": "add",
                "description": "Add two numbers",
                "tags": ["math", "calculator"],
                "tool_call_template": {"call_template_type": "text", "name": "files", "file_path": "sum.txt"}
            }
        ]
    });
    fs::write(root.join("manual.json"), manual.to_string()).expect("write manual");
    fs::write(root.join("weather.json"), r#"{"temp": 18, "wind": 4, "city": "Oslo"}"#).expect("write weather");
}

#[tokio::test]
async fn text_manual_registers_searches_and_calls() {
    let root = tempfile::tempdir().expect("tempdir");
    write_text_manual(root.path());
    let cancel = CancellationToken::new();
    let client = UtcpClient::create(root.path(), UtcpClientConfig::default(), &cancel)
        .await
        .expect("client");

    let result = client
        .register_manual(text_template("files", "manual.json"), &cancel)
        .await
        .expect("register");
    assert!(result.success);
    let names: Vec<&str> = result.manual.tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["files.greeting", "files.weather_report", "files.add"]);

    let ranked = client.search_tools("weather in city", 0, None).await.expect("search");
    assert_eq!(ranked[0].name, "files.weather_report");

    let only_math = client
        .search_tools("anything", 10, Some(&["Calculator".to_string()]))
        .await
        .expect("tag search");
    assert_eq!(only_math.len(), 1);
    assert_eq!(only_math[0].name, "files.add");

    let greeting = client.call_tool("files.greeting", ToolArguments::new(), &cancel).await.expect("call");
    assert_eq!(greeting, json!("hello\nworld\n"));

    let lines = client
        .call_tool_streaming("files.greeting", ToolArguments::new(), &cancel)
        .await
        .expect("stream")
        .collect_values()
        .await
        .expect("lines");
    assert_eq!(lines, vec![json!("hello"), json!("world")]);
}

#[tokio::test]
async fn configured_manuals_register_on_create() {
    let root = tempfile::tempdir().expect("tempdir");
    write_text_manual(root.path());
    let config = UtcpClientConfig::from_json_str(
        r#"{"manual_call_templates": [{"call_template_type": "text", "name": "files", "file_path": "manual.json"}]}"#,
    )
    .expect("config");
    let cancel = CancellationToken::new();
    let client = UtcpClient::create(root.path(), config, &cancel).await.expect("client");

    assert_eq!(client.repository().get_manual_names().await.expect("names"), vec!["files".to_string()]);
    let raw = client
        .call_tool("files.weather_report", ToolArguments::new(), &cancel)
        .await
        .expect("call");
    assert_eq!(raw, json!(r#"{"temp": 18, "wind": 4, "city": "Oslo"}"#));
}

#[cfg(unix)]
#[tokio::test]
async fn cli_tools_receive_flags_and_filter_dict_trims_results() {
    let root = tempfile::tempdir().expect("tempdir");
    let manual = json!({
        "tools": [{
            "name": "forecast",
            "description": "Forecast for a city",
            "tool_call_template": {
                "call_template_type": "cli",
                "name": "shell",
                "command": "printf",
                "args": ["%.0s{\"city\": \"%s\", \"temp\": 12, \"raw\": true}"]
            }
        }]
    });
    fs::write(root.path().join("manual.json"), manual.to_string()).expect("write manual");

    let config = UtcpClientConfig::from_json_str(
        r#"{"post_processing": [{"tool_post_processor_type": "filter_dict", "allowed_keys_by_tool": {"forecast": ["city", "temp"]}}]}"#,
    )
    .expect("config");
    let cancel = CancellationToken::new();
    let client = UtcpClient::create(root.path(), config, &cancel).await.expect("client");

    let discovery = CallTemplate::Cli(
        serde_json::from_value(json!({"name": "shell", "command": "cat", "args": ["manual.json"]})).expect("cli template"),
    );
    let result = client.register_manual(discovery, &cancel).await.expect("register");
    assert!(result.success, "unexpected errors: {:?}", result.errors);

    // printf sees `--city Bergen`; `%.0s` swallows the flag name.
    let value = client
        .call_tool("shell.forecast", arguments(json!({"city": "Bergen"})), &cancel)
        .await
        .expect("call");
    assert_eq!(value, json!({"city": "Bergen", "temp": 12}));
}

#[cfg(unix)]
#[tokio::test]
async fn cli_non_zero_exit_is_a_transport_failure() {
    let root = tempfile::tempdir().expect("tempdir");
    let manual = json!({
        "tools": [{
            "name": "boom",
            "tool_call_template": {"call_template_type": "cli", "name": "shell", "command": "sh", "args": ["-c", "echo broken >&2; exit 4"]}
        }]
    });
    fs::write(root.path().join("manual.json"), manual.to_string()).expect("write manual");
    let cancel = CancellationToken::new();
    let client = UtcpClient::create(root.path(), UtcpClientConfig::default(), &cancel)
        .await
        .expect("client");
    let discovery =
        CallTemplate::Cli(serde_json::from_value(json!({"name": "shell", "command": "cat", "args": ["manual.json"]})).expect("template"));
    client.register_manual(discovery, &cancel).await.expect("register");

    let error = client.call_tool("shell.boom", ToolArguments::new(), &cancel).await.expect_err("exit 4");
    assert!(error.is_transport());
    assert!(error.to_string().contains("broken"), "{error}");
}

#[tokio::test]
async fn missing_protocol_and_unknown_tool_are_raised() {
    let root = tempfile::tempdir().expect("tempdir");
    let cancel = CancellationToken::new();
    let client = UtcpClient::builder(root.path())
        .protocols(ProtocolRegistry::new())
        .build(&cancel)
        .await
        .expect("client");

    let error = client
        .register_manual(text_template("files", "manual.json"), &cancel)
        .await
        .expect_err("no protocols");
    assert!(matches!(error, UtcpError::ProtocolNotRegistered { .. }));

    let error = client.call_tool("files.nothing", ToolArguments::new(), &cancel).await.expect_err("unknown");
    assert!(matches!(error, UtcpError::ToolNotFound { .. }));
}

#[tokio::test]
async fn unresolved_variables_are_raised_and_reported() {
    let root = tempfile::tempdir().expect("tempdir");
    let cancel = CancellationToken::new();
    let client = UtcpClient::create(root.path(), UtcpClientConfig::default(), &cancel)
        .await
        .expect("client");
    let template = text_template("secret_files", "${UTCP_CLIENT_TEST_UNSET_DIR}/manual.json");

    let required = client.get_required_variables_for_manual_and_tools(&template).expect("required");
    assert_eq!(
        required.into_iter().collect::<Vec<_>>(),
        vec!["secret__files_UTCP_CLIENT_TEST_UNSET_DIR".to_string()]
    );

    let error = client.register_manual(template, &cancel).await.expect_err("unresolved");
    match error {
        UtcpError::VariableNotFound { name } => assert_eq!(name, "secret__files_UTCP_CLIENT_TEST_UNSET_DIR"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn dotenv_variables_fill_manual_templates() {
    let root = tempfile::tempdir().expect("tempdir");
    write_text_manual(root.path());
    fs::write(root.path().join(".env"), "files_MANUAL_FILE=manual.json\n").expect("write env");
    let config = UtcpClientConfig::from_json_str(
        r#"{"load_variables_from": [{"variable_loader_type": "dotenv", "env_file_path": ".env"}]}"#,
    )
    .expect("config");
    let cancel = CancellationToken::new();
    let client = UtcpClient::create(root.path(), config, &cancel).await.expect("client");

    let result = client
        .register_manual(text_template("files", "${MANUAL_FILE}"), &cancel)
        .await
        .expect("register");
    assert!(result.success);
    assert_eq!(result.manual.tools.len(), 3);
}

#[tokio::test]
async fn deregister_removes_every_tool_of_the_manual() {
    let root = tempfile::tempdir().expect("tempdir");
    write_text_manual(root.path());
    let cancel = CancellationToken::new();
    let client = UtcpClient::create(root.path(), UtcpClientConfig::default(), &cancel)
        .await
        .expect("client");
    client
        .register_manual(text_template("files", "manual.json"), &cancel)
        .await
        .expect("register");

    let required = client
        .get_required_variables_for_registered_tool("files.greeting")
        .await
        .expect("required");
    assert!(required.is_empty());

    assert!(client.deregister_manual("files", &cancel).await.expect("deregister"));
    assert!(!client.deregister_manual("files", &cancel).await.expect("second deregister"));
    assert!(client.repository().get_tools().await.expect("tools").is_empty());
    assert!(client.repository().get_tools_by_manual("files").await.expect("lookup").is_none());
}

#[tokio::test]
async fn paths_outside_the_root_are_rejected() {
    let root = tempfile::tempdir().expect("tempdir");
    write_text_manual(root.path());
    let cancel = CancellationToken::new();
    let client = UtcpClient::create(root.path(), UtcpClientConfig::default(), &cancel)
        .await
        .expect("client");
    client
        .register_manual(text_template("files", "manual.json"), &cancel)
        .await
        .expect("register");

    let error = client
        .call_tool("files.greeting", arguments(json!({"file_path": "../../etc/passwd"})), &cancel)
        .await
        .expect_err("escape");
    assert!(matches!(error, UtcpError::InvalidConfiguration { .. }));
}
