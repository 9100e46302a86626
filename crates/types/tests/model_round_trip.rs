use serde_json::{Value, json};
use utcp_types::{
    ApiKeyAuth, ApiKeyLocation, Auth, BasicAuth, CallTemplate, CliCallTemplate, GraphQlCallTemplate, GrpcCallTemplate,
    HttpCallTemplate, JsonSchema, Manual, McpCallTemplate, McpServerConfig, McpTransport, OAuth2Auth, SocketCallTemplate,
    StreamableHttpCallTemplate, TextCallTemplate, Tool, UtcpError,
};

fn round_trip<T>(value: &T) -> T
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let encoded = serde_json::to_string(value).expect("encode");
    serde_json::from_str(&encoded).expect("decode")
}

fn sample_auths() -> Vec<Auth> {
    vec![
        Auth::ApiKey(ApiKeyAuth {
            api_key: "${API_KEY}".into(),
            key_name: "X-Api-Key".into(),
            location: ApiKeyLocation::Query,
        }),
        Auth::Basic(BasicAuth {
            username: "user".into(),
            password: "secret".into(),
        }),
        Auth::OAuth2(OAuth2Auth {
            token_url: "https://auth.example.com/token".into(),
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            scopes: vec!["read".into(), "write".into()],
        }),
    ]
}

fn sample_templates() -> Vec<CallTemplate> {
    let basic = Some(Auth::Basic(BasicAuth {
        username: "u".into(),
        password: "p".into(),
    }));
    vec![
        CallTemplate::Http(HttpCallTemplate {
            name: "weather".into(),
            auth: basic.clone(),
            method: "POST".into(),
            url: "https://api.example.com/weather".into(),
            headers: [("Accept".to_string(), "application/json".to_string())].into_iter().collect(),
            body: Some(json!({"units": "metric"})),
            timeout: Some(30_000),
        }),
        CallTemplate::StreamableHttp(StreamableHttpCallTemplate {
            name: "feed".into(),
            auth: None,
            method: "GET".into(),
            url: "https://api.example.com/feed".into(),
            headers: Default::default(),
            body: None,
            timeout: None,
            content_type: "text/event-stream".into(),
        }),
        CallTemplate::Cli(CliCallTemplate {
            name: "git".into(),
            auth: None,
            command: "git".into(),
            args: vec!["status".into()],
            working_dir: Some("/tmp".into()),
            env: [("GIT_PAGER".to_string(), "cat".to_string())].into_iter().collect(),
            timeout: Some(5_000),
        }),
        CallTemplate::GraphQl(GraphQlCallTemplate {
            name: "countries".into(),
            auth: None,
            url: "https://countries.example.com/graphql".into(),
            query: Some("{ countries { code } }".into()),
            operation_name: None,
            headers: Default::default(),
        }),
        CallTemplate::Grpc(GrpcCallTemplate {
            name: "greeter".into(),
            auth: None,
            host: "localhost".into(),
            port: 50051,
            service_name: "helloworld.Greeter".into(),
            method_name: "SayHello".into(),
            use_ssl: true,
        }),
        CallTemplate::Tcp(SocketCallTemplate {
            name: "echo_tcp".into(),
            auth: None,
            host: "127.0.0.1".into(),
            port: 7,
            timeout: Some(1_000),
        }),
        CallTemplate::Udp(SocketCallTemplate {
            name: "echo_udp".into(),
            auth: None,
            host: "127.0.0.1".into(),
            port: 7,
            timeout: None,
        }),
        CallTemplate::Text(TextCallTemplate {
            name: "notes".into(),
            auth: None,
            file_path: Some("notes.txt".into()),
            encoding_name: None,
            chunk_size_bytes: 64,
            ensure_under_root: false,
        }),
        CallTemplate::Mcp(McpCallTemplate {
            name: "assistants".into(),
            auth: sample_auths().pop(),
            transport: McpTransport::Http,
            command: None,
            url: None,
            servers: Some(
                [(
                    "primary".to_string(),
                    McpServerConfig {
                        url: Some("https://mcp.example.com".into()),
                        timeout_seconds: Some(10),
                        ..McpServerConfig::default()
                    },
                )]
                .into_iter()
                .collect(),
            ),
            config: None,
        }),
    ]
}

#[test]
fn auth_variants_survive_round_trip() {
    for auth in sample_auths() {
        assert_eq!(round_trip(&auth), auth);
    }
}

#[test]
fn call_template_variants_survive_round_trip() {
    for template in sample_templates() {
        let decoded = round_trip(&template);
        assert_eq!(decoded, template, "round trip changed {}", template.call_template_type());
    }
}

#[test]
fn discriminators_stay_on_the_wire() {
    for template in sample_templates() {
        let encoded: Value = serde_json::to_value(&template).expect("encode");
        assert_eq!(encoded["call_template_type"], template.call_template_type());
    }
    let encoded = serde_json::to_value(&sample_auths()[0]).expect("encode");
    assert_eq!(encoded["auth_type"], "api_key");
    assert_eq!(encoded["location"], "query");
}

#[test]
fn unknown_discriminators_raise_validation_errors() {
    let template = serde_json::from_value::<CallTemplate>(json!({"call_template_type": "telepathy", "name": "x"}));
    let message = template.expect_err("unknown call template").to_string();
    assert!(message.contains("Unknown CallTemplate type: telepathy"), "{message}");

    let auth = serde_json::from_value::<Auth>(json!({"auth_type": "retina_scan"}));
    let message = auth.expect_err("unknown auth").to_string();
    assert!(message.contains("Unknown Auth type: retina_scan"), "{message}");

    let registry = utcp_types::PolymorphicRegistry::global();
    let error: UtcpError = registry
        .decode_call_template(json!({"call_template_type": "telepathy", "name": "x"}))
        .expect_err("unknown")
        .into();
    assert!(matches!(error, UtcpError::SerializerValidation(_)));
}

#[test]
fn manual_document_decodes_with_defaults() {
    let manual: Manual = serde_json::from_value(json!({
        "tools": [{
            "name": "weather.current",
            "description": "Get current weather by city",
            "inputs": {"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]},
            "tags": ["weather"],
            "tool_call_template": {"call_template_type": "http", "name": "weather", "url": "https://api.example.com/current"}
        }]
    }))
    .expect("decode manual");

    assert_eq!(manual.utcp_version, "1.0.0");
    assert_eq!(manual.manual_version, "1.0.0");
    let tool = &manual.tools[0];
    assert_eq!(tool.outputs, JsonSchema::default());
    assert_eq!(tool.inputs.required.as_deref(), Some(&["city".to_string()][..]));
    assert_eq!(round_trip(&manual), manual);
}

#[test]
fn manual_document_decodes_from_yaml() {
    let yaml = r#"
utcp_version: "1.0.0"
manual_version: "2.1.0"
tools:
  - name: files.read
    description: Read a file
    tool_call_template:
      call_template_type: text
      name: files
      file_path: README.md
"#;
    let manual: Manual = serde_yaml::from_str(yaml).expect("decode yaml manual");
    assert_eq!(manual.manual_version, "2.1.0");
    let Tool { tool_call_template, .. } = &manual.tools[0];
    let CallTemplate::Text(text) = tool_call_template else {
        panic!("expected text template");
    };
    assert!(text.ensure_under_root);
    assert_eq!(text.chunk_size_bytes, 0);
}
