//! `http` and `streamable_http` adapters.
//!
//! Discovery `GET`s the template URL and accepts either a UTCP manual or an
//! OpenAPI document. Calls fill `{param}` path placeholders from the
//! arguments; the rest go to the query string for GET/DELETE/HEAD and to a
//! JSON body otherwise.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{Map as JsonMap, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use utcp_mcp::{OAuthTokenCache, authorize_request};
use utcp_registry::{OpenApiConverter, is_openapi_document};
use utcp_types::{
    Auth, CallTemplate, CommunicationProtocol, Manual, ProtocolContext, RegisterManualResult, ToolArguments, ToolStream, UtcpError,
};
use utcp_util::{
    argument_to_string, cancellable_with_timeout, fill_path_placeholders, forward_sse_stream, parse_response_body, redact_sensitive,
};

const ERROR_BODY_PREVIEW: usize = 512;

/// The request-shaping fields shared by both HTTP template variants.
struct HttpTarget<'a> {
    manual_name: &'a str,
    auth: Option<&'a Auth>,
    method: &'a str,
    url: &'a str,
    headers: &'a IndexMap<String, String>,
    body: Option<&'a Value>,
    timeout: Option<Duration>,
    stream_content_type: Option<&'a str>,
}

impl<'a> HttpTarget<'a> {
    fn from_template(template: &'a CallTemplate) -> Result<Self, UtcpError> {
        match template {
            CallTemplate::Http(http) => Ok(Self {
                manual_name: &http.name,
                auth: http.auth.as_ref(),
                method: &http.method,
                url: &http.url,
                headers: &http.headers,
                body: http.body.as_ref(),
                timeout: http.timeout.map(Duration::from_millis),
                stream_content_type: None,
            }),
            CallTemplate::StreamableHttp(http) => Ok(Self {
                manual_name: &http.name,
                auth: http.auth.as_ref(),
                method: &http.method,
                url: &http.url,
                headers: &http.headers,
                body: http.body.as_ref(),
                timeout: http.timeout.map(Duration::from_millis),
                stream_content_type: Some(&http.content_type),
            }),
            other => Err(UtcpError::invalid_configuration(format!(
                "HTTP protocol cannot use a '{}' call template",
                other.call_template_type()
            ))),
        }
    }

    fn method(&self) -> Result<Method, UtcpError> {
        Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|error| UtcpError::invalid_configuration(format!("invalid HTTP method '{}': {error}", self.method)))
    }
}

/// Adapter for plain HTTP endpoints and server-sent-event streams.
#[derive(Debug)]
pub struct HttpProtocol {
    client: Client,
    tokens: Arc<OAuthTokenCache>,
}

impl Default for HttpProtocol {
    fn default() -> Self {
        Self {
            client: Client::new(),
            tokens: Arc::new(OAuthTokenCache::new()),
        }
    }
}

impl HttpProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_token_cache(mut self, tokens: Arc<OAuthTokenCache>) -> Self {
        self.tokens = tokens;
        self
    }

    async fn prepare(
        &self,
        target: &HttpTarget<'_>,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<RequestBuilder, UtcpError> {
        let mut request = request;
        for (name, value) in target.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        authorize_request(request, target.auth, &self.client, &self.tokens, cancel).await
    }

    async fn build_call(
        &self,
        target: &HttpTarget<'_>,
        arguments: &ToolArguments,
        cancel: &CancellationToken,
    ) -> Result<RequestBuilder, UtcpError> {
        let mut remaining = arguments.clone();
        let url = fill_path_placeholders(target.url, &mut remaining)?;
        let method = target.method()?;

        let mut request = self.client.request(method.clone(), &url);
        if matches!(method, Method::GET | Method::DELETE | Method::HEAD) {
            if !remaining.is_empty() {
                let query: Vec<(String, String)> = remaining.iter().map(|(key, value)| (key.clone(), argument_to_string(value))).collect();
                request = request.query(&query);
            }
        } else if let Some(body) = merged_body(target.body, remaining) {
            request = request.json(&body);
        }
        debug!(target: "utcp_client", manual = %target.manual_name, method = %method, url = %redact_sensitive(&url), "HTTP tool call");
        self.prepare(target, request, cancel).await
    }
}

/// Arguments layered over the template body; `None` when there is nothing to send.
fn merged_body(template_body: Option<&Value>, arguments: JsonMap<String, Value>) -> Option<Value> {
    match template_body {
        Some(Value::Object(base)) => {
            let mut merged = base.clone();
            merged.extend(arguments);
            Some(Value::Object(merged))
        }
        Some(other) if arguments.is_empty() => Some(other.clone()),
        _ if arguments.is_empty() => None,
        _ => Some(Value::Object(arguments)),
    }
}

async fn read_success_body(response: Response) -> Result<String, UtcpError> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response
        .text()
        .await
        .map_err(|error| UtcpError::transport(format!("failed to read response from {url}: {error}")))?;
    if !status.is_success() {
        let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
        return Err(UtcpError::transport(format!("HTTP {status} from {url}: {}", redact_sensitive(&preview))));
    }
    Ok(body)
}

async fn send(request: RequestBuilder) -> Result<Response, UtcpError> {
    request
        .send()
        .await
        .map_err(|error| UtcpError::transport(format!("HTTP request failed: {error}")))
}

fn is_event_stream(response: &Response, expected: &str) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().starts_with(&expected.to_ascii_lowercase()))
}

#[async_trait::async_trait]
impl CommunicationProtocol for HttpProtocol {
    async fn register_manual(
        &self,
        _context: &ProtocolContext,
        manual_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<RegisterManualResult, UtcpError> {
        let target = HttpTarget::from_template(manual_call_template)?;
        let fetch = async {
            let request = self.prepare(&target, self.client.get(target.url), cancel).await?;
            read_success_body(send(request).await?).await
        };
        let body = cancellable_with_timeout(cancel, "HTTP manual discovery", target.timeout, fetch).await?;
        let document = parse_response_body(&body);

        let manual = if is_openapi_document(&document) {
            OpenApiConverter::new(target.manual_name)
                .with_discovery_url(target.url)
                .with_auth(target.auth.cloned())
                .convert(&document)
        } else {
            serde_json::from_value::<Manual>(document)
                .map_err(|error| UtcpError::transport(format!("response from {} is not a UTCP manual: {error}", target.url)))?
        };

        debug!(target: "utcp_client", manual = %target.manual_name, tools = manual.tools.len(), "discovered HTTP manual");
        Ok(RegisterManualResult::new(manual_call_template.clone(), manual, Vec::new()))
    }

    async fn call_tool(
        &self,
        _context: &ProtocolContext,
        _tool_name: &str,
        arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<Value, UtcpError> {
        let target = HttpTarget::from_template(tool_call_template)?;
        let call = async {
            let request = self.build_call(&target, arguments, cancel).await?;
            read_success_body(send(request).await?).await
        };
        let body = cancellable_with_timeout(cancel, "HTTP tool call", target.timeout, call).await?;
        Ok(parse_response_body(&body))
    }

    async fn call_tool_streaming(
        &self,
        context: &ProtocolContext,
        tool_name: &str,
        arguments: &ToolArguments,
        tool_call_template: &CallTemplate,
        cancel: &CancellationToken,
    ) -> Result<ToolStream, UtcpError> {
        let target = HttpTarget::from_template(tool_call_template)?;
        let Some(content_type) = target.stream_content_type else {
            let value = self.call_tool(context, tool_name, arguments, tool_call_template, cancel).await?;
            return Ok(ToolStream::once(Ok(value)));
        };

        let open = async {
            let request = self.build_call(&target, arguments, cancel).await?.header(ACCEPT, content_type);
            let response = send(request).await?;
            if !response.status().is_success() {
                return Err(read_success_body(response).await.err().unwrap_or_else(|| UtcpError::transport("HTTP stream request failed")));
            }
            Ok(response)
        };
        let response = cancellable_with_timeout(cancel, "HTTP stream", target.timeout, open).await?;

        if !is_event_stream(&response, content_type) {
            let body = read_success_body(response).await?;
            return Ok(ToolStream::once(Ok(parse_response_body(&body))));
        }

        let (sender, stream) = ToolStream::channel(cancel);
        let source = target.url.to_string();
        tokio::spawn(async move {
            forward_sse_stream(&source, response.bytes_stream(), sender, None, |event| {
                match parse_response_body(&event.data) {
                    Value::Null => None,
                    value => Some(Ok(value)),
                }
            })
            .await;
        });
        Ok(stream)
    }
}
